//! Water allocation: policy-driven source split, physical clipping,
//! household draw, storage and aquifer bookkeeping.
//!
//! CLIPPING ORDER (per farm, farms in id order):
//!   a. Partitioned sharing: the farm's share of well, treatment and
//!      storage capacity.
//!   b. Community level: what remains of the pooled well/treatment/storage
//!      capacity, the water-energy ceiling, and (optionally) the aquifer's
//!      remaining exploitable volume.
//!
//! Groundwater clipped away goes to municipal supply, up to the optional
//! municipal daily cap. Whatever is left is unmet. Groundwater draws come
//! from today's well production first, then from storage.

use crate::{
    config::{AquiferExtractionMode, CapacitySharing, MunicipalConfig, WaterSystemConfig},
    policy::WaterPolicyContext,
    state::SimulationState,
};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

const WATER_DENSITY: f64 = 1000.0; // kg/m³
const GRAVITY: f64 = 9.81; // m/s²
const JOULES_PER_KWH: f64 = 3.6e6;
const M3_EPSILON: f64 = 1e-9;

/// Electrical energy to lift and push one m³ through the well pipe.
/// Head = static lift + Darcy–Weisbach friction at the design flow rate.
pub fn pumping_kwh_per_m3(well: &crate::config::WellConfig) -> f64 {
    let flow_m3_s = well.capacity_m3_per_day / (well.pumping_hours_per_day * 3600.0);
    let area = std::f64::consts::PI * (well.pipe_diameter_m / 2.0).powi(2);
    let velocity = flow_m3_s / area;
    let friction_head = well.darcy_friction_factor
        * (well.pipe_length_m / well.pipe_diameter_m)
        * velocity.powi(2)
        / (2.0 * GRAVITY);
    WATER_DENSITY * GRAVITY * (well.depth_m + friction_head)
        / (well.pump_efficiency * JOULES_PER_KWH)
}

/// Desalination energy per m³, linear in feed salinity.
pub fn treatment_kwh_per_m3(treatment: &crate::config::TreatmentConfig) -> f64 {
    treatment.base_kwh_per_m3 + treatment.kwh_per_m3_per_1000_ppm * treatment.feed_tds_ppm / 1000.0
}

/// Increasing-block municipal tariff with a seasonal multiplier.
pub struct MunicipalTariff<'a> {
    config: &'a MunicipalConfig,
}

impl<'a> MunicipalTariff<'a> {
    pub fn new(config: &'a MunicipalConfig) -> Self {
        Self { config }
    }

    fn multiplier(&self, month: u32) -> f64 {
        if self.config.peak_months.contains(&month) {
            self.config.peak_multiplier
        } else {
            1.0
        }
    }

    /// Price of the next m³ after `consumed_m3` this month.
    pub fn marginal_price(&self, consumed_m3: f64, month: u32) -> f64 {
        let tier = self
            .config
            .tiers
            .iter()
            .find(|t| t.up_to_m3.map_or(true, |cap| consumed_m3 < cap))
            .or_else(|| self.config.tiers.last());
        tier.map_or(0.0, |t| t.price_per_m3) * self.multiplier(month)
    }

    /// Cost of `volume_m3` on top of `consumed_m3`, integrated across tiers.
    pub fn cost(&self, consumed_m3: f64, volume_m3: f64, month: u32) -> f64 {
        if volume_m3 <= 0.0 {
            return 0.0;
        }
        let start = consumed_m3.max(0.0);
        let end = start + volume_m3;
        let mut lower = 0.0;
        let mut total = 0.0;
        for tier in &self.config.tiers {
            let upper = tier.up_to_m3.unwrap_or(f64::INFINITY);
            let overlap = end.min(upper) - start.max(lower);
            if overlap > 0.0 {
                total += overlap * tier.price_per_m3;
            }
            lower = upper;
        }
        total * self.multiplier(month)
    }
}

/// Why a farm got less groundwater than its policy wanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingConstraint {
    None,
    FarmWellShare,
    FarmTreatmentShare,
    CommunityPool,
    EnergyCeiling,
    AquiferLimit,
    MunicipalCap,
}

impl BindingConstraint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None               => "none",
            Self::FarmWellShare      => "farm_well_share",
            Self::FarmTreatmentShare => "farm_treatment_share",
            Self::CommunityPool      => "community_pool",
            Self::EnergyCeiling      => "energy_ceiling",
            Self::AquiferLimit       => "aquifer_limit",
            Self::MunicipalCap       => "municipal_cap",
        }
    }
}

/// One farm's water for one day.
#[derive(Debug, Clone, PartialEq)]
pub struct FarmWaterAllocation {
    pub requested_m3: f64,
    pub groundwater_m3: f64,
    pub municipal_m3: f64,
    pub unmet_m3: f64,
    pub cost: f64,
    pub energy_kwh: f64,
    pub blended_tds_ppm: f64,
    pub clipped_groundwater_m3: f64,
    pub policy_name: &'static str,
    pub policy_reason: String,
    pub binding: BindingConstraint,
}

impl FarmWaterAllocation {
    pub fn delivered_m3(&self) -> f64 {
        self.groundwater_m3 + self.municipal_m3
    }
}

/// Community-level water flows for one day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommunityWaterDay {
    pub household_groundwater_m3: f64,
    pub household_municipal_m3: f64,
    pub household_unmet_m3: f64,
    pub household_cost: f64,
    /// Energy of household delivery plus storage refill.
    pub energy_kwh: f64,
    /// Part of `energy_kwh` spent refilling storage.
    pub refill_energy_kwh: f64,
    pub storage_inflow_m3: f64,
    pub storage_outflow_m3: f64,
    pub aquifer_extraction_m3: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaterDay {
    pub farms: Vec<FarmWaterAllocation>,
    pub community: CommunityWaterDay,
}

/// Remaining physical capacity during one day's allocation pass.
struct DailyPool {
    well_m3: f64,
    treatment_m3: f64,
    storage_m3: f64,
    energy_kwh: f64,
    aquifer_m3: f64,
    municipal_m3: f64,
}

impl DailyPool {
    fn production_m3(&self) -> f64 {
        self.well_m3.min(self.treatment_m3).min(self.aquifer_m3).max(0.0)
    }
}

/// Groundwater a draw may take, split into (production, storage) parts.
#[derive(Debug, Clone, Copy)]
struct Availability {
    production_m3: f64,
    storage_m3: f64,
    limit: BindingConstraint,
}

impl Availability {
    fn total(&self) -> f64 {
        self.production_m3 + self.storage_m3
    }
}

pub struct WaterAllocator {
    config: WaterSystemConfig,
    household_m3_per_day: f64,
    electricity_price_per_kwh: f64,
    pumping_kwh_per_m3: f64,
    treatment_kwh_per_m3: f64,
}

impl WaterAllocator {
    pub fn new(config: &WaterSystemConfig, household_m3_per_day: f64, electricity_price_per_kwh: f64) -> Self {
        Self {
            pumping_kwh_per_m3: pumping_kwh_per_m3(&config.well),
            treatment_kwh_per_m3: treatment_kwh_per_m3(&config.treatment),
            config: config.clone(),
            household_m3_per_day,
            electricity_price_per_kwh,
        }
    }

    /// Energy per m³ drawn from today's production.
    fn production_kwh_per_m3(&self) -> f64 {
        self.pumping_kwh_per_m3 + self.treatment_kwh_per_m3 + self.config.conveyance_kwh_per_m3
    }

    /// Energy per m³ drawn from storage (already pumped and treated).
    fn storage_kwh_per_m3(&self) -> f64 {
        self.config.conveyance_kwh_per_m3
    }

    pub fn groundwater_unit_cost(&self) -> f64 {
        self.production_kwh_per_m3() * self.electricity_price_per_kwh + self.config.groundwater_om_per_m3
    }

    /// Largest (production, storage) draw the remaining energy allows.
    fn energy_limited(&self, energy_kwh: f64, production: f64, storage: f64) -> (f64, f64) {
        let per_prod = self.production_kwh_per_m3();
        let prod = if per_prod > 0.0 { production.min(energy_kwh / per_prod) } else { production };
        let left = (energy_kwh - prod * per_prod).max(0.0);
        let per_sto = self.storage_kwh_per_m3();
        let sto = if per_sto > 0.0 { storage.min(left / per_sto) } else { storage };
        (prod.max(0.0), sto.max(0.0))
    }

    fn availability(&self, pool: &DailyPool, share: Option<(f64, f64)>) -> Availability {
        let mut production = pool.well_m3.min(pool.treatment_m3).max(0.0);
        let mut storage = pool.storage_m3.max(0.0);
        let mut limit = BindingConstraint::CommunityPool;

        if let Some((share_production, share_storage)) = share {
            if share_production < production {
                production = share_production;
                limit = if self.config.well.capacity_m3_per_day <= self.config.treatment.capacity_m3_per_day {
                    BindingConstraint::FarmWellShare
                } else {
                    BindingConstraint::FarmTreatmentShare
                };
            }
            storage = storage.min(share_storage);
        }
        if pool.aquifer_m3 < production {
            production = pool.aquifer_m3.max(0.0);
            limit = BindingConstraint::AquiferLimit;
        }
        let (p, s) = self.energy_limited(pool.energy_kwh, production, storage);
        if p + s + M3_EPSILON < production + storage {
            limit = BindingConstraint::EnergyCeiling;
        }
        Availability { production_m3: p, storage_m3: s, limit }
    }

    /// Take `m3` from the pool, production first. Returns (production, storage, energy).
    fn draw(&self, pool: &mut DailyPool, avail: &Availability, m3: f64) -> (f64, f64, f64) {
        let production = m3.min(avail.production_m3);
        let storage = (m3 - production).min(avail.storage_m3).max(0.0);
        let energy = production * self.production_kwh_per_m3() + storage * self.storage_kwh_per_m3();
        pool.well_m3 -= production;
        pool.treatment_m3 -= production;
        pool.aquifer_m3 -= production;
        pool.storage_m3 -= storage;
        pool.energy_kwh -= energy;
        (production, storage, energy)
    }

    /// Allocate one day's water for every farm and the households, then
    /// refill storage and book aquifer extraction.
    ///
    /// `requests` holds each farm's crop-policy request, in farm order.
    pub fn allocate(
        &self,
        date: NaiveDate,
        state: &mut SimulationState,
        requests: &[f64],
        renewable_kwh_available: f64,
    ) -> WaterDay {
        let month = date.month();
        let tariff = MunicipalTariff::new(&self.config.municipal);
        let storage_start = state.water_storage.level_m3;
        let mut pool = DailyPool {
            well_m3: self.config.well.capacity_m3_per_day,
            treatment_m3: self.config.treatment.capacity_m3_per_day,
            storage_m3: storage_start,
            energy_kwh: self.config.max_water_energy_kwh_per_day.unwrap_or(f64::INFINITY),
            aquifer_m3: match self.config.aquifer.extraction_mode {
                AquiferExtractionMode::ReportingOnly => f64::INFINITY,
                AquiferExtractionMode::LimitToRemaining => state.aquifer.remaining_m3(),
            },
            municipal_m3: self.config.municipal.max_m3_per_day.unwrap_or(f64::INFINITY),
        };

        let shares = match self.config.sharing {
            CapacitySharing::Pooled => None,
            CapacitySharing::Partitioned => {
                let areas: Vec<f64> = state.farms.iter().map(|f| f.area_ha).collect();
                Some(self.config.share_method.shares(&areas, requests))
            }
        };
        let design_production = self
            .config
            .well
            .capacity_m3_per_day
            .min(self.config.treatment.capacity_m3_per_day);

        let mut extraction = 0.0;
        let mut outflow = 0.0;
        let mut allocations = Vec::with_capacity(state.farms.len());

        for (idx, farm) in state.farms.iter_mut().enumerate() {
            let requested = requests.get(idx).copied().unwrap_or(0.0).max(0.0);
            let share = shares
                .as_ref()
                .map(|s| (design_production * s[idx], storage_start * s[idx]));
            let avail = self.availability(&pool, share);

            let mut ctx = WaterPolicyContext {
                date,
                demand_m3: requested,
                available_groundwater_m3: avail.total(),
                pumping_kwh_per_m3: self.pumping_kwh_per_m3,
                conveyance_kwh_per_m3: self.config.conveyance_kwh_per_m3,
                treatment_kwh_per_m3: self.treatment_kwh_per_m3,
                electricity_price_per_kwh: self.electricity_price_per_kwh,
                groundwater_om_per_m3: self.config.groundwater_om_per_m3,
                municipal_marginal_price_per_m3: tariff.marginal_price(farm.monthly.municipal_m3, month),
                renewable_kwh_available,
                groundwater_tds_ppm: self.config.treatment.product_tds_ppm,
                municipal_tds_ppm: self.config.municipal.tds_ppm,
            };
            let decision = farm.policies.water.decide(&ctx);

            // What the policy would take with no physical limit; a gap
            // between that and what it got names the binding constraint.
            ctx.available_groundwater_m3 = requested;
            let preferred = farm.policies.water.decide(&ctx).groundwater_m3;

            let groundwater = decision.groundwater_m3.clamp(0.0, avail.total());
            let clipped = (decision.groundwater_m3 - groundwater).max(0.0);
            let mut binding = if preferred > groundwater + M3_EPSILON {
                avail.limit
            } else {
                BindingConstraint::None
            };

            let municipal_wanted = decision.municipal_m3.max(0.0) + clipped;
            let municipal = municipal_wanted.min(pool.municipal_m3.max(0.0));
            pool.municipal_m3 -= municipal;
            let unmet = (requested - groundwater - municipal).max(0.0);
            if unmet > M3_EPSILON && binding == BindingConstraint::None {
                binding = BindingConstraint::MunicipalCap;
            }

            let (production, from_storage, energy) = self.draw(&mut pool, &avail, groundwater);
            extraction += production;
            outflow += from_storage;

            let cost = groundwater * self.groundwater_unit_cost()
                + tariff.cost(farm.monthly.municipal_m3, municipal, month);
            let delivered = groundwater + municipal;
            let blended_tds_ppm = if delivered > 0.0 {
                (groundwater * self.config.treatment.product_tds_ppm
                    + municipal * self.config.municipal.tds_ppm)
                    / delivered
            } else {
                0.0
            };

            farm.monthly.municipal_m3 += municipal;
            farm.monthly.groundwater_m3 += groundwater;
            farm.monthly.energy_kwh += energy;
            farm.cumulative_water_m3 += delivered;
            farm.cumulative_groundwater_m3 += groundwater;
            farm.cumulative_municipal_m3 += municipal;
            farm.cumulative_energy_kwh += energy;

            if binding != BindingConstraint::None {
                log::warn!(
                    "date={date} farm={} water constraint {} (clipped {clipped:.1} m3, unmet {unmet:.1} m3)",
                    farm.id,
                    binding.as_str()
                );
            }

            allocations.push(FarmWaterAllocation {
                requested_m3: requested,
                groundwater_m3: groundwater,
                municipal_m3: municipal,
                unmet_m3: unmet,
                cost,
                energy_kwh: energy,
                blended_tds_ppm,
                clipped_groundwater_m3: clipped,
                policy_name: decision.policy_name,
                policy_reason: decision.reason,
                binding,
            });
        }

        let mut community = self.household_draw(date, state, &mut pool, &tariff, &mut extraction, &mut outflow);

        // Refill storage from spare production, up to today's headroom
        // once today's draws have left the tank.
        let headroom = state.water_storage.headroom_m3() + outflow;
        let refill_per_m3 = self.pumping_kwh_per_m3 + self.treatment_kwh_per_m3;
        let mut refill = pool.production_m3().min(headroom);
        if refill_per_m3 > 0.0 {
            refill = refill.min(pool.energy_kwh.max(0.0) / refill_per_m3);
        }
        let (inflow, applied_outflow) = state.water_storage.apply(refill, outflow);
        let refill_energy = inflow * refill_per_m3;
        extraction += inflow;

        state.aquifer.record_extraction(extraction);
        state.aquifer.advance_day();

        community.storage_inflow_m3 = inflow;
        community.storage_outflow_m3 = applied_outflow;
        community.refill_energy_kwh = refill_energy;
        community.energy_kwh += refill_energy;
        community.aquifer_extraction_m3 = extraction;

        WaterDay { farms: allocations, community }
    }

    /// Households draw from what the farms left: production, storage,
    /// then municipal supply on the community's own tariff tracker.
    fn household_draw(
        &self,
        date: NaiveDate,
        state: &mut SimulationState,
        pool: &mut DailyPool,
        tariff: &MunicipalTariff<'_>,
        extraction: &mut f64,
        outflow: &mut f64,
    ) -> CommunityWaterDay {
        let demand = self.household_m3_per_day.max(0.0);
        if demand <= 0.0 {
            return CommunityWaterDay::default();
        }
        let month = date.month();
        let avail = self.availability(pool, None);
        let groundwater = demand.min(avail.total());
        let (production, from_storage, energy) = self.draw(pool, &avail, groundwater);
        *extraction += production;
        *outflow += from_storage;

        let municipal = (demand - groundwater).min(pool.municipal_m3.max(0.0));
        pool.municipal_m3 -= municipal;
        let unmet = (demand - groundwater - municipal).max(0.0);
        if unmet > M3_EPSILON {
            log::warn!("date={date} household water unmet {unmet:.1} m3");
        }

        let cost = groundwater * self.groundwater_unit_cost()
            + tariff.cost(state.community_monthly_municipal_m3, municipal, month);
        state.community_monthly_municipal_m3 += municipal;

        CommunityWaterDay {
            household_groundwater_m3: groundwater,
            household_municipal_m3: municipal,
            household_unmet_m3: unmet,
            household_cost: cost,
            energy_kwh: energy,
            ..CommunityWaterDay::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ScenarioConfig, TariffTier};

    fn tiered() -> MunicipalConfig {
        MunicipalConfig {
            tiers: vec![
                TariffTier { up_to_m3: Some(10_000.0), price_per_m3: 0.10 },
                TariffTier { up_to_m3: None, price_per_m3: 0.20 },
            ],
            peak_months: vec![7],
            peak_multiplier: 1.5,
            tds_ppm: 400.0,
            max_m3_per_day: None,
        }
    }

    #[test]
    fn tariff_cost_integrates_across_tiers() {
        let config = tiered();
        let tariff = MunicipalTariff::new(&config);
        assert!((tariff.cost(9_000.0, 2_000.0, 1) - 300.0).abs() < 1e-9);
        assert!((tariff.cost(9_000.0, 2_000.0, 7) - 450.0).abs() < 1e-9);
        assert_eq!(tariff.cost(0.0, 0.0, 1), 0.0);
    }

    #[test]
    fn marginal_price_follows_consumption() {
        let config = tiered();
        let tariff = MunicipalTariff::new(&config);
        assert_eq!(tariff.marginal_price(0.0, 1), 0.10);
        assert_eq!(tariff.marginal_price(10_000.0, 1), 0.20);
    }

    #[test]
    fn pumping_energy_exceeds_static_lift() {
        let well = ScenarioConfig::default_test().water.well;
        let lift_only = WATER_DENSITY * GRAVITY * well.depth_m / (well.pump_efficiency * JOULES_PER_KWH);
        let kwh = pumping_kwh_per_m3(&well);
        assert!(kwh > lift_only);
        assert!(kwh < lift_only * 1.05, "friction head should be small: {kwh}");
    }

    #[test]
    fn treatment_energy_scales_with_salinity() {
        let treatment = ScenarioConfig::default_test().water.treatment;
        assert!((treatment_kwh_per_m3(&treatment) - 1.7).abs() < 1e-12);
    }
}
