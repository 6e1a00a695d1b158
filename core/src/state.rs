//! Simulation state — everything the engine mutates day to day.
//!
//! MUTATION MODEL: SimulationState is owned exclusively by the engine and
//! is mutated IN PLACE once per simulated day. It is not rebuilt or
//! copied between days. Anything that needs a stable view of a past day
//! must take a snapshot (see snapshot.rs); the engine writes one at every
//! month end.

use crate::{
    config::{BatteryConfig, FarmConfig},
    inventory_subsystem::InventoryLedger,
    metrics::{
        CommunityPeriodTotals, DailyCommunityRecord, DailyFarmRecord, MonthlyFarmRecord,
        YearlyCommunityRecord, YearlyFarmRecord,
    },
    policy::FarmPolicies,
    types::{CropName, FarmId},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ── Crops ──────────────────────────────────────────────────────────

/// Growth stage state machine. Order of variants is the transition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthStage {
    Dormant,
    Initial,
    Development,
    MidSeason,
    LateSeason,
    HarvestReady,
}

impl GrowthStage {
    /// True while the crop is in the field and takes irrigation.
    pub fn is_growing(&self) -> bool {
        matches!(
            self,
            Self::Initial | Self::Development | Self::MidSeason | Self::LateSeason
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Dormant      => "dormant",
            Self::Initial      => "initial",
            Self::Development  => "development",
            Self::MidSeason    => "mid_season",
            Self::LateSeason   => "late_season",
            Self::HarvestReady => "harvest_ready",
        }
    }
}

/// One planting slot of one crop on one farm. The slot persists across
/// cycles; each planting starts a new cycle and each harvest ends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropState {
    pub crop: CropName,
    /// Configured (month, day) of this slot's planting.
    pub planting_month_day: (u32, u32),
    /// Next planting date scheduled for this slot, set at each year start.
    pub scheduled_planting: Option<NaiveDate>,
    pub planting_date: Option<NaiveDate>,
    pub area_ha: f64,
    pub stage: GrowthStage,
    pub days_since_planting: u32,
    pub total_growing_days: u32,
    pub cumulative_water_m3: f64,
    pub expected_total_water_m3: f64,
    pub ky: f64,
    pub harvest_ready: bool,
    /// Number of planting cycles started on this slot.
    pub cycle: u32,
    pub last_harvested_cycle: Option<u32>,
}

impl CropState {
    pub fn dormant(crop: &str, planting_month_day: (u32, u32), area_ha: f64, ky: f64) -> Self {
        Self {
            crop: crop.to_string(),
            planting_month_day,
            scheduled_planting: None,
            planting_date: None,
            area_ha,
            stage: GrowthStage::Dormant,
            days_since_planting: 0,
            total_growing_days: 0,
            cumulative_water_m3: 0.0,
            expected_total_water_m3: 0.0,
            ky,
            harvest_ready: false,
            cycle: 0,
            last_harvested_cycle: None,
        }
    }

    /// Back to dormant after a harvest; the slot waits for its next date.
    pub fn reset_to_dormant(&mut self) {
        self.stage = GrowthStage::Dormant;
        self.planting_date = None;
        self.days_since_planting = 0;
        self.total_growing_days = 0;
        self.cumulative_water_m3 = 0.0;
        self.expected_total_water_m3 = 0.0;
        self.harvest_ready = false;
    }
}

// ── Farms ──────────────────────────────────────────────────────────

/// Month-to-date consumption, the basis for tiered municipal pricing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlyConsumption {
    pub municipal_m3:   f64,
    pub groundwater_m3: f64,
    pub energy_kwh:     f64,
}

/// Running money and resource totals between two reporting boundaries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FarmPeriodTotals {
    pub crop_revenue:      f64,
    pub processed_revenue: f64,
    pub water_cost:        f64,
    pub energy_cost:       f64,
    pub labor_cost:        f64,
    pub input_cost:        f64,
    pub shared_opex:       f64,
    pub water_m3:          f64,
    pub groundwater_m3:    f64,
    pub unmet_water_m3:    f64,
    pub energy_kwh:        f64,
    pub harvest_kg:        f64,
    pub harvests:          u32,
    pub yield_ratio_sum:   f64,
    pub distributions:     f64,
    pub min_cash:          Option<f64>,
}

impl FarmPeriodTotals {
    pub fn revenue(&self) -> f64 {
        self.crop_revenue + self.processed_revenue
    }

    pub fn cost(&self) -> f64 {
        self.water_cost
            + self.energy_cost
            + self.labor_cost
            + self.input_cost
            + self.shared_opex
    }

    pub fn observe_cash(&mut self, cash: f64) {
        self.min_cash = Some(self.min_cash.map_or(cash, |m| m.min(cash)));
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FarmState {
    pub id: FarmId,
    pub name: String,
    pub area_ha: f64,
    pub yield_factor: f64,
    pub policies: FarmPolicies,
    pub crops: Vec<CropState>,
    pub cash: f64,
    pub insolvent: bool,
    pub cumulative_water_m3: f64,
    pub cumulative_groundwater_m3: f64,
    pub cumulative_municipal_m3: f64,
    pub cumulative_energy_kwh: f64,
    pub monthly: MonthlyConsumption,
    pub month_totals: FarmPeriodTotals,
    pub year_totals: FarmPeriodTotals,
    pub run_totals: FarmPeriodTotals,
}

impl FarmState {
    pub fn new(config: &FarmConfig, policies: FarmPolicies, crops: Vec<CropState>) -> Self {
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            area_ha: config.area_ha,
            yield_factor: config.yield_factor,
            policies,
            crops,
            cash: config.initial_cash,
            insolvent: config.initial_cash < 0.0,
            cumulative_water_m3: 0.0,
            cumulative_groundwater_m3: 0.0,
            cumulative_municipal_m3: 0.0,
            cumulative_energy_kwh: 0.0,
            monthly: MonthlyConsumption::default(),
            month_totals: FarmPeriodTotals::default(),
            year_totals: FarmPeriodTotals::default(),
            run_totals: FarmPeriodTotals::default(),
        }
    }

    /// Area currently in the field.
    pub fn planted_area_ha(&self) -> f64 {
        self.crops
            .iter()
            .filter(|c| c.stage.is_growing() || c.stage == GrowthStage::HarvestReady)
            .map(|c| c.area_ha)
            .sum()
    }
}

// ── Community ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AquiferState {
    pub exploitable_volume_m3: f64,
    pub recharge_m3_per_year:  f64,
    /// Only ever increases.
    pub cumulative_extraction_m3: f64,
    pub days_elapsed: u64,
}

impl AquiferState {
    pub fn new(exploitable_volume_m3: f64, recharge_m3_per_year: f64) -> Self {
        Self {
            exploitable_volume_m3,
            recharge_m3_per_year,
            cumulative_extraction_m3: 0.0,
            days_elapsed: 0,
        }
    }

    pub fn record_extraction(&mut self, m3: f64) {
        if m3 > 0.0 {
            self.cumulative_extraction_m3 += m3;
        }
    }

    pub fn advance_day(&mut self) {
        self.days_elapsed += 1;
    }

    /// Exploitable volume plus recharge to date, minus extraction.
    pub fn remaining_m3(&self) -> f64 {
        let recharge = self.recharge_m3_per_year * self.days_elapsed as f64 / 365.0;
        (self.exploitable_volume_m3 + recharge - self.cumulative_extraction_m3).max(0.0)
    }

    /// Years until depletion at the given annual extraction. Reporting only.
    /// None when extraction does not exceed recharge.
    pub fn years_remaining(&self, annual_extraction_m3: f64) -> Option<f64> {
        let net = annual_extraction_m3 - self.recharge_m3_per_year;
        if net <= 0.0 {
            None
        } else {
            Some(self.remaining_m3() / net)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyState {
    pub battery_soc: f64,
    pub min_soc: f64,
    pub max_soc: f64,
    pub generator_on: bool,
}

impl EnergyState {
    pub fn new(battery: &BatteryConfig) -> Self {
        Self {
            battery_soc: battery.initial_soc.clamp(battery.min_soc, battery.max_soc),
            min_soc: battery.min_soc,
            max_soc: battery.max_soc,
            generator_on: false,
        }
    }

    /// Re-impose the SOC bounds after floating-point arithmetic.
    pub fn clamp_soc(&mut self) {
        self.battery_soc = self.battery_soc.clamp(self.min_soc, self.max_soc);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterStorageState {
    pub level_m3: f64,
    pub capacity_m3: f64,
}

impl WaterStorageState {
    pub fn new(level_m3: f64, capacity_m3: f64) -> Self {
        Self { level_m3: level_m3.clamp(0.0, capacity_m3), capacity_m3 }
    }

    pub fn headroom_m3(&self) -> f64 {
        (self.capacity_m3 - self.level_m3).max(0.0)
    }

    /// level(t+1) = level(t) + inflow − outflow, kept within [0, capacity].
    /// Returns the flows actually applied.
    pub fn apply(&mut self, inflow_m3: f64, outflow_m3: f64) -> (f64, f64) {
        let outflow = outflow_m3.clamp(0.0, self.level_m3);
        let after_out = self.level_m3 - outflow;
        let inflow = inflow_m3.clamp(0.0, (self.capacity_m3 - after_out).max(0.0));
        self.level_m3 = (after_out + inflow).clamp(0.0, self.capacity_m3);
        (inflow, outflow)
    }
}

// ── Whole simulation ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationState {
    /// Last simulated day; None before the first day runs.
    pub current_date: Option<NaiveDate>,
    /// Sorted by farm id. Never reordered after construction.
    pub farms: Vec<FarmState>,
    pub aquifer: AquiferState,
    pub energy: EnergyState,
    pub water_storage: WaterStorageState,
    pub inventory: InventoryLedger,
    /// Community month-to-date municipal draw (household tariff basis).
    pub community_monthly_municipal_m3: f64,
    pub community_year: CommunityPeriodTotals,
    pub community_run: CommunityPeriodTotals,
    /// Daily records go to their own tables; snapshots leave them out.
    #[serde(skip)]
    pub daily_farm_records: Vec<DailyFarmRecord>,
    #[serde(skip)]
    pub daily_community_records: Vec<DailyCommunityRecord>,
    pub monthly_records: Vec<MonthlyFarmRecord>,
    pub yearly_records: Vec<YearlyFarmRecord>,
    pub yearly_community_records: Vec<YearlyCommunityRecord>,
}

impl SimulationState {
    pub fn farm(&self, id: &str) -> Option<&FarmState> {
        self.farms.iter().find(|f| f.id == id)
    }

    pub fn farm_index(&self, id: &str) -> Option<usize> {
        self.farms.iter().position(|f| f.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_never_leaves_bounds() {
        let mut storage = WaterStorageState::new(80.0, 100.0);
        let (inflow, outflow) = storage.apply(50.0, 10.0);
        assert_eq!((inflow, outflow), (30.0, 10.0));
        assert_eq!(storage.level_m3, 100.0);

        let (_, outflow) = storage.apply(0.0, 500.0);
        assert_eq!(outflow, 100.0);
        assert_eq!(storage.level_m3, 0.0);
    }

    #[test]
    fn headroom_is_capacity_above_level() {
        let storage = WaterStorageState::new(80.0, 100.0);
        assert_eq!(storage.headroom_m3(), 20.0);
        assert_eq!(WaterStorageState::new(150.0, 100.0).headroom_m3(), 0.0);
        assert_eq!(WaterStorageState::new(0.0, 0.0).headroom_m3(), 0.0);
    }

    #[test]
    fn aquifer_extraction_is_monotonic() {
        let mut aquifer = AquiferState::new(1_000.0, 0.0);
        aquifer.record_extraction(10.0);
        aquifer.record_extraction(-5.0);
        assert_eq!(aquifer.cumulative_extraction_m3, 10.0);
        assert_eq!(aquifer.remaining_m3(), 990.0);
        assert_eq!(aquifer.years_remaining(99.0), Some(10.0));
        assert_eq!(aquifer.years_remaining(0.0), None);
    }

    #[test]
    fn stage_order_is_transition_order() {
        assert!(GrowthStage::Dormant < GrowthStage::Initial);
        assert!(GrowthStage::MidSeason < GrowthStage::LateSeason);
        assert!(GrowthStage::LateSeason < GrowthStage::HarvestReady);
    }
}
