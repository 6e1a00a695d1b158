//! Crop lifecycle: planting, the growth-stage state machine, daily
//! irrigation demand and water-stressed harvest.
//!
//! STATE MACHINE:
//!   DORMANT → INITIAL → DEVELOPMENT → MID_SEASON → LATE_SEASON
//!           → HARVEST_READY → (harvest) → DORMANT
//!
//! A crop planted today takes water from day 0. It becomes harvest-ready
//! the morning days_since_planting reaches total_growing_days, so it has
//! taken exactly total_growing_days days of water, matching the expected
//! total precomputed at planting.

use crate::{
    config::{parse_month_day, EconomicsConfig, FarmConfig, InsolvencyPolicy, PlantingAreaMode},
    data::{DataProvider, StageDurations},
    error::{SimError, SimResult},
    event::SimEvent,
    policy::CropPolicyContext,
    state::{CropState, FarmState, GrowthStage},
};
use chrono::NaiveDate;

/// Delivered water within this of the request counts as fully served.
const WATER_EPSILON: f64 = 1e-9;

/// Stage for a day count, by cumulative stage-duration buckets.
pub fn stage_for_day(stages: &StageDurations, days_since_planting: u32) -> GrowthStage {
    let mut boundary = stages.initial;
    if days_since_planting < boundary {
        return GrowthStage::Initial;
    }
    boundary += stages.development;
    if days_since_planting < boundary {
        return GrowthStage::Development;
    }
    boundary += stages.mid_season;
    if days_since_planting < boundary {
        return GrowthStage::MidSeason;
    }
    if days_since_planting < stages.total() {
        GrowthStage::LateSeason
    } else {
        GrowthStage::HarvestReady
    }
}

/// The calendar date of a (month, day) planting in `year`. Feb 29 falls
/// back to Feb 28 outside leap years.
pub fn planting_date_in_year(year: i32, (month, day): (u32, u32)) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day).or_else(|| {
        if (month, day) == (2, 29) {
            NaiveDate::from_ymd_opt(year, 2, 28)
        } else {
            None
        }
    })
}

/// Today's water need of one growing crop slot.
#[derive(Debug, Clone, PartialEq)]
pub struct CropDemand {
    pub slot: usize,
    pub reference_m3: f64,
    pub requested_m3: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HarvestOutcome {
    pub crop: String,
    pub cycle: u32,
    pub harvest_kg: f64,
    pub water_ratio: f64,
    /// Actual over potential (reference) yield.
    pub yield_ratio: f64,
}

pub struct CropLifecycleManager {
    area_mode: PlantingAreaMode,
    insolvency: InsolvencyPolicy,
}

impl CropLifecycleManager {
    pub fn new(economics: &EconomicsConfig) -> Self {
        Self {
            area_mode: economics.planting_area_mode,
            insolvency: economics.insolvency_policy,
        }
    }

    /// One dormant slot per (crop, planting date) of the farm.
    pub fn build_slots(&self, farm: &FarmConfig, data: &dyn DataProvider) -> SimResult<Vec<CropState>> {
        let mut slots = Vec::new();
        for crop in &farm.crops {
            let params = data.crop_parameters(&crop.crop)?;
            let crop_area = farm.area_ha * crop.area_fraction;
            let area = match self.area_mode {
                PlantingAreaMode::FullArea => crop_area,
                PlantingAreaMode::SplitArea => crop_area / crop.planting_dates.len().max(1) as f64,
            };
            for text in &crop.planting_dates {
                let month_day = parse_month_day(text).ok_or_else(|| {
                    SimError::config(format!("farms[{}].crops.planting_dates", farm.id), text.clone())
                })?;
                slots.push(CropState::dormant(&crop.crop, month_day, area, params.ky));
            }
        }
        Ok(slots)
    }

    /// Schedule each slot's planting for `year`. Dates before `not_before`
    /// are left unscheduled. Slots still growing keep growing; their new
    /// date is checked when it arrives.
    pub fn schedule_year(&self, farms: &mut [FarmState], year: i32, not_before: NaiveDate) {
        for farm in farms.iter_mut() {
            for slot in farm.crops.iter_mut() {
                slot.scheduled_planting = planting_date_in_year(year, slot.planting_month_day)
                    .filter(|d| *d >= not_before);
            }
        }
    }

    /// Step 0: advance every growing crop by one day, then plant the slots
    /// scheduled for today.
    pub fn advance_and_plant(
        &self,
        date: NaiveDate,
        farms: &mut [FarmState],
        data: &dyn DataProvider,
    ) -> SimResult<Vec<SimEvent>> {
        let mut events = Vec::new();
        for farm in farms.iter_mut() {
            for slot in farm.crops.iter_mut() {
                if slot.stage.is_growing() {
                    let params = data.crop_parameters(&slot.crop)?;
                    slot.days_since_planting += 1;
                    slot.stage = stage_for_day(&params.stages, slot.days_since_planting);
                    slot.harvest_ready = slot.stage == GrowthStage::HarvestReady;
                }
            }

            let restricted = farm.insolvent && self.insolvency == InsolvencyPolicy::RestrictPlanting;
            for slot in farm.crops.iter_mut() {
                if slot.scheduled_planting != Some(date) {
                    continue;
                }
                slot.scheduled_planting = None;
                let skip_reason = if restricted {
                    Some("farm insolvent")
                } else if slot.stage != GrowthStage::Dormant {
                    Some("previous cycle still in the field")
                } else {
                    None
                };
                if let Some(reason) = skip_reason {
                    log::warn!("date={date} farm={} crop={} planting skipped: {reason}", farm.id, slot.crop);
                    events.push(SimEvent::PlantingSkipped {
                        date,
                        farm_id: farm.id.clone(),
                        crop: slot.crop.clone(),
                        reason: reason.to_string(),
                    });
                    continue;
                }
                plant(slot, date, data)?;
                log::debug!(
                    "date={date} farm={} planted {} on {:.2} ha (cycle {})",
                    farm.id, slot.crop, slot.area_ha, slot.cycle
                );
                events.push(SimEvent::CropPlanted {
                    date,
                    farm_id: farm.id.clone(),
                    crop: slot.crop.clone(),
                    area_ha: slot.area_ha,
                    cycle: slot.cycle,
                    expected_total_water_m3: slot.expected_total_water_m3,
                });
            }
        }
        Ok(events)
    }

    /// Step 1: reference demand and the crop policy's request per growing slot.
    pub fn daily_demand(&self, farm: &FarmState, data: &dyn DataProvider) -> SimResult<Vec<CropDemand>> {
        let mut demands = Vec::new();
        for (idx, slot) in farm.crops.iter().enumerate() {
            if !slot.stage.is_growing() {
                continue;
            }
            let planting_date = slot.planting_date.ok_or_else(|| {
                SimError::Other(anyhow::anyhow!("growing crop {} has no planting date", slot.crop))
            })?;
            let per_ha = data.irrigation_m3_per_ha(&slot.crop, planting_date, slot.days_since_planting)?;
            let reference = per_ha * slot.area_ha;
            let decision = farm.policies.crop.decide(&CropPolicyContext {
                stage: slot.stage,
                days_since_planting: slot.days_since_planting,
                total_growing_days: slot.total_growing_days,
                reference_demand_m3: reference,
                cumulative_water_m3: slot.cumulative_water_m3,
                expected_total_water_m3: slot.expected_total_water_m3,
            });
            demands.push(CropDemand {
                slot: idx,
                reference_m3: reference,
                requested_m3: decision.requested_m3,
            });
        }
        Ok(demands)
    }

    /// Credit delivered water back to the crops that asked for it. A fully
    /// served farm credits each crop exactly its request; a short farm
    /// scales every request by the same ratio.
    pub fn credit_water(&self, farm: &mut FarmState, demands: &[CropDemand], delivered_m3: f64) {
        let requested: f64 = demands.iter().map(|d| d.requested_m3).sum();
        if requested <= 0.0 {
            return;
        }
        let fully_served = requested - delivered_m3 <= WATER_EPSILON;
        let ratio = (delivered_m3 / requested).clamp(0.0, 1.0);
        for demand in demands {
            if let Some(slot) = farm.crops.get_mut(demand.slot) {
                slot.cumulative_water_m3 += if fully_served {
                    demand.requested_m3
                } else {
                    demand.requested_m3 * ratio
                };
            }
        }
    }

    /// Step 4 (first half): harvest every harvest-ready slot once per cycle
    /// and return it to dormant.
    pub fn harvest(
        &self,
        date: NaiveDate,
        farm: &mut FarmState,
        data: &dyn DataProvider,
    ) -> SimResult<(Vec<HarvestOutcome>, Vec<SimEvent>)> {
        let mut outcomes = Vec::new();
        let mut events = Vec::new();
        let yield_factor = farm.yield_factor;
        for slot in farm.crops.iter_mut() {
            if slot.stage != GrowthStage::HarvestReady || slot.last_harvested_cycle == Some(slot.cycle) {
                continue;
            }
            let planting_date = slot.planting_date.ok_or_else(|| {
                SimError::Other(anyhow::anyhow!("harvest-ready crop {} has no planting date", slot.crop))
            })?;
            let reference = data.yield_reference(&slot.crop, planting_date)?;
            let water_ratio = if slot.expected_total_water_m3 <= 0.0 {
                1.0
            } else {
                (slot.cumulative_water_m3 / slot.expected_total_water_m3).min(1.0)
            };
            let stress = (1.0 - slot.ky * (1.0 - water_ratio)).max(0.0);
            let potential_kg = reference.expected_kg_per_ha() * slot.area_ha;
            let harvest_kg = potential_kg * yield_factor * stress;
            let yield_ratio = if potential_kg > 0.0 { harvest_kg / potential_kg } else { 0.0 };

            log::debug!(
                "date={date} farm={} harvested {} {harvest_kg:.0} kg (water ratio {water_ratio:.3})",
                farm.id, slot.crop
            );
            events.push(SimEvent::CropHarvested {
                date,
                farm_id: farm.id.clone(),
                crop: slot.crop.clone(),
                cycle: slot.cycle,
                harvest_kg,
                water_ratio,
                yield_ratio,
            });
            outcomes.push(HarvestOutcome {
                crop: slot.crop.clone(),
                cycle: slot.cycle,
                harvest_kg,
                water_ratio,
                yield_ratio,
            });
            slot.last_harvested_cycle = Some(slot.cycle);
            slot.reset_to_dormant();
        }
        Ok((outcomes, events))
    }
}

fn plant(slot: &mut CropState, date: NaiveDate, data: &dyn DataProvider) -> SimResult<()> {
    let params = data.crop_parameters(&slot.crop)?;
    let total = params.stages.total();
    let mut expected = 0.0;
    for day in 0..total {
        expected += data.irrigation_m3_per_ha(&slot.crop, date, day)? * slot.area_ha;
    }
    slot.planting_date = Some(date);
    slot.stage = GrowthStage::Initial;
    slot.days_since_planting = 0;
    slot.total_growing_days = total;
    slot.cumulative_water_m3 = 0.0;
    slot.expected_total_water_m3 = expected;
    slot.ky = params.ky;
    slot.harvest_ready = false;
    slot.cycle += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::StageDurations;

    const STAGES: StageDurations =
        StageDurations { initial: 30, development: 40, mid_season: 45, late_season: 25 };

    #[test]
    fn stage_buckets_are_cumulative() {
        assert_eq!(stage_for_day(&STAGES, 0), GrowthStage::Initial);
        assert_eq!(stage_for_day(&STAGES, 29), GrowthStage::Initial);
        assert_eq!(stage_for_day(&STAGES, 30), GrowthStage::Development);
        assert_eq!(stage_for_day(&STAGES, 70), GrowthStage::MidSeason);
        assert_eq!(stage_for_day(&STAGES, 115), GrowthStage::LateSeason);
        assert_eq!(stage_for_day(&STAGES, 139), GrowthStage::LateSeason);
        assert_eq!(stage_for_day(&STAGES, 140), GrowthStage::HarvestReady);
    }

    #[test]
    fn stage_never_moves_backwards() {
        let mut last = GrowthStage::Dormant;
        for day in 0..=STAGES.total() {
            let stage = stage_for_day(&STAGES, day);
            assert!(stage >= last, "day {day}: {stage:?} after {last:?}");
            last = stage;
        }
    }

    #[test]
    fn leap_day_planting_falls_back_in_common_years() {
        assert_eq!(
            planting_date_in_year(2025, (2, 29)),
            NaiveDate::from_ymd_opt(2025, 2, 28)
        );
        assert_eq!(
            planting_date_in_year(2024, (2, 29)),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
    }
}
