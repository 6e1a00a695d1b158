//! Snapshot serialization — full simulation state to/from JSON.
//!
//! A snapshot is taken at every month end. It captures the complete
//! state needed to resume simulation from that day without replaying
//! from the start date. Daily records are not part of it; they live in
//! their own tables.

use crate::{
    clock::SimClock,
    metrics::CommunityPeriodTotals,
    state::{FarmPeriodTotals, SimulationState},
    types::{FarmId, RunId, Tick},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimSnapshot {
    pub run_id: RunId,
    pub tick: Tick,
    pub date: NaiveDate,
    pub clock: SimClock,
    pub state: SimulationState,
}

/// Headline numbers for one farm over the whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmSummary {
    pub farm_id: FarmId,
    pub cash: f64,
    pub insolvent: bool,
    pub totals: FarmPeriodTotals,
    pub net_income: f64,
    pub groundwater_share: f64,
    pub avg_yield_ratio: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunitySummary {
    pub totals: CommunityPeriodTotals,
    pub renewable_share: f64,
    pub aquifer_cumulative_m3: f64,
    pub aquifer_remaining_m3: f64,
    pub battery_soc: f64,
    pub water_storage_m3: f64,
    pub inventory_kg: f64,
}

/// Written once when a run ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalSnapshot {
    pub run_id: RunId,
    pub scenario: String,
    pub days_simulated: Tick,
    pub last_date: Option<NaiveDate>,
    pub farms: Vec<FarmSummary>,
    pub community: CommunitySummary,
    pub state: SimulationState,
}

impl FinalSnapshot {
    pub fn from_state(run_id: &str, scenario: &str, clock: &SimClock, state: &SimulationState) -> Self {
        let farms = state
            .farms
            .iter()
            .map(|f| {
                let t = &f.run_totals;
                FarmSummary {
                    farm_id: f.id.clone(),
                    cash: f.cash,
                    insolvent: f.insolvent,
                    totals: t.clone(),
                    net_income: t.revenue() - t.cost(),
                    groundwater_share: if t.water_m3 > 0.0 { t.groundwater_m3 / t.water_m3 } else { 0.0 },
                    avg_yield_ratio: (t.harvests > 0).then(|| t.yield_ratio_sum / t.harvests as f64),
                }
            })
            .collect();

        Self {
            run_id: run_id.to_string(),
            scenario: scenario.to_string(),
            days_simulated: clock.current_tick,
            last_date: state.current_date,
            farms,
            community: CommunitySummary {
                totals: state.community_run.clone(),
                renewable_share: state.community_run.renewable_share(),
                aquifer_cumulative_m3: state.aquifer.cumulative_extraction_m3,
                aquifer_remaining_m3: state.aquifer.remaining_m3(),
                battery_soc: state.energy.battery_soc,
                water_storage_m3: state.water_storage.level_m3,
                inventory_kg: state.inventory.total_kg(),
            },
            state: state.clone(),
        }
    }

    pub fn farm(&self, farm_id: &str) -> Option<&FarmSummary> {
        self.farms.iter().find(|f| f.farm_id == farm_id)
    }
}
