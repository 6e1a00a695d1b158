//! The event log: everything notable that happened on a simulated day.
//!
//! RULE: Events are facts, never commands. Components report what they
//! did; the engine persists every event to `event_log` in emission order.

use crate::types::{CropName, FarmId, ProductType, RunId, Tick};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Every event emitted during simulation.
/// Variants may be added; existing ones are never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimEvent {
    // ── Engine events ──────────────────────────────
    RunInitialized {
        run_id: RunId,
        scenario: String,
        start_date: NaiveDate,
        end_date: NaiveDate,
        farms: usize,
    },
    DayStarted {
        tick: Tick,
        date: NaiveDate,
    },
    DayCompleted {
        tick: Tick,
        date: NaiveDate,
    },

    // ── Crops ──────────────────────────────────────
    CropPlanted {
        date: NaiveDate,
        farm_id: FarmId,
        crop: CropName,
        area_ha: f64,
        cycle: u32,
        expected_total_water_m3: f64,
    },
    PlantingSkipped {
        date: NaiveDate,
        farm_id: FarmId,
        crop: CropName,
        reason: String,
    },
    CropHarvested {
        date: NaiveDate,
        farm_id: FarmId,
        crop: CropName,
        cycle: u32,
        harvest_kg: f64,
        water_ratio: f64,
        yield_ratio: f64,
    },

    // ── Water ──────────────────────────────────────
    WaterConstraintBound {
        date: NaiveDate,
        farm_id: FarmId,
        constraint: String,
        clipped_groundwater_m3: f64,
        unmet_m3: f64,
    },

    // ── Energy ─────────────────────────────────────
    GeneratorDispatched {
        date: NaiveDate,
        energy_kwh: f64,
        runtime_hours: f64,
        load_fraction: f64,
        fuel_l: f64,
    },
    EnergyUnmet {
        date: NaiveDate,
        unmet_kwh: f64,
    },

    // ── Inventory ──────────────────────────────────
    ForcedSale {
        date: NaiveDate,
        tranche_id: u64,
        crop: CropName,
        product_type: ProductType,
        quantity_kg: f64,
        revenue: f64,
        expired: bool,
    },

    // ── Economics ──────────────────────────────────
    FarmInsolvent {
        date: NaiveDate,
        farm_id: FarmId,
        cash: f64,
    },
    DistributionPaid {
        date: NaiveDate,
        farm_id: FarmId,
        amount: f64,
        policy: String,
    },
    MonthClosed {
        date: NaiveDate,
        year: i32,
        month: u32,
    },
    YearClosed {
        date: NaiveDate,
        year: i32,
    },
}

impl SimEvent {
    /// Stable name for the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::RunInitialized { .. }       => "run_initialized",
            Self::DayStarted { .. }           => "day_started",
            Self::DayCompleted { .. }         => "day_completed",
            Self::CropPlanted { .. }          => "crop_planted",
            Self::PlantingSkipped { .. }      => "planting_skipped",
            Self::CropHarvested { .. }        => "crop_harvested",
            Self::WaterConstraintBound { .. } => "water_constraint_bound",
            Self::GeneratorDispatched { .. }  => "generator_dispatched",
            Self::EnergyUnmet { .. }          => "energy_unmet",
            Self::ForcedSale { .. }           => "forced_sale",
            Self::FarmInsolvent { .. }        => "farm_insolvent",
            Self::DistributionPaid { .. }     => "distribution_paid",
            Self::MonthClosed { .. }          => "month_closed",
            Self::YearClosed { .. }           => "year_closed",
        }
    }

    /// The component that emits this event, for the event_log.component column.
    pub fn component(&self) -> &'static str {
        match self {
            Self::RunInitialized { .. }
            | Self::DayStarted { .. }
            | Self::DayCompleted { .. }
            | Self::MonthClosed { .. }
            | Self::YearClosed { .. } => "engine",
            Self::CropPlanted { .. }
            | Self::PlantingSkipped { .. }
            | Self::CropHarvested { .. } => "crop",
            Self::WaterConstraintBound { .. } => "water",
            Self::GeneratorDispatched { .. } | Self::EnergyUnmet { .. } => "energy",
            Self::ForcedSale { .. } => "inventory",
            Self::FarmInsolvent { .. } | Self::DistributionPaid { .. } => "economics",
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub run_id: RunId,
    pub tick: Tick,
    pub component: String,
    pub event_type: String,
    pub payload: String, // JSON-serialized SimEvent
}
