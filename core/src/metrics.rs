//! Output records. One row type per table in migrations/002_records.sql.

use crate::types::FarmId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyFarmRecord {
    pub date: NaiveDate,
    pub farm_id: FarmId,
    /// Reference demand of all growing crops, before the crop policy.
    pub water_demand_m3: f64,
    /// What the crop policy asked for.
    pub water_requested_m3: f64,
    pub groundwater_m3: f64,
    pub municipal_m3: f64,
    pub unmet_water_m3: f64,
    pub water_cost: f64,
    pub water_energy_kwh: f64,
    pub blended_tds_ppm: f64,
    pub water_policy: String,
    pub water_policy_reason: String,
    pub binding_constraint: String,
    pub harvest_kg: f64,
    pub processed_kg: f64,
    pub processing_energy_kwh: f64,
    pub crop_revenue: f64,
    pub processed_revenue: f64,
    pub forced_sale_revenue: f64,
    pub energy_cost: f64,
    pub labor_cost: f64,
    pub input_cost: f64,
    pub shared_opex: f64,
    pub net_income: f64,
    pub cash: f64,
    pub insolvent: bool,
}

/// Community totals for one day, including every term of the energy
/// balance so the identity can be checked from the record alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyCommunityRecord {
    pub date: NaiveDate,
    pub irrigation_kwh: f64,
    pub community_water_kwh: f64,
    pub processing_kwh: f64,
    pub household_kwh: f64,
    pub buildings_kwh: f64,
    pub demand_kwh: f64,
    pub pv_kwh: f64,
    pub wind_kwh: f64,
    pub battery_discharge_kwh: f64,
    pub battery_charge_kwh: f64,
    pub grid_import_kwh: f64,
    pub grid_export_kwh: f64,
    pub generator_kwh: f64,
    pub generator_hours: f64,
    pub generator_fuel_l: f64,
    pub curtailed_kwh: f64,
    pub unmet_kwh: f64,
    pub balance_residual_kwh: f64,
    pub battery_soc: f64,
    pub energy_cost: f64,
    pub export_revenue: f64,
    pub blended_rate_per_kwh: f64,
    pub energy_policy_reason: String,
    pub household_water_m3: f64,
    pub household_groundwater_m3: f64,
    pub household_municipal_m3: f64,
    pub household_unmet_m3: f64,
    pub household_water_cost: f64,
    pub storage_level_m3: f64,
    pub storage_inflow_m3: f64,
    pub storage_outflow_m3: f64,
    pub aquifer_extraction_m3: f64,
    pub aquifer_cumulative_m3: f64,
    pub forced_sale_kg: f64,
    pub market_sale_kg: f64,
    pub inventory_kg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyFarmRecord {
    pub year: i32,
    pub month: u32,
    pub farm_id: FarmId,
    pub crop_revenue: f64,
    pub processed_revenue: f64,
    pub water_cost: f64,
    pub energy_cost: f64,
    pub labor_cost: f64,
    pub input_cost: f64,
    pub shared_opex: f64,
    pub net_income: f64,
    pub water_m3: f64,
    pub groundwater_m3: f64,
    pub municipal_m3: f64,
    pub energy_kwh: f64,
    pub distribution: f64,
    pub economic_policy_reason: String,
    pub ending_cash: f64,
    pub insolvent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlyFarmRecord {
    pub year: i32,
    pub farm_id: FarmId,
    pub harvest_kg: f64,
    pub harvests: u32,
    /// Mean of actual / potential yield over the year's harvests.
    pub avg_yield_ratio: Option<f64>,
    pub revenue: f64,
    pub cost: f64,
    pub net_income: f64,
    pub water_m3: f64,
    pub groundwater_share: f64,
    pub unmet_water_m3: f64,
    pub distributions: f64,
    pub ending_cash: f64,
    pub min_cash: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlyCommunityRecord {
    pub year: i32,
    pub aquifer_extraction_m3: f64,
    pub aquifer_cumulative_m3: f64,
    pub aquifer_remaining_m3: f64,
    /// None while extraction does not outpace recharge.
    pub aquifer_years_remaining: Option<f64>,
    pub demand_kwh: f64,
    pub renewable_share: f64,
    pub unmet_energy_kwh: f64,
    pub grid_import_kwh: f64,
    pub grid_export_kwh: f64,
    pub curtailed_kwh: f64,
    pub generator_fuel_l: f64,
    pub energy_cost: f64,
    pub forced_sale_kg: f64,
}

/// Running community totals between two reporting boundaries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommunityPeriodTotals {
    pub demand_kwh: f64,
    /// PV and wind that reached demand or the battery.
    pub renewable_used_kwh: f64,
    pub unmet_kwh: f64,
    pub grid_import_kwh: f64,
    pub grid_export_kwh: f64,
    pub curtailed_kwh: f64,
    pub generator_fuel_l: f64,
    pub energy_cost: f64,
    pub aquifer_extraction_m3: f64,
    pub forced_sale_kg: f64,
    pub days: u32,
}

impl CommunityPeriodTotals {
    pub fn add_day(&mut self, day: &DailyCommunityRecord) {
        self.days += 1;
        self.demand_kwh += day.demand_kwh;
        self.renewable_used_kwh +=
            (day.pv_kwh + day.wind_kwh - day.grid_export_kwh - day.curtailed_kwh).max(0.0);
        self.unmet_kwh += day.unmet_kwh;
        self.grid_import_kwh += day.grid_import_kwh;
        self.grid_export_kwh += day.grid_export_kwh;
        self.curtailed_kwh += day.curtailed_kwh;
        self.generator_fuel_l += day.generator_fuel_l;
        self.energy_cost += day.energy_cost;
        self.aquifer_extraction_m3 += day.aquifer_extraction_m3;
        self.forced_sale_kg += day.forced_sale_kg;
    }

    /// Extraction scaled to a 365-day year, so a partial first or last
    /// year is not read as a full one.
    pub fn annual_extraction_m3(&self) -> f64 {
        if self.days > 0 {
            self.aquifer_extraction_m3 * 365.0 / self.days as f64
        } else {
            0.0
        }
    }

    /// Share of demand met from PV and wind; 0 with no demand.
    pub fn renewable_share(&self) -> f64 {
        if self.demand_kwh > 0.0 {
            (self.renewable_used_kwh / self.demand_kwh).min(1.0)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_period_extraction_is_annualised() {
        let mut totals = CommunityPeriodTotals::default();
        assert_eq!(totals.annual_extraction_m3(), 0.0);
        let day = DailyCommunityRecord { aquifer_extraction_m3: 100.0, ..Default::default() };
        for _ in 0..73 {
            totals.add_day(&day);
        }
        assert_eq!(totals.days, 73);
        assert!((totals.annual_extraction_m3() - 36_500.0).abs() < 1e-9);
    }
}
