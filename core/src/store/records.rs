//! Store methods for the daily, monthly and yearly output records.

use crate::{
    error::SimResult,
    metrics::{
        DailyCommunityRecord, DailyFarmRecord, MonthlyFarmRecord, YearlyCommunityRecord,
        YearlyFarmRecord,
    },
};
use rusqlite::params;

use super::SimStore;

/// Column sums over a farm's daily water rows.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WaterTotals {
    pub requested_m3: f64,
    pub groundwater_m3: f64,
    pub municipal_m3: f64,
    pub unmet_m3: f64,
}

impl SimStore {
    pub fn insert_daily_farm(&self, run_id: &str, r: &DailyFarmRecord) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO daily_farm (
                run_id, date, farm_id, water_demand_m3, water_requested_m3, groundwater_m3,
                municipal_m3, unmet_water_m3, water_cost, water_energy_kwh, blended_tds_ppm,
                water_policy, water_policy_reason, binding_constraint, harvest_kg, processed_kg,
                processing_energy_kwh, crop_revenue, processed_revenue, forced_sale_revenue,
                energy_cost, labor_cost, input_cost, shared_opex, net_income, cash, insolvent
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                      ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27)",
            params![
                run_id,
                r.date.to_string(),
                &r.farm_id,
                r.water_demand_m3,
                r.water_requested_m3,
                r.groundwater_m3,
                r.municipal_m3,
                r.unmet_water_m3,
                r.water_cost,
                r.water_energy_kwh,
                r.blended_tds_ppm,
                &r.water_policy,
                &r.water_policy_reason,
                &r.binding_constraint,
                r.harvest_kg,
                r.processed_kg,
                r.processing_energy_kwh,
                r.crop_revenue,
                r.processed_revenue,
                r.forced_sale_revenue,
                r.energy_cost,
                r.labor_cost,
                r.input_cost,
                r.shared_opex,
                r.net_income,
                r.cash,
                r.insolvent,
            ],
        )?;
        Ok(())
    }

    pub fn insert_daily_community(&self, run_id: &str, r: &DailyCommunityRecord) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO daily_community (
                run_id, date, irrigation_kwh, community_water_kwh, processing_kwh, household_kwh,
                buildings_kwh, demand_kwh, pv_kwh, wind_kwh, battery_discharge_kwh,
                battery_charge_kwh, grid_import_kwh, grid_export_kwh, generator_kwh,
                generator_hours, generator_fuel_l, curtailed_kwh, unmet_kwh, balance_residual_kwh,
                battery_soc, energy_cost, export_revenue, blended_rate_per_kwh,
                energy_policy_reason, household_water_m3, household_groundwater_m3,
                household_municipal_m3, household_unmet_m3, household_water_cost,
                storage_level_m3, storage_inflow_m3, storage_outflow_m3, aquifer_extraction_m3,
                aquifer_cumulative_m3, forced_sale_kg, market_sale_kg, inventory_kg
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                      ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30,
                      ?31, ?32, ?33, ?34, ?35, ?36, ?37, ?38)",
            params![
                run_id,
                r.date.to_string(),
                r.irrigation_kwh,
                r.community_water_kwh,
                r.processing_kwh,
                r.household_kwh,
                r.buildings_kwh,
                r.demand_kwh,
                r.pv_kwh,
                r.wind_kwh,
                r.battery_discharge_kwh,
                r.battery_charge_kwh,
                r.grid_import_kwh,
                r.grid_export_kwh,
                r.generator_kwh,
                r.generator_hours,
                r.generator_fuel_l,
                r.curtailed_kwh,
                r.unmet_kwh,
                r.balance_residual_kwh,
                r.battery_soc,
                r.energy_cost,
                r.export_revenue,
                r.blended_rate_per_kwh,
                &r.energy_policy_reason,
                r.household_water_m3,
                r.household_groundwater_m3,
                r.household_municipal_m3,
                r.household_unmet_m3,
                r.household_water_cost,
                r.storage_level_m3,
                r.storage_inflow_m3,
                r.storage_outflow_m3,
                r.aquifer_extraction_m3,
                r.aquifer_cumulative_m3,
                r.forced_sale_kg,
                r.market_sale_kg,
                r.inventory_kg,
            ],
        )?;
        Ok(())
    }

    pub fn insert_monthly_farm(&self, run_id: &str, r: &MonthlyFarmRecord) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO monthly_farm (
                run_id, year, month, farm_id, crop_revenue, processed_revenue, water_cost,
                energy_cost, labor_cost, input_cost, shared_opex, net_income, water_m3,
                groundwater_m3, municipal_m3, energy_kwh, distribution, economic_policy_reason,
                ending_cash, insolvent
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                      ?17, ?18, ?19, ?20)",
            params![
                run_id,
                r.year,
                r.month,
                &r.farm_id,
                r.crop_revenue,
                r.processed_revenue,
                r.water_cost,
                r.energy_cost,
                r.labor_cost,
                r.input_cost,
                r.shared_opex,
                r.net_income,
                r.water_m3,
                r.groundwater_m3,
                r.municipal_m3,
                r.energy_kwh,
                r.distribution,
                &r.economic_policy_reason,
                r.ending_cash,
                r.insolvent,
            ],
        )?;
        Ok(())
    }

    pub fn insert_yearly_farm(&self, run_id: &str, r: &YearlyFarmRecord) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO yearly_farm (
                run_id, year, farm_id, harvest_kg, harvests, avg_yield_ratio, revenue, cost,
                net_income, water_m3, groundwater_share, unmet_water_m3, distributions,
                ending_cash, min_cash
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                run_id,
                r.year,
                &r.farm_id,
                r.harvest_kg,
                r.harvests,
                r.avg_yield_ratio,
                r.revenue,
                r.cost,
                r.net_income,
                r.water_m3,
                r.groundwater_share,
                r.unmet_water_m3,
                r.distributions,
                r.ending_cash,
                r.min_cash,
            ],
        )?;
        Ok(())
    }

    pub fn insert_yearly_community(&self, run_id: &str, r: &YearlyCommunityRecord) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO yearly_community (
                run_id, year, aquifer_extraction_m3, aquifer_cumulative_m3, aquifer_remaining_m3,
                aquifer_years_remaining, demand_kwh, renewable_share, unmet_energy_kwh,
                grid_import_kwh, grid_export_kwh, curtailed_kwh, generator_fuel_l, energy_cost,
                forced_sale_kg
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                run_id,
                r.year,
                r.aquifer_extraction_m3,
                r.aquifer_cumulative_m3,
                r.aquifer_remaining_m3,
                r.aquifer_years_remaining,
                r.demand_kwh,
                r.renewable_share,
                r.unmet_energy_kwh,
                r.grid_import_kwh,
                r.grid_export_kwh,
                r.curtailed_kwh,
                r.generator_fuel_l,
                r.energy_cost,
                r.forced_sale_kg,
            ],
        )?;
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────────────

    pub fn monthly_farm_records(&self, run_id: &str, farm_id: &str) -> SimResult<Vec<MonthlyFarmRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT year, month, farm_id, crop_revenue, processed_revenue, water_cost,
                    energy_cost, labor_cost, input_cost, shared_opex, net_income, water_m3,
                    groundwater_m3, municipal_m3, energy_kwh, distribution,
                    economic_policy_reason, ending_cash, insolvent
             FROM monthly_farm WHERE run_id = ?1 AND farm_id = ?2
             ORDER BY year ASC, month ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id, farm_id], |row| {
                Ok(MonthlyFarmRecord {
                    year: row.get(0)?,
                    month: row.get(1)?,
                    farm_id: row.get(2)?,
                    crop_revenue: row.get(3)?,
                    processed_revenue: row.get(4)?,
                    water_cost: row.get(5)?,
                    energy_cost: row.get(6)?,
                    labor_cost: row.get(7)?,
                    input_cost: row.get(8)?,
                    shared_opex: row.get(9)?,
                    net_income: row.get(10)?,
                    water_m3: row.get(11)?,
                    groundwater_m3: row.get(12)?,
                    municipal_m3: row.get(13)?,
                    energy_kwh: row.get(14)?,
                    distribution: row.get(15)?,
                    economic_policy_reason: row.get(16)?,
                    ending_cash: row.get(17)?,
                    insolvent: row.get(18)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn yearly_farm_records(&self, run_id: &str) -> SimResult<Vec<YearlyFarmRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT year, farm_id, harvest_kg, harvests, avg_yield_ratio, revenue, cost,
                    net_income, water_m3, groundwater_share, unmet_water_m3, distributions,
                    ending_cash, min_cash
             FROM yearly_farm WHERE run_id = ?1
             ORDER BY year ASC, farm_id ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(YearlyFarmRecord {
                    year: row.get(0)?,
                    farm_id: row.get(1)?,
                    harvest_kg: row.get(2)?,
                    harvests: row.get(3)?,
                    avg_yield_ratio: row.get(4)?,
                    revenue: row.get(5)?,
                    cost: row.get(6)?,
                    net_income: row.get(7)?,
                    water_m3: row.get(8)?,
                    groundwater_share: row.get(9)?,
                    unmet_water_m3: row.get(10)?,
                    distributions: row.get(11)?,
                    ending_cash: row.get(12)?,
                    min_cash: row.get(13)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn yearly_community_records(&self, run_id: &str) -> SimResult<Vec<YearlyCommunityRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT year, aquifer_extraction_m3, aquifer_cumulative_m3, aquifer_remaining_m3,
                    aquifer_years_remaining, demand_kwh, renewable_share, unmet_energy_kwh,
                    grid_import_kwh, grid_export_kwh, curtailed_kwh, generator_fuel_l,
                    energy_cost, forced_sale_kg
             FROM yearly_community WHERE run_id = ?1
             ORDER BY year ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(YearlyCommunityRecord {
                    year: row.get(0)?,
                    aquifer_extraction_m3: row.get(1)?,
                    aquifer_cumulative_m3: row.get(2)?,
                    aquifer_remaining_m3: row.get(3)?,
                    aquifer_years_remaining: row.get(4)?,
                    demand_kwh: row.get(5)?,
                    renewable_share: row.get(6)?,
                    unmet_energy_kwh: row.get(7)?,
                    grid_import_kwh: row.get(8)?,
                    grid_export_kwh: row.get(9)?,
                    curtailed_kwh: row.get(10)?,
                    generator_fuel_l: row.get(11)?,
                    energy_cost: row.get(12)?,
                    forced_sale_kg: row.get(13)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Test / summary helpers ────────────────────────────────────────

    /// Number of daily farm rows persisted (for tests).
    pub fn daily_farm_count(&self, run_id: &str) -> SimResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM daily_farm WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Number of daily community rows persisted (for tests).
    pub fn daily_community_count(&self, run_id: &str) -> SimResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM daily_community WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Summed daily water flows of one farm.
    pub fn farm_water_totals(&self, run_id: &str, farm_id: &str) -> SimResult<WaterTotals> {
        let totals = self.conn.query_row(
            "SELECT COALESCE(SUM(water_requested_m3), 0.0), COALESCE(SUM(groundwater_m3), 0.0),
                    COALESCE(SUM(municipal_m3), 0.0), COALESCE(SUM(unmet_water_m3), 0.0)
             FROM daily_farm WHERE run_id = ?1 AND farm_id = ?2",
            params![run_id, farm_id],
            |row| {
                Ok(WaterTotals {
                    requested_m3: row.get(0)?,
                    groundwater_m3: row.get(1)?,
                    municipal_m3: row.get(2)?,
                    unmet_m3: row.get(3)?,
                })
            },
        )?;
        Ok(totals)
    }

    /// Largest absolute energy balance residual over the run.
    pub fn max_energy_residual(&self, run_id: &str) -> SimResult<f64> {
        let max: f64 = self.conn.query_row(
            "SELECT COALESCE(MAX(ABS(balance_residual_kwh)), 0.0)
             FROM daily_community WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    /// (min, max) battery SOC over the run.
    pub fn battery_soc_range(&self, run_id: &str) -> SimResult<(f64, f64)> {
        let range = self.conn.query_row(
            "SELECT COALESCE(MIN(battery_soc), 0.0), COALESCE(MAX(battery_soc), 0.0)
             FROM daily_community WHERE run_id = ?1",
            params![run_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(range)
    }
}
