//! Economics subsystem — daily cash, shared-cost allocation and the
//! monthly/yearly closes.
//!
//! This subsystem is REACTIVE. It never moves water, energy or product;
//! it prices what the other steps did and books it to farm cash.
//!
//! Daily:
//!   cash += crop_revenue + processed_revenue
//!         − water_cost − energy_cost − labor_cost − input_cost
//!         − shared_opex_allocation
//!
//! Shared costs (infrastructure O&M, debt service, household water,
//! community energy, net of export revenue) are split by one configured
//! method. Negative cash raises the insolvency flag; it never halts a run.

use crate::{
    config::EconomicsConfig,
    event::SimEvent,
    metrics::{MonthlyFarmRecord, YearlyFarmRecord},
    policy::EconomicPolicyContext,
    state::{FarmPeriodTotals, FarmState},
};
use chrono::{Datelike, NaiveDate};

const DAYS_PER_YEAR: f64 = 365.0;

/// One farm's priced activity for one day, before accounting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FarmDayFlows {
    pub crop_revenue: f64,
    pub processed_revenue: f64,
    pub water_cost: f64,
    pub water_m3: f64,
    pub groundwater_m3: f64,
    pub unmet_water_m3: f64,
    pub water_energy_kwh: f64,
    pub processing_energy_kwh: f64,
    pub processing_labor_cost: f64,
    pub harvest_kg: f64,
    pub harvests: u32,
    pub yield_ratio_sum: f64,
}

/// What the accountant booked for one farm on one day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FarmDaySettlement {
    pub energy_cost: f64,
    pub labor_cost: f64,
    pub input_cost: f64,
    pub shared_opex: f64,
    pub net_income: f64,
}

pub struct EconomicAccountant {
    config: EconomicsConfig,
    months_closed: u32,
}

impl EconomicAccountant {
    pub fn new(config: &EconomicsConfig) -> Self {
        Self { config: config.clone(), months_closed: 0 }
    }

    /// Community costs to spread over farms today.
    pub fn shared_cost_today(
        &self,
        household_water_cost: f64,
        community_energy_cost: f64,
        export_revenue: f64,
    ) -> f64 {
        (self.config.annual_infrastructure_om + self.config.annual_debt_service) / DAYS_PER_YEAR
            + household_water_cost
            + community_energy_cost
            - export_revenue
    }

    /// Per-farm portion of `total`, in farm order. Usage means cumulative
    /// delivered water; before anyone has used water the split is equal.
    pub fn allocate_shared(&self, farms: &[FarmState], total: f64) -> Vec<f64> {
        let areas: Vec<f64> = farms.iter().map(|f| f.area_ha).collect();
        let usage: Vec<f64> = farms.iter().map(|f| f.cumulative_water_m3).collect();
        self.config
            .shared_cost_method
            .shares(&areas, &usage)
            .into_iter()
            .map(|s| s * total)
            .collect()
    }

    /// Book one day to one farm. Returns the settlement and, when the farm
    /// has just gone below zero, a FarmInsolvent event.
    pub fn settle_day(
        &self,
        date: NaiveDate,
        farm: &mut FarmState,
        flows: &FarmDayFlows,
        blended_rate_per_kwh: f64,
        shared_opex: f64,
    ) -> (FarmDaySettlement, Option<SimEvent>) {
        let energy_cost = flows.processing_energy_kwh * blended_rate_per_kwh;
        let labor_cost =
            self.config.labor_cost_per_ha_per_day * farm.area_ha + flows.processing_labor_cost;
        let input_cost = self.config.input_cost_per_planted_ha_per_day * farm.planted_area_ha();

        let revenue = flows.crop_revenue + flows.processed_revenue;
        let cost = flows.water_cost + energy_cost + labor_cost + input_cost + shared_opex;
        let net_income = revenue - cost;
        farm.cash += net_income;

        for totals in [&mut farm.month_totals, &mut farm.year_totals, &mut farm.run_totals] {
            totals.crop_revenue += flows.crop_revenue;
            totals.processed_revenue += flows.processed_revenue;
            totals.water_cost += flows.water_cost;
            totals.energy_cost += energy_cost;
            totals.labor_cost += labor_cost;
            totals.input_cost += input_cost;
            totals.shared_opex += shared_opex;
            totals.water_m3 += flows.water_m3;
            totals.groundwater_m3 += flows.groundwater_m3;
            totals.unmet_water_m3 += flows.unmet_water_m3;
            totals.energy_kwh += flows.water_energy_kwh + flows.processing_energy_kwh;
            totals.harvest_kg += flows.harvest_kg;
            totals.harvests += flows.harvests;
            totals.yield_ratio_sum += flows.yield_ratio_sum;
            totals.observe_cash(farm.cash);
        }

        let event = self.update_insolvency(date, farm);
        (
            FarmDaySettlement { energy_cost, labor_cost, input_cost, shared_opex, net_income },
            event,
        )
    }

    fn update_insolvency(&self, date: NaiveDate, farm: &mut FarmState) -> Option<SimEvent> {
        let was_insolvent = farm.insolvent;
        farm.insolvent = farm.cash < 0.0;
        if farm.insolvent && !was_insolvent {
            log::warn!("date={date} farm={} insolvent, cash {:.2}", farm.id, farm.cash);
            Some(SimEvent::FarmInsolvent { date, farm_id: farm.id.clone(), cash: farm.cash })
        } else {
            None
        }
    }

    /// Count a finished month. Call once per month, before close_month.
    pub fn begin_month_close(&mut self) {
        self.months_closed += 1;
    }

    /// Close the month for one farm: record it, run the economic policy,
    /// pay any distribution and reset the monthly trackers.
    pub fn close_month(&self, date: NaiveDate, farm: &mut FarmState) -> (MonthlyFarmRecord, Vec<SimEvent>) {
        let mut events = Vec::new();
        let months = self.months_closed.max(1) as f64;
        let month_cost = farm.month_totals.cost();
        let decision = farm.policies.economic.decide(&EconomicPolicyContext {
            cash: farm.cash,
            avg_monthly_cost: farm.run_totals.cost() / months,
            month_revenue: farm.month_totals.revenue(),
            month_cost,
        });

        let distribution = decision.distribution.max(0.0);
        if distribution > 0.0 {
            farm.cash -= distribution;
            farm.month_totals.distributions += distribution;
            farm.year_totals.distributions += distribution;
            farm.run_totals.distributions += distribution;
            events.push(SimEvent::DistributionPaid {
                date,
                farm_id: farm.id.clone(),
                amount: distribution,
                policy: decision.policy_name.to_string(),
            });
        }

        let t = &farm.month_totals;
        let record = MonthlyFarmRecord {
            year: date.year(),
            month: date.month(),
            farm_id: farm.id.clone(),
            crop_revenue: t.crop_revenue,
            processed_revenue: t.processed_revenue,
            water_cost: t.water_cost,
            energy_cost: t.energy_cost,
            labor_cost: t.labor_cost,
            input_cost: t.input_cost,
            shared_opex: t.shared_opex,
            net_income: t.revenue() - month_cost,
            water_m3: t.water_m3,
            groundwater_m3: t.groundwater_m3,
            municipal_m3: farm.monthly.municipal_m3,
            energy_kwh: t.energy_kwh,
            distribution,
            economic_policy_reason: decision.reason,
            ending_cash: farm.cash,
            insolvent: farm.insolvent,
        };

        farm.month_totals = FarmPeriodTotals::default();
        farm.monthly = Default::default();
        (record, events)
    }

    /// Close the year for one farm and reset its yearly totals.
    pub fn close_year(&self, date: NaiveDate, farm: &mut FarmState) -> YearlyFarmRecord {
        let t = &farm.year_totals;
        let record = YearlyFarmRecord {
            year: date.year(),
            farm_id: farm.id.clone(),
            harvest_kg: t.harvest_kg,
            harvests: t.harvests,
            avg_yield_ratio: (t.harvests > 0).then(|| t.yield_ratio_sum / t.harvests as f64),
            revenue: t.revenue(),
            cost: t.cost(),
            net_income: t.revenue() - t.cost(),
            water_m3: t.water_m3,
            groundwater_share: if t.water_m3 > 0.0 { t.groundwater_m3 / t.water_m3 } else { 0.0 },
            unmet_water_m3: t.unmet_water_m3,
            distributions: t.distributions,
            ending_cash: farm.cash,
            min_cash: t.min_cash.unwrap_or(farm.cash),
        };
        farm.year_totals = FarmPeriodTotals::default();
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ScenarioConfig, policy::PolicyRegistry, types::AllocationMethod};

    fn farm(id: &str, area: f64, cash: f64) -> FarmState {
        let mut config = ScenarioConfig::default_test().farms[0].clone();
        config.id = id.into();
        config.area_ha = area;
        config.initial_cash = cash;
        let policies = PolicyRegistry::for_farm(&config.policies).unwrap();
        FarmState::new(&config, policies, Vec::new())
    }

    fn accountant(method: AllocationMethod) -> EconomicAccountant {
        let mut config = ScenarioConfig::default_test().economics;
        config.shared_cost_method = method;
        EconomicAccountant::new(&config)
    }

    #[test]
    fn usage_split_is_equal_before_any_water() {
        let farms = vec![farm("a", 10.0, 0.0), farm("b", 30.0, 0.0)];
        let split = accountant(AllocationMethod::UsageProportional).allocate_shared(&farms, 100.0);
        assert_eq!(split, vec![50.0, 50.0]);
    }

    #[test]
    fn area_split_follows_area() {
        let farms = vec![farm("a", 10.0, 0.0), farm("b", 30.0, 0.0)];
        let split = accountant(AllocationMethod::AreaProportional).allocate_shared(&farms, 100.0);
        assert_eq!(split, vec![25.0, 75.0]);
    }

    #[test]
    fn daily_cash_identity() {
        let acc = accountant(AllocationMethod::Equal);
        let mut f = farm("a", 10.0, 1_000.0);
        let flows = FarmDayFlows {
            crop_revenue: 100.0,
            processed_revenue: 50.0,
            water_cost: 30.0,
            processing_energy_kwh: 10.0,
            processing_labor_cost: 5.0,
            ..Default::default()
        };
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let (s, event) = acc.settle_day(date, &mut f, &flows, 0.2, 7.0);
        // labor 2.0 × 10 ha + 5, no crops planted, energy 10 × 0.2
        assert_eq!(s.labor_cost, 25.0);
        assert_eq!(s.input_cost, 0.0);
        assert!((s.energy_cost - 2.0).abs() < 1e-12);
        assert!((f.cash - (1_000.0 + 150.0 - 30.0 - 2.0 - 25.0 - 7.0)).abs() < 1e-9);
        assert!(event.is_none());
    }

    #[test]
    fn negative_cash_flags_insolvency_once() {
        let acc = accountant(AllocationMethod::Equal);
        let mut f = farm("a", 10.0, 10.0);
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let flows = FarmDayFlows::default();
        let (_, first) = acc.settle_day(date, &mut f, &flows, 0.0, 0.0);
        let (_, second) = acc.settle_day(date, &mut f, &flows, 0.0, 0.0);
        assert!(f.insolvent);
        assert!(matches!(first, Some(SimEvent::FarmInsolvent { .. })));
        assert!(second.is_none());
    }

    #[test]
    fn month_close_resets_trackers_and_pays_distribution() {
        let mut acc = accountant(AllocationMethod::Equal);
        let mut f = farm("a", 10.0, 50_000.0);
        f.monthly.municipal_m3 = 500.0;
        let date = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        acc.settle_day(date, &mut f, &FarmDayFlows::default(), 0.0, 0.0);

        acc.begin_month_close();
        let (record, events) = acc.close_month(date, &mut f);
        assert_eq!(record.municipal_m3, 500.0);
        assert_eq!(f.monthly.municipal_m3, 0.0);
        assert_eq!(f.month_totals, FarmPeriodTotals::default());
        // balanced: half of everything above 3 months of cost
        assert!(record.distribution > 0.0);
        assert_eq!(events.len(), 1);
        assert!((record.ending_cash + record.distribution - (50_000.0 - 20.0)).abs() < 1e-9);
    }
}
