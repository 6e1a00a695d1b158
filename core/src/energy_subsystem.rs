//! Energy dispatch, once per day against the community's total demand.
//!
//! MERIT ORDER:
//!   PV → Wind → Battery discharge → Grid import → Diesel generator → Unmet
//!
//! The community energy policy only sets flags: battery reserve floor,
//! surplus export, and whether the battery discharges before or after
//! grid import. Surplus renewables charge the battery, then are exported
//! or curtailed.
//!
//! BALANCE (holds every day by construction, residual is recorded):
//!   PV + Wind + Discharge + Import + Diesel + Unmet
//!     = Demand + Export + Charge + Curtailment

use crate::{
    config::{EnergySystemConfig, GeneratorConfig},
    data::CapacityFactors,
    event::SimEvent,
    policy::{DischargePriority, EnergyFlags, EnergyPolicy, EnergyPolicyContext},
    state::EnergyState,
};
use chrono::NaiveDate;

const HOURS_PER_DAY: f64 = 24.0;
const KWH_EPSILON: f64 = 1e-9;

/// Everything that draws power on one day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DemandBreakdown {
    pub irrigation_kwh: f64,
    pub community_water_kwh: f64,
    pub processing_kwh: f64,
    pub household_kwh: f64,
    pub buildings_kwh: f64,
}

impl DemandBreakdown {
    pub fn total(&self) -> f64 {
        self.irrigation_kwh
            + self.community_water_kwh
            + self.processing_kwh
            + self.household_kwh
            + self.buildings_kwh
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GeneratorDispatch {
    pub energy_kwh: f64,
    pub runtime_hours: f64,
    pub load_fraction: f64,
    pub fuel_l: f64,
}

/// Serve up to `energy_kwh` from the generator.
///
/// Willans line: fuel per hour = capacity × (a + b × load_fraction).
/// Spread over the full runtime the load would fall below the minimum,
/// the generator instead runs fewer hours at exactly the minimum load.
pub fn dispatch_generator(config: &GeneratorConfig, energy_kwh: f64) -> GeneratorDispatch {
    let max_hours = config.max_runtime_hours.min(HOURS_PER_DAY);
    if config.capacity_kw <= 0.0 || energy_kwh <= 0.0 || max_hours <= 0.0 {
        return GeneratorDispatch::default();
    }
    let served = energy_kwh.min(config.capacity_kw * max_hours);
    let spread_load = served / (config.capacity_kw * max_hours);
    let (load_fraction, runtime_hours) = if spread_load >= config.min_load_fraction {
        (spread_load, max_hours)
    } else {
        let load = config.min_load_fraction;
        (load, served / (config.capacity_kw * load))
    };
    let fuel_l = config.capacity_kw * runtime_hours * (config.willans_a + config.willans_b * load_fraction);
    GeneratorDispatch { energy_kwh: served, runtime_hours, load_fraction, fuel_l }
}

/// The result of one day's dispatch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchResult {
    pub demand_kwh: f64,
    pub pv_kwh: f64,
    pub wind_kwh: f64,
    pub battery_discharge_kwh: f64,
    pub battery_charge_kwh: f64,
    pub grid_import_kwh: f64,
    pub grid_export_kwh: f64,
    pub generator: GeneratorDispatch,
    pub curtailed_kwh: f64,
    pub unmet_kwh: f64,
    pub balance_residual_kwh: f64,
    pub battery_soc: f64,
    /// Grid import plus fuel.
    pub cost: f64,
    pub export_revenue: f64,
    pub policy_reason: String,
}

impl DispatchResult {
    /// Average cost of each kWh actually served; 0 when nothing was served.
    pub fn blended_rate_per_kwh(&self) -> f64 {
        let served = self.demand_kwh - self.unmet_kwh;
        if served > KWH_EPSILON {
            self.cost / served
        } else {
            0.0
        }
    }
}

pub struct EnergyDispatcher {
    config: EnergySystemConfig,
    policy: EnergyPolicy,
}

impl EnergyDispatcher {
    pub fn new(config: &EnergySystemConfig, policy: EnergyPolicy) -> Self {
        Self { config: config.clone(), policy }
    }

    pub fn pv_kwh(&self, factors: &CapacityFactors) -> f64 {
        self.config.pv_capacity_kw * factors.pv.max(0.0) * HOURS_PER_DAY
    }

    pub fn wind_kwh(&self, factors: &CapacityFactors) -> f64 {
        self.config.wind_capacity_kw * factors.wind.max(0.0) * HOURS_PER_DAY
    }

    pub fn renewable_kwh(&self, factors: &CapacityFactors) -> f64 {
        self.pv_kwh(factors) + self.wind_kwh(factors)
    }

    pub fn dispatch(
        &self,
        date: NaiveDate,
        demand: &DemandBreakdown,
        factors: &CapacityFactors,
        energy: &mut EnergyState,
    ) -> (DispatchResult, Vec<SimEvent>) {
        let mut events = Vec::new();
        let battery = &self.config.battery;
        let grid = &self.config.grid;
        let total_demand = demand.total().max(0.0);
        let pv = self.pv_kwh(factors);
        let wind = self.wind_kwh(factors);
        let renewable = pv + wind;

        let flags: EnergyFlags = self.policy.decide(&EnergyPolicyContext {
            demand_kwh: total_demand,
            renewable_kwh: renewable,
            battery_soc: energy.battery_soc,
            grid_enabled: grid.enabled,
        });

        let mut remaining = (total_demand - renewable).max(0.0);
        let mut surplus = (renewable - total_demand).max(0.0);

        // One-way efficiency; a round trip loses (1 − rte).
        let one_way = battery.round_trip_efficiency.sqrt();
        let floor_soc = if flags.reserve_battery {
            battery.reserve_soc.max(energy.min_soc)
        } else {
            energy.min_soc
        };

        let mut discharge = 0.0;
        let mut import = 0.0;
        let mut discharge_step = |remaining: &mut f64, energy: &mut EnergyState| {
            if battery.capacity_kwh <= 0.0 || *remaining <= 0.0 {
                return;
            }
            let deliverable = (energy.battery_soc - floor_soc).max(0.0) * battery.capacity_kwh * one_way;
            let d = remaining.min(deliverable);
            energy.battery_soc -= d / one_way / battery.capacity_kwh;
            *remaining -= d;
            discharge += d;
        };
        let mut import_step = |remaining: &mut f64| {
            if !grid.enabled || *remaining <= 0.0 {
                return;
            }
            let cap = grid.max_import_kwh_per_day.unwrap_or(f64::INFINITY);
            let g = remaining.min(cap.max(0.0));
            *remaining -= g;
            import += g;
        };
        match flags.discharge_priority {
            DischargePriority::BeforeGrid => {
                discharge_step(&mut remaining, &mut *energy);
                import_step(&mut remaining);
            }
            DischargePriority::AfterGrid => {
                import_step(&mut remaining);
                discharge_step(&mut remaining, &mut *energy);
            }
        }

        let generator = dispatch_generator(&self.config.generator, remaining);
        remaining -= generator.energy_kwh;
        energy.generator_on = generator.energy_kwh > 0.0;
        if generator.energy_kwh > 0.0 {
            events.push(SimEvent::GeneratorDispatched {
                date,
                energy_kwh: generator.energy_kwh,
                runtime_hours: generator.runtime_hours,
                load_fraction: generator.load_fraction,
                fuel_l: generator.fuel_l,
            });
        }
        let unmet = remaining.max(0.0);

        // Surplus: battery first, then export or curtail.
        let mut charge = 0.0;
        if battery.capacity_kwh > 0.0 && surplus > 0.0 {
            let headroom = (energy.max_soc - energy.battery_soc).max(0.0) * battery.capacity_kwh / one_way;
            charge = surplus.min(headroom);
            energy.battery_soc += charge * one_way / battery.capacity_kwh;
            surplus -= charge;
        }
        let (export, curtailed) = if flags.export_surplus { (surplus, 0.0) } else { (0.0, surplus) };
        energy.clamp_soc();

        let supply = pv + wind + discharge + import + generator.energy_kwh + unmet;
        let uses = total_demand + export + charge + curtailed;
        let residual = supply - uses;

        if unmet > KWH_EPSILON {
            log::warn!("date={date} energy unmet {unmet:.1} kWh of {total_demand:.1} kWh demand");
            events.push(SimEvent::EnergyUnmet { date, unmet_kwh: unmet });
        }
        log::debug!(
            "date={date} dispatch pv={pv:.1} wind={wind:.1} batt={discharge:.1} grid={import:.1} diesel={:.1} soc={:.3}",
            generator.energy_kwh,
            energy.battery_soc
        );

        let result = DispatchResult {
            demand_kwh: total_demand,
            pv_kwh: pv,
            wind_kwh: wind,
            battery_discharge_kwh: discharge,
            battery_charge_kwh: charge,
            grid_import_kwh: import,
            grid_export_kwh: export,
            generator,
            curtailed_kwh: curtailed,
            unmet_kwh: unmet,
            balance_residual_kwh: residual,
            battery_soc: energy.battery_soc,
            cost: import * grid.import_price_per_kwh + generator.fuel_l * self.config.generator.fuel_price_per_l,
            export_revenue: export * grid.export_price_per_kwh,
            policy_reason: flags.reason,
        };
        (result, events)
    }
}
