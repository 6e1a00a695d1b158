//! Community energy dispatch across whole runs.

use farmsim_core::{config::ScenarioConfig, data::ReferenceData, engine::SimEngine};

fn run(run_id: &str, config: ScenarioConfig, days: u64) -> SimEngine {
    let mut engine =
        SimEngine::build_test_with(run_id.into(), config, ReferenceData::default_test()).unwrap();
    engine.run_days(days).unwrap();
    engine
}

/// Island system: no grid, no renewables, no battery, a 100 kW diesel set.
fn diesel_island(household_kwh: f64) -> ScenarioConfig {
    let mut config = ScenarioConfig::default_test();
    config.energy.grid.enabled = false;
    config.energy.pv_capacity_kw = 0.0;
    config.energy.wind_capacity_kw = 0.0;
    config.energy.battery.capacity_kwh = 0.0;
    config.energy.generator.capacity_kw = 100.0;
    config.energy.generator.min_load_fraction = 0.30;
    config.energy.generator.willans_a = 0.06;
    config.energy.generator.willans_b = 0.20;
    config.energy.generator.fuel_price_per_l = 1.1;
    config.community.household_kwh_per_day = household_kwh;
    config
}

#[test]
fn energy_balance_closes_every_day() {
    let mut engine = SimEngine::build_test("energy-identity".into()).unwrap();
    engine.run_to_end().unwrap();
    let store = engine.store();

    let residual = store.max_energy_residual("energy-identity").unwrap();
    assert!(residual < 1e-6, "max residual {residual} kWh");

    for d in &engine.state().daily_community_records {
        let supply = d.pv_kwh
            + d.wind_kwh
            + d.battery_discharge_kwh
            + d.grid_import_kwh
            + d.generator_kwh
            + d.unmet_kwh;
        let uses = d.demand_kwh + d.grid_export_kwh + d.battery_charge_kwh + d.curtailed_kwh;
        assert!((supply - uses).abs() < 1e-6, "{}: supply {supply} vs uses {uses}", d.date);
        let parts = d.irrigation_kwh
            + d.community_water_kwh
            + d.processing_kwh
            + d.household_kwh
            + d.buildings_kwh;
        assert!((parts - d.demand_kwh).abs() < 1e-9);
    }
}

#[test]
fn battery_soc_stays_within_limits() {
    let mut engine = SimEngine::build_test("energy-soc".into()).unwrap();
    engine.run_to_end().unwrap();

    let (min, max) = engine.store().battery_soc_range("energy-soc").unwrap();
    assert!(min >= 0.1 - 1e-9, "soc fell to {min}");
    assert!(max <= 0.95 + 1e-9, "soc rose to {max}");
}

#[test]
fn unbounded_grid_leaves_nothing_unmet() {
    let mut config = ScenarioConfig::default_test();
    config.community.household_kwh_per_day = 2_000.0;
    let engine = run("energy-grid", config, 90);

    assert_eq!(engine.store().event_count("energy-grid", "energy_unmet").unwrap(), 0);
    assert!(engine.state().community_run.grid_import_kwh > 0.0);
    assert_eq!(engine.state().community_run.unmet_kwh, 0.0);
}

#[test]
fn light_load_runs_the_generator_short_at_its_floor() {
    // 10 % of 100 kW over 24 h, in January before anything is planted.
    let engine = run("energy-diesel", diesel_island(240.0), 31);
    let store = engine.store();

    assert_eq!(store.event_count("energy-diesel", "generator_dispatched").unwrap(), 31);
    for d in &engine.state().daily_community_records {
        assert!((d.demand_kwh - 240.0).abs() < 1e-9);
        assert!((d.generator_kwh - 240.0).abs() < 1e-9);
        assert!((d.generator_hours - 8.0).abs() < 1e-9);
        // 100 kW × 8 h × (0.06 + 0.20 × 0.30)
        assert!((d.generator_fuel_l - 96.0).abs() < 1e-9);
        assert_eq!(d.unmet_kwh, 0.0);
        // 96 L × 1.1 over 240 kWh
        assert!((d.blended_rate_per_kwh - 0.44).abs() < 1e-9);
    }
}

#[test]
fn load_beyond_every_source_is_reported_unmet() {
    // 100 kW × 24 h = 2 400 kWh is all the generator can give.
    let engine = run("energy-short", diesel_island(3_000.0), 10);
    let store = engine.store();

    assert_eq!(store.event_count("energy-short", "energy_unmet").unwrap(), 10);
    for d in &engine.state().daily_community_records {
        assert!((d.generator_kwh - 2_400.0).abs() < 1e-9);
        assert!((d.unmet_kwh - 600.0).abs() < 1e-9);
        assert!(d.balance_residual_kwh.abs() < 1e-9);
    }
}

#[test]
fn renewable_share_is_a_fraction() {
    let mut engine = SimEngine::build_test("energy-share".into()).unwrap();
    let snapshot = engine.run_to_end().unwrap();

    let share = snapshot.community.renewable_share;
    assert!((0.0..=1.0).contains(&share), "renewable share {share}");
    let years = engine.store().yearly_community_records("energy-share").unwrap();
    assert!((years[0].renewable_share - share).abs() < 1e-12);
}
