//! End-to-end run of the built-in single-farm tomato scenario.
//!
//! Farm A grows 5 ha of tomato planted on 15 Feb 2024 under fixed_schedule
//! irrigation and cheapest_source water. Municipal water undercuts
//! groundwater all year, so the crop is fully served from the mains.

use farmsim_core::engine::SimEngine;

/// Reference demand of the season: 140 days of (20 + 0.25·d) m³/ha on 5 ha.
fn expected_season_water() -> f64 {
    (0..140).map(|d| (20.0 + 0.25 * d as f64) * 5.0).sum()
}

#[test]
fn full_year_delivers_the_whole_reference_demand() {
    let mut engine = SimEngine::build_test("tomato-water".into()).unwrap();
    engine.run_to_end().unwrap();

    let water = engine.store().farm_water_totals("tomato-water", "farm_a").unwrap();
    let expected = expected_season_water();
    assert!((expected - 26_162.5).abs() < 1e-9);
    assert!((water.requested_m3 - expected).abs() < 1e-6, "requested {}", water.requested_m3);
    assert!((water.municipal_m3 - expected).abs() < 1e-6, "municipal {}", water.municipal_m3);
    assert_eq!(water.groundwater_m3, 0.0);
    assert_eq!(water.unmet_m3, 0.0);
}

#[test]
fn fully_watered_crop_yields_at_the_farm_factor() {
    let mut engine = SimEngine::build_test("tomato-yield".into()).unwrap();
    let snapshot = engine.run_to_end().unwrap();

    let years = engine.store().yearly_farm_records("tomato-yield").unwrap();
    assert_eq!(years.len(), 1);
    let year = &years[0];
    assert_eq!(year.harvests, 1);
    let ratio = year.avg_yield_ratio.expect("one harvest");
    assert!((ratio - 0.9).abs() < 1e-9, "yield ratio {ratio}");
    // 60 000 kg/ha × 0.95 weather × 5 ha × 0.9 farm factor
    assert!((year.harvest_kg - 256_500.0).abs() < 1e-6, "harvest {}", year.harvest_kg);

    let farm = snapshot.farm("farm_a").expect("farm in snapshot");
    assert!((farm.totals.harvest_kg - 256_500.0).abs() < 1e-6);
}

#[test]
fn harvest_event_reports_a_full_water_ratio() {
    let mut engine = SimEngine::build_test("tomato-events".into()).unwrap();
    engine.run_to_end().unwrap();
    let store = engine.store();

    assert_eq!(store.event_count("tomato-events", "crop_planted").unwrap(), 1);
    assert_eq!(store.event_count("tomato-events", "crop_harvested").unwrap(), 1);

    let harvest = (0..=engine.clock.current_tick)
        .flat_map(|tick| engine.store_events_for_tick("tomato-events", tick).unwrap())
        .find(|e| e.event_type == "crop_harvested")
        .expect("harvest event");
    let payload: serde_json::Value = serde_json::from_str(&harvest.payload).unwrap();
    assert_eq!(payload["water_ratio"].as_f64(), Some(1.0));
    assert_eq!(payload["date"].as_str(), Some("2024-07-04"));
}

#[test]
fn no_groundwater_is_drawn_when_the_mains_are_cheaper() {
    let mut engine = SimEngine::build_test("tomato-aquifer".into()).unwrap();
    let snapshot = engine.run_to_end().unwrap();

    assert_eq!(snapshot.community.aquifer_cumulative_m3, 0.0);
    let years = engine.store().yearly_community_records("tomato-aquifer").unwrap();
    assert_eq!(years.len(), 1);
    assert_eq!(years[0].aquifer_extraction_m3, 0.0);
    assert_eq!(years[0].aquifer_years_remaining, None);
}

#[test]
fn one_row_per_day_and_one_snapshot_per_month() {
    let mut engine = SimEngine::build_test("tomato-rows".into()).unwrap();
    let snapshot = engine.run_to_end().unwrap();
    let store = engine.store();

    // 2024 is a leap year.
    assert_eq!(snapshot.days_simulated, 366);
    assert_eq!(store.daily_farm_count("tomato-rows").unwrap(), 366);
    assert_eq!(store.daily_community_count("tomato-rows").unwrap(), 366);
    assert_eq!(store.snapshot_count("tomato-rows").unwrap(), 12);
    assert_eq!(store.monthly_farm_records("tomato-rows", "farm_a").unwrap().len(), 12);
    assert_eq!(store.event_count("tomato-rows", "month_closed").unwrap(), 12);
    assert_eq!(store.event_count("tomato-rows", "year_closed").unwrap(), 1);
    assert_eq!(store.event_count("tomato-rows", "run_initialized").unwrap(), 1);
}

#[test]
fn run_stops_at_the_end_date() {
    let mut engine = SimEngine::build_test("tomato-stop".into()).unwrap();
    engine.run_days(400).unwrap();

    assert!(engine.clock.is_finished());
    assert_eq!(engine.state().daily_community_records.len(), 366);
    assert_eq!(
        engine.state().current_date,
        chrono::NaiveDate::from_ymd_opt(2024, 12, 31)
    );
}

#[test]
fn run_is_initialized_once_across_resumes() {
    let mut engine = SimEngine::build_test("tomato-resume".into()).unwrap();
    engine.run_days(0).unwrap();
    engine.run_days(10).unwrap();
    engine.run_days(5).unwrap();

    let store = engine.store();
    assert_eq!(store.event_count("tomato-resume", "run_initialized").unwrap(), 1);
    assert_eq!(store.event_count("tomato-resume", "day_started").unwrap(), 15);
}
