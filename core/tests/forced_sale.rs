//! The forced-sale umbrella rule: expired stock first, then only the stock
//! above storage capacity, oldest first, at the distress discount.

use chrono::NaiveDate;
use farmsim_core::{
    config::{PolicySpec, ScenarioConfig},
    data::ReferenceData,
    engine::SimEngine,
    inventory_subsystem::InventoryLedger,
    types::{PerProduct, ProductType},
};

fn d(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, month, day).unwrap()
}

#[test]
fn expiry_sale_that_clears_the_overflow_is_the_only_sale() {
    let data = ReferenceData::default_test();
    let mut storage = ScenarioConfig::default_test().storage;
    storage.capacity_kg = PerProduct { fresh: 1_000.0, dried: 1_000.0, canned: 1_000.0, packaged: 1_000.0 };

    let mut ledger = InventoryLedger::new();
    ledger.add_batch("tomato", ProductType::Fresh, d(6, 1), 7, &[("farm_a".into(), 600.0)]);
    ledger.add_batch("tomato", ProductType::Fresh, d(6, 5), 7, &[("farm_a".into(), 600.0)]);

    // 1 200 kg against 1 000 kg of capacity, and the first tranche expires today.
    let sales = ledger.forced_sale_sweep(d(6, 8), &storage, &data).unwrap();
    let sold: f64 = sales.iter().map(|s| s.quantity_kg).sum();
    assert_eq!(sales.len(), 1);
    assert_eq!(sold, 600.0);
    assert!(sales[0].expired && sales[0].forced);
    // 0.60 × (1 − 0.3)
    assert!((sales[0].price_per_kg - 0.42).abs() < 1e-12);
    assert!((sales[0].revenue - 252.0).abs() < 1e-9);

    assert_eq!(ledger.stock_kg(ProductType::Fresh), 600.0);
    assert_eq!(ledger.tranches()[0].harvest_date, d(6, 5));
}

#[test]
fn overflow_revenue_follows_ownership() {
    let data = ReferenceData::default_test();
    let mut storage = ScenarioConfig::default_test().storage;
    storage.capacity_kg.fresh = 500.0;

    let mut ledger = InventoryLedger::new();
    ledger.add_batch(
        "tomato",
        ProductType::Fresh,
        d(6, 1),
        7,
        &[("farm_a".into(), 750.0), ("farm_b".into(), 250.0)],
    );
    let sales = ledger.forced_sale_sweep(d(6, 2), &storage, &data).unwrap();
    assert_eq!(sales.len(), 1);
    assert!(!sales[0].expired);
    assert_eq!(sales[0].quantity_kg, 500.0);

    let by_farm: Vec<(&str, f64)> = sales[0].by_farm.iter().map(|(f, r)| (f.as_str(), *r)).collect();
    assert_eq!(by_farm.len(), 2);
    // 375 kg and 125 kg at 0.42
    assert_eq!(by_farm[0].0, "farm_a");
    assert!((by_farm[0].1 - 157.5).abs() < 1e-9);
    assert_eq!(by_farm[1].0, "farm_b");
    assert!((by_farm[1].1 - 52.5).abs() < 1e-9);
    assert!((ledger.owned_kg("farm_a", "tomato", ProductType::Fresh) - 375.0).abs() < 1e-9);
}

#[test]
fn harvest_beyond_fresh_capacity_is_forced_on_harvest_day() {
    // The season's 256 500 kg arrive on 4 July against 20 000 kg of storage.
    let mut engine = SimEngine::build_test("forced-harvest".into()).unwrap();
    engine.run_to_end().unwrap();

    let day = engine
        .state()
        .daily_community_records
        .iter()
        .find(|c| c.date == d(7, 4))
        .expect("harvest day");
    assert!((day.forced_sale_kg - 236_500.0).abs() < 1e-6, "forced {}", day.forced_sale_kg);
    assert!((day.market_sale_kg - 20_000.0).abs() < 1e-6, "market {}", day.market_sale_kg);
    assert!(day.inventory_kg.abs() < 1e-6);

    let store = engine.store();
    assert_eq!(store.event_count("forced-harvest", "forced_sale").unwrap(), 1);

    let farm = engine
        .state()
        .daily_farm_records
        .iter()
        .find(|r| r.date == d(7, 4))
        .expect("farm row");
    // 236 500 kg at 0.42 forced, 20 000 kg at 0.60 on the market
    assert!((farm.forced_sale_revenue - 99_330.0).abs() < 1e-6);
    assert!((farm.crop_revenue - 111_330.0).abs() < 1e-6);
    assert_eq!(farm.processed_revenue, 0.0);
}

#[test]
fn held_stock_expires_into_a_forced_sale() {
    let mut config = ScenarioConfig::default_test();
    // Hold fresh stock for a price the flat table never reaches.
    config.farms[0].policies.market = PolicySpec::named("hold_for_peak")
        .with_param("price_ratio", 1.5)
        .with_param("sell_days_before_expiry", 0.0);
    config.storage.capacity_kg.fresh = 1e9;

    let mut engine =
        SimEngine::build_test_with("forced-expiry".into(), config, ReferenceData::default_test())
            .unwrap();
    engine.run_to_end().unwrap();

    let sales: Vec<serde_json::Value> = (0..=engine.clock.current_tick)
        .flat_map(|tick| engine.store_events_for_tick("forced-expiry", tick).unwrap())
        .filter(|e| e.event_type == "forced_sale")
        .map(|e| serde_json::from_str(&e.payload).unwrap())
        .collect();
    assert_eq!(sales.len(), 1);
    assert_eq!(sales[0]["expired"].as_bool(), Some(true));
    // Harvested 4 July with a 7-day shelf life.
    assert_eq!(sales[0]["date"].as_str(), Some("2024-07-11"));
    assert!((sales[0]["quantity_kg"].as_f64().unwrap() - 256_500.0).abs() < 1e-6);
}
