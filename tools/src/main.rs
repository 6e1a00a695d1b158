//! sim-runner: headless runner for the collective farm simulation.
//!
//! Usage:
//!   sim-runner --scenario data/scenario.json --seed 12345 --db run.db
//!   sim-runner --reference tables.json --days 90 --final-out final.json

use anyhow::{Context, Result};
use farmsim_core::{
    config::ScenarioConfig,
    data::{DataProvider, ReferenceData},
    engine::SimEngine,
    snapshot::FinalSnapshot,
    store::SimStore,
    synthetic_data::SyntheticWeather,
};
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let scenario = str_arg(&args, "--scenario").unwrap_or("./data/scenario.json");
    let reference = str_arg(&args, "--reference");
    let db = str_arg(&args, "--db").unwrap_or(":memory:");
    let days = str_arg(&args, "--days")
        .map(|d| d.parse::<u64>().with_context(|| format!("--days {d}")))
        .transpose()?;
    let final_out = str_arg(&args, "--final-out");

    let config = ScenarioConfig::load(scenario)?;

    println!("farmsim — sim-runner");
    println!("  scenario:  {} ({scenario})", config.name);
    println!("  period:    {} to {}", config.start_date, config.end_date);
    println!("  farms:     {}", config.farms.len());
    println!("  reference: {}", reference.unwrap_or("synthetic"));
    println!("  seed:      {seed}");
    println!("  db:        {db}");
    println!("  started:   {}", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
    println!();

    let data: Box<dyn DataProvider> = match reference {
        Some(path) => Box::new(ReferenceData::load(path)?),
        None => Box::new(SyntheticWeather::generate(&config, seed)?),
    };

    let store = if db == ":memory:" {
        SimStore::in_memory()?
    } else {
        SimStore::open(db)?
    };
    store.migrate()?;

    let run_id = format!("run-{}", uuid::Uuid::new_v4());
    store.insert_run(&run_id, seed, env!("CARGO_PKG_VERSION"))?;

    let mut engine = SimEngine::new(run_id.clone(), config, data, store)?;
    let started = std::time::Instant::now();
    let snapshot = match days {
        Some(n) => {
            engine.run_days(n)?;
            engine.final_snapshot()
        }
        None => engine.run_to_end()?,
    };
    log::info!(
        "run={run_id} finished {} day(s) in {:.2}s",
        snapshot.days_simulated,
        started.elapsed().as_secs_f64()
    );

    print_summary(&engine, &snapshot)?;

    if let Some(path) = final_out {
        let json = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(path, json).with_context(|| format!("Cannot write {path}"))?;
        println!();
        println!("final snapshot written to {path}");
    }
    Ok(())
}

fn print_summary(engine: &SimEngine, snapshot: &FinalSnapshot) -> Result<()> {
    let store = engine.store();
    let run_id = &engine.run_id;
    let community = &snapshot.community;

    println!("=== RUN SUMMARY ===");
    println!("  run_id:          {run_id}");
    println!("  days simulated:  {}", snapshot.days_simulated);
    if let Some(last) = snapshot.last_date {
        println!("  last date:       {last}");
    }
    println!("  energy demand:   {:.0} kWh", community.totals.demand_kwh);
    println!("  renewable share: {:.1}%", community.renewable_share * 100.0);
    println!("  unmet energy:    {:.0} kWh", community.totals.unmet_kwh);
    println!("  grid import:     {:.0} kWh", community.totals.grid_import_kwh);
    println!("  diesel fuel:     {:.0} L", community.totals.generator_fuel_l);
    println!("  aquifer drawn:   {:.0} m3", community.aquifer_cumulative_m3);
    println!("  forced sales:    {:.0} kg", community.totals.forced_sale_kg);
    println!("  inventory left:  {:.0} kg", community.inventory_kg);

    println!();
    println!("=== FARMS ===");
    for farm in &snapshot.farms {
        let water = store.farm_water_totals(run_id, &farm.farm_id)?;
        let yield_ratio = farm
            .avg_yield_ratio
            .map(|r| format!("{r:.3}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {} | cash {:.0}{} | net {:.0} | harvest {:.0} kg (yield ratio {yield_ratio}) | water {:.0} m3, {:.0}% groundwater, {:.0} m3 unmet",
            farm.farm_id,
            farm.cash,
            if farm.insolvent { " (INSOLVENT)" } else { "" },
            farm.net_income,
            farm.totals.harvest_kg,
            water.groundwater_m3 + water.municipal_m3,
            farm.groundwater_share * 100.0,
            water.unmet_m3,
        );
    }

    let years = store.yearly_community_records(run_id)?;
    if !years.is_empty() {
        println!();
        println!("=== YEARS ===");
        for y in &years {
            let remaining = y
                .aquifer_years_remaining
                .map(|r| format!("{r:.1} y"))
                .unwrap_or_else(|| "n/a".to_string());
            println!(
                "  {} | demand {:.0} kWh | renewable {:.1}% | aquifer {:.0} m3 (remaining {remaining})",
                y.year,
                y.demand_kwh,
                y.renewable_share * 100.0,
                y.aquifer_extraction_m3,
            );
        }
    }
    Ok(())
}

fn str_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
