//! Seeded synthetic reference data for demonstration runs.
//!
//! Builds a ReferenceData spanning a scenario from a small built-in crop
//! table: seasonal sinusoids for weather and prices plus Gaussian noise.
//! Each series draws from its own RngBank stream, so the same seed always
//! produces the same tables.

use crate::{
    config::{parse_month_day, ScenarioConfig},
    crop_subsystem::{planting_date_in_year, stage_for_day},
    data::{CapacityFactors, CropParameters, ReferenceData, StageDurations, YieldReference},
    error::{SimError, SimResult},
    rng::{RngBank, SeriesRng, SeriesSlot},
    state::GrowthStage,
    types::{PerProduct, ProductType},
};
use chrono::{Datelike, NaiveDate};
use std::f64::consts::PI;

/// Built-in agronomy for one crop.
struct CropProfile {
    name: &'static str,
    stages: StageDurations,
    ky: f64,
    potential_kg_per_ha: f64,
    /// Crop coefficient at initial, mid-season and end of season.
    kc: (f64, f64, f64),
    prices: PerProduct<f64>,
}

const fn stages(initial: u32, development: u32, mid_season: u32, late_season: u32) -> StageDurations {
    StageDurations { initial, development, mid_season, late_season }
}

const fn prices(fresh: f64, dried: f64, canned: f64, packaged: f64) -> PerProduct<f64> {
    PerProduct { fresh, dried, canned, packaged }
}

static CROPS: [CropProfile; 5] = [
    CropProfile {
        name: "tomato",
        stages: stages(30, 40, 45, 25),
        ky: 1.05,
        potential_kg_per_ha: 60_000.0,
        kc: (0.60, 1.15, 0.80),
        prices: prices(0.60, 4.00, 1.50, 0.90),
    },
    CropProfile {
        name: "potato",
        stages: stages(25, 30, 45, 30),
        ky: 1.10,
        potential_kg_per_ha: 40_000.0,
        kc: (0.50, 1.15, 0.75),
        prices: prices(0.40, 3.00, 1.20, 0.70),
    },
    CropProfile {
        name: "onion",
        stages: stages(15, 25, 70, 40),
        ky: 1.10,
        potential_kg_per_ha: 45_000.0,
        kc: (0.70, 1.05, 0.75),
        prices: prices(0.45, 3.50, 1.10, 0.75),
    },
    CropProfile {
        name: "kale",
        stages: stages(20, 25, 30, 10),
        ky: 0.95,
        potential_kg_per_ha: 25_000.0,
        kc: (0.70, 1.05, 0.95),
        prices: prices(1.20, 6.00, 2.00, 1.60),
    },
    CropProfile {
        name: "cucumber",
        stages: stages(20, 30, 40, 15),
        ky: 1.10,
        potential_kg_per_ha: 35_000.0,
        kc: (0.60, 1.00, 0.75),
        prices: prices(0.70, 4.50, 1.60, 1.00),
    },
];

fn profile(crop: &str) -> SimResult<&'static CropProfile> {
    CROPS
        .iter()
        .find(|c| c.name == crop)
        .ok_or_else(|| SimError::UnknownCrop { crop: crop.to_string() })
}

/// Seasonal phase in radians; 0 at the March equinox.
fn season(date: NaiveDate) -> f64 {
    2.0 * PI * (date.ordinal() as f64 - 80.0) / 365.0
}

/// Reference evapotranspiration in mm/day.
fn et0_mm(date: NaiveDate) -> f64 {
    5.0 + 2.0 * season(date).sin()
}

/// Crop coefficient for a day of the season, FAO-56 shape.
fn kc_for_day(profile: &CropProfile, day: u32) -> f64 {
    let (kc_ini, kc_mid, kc_end) = profile.kc;
    let s = &profile.stages;
    match stage_for_day(s, day) {
        GrowthStage::Initial | GrowthStage::Dormant => kc_ini,
        GrowthStage::Development => {
            let progress = (day - s.initial) as f64 / s.development.max(1) as f64;
            kc_ini + (kc_mid - kc_ini) * progress
        }
        GrowthStage::MidSeason => kc_mid,
        GrowthStage::LateSeason | GrowthStage::HarvestReady => {
            let start = s.initial + s.development + s.mid_season;
            let progress = (day.saturating_sub(start)) as f64 / s.late_season.max(1) as f64;
            kc_mid + (kc_end - kc_mid) * progress.min(1.0)
        }
    }
}

pub struct SyntheticWeather;

impl SyntheticWeather {
    /// Reference data covering every day, crop and planting date of `config`.
    pub fn generate(config: &ScenarioConfig, seed: u64) -> SimResult<ReferenceData> {
        let bank = RngBank::new(seed);
        let mut solar = bank.for_series(SeriesSlot::Solar);
        let mut wind = bank.for_series(SeriesSlot::Wind);
        let mut irrigation = bank.for_series(SeriesSlot::Irrigation);
        let mut yields = bank.for_series(SeriesSlot::Yield);
        let mut market = bank.for_series(SeriesSlot::Prices);

        let mut data = ReferenceData::new();
        let crops = config.crop_names();
        let profiles = crops
            .iter()
            .map(|c| profile(c))
            .collect::<SimResult<Vec<_>>>()?;
        for p in &profiles {
            data.insert_crop(CropParameters { crop: p.name.to_string(), stages: p.stages, ky: p.ky });
        }

        let mut date = config.start_date;
        while date <= config.end_date {
            let phase = season(date);
            let pv = 0.20 + 0.06 * phase.sin() + 0.03 * solar.standard_normal();
            let w = 0.25 - 0.05 * phase.sin() + 0.06 * wind.standard_normal();
            data.insert_capacity_factors(
                date,
                CapacityFactors { pv: pv.clamp(0.0, 1.0), wind: w.clamp(0.0, 1.0) },
            );
            date = match date.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }

        for farm in &config.farms {
            for crop in &farm.crops {
                let p = profile(&crop.crop)?;
                for text in &crop.planting_dates {
                    let month_day = parse_month_day(text).ok_or_else(|| {
                        SimError::config(format!("farms[{}].crops.planting_dates", farm.id), text.clone())
                    })?;
                    for year in config.start_date.year()..=config.end_date.year() {
                        let Some(planting) = planting_date_in_year(year, month_day) else {
                            continue;
                        };
                        insert_season(&mut data, p, planting, &mut irrigation, &mut yields);
                    }
                }
            }
        }

        let first_month = NaiveDate::from_ymd_opt(config.start_date.year(), config.start_date.month(), 1)
            .ok_or_else(|| SimError::config("start_date", "no first of month"))?;
        for p in &profiles {
            let mut month = first_month;
            while month <= config.end_date {
                // Fresh prices peak in late winter, when little is harvested.
                let seasonal = 1.0 - 0.15 * season(month).sin();
                for product in ProductType::ALL {
                    let noise = 1.0 + 0.05 * market.standard_normal();
                    let price = p.prices.get(product) * seasonal * noise;
                    data.insert_price(p.name, product, month, price.max(0.01));
                }
                month = match month.checked_add_months(chrono::Months::new(1)) {
                    Some(next) => next,
                    None => break,
                };
            }
        }

        log::debug!(
            "synthetic reference data: seed={seed} {} crop(s) {} to {}",
            profiles.len(),
            config.start_date,
            config.end_date
        );
        Ok(data)
    }
}

fn insert_season(
    data: &mut ReferenceData,
    p: &CropProfile,
    planting: NaiveDate,
    irrigation: &mut SeriesRng,
    yields: &mut SeriesRng,
) {
    let m3_per_ha = (0..p.stages.total())
        .map(|day| {
            let date = planting + chrono::Days::new(day as u64);
            let noise = 1.0 + 0.05 * irrigation.standard_normal();
            // 1 mm over one hectare is 10 m³.
            (et0_mm(date) * kc_for_day(p, day) * 10.0 * noise).max(0.0)
        })
        .collect();
    data.insert_irrigation(p.name, planting, m3_per_ha);

    let stress = (0.95 + 0.03 * yields.standard_normal()).clamp(0.7, 1.0);
    data.insert_yield(
        p.name,
        planting,
        YieldReference { potential_kg_per_ha: p.potential_kg_per_ha, weather_stress_factor: stress },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataProvider;

    #[test]
    fn same_seed_same_tables() {
        let config = ScenarioConfig::default_test();
        let a = SyntheticWeather::generate(&config, 11).unwrap();
        let b = SyntheticWeather::generate(&config, 11).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(a.capacity_factors(day).unwrap(), b.capacity_factors(day).unwrap());
        let planting = NaiveDate::from_ymd_opt(2024, 2, 15).unwrap();
        assert_eq!(
            a.irrigation_m3_per_ha("tomato", planting, 50).unwrap(),
            b.irrigation_m3_per_ha("tomato", planting, 50).unwrap()
        );
    }

    #[test]
    fn unknown_crop_is_rejected() {
        let mut config = ScenarioConfig::default_test();
        config.farms[0].crops[0].crop = "durian".into();
        assert!(matches!(
            SyntheticWeather::generate(&config, 1),
            Err(SimError::UnknownCrop { .. })
        ));
    }

    #[test]
    fn kc_rises_through_development() {
        let tomato = profile("tomato").unwrap();
        assert_eq!(kc_for_day(tomato, 0), 0.60);
        assert!(kc_for_day(tomato, 50) > 0.60);
        assert_eq!(kc_for_day(tomato, 80), 1.15);
    }
}
