//! Reference data — the read-only lookups the engine consumes.
//!
//! The engine never mutates reference data and never reads it from disk
//! mid-run: a DataProvider is injected into the engine at construction.
//!
//! LOOKUP RULES (explicit, never a silent zero):
//!   - A date outside a series resolves to the nearest available date.
//!     Equidistant dates resolve to the earlier one.
//!   - A day-of-season past the end of a demand series resolves to its
//!     last entry.
//!   - A series that does not exist at all is a MissingSeries error.

use crate::{
    error::{SimError, SimResult},
    types::{CropName, ProductType},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Daily mean output as a fraction of nameplate capacity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapacityFactors {
    pub pv:   f64,
    pub wind: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YieldReference {
    pub potential_kg_per_ha:   f64,
    pub weather_stress_factor: f64,
}

impl YieldReference {
    /// Expected yield before water stress and farm management effects.
    pub fn expected_kg_per_ha(&self) -> f64 {
        self.potential_kg_per_ha * self.weather_stress_factor
    }
}

/// FAO-56 growth stage lengths in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDurations {
    pub initial:     u32,
    pub development: u32,
    pub mid_season:  u32,
    pub late_season: u32,
}

impl StageDurations {
    pub fn total(&self) -> u32 {
        self.initial + self.development + self.mid_season + self.late_season
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropParameters {
    pub crop:   CropName,
    pub stages: StageDurations,
    /// FAO yield response factor.
    pub ky:     f64,
}

/// The read-only lookup contract.
pub trait DataProvider {
    fn crop_parameters(&self, crop: &str) -> SimResult<CropParameters>;

    fn capacity_factors(&self, date: NaiveDate) -> SimResult<CapacityFactors>;

    /// Irrigation demand in m³/ha for one day of a season.
    fn irrigation_m3_per_ha(
        &self,
        crop: &str,
        planting_date: NaiveDate,
        day_of_season: u32,
    ) -> SimResult<f64>;

    fn yield_reference(&self, crop: &str, planting_date: NaiveDate) -> SimResult<YieldReference>;

    fn price_per_kg(&self, crop: &str, product: ProductType, date: NaiveDate) -> SimResult<f64>;

    /// Long-run mean price, the baseline market policies compare against.
    fn reference_price_per_kg(&self, crop: &str, product: ProductType) -> SimResult<f64>;
}

/// Resolve `date` against a dated series by the nearest-date rule.
pub fn nearest<V>(series: &BTreeMap<NaiveDate, V>, date: NaiveDate) -> Option<&V> {
    let before = series.range(..=date).next_back();
    let after = series.range(date..).next();
    match (before, after) {
        (Some((bd, bv)), Some((ad, av))) => {
            if date - *bd <= *ad - date {
                Some(bv)
            } else {
                Some(av)
            }
        }
        (Some((_, v)), None) | (None, Some((_, v))) => Some(v),
        (None, None) => None,
    }
}

// ── In-memory implementation ───────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    crops:            BTreeMap<CropName, CropParameters>,
    capacity_factors: BTreeMap<NaiveDate, CapacityFactors>,
    irrigation:       BTreeMap<CropName, BTreeMap<NaiveDate, Vec<f64>>>,
    yields:           BTreeMap<CropName, BTreeMap<NaiveDate, YieldReference>>,
    prices:           BTreeMap<(CropName, ProductType), BTreeMap<NaiveDate, f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityFactorRow {
    pub date: NaiveDate,
    pub pv:   f64,
    pub wind: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrrigationRow {
    pub crop:          CropName,
    pub planting_date: NaiveDate,
    pub m3_per_ha:     Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YieldRow {
    pub crop:                  CropName,
    pub planting_date:         NaiveDate,
    pub potential_kg_per_ha:   f64,
    pub weather_stress_factor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceRow {
    pub crop:         CropName,
    pub product_type: ProductType,
    pub date:         NaiveDate,
    pub price_per_kg: f64,
}

/// On-disk layout: flat row lists, one per table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceDataFile {
    pub crops:            Vec<CropParameters>,
    pub capacity_factors: Vec<CapacityFactorRow>,
    pub irrigation:       Vec<IrrigationRow>,
    pub yields:           Vec<YieldRow>,
    pub prices:           Vec<PriceRow>,
}

impl ReferenceData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file produced by the pre-computation scripts.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let file: ReferenceDataFile = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        Ok(Self::from_file(file))
    }

    pub fn from_file(file: ReferenceDataFile) -> Self {
        let mut data = Self::new();
        for crop in file.crops {
            data.insert_crop(crop);
        }
        for row in file.capacity_factors {
            data.insert_capacity_factors(row.date, CapacityFactors { pv: row.pv, wind: row.wind });
        }
        for row in file.irrigation {
            data.insert_irrigation(&row.crop, row.planting_date, row.m3_per_ha);
        }
        for row in file.yields {
            data.insert_yield(
                &row.crop,
                row.planting_date,
                YieldReference {
                    potential_kg_per_ha:   row.potential_kg_per_ha,
                    weather_stress_factor: row.weather_stress_factor,
                },
            );
        }
        for row in file.prices {
            data.insert_price(&row.crop, row.product_type, row.date, row.price_per_kg);
        }
        data
    }

    pub fn insert_crop(&mut self, params: CropParameters) {
        self.crops.insert(params.crop.clone(), params);
    }

    pub fn insert_capacity_factors(&mut self, date: NaiveDate, factors: CapacityFactors) {
        self.capacity_factors.insert(date, factors);
    }

    pub fn insert_irrigation(&mut self, crop: &str, planting_date: NaiveDate, m3_per_ha: Vec<f64>) {
        self.irrigation
            .entry(crop.to_string())
            .or_default()
            .insert(planting_date, m3_per_ha);
    }

    pub fn insert_yield(&mut self, crop: &str, planting_date: NaiveDate, reference: YieldReference) {
        self.yields
            .entry(crop.to_string())
            .or_default()
            .insert(planting_date, reference);
    }

    pub fn insert_price(&mut self, crop: &str, product: ProductType, date: NaiveDate, price: f64) {
        self.prices
            .entry((crop.to_string(), product))
            .or_default()
            .insert(date, price);
    }

    fn price_series(&self, crop: &str, product: ProductType) -> SimResult<&BTreeMap<NaiveDate, f64>> {
        self.prices
            .get(&(crop.to_string(), product))
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SimError::MissingSeries {
                series: format!("price {crop}/{}", product.name()),
            })
    }

    /// Small fixed dataset for tests: tomato only, constant weather.
    pub fn default_test() -> Self {
        let mut data = Self::new();
        let date = |m: u32, d: u32| NaiveDate::from_ymd_opt(2024, m, d).expect("valid date");

        data.insert_crop(CropParameters {
            crop: "tomato".into(),
            stages: StageDurations { initial: 30, development: 40, mid_season: 45, late_season: 25 },
            ky: 1.05,
        });
        data.insert_capacity_factors(date(1, 1), CapacityFactors { pv: 0.20, wind: 0.25 });
        let demand: Vec<f64> = (0..140).map(|d| 20.0 + 0.25 * d as f64).collect();
        data.insert_irrigation("tomato", date(2, 15), demand);
        data.insert_yield(
            "tomato",
            date(2, 15),
            YieldReference { potential_kg_per_ha: 60_000.0, weather_stress_factor: 0.95 },
        );
        data.insert_price("tomato", ProductType::Fresh, date(1, 1), 0.60);
        data.insert_price("tomato", ProductType::Dried, date(1, 1), 4.00);
        data.insert_price("tomato", ProductType::Canned, date(1, 1), 1.50);
        data.insert_price("tomato", ProductType::Packaged, date(1, 1), 0.90);
        data
    }
}

impl DataProvider for ReferenceData {
    fn crop_parameters(&self, crop: &str) -> SimResult<CropParameters> {
        self.crops
            .get(crop)
            .cloned()
            .ok_or_else(|| SimError::UnknownCrop { crop: crop.to_string() })
    }

    fn capacity_factors(&self, date: NaiveDate) -> SimResult<CapacityFactors> {
        nearest(&self.capacity_factors, date)
            .copied()
            .ok_or_else(|| SimError::MissingSeries { series: "capacity_factors".into() })
    }

    fn irrigation_m3_per_ha(
        &self,
        crop: &str,
        planting_date: NaiveDate,
        day_of_season: u32,
    ) -> SimResult<f64> {
        let series = self
            .irrigation
            .get(crop)
            .and_then(|by_date| nearest(by_date, planting_date))
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SimError::MissingSeries { series: format!("irrigation {crop}") })?;
        let index = (day_of_season as usize).min(series.len() - 1);
        Ok(series[index])
    }

    fn yield_reference(&self, crop: &str, planting_date: NaiveDate) -> SimResult<YieldReference> {
        self.yields
            .get(crop)
            .and_then(|by_date| nearest(by_date, planting_date))
            .copied()
            .ok_or_else(|| SimError::MissingSeries { series: format!("yield {crop}") })
    }

    fn price_per_kg(&self, crop: &str, product: ProductType, date: NaiveDate) -> SimResult<f64> {
        let series = self.price_series(crop, product)?;
        nearest(series, date).copied().ok_or_else(|| SimError::MissingSeries {
            series: format!("price {crop}/{}", product.name()),
        })
    }

    fn reference_price_per_kg(&self, crop: &str, product: ProductType) -> SimResult<f64> {
        let series = self.price_series(crop, product)?;
        Ok(series.values().sum::<f64>() / series.len() as f64)
    }
}
