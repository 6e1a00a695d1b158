//! Scenario configuration — the only input the engine reads.
//!
//! A ScenarioConfig is validated once, before any simulation state is
//! built, and is never mutated afterwards. Fields that select behaviour
//! (sharing rule, allocation method, insolvency policy, aquifer mode,
//! planting area mode) have no serde default: leaving one out is a load
//! error, not a silent choice.

use crate::{
    error::{SimError, SimResult},
    types::{AllocationMethod, CropName, FarmId, PerProduct},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ── Farms ──────────────────────────────────────────────────────────

/// A named policy plus its numeric parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySpec {
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

impl PolicySpec {
    pub fn named(name: &str) -> Self {
        Self { name: name.to_string(), params: BTreeMap::new() }
    }

    pub fn with_param(mut self, key: &str, value: f64) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }
}

/// Per-farm policy assignment, one per farm-level decision domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyAssignment {
    pub water:    PolicySpec,
    pub crop:     PolicySpec,
    pub food:     PolicySpec,
    pub market:   PolicySpec,
    pub economic: PolicySpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmCropConfig {
    pub crop: CropName,
    /// Fraction of the farm's area given to this crop.
    pub area_fraction: f64,
    /// Planting dates within each year, as "MM-DD".
    pub planting_dates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmConfig {
    pub id: FarmId,
    pub name: String,
    pub area_ha: f64,
    /// Multiplier on reference yield (management quality, soil).
    pub yield_factor: f64,
    pub initial_cash: f64,
    pub crops: Vec<FarmCropConfig>,
    pub policies: PolicyAssignment,
}

// ── Water ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WellConfig {
    pub capacity_m3_per_day: f64,
    pub depth_m: f64,
    pub pump_efficiency: f64,
    pub pumping_hours_per_day: f64,
    pub pipe_length_m: f64,
    pub pipe_diameter_m: f64,
    pub darcy_friction_factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentConfig {
    pub capacity_m3_per_day: f64,
    /// Fixed energy per m³ (pre-treatment, pumps).
    pub base_kwh_per_m3: f64,
    /// Additional energy per m³ for every 1000 ppm of feed TDS.
    pub kwh_per_m3_per_1000_ppm: f64,
    pub feed_tds_ppm: f64,
    pub product_tds_ppm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TariffTier {
    /// Upper bound of the tier in cumulative monthly m³; None = unbounded.
    pub up_to_m3: Option<f64>,
    pub price_per_m3: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MunicipalConfig {
    pub tiers: Vec<TariffTier>,
    /// Months (1-12) charged at the peak multiplier.
    pub peak_months: Vec<u32>,
    pub peak_multiplier: f64,
    pub tds_ppm: f64,
    /// Daily delivery cap across the whole community; None = unlimited.
    pub max_m3_per_day: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterStorageConfig {
    pub capacity_m3: f64,
    pub initial_level_m3: f64,
}

/// Whether shared well/treatment capacity is split up front or drawn first-come.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacitySharing {
    /// Farms draw from one pool in farm-id order.
    Pooled,
    /// Each farm gets a fixed share computed by `share_method`.
    Partitioned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AquiferExtractionMode {
    /// Remaining volume is reported only.
    ReportingOnly,
    /// Daily extraction is clipped to the remaining exploitable volume.
    LimitToRemaining,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AquiferConfig {
    pub exploitable_volume_m3: f64,
    pub recharge_m3_per_year: f64,
    pub extraction_mode: AquiferExtractionMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterSystemConfig {
    pub well: WellConfig,
    pub treatment: TreatmentConfig,
    pub conveyance_kwh_per_m3: f64,
    pub groundwater_om_per_m3: f64,
    pub municipal: MunicipalConfig,
    pub storage: WaterStorageConfig,
    pub sharing: CapacitySharing,
    pub share_method: AllocationMethod,
    /// Ceiling on pumping + conveyance + treatment energy per day.
    pub max_water_energy_kwh_per_day: Option<f64>,
    pub aquifer: AquiferConfig,
}

// ── Energy ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryConfig {
    pub capacity_kwh: f64,
    pub min_soc: f64,
    pub max_soc: f64,
    pub initial_soc: f64,
    pub round_trip_efficiency: f64,
    /// SOC floor used when the energy policy asks for a reserve.
    pub reserve_soc: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    pub enabled: bool,
    pub import_price_per_kwh: f64,
    pub export_price_per_kwh: f64,
    /// None = unbounded import.
    pub max_import_kwh_per_day: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub capacity_kw: f64,
    pub min_load_fraction: f64,
    /// Willans line intercept, litres per rated kW per hour.
    pub willans_a: f64,
    /// Willans line slope, litres per rated kW per hour at full load.
    pub willans_b: f64,
    pub fuel_price_per_l: f64,
    pub max_runtime_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergySystemConfig {
    /// Community energy policy (dispatch is community-wide).
    pub policy: PolicySpec,
    pub pv_capacity_kw: f64,
    pub wind_capacity_kw: f64,
    pub battery: BatteryConfig,
    pub grid: GridConfig,
    pub generator: GeneratorConfig,
}

// ── Community, processing, storage ────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityConfig {
    pub household_water_m3_per_day: f64,
    pub household_kwh_per_day: f64,
    pub community_buildings_kwh_per_day: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathwayConfig {
    /// Daily input capacity in kg of raw harvest. Ignored for fresh.
    pub capacity_kg_per_day: f64,
    /// Output mass per input mass (drying loses most of the water).
    pub weight_retention: f64,
    pub energy_kwh_per_kg: f64,
    pub labor_cost_per_kg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub capacity_kg: PerProduct<f64>,
    pub shelf_life_days: PerProduct<u32>,
    /// Price discount applied to forced (expiry/overflow) sales, 0..1.
    pub forced_sale_discount: f64,
}

// ── Economics ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsolvencyPolicy {
    /// Negative cash is a reported signal only.
    ReportOnly,
    /// Insolvent farms do not start new planting cycles.
    RestrictPlanting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlantingAreaMode {
    /// Every planting date uses the crop's full area.
    FullArea,
    /// The crop's area is divided equally between its planting dates.
    SplitArea,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomicsConfig {
    pub labor_cost_per_ha_per_day: f64,
    pub input_cost_per_planted_ha_per_day: f64,
    pub annual_infrastructure_om: f64,
    pub annual_debt_service: f64,
    pub shared_cost_method: AllocationMethod,
    pub insolvency_policy: InsolvencyPolicy,
    pub planting_area_mode: PlantingAreaMode,
}

// ── Scenario ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub farms: Vec<FarmConfig>,
    pub water: WaterSystemConfig,
    pub energy: EnergySystemConfig,
    pub community: CommunityConfig,
    pub processing: PerProduct<PathwayConfig>,
    pub storage: StorageConfig,
    pub economics: EconomicsConfig,
}

/// Parse a "MM-DD" planting date.
pub fn parse_month_day(text: &str) -> Option<(u32, u32)> {
    let (m, d) = text.split_once('-')?;
    let month: u32 = m.trim().parse().ok()?;
    let day: u32 = d.trim().parse().ok()?;
    // 2024 is a leap year, so 02-29 is accepted here.
    NaiveDate::from_ymd_opt(2024, month, day).map(|_| (month, day))
}

impl ScenarioConfig {
    /// Load and validate a scenario from a JSON file.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: ScenarioConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Farms in the engine's fixed iteration order.
    pub fn farms_sorted(&self) -> Vec<&FarmConfig> {
        let mut farms: Vec<&FarmConfig> = self.farms.iter().collect();
        farms.sort_by(|a, b| a.id.cmp(&b.id));
        farms
    }

    /// Every distinct crop named by any farm.
    pub fn crop_names(&self) -> BTreeSet<CropName> {
        self.farms
            .iter()
            .flat_map(|f| f.crops.iter().map(|c| c.crop.clone()))
            .collect()
    }

    /// Reject the scenario before any state is built.
    pub fn validate(&self) -> SimResult<()> {
        if self.end_date < self.start_date {
            return Err(SimError::config("end_date", "must not precede start_date"));
        }
        if self.farms.is_empty() {
            return Err(SimError::config("farms", "at least one farm is required"));
        }

        let mut ids = BTreeSet::new();
        for farm in &self.farms {
            let field = |name: &str| format!("farms[{}].{name}", farm.id);
            if farm.id.trim().is_empty() {
                return Err(SimError::config("farms[].id", "must not be empty"));
            }
            if !ids.insert(farm.id.as_str()) {
                return Err(SimError::config(field("id"), "duplicate farm id"));
            }
            positive(&field("area_ha"), farm.area_ha)?;
            non_negative(&field("yield_factor"), farm.yield_factor)?;
            finite(&field("initial_cash"), farm.initial_cash)?;

            let mut area_total = 0.0;
            for crop in &farm.crops {
                fraction(&field("crops[].area_fraction"), crop.area_fraction)?;
                area_total += crop.area_fraction;
                if crop.planting_dates.is_empty() {
                    return Err(SimError::config(
                        field("crops[].planting_dates"),
                        format!("crop '{}' has no planting dates", crop.crop),
                    ));
                }
                for date in &crop.planting_dates {
                    if parse_month_day(date).is_none() {
                        return Err(SimError::config(
                            field("crops[].planting_dates"),
                            format!("'{date}' is not a valid MM-DD date"),
                        ));
                    }
                }
            }
            if area_total > 1.0 + 1e-9 {
                return Err(SimError::config(
                    field("crops"),
                    format!("area fractions sum to {area_total:.3} > 1"),
                ));
            }
        }

        self.validate_water()?;
        self.validate_energy()?;

        let c = &self.community;
        non_negative("community.household_water_m3_per_day", c.household_water_m3_per_day)?;
        non_negative("community.household_kwh_per_day", c.household_kwh_per_day)?;
        non_negative(
            "community.community_buildings_kwh_per_day",
            c.community_buildings_kwh_per_day,
        )?;

        for (product, pathway) in self.processing.iter() {
            let field = |name: &str| format!("processing.{}.{name}", product.name());
            non_negative(&field("capacity_kg_per_day"), pathway.capacity_kg_per_day)?;
            if !(pathway.weight_retention > 0.0 && pathway.weight_retention <= 1.0) {
                return Err(SimError::config(field("weight_retention"), "must be in (0, 1]"));
            }
            non_negative(&field("energy_kwh_per_kg"), pathway.energy_kwh_per_kg)?;
            non_negative(&field("labor_cost_per_kg"), pathway.labor_cost_per_kg)?;
        }

        for (product, capacity) in self.storage.capacity_kg.iter() {
            non_negative(&format!("storage.capacity_kg.{}", product.name()), *capacity)?;
        }
        for (product, days) in self.storage.shelf_life_days.iter() {
            if *days == 0 {
                return Err(SimError::config(
                    format!("storage.shelf_life_days.{}", product.name()),
                    "must be at least one day",
                ));
            }
        }
        fraction("storage.forced_sale_discount", self.storage.forced_sale_discount)?;

        let e = &self.economics;
        non_negative("economics.labor_cost_per_ha_per_day", e.labor_cost_per_ha_per_day)?;
        non_negative(
            "economics.input_cost_per_planted_ha_per_day",
            e.input_cost_per_planted_ha_per_day,
        )?;
        non_negative("economics.annual_infrastructure_om", e.annual_infrastructure_om)?;
        non_negative("economics.annual_debt_service", e.annual_debt_service)?;

        Ok(())
    }

    fn validate_water(&self) -> SimResult<()> {
        let w = &self.water;
        non_negative("water.well.capacity_m3_per_day", w.well.capacity_m3_per_day)?;
        non_negative("water.well.depth_m", w.well.depth_m)?;
        if !(w.well.pump_efficiency > 0.0 && w.well.pump_efficiency <= 1.0) {
            return Err(SimError::config("water.well.pump_efficiency", "must be in (0, 1]"));
        }
        if !(w.well.pumping_hours_per_day > 0.0 && w.well.pumping_hours_per_day <= 24.0) {
            return Err(SimError::config("water.well.pumping_hours_per_day", "must be in (0, 24]"));
        }
        non_negative("water.well.pipe_length_m", w.well.pipe_length_m)?;
        positive("water.well.pipe_diameter_m", w.well.pipe_diameter_m)?;
        non_negative("water.well.darcy_friction_factor", w.well.darcy_friction_factor)?;

        non_negative("water.treatment.capacity_m3_per_day", w.treatment.capacity_m3_per_day)?;
        non_negative("water.treatment.base_kwh_per_m3", w.treatment.base_kwh_per_m3)?;
        non_negative(
            "water.treatment.kwh_per_m3_per_1000_ppm",
            w.treatment.kwh_per_m3_per_1000_ppm,
        )?;
        non_negative("water.treatment.feed_tds_ppm", w.treatment.feed_tds_ppm)?;
        non_negative("water.treatment.product_tds_ppm", w.treatment.product_tds_ppm)?;
        non_negative("water.conveyance_kwh_per_m3", w.conveyance_kwh_per_m3)?;
        non_negative("water.groundwater_om_per_m3", w.groundwater_om_per_m3)?;

        let tiers = &w.municipal.tiers;
        if tiers.is_empty() {
            return Err(SimError::config("water.municipal.tiers", "at least one tier is required"));
        }
        let mut previous = 0.0;
        for (i, tier) in tiers.iter().enumerate() {
            non_negative("water.municipal.tiers[].price_per_m3", tier.price_per_m3)?;
            let last = i + 1 == tiers.len();
            match (tier.up_to_m3, last) {
                (None, true) => {}
                (None, false) => {
                    return Err(SimError::config(
                        "water.municipal.tiers",
                        "only the last tier may be unbounded",
                    ))
                }
                (Some(_), true) => {
                    return Err(SimError::config(
                        "water.municipal.tiers",
                        "the last tier must be unbounded",
                    ))
                }
                (Some(limit), false) => {
                    if limit <= previous {
                        return Err(SimError::config(
                            "water.municipal.tiers",
                            "tier bounds must be strictly increasing",
                        ));
                    }
                    previous = limit;
                }
            }
        }
        if w.municipal.peak_months.iter().any(|m| !(1..=12).contains(m)) {
            return Err(SimError::config("water.municipal.peak_months", "months must be 1-12"));
        }
        positive("water.municipal.peak_multiplier", w.municipal.peak_multiplier)?;
        non_negative("water.municipal.tds_ppm", w.municipal.tds_ppm)?;
        if let Some(cap) = w.municipal.max_m3_per_day {
            non_negative("water.municipal.max_m3_per_day", cap)?;
        }

        non_negative("water.storage.capacity_m3", w.storage.capacity_m3)?;
        non_negative("water.storage.initial_level_m3", w.storage.initial_level_m3)?;
        if w.storage.initial_level_m3 > w.storage.capacity_m3 {
            return Err(SimError::config(
                "water.storage.initial_level_m3",
                "exceeds storage capacity",
            ));
        }
        if let Some(cap) = w.max_water_energy_kwh_per_day {
            non_negative("water.max_water_energy_kwh_per_day", cap)?;
        }
        non_negative("water.aquifer.exploitable_volume_m3", w.aquifer.exploitable_volume_m3)?;
        non_negative("water.aquifer.recharge_m3_per_year", w.aquifer.recharge_m3_per_year)?;
        Ok(())
    }

    fn validate_energy(&self) -> SimResult<()> {
        let e = &self.energy;
        non_negative("energy.pv_capacity_kw", e.pv_capacity_kw)?;
        non_negative("energy.wind_capacity_kw", e.wind_capacity_kw)?;

        let b = &e.battery;
        non_negative("energy.battery.capacity_kwh", b.capacity_kwh)?;
        fraction("energy.battery.min_soc", b.min_soc)?;
        fraction("energy.battery.max_soc", b.max_soc)?;
        if b.min_soc > b.max_soc {
            return Err(SimError::config("energy.battery.min_soc", "exceeds max_soc"));
        }
        if b.initial_soc < b.min_soc || b.initial_soc > b.max_soc {
            return Err(SimError::config("energy.battery.initial_soc", "outside [min_soc, max_soc]"));
        }
        if b.reserve_soc < b.min_soc || b.reserve_soc > b.max_soc {
            return Err(SimError::config("energy.battery.reserve_soc", "outside [min_soc, max_soc]"));
        }
        if !(b.round_trip_efficiency > 0.0 && b.round_trip_efficiency <= 1.0) {
            return Err(SimError::config(
                "energy.battery.round_trip_efficiency",
                "must be in (0, 1]",
            ));
        }

        non_negative("energy.grid.import_price_per_kwh", e.grid.import_price_per_kwh)?;
        non_negative("energy.grid.export_price_per_kwh", e.grid.export_price_per_kwh)?;
        if let Some(cap) = e.grid.max_import_kwh_per_day {
            non_negative("energy.grid.max_import_kwh_per_day", cap)?;
        }

        let g = &e.generator;
        non_negative("energy.generator.capacity_kw", g.capacity_kw)?;
        fraction("energy.generator.min_load_fraction", g.min_load_fraction)?;
        non_negative("energy.generator.willans_a", g.willans_a)?;
        non_negative("energy.generator.willans_b", g.willans_b)?;
        non_negative("energy.generator.fuel_price_per_l", g.fuel_price_per_l)?;
        if g.capacity_kw > 0.0 && !(g.max_runtime_hours > 0.0 && g.max_runtime_hours <= 24.0) {
            return Err(SimError::config("energy.generator.max_runtime_hours", "must be in (0, 24]"));
        }
        Ok(())
    }

    /// Config with hardcoded defaults for use in tests: one farm growing
    /// tomato through 2024, municipal water cheaper than groundwater,
    /// unbounded grid, no household load and no water storage.
    pub fn default_test() -> Self {
        let farm = FarmConfig {
            id: "farm_a".into(),
            name: "Farm A".into(),
            area_ha: 10.0,
            yield_factor: 0.9,
            initial_cash: 50_000.0,
            crops: vec![FarmCropConfig {
                crop: "tomato".into(),
                area_fraction: 0.5,
                planting_dates: vec!["02-15".into()],
            }],
            policies: PolicyAssignment {
                water:    PolicySpec::named("cheapest_source"),
                crop:     PolicySpec::named("fixed_schedule"),
                food:     PolicySpec::named("all_fresh"),
                market:   PolicySpec::named("sell_all"),
                economic: PolicySpec::named("balanced"),
            },
        };

        let pathway = |capacity: f64, retention: f64, kwh: f64, labor: f64| PathwayConfig {
            capacity_kg_per_day: capacity,
            weight_retention: retention,
            energy_kwh_per_kg: kwh,
            labor_cost_per_kg: labor,
        };

        Self {
            name: "default-test".into(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date"),
            end_date: NaiveDate::from_ymd_opt(2024, 12, 31).expect("valid date"),
            farms: vec![farm],
            water: WaterSystemConfig {
                well: WellConfig {
                    capacity_m3_per_day: 500.0,
                    depth_m: 80.0,
                    pump_efficiency: 0.6,
                    pumping_hours_per_day: 12.0,
                    pipe_length_m: 300.0,
                    pipe_diameter_m: 0.15,
                    darcy_friction_factor: 0.02,
                },
                treatment: TreatmentConfig {
                    capacity_m3_per_day: 400.0,
                    base_kwh_per_m3: 0.5,
                    kwh_per_m3_per_1000_ppm: 0.4,
                    feed_tds_ppm: 3_000.0,
                    product_tds_ppm: 250.0,
                },
                conveyance_kwh_per_m3: 0.2,
                groundwater_om_per_m3: 0.15,
                municipal: MunicipalConfig {
                    tiers: vec![
                        TariffTier { up_to_m3: Some(10_000.0), price_per_m3: 0.10 },
                        TariffTier { up_to_m3: None, price_per_m3: 0.20 },
                    ],
                    peak_months: vec![],
                    peak_multiplier: 1.0,
                    tds_ppm: 400.0,
                    max_m3_per_day: None,
                },
                storage: WaterStorageConfig { capacity_m3: 0.0, initial_level_m3: 0.0 },
                sharing: CapacitySharing::Partitioned,
                share_method: AllocationMethod::AreaProportional,
                max_water_energy_kwh_per_day: None,
                aquifer: AquiferConfig {
                    exploitable_volume_m3: 5_000_000.0,
                    recharge_m3_per_year: 50_000.0,
                    extraction_mode: AquiferExtractionMode::ReportingOnly,
                },
            },
            energy: EnergySystemConfig {
                policy: PolicySpec::named("renewable_first"),
                pv_capacity_kw: 50.0,
                wind_capacity_kw: 20.0,
                battery: BatteryConfig {
                    capacity_kwh: 200.0,
                    min_soc: 0.1,
                    max_soc: 0.95,
                    initial_soc: 0.5,
                    round_trip_efficiency: 0.9,
                    reserve_soc: 0.3,
                },
                grid: GridConfig {
                    enabled: true,
                    import_price_per_kwh: 0.12,
                    export_price_per_kwh: 0.04,
                    max_import_kwh_per_day: None,
                },
                generator: GeneratorConfig {
                    capacity_kw: 0.0,
                    min_load_fraction: 0.3,
                    willans_a: 0.06,
                    willans_b: 0.20,
                    fuel_price_per_l: 1.1,
                    max_runtime_hours: 24.0,
                },
            },
            community: CommunityConfig {
                household_water_m3_per_day: 0.0,
                household_kwh_per_day: 0.0,
                community_buildings_kwh_per_day: 0.0,
            },
            processing: PerProduct {
                fresh:    pathway(0.0, 1.0, 0.01, 0.02),
                dried:    pathway(500.0, 0.12, 0.8, 0.10),
                canned:   pathway(800.0, 0.9, 0.3, 0.08),
                packaged: pathway(1_000.0, 1.0, 0.05, 0.04),
            },
            storage: StorageConfig {
                capacity_kg: PerProduct {
                    fresh: 20_000.0,
                    dried: 5_000.0,
                    canned: 10_000.0,
                    packaged: 10_000.0,
                },
                shelf_life_days: PerProduct { fresh: 7, dried: 365, canned: 730, packaged: 21 },
                forced_sale_discount: 0.3,
            },
            economics: EconomicsConfig {
                labor_cost_per_ha_per_day: 2.0,
                input_cost_per_planted_ha_per_day: 1.5,
                annual_infrastructure_om: 3_650.0,
                annual_debt_service: 0.0,
                shared_cost_method: AllocationMethod::AreaProportional,
                insolvency_policy: InsolvencyPolicy::ReportOnly,
                planting_area_mode: PlantingAreaMode::FullArea,
            },
        }
    }
}

fn finite(field: &str, value: f64) -> SimResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SimError::config(field, "must be a finite number"))
    }
}

fn non_negative(field: &str, value: f64) -> SimResult<()> {
    if value.is_nan() || value < 0.0 {
        Err(SimError::config(field, format!("must be >= 0, got {value}")))
    } else {
        Ok(())
    }
}

fn positive(field: &str, value: f64) -> SimResult<()> {
    if value.is_nan() || value <= 0.0 {
        Err(SimError::config(field, format!("must be > 0, got {value}")))
    } else {
        Ok(())
    }
}

fn fraction(field: &str, value: f64) -> SimResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(SimError::config(field, format!("must be within [0, 1], got {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_test_config_is_valid() {
        ScenarioConfig::default_test().validate().unwrap();
    }

    #[test]
    fn rejects_duplicate_farm_ids() {
        let mut config = ScenarioConfig::default_test();
        config.farms.push(config.farms[0].clone());
        let err = config.validate().unwrap_err();
        assert!(matches!(err, SimError::Config { ref field, .. } if field.ends_with(".id")));
    }

    #[test]
    fn rejects_bad_planting_date() {
        let mut config = ScenarioConfig::default_test();
        config.farms[0].crops[0].planting_dates = vec!["13-01".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bounded_last_tariff_tier() {
        let mut config = ScenarioConfig::default_test();
        config.water.municipal.tiers = vec![TariffTier { up_to_m3: Some(5.0), price_per_m3: 1.0 }];
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_initial_soc_outside_bounds() {
        let mut config = ScenarioConfig::default_test();
        config.energy.battery.initial_soc = 0.99;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_sharing_rule_fails_to_parse() {
        let mut value = serde_json::to_value(ScenarioConfig::default_test()).unwrap();
        value["water"].as_object_mut().unwrap().remove("sharing");
        assert!(serde_json::from_value::<ScenarioConfig>(value).is_err());
    }

    #[test]
    fn month_day_parsing() {
        assert_eq!(parse_month_day("02-29"), Some((2, 29)));
        assert_eq!(parse_month_day("04-31"), None);
        assert_eq!(parse_month_day("spring"), None);
    }
}
