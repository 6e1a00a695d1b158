//! Water source policies: how a farm splits its daily demand between
//! treated groundwater and municipal supply.
//!
//! The policy proposes; the water subsystem clips the proposal against
//! physical capacity and prices what is actually delivered.

use super::{check_params, fraction_param, param};
use crate::{
    config::PolicySpec,
    error::{SimError, SimResult},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Read-only inputs for one farm on one day.
#[derive(Debug, Clone, PartialEq)]
pub struct WaterPolicyContext {
    pub date: NaiveDate,
    pub demand_m3: f64,
    /// Groundwater this farm may still draw today.
    pub available_groundwater_m3: f64,
    pub pumping_kwh_per_m3: f64,
    pub conveyance_kwh_per_m3: f64,
    pub treatment_kwh_per_m3: f64,
    pub electricity_price_per_kwh: f64,
    pub groundwater_om_per_m3: f64,
    /// Municipal price of the next m³ given month-to-date consumption.
    pub municipal_marginal_price_per_m3: f64,
    /// Renewable generation expected today, whole community.
    pub renewable_kwh_available: f64,
    pub groundwater_tds_ppm: f64,
    pub municipal_tds_ppm: f64,
}

impl WaterPolicyContext {
    pub fn groundwater_kwh_per_m3(&self) -> f64 {
        self.pumping_kwh_per_m3 + self.conveyance_kwh_per_m3 + self.treatment_kwh_per_m3
    }

    /// Full unit cost of treated groundwater, energy included.
    pub fn groundwater_unit_cost(&self) -> f64 {
        self.groundwater_kwh_per_m3() * self.electricity_price_per_kwh + self.groundwater_om_per_m3
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaterDecision {
    pub groundwater_m3: f64,
    pub municipal_m3: f64,
    pub energy_kwh: f64,
    /// Priced at marginal rates; the delivered cost is recomputed later.
    pub estimated_cost: f64,
    pub policy_name: &'static str,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum WaterPolicy {
    AlwaysGroundwater,
    AlwaysMunicipal,
    CheapestSource,
    /// Never take more than this share of demand from the aquifer.
    ConserveGroundwater { max_groundwater_ratio: f64 },
    /// Use enough treated groundwater to keep blended TDS at the target.
    QualityBlend { target_tds_ppm: f64 },
}

impl WaterPolicy {
    pub fn from_spec(spec: &PolicySpec) -> SimResult<Self> {
        match spec.name.as_str() {
            "always_groundwater" => {
                check_params(spec, &[])?;
                Ok(Self::AlwaysGroundwater)
            }
            "always_municipal" => {
                check_params(spec, &[])?;
                Ok(Self::AlwaysMunicipal)
            }
            "cheapest_source" => {
                check_params(spec, &[])?;
                Ok(Self::CheapestSource)
            }
            "conserve_groundwater" => {
                check_params(spec, &["max_groundwater_ratio"])?;
                Ok(Self::ConserveGroundwater {
                    max_groundwater_ratio: fraction_param(spec, "max_groundwater_ratio", 0.5)?,
                })
            }
            "quality_blend" => {
                check_params(spec, &["target_tds_ppm"])?;
                let target = param(spec, "target_tds_ppm", 500.0);
                if target < 0.0 {
                    return Err(SimError::config("policy 'quality_blend'.target_tds_ppm", "must be >= 0"));
                }
                Ok(Self::QualityBlend { target_tds_ppm: target })
            }
            other => Err(SimError::UnknownPolicy { domain: "water", name: other.to_string() }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::AlwaysGroundwater        => "always_groundwater",
            Self::AlwaysMunicipal          => "always_municipal",
            Self::CheapestSource           => "cheapest_source",
            Self::ConserveGroundwater { .. } => "conserve_groundwater",
            Self::QualityBlend { .. }      => "quality_blend",
        }
    }

    pub fn decide(&self, ctx: &WaterPolicyContext) -> WaterDecision {
        let demand = ctx.demand_m3.max(0.0);
        if demand <= 0.0 {
            return self.decision(ctx, 0.0, 0.0, "no demand".into());
        }
        let available = ctx.available_groundwater_m3.max(0.0);
        let gw_cost = ctx.groundwater_unit_cost();
        let mun_cost = ctx.municipal_marginal_price_per_m3;

        let (groundwater, reason) = match self {
            Self::AlwaysGroundwater => (demand.min(available), "groundwater preferred".to_string()),
            Self::AlwaysMunicipal => (0.0, "municipal preferred".to_string()),
            Self::CheapestSource => {
                if gw_cost <= mun_cost {
                    (
                        demand.min(available),
                        format!("groundwater cheaper ({gw_cost:.3} <= {mun_cost:.3} per m3)"),
                    )
                } else {
                    (0.0, format!("municipal cheaper ({mun_cost:.3} < {gw_cost:.3} per m3)"))
                }
            }
            Self::ConserveGroundwater { max_groundwater_ratio } => (
                (demand * max_groundwater_ratio).min(available),
                format!("groundwater capped at {:.0}% of demand", max_groundwater_ratio * 100.0),
            ),
            Self::QualityBlend { target_tds_ppm } => {
                let fraction = if gw_cost <= mun_cost {
                    1.0
                } else {
                    required_groundwater_fraction(
                        ctx.groundwater_tds_ppm,
                        ctx.municipal_tds_ppm,
                        *target_tds_ppm,
                    )
                };
                (
                    (demand * fraction).min(available),
                    format!("groundwater fraction {fraction:.2} for {target_tds_ppm:.0} ppm target"),
                )
            }
        };

        self.decision(ctx, groundwater, demand - groundwater, reason)
    }

    fn decision(&self, ctx: &WaterPolicyContext, gw: f64, mun: f64, reason: String) -> WaterDecision {
        WaterDecision {
            groundwater_m3: gw,
            municipal_m3: mun,
            energy_kwh: gw * ctx.groundwater_kwh_per_m3(),
            estimated_cost: gw * ctx.groundwater_unit_cost() + mun * ctx.municipal_marginal_price_per_m3,
            policy_name: self.name(),
            reason,
        }
    }
}

/// Smallest groundwater share f with f·gw + (1−f)·mun <= target.
fn required_groundwater_fraction(gw_tds: f64, mun_tds: f64, target: f64) -> f64 {
    if mun_tds <= target {
        0.0
    } else if gw_tds >= mun_tds {
        // Blending cannot lower TDS; treated water is no better.
        0.0
    } else {
        ((mun_tds - target) / (mun_tds - gw_tds)).clamp(0.0, 1.0)
    }
}
