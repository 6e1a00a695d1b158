//! Crop irrigation policies: how much of the reference demand a growing
//! crop asks for today.

use super::{check_params, flag_param, fraction_param};
use crate::{
    config::PolicySpec,
    error::{SimError, SimResult},
    state::GrowthStage,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct CropPolicyContext {
    pub stage: GrowthStage,
    pub days_since_planting: u32,
    pub total_growing_days: u32,
    /// Reference irrigation demand for today, area already applied.
    pub reference_demand_m3: f64,
    pub cumulative_water_m3: f64,
    pub expected_total_water_m3: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CropDecision {
    pub requested_m3: f64,
    pub policy_name: &'static str,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum CropPolicy {
    /// Request exactly the reference demand every day.
    FixedSchedule,
    /// Request a fraction of demand, optionally full demand in mid-season
    /// when the crop is most sensitive to stress.
    DeficitIrrigation { fraction: f64, protect_mid_season: bool },
}

impl CropPolicy {
    pub fn from_spec(spec: &PolicySpec) -> SimResult<Self> {
        match spec.name.as_str() {
            "fixed_schedule" => {
                check_params(spec, &[])?;
                Ok(Self::FixedSchedule)
            }
            "deficit_irrigation" => {
                check_params(spec, &["fraction", "protect_mid_season"])?;
                Ok(Self::DeficitIrrigation {
                    fraction: fraction_param(spec, "fraction", 0.8)?,
                    protect_mid_season: flag_param(spec, "protect_mid_season", true)?,
                })
            }
            other => Err(SimError::UnknownPolicy { domain: "crop", name: other.to_string() }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::FixedSchedule            => "fixed_schedule",
            Self::DeficitIrrigation { .. } => "deficit_irrigation",
        }
    }

    pub fn decide(&self, ctx: &CropPolicyContext) -> CropDecision {
        let demand = ctx.reference_demand_m3.max(0.0);
        let (requested, reason) = match self {
            Self::FixedSchedule => (demand, "full reference demand".to_string()),
            Self::DeficitIrrigation { fraction, protect_mid_season } => {
                if *protect_mid_season && ctx.stage == GrowthStage::MidSeason {
                    (demand, "mid-season protected".to_string())
                } else {
                    (demand * fraction, format!("deficit at {:.0}%", fraction * 100.0))
                }
            }
        };
        CropDecision { requested_m3: requested, policy_name: self.name(), reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(stage: GrowthStage) -> CropPolicyContext {
        CropPolicyContext {
            stage,
            days_since_planting: 50,
            total_growing_days: 140,
            reference_demand_m3: 200.0,
            cumulative_water_m3: 0.0,
            expected_total_water_m3: 0.0,
        }
    }

    #[test]
    fn fixed_schedule_requests_exact_demand() {
        let d = CropPolicy::FixedSchedule.decide(&ctx(GrowthStage::Development));
        assert_eq!(d.requested_m3, 200.0);
        assert_eq!(d.policy_name, "fixed_schedule");
    }

    #[test]
    fn deficit_protects_mid_season_only() {
        let policy = CropPolicy::DeficitIrrigation { fraction: 0.6, protect_mid_season: true };
        assert_eq!(policy.decide(&ctx(GrowthStage::MidSeason)).requested_m3, 200.0);
        assert!((policy.decide(&ctx(GrowthStage::LateSeason)).requested_m3 - 120.0).abs() < 1e-9);
    }

    #[test]
    fn deficit_defaults_from_spec() {
        let policy = CropPolicy::from_spec(&PolicySpec::named("deficit_irrigation")).unwrap();
        assert_eq!(
            policy,
            CropPolicy::DeficitIrrigation { fraction: 0.8, protect_mid_season: true }
        );
    }

    #[test]
    fn mid_season_protection_is_strictly_on_or_off() {
        let spec = |v: f64| PolicySpec::named("deficit_irrigation").with_param("protect_mid_season", v);
        assert_eq!(
            CropPolicy::from_spec(&spec(0.0)).unwrap(),
            CropPolicy::DeficitIrrigation { fraction: 0.8, protect_mid_season: false }
        );
        assert_eq!(
            CropPolicy::from_spec(&spec(1.0)).unwrap(),
            CropPolicy::DeficitIrrigation { fraction: 0.8, protect_mid_season: true }
        );
        let err = CropPolicy::from_spec(&spec(0.4)).unwrap_err();
        assert!(matches!(err, SimError::Config { ref field, .. } if field.ends_with("protect_mid_season")));
    }
}
