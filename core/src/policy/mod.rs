//! Decision policies, one closed enum per domain.
//!
//! RULES:
//!   - Every policy takes an immutable context and returns a decision
//!     carrying its policy name and a reason string.
//!   - Policies never mutate state and never compute physical flows the
//!     engine owns (dispatch kWh, clipping, storage levels).
//!   - A new policy is a new enum variant, registered in from_spec().

pub mod crop;
pub mod economic;
pub mod energy;
pub mod food;
pub mod market;
pub mod water;

pub use crop::{CropDecision, CropPolicy, CropPolicyContext};
pub use economic::{EconomicDecision, EconomicPolicy, EconomicPolicyContext};
pub use energy::{DischargePriority, EnergyFlags, EnergyPolicy, EnergyPolicyContext};
pub use food::{FoodDecision, FoodPolicy, FoodPolicyContext};
pub use market::{MarketDecision, MarketPolicy, MarketPolicyContext};
pub use water::{WaterDecision, WaterPolicy, WaterPolicyContext};

use crate::{
    config::{PolicyAssignment, PolicySpec},
    error::{SimError, SimResult},
};
use serde::{Deserialize, Serialize};

/// The resolved policies for one farm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmPolicies {
    pub water:    WaterPolicy,
    pub crop:     CropPolicy,
    pub food:     FoodPolicy,
    pub market:   MarketPolicy,
    pub economic: EconomicPolicy,
}

/// Factory from configured names to policy values.
pub struct PolicyRegistry;

impl PolicyRegistry {
    pub fn for_farm(assignment: &PolicyAssignment) -> SimResult<FarmPolicies> {
        Ok(FarmPolicies {
            water:    WaterPolicy::from_spec(&assignment.water)?,
            crop:     CropPolicy::from_spec(&assignment.crop)?,
            food:     FoodPolicy::from_spec(&assignment.food)?,
            market:   MarketPolicy::from_spec(&assignment.market)?,
            economic: EconomicPolicy::from_spec(&assignment.economic)?,
        })
    }

    /// Dispatch is community-wide, so the energy domain has one policy.
    pub fn for_community_energy(spec: &PolicySpec) -> SimResult<EnergyPolicy> {
        EnergyPolicy::from_spec(spec)
    }
}

/// Reject parameters the policy does not understand.
pub(crate) fn check_params(spec: &PolicySpec, allowed: &[&str]) -> SimResult<()> {
    match spec.params.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(key) => Err(SimError::config(
            format!("policy '{}'", spec.name),
            format!("unknown parameter '{key}'"),
        )),
        None => Ok(()),
    }
}

/// A parameter value, or the variant's documented default.
pub(crate) fn param(spec: &PolicySpec, key: &str, default: f64) -> f64 {
    spec.params.get(key).copied().unwrap_or(default)
}

/// A parameter that must lie in [0, 1].
pub(crate) fn fraction_param(spec: &PolicySpec, key: &str, default: f64) -> SimResult<f64> {
    let value = param(spec, key, default);
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(SimError::config(
            format!("policy '{}'.{key}", spec.name),
            format!("must be within [0, 1], got {value}"),
        ))
    }
}

/// An on/off parameter, written as 0 or 1.
pub(crate) fn flag_param(spec: &PolicySpec, key: &str, default: bool) -> SimResult<bool> {
    let value = param(spec, key, if default { 1.0 } else { 0.0 });
    if value == 0.0 {
        Ok(false)
    } else if value == 1.0 {
        Ok(true)
    } else {
        Err(SimError::config(
            format!("policy '{}'.{key}", spec.name),
            format!("must be 0 or 1, got {value}"),
        ))
    }
}

/// Price relative to its long-run reference; 1.0 when there is no reference.
pub fn price_ratio(price: f64, reference: f64) -> f64 {
    if reference > 0.0 {
        price / reference
    } else {
        1.0
    }
}
