//! Food processing policies: how a harvest is split across pathways.
//!
//! Fractions are a wish list. Pathway capacity is applied afterwards by
//! the inventory subsystem and any excess falls back to fresh.

use super::{check_params, fraction_param, param, price_ratio};
use crate::{
    config::PolicySpec,
    error::{SimError, SimResult},
    types::PerProduct,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct FoodPolicyContext {
    pub crop: String,
    pub harvest_kg: f64,
    pub fresh_price_per_kg: f64,
    pub reference_fresh_price_per_kg: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FoodDecision {
    /// Sums to 1.0.
    pub fractions: PerProduct<f64>,
    pub policy_name: &'static str,
    pub reason: String,
}

const ALL_FRESH: PerProduct<f64> = PerProduct { fresh: 1.0, dried: 0.0, canned: 0.0, packaged: 0.0 };
const PROCESS_HEAVY: PerProduct<f64> = PerProduct { fresh: 0.3, dried: 0.3, canned: 0.3, packaged: 0.1 };
const FRESH_HEAVY: PerProduct<f64> = PerProduct { fresh: 0.8, dried: 0.0, canned: 0.0, packaged: 0.2 };

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum FoodPolicy {
    AllFresh,
    FixedSplit { split: PerProduct<f64> },
    /// Process heavily when fresh prices sit below `price_ratio_threshold`
    /// of their reference.
    MarketResponsive { price_ratio_threshold: f64 },
}

impl FoodPolicy {
    pub fn from_spec(spec: &PolicySpec) -> SimResult<Self> {
        match spec.name.as_str() {
            "all_fresh" => {
                check_params(spec, &[])?;
                Ok(Self::AllFresh)
            }
            "fixed_split" => {
                check_params(spec, &["fresh", "dried", "canned", "packaged"])?;
                let split = PerProduct {
                    fresh:    fraction_param(spec, "fresh", 0.2)?,
                    dried:    fraction_param(spec, "dried", 0.3)?,
                    canned:   fraction_param(spec, "canned", 0.3)?,
                    packaged: fraction_param(spec, "packaged", 0.2)?,
                };
                if (split.total() - 1.0).abs() > 1e-6 {
                    return Err(SimError::config(
                        "policy 'fixed_split'",
                        format!("fractions must sum to 1, got {}", split.total()),
                    ));
                }
                Ok(Self::FixedSplit { split })
            }
            "market_responsive" => {
                check_params(spec, &["price_ratio_threshold"])?;
                let threshold = param(spec, "price_ratio_threshold", 0.8);
                if threshold <= 0.0 {
                    return Err(SimError::config(
                        "policy 'market_responsive'.price_ratio_threshold",
                        "must be > 0",
                    ));
                }
                Ok(Self::MarketResponsive { price_ratio_threshold: threshold })
            }
            other => Err(SimError::UnknownPolicy { domain: "food", name: other.to_string() }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::AllFresh                => "all_fresh",
            Self::FixedSplit { .. }       => "fixed_split",
            Self::MarketResponsive { .. } => "market_responsive",
        }
    }

    pub fn decide(&self, ctx: &FoodPolicyContext) -> FoodDecision {
        let (fractions, reason) = match self {
            Self::AllFresh => (ALL_FRESH, "sell fresh".to_string()),
            Self::FixedSplit { split } => (*split, "fixed split".to_string()),
            Self::MarketResponsive { price_ratio_threshold } => {
                let ratio = price_ratio(ctx.fresh_price_per_kg, ctx.reference_fresh_price_per_kg);
                if ratio < *price_ratio_threshold {
                    (PROCESS_HEAVY, format!("fresh price ratio {ratio:.2} below threshold"))
                } else {
                    (FRESH_HEAVY, format!("fresh price ratio {ratio:.2} at or above threshold"))
                }
            }
        };
        FoodDecision { fractions, policy_name: self.name(), reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(price: f64) -> FoodPolicyContext {
        FoodPolicyContext {
            crop: "tomato".into(),
            harvest_kg: 1_000.0,
            fresh_price_per_kg: price,
            reference_fresh_price_per_kg: 1.0,
        }
    }

    #[test]
    fn market_responsive_processes_on_low_prices() {
        let policy = FoodPolicy::MarketResponsive { price_ratio_threshold: 0.8 };
        assert_eq!(policy.decide(&ctx(0.5)).fractions, PROCESS_HEAVY);
        assert_eq!(policy.decide(&ctx(1.2)).fractions, FRESH_HEAVY);
    }

    #[test]
    fn fixed_split_must_sum_to_one() {
        let spec = PolicySpec::named("fixed_split").with_param("fresh", 0.9);
        assert!(FoodPolicy::from_spec(&spec).is_err());
        assert!(FoodPolicy::from_spec(&PolicySpec::named("fixed_split")).is_ok());
    }

    #[test]
    fn builtin_splits_sum_to_one() {
        for split in [ALL_FRESH, PROCESS_HEAVY, FRESH_HEAVY] {
            assert!((split.total() - 1.0).abs() < 1e-12);
        }
    }
}
