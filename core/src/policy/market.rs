//! Market policies: what share of a farm's stored product to sell today.

use super::{check_params, param, price_ratio};
use crate::{
    config::PolicySpec,
    error::{SimError, SimResult},
    types::ProductType,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct MarketPolicyContext {
    pub crop: String,
    pub product_type: ProductType,
    /// Quantity this farm owns across all tranches of the product.
    pub available_kg: f64,
    pub price_per_kg: f64,
    pub reference_price_per_kg: f64,
    /// Days until the oldest owned tranche expires.
    pub days_to_expiry: i64,
    /// Fill level of this product's storage, 0..=1.
    pub storage_utilization: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketDecision {
    pub sell_fraction: f64,
    pub policy_name: &'static str,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum MarketPolicy {
    SellAll,
    /// Hold until price reaches `price_ratio` of reference, or until the
    /// product is about to expire.
    HoldForPeak { price_ratio: f64, sell_days_before_expiry: f64 },
    /// Sell linearly more as price moves from floor to ceiling ratio.
    Adaptive { floor_ratio: f64, ceiling_ratio: f64 },
}

impl MarketPolicy {
    pub fn from_spec(spec: &PolicySpec) -> SimResult<Self> {
        match spec.name.as_str() {
            "sell_all" => {
                check_params(spec, &[])?;
                Ok(Self::SellAll)
            }
            "hold_for_peak" => {
                check_params(spec, &["price_ratio", "sell_days_before_expiry"])?;
                let days = param(spec, "sell_days_before_expiry", 2.0);
                if days < 0.0 {
                    return Err(SimError::config(
                        "policy 'hold_for_peak'.sell_days_before_expiry",
                        "must be >= 0",
                    ));
                }
                Ok(Self::HoldForPeak {
                    price_ratio: param(spec, "price_ratio", 1.2),
                    sell_days_before_expiry: days,
                })
            }
            "adaptive" => {
                check_params(spec, &["floor_ratio", "ceiling_ratio"])?;
                let floor = param(spec, "floor_ratio", 0.8);
                let ceiling = param(spec, "ceiling_ratio", 1.2);
                if floor >= ceiling {
                    return Err(SimError::config(
                        "policy 'adaptive'",
                        format!("floor_ratio {floor} must be below ceiling_ratio {ceiling}"),
                    ));
                }
                Ok(Self::Adaptive { floor_ratio: floor, ceiling_ratio: ceiling })
            }
            other => Err(SimError::UnknownPolicy { domain: "market", name: other.to_string() }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SellAll           => "sell_all",
            Self::HoldForPeak { .. } => "hold_for_peak",
            Self::Adaptive { .. }   => "adaptive",
        }
    }

    pub fn decide(&self, ctx: &MarketPolicyContext) -> MarketDecision {
        let ratio = price_ratio(ctx.price_per_kg, ctx.reference_price_per_kg);
        let (fraction, reason) = match self {
            Self::SellAll => (1.0, "sell everything".to_string()),
            Self::HoldForPeak { price_ratio: target, sell_days_before_expiry } => {
                if ratio >= *target {
                    (1.0, format!("price ratio {ratio:.2} reached target {target:.2}"))
                } else if (ctx.days_to_expiry as f64) <= *sell_days_before_expiry {
                    (1.0, format!("{} days to expiry", ctx.days_to_expiry))
                } else {
                    (0.0, format!("holding at price ratio {ratio:.2}"))
                }
            }
            Self::Adaptive { floor_ratio, ceiling_ratio } => {
                let fraction = ((ratio - floor_ratio) / (ceiling_ratio - floor_ratio)).clamp(0.0, 1.0);
                if ctx.days_to_expiry <= 1 {
                    (1.0, "expires tomorrow".to_string())
                } else {
                    (fraction, format!("price ratio {ratio:.2}"))
                }
            }
        };
        MarketDecision { sell_fraction: fraction, policy_name: self.name(), reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(price: f64, days_to_expiry: i64) -> MarketPolicyContext {
        MarketPolicyContext {
            crop: "tomato".into(),
            product_type: ProductType::Dried,
            available_kg: 100.0,
            price_per_kg: price,
            reference_price_per_kg: 4.0,
            days_to_expiry,
            storage_utilization: 0.1,
        }
    }

    #[test]
    fn hold_for_peak_waits_then_sells_near_expiry() {
        let policy = MarketPolicy::HoldForPeak { price_ratio: 1.2, sell_days_before_expiry: 2.0 };
        assert_eq!(policy.decide(&ctx(4.0, 30)).sell_fraction, 0.0);
        assert_eq!(policy.decide(&ctx(5.0, 30)).sell_fraction, 1.0);
        assert_eq!(policy.decide(&ctx(4.0, 2)).sell_fraction, 1.0);
    }

    #[test]
    fn adaptive_interpolates_between_ratios() {
        let policy = MarketPolicy::Adaptive { floor_ratio: 0.8, ceiling_ratio: 1.2 };
        // ratio 1.0 sits halfway
        assert!((policy.decide(&ctx(4.0, 30)).sell_fraction - 0.5).abs() < 1e-9);
        assert_eq!(policy.decide(&ctx(2.0, 30)).sell_fraction, 0.0);
    }

    #[test]
    fn adaptive_rejects_inverted_band() {
        let spec = PolicySpec::named("adaptive")
            .with_param("floor_ratio", 1.5)
            .with_param("ceiling_ratio", 1.0);
        assert!(MarketPolicy::from_spec(&spec).is_err());
    }
}
