//! Economic policies, consulted at each month close: how much cash a
//! farm keeps in reserve and how much it distributes to members.

use super::check_params;
use crate::{
    config::PolicySpec,
    error::{SimError, SimResult},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct EconomicPolicyContext {
    pub cash: f64,
    /// Mean monthly operating cost over the months closed so far.
    pub avg_monthly_cost: f64,
    pub month_revenue: f64,
    pub month_cost: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EconomicDecision {
    pub reserve_target: f64,
    pub distribution: f64,
    pub policy_name: &'static str,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum EconomicPolicy {
    Conservative,
    Balanced,
    RiskTaking,
}

impl EconomicPolicy {
    pub fn from_spec(spec: &PolicySpec) -> SimResult<Self> {
        let policy = match spec.name.as_str() {
            "conservative" => Self::Conservative,
            "balanced"     => Self::Balanced,
            "risk_taking"  => Self::RiskTaking,
            other => {
                return Err(SimError::UnknownPolicy { domain: "economic", name: other.to_string() })
            }
        };
        check_params(spec, &[])?;
        Ok(policy)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Conservative => "conservative",
            Self::Balanced     => "balanced",
            Self::RiskTaking   => "risk_taking",
        }
    }

    /// Months of operating cost held back before anything is paid out.
    pub fn reserve_months(&self) -> f64 {
        match self {
            Self::Conservative => 6.0,
            Self::Balanced     => 3.0,
            Self::RiskTaking   => 1.0,
        }
    }

    /// Share of cash above the reserve that is distributed.
    pub fn payout_ratio(&self) -> f64 {
        match self {
            Self::Conservative => 0.0,
            Self::Balanced     => 0.5,
            Self::RiskTaking   => 1.0,
        }
    }

    pub fn decide(&self, ctx: &EconomicPolicyContext) -> EconomicDecision {
        let reserve = self.reserve_months() * ctx.avg_monthly_cost.max(0.0);
        let (distribution, reason) = if ctx.cash <= 0.0 {
            (0.0, "no cash to distribute".to_string())
        } else {
            let surplus = (ctx.cash - reserve).max(0.0);
            (
                surplus * self.payout_ratio(),
                format!("surplus {surplus:.2} above reserve {reserve:.2}"),
            )
        };
        EconomicDecision {
            reserve_target: reserve,
            distribution,
            policy_name: self.name(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(cash: f64) -> EconomicPolicyContext {
        EconomicPolicyContext {
            cash,
            avg_monthly_cost: 1_000.0,
            month_revenue: 0.0,
            month_cost: 1_000.0,
        }
    }

    #[test]
    fn balanced_pays_half_of_surplus() {
        let d = EconomicPolicy::Balanced.decide(&ctx(5_000.0));
        assert_eq!(d.reserve_target, 3_000.0);
        assert_eq!(d.distribution, 1_000.0);
    }

    #[test]
    fn conservative_never_pays_out() {
        assert_eq!(EconomicPolicy::Conservative.decide(&ctx(100_000.0)).distribution, 0.0);
    }

    #[test]
    fn negative_cash_pays_nothing() {
        assert_eq!(EconomicPolicy::RiskTaking.decide(&ctx(-10.0)).distribution, 0.0);
    }
}
