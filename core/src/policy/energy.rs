//! Energy policies. The dispatch order is fixed in the energy subsystem;
//! a policy only sets flags that reshape it.

use super::check_params;
use crate::{
    config::PolicySpec,
    error::{SimError, SimResult},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct EnergyPolicyContext {
    pub demand_kwh: f64,
    pub renewable_kwh: f64,
    pub battery_soc: f64,
    pub grid_enabled: bool,
}

/// Where battery discharge sits relative to grid import in the merit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DischargePriority {
    BeforeGrid,
    AfterGrid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnergyFlags {
    /// Hold the battery at its reserve SOC instead of its minimum.
    pub reserve_battery: bool,
    /// Export surplus to the grid; otherwise surplus is curtailed.
    pub export_surplus: bool,
    pub discharge_priority: DischargePriority,
    pub policy_name: &'static str,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum EnergyPolicy {
    RenewableFirst,
    ResilienceReserve,
    GridFirst,
}

impl EnergyPolicy {
    pub fn from_spec(spec: &PolicySpec) -> SimResult<Self> {
        let policy = match spec.name.as_str() {
            "renewable_first"    => Self::RenewableFirst,
            "resilience_reserve" => Self::ResilienceReserve,
            "grid_first"         => Self::GridFirst,
            other => {
                return Err(SimError::UnknownPolicy { domain: "energy", name: other.to_string() })
            }
        };
        check_params(spec, &[])?;
        Ok(policy)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::RenewableFirst    => "renewable_first",
            Self::ResilienceReserve => "resilience_reserve",
            Self::GridFirst         => "grid_first",
        }
    }

    pub fn decide(&self, ctx: &EnergyPolicyContext) -> EnergyFlags {
        let (reserve_battery, export_surplus, discharge_priority, reason) = match self {
            Self::RenewableFirst => (false, true, DischargePriority::BeforeGrid, "battery before grid"),
            Self::ResilienceReserve => (true, false, DischargePriority::BeforeGrid, "battery reserve held"),
            Self::GridFirst => (false, true, DischargePriority::AfterGrid, "grid before battery"),
        };
        let reason = if ctx.grid_enabled {
            reason.to_string()
        } else {
            format!("{reason}; grid unavailable")
        };
        EnergyFlags {
            reserve_battery,
            export_surplus: export_surplus && ctx.grid_enabled,
            discharge_priority,
            policy_name: self.name(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(grid_enabled: bool) -> EnergyPolicyContext {
        EnergyPolicyContext { demand_kwh: 100.0, renewable_kwh: 50.0, battery_soc: 0.5, grid_enabled }
    }

    #[test]
    fn resilience_reserve_holds_battery_and_curtails() {
        let flags = EnergyPolicy::ResilienceReserve.decide(&ctx(true));
        assert!(flags.reserve_battery);
        assert!(!flags.export_surplus);
    }

    #[test]
    fn no_export_without_grid() {
        let flags = EnergyPolicy::RenewableFirst.decide(&ctx(false));
        assert!(!flags.export_surplus);
        assert_eq!(flags.discharge_priority, DischargePriority::BeforeGrid);
    }

    #[test]
    fn grid_first_discharges_after_grid() {
        assert_eq!(
            EnergyPolicy::GridFirst.decide(&ctx(true)).discharge_priority,
            DischargePriority::AfterGrid
        );
    }
}
