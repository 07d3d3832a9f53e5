// crates/opspilot-security/src/health.rs
// ============================================================================
// Module: Health Aggregator
// Description: Rolls up per-module health into one worst-status verdict.
// Purpose: Back the readiness probe and human-facing health dumps with a
// single signal, independent of liveness.
// Dependencies: opspilot-core
// ============================================================================

//! ## Overview
//! [`aggregate`] takes the worst [`HealthStatus`] across every reported
//! module: any `unhealthy` wins outright, else any `degraded` wins, else the
//! system is `healthy`. An empty module set aggregates to `healthy` (there
//! is nothing to be unhealthy about). Liveness is a separate, always-200
//! concern the aggregator does not model: a process that can still answer
//! is live even if every module it hosts reports unhealthy.

use std::collections::BTreeMap;

use opspilot_core::Health;
use opspilot_core::HealthStatus;
use opspilot_core::ModuleId;

/// System-wide readiness verdict produced by [`aggregate`].
#[derive(Debug, Clone)]
pub struct ReadinessReport {
    /// Worst status across all reported modules.
    pub status: HealthStatus,
    /// Per-module health, for human-facing dumps.
    pub modules: BTreeMap<ModuleId, Health>,
}

impl ReadinessReport {
    /// Readiness as an HTTP-style status code: `200` when healthy or
    /// degraded (still serving), `503` when any module is unhealthy.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        if self.status == HealthStatus::Unhealthy {
            503
        } else {
            200
        }
    }
}

/// Aggregates `module_healths` into a single [`ReadinessReport`] carrying
/// the worst status among them (`healthy` when the map is empty).
#[must_use]
pub fn aggregate(module_healths: BTreeMap<ModuleId, Health>) -> ReadinessReport {
    let status = module_healths.values().map(|health| health.status).max().unwrap_or(HealthStatus::Healthy);
    ReadinessReport { status, modules: module_healths }
}

/// Liveness is independent of module health: a running process is always
/// live. Exposed as a function (rather than a constant) so call sites read
/// the same as the readiness path and the distinction from `aggregate` is
/// explicit at the call site.
#[must_use]
pub const fn is_live() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use opspilot_core::Health;
    use opspilot_core::HealthStatus;
    use opspilot_core::ModuleId;

    use super::aggregate;
    use super::is_live;

    #[test]
    fn empty_module_set_aggregates_to_healthy() {
        let report = aggregate(BTreeMap::new());
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.status_code(), 200);
    }

    #[test]
    fn any_unhealthy_module_wins_outright() {
        let mut modules = BTreeMap::new();
        modules.insert(ModuleId::new("detector.threshold.cpu"), Health::healthy(0));
        modules.insert(ModuleId::new("connector.tail.app"), Health::unhealthy("file not found", 0));
        let report = aggregate(modules);
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.status_code(), 503);
    }

    #[test]
    fn degraded_wins_over_healthy_but_not_over_unhealthy() {
        let mut modules = BTreeMap::new();
        modules.insert(ModuleId::new("a"), Health::healthy(0));
        modules.insert(
            ModuleId::new("b"),
            Health { status: HealthStatus::Degraded, message: None, details: None, checked_at: 0 },
        );
        let report = aggregate(modules);
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.status_code(), 200);
    }

    #[test]
    fn liveness_is_always_true() {
        assert!(is_live());
    }
}
