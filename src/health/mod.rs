//! Provider health monitoring and circuit breaking.
//!
//! [`HealthService`] is the only writer of health and breaker state. It
//! publishes immutable [`HealthSnapshot`]s over a watch channel; every
//! session reads them through a cloned [`HealthHandle`] and reports live
//! call outcomes back over an unbounded channel.

pub mod breaker;
pub mod probe;
pub mod service;

pub use breaker::{BreakerState, CircuitBreaker};
pub use probe::PROBE_TOOL;
pub use service::{CallOutcome, HealthHandle, HealthService};

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Status tier of a provider or of the whole system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unavailable,
}

/// Stage of a provider probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProbeKind {
    Connectivity,
    Generation,
    ToolCalling,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeCheck {
    pub kind: ProbeKind,
    pub passed: bool,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Outcome of one probe run against one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub provider_id: String,
    pub checked_at: DateTime<Utc>,
    pub status: HealthStatus,
    /// Latency of the generation check, or of the last check that ran.
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default)]
    pub checks: Vec<ProbeCheck>,
}

/// Current health of one provider slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub provider_id: String,
    pub status: HealthStatus,
    pub breaker: BreakerState,
    pub consecutive_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check: Option<HealthCheckResult>,
    /// Recent probe results, oldest first.
    #[serde(default)]
    pub history: Vec<HealthCheckResult>,
}

impl ProviderHealth {
    /// A slot that has not been probed yet.
    pub fn unprobed(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            status: HealthStatus::Healthy,
            breaker: BreakerState::Closed,
            consecutive_failures: 0,
            last_check: None,
            history: Vec::new(),
        }
    }

    /// Status as seen by callers: a non-closed breaker means unavailable.
    pub fn effective_status(&self) -> HealthStatus {
        if self.breaker == BreakerState::Closed {
            self.status
        } else {
            HealthStatus::Unavailable
        }
    }
}

/// Immutable view of every provider's health.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub providers: BTreeMap<String, ProviderHealth>,
    pub version: u64,
}

impl HealthSnapshot {
    pub fn provider(&self, id: &str) -> Option<&ProviderHealth> {
        self.providers.get(id)
    }

    /// Whether calls to `id` must fail fast.
    pub fn is_short_circuited(&self, id: &str) -> bool {
        self.providers
            .get(id)
            .is_some_and(|p| p.breaker != BreakerState::Closed)
    }

    /// Aggregate status: healthy iff the active provider is healthy,
    /// unavailable iff every provider is unavailable, degraded otherwise.
    pub fn aggregate(&self, active_provider: &str) -> HealthStatus {
        let all_down = !self.providers.is_empty()
            && self
                .providers
                .values()
                .all(|p| p.effective_status() == HealthStatus::Unavailable);
        if all_down {
            return HealthStatus::Unavailable;
        }
        let active = self
            .providers
            .get(active_provider)
            .map(ProviderHealth::effective_status)
            .unwrap_or(HealthStatus::Healthy);
        if active == HealthStatus::Healthy {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        }
    }
}

/// Per-provider line of [`SystemHealth`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderHealthSummary {
    pub provider_id: String,
    pub status: HealthStatus,
    pub breaker: BreakerState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked_at: Option<DateTime<Utc>>,
}

/// Aggregate health report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemHealth {
    pub status: HealthStatus,
    pub active_provider: String,
    pub providers: Vec<ProviderHealthSummary>,
}

impl SystemHealth {
    pub fn from_snapshot(snapshot: &HealthSnapshot, active_provider: &str) -> Self {
        let providers = snapshot
            .providers
            .values()
            .map(|p| ProviderHealthSummary {
                provider_id: p.provider_id.clone(),
                status: p.effective_status(),
                breaker: p.breaker,
                latency_ms: p.last_check.as_ref().map(|c| c.latency_ms),
                detail: p.last_check.as_ref().and_then(|c| c.detail.clone()),
                checked_at: p.last_check.as_ref().map(|c| c.checked_at),
            })
            .collect();
        Self {
            status: snapshot.aggregate(active_provider),
            active_provider: active_provider.to_string(),
            providers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(entries: &[(&str, HealthStatus, BreakerState)]) -> HealthSnapshot {
        let providers = entries
            .iter()
            .map(|(id, status, breaker)| {
                let mut health = ProviderHealth::unprobed(*id);
                health.status = *status;
                health.breaker = *breaker;
                (id.to_string(), health)
            })
            .collect();
        HealthSnapshot {
            providers,
            version: 1,
        }
    }

    #[test]
    fn healthy_when_active_provider_is_healthy() {
        let snap = snapshot(&[
            ("a", HealthStatus::Healthy, BreakerState::Closed),
            ("b", HealthStatus::Unavailable, BreakerState::Open),
        ]);
        assert_eq!(snap.aggregate("a"), HealthStatus::Healthy);
        assert_eq!(snap.aggregate("b"), HealthStatus::Degraded);
    }

    #[test]
    fn unavailable_only_when_every_provider_is_down() {
        let snap = snapshot(&[
            ("a", HealthStatus::Healthy, BreakerState::Open),
            ("b", HealthStatus::Unavailable, BreakerState::Closed),
        ]);
        assert_eq!(snap.aggregate("a"), HealthStatus::Unavailable);
    }

    #[test]
    fn open_breaker_short_circuits() {
        let snap = snapshot(&[
            ("a", HealthStatus::Healthy, BreakerState::Closed),
            ("b", HealthStatus::Degraded, BreakerState::HalfOpen),
        ]);
        assert!(!snap.is_short_circuited("a"));
        assert!(snap.is_short_circuited("b"));
        assert!(!snap.is_short_circuited("unknown"));
    }
}
