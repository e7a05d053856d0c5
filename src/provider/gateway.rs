//! The single call path from strategies to providers.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{ProviderError, ProviderErrorKind};
use crate::health::{CallOutcome, HealthHandle};
use crate::util::retry::RetryPolicy;

use super::{invoke, ModelProvider, ProviderRegistry, ProviderRequest, ProviderResponse, ToolMode};

/// Resolves provider slots and wraps every call with the circuit breaker,
/// failover, per-call timeout and retry policy. Every attempted call is
/// reported to the health service.
#[derive(Clone)]
pub struct ProviderGateway {
    registry: Arc<ProviderRegistry>,
    health: HealthHandle,
    retry: RetryPolicy,
    failover: bool,
}

impl std::fmt::Debug for ProviderGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderGateway")
            .field("registry", &self.registry)
            .field("retry", &self.retry)
            .field("failover", &self.failover)
            .finish()
    }
}

/// A response together with the slot that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Routed {
    pub provider_id: String,
    pub response: ProviderResponse,
}

impl ProviderGateway {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        health: HealthHandle,
        retry: RetryPolicy,
        failover: bool,
    ) -> Self {
        Self {
            registry,
            health,
            retry,
            failover,
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn health(&self) -> &HealthHandle {
        &self.health
    }

    /// Whether the slot that would serve `slot` supports native tool calls.
    pub fn supports_tools(&self, slot: Option<&str>) -> bool {
        self.registry
            .resolve(slot)
            .is_ok_and(|p| p.capabilities().supports_tools)
    }

    /// Generate through `slot` (or the active slot).
    ///
    /// Short-circuited slots are skipped without contacting the backend.
    /// With failover enabled, a slot that is open, unreachable or timing out
    /// hands the call to the next slot; other errors are returned as is.
    pub async fn generate(
        &self,
        slot: Option<&str>,
        request: &ProviderRequest,
        mode: ToolMode,
    ) -> Result<Routed, ProviderError> {
        let preferred = slot
            .map(str::to_string)
            .unwrap_or_else(|| self.registry.active_id());

        let candidates: Vec<Arc<dyn ModelProvider>> = if self.failover {
            self.registry.fallback_order(&preferred)
        } else {
            self.registry.get(&preferred).into_iter().collect()
        };
        if candidates.is_empty() {
            return Err(ProviderError::unreachable(
                preferred,
                "no provider registered for slot",
            ));
        }

        let mut last_error = None;
        for provider in candidates {
            let id = provider.describe().id.clone();
            if self.health.is_short_circuited(&id) {
                debug!(provider = %id, "circuit open, skipping provider");
                last_error.get_or_insert_with(|| ProviderError::circuit_open(&id));
                continue;
            }

            match self.call(provider.as_ref(), request, mode).await {
                Ok(response) => {
                    if id != preferred {
                        warn!(preferred = %preferred, provider = %id, "served by fallback provider");
                    }
                    return Ok(Routed {
                        provider_id: id,
                        response,
                    });
                }
                Err(e) if fails_over(e.kind) => {
                    warn!(provider = %id, error = %e, "provider failed, trying next");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| ProviderError::circuit_open(preferred)))
    }

    async fn call(
        &self,
        provider: &dyn ModelProvider,
        request: &ProviderRequest,
        mode: ToolMode,
    ) -> Result<ProviderResponse, ProviderError> {
        let id = provider.describe().id.clone();
        let timeout = provider.describe().timeout();

        self.retry
            .execute(|| {
                let id = id.clone();
                async move {
                    let started = Instant::now();
                    let result = invoke(provider, request, mode, timeout).await;
                    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                    self.health
                        .report(CallOutcome {
                            provider_id: id.clone(),
                            latency_ms,
                            error: result.as_ref().err().map(|e| e.kind),
                        })
                        .await;
                    debug!(provider = %id, latency_ms, ok = result.is_ok(), "provider call");
                    result
                }
            })
            .await
    }
}

fn fails_over(kind: ProviderErrorKind) -> bool {
    matches!(
        kind,
        ProviderErrorKind::Unreachable | ProviderErrorKind::Timeout | ProviderErrorKind::CircuitOpen
    )
}
