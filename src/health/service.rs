//! Health service: single writer of health and breaker state.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use futures::future::join_all;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::HealthConfig;
use crate::error::{ComposerError, ProviderErrorKind, Result};
use crate::provider::{ModelProvider, ProviderRegistry};

use super::breaker::{CircuitBreaker, Transition};
use super::probe::probe_provider;
use super::{
    HealthCheckResult, HealthSnapshot, HealthStatus, ProviderHealth, SystemHealth,
};

/// Outcomes queued for the background monitor before new ones are dropped.
pub const OUTCOME_QUEUE_CAPACITY: usize = 256;

/// Result of one live provider call, reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    pub provider_id: String,
    pub latency_ms: u64,
    /// `None` on success.
    pub error: Option<ProviderErrorKind>,
}

/// Read side of the health service, cheap to clone.
///
/// Reads never wait on the writer: they borrow the latest published
/// snapshot.
#[derive(Clone)]
pub struct HealthHandle {
    snapshot: watch::Receiver<HealthSnapshot>,
    writer: Arc<HealthService>,
    registry: Arc<ProviderRegistry>,
}

impl std::fmt::Debug for HealthHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthHandle")
            .field("version", &self.snapshot.borrow().version)
            .finish()
    }
}

impl HealthHandle {
    pub fn snapshot(&self) -> HealthSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn is_short_circuited(&self, provider_id: &str) -> bool {
        self.snapshot.borrow().is_short_circuited(provider_id)
    }

    /// Hand a live call outcome to the writer.
    ///
    /// With the monitor running the outcome is queued and applied by the
    /// monitor task; otherwise it is applied before this returns.
    pub async fn report(&self, outcome: CallOutcome) {
        self.writer.accept_outcome(outcome).await;
    }

    /// Outcomes discarded because the monitor's queue was full.
    pub fn dropped_outcomes(&self) -> u64 {
        self.writer.dropped_outcomes()
    }

    pub fn system_health(&self) -> SystemHealth {
        SystemHealth::from_snapshot(&self.snapshot.borrow(), &self.registry.active_id())
    }

    /// Wait until a snapshot newer than the last one seen is published.
    pub async fn changed(&mut self) -> bool {
        self.snapshot.changed().await.is_ok()
    }
}

struct Tracked {
    breaker: CircuitBreaker,
    status: HealthStatus,
    last_check: Option<HealthCheckResult>,
    history: VecDeque<HealthCheckResult>,
    last_probe_at: Option<Instant>,
}

struct WriterState {
    providers: BTreeMap<String, Tracked>,
    version: u64,
}

/// Periodic prober and owner of every circuit breaker.
pub struct HealthService {
    registry: Arc<ProviderRegistry>,
    config: HealthConfig,
    state: Mutex<WriterState>,
    snapshot_tx: watch::Sender<HealthSnapshot>,
    outcome_tx: mpsc::Sender<CallOutcome>,
    outcome_rx: StdMutex<Option<mpsc::Receiver<CallOutcome>>>,
    monitor_running: AtomicBool,
    dropped: AtomicU64,
}

impl HealthService {
    pub fn new(registry: Arc<ProviderRegistry>, config: HealthConfig) -> Arc<Self> {
        let (outcome_tx, outcome_rx) = mpsc::channel(OUTCOME_QUEUE_CAPACITY);
        let mut state = WriterState {
            providers: BTreeMap::new(),
            version: 0,
        };
        for id in registry.ids() {
            state.providers.insert(id, Self::tracked(&config));
        }
        let (snapshot_tx, _) = watch::channel(Self::build_snapshot(&state, &registry.ids()));

        Arc::new(Self {
            registry,
            config,
            state: Mutex::new(state),
            snapshot_tx,
            outcome_tx,
            outcome_rx: StdMutex::new(Some(outcome_rx)),
            monitor_running: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        })
    }

    pub fn handle(self: &Arc<Self>) -> HealthHandle {
        HealthHandle {
            snapshot: self.snapshot_tx.subscribe(),
            writer: Arc::clone(self),
            registry: Arc::clone(&self.registry),
        }
    }

    pub fn dropped_outcomes(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    async fn accept_outcome(&self, outcome: CallOutcome) {
        if !self.monitor_running.load(Ordering::Acquire) {
            self.apply_pending().await;
            let mut state = self.state.lock().await;
            self.apply_outcome(&mut state, &outcome);
            self.publish(&mut state);
            return;
        }
        match self.outcome_tx.try_send(outcome) {
            Ok(()) => {}
            Err(TrySendError::Full(outcome)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    provider = %outcome.provider_id,
                    dropped,
                    capacity = OUTCOME_QUEUE_CAPACITY,
                    "health outcome queue full, outcome dropped"
                );
            }
            Err(TrySendError::Closed(outcome)) => {
                debug!(provider = %outcome.provider_id, "health monitor gone, outcome dropped");
            }
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    fn tracked(config: &HealthConfig) -> Tracked {
        Tracked {
            breaker: CircuitBreaker::new(config.failure_threshold, config.cooldown()),
            status: HealthStatus::Healthy,
            last_check: None,
            history: VecDeque::with_capacity(config.history_len),
            last_probe_at: None,
        }
    }

    /// Probe every registered provider concurrently.
    pub async fn probe_all(&self) -> Vec<HealthCheckResult> {
        let targets: Vec<_> = self
            .registry
            .ids()
            .into_iter()
            .filter_map(|id| self.registry.get(&id))
            .collect();
        self.probe_and_record(targets).await
    }

    /// Probe one provider on demand (admin diagnostics).
    pub async fn test_provider(&self, provider_id: &str) -> Result<HealthCheckResult> {
        let provider = self.registry.get(provider_id).ok_or_else(|| {
            ComposerError::Configuration(format!("unknown provider '{provider_id}'"))
        })?;
        self.probe_and_record(vec![provider])
            .await
            .pop()
            .ok_or_else(|| ComposerError::InvalidState("probe produced no result".into()))
    }

    /// Override a provider's status. `Unavailable` opens its breaker,
    /// `Healthy` closes it.
    pub async fn force_status(&self, provider_id: &str, status: HealthStatus) -> Result<()> {
        if !self.registry.contains(provider_id) {
            return Err(ComposerError::Configuration(format!(
                "unknown provider '{provider_id}'"
            )));
        }
        let mut state = self.state.lock().await;
        let tracked = state
            .providers
            .entry(provider_id.to_string())
            .or_insert_with(|| Self::tracked(&self.config));
        tracked.status = status;
        match status {
            HealthStatus::Unavailable => tracked.breaker.trip(Instant::now()),
            HealthStatus::Healthy => tracked.breaker.reset(),
            HealthStatus::Degraded => {}
        }
        warn!(provider = provider_id, %status, "provider status forced");
        self.publish(&mut state);
        Ok(())
    }

    /// Apply call outcomes still queued from a monitor that has stopped.
    /// Returns how many were applied.
    pub async fn apply_pending(&self) -> usize {
        let drained: Vec<CallOutcome> = {
            let mut guard = self.outcome_rx.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(rx) = guard.as_mut() else {
                return 0;
            };
            std::iter::from_fn(|| rx.try_recv().ok()).collect()
        };
        if drained.is_empty() {
            return 0;
        }
        let mut state = self.state.lock().await;
        for outcome in &drained {
            self.apply_outcome(&mut state, outcome);
        }
        self.publish(&mut state);
        drained.len()
    }

    /// One scheduling round: half-open probes for breakers whose cooldown
    /// elapsed, and regular probes for providers due for one.
    pub async fn tick(&self) {
        self.apply_pending().await;

        let now = Instant::now();
        let due: Vec<String> = {
            let mut state = self.state.lock().await;
            for id in self.registry.ids() {
                state
                    .providers
                    .entry(id)
                    .or_insert_with(|| Self::tracked(&self.config));
            }
            let mut due = Vec::new();
            for (id, tracked) in state.providers.iter_mut() {
                if tracked.breaker.half_open_due(now) {
                    tracked.breaker.begin_half_open();
                    info!(provider = %id, "circuit half-open, probing for recovery");
                    due.push(id.clone());
                } else if tracked.breaker.allows_calls()
                    && tracked.last_probe_at.map_or(true, |at| {
                        now.saturating_duration_since(at) >= self.config.probe_interval()
                    })
                {
                    due.push(id.clone());
                }
            }
            self.publish(&mut state);
            due
        };

        let targets: Vec<_> = due.iter().filter_map(|id| self.registry.get(id)).collect();
        if !targets.is_empty() {
            self.probe_and_record(targets).await;
        }
    }

    /// Run the monitor until `cancel` fires.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let rx = self
            .outcome_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let owns_queue = rx.is_some();
        if owns_queue {
            self.monitor_running.store(true, Ordering::Release);
        }

        tokio::spawn(async move {
            let period = self.config.probe_interval().min(self.config.cooldown());
            let mut interval = tokio::time::interval(period.max(std::time::Duration::from_millis(10)));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut rx = rx;

            info!("health monitor started");
            loop {
                // Outcomes are applied before the next probe round.
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    Some(outcome) = recv_outcome(&mut rx) => {
                        let mut state = self.state.lock().await;
                        self.apply_outcome(&mut state, &outcome);
                        self.publish(&mut state);
                    }
                    _ = interval.tick() => self.tick().await,
                }
            }
            if owns_queue {
                if let Some(rx) = rx {
                    *self.outcome_rx.lock().unwrap_or_else(PoisonError::into_inner) = Some(rx);
                }
                self.monitor_running.store(false, Ordering::Release);
                self.apply_pending().await;
            }
            info!("health monitor stopped");
        })
    }

    async fn probe_and_record(&self, targets: Vec<Arc<dyn ModelProvider>>) -> Vec<HealthCheckResult> {
        let results = join_all(
            targets
                .iter()
                .map(|p| probe_provider(p.as_ref(), &self.config)),
        )
        .await;

        let now = Instant::now();
        let mut state = self.state.lock().await;
        for result in &results {
            let tracked = state
                .providers
                .entry(result.provider_id.clone())
                .or_insert_with(|| Self::tracked(&self.config));
            Self::record_probe(&self.config, tracked, result.clone(), now);
        }
        self.publish(&mut state);
        results
    }

    fn record_probe(config: &HealthConfig, tracked: &mut Tracked, result: HealthCheckResult, now: Instant) {
        let id = result.provider_id.clone();
        tracked.status = result.status;
        tracked.last_probe_at = Some(now);

        let transition = if result.status == HealthStatus::Unavailable {
            tracked.breaker.record_failure(now)
        } else {
            tracked.breaker.record_success()
        };
        match transition {
            Transition::Tripped => warn!(
                provider = %id,
                failures = tracked.breaker.consecutive_failures(),
                detail = result.detail.as_deref().unwrap_or(""),
                "circuit breaker opened"
            ),
            Transition::Recovered => info!(provider = %id, "circuit breaker closed, provider recovered"),
            Transition::Unchanged => debug!(provider = %id, status = %result.status, "probe recorded"),
        }

        if tracked.history.len() >= config.history_len {
            tracked.history.pop_front();
        }
        tracked.history.push_back(result.clone());
        tracked.last_check = Some(result);
    }

    fn apply_outcome(&self, state: &mut WriterState, outcome: &CallOutcome) {
        let tracked = state
            .providers
            .entry(outcome.provider_id.clone())
            .or_insert_with(|| Self::tracked(&self.config));
        match outcome.error {
            None => {
                if tracked.breaker.record_success() == Transition::Recovered {
                    tracked.status = HealthStatus::Healthy;
                    info!(provider = %outcome.provider_id, "circuit breaker closed after a live call succeeded");
                }
            }
            Some(kind) if kind.counts_against_health() => {
                if tracked.breaker.record_failure(Instant::now()) == Transition::Tripped {
                    tracked.status = HealthStatus::Unavailable;
                    warn!(
                        provider = %outcome.provider_id,
                        error = %kind,
                        failures = tracked.breaker.consecutive_failures(),
                        "circuit breaker opened after live call failures"
                    );
                }
            }
            Some(_) => {}
        }
    }

    fn publish(&self, state: &mut WriterState) {
        state.version += 1;
        let snapshot = Self::build_snapshot(state, &self.registry.ids());
        self.snapshot_tx.send_replace(snapshot);
    }

    fn build_snapshot(state: &WriterState, ids: &[String]) -> HealthSnapshot {
        let providers = ids
            .iter()
            .map(|id| {
                let health = match state.providers.get(id) {
                    Some(t) => ProviderHealth {
                        provider_id: id.clone(),
                        status: t.status,
                        breaker: t.breaker.state(),
                        consecutive_failures: t.breaker.consecutive_failures(),
                        last_check: t.last_check.clone(),
                        history: t.history.iter().cloned().collect(),
                    },
                    None => ProviderHealth::unprobed(id.clone()),
                };
                (id.clone(), health)
            })
            .collect();
        HealthSnapshot {
            providers,
            version: state.version,
        }
    }
}

async fn recv_outcome(rx: &mut Option<mpsc::Receiver<CallOutcome>>) -> Option<CallOutcome> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::health::BreakerState;
    use crate::provider::ScriptedProvider;
    use std::time::Duration;

    fn setup(ids: &[&str]) -> (Arc<HealthService>, Vec<Arc<ScriptedProvider>>) {
        let scripted: Vec<Arc<ScriptedProvider>> = ids
            .iter()
            .map(|id| Arc::new(ScriptedProvider::new(ProviderConfig::scripted(*id, false))))
            .collect();
        let providers = scripted
            .iter()
            .map(|p| Arc::clone(p) as Arc<dyn ModelProvider>)
            .collect();
        let registry = Arc::new(ProviderRegistry::new(providers).unwrap());
        let config = HealthConfig {
            failure_threshold: 2,
            cooldown_ms: 1_000,
            ..HealthConfig::default()
        };
        (HealthService::new(registry, config), scripted)
    }

    fn failure(id: &str) -> CallOutcome {
        CallOutcome {
            provider_id: id.into(),
            latency_ms: 5,
            error: Some(ProviderErrorKind::Unreachable),
        }
    }

    #[tokio::test]
    async fn live_failures_trip_the_breaker() {
        let (service, _) = setup(&["a"]);
        let handle = service.handle();

        handle.report(failure("a")).await;
        assert!(!handle.is_short_circuited("a"));
        handle.report(failure("a")).await;

        assert!(handle.is_short_circuited("a"));
        assert_eq!(
            handle.snapshot().provider("a").unwrap().breaker,
            BreakerState::Open
        );
    }

    #[tokio::test]
    async fn capability_errors_do_not_count() {
        let (service, _) = setup(&["a"]);
        let handle = service.handle();
        for _ in 0..5 {
            handle
                .report(CallOutcome {
                    provider_id: "a".into(),
                    latency_ms: 1,
                    error: Some(ProviderErrorKind::CapabilityUnsupported),
                })
                .await;
        }
        assert!(!handle.is_short_circuited("a"));
    }

    #[tokio::test]
    async fn forced_unavailable_opens_and_healthy_closes() {
        let (service, _) = setup(&["a", "b"]);
        let handle = service.handle();

        service.force_status("a", HealthStatus::Unavailable).await.unwrap();
        assert!(handle.is_short_circuited("a"));
        assert_eq!(handle.system_health().status, HealthStatus::Degraded);

        service.force_status("a", HealthStatus::Healthy).await.unwrap();
        assert!(!handle.is_short_circuited("a"));
        assert_eq!(handle.system_health().status, HealthStatus::Healthy);

        assert!(service.force_status("zzz", HealthStatus::Healthy).await.is_err());
    }

    #[tokio::test]
    async fn probe_history_is_bounded() {
        let (service, _) = setup(&["a"]);
        for _ in 0..25 {
            service.test_provider("a").await.unwrap();
        }
        let snapshot = service.handle().snapshot();
        let health = snapshot.provider("a").unwrap();
        assert_eq!(health.history.len(), 20);
        assert!(health.last_check.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_probe_recovers_after_cooldown() {
        let (service, providers) = setup(&["a"]);
        let handle = service.handle();

        providers[0].set_reachable(false);
        service.probe_all().await;
        service.probe_all().await;
        assert!(handle.is_short_circuited("a"));

        providers[0].set_reachable(true);
        service.tick().await;
        assert!(handle.is_short_circuited("a"), "still cooling down");

        tokio::time::advance(Duration::from_millis(1_001)).await;
        service.tick().await;
        assert!(!handle.is_short_circuited("a"));
        assert_eq!(
            handle.snapshot().provider("a").unwrap().status,
            HealthStatus::Healthy
        );
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_monitor_applies_outcomes_and_stops_on_cancel() {
        let (service, _) = setup(&["a"]);
        let mut handle = service.handle();
        let cancel = CancellationToken::new();
        let task = Arc::clone(&service).spawn(cancel.clone());

        handle.report(failure("a")).await;
        handle.report(failure("a")).await;
        while !handle.is_short_circuited("a") {
            assert!(handle.changed().await);
        }

        cancel.cancel();
        task.await.unwrap();

        // Once stopped, outcomes are applied by the reporting task again.
        handle
            .report(CallOutcome {
                provider_id: "a".into(),
                latency_ms: 1,
                error: None,
            })
            .await;
        assert_eq!(handle.snapshot().provider("a").unwrap().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn full_outcome_queue_drops_and_counts() {
        let (service, _) = setup(&["a"]);
        let handle = service.handle();
        // Stand in for a monitor that has stalled on a probe round.
        service.monitor_running.store(true, Ordering::Release);

        for _ in 0..OUTCOME_QUEUE_CAPACITY + 3 {
            handle.report(failure("a")).await;
        }

        assert_eq!(handle.dropped_outcomes(), 3);
        assert!(!handle.is_short_circuited("a"));

        service.monitor_running.store(false, Ordering::Release);
        assert_eq!(service.apply_pending().await, OUTCOME_QUEUE_CAPACITY);
        assert!(handle.is_short_circuited("a"));
    }
}
