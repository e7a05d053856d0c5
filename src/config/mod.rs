//! Configuration system (layered: defaults < TOML file < env).

pub mod provider;

pub use provider::{ProviderConfig, ProviderKind, DEFAULT_PROVIDER_TIMEOUT_MS};

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent::StrategyKind;
use crate::error::{ComposerError, Result};
use crate::util::retry::RetryConfig;

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub providers: Vec<ProviderConfig>,
    /// Logical slot used when a session has no explicit provider.
    pub active_provider: String,
    pub health: HealthConfig,
    pub session: SessionConfig,
    pub agent: AgentConfig,
    pub store: StoreConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            providers: vec![ProviderConfig::new(
                "local",
                ProviderKind::Ollama,
                "http://localhost:11434",
                "llama3.1",
            )
            .with_tool_calling(true)],
            active_provider: "local".to_string(),
            health: HealthConfig::default(),
            session: SessionConfig::default(),
            agent: AgentConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

/// Health probing and circuit-breaker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub probe_interval_ms: u64,
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// Time an open breaker waits before a half-open probe.
    pub cooldown_ms: u64,
    /// Successful probes slower than this are reported as degraded.
    pub degraded_latency_ms: u64,
    pub probe_timeout_ms: u64,
    /// Probe results retained per provider.
    pub history_len: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_interval_ms: 30_000,
            failure_threshold: 3,
            cooldown_ms: 60_000,
            degraded_latency_ms: 5_000,
            probe_timeout_ms: 10_000,
            history_len: 20,
        }
    }
}

impl HealthConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Session lifecycle settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub inactivity_timeout_secs: u64,
    /// Upper bound on a whole turn, including retries and tool calls.
    pub turn_timeout_ms: u64,
    /// Messages of history handed to the model per turn.
    pub history_window: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: 1_800,
            turn_timeout_ms: 60_000,
            history_window: 20,
        }
    }
}

impl SessionConfig {
    pub fn turn_timeout(&self) -> Duration {
        Duration::from_millis(self.turn_timeout_ms)
    }

    pub fn inactivity_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.inactivity_timeout_secs as i64)
    }
}

/// Agent strategy settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub default_strategy: StrategyKind,
    pub max_react_iterations: usize,
    /// Bound on the check_tickets/add_ticket_type loop.
    pub max_ticket_iterations: usize,
    pub tool_timeout_ms: u64,
    pub retry: RetryConfig,
    /// Fall over to the next healthy slot when the preferred one is open.
    pub failover: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            default_strategy: StrategyKind::Workflow,
            max_react_iterations: 6,
            max_ticket_iterations: 5,
            tool_timeout_ms: 10_000,
            retry: RetryConfig::default(),
            failover: true,
        }
    }
}

impl AgentConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }
}

/// Which conversation store backs the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl StoreConfig {
    /// Explicit directory, or the platform data directory.
    pub fn resolved_dir(&self) -> Option<PathBuf> {
        self.dir.clone().or_else(|| {
            directories::ProjectDirs::from("org", "homeschool", "event-composer")
                .map(|dirs| dirs.data_dir().join("sessions"))
        })
    }
}

impl EngineConfig {
    /// Load configuration: defaults, then the TOML file (if any), then env.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error

        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| ComposerError::Configuration(e.to_string()))
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(active) = lookup("EVENT_COMPOSER_ACTIVE_PROVIDER") {
            self.active_provider = active;
        }
        if let Some(strategy) = lookup("EVENT_COMPOSER_STRATEGY") {
            self.agent.default_strategy = strategy.parse().map_err(|_| {
                ComposerError::Configuration(format!("unknown strategy '{strategy}'"))
            })?;
        }
        if let Some(dir) = lookup("EVENT_COMPOSER_STORE_DIR") {
            self.store.kind = StoreKind::File;
            self.store.dir = Some(PathBuf::from(dir));
        }
        if let Some(ms) = lookup("EVENT_COMPOSER_TURN_TIMEOUT_MS") {
            self.session.turn_timeout_ms = ms.parse().map_err(|_| {
                ComposerError::Configuration(format!(
                    "EVENT_COMPOSER_TURN_TIMEOUT_MS must be an integer, got '{ms}'"
                ))
            })?;
        }

        let url_mappings = [
            ("OLLAMA_BASE_URL", ProviderKind::Ollama),
            ("OPENAI_BASE_URL", ProviderKind::OpenAiCompatible),
            ("ANTHROPIC_BASE_URL", ProviderKind::Anthropic),
        ];
        for (env_var, kind) in url_mappings {
            if let Some(url) = lookup(env_var) {
                for provider in self.providers.iter_mut().filter(|p| p.kind == kind) {
                    provider.endpoint = url.clone();
                }
            }
        }
        Ok(())
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(ComposerError::Configuration(msg));

        if self.providers.is_empty() {
            return invalid("at least one provider must be configured".into());
        }
        let mut seen = std::collections::HashSet::new();
        for provider in &self.providers {
            if provider.id.trim().is_empty() {
                return invalid("provider id must not be empty".into());
            }
            if !seen.insert(provider.id.as_str()) {
                return invalid(format!("duplicate provider id '{}'", provider.id));
            }
            if provider.timeout_ms == 0 {
                return invalid(format!("provider '{}' has a zero timeout", provider.id));
            }
            if provider.kind != ProviderKind::Scripted && provider.endpoint.trim().is_empty() {
                return invalid(format!("provider '{}' has no endpoint", provider.id));
            }
        }
        if !seen.contains(self.active_provider.as_str()) {
            return invalid(format!(
                "active provider '{}' is not configured",
                self.active_provider
            ));
        }
        if self.health.failure_threshold == 0 {
            return invalid("health.failure_threshold must be at least 1".into());
        }
        if self.health.probe_timeout_ms == 0 || self.health.history_len == 0 {
            return invalid("health probe timeout and history length must be non-zero".into());
        }
        if self.session.turn_timeout_ms == 0 {
            return invalid("session.turn_timeout_ms must be non-zero".into());
        }
        if self.agent.max_react_iterations == 0 || self.agent.tool_timeout_ms == 0 {
            return invalid("agent iteration bound and tool timeout must be non-zero".into());
        }
        Ok(())
    }

    pub fn provider(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.id == id)
    }
}
