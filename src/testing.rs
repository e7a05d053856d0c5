//! Fixtures shared by unit tests.

use std::sync::Arc;

use crate::config::{AgentConfig, HealthConfig, ProviderConfig};
use crate::context::EngineContext;
use crate::event::InMemoryCalendar;
use crate::health::HealthService;
use crate::provider::{ModelProvider, ProviderGateway, ProviderRegistry, ScriptedProvider};
use crate::tools::default_registry;
use crate::util::retry::RetryPolicy;

/// Engine over one tool-capable scripted provider in slot `local`.
pub(crate) fn engine_with(
    script: impl FnOnce(&ScriptedProvider),
) -> (Arc<EngineContext>, Arc<ScriptedProvider>) {
    engine_with_config(ProviderConfig::scripted("local", true), script)
}

pub(crate) fn engine_with_config(
    config: ProviderConfig,
    script: impl FnOnce(&ScriptedProvider),
) -> (Arc<EngineContext>, Arc<ScriptedProvider>) {
    let provider = Arc::new(ScriptedProvider::new(config));
    script(&provider);

    let registry = Arc::new(ProviderRegistry::new(vec![provider.clone() as Arc<dyn ModelProvider>]).unwrap());
    let health = HealthService::new(registry.clone(), HealthConfig::default());
    let agent = AgentConfig::default();
    let engine = EngineContext {
        gateway: ProviderGateway::new(registry, health.handle(), RetryPolicy::none(), false),
        tools: Arc::new(default_registry(agent.tool_timeout())),
        calendar: Arc::new(InMemoryCalendar::new()),
        agent,
    };
    (Arc::new(engine), provider)
}
