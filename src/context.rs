//! Shared collaborators and per-turn context handed to strategies.

use std::sync::Arc;

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use crate::config::AgentConfig;
use crate::error::ProviderError;
use crate::event::{AvailabilityCalendar, EventDraft};
use crate::provider::gateway::Routed;
use crate::provider::{ProviderGateway, ProviderRequest, ToolMode};
use crate::tools::{ToolContext, ToolInvocation, ToolRegistry};
use crate::types::ToolCall;

/// Process-wide collaborators shared by every session.
#[derive(Clone)]
pub struct EngineContext {
    pub gateway: ProviderGateway,
    pub tools: Arc<ToolRegistry>,
    pub calendar: Arc<dyn AvailabilityCalendar>,
    pub agent: AgentConfig,
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("gateway", &self.gateway)
            .field("tools", &self.tools)
            .field("agent", &self.agent)
            .finish()
    }
}

/// Everything one turn needs besides its state.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub engine: Arc<EngineContext>,
    /// Pinned provider slot; `None` follows the active slot.
    pub provider_slot: Option<String>,
    pub cancel: CancellationToken,
    pub today: NaiveDate,
}

impl TurnContext {
    pub fn new(engine: Arc<EngineContext>, today: NaiveDate) -> Self {
        Self {
            engine,
            provider_slot: None,
            cancel: CancellationToken::new(),
            today,
        }
    }

    pub fn with_provider_slot(mut self, slot: Option<String>) -> Self {
        self.provider_slot = slot;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn generate(
        &self,
        request: &ProviderRequest,
        mode: ToolMode,
    ) -> Result<Routed, ProviderError> {
        self.engine
            .gateway
            .generate(self.provider_slot.as_deref(), request, mode)
            .await
    }

    /// Dispatch `call` against `draft`, committing the draft only when the
    /// call succeeds.
    pub async fn dispatch(&self, call: &ToolCall, draft: &mut Option<EventDraft>) -> ToolInvocation {
        let mut tool_ctx = ToolContext::new(draft.clone(), self.engine.calendar.clone(), self.today);
        let invocation = self.engine.tools.dispatch(call, &mut tool_ctx).await;
        if invocation.is_success() {
            *draft = tool_ctx.draft;
        }
        invocation
    }
}
