//! Single-shot strategy.

use super::{conversation, execute_calls, finish, prompts, Turn, TurnReply};
use crate::context::TurnContext;
use crate::error::ComposerError;
use crate::provider::{ProviderRequest, ToolMode};
use crate::workflow::EventCreationState;

/// One provider call with every tool exposed; whatever calls come back are
/// executed once and the turn ends.
///
/// Works with chat-only providers through text tool calls, which makes it
/// the low-latency fallback when capability is limited.
#[derive(Debug, Clone)]
pub struct DirectStrategy {
    history_window: usize,
}

impl DirectStrategy {
    pub fn new(history_window: usize) -> Self {
        Self { history_window }
    }

    pub async fn handle(
        &self,
        state: &mut EventCreationState,
        turn: Turn<'_>,
        ctx: &TurnContext,
    ) -> Result<TurnReply, ComposerError> {
        state.begin_run(turn.text, ctx.today);
        let request = ProviderRequest::new(conversation(state, turn, ctx, self.history_window))
            .with_tools(ctx.engine.tools.definitions());

        let routed = ctx.generate(&request, ToolMode::Auto).await?;
        state.served_by = Some(routed.provider_id);
        let response = routed.response;

        let mut applied = Vec::new();
        execute_calls(state, ctx, &response.tool_calls, &mut applied).await?;

        let reply = if response.tool_calls.is_empty() && !response.content.trim().is_empty() {
            response.content
        } else {
            prompts::draft_reply(state.draft.as_ref(), &state.issues)
        };
        Ok(finish(state, reply))
    }
}
