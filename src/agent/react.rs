//! Reason/act/observe loop.

use tracing::{debug, warn};

use super::{conversation, execute_calls, finish, prompts, Turn, TurnReply};
use crate::context::TurnContext;
use crate::error::{ComposerError, WorkflowError};
use crate::provider::{ProviderRequest, ToolMode};
use crate::types::ChatMessage;
use crate::workflow::EventCreationState;

/// The model proposes tool calls, the registry executes them and the
/// observations go back to the model, until it answers in text or the
/// iteration bound is hit.
///
/// Needs native tool calling; a chat-only provider fails the turn with
/// `CapabilityUnsupported`.
#[derive(Debug, Clone)]
pub struct ReactStrategy {
    max_iterations: usize,
    history_window: usize,
}

impl ReactStrategy {
    pub fn new(max_iterations: usize, history_window: usize) -> Self {
        Self {
            max_iterations: max_iterations.max(1),
            history_window,
        }
    }

    pub async fn handle(
        &self,
        state: &mut EventCreationState,
        turn: Turn<'_>,
        ctx: &TurnContext,
    ) -> Result<TurnReply, ComposerError> {
        state.begin_run(turn.text, ctx.today);
        let mut messages = conversation(state, turn, ctx, self.history_window);
        let tools = ctx.engine.tools.definitions();
        let mut applied = Vec::new();

        for iteration in 1..=self.max_iterations {
            if ctx.cancel.is_cancelled() {
                return Err(WorkflowError::cancelled(state.current_step).into());
            }
            let request = ProviderRequest::new(messages.clone()).with_tools(tools.clone());
            let routed = ctx.generate(&request, ToolMode::NativeOnly).await?;
            state.served_by = Some(routed.provider_id);
            let response = routed.response;

            if response.tool_calls.is_empty() {
                debug!(iteration, "model answered without tool calls");
                let reply = if response.content.trim().is_empty() {
                    prompts::draft_reply(state.draft.as_ref(), &state.issues)
                } else {
                    response.content
                };
                return Ok(finish(state, reply));
            }

            debug!(iteration, calls = response.tool_calls.len(), "executing tool calls");
            messages.push(ChatMessage::assistant_tool_calls(
                response.content.clone(),
                response.tool_calls.clone(),
            ));
            for (call_id, observation) in execute_calls(state, ctx, &response.tool_calls, &mut applied).await? {
                messages.push(ChatMessage::tool_result(call_id, &observation));
            }
        }

        warn!(max = self.max_iterations, "tool loop hit its iteration bound");
        state
            .issues
            .push(format!("I stopped after {} rounds of tool calls.", self.max_iterations));
        let reply = prompts::draft_reply(state.draft.as_ref(), &state.issues);
        Ok(finish(state, reply))
    }
}
