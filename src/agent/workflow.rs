//! Strategy backed by the workflow graph.

use super::{prompts, Turn, TurnReply};
use crate::context::TurnContext;
use crate::error::{ComposerError, WorkflowError};
use crate::workflow::{EventCreationState, WorkflowEngine};

/// Deterministic, auditable handling through [`WorkflowEngine`].
///
/// History is not consulted: the draft carried in the state is the whole
/// memory of the conversation.
#[derive(Debug, Clone)]
pub struct WorkflowStrategy {
    engine: WorkflowEngine,
}

impl WorkflowStrategy {
    pub fn new(max_ticket_iterations: usize) -> Result<Self, WorkflowError> {
        Ok(Self {
            engine: WorkflowEngine::new(max_ticket_iterations)?,
        })
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    pub async fn handle(
        &self,
        state: &mut EventCreationState,
        turn: Turn<'_>,
        ctx: &TurnContext,
    ) -> Result<TurnReply, ComposerError> {
        self.engine.run(state, turn.text, ctx).await?;
        let reply = state
            .response
            .clone()
            .unwrap_or_else(|| prompts::draft_reply(state.draft.as_ref(), &state.issues));
        Ok(TurnReply {
            reply,
            provider_id: state.served_by.clone(),
        })
    }
}
