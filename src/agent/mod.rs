//! Agent strategies: interchangeable ways of handling one user turn.
//!
//! The set is closed. [`Strategy`] dispatches to the selected variant so
//! callers never branch on the strategy themselves.

pub mod direct;
pub mod prompts;
pub mod react;
pub mod workflow;

pub use direct::DirectStrategy;
pub use react::ReactStrategy;
pub use workflow::WorkflowStrategy;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strum::{Display, EnumString};

use crate::config::AgentConfig;
use crate::context::TurnContext;
use crate::error::{ComposerError, WorkflowError};
use crate::tools::{Idempotency, ToolOutcome};
use crate::types::{ChatMessage, Role, ToolCall};
use crate::workflow::{EventCreationState, RunStatus};

/// Which strategy a session uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StrategyKind {
    /// Explicit workflow graph.
    #[default]
    Workflow,
    /// Reason/act/observe loop with native tool calls.
    ReactLoop,
    /// One provider call with every tool exposed.
    Direct,
}

/// One incoming user message with its conversation so far.
#[derive(Debug, Clone, Copy)]
pub struct Turn<'a> {
    pub text: &'a str,
    /// Prior messages, oldest first, excluding `text`.
    pub history: &'a [ChatMessage],
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnReply {
    pub reply: String,
    /// Slot that served the turn's last model call.
    pub provider_id: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Strategy {
    Workflow(WorkflowStrategy),
    ReactLoop(ReactStrategy),
    Direct(DirectStrategy),
}

impl Strategy {
    pub fn from_config(kind: StrategyKind, config: &AgentConfig, history_window: usize) -> Result<Self, ComposerError> {
        Ok(match kind {
            StrategyKind::Workflow => Self::Workflow(WorkflowStrategy::new(config.max_ticket_iterations)?),
            StrategyKind::ReactLoop => {
                Self::ReactLoop(ReactStrategy::new(config.max_react_iterations, history_window))
            }
            StrategyKind::Direct => Self::Direct(DirectStrategy::new(history_window)),
        })
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Workflow(_) => StrategyKind::Workflow,
            Self::ReactLoop(_) => StrategyKind::ReactLoop,
            Self::Direct(_) => StrategyKind::Direct,
        }
    }

    /// Handle one turn, updating `state` in place.
    ///
    /// Callers pass a working copy and commit it only on success.
    pub async fn handle(
        &self,
        state: &mut EventCreationState,
        turn: Turn<'_>,
        ctx: &TurnContext,
    ) -> Result<TurnReply, ComposerError> {
        match self {
            Self::Workflow(s) => s.handle(state, turn, ctx).await,
            Self::ReactLoop(s) => s.handle(state, turn, ctx).await,
            Self::Direct(s) => s.handle(state, turn, ctx).await,
        }
    }
}

/// Messages for a tool-using strategy: system prompt, recent history, then
/// the new user message.
fn conversation(state: &EventCreationState, turn: Turn<'_>, ctx: &TurnContext, window: usize) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(prompts::agent_prompt(
        state.draft.as_ref(),
        ctx.today,
    ))];
    let mut start = turn.history.len().saturating_sub(window);
    // A window must not open on results whose tool request was cut off.
    while turn.history.get(start).is_some_and(|m| m.role == Role::Tool) {
        start += 1;
    }
    messages.extend(turn.history[start..].iter().cloned());
    messages.push(ChatMessage::user(turn.text));
    messages
}

/// Execute model-proposed calls in order and return `(call_id, observation)`
/// pairs for the model.
///
/// A side-effecting call identical to one already applied this turn is not
/// run again.
async fn execute_calls(
    state: &mut EventCreationState,
    ctx: &TurnContext,
    calls: &[ToolCall],
    applied: &mut Vec<(String, Value)>,
) -> Result<Vec<(String, Value)>, ComposerError> {
    let mut observations = Vec::with_capacity(calls.len());
    for call in calls {
        if ctx.cancel.is_cancelled() {
            return Err(WorkflowError::cancelled(state.current_step).into());
        }
        let side_effecting = ctx.engine.tools.idempotency(&call.name) == Some(Idempotency::SideEffecting);
        let intent = (call.name.clone(), call.arguments.clone());
        if side_effecting && applied.contains(&intent) {
            tracing::debug!(tool = %call.name, "duplicate side-effecting call skipped");
            observations.push((
                call.id.clone(),
                json!({"status": "skipped", "reason": "already applied in this turn"}),
            ));
            continue;
        }

        let invocation = ctx.dispatch(call, &mut state.draft).await;
        match &invocation.outcome {
            ToolOutcome::Success { .. } if side_effecting => applied.push(intent),
            ToolOutcome::Rejected { error } => {
                state.issues.push(format!("I couldn't save that: {}.", error.message));
            }
            _ => {}
        }
        observations.push((call.id.clone(), invocation.observation()));
        state.invocations.push(invocation);
    }
    Ok(observations)
}

fn finish(state: &mut EventCreationState, reply: String) -> TurnReply {
    state.status = RunStatus::Completed;
    state.response = Some(reply.clone());
    TurnReply {
        reply,
        provider_id: state.served_by.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_kinds_parse_from_config_strings() {
        assert_eq!("react_loop".parse::<StrategyKind>().unwrap(), StrategyKind::ReactLoop);
        assert_eq!(StrategyKind::default(), StrategyKind::Workflow);
        assert_eq!(
            serde_json::to_value(StrategyKind::Direct).unwrap(),
            "direct"
        );
    }

    #[test]
    fn from_config_builds_the_requested_variant() {
        let config = AgentConfig::default();
        for kind in [StrategyKind::Workflow, StrategyKind::ReactLoop, StrategyKind::Direct] {
            assert_eq!(Strategy::from_config(kind, &config, 10).unwrap().kind(), kind);
        }
    }

    #[test]
    fn history_window_skips_orphaned_tool_results() {
        let (engine, _) = crate::testing::engine_with(|_| {});
        let ctx = TurnContext::new(engine, chrono::NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
        let history = vec![
            ChatMessage::user("plan a picnic"),
            ChatMessage::assistant_tool_calls("", vec![ToolCall::new("c1", "get_draft_summary", json!({}))]),
            ChatMessage::tool_result("c1", &json!({"draft": null})),
            ChatMessage::assistant("No draft yet."),
        ];
        let turn = Turn {
            text: "call it Family Picnic",
            history: &history,
        };

        let messages = conversation(&EventCreationState::default(), turn, &ctx, 2);

        let roles: Vec<_> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::System, Role::Assistant, Role::User]);
        assert_eq!(messages[1].content, "No draft yet.");
    }
}
