//! Step bodies. Each step reads and writes the run state; tool calls go
//! through the registry so their input is validated first.

use serde_json::Value;
use tracing::debug;

use super::graph::StepName;
use super::state::EventCreationState;
use crate::agent::prompts;
use crate::context::TurnContext;
use crate::error::{WorkflowError, WorkflowErrorKind};
use crate::event::{heuristics, ExtractedDetails, TicketRequest, TierKey};
use crate::provider::{ProviderRequest, ToolMode};
use crate::tools::event_tools::{ADD_TICKET_TYPE, CREATE_EVENT_DRAFT, UPDATE_EVENT_DRAFT};
use crate::tools::{ToolInvocation, ToolOutcome};
use crate::types::{ChatMessage, GenerationSettings, ToolCall};

/// Ask the model for event fields as JSON and fill its gaps with the
/// heuristic extractor.
pub(crate) async fn extract_details(
    state: &mut EventCreationState,
    ctx: &TurnContext,
) -> Result<(), WorkflowError> {
    let request = ProviderRequest::new(vec![
        ChatMessage::system(prompts::extraction_prompt(state.reference_date)),
        ChatMessage::user(state.user_input.clone()),
    ])
    .with_settings(GenerationSettings::default().json());

    let routed = ctx
        .generate(&request, ToolMode::Auto)
        .await
        .map_err(|e| WorkflowError::provider(StepName::ExtractDetails, e))?;

    let mut details = ExtractedDetails::from_model_reply(&routed.response.content).unwrap_or_else(|| {
        debug!(provider = %routed.provider_id, "extraction reply was not JSON, using heuristics only");
        ExtractedDetails::default()
    });
    details.merge_missing(heuristics::extract(&state.user_input, state.reference_date));
    details.merge_missing(std::mem::take(&mut state.extracted));

    state.served_by = Some(routed.provider_id);
    state.extracted = details;
    Ok(())
}

/// Create the draft, or update it when one exists.
pub(crate) async fn create_event_draft(
    state: &mut EventCreationState,
    ctx: &TurnContext,
) -> Result<(), WorkflowError> {
    let args = state.extracted.event_arguments();
    let tool = match &state.draft {
        None if state.extracted.title.is_none() => {
            if !state.extracted.is_empty() {
                state
                    .issues
                    .push("I need a name for the event before I can start the draft.".to_string());
            }
            return Ok(());
        }
        None => CREATE_EVENT_DRAFT,
        Some(_) if state.extracted.has_event_fields() => UPDATE_EVENT_DRAFT,
        Some(_) => return Ok(()),
    };

    let invocation = apply_once(state, ctx, StepName::CreateEventDraft, tool.to_string(), tool, args).await?;
    if invocation.is_some_and(|inv| matches!(inv.outcome, ToolOutcome::Rejected { .. })) {
        state.halted = true;
    }
    Ok(())
}

/// Decide whether another ticket tier should be added.
pub(crate) fn check_tickets(state: &mut EventCreationState, max_iterations: usize) {
    if !state.tickets_planned {
        state.tickets_planned = true;
        let draft = state.draft.as_ref();
        state.pending_tickets = state
            .extracted
            .ticket_tiers()
            .into_iter()
            .filter(|t| !draft.is_some_and(|d| tier_key(t).is_some_and(|k| d.has_ticket(&k))))
            .collect();
    }

    if state.draft.is_none() {
        state.pending_tickets.clear();
    }
    let added = state.visits(StepName::AddTicketType);
    if added >= max_iterations && !state.pending_tickets.is_empty() {
        state.issues.push(format!(
            "I stopped after {added} ticket types; tell me about the remaining ones again."
        ));
        state.pending_tickets.clear();
    }
    state.needs_tickets = !state.pending_tickets.is_empty();
}

/// Add the next pending tier.
pub(crate) async fn add_ticket_type(
    state: &mut EventCreationState,
    ctx: &TurnContext,
) -> Result<(), WorkflowError> {
    let Some(ticket) = state.pending_tickets.pop_front() else {
        return Ok(());
    };
    let intent = ticket_intent(&ticket);
    apply_once(
        state,
        ctx,
        StepName::AddTicketType,
        intent,
        ADD_TICKET_TYPE,
        ticket.to_arguments(),
    )
    .await?;
    Ok(())
}

pub(crate) fn generate_response(state: &mut EventCreationState) {
    state.response = Some(prompts::draft_reply(state.draft.as_ref(), &state.issues));
}

/// Run a side-effecting tool unless the same intent was already applied
/// in this run.
///
/// A rejected call becomes a user-facing issue; a call that fails in the
/// executor fails the step.
async fn apply_once(
    state: &mut EventCreationState,
    ctx: &TurnContext,
    step: StepName,
    intent: String,
    tool: &str,
    args: Value,
) -> Result<Option<ToolInvocation>, WorkflowError> {
    if state.applied.contains(&intent) {
        debug!(%step, %intent, "side effect already applied in this run");
        return Ok(None);
    }

    let call = ToolCall::new(format!("wf_{}", state.invocations.len() + 1), tool, args);
    let invocation = ctx.dispatch(&call, &mut state.draft).await;
    state.invocations.push(invocation.clone());

    match &invocation.outcome {
        ToolOutcome::Success { .. } => {
            state.applied.insert(intent);
        }
        ToolOutcome::Rejected { error } => {
            debug!(%step, tool, %error, "tool input rejected");
            state.issues.push(format!("I couldn't save that: {}.", error.message));
        }
        ToolOutcome::Failed { message } => {
            return Err(WorkflowError::new(
                step,
                WorkflowErrorKind::Tool,
                format!("{tool} failed: {message}"),
            ));
        }
        ToolOutcome::NotFound => {
            return Err(WorkflowError::new(
                step,
                WorkflowErrorKind::Tool,
                format!("{tool} is not registered"),
            ));
        }
    }
    Ok(Some(invocation))
}

fn tier_key(ticket: &TicketRequest) -> Option<TierKey> {
    (ticket.price >= 0.0).then(|| TierKey::new(&ticket.name, (ticket.price * 100.0).round() as u64))
}

fn ticket_intent(ticket: &TicketRequest) -> String {
    match tier_key(ticket) {
        Some(key) => format!("{ADD_TICKET_TYPE}:{key}"),
        None => format!("{ADD_TICKET_TYPE}:{}@{}", ticket.name, ticket.price),
    }
}
