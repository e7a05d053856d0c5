//! Per-run scratch space of the workflow, persisted with the session.

use std::collections::{BTreeSet, VecDeque};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::graph::StepName;
use crate::error::WorkflowError;
use crate::event::{EventDraft, ExtractedDetails, TicketRequest};
use crate::tools::ToolInvocation;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No run has started on this state.
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

/// Typed state the workflow steps transform.
///
/// The draft survives across runs; everything else describes the current
/// run and is reset by [`EventCreationState::begin_run`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventCreationState {
    pub user_input: String,
    /// "Today" for relative dates.
    pub reference_date: NaiveDate,
    pub extracted: ExtractedDetails,
    pub draft: Option<EventDraft>,
    /// Ticket tiers indicated but not yet handled.
    pub pending_tickets: VecDeque<TicketRequest>,
    pub tickets_planned: bool,
    pub needs_tickets: bool,
    /// Set when a step wants the run to skip to the response.
    pub halted: bool,
    pub current_step: StepName,
    pub status: RunStatus,
    pub visited: Vec<StepName>,
    /// Side effects already applied in this run, by intent key.
    pub applied: BTreeSet<String>,
    pub invocations: Vec<ToolInvocation>,
    /// User-facing problems found during the run.
    pub issues: Vec<String>,
    pub response: Option<String>,
    pub failure: Option<WorkflowError>,
    /// Provider slot that served the last model call.
    pub served_by: Option<String>,
}

impl EventCreationState {
    /// Reset run fields for a new message, keeping the draft and any
    /// details collected before a draft existed.
    pub fn begin_run(&mut self, user_input: &str, reference_date: NaiveDate) {
        let carried = if self.draft.is_none() {
            std::mem::take(&mut self.extracted)
        } else {
            ExtractedDetails::default()
        };
        *self = Self {
            user_input: user_input.to_string(),
            reference_date,
            extracted: carried,
            draft: self.draft.take(),
            status: RunStatus::Running,
            ..Self::default()
        };
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, RunStatus::Completed | RunStatus::Failed)
    }

    pub fn visits(&self, step: StepName) -> usize {
        self.visited.iter().filter(|s| **s == step).count()
    }

    pub fn next_ticket(&self) -> Option<&TicketRequest> {
        self.pending_tickets.front()
    }

    /// Missing required fields of the draft, or all of them when there is
    /// no draft yet.
    pub fn missing_fields(&self) -> Vec<String> {
        self.draft
            .as_ref()
            .map(EventDraft::missing_required_fields)
            .unwrap_or_else(|| EventDraft::default().missing_required_fields())
    }
}
