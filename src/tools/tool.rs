//! Tool trait and execution context.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::Display;

use super::arguments::ToolArguments;
use super::types::ToolParameters;
use crate::error::ComposerError;
use crate::event::{AvailabilityCalendar, EventDraft};

/// Whether repeating a call can change state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Idempotency {
    /// Read-only; may be retried freely.
    SafeToRetry,
    /// Mutates the draft; callers must invoke it at most once per intent.
    SideEffecting,
}

/// State a tool executes against.
///
/// Tools work on this copy of the draft; the caller decides whether the
/// result is committed.
#[derive(Clone)]
pub struct ToolContext {
    pub draft: Option<EventDraft>,
    pub calendar: Arc<dyn AvailabilityCalendar>,
    /// "Today" for date checks.
    pub reference_date: NaiveDate,
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("draft", &self.draft)
            .field("reference_date", &self.reference_date)
            .finish()
    }
}

impl ToolContext {
    pub fn new(
        draft: Option<EventDraft>,
        calendar: Arc<dyn AvailabilityCalendar>,
        reference_date: NaiveDate,
    ) -> Self {
        Self {
            draft,
            calendar,
            reference_date,
        }
    }

    /// The draft, or an execution error naming `tool`.
    pub fn draft_mut(&mut self, tool: &str) -> Result<&mut EventDraft, ComposerError> {
        self.draft.as_mut().ok_or_else(|| {
            ComposerError::tool_execution(tool, "no event draft yet; call create_event_draft first")
        })
    }
}

/// Core tool trait. Implement it to create custom tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (must match what the model calls).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Input contract, enforced by the registry before `execute` runs.
    fn parameters(&self) -> &ToolParameters;

    fn idempotency(&self) -> Idempotency;

    /// Execute the tool with validated arguments.
    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &mut ToolContext,
    ) -> Result<serde_json::Value, ComposerError>;
}
