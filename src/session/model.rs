//! Conversation session records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

use crate::agent::StrategyKind;
use crate::error::{ComposerError, ErrorCategory};
use crate::event::EventDraft;
use crate::tools::ToolInvocation;
use crate::types::ChatMessage;
use crate::workflow::{EventCreationState, StepName};

pub type SessionId = Uuid;

/// Tool invocations kept per session for audit.
pub const MAX_AUDIT_ENTRIES: usize = 200;

/// Failure records kept per session; older ones are dropped first.
pub const MAX_DIAGNOSTICS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionStatus {
    Active,
    /// The draft was finalized.
    Completed,
    /// Closed, or idle past the inactivity timeout.
    Expired,
    /// The last turn fell back; history and draft are intact.
    Errored,
}

impl SessionStatus {
    /// Whether the session still accepts messages.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Active | Self::Errored)
    }
}

/// Structured record of a failure recovered from during a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub at: DateTime<Utc>,
    pub category: ErrorCategory,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<StepName>,
}

impl Diagnostic {
    pub fn from_error(error: &ComposerError) -> Self {
        let step = match error {
            ComposerError::Workflow(e) => Some(e.step),
            _ => None,
        };
        Self {
            at: Utc::now(),
            category: error.category(),
            message: error.to_string(),
            step,
        }
    }

    pub fn timeout(after_ms: u64) -> Self {
        Self {
            at: Utc::now(),
            category: ErrorCategory::Timeout,
            message: format!("turn did not finish within {after_ms}ms"),
            step: None,
        }
    }
}

/// One user's conversation and the workflow state it has accumulated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSession {
    pub id: SessionId,
    pub user_id: String,
    pub messages: Vec<ChatMessage>,
    pub state: EventCreationState,
    pub strategy: StrategyKind,
    /// Logical provider slot; `None` follows the active slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_slot: Option<String>,
    pub status: SessionStatus,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    #[serde(default)]
    pub audit: Vec<ToolInvocation>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl ConversationSession {
    pub fn new(user_id: impl Into<String>, strategy: StrategyKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            messages: Vec::new(),
            state: EventCreationState::default(),
            strategy,
            provider_slot: None,
            status: SessionStatus::Active,
            diagnostics: Vec::new(),
            audit: Vec::new(),
            created_at: now,
            last_activity: now,
        }
    }

    pub fn draft(&self) -> Option<&EventDraft> {
        self.state.draft.as_ref()
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn record_invocations(&mut self, invocations: &[ToolInvocation]) {
        self.audit.extend_from_slice(invocations);
        if self.audit.len() > MAX_AUDIT_ENTRIES {
            let excess = self.audit.len() - MAX_AUDIT_ENTRIES;
            self.audit.drain(..excess);
        }
    }

    pub fn record_diagnostic(&mut self, diagnostic: Diagnostic) {
        if self.diagnostics.len() >= MAX_DIAGNOSTICS {
            let excess = self.diagnostics.len() + 1 - MAX_DIAGNOSTICS;
            self.diagnostics.drain(..excess);
        }
        self.diagnostics.push(diagnostic);
    }

    /// The step an errored session failed in, else where its last run
    /// stopped.
    pub fn current_step(&self) -> StepName {
        let failed = self.diagnostics.last().and_then(|d| d.step);
        match (self.status, failed) {
            (SessionStatus::Errored, Some(step)) => step,
            _ => self.state.current_step,
        }
    }

    pub fn is_idle_since(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_activity < cutoff
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            status: self.status,
            strategy: self.strategy,
            current_step: self.current_step(),
            message_count: self.messages.len(),
            missing_fields: self.state.missing_fields(),
            last_error: self.diagnostics.last().map(|d| d.message.clone()),
            draft: self.state.draft.clone(),
        }
    }
}

/// Read-only view returned by `get_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub status: SessionStatus,
    pub strategy: StrategyKind,
    pub current_step: StepName,
    pub message_count: usize,
    pub missing_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft: Option<EventDraft>,
}
