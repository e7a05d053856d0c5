//! Error types for the composer engine.
//!
//! Every failure in the engine maps onto one of four families:
//! [`ProviderError`], [`ToolValidationError`], [`WorkflowError`] and
//! session lookup failures. [`ComposerError`] aggregates them together with
//! the ambient configuration/storage errors.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

use crate::session::SessionId;
use crate::workflow::StepName;

/// Reason code attached to every [`ProviderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProviderErrorKind {
    Unreachable,
    Timeout,
    InvalidResponse,
    CapabilityUnsupported,
    /// The circuit breaker rejected the call without contacting the backend.
    CircuitOpen,
}

impl ProviderErrorKind {
    /// Whether a second attempt against the same provider can succeed.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Unreachable | Self::Timeout)
    }

    /// Whether the failure says something about the provider's health.
    pub fn counts_against_health(self) -> bool {
        matches!(
            self,
            Self::Unreachable | Self::Timeout | Self::InvalidResponse
        )
    }
}

/// Normalized failure of a language-model backend.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("provider '{provider}' {kind}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub provider: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(
        kind: ProviderErrorKind,
        provider: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn unreachable(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Unreachable, provider, message)
    }

    pub fn timeout(provider: impl Into<String>, after_ms: u64) -> Self {
        Self::new(
            ProviderErrorKind::Timeout,
            provider,
            format!("no response after {after_ms}ms"),
        )
    }

    pub fn invalid_response(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::InvalidResponse, provider, message)
    }

    pub fn capability_unsupported(
        provider: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(ProviderErrorKind::CapabilityUnsupported, provider, message)
    }

    pub fn circuit_open(provider: impl Into<String>) -> Self {
        Self::new(
            ProviderErrorKind::CircuitOpen,
            provider,
            "circuit breaker open",
        )
    }
}

/// Tool input rejected by the registry before the executor ran.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("invalid input for tool '{tool}': {message}")]
pub struct ToolValidationError {
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl ToolValidationError {
    pub fn new(tool: impl Into<String>, field: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            field: field.map(str::to_string),
            message: message.into(),
        }
    }
}

/// What went wrong inside a workflow step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkflowErrorKind {
    Provider,
    Tool,
    LoopLimit,
    Graph,
    Cancelled,
}

/// Failure of a single workflow run, pinned to the step that failed.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("workflow step '{step}' failed ({kind}): {message}")]
pub struct WorkflowError {
    pub step: StepName,
    pub kind: WorkflowErrorKind,
    pub message: String,
    /// Underlying provider failure, when the step failed on a model call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderError>,
}

impl WorkflowError {
    pub fn new(step: StepName, kind: WorkflowErrorKind, message: impl Into<String>) -> Self {
        Self {
            step,
            kind,
            message: message.into(),
            provider: None,
        }
    }

    pub fn provider(step: StepName, error: ProviderError) -> Self {
        Self {
            step,
            kind: WorkflowErrorKind::Provider,
            message: error.to_string(),
            provider: Some(error),
        }
    }

    pub fn cancelled(step: StepName) -> Self {
        Self::new(step, WorkflowErrorKind::Cancelled, "turn cancelled")
    }
}

/// Primary error type for all engine operations.
#[derive(Error, Debug)]
pub enum ComposerError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    ToolValidation(#[from] ToolValidationError),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Draft is missing required fields: {}", missing.join(", "))]
    IncompleteDraft { missing: Vec<String> },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ComposerError {
    pub fn tool_execution(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Provider(e) => match e.kind {
                ProviderErrorKind::Timeout => ErrorCategory::Timeout,
                ProviderErrorKind::CapabilityUnsupported => ErrorCategory::Capability,
                _ => ErrorCategory::Provider,
            },
            Self::ToolValidation(_) | Self::IncompleteDraft { .. } => ErrorCategory::Validation,
            Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            Self::Workflow(e) => match e.kind {
                WorkflowErrorKind::Provider => ErrorCategory::Provider,
                WorkflowErrorKind::Cancelled => ErrorCategory::Cancelled,
                _ => ErrorCategory::Workflow,
            },
            Self::SessionNotFound(_) => ErrorCategory::NotFound,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Io(_) => ErrorCategory::Storage,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Publish(_) => ErrorCategory::Publish,
            Self::InvalidState(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(e) => e.kind.is_retryable(),
            Self::Workflow(e) => e.provider.as_ref().is_some_and(|p| p.kind.is_retryable()),
            Self::Io(_) => true,
            _ => false,
        }
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Provider | ErrorCategory::Capability => {
                RecoverySuggestion::FallBackToManualForm
            }
            ErrorCategory::Timeout => RecoverySuggestion::RetryWithBackoff,
            ErrorCategory::Validation => RecoverySuggestion::FixInput,
            ErrorCategory::Workflow | ErrorCategory::Cancelled => RecoverySuggestion::RetryTurn,
            ErrorCategory::NotFound => RecoverySuggestion::StartNewSession,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::Storage => RecoverySuggestion::RetryWithBackoff,
            _ => RecoverySuggestion::ContactSupport,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ComposerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_failures_are_retryable() {
        assert!(ProviderErrorKind::Unreachable.is_retryable());
        assert!(ProviderErrorKind::Timeout.is_retryable());
        assert!(!ProviderErrorKind::InvalidResponse.is_retryable());
        assert!(!ProviderErrorKind::CapabilityUnsupported.is_retryable());
        assert!(!ProviderErrorKind::CircuitOpen.is_retryable());
    }

    #[test]
    fn circuit_open_does_not_count_against_health() {
        assert!(!ProviderErrorKind::CircuitOpen.counts_against_health());
        assert!(ProviderErrorKind::InvalidResponse.counts_against_health());
    }

    #[test]
    fn provider_error_display_includes_reason_code() {
        let err = ProviderError::timeout("local", 1500);
        assert_eq!(
            err.to_string(),
            "provider 'local' timeout: no response after 1500ms"
        );
    }

    #[test]
    fn workflow_error_keeps_failing_step() {
        let err = WorkflowError::provider(
            StepName::ExtractDetails,
            ProviderError::unreachable("local", "connection refused"),
        );
        assert_eq!(err.step, StepName::ExtractDetails);
        assert_eq!(err.kind, WorkflowErrorKind::Provider);
        assert!(err.to_string().contains("extract_details"));

        let composed = ComposerError::from(err);
        assert!(composed.is_retryable());
        assert_eq!(composed.category(), ErrorCategory::Provider);
    }

    #[test]
    fn session_not_found_suggests_new_session() {
        let err = ComposerError::SessionNotFound(uuid::Uuid::nil());
        assert_eq!(err.category(), ErrorCategory::NotFound);
        assert_eq!(
            err.recovery_suggestion(),
            RecoverySuggestion::StartNewSession
        );
    }

    #[test]
    fn incomplete_draft_lists_missing_fields() {
        let err = ComposerError::IncompleteDraft {
            missing: vec!["title".into(), "start_date".into()],
        };
        assert_eq!(
            err.to_string(),
            "Draft is missing required fields: title, start_date"
        );
    }
}
