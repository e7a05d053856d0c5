//! Error classification and recovery hints.

use serde::{Deserialize, Serialize};

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Provider,
    Timeout,
    Capability,
    Validation,
    ToolExecution,
    Workflow,
    Cancelled,
    NotFound,
    Configuration,
    Storage,
    Serialization,
    Publish,
    Unknown,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoverySuggestion {
    RetryWithBackoff,
    RetryTurn,
    FixInput,
    FallBackToManualForm,
    StartNewSession,
    CheckConfiguration,
    ContactSupport,
}
