//! Convenience re-exports for common use.

pub use crate::agent::StrategyKind;
pub use crate::api::ChatService;
pub use crate::config::{EngineConfig, ProviderConfig, ProviderKind};
pub use crate::error::{ComposerError, ProviderError, ProviderErrorKind, Result};
pub use crate::event::{EventDraft, EventPublisher, TicketTier};
pub use crate::health::{HealthStatus, SystemHealth};
pub use crate::provider::{ModelProvider, ScriptedProvider};
pub use crate::session::{SessionId, SessionManager, SessionStatus};
pub use crate::tools::{Tool, ToolArguments, ToolParameters};
pub use crate::types::{ChatMessage, GenerationSettings, Role, ToolCall};
pub use crate::workflow::{EventCreationState, StepName};
