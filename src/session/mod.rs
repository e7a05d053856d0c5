//! Conversation sessions: records, persistence and the manager that runs
//! turns.

pub mod manager;
pub mod model;
pub mod store;

pub use manager::{SessionManager, TurnResult};
pub use model::{ConversationSession, Diagnostic, SessionId, SessionStatus, SessionSummary};
pub use store::{ConversationStore, FileStore, InMemoryStore};
