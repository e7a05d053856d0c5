//! event-composer: conversational event authoring
//!
//! Turns free-text chat into a structured, validated event draft. A
//! session's messages run through one of three agent strategies (an
//! explicit workflow graph, a reason/act/observe loop, or a single direct
//! call) over interchangeable model providers guarded by health probes and
//! circuit breakers.
//!
//! # Quick Start
//!
//! ```no_run
//! use event_composer::prelude::*;
//! use event_composer::api::{MessageRequest, StartChatRequest};
//!
//! # async fn example() -> event_composer::error::Result<()> {
//! let service = ChatService::from_config(EngineConfig::load(None)?)?;
//! let chat = service.start(StartChatRequest { user_id: "parent-1".into() }).await?;
//! let reply = service
//!     .message(
//!         chat.session_id,
//!         MessageRequest {
//!             text: "Create a Saturday morning pottery workshop for ages 5-8, $20, max 15 spots".into(),
//!         },
//!     )
//!     .await?;
//! println!("{}", reply.reply);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod health;
pub mod prelude;
pub mod provider;
pub mod session;
pub mod tools;
pub mod types;
pub mod util;
pub mod workflow;

#[cfg(test)]
mod testing;
