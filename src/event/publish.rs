//! Publish collaborator: turns a finalized draft into a real event.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::EventDraft;

/// Reference to an event created from a draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedEvent {
    pub event_id: String,
    pub title: String,
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Create the event. Drafts handed here are already complete.
    async fn publish(&self, draft: &EventDraft) -> Result<PublishedEvent>;
}

/// Publisher that keeps events in memory.
#[derive(Debug, Default)]
pub struct InMemoryPublisher {
    published: RwLock<Vec<(PublishedEvent, EventDraft)>>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<(PublishedEvent, EventDraft)> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl EventPublisher for InMemoryPublisher {
    async fn publish(&self, draft: &EventDraft) -> Result<PublishedEvent> {
        let mut published = self.published.write().unwrap_or_else(PoisonError::into_inner);
        let event = PublishedEvent {
            event_id: format!("evt_{}", published.len() + 1),
            title: draft.title.clone().unwrap_or_default(),
        };
        published.push((event.clone(), draft.clone()));
        Ok(event)
    }
}
