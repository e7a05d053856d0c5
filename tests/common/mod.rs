//! Shared fixtures: a chat service over one scripted provider.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;

use event_composer::api::{ChatService, MessageRequest, ServiceOptions, StartChatRequest};
use event_composer::config::{EngineConfig, ProviderConfig};
use event_composer::provider::{ModelProvider, ProviderRegistry, ScriptedProvider};
use event_composer::session::{ConversationStore, SessionId};

pub const POTTERY: &str =
    "Create a Saturday morning pottery workshop for ages 5-8, $20, max 15 spots";

/// Monday; "Saturday" resolves to 2026-10-24.
pub fn reference_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

pub struct Harness {
    pub service: ChatService,
    pub provider: Arc<ScriptedProvider>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(EngineConfig::default(), true, None)
    }

    /// Scripted slot without native tool calling.
    pub fn chat_only() -> Self {
        Self::with(EngineConfig::default(), false, None)
    }

    pub fn with_store(store: Arc<dyn ConversationStore>) -> Self {
        Self::with(EngineConfig::default(), true, Some(store))
    }

    pub fn with(
        mut config: EngineConfig,
        tool_calling: bool,
        store: Option<Arc<dyn ConversationStore>>,
    ) -> Self {
        let slot = ProviderConfig::scripted("local", tool_calling);
        config.providers = vec![slot.clone()];
        config.active_provider = "local".into();

        let provider = Arc::new(ScriptedProvider::new(slot));
        let registry = Arc::new(
            ProviderRegistry::new(vec![provider.clone() as Arc<dyn ModelProvider>]).unwrap(),
        );
        let options = ServiceOptions::builder()
            .registry(registry)
            .reference_date(reference_date())
            .maybe_store(store)
            .build();

        let service = ChatService::new(config, options).unwrap();
        Self { service, provider }
    }

    pub async fn start(&self) -> SessionId {
        self.service
            .start(StartChatRequest {
                user_id: "parent-1".into(),
            })
            .await
            .unwrap()
            .session_id
    }

    pub async fn say(&self, id: SessionId, text: &str) -> event_composer::api::MessageResponse {
        self.service
            .message(id, MessageRequest { text: text.into() })
            .await
            .unwrap()
    }
}
