//! In-process provider with canned replies.
//!
//! Used for offline operation and as the deterministic backend in tests.
//! Queued [`ScriptStep`]s are consumed in order; once the queue is empty the
//! provider answers with its default reply.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::ProviderConfig;
use crate::error::{ProviderError, ProviderErrorKind};
use crate::types::{ResponseFormat, ToolCall};

use super::{ModelCapabilities, ModelProvider, ProviderRequest, ProviderResponse};

const DEFAULT_TEXT_REPLY: &str = "Got it. I've updated the event draft.";

/// One scripted reaction to a `generate` call.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Respond(ProviderResponse),
    Fail(ProviderErrorKind),
    /// Sleep, then answer with the default reply.
    Stall(Duration),
}

pub struct ScriptedProvider {
    config: ProviderConfig,
    capabilities: ModelCapabilities,
    steps: Mutex<VecDeque<ScriptStep>>,
    requests: Mutex<Vec<ProviderRequest>>,
    reachable: AtomicBool,
}

impl ScriptedProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            capabilities: ModelCapabilities::from_config(&config),
            config,
            steps: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            reachable: AtomicBool::new(true),
        }
    }

    pub fn push(&self, step: ScriptStep) {
        self.steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(step);
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.push(ScriptStep::Respond(ProviderResponse::text(text)));
    }

    pub fn push_json(&self, value: serde_json::Value) {
        self.push_text(value.to_string());
    }

    pub fn push_tool_call(&self, name: &str, arguments: serde_json::Value) {
        let id = format!("call_{}", self.pending() + self.request_count() + 1);
        self.push(ScriptStep::Respond(ProviderResponse::from_tool_calls(vec![
            ToolCall::new(id, name, arguments),
        ])));
    }

    pub fn push_failure(&self, kind: ProviderErrorKind) {
        self.push(ScriptStep::Fail(kind));
    }

    /// Toggle the connectivity check.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Steps not yet consumed.
    pub fn pending(&self) -> usize {
        self.steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn default_reply(request: &ProviderRequest) -> ProviderResponse {
        match request.settings.response_format {
            Some(ResponseFormat::JsonObject) => ProviderResponse::text("{}"),
            _ => ProviderResponse::text(DEFAULT_TEXT_REPLY),
        }
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn describe(&self) -> &ProviderConfig {
        &self.config
    }

    fn capabilities(&self) -> &ModelCapabilities {
        &self.capabilities
    }

    async fn ping(&self) -> Result<(), ProviderError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProviderError::unreachable(&self.config.id, "scripted provider offline"))
        }
    }

    async fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        if !self.reachable.load(Ordering::SeqCst) {
            return Err(ProviderError::unreachable(&self.config.id, "scripted provider offline"));
        }

        let step = self
            .steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        match step {
            Some(ScriptStep::Respond(response)) => Ok(response),
            Some(ScriptStep::Fail(kind)) => Err(ProviderError::new(
                kind,
                &self.config.id,
                "scripted failure",
            )),
            Some(ScriptStep::Stall(duration)) => {
                tokio::time::sleep(duration).await;
                Ok(Self::default_reply(request))
            }
            None => Ok(Self::default_reply(request)),
        }
    }
}
