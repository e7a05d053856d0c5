//! Model provider trait and implementations.
//!
//! Every backend is reached through [`ModelProvider`]; strategies never talk
//! to a backend directly but go through the [`gateway::ProviderGateway`],
//! which adds the circuit breaker, failover, timeouts and retry.

pub mod anthropic;
pub mod capabilities;
pub mod gateway;
pub mod http;
pub mod ollama;
pub mod openai_compatible;
pub mod registry;
pub mod scripted;
pub mod text_tools;

pub use capabilities::ModelCapabilities;
pub use gateway::ProviderGateway;
pub use registry::ProviderRegistry;
pub use scripted::{ScriptStep, ScriptedProvider};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::{ComposerError, ProviderError};
use crate::types::{ChatMessage, FinishReason, GenerationSettings, ToolCall, Usage};
use crate::util::timeout::with_timeout;

/// A request sent to a model provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub messages: Vec<ChatMessage>,
    pub settings: GenerationSettings,
    pub tools: Option<Vec<ToolDefinition>>,
}

impl ProviderRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            settings: GenerationSettings::default(),
            tools: None,
        }
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn has_tools(&self) -> bool {
        self.tools.as_ref().is_some_and(|t| !t.is_empty())
    }

    fn tool_names(&self) -> Vec<&str> {
        self.tools
            .iter()
            .flatten()
            .map(|t| t.name.as_str())
            .collect()
    }
}

/// Tool definition sent to the provider API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Normalized response from a provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
    pub finish_reason: Option<FinishReason>,
}

impl ProviderResponse {
    /// A plain text answer.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            finish_reason: Some(FinishReason::Stop),
            ..Default::default()
        }
    }

    /// An answer consisting of tool calls.
    pub fn from_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            finish_reason: Some(FinishReason::ToolCalls),
            ..Default::default()
        }
    }
}

/// How tool definitions may reach a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolMode {
    /// Native tool calling when supported, otherwise a tool prompt with
    /// text-call lifting.
    Auto,
    /// Native tool calling only; chat-only backends fail with
    /// `CapabilityUnsupported`.
    NativeOnly,
}

/// Core trait implemented by all model providers.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// The slot configuration this provider serves.
    fn describe(&self) -> &ProviderConfig;

    fn capabilities(&self) -> &ModelCapabilities;

    /// Cheap connectivity check that does not run the model.
    async fn ping(&self) -> Result<(), ProviderError>;

    /// Generate a response (non-streaming).
    async fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError>;
}

/// Create a provider for the given slot configuration.
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn ModelProvider>, ComposerError> {
    let provider: Arc<dyn ModelProvider> = match config.kind {
        ProviderKind::Ollama => Arc::new(ollama::OllamaProvider::new(config.clone())),
        ProviderKind::OpenAiCompatible => Arc::new(openai_compatible::OpenAiCompatibleProvider::new(
            config.clone(),
            config.api_key(),
        )),
        ProviderKind::Anthropic => {
            let api_key = config.api_key().ok_or_else(|| {
                ComposerError::Configuration(format!(
                    "provider '{}' needs an API key in {}",
                    config.id,
                    config.key_env().unwrap_or("ANTHROPIC_API_KEY")
                ))
            })?;
            Arc::new(anthropic::AnthropicProvider::new(config.clone(), api_key))
        }
        ProviderKind::Scripted => Arc::new(ScriptedProvider::new(config.clone())),
    };
    Ok(provider)
}

/// Run one generation against `provider` with capability negotiation and a
/// hard deadline.
///
/// Whatever the backend family, a request carrying tools comes back with
/// normalized `tool_calls`: structured calls are passed through and calls
/// written as JSON text are lifted.
pub async fn invoke(
    provider: &dyn ModelProvider,
    request: &ProviderRequest,
    mode: ToolMode,
    timeout: Duration,
) -> Result<ProviderResponse, ProviderError> {
    let id = provider.describe().id.as_str();
    let native = provider.capabilities().supports_tools;

    let prompted;
    let outgoing = if request.has_tools() && !native {
        if mode == ToolMode::NativeOnly {
            return Err(ProviderError::capability_unsupported(
                id,
                "provider does not support tool calling",
            ));
        }
        prompted = text_tools::prompted_request(request);
        &prompted
    } else {
        request
    };

    let mut response = with_timeout(id, timeout, provider.generate(outgoing)).await?;

    if request.has_tools() && response.tool_calls.is_empty() {
        let allowed = request.tool_names();
        if let Some((rest, calls)) = text_tools::lift_tool_calls(&response.content, &allowed) {
            tracing::debug!(provider = id, calls = calls.len(), "lifted text tool calls");
            response.content = rest;
            response.tool_calls = calls;
            response.finish_reason = Some(FinishReason::ToolCalls);
        }
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorKind;
    use serde_json::json;

    fn summary_tool() -> ToolDefinition {
        ToolDefinition {
            name: "get_draft_summary".into(),
            description: "Summarize".into(),
            parameters: json!({"type": "object"}),
        }
    }

    #[tokio::test]
    async fn native_only_rejects_chat_only_provider_before_calling_it() {
        let provider = ScriptedProvider::new(ProviderConfig::scripted("chat", false));
        let request = ProviderRequest::new(vec![ChatMessage::user("hi")])
            .with_tools(vec![summary_tool()]);

        let err = invoke(&provider, &request, ToolMode::NativeOnly, Duration::from_secs(1))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ProviderErrorKind::CapabilityUnsupported);
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn auto_mode_prompts_chat_only_provider_and_lifts_calls() {
        let provider = ScriptedProvider::new(ProviderConfig::scripted("chat", false));
        provider.push_text(r#"{"tool": "get_draft_summary", "arguments": {}}"#);
        let request = ProviderRequest::new(vec![ChatMessage::user("hi")])
            .with_tools(vec![summary_tool()]);

        let response = invoke(&provider, &request, ToolMode::Auto, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "get_draft_summary");
        let sent = provider.requests();
        assert!(sent[0].tools.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_provider_times_out() {
        let provider = ScriptedProvider::new(ProviderConfig::scripted("slow", true));
        provider.push(ScriptStep::Stall(Duration::from_secs(30)));

        let err = invoke(
            &provider,
            &ProviderRequest::new(vec![ChatMessage::user("hi")]),
            ToolMode::Auto,
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind, ProviderErrorKind::Timeout);
    }
}
