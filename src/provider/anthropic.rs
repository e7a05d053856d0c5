//! Anthropic Messages API provider.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::types::{FinishReason, Role, ToolCall, Usage};

use super::http::{anthropic_headers, get_ok, post_json};
use super::{ModelCapabilities, ModelProvider, ProviderRequest, ProviderResponse};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
/// `max_tokens` is mandatory for this API.
const DEFAULT_MAX_TOKENS: u32 = 1024;

pub struct AnthropicProvider {
    config: ProviderConfig,
    api_key: String,
    base_url: String,
    capabilities: ModelCapabilities,
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig, api_key: String) -> Self {
        let base_url = if config.endpoint.is_empty() {
            DEFAULT_BASE_URL.to_string()
        } else {
            config.endpoint.trim_end_matches('/').to_string()
        };
        Self {
            capabilities: ModelCapabilities::from_config(&config),
            api_key,
            base_url,
            config,
        }
    }

    fn build_request_body(&self, request: &ProviderRequest) -> Value {
        let mut system_parts = Vec::new();
        let mut messages: Vec<Value> = Vec::new();

        for msg in &request.messages {
            match msg.role {
                Role::System => system_parts.push(msg.content.clone()),
                Role::User => messages.push(json!({
                    "role": "user",
                    "content": msg.content,
                })),
                Role::Assistant => {
                    let mut content = Vec::new();
                    if !msg.content.is_empty() {
                        content.push(json!({"type": "text", "text": msg.content}));
                    }
                    for tc in &msg.tool_calls {
                        content.push(json!({
                            "type": "tool_use",
                            "id": tc.id,
                            "name": tc.name,
                            "input": tc.arguments,
                        }));
                    }
                    messages.push(json!({"role": "assistant", "content": content}));
                }
                Role::Tool => {
                    let block = json!({
                        "type": "tool_result",
                        "tool_use_id": msg.tool_call_id,
                        "content": msg.content,
                    });
                    // Consecutive tool results share one user turn.
                    let open_turn = messages
                        .last_mut()
                        .filter(|m| m["role"] == "user")
                        .and_then(|m| m["content"].as_array_mut());
                    if let Some(blocks) = open_turn {
                        blocks.push(block);
                    } else {
                        messages.push(json!({"role": "user", "content": [block]}));
                    }
                }
            }
        }

        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": request.settings.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });
        if !system_parts.is_empty() {
            body["system"] = json!(system_parts.join("\n\n"));
        }
        if let Some(temp) = request.settings.temperature {
            body["temperature"] = temp.into();
        }
        if let Some(tools) = request.tools.as_ref().filter(|t| !t.is_empty()) {
            body["tools"] = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
        }
        body
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    fn describe(&self) -> &ProviderConfig {
        &self.config
    }

    fn capabilities(&self) -> &ModelCapabilities {
        &self.capabilities
    }

    async fn ping(&self) -> Result<(), ProviderError> {
        let url = format!("{}/models", self.base_url);
        get_ok(
            &self.config.id,
            &url,
            anthropic_headers(&self.api_key, API_VERSION),
        )
        .await
    }

    async fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let url = format!("{}/messages", self.base_url);
        let body = self.build_request_body(request);
        let data: AnthropicResponse = post_json(
            &self.config.id,
            &url,
            anthropic_headers(&self.api_key, API_VERSION),
            &body,
        )
        .await?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for block in data.content {
            match block {
                AnthropicBlock::Text { text: t } => text.push_str(&t),
                AnthropicBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall::new(id, name, input));
                }
                AnthropicBlock::Other => {}
            }
        }

        Ok(ProviderResponse {
            content: text,
            tool_calls,
            usage: data
                .usage
                .map(|u| Usage::new(u.input_tokens, u.output_tokens))
                .unwrap_or_default(),
            finish_reason: data.stop_reason.as_deref().and_then(FinishReason::parse_loose),
        })
    }
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
    stop_reason: Option<String>,
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}
