//! Generic OpenAI-compatible provider (`/chat/completions`).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::types::{ChatMessage, FinishReason, ResponseFormat, Role, ToolCall, Usage};

use super::http::{bearer_headers, get_ok, post_json};
use super::{ModelCapabilities, ModelProvider, ProviderRequest, ProviderResponse};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Provider for any OpenAI-compatible API, hosted or local.
pub struct OpenAiCompatibleProvider {
    config: ProviderConfig,
    api_key: Option<String>,
    base_url: String,
    capabilities: ModelCapabilities,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: ProviderConfig, api_key: Option<String>) -> Self {
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
        let messages: Vec<Value> = request.messages.iter().map(message_to_openai).collect();

        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
            "stream": false,
        });

        if let Some(max) = request.settings.max_tokens {
            body["max_tokens"] = max.into();
        }
        if let Some(temp) = request.settings.temperature {
            body["temperature"] = temp.into();
        }
        if request.settings.response_format == Some(ResponseFormat::JsonObject) {
            body["response_format"] = json!({"type": "json_object"});
        }
        if let Some(tools) = request.tools.as_ref().filter(|t| !t.is_empty()) {
            body["tools"] = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
        }
        body
    }
}

#[async_trait]
impl ModelProvider for OpenAiCompatibleProvider {
    fn describe(&self) -> &ProviderConfig {
        &self.config
    }

    fn capabilities(&self) -> &ModelCapabilities {
        &self.capabilities
    }

    async fn ping(&self) -> Result<(), ProviderError> {
        let url = format!("{}/models", self.base_url);
        get_ok(&self.config.id, &url, bearer_headers(self.api_key.as_deref())).await
    }

    async fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_request_body(request);
        let data: OpenAiChatResponse = post_json(
            &self.config.id,
            &url,
            bearer_headers(self.api_key.as_deref()),
            &body,
        )
        .await?;

        let choice = data.choices.into_iter().next().ok_or_else(|| {
            ProviderError::invalid_response(&self.config.id, "no choices in response")
        })?;

        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|tc| {
                let arguments = serde_json::from_str(&tc.function.arguments)
                    .unwrap_or(Value::String(tc.function.arguments));
                ToolCall::new(tc.id, tc.function.name, arguments)
            })
            .collect();

        Ok(ProviderResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            usage: data
                .usage
                .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
                .unwrap_or_default(),
            finish_reason: choice
                .finish_reason
                .as_deref()
                .and_then(FinishReason::parse_loose),
        })
    }
}

fn message_to_openai(msg: &ChatMessage) -> Value {
    match msg.role {
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": msg.tool_call_id,
            "content": msg.content,
        }),
        Role::Assistant if msg.has_tool_calls() => {
            let calls: Vec<Value> = msg
                .tool_calls
                .iter()
                .map(|tc| {
                    json!({
                        "id": tc.id,
                        "type": "function",
                        "function": {
                            "name": tc.name,
                            "arguments": tc.arguments.to_string(),
                        }
                    })
                })
                .collect();
            json!({
                "role": "assistant",
                "content": msg.content,
                "tool_calls": calls,
            })
        }
        role => json!({ "role": role.as_str(), "content": msg.content }),
    }
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<OpenAiToolCall>,
}

#[derive(Deserialize)]
struct OpenAiToolCall {
    id: String,
    function: OpenAiFunction,
}

#[derive(Deserialize)]
struct OpenAiFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
