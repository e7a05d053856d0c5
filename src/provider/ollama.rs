//! Ollama local provider (native `/api/chat`).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::types::{ChatMessage, FinishReason, ResponseFormat, Role, ToolCall, Usage};

use super::http::{bearer_headers, get_ok, post_json};
use super::{ModelCapabilities, ModelProvider, ProviderRequest, ProviderResponse};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

pub struct OllamaProvider {
    config: ProviderConfig,
    base_url: String,
    capabilities: ModelCapabilities,
}

impl OllamaProvider {
    pub fn new(config: ProviderConfig) -> Self {
        let base_url = if config.endpoint.is_empty() {
            DEFAULT_BASE_URL.to_string()
        } else {
            config.endpoint.trim_end_matches('/').to_string()
        };
        Self {
            capabilities: ModelCapabilities::from_config(&config),
            base_url,
            config,
        }
    }

    fn build_request_body(&self, request: &ProviderRequest) -> Value {
        let messages: Vec<Value> = request.messages.iter().map(message_to_ollama).collect();

        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
            "stream": false,
        });

        let mut options = serde_json::Map::new();
        if let Some(temp) = request.settings.temperature {
            options.insert("temperature".into(), temp.into());
        }
        if let Some(max) = request.settings.max_tokens {
            options.insert("num_predict".into(), max.into());
        }
        if !options.is_empty() {
            body["options"] = Value::Object(options);
        }
        if request.settings.response_format == Some(ResponseFormat::JsonObject) {
            body["format"] = json!("json");
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
impl ModelProvider for OllamaProvider {
    fn describe(&self) -> &ProviderConfig {
        &self.config
    }

    fn capabilities(&self) -> &ModelCapabilities {
        &self.capabilities
    }

    async fn ping(&self) -> Result<(), ProviderError> {
        let url = format!("{}/api/tags", self.base_url);
        get_ok(&self.config.id, &url, bearer_headers(None)).await
    }

    async fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = self.build_request_body(request);
        let data: OllamaChatResponse =
            post_json(&self.config.id, &url, bearer_headers(None), &body).await?;

        let tool_calls = data
            .message
            .tool_calls
            .into_iter()
            .enumerate()
            .map(|(i, tc)| {
                ToolCall::new(
                    format!("call_{}", i + 1),
                    tc.function.name,
                    tc.function.arguments,
                )
            })
            .collect::<Vec<_>>();

        let finish_reason = if tool_calls.is_empty() {
            data.done_reason.as_deref().and_then(FinishReason::parse_loose)
        } else {
            Some(FinishReason::ToolCalls)
        };

        Ok(ProviderResponse {
            content: data.message.content,
            tool_calls,
            usage: Usage::new(data.prompt_eval_count, data.eval_count),
            finish_reason,
        })
    }
}

fn message_to_ollama(msg: &ChatMessage) -> Value {
    let mut value = json!({
        "role": msg.role.as_str(),
        "content": msg.content,
    });
    if msg.role == Role::Assistant && msg.has_tool_calls() {
        value["tool_calls"] = msg
            .tool_calls
            .iter()
            .map(|tc| json!({"function": {"name": tc.name, "arguments": tc.arguments}}))
            .collect();
    }
    value
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<OllamaToolCall>,
}

#[derive(Deserialize)]
struct OllamaToolCall {
    function: OllamaFunction,
}

#[derive(Deserialize)]
struct OllamaFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}
