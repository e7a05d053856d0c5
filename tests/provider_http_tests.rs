//! HTTP backends against a mock server.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use event_composer::config::{HealthConfig, ProviderConfig, ProviderKind};
use event_composer::error::ProviderErrorKind;
use event_composer::health::probe::probe_provider;
use event_composer::health::{HealthStatus, ProbeKind};
use event_composer::provider::anthropic::AnthropicProvider;
use event_composer::provider::ollama::OllamaProvider;
use event_composer::provider::openai_compatible::OpenAiCompatibleProvider;
use event_composer::provider::{
    invoke, ModelProvider, ProviderRequest, ToolDefinition, ToolMode,
};
use event_composer::types::{ChatMessage, FinishReason, GenerationSettings};

fn summary_tool() -> ToolDefinition {
    ToolDefinition {
        name: "get_draft_summary".into(),
        description: "Summarize the current draft".into(),
        parameters: json!({"type": "object", "properties": {}}),
    }
}

fn hello() -> ProviderRequest {
    ProviderRequest::new(vec![
        ChatMessage::system("You help plan events."),
        ChatMessage::user("hello"),
    ])
}

#[tokio::test]
async fn ollama_sends_json_format_and_reads_tool_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({"model": "llama3.1", "stream": false, "format": "json"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{"function": {"name": "get_draft_summary", "arguments": {}}}]
            },
            "done_reason": "stop",
            "prompt_eval_count": 12,
            "eval_count": 3
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(
        ProviderConfig::new("local", ProviderKind::Ollama, server.uri(), "llama3.1")
            .with_tool_calling(true),
    );
    let request = hello()
        .with_settings(GenerationSettings::default().json())
        .with_tools(vec![summary_tool()]);

    let response = provider.generate(&request).await.unwrap();

    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].name, "get_draft_summary");
    assert_eq!(response.finish_reason, Some(FinishReason::ToolCalls));
    assert_eq!(response.usage.input_tokens, 12);
}

#[tokio::test]
async fn openai_compatible_sends_bearer_key_and_decodes_argument_strings() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_7",
                        "type": "function",
                        "function": {"name": "add_ticket_type", "arguments": "{\"name\":\"Adult\",\"price\":12}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 20, "completion_tokens": 8}
        })))
        .mount(&server)
        .await;

    let provider = OpenAiCompatibleProvider::new(
        ProviderConfig::new("hosted", ProviderKind::OpenAiCompatible, server.uri(), "gpt-4o-mini")
            .with_tool_calling(true),
        Some("sk-test".into()),
    );

    let response = provider.generate(&hello()).await.unwrap();

    let call = &response.tool_calls[0];
    assert_eq!(call.id, "call_7");
    assert_eq!(call.arguments, json!({"name": "Adult", "price": 12}));
    assert_eq!(response.content, "");
}

#[tokio::test]
async fn anthropic_moves_system_prompt_and_reads_tool_use_blocks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "ak-test"))
        .and(body_partial_json(json!({"system": "You help plan events."})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "toolu_1", "name": "get_draft_summary", "input": {}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 30, "output_tokens": 9}
        })))
        .mount(&server)
        .await;

    let provider = AnthropicProvider::new(
        ProviderConfig::new("claude", ProviderKind::Anthropic, server.uri(), "claude-haiku")
            .with_tool_calling(true),
        "ak-test".into(),
    );

    let response = provider.generate(&hello()).await.unwrap();

    assert_eq!(response.content, "Let me check.");
    assert_eq!(response.tool_calls[0].id, "toolu_1");
    assert_eq!(response.finish_reason, Some(FinishReason::ToolCalls));
}

#[tokio::test]
async fn server_errors_are_unreachable_and_bad_requests_are_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad model"))
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(ProviderConfig::new(
        "local",
        ProviderKind::Ollama,
        server.uri(),
        "llama3.1",
    ));

    let first = provider.generate(&hello()).await.unwrap_err();
    assert_eq!(first.kind, ProviderErrorKind::Unreachable);
    assert!(first.message.contains("503"));

    let second = provider.generate(&hello()).await.unwrap_err();
    assert_eq!(second.kind, ProviderErrorKind::InvalidResponse);
}

#[tokio::test]
async fn slow_backend_hits_the_call_deadline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"message": {"role": "assistant", "content": "late"}}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(ProviderConfig::new(
        "local",
        ProviderKind::Ollama,
        server.uri(),
        "llama3.1",
    ));

    let err = invoke(&provider, &hello(), ToolMode::Auto, Duration::from_millis(100))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ProviderErrorKind::Timeout);
}

#[tokio::test]
async fn chat_only_backend_gets_a_tool_prompt_and_its_text_calls_lifted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {
                "role": "assistant",
                "content": "{\"tool\": \"get_draft_summary\", \"arguments\": {}}"
            },
            "done_reason": "stop"
        })))
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(ProviderConfig::new(
        "local",
        ProviderKind::Ollama,
        server.uri(),
        "llama3.1",
    ));
    let request = hello().with_tools(vec![summary_tool()]);

    let response = invoke(&provider, &request, ToolMode::Auto, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(response.tool_calls[0].name, "get_draft_summary");

    let received = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert!(body.get("tools").is_none());
}

#[tokio::test]
async fn probe_reports_each_stage() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": []})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {"role": "assistant", "content": "OK"},
            "done_reason": "stop"
        })))
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(
        ProviderConfig::new("local", ProviderKind::Ollama, server.uri(), "llama3.1")
            .with_tool_calling(true),
    );

    let result = probe_provider(&provider, &HealthConfig::default()).await;

    let kinds: Vec<_> = result.checks.iter().map(|c| (c.kind, c.passed)).collect();
    assert_eq!(
        kinds,
        vec![
            (ProbeKind::Connectivity, true),
            (ProbeKind::Generation, true),
            (ProbeKind::ToolCalling, false),
        ]
    );
    assert_eq!(result.status, HealthStatus::Degraded);
}

#[tokio::test]
async fn probe_marks_unreachable_backend_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(ProviderConfig::new(
        "local",
        ProviderKind::Ollama,
        server.uri(),
        "llama3.1",
    ));

    let result = probe_provider(&provider, &HealthConfig::default()).await;
    assert_eq!(result.status, HealthStatus::Unavailable);
    assert_eq!(result.checks.len(), 1);
}
