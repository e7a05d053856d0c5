//! Text-based tool calling.
//!
//! Chat-only models are told about tools in a system prompt and answer with
//! a JSON object such as `{"tool": "add_ticket_type", "arguments": {...}}`.
//! Some tool-capable models do the same instead of using the native field.
//! Both shapes are lifted into structured [`ToolCall`]s here, so the rest of
//! the engine only ever sees normalized calls.

use serde_json::Value;

use crate::types::{ChatMessage, Role, ToolCall};

use super::{ProviderRequest, ToolDefinition};

/// System prompt describing `tools` and the expected call format.
pub fn tool_prompt(tools: &[ToolDefinition]) -> String {
    let mut prompt = String::from(
        "You can call the following tools. To call a tool, reply with only a JSON object \
         of the form {\"tool\": \"<name>\", \"arguments\": {...}}. \
         To answer without a tool, reply in plain text.\n\nTools:\n",
    );
    for tool in tools {
        prompt.push_str(&format!(
            "- {}: {}\n  parameters: {}\n",
            tool.name, tool.description, tool.parameters
        ));
    }
    prompt
}

/// Rewrite a tool-bearing request for a chat-only backend.
///
/// Tool definitions move into a system message; prior tool calls and tool
/// results are rendered as plain text.
pub fn prompted_request(request: &ProviderRequest) -> ProviderRequest {
    let tools = request.tools.as_deref().unwrap_or_default();
    let instructions = ChatMessage::system(tool_prompt(tools));

    let leading_system = request
        .messages
        .iter()
        .take_while(|m| m.role == Role::System)
        .count();

    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    messages.extend(request.messages[..leading_system].iter().cloned());
    messages.push(instructions);
    for msg in &request.messages[leading_system..] {
        messages.push(flatten_tool_message(msg));
    }

    ProviderRequest {
        messages,
        settings: request.settings.clone(),
        tools: None,
    }
}

fn flatten_tool_message(msg: &ChatMessage) -> ChatMessage {
    match msg.role {
        Role::Tool => ChatMessage::user(format!(
            "Tool result ({}): {}",
            msg.tool_call_id.as_deref().unwrap_or("call"),
            msg.content
        )),
        Role::Assistant if msg.has_tool_calls() => {
            let calls: Vec<String> = msg
                .tool_calls
                .iter()
                .map(|c| serde_json::json!({"tool": c.name, "arguments": c.arguments}).to_string())
                .collect();
            let mut text = msg.content.clone();
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&calls.join("\n"));
            ChatMessage::assistant(text)
        }
        _ => msg.clone(),
    }
}

/// Extract tool calls written as JSON in `text`.
///
/// Only calls naming one of `allowed` are lifted. Returns the remaining
/// prose and the calls in order of appearance; `None` when nothing matched.
pub fn lift_tool_calls(text: &str, allowed: &[&str]) -> Option<(String, Vec<ToolCall>)> {
    let mut calls = Vec::new();
    let mut spans = Vec::new();

    for (start, end) in json_object_spans(text) {
        let Ok(value) = serde_json::from_str::<Value>(&text[start..end]) else {
            continue;
        };
        let Some((name, arguments)) = call_parts(&value) else {
            continue;
        };
        if !allowed.contains(&name.as_str()) {
            continue;
        }
        calls.push(ToolCall::new(
            format!("text_call_{}", calls.len() + 1),
            name,
            arguments,
        ));
        spans.push((start, end));
    }

    if calls.is_empty() {
        return None;
    }

    let mut remaining = String::new();
    let mut cursor = 0;
    for (start, end) in spans {
        remaining.push_str(&text[cursor..start]);
        cursor = end;
    }
    remaining.push_str(&text[cursor..]);
    let remaining = remaining.replace("```json", "").replace("```", "");

    Some((remaining.trim().to_string(), calls))
}

fn call_parts(value: &Value) -> Option<(String, Value)> {
    let obj = value.as_object()?;
    let name = obj
        .get("tool")
        .or_else(|| obj.get("name"))
        .and_then(Value::as_str)?
        .to_string();
    let arguments = obj
        .get("arguments")
        .or_else(|| obj.get("parameters"))
        .or_else(|| obj.get("args"))
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()));
    // Some models double-encode the arguments.
    let arguments = match arguments {
        Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
        other => other,
    };
    Some((name, arguments))
}

/// Byte spans of top-level `{...}` objects, skipping braces inside strings.
fn json_object_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = idx;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    spans.push((start, idx + 1));
                }
            }
            _ => {}
        }
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lifts_bare_json_call() {
        let text = r#"{"tool": "add_ticket_type", "arguments": {"name": "General", "price": 20}}"#;
        let (rest, calls) = lift_tool_calls(text, &["add_ticket_type"]).unwrap();
        assert!(rest.is_empty());
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "add_ticket_type");
        assert_eq!(calls[0].arguments["price"], 20);
    }

    #[test]
    fn lifts_fenced_call_with_name_parameters_shape() {
        let text = "Sure, adding it now.\n```json\n{\"name\": \"get_draft_summary\", \"parameters\": {}}\n```";
        let (rest, calls) = lift_tool_calls(text, &["get_draft_summary"]).unwrap();
        assert_eq!(rest, "Sure, adding it now.");
        assert_eq!(calls[0].name, "get_draft_summary");
        assert_eq!(calls[0].arguments, json!({}));
    }

    #[test]
    fn ignores_unknown_tools_and_plain_json() {
        assert!(lift_tool_calls(r#"{"tool": "rm_rf", "arguments": {}}"#, &["get_draft_summary"]).is_none());
        assert!(lift_tool_calls(r#"{"title": "Pottery"}"#, &["get_draft_summary"]).is_none());
        assert!(lift_tool_calls("no json here", &["get_draft_summary"]).is_none());
    }

    #[test]
    fn braces_inside_strings_do_not_split_objects() {
        let text = r#"{"tool": "update_event_draft", "arguments": {"notes": "bring {clay}"}}"#;
        let (_, calls) = lift_tool_calls(text, &["update_event_draft"]).unwrap();
        assert_eq!(calls[0].arguments["notes"], "bring {clay}");
    }

    #[test]
    fn double_encoded_arguments_are_decoded() {
        let text = r#"{"tool": "get_draft_summary", "arguments": "{\"verbose\": true}"}"#;
        let (_, calls) = lift_tool_calls(text, &["get_draft_summary"]).unwrap();
        assert_eq!(calls[0].arguments, json!({"verbose": true}));
    }

    #[test]
    fn prompted_request_moves_tools_into_system_prompt() {
        let request = ProviderRequest::new(vec![
            ChatMessage::system("You help plan events."),
            ChatMessage::user("hi"),
            ChatMessage::assistant_tool_calls(
                "",
                vec![ToolCall::new("c1", "get_draft_summary", json!({}))],
            ),
            ChatMessage::tool_result("c1", &json!({"title": null})),
        ])
        .with_tools(vec![ToolDefinition {
            name: "get_draft_summary".into(),
            description: "Summarize the draft".into(),
            parameters: json!({"type": "object"}),
        }]);

        let prompted = prompted_request(&request);
        assert!(prompted.tools.is_none());
        assert_eq!(prompted.messages[0].content, "You help plan events.");
        assert!(prompted.messages[1].content.contains("get_draft_summary"));
        assert!(prompted
            .messages
            .iter()
            .all(|m| m.role != Role::Tool && m.tool_calls.is_empty()));
        assert!(prompted.messages[3].content.contains(r#""tool":"get_draft_summary""#));
    }
}
