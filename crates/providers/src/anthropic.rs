//! Anthropic-native adapter.
//!
//! Implements the Messages API: system messages go in the top-level
//! `system` field, tool results travel as user messages with
//! `tool_result` content blocks.

use px_domain::chat::{ChatContent, ChatMessage, ChatPart, Role, ToolCall, ToolSpec};
use px_domain::stream::{BoxStream, StreamEvent, Usage};
use px_domain::{Error, Result};
use serde_json::Value;

use crate::traits::{ChatRequest, ChatResponse, LlmProvider};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug)]
pub struct AnthropicProvider {
    api_key: String,
    default_model: Option<String>,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>, default_model: Option<String>) -> Self {
        Self {
            api_key: api_key.into(),
            default_model,
            client: reqwest::Client::new(),
        }
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
    }

    fn build_messages_body(&self, req: &ChatRequest, stream: bool) -> Result<Value> {
        let model = req
            .model
            .clone()
            .or_else(|| self.default_model.clone())
            .ok_or_else(|| Error::invalid_argument("no model name configured"))?;

        // Separate out system messages.
        let mut system_parts: Vec<String> = Vec::new();
        let mut api_messages: Vec<Value> = Vec::new();

        for msg in &req.messages {
            match msg.role {
                Role::System => system_parts.push(msg.content.extract_all_text()),
                Role::User => api_messages.push(user_msg_to_anthropic(msg)),
                Role::Assistant => api_messages.push(assistant_msg_to_anthropic(msg)),
                Role::Tool => api_messages.push(tool_result_to_anthropic(msg)),
            }
        }

        let mut body = serde_json::json!({
            "model": model,
            "messages": api_messages,
            "stream": stream,
            "max_tokens": req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });

        if !system_parts.is_empty() {
            body["system"] = Value::String(system_parts.join("\n\n"));
        }
        if !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(tool_to_anthropic).collect();
            body["tools"] = Value::Array(tools);
        }
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }

        Ok(body)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn user_msg_to_anthropic(msg: &ChatMessage) -> Value {
    match &msg.content {
        ChatContent::Text(t) => serde_json::json!({"role": "user", "content": t}),
        ChatContent::Parts(parts) => {
            let content: Vec<Value> = parts
                .iter()
                .filter_map(|p| match p {
                    ChatPart::Text { text } => {
                        Some(serde_json::json!({"type": "text", "text": text}))
                    }
                    ChatPart::Image { url } => Some(serde_json::json!({
                        "type": "image",
                        "source": {"type": "url", "url": url},
                    })),
                    _ => None,
                })
                .collect();
            serde_json::json!({"role": "user", "content": content})
        }
    }
}

fn assistant_msg_to_anthropic(msg: &ChatMessage) -> Value {
    match &msg.content {
        ChatContent::Text(t) => serde_json::json!({
            "role": "assistant",
            "content": [{"type": "text", "text": t}],
        }),
        ChatContent::Parts(parts) => {
            let content: Vec<Value> = parts
                .iter()
                .filter_map(|p| match p {
                    ChatPart::Text { text } => {
                        Some(serde_json::json!({"type": "text", "text": text}))
                    }
                    ChatPart::ToolUse { id, name, input } => Some(serde_json::json!({
                        "type": "tool_use",
                        "id": id,
                        "name": name,
                        "input": input,
                    })),
                    _ => None,
                })
                .collect();
            serde_json::json!({"role": "assistant", "content": content})
        }
    }
}

fn tool_result_to_anthropic(msg: &ChatMessage) -> Value {
    // Anthropic: tool results are user messages with tool_result blocks.
    let content: Vec<Value> = match &msg.content {
        ChatContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                ChatPart::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => Some(serde_json::json!({
                    "type": "tool_result",
                    "tool_use_id": tool_use_id,
                    "content": content,
                    "is_error": is_error,
                })),
                _ => None,
            })
            .collect(),
        ChatContent::Text(t) => vec![serde_json::json!({
            "type": "tool_result",
            "tool_use_id": "",
            "content": t,
        })],
    };
    serde_json::json!({"role": "user", "content": content})
}

fn tool_to_anthropic(tool: &ToolSpec) -> Value {
    serde_json::json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.parameters,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_anthropic_response(body: &Value) -> Result<ChatResponse> {
    let empty = Vec::new();
    let content_arr = body
        .get("content")
        .and_then(|v| v.as_array())
        .unwrap_or(&empty);

    let mut text_parts: Vec<String> = Vec::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();

    for block in content_arr {
        match block.get("type").and_then(|t| t.as_str()) {
            Some("text") => {
                if let Some(t) = block.get("text").and_then(|t| t.as_str()) {
                    text_parts.push(t.to_string());
                }
            }
            Some("tool_use") => {
                tool_calls.push(ToolCall {
                    call_id: block
                        .get("id")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    tool_name: block
                        .get("name")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    arguments: block.get("input").cloned().unwrap_or(Value::Null),
                });
            }
            _ => {}
        }
    }

    let usage = body.get("usage").and_then(|u| {
        let input = u.get("input_tokens")?.as_u64()? as u32;
        let output = u.get("output_tokens")?.as_u64()? as u32;
        Some(Usage {
            prompt_tokens: input,
            completion_tokens: output,
            total_tokens: input + output,
        })
    });

    Ok(ChatResponse {
        content: text_parts.join("\n"),
        tool_calls,
        usage,
        model: body
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string(),
        finish_reason: body
            .get("stop_reason")
            .and_then(|v| v.as_str())
            .map(String::from),
    })
}

fn parse_sse_data(data: &str) -> Vec<Result<StreamEvent>> {
    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return vec![Err(e.into())],
    };

    match v.get("type").and_then(|t| t.as_str()) {
        Some("content_block_delta") => {
            let text = v
                .get("delta")
                .and_then(|d| d.get("text"))
                .and_then(|t| t.as_str())
                .unwrap_or("");
            if text.is_empty() {
                Vec::new()
            } else {
                vec![Ok(StreamEvent::Token {
                    text: text.to_string(),
                })]
            }
        }
        Some("message_stop") => vec![Ok(StreamEvent::Done {
            usage: None,
            finish_reason: Some("stop".into()),
        })],
        Some("error") => {
            let message = v
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("unknown stream error");
            vec![Ok(StreamEvent::Error {
                message: message.to_string(),
            })]
        }
        _ => Vec::new(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{BASE_URL}/v1/messages");
        let body = self.build_messages_body(req, false)?;

        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::unavailable(format!("anthropic: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::unavailable(format!("anthropic: {e}")))?;

        if !status.is_success() {
            return Err(Error::unavailable(format!(
                "anthropic: HTTP {} - {}",
                status.as_u16(),
                text
            )));
        }

        let json: Value = serde_json::from_str(&text)?;
        parse_anthropic_response(&json)
    }

    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let url = format!("{BASE_URL}/v1/messages");
        let body = self.build_messages_body(req, true)?;

        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::unavailable(format!("anthropic: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::unavailable(format!(
                "anthropic: HTTP {} - {}",
                status.as_u16(),
                text
            )));
        }

        Ok(crate::sse::sse_response_stream(resp, parse_sse_data))
    }

    fn provider_id(&self) -> &str {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_messages_lift_to_top_level() {
        let p = AnthropicProvider::new("key", Some("claude-sonnet-4-20250514".into()));
        let req = ChatRequest {
            messages: vec![ChatMessage::system("be terse"), ChatMessage::user("hi")],
            ..Default::default()
        };
        let body = p.build_messages_body(&req, false).unwrap();
        assert_eq!(body["system"], "be terse");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn tool_results_become_user_blocks() {
        let msg = ChatMessage::tool_result("toolu_1", "42 degrees");
        let v = tool_result_to_anthropic(&msg);
        assert_eq!(v["role"], "user");
        assert_eq!(v["content"][0]["type"], "tool_result");
        assert_eq!(v["content"][0]["tool_use_id"], "toolu_1");
    }

    #[test]
    fn parse_response_with_tool_use() {
        let body = serde_json::json!({
            "model": "claude-sonnet-4-20250514",
            "stop_reason": "tool_use",
            "content": [
                {"type": "text", "text": "checking"},
                {"type": "tool_use", "id": "toolu_1", "name": "web_fetch",
                 "input": {"url": "https://example.test"}}
            ],
            "usage": {"input_tokens": 10, "output_tokens": 5}
        });
        let resp = parse_anthropic_response(&body).unwrap();
        assert_eq!(resp.content, "checking");
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].call_id, "toolu_1");
        assert_eq!(resp.usage.as_ref().unwrap().total_tokens, 15);
    }

    #[test]
    fn sse_delta_and_stop() {
        let events =
            parse_sse_data(r#"{"type":"content_block_delta","delta":{"text":"to"}}"#);
        assert!(matches!(
            events.as_slice(),
            [Ok(StreamEvent::Token { text })] if text == "to"
        ));

        let events = parse_sse_data(r#"{"type":"message_stop"}"#);
        assert!(matches!(events.as_slice(), [Ok(StreamEvent::Done { .. })]));

        assert!(parse_sse_data(r#"{"type":"ping"}"#).is_empty());
    }
}
