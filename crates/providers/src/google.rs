//! Google Gemini adapter.
//!
//! Implements the `generateContent` and `streamGenerateContent` APIs.
//! Auth is via an API key passed as a query parameter (`key={api_key}`).

use px_domain::chat::{ChatContent, ChatMessage, ChatPart, Role, ToolCall, ToolSpec};
use px_domain::stream::{BoxStream, StreamEvent, Usage};
use px_domain::{Error, Result};
use serde_json::Value;

use crate::traits::{ChatRequest, ChatResponse, LlmProvider};

const BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug)]
pub struct GoogleProvider {
    api_key: String,
    default_model: Option<String>,
    client: reqwest::Client,
}

impl GoogleProvider {
    pub fn new(api_key: impl Into<String>, default_model: Option<String>) -> Self {
        Self {
            api_key: api_key.into(),
            default_model,
            client: reqwest::Client::new(),
        }
    }

    fn model(&self, req: &ChatRequest) -> Result<String> {
        req.model
            .clone()
            .or_else(|| self.default_model.clone())
            .ok_or_else(|| Error::invalid_argument("no model name configured"))
    }

    fn generate_url(&self, model: &str) -> String {
        format!(
            "{BASE_URL}/v1beta/models/{model}:generateContent?key={}",
            self.api_key
        )
    }

    fn stream_url(&self, model: &str) -> String {
        format!(
            "{BASE_URL}/v1beta/models/{model}:streamGenerateContent?alt=sse&key={}",
            self.api_key
        )
    }

    fn build_body(&self, req: &ChatRequest) -> Value {
        let mut contents: Vec<Value> = Vec::new();
        let mut system_instruction: Option<Value> = None;

        for msg in &req.messages {
            match msg.role {
                Role::System => {
                    system_instruction = Some(serde_json::json!({
                        "parts": [{"text": msg.content.extract_all_text()}]
                    }));
                }
                Role::User => contents.push(user_to_gemini(msg)),
                Role::Assistant => contents.push(assistant_to_gemini(msg)),
                Role::Tool => contents.push(tool_result_to_gemini(msg)),
            }
        }

        let mut body = serde_json::json!({"contents": contents});
        if let Some(si) = system_instruction {
            body["systemInstruction"] = si;
        }
        if !req.tools.is_empty() {
            let declarations: Vec<Value> = req.tools.iter().map(tool_to_gemini).collect();
            body["tools"] = serde_json::json!([{"functionDeclarations": declarations}]);
        }

        let mut generation_config = serde_json::Map::new();
        if let Some(temp) = req.temperature {
            generation_config.insert("temperature".into(), serde_json::json!(temp));
        }
        if let Some(max) = req.max_tokens {
            generation_config.insert("maxOutputTokens".into(), serde_json::json!(max));
        }
        if !generation_config.is_empty() {
            body["generationConfig"] = Value::Object(generation_config);
        }

        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn user_to_gemini(msg: &ChatMessage) -> Value {
    let parts: Vec<Value> = match &msg.content {
        ChatContent::Text(t) => vec![serde_json::json!({"text": t})],
        ChatContent::Parts(list) => list
            .iter()
            .filter_map(|p| match p {
                ChatPart::Text { text } => Some(serde_json::json!({"text": text})),
                ChatPart::Image { url } => Some(serde_json::json!({
                    "fileData": {"fileUri": url}
                })),
                _ => None,
            })
            .collect(),
    };
    serde_json::json!({"role": "user", "parts": parts})
}

fn assistant_to_gemini(msg: &ChatMessage) -> Value {
    let parts: Vec<Value> = match &msg.content {
        ChatContent::Text(t) => vec![serde_json::json!({"text": t})],
        ChatContent::Parts(list) => list
            .iter()
            .filter_map(|p| match p {
                ChatPart::Text { text } => Some(serde_json::json!({"text": text})),
                ChatPart::ToolUse { name, input, .. } => Some(serde_json::json!({
                    "functionCall": {"name": name, "args": input}
                })),
                _ => None,
            })
            .collect(),
    };
    serde_json::json!({"role": "model", "parts": parts})
}

fn tool_result_to_gemini(msg: &ChatMessage) -> Value {
    let parts: Vec<Value> = match &msg.content {
        ChatContent::Parts(list) => list
            .iter()
            .filter_map(|p| match p {
                ChatPart::ToolResult {
                    tool_use_id,
                    content,
                    ..
                } => Some(serde_json::json!({
                    "functionResponse": {
                        "name": tool_use_id,
                        "response": {"output": content},
                    }
                })),
                _ => None,
            })
            .collect(),
        ChatContent::Text(t) => vec![serde_json::json!({"text": t})],
    };
    serde_json::json!({"role": "user", "parts": parts})
}

fn tool_to_gemini(tool: &ToolSpec) -> Value {
    serde_json::json!({
        "name": tool.name,
        "description": tool.description,
        "parameters": tool.parameters,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_gemini_response(body: &Value) -> Result<ChatResponse> {
    let candidate = body
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::unavailable("google: no candidates in response"))?;

    let empty = Vec::new();
    let parts = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .unwrap_or(&empty);

    let mut text_parts: Vec<String> = Vec::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();

    for (i, part) in parts.iter().enumerate() {
        if let Some(t) = part.get("text").and_then(|t| t.as_str()) {
            text_parts.push(t.to_string());
        }
        if let Some(fc) = part.get("functionCall") {
            tool_calls.push(ToolCall {
                call_id: format!("call_{i}"),
                tool_name: fc
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                arguments: fc.get("args").cloned().unwrap_or(Value::Null),
            });
        }
    }

    let usage = body.get("usageMetadata").and_then(|u| {
        Some(Usage {
            prompt_tokens: u.get("promptTokenCount")?.as_u64()? as u32,
            completion_tokens: u.get("candidatesTokenCount")?.as_u64()? as u32,
            total_tokens: u.get("totalTokenCount")?.as_u64()? as u32,
        })
    });

    Ok(ChatResponse {
        content: text_parts.join(""),
        tool_calls,
        usage,
        model: body
            .get("modelVersion")
            .and_then(|v| v.as_str())
            .unwrap_or("gemini")
            .to_string(),
        finish_reason: candidate
            .get("finishReason")
            .and_then(|v| v.as_str())
            .map(String::from),
    })
}

fn parse_sse_data(data: &str) -> Vec<Result<StreamEvent>> {
    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return vec![Err(e.into())],
    };

    let candidate = match v
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
    {
        Some(c) => c,
        None => return Vec::new(),
    };

    let mut events = Vec::new();
    if let Some(parts) = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
    {
        for part in parts {
            if let Some(t) = part.get("text").and_then(|t| t.as_str()) {
                if !t.is_empty() {
                    events.push(Ok(StreamEvent::Token {
                        text: t.to_string(),
                    }));
                }
            }
        }
    }

    if let Some(reason) = candidate.get("finishReason").and_then(|v| v.as_str()) {
        events.push(Ok(StreamEvent::Done {
            usage: None,
            finish_reason: Some(reason.to_string()),
        }));
    }

    events
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for GoogleProvider {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let model = self.model(req)?;
        let url = self.generate_url(&model);
        let body = self.build_body(req);

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::unavailable(format!("google: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::unavailable(format!("google: {e}")))?;

        if !status.is_success() {
            return Err(Error::unavailable(format!(
                "google: HTTP {} - {}",
                status.as_u16(),
                text
            )));
        }

        let json: Value = serde_json::from_str(&text)?;
        parse_gemini_response(&json)
    }

    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let model = self.model(req)?;
        let url = self.stream_url(&model);
        let body = self.build_body(req);

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::unavailable(format!("google: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::unavailable(format!(
                "google: HTTP {} - {}",
                status.as_u16(),
                text
            )));
        }

        Ok(crate::sse::sse_response_stream(resp, parse_sse_data))
    }

    fn provider_id(&self) -> &str {
        "google"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_message_becomes_system_instruction() {
        let p = GoogleProvider::new("key", Some("gemini-2.0-flash".into()));
        let req = ChatRequest {
            messages: vec![ChatMessage::system("be terse"), ChatMessage::user("hi")],
            ..Default::default()
        };
        let body = p.build_body(&req);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be terse");
        assert_eq!(body["contents"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn assistant_role_maps_to_model() {
        let v = assistant_to_gemini(&ChatMessage::assistant("ok"));
        assert_eq!(v["role"], "model");
        assert_eq!(v["parts"][0]["text"], "ok");
    }

    #[test]
    fn parse_function_call_response() {
        let body = serde_json::json!({
            "candidates": [{
                "content": {"parts": [
                    {"functionCall": {"name": "web_fetch", "args": {"url": "https://x.test"}}}
                ]},
                "finishReason": "STOP"
            }]
        });
        let resp = parse_gemini_response(&body).unwrap();
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].tool_name, "web_fetch");
    }

    #[test]
    fn sse_parses_token_parts() {
        let events = parse_sse_data(
            r#"{"candidates":[{"content":{"parts":[{"text":"he"}]}}]}"#,
        );
        assert!(matches!(
            events.as_slice(),
            [Ok(StreamEvent::Token { text })] if text == "he"
        ));
    }
}
