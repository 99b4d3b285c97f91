//! Tool execution: builtin functions, webhooks, and MCP endpoints.
//!
//! Every call resolves the tool by name, dispatches on
//! `definition.execution.type`, and reduces the result to a string
//! observation. Errors become observations too — a failed tool call must
//! not kill the agent loop that issued it.

use std::time::Duration;

use futures_util::future::join_all;
use px_domain::{Error, Result};
use px_proto::rpc::{ToolInvocation, ToolOutcome};
use serde_json::Value;

use crate::store::ToolStore;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);
/// Builtin web_fetch truncates bodies to keep observations model-sized.
const FETCH_BODY_CAP: usize = 8 * 1024;

#[derive(Clone)]
pub struct ToolExecutor {
    store: ToolStore,
    client: reqwest::Client,
}

impl ToolExecutor {
    pub fn new(store: ToolStore) -> Self {
        Self {
            store,
            client: reqwest::Client::new(),
        }
    }

    /// Execute a batch of calls concurrently, preserving input order.
    pub async fn execute_many(&self, calls: Vec<ToolInvocation>) -> Vec<ToolOutcome> {
        join_all(calls.into_iter().map(|call| async move {
            let name = call.name.clone();
            let call_id = call.call_id.clone();
            let output = match self.execute_single(&call).await {
                Ok(output) => output,
                Err(e) => format!("error: {}", e.message),
            };
            ToolOutcome {
                call_id,
                name,
                output,
            }
        }))
        .await
    }

    async fn execute_single(&self, call: &ToolInvocation) -> Result<String> {
        let tool = self
            .store
            .find_by_name(&call.name)
            .await?
            .ok_or_else(|| Error::not_found(format!("tool '{}' not found", call.name)))?;

        let execution = tool.execution();
        let exec_type = execution.get("type").and_then(|v| v.as_str()).unwrap_or("");

        tracing::info!(tool = %call.name, exec_type, "executing tool call");

        match exec_type {
            "internal_function" => {
                let pointer = execution
                    .get("pointer")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        Error::invalid_argument("internal_function execution is missing 'pointer'")
                    })?;
                self.execute_builtin(pointer, &call.arguments).await
            }
            "webhook" => self.execute_webhook(&execution, &call.arguments).await,
            other => Err(Error::invalid_argument(format!(
                "unknown execution type '{other}' for tool '{}'",
                call.name
            ))),
        }
    }

    // ── Builtins ───────────────────────────────────────────────────

    async fn execute_builtin(&self, pointer: &str, arguments: &Value) -> Result<String> {
        match pointer {
            "web_fetch" => self.builtin_web_fetch(arguments).await,
            "get_current_weather" => self.builtin_weather(arguments).await,
            other => Err(Error::invalid_argument(format!(
                "no builtin function named '{other}'"
            ))),
        }
    }

    async fn builtin_web_fetch(&self, arguments: &Value) -> Result<String> {
        let url = arguments
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::invalid_argument("web_fetch requires a 'url' argument"))?;

        let resp = self
            .client
            .get(url)
            .timeout(WEBHOOK_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::unavailable(format!("fetch {url}: {e}")))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::unavailable(format!("fetch {url}: {e}")))?;

        let mut body = body;
        if body.len() > FETCH_BODY_CAP {
            body.truncate(FETCH_BODY_CAP);
            body.push_str("\n… [truncated]");
        }
        Ok(format!("HTTP {}\n{}", status.as_u16(), body))
    }

    async fn builtin_weather(&self, arguments: &Value) -> Result<String> {
        let location = arguments
            .get("location")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                Error::invalid_argument("get_current_weather requires a 'location' argument")
            })?;

        let api_key = std::env::var("OPENWEATHER_API_KEY")
            .map_err(|_| Error::unavailable("weather service is not configured"))?;

        let url = "https://api.openweathermap.org/data/2.5/weather";
        let resp = self
            .client
            .get(url)
            .query(&[("q", location), ("appid", &api_key), ("units", "metric")])
            .timeout(WEBHOOK_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::unavailable(format!("weather lookup: {e}")))?;

        let data: Value = resp
            .json()
            .await
            .map_err(|e| Error::unavailable(format!("weather lookup: {e}")))?;

        let summary = serde_json::json!({
            "location": location,
            "conditions": data["weather"][0]["description"],
            "temperature_c": data["main"]["temp"],
            "humidity": data["main"]["humidity"],
        });
        Ok(summary.to_string())
    }

    // ── Webhook / MCP endpoints ────────────────────────────────────

    async fn execute_webhook(&self, execution: &Value, arguments: &Value) -> Result<String> {
        let url = execution
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::invalid_argument("webhook execution is missing 'url'"))?;

        let mut request = self
            .client
            .post(url)
            .timeout(WEBHOOK_TIMEOUT)
            .json(arguments);

        if let Some(auth) = execution.get("authentication") {
            if auth.get("type").and_then(|v| v.as_str()) == Some("bearer") {
                if let Some(token) = auth.get("token").and_then(|v| v.as_str()) {
                    request = request.header("Authorization", format!("Bearer {token}"));
                }
            }
        }

        let resp = request
            .send()
            .await
            .map_err(|e| Error::unavailable(format!("webhook {url}: {e}")))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::unavailable(format!("webhook {url}: {e}")))?;

        if !status.is_success() {
            return Err(Error::unavailable(format!(
                "webhook {url} returned HTTP {}: {body}",
                status.as_u16()
            )));
        }
        Ok(body)
    }
}
