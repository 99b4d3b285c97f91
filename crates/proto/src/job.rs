//! The self-contained inference job payload published on
//! `inference_exchange / inference.job.start`, and the client-facing
//! request body it is assembled from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::memory::RichMessage;

// ── Client request body ────────────────────────────────────────────

/// Body of `POST /nodes/{id}/infer`. At least one of `prompt` / `inputs`
/// must be present; the orchestrator enforces this.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InferenceRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub inputs: Vec<InputItem>,
    #[serde(default)]
    pub resource_overrides: ResourceOverrides,
    #[serde(default)]
    pub parameter_overrides: serde_json::Map<String, Value>,
    #[serde(default)]
    pub output_config: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InputItem {
    #[serde(rename = "file_id")]
    FileId { id: Uuid },
    #[serde(rename = "image_url")]
    ImageUrl { url: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceOverrides {
    #[serde(default)]
    pub use_memory: Option<bool>,
    #[serde(default)]
    pub use_rag: Option<bool>,
    #[serde(default)]
    pub use_tools: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub mode: OutputMode,
    #[serde(default)]
    pub persist_inputs_in_memory: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            mode: OutputMode::Blocking,
            persist_inputs_in_memory: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    Streaming,
    #[default]
    Blocking,
}

// ── Job payload ────────────────────────────────────────────────────

/// The full job record the executor consumes. Self-contained: the
/// executor needs no further metadata fetches, only content retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    pub job_id: Uuid,
    pub user_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub query: InferenceRequest,
    #[serde(default)]
    pub default_parameters: serde_json::Map<String, Value>,
    pub resources: JobResources,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobResources {
    #[serde(default)]
    pub model_config: ModelConfiguration,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub rag_context: Option<RagContext>,
    #[serde(default)]
    pub memory_context: Option<MemoryContext>,
}

/// Decrypted model configuration as served by the model registry.
///
/// `configuration` keeps the registry's schema shape: credentials and
/// parameters live under `properties.<key>.default` slots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfiguration {
    pub model_id: Uuid,
    pub provider: String,
    #[serde(default)]
    pub configuration: Value,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Tool definition as served to the executor; only what the LLM and the
/// call stub need. The execution block stays inside the tool service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's arguments.
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagContext {
    pub collection_id: Option<Uuid>,
    #[serde(default)]
    pub documents: Vec<RagDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagDocument {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryContext {
    pub bucket_id: Uuid,
    #[serde(default)]
    pub history: Vec<RichMessage>,
}

impl InferenceRequest {
    /// True when streaming delivery was requested.
    pub fn is_streaming(&self) -> bool {
        self.output_config.mode == OutputMode::Streaming
    }

    pub fn prompt_text(&self) -> &str {
        self.prompt.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults_to_blocking() {
        let req: InferenceRequest = serde_json::from_str("{\"prompt\":\"hi\"}").unwrap();
        assert!(!req.is_streaming());
        assert!(!req.output_config.persist_inputs_in_memory);
        assert!(req.inputs.is_empty());
    }

    #[test]
    fn input_items_are_tagged() {
        let req: InferenceRequest = serde_json::from_value(serde_json::json!({
            "inputs": [
                {"type": "file_id", "id": "00000000-0000-0000-0000-000000000001"},
                {"type": "image_url", "url": "https://example.test/cat.png"}
            ]
        }))
        .unwrap();
        assert!(matches!(req.inputs[0], InputItem::FileId { .. }));
        assert!(matches!(req.inputs[1], InputItem::ImageUrl { .. }));
    }

    #[test]
    fn job_payload_round_trip() {
        let payload = JobPayload {
            job_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            query: InferenceRequest {
                prompt: Some("hello".into()),
                output_config: OutputConfig {
                    mode: OutputMode::Streaming,
                    persist_inputs_in_memory: true,
                },
                ..Default::default()
            },
            default_parameters: serde_json::Map::new(),
            resources: JobResources::default(),
        };
        let json = serde_json::to_string(&payload).unwrap();
        let back: JobPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back.job_id, payload.job_id);
        assert!(back.query.is_streaming());
        assert!(back.query.output_config.persist_inputs_in_memory);
    }
}
