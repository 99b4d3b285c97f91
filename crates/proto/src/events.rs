//! Event payloads and routing constants for the bus.
//!
//! Exchange and routing-key names are fixed across the platform; workers
//! bind by these constants and never by string literals at call sites.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::memory::RichMessage;

// ── Exchanges ──────────────────────────────────────────────────────

pub const USER_EVENTS: &str = "user_events";
pub const PROJECT_EVENTS: &str = "project_events";
pub const RESOURCE_EVENTS: &str = "resource_events";
pub const MEMORY_EXCHANGE: &str = "memory_exchange";
pub const INFERENCE_EXCHANGE: &str = "inference_exchange";
pub const RESULTS_EXCHANGE: &str = "results_exchange";
pub const JOB_CONTROL_FANOUT: &str = "job_control_fanout_exchange";

// ── Routing keys ───────────────────────────────────────────────────

pub const USER_DELETION_INITIATED: &str = "user.deletion.initiated";
pub const ALL_PROJECTS_FOR_USER_DELETED: &str = "all_projects_for_user.deleted";
pub const PROJECT_DELETION_INITIATED: &str = "project.deletion.initiated";
pub const MODEL_DELETED: &str = "model.deleted";
pub const TOOL_DELETED: &str = "tool.deleted";
pub const MEMORY_BUCKET_DELETED: &str = "memory.bucket.deleted";
pub const MODEL_CAPABILITIES_UPDATED: &str = "model.capabilities.updated";
pub const MEMORY_CONTEXT_UPDATE: &str = "memory.context.update";
pub const INFERENCE_JOB_START: &str = "inference.job.start";
pub const INFERENCE_RESULT_FINAL: &str = "inference.result.final";
pub const INFERENCE_RESULT_ERROR: &str = "inference.result.error";

/// Routing key for a per-job streaming chunk.
pub fn streaming_key(job_id: Uuid) -> String {
    format!("inference.result.streaming.{job_id}")
}

/// Per-service confirmation key for a project-deletion saga.
pub fn project_resource_deleted_key(service_name: &str) -> String {
    format!("resource.for_project.deleted.{service_name}")
}

/// Per-service confirmation key for a user-deletion saga.
pub fn user_resource_deleted_key(service_name: &str) -> String {
    format!("resource.for_user.deleted.{service_name}")
}

// ── Envelope ───────────────────────────────────────────────────────

pub const SCHEMA_VERSION: u32 = 1;

/// Standard envelope carried by every bus message. Downstream idempotency
/// hinges on application-level keys inside the payload, not on `event_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub schema_version: u32,
    pub event_id: Uuid,
    pub emitted_at: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn wrap(payload: T) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            event_id: Uuid::new_v4(),
            emitted_at: Utc::now(),
            payload,
        }
    }
}

// ── Saga events ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDeletionInitiated {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceForUserDeleted {
    pub user_id: Uuid,
    pub service_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllProjectsForUserDeleted {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDeletionInitiated {
    pub project_id: Uuid,
    pub owner_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceForProjectDeleted {
    pub project_id: Uuid,
    pub service_name: String,
}

// ── Resource dependency events ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDeleted {
    pub model_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDeleted {
    pub tool_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryBucketDeleted {
    pub bucket_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCapabilitiesUpdated {
    pub model_id: Uuid,
    pub new_capabilities: Vec<String>,
}

// ── Memory feedback ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryContextUpdate {
    /// Job id; deduplicates replayed updates.
    pub idempotency_key: Uuid,
    pub memory_bucket_id: Uuid,
    pub messages_to_add: Vec<RichMessage>,
}

// ── Job control ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCancel {
    pub job_id: Uuid,
    pub user_id: Uuid,
}

// ── Result events ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub job_id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
}

impl StreamChunk {
    pub fn new(job_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            job_id,
            kind: "chunk".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalResult {
    pub job_id: Uuid,
    pub status: String,
    pub content: String,
}

impl FinalResult {
    pub fn success(job_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            job_id,
            status: "success".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResult {
    pub job_id: Uuid,
    pub status: String,
    pub error: String,
}

impl ErrorResult {
    pub fn new(job_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            job_id,
            status: "error".into(),
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_flattens_payload() {
        let env = Envelope::wrap(ModelDeleted {
            model_id: Uuid::nil(),
        });
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["schema_version"], 1);
        assert!(v["event_id"].is_string());
        assert!(v["emitted_at"].is_string());
        assert_eq!(v["model_id"], "00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn streaming_key_embeds_job_id() {
        let id = Uuid::nil();
        assert_eq!(
            streaming_key(id),
            "inference.result.streaming.00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn confirmation_keys() {
        assert_eq!(
            project_resource_deleted_key("NodeService"),
            "resource.for_project.deleted.NodeService"
        );
        assert_eq!(
            user_resource_deleted_key("ToolService"),
            "resource.for_user.deleted.ToolService"
        );
    }
}
