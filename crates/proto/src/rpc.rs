//! Typed RPC surfaces between services. One request/response enum pair
//! per servicer; both ends depend on this crate so the wire shape cannot
//! drift.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use px_domain::Principal;

use crate::job::{ModelConfiguration, ToolDefinition};
use crate::memory::RichMessage;

// ── Node service ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum NodeRequest {
    GetNodeDetails { node_id: Uuid, principal: Principal },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum NodeResponse {
    NodeDetails(NodeDetails),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDetails {
    pub id: Uuid,
    pub project_id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub status: NodeStatus,
    pub configuration: Value,
}

/// Node lifecycle status. `Altered` nodes remain usable; `Inactive`
/// nodes are refused for inference until reconfigured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Draft,
    Active,
    Altered,
    Inactive,
}

impl NodeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeStatus::Draft => "draft",
            NodeStatus::Active => "active",
            NodeStatus::Altered => "altered",
            NodeStatus::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(NodeStatus::Draft),
            "active" => Some(NodeStatus::Active),
            "altered" => Some(NodeStatus::Altered),
            "inactive" => Some(NodeStatus::Inactive),
            _ => None,
        }
    }
}

// ── Model service ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ModelRequest {
    GetConfiguration { model_id: Uuid, principal: Principal },
    GetCapabilities { model_id: Uuid, principal: Principal },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ModelResponse {
    Configuration(ModelConfiguration),
    Capabilities(Vec<String>),
}

// ── Tool service ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ToolRequest {
    GetDefinitions {
        tool_ids: Vec<Uuid>,
        principal: Principal,
    },
    ExecuteMany {
        calls: Vec<ToolInvocation>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ToolResponse {
    Definitions(Vec<ToolDefinition>),
    Executed(Vec<ToolOutcome>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub call_id: String,
    pub name: String,
    pub output: String,
}

// ── Memory service ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MemoryRequest {
    GetHistory { bucket_id: Uuid, principal: Principal },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MemoryResponse {
    History {
        bucket_id: Uuid,
        history: Vec<RichMessage>,
    },
}

// ── Data service ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DataRequest {
    GetFileMetadata {
        file_ids: Vec<Uuid>,
        principal: Principal,
    },
    GetFileContent {
        file_id: Uuid,
        principal: Principal,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DataResponse {
    Metadata(Vec<FileMetadata>),
    Content(FileContent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    pub id: Uuid,
    pub filename: String,
    pub mimetype: String,
    pub size_bytes: i64,
}

/// Retrieved file content, reduced to what a model can consume.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FileContent {
    #[serde(rename = "text_content")]
    Text { content: String },
    #[serde(rename = "image_url")]
    ImageUrl { url: String },
    #[serde(rename = "unsupported")]
    Unsupported { content: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_status_round_trip() {
        for s in [
            NodeStatus::Draft,
            NodeStatus::Active,
            NodeStatus::Altered,
            NodeStatus::Inactive,
        ] {
            assert_eq!(NodeStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(NodeStatus::parse("zombie"), None);
    }

    #[test]
    fn requests_tag_with_op() {
        let req = ModelRequest::GetCapabilities {
            model_id: Uuid::nil(),
            principal: Principal::user(Uuid::nil()),
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["op"], "get_capabilities");
    }

    #[test]
    fn file_content_variants_tag_with_type() {
        let v = serde_json::to_value(FileContent::Text {
            content: "hi".into(),
        })
        .unwrap();
        assert_eq!(v["type"], "text_content");
        let v = serde_json::to_value(FileContent::Unsupported {
            content: "binary".into(),
        })
        .unwrap();
        assert_eq!(v["type"], "unsupported");
    }
}
