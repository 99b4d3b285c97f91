//! The validation gauntlet: everything that can reject a request before
//! resources are gathered, as pure checks over already-fetched data.

use px_domain::capability::{parse_all, Capability};
use px_domain::{Error, Result};
use px_proto::job::{InferenceRequest, InputItem};
use px_proto::rpc::{FileMetadata, NodeDetails, NodeStatus};
use uuid::Uuid;

/// Effective resource switches for one request: node configuration with
/// request overrides applied.
#[derive(Debug, Clone, Default)]
pub struct ResolvedResources {
    pub memory_bucket_id: Option<Uuid>,
    pub tool_ids: Vec<Uuid>,
    pub rag_collection_id: Option<Uuid>,
    pub use_rag: bool,
}

/// Node-level checks: request shape, node status, override consistency.
/// Returns the resolved switches on success.
pub fn validate_node_request(
    node: &NodeDetails,
    request: &InferenceRequest,
) -> Result<ResolvedResources> {
    if request.prompt_text().is_empty() && request.inputs.is_empty() {
        return Err(Error::invalid_argument(
            "an inference request needs at least a prompt or inputs",
        ));
    }

    match node.status {
        NodeStatus::Inactive => {
            return Err(Error::permission_denied(
                "node is inactive: its model has been deleted; reconfigure it before inferring",
            ));
        }
        NodeStatus::Draft => {
            return Err(Error::permission_denied(
                "node is a draft: configure a model before inferring",
            ));
        }
        NodeStatus::Altered => {
            tracing::warn!(node_id = %node.id, "inference on an altered node");
        }
        NodeStatus::Active => {}
    }

    let config = &node.configuration;
    let overrides = &request.resource_overrides;

    // Overrides may only switch on sections the node actually has.
    if overrides.use_rag == Some(true) && config.get("rag_config").is_none() {
        return Err(Error::invalid_argument(
            "use_rag requested but the node has no rag_config",
        ));
    }
    if overrides.use_memory == Some(true) && config.get("memory_config").is_none() {
        return Err(Error::invalid_argument(
            "use_memory requested but the node has no memory_config",
        ));
    }

    // Memory: enabled by config unless overridden.
    let memory_config = config.get("memory_config");
    let memory_enabled = overrides.use_memory.unwrap_or_else(|| {
        memory_config
            .and_then(|m| m.get("is_enabled"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    });
    let memory_bucket_id = if memory_enabled {
        let bucket = memory_config
            .and_then(|m| m.get("bucket_id"))
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok());
        match bucket {
            Some(id) => Some(id),
            None => {
                return Err(Error::invalid_argument(
                    "memory is enabled but the node has no bucket_id",
                ));
            }
        }
    } else {
        None
    };

    // Tools: configured list unless overridden off.
    let tool_ids = if overrides.use_tools == Some(false) {
        Vec::new()
    } else {
        config
            .get("tool_config")
            .and_then(|t| t.get("tool_ids"))
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().and_then(|s| Uuid::parse_str(s).ok()))
                    .collect()
            })
            .unwrap_or_default()
    };

    // RAG: enabled by config unless overridden.
    let rag_config = config.get("rag_config");
    let use_rag = overrides.use_rag.unwrap_or_else(|| {
        rag_config
            .and_then(|r| r.get("is_enabled"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    });
    let rag_collection_id = rag_config
        .and_then(|r| r.get("collection_id"))
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok());

    Ok(ResolvedResources {
        memory_bucket_id,
        tool_ids,
        rag_collection_id,
        use_rag,
    })
}

/// Input-compatibility checks, run once the model's capability set is
/// known. Image inputs (URLs or image files) need `vision`; textual
/// inputs need `text`.
pub fn validate_inputs(
    capabilities: &[String],
    request: &InferenceRequest,
    file_metadata: &[FileMetadata],
) -> Result<()> {
    let caps = parse_all(capabilities);
    let has = |c: Capability| caps.contains(&c);

    if !request.prompt_text().is_empty() && !has(Capability::Text) {
        return Err(Error::invalid_argument(
            "the model does not accept text prompts",
        ));
    }

    for input in &request.inputs {
        match input {
            InputItem::ImageUrl { .. } => {
                if !has(Capability::Vision) {
                    return Err(Error::invalid_argument(
                        "image input supplied but the model lacks the vision capability",
                    ));
                }
            }
            InputItem::FileId { id } => {
                let meta = file_metadata
                    .iter()
                    .find(|m| m.id == *id)
                    .ok_or_else(|| Error::not_found(format!("file {id} not found")))?;
                if meta.mimetype.starts_with("image/") {
                    if !has(Capability::Vision) {
                        return Err(Error::invalid_argument(
                            "image file supplied but the model lacks the vision capability",
                        ));
                    }
                } else if !has(Capability::Text) {
                    return Err(Error::invalid_argument(
                        "file input supplied but the model lacks the text capability",
                    ));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use px_proto::job::ResourceOverrides;
    use serde_json::json;

    fn node(status: NodeStatus, configuration: serde_json::Value) -> NodeDetails {
        NodeDetails {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "n".into(),
            status,
            configuration,
        }
    }

    fn prompt_request() -> InferenceRequest {
        InferenceRequest {
            prompt: Some("hi".into()),
            ..Default::default()
        }
    }

    #[test]
    fn empty_request_rejected() {
        let n = node(NodeStatus::Active, json!({}));
        let err = validate_node_request(&n, &InferenceRequest::default()).unwrap_err();
        assert_eq!(err.kind, px_domain::ErrorKind::InvalidArgument);
    }

    #[test]
    fn inactive_and_draft_nodes_refused() {
        for status in [NodeStatus::Inactive, NodeStatus::Draft] {
            let n = node(status, json!({}));
            let err = validate_node_request(&n, &prompt_request()).unwrap_err();
            assert_eq!(err.kind, px_domain::ErrorKind::PermissionDenied);
        }
    }

    #[test]
    fn altered_node_proceeds() {
        let n = node(NodeStatus::Altered, json!({}));
        assert!(validate_node_request(&n, &prompt_request()).is_ok());
    }

    #[test]
    fn memory_enabled_without_bucket_rejected() {
        let n = node(
            NodeStatus::Active,
            json!({"memory_config": {"is_enabled": true, "bucket_id": null}}),
        );
        let err = validate_node_request(&n, &prompt_request()).unwrap_err();
        assert_eq!(err.kind, px_domain::ErrorKind::InvalidArgument);
        assert!(err.message.contains("bucket_id"));
    }

    #[test]
    fn memory_override_without_section_rejected() {
        let n = node(NodeStatus::Active, json!({}));
        let mut req = prompt_request();
        req.resource_overrides = ResourceOverrides {
            use_memory: Some(true),
            ..Default::default()
        };
        assert!(validate_node_request(&n, &req).is_err());
    }

    #[test]
    fn rag_override_without_section_rejected() {
        let n = node(NodeStatus::Active, json!({}));
        let mut req = prompt_request();
        req.resource_overrides = ResourceOverrides {
            use_rag: Some(true),
            ..Default::default()
        };
        assert!(validate_node_request(&n, &req).is_err());
    }

    #[test]
    fn resolved_resources_reflect_config() {
        let bucket = Uuid::new_v4();
        let tool = Uuid::new_v4();
        let n = node(
            NodeStatus::Active,
            json!({
                "memory_config": {"is_enabled": true, "bucket_id": bucket.to_string()},
                "tool_config": {"tool_ids": [tool.to_string()]},
            }),
        );
        let resolved = validate_node_request(&n, &prompt_request()).unwrap();
        assert_eq!(resolved.memory_bucket_id, Some(bucket));
        assert_eq!(resolved.tool_ids, vec![tool]);
        assert!(!resolved.use_rag);
    }

    #[test]
    fn tools_can_be_switched_off() {
        let tool = Uuid::new_v4();
        let n = node(
            NodeStatus::Active,
            json!({"tool_config": {"tool_ids": [tool.to_string()]}}),
        );
        let mut req = prompt_request();
        req.resource_overrides = ResourceOverrides {
            use_tools: Some(false),
            ..Default::default()
        };
        let resolved = validate_node_request(&n, &req).unwrap();
        assert!(resolved.tool_ids.is_empty());
    }

    #[test]
    fn image_input_needs_vision() {
        let req: InferenceRequest = serde_json::from_value(json!({
            "prompt": "what is this",
            "inputs": [{"type": "image_url", "url": "https://x.test/a.png"}]
        }))
        .unwrap();
        let err = validate_inputs(&["text".into()], &req, &[]).unwrap_err();
        assert_eq!(err.kind, px_domain::ErrorKind::InvalidArgument);
        assert!(validate_inputs(&["text".into(), "vision".into()], &req, &[]).is_ok());
    }

    #[test]
    fn image_file_needs_vision() {
        let id = Uuid::new_v4();
        let req: InferenceRequest = serde_json::from_value(json!({
            "inputs": [{"type": "file_id", "id": id.to_string()}]
        }))
        .unwrap();
        let meta = vec![FileMetadata {
            id,
            filename: "cat.png".into(),
            mimetype: "image/png".into(),
            size_bytes: 1,
        }];
        assert!(validate_inputs(&["text".into()], &req, &meta).is_err());
        assert!(validate_inputs(&["vision".into()], &req, &meta).is_ok());
    }

    #[test]
    fn unknown_file_in_inputs_is_not_found() {
        let req: InferenceRequest = serde_json::from_value(json!({
            "inputs": [{"type": "file_id", "id": Uuid::new_v4().to_string()}]
        }))
        .unwrap();
        let err = validate_inputs(&["text".into()], &req, &[]).unwrap_err();
        assert_eq!(err.kind, px_domain::ErrorKind::NotFound);
    }
}
