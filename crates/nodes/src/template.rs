//! Capability-driven configuration templates.
//!
//! A node's configuration is always a subset of the template generated
//! from its model's capabilities. The same template rules serve
//! configure-model, the generic update gauntlet, and the healer's
//! capability-update migration.

use px_domain::capability::{parse_all, Capability};
use px_domain::{Error, Result};
use serde_json::{json, Value};
use uuid::Uuid;

/// Generate the empty, valid template for a model's capability set.
pub fn generate(model_id: Uuid, capabilities: &[String]) -> Value {
    let caps = parse_all(capabilities);
    let mut template = json!({
        "model_config": {"model_id": model_id.to_string()}
    });

    if caps.contains(&Capability::Text) {
        template["memory_config"] = json!({"is_enabled": false, "bucket_id": null});
        template["rag_config"] = json!({"is_enabled": false, "collection_id": null});
    }
    if caps.contains(&Capability::ToolUse) {
        template["tool_config"] = json!({"tool_ids": []});
    }
    template
}

/// Best-effort migration of user settings onto a fresh template.
///
/// Parameters always carry over; section configs carry over only when
/// the new template still has the section.
pub fn merge_forward(template: &Value, old_config: &Value) -> Value {
    let mut merged = template.clone();

    if let Some(params) = old_config
        .get("model_config")
        .and_then(|m| m.get("parameters"))
    {
        merged["model_config"]["parameters"] = params.clone();
    }

    for section in ["memory_config", "rag_config", "tool_config"] {
        if merged.get(section).is_some() {
            if let Some(old) = old_config.get(section) {
                merged[section] = old.clone();
            }
        }
    }
    merged
}

/// Apply a generic (values-only) update against the trusted config.
///
/// Rejects a model change and any top-level key the trusted template
/// does not carry; merges parameters and section values.
pub fn apply_update(trusted: &Value, submitted: &Value) -> Result<Value> {
    let trusted_model_id = trusted
        .get("model_config")
        .and_then(|m| m.get("model_id"))
        .and_then(|v| v.as_str());

    if let Some(submitted_model_id) = submitted
        .get("model_config")
        .and_then(|m| m.get("model_id"))
        .and_then(|v| v.as_str())
    {
        if Some(submitted_model_id) != trusted_model_id {
            return Err(Error::invalid_argument(
                "changing the model is not allowed here; use configure-model",
            ));
        }
    }

    if let Some(obj) = submitted.as_object() {
        for key in obj.keys() {
            if trusted.get(key).is_none() {
                return Err(Error::invalid_argument(format!(
                    "configuration key '{key}' is not supported by the current model"
                )));
            }
        }
    } else {
        return Err(Error::invalid_argument("configuration must be a JSON object"));
    }

    let mut merged = trusted.clone();
    if let Some(params) = submitted
        .get("model_config")
        .and_then(|m| m.get("parameters"))
    {
        merged["model_config"]["parameters"] = params.clone();
    }
    for section in ["memory_config", "rag_config", "tool_config"] {
        if merged.get(section).is_some() {
            if let Some(new) = submitted.get(section) {
                merged[section] = new.clone();
            }
        }
    }
    Ok(merged)
}

/// The model id pinned in a configuration, if any.
pub fn model_id(config: &Value) -> Option<Uuid> {
    config
        .get("model_config")
        .and_then(|m| m.get("model_id"))
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
}

/// The configured tool ids, if the config has a tool section.
pub fn tool_ids(config: &Value) -> Vec<Uuid> {
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
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn text_capability_adds_memory_and_rag() {
        let t = generate(Uuid::nil(), &caps(&["text"]));
        assert_eq!(t["memory_config"]["is_enabled"], false);
        assert_eq!(t["rag_config"]["collection_id"], Value::Null);
        assert!(t.get("tool_config").is_none());
    }

    #[test]
    fn tool_use_adds_tool_config() {
        let t = generate(Uuid::nil(), &caps(&["text", "tool_use"]));
        assert_eq!(t["tool_config"]["tool_ids"], json!([]));
    }

    #[test]
    fn vision_only_template_is_minimal() {
        let t = generate(Uuid::nil(), &caps(&["vision"]));
        assert!(t.get("memory_config").is_none());
        assert!(t.get("tool_config").is_none());
        assert!(t["model_config"]["model_id"].is_string());
    }

    #[test]
    fn merge_forward_keeps_parameters_and_sections() {
        let old = json!({
            "model_config": {"model_id": "x", "parameters": {"temperature": 0.2}},
            "memory_config": {"is_enabled": true, "bucket_id": "b1"},
            "tool_config": {"tool_ids": ["t1"]},
        });
        let template = generate(Uuid::nil(), &caps(&["text", "tool_use"]));
        let merged = merge_forward(&template, &old);
        assert_eq!(merged["model_config"]["parameters"]["temperature"], 0.2);
        assert_eq!(merged["memory_config"]["bucket_id"], "b1");
        assert_eq!(merged["tool_config"]["tool_ids"][0], "t1");
    }

    #[test]
    fn merge_forward_drops_sections_the_new_model_lacks() {
        let old = json!({
            "model_config": {"model_id": "x"},
            "tool_config": {"tool_ids": ["t1"]},
        });
        // New model lost tool_use.
        let template = generate(Uuid::nil(), &caps(&["text"]));
        let merged = merge_forward(&template, &old);
        assert!(merged.get("tool_config").is_none());
        assert!(merged.get("memory_config").is_some());
    }

    #[test]
    fn update_rejects_model_change() {
        let trusted = generate(Uuid::nil(), &caps(&["text"]));
        let submitted = json!({
            "model_config": {"model_id": Uuid::new_v4().to_string()}
        });
        let err = apply_update(&trusted, &submitted).unwrap_err();
        assert_eq!(err.kind, px_domain::ErrorKind::InvalidArgument);
    }

    #[test]
    fn update_rejects_unknown_keys() {
        let trusted = generate(Uuid::nil(), &caps(&["text"]));
        let submitted = json!({"tool_config": {"tool_ids": []}});
        let err = apply_update(&trusted, &submitted).unwrap_err();
        assert!(err.message.contains("tool_config"));
    }

    #[test]
    fn update_merges_values_onto_trusted() {
        let trusted = generate(Uuid::nil(), &caps(&["text", "tool_use"]));
        let submitted = json!({
            "model_config": {"model_id": Uuid::nil().to_string(), "parameters": {"top_p": 0.9}},
            "memory_config": {"is_enabled": true, "bucket_id": "b7"},
        });
        let merged = apply_update(&trusted, &submitted).unwrap();
        assert_eq!(merged["model_config"]["parameters"]["top_p"], 0.9);
        assert_eq!(merged["memory_config"]["is_enabled"], true);
        // Untouched sections keep template values.
        assert_eq!(merged["tool_config"]["tool_ids"], json!([]));
    }

    #[test]
    fn accessors_read_ids() {
        let id = Uuid::new_v4();
        let t1 = Uuid::new_v4();
        let config = json!({
            "model_config": {"model_id": id.to_string()},
            "tool_config": {"tool_ids": [t1.to_string(), "not-a-uuid"]},
        });
        assert_eq!(model_id(&config), Some(id));
        assert_eq!(tool_ids(&config), vec![t1]);
    }
}
