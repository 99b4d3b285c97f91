//! Tool builder: expose the job's tool definitions to the model and note
//! which ones require a `session_id` (the agent loop injects the job id
//! for those, keeping session continuity across calls within one job).

use px_domain::chat::ToolSpec;

use super::BuildContext;

pub fn build(ctx: &mut BuildContext) {
    let definitions = &ctx.job.payload.resources.tools;
    if definitions.is_empty() {
        return;
    }

    for def in definitions {
        let requires_session = def
            .parameters
            .get("required")
            .and_then(|r| r.as_array())
            .map(|a| a.iter().any(|v| v.as_str() == Some("session_id")))
            .unwrap_or(false);
        if requires_session {
            ctx.session_required.insert(def.name.clone());
        }

        ctx.tools.push(ToolSpec {
            name: def.name.clone(),
            description: def.description.clone(),
            parameters: def.parameters.clone(),
        });
    }

    tracing::info!(job_id = %ctx.job.id(), tools = ctx.tools.len(), "tools prepared");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Job;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn session_requirement_is_detected() {
        let payload = json!({
            "job_id": Uuid::new_v4().to_string(),
            "user_id": Uuid::new_v4().to_string(),
            "timestamp": "2025-06-01T12:00:00Z",
            "query": {"prompt": "hi"},
            "default_parameters": {},
            "resources": {
                "model_config": {"model_id": Uuid::new_v4().to_string(), "provider": "openai"},
                "tools": [
                    {
                        "id": Uuid::new_v4().to_string(),
                        "name": "terminal",
                        "description": "run a command",
                        "parameters": {
                            "type": "object",
                            "properties": {"command": {}, "session_id": {}},
                            "required": ["command", "session_id"]
                        }
                    },
                    {
                        "id": Uuid::new_v4().to_string(),
                        "name": "web_fetch",
                        "description": "fetch a page",
                        "parameters": {"type": "object", "properties": {"url": {}}, "required": ["url"]}
                    }
                ]
            },
        });
        let job = Job::parse(&serde_json::to_vec(&payload).unwrap()).unwrap();
        let mut ctx = BuildContext::new(job);
        build(&mut ctx);

        assert_eq!(ctx.tools.len(), 2);
        assert!(ctx.session_required.contains("terminal"));
        assert!(!ctx.session_required.contains("web_fetch"));
    }
}
