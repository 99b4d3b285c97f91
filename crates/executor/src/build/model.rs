//! Model builder: resolve the provider adapter and the effective
//! sampling parameters (node defaults overlaid by the request's
//! overrides — the user wins).

use px_domain::Result;
use px_providers::build_provider;
use serde_json::Value;

use super::BuildContext;

pub fn build(ctx: &mut BuildContext) -> Result<()> {
    let payload = &ctx.job.payload;

    // defaults ⊕ overrides, user wins.
    let mut merged = payload.default_parameters.clone();
    for (k, v) in &payload.query.parameter_overrides {
        merged.insert(k.clone(), v.clone());
    }

    ctx.temperature = merged
        .get("temperature")
        .and_then(Value::as_f64)
        .map(|t| t as f32);
    ctx.max_tokens = merged
        .get("max_tokens")
        .and_then(Value::as_u64)
        .map(|m| m as u32);
    ctx.model_override = merged
        .get("model_name")
        .and_then(Value::as_str)
        .map(String::from);

    let provider = build_provider(&payload.resources.model_config)?;
    tracing::info!(
        job_id = %ctx.job.id(),
        provider = provider.provider_id(),
        "model adapter ready"
    );
    ctx.provider = Some(provider);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Job;
    use serde_json::json;
    use uuid::Uuid;

    fn job_with_params(defaults: Value, overrides: Value) -> Job {
        let payload = json!({
            "job_id": Uuid::new_v4().to_string(),
            "user_id": Uuid::new_v4().to_string(),
            "timestamp": "2025-06-01T12:00:00Z",
            "query": {"prompt": "hi", "parameter_overrides": overrides},
            "default_parameters": defaults,
            "resources": {"model_config": {
                "model_id": Uuid::new_v4().to_string(),
                "provider": "openai",
                "configuration": {
                    "credentials": {"properties": {"api_key": {"default": "sk-test"}}},
                    "parameters": {"properties": {"model_name": {"default": "gpt-4o"}}}
                },
            }},
        });
        Job::parse(&serde_json::to_vec(&payload).unwrap()).unwrap()
    }

    #[test]
    fn overrides_beat_defaults() {
        let job = job_with_params(
            json!({"temperature": 0.1, "max_tokens": 100}),
            json!({"temperature": 0.9, "model_name": "gpt-4o-mini"}),
        );
        let mut ctx = BuildContext::new(job);
        build(&mut ctx).unwrap();
        assert_eq!(ctx.temperature, Some(0.9));
        assert_eq!(ctx.max_tokens, Some(100));
        assert_eq!(ctx.model_override.as_deref(), Some("gpt-4o-mini"));
        assert!(ctx.provider.is_some());
    }

    #[test]
    fn missing_parameters_stay_unset() {
        let job = job_with_params(json!({}), json!({}));
        let mut ctx = BuildContext::new(job);
        build(&mut ctx).unwrap();
        assert_eq!(ctx.temperature, None);
        assert_eq!(ctx.max_tokens, None);
        assert_eq!(ctx.model_override, None);
    }
}
