//! Provider resolution from a model-registry configuration.
//!
//! The registry serves configurations in JSON-Schema shape; runtime
//! values sit in the `default` slot of each property:
//!
//! ```json
//! {
//!   "credentials": {"properties": {"api_key": {"default": "sk-..."}}},
//!   "parameters":  {"properties": {"model_name": {"default": "gpt-4o"}}}
//! }
//! ```

use std::sync::Arc;

use px_domain::{Error, Result};
use px_proto::job::ModelConfiguration;
use serde_json::Value;

use crate::{AnthropicProvider, GoogleProvider, LlmProvider, OpenAiCompatProvider};

/// Closed set of supported providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Ollama,
    Google,
    Anthropic,
}

impl Provider {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "openai" => Some(Provider::OpenAi),
            "ollama" => Some(Provider::Ollama),
            "google" => Some(Provider::Google),
            "anthropic" => Some(Provider::Anthropic),
            _ => None,
        }
    }
}

/// Read `properties.<key>.default` out of a schema block.
pub fn schema_default<'a>(block: &'a Value, key: &str) -> Option<&'a Value> {
    block.get("properties")?.get(key)?.get("default")
}

fn schema_str(block: &Value, key: &str) -> Option<String> {
    schema_default(block, key)
        .and_then(|v| v.as_str())
        .map(String::from)
}

/// Instantiate the adapter described by a registry configuration.
pub fn build_provider(cfg: &ModelConfiguration) -> Result<Arc<dyn LlmProvider>> {
    let provider = Provider::parse(&cfg.provider).ok_or_else(|| {
        Error::invalid_argument(format!("unsupported model provider '{}'", cfg.provider))
    })?;

    let credentials = cfg
        .configuration
        .get("credentials")
        .cloned()
        .unwrap_or(Value::Null);
    let parameters = cfg
        .configuration
        .get("parameters")
        .cloned()
        .unwrap_or(Value::Null);

    let model_name = schema_str(&parameters, "model_name");

    match provider {
        Provider::OpenAi => {
            let api_key = schema_str(&credentials, "api_key").ok_or_else(|| {
                Error::invalid_argument(
                    "model configuration is missing credentials.properties.api_key.default",
                )
            })?;
            let base_url = schema_str(&credentials, "base_url")
                .unwrap_or_else(|| "https://api.openai.com/v1".into());
            Ok(Arc::new(OpenAiCompatProvider::new(
                "openai", base_url, Some(api_key), model_name,
            )))
        }
        Provider::Ollama => {
            let base_url = schema_str(&credentials, "base_url").ok_or_else(|| {
                Error::invalid_argument(
                    "model configuration is missing credentials.properties.base_url.default",
                )
            })?;
            // Ollama speaks the OpenAI chat contract on /v1 and needs no key.
            let base_url = format!("{}/v1", base_url.trim_end_matches('/'));
            Ok(Arc::new(OpenAiCompatProvider::new(
                "ollama", base_url, None, model_name,
            )))
        }
        Provider::Google => {
            let api_key = schema_str(&credentials, "api_key").ok_or_else(|| {
                Error::invalid_argument(
                    "model configuration is missing credentials.properties.api_key.default",
                )
            })?;
            Ok(Arc::new(GoogleProvider::new(api_key, model_name)))
        }
        Provider::Anthropic => {
            let api_key = schema_str(&credentials, "api_key").ok_or_else(|| {
                Error::invalid_argument(
                    "model configuration is missing credentials.properties.api_key.default",
                )
            })?;
            Ok(Arc::new(AnthropicProvider::new(api_key, model_name)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn config(provider: &str, configuration: Value) -> ModelConfiguration {
        ModelConfiguration {
            model_id: Uuid::new_v4(),
            provider: provider.into(),
            configuration,
            capabilities: vec!["text".into()],
        }
    }

    #[test]
    fn schema_default_walks_properties() {
        let block = serde_json::json!({
            "properties": {"api_key": {"type": "string", "default": "sk-test"}}
        });
        assert_eq!(
            schema_default(&block, "api_key").and_then(|v| v.as_str()),
            Some("sk-test")
        );
        assert!(schema_default(&block, "missing").is_none());
        assert!(schema_default(&Value::Null, "api_key").is_none());
    }

    #[test]
    fn provider_parse_is_closed() {
        assert_eq!(Provider::parse("openai"), Some(Provider::OpenAi));
        assert_eq!(Provider::parse("ollama"), Some(Provider::Ollama));
        assert_eq!(Provider::parse("google"), Some(Provider::Google));
        assert_eq!(Provider::parse("anthropic"), Some(Provider::Anthropic));
        assert_eq!(Provider::parse("huggingface_diffusers"), None);
    }

    #[test]
    fn openai_builds_with_key() {
        let cfg = config(
            "openai",
            serde_json::json!({
                "credentials": {"properties": {"api_key": {"default": "sk-x"}}},
                "parameters": {"properties": {"model_name": {"default": "gpt-4o-mini"}}}
            }),
        );
        let provider = build_provider(&cfg).unwrap();
        assert_eq!(provider.provider_id(), "openai");
    }

    #[test]
    fn ollama_requires_base_url() {
        let cfg = config("ollama", serde_json::json!({"credentials": {}}));
        let err = build_provider(&cfg).unwrap_err();
        assert_eq!(err.kind, px_domain::ErrorKind::InvalidArgument);
    }

    #[test]
    fn unknown_provider_rejected() {
        let cfg = config("parrot", Value::Null);
        let err = build_provider(&cfg).unwrap_err();
        assert_eq!(err.kind, px_domain::ErrorKind::InvalidArgument);
    }
}
