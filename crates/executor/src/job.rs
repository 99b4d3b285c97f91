//! Strict job extraction: a defensive, typed view over the raw payload.

use px_domain::{Error, Result};
use px_proto::job::{InputItem, JobPayload};
use uuid::Uuid;

/// A validated job. Wraps the wire payload with the accessors the
/// pipeline needs; construction fails on anything malformed.
#[derive(Debug, Clone)]
pub struct Job {
    pub payload: JobPayload,
}

impl Job {
    pub fn parse(body: &[u8]) -> Result<Self> {
        let payload: JobPayload = serde_json::from_slice(body)
            .map_err(|e| Error::invalid_argument(format!("invalid job payload: {e}")))?;
        if payload.job_id.is_nil() {
            return Err(Error::invalid_argument("job payload has a nil job_id"));
        }
        if payload.user_id.is_nil() {
            return Err(Error::invalid_argument("job payload has a nil user_id"));
        }
        if payload.query.prompt_text().is_empty() && payload.query.inputs.is_empty() {
            return Err(Error::invalid_argument(
                "job payload carries neither prompt nor inputs",
            ));
        }
        Ok(Self { payload })
    }

    pub fn id(&self) -> Uuid {
        self.payload.job_id
    }

    pub fn user_id(&self) -> Uuid {
        self.payload.user_id
    }

    pub fn is_streaming(&self) -> bool {
        self.payload.query.is_streaming()
    }

    pub fn persist_inputs_in_memory(&self) -> bool {
        self.payload.query.output_config.persist_inputs_in_memory
    }

    pub fn prompt_text(&self) -> &str {
        self.payload.query.prompt_text()
    }

    pub fn inputs(&self) -> &[InputItem] {
        &self.payload.query.inputs
    }

    pub fn memory_bucket_id(&self) -> Option<Uuid> {
        self.payload
            .resources
            .memory_context
            .as_ref()
            .map(|m| m.bucket_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_payload() -> serde_json::Value {
        json!({
            "job_id": Uuid::new_v4().to_string(),
            "user_id": Uuid::new_v4().to_string(),
            "timestamp": "2025-06-01T12:00:00Z",
            "query": {"prompt": "hi"},
            "default_parameters": {},
            "resources": {"model_config": {
                "model_id": Uuid::new_v4().to_string(),
                "provider": "openai",
            }},
        })
    }

    #[test]
    fn minimal_job_parses() {
        let body = serde_json::to_vec(&minimal_payload()).unwrap();
        let job = Job::parse(&body).unwrap();
        assert_eq!(job.prompt_text(), "hi");
        assert!(!job.is_streaming());
        assert!(job.memory_bucket_id().is_none());
    }

    #[test]
    fn garbage_is_rejected() {
        let err = Job::parse(b"not even json").unwrap_err();
        assert_eq!(err.kind, px_domain::ErrorKind::InvalidArgument);
    }

    #[test]
    fn empty_query_is_rejected() {
        let mut payload = minimal_payload();
        payload["query"] = json!({});
        let body = serde_json::to_vec(&payload).unwrap();
        assert!(Job::parse(&body).is_err());
    }

    #[test]
    fn memory_bucket_surfaces_from_resources() {
        let bucket = Uuid::new_v4();
        let mut payload = minimal_payload();
        payload["resources"]["memory_context"] =
            json!({"bucket_id": bucket.to_string(), "history": []});
        let body = serde_json::to_vec(&payload).unwrap();
        let job = Job::parse(&body).unwrap();
        assert_eq!(job.memory_bucket_id(), Some(bucket));
    }
}
