//! Internal HTTP validation clients. Each forwards the caller's bearer
//! token so the remote service authorizes the original principal.

use std::sync::Arc;

use px_domain::config::Settings;
use px_domain::{Error, Result};
use uuid::Uuid;

#[derive(Clone)]
pub struct ValidationClient {
    settings: Arc<Settings>,
    http: reqwest::Client,
}

impl ValidationClient {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self {
            settings,
            http: reqwest::Client::new(),
        }
    }

    pub async fn authorize_project(&self, token: &str, project_id: Uuid) -> Result<()> {
        let url = format!(
            "{}/internal/projects/{project_id}/authorize",
            self.settings.projects_http_url
        );
        let resp = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::unavailable(format!("project service: {e}")))?;
        expect_no_content(resp, "project").await
    }

    pub async fn validate_model(&self, token: &str, model_id: Uuid) -> Result<()> {
        let url = format!("{}/internal/models/validate", self.settings.models_http_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&serde_json::json!({ "model_id": model_id }))
            .send()
            .await
            .map_err(|e| Error::unavailable(format!("model service: {e}")))?;
        expect_no_content(resp, "model").await
    }

    pub async fn validate_tools(&self, token: &str, tool_ids: &[Uuid]) -> Result<()> {
        if tool_ids.is_empty() {
            return Ok(());
        }
        let url = format!("{}/internal/tools/validate", self.settings.tools_http_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&serde_json::json!({ "tool_ids": tool_ids }))
            .send()
            .await
            .map_err(|e| Error::unavailable(format!("tool service: {e}")))?;
        expect_no_content(resp, "tool").await
    }

    pub async fn validate_buckets(&self, token: &str, bucket_ids: &[Uuid]) -> Result<()> {
        if bucket_ids.is_empty() {
            return Ok(());
        }
        let url = format!("{}/internal/buckets/validate", self.settings.memory_http_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&serde_json::json!({ "bucket_ids": bucket_ids }))
            .send()
            .await
            .map_err(|e| Error::unavailable(format!("memory service: {e}")))?;
        expect_no_content(resp, "memory bucket").await
    }
}

async fn expect_no_content(resp: reqwest::Response, what: &str) -> Result<()> {
    match resp.status().as_u16() {
        204 => Ok(()),
        404 => Err(Error::not_found(format!("{what} not found"))),
        403 => Err(Error::permission_denied(format!("{what} is not accessible"))),
        400 => Err(Error::invalid_argument(format!("{what} validation rejected"))),
        s => Err(Error::unavailable(format!(
            "{what} validation returned HTTP {s}"
        ))),
    }
}
