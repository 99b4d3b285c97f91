//! Node business logic: the two-stage lifecycle and the update gauntlet.

use px_domain::{Error, Principal, Result};
use px_proto::rpc::{ModelRequest, ModelResponse, NodeStatus};
use serde_json::Value;
use uuid::Uuid;

use crate::clients::ValidationClient;
use crate::store::{Node, NodeStore};
use crate::template;

pub struct NodeService {
    pub store: NodeStore,
    pub validation: ValidationClient,
    pub models_rpc_addr: String,
}

impl NodeService {
    /// Stage 1: create a named, unconfigured node after proving project
    /// ownership.
    pub async fn create_draft(
        &self,
        token: &str,
        principal: Principal,
        project_id: Uuid,
        name: &str,
    ) -> Result<Node> {
        self.validation.authorize_project(token, project_id).await?;
        self.store.create_draft(project_id, principal.id, name).await
    }

    /// Stage 2: bind (or re-bind) a model. Fetches the new model's
    /// capabilities, regenerates the template, migrates the old values
    /// forward, and heals the node to ACTIVE.
    ///
    /// Deliberately forward-looking: the old model may already be gone.
    pub async fn configure_model(
        &self,
        principal: Principal,
        node: &Node,
        model_id: Uuid,
    ) -> Result<Node> {
        let response: ModelResponse = px_rpc::call(
            &self.models_rpc_addr,
            &ModelRequest::GetCapabilities {
                model_id,
                principal,
            },
        )
        .await?;
        let capabilities = match response {
            ModelResponse::Capabilities(caps) => caps,
            _ => return Err(Error::internal("unexpected model rpc response")),
        };

        let new_template = template::generate(model_id, &capabilities);
        let final_config = template::merge_forward(&new_template, &node.configuration);

        self.store
            .save(node.id, &node.name, &final_config, NodeStatus::Active)
            .await
    }

    /// Generic update: values only, model pinned, keys bounded by the
    /// trusted template, then the cross-service validation fan-out.
    pub async fn update(
        &self,
        token: &str,
        node: &Node,
        name: &str,
        configuration: &Value,
    ) -> Result<Node> {
        let final_config = template::apply_update(&node.configuration, configuration)?;

        self.validate_resources(token, node.project_id, &final_config)
            .await?;

        self.store
            .save(node.id, name, &final_config, NodeStatus::Active)
            .await
    }

    /// Concurrent validation of everything the merged configuration
    /// references. The first failure aborts the update.
    async fn validate_resources(
        &self,
        token: &str,
        project_id: Uuid,
        configuration: &Value,
    ) -> Result<()> {
        let model_id = template::model_id(configuration)
            .ok_or_else(|| Error::invalid_argument("configuration is missing a model_id"))?;
        let tool_ids = template::tool_ids(configuration);

        let bucket_ids: Vec<Uuid> = configuration
            .get("memory_config")
            .filter(|m| m.get("is_enabled").and_then(|v| v.as_bool()) == Some(true))
            .and_then(|m| m.get("bucket_id"))
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .into_iter()
            .collect();

        tokio::try_join!(
            self.validation.authorize_project(token, project_id),
            self.validation.validate_model(token, model_id),
            self.validation.validate_tools(token, &tool_ids),
            self.validation.validate_buckets(token, &bucket_ids),
        )?;
        Ok(())
    }
}
