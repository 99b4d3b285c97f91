//! Model RPC servicer: serves decrypted configurations (credential
//! defaults included) and capability lists to the orchestrator, the node
//! service, and the executor.

use async_trait::async_trait;
use px_domain::{Error, Principal, Result};
use px_proto::job::ModelConfiguration;
use px_proto::rpc::{ModelRequest, ModelResponse};
use uuid::Uuid;

use crate::store::ModelStore;

pub struct ModelServicer {
    models: ModelStore,
}

impl ModelServicer {
    pub fn new(models: ModelStore) -> Self {
        Self { models }
    }

    async fn visible(&self, model_id: Uuid, principal: Principal) -> Result<crate::store::AiModel> {
        let model = self
            .models
            .find(model_id)
            .await?
            .ok_or_else(|| Error::not_found("model not found"))?;
        if !model.visible_to(principal) {
            return Err(Error::not_found("model not found"));
        }
        Ok(model)
    }
}

#[async_trait]
impl px_rpc::Servicer for ModelServicer {
    type Request = ModelRequest;
    type Response = ModelResponse;

    async fn handle(&self, request: ModelRequest) -> Result<ModelResponse> {
        match request {
            ModelRequest::GetConfiguration {
                model_id,
                principal,
            } => {
                let model = self.visible(model_id, principal).await?;
                Ok(ModelResponse::Configuration(ModelConfiguration {
                    model_id: model.id,
                    provider: model.provider,
                    configuration: model.configuration,
                    capabilities: model.capabilities,
                }))
            }
            ModelRequest::GetCapabilities {
                model_id,
                principal,
            } => {
                let model = self.visible(model_id, principal).await?;
                Ok(ModelResponse::Capabilities(model.capabilities))
            }
        }
    }
}
