//! Tool RPC servicer: definitions for job assembly and parallel
//! execution for the executor's agent loop.

use async_trait::async_trait;
use px_domain::{Error, Result};
use px_proto::job::ToolDefinition;
use px_proto::rpc::{ToolRequest, ToolResponse};

use crate::exec::ToolExecutor;
use crate::store::ToolStore;

pub struct ToolServicer {
    tools: ToolStore,
    executor: ToolExecutor,
}

impl ToolServicer {
    pub fn new(tools: ToolStore) -> Self {
        let executor = ToolExecutor::new(tools.clone());
        Self { tools, executor }
    }
}

#[async_trait]
impl px_rpc::Servicer for ToolServicer {
    type Request = ToolRequest;
    type Response = ToolResponse;

    async fn handle(&self, request: ToolRequest) -> Result<ToolResponse> {
        match request {
            ToolRequest::GetDefinitions {
                tool_ids,
                principal,
            } => {
                let found = self.tools.find_many(&tool_ids).await?;
                let mut definitions = Vec::with_capacity(tool_ids.len());
                for id in &tool_ids {
                    let tool = found
                        .iter()
                        .find(|t| t.id == *id)
                        .ok_or_else(|| Error::not_found(format!("tool {id} not found")))?;
                    if !tool.visible_to(principal) {
                        return Err(Error::permission_denied(format!(
                            "tool {id} is not accessible"
                        )));
                    }
                    definitions.push(ToolDefinition {
                        id: tool.id,
                        name: tool.name.clone(),
                        description: tool.description().to_string(),
                        parameters: tool.parameters(),
                    });
                }
                Ok(ToolResponse::Definitions(definitions))
            }
            ToolRequest::ExecuteMany { calls } => {
                Ok(ToolResponse::Executed(self.executor.execute_many(calls).await))
            }
        }
    }
}
