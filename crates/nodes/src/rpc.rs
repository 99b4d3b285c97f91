//! Node RPC servicer: node details for the inference orchestrator.

use async_trait::async_trait;
use px_domain::{Error, Result};
use px_proto::rpc::{NodeDetails, NodeRequest, NodeResponse};

use crate::store::NodeStore;

pub struct NodeServicer {
    nodes: NodeStore,
}

impl NodeServicer {
    pub fn new(nodes: NodeStore) -> Self {
        Self { nodes }
    }
}

#[async_trait]
impl px_rpc::Servicer for NodeServicer {
    type Request = NodeRequest;
    type Response = NodeResponse;

    async fn handle(&self, request: NodeRequest) -> Result<NodeResponse> {
        match request {
            NodeRequest::GetNodeDetails {
                node_id,
                principal,
            } => {
                let node = self
                    .nodes
                    .find(node_id)
                    .await?
                    .ok_or_else(|| Error::not_found("node not found"))?;
                if node.owner_id != principal.id && !principal.is_staff {
                    return Err(Error::not_found("node not found"));
                }
                Ok(NodeResponse::NodeDetails(NodeDetails {
                    id: node.id,
                    project_id: node.project_id,
                    owner_id: node.owner_id,
                    name: node.name,
                    status: node.status,
                    configuration: node.configuration,
                }))
            }
        }
    }
}
