//! Resource collection fan-outs against the other services.

use px_domain::{Error, Principal, Result};
use px_proto::job::{
    InputItem, JobResources, MemoryContext, ModelConfiguration, RagContext, ToolDefinition,
};
use px_proto::rpc::{
    DataRequest, DataResponse, FileMetadata, MemoryRequest, MemoryResponse, ModelRequest,
    ModelResponse, NodeDetails, NodeRequest, NodeResponse, ToolRequest, ToolResponse,
};
use uuid::Uuid;

use crate::gauntlet::ResolvedResources;
use crate::state::AppState;

pub async fn fetch_node(state: &AppState, node_id: Uuid, principal: Principal) -> Result<NodeDetails> {
    let response: NodeResponse = px_rpc::call(
        &state.settings.nodes_rpc_addr,
        &NodeRequest::GetNodeDetails { node_id, principal },
    )
    .await?;
    match response {
        NodeResponse::NodeDetails(details) => Ok(details),
    }
}

pub async fn fetch_file_metadata(
    state: &AppState,
    inputs: &[InputItem],
    principal: Principal,
) -> Result<Vec<FileMetadata>> {
    let file_ids: Vec<Uuid> = inputs
        .iter()
        .filter_map(|i| match i {
            InputItem::FileId { id } => Some(*id),
            _ => None,
        })
        .collect();
    if file_ids.is_empty() {
        return Ok(Vec::new());
    }

    let response: DataResponse = px_rpc::call(
        &state.settings.data_rpc_addr,
        &DataRequest::GetFileMetadata {
            file_ids,
            principal,
        },
    )
    .await?;
    match response {
        DataResponse::Metadata(meta) => Ok(meta),
        _ => Err(Error::internal("unexpected data rpc response")),
    }
}

async fn fetch_model_config(
    state: &AppState,
    model_id: Uuid,
    principal: Principal,
) -> Result<ModelConfiguration> {
    let response: ModelResponse = px_rpc::call(
        &state.settings.models_rpc_addr,
        &ModelRequest::GetConfiguration {
            model_id,
            principal,
        },
    )
    .await?;
    match response {
        ModelResponse::Configuration(cfg) => Ok(cfg),
        _ => Err(Error::internal("unexpected model rpc response")),
    }
}

async fn fetch_tool_definitions(
    state: &AppState,
    tool_ids: &[Uuid],
    principal: Principal,
) -> Result<Vec<ToolDefinition>> {
    if tool_ids.is_empty() {
        return Ok(Vec::new());
    }
    let response: ToolResponse = px_rpc::call(
        &state.settings.tools_rpc_addr,
        &ToolRequest::GetDefinitions {
            tool_ids: tool_ids.to_vec(),
            principal,
        },
    )
    .await?;
    match response {
        ToolResponse::Definitions(defs) => Ok(defs),
        _ => Err(Error::internal("unexpected tool rpc response")),
    }
}

async fn fetch_memory_history(
    state: &AppState,
    bucket_id: Option<Uuid>,
    principal: Principal,
) -> Result<Option<MemoryContext>> {
    let Some(bucket_id) = bucket_id else {
        return Ok(None);
    };
    let response: MemoryResponse = px_rpc::call(
        &state.settings.memory_rpc_addr,
        &MemoryRequest::GetHistory {
            bucket_id,
            principal,
        },
    )
    .await?;
    match response {
        MemoryResponse::History { bucket_id, history } => Ok(Some(MemoryContext {
            bucket_id,
            history,
        })),
    }
}

/// Gather everything the job needs, in parallel. Any failure aborts the
/// whole request with its own error kind.
pub async fn collect(
    state: &AppState,
    model_id: Uuid,
    resolved: &ResolvedResources,
    principal: Principal,
) -> Result<JobResources> {
    let (model_config, tools, memory_context) = tokio::try_join!(
        fetch_model_config(state, model_id, principal),
        fetch_tool_definitions(state, &resolved.tool_ids, principal),
        fetch_memory_history(state, resolved.memory_bucket_id, principal),
    )?;

    let rag_context = if resolved.use_rag {
        Some(RagContext {
            collection_id: resolved.rag_collection_id,
            documents: Vec::new(),
        })
    } else {
        None
    };

    Ok(JobResources {
        model_config,
        tools,
        rag_context,
        memory_context,
    })
}
