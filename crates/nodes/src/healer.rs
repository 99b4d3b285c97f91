//! Node dependency healer.
//!
//! Reacts to upstream resource changes so nodes never reference dead
//! resources silently:
//!
//! | event                        | action                                        |
//! |------------------------------|-----------------------------------------------|
//! | `model.deleted`              | pinned nodes → INACTIVE                       |
//! | `tool.deleted`               | drop the id from tool lists, nodes → ALTERED  |
//! | `model.capabilities.updated` | regenerate template, merge forward, → ACTIVE  |
//!
//! Every event is handled in one transaction with the affected rows
//! locked `FOR UPDATE`.

use px_bus::{consume_queue, BusClient, Delivery, FailurePolicy, QueueSpec};
use px_domain::{Error, Result};
use px_proto::events;
use px_proto::rpc::NodeStatus;
use uuid::Uuid;

use crate::store::NodeStore;
use crate::template;

const QUEUE: &str = "node_dependency_update_queue";

pub async fn run(bus: BusClient, nodes: NodeStore) -> Result<()> {
    let spec = QueueSpec::new(
        events::RESOURCE_EVENTS,
        QUEUE,
        vec![
            events::MODEL_DELETED.into(),
            events::TOOL_DELETED.into(),
            events::MODEL_CAPABILITIES_UPDATED.into(),
        ],
    );

    consume_queue(&bus, spec, FailurePolicy::RequeueOnError, move |delivery| {
        let nodes = nodes.clone();
        async move { handle(nodes, delivery).await }
    })
    .await
}

async fn handle(nodes: NodeStore, delivery: Delivery) -> Result<()> {
    match delivery.routing_key.as_str() {
        events::MODEL_DELETED => {
            let msg: events::ModelDeleted = match delivery.json() {
                Ok(m) => m,
                Err(_) => return discard(&delivery),
            };
            handle_model_deleted(&nodes, msg.model_id).await
        }
        events::TOOL_DELETED => {
            let msg: events::ToolDeleted = match delivery.json() {
                Ok(m) => m,
                Err(_) => return discard(&delivery),
            };
            handle_tool_deleted(&nodes, msg.tool_id).await
        }
        events::MODEL_CAPABILITIES_UPDATED => {
            let msg: events::ModelCapabilitiesUpdated = match delivery.json() {
                Ok(m) => m,
                Err(_) => return discard(&delivery),
            };
            handle_capabilities_updated(&nodes, msg.model_id, &msg.new_capabilities).await
        }
        other => {
            tracing::warn!(routing_key = %other, "unexpected event on healer queue");
            Ok(())
        }
    }
}

fn discard(delivery: &Delivery) -> Result<()> {
    tracing::warn!(routing_key = %delivery.routing_key, "malformed resource event, discarding");
    Ok(())
}

/// A node's model is its critical dependency: gone model, dead node.
async fn handle_model_deleted(nodes: &NodeStore, model_id: Uuid) -> Result<()> {
    let mut tx = begin(nodes).await?;
    let affected = NodeStore::lock_nodes_for_model(&mut tx, model_id).await?;
    for node in &affected {
        NodeStore::save_in_tx(&mut tx, node.id, &node.configuration, NodeStatus::Inactive)
            .await?;
    }
    commit(tx).await?;
    tracing::info!(%model_id, count = affected.len(), "nodes inactivated for deleted model");
    Ok(())
}

/// Tools are non-critical: drop the reference and mark the node ALTERED
/// so the owner can see something changed.
async fn handle_tool_deleted(nodes: &NodeStore, tool_id: Uuid) -> Result<()> {
    let mut tx = begin(nodes).await?;
    let affected = NodeStore::lock_nodes_with_tool(&mut tx, tool_id).await?;
    let tool_str = tool_id.to_string();
    for node in &affected {
        let mut config = node.configuration.clone();
        if let Some(ids) = config
            .get_mut("tool_config")
            .and_then(|t| t.get_mut("tool_ids"))
            .and_then(|v| v.as_array_mut())
        {
            ids.retain(|v| v.as_str() != Some(tool_str.as_str()));
        }
        NodeStore::save_in_tx(&mut tx, node.id, &config, NodeStatus::Altered).await?;
    }
    commit(tx).await?;
    tracing::info!(%tool_id, count = affected.len(), "nodes altered for deleted tool");
    Ok(())
}

/// Capability changes re-template every pinned node and heal it back to
/// ACTIVE, carrying user values forward where the new template allows.
async fn handle_capabilities_updated(
    nodes: &NodeStore,
    model_id: Uuid,
    new_capabilities: &[String],
) -> Result<()> {
    let mut tx = begin(nodes).await?;
    let affected = NodeStore::lock_nodes_for_model(&mut tx, model_id).await?;
    if affected.is_empty() {
        commit(tx).await?;
        tracing::info!(%model_id, "capability update touches no nodes");
        return Ok(());
    }

    let new_template = template::generate(model_id, new_capabilities);
    for node in &affected {
        let final_config = template::merge_forward(&new_template, &node.configuration);
        NodeStore::save_in_tx(&mut tx, node.id, &final_config, NodeStatus::Active).await?;
    }
    commit(tx).await?;
    tracing::info!(%model_id, count = affected.len(), "nodes migrated for capability change");
    Ok(())
}

async fn begin(nodes: &NodeStore) -> Result<sqlx::Transaction<'_, sqlx::Postgres>> {
    nodes
        .pool()
        .begin()
        .await
        .map_err(|e| Error::unavailable(format!("begin tx: {e}")))
}

async fn commit(tx: sqlx::Transaction<'_, sqlx::Postgres>) -> Result<()> {
    tx.commit()
        .await
        .map_err(|e| Error::unavailable(format!("commit: {e}")))
}
