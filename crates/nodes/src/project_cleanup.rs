//! Project-cleanup worker: deletes the project's nodes on
//! `project.deletion.initiated`, then confirms with
//! `resource.for_project.deleted.NodeService`.

use px_bus::{consume_queue, BusClient, Delivery, ExchangeKind, FailurePolicy, Publisher, QueueSpec};
use px_domain::Result;
use px_proto::events;

use crate::store::NodeStore;

const QUEUE: &str = "node_project_cleanup_queue";
const SERVICE_NAME: &str = "NodeService";

pub async fn run(bus: BusClient, nodes: NodeStore) -> Result<()> {
    let publisher = bus.publisher();
    let spec = QueueSpec::new(
        events::PROJECT_EVENTS,
        QUEUE,
        vec![events::PROJECT_DELETION_INITIATED.into()],
    );

    consume_queue(&bus, spec, FailurePolicy::RequeueOnError, move |delivery| {
        let nodes = nodes.clone();
        let publisher = publisher.clone();
        async move { handle(nodes, publisher, delivery).await }
    })
    .await
}

async fn handle(nodes: NodeStore, publisher: Publisher, delivery: Delivery) -> Result<()> {
    let msg: events::ProjectDeletionInitiated = match delivery.json() {
        Ok(m) => m,
        Err(_) => {
            tracing::warn!("project.deletion.initiated lacks a project_id, discarding");
            return Ok(());
        }
    };

    let deleted = nodes.delete_for_project(msg.project_id).await?;
    tracing::info!(project_id = %msg.project_id, deleted, "project nodes deleted");

    publisher
        .publish(
            events::PROJECT_EVENTS,
            &events::project_resource_deleted_key(SERVICE_NAME),
            &events::ResourceForProjectDeleted {
                project_id: msg.project_id,
                service_name: SERVICE_NAME.to_string(),
            },
            ExchangeKind::Topic,
        )
        .await?;

    tracing::info!(project_id = %msg.project_id, "node cleanup confirmed");
    Ok(())
}
