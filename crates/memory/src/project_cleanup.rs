//! Project-cleanup worker: on `project.deletion.initiated`, deletes the
//! project's buckets (messages cascade) and confirms with
//! `resource.for_project.deleted.MemoryService`.

use px_bus::{consume_queue, BusClient, Delivery, ExchangeKind, FailurePolicy, Publisher, QueueSpec};
use px_domain::Result;
use px_proto::events;

use crate::store::MemoryStore;

const QUEUE: &str = "memory_project_cleanup_queue";
const SERVICE_NAME: &str = "MemoryService";

pub async fn run(bus: BusClient, memory: MemoryStore) -> Result<()> {
    let publisher = bus.publisher();
    let spec = QueueSpec::new(
        events::PROJECT_EVENTS,
        QUEUE,
        vec![events::PROJECT_DELETION_INITIATED.into()],
    );

    consume_queue(&bus, spec, FailurePolicy::RequeueOnError, move |delivery| {
        let memory = memory.clone();
        let publisher = publisher.clone();
        async move { handle(memory, publisher, delivery).await }
    })
    .await
}

async fn handle(memory: MemoryStore, publisher: Publisher, delivery: Delivery) -> Result<()> {
    let msg: events::ProjectDeletionInitiated = match delivery.json() {
        Ok(m) => m,
        Err(_) => {
            tracing::warn!("project.deletion.initiated lacks a project_id, discarding");
            return Ok(());
        }
    };

    let buckets = memory.list_for_project(msg.project_id).await?;
    tracing::info!(
        project_id = %msg.project_id,
        count = buckets.len(),
        "deleting project memory buckets"
    );

    for bucket in &buckets {
        memory.delete_bucket(bucket.id).await?;
        publisher
            .publish(
                events::RESOURCE_EVENTS,
                events::MEMORY_BUCKET_DELETED,
                &events::MemoryBucketDeleted { bucket_id: bucket.id },
                ExchangeKind::Topic,
            )
            .await?;
    }

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

    tracing::info!(project_id = %msg.project_id, "memory cleanup confirmed");
    Ok(())
}
