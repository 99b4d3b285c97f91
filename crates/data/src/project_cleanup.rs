//! Project-cleanup worker: deletes project files (rows + objects) on
//! `project.deletion.initiated`, then confirms with
//! `resource.for_project.deleted.DataService`.

use std::sync::Arc;

use px_bus::{consume_queue, BusClient, Delivery, ExchangeKind, FailurePolicy, Publisher, QueueSpec};
use px_domain::Result;
use px_proto::events;

use crate::object_store::ObjectStore;
use crate::store::FileStore;

const QUEUE: &str = "data_project_cleanup_queue";
const SERVICE_NAME: &str = "DataService";

pub async fn run(bus: BusClient, files: FileStore, objects: Arc<dyn ObjectStore>) -> Result<()> {
    let publisher = bus.publisher();
    let spec = QueueSpec::new(
        events::PROJECT_EVENTS,
        QUEUE,
        vec![events::PROJECT_DELETION_INITIATED.into()],
    );

    consume_queue(&bus, spec, FailurePolicy::RequeueOnError, move |delivery| {
        let files = files.clone();
        let objects = objects.clone();
        let publisher = publisher.clone();
        async move { handle(files, objects, publisher, delivery).await }
    })
    .await
}

async fn handle(
    files: FileStore,
    objects: Arc<dyn ObjectStore>,
    publisher: Publisher,
    delivery: Delivery,
) -> Result<()> {
    let msg: events::ProjectDeletionInitiated = match delivery.json() {
        Ok(m) => m,
        Err(_) => {
            tracing::warn!("project.deletion.initiated lacks a project_id, discarding");
            return Ok(());
        }
    };

    let project_files = files.list_for_project(msg.project_id).await?;
    tracing::info!(
        project_id = %msg.project_id,
        count = project_files.len(),
        "deleting project files"
    );

    for file in &project_files {
        files.delete(file.id).await?;
        if let Err(e) = objects.delete(&file.storage_path).await {
            // Metadata is gone; a stray object is an operational nit,
            // not a reason to stall the saga.
            tracing::warn!(file_id = %file.id, error = %e, "object delete failed");
        }
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

    tracing::info!(project_id = %msg.project_id, "data cleanup confirmed");
    Ok(())
}
