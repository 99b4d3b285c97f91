//! Project-deletion saga finalizer.
//!
//! Consumes `resource.for_project.deleted.*` confirmations; under the
//! saga row lock flips the matching step, and when no PENDING steps
//! remain hard-deletes the project in the same transaction. Stale and
//! duplicate confirmations are acked and ignored with a warning.

use px_bus::{consume_queue, BusClient, Delivery, FailurePolicy, QueueSpec};
use px_domain::{Error, Result};
use px_proto::events;
use px_saga::{SagaStore, SagaType, StepOutcome};

use crate::store::ProjectStore;

const QUEUE: &str = "project_finalizer_queue";

pub async fn run(bus: BusClient, projects: ProjectStore, sagas: SagaStore) -> Result<()> {
    let spec = QueueSpec::new(
        events::PROJECT_EVENTS,
        QUEUE,
        vec!["resource.for_project.deleted.*".into()],
    );

    consume_queue(&bus, spec, FailurePolicy::RequeueOnError, move |delivery| {
        let projects = projects.clone();
        let sagas = sagas.clone();
        async move { handle(projects, sagas, delivery).await }
    })
    .await
}

async fn handle(projects: ProjectStore, sagas: SagaStore, delivery: Delivery) -> Result<()> {
    let msg: events::ResourceForProjectDeleted = match delivery.json() {
        Ok(m) => m,
        Err(_) => {
            tracing::warn!(routing_key = %delivery.routing_key, "malformed confirmation, discarding");
            return Ok(());
        }
    };

    tracing::info!(
        project_id = %msg.project_id,
        service = %msg.service_name,
        "project-deletion confirmation received"
    );

    let mut tx = sagas
        .pool()
        .begin()
        .await
        .map_err(|e| Error::unavailable(format!("begin tx: {e}")))?;

    let outcome = SagaStore::confirm_step_in_tx(
        &mut tx,
        SagaType::ProjectDeletion,
        msg.project_id,
        &msg.service_name,
    )
    .await?;

    match outcome {
        StepOutcome::UnknownSaga => {
            tracing::warn!(
                project_id = %msg.project_id,
                "confirmation for unknown or completed saga, ignoring"
            );
        }
        StepOutcome::AlreadyComplete => {
            tracing::warn!(
                project_id = %msg.project_id,
                service = %msg.service_name,
                "duplicate confirmation, ignoring"
            );
        }
        StepOutcome::StepRecorded => {}
        StepOutcome::SagaComplete => {
            ProjectStore::delete_in_tx(&mut tx, msg.project_id).await?;
            tracing::info!(project_id = %msg.project_id, "all steps confirmed; project hard-deleted");
        }
    }

    tx.commit()
        .await
        .map_err(|e| Error::unavailable(format!("commit: {e}")))?;
    Ok(())
}
