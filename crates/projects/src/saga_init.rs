//! Project-deletion saga initiation, shared by the DELETE endpoint and
//! the user-cleanup initiator worker.

use px_bus::{ExchangeKind, Publisher};
use px_domain::{Error, Result};
use px_proto::events;
use px_saga::{SagaStore, SagaType};

use crate::store::{Project, ProjectStore};

/// Start the deletion saga for one project.
///
/// One transaction: status → PENDING_DELETION, saga + PENDING steps for
/// every configured participant, then the `project.deletion.initiated`
/// publish. A publish failure rolls the whole thing back. Returns
/// `Conflict` when a saga is already in progress for the project.
pub async fn initiate(
    store: &ProjectStore,
    publisher: &Publisher,
    participants: &[String],
    project: &Project,
) -> Result<()> {
    let mut tx = store
        .pool()
        .begin()
        .await
        .map_err(|e| Error::unavailable(format!("begin tx: {e}")))?;

    ProjectStore::mark_pending_in_tx(&mut tx, project.id).await?;
    SagaStore::begin_in_tx(&mut tx, SagaType::ProjectDeletion, project.id, participants).await?;

    publisher
        .publish(
            events::PROJECT_EVENTS,
            events::PROJECT_DELETION_INITIATED,
            &events::ProjectDeletionInitiated {
                project_id: project.id,
                owner_id: project.owner_id,
            },
            ExchangeKind::Topic,
        )
        .await?;

    tx.commit()
        .await
        .map_err(|e| Error::unavailable(format!("commit: {e}")))?;

    tracing::info!(project_id = %project.id, "project-deletion saga initiated");
    Ok(())
}
