//! User-deletion saga finalizer.
//!
//! Binds a durable queue on `user_events` for per-service confirmations
//! plus the `all_projects_for_user.deleted` hop, which counts as the
//! ProjectService step. When the last PENDING step flips, the user row is
//! hard-deleted in the same transaction.

use px_bus::{consume_queue, BusClient, Delivery, FailurePolicy, QueueSpec};
use px_domain::{Error, Result};
use px_proto::events;
use px_saga::{SagaStore, SagaType, StepOutcome};
use uuid::Uuid;

use crate::store::UserStore;

const QUEUE: &str = "user_saga_finalizer_queue";

pub async fn run(bus: BusClient, users: UserStore, sagas: SagaStore) -> Result<()> {
    let spec = QueueSpec::new(
        events::USER_EVENTS,
        QUEUE,
        vec![
            "resource.for_user.deleted.*".into(),
            events::ALL_PROJECTS_FOR_USER_DELETED.into(),
        ],
    );

    consume_queue(&bus, spec, FailurePolicy::RequeueOnError, move |delivery| {
        let users = users.clone();
        let sagas = sagas.clone();
        async move { handle(users, sagas, delivery).await }
    })
    .await
}

async fn handle(users: UserStore, sagas: SagaStore, delivery: Delivery) -> Result<()> {
    let (user_id, service_name) = match decode(&delivery) {
        Some(pair) => pair,
        None => {
            tracing::warn!(routing_key = %delivery.routing_key, "malformed confirmation, discarding");
            return Ok(());
        }
    };

    tracing::info!(%user_id, service = %service_name, "user-deletion confirmation received");

    let mut tx = sagas
        .pool()
        .begin()
        .await
        .map_err(|e| Error::unavailable(format!("begin tx: {e}")))?;

    let outcome =
        SagaStore::confirm_step_in_tx(&mut tx, SagaType::UserDeletion, user_id, &service_name)
            .await?;

    match outcome {
        StepOutcome::UnknownSaga => {
            tracing::warn!(%user_id, "confirmation for unknown or completed saga, ignoring");
        }
        StepOutcome::AlreadyComplete => {
            tracing::warn!(%user_id, service = %service_name, "duplicate confirmation, ignoring");
        }
        StepOutcome::StepRecorded => {}
        StepOutcome::SagaComplete => {
            UserStore::delete_in_tx(&mut tx, user_id).await?;
            tracing::info!(%user_id, "all steps confirmed; user hard-deleted");
        }
    }

    tx.commit()
        .await
        .map_err(|e| Error::unavailable(format!("commit: {e}")))?;
    Ok(())
}

/// Extract `(user_id, service_name)` from either confirmation shape.
fn decode(delivery: &Delivery) -> Option<(Uuid, String)> {
    if delivery.routing_key == events::ALL_PROJECTS_FOR_USER_DELETED {
        let msg: events::AllProjectsForUserDeleted = delivery.json().ok()?;
        // The project hop confirms the ProjectService step.
        return Some((msg.user_id, "ProjectService".to_string()));
    }
    let msg: events::ResourceForUserDeleted = delivery.json().ok()?;
    Some((msg.user_id, msg.service_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_projects_hop_maps_to_project_service() {
        let delivery = Delivery {
            routing_key: events::ALL_PROJECTS_FOR_USER_DELETED.into(),
            body: serde_json::to_vec(&serde_json::json!({
                "user_id": "00000000-0000-0000-0000-000000000001"
            }))
            .unwrap(),
        };
        let (_, service) = decode(&delivery).unwrap();
        assert_eq!(service, "ProjectService");
    }

    #[test]
    fn per_service_confirmation_carries_its_name() {
        let delivery = Delivery {
            routing_key: "resource.for_user.deleted.ToolService".into(),
            body: serde_json::to_vec(&serde_json::json!({
                "user_id": "00000000-0000-0000-0000-000000000001",
                "service_name": "ToolService"
            }))
            .unwrap(),
        };
        let (_, service) = decode(&delivery).unwrap();
        assert_eq!(service, "ToolService");
    }

    #[test]
    fn malformed_body_is_discarded() {
        let delivery = Delivery {
            routing_key: "resource.for_user.deleted.ToolService".into(),
            body: b"{}".to_vec(),
        };
        assert!(decode(&delivery).is_none());
    }
}
