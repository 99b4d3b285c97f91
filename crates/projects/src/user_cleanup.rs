//! User-cleanup initiator.
//!
//! On `user.deletion.initiated`, starts a project-deletion saga for each
//! of the user's ACTIVE projects, then publishes
//! `all_projects_for_user.deleted` — the hop the user-deletion finalizer
//! records as the ProjectService step. Re-deliveries are safe: projects
//! already pending are skipped and duplicate hop confirmations are
//! ignored downstream.

use px_bus::{consume_queue, BusClient, Delivery, ExchangeKind, FailurePolicy, Publisher, QueueSpec};
use px_domain::{ErrorKind, Result};
use px_proto::events;

use crate::saga_init;
use crate::store::ProjectStore;

const QUEUE: &str = "project_user_cleanup_initiator_queue";

pub async fn run(
    bus: BusClient,
    projects: ProjectStore,
    participants: Vec<String>,
) -> Result<()> {
    let publisher = bus.publisher();
    let spec = QueueSpec::new(
        events::USER_EVENTS,
        QUEUE,
        vec![events::USER_DELETION_INITIATED.into()],
    );

    consume_queue(&bus, spec, FailurePolicy::RequeueOnError, move |delivery| {
        let projects = projects.clone();
        let publisher = publisher.clone();
        let participants = participants.clone();
        async move { handle(projects, publisher, participants, delivery).await }
    })
    .await
}

async fn handle(
    projects: ProjectStore,
    publisher: Publisher,
    participants: Vec<String>,
    delivery: Delivery,
) -> Result<()> {
    let msg: events::UserDeletionInitiated = match delivery.json() {
        Ok(m) => m,
        Err(_) => {
            tracing::warn!("user.deletion.initiated lacks a user_id, discarding");
            return Ok(());
        }
    };

    let active = projects.list_active_for_owner(msg.user_id).await?;
    tracing::info!(
        user_id = %msg.user_id,
        count = active.len(),
        "starting deletion sagas for the user's projects"
    );

    for project in &active {
        match saga_init::initiate(&projects, &publisher, &participants, project).await {
            Ok(()) => {}
            Err(e) if e.kind == ErrorKind::Conflict => {
                tracing::info!(project_id = %project.id, "saga already in progress, skipping");
            }
            Err(e) => return Err(e),
        }
    }

    // Whether or not there were projects, the user-deletion saga is
    // waiting on this confirmation.
    publisher
        .publish(
            events::USER_EVENTS,
            events::ALL_PROJECTS_FOR_USER_DELETED,
            &events::AllProjectsForUserDeleted {
                user_id: msg.user_id,
            },
            ExchangeKind::Topic,
        )
        .await?;

    tracing::info!(user_id = %msg.user_id, "all projects processed; confirmation published");
    Ok(())
}
