//! User-cleanup worker: on `user.deletion.initiated`, deletes the user's
//! models — publishing `model.deleted` for each so dependent nodes heal —
//! then confirms with `resource.for_user.deleted.AIModelService`.

use px_bus::{consume_queue, BusClient, Delivery, ExchangeKind, FailurePolicy, Publisher, QueueSpec};
use px_domain::Result;
use px_proto::events;

use crate::store::ModelStore;

const QUEUE: &str = "aimodel_user_cleanup_queue";
const SERVICE_NAME: &str = "AIModelService";

pub async fn run(bus: BusClient, models: ModelStore) -> Result<()> {
    let publisher = bus.publisher();
    let spec = QueueSpec::new(
        events::USER_EVENTS,
        QUEUE,
        vec![events::USER_DELETION_INITIATED.into()],
    );

    consume_queue(&bus, spec, FailurePolicy::RequeueOnError, move |delivery| {
        let models = models.clone();
        let publisher = publisher.clone();
        async move { handle(models, publisher, delivery).await }
    })
    .await
}

async fn handle(models: ModelStore, publisher: Publisher, delivery: Delivery) -> Result<()> {
    let msg: events::UserDeletionInitiated = match delivery.json() {
        Ok(m) => m,
        Err(_) => {
            tracing::warn!("user.deletion.initiated lacks a user_id, discarding");
            return Ok(());
        }
    };

    let owned = models.list_for_owner(msg.user_id).await?;
    tracing::info!(user_id = %msg.user_id, count = owned.len(), "deleting the user's models");

    for model in &owned {
        models.delete(model.id).await?;
        publisher
            .publish(
                events::RESOURCE_EVENTS,
                events::MODEL_DELETED,
                &events::ModelDeleted { model_id: model.id },
                ExchangeKind::Topic,
            )
            .await?;
    }

    publisher
        .publish(
            events::USER_EVENTS,
            &events::user_resource_deleted_key(SERVICE_NAME),
            &events::ResourceForUserDeleted {
                user_id: msg.user_id,
                service_name: SERVICE_NAME.to_string(),
            },
            ExchangeKind::Topic,
        )
        .await?;

    tracing::info!(user_id = %msg.user_id, "model cleanup confirmed");
    Ok(())
}
