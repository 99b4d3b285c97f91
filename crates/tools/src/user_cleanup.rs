//! User-cleanup worker: deletes the user's tools on
//! `user.deletion.initiated` — publishing `tool.deleted` per tool so
//! dependent nodes heal — then confirms with
//! `resource.for_user.deleted.ToolService`.

use px_bus::{consume_queue, BusClient, Delivery, ExchangeKind, FailurePolicy, Publisher, QueueSpec};
use px_domain::Result;
use px_proto::events;

use crate::store::ToolStore;

const QUEUE: &str = "tool_user_cleanup_queue";
const SERVICE_NAME: &str = "ToolService";

pub async fn run(bus: BusClient, tools: ToolStore) -> Result<()> {
    let publisher = bus.publisher();
    let spec = QueueSpec::new(
        events::USER_EVENTS,
        QUEUE,
        vec![events::USER_DELETION_INITIATED.into()],
    );

    consume_queue(&bus, spec, FailurePolicy::RequeueOnError, move |delivery| {
        let tools = tools.clone();
        let publisher = publisher.clone();
        async move { handle(tools, publisher, delivery).await }
    })
    .await
}

async fn handle(tools: ToolStore, publisher: Publisher, delivery: Delivery) -> Result<()> {
    let msg: events::UserDeletionInitiated = match delivery.json() {
        Ok(m) => m,
        Err(_) => {
            tracing::warn!("user.deletion.initiated lacks a user_id, discarding");
            return Ok(());
        }
    };

    let owned = tools.list_for_owner(msg.user_id).await?;
    tracing::info!(user_id = %msg.user_id, count = owned.len(), "deleting the user's tools");

    for tool in &owned {
        tools.delete(tool.id).await?;
        publisher
            .publish(
                events::RESOURCE_EVENTS,
                events::TOOL_DELETED,
                &events::ToolDeleted { tool_id: tool.id },
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

    tracing::info!(user_id = %msg.user_id, "tool cleanup confirmed");
    Ok(())
}
