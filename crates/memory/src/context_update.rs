//! Context-update worker: consumes `memory.context.update` from the
//! executor's feedback loop and appends the job's message pair
//! idempotently (the job id is the idempotency key; replays add nothing).

use px_bus::{consume_queue, BusClient, Delivery, FailurePolicy, QueueSpec};
use px_domain::Result;
use px_proto::events;

use crate::store::{AppendOutcome, MemoryStore};

const QUEUE: &str = "memory_context_update_queue";

pub async fn run(bus: BusClient, memory: MemoryStore) -> Result<()> {
    let spec = QueueSpec::new(
        events::MEMORY_EXCHANGE,
        QUEUE,
        vec![events::MEMORY_CONTEXT_UPDATE.into()],
    );

    consume_queue(&bus, spec, FailurePolicy::RequeueOnError, move |delivery| {
        let memory = memory.clone();
        async move { handle(memory, delivery).await }
    })
    .await
}

async fn handle(memory: MemoryStore, delivery: Delivery) -> Result<()> {
    let msg: events::MemoryContextUpdate = match delivery.json() {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(error = %e, "malformed context update, discarding");
            return Ok(());
        }
    };

    let bucket = match memory.find_bucket(msg.memory_bucket_id).await? {
        Some(b) => b,
        None => {
            // Bucket deleted between job start and feedback; nothing to do.
            tracing::warn!(
                bucket_id = %msg.memory_bucket_id,
                "context update for missing bucket, discarding"
            );
            return Ok(());
        }
    };

    match memory
        .append_messages(&bucket, msg.idempotency_key, &msg.messages_to_add)
        .await?
    {
        AppendOutcome::Added(n) => {
            tracing::info!(
                bucket_id = %bucket.id,
                job_id = %msg.idempotency_key,
                added = n,
                "memory updated"
            );
        }
        AppendOutcome::Duplicate => {
            tracing::warn!(
                bucket_id = %bucket.id,
                job_id = %msg.idempotency_key,
                "duplicate context update, discarding"
            );
        }
    }
    Ok(())
}
