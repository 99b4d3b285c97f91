//! Cancellation listener: an exclusive subscription on the job-control
//! fanout. Every executor instance hears every broadcast; the one
//! running the job verifies ownership and signals its task. Broadcasts
//! are never requeued.

use std::sync::Arc;

use px_bus::{consume_fanout, BusClient};
use px_domain::Result;
use px_proto::events;

use crate::cancel::RunningJobs;

pub async fn run(bus: BusClient, registry: Arc<RunningJobs>) -> Result<()> {
    consume_fanout(&bus, events::JOB_CONTROL_FANOUT, move |delivery| {
        let registry = registry.clone();
        async move {
            let msg: events::JobCancel = match delivery.json() {
                Ok(m) => m,
                Err(_) => {
                    // Malformed broadcast: ignore silently.
                    return Ok(());
                }
            };

            if registry.cancel_if_owner(msg.job_id, msg.user_id) {
                tracing::warn!(job_id = %msg.job_id, "cancel signal sent to local task");
            }
            // Not running here (or not authorized): nothing to do.
            Ok(())
        }
    })
    .await
}
