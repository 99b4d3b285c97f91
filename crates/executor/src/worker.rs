//! The job consumer: pulls from `inference_jobs_queue`, runs each job in
//! its own task registered for cancellation, and settles the delivery
//! when the job does.
//!
//! Ack discipline: success and cancellation ack; malformed payloads ack
//! after publishing an error (a replay cannot fix them); an error that
//! cannot even be reported is nacked for redelivery.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use px_bus::{subscribe_queue, AckHandle, BusClient, QueueSpec};
use px_domain::config::Settings;
use px_domain::Result;
use px_proto::events;
use tokio::sync::Semaphore;

use crate::build;
use crate::cancel::RunningJobs;
use crate::job::Job;
use crate::publisher::ResultPublisher;
use crate::run::{self, RunOutcome};

const QUEUE: &str = "inference_jobs_queue";
/// Long-running LLM jobs: give the bus half an hour before redelivery.
const JOB_ACK_WAIT: Duration = Duration::from_secs(30 * 60);

pub async fn run_worker(
    bus: BusClient,
    settings: Arc<Settings>,
    registry: Arc<RunningJobs>,
) -> Result<()> {
    let publisher = ResultPublisher::new(bus.publisher());
    let prefetch = settings.executor_prefetch.max(1);
    let permits = Arc::new(Semaphore::new(prefetch));

    let spec = QueueSpec::new(
        events::INFERENCE_EXCHANGE,
        QUEUE,
        vec![events::INFERENCE_JOB_START.into()],
    )
    .with_ack_wait(JOB_ACK_WAIT)
    .with_max_in_flight(prefetch);

    loop {
        match subscribe_queue(&bus, &spec).await {
            Ok(mut messages) => {
                tracing::info!(queue = QUEUE, prefetch, "executor consuming");
                while let Some(item) = messages.next().await {
                    let msg = match item {
                        Ok(m) => m,
                        Err(e) => {
                            tracing::warn!(error = %e, "job stream error");
                            break;
                        }
                    };

                    let permit = match permits.clone().acquire_owned().await {
                        Ok(p) => p,
                        Err(_) => break,
                    };

                    let (delivery, ack) = msg.into_delivery();
                    let publisher = publisher.clone();
                    let registry = registry.clone();
                    let settings = settings.clone();

                    tokio::spawn(async move {
                        let _permit = permit;
                        process_delivery(delivery.body, ack, publisher, registry, settings)
                            .await;
                    });
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "job queue bind failed");
            }
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}

async fn process_delivery(
    body: Vec<u8>,
    ack: AckHandle,
    publisher: ResultPublisher,
    registry: Arc<RunningJobs>,
    settings: Arc<Settings>,
) {
    let job = match Job::parse(&body) {
        Ok(job) => job,
        Err(e) => {
            // Redelivery cannot repair a malformed payload.
            tracing::error!(error = %e, "rejecting malformed job");
            if let Some(job_id) = extract_job_id(&body) {
                let _ = publisher
                    .publish_error_result(job_id, "invalid job format received")
                    .await;
            }
            let _ = ack.ack().await;
            return;
        }
    };

    let job_id = job.id();
    let cancel = registry.register(job_id, job.user_id());
    tracing::info!(%job_id, "job started");

    let result = execute(job, &publisher, &cancel, &settings).await;
    registry.remove(job_id);

    match result {
        Ok(RunOutcome::Completed) => {
            tracing::info!(%job_id, "job finished");
            if let Err(e) = ack.ack().await {
                tracing::warn!(%job_id, error = %e, "ack failed");
            }
        }
        Ok(RunOutcome::Cancelled) => {
            tracing::warn!(%job_id, "job cancelled");
            let _ = publisher
                .publish_error_result(job_id, "job was cancelled")
                .await;
            if let Err(e) = ack.ack().await {
                tracing::warn!(%job_id, error = %e, "ack failed");
            }
        }
        Err(e) => {
            tracing::error!(%job_id, error = %e, "job failed");
            match publisher.publish_error_result(job_id, &e.message).await {
                Ok(()) => {
                    let _ = ack.ack().await;
                }
                Err(publish_err) => {
                    // Could not even report the failure; hand the job back.
                    tracing::error!(%job_id, error = %publish_err, "error publish failed; requeueing");
                    let _ = ack.requeue().await;
                }
            }
        }
    }
}

async fn execute(
    job: Job,
    publisher: &ResultPublisher,
    cancel: &crate::cancel::CancelToken,
    settings: &Settings,
) -> Result<RunOutcome> {
    if cancel.is_cancelled() {
        return Ok(RunOutcome::Cancelled);
    }
    let ctx = build::build_context(job, settings).await?;
    run::run(&ctx, publisher, cancel, &settings.tools_rpc_addr).await
}

/// Best-effort job id recovery from an otherwise unusable payload, so an
/// error result can still reach the waiting client.
fn extract_job_id(body: &[u8]) -> Option<uuid::Uuid> {
    let v: serde_json::Value = serde_json::from_slice(body).ok()?;
    v.get("job_id")
        .and_then(|j| j.as_str())
        .and_then(|s| uuid::Uuid::parse_str(s).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_recovered_from_partial_payload() {
        let id = uuid::Uuid::new_v4();
        let body = serde_json::to_vec(&serde_json::json!({
            "job_id": id.to_string(),
            "query": {},
        }))
        .unwrap();
        assert_eq!(extract_job_id(&body), Some(id));
        assert_eq!(extract_job_id(b"junk"), None);
    }
}
