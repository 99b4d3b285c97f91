//! Results consumer: an exclusive, per-instance subscription on
//! `results_exchange` (`inference.result.#`). Each message is routed to
//! the socket registered for its job_id; terminal messages close the
//! socket with code 1000 after delivery.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use px_bus::{subscribe_exclusive, BusClient};
use px_domain::Result;
use px_proto::events;
use uuid::Uuid;

use crate::registry::{ConnectionRegistry, SocketCommand};

pub async fn run(bus: BusClient, registry: Arc<ConnectionRegistry>) -> Result<()> {
    let bindings = vec!["inference.result.#".to_string()];

    loop {
        match subscribe_exclusive(&bus, events::RESULTS_EXCHANGE, &bindings).await {
            Ok(mut messages) => {
                tracing::info!("results consumer attached");
                while let Some(item) = messages.next().await {
                    let msg = match item {
                        Ok(m) => m,
                        Err(e) => {
                            tracing::warn!(error = %e, "results stream error");
                            break;
                        }
                    };
                    handle(&registry, msg.delivery().body.clone()).await;
                    // Result routing is at-most-once per instance; the
                    // socket holder consumed it or nobody will.
                    if let Err(e) = msg.ack().await {
                        tracing::debug!(error = %e, "results ack failed");
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "results consumer bind failed");
            }
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}

async fn handle(registry: &ConnectionRegistry, body: Vec<u8>) {
    let parsed: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(error = %e, "undecodable result message");
            return;
        }
    };

    let Some(job_id) = parsed
        .get("job_id")
        .and_then(|j| j.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
    else {
        tracing::warn!("result message without job_id");
        return;
    };

    let payload = parsed.to_string();
    let terminal = matches!(
        parsed.get("status").and_then(|s| s.as_str()),
        Some("success") | Some("error")
    );

    let command = if terminal {
        SocketCommand::SendAndClose(payload)
    } else {
        SocketCommand::Send(payload)
    };

    if !registry.route(job_id, command).await {
        tracing::debug!(%job_id, "no socket for result message");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn chunks_route_and_terminal_closes() {
        let registry = ConnectionRegistry::new();
        let job_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(4);
        registry.register(job_id, tx);

        let chunk = serde_json::to_vec(&serde_json::json!({
            "job_id": job_id.to_string(), "type": "chunk", "content": "he"
        }))
        .unwrap();
        handle(&registry, chunk).await;
        assert!(matches!(rx.recv().await, Some(SocketCommand::Send(_))));

        let fin = serde_json::to_vec(&serde_json::json!({
            "job_id": job_id.to_string(), "status": "success", "content": "hello"
        }))
        .unwrap();
        handle(&registry, fin).await;
        assert!(matches!(
            rx.recv().await,
            Some(SocketCommand::SendAndClose(_))
        ));
    }

    #[tokio::test]
    async fn error_status_is_terminal() {
        let registry = ConnectionRegistry::new();
        let job_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(4);
        registry.register(job_id, tx);

        let err = serde_json::to_vec(&serde_json::json!({
            "job_id": job_id.to_string(), "status": "error", "error": "boom"
        }))
        .unwrap();
        handle(&registry, err).await;
        assert!(matches!(
            rx.recv().await,
            Some(SocketCommand::SendAndClose(_))
        ));
    }

    #[tokio::test]
    async fn messages_without_job_id_are_dropped() {
        let registry = ConnectionRegistry::new();
        handle(&registry, b"{\"status\":\"success\"}".to_vec()).await;
        handle(&registry, b"not json".to_vec()).await;
        // Nothing to assert beyond "no panic" — the registry is empty.
        assert!(registry.is_empty());
    }
}
