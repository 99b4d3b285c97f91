//! WebSocket connection registry: one socket per job id.
//!
//! All mutation happens behind a single-owner lock; the socket tasks own
//! the receiving half of their channel.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Outbound instruction to a socket task.
#[derive(Debug, Clone)]
pub enum SocketCommand {
    /// Deliver a JSON payload.
    Send(String),
    /// Deliver a payload, then close with code 1000.
    SendAndClose(String),
}

#[derive(Default)]
pub struct ConnectionRegistry {
    sockets: Mutex<HashMap<Uuid, mpsc::Sender<SocketCommand>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the socket for a job; replaces any previous socket.
    pub fn register(&self, job_id: Uuid, sink: mpsc::Sender<SocketCommand>) {
        let previous = self.sockets.lock().insert(job_id, sink);
        if previous.is_some() {
            tracing::warn!(%job_id, "replacing an existing socket registration");
        }
        tracing::info!(%job_id, total = self.len(), "websocket registered");
    }

    pub fn remove(&self, job_id: Uuid) {
        if self.sockets.lock().remove(&job_id).is_some() {
            tracing::info!(%job_id, total = self.len(), "websocket deregistered");
        }
    }

    pub fn len(&self) -> usize {
        self.sockets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.lock().is_empty()
    }

    /// Route a command to the socket holding `job_id`. Returns false if
    /// no socket is registered (the client never connected or is gone).
    pub async fn route(&self, job_id: Uuid, command: SocketCommand) -> bool {
        let sink = self.sockets.lock().get(&job_id).cloned();
        match sink {
            Some(sink) => {
                if sink.send(command).await.is_err() {
                    // Receiver dropped: the socket task is gone.
                    self.remove(job_id);
                    false
                } else {
                    true
                }
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_route_remove() {
        let registry = ConnectionRegistry::new();
        let job_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(4);

        registry.register(job_id, tx);
        assert_eq!(registry.len(), 1);

        assert!(registry.route(job_id, SocketCommand::Send("{}".into())).await);
        assert!(matches!(rx.recv().await, Some(SocketCommand::Send(_))));

        registry.remove(job_id);
        assert!(registry.is_empty());
        assert!(!registry.route(job_id, SocketCommand::Send("{}".into())).await);
    }

    #[tokio::test]
    async fn route_to_dropped_receiver_cleans_up() {
        let registry = ConnectionRegistry::new();
        let job_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        registry.register(job_id, tx);
        assert!(!registry.route(job_id, SocketCommand::Send("{}".into())).await);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn unknown_job_routes_nowhere() {
        let registry = ConnectionRegistry::new();
        assert!(
            !registry
                .route(Uuid::new_v4(), SocketCommand::Send("{}".into()))
                .await
        );
    }
}
