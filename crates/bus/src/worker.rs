use std::future::Future;
use std::time::Duration;

use async_nats::jetstream::consumer::PullConsumer;
use async_nats::jetstream::AckKind;
use futures_util::StreamExt;
use px_domain::{Error, Result};
use rand::Rng;

use crate::subject::{binding_to_subject, subject_to_routing_key};
use crate::BusClient;

/// What to do when a queue handler fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Nack and let the bus redeliver.
    RequeueOnError,
    /// Park the message on `<exchange>.dlq.<queue>` and ack the original.
    DeadLetterOnError,
}

/// A durable queue binding.
#[derive(Debug, Clone)]
pub struct QueueSpec {
    pub exchange: String,
    pub queue: String,
    pub bindings: Vec<String>,
    /// How long the bus waits for an ack before redelivering. Long-running
    /// consumers (the executor) raise this well above the default.
    pub ack_wait: Option<Duration>,
    /// Prefetch: max unacked deliveries in flight.
    pub max_in_flight: Option<usize>,
}

impl QueueSpec {
    pub fn new(
        exchange: impl Into<String>,
        queue: impl Into<String>,
        bindings: Vec<String>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            queue: queue.into(),
            bindings,
            ack_wait: None,
            max_in_flight: None,
        }
    }

    pub fn with_ack_wait(mut self, ack_wait: Duration) -> Self {
        self.ack_wait = Some(ack_wait);
        self
    }

    pub fn with_max_in_flight(mut self, n: usize) -> Self {
        self.max_in_flight = Some(n);
        self
    }
}

/// A delivered message, decoded to its routing key and raw body.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub routing_key: String,
    pub body: Vec<u8>,
}

impl Delivery {
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// A queue message whose ack is still owed. Used directly by consumers
/// that need to hold the delivery across a long-running task.
pub struct QueueMessage {
    delivery: Delivery,
    inner: async_nats::jetstream::Message,
}

impl QueueMessage {
    pub fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    pub fn into_delivery(self) -> (Delivery, AckHandle) {
        (self.delivery, AckHandle { inner: self.inner })
    }

    pub async fn ack(&self) -> Result<()> {
        self.inner
            .ack()
            .await
            .map_err(|e| Error::unavailable(format!("ack: {e}")))
    }

    pub async fn requeue(&self) -> Result<()> {
        self.inner
            .ack_with(AckKind::Nak(None))
            .await
            .map_err(|e| Error::unavailable(format!("nak: {e}")))
    }
}

/// The ack side of a [`QueueMessage`], detachable so a spawned task can
/// settle the delivery when the work finishes.
pub struct AckHandle {
    inner: async_nats::jetstream::Message,
}

impl AckHandle {
    pub async fn ack(&self) -> Result<()> {
        self.inner
            .ack()
            .await
            .map_err(|e| Error::unavailable(format!("ack: {e}")))
    }

    pub async fn requeue(&self) -> Result<()> {
        self.inner
            .ack_with(AckKind::Nak(None))
            .await
            .map_err(|e| Error::unavailable(format!("nak: {e}")))
    }
}

/// Bind a durable pull consumer for `spec` and return its message stream.
///
/// One-shot: callers that need resilience wrap this in a reconnect loop
/// (or use [`consume_queue`], which does).
pub async fn subscribe_queue(
    bus: &BusClient,
    spec: &QueueSpec,
) -> Result<impl futures_util::Stream<Item = Result<QueueMessage>>> {
    let stream = bus.ensure_stream(&spec.exchange).await?;

    let filter_subjects: Vec<String> = spec
        .bindings
        .iter()
        .map(|b| binding_to_subject(&spec.exchange, b))
        .collect();

    let mut config = async_nats::jetstream::consumer::pull::Config {
        durable_name: Some(spec.queue.clone()),
        filter_subjects,
        ..Default::default()
    };
    if let Some(ack_wait) = spec.ack_wait {
        config.ack_wait = ack_wait;
    }
    if let Some(max) = spec.max_in_flight {
        config.max_ack_pending = max as i64;
    }

    let consumer: PullConsumer = stream
        .get_or_create_consumer(&spec.queue, config)
        .await
        .map_err(|e| Error::unavailable(format!("bind queue {}: {e}", spec.queue)))?;

    let messages = consumer
        .messages()
        .await
        .map_err(|e| Error::unavailable(format!("consume {}: {e}", spec.queue)))?;

    let exchange = spec.exchange.clone();
    Ok(messages.map(move |item| {
        let msg =
            item.map_err(|e| Error::unavailable(format!("queue stream: {e}")))?;
        let routing_key = subject_to_routing_key(&exchange, msg.subject.as_str()).to_string();
        Ok(QueueMessage {
            delivery: Delivery {
                routing_key,
                body: msg.payload.to_vec(),
            },
            inner: msg,
        })
    }))
}

/// Bind an exclusive, per-instance consumer: a fresh ephemeral consumer
/// that dies with this process. Used by the delivery gateway, where each
/// instance must see the full result stream for its own sockets.
pub async fn subscribe_exclusive(
    bus: &BusClient,
    exchange: &str,
    bindings: &[String],
) -> Result<impl futures_util::Stream<Item = Result<QueueMessage>>> {
    let stream = bus.ensure_stream(exchange).await?;

    let filter_subjects: Vec<String> = bindings
        .iter()
        .map(|b| binding_to_subject(exchange, b))
        .collect();

    let consumer: PullConsumer = stream
        .create_consumer(async_nats::jetstream::consumer::pull::Config {
            durable_name: None,
            filter_subjects,
            deliver_policy: async_nats::jetstream::consumer::DeliverPolicy::New,
            inactive_threshold: std::time::Duration::from_secs(60),
            ..Default::default()
        })
        .await
        .map_err(|e| Error::unavailable(format!("exclusive bind on {exchange}: {e}")))?;

    let messages = consumer
        .messages()
        .await
        .map_err(|e| Error::unavailable(format!("exclusive consume on {exchange}: {e}")))?;

    let exchange = exchange.to_string();
    Ok(messages.map(move |item| {
        let msg = item.map_err(|e| Error::unavailable(format!("exclusive stream: {e}")))?;
        let routing_key = subject_to_routing_key(&exchange, msg.subject.as_str()).to_string();
        Ok(QueueMessage {
            delivery: Delivery {
                routing_key,
                body: msg.payload.to_vec(),
            },
            inner: msg,
        })
    }))
}

/// Consume a durable queue forever, acking after each successful handler
/// run and applying `policy` on handler errors. Reconnects with a jittered
/// delay on transport faults; never returns except on fatal setup errors
/// that persist across retries.
pub async fn consume_queue<F, Fut>(
    bus: &BusClient,
    spec: QueueSpec,
    policy: FailurePolicy,
    handler: F,
) -> Result<()>
where
    F: Fn(Delivery) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    loop {
        match subscribe_queue(bus, &spec).await {
            Ok(mut messages) => {
                tracing::info!(queue = %spec.queue, exchange = %spec.exchange, "worker consuming");
                while let Some(item) = messages.next().await {
                    let msg = match item {
                        Ok(m) => m,
                        Err(e) => {
                            tracing::warn!(queue = %spec.queue, error = %e, "stream error");
                            break;
                        }
                    };
                    handle_one(bus, &spec, policy, &handler, msg).await;
                }
            }
            Err(e) => {
                tracing::error!(queue = %spec.queue, error = %e, "queue bind failed");
            }
        }
        reconnect_pause().await;
    }
}

async fn handle_one<F, Fut>(
    bus: &BusClient,
    spec: &QueueSpec,
    policy: FailurePolicy,
    handler: &F,
    msg: QueueMessage,
) where
    F: Fn(Delivery) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    let delivery = msg.delivery().clone();
    let routing_key = delivery.routing_key.clone();
    match handler(delivery).await {
        Ok(()) => {
            if let Err(e) = msg.ack().await {
                tracing::warn!(queue = %spec.queue, error = %e, "ack failed");
            }
        }
        Err(err) => match policy {
            FailurePolicy::RequeueOnError => {
                tracing::warn!(
                    queue = %spec.queue,
                    routing_key = %routing_key,
                    error = %err,
                    "handler failed; requeueing"
                );
                if let Err(e) = msg.requeue().await {
                    tracing::warn!(queue = %spec.queue, error = %e, "nak failed");
                }
            }
            FailurePolicy::DeadLetterOnError => {
                tracing::error!(
                    queue = %spec.queue,
                    routing_key = %routing_key,
                    error = %err,
                    "handler failed; dead-lettering"
                );
                let dlq_subject =
                    format!("{}.dlq.{}", spec.exchange, spec.queue);
                if let Err(e) = bus
                    .jetstream
                    .publish(dlq_subject, msg.delivery().body.clone().into())
                    .await
                {
                    tracing::warn!(queue = %spec.queue, error = %e, "dead-letter publish failed");
                }
                if let Err(e) = msg.ack().await {
                    tracing::warn!(queue = %spec.queue, error = %e, "ack failed");
                }
            }
        },
    }
}

/// Consume a fanout exchange. Every instance receives every broadcast;
/// messages are never requeued — handler errors are logged and dropped.
pub async fn consume_fanout<F, Fut>(bus: &BusClient, exchange: &str, handler: F) -> Result<()>
where
    F: Fn(Delivery) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    loop {
        match bus.client.subscribe(exchange.to_string()).await {
            Ok(mut sub) => {
                tracing::info!(exchange, "fanout listener attached");
                while let Some(msg) = sub.next().await {
                    let delivery = Delivery {
                        routing_key: msg.subject.to_string(),
                        body: msg.payload.to_vec(),
                    };
                    if let Err(e) = handler(delivery).await {
                        tracing::warn!(exchange, error = %e, "fanout handler failed; dropping");
                    }
                }
                tracing::warn!(exchange, "fanout subscription closed");
            }
            Err(e) => {
                tracing::error!(exchange, error = %e, "fanout subscribe failed");
            }
        }
        reconnect_pause().await;
    }
}

/// 5 s base + up to 1 s of jitter so a fleet does not thunder back in.
async fn reconnect_pause() {
    let jitter = rand::thread_rng().gen_range(0..1000);
    tokio::time::sleep(Duration::from_millis(5000 + jitter)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_spec_builder() {
        let spec = QueueSpec::new("resource_events", "node_dependency_update_queue", vec![
            "model.deleted".into(),
            "tool.deleted".into(),
        ])
        .with_ack_wait(Duration::from_secs(60))
        .with_max_in_flight(4);
        assert_eq!(spec.ack_wait, Some(Duration::from_secs(60)));
        assert_eq!(spec.max_in_flight, Some(4));
        assert_eq!(spec.bindings.len(), 2);
    }

    #[test]
    fn delivery_json_decodes() {
        let delivery = Delivery {
            routing_key: "model.deleted".into(),
            body: br#"{"model_id":"00000000-0000-0000-0000-000000000000"}"#.to_vec(),
        };
        let v: serde_json::Value = delivery.json().unwrap();
        assert!(v["model_id"].is_string());
    }

    #[test]
    fn delivery_json_rejects_garbage() {
        let delivery = Delivery {
            routing_key: "x".into(),
            body: b"not json".to_vec(),
        };
        assert!(delivery.json::<serde_json::Value>().is_err());
    }
}
