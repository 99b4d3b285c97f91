//! Event bus adapter: durable topic and fanout messaging over NATS
//! JetStream with AMQP-style exchange/binding-key semantics.
//!
//! Mapping:
//! - topic exchange   → JetStream stream named after the exchange, with
//!   subjects `<exchange>.>`; the routing key becomes the subject suffix.
//! - durable queue    → durable pull consumer filtered on the bindings.
//! - fanout exchange  → core NATS subject; each process instance holds its
//!   own plain subscription and sees every broadcast.
//!
//! Publishes to topic exchanges are persistent (JetStream ack awaited) and
//! retried with exponential backoff before surfacing `Unavailable`.
//! Consumers ack only after the handler returns `Ok`; failures follow the
//! queue's [`FailurePolicy`].

mod publish;
mod subject;
mod worker;

pub use publish::{ExchangeKind, Publisher};
pub use subject::{binding_to_subject, routing_subject};
pub use worker::{
    consume_fanout, consume_queue, subscribe_exclusive, subscribe_queue, AckHandle, Delivery,
    FailurePolicy, QueueMessage, QueueSpec,
};

use px_domain::{Error, Result};

/// Shared bus connection: core client + JetStream context.
///
/// The underlying client reconnects automatically on transport faults;
/// JetStream contexts are cheap handles, one per operation is fine.
#[derive(Clone)]
pub struct BusClient {
    pub(crate) client: async_nats::Client,
    pub(crate) jetstream: async_nats::jetstream::Context,
}

impl BusClient {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| Error::unavailable(format!("bus connect: {e}")))?;
        let jetstream = async_nats::jetstream::new(client.clone());
        Ok(Self { client, jetstream })
    }

    pub fn publisher(&self) -> Publisher {
        Publisher::new(self.clone())
    }

    /// Ensure the stream backing a topic exchange exists.
    pub(crate) async fn ensure_stream(&self, exchange: &str) -> Result<async_nats::jetstream::stream::Stream> {
        self.jetstream
            .get_or_create_stream(async_nats::jetstream::stream::Config {
                name: exchange.to_string(),
                subjects: vec![format!("{exchange}.>")],
                ..Default::default()
            })
            .await
            .map_err(|e| Error::unavailable(format!("ensure stream {exchange}: {e}")))
    }
}
