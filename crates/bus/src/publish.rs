use std::time::Duration;

use px_domain::{Error, Result};
use px_proto::events::Envelope;
use serde::Serialize;

use crate::subject::routing_subject;
use crate::BusClient;

/// Exchange flavor. Topic exchanges are durable and subject-routed;
/// fanout exchanges broadcast to every live consumer instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    Topic,
    Fanout,
}

/// Retry schedule for persistent publishes: initial attempt plus one
/// retry after each listed delay.
const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(2),
    Duration::from_secs(4),
    Duration::from_secs(8),
];

/// An injected publisher handle. Cheap to clone; one per service.
#[derive(Clone)]
pub struct Publisher {
    bus: BusClient,
}

impl Publisher {
    pub(crate) fn new(bus: BusClient) -> Self {
        Self { bus }
    }

    /// Publish `payload` wrapped in the standard envelope.
    ///
    /// Topic publishes are persistent: the JetStream ack is awaited and
    /// transport faults are retried on the backoff schedule. After the
    /// final failure the caller sees `Unavailable` ("event publish
    /// failed") and is expected to roll back any co-transactional state.
    pub async fn publish<T: Serialize>(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &T,
        kind: ExchangeKind,
    ) -> Result<()> {
        let body = serde_json::to_vec(&Envelope::wrap(payload))?;
        match kind {
            ExchangeKind::Topic => self.publish_persistent(exchange, routing_key, body).await,
            ExchangeKind::Fanout => self.publish_fanout(exchange, body).await,
        }
    }

    async fn publish_persistent(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Vec<u8>,
    ) -> Result<()> {
        self.bus.ensure_stream(exchange).await?;
        let subject = routing_subject(exchange, routing_key);

        let mut last_err = String::new();
        for attempt in 0..=RETRY_DELAYS.len() {
            if attempt > 0 {
                tokio::time::sleep(RETRY_DELAYS[attempt - 1]).await;
            }
            match self.try_publish(&subject, body.clone()).await {
                Ok(()) => {
                    tracing::debug!(exchange, routing_key, "published");
                    return Ok(());
                }
                Err(e) => {
                    last_err = e.message;
                    tracing::warn!(
                        exchange,
                        routing_key,
                        attempt,
                        error = %last_err,
                        "publish attempt failed"
                    );
                }
            }
        }

        Err(Error::unavailable(format!(
            "event publish failed for {subject}: {last_err}"
        )))
    }

    async fn try_publish(&self, subject: &str, body: Vec<u8>) -> Result<()> {
        let ack = self
            .bus
            .jetstream
            .publish(subject.to_string(), body.into())
            .await
            .map_err(|e| Error::unavailable(format!("publish: {e}")))?;
        ack.await
            .map_err(|e| Error::unavailable(format!("publish ack: {e}")))?;
        Ok(())
    }

    /// Fire-and-forget broadcast on a fanout exchange. Not persistent:
    /// only live consumer instances see it, which is exactly the contract
    /// for cancellation broadcasts.
    async fn publish_fanout(&self, exchange: &str, body: Vec<u8>) -> Result<()> {
        self.bus
            .client
            .publish(exchange.to_string(), body.into())
            .await
            .map_err(|e| Error::unavailable(format!("fanout publish: {e}")))?;
        self.bus
            .client
            .flush()
            .await
            .map_err(|e| Error::unavailable(format!("fanout flush: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_schedule_is_two_four_eight() {
        assert_eq!(
            RETRY_DELAYS.map(|d| d.as_secs()),
            [2, 4, 8],
        );
    }
}
