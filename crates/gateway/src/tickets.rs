//! Single-use ticket consumption: an atomic GETDEL so a ticket can
//! authorize exactly one socket, ever.

use px_domain::{Error, Result};
use px_proto::tickets::{ticket_key, TicketData};

#[derive(Clone)]
pub struct TicketConsumer {
    conn: redis::aio::ConnectionManager,
}

impl TicketConsumer {
    pub async fn connect(url: &str) -> Result<Self> {
        let client =
            redis::Client::open(url).map_err(|e| Error::unavailable(format!("redis: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| Error::unavailable(format!("redis connect: {e}")))?;
        Ok(Self { conn })
    }

    /// Fetch-and-burn. `None` means absent, expired, or already used.
    pub async fn consume(&self, ticket: &str) -> Result<Option<TicketData>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GETDEL")
            .arg(ticket_key(ticket))
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::unavailable(format!("redis getdel: {e}")))?;

        match raw {
            Some(json) => Ok(serde_json::from_str(&json).ok()),
            None => Ok(None),
        }
    }
}
