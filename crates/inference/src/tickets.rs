//! Ephemeral records in Redis: job ownership (24 h) and single-use
//! WebSocket tickets (60 s). Key layout is shared with the delivery
//! gateway through `px_proto::tickets`.

use px_domain::{Error, Result};
use px_proto::tickets::{job_owner_key, ticket_key, TicketData, JOB_OWNER_TTL_SECS, TICKET_TTL_SECS};
use rand::RngCore;
use redis::AsyncCommands;
use uuid::Uuid;

#[derive(Clone)]
pub struct TicketStore {
    conn: redis::aio::ConnectionManager,
}

impl TicketStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client =
            redis::Client::open(url).map_err(|e| Error::unavailable(format!("redis: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| Error::unavailable(format!("redis connect: {e}")))?;
        Ok(Self { conn })
    }

    /// Record `job_id → user_id`. Existence of this key is the
    /// authoritative "job is still alive" signal for cancellation.
    pub async fn store_job_owner(&self, job_id: Uuid, user_id: Uuid) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(job_owner_key(job_id), user_id.to_string(), JOB_OWNER_TTL_SECS)
            .await
            .map_err(|e| Error::unavailable(format!("redis set: {e}")))?;
        Ok(())
    }

    pub async fn job_owner(&self, job_id: Uuid) -> Result<Option<Uuid>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(job_owner_key(job_id))
            .await
            .map_err(|e| Error::unavailable(format!("redis get: {e}")))?;
        Ok(raw.and_then(|s| Uuid::parse_str(&s).ok()))
    }

    pub async fn delete_job_owner(&self, job_id: Uuid) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(job_owner_key(job_id))
            .await
            .map_err(|e| Error::unavailable(format!("redis del: {e}")))?;
        Ok(())
    }

    /// Mint a single-use ticket bound to `{job_id, user_id}`.
    pub async fn mint_ticket(&self, job_id: Uuid, user_id: Uuid) -> Result<String> {
        let mut token = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut token);
        let ticket = format!("ws_ticket_{}", hex::encode(token));

        let data = serde_json::to_string(&TicketData { job_id, user_id })?;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(ticket_key(&ticket), data, TICKET_TTL_SECS)
            .await
            .map_err(|e| Error::unavailable(format!("redis set: {e}")))?;
        Ok(ticket)
    }
}
