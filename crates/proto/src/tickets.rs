//! Ephemeral KV record layout shared by the orchestrator (writer) and
//! the delivery gateway (consumer). Lives here so the key format and the
//! ticket payload cannot drift between the two services.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const JOB_OWNER_TTL_SECS: u64 = 24 * 60 * 60;
pub const TICKET_TTL_SECS: u64 = 60;

pub fn job_owner_key(job_id: Uuid) -> String {
    format!("job_own:{job_id}")
}

pub fn ticket_key(ticket: &str) -> String {
    format!("ws_ticket:{ticket}")
}

/// What a WebSocket ticket authorizes: one socket for one job's results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketData {
    pub job_id: Uuid,
    pub user_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout_is_stable() {
        let id = Uuid::nil();
        assert_eq!(
            job_owner_key(id),
            "job_own:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(ticket_key("ws_ticket_ab"), "ws_ticket:ws_ticket_ab");
    }

    #[test]
    fn ticket_data_round_trip() {
        let data = TicketData {
            job_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
        };
        let back: TicketData =
            serde_json::from_str(&serde_json::to_string(&data).unwrap()).unwrap();
        assert_eq!(back.job_id, data.job_id);
    }
}
