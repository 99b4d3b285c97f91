//! WebSocket endpoint for result delivery.
//!
//! Flow:
//! 1. Client connects to `/ws/results/?ticket=<ticket>`
//! 2. Missing ticket → close 4001; invalid/expired/used → close 4003
//! 3. On success the socket is registered under the ticket's job_id
//! 4. The results consumer pushes payloads; a final or error payload is
//!    followed by a server-side close with code 1000

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::registry::{ConnectionRegistry, SocketCommand};
use crate::tickets::TicketConsumer;

const CLOSE_MISSING_TICKET: u16 = 4001;
const CLOSE_BAD_TICKET: u16 = 4003;
const CLOSE_NORMAL: u16 = 1000;

#[derive(Clone)]
pub struct WsState {
    pub registry: Arc<ConnectionRegistry>,
    pub tickets: TicketConsumer,
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub ticket: Option<String>,
}

pub async fn results_ws(
    ws: WebSocketUpgrade,
    State(state): State<WsState>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.ticket))
}

async fn handle_socket(socket: WebSocket, state: WsState, ticket: Option<String>) {
    let (mut sink, mut stream) = socket.split();

    let Some(ticket) = ticket else {
        let _ = close(&mut sink, CLOSE_MISSING_TICKET, "ticket query parameter is required").await;
        return;
    };

    let ticket_data = match state.tickets.consume(&ticket).await {
        Ok(Some(data)) => data,
        Ok(None) => {
            let _ = close(&mut sink, CLOSE_BAD_TICKET, "invalid, expired, or already used ticket")
                .await;
            return;
        }
        Err(e) => {
            tracing::error!(error = %e, "ticket validation failed");
            let _ = close(&mut sink, CLOSE_BAD_TICKET, "ticket validation unavailable").await;
            return;
        }
    };

    let job_id = ticket_data.job_id;
    tracing::info!(%job_id, user_id = %ticket_data.user_id, "results socket authorized");

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<SocketCommand>(64);
    state.registry.register(job_id, outbound_tx);

    // Writer task: relays routed result payloads onto the socket.
    let writer = tokio::spawn(async move {
        while let Some(command) = outbound_rx.recv().await {
            match command {
                SocketCommand::Send(payload) => {
                    if sink.send(Message::Text(payload)).await.is_err() {
                        break;
                    }
                }
                SocketCommand::SendAndClose(payload) => {
                    let _ = sink.send(Message::Text(payload)).await;
                    let _ = close(&mut sink, CLOSE_NORMAL, "job finished").await;
                    break;
                }
            }
        }
    });

    // Reader loop: only watches for the client going away.
    while let Some(Ok(msg)) = stream.next().await {
        if let Message::Close(_) = msg {
            break;
        }
    }

    state.registry.remove(job_id);
    writer.abort();
    tracing::info!(%job_id, "results socket closed");
}

async fn close(
    sink: &mut (impl SinkExt<Message> + Unpin),
    code: u16,
    reason: &str,
) -> Result<(), ()> {
    sink.send(Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    })))
    .await
    .map_err(|_| ())
}
