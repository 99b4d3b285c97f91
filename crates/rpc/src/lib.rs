//! Typed synchronous RPC between services.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload.
//! Requests are a service-specific enum; responses travel inside an
//! [`RpcFrame`] so errors cross the boundary as tagged kinds and streamed
//! responses have a chunk/end framing available.

mod client;
mod server;
mod wire;

pub use client::{call, call_with_timeout, DEFAULT_TIMEOUT};
pub use server::{serve, Servicer};
pub use wire::{read_frame, write_frame, MAX_FRAME_BYTES};

use serde::{Deserialize, Serialize};

use px_domain::ErrorKind;

/// Response framing. `Reply` terminates a unary call; `Chunk*`+`End`
/// carry a streamed response; `Error` terminates either with a tagged
/// error the caller re-maps into its local [`px_domain::Error`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum RpcFrame<T> {
    Reply(T),
    Chunk(T),
    End,
    Error { kind: ErrorKind, message: String },
}
