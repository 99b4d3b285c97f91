//! Wire types shared across Plexus processes: event payloads and routing
//! constants, RPC request/response enums per service, the inference job
//! payload, and rich memory message content.
//!
//! Everything here crosses a process boundary; breaking changes require a
//! `schema_version` bump on the event envelope.

pub mod events;
pub mod job;
pub mod memory;
pub mod rpc;
pub mod tickets;
