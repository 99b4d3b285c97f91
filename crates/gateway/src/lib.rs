//! Result delivery gateway: ticket-authenticated WebSockets and the
//! fan-out consumer that routes per-job result events to them.

pub mod consumer;
pub mod registry;
pub mod tickets;
pub mod ws;
