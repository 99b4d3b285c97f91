//! Shared domain types for all Plexus crates: identifiers, principals,
//! error kinds, model capabilities, chat types, and environment settings.

pub mod capability;
pub mod chat;
pub mod config;
pub mod error;
pub mod principal;
pub mod stream;
pub mod telemetry;

pub use error::{Error, ErrorKind, Result};
pub use principal::Principal;
