//! Node service: the two-stage node lifecycle (draft → configure-model),
//! capability-driven configuration templates, the values-only update path
//! with its cross-service validation fan-out, the dependency healer, and
//! the project-cleanup worker.

pub mod api;
pub mod clients;
pub mod healer;
pub mod project_cleanup;
pub mod rpc;
pub mod service;
pub mod state;
pub mod store;
pub mod template;
