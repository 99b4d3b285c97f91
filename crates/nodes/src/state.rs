use std::sync::Arc;

use px_auth::{HasVerifier, TokenVerifier};
use px_domain::config::Settings;

use crate::service::NodeService;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub service: Arc<NodeService>,
    pub verifier: Arc<TokenVerifier>,
}

impl HasVerifier for AppState {
    fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }
}
