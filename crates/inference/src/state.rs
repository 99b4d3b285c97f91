use std::sync::Arc;

use px_auth::{HasVerifier, TokenVerifier};
use px_bus::Publisher;
use px_domain::config::Settings;

use crate::tickets::TicketStore;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub publisher: Publisher,
    pub tickets: TicketStore,
    pub verifier: Arc<TokenVerifier>,
}

impl HasVerifier for AppState {
    fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }
}
