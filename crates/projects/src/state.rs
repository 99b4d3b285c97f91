use std::sync::Arc;

use px_auth::{HasVerifier, TokenVerifier};
use px_bus::Publisher;
use px_domain::config::Settings;
use px_saga::SagaStore;

use crate::store::ProjectStore;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub projects: ProjectStore,
    pub sagas: SagaStore,
    pub publisher: Publisher,
    pub verifier: Arc<TokenVerifier>,
}

impl HasVerifier for AppState {
    fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }
}
