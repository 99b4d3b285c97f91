use std::sync::Arc;

use px_auth::{HasVerifier, TokenVerifier};
use px_bus::Publisher;
use px_domain::config::Settings;

use crate::object_store::ObjectStore;
use crate::store::FileStore;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub files: FileStore,
    pub objects: Arc<dyn ObjectStore>,
    pub publisher: Publisher,
    pub verifier: Arc<TokenVerifier>,
}

impl AppState {
    /// Externally reachable URL for a file's raw bytes (image inputs are
    /// handed to model providers as URLs).
    pub fn raw_url(&self, file_id: uuid::Uuid) -> String {
        format!("{}/files/{file_id}/raw", self.settings.data_public_url)
    }
}

impl HasVerifier for AppState {
    fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }
}
