use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The authenticated caller, synthesized from verified token claims.
///
/// Services that do not own the user table never look this up in a
/// database; the claims are the source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub is_staff: bool,
}

impl Principal {
    pub fn user(id: Uuid) -> Self {
        Self {
            id,
            is_staff: false,
        }
    }

    pub fn staff(id: Uuid) -> Self {
        Self { id, is_staff: true }
    }
}
