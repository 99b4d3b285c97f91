//! Saga store: durable state for cross-service deletions.
//!
//! A saga tracks one multi-service deletion; each participating service
//! owns a step that flips PENDING → COMPLETED when its confirmation event
//! arrives. Finalization (the hard delete) happens in the same transaction
//! as the last step flip, under a row lock on the saga, so duplicate and
//! out-of-order confirmations are harmless.

mod store;

pub use store::SagaStore;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaType {
    UserDeletion,
    ProjectDeletion,
}

impl SagaType {
    pub fn as_str(self) -> &'static str {
        match self {
            SagaType::UserDeletion => "user_deletion",
            SagaType::ProjectDeletion => "project_deletion",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaStatus {
    InProgress,
    Completed,
    Failed,
}

impl SagaStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SagaStatus::InProgress => "in_progress",
            SagaStatus::Completed => "completed",
            SagaStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone)]
pub struct Saga {
    pub id: Uuid,
    pub saga_type: SagaType,
    pub related_resource_id: Uuid,
    pub status: SagaStatus,
}

/// Result of applying one confirmation to a saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// No IN_PROGRESS saga for the resource: stale or duplicate event.
    UnknownSaga,
    /// The step was already COMPLETED; nothing changed.
    AlreadyComplete,
    /// The step was recorded; other steps remain PENDING.
    StepRecorded,
    /// This was the last pending step; the caller must finalize (hard
    /// delete) inside the same transaction.
    SagaComplete,
}

/// Pure decision core of `confirm_step`, shared with tests: given the
/// current step set, apply a confirmation for `service`.
pub fn apply_confirmation(
    steps: &mut Vec<(String, StepStatus)>,
    service: &str,
) -> StepOutcome {
    match steps.iter_mut().find(|(name, _)| name == service) {
        Some((_, status @ StepStatus::Pending)) => {
            *status = StepStatus::Completed;
        }
        Some((_, StepStatus::Completed)) => return StepOutcome::AlreadyComplete,
        None => {
            // A confirmation from a service the saga did not pre-register
            // still counts; record it as a completed step.
            steps.push((service.to_string(), StepStatus::Completed));
        }
    }

    if steps.iter().any(|(_, s)| *s == StepStatus::Pending) {
        StepOutcome::StepRecorded
    } else {
        StepOutcome::SagaComplete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps(names: &[&str]) -> Vec<(String, StepStatus)> {
        names
            .iter()
            .map(|n| (n.to_string(), StepStatus::Pending))
            .collect()
    }

    #[test]
    fn confirmations_complete_in_any_order() {
        let mut s = steps(&["NodeService", "MemoryService", "DataService"]);
        assert_eq!(apply_confirmation(&mut s, "DataService"), StepOutcome::StepRecorded);
        assert_eq!(apply_confirmation(&mut s, "NodeService"), StepOutcome::StepRecorded);
        assert_eq!(apply_confirmation(&mut s, "MemoryService"), StepOutcome::SagaComplete);
    }

    #[test]
    fn duplicate_confirmation_is_ignored() {
        let mut s = steps(&["NodeService", "MemoryService"]);
        assert_eq!(apply_confirmation(&mut s, "NodeService"), StepOutcome::StepRecorded);
        assert_eq!(apply_confirmation(&mut s, "NodeService"), StepOutcome::AlreadyComplete);
        // The duplicate did not complete the saga.
        assert_eq!(apply_confirmation(&mut s, "MemoryService"), StepOutcome::SagaComplete);
    }

    #[test]
    fn unregistered_service_is_recorded() {
        let mut s = steps(&["NodeService"]);
        assert_eq!(apply_confirmation(&mut s, "LateService"), StepOutcome::StepRecorded);
        assert_eq!(apply_confirmation(&mut s, "NodeService"), StepOutcome::SagaComplete);
    }

    #[test]
    fn single_step_saga_completes_immediately() {
        let mut s = steps(&["NodeService"]);
        assert_eq!(apply_confirmation(&mut s, "NodeService"), StepOutcome::SagaComplete);
    }
}
