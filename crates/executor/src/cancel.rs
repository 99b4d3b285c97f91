//! Cooperative cancellation: per-job tokens in a single-owner registry.
//!
//! Each running job registers a `CancelToken`; the fanout listener looks
//! jobs up here and signals them. The task observes the signal at its
//! next suspension point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

/// A cancellation token checked by the job pipeline.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

struct Entry {
    user_id: Uuid,
    token: CancelToken,
}

/// In-process registry of running jobs on this executor instance.
#[derive(Default)]
pub struct RunningJobs {
    jobs: Mutex<HashMap<Uuid, Entry>>,
}

impl RunningJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job and get its cancel token.
    pub fn register(&self, job_id: Uuid, user_id: Uuid) -> CancelToken {
        let token = CancelToken::new();
        self.jobs.lock().insert(
            job_id,
            Entry {
                user_id,
                token: token.clone(),
            },
        );
        token
    }

    /// Deregister when the job settles (any outcome).
    pub fn remove(&self, job_id: Uuid) {
        self.jobs.lock().remove(&job_id);
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    /// Cancel `job_id` if it runs here AND the requester owns it.
    /// Returns true when a cancel signal was actually sent.
    pub fn cancel_if_owner(&self, job_id: Uuid, requesting_user: Uuid) -> bool {
        let jobs = self.jobs.lock();
        match jobs.get(&job_id) {
            Some(entry) if entry.user_id == requesting_user => {
                entry.token.cancel();
                true
            }
            Some(entry) => {
                tracing::error!(
                    %job_id,
                    owner = %entry.user_id,
                    requester = %requesting_user,
                    "unauthorized cancellation attempt ignored"
                );
                false
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_lifecycle() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn token_clone_shares_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn owner_can_cancel() {
        let registry = RunningJobs::new();
        let job_id = Uuid::new_v4();
        let owner = Uuid::new_v4();
        let token = registry.register(job_id, owner);

        assert!(registry.cancel_if_owner(job_id, owner));
        assert!(token.is_cancelled());
    }

    #[test]
    fn non_owner_cannot_cancel() {
        let registry = RunningJobs::new();
        let job_id = Uuid::new_v4();
        let token = registry.register(job_id, Uuid::new_v4());

        assert!(!registry.cancel_if_owner(job_id, Uuid::new_v4()));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn unknown_job_is_ignored() {
        let registry = RunningJobs::new();
        assert!(!registry.cancel_if_owner(Uuid::new_v4(), Uuid::new_v4()));
    }

    #[test]
    fn remove_clears_the_entry() {
        let registry = RunningJobs::new();
        let job_id = Uuid::new_v4();
        let owner = Uuid::new_v4();
        registry.register(job_id, owner);
        assert_eq!(registry.len(), 1);

        registry.remove(job_id);
        assert!(registry.is_empty());
        assert!(!registry.cancel_if_owner(job_id, owner));
        // A second remove is harmless.
        registry.remove(job_id);
    }

    #[test]
    fn duplicate_cancel_signals_once_each_but_stays_cancelled() {
        let registry = RunningJobs::new();
        let job_id = Uuid::new_v4();
        let owner = Uuid::new_v4();
        let token = registry.register(job_id, owner);

        assert!(registry.cancel_if_owner(job_id, owner));
        assert!(registry.cancel_if_owner(job_id, owner));
        assert!(token.is_cancelled());
    }
}
