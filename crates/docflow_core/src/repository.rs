//! The Approval Repository (C4): the submission state machine plus the
//! locking discipline that protects it.
//!
//! Two lock layers guard every transition, acquired in a fixed order: the
//! in-process per-submission `tokio::sync::Mutex` first, then the
//! cross-process advisory file lock `docflow_store::DocStore` takes around
//! the queue document. The guard table is created lazily and never pruned —
//! bounded by total submissions ever created, a convenience acceptable for
//! a single queue document.

use docflow_ids::SubmissionId;
use docflow_protocol::{Submission, SubmissionState};
use docflow_store::{DocPath, DocStore, StoreError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("submission {0} not found")]
    NotFound(SubmissionId),

    #[error("illegal transition on {id}: cannot move from {from} as requested")]
    IllegalTransition {
        id: SubmissionId,
        from: SubmissionState,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("queue document is malformed: {0}")]
    Malformed(String),
}

/// Owns the live queue document (`approvals/queue.json`) and the
/// in-process mutex table that serializes same-process callers before they
/// ever contend on the file lock.
pub struct SubmissionRepository {
    store: Arc<DocStore>,
    queue_doc: DocPath,
    guards: StdMutex<HashMap<SubmissionId, Arc<AsyncMutex<()>>>>,
}

impl SubmissionRepository {
    pub fn new(store: Arc<DocStore>, queue_doc: DocPath) -> Self {
        Self {
            store,
            queue_doc,
            guards: StdMutex::new(HashMap::new()),
        }
    }

    /// Acquire the per-submission in-process lock, creating its entry in
    /// the guard table on first use.
    async fn lock(&self, id: &SubmissionId) -> OwnedMutexGuard<()> {
        let guard_mutex = {
            let mut guards = self.guards.lock().expect("guard table mutex poisoned");
            guards
                .entry(id.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        guard_mutex.lock_owned().await
    }

    /// Non-locking read of a single submission, by id, from the live queue.
    /// May race a concurrent `transition`; callers needing a consistent
    /// view should go through `transition`.
    pub fn get(&self, id: &SubmissionId) -> Result<Submission, RepositoryError> {
        let map = self.read_queue()?;
        map.get(id.as_str())
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.clone()))
    }

    pub fn list(&self) -> Result<Vec<Submission>, RepositoryError> {
        let map = self.read_queue()?;
        Ok(map.into_values().collect())
    }

    /// Insert a brand-new submission (C10's `Submit`). Acquires the
    /// submission's own lock even though nothing else can yet be racing on
    /// a freshly-minted id, for the same reason every other mutator does:
    /// uniform lock discipline is easier to reason about than an
    /// insert-is-special exception.
    pub async fn insert_new(&self, submission: Submission) -> Result<(), RepositoryError> {
        let id = submission.id.clone();
        let _guard = self.lock(&id).await;

        self.store.modify(&self.queue_doc, false, move |value| {
            Ok::<_, StoreError>(Self::do_insert(value, id, submission))
        })?
    }

    fn do_insert(
        value: &mut serde_json::Value,
        id: SubmissionId,
        submission: Submission,
    ) -> Result<(), RepositoryError> {
        let mut map = parse_queue(value)?;
        map.insert(id.as_str().to_string(), submission);
        *value = serde_json::to_value(&map).expect("submission map always serializes");
        Ok(())
    }

    /// Validate-then-mutate a single submission under its lock.
    ///
    /// Re-reads the current state after acquiring both locks; if
    /// `current_state` is not in `allowed_from`, fails with
    /// `IllegalTransition` and leaves the document untouched. `mutate` is
    /// responsible for calling `Submission::record_transition` (or leaving
    /// the state as-is, for non-transitioning mutations like adding a
    /// comment reference). When the resulting state is terminal, the entry
    /// is removed from the live queue in the same write.
    pub async fn transition<F>(
        &self,
        id: &SubmissionId,
        allowed_from: &[SubmissionState],
        mutate: F,
    ) -> Result<Submission, RepositoryError>
    where
        F: FnOnce(&mut Submission) -> Result<(), RepositoryError>,
    {
        let _guard = self.lock(id).await;
        let id = id.clone();
        let allowed_from = allowed_from.to_vec();

        let outcome: Result<Submission, RepositoryError> =
            self.store.modify(&self.queue_doc, false, move |value| {
                Ok::<_, StoreError>(Self::do_transition(value, &id, &allowed_from, mutate))
            })?;
        outcome
    }

    fn do_transition<F>(
        value: &mut serde_json::Value,
        id: &SubmissionId,
        allowed_from: &[SubmissionState],
        mutate: F,
    ) -> Result<Submission, RepositoryError>
    where
        F: FnOnce(&mut Submission) -> Result<(), RepositoryError>,
    {
        let mut map = parse_queue(value)?;
        let mut submission = map
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.clone()))?;

        if !allowed_from.contains(&submission.state) {
            return Err(RepositoryError::IllegalTransition {
                id: id.clone(),
                from: submission.state,
            });
        }

        mutate(&mut submission)?;

        if submission.state.is_terminal() {
            map.remove(id.as_str());
        } else {
            map.insert(id.as_str().to_string(), submission.clone());
        }
        *value = serde_json::to_value(&map).expect("submission map always serializes");
        Ok(submission)
    }

    /// Apply a mutation that does not need to change the live/terminal
    /// status of the entry, re-checked against whatever state the
    /// submission is actually in when the lock is acquired (used to record
    /// a `side_effect_failures` entry on an otherwise-unchanged submission).
    pub async fn update<F>(&self, id: &SubmissionId, mutate: F) -> Result<Submission, RepositoryError>
    where
        F: FnOnce(&mut Submission) -> Result<(), RepositoryError>,
    {
        let all_states = [
            SubmissionState::Draft,
            SubmissionState::PendingTeamLeader,
            SubmissionState::PendingAdmin,
            SubmissionState::Approved,
            SubmissionState::RejectedByTeamLeader,
            SubmissionState::RejectedByAdmin,
            SubmissionState::Withdrawn,
        ];
        self.transition(id, &all_states, mutate).await
    }

    fn read_queue(&self) -> Result<HashMap<String, Submission>, RepositoryError> {
        let mut value = self.store.read(&self.queue_doc, false)?;
        parse_queue(&mut value)
    }
}

fn parse_queue(value: &mut serde_json::Value) -> Result<HashMap<String, Submission>, RepositoryError> {
    if value.is_null() {
        return Ok(HashMap::new());
    }
    serde_json::from_value(value.clone()).map_err(|err| RepositoryError::Malformed(err.to_string()))
}
