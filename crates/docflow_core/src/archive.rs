//! Archive Store (C5): three ring-buffered, append-only logs capped at
//! `archive_cap` entries (default 1000), one per terminal outcome kind.

use docflow_ids::SubmissionId;
use docflow_protocol::Submission;
use docflow_store::{DocPath, DocStore, StoreError};
use serde_json::Value;
use std::sync::Arc;

/// Which archive log a terminal submission lands in.
///
/// File names follow the filesystem layout's naming (`rejected_tl.json`,
/// not the `rejected_team_leader` name used elsewhere in prose). The data
/// model's invariants name `WITHDRAWN` alongside the other three terminal
/// states as requiring an archive record, so it gets its own ring here even
/// though the filesystem layout table only calls out three logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Approved,
    RejectedByAdmin,
    RejectedByTeamLeader,
    Withdrawn,
}

impl ArchiveKind {
    fn filename(self) -> &'static str {
        match self {
            Self::Approved => "approved.json",
            Self::RejectedByAdmin => "rejected_admin.json",
            Self::RejectedByTeamLeader => "rejected_tl.json",
            Self::Withdrawn => "withdrawn.json",
        }
    }
}

pub struct ArchiveStore {
    store: Arc<DocStore>,
    archive_cap: usize,
}

impl ArchiveStore {
    pub fn new(store: Arc<DocStore>, archive_cap: usize) -> Self {
        Self { store, archive_cap }
    }

    fn doc_for(kind: ArchiveKind) -> DocPath {
        DocPath::new(format!("approvals/archive/{}", kind.filename()))
    }

    /// Prepend `submission` to the front of the ring (newest-first),
    /// deduplicating by `submission_id` so replaying after a crash stays
    /// idempotent, and truncating to `archive_cap` entries.
    pub fn append(&self, kind: ArchiveKind, submission: &Submission) -> Result<(), StoreError> {
        let doc = Self::doc_for(kind);
        let record = serde_json::to_value(submission).expect("submission always serializes");
        let id = submission.id.clone();
        let cap = self.archive_cap;

        self.store.modify(&doc, false, move |value| {
            let mut entries = match value.take() {
                Value::Array(entries) => entries,
                Value::Null => Vec::new(),
                _ => Vec::new(),
            };
            entries.retain(|entry| entry_id(entry).as_deref() != Some(id.as_str()));
            entries.insert(0, record);
            entries.truncate(cap);
            *value = Value::Array(entries);
            Ok(())
        })
    }

    /// Read the archive ring for a given kind, newest first.
    pub fn list(&self, kind: ArchiveKind) -> Result<Vec<Submission>, StoreError> {
        let doc = Self::doc_for(kind);
        let value = self.store.read(&doc, false)?;
        match value {
            Value::Array(entries) => Ok(entries
                .into_iter()
                .filter_map(|entry| serde_json::from_value(entry).ok())
                .collect()),
            _ => Ok(Vec::new()),
        }
    }

    /// Whether `id` is present in the given archive, used by tests and the
    /// CLI to confirm a terminal submission landed where expected.
    pub fn contains(&self, kind: ArchiveKind, id: &SubmissionId) -> Result<bool, StoreError> {
        Ok(self.list(kind)?.iter().any(|s| &s.id == id))
    }
}

fn entry_id(entry: &Value) -> Option<String> {
    entry.get("id").and_then(|v| v.as_str()).map(str::to_string)
}
