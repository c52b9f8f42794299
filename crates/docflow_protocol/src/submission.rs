//! The submission entity and its state machine vocabulary.

use chrono::{DateTime, Utc};
use docflow_ids::SubmissionId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Lifecycle state of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionState {
    Draft,
    PendingTeamLeader,
    PendingAdmin,
    Approved,
    RejectedByTeamLeader,
    RejectedByAdmin,
    Withdrawn,
}

impl SubmissionState {
    /// Terminal states leave the live queue and land in an archive.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Approved | Self::RejectedByTeamLeader | Self::RejectedByAdmin | Self::Withdrawn
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::PendingTeamLeader => "PENDING_TEAM_LEADER",
            Self::PendingAdmin => "PENDING_ADMIN",
            Self::Approved => "APPROVED",
            Self::RejectedByTeamLeader => "REJECTED_BY_TEAM_LEADER",
            Self::RejectedByAdmin => "REJECTED_BY_ADMIN",
            Self::Withdrawn => "WITHDRAWN",
        }
    }
}

impl fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of the file placement pipeline (C9) for an approved submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlacementOutcome {
    Delivered,
    Staged,
    ManualRequested,
}

/// One entry in a submission's append-only transition log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateHistoryEntry {
    pub state: SubmissionState,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A side effect (archive write, notification, placement) that failed after
/// the owning transition had already committed. Recorded, never reversed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SideEffectFailure {
    pub effect: String,
    pub at: DateTime<Utc>,
    pub reason: String,
}

/// The central entity: one uploaded artifact flowing through approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,

    pub submitter_username: String,
    pub submitter_team: String,

    pub original_filename: String,
    pub upload_path: PathBuf,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type_hint: Option<String>,

    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,

    pub state: SubmissionState,

    pub created_at: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tl_decided_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_decided_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tl_reviewer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tl_rejection_reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_reviewer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_rejection_reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub placement_outcome: Option<PlacementOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placement_target_path: Option<PathBuf>,

    #[serde(default)]
    pub state_history: Vec<StateHistoryEntry>,
    #[serde(default)]
    pub side_effect_failures: Vec<SideEffectFailure>,
}

impl Submission {
    /// Construct a freshly-submitted submission, already past `DRAFT` —
    /// creating and submitting happen as one step.
    #[allow(clippy::too_many_arguments)]
    pub fn new_submitted(
        id: SubmissionId,
        submitter_username: impl Into<String>,
        submitter_team: impl Into<String>,
        original_filename: impl Into<String>,
        upload_path: PathBuf,
        size_bytes: u64,
        content_type_hint: Option<String>,
        description: impl Into<String>,
        tags: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let state = SubmissionState::PendingTeamLeader;
        let submitter_username = submitter_username.into();
        let initial_actor = submitter_username.clone();
        Self {
            id,
            submitter_username,
            submitter_team: submitter_team.into(),
            original_filename: original_filename.into(),
            upload_path,
            size_bytes,
            content_type_hint,
            description: description.into(),
            tags,
            state,
            created_at: now,
            submitted_at: now,
            tl_decided_at: None,
            admin_decided_at: None,
            archived_at: None,
            tl_reviewer: None,
            tl_rejection_reason: None,
            admin_reviewer: None,
            admin_rejection_reason: None,
            placement_outcome: None,
            placement_target_path: None,
            state_history: vec![StateHistoryEntry {
                state,
                at: now,
                actor: Some(initial_actor),
                note: None,
            }],
            side_effect_failures: Vec::new(),
        }
    }

    /// Append a transition record, observing the timestamp inside the lock.
    /// Callers must hold the per-id lock before calling this.
    pub fn record_transition(
        &mut self,
        state: SubmissionState,
        at: DateTime<Utc>,
        actor: Option<String>,
        note: Option<String>,
    ) {
        self.state = state;
        self.state_history.push(StateHistoryEntry {
            state,
            at,
            actor,
            note,
        });
    }

    pub fn record_side_effect_failure(&mut self, effect: &str, at: DateTime<Utc>, reason: String) {
        self.side_effect_failures.push(SideEffectFailure {
            effect: effect.to_string(),
            at,
            reason,
        });
    }
}
