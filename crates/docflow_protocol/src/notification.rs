//! Per-recipient notification feed (C7).

use chrono::{DateTime, Utc};
use docflow_ids::{NotificationId, SubmissionId};
use serde::{Deserialize, Serialize};

/// The event kind driving a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    TlApproved,
    TlRejected,
    AdminApproved,
    AdminRejected,
    CommentAdded,
    SubmittedToTl,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TlApproved => "TL_APPROVED",
            Self::TlRejected => "TL_REJECTED",
            Self::AdminApproved => "ADMIN_APPROVED",
            Self::AdminRejected => "ADMIN_REJECTED",
            Self::CommentAdded => "COMMENT_ADDED",
            Self::SubmittedToTl => "SUBMITTED_TO_TL",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient_username: String,
    pub kind: NotificationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<SubmissionId>,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

impl Notification {
    /// Build a notification whose id is derived as
    /// `hash(submission_id, kind, decided_at, recipient)`, so retried
    /// deliveries to the same recipient for the same transition dedupe
    /// cleanly.
    pub fn new(
        recipient_username: impl Into<String>,
        kind: NotificationKind,
        submission_id: Option<SubmissionId>,
        payload: serde_json::Value,
        at: DateTime<Utc>,
    ) -> Self {
        let recipient_username = recipient_username.into();
        let sub_key = submission_id.as_ref().map(|s| s.as_str()).unwrap_or("");
        let id = NotificationId::derive(&[
            sub_key,
            kind.as_str(),
            &at.to_rfc3339(),
            &recipient_username,
        ]);
        Self {
            id,
            recipient_username,
            kind,
            submission_id,
            payload,
            at,
            read: false,
        }
    }

    /// Derive the id for a comment-driven notification, which dedupes by
    /// `comment_id` alone rather than by `(submission, kind, timestamp)`.
    pub fn comment_notification_id(
        comment_id: &docflow_ids::CommentId,
        recipient_username: &str,
    ) -> NotificationId {
        NotificationId::derive(&[comment_id.as_str(), recipient_username])
    }
}
