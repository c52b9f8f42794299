//! Per-submission comment threads (C8).

use crate::identity::Role;
use chrono::{DateTime, Utc};
use docflow_ids::{CommentId, SubmissionId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub submission_id: SubmissionId,
    pub author_username: String,
    pub author_role: Role,
    pub body: String,
    pub at: DateTime<Utc>,
}

impl Comment {
    pub fn new(
        submission_id: SubmissionId,
        author_username: impl Into<String>,
        author_role: Role,
        body: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        let author_username = author_username.into();
        let body = body.into();
        let id = CommentId::derive(&[
            submission_id.as_str(),
            &at.to_rfc3339(),
            &author_username,
            &body,
        ]);
        Self {
            id,
            submission_id,
            author_username,
            author_role,
            body,
            at,
        }
    }
}
