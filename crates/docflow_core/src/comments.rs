//! Comment Store (C8): per-submission comment threads.
//!
//! Each submission's comment history lives in a single consolidated
//! document rather than split across multiple files dual-read at display
//! time.

use docflow_ids::SubmissionId;
use docflow_protocol::{Comment, Identity, Role};
use docflow_store::{DocPath, DocStore, StoreError};
use serde_json::Value;
use std::sync::Arc;

pub struct CommentStore {
    store: Arc<DocStore>,
}

impl CommentStore {
    pub fn new(store: Arc<DocStore>) -> Self {
        Self { store }
    }

    fn doc_for(submission_id: &SubmissionId) -> DocPath {
        DocPath::new(format!("approvals/comments/{}.json", submission_id.as_str()))
    }

    pub fn append(&self, comment: &Comment) -> Result<(), StoreError> {
        let doc = Self::doc_for(&comment.submission_id);
        let record = serde_json::to_value(comment).expect("comment always serializes");

        self.store.modify(&doc, false, move |value| {
            let mut entries = match value.take() {
                Value::Array(entries) => entries,
                _ => Vec::new(),
            };
            entries.push(record);
            *value = Value::Array(entries);
            Ok(())
        })
    }

    pub fn list(&self, submission_id: &SubmissionId) -> Result<Vec<Comment>, StoreError> {
        let doc = Self::doc_for(submission_id);
        let value = self.store.read(&doc, false)?;
        match value {
            Value::Array(entries) => Ok(entries
                .into_iter()
                .filter_map(|entry| serde_json::from_value(entry).ok())
                .collect()),
            _ => Ok(Vec::new()),
        }
    }

    /// Whether `viewer` may read this submission's comment thread: the
    /// submitter, any prior commenter, or a reviewer role currently holding
    /// standing to act on the submission.
    pub fn is_visible_to(
        &self,
        submission_id: &SubmissionId,
        submitter_username: &str,
        submitter_team: &str,
        viewer_username: &str,
        viewer_identity: &Identity,
    ) -> Result<bool, StoreError> {
        if viewer_username == submitter_username {
            return Ok(true);
        }
        match viewer_identity.role {
            Role::Admin => return Ok(true),
            Role::TeamLeader if viewer_identity.leads_team(submitter_team) => return Ok(true),
            _ => {}
        }
        let comments = self.list(submission_id)?;
        Ok(comments.iter().any(|c| c.author_username == viewer_username))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use docflow_ids::SubmissionId;

    #[test]
    fn append_then_list_preserves_order() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = CommentStore::new(Arc::new(DocStore::new(temp.path().to_path_buf())));
        let submission_id = SubmissionId::new();

        let first = Comment::new(submission_id.clone(), "alice", Role::User, "first", Utc::now());
        let second = Comment::new(submission_id.clone(), "tl_bob", Role::TeamLeader, "second", Utc::now());
        store.append(&first).unwrap();
        store.append(&second).unwrap();

        let list = store.list(&submission_id).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].body, "first");
        assert_eq!(list[1].body, "second");
    }

    #[test]
    fn visibility_covers_submitter_reviewer_and_prior_commenter() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = CommentStore::new(Arc::new(DocStore::new(temp.path().to_path_buf())));
        let submission_id = SubmissionId::new();
        store
            .append(&Comment::new(submission_id.clone(), "mallory", Role::User, "hi", Utc::now()))
            .unwrap();

        let tl_in_team = Identity::new(Role::TeamLeader, vec!["AGCC".to_string()]);
        let tl_other_team = Identity::new(Role::TeamLeader, vec!["KUSAKABE".to_string()]);
        let bystander = Identity::new(Role::User, vec![]);
        let prior_commenter = Identity::new(Role::User, vec![]);

        assert!(store
            .is_visible_to(&submission_id, "alice", "AGCC", "alice", &bystander)
            .unwrap());
        assert!(store
            .is_visible_to(&submission_id, "alice", "AGCC", "tl_bob", &tl_in_team)
            .unwrap());
        assert!(!store
            .is_visible_to(&submission_id, "alice", "AGCC", "tl_carol", &tl_other_team)
            .unwrap());
        assert!(store
            .is_visible_to(&submission_id, "alice", "AGCC", "mallory", &prior_commenter)
            .unwrap());
        assert!(!store
            .is_visible_to(&submission_id, "alice", "AGCC", "random", &bystander)
            .unwrap());
    }
}
