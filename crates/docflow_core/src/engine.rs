//! Approval Engine (C10): the public operations panels call, composing
//! every other component into a single authorization-checked surface.

use crate::archive::{ArchiveKind, ArchiveStore};
use crate::comments::CommentStore;
use crate::metadata::MetadataStore;
use crate::notify::NotificationService;
use crate::placement::PlacementPipeline;
use crate::repository::{RepositoryError, SubmissionRepository};
use chrono::Utc;
use docflow_fs::Resolver;
use docflow_ids::{NotificationId, SubmissionId};
use docflow_identity::IdentityProvider;
use docflow_protocol::{
    Comment, EngineError, EngineResult, Identity, Notification, NotificationKind, Role, Submission,
    SubmissionState,
};
use docflow_store::{DocPath, DocStore, StoreError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

const MAX_FILENAME_LEN: usize = 255;
const MAX_REASON_LEN: usize = 2000;

/// Caller-supplied restriction applied on top of the role-scoped visibility
/// predicate in `list`.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub state: Option<SubmissionState>,
    pub team: Option<String>,
    pub submitter: Option<String>,
    pub text: Option<String>,
    pub sort: SortKey,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    SubmittedAtDesc,
    SubmittedAtAsc,
}

/// The filtered submissions plus a count over that same filtered result,
/// not the full queue — stat cards should reflect what's actually shown.
#[derive(Debug, Clone)]
pub struct ListResult {
    pub submissions: Vec<Submission>,
    pub total: usize,
}

pub struct ApprovalEngine {
    repository: SubmissionRepository,
    archive: ArchiveStore,
    metadata: Arc<MetadataStore>,
    notifications: NotificationService,
    comments: CommentStore,
    placement: PlacementPipeline,
    identity: Arc<dyn IdentityProvider>,
    resolver: Arc<Resolver>,
    allow_local_fallback_writes: bool,
}

impl ApprovalEngine {
    pub fn new(
        resolver: Arc<Resolver>,
        identity: Arc<dyn IdentityProvider>,
        archive_cap: usize,
        allow_local_fallback_writes: bool,
    ) -> Self {
        let store = Arc::new(DocStore::new(resolver.shared_root()));
        let metadata = Arc::new(MetadataStore::new(resolver.clone()));
        Self {
            repository: SubmissionRepository::new(store.clone(), DocPath::new("approvals/queue.json")),
            archive: ArchiveStore::new(store.clone(), archive_cap),
            metadata: metadata.clone(),
            notifications: NotificationService::new(store.clone()),
            comments: CommentStore::new(store.clone()),
            placement: PlacementPipeline::new(resolver.clone(), metadata, store),
            identity,
            resolver,
            allow_local_fallback_writes,
        }
    }

    pub fn degraded(&self) -> bool {
        self.resolver.degraded()
    }

    fn ensure_writable(&self) -> EngineResult<()> {
        if self.resolver.degraded() && !self.allow_local_fallback_writes {
            return Err(EngineError::StoreUnavailable {
                reason: "network root unreachable; local fallback writes are not enabled".to_string(),
            });
        }
        Ok(())
    }

    /// Every public operation accepts an optional deadline and checks it
    /// before each I/O it is about to perform; an already-passed deadline
    /// raises `Deadline` rather than starting work that cannot finish in
    /// time for a caller that has already given up.
    fn check_deadline(deadline: Option<Instant>, operation: &'static str) -> EngineResult<()> {
        match deadline {
            Some(deadline) if Instant::now() >= deadline => Err(EngineError::Deadline { operation }),
            _ => Ok(()),
        }
    }

    fn identity_for(&self, username: &str) -> EngineResult<Identity> {
        self.identity
            .get_identity(username)
            .map_err(|err| match err {
                docflow_identity::IdentityError::UnknownUser(username) => {
                    EngineError::UnknownUser { username }
                }
                docflow_identity::IdentityError::StoreUnavailable(store_err) => {
                    map_store_error(store_err)
                }
                docflow_identity::IdentityError::BadRole { username, role } => EngineError::BadInput {
                    reason: format!("user {username} has an unrecognized role '{role}'"),
                },
            })
    }

    fn map_transition_error(err: RepositoryError, attempted: &'static str) -> EngineError {
        match err {
            RepositoryError::IllegalTransition { id, from } => EngineError::IllegalTransition {
                id,
                from: from.to_string(),
                attempted: attempted.to_string(),
            },
            other => map_repository_error(other),
        }
    }

    /// Creates a new submission in `DRAFT` and immediately submits it,
    /// landing in `PENDING_TEAM_LEADER`.
    #[allow(clippy::too_many_arguments)]
    pub async fn submit(
        &self,
        actor: &str,
        upload_path: PathBuf,
        original_filename: &str,
        size_bytes: u64,
        content_type_hint: Option<String>,
        description: impl Into<String>,
        tags: Vec<String>,
        deadline: Option<Instant>,
    ) -> EngineResult<Submission> {
        self.ensure_writable()?;
        if original_filename.len() > MAX_FILENAME_LEN {
            return Err(EngineError::BadInput {
                reason: format!("filename exceeds {MAX_FILENAME_LEN} characters"),
            });
        }
        docflow_fs::filename::validate(original_filename)
            .map_err(|err| EngineError::BadInput { reason: err.to_string() })?;

        Self::check_deadline(deadline, "submit")?;
        let identity = self.identity_for(actor)?;
        let team = identity.teams.first().cloned().ok_or_else(|| EngineError::BadInput {
            reason: format!("user {actor} has no team assignment"),
        })?;

        let now = Utc::now();
        let submission = Submission::new_submitted(
            SubmissionId::new(),
            actor,
            team.clone(),
            original_filename,
            upload_path,
            size_bytes,
            content_type_hint,
            description,
            tags,
            now,
        );
        Self::check_deadline(deadline, "submit")?;
        self.repository
            .insert_new(submission.clone())
            .await
            .map_err(map_repository_error)?;

        Self::check_deadline(deadline, "submit")?;
        let submitter_notification = Notification::new(
            submission.submitter_username.clone(),
            NotificationKind::SubmittedToTl,
            Some(submission.id.clone()),
            serde_json::json!({"filename": submission.original_filename}),
            now,
        );
        if let Err(err) = self.notifications.append(&submitter_notification) {
            warn!(error = %err, "failed to append submitted notification");
        }

        match self.identity.team_leaders(&team) {
            Ok(leaders) => {
                for leader in leaders {
                    let notification = Notification::new(
                        leader,
                        NotificationKind::SubmittedToTl,
                        Some(submission.id.clone()),
                        serde_json::json!({"filename": submission.original_filename}),
                        now,
                    );
                    if let Err(err) = self.notifications.append(&notification) {
                        warn!(error = %err, "failed to append team-leader submitted notification");
                    }
                }
            }
            Err(err) => warn!(error = %err, team = %team, "failed to resolve team leaders for fan-out"),
        }

        Ok(submission)
    }

    /// Withdraw(actor, id).
    pub async fn withdraw(&self, actor: &str, id: &SubmissionId, deadline: Option<Instant>) -> EngineResult<Submission> {
        self.ensure_writable()?;
        Self::check_deadline(deadline, "withdraw")?;
        self.identity_for(actor)?;
        Self::check_deadline(deadline, "withdraw")?;
        let current = self.repository.get(id).map_err(map_repository_error)?;
        if current.submitter_username != actor {
            return Err(EngineError::Forbidden {
                reason: format!("{actor} is not the submitter of {id}"),
            });
        }

        let actor_owned = actor.to_string();
        Self::check_deadline(deadline, "withdraw")?;
        let submission = self
            .repository
            .transition(id, &[SubmissionState::PendingTeamLeader], move |s| {
                let now = Utc::now();
                s.record_transition(SubmissionState::Withdrawn, now, Some(actor_owned.clone()), None);
                Ok(())
            })
            .await
            .map_err(|err| Self::map_transition_error(err, "withdraw"))?;

        Self::check_deadline(deadline, "withdraw")?;
        if let Err(err) = self.archive.append(ArchiveKind::Withdrawn, &submission) {
            warn!(error = %err, "failed to archive withdrawn submission");
        }
        Ok(submission)
    }

    /// TLApprove(actor, id).
    pub async fn tl_approve(&self, actor: &str, id: &SubmissionId, deadline: Option<Instant>) -> EngineResult<Submission> {
        self.ensure_writable()?;
        Self::check_deadline(deadline, "tl_approve")?;
        let identity = self.identity_for(actor)?;
        Self::check_deadline(deadline, "tl_approve")?;
        let current = self.repository.get(id).map_err(map_repository_error)?;
        self.require_team_leader(&identity, actor, &current.submitter_team)?;

        let actor_owned = actor.to_string();
        Self::check_deadline(deadline, "tl_approve")?;
        let mut submission = self
            .repository
            .transition(id, &[SubmissionState::PendingTeamLeader], move |s| {
                let now = Utc::now();
                s.tl_reviewer = Some(actor_owned.clone());
                s.tl_decided_at = Some(now);
                s.record_transition(SubmissionState::PendingAdmin, now, Some(actor_owned.clone()), None);
                Ok(())
            })
            .await
            .map_err(|err| Self::map_transition_error(err, "tl_approve"))?;

        Self::check_deadline(deadline, "tl_approve")?;
        self.notify_and_persist(id, &mut submission, NotificationKind::TlApproved).await;
        Ok(submission)
    }

    /// TLReject(actor, id, reason).
    pub async fn tl_reject(
        &self,
        actor: &str,
        id: &SubmissionId,
        reason: &str,
        deadline: Option<Instant>,
    ) -> EngineResult<Submission> {
        self.ensure_writable()?;
        let reason = validate_reason(reason)?;
        Self::check_deadline(deadline, "tl_reject")?;
        let identity = self.identity_for(actor)?;
        Self::check_deadline(deadline, "tl_reject")?;
        let current = self.repository.get(id).map_err(map_repository_error)?;
        self.require_team_leader(&identity, actor, &current.submitter_team)?;

        let actor_owned = actor.to_string();
        let reason_owned = reason.clone();
        Self::check_deadline(deadline, "tl_reject")?;
        let mut submission = self
            .repository
            .transition(id, &[SubmissionState::PendingTeamLeader], move |s| {
                let now = Utc::now();
                s.tl_reviewer = Some(actor_owned.clone());
                s.tl_rejection_reason = Some(reason_owned.clone());
                s.tl_decided_at = Some(now);
                s.record_transition(
                    SubmissionState::RejectedByTeamLeader,
                    now,
                    Some(actor_owned.clone()),
                    Some(reason_owned.clone()),
                );
                Ok(())
            })
            .await
            .map_err(|err| Self::map_transition_error(err, "tl_reject"))?;

        Self::check_deadline(deadline, "tl_reject")?;
        self.notify_local(&mut submission, NotificationKind::TlRejected);
        if let Err(err) = self.archive.append(ArchiveKind::RejectedByTeamLeader, &submission) {
            warn!(error = %err, "failed to archive team-leader-rejected submission");
        }
        Ok(submission)
    }

    /// AdminApprove(actor, id).
    pub async fn admin_approve(&self, actor: &str, id: &SubmissionId, deadline: Option<Instant>) -> EngineResult<Submission> {
        self.ensure_writable()?;
        Self::check_deadline(deadline, "admin_approve")?;
        let identity = self.identity_for(actor)?;
        if identity.role != Role::Admin {
            return Err(EngineError::Forbidden {
                reason: format!("{actor} is not an administrator"),
            });
        }

        let actor_owned = actor.to_string();
        Self::check_deadline(deadline, "admin_approve")?;
        let mut submission = self
            .repository
            .transition(id, &[SubmissionState::PendingAdmin], move |s| {
                let now = Utc::now();
                s.admin_reviewer = Some(actor_owned.clone());
                s.admin_decided_at = Some(now);
                s.record_transition(SubmissionState::Approved, now, Some(actor_owned.clone()), None);
                Ok(())
            })
            .await
            .map_err(|err| Self::map_transition_error(err, "admin_approve"))?;

        Self::check_deadline(deadline, "admin_approve")?;
        let attempt = self.placement.place(&submission);
        submission.placement_outcome = Some(attempt.outcome);
        submission.placement_target_path = attempt.target_path;
        if let Some(note) = attempt.side_effect_note {
            submission.record_side_effect_failure("placement", Utc::now(), note);
        }

        self.notify_local(&mut submission, NotificationKind::AdminApproved);
        if let Err(err) = self.archive.append(ArchiveKind::Approved, &submission) {
            warn!(error = %err, "failed to archive approved submission");
        }
        Ok(submission)
    }

    /// AdminReject(actor, id, reason).
    pub async fn admin_reject(
        &self,
        actor: &str,
        id: &SubmissionId,
        reason: &str,
        deadline: Option<Instant>,
    ) -> EngineResult<Submission> {
        self.ensure_writable()?;
        let reason = validate_reason(reason)?;
        Self::check_deadline(deadline, "admin_reject")?;
        let identity = self.identity_for(actor)?;
        if identity.role != Role::Admin {
            return Err(EngineError::Forbidden {
                reason: format!("{actor} is not an administrator"),
            });
        }

        let actor_owned = actor.to_string();
        let reason_owned = reason.clone();
        Self::check_deadline(deadline, "admin_reject")?;
        let mut submission = self
            .repository
            .transition(id, &[SubmissionState::PendingAdmin], move |s| {
                let now = Utc::now();
                s.admin_reviewer = Some(actor_owned.clone());
                s.admin_rejection_reason = Some(reason_owned.clone());
                s.admin_decided_at = Some(now);
                s.record_transition(
                    SubmissionState::RejectedByAdmin,
                    now,
                    Some(actor_owned.clone()),
                    Some(reason_owned.clone()),
                );
                Ok(())
            })
            .await
            .map_err(|err| Self::map_transition_error(err, "admin_reject"))?;

        Self::check_deadline(deadline, "admin_reject")?;
        self.notify_local(&mut submission, NotificationKind::AdminRejected);
        if let Err(err) = self.archive.append(ArchiveKind::RejectedByAdmin, &submission) {
            warn!(error = %err, "failed to archive admin-rejected submission");
        }
        Ok(submission)
    }

    /// AddComment(actor, id, body).
    pub fn add_comment(&self, actor: &str, id: &SubmissionId, body: &str, deadline: Option<Instant>) -> EngineResult<Comment> {
        self.ensure_writable()?;
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return Err(EngineError::BadInput {
                reason: "comment body must not be empty".to_string(),
            });
        }

        Self::check_deadline(deadline, "add_comment")?;
        let identity = self.identity_for(actor)?;
        Self::check_deadline(deadline, "add_comment")?;
        let submission = self.repository.get(id).map_err(map_repository_error)?;

        let visible = self
            .comments
            .is_visible_to(
                id,
                &submission.submitter_username,
                &submission.submitter_team,
                actor,
                &identity,
            )
            .map_err(map_store_error)?;
        if !visible {
            return Err(EngineError::Forbidden {
                reason: format!("{actor} cannot view submission {id}"),
            });
        }

        Self::check_deadline(deadline, "add_comment")?;
        let prior = self.comments.list(id).map_err(map_store_error)?;
        let comment = Comment::new(id.clone(), actor, identity.role, trimmed, Utc::now());
        self.comments.append(&comment).map_err(map_store_error)?;

        self.fan_out_comment_notifications(&submission, &comment, &prior);
        Ok(comment)
    }

    /// Read a submission's comment thread, subject to the same visibility
    /// rule `add_comment` enforces.
    pub fn list_comments(&self, actor: &str, id: &SubmissionId, deadline: Option<Instant>) -> EngineResult<Vec<Comment>> {
        Self::check_deadline(deadline, "list_comments")?;
        let identity = self.identity_for(actor)?;
        Self::check_deadline(deadline, "list_comments")?;
        let submission = self.repository.get(id).map_err(map_repository_error)?;
        let visible = self
            .comments
            .is_visible_to(
                id,
                &submission.submitter_username,
                &submission.submitter_team,
                actor,
                &identity,
            )
            .map_err(map_store_error)?;
        if !visible {
            return Err(EngineError::Forbidden {
                reason: format!("{actor} cannot view submission {id}"),
            });
        }
        Self::check_deadline(deadline, "list_comments")?;
        self.comments.list(id).map_err(map_store_error)
    }

    /// The metadata sidecar store, exposed directly since C6's `search`
    /// and `list` are leaf-level queries with no corresponding C10 op.
    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    fn fan_out_comment_notifications(&self, submission: &Submission, comment: &Comment, prior: &[Comment]) {
        let mut recipients: Vec<String> = Vec::new();
        if comment.author_username != submission.submitter_username {
            recipients.push(submission.submitter_username.clone());
        }
        for prior_comment in prior {
            if prior_comment.author_username != comment.author_username
                && !recipients.contains(&prior_comment.author_username)
            {
                recipients.push(prior_comment.author_username.clone());
            }
        }
        for recipient in recipients {
            let notification = Notification {
                id: Notification::comment_notification_id(&comment.id, &recipient),
                recipient_username: recipient,
                kind: NotificationKind::CommentAdded,
                submission_id: Some(submission.id.clone()),
                payload: serde_json::json!({"comment_id": comment.id.as_str(), "body": comment.body}),
                at: comment.at,
                read: false,
            };
            if let Err(err) = self.notifications.append(&notification) {
                warn!(error = %err, "failed to append comment notification");
            }
        }
    }

    /// Lists submissions visible to `actor` under the given filter.
    pub fn list(&self, actor: &str, filter: &ListFilter, deadline: Option<Instant>) -> EngineResult<ListResult> {
        Self::check_deadline(deadline, "list")?;
        let identity = self.identity_for(actor)?;
        Self::check_deadline(deadline, "list")?;
        let all = self.repository.list().map_err(map_repository_error)?;

        let mut visible: Vec<Submission> = all
            .into_iter()
            .filter(|s| match identity.role {
                Role::Admin => true,
                Role::TeamLeader => identity.teams.iter().any(|t| t == &s.submitter_team),
                Role::User => s.submitter_username == actor,
            })
            .collect();

        if let Some(state) = filter.state {
            visible.retain(|s| s.state == state);
        }
        if let Some(team) = &filter.team {
            visible.retain(|s| &s.submitter_team == team);
        }
        if let Some(submitter) = &filter.submitter {
            visible.retain(|s| &s.submitter_username == submitter);
        }
        if let Some(text) = &filter.text {
            let needle = text.to_lowercase();
            visible.retain(|s| {
                s.original_filename.to_lowercase().contains(&needle)
                    || s.description.to_lowercase().contains(&needle)
                    || s.submitter_username.to_lowercase().contains(&needle)
            });
        }

        match filter.sort {
            SortKey::SubmittedAtDesc => visible.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at)),
            SortKey::SubmittedAtAsc => visible.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at)),
        }

        let total = visible.len();
        Ok(ListResult { submissions: visible, total })
    }

    /// GetInbox(actor, unread_only?).
    pub fn get_inbox(&self, actor: &str, unread_only: bool, deadline: Option<Instant>) -> EngineResult<Vec<Notification>> {
        Self::check_deadline(deadline, "get_inbox")?;
        self.identity_for(actor)?;
        Self::check_deadline(deadline, "get_inbox")?;
        self.notifications.list(actor, unread_only).map_err(map_store_error)
    }

    /// MarkRead(actor, notification_id).
    pub fn mark_read(&self, actor: &str, notification_id: &NotificationId, deadline: Option<Instant>) -> EngineResult<()> {
        Self::check_deadline(deadline, "mark_read")?;
        self.identity_for(actor)?;
        Self::check_deadline(deadline, "mark_read")?;
        let found = self
            .notifications
            .mark_read(actor, notification_id)
            .map_err(map_store_error)?;
        if !found {
            return Err(EngineError::NotFound {
                what: "notification",
                id: notification_id.to_string(),
            });
        }
        Ok(())
    }

    /// Re-attempt placement for every `STAGED`/`MANUAL_REQUESTED` submission
    /// currently sitting in an archive ring, promoting to `DELIVERED` where
    /// possible. Invoked by the background retrier on its sweep interval.
    pub fn retry_stalled_placements(&self) -> Vec<SubmissionId> {
        let mut promoted = Vec::new();
        let stalled = match self.archive.list(ArchiveKind::Approved) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(error = %err, "failed to read approved archive for placement retry");
                return promoted;
            }
        };

        for mut submission in stalled {
            if let Some(attempt) = self.placement.retry(&submission) {
                submission.placement_outcome = Some(attempt.outcome);
                submission.placement_target_path = attempt.target_path;
                if let Err(err) = self.archive.append(ArchiveKind::Approved, &submission) {
                    warn!(error = %err, "failed to persist promoted placement outcome");
                    continue;
                }
                promoted.push(submission.id);
            }
        }
        promoted
    }

    fn require_team_leader(&self, identity: &Identity, actor: &str, team: &str) -> EngineResult<()> {
        if identity.role == Role::TeamLeader && identity.teams.iter().any(|t| t == team) {
            Ok(())
        } else {
            Err(EngineError::Forbidden {
                reason: format!("{actor} is not a team leader for {team}"),
            })
        }
    }

    fn notify_local(&self, submission: &mut Submission, kind: NotificationKind) {
        let notification = Notification::new(
            submission.submitter_username.clone(),
            kind,
            Some(submission.id.clone()),
            serde_json::json!({"filename": submission.original_filename}),
            Utc::now(),
        );
        if let Err(err) = self.notifications.append(&notification) {
            warn!(error = %err, "failed to append notification");
            submission.record_side_effect_failure("notification", Utc::now(), err.to_string());
        }
    }

    /// Like `notify_local`, but the submission is still live in the queue
    /// (non-terminal transition), so a recorded failure must be persisted
    /// back rather than folded into a copy that's about to be archived.
    async fn notify_and_persist(&self, id: &SubmissionId, submission: &mut Submission, kind: NotificationKind) {
        let notification = Notification::new(
            submission.submitter_username.clone(),
            kind,
            Some(submission.id.clone()),
            serde_json::json!({"filename": submission.original_filename}),
            Utc::now(),
        );
        if let Err(err) = self.notifications.append(&notification) {
            warn!(error = %err, "failed to append notification");
            let reason = err.to_string();
            if let Err(update_err) = self
                .repository
                .update(id, move |s| {
                    s.record_side_effect_failure("notification", Utc::now(), reason.clone());
                    Ok(())
                })
                .await
            {
                warn!(error = %update_err, "failed to record notification side-effect failure");
            } else {
                submission.record_side_effect_failure("notification", Utc::now(), err.to_string());
            }
        }
    }
}

fn validate_reason(reason: &str) -> EngineResult<String> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Err(EngineError::BadInput {
            reason: "rejection reason must not be empty".to_string(),
        });
    }
    if trimmed.chars().count() > MAX_REASON_LEN {
        return Err(EngineError::BadInput {
            reason: format!("rejection reason exceeds {MAX_REASON_LEN} characters"),
        });
    }
    Ok(trimmed.to_string())
}

fn map_repository_error(err: RepositoryError) -> EngineError {
    match err {
        RepositoryError::NotFound(id) => EngineError::NotFound {
            what: "submission",
            id: id.to_string(),
        },
        RepositoryError::IllegalTransition { id, from } => EngineError::IllegalTransition {
            id,
            from: from.to_string(),
            attempted: "transition".to_string(),
        },
        RepositoryError::Store(err) => map_store_error(err),
        RepositoryError::Malformed(msg) => EngineError::Corrupt { doc: msg },
    }
}

fn map_store_error(err: StoreError) -> EngineError {
    match err {
        StoreError::Unavailable { path, source } => EngineError::StoreUnavailable {
            reason: format!("{}: {}", path.display(), source),
        },
        StoreError::Corrupt { path, .. } => EngineError::Corrupt {
            doc: path.display().to_string(),
        },
        StoreError::LockFailed { path, source } => EngineError::StoreUnavailable {
            reason: format!("lock on {}: {}", path.display(), source),
        },
        StoreError::NotAnArray { path } => EngineError::Corrupt {
            doc: path.display().to_string(),
        },
    }
}

/// Retry wrapper for the caller-facing API: up to three attempts with
/// exponential backoff, only for `StoreUnavailable`/`Deadline`, bounded by
/// `deadline`.
pub async fn with_retry<T, F, Fut>(deadline: Option<Instant>, mut op: F) -> EngineResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = EngineResult<T>>,
{
    const MAX_ATTEMPTS: u32 = 3;
    let mut attempt: u32 = 0;
    let mut backoff = Duration::from_millis(50);

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                if let Some(deadline) = deadline {
                    if Instant::now() >= deadline {
                        return Err(EngineError::Deadline { operation: "with_retry" });
                    }
                }
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_identity::IdentityError;
    use docflow_protocol::{IdentitySource, SystemConfig};
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    struct StubIdentity {
        roster: HashMap<&'static str, Identity>,
    }

    impl StubIdentity {
        fn seeded() -> Self {
            let mut roster = HashMap::new();
            roster.insert("alice", Identity::new(Role::User, vec!["AGCC".to_string()]));
            roster.insert("tl_bob", Identity::new(Role::TeamLeader, vec!["AGCC".to_string()]));
            roster.insert(
                "tl_carol",
                Identity::new(Role::TeamLeader, vec!["KUSAKABE".to_string()]),
            );
            roster.insert("admin", Identity::new(Role::Admin, vec![]));
            Self { roster }
        }
    }

    impl IdentityProvider for StubIdentity {
        fn get_identity(&self, username: &str) -> Result<Identity, IdentityError> {
            self.roster
                .get(username)
                .cloned()
                .ok_or_else(|| IdentityError::UnknownUser(username.to_string()))
        }

        fn team_leaders(&self, team: &str) -> Result<Vec<String>, IdentityError> {
            Ok(self
                .roster
                .iter()
                .filter(|(_, identity)| identity.leads_team(team))
                .map(|(username, _)| username.to_string())
                .collect())
        }
    }

    fn engine(temp: &TempDir) -> ApprovalEngine {
        let config = SystemConfig {
            network_root: temp.path().join("network"),
            local_fallback_root: temp.path().join("fallback"),
            project_root: temp.path().join("projects"),
            archive_cap: 1000,
            probe_cache: Duration::from_secs(30),
            retry_interval: Duration::from_secs(60),
            identity_source: IdentitySource::File(temp.path().join("roster.json")),
        };
        let resolver = Arc::new(Resolver::new(config));
        ApprovalEngine::new(resolver, Arc::new(StubIdentity::seeded()), 1000, false)
    }

    fn seed_upload(temp: &TempDir, username: &str, filename: &str) -> PathBuf {
        let path = temp.path().join("uploads").join(username).join(filename);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"hello world").unwrap();
        path
    }

    #[tokio::test]
    async fn happy_path_submit_tl_approve_admin_approve_delivers_artifact() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        let upload_path = seed_upload(&temp, "alice", "spec.pdf");

        let submission = engine
            .submit(
                "alice",
                upload_path,
                "spec.pdf",
                11,
                None,
                "quarterly spec",
                vec![],
                None,
            )
            .await
            .unwrap();

        let listed = engine.list("alice", &ListFilter::default(), None).unwrap();
        assert_eq!(listed.total, 1);
        assert_eq!(listed.submissions[0].state, SubmissionState::PendingTeamLeader);

        let tl_listed = engine.list("tl_bob", &ListFilter::default(), None).unwrap();
        assert_eq!(tl_listed.total, 1);

        let after_tl = engine.tl_approve("tl_bob", &submission.id, None).await.unwrap();
        assert_eq!(after_tl.state, SubmissionState::PendingAdmin);
        let inbox = engine.get_inbox("alice", false, None).unwrap();
        assert!(inbox.iter().any(|n| n.kind == NotificationKind::TlApproved));

        let tl_inbox = engine.get_inbox("tl_bob", false, None).unwrap();
        assert!(tl_inbox.iter().any(|n| n.kind == NotificationKind::SubmittedToTl));

        let approved = engine.admin_approve("admin", &submission.id, None).await.unwrap();
        assert_eq!(approved.state, SubmissionState::Approved);
        assert_eq!(approved.placement_outcome, Some(docflow_protocol::PlacementOutcome::Delivered));
        assert!(approved.placement_target_path.as_ref().unwrap().exists());

        let inbox = engine.get_inbox("alice", false, None).unwrap();
        assert!(inbox.iter().any(|n| n.kind == NotificationKind::AdminApproved));
    }

    #[tokio::test]
    async fn wrong_team_leader_is_forbidden() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        let upload_path = seed_upload(&temp, "alice", "spec.pdf");
        let submission = engine
            .submit("alice", upload_path, "spec.pdf", 11, None, "", vec![], None)
            .await
            .unwrap();

        let err = engine.tl_approve("tl_carol", &submission.id, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Forbidden { .. }));

        let unchanged = engine.repository.get(&submission.id).unwrap();
        assert_eq!(unchanged.state, SubmissionState::PendingTeamLeader);
    }

    #[tokio::test]
    async fn concurrent_tl_approve_yields_exactly_one_success() {
        let temp = TempDir::new().unwrap();
        let engine = Arc::new(engine(&temp));
        let upload_path = seed_upload(&temp, "alice", "spec.pdf");
        let submission = engine
            .submit("alice", upload_path, "spec.pdf", 11, None, "", vec![], None)
            .await
            .unwrap();

        let id_a = submission.id.clone();
        let id_b = submission.id.clone();
        let engine_a = engine.clone();
        let engine_b = engine.clone();

        let (first, second) = tokio::join!(
            tokio::spawn(async move { engine_a.tl_approve("tl_bob", &id_a, None).await }),
            tokio::spawn(async move { engine_b.tl_approve("tl_bob", &id_b, None).await }),
        );
        let results = [first.unwrap(), second.unwrap()];
        let ok_count = results.iter().filter(|r| r.is_ok()).count();
        let illegal_count = results
            .iter()
            .filter(|r| matches!(r, Err(EngineError::IllegalTransition { .. })))
            .count();
        assert_eq!(ok_count, 1);
        assert_eq!(illegal_count, 1);

        let inbox = engine.get_inbox("alice", false, None).unwrap();
        assert_eq!(
            inbox.iter().filter(|n| n.kind == NotificationKind::TlApproved).count(),
            1
        );
    }

    #[tokio::test]
    async fn reject_without_reason_is_bad_input() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        let upload_path = seed_upload(&temp, "alice", "spec.pdf");
        let submission = engine
            .submit("alice", upload_path, "spec.pdf", 11, None, "", vec![], None)
            .await
            .unwrap();
        engine.tl_approve("tl_bob", &submission.id, None).await.unwrap();

        let err = engine.admin_reject("admin", &submission.id, "", None).await.unwrap_err();
        assert!(matches!(err, EngineError::BadInput { .. }));

        let unchanged = engine.repository.get(&submission.id).unwrap();
        assert_eq!(unchanged.state, SubmissionState::PendingAdmin);
    }

    #[tokio::test]
    async fn archive_caps_at_configured_size() {
        let temp = TempDir::new().unwrap();
        let config = SystemConfig {
            network_root: temp.path().join("network"),
            local_fallback_root: temp.path().join("fallback"),
            project_root: temp.path().join("projects"),
            archive_cap: 3,
            probe_cache: Duration::from_secs(30),
            retry_interval: Duration::from_secs(60),
            identity_source: IdentitySource::File(temp.path().join("roster.json")),
        };
        let resolver = Arc::new(Resolver::new(config));
        let engine = ApprovalEngine::new(resolver, Arc::new(StubIdentity::seeded()), 3, false);

        for i in 0..5 {
            let filename = format!("doc{i}.pdf");
            let upload_path = seed_upload(&temp, "alice", &filename);
            let submission = engine
                .submit("alice", upload_path, &filename, 11, None, "", vec![], None)
                .await
                .unwrap();
            engine.tl_approve("tl_bob", &submission.id, None).await.unwrap();
            engine.admin_approve("admin", &submission.id, None).await.unwrap();
        }

        let approved = engine.archive.list(ArchiveKind::Approved).unwrap();
        assert_eq!(approved.len(), 3);
    }

    #[tokio::test]
    async fn deadline_already_passed_is_rejected_before_any_io() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        let past = Instant::now() - Duration::from_secs(1);

        let err = engine.list("alice", &ListFilter::default(), Some(past)).unwrap_err();
        assert!(matches!(err, EngineError::Deadline { operation: "list" }));
    }
}
