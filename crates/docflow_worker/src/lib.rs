//! Background placement-retry worker.
//!
//! Periodically re-attempts delivery for submissions stuck `STAGED` or
//! `MANUAL_REQUESTED` on a configurable `retry_interval_seconds`. Runs an
//! event loop that logs and continues past a failed sweep rather than
//! aborting, since one bad sweep must never stop future retries from
//! running.

use docflow_core::ApprovalEngine;
use docflow_ids::SubmissionId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Handle to a running retrier task. Dropping or calling [`shutdown`] stops
/// the loop after its current sweep finishes.
pub struct RetrierHandle {
    shutdown_tx: watch::Sender<bool>,
    join: tokio::task::JoinHandle<()>,
}

impl RetrierHandle {
    /// Signal the loop to stop and wait for the current sweep to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.join.await;
    }
}

/// Spawn the background retrier on the current Tokio runtime.
///
/// `interval` should be `SystemConfig::retry_interval`; a sweep runs
/// immediately on spawn and then on every tick after that.
pub fn spawn(engine: Arc<ApprovalEngine>, interval: Duration) -> RetrierHandle {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it being a no-op wait so a
        // fresh process sweeps once at startup instead of waiting a full
        // interval for its first chance to promote a stalled placement.
        ticker.tick().await;

        info!(interval_secs = interval.as_secs(), "placement retrier started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    run_sweep(&engine);
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        info!("placement retrier stopped");
    });

    RetrierHandle { shutdown_tx, join }
}

/// Run one retry sweep synchronously, without spawning a task. Exposed for
/// the CLI's one-shot `retry-placements` command and for tests.
pub fn run_sweep(engine: &ApprovalEngine) -> Vec<SubmissionId> {
    let promoted = engine.retry_stalled_placements();
    if promoted.is_empty() {
        debug!("placement retry sweep promoted nothing");
    } else {
        info!(count = promoted.len(), "placement retry sweep promoted submissions to delivered");
    }
    for id in &promoted {
        debug!(submission_id = %id, "promoted to delivered");
    }
    promoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_fs::Resolver;
    use docflow_identity::{IdentityError, IdentityProvider};
    use docflow_protocol::{Identity, IdentitySource, Role, SystemConfig};
    use std::collections::HashMap;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct StubIdentity(HashMap<&'static str, Identity>);

    impl IdentityProvider for StubIdentity {
        fn get_identity(&self, username: &str) -> Result<Identity, IdentityError> {
            self.0
                .get(username)
                .cloned()
                .ok_or_else(|| IdentityError::UnknownUser(username.to_string()))
        }

        fn team_leaders(&self, team: &str) -> Result<Vec<String>, IdentityError> {
            Ok(self
                .0
                .iter()
                .filter(|(_, identity)| identity.leads_team(team))
                .map(|(username, _)| username.to_string())
                .collect())
        }
    }

    fn seeded_engine(temp: &TempDir) -> Arc<ApprovalEngine> {
        let mut roster = HashMap::new();
        roster.insert("alice", Identity::new(Role::User, vec!["AGCC".to_string()]));
        roster.insert("tl_bob", Identity::new(Role::TeamLeader, vec!["AGCC".to_string()]));
        roster.insert("admin", Identity::new(Role::Admin, vec![]));

        let config = SystemConfig {
            network_root: temp.path().join("network"),
            local_fallback_root: temp.path().join("fallback"),
            project_root: temp.path().join("projects"),
            archive_cap: 1000,
            probe_cache: Duration::from_secs(30),
            retry_interval: Duration::from_millis(20),
            identity_source: IdentitySource::File(temp.path().join("roster.json")),
        };
        let resolver = Arc::new(Resolver::new(config));
        Arc::new(ApprovalEngine::new(resolver, Arc::new(StubIdentity(roster)), 1000, false))
    }

    fn seed_upload(temp: &TempDir, filename: &str) -> PathBuf {
        let path = temp.path().join("uploads/alice").join(filename);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"hello").unwrap();
        path
    }

    #[tokio::test]
    async fn sweep_promotes_staged_submission_once_project_root_is_writable() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let engine = seeded_engine(&temp);
        let project_root = temp.path().join("projects");
        fs::create_dir_all(&project_root).unwrap();
        fs::set_permissions(&project_root, fs::Permissions::from_mode(0o500)).unwrap();

        let upload_path = seed_upload(&temp, "report.pdf");
        let submission = engine
            .submit("alice", upload_path, "report.pdf", 5, None, "", vec![], None)
            .await
            .unwrap();
        engine.tl_approve("tl_bob", &submission.id, None).await.unwrap();
        let approved = engine.admin_approve("admin", &submission.id, None).await.unwrap();
        assert_eq!(
            approved.placement_outcome,
            Some(docflow_protocol::PlacementOutcome::Staged)
        );

        fs::set_permissions(&project_root, fs::Permissions::from_mode(0o700)).unwrap();

        let promoted = run_sweep(&engine);
        assert_eq!(promoted, vec![submission.id]);
    }

    #[tokio::test]
    async fn spawned_retrier_shuts_down_cleanly() {
        let temp = TempDir::new().unwrap();
        let engine = seeded_engine(&temp);
        let handle = spawn(engine, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.shutdown().await;
    }
}
