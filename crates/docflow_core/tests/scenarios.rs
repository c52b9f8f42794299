//! Black-box scenario tests exercising the approval engine through its
//! public API only, with a real `FileIdentityProvider` roster instead of a
//! stub — the end-to-end path an operator (or the CLI) actually drives.

use chrono::Datelike;
use docflow_core::{ApprovalEngine, ListFilter};
use docflow_fs::Resolver;
use docflow_identity::FileIdentityProvider;
use docflow_protocol::{EngineError, IdentitySource, NotificationKind, SubmissionState, SystemConfig};
use docflow_store::{DocPath, DocStore};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn seed_roster(temp: &TempDir) {
    let store = DocStore::new(temp.path().to_path_buf());
    let doc = DocPath::new("roster.json");
    store
        .modify(&doc, false, |value| {
            *value = serde_json::json!({
                "alice": {"role": "USER", "teams": ["AGCC"]},
                "tl_bob": {"role": "TEAM_LEADER", "teams": ["AGCC"]},
                "tl_carol": {"role": "TEAM_LEADER", "teams": ["KUSAKABE"]},
                "admin": {"role": "ADMIN", "teams": []},
            });
            Ok::<_, docflow_store::StoreError>(())
        })
        .unwrap();
}

fn engine(temp: &TempDir) -> ApprovalEngine {
    seed_roster(temp);
    let config = SystemConfig {
        network_root: temp.path().join("network"),
        local_fallback_root: temp.path().join("fallback"),
        project_root: temp.path().join("projects"),
        archive_cap: 1000,
        probe_cache: Duration::from_secs(30),
        retry_interval: Duration::from_secs(60),
        identity_source: IdentitySource::File(temp.path().join("roster.json")),
    };
    let identity = Arc::new(FileIdentityProvider::new(
        DocStore::new(temp.path().to_path_buf()),
        DocPath::new("roster.json"),
    ));
    let resolver = Arc::new(Resolver::new(config));
    ApprovalEngine::new(resolver, identity, 1000, false)
}

fn seed_upload(temp: &TempDir, username: &str, filename: &str) -> PathBuf {
    let path = temp.path().join("uploads").join(username).join(filename);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, b"hello world").unwrap();
    path
}

#[tokio::test]
async fn scenario_1_happy_path() {
    let temp = TempDir::new().unwrap();
    let engine = engine(&temp);
    let upload_path = seed_upload(&temp, "alice", "spec.pdf");

    let submission = engine
        .submit("alice", upload_path, "spec.pdf", 11, None, "quarterly spec", vec![], None)
        .await
        .unwrap();

    let alice_view = engine.list("alice", &ListFilter::default(), None).unwrap();
    assert_eq!(alice_view.total, 1);
    assert_eq!(alice_view.submissions[0].state, SubmissionState::PendingTeamLeader);

    let bob_view = engine.list("tl_bob", &ListFilter::default(), None).unwrap();
    assert_eq!(bob_view.total, 1);

    let after_tl = engine.tl_approve("tl_bob", &submission.id, None).await.unwrap();
    assert_eq!(after_tl.state, SubmissionState::PendingAdmin);
    let inbox = engine.get_inbox("alice", false, None).unwrap();
    assert!(inbox.iter().any(|n| n.kind == NotificationKind::TlApproved));

    let approved = engine.admin_approve("admin", &submission.id, None).await.unwrap();
    assert_eq!(approved.state, SubmissionState::Approved);

    let year = chrono::Utc::now().year();
    let delivered = temp.path().join("projects").join("AGCC").join(year.to_string()).join("spec.pdf");
    assert!(delivered.exists());
    let meta = temp
        .path()
        .join("network")
        .join("metadata")
        .join("AGCC")
        .join(year.to_string())
        .join("spec.pdf.meta.json");
    assert!(meta.exists());

    let inbox = engine.get_inbox("alice", false, None).unwrap();
    assert!(inbox.iter().any(|n| n.kind == NotificationKind::AdminApproved));
}

#[tokio::test]
async fn scenario_2_wrong_team_leader_is_forbidden() {
    let temp = TempDir::new().unwrap();
    let engine = engine(&temp);
    let upload_path = seed_upload(&temp, "alice", "spec.pdf");
    let submission = engine
        .submit("alice", upload_path, "spec.pdf", 11, None, "", vec![], None)
        .await
        .unwrap();

    let err = engine.tl_approve("tl_carol", &submission.id, None).await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden { .. }));

    let unchanged = engine.list("alice", &ListFilter::default(), None).unwrap();
    assert_eq!(unchanged.submissions[0].state, SubmissionState::PendingTeamLeader);
}

#[tokio::test]
async fn scenario_3_concurrent_team_leader_approval_has_one_winner() {
    let temp = TempDir::new().unwrap();
    let engine = Arc::new(engine(&temp));
    let upload_path = seed_upload(&temp, "alice", "spec.pdf");
    let submission = engine
        .submit("alice", upload_path, "spec.pdf", 11, None, "", vec![], None)
        .await
        .unwrap();

    let (a, b) = {
        let engine_a = engine.clone();
        let id_a = submission.id.clone();
        let engine_b = engine.clone();
        let id_b = submission.id.clone();
        tokio::join!(
            tokio::spawn(async move { engine_a.tl_approve("tl_bob", &id_a, None).await }),
            tokio::spawn(async move { engine_b.tl_approve("tl_bob", &id_b, None).await }),
        )
    };
    let results = [a.unwrap(), b.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(EngineError::IllegalTransition { .. })))
            .count(),
        1
    );

    let inbox = engine.get_inbox("alice", false, None).unwrap();
    assert_eq!(inbox.iter().filter(|n| n.kind == NotificationKind::TlApproved).count(), 1);
}

#[tokio::test]
async fn scenario_4_rejection_requires_a_reason() {
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

    let unchanged = engine.list("admin", &ListFilter::default(), None).unwrap();
    assert_eq!(unchanged.submissions[0].state, SubmissionState::PendingAdmin);
}

#[tokio::test]
async fn scenario_5_archive_cap_evicts_oldest_first() {
    let temp = TempDir::new().unwrap();
    let engine = engine(&temp);

    for n in 0..1005 {
        let filename = format!("doc-{n}.pdf");
        let upload_path = seed_upload(&temp, "alice", &filename);
        let submission = engine
            .submit("alice", upload_path, &filename, 11, None, "", vec![], None)
            .await
            .unwrap();
        engine.tl_approve("tl_bob", &submission.id, None).await.unwrap();
        engine.admin_approve("admin", &submission.id, None).await.unwrap();
    }

    let archive_doc = temp.path().join("network").join("approvals").join("archive").join("approved.json");
    let raw = fs::read_to_string(&archive_doc).unwrap();
    let entries: Vec<serde_json::Value> = serde_json::from_str(&raw).unwrap();
    assert_eq!(entries.len(), 1000);

    let filenames: Vec<&str> = entries.iter().filter_map(|e| e["original_filename"].as_str()).collect();
    assert!(!filenames.contains(&"doc-0.pdf"));
}

#[tokio::test]
async fn scenario_6_placement_falls_back_to_staging_then_retry_delivers() {
    let temp = TempDir::new().unwrap();
    let engine = engine(&temp);
    fs::create_dir_all(temp.path().join("projects")).unwrap();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(temp.path().join("projects"), fs::Permissions::from_mode(0o500)).unwrap();
    }

    let upload_path = seed_upload(&temp, "alice", "spec.pdf");
    let submission = engine
        .submit("alice", upload_path, "spec.pdf", 11, None, "", vec![], None)
        .await
        .unwrap();
    engine.tl_approve("tl_bob", &submission.id, None).await.unwrap();
    let approved = engine.admin_approve("admin", &submission.id, None).await.unwrap();

    #[cfg(unix)]
    {
        assert_eq!(approved.placement_outcome, Some(docflow_protocol::PlacementOutcome::Staged));
        let year = chrono::Utc::now().year();
        let staged = temp.path().join("network").join("staging").join("AGCC").join(year.to_string()).join("spec.pdf");
        assert!(staged.exists());

        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(temp.path().join("projects"), fs::Permissions::from_mode(0o700)).unwrap();

        let promoted = engine.retry_stalled_placements();
        assert_eq!(promoted, vec![submission.id.clone()]);
        let delivered = temp.path().join("projects").join("AGCC").join(year.to_string()).join("spec.pdf");
        assert!(delivered.exists());
        assert!(!staged.exists());
    }
}
