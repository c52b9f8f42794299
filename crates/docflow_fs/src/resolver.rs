use docflow_protocol::SystemConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tracing::warn;

const SENTINEL_FILE: &str = ".docflow_probe";

/// Result of the most recent reachability probe against the network root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Reachable,
    Unreachable,
}

struct ProbeCache {
    outcome: ProbeOutcome,
    observed_at: Instant,
}

/// Resolves the logical document-tree roots to physical directories,
/// falling back to local disk when the network root's sentinel-file probe
/// fails.
///
/// Probe results are cached for `probe_cache` (default 30s, see
/// [`docflow_protocol::SystemConfig`]) so that a burst of filesystem
/// operations does not re-probe the network mount on every call.
pub struct Resolver {
    config: SystemConfig,
    cache: Mutex<Option<ProbeCache>>,
}

impl Resolver {
    pub fn new(config: SystemConfig) -> Self {
        Self {
            config,
            cache: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// Whether the resolver is currently serving the local fallback root in
    /// place of the network root.
    pub fn degraded(&self) -> bool {
        self.probe() == ProbeOutcome::Unreachable
    }

    /// The root currently backing the shared, network-side document
    /// trees (queue, archive, notifications, uploads, metadata, staging).
    fn active_shared_root(&self) -> &Path {
        if self.degraded() {
            &self.config.local_fallback_root
        } else {
            &self.config.network_root
        }
    }

    /// The single shared root document stores are rooted at (the common
    /// ancestor of `queue_root()`, `notify_root()`, etc). Exposed so a
    /// caller holding one `DocStore` for all document trees can pick the
    /// right root up front.
    pub fn shared_root(&self) -> PathBuf {
        self.active_shared_root().to_path_buf()
    }

    pub fn queue_root(&self) -> PathBuf {
        self.active_shared_root().join("approvals")
    }

    pub fn archive_root(&self) -> PathBuf {
        self.active_shared_root().join("approvals").join("archive")
    }

    pub fn comments_root(&self) -> PathBuf {
        self.active_shared_root().join("approvals").join("comments")
    }

    pub fn placement_requests_path(&self) -> PathBuf {
        self.active_shared_root()
            .join("approvals")
            .join("placement_requests.json")
    }

    pub fn notify_root(&self) -> PathBuf {
        self.active_shared_root().join("notifications")
    }

    pub fn upload_root(&self) -> PathBuf {
        self.active_shared_root().join("uploads")
    }

    pub fn metadata_root(&self) -> PathBuf {
        self.active_shared_root().join("metadata")
    }

    /// The fallback location used when direct placement into `project_root`
    /// is denied. Lives on the shared root rather than the (possibly
    /// privileged/restricted) project filesystem, since it exists precisely
    /// to absorb failures writing to that filesystem.
    pub fn staging_root(&self) -> PathBuf {
        self.active_shared_root().join("staging")
    }

    /// Base for final delivered artifacts. Independently configured and
    /// never redirected to the local fallback: a misconfigured project root
    /// is a hard error (`STORE_UNAVAILABLE`), not a silent redirect, because
    /// delivered artifacts must land in the one canonical location every
    /// downstream tool expects.
    pub fn project_root(&self) -> PathBuf {
        self.config.project_root.clone()
    }

    /// Force the next `degraded()`/root access to re-probe immediately,
    /// ignoring the cache. Exposed for tests and for the retry worker, which
    /// wants a fresh read before each sweep.
    pub fn invalidate_probe_cache(&self) {
        *self.cache.lock().expect("probe cache mutex poisoned") = None;
    }

    fn probe(&self) -> ProbeOutcome {
        let mut guard = self.cache.lock().expect("probe cache mutex poisoned");
        if let Some(cache) = guard.as_ref() {
            if cache.observed_at.elapsed() < self.config.probe_cache {
                return cache.outcome;
            }
        }

        let outcome = Self::probe_root(&self.config.network_root);
        *guard = Some(ProbeCache {
            outcome,
            observed_at: Instant::now(),
        });
        outcome
    }

    /// Write-then-remove a sentinel file under `root`. Idempotent: running
    /// it repeatedly leaves no trace beyond the transient sentinel file.
    fn probe_root(root: &Path) -> ProbeOutcome {
        if fs::create_dir_all(root).is_err() {
            return ProbeOutcome::Unreachable;
        }
        let sentinel = root.join(SENTINEL_FILE);
        match fs::write(&sentinel, b"") {
            Ok(()) => {
                let _ = fs::remove_file(&sentinel);
                ProbeOutcome::Reachable
            }
            Err(err) => {
                warn!(root = %root.display(), error = %err, "network root probe failed");
                ProbeOutcome::Unreachable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_protocol::IdentitySource;
    use std::time::Duration;
    use tempfile::TempDir;

    fn config(network_root: PathBuf, local_fallback_root: PathBuf) -> SystemConfig {
        SystemConfig {
            network_root,
            local_fallback_root,
            project_root: PathBuf::from("/tmp/does-not-matter-for-these-tests"),
            archive_cap: 1000,
            probe_cache: Duration::from_secs(30),
            retry_interval: Duration::from_secs(60),
            identity_source: IdentitySource::File(PathBuf::from("/tmp/roster.json")),
        }
    }

    #[test]
    fn reachable_network_root_is_not_degraded() {
        let network = TempDir::new().unwrap();
        let fallback = TempDir::new().unwrap();
        let resolver = Resolver::new(config(
            network.path().to_path_buf(),
            fallback.path().to_path_buf(),
        ));

        assert!(!resolver.degraded());
        assert_eq!(resolver.queue_root(), network.path().join("approvals"));
    }

    #[test]
    fn unreachable_network_root_falls_back_and_is_degraded() {
        let fallback = TempDir::new().unwrap();
        // A network root nested under a path component that is a file (not
        // a directory) can never be created, simulating an unreachable share.
        let blocker = TempDir::new().unwrap();
        let blocker_file = blocker.path().join("not_a_dir");
        fs::write(&blocker_file, b"x").unwrap();
        let unreachable_network_root = blocker_file.join("share");

        let resolver = Resolver::new(config(
            unreachable_network_root,
            fallback.path().to_path_buf(),
        ));

        assert!(resolver.degraded());
        assert_eq!(resolver.queue_root(), fallback.path().join("approvals"));
    }

    #[test]
    fn project_root_never_falls_back() {
        let fallback = TempDir::new().unwrap();
        let blocker = TempDir::new().unwrap();
        let blocker_file = blocker.path().join("not_a_dir");
        fs::write(&blocker_file, b"x").unwrap();
        let unreachable_network_root = blocker_file.join("share");

        let mut cfg = config(unreachable_network_root, fallback.path().to_path_buf());
        cfg.project_root = PathBuf::from("/srv/projects");
        let resolver = Resolver::new(cfg);

        assert!(resolver.degraded());
        assert_eq!(resolver.project_root(), PathBuf::from("/srv/projects"));
    }

    #[test]
    #[cfg(unix)]
    fn probe_result_is_cached_until_ttl_elapses() {
        use std::os::unix::fs::PermissionsExt;

        let network = TempDir::new().unwrap();
        let fallback = TempDir::new().unwrap();
        let mut cfg = config(network.path().to_path_buf(), fallback.path().to_path_buf());
        cfg.probe_cache = Duration::from_secs(30);
        let resolver = Resolver::new(cfg);

        assert!(!resolver.degraded());

        // Lock the directory down after the first probe; the cached outcome
        // should not change until the cache is invalidated.
        fs::set_permissions(network.path(), fs::Permissions::from_mode(0o500)).unwrap();
        assert!(!resolver.degraded());

        resolver.invalidate_probe_cache();
        assert!(resolver.degraded());

        // restore so TempDir can clean itself up
        fs::set_permissions(network.path(), fs::Permissions::from_mode(0o700)).unwrap();
    }
}
