//! Runtime configuration loaded from the environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_ARCHIVE_CAP: usize = 1000;
const DEFAULT_PROBE_CACHE_SECONDS: u64 = 30;
const DEFAULT_RETRY_INTERVAL_SECONDS: u64 = 60;

/// Where a user/team roster used to resolve identities and authorization
/// comes from (C3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentitySource {
    /// A JSON roster document read through `docflow_store`.
    File(PathBuf),
}

impl IdentitySource {
    fn from_env_value(value: &str) -> Self {
        Self::File(PathBuf::from(value))
    }
}

/// The resolved set of filesystem roots and tunables the whole engine
/// operates against. Constructed once at process start and shared behind
/// an `Arc` by every crate downstream (`docflow_fs`, `docflow_store`,
/// `docflow_core`).
#[derive(Debug, Clone)]
pub struct SystemConfig {
    /// Primary network-mounted root under which the queue, archive,
    /// notification, and metadata trees live.
    pub network_root: PathBuf,
    /// Root used in place of `network_root` when the reachability probe
    /// reports the network mount unreachable (degraded mode).
    pub local_fallback_root: PathBuf,
    /// Root that approved artifacts are ultimately placed under.
    pub project_root: PathBuf,

    /// Maximum number of entries kept in each ring-buffered archive log
    /// before the oldest entry is evicted.
    pub archive_cap: usize,
    /// How long a network-reachability probe result is trusted before the
    /// next filesystem operation re-probes.
    pub probe_cache: Duration,
    /// Interval between background placement-retry sweeps (C9 worker).
    pub retry_interval: Duration,

    pub identity_source: IdentitySource,
}

impl SystemConfig {
    /// Build configuration from environment variables, applying the
    /// documented defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let network_root = required_path("DOCFLOW_NETWORK_ROOT")?;
        let local_fallback_root = required_path("DOCFLOW_LOCAL_FALLBACK_ROOT")?;
        let project_root = required_path("DOCFLOW_PROJECT_ROOT")?;

        let archive_cap = optional_usize("DOCFLOW_ARCHIVE_CAP", DEFAULT_ARCHIVE_CAP)?;
        let probe_cache =
            Duration::from_secs(optional_u64("DOCFLOW_PROBE_CACHE_SECONDS", DEFAULT_PROBE_CACHE_SECONDS)?);
        let retry_interval = Duration::from_secs(optional_u64(
            "DOCFLOW_RETRY_INTERVAL_SECONDS",
            DEFAULT_RETRY_INTERVAL_SECONDS,
        )?);

        let identity_source = match env::var("DOCFLOW_IDENTITY_SOURCE") {
            Ok(value) => IdentitySource::from_env_value(&value),
            Err(_) => IdentitySource::File(network_root.join("identity").join("roster.json")),
        };

        Ok(Self {
            network_root,
            local_fallback_root,
            project_root,
            archive_cap,
            probe_cache,
            retry_interval,
            identity_source,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

fn required_path(var: &'static str) -> Result<PathBuf, ConfigError> {
    env::var(var)
        .map(PathBuf::from)
        .map_err(|_| ConfigError::Missing(var))
}

fn optional_usize(var: &'static str, default: usize) -> Result<usize, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name: var, value }),
        Err(_) => Ok(default),
    }
}

fn optional_u64(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name: var, value }),
        Err(_) => Ok(default),
    }
}
