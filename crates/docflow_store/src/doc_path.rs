use std::path::{Path, PathBuf};

/// A document's location relative to a store root, e.g. `approvals/queue.json`
/// or `notifications/alice/inbox.json`. Never absolute, never containing `..`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocPath(PathBuf);

impl DocPath {
    pub fn new(relative: impl Into<PathBuf>) -> Self {
        Self(relative.into())
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Resolve against a store root.
    pub fn resolve(&self, root: &Path) -> PathBuf {
        root.join(&self.0)
    }
}

impl From<&str> for DocPath {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DocPath {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
