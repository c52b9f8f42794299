use crate::doc_path::DocPath;
use fs2::FileExt;
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store path {path} is not accessible: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("document {path} contains malformed JSON: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to acquire lock on {path}: {source}")]
    LockFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("document {path} is not a JSON array")]
    NotAnArray { path: PathBuf },
}

/// A JSON document store rooted at a single directory.
///
/// One-file-per-entity storage convention, generalized so a [`DocPath`] can
/// also address a shared document like the live queue rather than always
/// one id per file.
pub struct DocStore {
    root: PathBuf,
}

impl DocStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lock_path(doc_path: &Path) -> PathBuf {
        let mut lock_path = doc_path.to_path_buf();
        let new_ext = match doc_path.extension() {
            Some(ext) => format!("{}.lock", ext.to_string_lossy()),
            None => "lock".to_string(),
        };
        lock_path.set_extension(new_ext);
        lock_path
    }

    /// Non-locking read. May race with a concurrent `modify`; callers that
    /// need a consistent view across a read-then-write should use `modify`
    /// instead and discard the mutation if nothing needs to change.
    pub fn read(&self, doc: &DocPath, salvage: bool) -> Result<Value, StoreError> {
        let path = doc.resolve(&self.root);
        Self::read_document(&path, salvage)
    }

    /// Acquire an exclusive lock on `doc`, read-modify-write it, and release
    /// the lock on every exit path (the lock file is held by a `File` that
    /// drops, and with it the `fs2` advisory lock, at the end of this call).
    pub fn modify<T, F>(&self, doc: &DocPath, salvage: bool, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Value) -> Result<T, StoreError>,
    {
        let path = doc.resolve(&self.root);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Unavailable {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let lock_path = Self::lock_path(&path);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|source| StoreError::LockFailed {
                path: lock_path.clone(),
                source,
            })?;
        lock_file
            .lock_exclusive()
            .map_err(|source| StoreError::LockFailed {
                path: lock_path.clone(),
                source,
            })?;

        let mut value = Self::read_document(&path, salvage)?;
        let result = f(&mut value)?;
        Self::atomic_write(&path, &value)?;

        lock_file.unlock().ok();
        Ok(result)
    }

    /// Append `record` to a document holding a JSON array, creating it if
    /// absent. Serializes with other writers via the same lock as `modify`.
    pub fn append(&self, doc: &DocPath, record: Value) -> Result<(), StoreError> {
        self.modify(doc, false, move |value| {
            if value.is_null() {
                *value = Value::Array(Vec::new());
            }
            match value.as_array_mut() {
                Some(array) => {
                    array.push(record);
                    Ok(())
                }
                None => Err(StoreError::NotAnArray {
                    path: doc.as_path().to_path_buf(),
                }),
            }
        })
    }

    /// List document paths (relative to the store root) directly under
    /// `dir_prefix` whose name ends in `.json`. Non-recursive.
    pub fn list(&self, dir_prefix: &DocPath) -> Result<Vec<DocPath>, StoreError> {
        let dir = dir_prefix.resolve(&self.root);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&dir).map_err(|source| StoreError::Unavailable {
            path: dir.clone(),
            source,
        })?;

        let mut docs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Unavailable {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            if let Ok(relative) = path.strip_prefix(&self.root) {
                docs.push(DocPath::new(relative.to_path_buf()));
            }
        }
        Ok(docs)
    }

    fn read_document(path: &Path, salvage: bool) -> Result<Value, StoreError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Value::Null),
            Err(source) => {
                return Err(StoreError::Unavailable {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        match serde_json::from_str(&text) {
            Ok(value) => Ok(value),
            Err(source) if salvage => {
                warn!(path = %path.display(), error = %source, "salvaging corrupt document as null");
                Ok(Value::Null)
            }
            Err(source) => Err(StoreError::Corrupt {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn atomic_write(path: &Path, value: &Value) -> Result<(), StoreError> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        let temp_path = parent.join(format!(".tmp_{}", Uuid::new_v4()));
        let payload =
            serde_json::to_vec_pretty(value).expect("serde_json::Value always serializes");

        let write_result = (|| -> io::Result<()> {
            let mut file = File::create(&temp_path)?;
            use std::io::Write;
            file.write_all(&payload)?;
            file.sync_all()?;
            Ok(())
        })();

        write_result.map_err(|source| StoreError::Unavailable {
            path: temp_path.clone(),
            source,
        })?;

        fs::rename(&temp_path, path).map_err(|source| StoreError::Unavailable {
            path: path.to_path_buf(),
            source,
        })
    }
}
