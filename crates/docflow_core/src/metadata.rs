//! Metadata Store (C6): sidecar records written alongside (but never inside)
//! the project tree, so the project tree contains only artifacts.

use docflow_fs::Resolver;
use docflow_protocol::MetadataRecord;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("failed to read/write metadata at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("metadata sidecar at {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub struct MetadataStore {
    resolver: Arc<Resolver>,
}

impl MetadataStore {
    pub fn new(resolver: Arc<Resolver>) -> Self {
        Self { resolver }
    }

    fn sidecar_path(&self, team: &str, year: u16, filename: &str) -> PathBuf {
        self.resolver
            .metadata_root()
            .join(team)
            .join(year.to_string())
            .join(format!("{filename}.meta.json"))
    }

    pub fn put(&self, record: &MetadataRecord) -> Result<(), MetadataError> {
        let path = self.sidecar_path(&record.team, record.year, &record.filename);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| MetadataError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let payload = serde_json::to_vec_pretty(record).expect("metadata record always serializes");
        fs::write(&path, payload).map_err(|source| MetadataError::Io { path, source })
    }

    /// Read a sidecar, following the legacy co-located convention (a
    /// `.meta.json` file sitting directly next to the delivered artifact in
    /// the project tree) transparently if the canonical sidecar tree has
    /// no entry — legacy sidecars are read, never written.
    pub fn get(
        &self,
        team: &str,
        year: u16,
        filename: &str,
        legacy_colocated_dir: Option<&PathBuf>,
    ) -> Result<Option<MetadataRecord>, MetadataError> {
        let path = self.sidecar_path(team, year, filename);
        if let Some(record) = Self::read_at(&path)? {
            return Ok(Some(record));
        }

        if let Some(dir) = legacy_colocated_dir {
            let legacy_path = dir.join(format!("{filename}.meta.json"));
            return Self::read_at(&legacy_path);
        }

        Ok(None)
    }

    fn read_at(path: &PathBuf) -> Result<Option<MetadataRecord>, MetadataError> {
        match fs::read(path) {
            Ok(bytes) => {
                let record = serde_json::from_slice(&bytes).map_err(|source| MetadataError::Malformed {
                    path: path.clone(),
                    source,
                })?;
                Ok(Some(record))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(MetadataError::Io {
                path: path.clone(),
                source,
            }),
        }
    }

    /// List all sidecars for a team/year, applying `predicate` to each
    /// parsed record. `list(team, year)` is `search` with a predicate that
    /// always matches.
    pub fn search(
        &self,
        team: &str,
        year: u16,
        predicate: impl Fn(&MetadataRecord) -> bool,
    ) -> Result<Vec<MetadataRecord>, MetadataError> {
        let dir = self.resolver.metadata_root().join(team).join(year.to_string());
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        let entries = fs::read_dir(&dir).map_err(|source| MetadataError::Io {
            path: dir.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| MetadataError::Io {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(record) = Self::read_at(&path)? {
                if predicate(&record) {
                    records.push(record);
                }
            }
        }
        Ok(records)
    }

    pub fn list(&self, team: &str, year: u16) -> Result<Vec<MetadataRecord>, MetadataError> {
        self.search(team, year, |_| true)
    }
}
