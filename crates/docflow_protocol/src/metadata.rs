//! Metadata sidecar records (C6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub filename: String,
    pub team: String,
    pub year: u16,
    pub submitter: String,
    #[serde(default)]
    pub approver_chain: Vec<String>,
    pub approved_at: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub source_upload_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_path: Option<PathBuf>,
}

/// An open request to have an artifact placed by hand, because both direct
/// placement and staging were denied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementRequest {
    pub id: docflow_ids::PlacementRequestId,
    pub submission_id: docflow_ids::SubmissionId,
    pub from: PathBuf,
    pub to: PathBuf,
    pub reason: String,
    pub at: DateTime<Utc>,
}
