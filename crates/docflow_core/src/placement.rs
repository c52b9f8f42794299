//! File Placement Pipeline (C9): moves an approved artifact from its
//! upload location to the project tree, with a staged-fallback and
//! manual-request path when direct placement is denied.

use crate::metadata::MetadataStore;
use chrono::{Datelike, Utc};
use docflow_fs::Resolver;
use docflow_ids::PlacementRequestId;
use docflow_protocol::{MetadataRecord, PlacementOutcome, PlacementRequest, Submission};
use docflow_store::{DocPath, DocStore};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

const PLACEMENT_REQUESTS_DOC: &str = "approvals/placement_requests.json";

/// The outcome of one placement attempt, including what to record on the
/// submission. `side_effect_note`, when set, is appended to
/// `side_effect_failures` by the caller without disturbing `outcome`
/// (a successful delivery whose metadata sidecar write failed is still a
/// delivery).
pub struct PlacementAttempt {
    pub outcome: PlacementOutcome,
    pub target_path: Option<PathBuf>,
    pub side_effect_note: Option<String>,
}

pub struct PlacementPipeline {
    resolver: Arc<Resolver>,
    metadata: Arc<MetadataStore>,
    store: Arc<DocStore>,
}

impl PlacementPipeline {
    pub fn new(resolver: Arc<Resolver>, metadata: Arc<MetadataStore>, store: Arc<DocStore>) -> Self {
        Self {
            resolver,
            metadata,
            store,
        }
    }

    /// Run the full placement algorithm — direct move, staged copy, then
    /// manual-request fallback — for a submission that has just been
    /// approved.
    pub fn place(&self, submission: &Submission) -> PlacementAttempt {
        let year = submission.admin_decided_at.unwrap_or_else(Utc::now).year() as u16;
        let target = compute_target(
            &self.resolver.project_root(),
            &submission.submitter_team,
            year,
            &submission.original_filename,
        );

        match try_move(&submission.upload_path, &target) {
            Ok(()) => {
                let record = MetadataRecord {
                    filename: submission.original_filename.clone(),
                    team: submission.submitter_team.clone(),
                    year,
                    submitter: submission.submitter_username.clone(),
                    approver_chain: approver_chain(submission),
                    approved_at: submission.admin_decided_at.unwrap_or_else(Utc::now),
                    description: submission.description.clone(),
                    tags: submission.tags.clone(),
                    source_upload_path: submission.upload_path.clone(),
                    final_path: Some(target.clone()),
                };
                let side_effect_note = self.metadata.put(&record).err().map(|err| {
                    warn!(error = %err, "metadata sidecar write failed after delivery");
                    format!("metadata sidecar write failed: {err}")
                });
                PlacementAttempt {
                    outcome: PlacementOutcome::Delivered,
                    target_path: Some(target),
                    side_effect_note,
                }
            }
            Err(move_err) => {
                let staging_target = compute_target(
                    &self.resolver.staging_root(),
                    &submission.submitter_team,
                    year,
                    &submission.original_filename,
                );
                match try_copy(&submission.upload_path, &staging_target) {
                    Ok(()) => PlacementAttempt {
                        outcome: PlacementOutcome::Staged,
                        target_path: Some(staging_target),
                        side_effect_note: Some(format!("direct placement failed: {move_err}")),
                    },
                    Err(stage_err) => {
                        let request = PlacementRequest {
                            id: PlacementRequestId::new(),
                            submission_id: submission.id.clone(),
                            from: submission.upload_path.clone(),
                            to: target,
                            reason: stage_err.to_string(),
                            at: Utc::now(),
                        };
                        if let Err(err) = self.store.append(
                            &DocPath::new(PLACEMENT_REQUESTS_DOC),
                            serde_json::to_value(&request).expect("placement request always serializes"),
                        ) {
                            warn!(error = %err, "failed to record manual placement request");
                        }
                        PlacementAttempt {
                            outcome: PlacementOutcome::ManualRequested,
                            target_path: None,
                            side_effect_note: Some(format!(
                                "direct placement failed ({move_err}), staging also failed ({stage_err})"
                            )),
                        }
                    }
                }
            }
        }
    }

    /// Re-attempt delivery for a submission currently `STAGED` or
    /// `MANUAL_REQUESTED`. Idempotent: the target is recomputed fresh each
    /// call. On success, removes the staged copy (if any) since it is now
    /// redundant.
    pub fn retry(&self, submission: &Submission) -> Option<PlacementAttempt> {
        if !matches!(
            submission.placement_outcome,
            Some(PlacementOutcome::Staged) | Some(PlacementOutcome::ManualRequested)
        ) {
            return None;
        }
        let decided_at = submission.admin_decided_at?;
        let year = decided_at.year() as u16;
        let target = compute_target(
            &self.resolver.project_root(),
            &submission.submitter_team,
            year,
            &submission.original_filename,
        );

        match try_move(&submission.upload_path, &target) {
            Ok(()) => {
                if let Some(staged) = &submission.placement_target_path {
                    if staged != &target {
                        if let Err(err) = fs::remove_file(staged) {
                            warn!(path = %staged.display(), error = %err, "failed to remove promoted staged copy");
                        }
                    }
                }
                Some(PlacementAttempt {
                    outcome: PlacementOutcome::Delivered,
                    target_path: Some(target),
                    side_effect_note: None,
                })
            }
            Err(_) => None,
        }
    }
}

fn approver_chain(submission: &Submission) -> Vec<String> {
    let mut chain = Vec::new();
    if let Some(tl) = &submission.tl_reviewer {
        chain.push(tl.clone());
    }
    if let Some(admin) = &submission.admin_reviewer {
        chain.push(admin.clone());
    }
    chain
}

/// Append ` (n)` before the extension with the smallest free `n`. Never
/// overwrites an existing file.
fn compute_target(base: &Path, team: &str, year: u16, filename: &str) -> PathBuf {
    let dir = base.join(team).join(year.to_string());
    let mut candidate = dir.join(filename);
    let mut n: u32 = 1;
    while candidate.exists() {
        candidate = dir.join(numbered_name(filename, n));
        n += 1;
    }
    candidate
}

fn numbered_name(filename: &str, n: u32) -> String {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem} ({n}).{ext}"),
        _ => format!("{filename} ({n})"),
    }
}

fn try_move(source: &Path, target: &Path) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
        reject_symlinked_dir(parent)?;
    }
    fs::rename(source, target)
}

fn try_copy(source: &Path, target: &Path) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
        reject_symlinked_dir(parent)?;
    }
    fs::copy(source, target)?;
    Ok(())
}

/// Refuse to write through a team/year directory that is, or sits beneath,
/// a symlink. `target`'s parent always exists by this point
/// (`create_dir_all` just ran), so every component from the resolved root
/// down is checked with [`std::fs::symlink_metadata`], which does not
/// itself follow links.
fn reject_symlinked_dir(dir: &Path) -> io::Result<()> {
    let mut probe = PathBuf::new();
    for component in dir.components() {
        probe.push(component);
        if probe.as_os_str().is_empty() {
            continue;
        }
        let metadata = fs::symlink_metadata(&probe)?;
        if metadata.file_type().is_symlink() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("refusing to place through symlinked path component: {}", probe.display()),
            ));
        }
    }
    Ok(())
}
