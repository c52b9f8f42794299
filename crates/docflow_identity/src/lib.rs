//! Identity Provider (C3).
//!
//! The core depends on a narrow, object-safe trait rather than owning any
//! notion of "who a user is" itself — that knowledge is inherently tied to
//! whatever directory or auth system the surrounding deployment already has.
//! This crate ships one reference implementation backed by a JSON roster
//! document, sufficient for the CLI and for tests; real deployments are
//! expected to supply their own.

use docflow_protocol::{Identity, Role};
use docflow_store::{DocPath, DocStore, StoreError};
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("roster store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("roster entry for {username} has an unrecognized role: {role}")]
    BadRole { username: String, role: String },
}

/// Resolves a username to its role and team memberships.
///
/// The core never caches identity beyond a single operation: every call
/// re-resolves against whatever backs this trait.
pub trait IdentityProvider: Send + Sync {
    fn get_identity(&self, username: &str) -> Result<Identity, IdentityError>;

    /// Usernames holding team-leader standing for `team`, newest-roster-read
    /// each call like `get_identity`. Used to fan notifications out to every
    /// reviewer on submit rather than just the submitter. Providers with no
    /// reverse roster index may leave this at its default empty fan-out.
    fn team_leaders(&self, _team: &str) -> Result<Vec<String>, IdentityError> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Deserialize)]
struct RosterEntry {
    role: String,
    #[serde(default)]
    teams: Vec<String>,
}

/// A reference [`IdentityProvider`] backed by a single JSON roster document
/// (`{username: {role, teams}}`) read through the document store on every
/// call, so roster edits take effect immediately without a restart.
pub struct FileIdentityProvider {
    store: DocStore,
    doc: DocPath,
}

impl FileIdentityProvider {
    pub fn new(store: DocStore, doc: DocPath) -> Self {
        Self { store, doc }
    }
}

impl FileIdentityProvider {
    fn roster(&self) -> Result<HashMap<String, RosterEntry>, IdentityError> {
        let value = self.store.read(&self.doc, false)?;
        if value.is_null() {
            return Ok(HashMap::new());
        }
        serde_json::from_value(value).map_err(|_| IdentityError::UnknownUser(String::new()))
    }
}

impl IdentityProvider for FileIdentityProvider {
    fn get_identity(&self, username: &str) -> Result<Identity, IdentityError> {
        let roster = self.roster()?;
        let entry = roster
            .get(username)
            .ok_or_else(|| IdentityError::UnknownUser(username.to_string()))?;

        let role = Role::parse(&entry.role).ok_or_else(|| IdentityError::BadRole {
            username: username.to_string(),
            role: entry.role.clone(),
        })?;

        Ok(Identity::new(role, entry.teams.clone()))
    }

    fn team_leaders(&self, team: &str) -> Result<Vec<String>, IdentityError> {
        let roster = self.roster()?;
        Ok(roster
            .into_iter()
            .filter(|(_, entry)| {
                Role::parse(&entry.role) == Some(Role::TeamLeader) && entry.teams.iter().any(|t| t == team)
            })
            .map(|(username, _)| username)
            .collect())
    }
}
