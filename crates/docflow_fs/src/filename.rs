//! Pure-function filename safety checks.
//!
//! Submitted filenames do not exist on disk at validation time, so this
//! cannot canonicalize-and-compare-to-roots the way
//! [`crate::Resolver`]'s privileged counterparts do once a real path is
//! available (placement, see `docflow_core::placement`). Instead it rejects
//! the same traversal shapes structurally, by inspecting path components.

use std::path::{Component, Path};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilenameError {
    #[error("filename is empty")]
    Empty,
    #[error("filename contains a path separator")]
    ContainsSeparator,
    #[error("filename contains a parent-directory reference")]
    ContainsParentRef,
    #[error("filename contains a NUL byte")]
    ContainsNul,
    #[error("filename is a reserved name ('.' or '..')")]
    ReservedName,
}

/// Validate a user-submitted original filename before accepting a
/// submission.
///
/// Rejects empty names, embedded NUL bytes, any path separator, and any
/// component that isn't a plain filename (`.`, `..`, root, or prefix
/// components are all refused — a bare filename has exactly one `Normal`
/// component).
pub fn validate(name: &str) -> Result<(), FilenameError> {
    if name.is_empty() {
        return Err(FilenameError::Empty);
    }
    if name.contains('\0') {
        return Err(FilenameError::ContainsNul);
    }
    if name.contains('/') || name.contains('\\') {
        return Err(FilenameError::ContainsSeparator);
    }
    if name == "." || name == ".." {
        return Err(FilenameError::ReservedName);
    }

    let path = Path::new(name);
    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        (Some(Component::ParentDir), _) => Err(FilenameError::ContainsParentRef),
        _ => Err(FilenameError::ContainsSeparator),
    }
}
