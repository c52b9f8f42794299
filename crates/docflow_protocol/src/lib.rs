//! Wire types and error taxonomy shared across the docflow approval engine.
//!
//! This crate is pure data: entities, enums, and the boundary error type.
//! It knows nothing about the filesystem, locking, or the store format —
//! those live in `docflow_fs`, `docflow_store`, and `docflow_identity`.

pub mod comment;
pub mod config;
pub mod error;
pub mod identity;
pub mod metadata;
pub mod notification;
pub mod submission;

pub use comment::Comment;
pub use config::{ConfigError, IdentitySource, SystemConfig};
pub use error::{EngineError, EngineResult};
pub use identity::{Identity, Role};
pub use metadata::{MetadataRecord, PlacementRequest};
pub use notification::{Notification, NotificationKind};
pub use submission::{
    PlacementOutcome, SideEffectFailure, StateHistoryEntry, Submission, SubmissionState,
};
