//! The approval engine: state machine, archive, metadata, notifications,
//! comments, and file placement, composed behind a single entry point.

pub mod archive;
pub mod comments;
pub mod engine;
pub mod metadata;
pub mod notify;
pub mod placement;
pub mod repository;

pub use archive::{ArchiveKind, ArchiveStore};
pub use comments::CommentStore;
pub use engine::{with_retry, ApprovalEngine, ListFilter, ListResult, SortKey};
pub use metadata::{MetadataError, MetadataStore};
pub use notify::NotificationService;
pub use placement::{PlacementAttempt, PlacementPipeline};
pub use repository::{RepositoryError, SubmissionRepository};
