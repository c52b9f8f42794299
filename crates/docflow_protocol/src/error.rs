//! Boundary error taxonomy.
//!
//! `EngineError` is what every public `docflow_core::engine` operation
//! returns. Internal crates (store, fs, placement) raise their own
//! `thiserror` enums and are mapped onto this one at the C10 boundary.

use docflow_ids::SubmissionId;
use thiserror::Error;

/// Error codes returned from the approval engine's public boundary.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown user: {username}")]
    UnknownUser { username: String },

    #[error("forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("illegal transition on {id}: cannot {attempted} from state {from}")]
    IllegalTransition {
        id: SubmissionId,
        from: String,
        attempted: String,
    },

    #[error("not found: {what} {id}")]
    NotFound { what: &'static str, id: String },

    #[error("bad input: {reason}")]
    BadInput { reason: String },

    #[error("store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    #[error("corrupt document: {doc}")]
    Corrupt { doc: String },

    #[error("deadline exceeded during {operation}")]
    Deadline { operation: &'static str },
}

impl EngineError {
    /// The stable error code string used at the external boundary.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownUser { .. } => "UNKNOWN_USER",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::BadInput { .. } => "BAD_INPUT",
            Self::StoreUnavailable { .. } => "STORE_UNAVAILABLE",
            Self::Corrupt { .. } => "CORRUPT",
            Self::Deadline { .. } => "DEADLINE",
        }
    }

    /// Whether the caller-facing retry wrapper should retry this error.
    ///
    /// Authorization and state errors are final; only the transport-like
    /// errors are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. } | Self::Deadline { .. })
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
