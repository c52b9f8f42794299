//! Logical path resolution (C1) for the docflow approval engine.
//!
//! The resolver owns the mapping from logical locations — the live queue,
//! the archive logs, per-user inboxes, uploads, the project tree, metadata
//! sidecars, and the staging fallback — to physical paths on whichever of
//! the configured network root or local fallback root is currently
//! reachable.

pub mod filename;
mod resolver;

pub use resolver::{ProbeOutcome, Resolver};
