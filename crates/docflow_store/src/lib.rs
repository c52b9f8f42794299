//! The locked JSON document store (C2).
//!
//! A document is a relative path under some store root, addressing either a
//! single JSON object (the live queue) or a per-entity file (a submission's
//! comment thread, a user's inbox). `modify` is the only mutating operation;
//! it serializes concurrent writers to the same document via an exclusive
//! `fs2` advisory lock on a `.lock` sidecar, and writes through a temp file
//! plus `fs::rename` so a reader never observes a half-written document.

mod doc_path;
mod store;

pub use doc_path::DocPath;
pub use store::{DocStore, StoreError};
