//! Layer merging and diffing.
//!
//! This module implements the union-filesystem semantics of OCI image layers:
//!
//! 1. Merging (`DiffApplier`)
//!    - Applies a diff tree onto a base tree, writing the union into a merged tree
//!    - Regular whiteouts (`.wh.<name>`) remove `<name>` from the base
//!    - Opaque whiteouts (`.wh..wh..opq`) hide the entire base content of a directory
//!    - Erasure propagates into the subtrees of removed directories
//!
//! 2. Diffing (`DiffGenerator`)
//!    - Compares a base tree with a modified tree and writes the minimal diff tree
//!    - Removed and type-changed entries become whiteouts
//!    - Unmodified directories are pruned from the diff
//!
//! Both engines reconcile one directory level at a time and spawn one task per
//! subdirectory. File-level work happens inline on the task of its directory.
//!
//! # Examples
//!
//! ```no_run
//! use monolayer::layer::{DiffApplier, DiffGenerator};
//!
//! # async fn example() -> anyhow::Result<()> {
//! DiffApplier::new("/path/to/base", "/path/to/diff", "/path/to/merged")
//!     .apply()
//!     .await?;
//!
//! DiffGenerator::new("/path/to/base", "/path/to/modified", "/path/to/diff")
//!     .generate()
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod attributes;
mod diff;
mod fanout;
mod merge;
mod remove;
mod snapshot;
mod whiteout;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use attributes::*;
pub use diff::*;
pub use merge::*;
pub use remove::*;
pub use snapshot::*;
pub use whiteout::*;
