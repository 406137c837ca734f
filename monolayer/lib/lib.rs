//! `monolayer` materializes container image filesystems from an ordered chain of OCI layers.
//!
//! # Overview
//!
//! Every layer of an OCI image is a sparse diff against the layer below it. Deletions are
//! expressed with whiteout markers: a `.wh.<name>` file removes `<name>` from the layers below,
//! and a `.wh..wh..opq` file hides the entire lower content of its directory. monolayer handles:
//!
//! - Applying a layer diff onto a base tree to produce a merged tree
//! - Generating a layer diff by comparing a base tree with a modified tree
//! - Chaining merges across all layers of an image
//! - Unpacking OCI image layouts into per-layer `diff` and `merged` directories
//!
//! # Architecture
//!
//! - **Layer**: the whiteout codec, directory snapshots, attribute mirroring and the
//!   merge/diff engines
//! - **Image**: the layer chain orchestrator and the OCI image unpacker
//! - **Config**: chain configuration and filesystem layout defaults
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use monolayer::layer::{DiffApplier, DiffGenerator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Merge a diff onto its base layer
//!     DiffApplier::new("/layers/base", "/layers/upper/diff", "/layers/upper/merged")
//!         .apply()
//!         .await?;
//!
//!     // Compute the diff that turns the base layer into a modified tree
//!     DiffGenerator::new("/layers/base", "/work/rootfs", "/layers/next/diff")
//!         .generate()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Storage
//!
//! Regular files are never copied. Merged and diff trees hardlink the files of the trees they
//! were built from, so a materialized tree must be treated as read-only.
//!
//! # Platform Support
//!
//! - Linux: Full support
//! - macOS: Full support, including copy-on-write cloning of the base layer
//! - Windows: Not supported
//!
//! The crate relies on Unix permission bits, ownership and symlinks throughout and does not
//! build for non-Unix targets.

#![warn(missing_docs)]
#![allow(clippy::module_inception)]

#[cfg(not(unix))]
compile_error!("monolayer only supports Unix targets");

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod cli;
pub mod config;
pub mod image;
pub mod layer;
pub mod utils;

pub use error::*;
