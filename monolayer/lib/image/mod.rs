//! Layer chains and OCI image layouts.
//!
//! A chain materializes every layer of an image in order. Each layer owns a `diff` directory
//! with its change set and a `merged` directory with the union of all layers up to it:
//!
//! ```text
//! <root>/
//! ├── <layer 0>/
//! │   ├── diff/
//! │   └── merged -> ./diff
//! └── <layer 1>/
//!     ├── diff/
//!     └── merged/   (<layer 0>/merged + <layer 1>/diff)
//! ```
//!
//! The [`ImageUnpacker`] fills the `diff` directories from the layer blobs of an OCI image
//! layout and then runs the chain.

mod chain;
mod clone;
mod unpack;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use chain::*;
pub use clone::*;
pub use unpack::*;
