//! Utility functions and types.

mod env;
mod mode;
mod path;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use env::*;
pub use mode::*;
pub use path::*;
