//! Configuration types and defaults for layer chains.

mod chain;
mod defaults;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use chain::*;
pub use defaults::*;
