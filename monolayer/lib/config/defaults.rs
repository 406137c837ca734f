use std::{path::PathBuf, sync::LazyLock};

use crate::utils::MONOLAYER_HOME_DIR;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The path where all monolayer data is stored when `MONOLAYER_HOME` is not set.
///
/// Falls back to a relative `.monolayer` directory when the home directory cannot be resolved.
pub static DEFAULT_MONOLAYER_HOME: LazyLock<PathBuf> = LazyLock::new(|| {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(MONOLAYER_HOME_DIR)
});

/// The target of the symlink that aliases the first layer's merged tree to its diff.
pub const DEFAULT_BASE_LAYER_ALIAS: &str = "./diff";
