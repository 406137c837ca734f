use std::{env, path::PathBuf};

use crate::config::DEFAULT_MONOLAYER_HOME;

use super::LAYERS_SUBDIR;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Environment variable overriding the monolayer home directory.
pub const MONOLAYER_HOME_ENV_VAR: &str = "MONOLAYER_HOME";

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the monolayer home directory.
///
/// Uses `MONOLAYER_HOME` when it is set and not empty, otherwise `~/.monolayer`.
pub fn monolayer_home_path() -> PathBuf {
    match env::var(MONOLAYER_HOME_ENV_VAR) {
        Ok(home) if !home.is_empty() => PathBuf::from(home),
        _ => {
            tracing::debug!(
                "{MONOLAYER_HOME_ENV_VAR} is not set, using default: {}",
                DEFAULT_MONOLAYER_HOME.display()
            );
            DEFAULT_MONOLAYER_HOME.clone()
        }
    }
}

/// Returns the default root directory that images are unpacked into.
pub fn default_layers_path() -> PathBuf {
    monolayer_home_path().join(LAYERS_SUBDIR)
}
