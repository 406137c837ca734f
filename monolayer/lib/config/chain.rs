use std::path::PathBuf;

use getset::Getters;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::utils;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// How the first layer of a chain is materialized.
///
/// The first layer has no base to merge against, so its diff already is a complete root
/// filesystem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseLayerStrategy {
    /// `merged` is a relative symlink to `./diff`.
    #[default]
    Symlink,

    /// `merged` is a copy-on-write clone of `diff`. Only available on macOS.
    Clone,
}

/// Configuration for a layer chain.
///
/// ## Examples
///
/// ```
/// use monolayer::config::{BaseLayerStrategy, ChainConfig};
///
/// let config = ChainConfig::builder()
///     .root("/var/lib/monolayer/layers")
///     .base_strategy(BaseLayerStrategy::Symlink)
///     .build();
///
/// assert_eq!(config.get_base_strategy(), &BaseLayerStrategy::Symlink);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder, Getters, Serialize, Deserialize)]
#[getset(get = "pub with_prefix")]
pub struct ChainConfig {
    /// The directory holding one `<layer>/diff` and `<layer>/merged` pair per layer.
    #[builder(default = utils::default_layers_path(), setter(into))]
    root: PathBuf,

    /// How the first layer's merged tree is materialized.
    #[builder(default)]
    #[serde(default)]
    base_strategy: BaseLayerStrategy,
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for ChainConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
