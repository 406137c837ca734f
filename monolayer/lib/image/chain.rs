use std::path::{Path, PathBuf};

use futures::{stream, TryStreamExt};
use getset::Getters;
use tokio::fs;

use crate::{
    config::{BaseLayerStrategy, ChainConfig, DEFAULT_BASE_LAYER_ALIAS},
    layer::{remove_tree, DiffApplier},
    utils::{DIFF_SUBDIR, MERGED_SUBDIR},
    MonolayerError, MonolayerResult,
};

use super::clone_tree;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// One layer of a chain and the two directories it owns.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct Layer {
    /// The layer identifier, usually the hex part of the blob digest
    id: String,

    /// The change set of the layer
    diff_dir: PathBuf,

    /// The union of this layer with every layer before it
    merged_dir: PathBuf,
}

/// An ordered chain of layers materialized one transition at a time.
///
/// The first layer's diff already is a complete root filesystem, so its merged tree is an alias
/// of the diff. Every later layer is merged onto the merged tree of the layer before it.
///
/// ## Examples
///
/// ```no_run
/// use monolayer::{config::ChainConfig, image::LayerChain};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = ChainConfig::builder().root("/var/lib/layers").build();
/// let chain = LayerChain::new(config, ["a1b2", "c3d4"]);
/// let rootfs = chain.materialize().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct LayerChain {
    /// The chain configuration
    config: ChainConfig,

    /// The layers in application order
    layers: Vec<Layer>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Layer {
    /// Creates the descriptor of layer `id` stored below `root`.
    pub fn new(root: impl AsRef<Path>, id: impl Into<String>) -> Self {
        let id = id.into();
        let layer_dir = root.as_ref().join(&id);

        Self {
            diff_dir: layer_dir.join(DIFF_SUBDIR),
            merged_dir: layer_dir.join(MERGED_SUBDIR),
            id,
        }
    }
}

impl LayerChain {
    /// Creates a chain of the given layer identifiers below the configured root.
    pub fn new<I>(config: ChainConfig, ids: impl IntoIterator<Item = I>) -> Self
    where
        I: Into<String>,
    {
        let layers = ids
            .into_iter()
            .map(|id| Layer::new(config.get_root(), id))
            .collect();

        Self { config, layers }
    }

    /// Materializes every layer in order and returns the merged root of the last layer.
    ///
    /// A merged directory left over from a previous run is removed before the layer is
    /// materialized again. The chain stops at the first layer that fails; the directories of
    /// that layer are left as they are.
    ///
    /// ## Errors
    /// Returns error if:
    /// * The chain has no layers
    /// * The first layer's merged tree cannot be aliased or cloned
    /// * Merging any later layer fails
    pub async fn materialize(&self) -> MonolayerResult<PathBuf> {
        let (first, rest) = self
            .layers
            .split_first()
            .ok_or(MonolayerError::EmptyLayerChain)?;

        self.materialize_base(first).await?;

        stream::iter(rest.iter().map(Ok::<_, MonolayerError>))
            .try_fold(first.merged_dir.clone(), |previous, layer| async move {
                self.materialize_layer(&previous, layer).await?;
                Ok::<_, MonolayerError>(layer.merged_dir.clone())
            })
            .await
    }

    async fn materialize_base(&self, layer: &Layer) -> MonolayerResult<()> {
        tracing::info!("materializing base layer {}", layer.id);
        remove_tree(&layer.merged_dir).await?;

        match self.config.get_base_strategy() {
            BaseLayerStrategy::Symlink => {
                fs::symlink(DEFAULT_BASE_LAYER_ALIAS, &layer.merged_dir)
                    .await
                    .map_err(|e| MonolayerError::materialize(&layer.merged_dir, e))
            }
            BaseLayerStrategy::Clone => clone_tree(&layer.diff_dir, &layer.merged_dir).await,
        }
    }

    async fn materialize_layer(&self, previous: &Path, layer: &Layer) -> MonolayerResult<()> {
        tracing::info!("materializing layer {} onto {}", layer.id, previous.display());
        remove_tree(&layer.merged_dir).await?;

        fs::create_dir(&layer.merged_dir)
            .await
            .map_err(|e| MonolayerError::materialize(&layer.merged_dir, e))?;

        let result = DiffApplier::new(previous, &layer.diff_dir, &layer.merged_dir)
            .apply()
            .await;

        if let Err(e) = &result {
            tracing::error!("failed to materialize layer {}: {}", layer.id, e);
        }

        result
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_layer_chain_materializes_in_order() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let config = ChainConfig::builder().root(temp.path()).build();
        let chain = LayerChain::new(config, ["one", "two", "three"]);

        helper::write(&chain.layers[0].diff_dir, "etc/os-release", "v1").await?;
        helper::write(&chain.layers[0].diff_dir, "tmp/scratch", "scratch").await?;
        helper::write(&chain.layers[1].diff_dir, "etc/os-release", "v2").await?;
        helper::write(&chain.layers[1].diff_dir, "tmp/.wh.scratch", "").await?;
        helper::write(&chain.layers[2].diff_dir, "app/main", "main").await?;

        let rootfs = chain.materialize().await?;
        assert_eq!(rootfs, temp.path().join("three").join(MERGED_SUBDIR));

        let base = fs::symlink_metadata(&chain.layers[0].merged_dir).await?;
        assert!(base.file_type().is_symlink());
        assert_eq!(
            fs::read_link(&chain.layers[0].merged_dir).await?,
            PathBuf::from("./diff")
        );

        assert_eq!(fs::read_to_string(rootfs.join("etc/os-release")).await?, "v2");
        assert!(rootfs.join("tmp").is_dir());
        assert!(!rootfs.join("tmp/scratch").exists());
        assert!(rootfs.join("app/main").is_file());

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_layer_chain_replaces_stale_merged_directories() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let config = ChainConfig::builder().root(temp.path()).build();
        let chain = LayerChain::new(config, ["one", "two"]);

        helper::write(&chain.layers[0].diff_dir, "file", "one").await?;
        fs::create_dir_all(&chain.layers[1].diff_dir).await?;
        helper::write(&chain.layers[0].merged_dir, "stale", "stale").await?;
        helper::write(&chain.layers[1].merged_dir, "stale", "stale").await?;

        chain.materialize().await?;
        chain.materialize().await?;

        assert!(!chain.layers[1].merged_dir.join("stale").exists());
        assert!(chain.layers[1].merged_dir.join("file").is_file());
        assert!(!chain.layers[0].diff_dir.join("stale").exists());

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_layer_chain_stops_at_first_failure() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let config = ChainConfig::builder().root(temp.path()).build();
        let chain = LayerChain::new(config, ["one", "two", "three"]);

        helper::write(&chain.layers[0].diff_dir, "dir/file", "one").await?;
        // A diff that is a file cannot be scanned as a directory.
        fs::create_dir_all(temp.path().join("two")).await?;
        fs::write(&chain.layers[1].diff_dir, "broken").await?;
        helper::write(&chain.layers[2].diff_dir, "file", "three").await?;

        let result = chain.materialize().await;
        assert!(matches!(result, Err(MonolayerError::Scan { .. })));
        assert!(!chain.layers[2].merged_dir.exists());

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_layer_chain_empty() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let config = ChainConfig::builder().root(temp.path()).build();
        let chain = LayerChain::new(config, Vec::<String>::new());

        assert!(matches!(
            chain.materialize().await,
            Err(MonolayerError::EmptyLayerChain)
        ));

        Ok(())
    }

    mod helper {
        use super::*;

        /// Writes a file at `rel` below `root`, creating its parent directories.
        pub(super) async fn write(root: &Path, rel: &str, content: &str) -> anyhow::Result<()> {
            let path = root.join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(path, content).await?;

            Ok(())
        }
    }
}
