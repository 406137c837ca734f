use std::{
    collections::HashMap,
    fmt,
    io::{self, BufReader, Read},
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use futures::future::try_join_all;
use getset::Getters;
use oci_spec::image::{Descriptor, Digest, ImageIndex, ImageManifest, MediaType, Platform};
use tokio::fs;
use typed_builder::TypedBuilder;

use crate::{
    config::ChainConfig,
    layer::remove_tree,
    utils::{OCI_BLOBS_SUBDIR, OCI_INDEX_FILENAME},
    MonolayerError, MonolayerResult,
};

use super::{Layer, LayerChain};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The media type of an uncompressed Docker layer.
pub const DOCKER_LAYER_TAR_MEDIA_TYPE: &str = "application/vnd.docker.image.rootfs.diff.tar";

/// The media type of a gzip compressed Docker layer.
pub const DOCKER_LAYER_TAR_GZIP_MEDIA_TYPE: &str =
    "application/vnd.docker.image.rootfs.diff.tar.gzip";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Unpacks an OCI image layout into a layer chain.
///
/// The image layout is read from `image_dir`:
///
/// ```text
/// image_dir/
/// ├── index.json
/// └── blobs/
///     └── sha256/
///         ├── <manifest hex>
///         └── <layer hex>
/// ```
///
/// Every layer blob is extracted into `<root>/<layer hex>/diff` and the layers are then
/// materialized in manifest order.
///
/// ## Examples
///
/// ```no_run
/// use monolayer::{config::ChainConfig, image::{ImageUnpacker, PlatformFilter}};
///
/// # async fn example() -> anyhow::Result<()> {
/// let unpacker = ImageUnpacker::builder()
///     .image_dir("/images/alpine")
///     .config(ChainConfig::builder().root("/var/lib/layers").build())
///     .platform(PlatformFilter::new("linux", "arm64"))
///     .build();
///
/// let manifest = unpacker.unpack().await?;
/// println!("unpacked {} layers", manifest.layers().len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ImageUnpacker {
    /// The root of the OCI image layout
    #[builder(setter(into))]
    image_dir: PathBuf,

    /// Where the layers are unpacked and how the base layer is materialized
    #[builder(default)]
    config: ChainConfig,

    /// Selects a manifest from the index; the first manifest is used when unset
    #[builder(default, setter(strip_option))]
    platform: Option<PlatformFilter>,

    /// Extracts layer blobs into diff directories
    #[builder(default = Arc::new(TarExtractor) as Arc<dyn LayerExtractor>)]
    extractor: Arc<dyn LayerExtractor>,
}

/// An `os`/`architecture` pair a manifest's platform must match.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct PlatformFilter {
    /// Operating system, e.g. `linux`
    os: String,

    /// CPU architecture, e.g. `amd64`
    architecture: String,
}

/// How a layer blob is compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerCompression {
    /// Plain tar archive
    None,

    /// Gzip compressed tar archive
    Gzip,
}

/// Extracts tar archives with the `tar` and `flate2` crates.
///
/// Permission bits, ownership and modification times stored in the archive are restored.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarExtractor;

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Extracts a layer blob into a diff directory.
#[async_trait]
pub trait LayerExtractor: fmt::Debug + Send + Sync {
    /// Extracts the blob at `blob`, of the given media type, into the existing directory `dest`.
    async fn extract(&self, blob: &Path, media_type: &MediaType, dest: &Path)
        -> MonolayerResult<()>;
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ImageUnpacker {
    /// Extracts every layer of the selected manifest and materializes the layer chain.
    ///
    /// Diff and merged directories left over from a previous run are removed first.
    ///
    /// ## Errors
    /// Returns error if:
    /// * `index.json` or the manifest blob cannot be read or decoded
    /// * No manifest matches the platform filter, or the index is empty
    /// * A layer uses an unsupported media type or fails to extract
    /// * Materializing the chain fails
    pub async fn unpack(&self) -> MonolayerResult<ImageManifest> {
        let index_path = self.image_dir.join(OCI_INDEX_FILENAME);
        let index: ImageIndex = serde_json::from_str(&read_image_file(&index_path).await?)?;

        let descriptor = self.select_manifest(&index, &index_path)?;
        tracing::info!("using manifest {}", descriptor.digest());

        let manifest_path = self.blob_path(descriptor.digest());
        let manifest: ImageManifest =
            serde_json::from_str(&read_image_file(&manifest_path).await?)?;

        let root = self.config.get_root();
        fs::create_dir_all(root)
            .await
            .map_err(|e| MonolayerError::materialize(root, e))?;

        let ids = layer_ids(manifest.layers());
        try_join_all(
            manifest
                .layers()
                .iter()
                .zip(&ids)
                .map(|(descriptor, id)| self.extract_layer(descriptor, id)),
        )
        .await?;

        let rootfs = LayerChain::new(self.config.clone(), ids).materialize().await?;
        tracing::info!("unpacked image into {}", rootfs.display());

        Ok(manifest)
    }

    fn select_manifest<'a>(
        &self,
        index: &'a ImageIndex,
        index_path: &Path,
    ) -> MonolayerResult<&'a Descriptor> {
        match &self.platform {
            None => index
                .manifests()
                .first()
                .ok_or_else(|| MonolayerError::ManifestNotFound(index_path.to_path_buf())),
            Some(filter) => index
                .manifests()
                .iter()
                .find(|m| m.platform().as_ref().is_some_and(|p| filter.matches(p)))
                .ok_or_else(|| MonolayerError::PlatformNotFound(filter.to_string())),
        }
    }

    async fn extract_layer(&self, descriptor: &Descriptor, id: &str) -> MonolayerResult<()> {
        let layer = Layer::new(self.config.get_root(), id);
        remove_tree(layer.get_diff_dir()).await?;
        remove_tree(layer.get_merged_dir()).await?;

        fs::create_dir_all(layer.get_diff_dir())
            .await
            .map_err(|e| MonolayerError::materialize(layer.get_diff_dir(), e))?;

        let blob = self.blob_path(descriptor.digest());
        tracing::info!("extracting layer {} ({})", id, descriptor.media_type());
        self.extractor
            .extract(&blob, descriptor.media_type(), layer.get_diff_dir())
            .await
    }

    fn blob_path(&self, digest: &Digest) -> PathBuf {
        self.image_dir
            .join(OCI_BLOBS_SUBDIR)
            .join(digest.algorithm().to_string())
            .join(digest.digest())
    }
}

impl PlatformFilter {
    /// Creates a filter for the given operating system and architecture.
    pub fn new(os: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            architecture: architecture.into(),
        }
    }

    /// Returns whether `platform` has this filter's operating system and architecture.
    pub fn matches(&self, platform: &Platform) -> bool {
        platform.os().to_string() == self.os
            && platform.architecture().to_string() == self.architecture
    }
}

impl LayerCompression {
    /// Determines the compression of a layer from its media type.
    ///
    /// ## Errors
    /// Returns [`MonolayerError::UnsupportedMediaType`] for anything but OCI or Docker tar layers.
    pub fn from_media_type(media_type: &MediaType) -> MonolayerResult<Self> {
        match media_type {
            MediaType::ImageLayer => Ok(LayerCompression::None),
            MediaType::ImageLayerGzip => Ok(LayerCompression::Gzip),
            other => match other.to_string().as_str() {
                DOCKER_LAYER_TAR_MEDIA_TYPE => Ok(LayerCompression::None),
                DOCKER_LAYER_TAR_GZIP_MEDIA_TYPE => Ok(LayerCompression::Gzip),
                unsupported => Err(MonolayerError::UnsupportedMediaType(unsupported.to_string())),
            },
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Names the layer directories after the digest hex. A digest that repeats is suffixed with its
/// occurrence count so every layer of the chain owns its own directories.
fn layer_ids(layers: &[Descriptor]) -> Vec<String> {
    let mut seen = HashMap::<String, usize>::new();
    layers
        .iter()
        .map(|descriptor| {
            let hex = descriptor.digest().digest().to_string();
            let count = seen.entry(hex.clone()).or_default();
            let id = match *count {
                0 => hex,
                n => format!("{}-{}", hex, n),
            };
            *count += 1;
            id
        })
        .collect()
}

async fn read_image_file(path: &Path) -> MonolayerResult<String> {
    fs::read_to_string(path)
        .await
        .map_err(|source| MonolayerError::ImageRead {
            path: path.to_path_buf(),
            source,
        })
}

fn unpack_archive(reader: impl Read, dest: &Path) -> io::Result<()> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.set_preserve_ownerships(true);
    archive.set_preserve_mtime(true);
    archive.unpack(dest)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl LayerExtractor for TarExtractor {
    async fn extract(
        &self,
        blob: &Path,
        media_type: &MediaType,
        dest: &Path,
    ) -> MonolayerResult<()> {
        let compression = LayerCompression::from_media_type(media_type)?;
        let blob = blob.to_path_buf();
        let dest = dest.to_path_buf();

        tokio::task::spawn_blocking(move || -> MonolayerResult<()> {
            let layer = blob.display().to_string();
            let file = std::fs::File::open(&blob).map_err(|source| {
                MonolayerError::LayerExtraction {
                    source,
                    layer: layer.clone(),
                }
            })?;

            let reader = BufReader::new(file);
            let result = match compression {
                LayerCompression::None => unpack_archive(reader, &dest),
                LayerCompression::Gzip => {
                    unpack_archive(flate2::read::GzDecoder::new(reader), &dest)
                }
            };

            result.map_err(|source| MonolayerError::LayerExtraction { source, layer })
        })
        .await?
    }
}

impl fmt::Display for PlatformFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
