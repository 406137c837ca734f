use std::{
    error::Error,
    fmt::{self, Display},
    io,
    path::PathBuf,
};

use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a monolayer-related operation.
pub type MonolayerResult<T> = Result<T, MonolayerError>;

/// An error that occurred while merging, diffing or unpacking filesystem layers.
#[derive(pretty_error_debug::Debug, Error)]
pub enum MonolayerError {
    /// A directory exists but its entries could not be listed.
    #[error("failed to scan directory {path}: {source}")]
    Scan {
        /// The directory that could not be listed
        path: PathBuf,

        /// The underlying OS error
        source: io::Error,
    },

    /// A directory, symlink, hardlink, whiteout or attribute could not be written.
    #[error("failed to materialize {path}: {source}")]
    Materialize {
        /// The target path that could not be written
        path: PathBuf,

        /// The underlying OS error
        source: io::Error,
    },

    /// The ownership of a scanned entry could not be obtained on this platform.
    #[error("unsupported platform metadata: ownership unavailable for {0}")]
    UnsupportedPlatformMetadata(PathBuf),

    /// An operation that has no implementation on the current platform.
    #[error("unsupported platform operation: {0}")]
    UnsupportedPlatform(String),

    /// Several independent failures collected from one directory level.
    #[error("{0}")]
    Aggregate(AggregateError),

    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// An error that occurred when a join handle returned an error.
    #[error("join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    /// An error that occurred while decoding JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error that occurred while decoding an OCI image descriptor.
    #[error("oci spec error: {0}")]
    OciSpec(#[from] oci_spec::OciSpecError),

    /// A file of the OCI image layout could not be read.
    #[error("failed to read image file {path}: {source}")]
    ImageRead {
        /// The `index.json` or blob that could not be read
        path: PathBuf,

        /// The underlying OS error
        source: io::Error,
    },

    /// The image index does not list any manifests.
    #[error("image index does not contain any manifests: {0}")]
    ManifestNotFound(PathBuf),

    /// No manifest in the image index matches the requested platform.
    #[error("no image manifest matches platform {0}")]
    PlatformNotFound(String),

    /// A layer blob uses a media type that cannot be extracted.
    #[error("unsupported layer media type: {0}")]
    UnsupportedMediaType(String),

    /// A layer blob could not be extracted into its diff directory.
    #[error("layer extraction failed for {layer}: {source}")]
    LayerExtraction {
        /// The underlying I/O error
        source: io::Error,

        /// The layer blob being extracted
        layer: String,
    },

    /// The layer chain is empty.
    #[error("layer chain is empty")]
    EmptyLayerChain,
}

/// An ordered collection of errors, none of which is dropped in favor of another.
#[derive(Debug, Default)]
pub struct AggregateError {
    errors: Vec<MonolayerError>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl MonolayerError {
    /// Creates a `Scan` error for the given directory.
    pub fn scan(path: impl Into<PathBuf>, source: io::Error) -> MonolayerError {
        MonolayerError::Scan {
            path: path.into(),
            source,
        }
    }

    /// Creates a `Materialize` error for the given target path.
    pub fn materialize(path: impl Into<PathBuf>, source: io::Error) -> MonolayerError {
        MonolayerError::Materialize {
            path: path.into(),
            source,
        }
    }

    /// Combines a list of errors into a single result.
    ///
    /// An empty list is a success, a single error is returned as is, and anything more is
    /// wrapped in an [`AggregateError`] with nested aggregates flattened in order.
    pub fn combine(errors: impl IntoIterator<Item = MonolayerError>) -> MonolayerResult<()> {
        let mut aggregate = AggregateError::default();
        for error in errors {
            aggregate.push(error);
        }

        match aggregate.errors.len() {
            0 => Ok(()),
            1 => Err(aggregate.errors.remove(0)),
            _ => Err(MonolayerError::Aggregate(aggregate)),
        }
    }

    /// Returns the individual failures this error stands for.
    pub fn failures(&self) -> Vec<&MonolayerError> {
        match self {
            MonolayerError::Aggregate(aggregate) => aggregate.errors.iter().collect(),
            other => vec![other],
        }
    }
}

impl AggregateError {
    /// Appends an error, flattening it if it is itself an aggregate.
    pub fn push(&mut self, error: MonolayerError) {
        match error {
            MonolayerError::Aggregate(nested) => self.errors.extend(nested.errors),
            other => self.errors.push(other),
        }
    }

    /// Returns the collected errors in the order they were recorded.
    pub fn errors(&self) -> &[MonolayerError] {
        &self.errors
    }

    /// Returns the number of collected errors.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Returns `true` if no errors were collected.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} errors occurred:", self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n\t* {}", error)?;
        }

        Ok(())
    }
}

impl Error for AggregateError {}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
