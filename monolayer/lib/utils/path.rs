//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The directory under the user's home where monolayer data is stored.
pub const MONOLAYER_HOME_DIR: &str = ".monolayer";

/// The sub directory of the monolayer home where unpacked layers are stored.
pub const LAYERS_SUBDIR: &str = "layers";

/// The sub directory of a layer holding its change set.
pub const DIFF_SUBDIR: &str = "diff";

/// The sub directory of a layer holding its materialized union.
pub const MERGED_SUBDIR: &str = "merged";

/// The filename of the image index in an OCI image layout.
pub const OCI_INDEX_FILENAME: &str = "index.json";

/// The sub directory of an OCI image layout holding content-addressed blobs.
pub const OCI_BLOBS_SUBDIR: &str = "blobs";
