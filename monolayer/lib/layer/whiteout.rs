use std::{
    ffi::{OsStr, OsString},
    os::unix::ffi::OsStrExt,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The filename prefix that marks a whiteout file.
pub const WHITEOUT_PREFIX: &str = ".wh.";

/// The filename of an opaque whiteout marker.
pub const OPAQUE_WHITEOUT_MARKER: &str = ".wh..wh..opq";

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns `true` if the filename is a whiteout marker, including the opaque marker.
pub fn is_whiteout(name: impl AsRef<OsStr>) -> bool {
    name.as_ref()
        .as_bytes()
        .starts_with(WHITEOUT_PREFIX.as_bytes())
}

/// Returns `true` if the filename is the opaque whiteout marker.
pub fn is_opaque_whiteout(name: impl AsRef<OsStr>) -> bool {
    name.as_ref() == OsStr::new(OPAQUE_WHITEOUT_MARKER)
}

/// Returns the whiteout marker that deletes `name`.
///
/// Callers must not pass a name that already is a marker.
///
/// ## Examples
///
/// ```
/// use monolayer::layer::whiteout_for;
///
/// assert_eq!(whiteout_for("file.txt"), ".wh.file.txt");
/// ```
pub fn whiteout_for(name: impl AsRef<OsStr>) -> OsString {
    let name = name.as_ref();
    let mut marker = OsString::with_capacity(WHITEOUT_PREFIX.len() + name.len());
    marker.push(WHITEOUT_PREFIX);
    marker.push(name);
    marker
}

/// Returns the name a whiteout marker deletes.
///
/// Returns `None` for names that are not markers and for the opaque marker, which deletes the
/// content of its directory rather than a single name.
pub fn original_name(marker: &OsStr) -> Option<&OsStr> {
    if is_opaque_whiteout(marker) {
        return None;
    }

    marker
        .as_bytes()
        .strip_prefix(WHITEOUT_PREFIX.as_bytes())
        .map(OsStr::from_bytes)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
