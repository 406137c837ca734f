use std::path::Path;

use crate::{MonolayerError, MonolayerResult};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Creates a copy-on-write clone of the tree at `source` at the path `target`.
///
/// `target` must not exist. A symlink at `source` is cloned as a symlink.
///
/// ## Platform support
/// Only macOS provides a tree clone (`clonefile(2)`). Everywhere else this returns
/// [`MonolayerError::UnsupportedPlatform`].
#[cfg(target_os = "macos")]
pub async fn clone_tree(source: impl AsRef<Path>, target: impl AsRef<Path>) -> MonolayerResult<()> {
    use std::{ffi::CString, io, os::unix::ffi::OsStrExt};

    let source = source.as_ref();
    let target = target.as_ref();
    let to_cstring = |path: &Path| {
        CString::new(path.as_os_str().as_bytes()).map_err(|e| {
            MonolayerError::materialize(target, io::Error::new(io::ErrorKind::InvalidInput, e))
        })
    };

    let src = to_cstring(source)?;
    let dst = to_cstring(target)?;

    tracing::debug!("cloning {} to {}", source.display(), target.display());
    tokio::task::spawn_blocking(move || {
        // SAFETY: both pointers come from live, NUL-terminated CStrings.
        let rc = unsafe { libc::clonefile(src.as_ptr(), dst.as_ptr(), libc::CLONE_NOFOLLOW) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    })
    .await?
    .map_err(|e| MonolayerError::materialize(target, e))
}

/// Creates a copy-on-write clone of the tree at `source` at the path `target`.
///
/// `target` must not exist. A symlink at `source` is cloned as a symlink.
///
/// ## Platform support
/// Only macOS provides a tree clone (`clonefile(2)`). Everywhere else this returns
/// [`MonolayerError::UnsupportedPlatform`].
#[cfg(not(target_os = "macos"))]
pub async fn clone_tree(source: impl AsRef<Path>, target: impl AsRef<Path>) -> MonolayerResult<()> {
    tracing::warn!(
        "cannot clone {} to {}: copy-on-write clones require macOS",
        source.as_ref().display(),
        target.as_ref().display()
    );

    Err(MonolayerError::UnsupportedPlatform(
        "copy-on-write clone requires macOS".to_string(),
    ))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
