use std::{io, os::unix::fs::PermissionsExt, path::Path};

use tokio::fs;

use crate::{MonolayerError, MonolayerResult};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Removes a layer directory left behind by a previous run.
///
/// A missing path is not an error. A symlink is removed as a link and its target is left alone,
/// which is what happens to a first layer's `merged -> ./diff` alias.
///
/// Materialized trees carry the permission bits of their source layers, so a directory may deny
/// its owner write or search access. Every directory is made `rwx` for its owner before the tree
/// is removed.
///
/// ## Errors
/// Returns error if:
/// * The path or a directory below it cannot be inspected
/// * Restoring directory permissions fails
/// * The removal itself fails
pub async fn remove_tree(path: impl AsRef<Path>) -> MonolayerResult<()> {
    let path = path.as_ref();
    let metadata = match fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(MonolayerError::scan(path, e)),
    };

    if !metadata.is_dir() {
        tracing::debug!("removing {}", path.display());
        return fs::remove_file(path)
            .await
            .map_err(|e| MonolayerError::materialize(path, e));
    }

    let mut dir_stack = vec![path.to_path_buf()];
    while let Some(dir) = dir_stack.pop() {
        let mode = fs::symlink_metadata(&dir)
            .await
            .map_err(|e| MonolayerError::scan(&dir, e))?
            .permissions()
            .mode();

        if mode & 0o700 != 0o700 {
            fs::set_permissions(&dir, std::fs::Permissions::from_mode(mode | 0o700))
                .await
                .map_err(|e| MonolayerError::materialize(&dir, e))?;
        }

        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| MonolayerError::scan(&dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| MonolayerError::scan(&dir, e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| MonolayerError::scan(entry.path(), e))?;
            if file_type.is_dir() {
                dir_stack.push(entry.path());
            }
        }
    }

    match fs::remove_dir_all(path).await {
        Ok(_) => tracing::debug!("removed {}", path.display()),
        Err(e) => {
            tracing::error!("failed to remove {}: {}", path.display(), e);
            return Err(MonolayerError::materialize(path, e));
        }
    }

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
