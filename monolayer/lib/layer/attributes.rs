use std::{fs::Metadata, io, os::unix::fs::PermissionsExt, path::Path};

use tokio::fs;

use crate::{utils, MonolayerError, MonolayerResult};

use super::{Entry, EntryKind};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The owning user and group of a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ownership {
    /// The owning user id
    pub uid: u32,

    /// The owning group id
    pub gid: u32,
}

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Extracts the ownership of an entry from platform-specific metadata.
///
/// A provider that returns `None` surfaces as [`MonolayerError::UnsupportedPlatformMetadata`]
/// when the ownership is applied.
pub trait OwnershipProvider {
    /// Returns the owning user and group, if the platform exposes them.
    fn ownership(&self) -> Option<Ownership>;
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Applies the permission bits and ownership of `entry` to the existing path `target`.
///
/// Permission bits are skipped for symlinks, which carry no mode of their own. Ownership is
/// applied without following a final symlink.
///
/// ## Errors
/// Returns error if:
/// * The entry's ownership could not be obtained on this platform
/// * The chmod or chown fails, e.g. for lack of privilege
pub async fn copy_attributes(entry: &Entry, target: &Path) -> MonolayerResult<()> {
    copy_permissions(entry, target).await?;
    copy_ownership(entry, target).await
}

/// Applies the permission bits of `entry` to `target`. Does nothing for symlinks.
pub async fn copy_permissions(entry: &Entry, target: &Path) -> MonolayerResult<()> {
    if entry.get_kind() == EntryKind::Symlink {
        return Ok(());
    }

    let mode = entry.get_mode();
    fs::set_permissions(target, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|e| MonolayerError::materialize(target, e))?;

    tracing::trace!(
        "applied permissions to {}: {} ({:#o})",
        target.display(),
        utils::format_mode(mode),
        mode
    );

    Ok(())
}

/// Applies the ownership of `entry` to `target` without following a final symlink.
pub async fn copy_ownership(entry: &Entry, target: &Path) -> MonolayerResult<()> {
    let Ownership { uid, gid } = entry
        .get_ownership()
        .ok_or_else(|| MonolayerError::UnsupportedPlatformMetadata(target.to_path_buf()))?;

    let owned_target = target.to_path_buf();
    tokio::task::spawn_blocking(move || lchown(&owned_target, uid, gid))
        .await?
        .map_err(|e| MonolayerError::materialize(target, e))?;

    tracing::trace!("applied ownership to {}: {}:{}", target.display(), uid, gid);
    Ok(())
}

/// Materializes `entry`, found at `source`, at the path `target`.
///
/// - Symlinks are recreated with the same target and ownership
/// - Everything else is hardlinked, so `target` shares the inode of `source`
///
/// Directories are created by the caller and are rejected here.
pub async fn mirror(source: &Path, target: &Path, entry: &Entry) -> MonolayerResult<()> {
    match entry.get_kind() {
        EntryKind::Symlink => {
            let link = match entry.get_symlink_target() {
                Some(link) => link.clone(),
                None => fs::read_link(source)
                    .await
                    .map_err(|e| MonolayerError::scan(source, e))?,
            };

            tracing::debug!(
                "creating symlink: {} -> {}",
                target.display(),
                link.display()
            );
            fs::symlink(&link, target)
                .await
                .map_err(|e| MonolayerError::materialize(target, e))?;

            copy_attributes(entry, target).await
        }
        EntryKind::Directory => Err(MonolayerError::materialize(
            target,
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "directories must be created by the caller",
            ),
        )),
        EntryKind::File | EntryKind::Other => {
            tracing::debug!(
                "hardlinking: {} -> {}",
                source.display(),
                target.display()
            );
            fs::hard_link(source, target)
                .await
                .map_err(|e| MonolayerError::materialize(target, e))
        }
    }
}

fn lchown(path: &Path, uid: u32, gid: u32) -> io::Result<()> {
    std::os::unix::fs::lchown(path, Some(uid), Some(gid))
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl OwnershipProvider for Metadata {
    fn ownership(&self) -> Option<Ownership> {
        use std::os::unix::fs::MetadataExt;

        Some(Ownership {
            uid: self.uid(),
            gid: self.gid(),
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::os::unix::fs::{symlink, MetadataExt};

    use nix::{sys::stat::Mode, unistd};
    use tempfile::tempdir;

    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_attributes_mirror_hardlinks_regular_files() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let source = temp.path().join("source.txt");
        let target = temp.path().join("target.txt");
        fs::write(&source, "content").await?;
        fs::set_permissions(&source, std::fs::Permissions::from_mode(0o600)).await?;

        let entry = Entry::from_path(&source).await?;
        mirror(&source, &target, &entry).await?;

        let source_meta = fs::symlink_metadata(&source).await?;
        let target_meta = fs::symlink_metadata(&target).await?;
        assert_eq!(source_meta.ino(), target_meta.ino());
        assert_eq!(target_meta.nlink(), 2);
        assert_eq!(target_meta.permissions().mode() & 0o777, 0o600);
        assert_eq!(fs::read_to_string(&target).await?, "content");

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_attributes_mirror_recreates_symlinks() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let source = temp.path().join("link");
        let target = temp.path().join("copy");
        symlink("../some/where", &source)?;

        let entry = Entry::from_path(&source).await?;
        mirror(&source, &target, &entry).await?;

        let target_meta = fs::symlink_metadata(&target).await?;
        assert!(target_meta.file_type().is_symlink());
        assert_ne!(target_meta.ino(), fs::symlink_metadata(&source).await?.ino());
        assert_eq!(
            fs::read_link(&target).await?,
            std::path::PathBuf::from("../some/where")
        );

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_attributes_mirror_hardlinks_fifos() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let source = temp.path().join("pipe");
        let target = temp.path().join("pipe_copy");
        unistd::mkfifo(&source, Mode::from_bits_truncate(0o644))?;

        let entry = Entry::from_path(&source).await?;
        assert_eq!(entry.get_kind(), EntryKind::Other);
        mirror(&source, &target, &entry).await?;

        assert_eq!(
            fs::symlink_metadata(&source).await?.ino(),
            fs::symlink_metadata(&target).await?.ino()
        );

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_attributes_mirror_rejects_directories() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let source = temp.path().join("dir");
        fs::create_dir(&source).await?;

        let entry = Entry::from_path(&source).await?;
        let result = mirror(&source, &temp.path().join("dir_copy"), &entry).await;
        assert!(matches!(result, Err(MonolayerError::Materialize { .. })));

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_attributes_copy_attributes_to_directory() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let source = temp.path().join("source");
        let target = temp.path().join("target");
        fs::create_dir(&source).await?;
        fs::create_dir(&target).await?;
        fs::set_permissions(&source, std::fs::Permissions::from_mode(0o1751)).await?;

        let entry = Entry::from_path(&source).await?;
        copy_attributes(&entry, &target).await?;

        let source_meta = fs::metadata(&source).await?;
        let target_meta = fs::metadata(&target).await?;
        assert_eq!(target_meta.permissions().mode() & 0o7777, 0o1751);
        assert_eq!(target_meta.uid(), source_meta.uid());
        assert_eq!(target_meta.gid(), source_meta.gid());

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_attributes_missing_ownership_is_unsupported() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let source = temp.path().join("source");
        let target = temp.path().join("target");
        fs::create_dir(&source).await?;
        fs::create_dir(&target).await?;
        fs::set_permissions(&source, std::fs::Permissions::from_mode(0o750)).await?;

        let entry = Entry::from_path(&source).await?.with_ownership(None);
        assert!(entry.get_ownership().is_none());

        let result = copy_ownership(&entry, &target).await;
        assert!(
            matches!(result, Err(MonolayerError::UnsupportedPlatformMetadata(ref path)) if path == &target)
        );

        let result = copy_attributes(&entry, &target).await;
        assert!(matches!(
            result,
            Err(MonolayerError::UnsupportedPlatformMetadata(_))
        ));
        let mode = fs::metadata(&target).await?.permissions().mode();
        assert_eq!(mode & 0o7777, 0o750);

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_attributes_copy_to_missing_target_fails() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let source = temp.path().join("source");
        fs::write(&source, "x").await?;

        let entry = Entry::from_path(&source).await?;
        let result = copy_attributes(&entry, &temp.path().join("missing")).await;
        assert!(matches!(result, Err(MonolayerError::Materialize { .. })));

        Ok(())
    }
}
