use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::future::{BoxFuture, FutureExt};
use getset::Getters;
use tokio::fs;

use crate::{MonolayerError, MonolayerResult};

use super::{
    copy_ownership, copy_permissions,
    fanout::{self, LevelTask},
    is_whiteout, mirror, whiteout_for, DirSnapshot, Entry,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Applies a diff tree onto a base tree, materializing their union into a merged tree.
///
/// The diff always wins over the base. A whiteout `.wh.<name>` in the diff removes `<name>` from
/// the base, and an opaque whiteout hides everything the base holds in that directory. Once a
/// directory's base content is hidden, the whole subtree below it ignores the base as well.
///
/// Regular files are hardlinked into the merged tree, so the merged tree shares inodes with the
/// base and diff trees and must be treated as read-only.
///
/// ## Examples
///
/// ```no_run
/// use monolayer::layer::DiffApplier;
///
/// # async fn example() -> anyhow::Result<()> {
/// let applier = DiffApplier::new("/layers/a/merged", "/layers/b/diff", "/layers/b/merged");
/// applier.apply().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct DiffApplier {
    /// Root of the tree the diff is applied onto
    base_dir: PathBuf,

    /// Root of the change set
    diff_dir: PathBuf,

    /// Root the union is written to
    merged_dir: PathBuf,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DiffApplier {
    /// Creates a new applier for the given base, diff and merged roots.
    pub fn new(
        base_dir: impl Into<PathBuf>,
        diff_dir: impl Into<PathBuf>,
        merged_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            diff_dir: diff_dir.into(),
            merged_dir: merged_dir.into(),
        }
    }

    /// Merges the diff onto the base, writing the result into the merged root.
    ///
    /// The merged root is created if it does not exist. Its own attributes are left untouched.
    ///
    /// ## Errors
    /// Returns the first inline failure of a level combined with the failures of every
    /// subdirectory task already spawned at that level. Partially materialized output is left
    /// on disk.
    pub async fn apply(&self) -> MonolayerResult<()> {
        tracing::info!(
            "applying diff {} onto {} into {}",
            self.diff_dir.display(),
            self.base_dir.display(),
            self.merged_dir.display()
        );

        fs::create_dir_all(&self.merged_dir)
            .await
            .map_err(|e| MonolayerError::materialize(&self.merged_dir, e))?;

        Arc::new(self.clone())
            .apply_level(PathBuf::new(), None, false)
            .await
    }

    fn apply_level(
        self: Arc<Self>,
        subpath: PathBuf,
        entry: Option<Entry>,
        erased: bool,
    ) -> BoxFuture<'static, MonolayerResult<()>> {
        async move {
            let merged = self.merged_dir.join(&subpath);
            tracing::debug!("merging level: /{} (erased: {})", subpath.display(), erased);

            if let Some(entry) = &entry {
                fs::create_dir(&merged)
                    .await
                    .map_err(|e| MonolayerError::materialize(&merged, e))?;
                copy_ownership(entry, &merged).await?;
            }

            let mut children = Vec::new();
            let inline = self.reconcile(&subpath, erased, &mut children).await;
            let mut errors = fanout::settle(inline, children).await;

            // Directory modes are applied last so a restrictive mode never blocks the writes below.
            if let Some(entry) = entry.as_ref().filter(|_| errors.is_empty()) {
                if let Err(e) = copy_permissions(entry, &merged).await {
                    errors.push(e);
                }
            }

            MonolayerError::combine(errors)
        }
        .boxed()
    }

    async fn reconcile(
        self: &Arc<Self>,
        subpath: &Path,
        erased: bool,
        children: &mut Vec<LevelTask>,
    ) -> MonolayerResult<()> {
        let base = self.base_dir.join(subpath);
        let diff = self.diff_dir.join(subpath);
        let merged = self.merged_dir.join(subpath);

        let diff_snapshot = DirSnapshot::scan(&diff).await?;
        let ignore_base = erased || diff_snapshot.has_opaque_whiteout();
        let base_snapshot = if ignore_base {
            DirSnapshot::default()
        } else {
            DirSnapshot::scan(&base).await?
        };

        for (name, entry) in &base_snapshot {
            if diff_snapshot.contains(name) || diff_snapshot.contains(whiteout_for(name)) {
                tracing::trace!("skipping base entry: {}", base.join(name).display());
                continue;
            }

            if entry.is_dir() {
                children.push(self.spawn_level(subpath.join(name), entry, false));
            } else {
                mirror(&base.join(name), &merged.join(name), entry).await?;
            }
        }

        for (name, entry) in &diff_snapshot {
            if is_whiteout(name) {
                continue;
            }

            if entry.is_dir() {
                // A base entry of another kind cannot contribute children to this directory.
                let child_erased = ignore_base
                    || diff_snapshot.contains(whiteout_for(name))
                    || base_snapshot.get(name).is_some_and(|b| !b.is_dir());
                children.push(self.spawn_level(subpath.join(name), entry, child_erased));
            } else {
                mirror(&diff.join(name), &merged.join(name), entry).await?;
            }
        }

        Ok(())
    }

    fn spawn_level(self: &Arc<Self>, subpath: PathBuf, entry: &Entry, erased: bool) -> LevelTask {
        tokio::spawn(
            Arc::clone(self).apply_level(subpath, Some(entry.clone()), erased),
        )
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::os::unix::fs::{symlink, MetadataExt, PermissionsExt};

    use tempfile::tempdir;

    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_layer_merge_union_of_disjoint_trees() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let (base, diff, merged) = helper::roots(temp.path()).await?;

        helper::write(&base, "etc/hostname", "base").await?;
        helper::write(&base, "bin/sh", "shell").await?;
        helper::write(&diff, "etc/hosts", "hosts").await?;
        symlink("sh", diff.join("bin_link"))?;

        DiffApplier::new(&base, &diff, &merged).apply().await?;

        assert_eq!(fs::read_to_string(merged.join("etc/hostname")).await?, "base");
        assert_eq!(fs::read_to_string(merged.join("etc/hosts")).await?, "hosts");
        assert_eq!(fs::read_to_string(merged.join("bin/sh")).await?, "shell");
        assert_eq!(fs::read_link(merged.join("bin_link")).await?, PathBuf::from("sh"));

        let base_ino = fs::metadata(base.join("bin/sh")).await?.ino();
        assert_eq!(fs::metadata(merged.join("bin/sh")).await?.ino(), base_ino);

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_layer_merge_diff_overwrites_base() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let (base, diff, merged) = helper::roots(temp.path()).await?;

        helper::write(&base, "config", "old").await?;
        helper::write(&diff, "config", "new").await?;

        DiffApplier::new(&base, &diff, &merged).apply().await?;

        assert_eq!(fs::read_to_string(merged.join("config")).await?, "new");
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_layer_merge_whiteout_removes_base_entries() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let (base, diff, merged) = helper::roots(temp.path()).await?;

        helper::write(&base, "keep.txt", "keep").await?;
        helper::write(&base, "gone.txt", "gone").await?;
        helper::write(&base, "gone_dir/inner.txt", "inner").await?;
        helper::write(&diff, ".wh.gone.txt", "").await?;
        helper::write(&diff, ".wh.gone_dir", "").await?;

        DiffApplier::new(&base, &diff, &merged).apply().await?;

        assert!(merged.join("keep.txt").exists());
        assert!(!merged.join("gone.txt").exists());
        assert!(!merged.join("gone_dir").exists());
        assert!(!merged.join(".wh.gone.txt").exists());
        assert!(!merged.join(".wh.gone_dir").exists());

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_layer_merge_opaque_whiteout_hides_base_directory() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let (base, diff, merged) = helper::roots(temp.path()).await?;

        helper::write(&base, "dir/old.txt", "old").await?;
        helper::write(&base, "dir/sub/deep.txt", "deep").await?;
        helper::write(&diff, "dir/.wh..wh..opq", "").await?;
        helper::write(&diff, "dir/sub/new.txt", "new").await?;

        DiffApplier::new(&base, &diff, &merged).apply().await?;

        assert!(!merged.join("dir/old.txt").exists());
        assert!(!merged.join("dir/sub/deep.txt").exists());
        assert!(merged.join("dir/sub/new.txt").exists());
        assert!(!merged.join("dir/.wh..wh..opq").exists());

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_layer_merge_whiteout_then_readd_erases_subtree() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let (base, diff, merged) = helper::roots(temp.path()).await?;

        helper::write(&base, "d/x", "x").await?;
        helper::write(&base, "d/e/y", "y").await?;
        helper::write(&diff, ".wh.d", "").await?;
        helper::write(&diff, "d/z", "z").await?;
        fs::create_dir(diff.join("d/e")).await?;

        DiffApplier::new(&base, &diff, &merged).apply().await?;

        assert!(merged.join("d/z").exists());
        assert!(merged.join("d/e").is_dir());
        assert!(!merged.join("d/x").exists());
        assert!(!merged.join("d/e/y").exists());

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_layer_merge_type_changes() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let (base, diff, merged) = helper::roots(temp.path()).await?;

        helper::write(&base, "was_file", "file").await?;
        helper::write(&diff, "was_file/child", "child").await?;
        helper::write(&base, "was_dir/child", "child").await?;
        helper::write(&diff, "was_dir", "now a file").await?;

        DiffApplier::new(&base, &diff, &merged).apply().await?;

        assert!(merged.join("was_file").is_dir());
        assert!(merged.join("was_file/child").is_file());
        assert!(merged.join("was_dir").is_file());
        assert_eq!(fs::read_to_string(merged.join("was_dir")).await?, "now a file");

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_layer_merge_copies_directory_attributes() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let (base, diff, merged) = helper::roots(temp.path()).await?;

        helper::write(&base, "locked/file.txt", "content").await?;
        fs::set_permissions(base.join("locked"), std::fs::Permissions::from_mode(0o555)).await?;
        fs::create_dir(diff.join("sticky")).await?;
        fs::set_permissions(diff.join("sticky"), std::fs::Permissions::from_mode(0o1777)).await?;

        let result = DiffApplier::new(&base, &diff, &merged).apply().await;
        fs::set_permissions(base.join("locked"), std::fs::Permissions::from_mode(0o755)).await?;
        result?;

        let locked = fs::metadata(merged.join("locked")).await?;
        assert_eq!(locked.permissions().mode() & 0o7777, 0o555);
        assert!(merged.join("locked/file.txt").exists());

        let sticky = fs::metadata(merged.join("sticky")).await?;
        assert_eq!(sticky.permissions().mode() & 0o7777, 0o1777);

        fs::set_permissions(merged.join("locked"), std::fs::Permissions::from_mode(0o755)).await?;
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_layer_merge_missing_base_and_diff_directories() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let merged = temp.path().join("merged");

        DiffApplier::new(temp.path().join("no_base"), temp.path().join("no_diff"), &merged)
            .apply()
            .await?;

        assert!(merged.is_dir());
        assert_eq!(std::fs::read_dir(&merged)?.count(), 0);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_layer_merge_inline_failure_is_reported() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let (base, diff, merged) = helper::roots(temp.path()).await?;

        helper::write(&base, "file.txt", "base").await?;
        helper::write(&merged, "file.txt", "already here").await?;

        let result = DiffApplier::new(&base, &diff, &merged).apply().await;
        match result {
            Err(MonolayerError::Materialize { path, .. }) => {
                assert_eq!(path, merged.join("file.txt"))
            }
            other => panic!("expected a materialize error, got {:?}", other),
        }

        Ok(())
    }

    mod helper {
        use super::*;

        /// Creates empty base, diff and merged roots under `root`.
        pub(super) async fn roots(root: &Path) -> anyhow::Result<(PathBuf, PathBuf, PathBuf)> {
            let base = root.join("base");
            let diff = root.join("diff");
            let merged = root.join("merged");
            fs::create_dir_all(&base).await?;
            fs::create_dir_all(&diff).await?;

            Ok((base, diff, merged))
        }

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
