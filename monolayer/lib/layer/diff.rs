use std::{
    ffi::OsStr,
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
    is_empty_dir, mirror, whiteout_for, DirSnapshot, Entry,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Computes the diff tree that turns a base tree into a modified tree.
///
/// Entries that only exist in the base become whiteouts. Entries that changed kind become a
/// whiteout for the old entry plus the new entry. Entries that only exist in the modified tree
/// are mirrored into the diff. Directories present on both sides that end up holding no changes
/// are pruned from the diff.
///
/// A file replaced by a symlink, or any other swap between non-directory kinds, is a kind change
/// too. Entries present on both sides with the same kind are not compared, so content and
/// attribute changes to existing files are not detected.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct DiffGenerator {
    /// Root of the original tree
    base_dir: PathBuf,

    /// Root of the tree holding the changes
    modified_dir: PathBuf,

    /// Root the diff is written to
    diff_dir: PathBuf,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DiffGenerator {
    /// Creates a new generator for the given base, modified and diff roots.
    pub fn new(
        base_dir: impl Into<PathBuf>,
        modified_dir: impl Into<PathBuf>,
        diff_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            modified_dir: modified_dir.into(),
            diff_dir: diff_dir.into(),
        }
    }

    /// Writes the diff between the base and the modified tree into the diff root.
    ///
    /// The diff root is created if it does not exist and is kept even when there are no changes.
    pub async fn generate(&self) -> MonolayerResult<()> {
        tracing::info!(
            "generating diff of {} against {} into {}",
            self.modified_dir.display(),
            self.base_dir.display(),
            self.diff_dir.display()
        );

        fs::create_dir_all(&self.diff_dir)
            .await
            .map_err(|e| MonolayerError::materialize(&self.diff_dir, e))?;

        Arc::new(self.clone())
            .generate_level(PathBuf::new(), None, false)
            .await
    }

    fn generate_level(
        self: Arc<Self>,
        subpath: PathBuf,
        entry: Option<Entry>,
        dir_added: bool,
    ) -> BoxFuture<'static, MonolayerResult<()>> {
        async move {
            let diff = self.diff_dir.join(&subpath);
            tracing::debug!("diffing level: /{} (added: {})", subpath.display(), dir_added);

            if let Some(entry) = &entry {
                fs::create_dir(&diff)
                    .await
                    .map_err(|e| MonolayerError::materialize(&diff, e))?;
                copy_ownership(entry, &diff).await?;
            }

            let mut children = Vec::new();
            let inline = self.reconcile(&subpath, dir_added, &mut children).await;
            let mut errors = fanout::settle(inline, children).await;

            if let Some(entry) = entry.as_ref().filter(|_| errors.is_empty()) {
                if let Err(e) = finish_dir(&diff, entry, dir_added).await {
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
        dir_added: bool,
        children: &mut Vec<LevelTask>,
    ) -> MonolayerResult<()> {
        let modified = self.modified_dir.join(subpath);
        let diff = self.diff_dir.join(subpath);

        let modified_snapshot = DirSnapshot::scan(&modified).await?;
        let base_snapshot = if dir_added {
            DirSnapshot::default()
        } else {
            DirSnapshot::scan(self.base_dir.join(subpath)).await?
        };

        for name in base_snapshot.iter().map(|(name, _)| name) {
            if !modified_snapshot.contains(name) {
                write_whiteout(&diff, name).await?;
            }
        }

        for (name, entry) in &modified_snapshot {
            let Some(base_entry) = base_snapshot.get(name) else {
                if entry.is_dir() {
                    children.push(self.spawn_level(subpath.join(name), entry, true));
                } else {
                    mirror(&modified.join(name), &diff.join(name), entry).await?;
                }
                continue;
            };

            match (base_entry.is_dir(), entry.is_dir()) {
                (true, true) => {
                    children.push(self.spawn_level(subpath.join(name), entry, false));
                }
                (true, false) => {
                    write_whiteout(&diff, name).await?;
                    mirror(&modified.join(name), &diff.join(name), entry).await?;
                }
                (false, true) => {
                    write_whiteout(&diff, name).await?;
                    children.push(self.spawn_level(subpath.join(name), entry, true));
                }
                (false, false) if base_entry.get_kind() != entry.get_kind() => {
                    write_whiteout(&diff, name).await?;
                    mirror(&modified.join(name), &diff.join(name), entry).await?;
                }
                (false, false) => {}
            }
        }

        Ok(())
    }

    fn spawn_level(self: &Arc<Self>, subpath: PathBuf, entry: &Entry, dir_added: bool) -> LevelTask {
        tokio::spawn(
            Arc::clone(self).generate_level(subpath, Some(entry.clone()), dir_added),
        )
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

async fn write_whiteout(dir: &Path, name: &OsStr) -> MonolayerResult<()> {
    let marker = dir.join(whiteout_for(name));
    tracing::debug!("creating whiteout: {}", marker.display());

    fs::File::create(&marker)
        .await
        .map_err(|e| MonolayerError::materialize(&marker, e))?;

    Ok(())
}

/// Drops a directory that existed in the base and holds no changes, or applies its mode.
async fn finish_dir(diff: &Path, entry: &Entry, dir_added: bool) -> MonolayerResult<()> {
    if !dir_added
        && is_empty_dir(diff)
            .await
            .map_err(|e| MonolayerError::scan(diff, e))?
    {
        tracing::debug!("pruning unchanged directory: {}", diff.display());
        return fs::remove_dir(diff)
            .await
            .map_err(|e| MonolayerError::materialize(diff, e));
    }

    copy_permissions(entry, diff).await
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
