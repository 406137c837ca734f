use std::{
    collections::{hash_map, HashMap},
    ffi::{OsStr, OsString},
    fs::Metadata,
    io,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use getset::{CopyGetters, Getters};
use tokio::fs;

use crate::{MonolayerError, MonolayerResult};

use super::{Ownership, OwnershipProvider, OPAQUE_WHITEOUT_MARKER};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The kind of a filesystem entry, as reported without following symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Regular file
    File,

    /// Directory
    Directory,

    /// Symbolic link
    Symlink,

    /// FIFO, socket or device node
    Other,
}

/// A snapshot of one filesystem entry taken at scan time.
///
/// Entries are not kept live. They describe the entry as it was when its directory was scanned.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct Entry {
    /// The base filename of the entry
    #[getset(get = "pub with_prefix")]
    name: OsString,

    /// The kind of the entry
    #[getset(get_copy = "pub with_prefix")]
    kind: EntryKind,

    /// Permission bits, including setuid, setgid and sticky
    #[getset(get_copy = "pub with_prefix")]
    mode: u32,

    /// Owning user and group, if the platform exposes them
    #[getset(get_copy = "pub with_prefix")]
    ownership: Option<Ownership>,

    /// The target of a symlink
    #[getset(get = "pub with_prefix")]
    symlink_target: Option<PathBuf>,
}

/// The immediate children of one directory, keyed by filename.
///
/// A snapshot is not recursive and its iteration order carries no meaning.
#[derive(Debug, Clone, Default)]
pub struct DirSnapshot {
    entries: HashMap<OsString, Entry>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl EntryKind {
    /// Classifies the file type of `lstat`-style metadata.
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let file_type = metadata.file_type();
        if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        }
    }
}

impl Entry {
    /// Creates an entry from `lstat`-style metadata.
    pub fn new(
        name: impl Into<OsString>,
        metadata: &Metadata,
        symlink_target: Option<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::from_metadata(metadata),
            mode: metadata.permissions().mode() & 0o7777,
            ownership: metadata.ownership(),
            symlink_target,
        }
    }

    /// Reads the entry at `path` without following a final symlink.
    pub async fn from_path(path: impl AsRef<Path>) -> MonolayerResult<Self> {
        let path = path.as_ref();
        let metadata = fs::symlink_metadata(path)
            .await
            .map_err(|e| MonolayerError::scan(path, e))?;

        let symlink_target = if metadata.file_type().is_symlink() {
            Some(
                fs::read_link(path)
                    .await
                    .map_err(|e| MonolayerError::scan(path, e))?,
            )
        } else {
            None
        };

        let name = path.file_name().map(OsStr::to_os_string).unwrap_or_default();
        Ok(Self::new(name, &metadata, symlink_target))
    }

    /// Replaces the ownership recorded for the entry.
    pub fn with_ownership(mut self, ownership: Option<Ownership>) -> Self {
        self.ownership = ownership;
        self
    }

    /// Returns `true` if the entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Returns `true` if the entry is a symbolic link.
    pub fn is_symlink(&self) -> bool {
        self.kind == EntryKind::Symlink
    }
}

impl DirSnapshot {
    /// Lists the immediate children of the directory at `path`.
    ///
    /// A path that does not exist yields an empty snapshot. The directory itself is reached
    /// through symlinks, but its children report their own kind without being dereferenced.
    ///
    /// ## Errors
    /// Returns `MonolayerError::Scan` if the directory exists but cannot be listed.
    pub async fn scan(path: impl AsRef<Path>) -> MonolayerResult<Self> {
        let path = path.as_ref();
        match fs::try_exists(path).await {
            Ok(true) => {}
            Ok(false) => return Ok(Self::default()),
            Err(e) => return Err(MonolayerError::scan(path, e)),
        }

        let mut read_dir = fs::read_dir(path)
            .await
            .map_err(|e| MonolayerError::scan(path, e))?;

        let mut entries = HashMap::new();
        while let Some(dir_entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| MonolayerError::scan(path, e))?
        {
            let metadata = dir_entry
                .metadata()
                .await
                .map_err(|e| MonolayerError::scan(dir_entry.path(), e))?;

            let symlink_target = if metadata.file_type().is_symlink() {
                Some(
                    fs::read_link(dir_entry.path())
                        .await
                        .map_err(|e| MonolayerError::scan(dir_entry.path(), e))?,
                )
            } else {
                None
            };

            let name = dir_entry.file_name();
            let entry = Entry::new(name.clone(), &metadata, symlink_target);
            entries.insert(name, entry);
        }

        tracing::trace!("scanned {} entries in {}", entries.len(), path.display());
        Ok(Self { entries })
    }

    /// Returns `true` if the snapshot has an entry with the given name.
    pub fn contains(&self, name: impl AsRef<OsStr>) -> bool {
        self.entries.contains_key(name.as_ref())
    }

    /// Returns the entry with the given name.
    pub fn get(&self, name: impl AsRef<OsStr>) -> Option<&Entry> {
        self.entries.get(name.as_ref())
    }

    /// Returns `true` if the snapshot holds the opaque whiteout marker.
    pub fn has_opaque_whiteout(&self) -> bool {
        self.contains(OPAQUE_WHITEOUT_MARKER)
    }

    /// Iterates over the entries in arbitrary order.
    pub fn iter(&self) -> hash_map::Iter<'_, OsString, Entry> {
        self.entries.iter()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the snapshot has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Returns `true` if the directory at `path` has no children.
pub(crate) async fn is_empty_dir(path: &Path) -> io::Result<bool> {
    let mut read_dir = fs::read_dir(path).await?;
    Ok(read_dir.next_entry().await?.is_none())
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl<'a> IntoIterator for &'a DirSnapshot {
    type Item = (&'a OsString, &'a Entry);
    type IntoIter = hash_map::Iter<'a, OsString, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
