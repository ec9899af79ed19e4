//! Archive entry headers derived from visited filesystem entries

use crate::error::{Result, ZipperError};
use crate::vfs::{Entry, FileType};
use std::time::SystemTime;

/// Derive the relative, `/`-separated name an entry gets inside the archive.
///
/// Only `/` separates segments; a `\` is kept as part of the name. Empty and
/// `.` segments are dropped (so any number of leading separators is stripped)
/// and directories get a trailing `/`. Returns `None` when nothing is left,
/// i.e. for the walk root `/`, which has no entry of its own.
///
/// ```
/// use vfs_zipper::entry::archive_name;
///
/// assert_eq!(archive_name("/dir/b.txt", false).unwrap().as_deref(), Some("dir/b.txt"));
/// assert_eq!(archive_name("/dir", true).unwrap().as_deref(), Some("dir/"));
/// assert_eq!(archive_name("/", true).unwrap(), None);
/// ```
pub fn archive_name(path: &str, is_dir: bool) -> Result<Option<String>> {
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => return Err(ZipperError::InvalidPath(path.to_string())),
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return Ok(None);
    }

    let mut name = segments.join("/");
    if is_dir {
        name.push('/');
    }
    Ok(Some(name))
}

/// Header of one archive entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    pub name: String,
    pub file_type: FileType,
    /// Permission bits
    pub mode: u32,
    pub modified: Option<SystemTime>,
    /// Expected content length, used to size compression buffers
    pub size_hint: Option<u64>,
}

impl EntryHeader {
    /// Header for a regular file with default permissions
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_type: FileType::File,
            mode: 0,
            modified: None,
            size_hint: None,
        }
    }

    /// Header for a directory; a trailing `/` is added when missing
    pub fn dir(name: impl Into<String>) -> Self {
        let mut name = name.into();
        if !name.ends_with('/') {
            name.push('/');
        }
        Self {
            name,
            file_type: FileType::Dir,
            mode: 0,
            modified: None,
            size_hint: None,
        }
    }

    /// Build the header for a visited entry, `None` for the walk root
    pub fn from_entry(entry: &Entry) -> Result<Option<Self>> {
        let meta = &entry.metadata;
        let Some(name) = archive_name(&entry.path, meta.is_dir())? else {
            return Ok(None);
        };

        Ok(Some(Self {
            name,
            file_type: meta.file_type,
            mode: meta.mode & 0o7777,
            modified: meta.modified,
            size_hint: (meta.file_type == FileType::File && meta.len > 0).then_some(meta.len),
        }))
    }

    /// Only regular files carry content; everything else is header-only
    pub fn has_content(&self) -> bool {
        self.file_type == FileType::File
    }

    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Dir
    }

    /// Unix `st_mode`: type bits plus permissions (0o644/0o755 when unset)
    pub fn unix_mode(&self) -> u32 {
        let perm = match (self.mode & 0o7777, self.file_type) {
            (0, FileType::Dir) => 0o755,
            (0, FileType::Symlink) => 0o777,
            (0, _) => 0o644,
            (perm, _) => perm,
        };
        self.file_type.unix_type_bits() | perm
    }
}
