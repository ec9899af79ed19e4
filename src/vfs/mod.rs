//! Virtual filesystem capability consumed by the archiver
//!
//! A [`FileSystem`] answers three questions about `/`-separated paths rooted at
//! `/`: what is this entry, what are its children, and give me its bytes. The
//! walk over a tree is derived from those three calls unless a backend has a
//! faster native way to enumerate (see [`DirFs`]).
//!
//! Backends:
//! - [`MemoryFs`] - in-memory tree, handy for tests and synthesized content
//! - [`DirFs`] - a directory on the host filesystem
//! - [`SingleFileFs`] / [`ReaderFs`] - a root holding exactly one entry

mod dir;
mod memory;
mod single;

pub use dir::DirFs;
pub use memory::MemoryFs;
pub use single::{ReaderFs, SingleFileFs};

use crate::error::{Result, ZipperError};
use std::io::{self, Read};
use std::time::SystemTime;

const S_IFREG: u32 = 0o100000;
const S_IFDIR: u32 = 0o040000;
const S_IFLNK: u32 = 0o120000;

/// Kind of a filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// Regular file with byte content
    File,
    /// Directory
    Dir,
    /// Symbolic link (never followed)
    Symlink,
    /// Device, socket, fifo or anything else without copyable content
    Other,
}

impl FileType {
    /// Unix `S_IFMT` bits for this kind (0 for [`FileType::Other`])
    pub fn unix_type_bits(self) -> u32 {
        match self {
            FileType::File => S_IFREG,
            FileType::Dir => S_IFDIR,
            FileType::Symlink => S_IFLNK,
            FileType::Other => 0,
        }
    }

    pub(crate) fn from_std(file_type: std::fs::FileType) -> Self {
        if file_type.is_symlink() {
            FileType::Symlink
        } else if file_type.is_dir() {
            FileType::Dir
        } else if file_type.is_file() {
            FileType::File
        } else {
            FileType::Other
        }
    }
}

/// Metadata of a visited entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub file_type: FileType,
    /// Permission bits (`0o7777` mask), type bits excluded
    pub mode: u32,
    pub modified: Option<SystemTime>,
    /// Content length, meaningful for regular files only
    pub len: u64,
}

impl Metadata {
    /// Metadata for a regular file of `len` bytes with `0o644` permissions
    pub fn file(len: u64) -> Self {
        Self {
            file_type: FileType::File,
            mode: 0o644,
            modified: None,
            len,
        }
    }

    /// Metadata for a directory with `0o755` permissions
    pub fn dir() -> Self {
        Self {
            file_type: FileType::Dir,
            mode: 0o755,
            modified: None,
            len: 0,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Dir
    }

    pub(crate) fn from_std(meta: &std::fs::Metadata) -> Self {
        #[cfg(unix)]
        let mode = {
            use std::os::unix::fs::PermissionsExt;
            meta.permissions().mode() & 0o7777
        };
        #[cfg(not(unix))]
        let mode = match (meta.is_dir(), meta.permissions().readonly()) {
            (true, _) => 0o755,
            (false, true) => 0o444,
            (false, false) => 0o644,
        };

        Self {
            file_type: FileType::from_std(meta.file_type()),
            mode,
            modified: meta.modified().ok(),
            len: meta.len(),
        }
    }
}

/// One `(path, metadata)` pair produced by a walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// `/`-separated path rooted at `/`
    pub path: String,
    pub metadata: Metadata,
}

/// A traversable tree of named entries
pub trait FileSystem {
    /// Stat `path` without following symlinks
    fn metadata(&self, path: &str) -> io::Result<Metadata>;

    /// Names of the direct children of the directory at `path`
    fn read_dir(&self, path: &str) -> io::Result<Vec<String>>;

    /// Open the regular file at `path` for sequential reading
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>>;

    /// Visit `root` and every descendant in pre-order, children sorted by name.
    ///
    /// The first error ends the walk: the iterator yields it and then stays
    /// exhausted.
    fn walk<'a>(&'a self, root: &str) -> Box<dyn Iterator<Item = Result<Entry>> + 'a> {
        Box::new(Walk::new(self, root))
    }
}

// `\` is part of a file name on Unix and only separates host paths on Windows
pub(crate) fn is_host_separator(c: char) -> bool {
    c == '/' || (cfg!(windows) && c == '\\')
}

/// Join a child name onto a `/`-rooted parent path
pub fn join(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{}{}", parent, name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Lazy pre-order walk built on [`FileSystem::metadata`] and [`FileSystem::read_dir`]
pub struct Walk<'a, F: ?Sized> {
    fs: &'a F,
    // pending paths, next one on top
    stack: Vec<String>,
    done: bool,
}

impl<'a, F: FileSystem + ?Sized> Walk<'a, F> {
    pub fn new(fs: &'a F, root: &str) -> Self {
        Self {
            fs,
            stack: vec![root.to_string()],
            done: false,
        }
    }

    fn visit(&mut self, path: String) -> Result<Entry> {
        let metadata = self
            .fs
            .metadata(&path)
            .map_err(|e| ZipperError::walk(path.as_str(), e))?;

        if metadata.is_dir() {
            let mut names = self
                .fs
                .read_dir(&path)
                .map_err(|e| ZipperError::walk(path.as_str(), e))?;
            names.sort_unstable();
            self.stack
                .extend(names.iter().rev().map(|name| join(&path, name)));
        }

        Ok(Entry { path, metadata })
    }
}

impl<'a, F: FileSystem + ?Sized> Iterator for Walk<'a, F> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let path = self.stack.pop()?;
        let item = self.visit(path);
        if item.is_err() {
            self.done = true;
            self.stack.clear();
        }
        Some(item)
    }
}
