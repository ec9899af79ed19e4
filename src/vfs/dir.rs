//! Host directory exposed as a virtual filesystem

use super::{is_host_separator, join, Entry, FileSystem, Metadata};
use crate::error::{Result, ZipperError};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// A directory on disk, seen as `/`
///
/// Virtual paths are resolved below the base directory and can never leave
/// it: `..` segments are rejected. Symlinks are reported as such and never
/// followed.
#[derive(Debug, Clone)]
pub struct DirFs {
    base: PathBuf,
    excluded: Option<String>,
}

impl DirFs {
    pub fn new<P: AsRef<Path>>(base: P) -> Self {
        Self {
            base: base.as_ref().to_path_buf(),
            excluded: None,
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Hide one virtual path from listings and walks, e.g. an archive being
    /// written inside the directory it archives
    pub fn exclude(mut self, path: impl Into<String>) -> Self {
        self.excluded = Some(path.into());
        self
    }

    fn is_excluded(&self, path: &str) -> bool {
        self.excluded.as_deref() == Some(path)
    }

    /// Map a virtual path onto the host path below the base directory
    pub fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let mut host = self.base.clone();
        for segment in path.split(is_host_separator) {
            match segment {
                "" | "." => {}
                ".." => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("{}: path escapes the filesystem root", path),
                    ))
                }
                name => host.push(name),
            }
        }
        Ok(host)
    }

    // Inverse of resolve for paths produced by walkdir
    fn virtual_path(&self, host: &Path) -> Result<String> {
        let rel = host
            .strip_prefix(&self.base)
            .map_err(|_| ZipperError::InvalidPath(host.display().to_string()))?;

        let mut path = String::from("/");
        for component in rel.components() {
            if let Component::Normal(name) = component {
                let name = name
                    .to_str()
                    .ok_or_else(|| ZipperError::InvalidPath(host.display().to_string()))?;
                if path.len() > 1 {
                    path.push('/');
                }
                path.push_str(name);
            }
        }
        Ok(path)
    }
}

impl FileSystem for DirFs {
    fn metadata(&self, path: &str) -> io::Result<Metadata> {
        let meta = fs::symlink_metadata(self.resolve(path)?)?;
        Ok(Metadata::from_std(&meta))
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for dirent in fs::read_dir(self.resolve(path)?)? {
            let name = dirent?.file_name();
            let name = name.into_string().map_err(|name| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("non UTF-8 file name {:?}", name),
                )
            })?;
            if !self.is_excluded(&join(path, &name)) {
                names.push(name);
            }
        }
        Ok(names)
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(File::open(self.resolve(path)?)?))
    }

    fn walk<'a>(&'a self, root: &str) -> Box<dyn Iterator<Item = Result<Entry>> + 'a> {
        let root_path = root.to_string();
        let start = match self.resolve(root) {
            Ok(start) => start,
            Err(e) => return Box::new(std::iter::once(Err(ZipperError::walk(root_path, e)))),
        };

        let mut failed = false;
        let walker = WalkDir::new(start)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        Box::new(walker.map_while(move |dirent| {
            if failed {
                return None;
            }
            let item = dirent
                .map_err(|e| {
                    let path = e
                        .path()
                        .and_then(|p| self.virtual_path(p).ok())
                        .unwrap_or_else(|| root_path.clone());
                    ZipperError::walk(path, e.into())
                })
                .and_then(|dirent| {
                    let path = self.virtual_path(dirent.path())?;
                    let meta = match dirent.metadata() {
                        Ok(meta) => meta,
                        Err(e) => return Err(ZipperError::walk(path, e.into())),
                    };
                    Ok(Entry {
                        path,
                        metadata: Metadata::from_std(&meta),
                    })
                });
            failed = item.is_err();
            Some(item)
        })
        .filter(move |item| match item {
            Ok(entry) => !self.is_excluded(&entry.path),
            Err(_) => true,
        }))
    }
}
