//! Filesystems with a root directory holding exactly one entry

use super::{is_host_separator, FileSystem, Metadata};
use crate::error::{Result, ZipperError};
use std::cell::RefCell;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

enum Slot {
    Root,
    Child,
}

fn locate(name: &str, path: &str) -> io::Result<Slot> {
    match path.trim_matches('/') {
        "" => Ok(Slot::Root),
        p if p == name => Ok(Slot::Child),
        _ => Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{}: not found", path),
        )),
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(is_host_separator)
    {
        return Err(ZipperError::InvalidPath(name.to_string()));
    }
    Ok(())
}

/// One host file, visible as `/<file name>`
#[derive(Debug, Clone)]
pub struct SingleFileFs {
    host: PathBuf,
    name: String,
}

impl SingleFileFs {
    pub fn new<P: AsRef<Path>>(file: P) -> Result<Self> {
        let host = file.as_ref().to_path_buf();
        let name = host
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ZipperError::InvalidPath(host.display().to_string()))?
            .to_string();
        check_name(&name)?;
        Ok(Self { host, name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FileSystem for SingleFileFs {
    fn metadata(&self, path: &str) -> io::Result<Metadata> {
        match locate(&self.name, path)? {
            Slot::Root => Ok(Metadata::dir()),
            // an explicitly named source file is followed if it is a link
            Slot::Child => Ok(Metadata::from_std(&fs::metadata(&self.host)?)),
        }
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<String>> {
        match locate(&self.name, path)? {
            Slot::Root => Ok(vec![self.name.clone()]),
            Slot::Child => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{}: not a directory", path),
            )),
        }
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>> {
        match locate(&self.name, path)? {
            Slot::Root => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{}: is a directory", path),
            )),
            Slot::Child => Ok(Box::new(File::open(&self.host)?)),
        }
    }
}

/// One caller-supplied stream, visible as `/<name>`
///
/// The stream can be opened exactly once; its length is unknown up front and
/// reported as zero.
pub struct ReaderFs {
    name: String,
    reader: RefCell<Option<Box<dyn Read>>>,
}

impl ReaderFs {
    pub fn new(name: impl Into<String>, reader: Box<dyn Read>) -> Result<Self> {
        let name = name.into();
        check_name(&name)?;
        Ok(Self {
            name,
            reader: RefCell::new(Some(reader)),
        })
    }
}

impl std::fmt::Debug for ReaderFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderFs")
            .field("name", &self.name)
            .field("consumed", &self.reader.borrow().is_none())
            .finish()
    }
}

impl FileSystem for ReaderFs {
    fn metadata(&self, path: &str) -> io::Result<Metadata> {
        match locate(&self.name, path)? {
            Slot::Root => Ok(Metadata::dir()),
            Slot::Child => Ok(Metadata::file(0)),
        }
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<String>> {
        match locate(&self.name, path)? {
            Slot::Root => Ok(vec![self.name.clone()]),
            Slot::Child => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{}: not a directory", path),
            )),
        }
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>> {
        match locate(&self.name, path)? {
            Slot::Root => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{}: is a directory", path),
            )),
            Slot::Child => match self.reader.borrow_mut().take() {
                Some(reader) => Ok(reader),
                None => Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("{}: stream already consumed", path),
                )),
            },
        }
    }
}
