//! Source and target selection around [`zip_filesystem`](crate::zip_filesystem)
//!
//! ```no_run
//! use vfs_zipper::Zipper;
//!
//! Zipper::new()
//!     .source_dir("site/")
//!     .target_file("site.zip")
//!     .force(true)
//!     .zip()?;
//! # Ok::<(), vfs_zipper::ZipperError>(())
//! ```

use crate::error::{Result, ZipperError};
use crate::serialize::zip_filesystem;
use crate::vfs::{DirFs, FileSystem, ReaderFs, SingleFileFs};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where the archived tree comes from
pub enum Source {
    /// Every entry below a host directory
    Dir(PathBuf),
    /// A single host file, archived under its file name
    File(PathBuf),
    /// A single stream, archived under `name`
    Reader { name: String, reader: Box<dyn Read> },
    /// Any virtual filesystem, archived from `/`
    FileSystem(Box<dyn FileSystem>),
}

/// Where the archive goes
pub enum Target {
    Writer(Box<dyn Write>),
    File(PathBuf),
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Dir(path) => f.debug_tuple("Dir").field(path).finish(),
            Source::File(path) => f.debug_tuple("File").field(path).finish(),
            Source::Reader { name, .. } => f.debug_struct("Reader").field("name", name).finish(),
            Source::FileSystem(_) => f.write_str("FileSystem"),
        }
    }
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Writer(_) => f.write_str("Writer"),
            Target::File(path) => f.debug_tuple("File").field(path).finish(),
        }
    }
}

/// Builder tying one source to one target.
///
/// Setting a source or target again replaces the previous one. An existing
/// target file is only overwritten with [`Zipper::force`].
#[derive(Debug, Default)]
pub struct Zipper {
    source: Option<Source>,
    target: Option<Target>,
    force: bool,
}

impl Zipper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.source = Some(Source::Dir(dir.as_ref().to_path_buf()));
        self
    }

    pub fn source_file<P: AsRef<Path>>(mut self, file: P) -> Self {
        self.source = Some(Source::File(file.as_ref().to_path_buf()));
        self
    }

    pub fn source_reader<R: Read + 'static>(mut self, name: impl Into<String>, reader: R) -> Self {
        self.source = Some(Source::Reader {
            name: name.into(),
            reader: Box::new(reader),
        });
        self
    }

    pub fn source_filesystem<F: FileSystem + 'static>(mut self, fs: F) -> Self {
        self.source = Some(Source::FileSystem(Box::new(fs)));
        self
    }

    pub fn target_writer<W: Write + 'static>(mut self, writer: W) -> Self {
        self.target = Some(Target::Writer(Box::new(writer)));
        self
    }

    pub fn target_file<P: AsRef<Path>>(mut self, file: P) -> Self {
        self.target = Some(Target::File(file.as_ref().to_path_buf()));
        self
    }

    /// Allow replacing an existing target file
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Build the archive
    pub fn zip(self) -> Result<()> {
        let source = self
            .source
            .ok_or_else(|| ZipperError::Config("no source configured".to_string()))?;
        let target = self
            .target
            .ok_or_else(|| ZipperError::Config("no target configured".to_string()))?;

        let filesystem: Box<dyn FileSystem> = match source {
            Source::Dir(dir) => {
                if !dir.is_dir() {
                    return Err(ZipperError::Config(format!(
                        "source {} is not a directory",
                        dir.display()
                    )));
                }
                let mut dirfs = DirFs::new(&dir);
                // the target is created before the walk reaches it
                if let Target::File(path) = &target {
                    if let Some(inner) = path_below(&dir, path) {
                        debug!(path = %inner, "leaving the target out of its own archive");
                        dirfs = dirfs.exclude(inner);
                    }
                }
                Box::new(dirfs)
            }
            Source::File(file) => Box::new(SingleFileFs::new(file)?),
            Source::Reader { name, reader } => Box::new(ReaderFs::new(name, reader)?),
            Source::FileSystem(filesystem) => filesystem,
        };

        match target {
            Target::Writer(writer) => {
                let mut writer = zip_filesystem(&*filesystem, "/", writer)?;
                writer.flush()?;
            }
            Target::File(path) => {
                let file = create_target(&path, self.force)?;
                let mut out = zip_filesystem(&*filesystem, "/", BufWriter::new(file))?;
                out.flush()?;
                debug!(path = %path.display(), "archive written");
            }
        }
        Ok(())
    }
}

fn create_target(path: &Path, force: bool) -> Result<File> {
    match fs::symlink_metadata(path) {
        Ok(_) if !force => return Err(ZipperError::TargetExists(path.to_path_buf())),
        Ok(_) => debug!(path = %path.display(), "overwriting existing target"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    Ok(File::create(path)?)
}

// Virtual path of `file` inside `dir`, when it resolves below it
fn path_below(dir: &Path, file: &Path) -> Option<String> {
    let dir = fs::canonicalize(dir).ok()?;
    let name = file.file_name()?;
    let parent = match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file = fs::canonicalize(parent).ok()?.join(name);

    let mut path = String::new();
    for component in file.strip_prefix(&dir).ok()?.components() {
        path.push('/');
        path.push_str(component.as_os_str().to_str()?);
    }
    Some(path)
}

/// Archive the host directory `dir` into a new file `target`
pub fn zip_dir<P: AsRef<Path>, Q: AsRef<Path>>(dir: P, target: Q) -> Result<()> {
    Zipper::new().source_dir(dir).target_file(target).zip()
}
