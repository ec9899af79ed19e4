//! Error types for vfs-zipper

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for vfs-zipper operations
pub type Result<T> = std::result::Result<T, ZipperError>;

/// Error types that can occur while turning a filesystem into a ZIP archive
#[derive(Debug, Error)]
pub enum ZipperError {
    /// I/O error on the archive sink
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The filesystem could not stat or list an entry during the walk
    #[error("failed to walk {path}: {source}")]
    Walk {
        path: String,
        #[source]
        source: io::Error,
    },
    /// A regular file could not be opened after its header was written
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },
    /// Streaming a file's bytes into its archive entry failed
    #[error("failed to copy {path} into archive: {source}")]
    Copy {
        path: String,
        #[source]
        source: io::Error,
    },
    /// A path cannot be expressed as a relative archive entry name
    #[error("invalid path: {0}")]
    InvalidPath(String),
    /// The archive writer was driven out of order
    #[error("invalid ZIP format: {0}")]
    InvalidFormat(String),
    /// Missing or inconsistent options
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Target file already exists and overwriting was not requested
    #[error("target {} already exists, enable force to overwrite", .0.display())]
    TargetExists(PathBuf),
}

impl ZipperError {
    pub(crate) fn walk(path: impl Into<String>, source: io::Error) -> Self {
        ZipperError::Walk {
            path: path.into(),
            source,
        }
    }
}

impl From<ZipperError> for io::Error {
    fn from(err: ZipperError) -> Self {
        match err {
            ZipperError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}
