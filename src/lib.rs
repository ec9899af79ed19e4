//! # vfs-zipper: Stream a Virtual Filesystem into a ZIP Archive
//!
//! `vfs-zipper` walks any tree that can be opened, listed and stat'ed and
//! writes it as one ZIP archive, entry by entry, into a plain `Write` sink.
//!
//! ## Features
//!
//! - **Streaming Write**: Entries are compressed as they are read, nothing is
//!   buffered beyond the entry in flight, no temp files and no `Seek` needed
//! - **Deterministic**: Pre-order walk with children sorted by name
//! - **Portable Names**: Relative, `/`-separated entry names; directories end in `/`
//! - **Safe Walks**: Symlinks and special files are stored as headers, never followed
//! - **Pluggable Sources**: In-memory trees, host directories, single files or
//!   streams, or your own [`vfs::FileSystem`]
//!
//! ## Quick Start
//!
//! ### Archiving an in-memory tree
//!
//! ```
//! use vfs_zipper::vfs::MemoryFs;
//! use vfs_zipper::zip_filesystem;
//!
//! let mut fs = MemoryFs::new();
//! fs.add_file("/", "a.txt", b"hello".to_vec());
//! fs.add_file("/dir", "b.txt", b"world".to_vec());
//! fs.add_dir("/dir2");
//!
//! // entries: a.txt, dir/, dir/b.txt, dir2/
//! let zip_bytes = zip_filesystem(&fs, "/", Vec::new())?;
//! println!("Created ZIP with {} bytes", zip_bytes.len());
//! # Ok::<(), vfs_zipper::ZipperError>(())
//! ```
//!
//! ### Archiving a directory into a file
//!
//! ```no_run
//! use vfs_zipper::Zipper;
//!
//! Zipper::new()
//!     .source_dir("public")
//!     .target_file("public.zip")
//!     .force(true)
//!     .zip()?;
//! # Ok::<(), vfs_zipper::ZipperError>(())
//! ```
//!
//! ### Driving the writer by hand
//!
//! ```
//! use std::io::Write;
//! use vfs_zipper::{EntryHeader, StreamingZipWriter};
//!
//! let mut writer = StreamingZipWriter::from_writer(Vec::new());
//! writer.start_entry(&EntryHeader::dir("docs"))?;
//! writer.start_entry(&EntryHeader::file("docs/readme.txt"))?;
//! writer.write_all(b"Hello, World!")?;
//! let zip_bytes = writer.finish()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod entry;
pub mod error;
pub mod options;
pub mod serialize;
pub mod vfs;
pub mod writer;

pub use entry::{archive_name, EntryHeader};
pub use error::{Result, ZipperError};
pub use options::{zip_dir, Source, Target, Zipper};
pub use serialize::zip_filesystem;
pub use vfs::{DirFs, Entry, FileSystem, FileType, MemoryFs, Metadata};
pub use writer::StreamingZipWriter;
