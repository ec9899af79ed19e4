//! Serialize a whole virtual filesystem tree into one ZIP archive

use crate::entry::EntryHeader;
use crate::error::{Result, ZipperError};
use crate::vfs::{Entry, FileSystem};
use crate::writer::StreamingZipWriter;
use scopeguard::ScopeGuard;
use std::io::{self, Write};
use tracing::{debug, trace, warn};

/// Walk `fs` from `root` and stream every entry into a ZIP archive on `sink`.
///
/// Entries are written as the walk yields them: directories become
/// header-only entries named with a trailing `/`, symlinks and special files
/// become header-only entries and are never followed or read, regular files
/// are opened one at a time and copied into their entry. The root `/` itself
/// gets no entry.
///
/// On success the archive is finalized and the sink returned. The first
/// error (walk, header, open or copy) stops the walk and is returned as is;
/// the writer is then released without an index, so whatever reached the sink
/// is not a readable archive and must be discarded.
///
/// ```
/// use vfs_zipper::vfs::MemoryFs;
/// use vfs_zipper::zip_filesystem;
///
/// let mut fs = MemoryFs::new();
/// fs.add_file("/", "a.txt", b"hello".to_vec());
///
/// let bytes = zip_filesystem(&fs, "/", Vec::new())?;
/// assert_eq!(&bytes[..4], b"PK\x03\x04");
/// # Ok::<(), vfs_zipper::ZipperError>(())
/// ```
pub fn zip_filesystem<F, W>(fs: &F, root: &str, sink: W) -> Result<W>
where
    F: FileSystem + ?Sized,
    W: Write,
{
    let mut writer = scopeguard::guard(StreamingZipWriter::from_writer(sink), |writer| {
        // only reached on early return or panic; the original error wins
        if let Err(err) = writer.abort() {
            warn!(error = %err, "failed to release zip writer after an earlier error");
        }
    });

    for entry in fs.walk(root) {
        add_entry(fs, &mut *writer, &entry?)?;
    }

    let writer = ScopeGuard::into_inner(writer);
    let entries = writer.entry_count();
    let sink = writer.finish()?;
    debug!(root, entries, "filesystem archived");
    Ok(sink)
}

fn add_entry<F, W>(fs: &F, writer: &mut StreamingZipWriter<W>, entry: &Entry) -> Result<()>
where
    F: FileSystem + ?Sized,
    W: Write,
{
    let Some(header) = EntryHeader::from_entry(entry)? else {
        trace!(path = %entry.path, "walk root has no entry of its own");
        return Ok(());
    };

    writer.start_entry(&header)?;
    if !header.has_content() {
        return Ok(());
    }

    let mut reader = fs.open(&entry.path).map_err(|source| ZipperError::Open {
        path: entry.path.clone(),
        source,
    })?;
    io::copy(&mut reader, writer).map_err(|source| ZipperError::Copy {
        path: entry.path.clone(),
        source,
    })?;

    Ok(())
}
