//! Streaming ZIP writer that compresses data on-the-fly into a sequential sink
//!
//! The sink only needs `Write`: offsets are counted as bytes go out, file
//! entries carry a data descriptor after their content, and the central
//! directory is emitted by [`StreamingZipWriter::finish`]. Memory use is
//! bounded by the compression buffer of the entry being written, not by the
//! archive size.

use crate::entry::EntryHeader;
use crate::error::{Result, ZipperError};
use chrono::{DateTime, Datelike, Timelike, Utc};
use crc32fast::Hasher as Crc32;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50;
const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x08074b50;
const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x02014b50;
const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x06054b50;
const ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x06064b50;
const ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR_SIGNATURE: u32 = 0x07064b50;

const VERSION_NEEDED: u16 = 20;
const VERSION_NEEDED_ZIP64: u16 = 45;
// upper byte 3 = Unix, so readers honour the mode in the external attributes
const VERSION_MADE_BY: u16 = (3 << 8) | 20;

const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
const FLAG_UTF8: u16 = 1 << 11;

const EXTRA_ZIP64: u16 = 0x0001;
const EXTRA_EXTENDED_TIMESTAMP: u16 = 0x5455;

const MSDOS_DIRECTORY: u32 = 0x10;

// Size hints from here on get a ZIP64 local header; the margin covers
// deflate's stored-block overhead on incompressible data
const ZIP64_SIZE_HINT: u64 = 0xFF00_0000;

/// Compression method to use for ZIP entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompressionMethod {
    /// No compression (stored); used for header-only entries
    Stored,
    /// DEFLATE compression at the default level; used for regular files
    Deflate,
}

impl CompressionMethod {
    fn to_zip_method(self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
        }
    }

    fn for_header(header: &EntryHeader) -> Self {
        if header.has_content() {
            CompressionMethod::Deflate
        } else {
            CompressionMethod::Stored
        }
    }
}

/// Entry already written, kept for the central directory
struct ZipEntry {
    name: String,
    flags: u16,
    local_header_offset: u64,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    compression_method: u16,
    dos_time: u16,
    dos_date: u16,
    unix_mtime: Option<u32>,
    external_attributes: u32,
}

/// Streaming ZIP writer that compresses data on-the-fly
pub struct StreamingZipWriter<W: Write> {
    output: CountingWriter<W>,
    entries: Vec<ZipEntry>,
    current_entry: Option<CurrentEntry>,
}

struct CurrentEntry {
    meta: ZipEntry,
    encoder: Box<dyn CompressorWrite>,
    counter: CrcCounter,
    zip64: bool,
}

trait CompressorWrite: Write {
    fn finish_compression(self: Box<Self>) -> Result<CompressedBuffer>;
    fn get_buffer_mut(&mut self) -> &mut CompressedBuffer;
}

struct DeflateCompressor {
    encoder: DeflateEncoder<CompressedBuffer>,
}

impl Write for DeflateCompressor {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.encoder.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }
}

impl CompressorWrite for DeflateCompressor {
    fn finish_compression(self: Box<Self>) -> Result<CompressedBuffer> {
        Ok(self.encoder.finish()?)
    }

    fn get_buffer_mut(&mut self) -> &mut CompressedBuffer {
        self.encoder.get_mut()
    }
}

/// Metadata tracker for CRC and byte counts
struct CrcCounter {
    crc: Crc32,
    uncompressed_count: u64,
    compressed_count: u64,
}

impl CrcCounter {
    fn new() -> Self {
        Self {
            crc: Crc32::new(),
            uncompressed_count: 0,
            compressed_count: 0,
        }
    }

    fn update_uncompressed(&mut self, data: &[u8]) {
        self.crc.update(data);
        self.uncompressed_count += data.len() as u64;
    }

    fn add_compressed(&mut self, count: u64) {
        self.compressed_count += count;
    }

    fn finalize(&self) -> u32 {
        self.crc.clone().finalize()
    }
}

/// Buffered writer for compressed data with adaptive sizing
///
/// Initial capacity and flush threshold follow the expected entry size so
/// small files stay small and large files are drained in big chunks.
struct CompressedBuffer {
    buffer: Vec<u8>,
    flush_threshold: usize,
}

impl CompressedBuffer {
    /// - Tiny files (<10KB): 8KB initial, 256KB threshold
    /// - Small files (<100KB): 32KB initial, 512KB threshold
    /// - Medium files (<1MB): 128KB initial, 2MB threshold
    /// - Large files (<10MB): 256KB initial, 4MB threshold
    /// - Unknown or larger: 64KB initial, 8MB threshold
    fn with_size_hint(size_hint: Option<u64>) -> Self {
        let (initial_capacity, flush_threshold) = match size_hint {
            Some(size) if size < 10_000 => (8 * 1024, 256 * 1024),
            Some(size) if size < 100_000 => (32 * 1024, 512 * 1024),
            Some(size) if size < 1_000_000 => (128 * 1024, 2 * 1024 * 1024),
            Some(size) if size < 10_000_000 => (256 * 1024, 4 * 1024 * 1024),
            _ => (64 * 1024, 8 * 1024 * 1024),
        };

        Self {
            buffer: Vec::with_capacity(initial_capacity),
            flush_threshold,
        }
    }

    fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    fn should_flush(&self) -> bool {
        self.buffer.len() >= self.flush_threshold
    }
}

impl Write for CompressedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Sequential sink that remembers how many bytes went through it
struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W: Write> CountingWriter<W> {
    fn position(&self) -> u64 {
        self.written
    }

    fn write_u16(&mut self, value: u16) -> io::Result<()> {
        self.write_all(&value.to_le_bytes())
    }

    fn write_u32(&mut self, value: u32) -> io::Result<()> {
        self.write_all(&value.to_le_bytes())
    }

    fn write_u64(&mut self, value: u64) -> io::Result<()> {
        self.write_all(&value.to_le_bytes())
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Convert a timestamp to MS-DOS `(time, date)` in UTC, clamped to 1980..=2107
pub fn dos_datetime(time: Option<SystemTime>) -> (u16, u16) {
    let Some(time) = time else {
        // 1980-01-01 00:00:00
        return (0, (1 << 5) | 1);
    };
    let dt: DateTime<Utc> = time.into();
    if dt.year() < 1980 {
        return (0, (1 << 5) | 1);
    }
    if dt.year() > 2107 {
        // 2107-12-31 23:59:58
        return ((23 << 11) | (59 << 5) | 29, (127 << 9) | (12 << 5) | 31);
    }

    let dos_time = (dt.hour() << 11) | (dt.minute() << 5) | (dt.second() / 2);
    let dos_date = ((dt.year() as u32 - 1980) << 9) | (dt.month() << 5) | dt.day();
    (dos_time as u16, dos_date as u16)
}

fn unix_mtime(time: Option<SystemTime>) -> Option<u32> {
    let secs = time?.duration_since(UNIX_EPOCH).ok()?.as_secs();
    u32::try_from(secs).ok().filter(|s| *s <= i32::MAX as u32)
}

fn timestamp_extra(mtime: Option<u32>) -> Vec<u8> {
    let mut extra = Vec::new();
    if let Some(mtime) = mtime {
        extra.extend_from_slice(&EXTRA_EXTENDED_TIMESTAMP.to_le_bytes());
        extra.extend_from_slice(&5u16.to_le_bytes());
        extra.push(1); // mtime present
        extra.extend_from_slice(&mtime.to_le_bytes());
    }
    extra
}

impl<W: Write> StreamingZipWriter<W> {
    /// Create a new ZIP writer over any sequential sink
    pub fn from_writer(writer: W) -> Self {
        Self {
            output: CountingWriter {
                inner: writer,
                written: 0,
            },
            entries: Vec::new(),
            current_entry: None,
        }
    }

    /// Number of entries started so far
    pub fn entry_count(&self) -> usize {
        self.entries.len() + usize::from(self.current_entry.is_some())
    }

    /// Bytes written to the sink so far
    pub fn bytes_written(&self) -> u64 {
        self.output.position()
    }

    /// Start a new entry, finishing the previous one first.
    ///
    /// Regular files are DEFLATE-compressed and accept content through
    /// [`StreamingZipWriter::write_data`] (or `Write`) until the next entry
    /// starts. Directories, symlinks and other special entries are written as
    /// complete header-only records and accept no content.
    pub fn start_entry(&mut self, header: &EntryHeader) -> Result<()> {
        self.finish_current_entry()?;

        if header.name.is_empty() || header.name.starts_with('/') {
            return Err(ZipperError::InvalidPath(header.name.clone()));
        }
        if header.name.len() > u16::MAX as usize {
            return Err(ZipperError::InvalidPath(format!(
                "entry name longer than {} bytes",
                u16::MAX
            )));
        }

        let method = CompressionMethod::for_header(header);
        let mut flags = 0u16;
        if !header.name.is_ascii() {
            flags |= FLAG_UTF8;
        }
        if header.has_content() {
            flags |= FLAG_DATA_DESCRIPTOR;
        }

        let (dos_time, dos_date) = dos_datetime(header.modified);
        let mut external_attributes = header.unix_mode() << 16;
        if header.is_dir() {
            external_attributes |= MSDOS_DIRECTORY;
        }

        let meta = ZipEntry {
            name: header.name.clone(),
            flags,
            local_header_offset: self.output.position(),
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            compression_method: method.to_zip_method(),
            dos_time,
            dos_date,
            unix_mtime: unix_mtime(header.modified),
            external_attributes,
        };

        // Header-only entries have known (zero) sizes, so no data descriptor:
        // crc and sizes in the local header are final.
        // Entries expected to reach 4 GiB announce ZIP64 up front, which
        // makes their data descriptor carry 64-bit sizes.
        let zip64 = header.has_content()
            && header.size_hint.map_or(false, |size| size >= ZIP64_SIZE_HINT);
        let mut extra = Vec::new();
        if zip64 {
            extra.extend_from_slice(&EXTRA_ZIP64.to_le_bytes());
            extra.extend_from_slice(&16u16.to_le_bytes());
            extra.extend_from_slice(&0u64.to_le_bytes()); // uncompressed size
            extra.extend_from_slice(&0u64.to_le_bytes()); // compressed size
        }
        extra.extend_from_slice(&timestamp_extra(meta.unix_mtime));
        let local_size = if zip64 { u32::MAX } else { 0 };

        self.output.write_u32(LOCAL_FILE_HEADER_SIGNATURE)?;
        self.output
            .write_u16(if zip64 { VERSION_NEEDED_ZIP64 } else { VERSION_NEEDED })?;
        self.output.write_u16(flags)?;
        self.output.write_u16(meta.compression_method)?;
        self.output.write_u16(dos_time)?;
        self.output.write_u16(dos_date)?;
        self.output.write_u32(0)?; // crc32
        self.output.write_u32(local_size)?; // compressed size
        self.output.write_u32(local_size)?; // uncompressed size
        self.output.write_u16(meta.name.len() as u16)?;
        self.output.write_u16(extra.len() as u16)?;
        self.output.write_all(meta.name.as_bytes())?;
        self.output.write_all(&extra)?;

        debug!(
            name = %meta.name,
            offset = meta.local_header_offset,
            method = meta.compression_method,
            "started zip entry"
        );

        if !header.has_content() {
            self.entries.push(meta);
            return Ok(());
        }

        let encoder: Box<dyn CompressorWrite> = Box::new(DeflateCompressor {
            encoder: DeflateEncoder::new(
                CompressedBuffer::with_size_hint(header.size_hint),
                Compression::default(),
            ),
        });

        self.current_entry = Some(CurrentEntry {
            meta,
            encoder,
            counter: CrcCounter::new(),
            zip64,
        });

        Ok(())
    }

    /// Write uncompressed data to the current entry (compressed on-the-fly)
    pub fn write_data(&mut self, data: &[u8]) -> Result<()> {
        let entry = self
            .current_entry
            .as_mut()
            .ok_or_else(|| ZipperError::InvalidFormat("No entry started".to_string()))?;

        entry.counter.update_uncompressed(data);
        entry.encoder.write_all(data)?;

        // Drain compressed bytes to the sink to keep memory usage low
        let buffer = entry.encoder.get_buffer_mut();
        if buffer.should_flush() {
            let compressed_data = buffer.take();
            self.output.write_all(&compressed_data)?;
            entry.counter.add_compressed(compressed_data.len() as u64);
        }

        Ok(())
    }

    /// Finish current entry and write its data descriptor
    fn finish_current_entry(&mut self) -> Result<()> {
        if let Some(mut entry) = self.current_entry.take() {
            let mut buffer = entry.encoder.finish_compression()?;

            let remaining_data = buffer.take();
            if !remaining_data.is_empty() {
                self.output.write_all(&remaining_data)?;
                entry.counter.add_compressed(remaining_data.len() as u64);
            }

            let crc = entry.counter.finalize();
            let compressed_size = entry.counter.compressed_count;
            let uncompressed_size = entry.counter.uncompressed_count;

            self.output.write_u32(DATA_DESCRIPTOR_SIGNATURE)?;
            self.output.write_u32(crc)?;
            // ZIP64 data descriptor when announced in the local header or when
            // sizes exceed 32 bits anyway (unknown-size streams); the central
            // directory is authoritative in the second case
            if entry.zip64
                || compressed_size >= u32::MAX as u64
                || uncompressed_size >= u32::MAX as u64
            {
                self.output.write_u64(compressed_size)?;
                self.output.write_u64(uncompressed_size)?;
            } else {
                self.output.write_u32(compressed_size as u32)?;
                self.output.write_u32(uncompressed_size as u32)?;
            }

            debug!(
                name = %entry.meta.name,
                crc32 = crc,
                compressed_size,
                uncompressed_size,
                "finished zip entry"
            );

            self.entries.push(ZipEntry {
                crc32: crc,
                compressed_size,
                uncompressed_size,
                ..entry.meta
            });
        }
        Ok(())
    }

    /// Release the writer without writing the central directory.
    ///
    /// Any half-written entry is dropped. The sink is flushed and returned;
    /// it holds an incomplete archive that readers will reject.
    pub fn abort(mut self) -> Result<W> {
        if let Some(entry) = self.current_entry.take() {
            debug!(name = %entry.meta.name, "dropping unfinished zip entry");
        }
        self.output.flush()?;
        Ok(self.output.inner)
    }

    /// Finish ZIP file (write central directory and return the writer)
    pub fn finish(mut self) -> Result<W> {
        self.finish_current_entry()?;

        let central_dir_offset = self.output.position();

        for entry in &self.entries {
            let needs_zip64 = entry.uncompressed_size >= u32::MAX as u64
                || entry.compressed_size >= u32::MAX as u64
                || entry.local_header_offset >= u32::MAX as u64;

            // ZIP64 extra: only the fields whose classic slot overflowed
            let mut extra_field: Vec<u8> = Vec::new();
            if needs_zip64 {
                let mut data: Vec<u8> = Vec::new();
                if entry.uncompressed_size >= u32::MAX as u64 {
                    data.extend_from_slice(&entry.uncompressed_size.to_le_bytes());
                }
                if entry.compressed_size >= u32::MAX as u64 {
                    data.extend_from_slice(&entry.compressed_size.to_le_bytes());
                }
                if entry.local_header_offset >= u32::MAX as u64 {
                    data.extend_from_slice(&entry.local_header_offset.to_le_bytes());
                }
                extra_field.extend_from_slice(&EXTRA_ZIP64.to_le_bytes());
                extra_field.extend_from_slice(&(data.len() as u16).to_le_bytes());
                extra_field.extend_from_slice(&data);
            }
            extra_field.extend_from_slice(&timestamp_extra(entry.unix_mtime));

            self.output.write_u32(CENTRAL_DIRECTORY_SIGNATURE)?;
            self.output.write_u16(VERSION_MADE_BY)?;
            self.output.write_u16(if needs_zip64 {
                VERSION_NEEDED_ZIP64
            } else {
                VERSION_NEEDED
            })?;
            self.output.write_u16(entry.flags)?;
            self.output.write_u16(entry.compression_method)?;
            self.output.write_u16(entry.dos_time)?;
            self.output.write_u16(entry.dos_date)?;
            self.output.write_u32(entry.crc32)?;
            self.output
                .write_u32(entry.compressed_size.min(u32::MAX as u64) as u32)?;
            self.output
                .write_u32(entry.uncompressed_size.min(u32::MAX as u64) as u32)?;
            self.output.write_u16(entry.name.len() as u16)?;
            self.output.write_u16(extra_field.len() as u16)?;
            self.output.write_u16(0)?; // file comment len
            self.output.write_u16(0)?; // disk number start
            self.output.write_u16(0)?; // internal attrs
            self.output.write_u32(entry.external_attributes)?;
            self.output
                .write_u32(entry.local_header_offset.min(u32::MAX as u64) as u32)?;
            self.output.write_all(entry.name.as_bytes())?;
            self.output.write_all(&extra_field)?;
        }

        let central_dir_size = self.output.position() - central_dir_offset;

        let need_zip64 = self.entries.len() >= u16::MAX as usize
            || central_dir_size >= u32::MAX as u64
            || central_dir_offset >= u32::MAX as u64;

        if need_zip64 {
            let zip64_eocd_offset = self.output.position();

            // ZIP64 End of Central Directory Record
            self.output
                .write_u32(ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE)?;
            // size of the remaining fields
            self.output.write_u64(44)?;
            self.output.write_u16(VERSION_MADE_BY)?;
            self.output.write_u16(VERSION_NEEDED_ZIP64)?;
            self.output.write_u32(0)?; // disk number
            self.output.write_u32(0)?; // disk where central dir starts
            self.output.write_u64(self.entries.len() as u64)?;
            self.output.write_u64(self.entries.len() as u64)?;
            self.output.write_u64(central_dir_size)?;
            self.output.write_u64(central_dir_offset)?;

            // ZIP64 EOCD locator
            self.output
                .write_u32(ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR_SIGNATURE)?;
            self.output.write_u32(0)?; // disk with ZIP64 EOCD
            self.output.write_u64(zip64_eocd_offset)?;
            self.output.write_u32(1)?; // total number of disks
        }

        // End of central directory (classic)
        let entry_count = self.entries.len().min(u16::MAX as usize) as u16;
        self.output.write_u32(END_OF_CENTRAL_DIRECTORY_SIGNATURE)?;
        self.output.write_u16(0)?; // disk number
        self.output.write_u16(0)?; // disk with central dir
        self.output.write_u16(entry_count)?;
        self.output.write_u16(entry_count)?;
        self.output
            .write_u32(central_dir_size.min(u32::MAX as u64) as u32)?;
        self.output
            .write_u32(central_dir_offset.min(u32::MAX as u64) as u32)?;
        self.output.write_u16(0)?; // comment len

        self.output.flush()?;

        debug!(
            entries = self.entries.len(),
            bytes = self.output.position(),
            "finished zip archive"
        );
        Ok(self.output.inner)
    }
}

impl<W: Write> Write for StreamingZipWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_data(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.output.flush()
    }
}
