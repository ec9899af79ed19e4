use std::io::{self, Cursor, Read, Write};
use std::time::{Duration, UNIX_EPOCH};
use vfs_zipper::vfs::{FileSystem, MemoryFs, Metadata};
use vfs_zipper::{zip_filesystem, ZipperError};
use zip::ZipArchive;

fn sample_fs() -> MemoryFs {
    let mut fs = MemoryFs::new();
    fs.add_file("/", "a.txt", b"hello".to_vec());
    fs.add_file("/dir", "b.txt", b"world".to_vec());
    fs.add_dir("/dir2");
    fs
}

fn open_archive(bytes: Vec<u8>) -> ZipArchive<Cursor<Vec<u8>>> {
    ZipArchive::new(Cursor::new(bytes)).expect("archive should parse")
}

fn names(archive: &mut ZipArchive<Cursor<Vec<u8>>>) -> Vec<String> {
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

fn read_entry(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> Vec<u8> {
    let mut file = archive.by_name(name).unwrap();
    let mut data = Vec::new();
    file.read_to_end(&mut data).unwrap();
    data
}

/// MemoryFs wrapper that fails on chosen paths
struct FaultyFs {
    inner: MemoryFs,
    fail_stat: Option<&'static str>,
    fail_open: Option<&'static str>,
    fail_read: Option<&'static str>,
}

impl FaultyFs {
    fn new(inner: MemoryFs) -> Self {
        Self {
            inner,
            fail_stat: None,
            fail_open: None,
            fail_read: None,
        }
    }
}

struct BrokenReader {
    sent: bool,
}

impl Read for BrokenReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.sent {
            return Err(io::Error::new(io::ErrorKind::Other, "disk on fire"));
        }
        self.sent = true;
        buf[..3].copy_from_slice(b"par");
        Ok(3)
    }
}

impl FileSystem for FaultyFs {
    fn metadata(&self, path: &str) -> io::Result<Metadata> {
        if self.fail_stat == Some(path) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "stat denied"));
        }
        self.inner.metadata(path)
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<String>> {
        self.inner.read_dir(path)
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>> {
        if self.fail_open == Some(path) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "open denied"));
        }
        if self.fail_read == Some(path) {
            return Ok(Box::new(BrokenReader { sent: false }));
        }
        self.inner.open(path)
    }
}

/// Sink that refuses every write
#[derive(Debug)]
struct ClosedSink;

impl Write for ClosedSink {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Sink that takes every byte but cannot flush them
#[derive(Debug, Default)]
struct UnflushableSink(Vec<u8>);

impl Write for UnflushableSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Other, "flush boom"))
    }
}

#[test]
fn archives_files_and_directories() {
    let bytes = zip_filesystem(&sample_fs(), "/", Vec::new()).unwrap();
    let mut archive = open_archive(bytes);

    assert_eq!(names(&mut archive), vec!["a.txt", "dir/", "dir/b.txt", "dir2/"]);
    assert_eq!(read_entry(&mut archive, "a.txt"), b"hello");
    assert_eq!(read_entry(&mut archive, "dir/b.txt"), b"world");

    for dir in ["dir/", "dir2/"] {
        let entry = archive.by_name(dir).unwrap();
        assert!(entry.is_dir());
        assert_eq!(entry.size(), 0);
        assert_eq!(entry.compressed_size(), 0);
    }
}

#[test]
fn entry_names_are_relative_and_directories_end_with_slash() {
    let mut fs = MemoryFs::new();
    fs.add_file("/", "top.txt", b"t".to_vec());
    fs.add_file("/x/y/z", "deep.bin", vec![0u8; 64]);
    fs.add_dir("/x/empty");
    fs.add_file("/x", "mid.txt", b"m".to_vec());

    let visited: Vec<(String, bool)> = fs
        .walk("/")
        .map(|e| e.unwrap())
        .filter(|e| e.path != "/")
        .map(|e| (e.path, e.metadata.is_dir()))
        .collect();

    let bytes = zip_filesystem(&fs, "/", Vec::new()).unwrap();
    let mut archive = open_archive(bytes);
    let stored = names(&mut archive);

    assert_eq!(stored.len(), visited.len());
    for (name, (path, is_dir)) in stored.iter().zip(&visited) {
        assert!(!name.starts_with('/'), "{} is rooted", name);
        assert_eq!(name.ends_with('/'), *is_dir);
        let expected = if *is_dir {
            format!("{}/", path.trim_start_matches('/'))
        } else {
            path.trim_start_matches('/').to_string()
        };
        assert_eq!(name, &expected);
    }
}

#[test]
fn file_content_survives_byte_for_byte() {
    let mut state = 0x12345678u32;
    let data: Vec<u8> = (0..1_500_000)
        .map(|_| {
            state = state.wrapping_mul(1103515245).wrapping_add(12345);
            (state >> 16) as u8
        })
        .collect();

    let mut fs = MemoryFs::new();
    fs.add_file("/", "noise.bin", data.clone());
    fs.add_file("/", "empty.txt", Vec::new());

    let bytes = zip_filesystem(&fs, "/", Vec::new()).unwrap();
    let mut archive = open_archive(bytes);

    assert_eq!(read_entry(&mut archive, "noise.bin"), data);
    assert!(read_entry(&mut archive, "empty.txt").is_empty());
}

#[test]
fn empty_tree_gives_empty_archive() {
    let bytes = zip_filesystem(&MemoryFs::new(), "/", Vec::new()).unwrap();
    let archive = open_archive(bytes);
    assert_eq!(archive.len(), 0);
}

#[test]
fn subtree_root_keeps_its_own_name() {
    let bytes = zip_filesystem(&sample_fs(), "/dir", Vec::new()).unwrap();
    let mut archive = open_archive(bytes);
    assert_eq!(names(&mut archive), vec!["dir/", "dir/b.txt"]);
}

#[test]
fn file_root_gives_single_entry() {
    let bytes = zip_filesystem(&sample_fs(), "/a.txt", Vec::new()).unwrap();
    let mut archive = open_archive(bytes);
    assert_eq!(names(&mut archive), vec!["a.txt"]);
    assert_eq!(read_entry(&mut archive, "a.txt"), b"hello");
}

#[test]
fn unix_modes_and_timestamps_are_carried() {
    let mut fs = sample_fs();
    // 2020-02-29 12:34:56 UTC
    let modified = UNIX_EPOCH + Duration::from_secs(1_582_979_696);
    fs.set_mode("/a.txt", 0o600).set_modified("/a.txt", modified);

    let bytes = zip_filesystem(&fs, "/", Vec::new()).unwrap();
    let mut archive = open_archive(bytes);

    let file = archive.by_name("a.txt").unwrap();
    assert_eq!(file.unix_mode(), Some(0o100600));
    let time = file.last_modified();
    assert_eq!((time.year(), time.month(), time.day()), (2020, 2, 29));
    assert_eq!((time.hour(), time.minute(), time.second()), (12, 34, 56));
    drop(file);

    let dir = archive.by_name("dir2/").unwrap();
    assert_eq!(dir.unix_mode(), Some(0o040755));
}

#[test]
fn output_is_deterministic() {
    let first = zip_filesystem(&sample_fs(), "/", Vec::new()).unwrap();
    let second = zip_filesystem(&sample_fs(), "/", Vec::new()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn missing_root_fails_without_archive() {
    let mut sink = Vec::new();
    let err = zip_filesystem(&sample_fs(), "/nope", &mut sink).unwrap_err();

    match err {
        ZipperError::Walk { path, source } => {
            assert_eq!(path, "/nope");
            assert_eq!(source.kind(), io::ErrorKind::NotFound);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(sink.is_empty());
    assert!(ZipArchive::new(Cursor::new(sink)).is_err());
}

#[test]
fn walk_error_stops_before_later_entries() {
    let mut fs = FaultyFs::new(sample_fs());
    fs.fail_stat = Some("/dir/b.txt");

    let mut sink = Vec::new();
    let err = zip_filesystem(&fs, "/", &mut sink).unwrap_err();

    assert!(matches!(err, ZipperError::Walk { ref path, .. } if path == "/dir/b.txt"));
    // entries before the failure reached the sink, nothing after it did
    assert!(contains(&sink, b"dir/"));
    assert!(!contains(&sink, b"dir2/"));
    assert!(ZipArchive::new(Cursor::new(sink)).is_err());
}

#[test]
fn open_error_aborts_after_header() {
    let mut fs = FaultyFs::new(sample_fs());
    fs.fail_open = Some("/dir/b.txt");

    let mut sink = Vec::new();
    let err = zip_filesystem(&fs, "/", &mut sink).unwrap_err();

    match err {
        ZipperError::Open { path, source } => {
            assert_eq!(path, "/dir/b.txt");
            assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(contains(&sink, b"dir/b.txt"));
    assert!(!contains(&sink, b"dir2/"));
    assert!(ZipArchive::new(Cursor::new(sink)).is_err());
}

#[test]
fn copy_error_is_reported_with_path() {
    let mut fs = FaultyFs::new(sample_fs());
    fs.fail_read = Some("/a.txt");

    let err = zip_filesystem(&fs, "/", Vec::new()).unwrap_err();
    assert!(matches!(err, ZipperError::Copy { ref path, .. } if path == "/a.txt"));
    assert!(err.to_string().contains("disk on fire"));
}

#[test]
fn sink_failure_surfaces_as_io_error() {
    let err = zip_filesystem(&sample_fs(), "/", ClosedSink).unwrap_err();
    match err {
        ZipperError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn finalize_error_is_returned_on_clean_run() {
    let err = zip_filesystem(&sample_fs(), "/", UnflushableSink::default()).unwrap_err();
    match err {
        ZipperError::Io(e) => assert_eq!(e.to_string(), "flush boom"),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn release_error_does_not_mask_walk_error() {
    let mut fs = FaultyFs::new(sample_fs());
    fs.fail_stat = Some("/dir2");

    let err = zip_filesystem(&fs, "/", UnflushableSink::default()).unwrap_err();
    match err {
        ZipperError::Walk { path, source } => {
            assert_eq!(path, "/dir2");
            assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn works_through_trait_objects() {
    let fs: Box<dyn FileSystem> = Box::new(sample_fs());
    let bytes = zip_filesystem(&*fs, "/", Vec::new()).unwrap();
    assert_eq!(open_archive(bytes).len(), 4);
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
