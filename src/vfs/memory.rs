//! In-memory filesystem

use super::{join, FileSystem, FileType, Metadata};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Read};
use std::time::SystemTime;

#[derive(Debug, Clone)]
enum Content {
    Dir(BTreeSet<String>),
    File(Vec<u8>),
}

#[derive(Debug, Clone)]
struct Node {
    content: Content,
    mode: u32,
    modified: Option<SystemTime>,
}

impl Node {
    fn dir() -> Self {
        Self {
            content: Content::Dir(BTreeSet::new()),
            mode: 0o755,
            modified: None,
        }
    }
}

/// Filesystem held entirely in memory
///
/// Starts with an empty root directory `/`. Parent directories are created on
/// demand by [`MemoryFs::add_file`] and [`MemoryFs::add_dir`].
///
/// ```
/// use vfs_zipper::vfs::{FileSystem, MemoryFs};
///
/// let mut fs = MemoryFs::new();
/// fs.add_file("/", "1.txt", b"1".to_vec());
/// fs.add_file("/docs", "guide.txt", b"read me".to_vec());
///
/// assert_eq!(fs.read_dir("/").unwrap(), vec!["1.txt", "docs"]);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryFs {
    nodes: BTreeMap<String, Node>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::dir());
        Self { nodes }
    }

    /// Add (or replace) file `name` inside directory `dir`
    pub fn add_file(&mut self, dir: &str, name: &str, data: impl Into<Vec<u8>>) -> &mut Self {
        let path = normalize(&join(dir, name));
        self.insert(
            path,
            Node {
                content: Content::File(data.into()),
                mode: 0o644,
                modified: None,
            },
        );
        self
    }

    /// Create directory `path` and any missing parents
    pub fn add_dir(&mut self, path: &str) -> &mut Self {
        let path = normalize(path);
        if !matches!(
            self.nodes.get(&path).map(|n| &n.content),
            Some(Content::Dir(_))
        ) {
            self.insert(path, Node::dir());
        }
        self
    }

    /// Set the modification time of an existing entry
    pub fn set_modified(&mut self, path: &str, modified: SystemTime) -> &mut Self {
        if let Some(node) = self.nodes.get_mut(&normalize(path)) {
            node.modified = Some(modified);
        }
        self
    }

    /// Set the permission bits of an existing entry
    pub fn set_mode(&mut self, path: &str, mode: u32) -> &mut Self {
        if let Some(node) = self.nodes.get_mut(&normalize(path)) {
            node.mode = mode & 0o7777;
        }
        self
    }

    fn insert(&mut self, path: String, node: Node) {
        if let Some((parent, name)) = split_parent(&path) {
            self.add_dir(&parent);
            if let Some(Node {
                content: Content::Dir(children),
                ..
            }) = self.nodes.get_mut(&parent)
            {
                children.insert(name);
            }
        }
        self.nodes.insert(path, node);
    }

    fn node(&self, path: &str) -> io::Result<&Node> {
        self.nodes
            .get(&normalize(path))
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{}: not found", path)))
    }
}

impl FileSystem for MemoryFs {
    fn metadata(&self, path: &str) -> io::Result<Metadata> {
        let node = self.node(path)?;
        let (file_type, len) = match &node.content {
            Content::Dir(_) => (FileType::Dir, 0),
            Content::File(data) => (FileType::File, data.len() as u64),
        };
        Ok(Metadata {
            file_type,
            mode: node.mode,
            modified: node.modified,
            len,
        })
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<String>> {
        match &self.node(path)?.content {
            Content::Dir(children) => Ok(children.iter().cloned().collect()),
            Content::File(_) => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{}: not a directory", path),
            )),
        }
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>> {
        match &self.node(path)?.content {
            Content::File(data) => Ok(Box::new(data.as_slice())),
            Content::Dir(_) => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{}: is a directory", path),
            )),
        }
    }
}

// "/a//b/" -> "/a/b", "" -> "/"
fn normalize(path: &str) -> String {
    let segments: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    format!("/{}", segments.join("/"))
}

fn split_parent(path: &str) -> Option<(String, String)> {
    if path == "/" {
        return None;
    }
    let idx = path.rfind('/')?;
    let parent = if idx == 0 { "/" } else { &path[..idx] };
    Some((parent.to_string(), path[idx + 1..].to_string()))
}
