//! The resource layer a crawl runs against.
//!
//! A [`Resource`] is a handle to one node of some tree (a local directory,
//! an in-memory fixture, a remote share). The crawler only ever asks two
//! things of it: navigate to a node by relative path, and fetch that node's
//! [`Stat`].

use std::time::SystemTime;

use arbor_path::Path;
use async_trait::async_trait;

use crate::error::ResourceResult;

/// A handle to one node of a resource tree.
///
/// Handles are cheap to clone and are moved into crawl tasks, so
/// implementations keep shared state behind an `Arc`.
#[async_trait]
pub trait Resource: Clone + Send + Sync + 'static {
    /// The node at `relative` beneath this one.
    ///
    /// `relative` is read as if rooted here: `..` never climbs above this
    /// node, and the root path selects this node itself.
    fn select(&self, relative: &Path) -> Self;

    /// Fetch this node's status.
    async fn stat(&self) -> ResourceResult<Stat>;
}

/// Status of one resource node.
///
/// Directory listings carry a `Stat` per child; only `name` is required of
/// those, the crawler fetches each child's own status separately.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stat {
    /// Unescaped name of the node within its parent.
    pub name: String,
    pub is_dir: bool,
    pub is_file: bool,
    /// Size in bytes, for files.
    pub size: Option<u64>,
    /// Link target, if the node is a symbolic link.
    pub link: Option<String>,
    /// Child entries, if the node is a collection.
    pub files: Option<Vec<Stat>>,
    /// Lossy names of child entries that have no path form, such as
    /// non-UTF-8 file names. They are reported but never crawled.
    pub unlisted: Vec<String>,
    pub modified: Option<SystemTime>,
}

impl Stat {
    /// A regular file.
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            is_file: true,
            size: Some(size),
            ..Self::default()
        }
    }

    /// A directory with the given children.
    pub fn dir(name: impl Into<String>, files: Vec<Stat>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
            files: Some(files),
            ..Self::default()
        }
    }

    /// A symbolic link.
    pub fn symlink(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            link: Some(target.into()),
            ..Self::default()
        }
    }

    pub fn is_symlink(&self) -> bool {
        self.link.is_some()
    }

    /// Children to descend into. Empty for files and links.
    pub fn children(&self) -> &[Stat] {
        self.files.as_deref().unwrap_or_default()
    }
}

/// A visited node: its resource handle and its path relative to the crawl
/// root.
#[derive(Debug, Clone)]
pub struct Node<R> {
    pub resource: R,
    pub path: Path,
}

impl<R> Node<R> {
    pub fn new(resource: R, path: Path) -> Self {
        Self { resource, path }
    }

    /// True for the crawl root itself.
    pub fn is_root(&self) -> bool {
        self.path.is_root()
    }
}
