//! In-memory resource trees.
//!
//! Used for testing crawls without touching the filesystem. A
//! [`MemoryTree`] is scripted with a builder, frozen with
//! [`build`](MemoryTree::build), and then crawled through the
//! [`MemoryResource`] handles it hands out. The tree counts every status
//! request per path and can be told to fail or delay particular requests.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use arbor_path::Path;
use async_trait::async_trait;

use crate::error::{ResourceError, ResourceResult};
use crate::resource::{Resource, Stat};

#[derive(Debug, Clone)]
enum Entry {
    File { size: u64 },
    Dir { children: BTreeSet<String> },
    Link { target: String },
}

/// A scripted tree of files, directories and links.
///
/// Builder paths are `/`-separated unescaped names relative to the tree's
/// root; missing parent directories are created on the way.
///
/// ```
/// use arbor_crawl::MemoryTree;
///
/// let root = MemoryTree::new()
///     .file("a", 10)
///     .file("b/c", 5)
///     .symlink("l", "/b")
///     .fail("b/c")
///     .build();
/// assert_eq!(root.tree().len(), 5);
/// ```
#[derive(Debug)]
pub struct MemoryTree {
    entries: HashMap<Path, Entry>,
    failing: HashSet<Path>,
    latency: Option<Duration>,
    requests: Mutex<HashMap<Path, usize>>,
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

fn at(path: &str) -> Path {
    Path::implode(path.split('/'))
}

impl MemoryTree {
    /// An empty tree: a root directory with no children.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            Path::root(),
            Entry::Dir {
                children: BTreeSet::new(),
            },
        );
        Self {
            entries,
            failing: HashSet::new(),
            latency: None,
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Add a file of `size` bytes.
    pub fn file(mut self, path: &str, size: u64) -> Self {
        self.insert(at(path), Entry::File { size });
        self
    }

    /// Add an empty directory.
    pub fn dir(mut self, path: &str) -> Self {
        let path = at(path);
        if !matches!(self.entries.get(&path), Some(Entry::Dir { .. })) {
            self.insert(
                path,
                Entry::Dir {
                    children: BTreeSet::new(),
                },
            );
        }
        self
    }

    /// Add a symbolic link. The target is recorded, never followed.
    pub fn symlink(mut self, path: &str, target: &str) -> Self {
        self.insert(
            at(path),
            Entry::Link {
                target: target.to_string(),
            },
        );
        self
    }

    /// Make status requests for `path` fail. `""` fails the root.
    pub fn fail(mut self, path: &str) -> Self {
        self.failing.insert(at(path));
        self
    }

    /// Delay every status request by up to `latency`.
    ///
    /// Each path gets a fixed fraction of the delay derived from its name,
    /// so sibling requests complete out of order.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Freeze the tree and return a handle to its root.
    pub fn build(self) -> MemoryResource {
        MemoryResource {
            tree: Arc::new(self),
            path: Path::root(),
        }
    }

    fn insert(&mut self, path: Path, entry: Entry) {
        let mut child = path.clone();
        self.entries.insert(path, entry);
        while !child.is_root() {
            let parent = child.up();
            let name = child.name().into_owned();
            match self.entries.get_mut(&parent) {
                Some(Entry::Dir { children }) => {
                    children.insert(name);
                }
                _ => {
                    self.entries.insert(
                        parent.clone(),
                        Entry::Dir {
                            children: BTreeSet::from([name]),
                        },
                    );
                }
            }
            child = parent;
        }
    }

    /// Number of nodes, including the root.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Status requests made so far for `path`.
    pub fn requests(&self, path: &str) -> usize {
        let requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        requests.get(&at(path)).copied().unwrap_or(0)
    }

    /// Status requests made so far across the tree.
    pub fn total_requests(&self) -> usize {
        let requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        requests.values().sum()
    }

    fn record(&self, path: &Path) {
        let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        *requests.entry(path.clone()).or_default() += 1;
    }

    fn delay(&self, path: &Path) -> Option<Duration> {
        let latency = self.latency?;
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        let quarters = (hasher.finish() % 4 + 1) as u32;
        Some(latency * quarters / 4)
    }

    fn entry_stat(&self, path: &Path, entry: &Entry) -> Stat {
        let name = path.name().into_owned();
        match entry {
            Entry::File { size } => Stat::file(name, *size),
            Entry::Link { target } => Stat::symlink(name, target.as_str()),
            Entry::Dir { .. } => Stat {
                name,
                is_dir: true,
                ..Stat::default()
            },
        }
    }

    fn stat(&self, path: &Path) -> ResourceResult<Stat> {
        if self.failing.contains(path) {
            return Err(ResourceError::Io(format!("injected failure: {path}")));
        }
        let entry = self
            .entries
            .get(path)
            .ok_or_else(|| ResourceError::NotFound(path.to_string()))?;

        let mut stat = self.entry_stat(path, entry);
        if let Entry::Dir { children } = entry {
            let files = children
                .iter()
                .filter_map(|name| {
                    let child = path.append_literal(name);
                    self.entries
                        .get(&child)
                        .map(|entry| self.entry_stat(&child, entry))
                })
                .collect();
            stat.files = Some(files);
        }
        Ok(stat)
    }
}

/// A handle to one node of a [`MemoryTree`].
#[derive(Debug, Clone)]
pub struct MemoryResource {
    tree: Arc<MemoryTree>,
    path: Path,
}

impl MemoryResource {
    pub fn tree(&self) -> &MemoryTree {
        &self.tree
    }

    /// Absolute path of this node within its tree.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Resource for MemoryResource {
    fn select(&self, relative: &Path) -> Self {
        Self {
            tree: self.tree.clone(),
            path: self.path.append(&relative.absolutize()),
        }
    }

    async fn stat(&self) -> ResourceResult<Stat> {
        self.tree.record(&self.path);
        match self.tree.delay(&self.path) {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
        self.tree.stat(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    #[test]
    fn builder_creates_parents() {
        let root = MemoryTree::new().file("x/y/z", 3).build();
        let tree = root.tree();
        assert_eq!(tree.len(), 4);
        assert!(matches!(tree.entries.get(&p("/x/y")), Some(Entry::Dir { .. })));
    }

    #[test]
    fn dir_does_not_clear_children() {
        let root = MemoryTree::new().file("d/f", 1).dir("d").build();
        let stat = root.tree().stat(&p("/d")).unwrap();
        assert_eq!(stat.children().len(), 1);
    }

    #[tokio::test]
    async fn stat_lists_children_by_name() {
        let root = MemoryTree::new()
            .file("b", 2)
            .file("a", 1)
            .dir("c")
            .symlink("l", "/a")
            .build();
        let stat = root.stat().await.unwrap();
        assert!(stat.is_dir);
        let names: Vec<_> = stat.children().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "l"]);
        assert!(stat.children()[3].is_symlink());
        assert_eq!(stat.children()[0].size, Some(1));
    }

    #[tokio::test]
    async fn select_stays_inside_tree() {
        let root = MemoryTree::new().file("a/b", 1).build();
        let a = root.select(&p("/a"));
        assert_eq!(a.path(), &p("/a"));
        assert_eq!(a.select(&p("/b")).path(), &p("/a/b"));

        let escaped = a.select(&Path::parse_relative("../../etc").unwrap());
        assert_eq!(escaped.path(), &p("/a/etc"));
        assert!(matches!(escaped.stat().await, Err(ResourceError::NotFound(_))));
    }

    #[tokio::test]
    async fn injected_failures_and_counts() {
        let root = MemoryTree::new().file("a", 1).fail("a").build();
        let a = root.select(&p("/a"));
        assert!(matches!(a.stat().await, Err(ResourceError::Io(_))));
        assert!(a.stat().await.is_err());
        assert_eq!(root.tree().requests("a"), 2);
        assert_eq!(root.tree().requests(""), 0);
        assert_eq!(root.tree().total_requests(), 2);
    }

    #[tokio::test]
    async fn escaped_names_round_trip() {
        let root = MemoryTree::new().file("with space/*", 4).build();
        let stat = root.select(&p("/with%20space")).stat().await.unwrap();
        assert_eq!(stat.name, "with space");
        assert_eq!(stat.children()[0].name, "*");
    }

    #[tokio::test]
    async fn latency_delays_requests() {
        let root = MemoryTree::new()
            .file("a", 1)
            .latency(Duration::from_millis(40))
            .build();
        let started = tokio::time::Instant::now();
        root.stat().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(10));
    }
}
