//! Asynchronous recursive crawler.
//!
//! A [`Crawler`] walks a [`Resource`] tree from its root, requesting the
//! status of every node it discovers and handing each one to a
//! [`Visitor`]. Every status request runs as its own Tokio task, so
//! siblings are fetched concurrently and complete in any order.
//!
//! Completion is detected with a pending counter. Each traversal step
//! increments the counter before its task is spawned, and decrements it
//! only after the task has issued all of its children's steps. A subtree
//! therefore keeps the counter above zero until every node below it has
//! finished, and the counter reaching zero means the whole crawl is done.
//!
//! Only a failure to stat the root is fatal. Any other failed node is
//! logged and skipped, and the rest of the tree is still crawled. Listed
//! entries that have no path form are counted in
//! [`CrawlProgress::skipped`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use arbor_path::Path;
use tracing::{debug, trace, warn};

use crate::completion::Completion;
use crate::error::CrawlError;
use crate::resource::{Node, Resource, Stat};

/// Per-node callbacks for a crawl.
///
/// `visit` is invoked once for every node the crawl's pattern covers,
/// never after the crawl has terminated. Exactly one of `done` or `failed`
/// is invoked when the crawl terminates, followed by `always`.
///
/// Any `Fn(&Node<R>, &Stat)` closure is a visitor.
pub trait Visitor<R: Resource>: Send + Sync + 'static {
    fn visit(&self, node: &Node<R>, stat: &Stat);

    /// The crawl finished; `root` is the resource it started from.
    fn done(&self, _root: &R) {}

    /// The crawl was aborted by a root failure.
    fn failed(&self, _error: &CrawlError) {}

    /// Runs after `done` or `failed`.
    fn always(&self) {}
}

impl<R, F> Visitor<R> for F
where
    R: Resource,
    F: Fn(&Node<R>, &Stat) + Send + Sync + 'static,
{
    fn visit(&self, node: &Node<R>, stat: &Stat) {
        self(node, stat)
    }
}

/// Options for a crawl.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlOptions {
    /// Descend below the root's immediate children (default `false`).
    pub recursive: bool,
    /// Deepest node to request, counting the root's children as depth 1
    /// (None = unlimited).
    pub max_depth: Option<usize>,
}

impl CrawlOptions {
    /// Crawl the whole tree.
    pub fn recursive() -> Self {
        Self {
            recursive: true,
            max_depth: None,
        }
    }

    /// Crawl the root and its immediate children only.
    pub fn shallow() -> Self {
        Self::default()
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }
}

/// A snapshot of crawl counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlProgress {
    /// Traversal steps not yet balanced.
    pub pending: usize,
    /// Status requests issued.
    pub requested: usize,
    /// Nodes handed to the visitor.
    pub visited: usize,
    /// Status requests below the root that failed and were skipped.
    pub failed: usize,
    /// Listed entries that were never requested because they have no path
    /// form. See [`Stat::unlisted`].
    pub skipped: usize,
}

struct State<R> {
    started: AtomicBool,
    terminated: AtomicBool,
    pending: AtomicUsize,
    requested: AtomicUsize,
    visited: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    outcome: Completion<Result<R, CrawlError>>,
}

/// Everything a traversal step needs. Cloned into each spawned task.
struct Context<R, V> {
    root: R,
    pattern: Path,
    options: CrawlOptions,
    visitor: Arc<V>,
    state: Arc<State<R>>,
}

impl<R: Clone, V> Clone for Context<R, V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            pattern: self.pattern.clone(),
            options: self.options,
            visitor: self.visitor.clone(),
            state: self.state.clone(),
        }
    }
}

/// Balances one pending increment when dropped, including when the step's
/// task unwinds from a panicking visitor.
struct PendingGuard<R: Resource, V: Visitor<R>>(Context<R, V>);

impl<R: Resource, V: Visitor<R>> Drop for PendingGuard<R, V> {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// An asynchronous crawl over one resource tree.
///
/// # Examples
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU64, Ordering};
///
/// use arbor_crawl::{CrawlOptions, Crawler, MemoryTree, Node, MemoryResource, Stat};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let root = MemoryTree::new().file("a", 10).file("b/c", 5).build();
/// let total = Arc::new(AtomicU64::new(0));
/// let sum = total.clone();
///
/// let crawler = Crawler::new(root, move |_: &Node<MemoryResource>, stat: &Stat| {
///     sum.fetch_add(stat.size.unwrap_or(0), Ordering::SeqCst);
/// })
/// .with_options(CrawlOptions::recursive());
///
/// crawler.run().await.unwrap();
/// assert_eq!(total.load(Ordering::SeqCst), 15);
/// # });
/// ```
pub struct Crawler<R: Resource, V: Visitor<R>> {
    ctx: Context<R, V>,
}

impl<R: Resource, V: Visitor<R>> Crawler<R, V> {
    /// Create a crawler over `root` with the default options and a pattern
    /// that admits everything.
    pub fn new(root: R, visitor: V) -> Self {
        Self {
            ctx: Context {
                root,
                pattern: Path::root(),
                options: CrawlOptions::default(),
                visitor: Arc::new(visitor),
                state: Arc::new(State {
                    started: AtomicBool::new(false),
                    terminated: AtomicBool::new(false),
                    pending: AtomicUsize::new(0),
                    requested: AtomicUsize::new(0),
                    visited: AtomicUsize::new(0),
                    failed: AtomicUsize::new(0),
                    skipped: AtomicUsize::new(0),
                    outcome: Completion::new(),
                }),
            },
        }
    }

    /// Restrict the crawl to paths the pattern can reach.
    ///
    /// Only nodes whose path, truncated to the pattern's depth, matches the
    /// pattern are requested, and only nodes the pattern
    /// [covers](Path::covers) are visited. Relative patterns are read from
    /// the crawl root.
    pub fn with_pattern(mut self, pattern: Path) -> Self {
        self.ctx.pattern = pattern.absolutize();
        self
    }

    pub fn with_options(mut self, options: CrawlOptions) -> Self {
        self.ctx.options = options;
        self
    }

    pub fn pattern(&self) -> &Path {
        &self.ctx.pattern
    }

    pub fn options(&self) -> CrawlOptions {
        self.ctx.options
    }

    pub fn visitor(&self) -> &V {
        &self.ctx.visitor
    }

    /// Begin crawling. Only the first call has any effect.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn start(&self) {
        if self.ctx.state.started.swap(true, Ordering::SeqCst) {
            trace!("crawl already started");
            return;
        }
        debug!(pattern = %self.ctx.pattern, options = ?self.ctx.options, "crawl started");
        let root = Path::root();
        self.ctx.crawl(self.ctx.root.select(&root), root);
    }

    /// Wait for the crawl to terminate.
    ///
    /// Resolves to the root resource once every node has been handled, or
    /// to the error that made the root unreadable. Waiting on a crawl that
    /// was never started waits forever.
    pub async fn wait(&self) -> Result<R, CrawlError> {
        self.ctx.state.outcome.wait().await
    }

    /// Start the crawl and wait for it.
    #[tracing::instrument(level = "debug", skip(self), fields(pattern = %self.ctx.pattern))]
    pub async fn run(&self) -> Result<R, CrawlError> {
        self.start();
        self.wait().await
    }

    /// True once the outcome is available to [`wait`](Crawler::wait).
    pub fn is_done(&self) -> bool {
        self.ctx.state.outcome.is_resolved()
    }

    pub fn progress(&self) -> CrawlProgress {
        let state = &self.ctx.state;
        CrawlProgress {
            pending: state.pending.load(Ordering::SeqCst),
            requested: state.requested.load(Ordering::SeqCst),
            visited: state.visited.load(Ordering::SeqCst),
            failed: state.failed.load(Ordering::SeqCst),
            skipped: state.skipped.load(Ordering::SeqCst),
        }
    }
}

impl<R: Resource, V: Visitor<R>> Context<R, V> {
    fn terminated(&self) -> bool {
        self.state.terminated.load(Ordering::SeqCst)
    }

    /// One traversal step: request the status of `resource` at `path`.
    fn crawl(&self, resource: R, path: Path) {
        self.state.pending.fetch_add(1, Ordering::SeqCst);
        if self.terminated() {
            trace!(%path, "crawl terminated; request skipped");
            self.release();
            return;
        }

        let ctx = self.clone();
        tokio::spawn(async move {
            let _pending = PendingGuard(ctx.clone());
            ctx.state.requested.fetch_add(1, Ordering::SeqCst);
            trace!(%path, "stat");
            let status = resource.stat().await;
            match status {
                Ok(stat) => ctx.expand(Node::new(resource, path), &stat),
                Err(error) if path.is_root() => ctx.finish(Err(CrawlError::RootStatus(error))),
                Err(error) => {
                    ctx.state.failed.fetch_add(1, Ordering::SeqCst);
                    debug!(%path, %error, "stat failed; skipping");
                }
            }
        });
    }

    /// Visit a node and issue steps for the children worth requesting.
    fn expand(&self, node: Node<R>, stat: &Stat) {
        if self.terminated() {
            return;
        }
        if self.pattern.covers(&node.path) {
            self.state.visited.fetch_add(1, Ordering::SeqCst);
            self.visitor.visit(&node, stat);
        }

        if stat.is_symlink() || !(self.options.recursive || node.is_root()) {
            return;
        }
        if let Some(max) = self.options.max_depth
            && node.path.depth() >= max
        {
            return;
        }

        if !stat.unlisted.is_empty() {
            self.state
                .skipped
                .fetch_add(stat.unlisted.len(), Ordering::SeqCst);
            warn!(
                path = %node.path,
                names = ?stat.unlisted,
                "entries without a path form skipped"
            );
        }
        for child in stat.children() {
            if matches!(child.name.as_str(), "" | "." | "..") {
                debug!(path = %node.path, name = ?child.name, "ignoring self-referencing entry");
                continue;
            }
            let path = node.path.append_literal(&child.name);
            if self.admits(&path) {
                self.crawl(self.root.select(&path), path);
            }
        }
    }

    /// True if `path` is on the way to, or beneath, something the pattern
    /// matches.
    fn admits(&self, path: &Path) -> bool {
        let depth = self.pattern.depth().min(path.depth());
        self.pattern.truncate(depth).matches(&path.truncate(depth))
    }

    fn release(&self) {
        if self.state.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.finish(Ok(self.root.clone()));
        }
    }

    /// Terminate the crawl. Only the first call does anything.
    ///
    /// The outcome is published even if a visitor hook panics, so waiters
    /// always wake.
    fn finish(&self, outcome: Result<R, CrawlError>) {
        if self.state.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        let _publish = self.state.outcome.resolve_on_drop(outcome.clone());
        match &outcome {
            Ok(root) => {
                debug!(
                    requested = self.state.requested.load(Ordering::SeqCst),
                    visited = self.state.visited.load(Ordering::SeqCst),
                    failed = self.state.failed.load(Ordering::SeqCst),
                    skipped = self.state.skipped.load(Ordering::SeqCst),
                    "crawl done"
                );
                self.visitor.done(root);
            }
            Err(error) => {
                debug!(%error, "crawl failed");
                self.visitor.failed(error);
            }
        }
        self.visitor.always();
    }
}
