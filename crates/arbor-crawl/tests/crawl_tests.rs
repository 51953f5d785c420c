//! End-to-end crawl behaviour: request and visit counts, failure handling,
//! exactly-once completion, and pattern restriction.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arbor_crawl::{
    CrawlError, CrawlOptions, Crawler, LocalResource, MemoryResource, MemoryTree, Node, Resource,
    ResourceResult, Stat, Visitor,
};
use arbor_path::Path;
use async_trait::async_trait;
use rstest::rstest;

// ============================================================================
// Helpers
// ============================================================================

/// Sums file sizes and records every visited path.
#[derive(Default)]
struct Tally {
    bytes: AtomicU64,
    files: AtomicUsize,
    visits: Mutex<Vec<Path>>,
    done: AtomicUsize,
    failed: AtomicUsize,
}

impl Tally {
    fn visits(&self) -> Vec<String> {
        let mut paths: Vec<_> = self
            .visits
            .lock()
            .unwrap()
            .iter()
            .map(Path::to_string)
            .collect();
        paths.sort();
        paths
    }

    fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::SeqCst)
    }
}

impl<R: Resource> Visitor<R> for Tally {
    fn visit(&self, node: &Node<R>, stat: &Stat) {
        if stat.is_file {
            self.files.fetch_add(1, Ordering::SeqCst);
            self.bytes.fetch_add(stat.size.unwrap_or(0), Ordering::SeqCst);
        }
        self.visits.lock().unwrap().push(node.path.clone());
    }

    fn done(&self, _root: &R) {
        self.done.fetch_add(1, Ordering::SeqCst);
    }

    fn failed(&self, _error: &CrawlError) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

/// A tree `width` wide at every level and `depth` levels deep, with one
/// byte per file.
fn uniform_tree(width: usize, depth: usize) -> MemoryTree {
    fn fill(tree: MemoryTree, prefix: &str, width: usize, depth: usize) -> MemoryTree {
        (0..width).fold(tree, |tree, i| {
            let path = format!("{prefix}n{i}");
            if depth == 1 {
                tree.file(&path, 1)
            } else {
                fill(tree.dir(&path), &format!("{path}/"), width, depth - 1)
            }
        })
    }
    fill(MemoryTree::new(), "", width, depth)
}

/// `a` (10 bytes) and `b/c` (5 bytes).
fn small_tree() -> MemoryTree {
    MemoryTree::new().file("a", 10).file("b/c", 5)
}

fn recursive(root: MemoryResource) -> Crawler<MemoryResource, Tally> {
    Crawler::new(root, Tally::default()).with_options(CrawlOptions::recursive())
}

// ============================================================================
// Counting
// ============================================================================

#[rstest]
#[case::single_root(0, 0)]
#[case::flat(8, 1)]
#[case::bushy(4, 3)]
#[case::chain(1, 40)]
#[tokio::test]
async fn every_node_requested_and_visited_once(#[case] width: usize, #[case] depth: usize) {
    let root = uniform_tree(width, depth).build();
    let nodes = root.tree().len();

    let crawler = recursive(root.clone());
    crawler.run().await.unwrap();

    assert_eq!(root.tree().total_requests(), nodes);
    assert_eq!(crawler.visitor().visits().len(), nodes);
    let progress = crawler.progress();
    assert_eq!(progress.requested, nodes);
    assert_eq!(progress.visited, nodes);
    assert_eq!(progress.pending, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn completes_once_under_parallel_out_of_order_completion() {
    let root = uniform_tree(5, 3)
        .latency(Duration::from_millis(4))
        .build();
    let nodes = root.tree().len();

    let crawler = recursive(root.clone());
    crawler.run().await.unwrap();

    assert_eq!(root.tree().total_requests(), nodes);
    assert_eq!(crawler.visitor().visits().len(), nodes);
    assert_eq!(crawler.visitor().done.load(Ordering::SeqCst), 1);
    assert_eq!(crawler.visitor().bytes(), 125);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn root_failure_is_fatal_and_visits_nothing() {
    let root = small_tree().fail("").build();
    let crawler = recursive(root.clone());

    let err = crawler.run().await.unwrap_err();
    assert!(matches!(err, CrawlError::RootStatus(_)));
    assert!(crawler.visitor().visits().is_empty());
    assert_eq!(crawler.visitor().failed.load(Ordering::SeqCst), 1);
    assert_eq!(crawler.visitor().done.load(Ordering::SeqCst), 0);
    assert_eq!(root.tree().total_requests(), 1);
}

#[tokio::test]
async fn missing_root_is_fatal() {
    let root = small_tree().build().select(&Path::parse("/nope").unwrap());
    let err = recursive(root).run().await.unwrap_err();
    assert!(matches!(err, CrawlError::RootStatus(arbor_crawl::ResourceError::NotFound(_))));
}

#[tokio::test]
async fn non_root_failure_is_absorbed() {
    let root = small_tree().file("b/d", 7).fail("b").build();
    let crawler = recursive(root.clone());

    let returned = crawler.run().await.unwrap();
    assert!(returned.path().is_root());
    assert_eq!(crawler.visitor().visits(), vec!["/", "/a"]);
    assert_eq!(crawler.visitor().bytes(), 10);
    assert_eq!(crawler.progress().failed, 1);
    assert_eq!(root.tree().requests("b/c"), 0);
}

#[tokio::test]
async fn failures_in_siblings_do_not_stop_others() {
    let root = uniform_tree(3, 2).fail("n0").fail("n2/n1").build();
    let crawler = recursive(root);
    crawler.run().await.unwrap();

    let visits = crawler.visitor().visits();
    assert_eq!(
        visits,
        vec!["/", "/n1", "/n1/n0", "/n1/n1", "/n1/n2", "/n2", "/n2/n0", "/n2/n2"]
    );
    assert_eq!(crawler.progress().failed, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_visitor_does_not_stall_completion() {
    let root = small_tree().build();
    let crawler = Crawler::new(root, |node: &Node<MemoryResource>, _: &Stat| {
        if node.path.to_string() == "/a" {
            panic!("visitor failure");
        }
    })
    .with_options(CrawlOptions::recursive());

    let outcome = tokio::time::timeout(Duration::from_secs(5), crawler.run()).await;
    assert!(outcome.expect("crawl stalled").is_ok());
}

/// Panics from a chosen completion hook.
struct PanickingHook {
    hook: &'static str,
}

impl<R: Resource> Visitor<R> for PanickingHook {
    fn visit(&self, _node: &Node<R>, _stat: &Stat) {}

    fn done(&self, _root: &R) {
        if self.hook == "done" {
            panic!("done hook failure");
        }
    }

    fn failed(&self, _error: &CrawlError) {
        if self.hook == "failed" {
            panic!("failed hook failure");
        }
    }

    fn always(&self) {
        if self.hook == "always" {
            panic!("always hook failure");
        }
    }
}

#[rstest]
#[case::done("done", false)]
#[case::always("always", false)]
#[case::failed("failed", true)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_completion_hook_still_publishes_outcome(
    #[case] hook: &'static str,
    #[case] root_fails: bool,
) {
    let tree = if root_fails { small_tree().fail("") } else { small_tree() };
    let crawler =
        Crawler::new(tree.build(), PanickingHook { hook }).with_options(CrawlOptions::recursive());

    let outcome = tokio::time::timeout(Duration::from_secs(5), crawler.run())
        .await
        .expect("crawl stalled");
    assert_eq!(outcome.is_err(), root_fails);
    assert!(crawler.is_done());
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn sums_file_sizes_end_to_end() {
    let crawler = recursive(small_tree().build());
    crawler.run().await.unwrap();
    assert_eq!(crawler.visitor().bytes(), 15);
    assert_eq!(crawler.visitor().files.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn starting_twice_crawls_once() {
    let root = small_tree().build();
    let crawler = recursive(root.clone());

    crawler.start();
    crawler.start();
    crawler.wait().await.unwrap();
    crawler.start();

    assert_eq!(root.tree().total_requests(), 4);
    assert_eq!(crawler.visitor().visits().len(), 4);
    assert_eq!(crawler.visitor().done.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn many_waiters_see_the_same_outcome() {
    let crawler = Arc::new(recursive(small_tree().latency(Duration::from_millis(2)).build()));
    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let crawler = crawler.clone();
            tokio::spawn(async move { crawler.wait().await.map(|root| root.path().clone()) })
        })
        .collect();

    crawler.start();
    for waiter in waiters {
        assert_eq!(waiter.await.unwrap().unwrap(), Path::root());
    }
    assert!(crawler.is_done());
}

// ============================================================================
// Shape restrictions
// ============================================================================

#[tokio::test]
async fn shallow_crawl_visits_root_and_children() {
    let root = small_tree().build();
    let crawler = Crawler::new(root.clone(), Tally::default()).with_options(CrawlOptions::shallow());
    crawler.run().await.unwrap();

    assert_eq!(crawler.visitor().visits(), vec!["/", "/a", "/b"]);
    assert_eq!(root.tree().requests("b/c"), 0);
}

#[tokio::test]
async fn glob_pattern_selects_matching_files() {
    let root = MemoryTree::new()
        .file("src/lib.rs", 100)
        .file("src/main.rs", 20)
        .file("src/notes.txt", 3)
        .file("docs/guide.rs", 9)
        .build();
    let crawler = recursive(root.clone()).with_pattern(Path::parse("/src/*.rs").unwrap());
    crawler.run().await.unwrap();

    assert_eq!(crawler.visitor().visits(), vec!["/src/lib.rs", "/src/main.rs"]);
    assert_eq!(crawler.visitor().bytes(), 120);
    assert_eq!(root.tree().requests("docs"), 0);
}

/// Reports itself as a link that still carries a listing; the crawler must
/// not descend into it.
#[derive(Clone)]
struct LinkWithListing {
    path: Path,
    requests: Arc<AtomicUsize>,
}

#[async_trait]
impl Resource for LinkWithListing {
    fn select(&self, relative: &Path) -> Self {
        Self {
            path: self.path.append(&relative.absolutize()),
            requests: self.requests.clone(),
        }
    }

    async fn stat(&self) -> ResourceResult<Stat> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let children = vec![Stat::file("inside", 1)];
        if self.path.is_root() {
            return Ok(Stat::dir("", vec![Stat::symlink("link", "/elsewhere")]));
        }
        let mut stat = Stat::dir(self.path.name(), children);
        stat.link = Some("/elsewhere".into());
        Ok(stat)
    }
}

#[tokio::test]
async fn symlinks_are_visited_but_not_expanded() {
    let requests = Arc::new(AtomicUsize::new(0));
    let root = LinkWithListing {
        path: Path::root(),
        requests: requests.clone(),
    };
    let crawler = Crawler::new(root, Tally::default()).with_options(CrawlOptions::recursive());
    crawler.run().await.unwrap();

    assert_eq!(crawler.visitor().visits(), vec!["/", "/link"]);
    assert_eq!(requests.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Local filesystem
// ============================================================================

#[tokio::test]
async fn crawls_a_local_directory() {
    let dir = std::env::temp_dir().join(format!("arbor-crawl-test-{}", std::process::id()));
    let _ = tokio::fs::remove_dir_all(&dir).await;
    tokio::fs::create_dir_all(dir.join("b")).await.unwrap();
    tokio::fs::write(dir.join("a"), vec![0u8; 10]).await.unwrap();
    tokio::fs::write(dir.join("b/c"), vec![0u8; 5]).await.unwrap();
    tokio::fs::write(dir.join("b/with space"), vec![0u8; 1]).await.unwrap();

    let crawler = Crawler::new(LocalResource::new(&dir), Tally::default())
        .with_options(CrawlOptions::recursive());
    let returned = crawler.run().await.unwrap();

    assert_eq!(returned.path(), dir.as_path());
    assert_eq!(crawler.visitor().bytes(), 16);
    assert_eq!(
        crawler.visitor().visits(),
        vec!["/", "/a", "/b", "/b/c", "/b/with%20space"]
    );

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn non_utf8_local_names_are_counted_as_skipped() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let dir = std::env::temp_dir().join(format!("arbor-crawl-raw-{}", std::process::id()));
    let _ = tokio::fs::remove_dir_all(&dir).await;
    tokio::fs::create_dir_all(&dir).await.unwrap();
    tokio::fs::write(dir.join("good"), vec![0u8; 7]).await.unwrap();
    tokio::fs::write(dir.join(OsStr::from_bytes(b"bad\xffname")), vec![0u8; 100])
        .await
        .unwrap();

    let crawler = Crawler::new(LocalResource::new(&dir), Tally::default())
        .with_options(CrawlOptions::recursive());
    crawler.run().await.unwrap();

    assert_eq!(crawler.visitor().visits(), vec!["/", "/good"]);
    assert_eq!(crawler.visitor().bytes(), 7);
    let progress = crawler.progress();
    assert_eq!(progress.skipped, 1);
    assert_eq!(progress.failed, 0);

    let _ = tokio::fs::remove_dir_all(&dir).await;
}
