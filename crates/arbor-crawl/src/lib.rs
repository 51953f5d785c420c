//! arbor-crawl: asynchronous crawling of resource trees.
//!
//! Provides:
//! - **Crawler**: concurrent recursive traversal with exactly-once
//!   completion, restricted by an `arbor_path::Path` pattern
//! - **Resource**: the two-operation interface (`select`, `stat`) a tree
//!   must offer to be crawled
//! - **LocalResource**: the local filesystem, via `tokio::fs`
//! - **MemoryTree**: scripted in-memory trees for tests
//! - **Completion**: a write-once value that many tasks can await
//!
//! Crawls run on the ambient Tokio runtime; every status request is its own
//! task.

pub mod completion;
mod crawler;
mod error;
pub mod local;
pub mod memory;
mod resource;

pub use completion::{Completion, ResolveGuard};
pub use crawler::{CrawlOptions, CrawlProgress, Crawler, Visitor};
pub use error::{CrawlError, ResourceError, ResourceResult};
pub use local::LocalResource;
pub use memory::{MemoryResource, MemoryTree};
pub use resource::{Node, Resource, Stat};
