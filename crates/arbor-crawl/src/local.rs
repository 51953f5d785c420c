//! Local filesystem resources.
//!
//! Backed by `tokio::fs`. Links are reported with `symlink_metadata` and
//! never followed, so a crawl cannot loop through a symlinked directory.

use std::fs::Metadata;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use arbor_path::Path;
use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::ResourceResult;
use crate::resource::{Resource, Stat};

/// A file or directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalResource {
    path: Arc<PathBuf>,
}

impl LocalResource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
        }
    }

    pub fn path(&self) -> &FsPath {
        &self.path
    }

    fn name(&self) -> String {
        match self.path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => self.path.to_string_lossy().into_owned(),
        }
    }
}

fn from_metadata(name: String, meta: &Metadata, link: Option<PathBuf>) -> Stat {
    Stat {
        name,
        is_dir: meta.is_dir(),
        is_file: meta.is_file(),
        size: meta.is_file().then(|| meta.len()),
        link: link.map(|target| target.to_string_lossy().into_owned()),
        files: None,
        unlisted: Vec::new(),
        modified: meta.modified().ok(),
    }
}

async fn read_link(path: &FsPath, meta: &Metadata) -> Option<PathBuf> {
    if !meta.file_type().is_symlink() {
        return None;
    }
    // A link whose target cannot be read is still reported as a link.
    Some(fs::read_link(path).await.unwrap_or_default())
}

#[async_trait]
impl Resource for LocalResource {
    /// Join `relative` below this path. `..` cannot climb out of it.
    fn select(&self, relative: &Path) -> Self {
        let mut path = PathBuf::clone(&self.path);
        path.extend(relative.absolutize().explode());
        Self::new(path)
    }

    async fn stat(&self) -> ResourceResult<Stat> {
        let meta = fs::symlink_metadata(self.path()).await?;
        let link = read_link(self.path(), &meta).await;
        let mut stat = from_metadata(self.name(), &meta, link);
        if !meta.is_dir() {
            return Ok(stat);
        }

        let mut files = Vec::new();
        let mut entries = fs::read_dir(self.path()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    warn!(path = %entry.path().display(), "entry name is not UTF-8; not crawled");
                    stat.unlisted.push(raw.to_string_lossy().into_owned());
                    continue;
                }
            };
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                Err(error) => {
                    debug!(path = %entry.path().display(), %error, "entry vanished while listing");
                    continue;
                }
            };
            let link = read_link(&entry.path(), &meta).await;
            files.push(from_metadata(name, &meta, link));
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        stat.unlisted.sort();
        stat.files = Some(files);
        Ok(stat)
    }
}
