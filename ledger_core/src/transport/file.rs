//! Local filesystem transport.

use super::{FetchResult, Transport};
use crate::archive::{create_normalized_archive, normalize_archive};
use crate::error::{Error, Result};
use crate::walk::{self, VCS_AND_BUILD_DIRS};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Fetches `file://<path>` from the local filesystem.
///
/// Directories become a normalized archive (`kind=directory`); regular files
/// become their line-ending-normalized bytes (`kind=file`).
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTransport;

impl FileTransport {
    /// Create a file transport.
    pub fn new() -> Self {
        Self
    }
}

impl Transport for FileTransport {
    fn name(&self) -> &str {
        "file"
    }

    fn validate_url(&self, url: &str) -> bool {
        url.strip_prefix("file://").is_some_and(|p| !p.is_empty())
    }

    fn fetch(&self, url: &str) -> Result<FetchResult> {
        let path_str = url
            .strip_prefix("file://")
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::invalid_url(url, "expected file://<path>"))?;
        let path = Path::new(path_str);

        if !path.exists() {
            return Err(Error::content_not_found(format!("path {}", path.display())));
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("transport".to_string(), "file".to_string());
        metadata.insert("path".to_string(), path_str.to_string());

        let file_meta = fs::metadata(path)?;
        let content = if file_meta.is_dir() {
            let entries = walk::collect_entries(path, VCS_AND_BUILD_DIRS)?;
            debug!(path = %path.display(), files = entries.len(), "archived directory");
            metadata.insert("kind".to_string(), "directory".to_string());
            create_normalized_archive(&entries)
        } else if file_meta.is_file() {
            metadata.insert("kind".to_string(), "file".to_string());
            normalize_archive(&fs::read(path)?)
        } else {
            return Err(Error::invalid_url(url, "not a regular file or directory"));
        };

        Ok(FetchResult::new(content, metadata))
    }
}
