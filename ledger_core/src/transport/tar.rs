//! Tarball transport: download with `curl`, unpack with `tar`, then archive.

use super::{FetchResult, Transport};
use super::git::GitUrl;
use crate::archive::create_normalized_archive;
use crate::error::{Error, Result};
use crate::hash::ContentId;
use crate::process::ProcessRunner;
use crate::walk::{self, VCS_DIRS};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Fetches archive artifacts from raw `https://` URLs.
///
/// The unpacked tree is hashed the same way as a git checkout or local
/// directory. A lone top-level directory (`pkg-1.0/`) is stripped first. The
/// BLAKE3 of the downloaded artifact itself is recorded as `artifact` metadata.
pub struct TarTransport {
    runner: Arc<dyn ProcessRunner>,
}

impl TarTransport {
    /// Create a tar transport that invokes `curl` and `tar` through `runner`.
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }
}

impl Transport for TarTransport {
    fn name(&self) -> &str {
        "tar"
    }

    fn validate_url(&self, url: &str) -> bool {
        url.strip_prefix("https://").is_some_and(|rest| !rest.is_empty()) && !GitUrl::matches(url)
    }

    fn fetch(&self, url: &str) -> Result<FetchResult> {
        if !self.validate_url(url) {
            return Err(Error::invalid_url(url, "expected https://<archive>"));
        }

        let scratch = tempfile::TempDir::new()?;
        let artifact = scratch.path().join("artifact");
        let unpacked = scratch.path().join("unpacked");
        fs::create_dir_all(&unpacked)?;

        let artifact_str = utf8_path(url, &artifact)?;
        let unpacked_str = utf8_path(url, &unpacked)?;

        self.runner
            .run_checked("curl", &["-fsSL", "-o", artifact_str, url], None)?;
        let artifact_id = ContentId::hash(&fs::read(&artifact)?);

        self.runner
            .run_checked("tar", &["-xf", artifact_str, "-C", unpacked_str], None)?;

        let root = single_top_level_dir(&unpacked)?.unwrap_or(unpacked);
        let entries = walk::collect_entries(&root, VCS_DIRS)?;
        debug!(url, files = entries.len(), artifact = %artifact_id, "unpacked");

        let mut metadata = BTreeMap::new();
        metadata.insert("transport".to_string(), "tar".to_string());
        metadata.insert("kind".to_string(), "directory".to_string());
        metadata.insert("url".to_string(), url.to_string());
        metadata.insert("artifact".to_string(), artifact_id.to_hex());

        Ok(FetchResult::new(
            create_normalized_archive(&entries),
            metadata,
        ))
    }
}

fn utf8_path<'a>(url: &str, path: &'a Path) -> Result<&'a str> {
    path.to_str()
        .ok_or_else(|| Error::invalid_url(url, "scratch directory path is not valid UTF-8"))
}

/// If `dir` holds exactly one entry and it is a directory, return it.
fn single_top_level_dir(dir: &Path) -> Result<Option<PathBuf>> {
    let mut children = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    if children.len() != 1 {
        return Ok(None);
    }
    let only = children.remove(0);
    if only.file_type()?.is_dir() {
        Ok(Some(only.path()))
    } else {
        Ok(None)
    }
}
