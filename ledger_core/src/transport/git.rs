//! Git transport: shallow checkout through the `git` binary, then archive.

use super::{FetchResult, Transport};
use crate::archive::create_normalized_archive;
use crate::error::{Error, Result};
use crate::package::GitRef;
use crate::process::ProcessRunner;
use crate::walk::{self, VCS_DIRS};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

const REMOTE_SCHEMES: &[&str] = &["https://", "http://", "ssh://", "file://"];

/// A parsed `[git+]<url>[.git][#tag=X|#branch=X|#commit=X]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitUrl {
    /// URL handed to `git clone`, without the `git+` prefix or fragment.
    pub repository: String,
    /// Ref to check out; `branch=main` when the URL has no fragment.
    pub reference: GitRef,
}

impl GitUrl {
    /// Returns true if `url` has the shape of a git source.
    pub fn matches(url: &str) -> bool {
        if let Some(rest) = url.strip_prefix("git+") {
            return REMOTE_SCHEMES.iter().any(|s| rest.starts_with(s));
        }
        let base = url.split_once('#').map_or(url, |(base, _)| base);
        base.starts_with("https://") && base.trim_end_matches('/').ends_with(".git")
    }

    /// Parse a git source URL.
    pub fn parse(url: &str) -> Result<Self> {
        if !Self::matches(url) {
            return Err(Error::invalid_url(url, "not a git URL"));
        }

        let stripped = url.strip_prefix("git+").unwrap_or(url);
        let (repository, reference) = match stripped.split_once('#') {
            Some((repo, fragment)) => (repo, fragment.parse::<GitRef>()?),
            None => (stripped, GitRef::default()),
        };

        let has_path = REMOTE_SCHEMES
            .iter()
            .find_map(|s| repository.strip_prefix(s))
            .is_some_and(|rest| !rest.is_empty());
        if !has_path {
            return Err(Error::invalid_url(url, "missing repository location"));
        }

        Ok(Self {
            repository: repository.to_string(),
            reference,
        })
    }

    /// Repository identity shared by the `git+https://x` and `https://x.git` spellings.
    pub fn canonical_repository(&self) -> &str {
        let trimmed = self.repository.trim_end_matches('/');
        trimmed.strip_suffix(".git").unwrap_or(trimmed)
    }
}

/// Fetches git repositories by cloning into a scratch directory.
pub struct GitTransport {
    runner: Arc<dyn ProcessRunner>,
}

impl GitTransport {
    /// Create a git transport that invokes `git` through `runner`.
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }
}

impl Transport for GitTransport {
    fn name(&self) -> &str {
        "git"
    }

    fn validate_url(&self, url: &str) -> bool {
        GitUrl::matches(url)
    }

    fn fetch(&self, url: &str) -> Result<FetchResult> {
        let parsed = GitUrl::parse(url)?;

        let scratch = tempfile::TempDir::new()?;
        let checkout = scratch.path().join("checkout");
        let checkout_str = checkout.to_str().ok_or_else(|| {
            Error::invalid_url(url, "scratch directory path is not valid UTF-8")
        })?;

        match &parsed.reference {
            GitRef::Tag(name) | GitRef::Branch(name) => {
                self.runner.run_checked(
                    "git",
                    &[
                        "clone",
                        "--quiet",
                        "--depth",
                        "1",
                        "--branch",
                        name.as_str(),
                        parsed.repository.as_str(),
                        checkout_str,
                    ],
                    None,
                )?;
            }
            GitRef::Commit(sha) => {
                self.runner.run_checked(
                    "git",
                    &["clone", "--quiet", parsed.repository.as_str(), checkout_str],
                    None,
                )?;
                self.runner
                    .run_checked("git", &["checkout", "--quiet", sha.as_str()], Some(&checkout))?;
            }
        }

        let head = self
            .runner
            .run_checked("git", &["rev-parse", "HEAD"], Some(&checkout))?;
        let commit = String::from_utf8_lossy(&head.stdout).trim().to_string();

        let entries = walk::collect_entries(&checkout, VCS_DIRS)?;
        debug!(url, files = entries.len(), %commit, "checked out");

        let mut metadata = BTreeMap::new();
        metadata.insert("transport".to_string(), "git".to_string());
        metadata.insert("kind".to_string(), "directory".to_string());
        metadata.insert(
            "repository".to_string(),
            parsed.canonical_repository().to_string(),
        );
        metadata.insert("ref".to_string(), parsed.reference.to_string());
        if !commit.is_empty() {
            metadata.insert("commit".to_string(), commit);
        }

        Ok(FetchResult::new(
            create_normalized_archive(&entries),
            metadata,
        ))
    }
}
