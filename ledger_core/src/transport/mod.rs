//! Scheme-dispatched fetchers that turn a source URL into normalized bytes.
//!
//! Every transport returns the bytes it fetched together with their
//! [`ContentId`], so content from a git checkout, a local directory, or a
//! tarball is comparable by id alone.

mod file;
mod git;
mod tar;

pub use file::FileTransport;
pub use git::{GitTransport, GitUrl};
pub use tar::TarTransport;

use crate::error::{Error, Result};
use crate::hash::ContentId;
use crate::process::ProcessRunner;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Bytes produced by a transport plus what is known about where they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    /// Normalized bytes (a directory archive or a single normalized file).
    pub content: Vec<u8>,
    /// Transport-specific facts, e.g. `kind=directory`, `commit=<sha>`.
    pub metadata: BTreeMap<String, String>,
    /// BLAKE3 of `content`.
    pub content_id: ContentId,
}

impl FetchResult {
    /// Build a result, hashing `content`.
    pub fn new(content: Vec<u8>, metadata: BTreeMap<String, String>) -> Self {
        let content_id = ContentId::hash(&content);
        Self {
            content,
            metadata,
            content_id,
        }
    }
}

/// A protocol-specific fetcher.
pub trait Transport: Send + Sync {
    /// Short name used in logs and metadata (`git`, `file`, `tar`).
    fn name(&self) -> &str;

    /// Returns true if this transport understands `url`.
    fn validate_url(&self, url: &str) -> bool;

    /// Fetch `url` into normalized bytes.
    fn fetch(&self, url: &str) -> Result<FetchResult>;
}

/// An ordered set of transports; the first one accepting a URL handles it.
#[derive(Default)]
pub struct TransportRegistry {
    transports: Vec<Box<dyn Transport>>,
}

impl TransportRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the git, file, and tar transports, in that order.
    pub fn with_defaults(runner: Arc<dyn ProcessRunner>) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(GitTransport::new(Arc::clone(&runner))));
        registry.register(Box::new(FileTransport::new()));
        registry.register(Box::new(TarTransport::new(runner)));
        registry
    }

    /// Append a transport. Earlier registrations take precedence.
    pub fn register(&mut self, transport: Box<dyn Transport>) {
        self.transports.push(transport);
    }

    /// Names of the registered transports, in dispatch order.
    pub fn names(&self) -> Vec<&str> {
        self.transports.iter().map(|t| t.name()).collect()
    }

    /// Find the transport that would handle `url`.
    pub fn transport_for(&self, url: &str) -> Option<&dyn Transport> {
        self.transports
            .iter()
            .find(|t| t.validate_url(url))
            .map(|t| t.as_ref())
    }

    /// Fetch `url` with the first transport that accepts it.
    pub fn fetch(&self, url: &str) -> Result<FetchResult> {
        let transport = self
            .transport_for(url)
            .ok_or_else(|| Error::unsupported_scheme(url))?;

        debug!(transport = transport.name(), url, "fetching");
        let result = transport.fetch(url)?;
        debug!(transport = transport.name(), url, id = %result.content_id, "fetched");
        Ok(result)
    }
}

/// Fetch `url` and fail `IntegrityCheckFailed` unless it hashes to `expected`.
pub fn fetch_with_verification(
    registry: &TransportRegistry,
    url: &str,
    expected: &ContentId,
) -> Result<FetchResult> {
    let result = registry.fetch(url)?;
    if result.content_id != *expected {
        warn!(url, %expected, actual = %result.content_id, "integrity check failed");
        return Err(Error::integrity_check_failed(
            url,
            expected.to_hex(),
            result.content_id.to_hex(),
        ));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fake::FakeRunner;
    use std::fs;
    use tempfile::TempDir;

    struct EchoTransport;

    impl Transport for EchoTransport {
        fn name(&self) -> &str {
            "echo"
        }

        fn validate_url(&self, url: &str) -> bool {
            url.starts_with("echo:")
        }

        fn fetch(&self, url: &str) -> Result<FetchResult> {
            Ok(FetchResult::new(
                url.trim_start_matches("echo:").as_bytes().to_vec(),
                BTreeMap::new(),
            ))
        }
    }

    fn default_registry() -> TransportRegistry {
        TransportRegistry::with_defaults(Arc::new(FakeRunner::new()))
    }

    #[test]
    fn test_default_order() {
        assert_eq!(default_registry().names(), vec!["git", "file", "tar"]);
    }

    #[test]
    fn test_dispatch_by_scheme() {
        let registry = default_registry();
        let name = |url: &str| registry.transport_for(url).map(|t| t.name().to_string());

        assert_eq!(name("git+https://example.com/a/b#tag=v1").as_deref(), Some("git"));
        assert_eq!(name("https://example.com/a/b.git").as_deref(), Some("git"));
        assert_eq!(name("file:///tmp/x").as_deref(), Some("file"));
        assert_eq!(name("https://example.com/pkg.tar.gz").as_deref(), Some("tar"));
        assert_eq!(name("ftp://example.com/pkg"), None);
    }

    #[test]
    fn test_unsupported_scheme() {
        assert!(matches!(
            default_registry().fetch("ftp://example.com/pkg.tar"),
            Err(Error::UnsupportedScheme { .. })
        ));
        assert!(matches!(
            TransportRegistry::new().fetch("file:///tmp"),
            Err(Error::UnsupportedScheme { .. })
        ));
    }

    #[test]
    fn test_custom_transport() {
        let mut registry = TransportRegistry::new();
        registry.register(Box::new(EchoTransport));
        let result = registry.fetch("echo:payload").unwrap();
        assert_eq!(result.content, b"payload");
        assert_eq!(result.content_id, ContentId::hash(b"payload"));
    }

    #[test]
    fn test_fetch_with_verification() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), b"alpha\n").unwrap();
        let url = format!("file://{}", temp.path().display());

        let registry = default_registry();
        let first = registry.fetch(&url).unwrap();

        let verified = fetch_with_verification(&registry, &url, &first.content_id).unwrap();
        assert_eq!(verified, first);

        let wrong = ContentId::hash(b"not it");
        assert!(matches!(
            fetch_with_verification(&registry, &url, &wrong),
            Err(Error::IntegrityCheckFailed { .. })
        ));
    }
}
