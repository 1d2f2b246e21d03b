//! Declared and resolved package records.

use crate::capability::Capability;
use crate::error::{Error, Result};
use crate::hash::ContentId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Which revision of a git repository to check out.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GitRef {
    /// `tag=<name>`
    Tag(String),
    /// `branch=<name>`
    Branch(String),
    /// `commit=<sha>`
    Commit(String),
}

impl GitRef {
    /// The ref value without its kind (`v2.1.0`, `main`, a sha).
    pub fn value(&self) -> &str {
        match self {
            GitRef::Tag(v) | GitRef::Branch(v) | GitRef::Commit(v) => v,
        }
    }

    /// The kind keyword used in URLs and manifests.
    pub fn kind(&self) -> &'static str {
        match self {
            GitRef::Tag(_) => "tag",
            GitRef::Branch(_) => "branch",
            GitRef::Commit(_) => "commit",
        }
    }

    /// Build a ref from a kind keyword and value.
    pub fn from_parts(kind: &str, value: &str) -> Result<Self> {
        if value.is_empty() {
            return Err(Error::invalid_url(
                format!("{}={}", kind, value),
                "empty git ref",
            ));
        }
        match kind {
            "tag" => Ok(GitRef::Tag(value.to_string())),
            "branch" => Ok(GitRef::Branch(value.to_string())),
            "commit" => Ok(GitRef::Commit(value.to_string())),
            _ => Err(Error::invalid_url(
                format!("{}={}", kind, value),
                "expected tag=, branch=, or commit=",
            )),
        }
    }
}

impl Default for GitRef {
    fn default() -> Self {
        GitRef::Branch("main".to_string())
    }
}

impl fmt::Display for GitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.kind(), self.value())
    }
}

impl FromStr for GitRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (kind, value) = s
            .split_once('=')
            .ok_or_else(|| Error::invalid_url(s, "expected <kind>=<value> git ref"))?;
        Self::from_parts(kind, value)
    }
}

impl Serialize for GitRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GitRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Where a package's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Source {
    /// A git repository at a ref.
    Git {
        url: String,
        #[serde(rename = "ref")]
        reference: GitRef,
    },
    /// A local file or directory, relative to the manifest or absolute.
    Path { path: String },
    /// A downloadable archive. The checksum is advisory.
    Tar {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        checksum: Option<String>,
    },
}

impl Source {
    /// The URL handed to the transport registry.
    ///
    /// - `Git{url, ref}` → `git+<url>#<ref>` (an existing `git+` prefix is kept)
    /// - `Path{path}` → `file://<path>`
    /// - `Tar{url, ..}` → `url` verbatim
    pub fn canonical_url(&self) -> String {
        match self {
            Source::Git { url, reference } => {
                let base = url.strip_prefix("git+").unwrap_or(url);
                format!("git+{}#{}", base, reference)
            }
            Source::Path { path } => format!("file://{}", path),
            Source::Tar { url, .. } => url.clone(),
        }
    }

    /// Resolve a relative `Path` source against `base`; other sources are unchanged.
    pub fn rebased(&self, base: &Path) -> Source {
        match self {
            Source::Path { path } if Path::new(path).is_relative() => Source::Path {
                path: base.join(path).to_string_lossy().into_owned(),
            },
            other => other.clone(),
        }
    }

    /// Short transport-style name of the source kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Source::Git { .. } => "git",
            Source::Path { .. } => "path",
            Source::Tar { .. } => "tar",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_url())
    }
}

/// An unresolved dependency as declared in a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRef {
    pub name: String,
    pub source: Source,
    pub capabilities: Vec<Capability>,
}

/// A pinned, hash-verified dependency record as written to the lockfile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPackage {
    pub name: String,
    pub version: String,
    pub content_id: ContentId,
    pub source: Source,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}
