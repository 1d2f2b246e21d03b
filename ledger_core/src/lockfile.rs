//! Machine-facing lockfile (`ledger.lock`), stored as JSON.

use crate::error::{Error, Result};
use crate::hash::ContentId;
use crate::package::ResolvedPackage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Default lockfile name.
pub const LOCKFILE_FILE: &str = "ledger.lock";

/// The only lockfile schema version this build reads and writes.
pub const LOCKFILE_VERSION: u32 = 1;

/// Persisted snapshot of the last approved resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockfile {
    pub version: u32,
    pub packages: BTreeMap<String, ResolvedPackage>,
}

impl Default for Lockfile {
    fn default() -> Self {
        Self {
            version: LOCKFILE_VERSION,
            packages: BTreeMap::new(),
        }
    }
}

impl Lockfile {
    /// Build a lockfile keyed by package name.
    pub fn from_packages(packages: impl IntoIterator<Item = ResolvedPackage>) -> Self {
        Self {
            version: LOCKFILE_VERSION,
            packages: packages.into_iter().map(|p| (p.name.clone(), p)).collect(),
        }
    }

    /// Parse lockfile JSON.
    ///
    /// Errors, checked in this order: `InvalidJson` for malformed JSON,
    /// `UnsupportedVersion` for any version but 1, `InvalidContentId` for a
    /// content id that is not a 64-char hex string, then `InvalidJson` for any other
    /// schema mismatch.
    pub fn parse(input: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(input)?;

        let version = value
            .get("version")
            .ok_or_else(|| Error::invalid_json("missing field `version`"))?;
        match version.as_u64() {
            Some(v) if v == u64::from(LOCKFILE_VERSION) => {}
            _ => return Err(Error::unsupported_version(version.to_string())),
        }

        if let Some(packages) = value.get("packages").and_then(Value::as_object) {
            for (name, package) in packages {
                match package.get("content_id") {
                    Some(Value::String(id)) => {
                        ContentId::from_hex(id).map_err(|e| {
                            Error::invalid_content_id(format!("package {}: {}", name, e))
                        })?;
                    }
                    Some(other) => {
                        return Err(Error::invalid_content_id(format!(
                            "package {}: expected a hex string, got {}",
                            name, other
                        )));
                    }
                    None => {}
                }
            }
        }

        let lockfile: Lockfile = serde_json::from_value(value)?;
        for (key, package) in &lockfile.packages {
            if *key != package.name {
                return Err(Error::invalid_json(format!(
                    "package key {} does not match name {}",
                    key, package.name
                )));
            }
        }
        Ok(lockfile)
    }

    /// Serialize to pretty-printed JSON with a trailing newline.
    pub fn serialize(&self) -> Result<String> {
        let mut out = serde_json::to_string_pretty(self)?;
        out.push('\n');
        Ok(out)
    }

    /// Read a lockfile that must exist. A missing or unreadable file fails
    /// `LockfileParseError`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::lockfile_parse(path, e.to_string()))?;
        Self::parse(&text)
    }

    /// Read a lockfile if present. Absence is `Ok(None)`.
    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }

    /// Write atomically: a sibling temp file is persisted over `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(self.serialize()?.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(path)?;
        Ok(())
    }

    /// Content ids of every pinned package.
    pub fn content_ids(&self) -> impl Iterator<Item = &ContentId> {
        self.packages.values().map(|p| &p.content_id)
    }
}
