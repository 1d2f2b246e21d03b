//! Content-addressed object storage.

use crate::archive;
use crate::error::{Error, Result};
use crate::hash::{Algorithm, ContentId};
use crate::object::{CompressionType, HEADER_SIZE, ObjectHeader, ObjectKind};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Compression threshold: payloads >= 4KB are compressed.
const COMPRESSION_THRESHOLD: usize = 4096;

/// A content-addressed store rooted at a directory.
///
/// Layout:
/// - `config` with version and algorithm
/// - `objects/{algorithm}/{prefix}/{suffix}` for each stored payload
///
/// No locking is performed. Two processes writing the same id with the same
/// bytes is harmless since every write is an atomic rename of identical content.
#[derive(Debug)]
pub struct ContentStore {
    root: PathBuf,
    algorithm: Algorithm,
}

impl ContentStore {
    /// Initialize a new store at the given path.
    pub fn init<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let algorithm = Algorithm::Blake3;

        fs::create_dir_all(root.join("objects").join(algorithm.as_str()))?;

        let config_content = format!("version=1\nalgo={}\n", algorithm.as_str());
        fs::write(root.join("config"), config_content)?;

        debug!(root = %root.display(), "initialized content store");
        Ok(Self { root, algorithm })
    }

    /// Open an existing store at the given path.
    ///
    /// Validates the store structure and reads the configuration.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() {
            return Err(Error::invalid_store(&root, "directory does not exist"));
        }

        let config_path = root.join("config");
        if !config_path.exists() {
            return Err(Error::invalid_store(&root, "config file not found"));
        }

        let config_content = fs::read_to_string(&config_path)?;
        let algorithm = Self::parse_config(&root, &config_content)?;

        if !root.join("objects").join(algorithm.as_str()).exists() {
            return Err(Error::invalid_store(
                &root,
                "objects directory structure missing",
            ));
        }

        Ok(Self { root, algorithm })
    }

    /// Open the store if it has a config, otherwise initialize it.
    pub fn open_or_init<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        if root.join("config").exists() {
            Self::open(root)
        } else {
            Self::init(root)
        }
    }

    /// Parse the config file to extract the algorithm.
    fn parse_config(root: &Path, content: &str) -> Result<Algorithm> {
        let mut version = None;
        let mut algo = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                match key.trim() {
                    "version" => version = Some(value.trim()),
                    "algo" => algo = Some(value.trim()),
                    _ => {}
                }
            }
        }

        if version != Some("1") {
            return Err(Error::invalid_store(
                root,
                format!("unsupported config version: {:?}", version),
            ));
        }

        let algo_str = algo.ok_or_else(|| Error::invalid_store(root, "missing algo in config"))?;
        Algorithm::parse(algo_str)
    }

    /// Get the root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the algorithm used by this store.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub(crate) fn objects_dir(&self) -> PathBuf {
        self.root.join("objects").join(self.algorithm.as_str())
    }

    /// Path of the object file for `id`: `objects/{algorithm}/{prefix}/{suffix}`.
    pub fn object_path(&self, id: &ContentId) -> PathBuf {
        self.objects_dir().join(id.prefix()).join(id.suffix())
    }

    /// Returns true if an object for `id` is present.
    pub fn exists(&self, id: &ContentId) -> bool {
        self.object_path(id).is_file()
    }

    /// Write `bytes` under `id`, classifying them with [`ObjectKind::detect`].
    ///
    /// Storing an id that is already present is a successful no-op. The id is
    /// trusted as given; use [`verify`](Self::verify) to check it later.
    pub fn store(&self, id: &ContentId, bytes: &[u8]) -> Result<()> {
        self.store_kind(id, bytes, ObjectKind::detect(bytes))
    }

    /// Write `bytes` under `id` with a kind known by the caller.
    pub fn store_kind(&self, id: &ContentId, bytes: &[u8], kind: ObjectKind) -> Result<()> {
        if self.object_path(id).exists() {
            debug!(%id, "object already present");
            return Ok(());
        }
        self.write_object(id, bytes, kind)
    }

    /// Replace whatever is stored under `id` with `bytes`, which must hash to `id`.
    pub(crate) fn repair(&self, id: &ContentId, bytes: &[u8], kind: ObjectKind) -> Result<()> {
        let actual = ContentId::hash(bytes);
        if actual != *id {
            return Err(Error::integrity_check_failed(
                format!("object {}", id),
                id.to_hex(),
                actual.to_hex(),
            ));
        }
        self.write_object(id, bytes, kind)?;
        warn!(%id, "rewrote corrupt object");
        Ok(())
    }

    fn write_object(&self, id: &ContentId, bytes: &[u8], kind: ObjectKind) -> Result<()> {
        let (payload, compression) = if bytes.len() >= COMPRESSION_THRESHOLD {
            (compress_zstd(bytes)?, CompressionType::Zstd)
        } else {
            (bytes.to_vec(), CompressionType::None)
        };

        let header = ObjectHeader::new(kind, self.algorithm, compression, payload.len() as u64);

        self.write_object_atomic(&self.object_path(id), &header, &payload)?;
        debug!(%id, size = bytes.len(), kind = header.kind.as_str(), "stored object");
        Ok(())
    }

    /// Hash `bytes` and store them, returning their id.
    pub fn put(&self, bytes: &[u8]) -> Result<ContentId> {
        let id = ContentId::hash(bytes);
        self.store(&id, bytes)?;
        Ok(id)
    }

    /// Read the bytes stored under `id`.
    pub fn retrieve(&self, id: &ContentId) -> Result<Vec<u8>> {
        Ok(self.read_object(id)?.1)
    }

    /// Recompute the hash of the stored bytes and compare it to `id`.
    ///
    /// Returns `Ok(false)` for any form of corruption, including an unreadable
    /// header or payload. Fails `ContentNotFound` if nothing is stored.
    pub fn verify(&self, id: &ContentId) -> Result<bool> {
        match self.read_object(id) {
            Ok((_, payload)) => {
                let actual = ContentId::hash(&payload);
                if actual != *id {
                    warn!(expected = %id, %actual, "stored object hash mismatch");
                }
                Ok(actual == *id)
            }
            Err(Error::CorruptedArchive { reason }) => {
                warn!(%id, %reason, "stored object is unreadable");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Read and decode an object file.
    fn read_object(&self, id: &ContentId) -> Result<(ObjectHeader, Vec<u8>)> {
        let obj_path = self.object_path(id);
        if !obj_path.is_file() {
            return Err(Error::content_not_found(format!("object {}", id)));
        }

        let raw = fs::read(&obj_path)?;
        let header = ObjectHeader::decode(&raw)?;
        let stored = &raw[HEADER_SIZE..];

        if stored.len() as u64 != header.payload_len {
            return Err(Error::corrupted_archive(format!(
                "Payload length mismatch in {}: expected {}, got {}",
                obj_path.display(),
                header.payload_len,
                stored.len()
            )));
        }

        let payload = match header.compression {
            CompressionType::None => stored.to_vec(),
            CompressionType::Zstd => decompress_zstd(stored)?,
        };

        Ok((header, payload))
    }

    /// Write an object atomically using tempfile.
    fn write_object_atomic(
        &self,
        obj_path: &Path,
        header: &ObjectHeader,
        payload: &[u8],
    ) -> Result<()> {
        let parent = obj_path
            .parent()
            .ok_or_else(|| Error::invalid_store(&self.root, "object path has no parent"))?;
        fs::create_dir_all(parent)?;

        let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
        temp_file.write_all(&header.encode())?;
        temp_file.write_all(payload)?;
        temp_file.flush()?;
        temp_file.persist(obj_path)?;

        Ok(())
    }

    /// Materialize stored content to the filesystem.
    ///
    /// Archives become a directory tree at `dest` (executable bits restored on
    /// unix); blobs become a single file. Fails if `dest` already exists.
    pub fn materialize(&self, id: &ContentId, dest: &Path) -> Result<()> {
        if dest.exists() {
            return Err(Error::path_exists(dest));
        }

        let (header, payload) = self.read_object(id)?;

        match header.kind {
            ObjectKind::Blob => {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(dest, payload)?;
            }
            ObjectKind::Archive => {
                let entries = archive::read_normalized_archive(&payload)?;
                fs::create_dir_all(dest)?;
                for entry in entries {
                    let path = dest.join(&entry.path);
                    if let Some(parent) = path.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::write(&path, &entry.content)?;
                    if entry.is_executable {
                        set_executable(&path)?;
                    }
                }
            }
        }

        debug!(%id, dest = %dest.display(), "materialized object");
        Ok(())
    }

    /// List every object id present in the store.
    pub fn list(&self) -> Result<Vec<ContentId>> {
        let mut ids = Vec::new();
        let objects_dir = self.objects_dir();
        if !objects_dir.exists() {
            return Ok(ids);
        }

        for shard_entry in fs::read_dir(&objects_dir)? {
            let shard_path = shard_entry?.path();
            if !shard_path.is_dir() {
                continue;
            }
            let prefix = shard_path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("")
                .to_string();

            for obj_entry in fs::read_dir(&shard_path)? {
                let obj_path = obj_entry?.path();
                if !obj_path.is_file() {
                    continue;
                }
                let suffix = obj_path.file_name().and_then(|n| n.to_str()).unwrap_or("");
                // Leftover tempfiles and foreign files do not parse as ids
                if let Ok(id) = ContentId::from_hex(&format!("{}{}", prefix, suffix)) {
                    ids.push(id);
                }
            }
        }

        ids.sort();
        Ok(ids)
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o111);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Compress data using zstd.
fn compress_zstd(data: &[u8]) -> Result<Vec<u8>> {
    zstd::encode_all(data, 3) // Level 3 = fast compression
        .map_err(|e| Error::corrupted_archive(format!("zstd compression failed: {}", e)))
}

/// Decompress data using zstd.
fn decompress_zstd(data: &[u8]) -> Result<Vec<u8>> {
    zstd::decode_all(data)
        .map_err(|e| Error::corrupted_archive(format!("zstd decompression failed: {}", e)))
}
