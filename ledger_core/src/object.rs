//! On-disk object header.
//!
//! Every stored object is a 16-byte header followed by the payload:
//!
//! ```text
//! 0x00  4   "LDGR" magic
//! 0x04  1   version (u8) = 1
//! 0x05  1   kind: 1=archive, 2=blob
//! 0x06  1   algo: 1=blake3-256
//! 0x07  1   compression: 0=none, 1=zstd
//! 0x08  8   payload_len (u64 LE) - stored (possibly compressed) size
//! 0x10  ... payload
//! ```
//!
//! The content id always names the uncompressed payload.

use crate::archive;
use crate::error::{Error, Result};
use crate::hash::Algorithm;

/// Magic bytes at the start of every object file.
pub const MAGIC: &[u8; 4] = b"LDGR";

/// Current object format version.
pub const VERSION: u8 = 1;

/// Size of the object header in bytes.
pub const HEADER_SIZE: usize = 16;

/// What a stored payload holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// A normalized directory archive.
    Archive = 1,
    /// Opaque bytes (a single fetched file).
    Blob = 2,
}

impl ObjectKind {
    /// Classify a payload of unknown origin. Only a frame that decodes as a
    /// whole counts as an archive, so text that happens to start with the
    /// magic stays a blob.
    pub fn detect(payload: &[u8]) -> Self {
        if archive::is_archive(payload) && archive::read_normalized_archive(payload).is_ok() {
            ObjectKind::Archive
        } else {
            ObjectKind::Blob
        }
    }

    /// Convert to byte representation.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse from byte representation.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(ObjectKind::Archive),
            2 => Ok(ObjectKind::Blob),
            _ => Err(Error::corrupted_archive(format!(
                "Invalid object kind: {}",
                value
            ))),
        }
    }

    /// Get the string name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Archive => "archive",
            ObjectKind::Blob => "blob",
        }
    }
}

/// Compression types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    /// No compression.
    None = 0,
    /// Zstandard compression.
    Zstd = 1,
}

impl CompressionType {
    /// Convert to byte representation.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse from byte representation.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Zstd),
            _ => Err(Error::corrupted_archive(format!(
                "Invalid compression type: {}",
                value
            ))),
        }
    }
}

/// A 16-byte object header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHeader {
    /// Object kind.
    pub kind: ObjectKind,
    /// Hash algorithm used.
    pub algorithm: Algorithm,
    /// Compression applied to the payload.
    pub compression: CompressionType,
    /// Length of the stored payload in bytes.
    pub payload_len: u64,
}

impl ObjectHeader {
    /// Create a new object header.
    pub fn new(
        kind: ObjectKind,
        algorithm: Algorithm,
        compression: CompressionType,
        payload_len: u64,
    ) -> Self {
        Self {
            kind,
            algorithm,
            compression,
            payload_len,
        }
    }

    /// Encode the header to a 16-byte array.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4] = VERSION;
        buf[5] = self.kind.to_u8();
        buf[6] = self.algorithm.id();
        buf[7] = self.compression.to_u8();
        buf[8..16].copy_from_slice(&self.payload_len.to_le_bytes());
        buf
    }

    /// Decode a header from the first 16 bytes of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::corrupted_archive(format!(
                "Header too short: {} bytes (expected {})",
                buf.len(),
                HEADER_SIZE
            )));
        }

        if &buf[0..4] != MAGIC {
            return Err(Error::corrupted_archive(format!(
                "Invalid magic: expected {:?}, got {:?}",
                MAGIC,
                &buf[0..4]
            )));
        }

        if buf[4] != VERSION {
            return Err(Error::corrupted_archive(format!(
                "Unsupported object version: {}",
                buf[4]
            )));
        }

        let kind = ObjectKind::from_u8(buf[5])?;
        let algorithm = Algorithm::from_id(buf[6])
            .map_err(|e| Error::corrupted_archive(e.to_string()))?;
        let compression = CompressionType::from_u8(buf[7])?;

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&buf[8..16]);

        Ok(Self {
            kind,
            algorithm,
            compression,
            payload_len: u64::from_le_bytes(len_bytes),
        })
    }
}
