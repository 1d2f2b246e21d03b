//! Content identifiers using BLAKE3.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Digest size in bytes (BLAKE3 produces 256-bit hashes).
pub const CONTENT_ID_SIZE: usize = 32;

/// Supported hash algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// BLAKE3 with 256-bit output.
    Blake3,
}

impl Algorithm {
    /// Returns the string representation of the algorithm (for config files).
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Blake3 => "blake3-256",
        }
    }

    /// Parse algorithm from string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "blake3-256" => Ok(Algorithm::Blake3),
            _ => Err(Error::unsupported_algorithm(s)),
        }
    }

    /// Returns the algorithm ID byte (for object headers).
    pub fn id(&self) -> u8 {
        match self {
            Algorithm::Blake3 => 1,
        }
    }

    /// Parse algorithm from ID byte.
    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            1 => Ok(Algorithm::Blake3),
            _ => Err(Error::unsupported_algorithm(format!("ID {}", id))),
        }
    }
}

/// The canonical identity of a byte sequence: a 32-byte BLAKE3 digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentId([u8; CONTENT_ID_SIZE]);

impl ContentId {
    /// Create a ContentId from raw bytes.
    pub fn from_bytes(bytes: [u8; CONTENT_ID_SIZE]) -> Self {
        ContentId(bytes)
    }

    /// Hash exact bytes using BLAKE3.
    pub fn hash(data: &[u8]) -> Self {
        ContentId(*blake3::hash(data).as_bytes())
    }

    /// Decode a ContentId from 64 hex characters.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        if hex_str.len() != CONTENT_ID_SIZE * 2 {
            return Err(Error::invalid_content_id(format!(
                "Expected {} hex characters, got {}",
                CONTENT_ID_SIZE * 2,
                hex_str.len()
            )));
        }

        let mut bytes = [0u8; CONTENT_ID_SIZE];
        hex::decode_to_slice(hex_str, &mut bytes)
            .map_err(|e| Error::invalid_content_id(format!("Invalid hex: {}", e)))?;
        Ok(ContentId(bytes))
    }

    /// Encode as 64 lowercase hex characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 2 hex characters (for directory sharding).
    pub fn prefix(&self) -> String {
        hex::encode(&self.0[..1])
    }

    /// Remaining 62 hex characters (for filename).
    pub fn suffix(&self) -> String {
        hex::encode(&self.0[1..])
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; CONTENT_ID_SIZE] {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", self.to_hex())
    }
}

impl FromStr for ContentId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for ContentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ContentId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
