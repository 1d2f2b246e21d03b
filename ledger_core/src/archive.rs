//! Deterministic archive frame and line-ending normalization.
//!
//! A normalized archive is the byte form every transport hashes, so two
//! sources with the same logical files produce the same [`ContentId`].
//!
//! ```text
//! 0x00  4   "LDGA" magic
//! 0x04  1   version (u8) = 1
//! then, for each entry in ascending byte order of path:
//!       4   path_len (u32 LE)
//!       N   path (UTF-8, '/'-separated, relative)
//!       1   executable flag (0 or 1)
//!       8   content_len (u64 LE)
//!       M   content (line endings normalized to '\n')
//! ```
//!
//! [`ContentId`]: crate::ContentId

use crate::error::{Error, Result};

/// Magic bytes at the start of every archive.
pub const ARCHIVE_MAGIC: &[u8; 4] = b"LDGA";

/// Current archive frame version.
pub const ARCHIVE_VERSION: u8 = 1;

/// One file in a directory archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Relative path with '/' separators.
    pub path: String,
    /// File bytes.
    pub content: Vec<u8>,
    /// Whether any execute bit was set on the source file.
    pub is_executable: bool,
}

impl ArchiveEntry {
    /// Create a new archive entry.
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>, is_executable: bool) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            is_executable,
        }
    }
}

/// Rewrite `\r\n` and lone `\r` to `\n`.
///
/// Idempotent: the output contains no `\r`, so a second pass is a copy.
pub fn normalize_archive(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut iter = data.iter().peekable();

    while let Some(&byte) = iter.next() {
        if byte == b'\r' {
            if iter.peek() == Some(&&b'\n') {
                iter.next();
            }
            out.push(b'\n');
        } else {
            out.push(byte);
        }
    }

    out
}

/// Serialize entries into the deterministic archive frame.
///
/// Entries are sorted by path (bytewise) and their content normalized, so the
/// output is invariant under any permutation of the input. If the same path
/// appears twice, the bytewise-smallest entry wins.
pub fn create_normalized_archive(entries: &[ArchiveEntry]) -> Vec<u8> {
    let mut normalized: Vec<ArchiveEntry> = entries
        .iter()
        .map(|e| ArchiveEntry {
            path: e.path.clone(),
            content: normalize_archive(&e.content),
            is_executable: e.is_executable,
        })
        .collect();

    normalized.sort_by(|a, b| {
        a.path
            .as_bytes()
            .cmp(b.path.as_bytes())
            .then_with(|| a.content.cmp(&b.content))
            .then_with(|| a.is_executable.cmp(&b.is_executable))
    });
    normalized.dedup_by(|later, earlier| later.path == earlier.path);

    let body: usize = normalized
        .iter()
        .map(|e| 4 + e.path.len() + 1 + 8 + e.content.len())
        .sum();
    let mut buf = Vec::with_capacity(ARCHIVE_MAGIC.len() + 1 + body);

    buf.extend_from_slice(ARCHIVE_MAGIC);
    buf.push(ARCHIVE_VERSION);

    for entry in &normalized {
        buf.extend_from_slice(&(entry.path.len() as u32).to_le_bytes());
        buf.extend_from_slice(entry.path.as_bytes());
        buf.push(u8::from(entry.is_executable));
        buf.extend_from_slice(&(entry.content.len() as u64).to_le_bytes());
        buf.extend_from_slice(&entry.content);
    }

    buf
}

/// Returns true if `data` starts with the archive magic.
pub fn is_archive(data: &[u8]) -> bool {
    data.len() > ARCHIVE_MAGIC.len() && &data[..ARCHIVE_MAGIC.len()] == ARCHIVE_MAGIC
}

/// Decode an archive frame back into its entries.
///
/// Rejects truncated frames, unknown versions, invalid or unsafe paths, and
/// entries that are not in strictly ascending path order.
pub fn read_normalized_archive(data: &[u8]) -> Result<Vec<ArchiveEntry>> {
    let mut reader = FrameReader { data, pos: 0 };

    let magic = reader.take(ARCHIVE_MAGIC.len(), "magic")?;
    if magic != ARCHIVE_MAGIC {
        return Err(Error::corrupted_archive(format!(
            "Invalid magic bytes: {:?}",
            magic
        )));
    }

    let version = reader.take(1, "version")?[0];
    if version != ARCHIVE_VERSION {
        return Err(Error::corrupted_archive(format!(
            "Unsupported archive version: {}",
            version
        )));
    }

    let mut entries: Vec<ArchiveEntry> = Vec::new();
    while !reader.is_empty() {
        let path_len = reader.read_u32()? as usize;
        let path_bytes = reader.take(path_len, "path")?;
        let path = std::str::from_utf8(path_bytes)
            .map_err(|e| Error::corrupted_archive(format!("Invalid UTF-8 in path: {}", e)))?
            .to_string();
        validate_entry_path(&path)?;

        let is_executable = match reader.take(1, "executable flag")?[0] {
            0 => false,
            1 => true,
            other => {
                return Err(Error::corrupted_archive(format!(
                    "Invalid executable flag {} for {}",
                    other, path
                )));
            }
        };

        let content_len = usize::try_from(reader.read_u64()?)
            .map_err(|_| Error::corrupted_archive("Content length overflows usize"))?;
        let content = reader.take(content_len, "content")?.to_vec();

        if let Some(prev) = entries.last()
            && prev.path.as_bytes() >= path.as_bytes()
        {
            return Err(Error::corrupted_archive(format!(
                "Entries out of order: {} after {}",
                path, prev.path
            )));
        }

        entries.push(ArchiveEntry {
            path,
            content,
            is_executable,
        });
    }

    Ok(entries)
}

/// Reject empty, absolute, or traversing paths.
fn validate_entry_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(Error::corrupted_archive("Empty entry path"));
    }
    if path.starts_with('/') || path.contains('\\') || path.contains('\0') {
        return Err(Error::corrupted_archive(format!("Unsafe entry path: {}", path)));
    }
    if path
        .split('/')
        .any(|c| c.is_empty() || c == "." || c == "..")
    {
        return Err(Error::corrupted_archive(format!("Unsafe entry path: {}", path)));
    }
    Ok(())
}

struct FrameReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                Error::corrupted_archive(format!("Truncated {} at offset {}", what, self.pos))
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4, "length")?);
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8, "length")?);
        Ok(u64::from_le_bytes(buf))
    }
}
