//! Deterministic directory enumeration.

use crate::archive::ArchiveEntry;
use crate::error::{Error, Result};
use std::fs;
use std::path::{Component, Path};
use tracing::debug;

/// Version control metadata directories.
pub const VCS_DIRS: &[&str] = &[".git", ".hg", ".svn"];

/// Version control metadata plus common build output directories.
pub const VCS_AND_BUILD_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "target",
    "node_modules",
    "zig-cache",
    ".zig-cache",
    "zig-out",
];

/// Recursively collect every regular file under `root` as an [`ArchiveEntry`].
///
/// Directories whose name is in `excluded` are skipped entirely. Host ignore
/// files (`.gitignore`, global excludes) are not consulted, so the result only
/// depends on the tree itself. Symlinks are rejected. Entry order is
/// unspecified; [`create_normalized_archive`](crate::create_normalized_archive)
/// sorts.
pub fn collect_entries(root: &Path, excluded: &'static [&'static str]) -> Result<Vec<ArchiveEntry>> {
    let mut entries = Vec::new();

    let walker = ignore::WalkBuilder::new(root)
        .hidden(false)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .parents(false)
        .follow_links(false)
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir
                && entry.depth() > 0
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| excluded.contains(&name)))
        })
        .build();

    for entry in walker {
        let entry = entry?;
        if entry.depth() == 0 {
            continue;
        }

        let entry_path = entry.path();
        let file_type = entry
            .file_type()
            .ok_or_else(|| Error::Io {
                source: std::io::Error::other(format!(
                    "Unknown file type: {}",
                    entry_path.display()
                )),
            })?;

        if file_type.is_symlink() {
            return Err(Error::Symlink {
                path: entry_path.to_path_buf(),
            });
        }
        if !file_type.is_file() {
            continue;
        }

        let metadata = fs::metadata(entry_path)?;
        let relative = relative_path(root, entry_path)?;
        let content = fs::read(entry_path)?;

        debug!(path = %relative, size = content.len(), "collected file");
        entries.push(ArchiveEntry::new(relative, content, is_executable(&metadata)));
    }

    Ok(entries)
}

/// Express `path` relative to `root` with '/' separators on every platform.
fn relative_path(root: &Path, path: &Path) -> Result<String> {
    let rel = path.strip_prefix(root).map_err(|_| Error::Io {
        source: std::io::Error::other(format!(
            "{} is not under {}",
            path.display(),
            root.display()
        )),
    })?;

    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| Error::Io {
                    source: std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("Non UTF-8 filename: {}", path.display()),
                    ),
                })?;
                parts.push(part);
            }
            _ => continue,
        }
    }

    Ok(parts.join("/"))
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    false
}
