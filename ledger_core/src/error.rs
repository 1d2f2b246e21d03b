//! Error types for ledger_core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using ledger_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while fetching, storing, or resolving packages.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred during file operations.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// No registered transport accepts the URL.
    #[error("Unsupported scheme: no transport accepts {url}")]
    UnsupportedScheme { url: String },

    /// Content (a stored object or a source path) does not exist.
    #[error("Content not found: {what}")]
    ContentNotFound { what: String },

    /// Fetched content does not match the pinned content id.
    #[error("Integrity check failed for {subject}: expected {expected}, got {actual}")]
    IntegrityCheckFailed {
        subject: String,
        expected: String,
        actual: String,
    },

    /// Content id is not 64 hex characters.
    #[error("Invalid content id: {reason}")]
    InvalidContentId { reason: String },

    /// Manifest file does not exist.
    #[error("Manifest not found: {path}")]
    ManifestNotFound { path: PathBuf },

    /// Manifest text is syntactically invalid.
    #[error("Manifest parse error at line {line}: {reason}")]
    ManifestParse { line: usize, reason: String },

    /// Lockfile could not be loaded.
    #[error("Lockfile parse error at {path}: {reason}")]
    LockfileParseError { path: PathBuf, reason: String },

    /// Lockfile is not valid JSON or does not match the lockfile schema.
    #[error("Invalid JSON: {reason}")]
    InvalidJson { reason: String },

    /// Lockfile version is not supported.
    #[error("Unsupported lockfile version: {version}")]
    UnsupportedVersion { version: String },

    /// Archive frame or stored object is malformed.
    #[error("Corrupted archive: {reason}")]
    CorruptedArchive { reason: String },

    /// URL is accepted by a transport but cannot be interpreted.
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// External tool exited unsuccessfully.
    #[error("{program} exited with status {status}: {stderr}")]
    ProcessFailed {
        program: String,
        status: i32,
        stderr: String,
    },

    /// Store is invalid or not initialized.
    #[error("Invalid store at {path}: {reason}")]
    InvalidStore { path: PathBuf, reason: String },

    /// Unsupported algorithm.
    #[error("Unsupported algorithm: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },

    /// Symbolic links cannot be archived deterministically.
    #[error("Symlinks not supported: {path}")]
    Symlink { path: PathBuf },

    /// Materialization target already exists.
    #[error("Path already exists: {path}")]
    PathExists { path: PathBuf },
}

impl Error {
    /// Create an UnsupportedScheme error.
    pub fn unsupported_scheme(url: impl Into<String>) -> Self {
        Error::UnsupportedScheme { url: url.into() }
    }

    /// Create a ContentNotFound error.
    pub fn content_not_found(what: impl Into<String>) -> Self {
        Error::ContentNotFound { what: what.into() }
    }

    /// Create an IntegrityCheckFailed error.
    pub fn integrity_check_failed(
        subject: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Error::IntegrityCheckFailed {
            subject: subject.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an InvalidContentId error.
    pub fn invalid_content_id(reason: impl Into<String>) -> Self {
        Error::InvalidContentId {
            reason: reason.into(),
        }
    }

    /// Create a ManifestNotFound error.
    pub fn manifest_not_found(path: impl Into<PathBuf>) -> Self {
        Error::ManifestNotFound { path: path.into() }
    }

    /// Create a ManifestParse error.
    pub fn manifest_parse(line: usize, reason: impl Into<String>) -> Self {
        Error::ManifestParse {
            line,
            reason: reason.into(),
        }
    }

    /// Create a LockfileParseError error.
    pub fn lockfile_parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::LockfileParseError {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidJson error.
    pub fn invalid_json(reason: impl Into<String>) -> Self {
        Error::InvalidJson {
            reason: reason.into(),
        }
    }

    /// Create an UnsupportedVersion error.
    pub fn unsupported_version(version: impl Into<String>) -> Self {
        Error::UnsupportedVersion {
            version: version.into(),
        }
    }

    /// Create a CorruptedArchive error.
    pub fn corrupted_archive(reason: impl Into<String>) -> Self {
        Error::CorruptedArchive {
            reason: reason.into(),
        }
    }

    /// Create an InvalidUrl error.
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a ProcessFailed error.
    pub fn process_failed(program: impl Into<String>, status: i32, stderr: impl Into<String>) -> Self {
        Error::ProcessFailed {
            program: program.into(),
            status,
            stderr: stderr.into(),
        }
    }

    /// Create an InvalidStore error.
    pub fn invalid_store(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidStore {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an UnsupportedAlgorithm error.
    pub fn unsupported_algorithm(algorithm: impl Into<String>) -> Self {
        Error::UnsupportedAlgorithm {
            algorithm: algorithm.into(),
        }
    }

    /// Create a PathExists error.
    pub fn path_exists(path: impl Into<PathBuf>) -> Self {
        Error::PathExists { path: path.into() }
    }
}

// Additional From implementations for external error types

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io { source: err.error }
    }
}

impl From<ignore::Error> for Error {
    fn from(err: ignore::Error) -> Self {
        // ignore::Error can wrap an io::Error or be a path error
        match err.io_error() {
            Some(io_err) => Error::Io {
                source: std::io::Error::new(io_err.kind(), io_err.to_string()),
            },
            None => Error::Io {
                source: std::io::Error::other(err.to_string()),
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::invalid_json(err.to_string())
    }
}
