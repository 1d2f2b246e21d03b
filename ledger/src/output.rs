//! Output formatting for CLI commands.
//!
//! Every command produces a serializable DTO carrying `success` and
//! `result_code`; text mode renders it through a closure instead.

use anyhow::Result;
use ledger_core::{CapabilityChange, ContentId, GcStats, Resolution};
use serde::Serialize;
use std::io::{self, Write};

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Writer for command output with format abstraction.
pub struct OutputWriter {
    format: OutputFormat,
    stdout: io::Stdout,
}

impl OutputWriter {
    pub fn new(json: bool) -> Self {
        Self {
            format: if json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
            stdout: io::stdout(),
        }
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Write `data` as JSON, or the result of `text_fn` in text mode.
    pub fn write<T: Serialize>(&self, data: &T, text_fn: impl FnOnce() -> String) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                writeln!(&self.stdout, "{}", json)?;
            }
            OutputFormat::Text => {
                let text = text_fn();
                if !text.is_empty() {
                    write!(&self.stdout, "{}", text)?;
                }
            }
        }
        Ok(())
    }

    /// Write an error to stderr, as a JSON object with `success=false` in JSON mode.
    pub fn write_error(&self, error: &anyhow::Error, result_code: u8) {
        match self.format {
            OutputFormat::Json => {
                let error_output = ErrorOutput {
                    success: false,
                    result_code,
                    error: format!("{:#}", error),
                };
                if let Ok(json) = serde_json::to_string_pretty(&error_output) {
                    let _ = writeln!(io::stderr(), "{}", json);
                }
            }
            OutputFormat::Text => {
                let _ = writeln!(io::stderr(), "Error: {:#}", error);
            }
        }
    }
}

// ============================================================================
// Data Transfer Objects (DTOs) for JSON output
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorOutput {
    pub success: bool,
    pub result_code: u8,
    pub error: String,
}

/// Pinned package summary for `resolve`.
#[derive(Debug, Clone, Serialize)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
    pub content_id: ContentId,
    pub source_type: String,
    pub source: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureInfo {
    pub package: String,
    pub error: String,
}

/// Output for `resolve`.
#[derive(Debug, Serialize)]
pub struct ResolveOutput {
    pub success: bool,
    pub result_code: u8,
    pub lockfile_written: bool,
    pub auto_approved: bool,
    pub packages: Vec<PackageInfo>,
    pub changes: Vec<CapabilityChange>,
    pub failures: Vec<FailureInfo>,
}

impl ResolveOutput {
    pub fn new(resolution: &Resolution, lockfile_written: bool) -> Self {
        let result_code = if lockfile_written { 0 } else { 1 };
        Self {
            success: lockfile_written,
            result_code,
            lockfile_written,
            auto_approved: resolution.is_auto_approved(),
            packages: resolution
                .lockfile
                .packages
                .values()
                .map(|p| PackageInfo {
                    name: p.name.clone(),
                    version: p.version.clone(),
                    content_id: p.content_id,
                    source_type: p.source.kind().to_string(),
                    source: p.source.to_string(),
                })
                .collect(),
            changes: resolution.changes.clone(),
            failures: resolution
                .failures
                .iter()
                .map(|f| FailureInfo {
                    package: f.package.clone(),
                    error: f.error.to_string(),
                })
                .collect(),
        }
    }
}

/// Verification state of one pinned package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyStatus {
    Ok,
    Missing,
    Corrupt,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifiedPackage {
    pub name: String,
    pub content_id: ContentId,
    pub status: VerifyStatus,
}

/// Output for `verify`.
#[derive(Debug, Serialize)]
pub struct VerifyOutput {
    pub success: bool,
    pub result_code: u8,
    pub packages: Vec<VerifiedPackage>,
}

/// Output for `materialize`.
#[derive(Debug, Serialize)]
pub struct MaterializeOutput {
    pub success: bool,
    pub result_code: u8,
    pub package: String,
    pub content_id: ContentId,
    pub destination: String,
}

/// Output for `hash`.
#[derive(Debug, Serialize)]
pub struct HashOutput {
    pub success: bool,
    pub result_code: u8,
    pub content_id: ContentId,
    pub path: String,
    pub kind: String,
}

/// Output for `gc`.
#[derive(Debug, Serialize)]
pub struct GcOutput {
    pub success: bool,
    pub result_code: u8,
    pub dry_run: bool,
    pub objects_kept: usize,
    pub objects_deleted: usize,
    pub bytes_freed: u64,
}

impl GcOutput {
    pub fn new(stats: &GcStats, dry_run: bool) -> Self {
        Self {
            success: true,
            result_code: 0,
            dry_run,
            objects_kept: stats.objects_kept,
            objects_deleted: stats.objects_deleted,
            bytes_freed: stats.bytes_freed,
        }
    }
}
