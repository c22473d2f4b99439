use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

use crate::core::error::LauncherError;

/// A single file to download with optional SHA-1 for validation.
///
/// `dest` is the identity of the artifact: two tasks with the same
/// destination denote the same file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub url: String,
    pub dest: PathBuf,
    pub sha1: Option<String>,
    pub size: Option<u64>,
    /// Name shown in progress events.
    pub label: String,
}

impl DownloadTask {
    pub fn new(url: impl Into<String>, dest: impl Into<PathBuf>) -> Self {
        let dest = dest.into();
        let label = dest
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            url: url.into(),
            dest,
            sha1: None,
            size: None,
            label,
        }
    }

    pub fn with_sha1(mut self, sha1: Option<String>) -> Self {
        self.sha1 = sha1;
        self
    }

    pub fn with_size(mut self, size: Option<u64>) -> Self {
        self.size = size;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// Why one artifact could not be placed. Cloneable so a single-flight result
/// can be handed to every task sharing a destination.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchFailure {
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("SHA-1 mismatch for {path:?}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("IO error at {path:?}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("download cancelled")]
    Cancelled,
}

impl From<FetchFailure> for LauncherError {
    fn from(value: FetchFailure) -> Self {
        match value {
            FetchFailure::Network { url, message } => {
                LauncherError::Other(format!("Network error fetching {url}: {message}"))
            }
            FetchFailure::Status { url, status } => LauncherError::DownloadFailed { url, status },
            FetchFailure::IntegrityMismatch {
                path,
                expected,
                actual,
            } => LauncherError::IntegrityMismatch {
                path,
                expected,
                actual,
            },
            FetchFailure::Io { path, message } => LauncherError::Io {
                path,
                source: std::io::Error::other(message),
            },
            FetchFailure::Cancelled => LauncherError::Cancelled,
        }
    }
}

/// Terminal state of one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Transferred and placed; carries the byte count.
    Success { bytes: u64 },
    /// Already present and valid, no network activity.
    Skipped,
    Failure(FetchFailure),
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, FetchOutcome::Skipped)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, FetchOutcome::Failure(_))
    }

    pub fn failure(&self) -> Option<&FetchFailure> {
        match self {
            FetchOutcome::Failure(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn into_result(self) -> Result<(), FetchFailure> {
        match self {
            FetchOutcome::Failure(failure) => Err(failure),
            _ => Ok(()),
        }
    }
}

/// Aggregated view of one `download_all` call.
#[derive(Debug, Clone, Default)]
pub struct DownloadReport {
    pub downloaded: usize,
    pub skipped: usize,
    pub bytes: u64,
    pub failures: Vec<(DownloadTask, FetchFailure)>,
}

impl DownloadReport {
    pub fn from_outcomes(tasks: &[DownloadTask], outcomes: &[FetchOutcome]) -> Self {
        let mut report = DownloadReport::default();
        for (task, outcome) in tasks.iter().zip(outcomes) {
            match outcome {
                FetchOutcome::Success { bytes } => {
                    report.downloaded += 1;
                    report.bytes += bytes;
                }
                FetchOutcome::Skipped => report.skipped += 1,
                FetchOutcome::Failure(failure) => {
                    report.failures.push((task.clone(), failure.clone()))
                }
            }
        }
        report
    }

    pub fn total(&self) -> usize {
        self.downloaded + self.skipped + self.failures.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn integrity_failures(&self) -> usize {
        self.failures
            .iter()
            .filter(|(_, f)| matches!(f, FetchFailure::IntegrityMismatch { .. }))
            .count()
    }

    /// Log failures; integrity mismatches are called out separately because
    /// they point at corruption or a stale declared hash, not connectivity.
    pub fn log_failures(&self, category: &str) {
        for (task, failure) in &self.failures {
            match failure {
                FetchFailure::IntegrityMismatch { .. } => {
                    warn!(category, item = %task.label, "integrity check failed: {}", failure)
                }
                _ => warn!(category, item = %task.label, "download failed: {}", failure),
            }
        }
        if !self.failures.is_empty() {
            warn!(
                "{}: {} of {} downloads failed ({} integrity mismatches)",
                category,
                self.failures.len(),
                self.total(),
                self.integrity_failures()
            );
        }
    }
}
