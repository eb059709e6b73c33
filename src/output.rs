//! Data produced by a batch run: jobs, per-file outcomes, and the aggregate.

use crate::config::Mode;
use crate::error::{BatchError, FileError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// The two document kinds the pipeline accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Pdf,
    Markdown,
}

impl FileKind {
    /// Classify a path by extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(FileKind::Pdf),
            "md" | "markdown" => Some(FileKind::Markdown),
            _ => None,
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::Pdf => f.write_str("PDF"),
            FileKind::Markdown => f.write_str("Markdown"),
        }
    }
}

/// Where a [`WatermarkAsset`] came from.
///
/// Only [`AssetOrigin::GeneratedFromText`] assets are ever deleted by the
/// orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetOrigin {
    UserProvided,
    GeneratedFromText,
    Discovered,
}

/// The image stamped onto every output PDF of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatermarkAsset {
    pub path: PathBuf,
    pub origin: AssetOrigin,
}

impl WatermarkAsset {
    pub fn new(path: impl Into<PathBuf>, origin: AssetOrigin) -> Self {
        Self {
            path: path.into(),
            origin,
        }
    }
}

/// Outcome recorded against a [`FileJob`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    /// Not processed yet (or skipped by cancellation).
    Pending,
    Succeeded,
    Failed { error: FileError },
}

/// One input document and where its output goes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileJob {
    pub path: PathBuf,
    pub kind: FileKind,
    /// Final output location. Updated when the output is renamed by title.
    pub output_path: PathBuf,
    pub outcome: FileOutcome,
}

impl FileJob {
    pub fn new(path: PathBuf, kind: FileKind, output_path: PathBuf) -> Self {
        Self {
            path,
            kind,
            output_path,
            outcome: FileOutcome::Pending,
        }
    }

    /// File name of the source, for log lines.
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn succeed(&mut self) {
        self.outcome = FileOutcome::Succeeded;
    }

    pub fn fail(&mut self, error: FileError) {
        self.outcome = FileOutcome::Failed { error };
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, FileOutcome::Succeeded)
    }

    pub fn error(&self) -> Option<&FileError> {
        match &self.outcome {
            FileOutcome::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// A failed file with its reason, as listed in [`BatchResult::failures`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: FileError,
}

/// Aggregate over all files of one run.
///
/// `succeeded <= attempted <= discovered` always holds. The run is a success
/// iff every discovered file was attempted and succeeded, and at least one
/// file was discovered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    /// Mode that actually ran (may differ from the configured one after the
    /// PDF → Markdown fallback).
    pub mode: Mode,
    pub discovered: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<FileFailure>,
    /// Output paths of the files that succeeded, in processing order.
    pub outputs: Vec<PathBuf>,
    /// The asset used for stamping (the product itself in watermark-only mode).
    pub asset: Option<WatermarkAsset>,
    /// Set when a [`crate::batch::CancelHandle`] stopped the loop early.
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl BatchResult {
    /// Fold processed jobs into an aggregate.
    pub fn from_jobs(
        mode: Mode,
        jobs: &[FileJob],
        asset: Option<WatermarkAsset>,
        cancelled: bool,
        duration_ms: u64,
    ) -> Self {
        let attempted = jobs
            .iter()
            .filter(|j| !matches!(j.outcome, FileOutcome::Pending))
            .count();
        let failures: Vec<FileFailure> = jobs
            .iter()
            .filter_map(|j| {
                j.error().map(|e| FileFailure {
                    path: j.path.clone(),
                    error: e.clone(),
                })
            })
            .collect();
        let outputs: Vec<PathBuf> = jobs
            .iter()
            .filter(|j| j.is_success())
            .map(|j| j.output_path.clone())
            .collect();

        Self {
            mode,
            discovered: jobs.len(),
            attempted,
            succeeded: outputs.len(),
            failures,
            outputs,
            asset,
            cancelled,
            duration_ms,
        }
    }

    /// Result of a watermark-only run: no files, the asset is the product.
    pub fn asset_only(asset: WatermarkAsset, duration_ms: u64) -> Self {
        Self {
            mode: Mode::WatermarkOnly,
            discovered: 0,
            attempted: 0,
            succeeded: 0,
            failures: Vec::new(),
            outputs: Vec::new(),
            asset: Some(asset),
            cancelled: false,
            duration_ms,
        }
    }

    /// Overall verdict of the run.
    pub fn is_success(&self) -> bool {
        if self.mode == Mode::WatermarkOnly {
            return self.asset.is_some();
        }
        !self.cancelled
            && self.discovered > 0
            && self.attempted == self.discovered
            && self.succeeded == self.attempted
    }

    /// `succeeded/total` summary, e.g. `"2/3"`.
    pub fn summary(&self) -> String {
        format!("{}/{}", self.succeeded, self.discovered)
    }

    /// Convert a non-successful result into [`BatchError::PartialFailure`].
    pub fn into_result(self) -> Result<Self, BatchError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(BatchError::PartialFailure {
                succeeded: self.succeeded,
                failed: self.discovered - self.succeeded,
                total: self.discovered,
            })
        }
    }
}
