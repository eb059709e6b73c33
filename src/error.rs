//! Error types for the mdpdf-watermark library.
//!
//! Four error types reflect four distinct failure scopes:
//!
//! * [`BatchError`] — **Fatal**: the run cannot proceed at all (missing input
//!   directory, watermarking tool not installed, named watermark image absent).
//!   Returned as `Err(BatchError)` from [`crate::batch::run_batch`] before any
//!   file is touched.
//!
//! * [`FileError`] — **Non-fatal**: one document failed (renderer crashed,
//!   watermark tool exited non-zero) but the rest of the batch carries on.
//!   Stored inside [`crate::output::FileOutcome`] so callers can see exactly
//!   which files need attention.
//!
//! * [`ToolError`] — raised by the external-process adapters and mapped to one
//!   of the two above by the orchestrator, depending on whether the tool was
//!   being located (fatal) or invoked for a file (non-fatal).
//!
//! * [`RasterError`] — text-to-image failures. Never escalated: the asset
//!   resolver falls back to a pre-existing image instead.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::output::FileKind;

/// All fatal errors returned by the mdpdf-watermark library.
///
/// Per-file failures use [`FileError`] and are stored in
/// [`crate::output::FileOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum BatchError {
    // ── Precondition errors ───────────────────────────────────────────────
    /// Input directory does not exist.
    #[error("Input directory not found: '{path}'")]
    InputDirNotFound { path: PathBuf },

    /// Output directory could not be created.
    #[error("Failed to create output directory '{path}': {source}")]
    OutputDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// None of the candidate executables for an external tool responded.
    #[error("{tool} not found (tried: {})\n{hint}", tried.join(", "))]
    ToolNotFound {
        tool: String,
        tried: Vec<String>,
        hint: String,
    },

    /// `type = image` was requested but the image path does not exist.
    #[error("Watermark image not found: '{path}'")]
    WatermarkImageNotFound { path: PathBuf },

    /// No watermark asset could be generated or discovered.
    #[error("No watermark image available: text rendering failed and '{assets_dir}' holds no image")]
    NoWatermarkAsset { assets_dir: PathBuf },

    /// The mode's discovery step found nothing to process.
    #[error("No {kind} files found in '{dir}'")]
    NoInputFiles { kind: FileKind, dir: PathBuf },

    /// Neither PDFs nor Markdown files were found (PDF mode fallback exhausted).
    #[error("No PDF files and no Markdown files found in '{dir}'")]
    NoDocuments { dir: PathBuf },

    // ── Aggregate errors ──────────────────────────────────────────────────
    /// Some files succeeded but at least one failed or was never attempted.
    ///
    /// Returned by [`crate::output::BatchResult::into_result`] when the
    /// caller wants to treat any file failure as an error.
    #[error("{failed}/{total} files failed")]
    PartialFailure {
        succeeded: usize,
        failed: usize,
        total: usize,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single file.
///
/// Stored in [`crate::output::FileOutcome::Failed`]. The batch continues with
/// the next file regardless.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum FileError {
    /// Markdown → PDF rendering failed.
    #[error("rendering failed: {detail}")]
    RenderFailed { detail: String },

    /// The watermarking tool rejected the file; `stderr` is its complaint.
    #[error("watermarking failed (exit code {code:?}): {stderr}")]
    WatermarkFailed { code: Option<i32>, stderr: String },

    /// The source document could not be read.
    #[error("could not read '{path}': {detail}")]
    ReadFailed { path: PathBuf, detail: String },
}

/// Failures raised while locating or invoking an external executable.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The program does not exist (not on `PATH`, or a bad explicit path).
    #[error("no executable found among: {}", tried.join(", "))]
    NotFound { tried: Vec<String> },

    /// The process could not be started.
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process exceeded its hard time limit and was killed.
    #[error("'{program}' timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    /// The process ran but exited unsuccessfully.
    #[error("'{program}' exited with code {code:?}: {stderr}")]
    NonZeroExit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// File-system work around the invocation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Text-to-image failures.
#[derive(Debug, Error)]
pub enum RasterError {
    /// The font search chain found nothing on disk.
    #[error("no usable font found (set WATERMARK_FONT to a .ttf/.otf/.ttc file)")]
    NoUsableFont,

    /// A font file exists but could not be parsed.
    #[error("failed to open font '{path}': {detail}")]
    FontUnreadable { path: PathBuf, detail: String },

    /// Nothing to draw.
    #[error("cannot render empty watermark text")]
    EmptyText,

    /// PNG encoding failed.
    #[error("failed to encode watermark image: {0}")]
    Encode(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
