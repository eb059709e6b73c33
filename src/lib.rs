//! # mdpdf-watermark
//!
//! Batch-watermark PDFs, or render Markdown to PDF and then watermark it.
//!
//! A run works over one input directory (or an explicit file list) and writes
//! every result to one output directory. The watermark image is either
//! supplied, rendered from text for this run, or picked up from an assets
//! directory. The heavy lifting is delegated to external programs: a headless
//! Chromium prints HTML to PDF, and the `watermark` command from
//! `pdf-watermark` stamps the image.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input dir
//!  │
//!  ├─ 1. Select   PDF mode, falling back to Markdown when there are no PDFs
//!  ├─ 2. Asset    user image │ text → PNG │ first image in assets dir
//!  ├─ 3. Tools    locate watermark tool and browser once, up front
//!  ├─ 4. Files    sequential; one failure never stops the rest
//!  │               Markdown: render → stamp in place → rename by title
//!  │               PDF:      stamp into output dir
//!  ├─ 5. Result   succeeded / attempted / discovered + failures
//!  └─ 6. Cleanup  delete the text-generated asset, however the run ended
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mdpdf_watermark::{run_batch, Mode, Selection, WatermarkConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = WatermarkConfig::builder()
//!         .mode(Mode::Markdown)
//!         .text("INTERNAL")
//!         .rename_by_title(true)
//!         .build()?;
//!     let result = run_batch(config, Selection::Directory).await?;
//!     eprintln!("{} succeeded", result.summary());
//!     result.into_result()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `mdpdf-watermark` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! ## External Programs
//!
//! | Program | Needed for | Override |
//! |---------|-----------|----------|
//! | `watermark` / `pdf-watermark` | every mode that stamps | `$VIRTUAL_ENV/bin` is searched too |
//! | Chromium / Chrome / Edge | Markdown modes | `--browser` / `MDPDF_BROWSER` |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod asset;
pub mod batch;
pub mod config;
pub mod error;
pub mod fallback;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod template;
pub mod title;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{run_batch, run_batch_sync, CancelHandle, Orchestrator, Selection};
pub use config::{
    HorizontalAlignment, Mode, Rgba, WatermarkConfig, WatermarkConfigBuilder, WatermarkKind,
    WatermarkStyle,
};
pub use error::{BatchError, FileError, RasterError, ToolError};
pub use output::{AssetOrigin, BatchResult, FileFailure, FileJob, FileKind, FileOutcome, WatermarkAsset};
pub use pipeline::raster::{GlyphRasterizer, TextRasterizer};
pub use pipeline::render::{ChromiumPrinter, HtmlPrinter};
pub use process::{CommandOutput, CommandRunner, SystemRunner};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
