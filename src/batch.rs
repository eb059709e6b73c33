//! Batch orchestration: one run over a directory or an explicit file list.
//!
//! A run moves through mode selection, asset resolution, a strictly
//! sequential per-file loop, aggregation and cleanup:
//!
//! * **Mode selection.** PDF mode falls back to Markdown when the input has
//!   no PDFs but has Markdown files. Finding nothing at all is a run-level
//!   failure, reported apart from "some files failed".
//! * **Asset resolution.** Skipped by `markdown_no_watermark`. In
//!   `watermark_only` mode the asset is the product and the run stops here.
//! * **Per-file loop.** A failing file never stops the loop. Cancellation is
//!   checked between files only.
//! * **Cleanup.** A text-generated asset is deleted however the run ends,
//!   via a drop guard ([`crate::pipeline::cleanup::AssetCleanup`]).
//!
//! External tools are located once, before the first file is touched.

use crate::asset;
use crate::config::{Mode, WatermarkConfig};
use crate::error::{BatchError, FileError};
use crate::fallback::first_match;
use crate::output::{BatchResult, FileJob, FileKind, WatermarkAsset};
use crate::pipeline::cleanup::AssetCleanup;
use crate::pipeline::raster::{GlyphRasterizer, TextRasterizer};
use crate::pipeline::render::{self, ChromiumPrinter, HtmlPrinter};
use crate::pipeline::{input, rename, stamp};
use crate::process::{CommandRunner, LocatedTool, SystemRunner};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Which files a run covers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    /// Everything of the mode's kind directly inside `input_dir`.
    #[default]
    Directory,
    /// Exactly these files, partitioned by extension.
    Files(Vec<PathBuf>),
}

/// Requests that a running batch stop before its next file.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Drives one batch run with injectable external capabilities.
pub struct Orchestrator {
    config: WatermarkConfig,
    runner: Arc<dyn CommandRunner>,
    rasterizer: Arc<dyn TextRasterizer>,
    printer: Option<Arc<dyn HtmlPrinter>>,
    cancel: CancelHandle,
}

/// Tools located for one run.
struct Tools {
    watermark: Option<LocatedTool>,
    printer: Option<Arc<dyn HtmlPrinter>>,
}

impl Orchestrator {
    /// Orchestrator using real subprocesses, the `ab_glyph` rasterizer and a
    /// headless browser found on `PATH`.
    pub fn new(config: WatermarkConfig) -> Self {
        let rasterizer = Arc::new(GlyphRasterizer::new(config.font.clone()));
        Self {
            config,
            runner: Arc::new(SystemRunner),
            rasterizer,
            printer: None,
            cancel: CancelHandle::default(),
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn TextRasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    /// Use this printer for Markdown instead of locating a browser.
    pub fn with_printer(mut self, printer: Arc<dyn HtmlPrinter>) -> Self {
        self.printer = Some(printer);
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn config(&self) -> &WatermarkConfig {
        &self.config
    }

    /// Execute the run.
    ///
    /// `Ok` carries the aggregate even when files failed; check
    /// [`BatchResult::is_success`] or call [`BatchResult::into_result`].
    /// `Err` is reserved for failures that stop the run before any file is
    /// processed.
    pub async fn run(&self, selection: Selection) -> Result<BatchResult, BatchError> {
        let started = Instant::now();
        let config = &self.config;
        info!("Starting batch run: mode={}", config.mode);

        // ── Step 1: watermark-only short cut ─────────────────────────────
        if config.mode == Mode::WatermarkOnly {
            let asset = self.resolve_asset().await?;
            info!("Watermark image ready: {}", asset.path.display());
            return Ok(BatchResult::asset_only(asset, elapsed_ms(started)));
        }

        // ── Step 2: select mode and discover files ───────────────────────
        if selection == Selection::Directory && !config.input_dir.is_dir() {
            return Err(BatchError::InputDirNotFound {
                path: config.input_dir.clone(),
            });
        }
        let (mode, kind, files) = self.select(&selection)?;
        info!("Found {} {} file(s)", files.len(), kind);

        // ── Step 3: resolve asset; cleanup armed from here on ────────────
        let asset = if config.stamps_watermark() {
            Some(self.resolve_asset().await?)
        } else {
            None
        };
        let cleanup = AssetCleanup::new(asset.clone(), &config.assets_dir);

        // ── Step 4: locate external tools ────────────────────────────────
        let tools = self.locate_tools(asset.is_some(), kind).await?;

        // ── Step 5: output directory ─────────────────────────────────────
        tokio::fs::create_dir_all(&config.output_dir)
            .await
            .map_err(|source| BatchError::OutputDirFailed {
                path: config.output_dir.clone(),
                source,
            })?;

        // ── Step 6: per-file loop ────────────────────────────────────────
        let mut jobs: Vec<FileJob> = files
            .into_iter()
            .map(|path| {
                let output = output_path_for(&config.output_dir, &path, kind);
                FileJob::new(path, kind, output)
            })
            .collect();
        let cancelled = self.process_all(&mut jobs, asset.as_ref(), &tools).await;

        // ── Step 7: aggregate ────────────────────────────────────────────
        let result = BatchResult::from_jobs(mode, &jobs, asset, cancelled, elapsed_ms(started));
        info!(
            "{} processing completed: {} succeeded",
            kind,
            result.summary()
        );
        if cancelled {
            warn!(
                "Run cancelled; {} file(s) not attempted",
                result.discovered - result.attempted
            );
        }

        // ── Step 8: cleanup ──────────────────────────────────────────────
        cleanup.run();
        Ok(result)
    }

    /// Pick the mode that actually runs and its files.
    fn select(&self, selection: &Selection) -> Result<(Mode, FileKind, Vec<PathBuf>), BatchError> {
        let requested = self.config.mode;
        let chain: Vec<(Mode, FileKind)> = match requested {
            Mode::Pdf => vec![(Mode::Pdf, FileKind::Pdf), (Mode::Markdown, FileKind::Markdown)],
            other => vec![(other, FileKind::Markdown)],
        };

        let (pdfs, markdown) = match selection {
            Selection::Files(list) => {
                let (p, m) = input::partition(list);
                (Some(p), Some(m))
            }
            Selection::Directory => (None, None),
        };

        let mut listing_error = None;
        let picked = first_match(chain.iter().copied(), |(mode, kind)| {
            let listed = match (kind, &pdfs, &markdown) {
                (FileKind::Pdf, Some(p), _) => Ok(p.clone()),
                (FileKind::Markdown, _, Some(m)) => Ok(m.clone()),
                _ => input::discover(&self.config.input_dir, kind),
            };
            match listed {
                Ok(files) if !files.is_empty() => Some((mode, kind, files)),
                Ok(_) => {
                    if mode == Mode::Pdf {
                        info!("No PDF files found, looking for Markdown files");
                    }
                    None
                }
                Err(e) => {
                    listing_error.get_or_insert(e);
                    None
                }
            }
        });

        if let Some((mode, kind, files)) = picked {
            if mode != requested {
                info!("Falling back from {} mode to {} mode", requested, mode);
            }
            return Ok((mode, kind, files));
        }
        if let Some(e) = listing_error {
            return Err(e);
        }
        let dir = self.config.input_dir.clone();
        if chain.len() > 1 {
            Err(BatchError::NoDocuments { dir })
        } else {
            Err(BatchError::NoInputFiles {
                kind: FileKind::Markdown,
                dir,
            })
        }
    }

    async fn resolve_asset(&self) -> Result<WatermarkAsset, BatchError> {
        asset::resolve_asset(&self.config, Arc::clone(&self.rasterizer))
            .await?
            .ok_or_else(|| BatchError::NoWatermarkAsset {
                assets_dir: self.config.assets_dir.clone(),
            })
    }

    async fn locate_tools(&self, watermarking: bool, kind: FileKind) -> Result<Tools, BatchError> {
        let runner = self.runner.as_ref();
        let watermark = if watermarking {
            let tool = stamp::watermark_tool().locate(runner).await?;
            info!("Watermark tool available: {}", tool.program);
            Some(tool)
        } else {
            None
        };

        let printer = match (kind, &self.printer) {
            (FileKind::Pdf, _) => None,
            (FileKind::Markdown, Some(p)) => Some(Arc::clone(p)),
            (FileKind::Markdown, None) => {
                let browser = render::browser_tool(self.config.browser.as_deref())
                    .locate(runner)
                    .await?;
                info!("Headless browser available: {}", browser.program);
                let printer: Arc<dyn HtmlPrinter> = Arc::new(ChromiumPrinter::new(
                    browser,
                    Arc::clone(&self.runner),
                    &self.config,
                ));
                Some(printer)
            }
        };
        Ok(Tools { watermark, printer })
    }

    /// Process every job in order; returns whether the loop was cancelled.
    async fn process_all(
        &self,
        jobs: &mut [FileJob],
        asset: Option<&WatermarkAsset>,
        tools: &Tools,
    ) -> bool {
        let total = jobs.len();
        let callback = self.config.progress_callback.as_ref();
        if let Some(cb) = callback {
            cb.on_batch_start(total, jobs.first().map(|j| j.kind).unwrap_or(FileKind::Pdf));
        }

        let mut cancelled = false;
        for (i, job) in jobs.iter_mut().enumerate() {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let index = i + 1;
            if let Some(cb) = callback {
                cb.on_file_start(index, total, &job.path);
            }

            let outcome = match job.kind {
                FileKind::Pdf => self.process_pdf(job, asset, tools).await,
                FileKind::Markdown => self.process_markdown(job, asset, tools).await,
            };
            match outcome {
                Ok(final_path) => {
                    job.output_path = final_path;
                    job.succeed();
                    if let Some(cb) = callback {
                        cb.on_file_complete(index, total, &job.path, &job.output_path);
                    }
                }
                Err(e) => {
                    warn!("✗ {}: {}", job.display_name(), e);
                    if let Some(cb) = callback {
                        cb.on_file_error(index, total, &job.path, &e.to_string());
                    }
                    job.fail(e);
                }
            }
        }

        if let Some(cb) = callback {
            let succeeded = jobs.iter().filter(|j| j.is_success()).count();
            cb.on_batch_complete(total, succeeded);
        }
        cancelled
    }

    async fn process_pdf(
        &self,
        job: &FileJob,
        asset: Option<&WatermarkAsset>,
        tools: &Tools,
    ) -> Result<PathBuf, FileError> {
        let (Some(tool), Some(asset)) = (&tools.watermark, asset) else {
            return Err(FileError::WatermarkFailed {
                code: None,
                stderr: "no watermark tool or image for this run".into(),
            });
        };
        stamp::stamp_pdf(
            tool,
            self.runner.as_ref(),
            &self.config,
            &job.path,
            &job.output_path,
            &asset.path,
        )
        .await?;
        Ok(job.output_path.clone())
    }

    /// Render, then stamp in place, then optionally rename.
    ///
    /// A stamping failure leaves the rendered, unwatermarked PDF on disk.
    async fn process_markdown(
        &self,
        job: &FileJob,
        asset: Option<&WatermarkAsset>,
        tools: &Tools,
    ) -> Result<PathBuf, FileError> {
        let Some(printer) = &tools.printer else {
            return Err(FileError::RenderFailed {
                detail: "no renderer available for this run".into(),
            });
        };
        let out = &job.output_path;
        render::render_markdown(printer.as_ref(), &self.config, &job.path, out).await?;

        if let (Some(asset), Some(tool)) = (asset, &tools.watermark) {
            stamp::stamp_pdf(tool, self.runner.as_ref(), &self.config, out, out, &asset.path)
                .await?;
        }

        if self.config.rename_by_title {
            Ok(rename::rename_by_title(&job.path, out).await)
        } else {
            Ok(out.clone())
        }
    }
}

/// Run a batch with the default external capabilities.
///
/// Convenience wrapper over [`Orchestrator`].
pub async fn run_batch(
    config: WatermarkConfig,
    selection: Selection,
) -> Result<BatchResult, BatchError> {
    Orchestrator::new(config).run(selection).await
}

/// Blocking form of [`run_batch`]; creates its own tokio runtime.
///
/// Must not be called from inside an async context.
pub fn run_batch_sync(
    config: WatermarkConfig,
    selection: Selection,
) -> Result<BatchResult, BatchError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| BatchError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run_batch(config, selection))
}

/// `<output_dir>/<name>.pdf` for PDFs, `<output_dir>/<stem>.pdf` for Markdown.
pub fn output_path_for(output_dir: &Path, source: &Path, kind: FileKind) -> PathBuf {
    match kind {
        FileKind::Pdf => output_dir.join(source.file_name().unwrap_or(source.as_os_str())),
        FileKind::Markdown => {
            let stem = source
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "document".to_string());
            output_dir.join(format!("{stem}.pdf"))
        }
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_paths_mirror_inputs() {
        let out = Path::new("output");
        assert_eq!(
            output_path_for(out, Path::new("input/Report.PDF"), FileKind::Pdf),
            PathBuf::from("output/Report.PDF")
        );
        assert_eq!(
            output_path_for(out, Path::new("input/notes.markdown"), FileKind::Markdown),
            PathBuf::from("output/notes.pdf")
        );
    }

    #[test]
    fn cancel_handle_is_shared() {
        let config = WatermarkConfig::default();
        let orch = Orchestrator::new(config);
        let handle = orch.cancel_handle();
        assert!(!orch.cancel.is_cancelled());
        handle.cancel();
        assert!(orch.cancel.is_cancelled());
    }

    #[test]
    fn selection_defaults_to_directory() {
        assert_eq!(Selection::default(), Selection::Directory);
    }
}
