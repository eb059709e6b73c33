//! End-to-end batch runs against in-process fakes.
//!
//! The watermark tool, the browser and the text rasterizer are all replaced,
//! so these tests exercise the orchestration (selection, fallback, failure
//! isolation, renaming, cleanup) without any external program installed.

use async_trait::async_trait;
use mdpdf_watermark::pipeline::raster::TextRenderRequest;
use mdpdf_watermark::{
    AssetOrigin, BatchError, BatchProgressCallback, CancelHandle, CommandOutput, CommandRunner,
    FileError, FileKind, HtmlPrinter, Mode, Orchestrator, RasterError, Selection, TextRasterizer,
    ToolError, WatermarkConfig,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ── Fakes ────────────────────────────────────────────────────────────────

/// Pretends to be the `watermark` tool: copies source to dest, fails for any
/// source whose name contains `corrupt`, and reports success but leaves no
/// output for names containing `vanish`.
#[derive(Default)]
struct FakeWatermark {
    installed: bool,
    calls: Mutex<Vec<Vec<String>>>,
}

impl FakeWatermark {
    fn installed() -> Arc<Self> {
        Arc::new(Self {
            installed: true,
            ..Default::default()
        })
    }

    fn missing() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn stamp_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.first().map(String::as_str) != Some("--help"))
            .count()
    }
}

#[async_trait]
impl CommandRunner for FakeWatermark {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        _timeout: Option<Duration>,
    ) -> Result<CommandOutput, ToolError> {
        if !self.installed || program != "watermark" {
            return Err(ToolError::Spawn {
                program: program.into(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        self.calls.lock().unwrap().push(args.to_vec());
        if args.first().map(String::as_str) == Some("--help") {
            return Ok(CommandOutput {
                code: Some(0),
                ..Default::default()
            });
        }

        let (source, dest) = (Path::new(&args[1]), Path::new(&args[4]));
        if source.to_string_lossy().contains("corrupt") {
            return Ok(CommandOutput {
                stdout: String::new(),
                stderr: "PdfReadError: EOF marker not found\n".into(),
                code: Some(1),
            });
        }
        if source.to_string_lossy().contains("vanish") {
            let _ = fs::remove_file(dest);
            return Ok(CommandOutput {
                code: Some(0),
                ..Default::default()
            });
        }
        let mut bytes = fs::read(source)?;
        bytes.extend_from_slice(b"\n%watermarked");
        fs::write(dest, bytes)?;
        Ok(CommandOutput {
            code: Some(0),
            ..Default::default()
        })
    }
}

/// Writes a minimal PDF for every page it is given.
struct FakePrinter;

#[async_trait]
impl HtmlPrinter for FakePrinter {
    async fn print_to_pdf(&self, html: &Path, pdf: &Path) -> Result<(), ToolError> {
        assert!(html.exists(), "temporary HTML must exist while printing");
        fs::write(pdf, b"%PDF-1.4\n%%EOF")?;
        Ok(())
    }
}

/// Writes placeholder bytes instead of drawing glyphs.
struct StubRasterizer;

impl TextRasterizer for StubRasterizer {
    fn render(&self, request: &TextRenderRequest, out: &Path) -> Result<PathBuf, RasterError> {
        fs::write(out, request.text.as_bytes())?;
        Ok(PathBuf::from("stub.ttf"))
    }
}

struct Workspace {
    _tmp: TempDir,
    input: PathBuf,
    output: PathBuf,
    assets: PathBuf,
}

/// Route library logs to the test harness; `RUST_LOG=debug` shows them.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl Workspace {
    fn new() -> Self {
        init_logging();
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("input");
        let output = tmp.path().join("output");
        let assets = tmp.path().join("watermarks");
        fs::create_dir_all(&input).unwrap();
        fs::create_dir_all(&assets).unwrap();
        Self {
            _tmp: tmp,
            input,
            output,
            assets,
        }
    }

    fn put(&self, name: &str, content: &str) -> PathBuf {
        let p = self.input.join(name);
        fs::write(&p, content).unwrap();
        p
    }

    fn config(&self, mode: Mode) -> mdpdf_watermark::WatermarkConfigBuilder {
        WatermarkConfig::builder()
            .mode(mode)
            .text("Internal")
            .input_dir(&self.input)
            .output_dir(&self.output)
            .assets_dir(&self.assets)
    }

    fn asset_files(&self) -> Vec<PathBuf> {
        let mut v: Vec<PathBuf> = fs::read_dir(&self.assets)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        v.sort();
        v
    }
}

fn orchestrator(config: WatermarkConfig, runner: Arc<FakeWatermark>) -> Orchestrator {
    Orchestrator::new(config)
        .with_runner(runner)
        .with_rasterizer(Arc::new(StubRasterizer))
        .with_printer(Arc::new(FakePrinter))
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn one_corrupt_pdf_does_not_stop_the_batch() {
    let ws = Workspace::new();
    ws.put("a.pdf", "%PDF a");
    ws.put("b_corrupt.pdf", "%PDF b");
    ws.put("c.pdf", "%PDF c");
    let runner = FakeWatermark::installed();
    let config = ws.config(Mode::Pdf).build().unwrap();

    let result = orchestrator(config, runner.clone())
        .run(Selection::Directory)
        .await
        .unwrap();

    assert_eq!(result.mode, Mode::Pdf);
    assert_eq!((result.succeeded, result.attempted, result.discovered), (2, 3, 3));
    assert_eq!(result.summary(), "2/3");
    assert!(!result.is_success());
    assert_eq!(runner.stamp_calls(), 3);

    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].path, ws.input.join("b_corrupt.pdf"));
    match &result.failures[0].error {
        FileError::WatermarkFailed { code, stderr } => {
            assert_eq!(*code, Some(1));
            assert!(stderr.contains("EOF marker"), "got: {stderr}");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert!(ws.output.join("a.pdf").exists());
    assert!(ws.output.join("c.pdf").exists());
    assert!(!ws.output.join("b_corrupt.pdf").exists());
    assert!(matches!(
        result.into_result(),
        Err(BatchError::PartialFailure { failed: 1, total: 3, .. })
    ));
}

#[tokio::test]
async fn markdown_outputs_are_renamed_without_clobbering() {
    let ws = Workspace::new();
    ws.put("a.md", "# Report\n\nfirst");
    ws.put("b.md", "---\ntitle: \"Draft\"\n---\n\n# Report\n\nsecond");
    let config = ws
        .config(Mode::Markdown)
        .rename_by_title(true)
        .build()
        .unwrap();

    let result = orchestrator(config, FakeWatermark::installed())
        .run(Selection::Directory)
        .await
        .unwrap();

    assert!(result.is_success(), "{:?}", result.failures);
    assert_eq!(
        result.outputs,
        vec![ws.output.join("Report.pdf"), ws.output.join("Report_1.pdf")]
    );
    for out in &result.outputs {
        let bytes = fs::read(out).unwrap();
        assert!(bytes.ends_with(b"%watermarked"), "{} not stamped", out.display());
    }
    assert!(!ws.output.join("a.pdf").exists());
    assert!(!ws.output.join("b.pdf").exists());
}

#[tokio::test]
async fn failed_stamp_keeps_rendered_pdf_and_skips_rename() {
    let ws = Workspace::new();
    ws.put("report_corrupt.md", "# Quarterly\n\nbody");
    let runner = FakeWatermark::installed();
    let config = ws
        .config(Mode::Markdown)
        .rename_by_title(true)
        .build()
        .unwrap();

    let result = orchestrator(config, runner.clone())
        .run(Selection::Directory)
        .await
        .unwrap();

    assert_eq!((result.succeeded, result.attempted), (0, 1));
    assert!(result.outputs.is_empty());
    assert_eq!(runner.stamp_calls(), 1);
    match &result.failures[0].error {
        FileError::WatermarkFailed { code, .. } => assert_eq!(*code, Some(1)),
        other => panic!("unexpected error: {other:?}"),
    }
    let rendered = ws.output.join("report_corrupt.pdf");
    assert_eq!(fs::read(&rendered).unwrap(), b"%PDF-1.4\n%%EOF");
    assert!(!ws.output.join("Quarterly.pdf").exists());
}

#[tokio::test]
async fn failed_rename_still_counts_as_success() {
    let ws = Workspace::new();
    ws.put("notes_vanish.md", "# Notes\n");
    let config = ws
        .config(Mode::Markdown)
        .rename_by_title(true)
        .build()
        .unwrap();

    let result = orchestrator(config, FakeWatermark::installed())
        .run(Selection::Directory)
        .await
        .unwrap();

    assert!(result.is_success(), "{:?}", result.failures);
    assert_eq!((result.succeeded, result.attempted), (1, 1));
    assert_eq!(result.outputs, vec![ws.output.join("notes_vanish.pdf")]);
    assert!(!ws.output.join("Notes.pdf").exists());
}

#[tokio::test]
async fn generated_text_asset_is_removed_after_the_run() {
    let ws = Workspace::new();
    ws.put("a.pdf", "%PDF a");
    let config = ws.config(Mode::Pdf).build().unwrap();

    let result = orchestrator(config, FakeWatermark::installed())
        .run(Selection::Directory)
        .await
        .unwrap();

    let asset = result.asset.expect("asset recorded");
    assert_eq!(asset.origin, AssetOrigin::GeneratedFromText);
    assert!(!asset.path.exists());
    assert!(ws.asset_files().is_empty());
}

#[tokio::test]
async fn user_image_is_never_deleted() {
    let ws = Workspace::new();
    ws.put("a.pdf", "%PDF a");
    let logo = ws.assets.join("logo.png");
    fs::write(&logo, b"png").unwrap();
    let config = ws.config(Mode::Pdf).image(&logo).build().unwrap();

    let result = orchestrator(config, FakeWatermark::installed())
        .run(Selection::Directory)
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(result.asset.unwrap().origin, AssetOrigin::UserProvided);
    assert!(logo.exists());
}

#[tokio::test]
async fn empty_input_directory_is_a_run_failure() {
    let ws = Workspace::new();
    ws.put("notes.txt", "not a document");
    let runner = FakeWatermark::installed();
    let config = ws.config(Mode::Pdf).build().unwrap();

    let err = orchestrator(config, runner.clone())
        .run(Selection::Directory)
        .await
        .unwrap_err();

    assert!(matches!(err, BatchError::NoDocuments { .. }), "got {err}");
    assert_eq!(runner.stamp_calls(), 0);
    assert!(ws.asset_files().is_empty());
}

#[tokio::test]
async fn missing_input_directory_is_reported() {
    let ws = Workspace::new();
    let config = ws
        .config(Mode::Markdown)
        .input_dir(ws.input.join("absent"))
        .build()
        .unwrap();

    let err = orchestrator(config, FakeWatermark::installed())
        .run(Selection::Directory)
        .await
        .unwrap_err();
    assert!(matches!(err, BatchError::InputDirNotFound { .. }));
}

#[tokio::test]
async fn pdf_mode_falls_back_to_markdown() {
    let ws = Workspace::new();
    ws.put("guide.md", "# Guide\n");
    let config = ws.config(Mode::Pdf).build().unwrap();

    let result = orchestrator(config, FakeWatermark::installed())
        .run(Selection::Directory)
        .await
        .unwrap();

    assert_eq!(result.mode, Mode::Markdown);
    assert!(result.is_success());
    assert_eq!(result.outputs, vec![ws.output.join("guide.pdf")]);
}

#[tokio::test]
async fn missing_watermark_tool_stops_before_any_file() {
    let ws = Workspace::new();
    ws.put("a.pdf", "%PDF a");
    let config = ws.config(Mode::Pdf).build().unwrap();

    let err = orchestrator(config, FakeWatermark::missing())
        .run(Selection::Directory)
        .await
        .unwrap_err();

    match err {
        BatchError::ToolNotFound { tried, hint, .. } => {
            assert_eq!(&tried[..2], ["watermark", "pdf-watermark"]);
            assert!(hint.contains("pip install pdf-watermark"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!ws.output.exists());
    assert!(ws.asset_files().is_empty(), "generated asset must be cleaned up");
}

#[tokio::test]
async fn markdown_without_watermark_skips_tool_and_asset() {
    let ws = Workspace::new();
    ws.put("a.md", "hello");
    let config = ws.config(Mode::MarkdownNoWatermark).build().unwrap();

    let result = orchestrator(config, FakeWatermark::missing())
        .run(Selection::Directory)
        .await
        .unwrap();

    assert!(result.is_success());
    assert!(result.asset.is_none());
    assert_eq!(fs::read(ws.output.join("a.pdf")).unwrap(), b"%PDF-1.4\n%%EOF");
}

#[tokio::test]
async fn watermark_only_keeps_the_generated_image() {
    let ws = Workspace::new();
    let config = ws
        .config(Mode::WatermarkOnly)
        .text("Draft")
        .add_date(false)
        .build()
        .unwrap();

    let result = orchestrator(config, FakeWatermark::missing())
        .run(Selection::Directory)
        .await
        .unwrap();

    assert!(result.is_success());
    let asset = result.asset.unwrap();
    assert_eq!(asset.origin, AssetOrigin::GeneratedFromText);
    assert!(asset.path.exists());
    assert_eq!(fs::read_to_string(&asset.path).unwrap(), "Draft");
    assert!(!ws.output.exists());
}

#[tokio::test]
async fn explicit_file_list_is_honoured() {
    let ws = Workspace::new();
    let a = ws.put("a.pdf", "%PDF a");
    ws.put("b.pdf", "%PDF b");
    let config = ws.config(Mode::Pdf).build().unwrap();

    let result = orchestrator(config, FakeWatermark::installed())
        .run(Selection::Files(vec![a]))
        .await
        .unwrap();

    assert_eq!(result.discovered, 1);
    assert!(ws.output.join("a.pdf").exists());
    assert!(!ws.output.join("b.pdf").exists());
}

/// Cancels the run once the first file is done.
#[derive(Default)]
struct CancelAfterFirst {
    handle: Mutex<Option<CancelHandle>>,
    seen: Mutex<Vec<(FileKind, usize)>>,
}

impl BatchProgressCallback for CancelAfterFirst {
    fn on_batch_start(&self, total: usize, kind: FileKind) {
        self.seen.lock().unwrap().push((kind, total));
    }

    fn on_file_complete(&self, _index: usize, _total: usize, _path: &Path, _output: &Path) {
        if let Some(h) = self.handle.lock().unwrap().as_ref() {
            h.cancel();
        }
    }
}

#[tokio::test]
async fn cancellation_stops_between_files() {
    let ws = Workspace::new();
    for name in ["a.pdf", "b.pdf", "c.pdf"] {
        ws.put(name, "%PDF");
    }
    let cb = Arc::new(CancelAfterFirst::default());
    let config = ws
        .config(Mode::Pdf)
        .progress_callback(cb.clone())
        .build()
        .unwrap();
    let orch = orchestrator(config, FakeWatermark::installed());
    *cb.handle.lock().unwrap() = Some(orch.cancel_handle());

    let result = orch.run(Selection::Directory).await.unwrap();

    assert!(result.cancelled);
    assert_eq!((result.succeeded, result.attempted, result.discovered), (1, 1, 3));
    assert!(!result.is_success());
    assert_eq!(*cb.seen.lock().unwrap(), vec![(FileKind::Pdf, 3)]);
    assert!(!ws.output.join("b.pdf").exists());
}
