//! CLI binary for mdpdf-watermark.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `WatermarkConfig`, runs one batch and reports the outcome.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use mdpdf_watermark::{
    BatchProgressCallback, BatchResult, FileKind, HorizontalAlignment, Mode, Orchestrator,
    ProgressCallback, Rgba, Selection, WatermarkConfig, WatermarkKind, WatermarkStyle,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one ✓/✗ line per file.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_batch_start` reports the file count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Locating tools…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize, kind: FileKind) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix(match kind {
            FileKind::Pdf => "Watermarking",
            FileKind::Markdown => "Rendering",
        });
        self.bar.reset_eta();
    }
}

fn file_name(p: &Path) -> String {
    p.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| p.display().to_string())
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize, kind: FileKind) {
        self.activate_bar(total, kind);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total} {kind} file(s)…"))
        ));
    }

    fn on_file_start(&self, _index: usize, _total: usize, path: &Path) {
        self.bar.set_message(file_name(path));
    }

    fn on_file_complete(&self, index: usize, total: usize, path: &Path, output: &Path) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {}  {}",
            green("✓"),
            index,
            total,
            file_name(path),
            dim(&format!("→ {}", output.display())),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, index: usize, total: usize, path: &Path, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {}  {}",
            red("✗"),
            index,
            total,
            file_name(path),
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, succeeded: usize) {
        let failed = total.saturating_sub(succeeded);
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!(
                "{} {}/{} files processed successfully",
                green("✔"),
                bold(&succeeded.to_string()),
                total
            );
        } else {
            eprintln!(
                "{} {}/{} files processed  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Watermark every PDF in ./input with today's date
  mdpdf-watermark --text "CONFIDENTIAL"

  # Render Markdown to PDF, watermark, rename after the first heading
  mdpdf-watermark --mode markdown --rename-by-title --filter-front-matter

  # Render Markdown only, no watermark
  mdpdf-watermark --mode markdown-no-watermark

  # Use a logo, placed once in the lower right
  mdpdf-watermark --image logo.png --style insert --x 0.9 --y 0.1 --align right

  # Only produce the watermark PNG
  mdpdf-watermark --mode watermark-only --text "DRAFT" --no-date

  # Explicit files instead of the whole input directory
  mdpdf-watermark report.pdf notes.md

ENVIRONMENT VARIABLES:
  WATERMARK_FONT   Font file for text watermarks (.ttf, .otf, .ttc)
  MDPDF_BROWSER    Headless Chromium/Chrome/Edge executable
  VIRTUAL_ENV      Also searched for the `watermark` executable
  RUST_LOG         Overrides the log filter (e.g. mdpdf_watermark=debug)

SETUP:
  1. Watermark tool:  pip install pdf-watermark
  2. Markdown modes:  install Chromium or Google Chrome
"#;

/// Batch-watermark PDFs, or render Markdown to PDF and watermark it.
#[derive(Parser, Debug)]
#[command(
    name = "mdpdf-watermark",
    version,
    about = "Batch-watermark PDFs, or render Markdown to PDF and watermark it",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Process only these files instead of scanning the input directory.
    files: Vec<PathBuf>,

    /// What to do.
    #[arg(long, env = "MDPDF_MODE", value_enum, default_value = "pdf")]
    mode: ModeArg,

    /// Watermark source.
    #[arg(long = "type", env = "MDPDF_WATERMARK_TYPE", value_enum, default_value = "text")]
    kind: KindArg,

    /// Watermark text.
    #[arg(long, env = "MDPDF_TEXT", default_value = "Watermark")]
    text: String,

    /// Do not append today's date to the watermark text.
    #[arg(long)]
    no_date: bool,

    /// Watermark image (implies --type image).
    #[arg(long, env = "MDPDF_IMAGE")]
    image: Option<PathBuf>,

    /// Layout: tile a grid or insert once.
    #[arg(long, value_enum, default_value = "grid")]
    style: StyleArg,

    /// Opacity, 0.0–1.0.
    #[arg(long, default_value_t = 0.2)]
    opacity: f64,

    /// Rotation in degrees.
    #[arg(long, default_value_t = 45.0)]
    angle: f64,

    /// Image scale factor.
    #[arg(long, default_value_t = 1.0)]
    scale: f64,

    /// Grid columns.
    #[arg(long, default_value_t = 3)]
    horizontal_boxes: u32,

    /// Grid rows.
    #[arg(long, default_value_t = 6)]
    vertical_boxes: u32,

    /// Leave a margin around the grid.
    #[arg(long)]
    margin: bool,

    /// Insert position, 0.0–1.0.
    #[arg(long, default_value_t = 0.5)]
    x: f64,

    /// Insert position, 0.0–1.0.
    #[arg(long, default_value_t = 0.5)]
    y: f64,

    /// Insert alignment.
    #[arg(long, value_enum, default_value = "center")]
    align: AlignArg,

    /// Make the watermark unselectable.
    #[arg(long)]
    unselectable: bool,

    /// Flatten pages to images after stamping.
    #[arg(long)]
    save_as_image: bool,

    /// Text watermark font size in pixels.
    #[arg(long, default_value_t = 36)]
    font_size: u32,

    /// Text colour: #RRGGBB, #RRGGBBAA or r,g,b[,a].
    #[arg(long, default_value = "68,68,68,220")]
    color: Rgba,

    /// Transparent padding around the text, in pixels.
    #[arg(long, default_value_t = 20)]
    padding: u32,

    /// Font file for text watermarks.
    #[arg(long, env = "WATERMARK_FONT")]
    font: Option<PathBuf>,

    /// Input directory.
    #[arg(short, long, env = "MDPDF_INPUT_DIR", default_value = "input")]
    input_dir: PathBuf,

    /// Output directory.
    #[arg(short, long, env = "MDPDF_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// Directory holding watermark images.
    #[arg(long, env = "MDPDF_ASSETS_DIR", default_value = "watermarks")]
    assets_dir: PathBuf,

    /// Strip `---` front matter before rendering Markdown.
    #[arg(long)]
    filter_front_matter: bool,

    /// Rename rendered PDFs after their first heading.
    #[arg(long)]
    rename_by_title: bool,

    /// Headless browser executable.
    #[arg(long, env = "MDPDF_BROWSER")]
    browser: Option<PathBuf>,

    /// How long the page may take to finish rendering, in milliseconds.
    #[arg(long, default_value_t = 5000)]
    ready_timeout: u64,

    /// Hard limit per external process, in seconds.
    #[arg(long, default_value_t = 120)]
    timeout: u64,

    /// Print the run result as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "MDPDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MDPDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MDPDF_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Pdf,
    Markdown,
    MarkdownNoWatermark,
    WatermarkOnly,
}

impl From<ModeArg> for Mode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Pdf => Mode::Pdf,
            ModeArg::Markdown => Mode::Markdown,
            ModeArg::MarkdownNoWatermark => Mode::MarkdownNoWatermark,
            ModeArg::WatermarkOnly => Mode::WatermarkOnly,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Text,
    Image,
    None,
}

impl From<KindArg> for WatermarkKind {
    fn from(v: KindArg) -> Self {
        match v {
            KindArg::Text => WatermarkKind::Text,
            KindArg::Image => WatermarkKind::Image,
            KindArg::None => WatermarkKind::None,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum StyleArg {
    Grid,
    Insert,
}

impl From<StyleArg> for WatermarkStyle {
    fn from(v: StyleArg) -> Self {
        match v {
            StyleArg::Grid => WatermarkStyle::Grid,
            StyleArg::Insert => WatermarkStyle::Insert,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum AlignArg {
    Left,
    Center,
    Right,
}

impl From<AlignArg> for HorizontalAlignment {
    fn from(v: AlignArg) -> Self {
        match v {
            AlignArg::Left => HorizontalAlignment::Left,
            AlignArg::Center => HorizontalAlignment::Center,
            AlignArg::Right => HorizontalAlignment::Right,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO-level library logs are muted while the progress bar is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let watermark_only = matches!(cli.mode, ModeArg::WatermarkOnly);
    let progress_cb: Option<ProgressCallback> = if show_progress && !watermark_only {
        Some(CliProgressCallback::new_dynamic() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    let selection = if cli.files.is_empty() {
        Selection::Directory
    } else {
        Selection::Files(cli.files.clone())
    };

    // ── Run ──────────────────────────────────────────────────────────────
    let orchestrator = Orchestrator::new(config);
    let cancel = orchestrator.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", cyan("Interrupted: finishing the current file, then stopping"));
            cancel.cancel();
        }
    });

    let result = orchestrator.run(selection).await.context("Batch run failed")?;

    // ── Report ───────────────────────────────────────────────────────────
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialise result")?
        );
    } else if !cli.quiet {
        report(&result, show_progress);
    }

    if !result.is_success() {
        anyhow::bail!("{} files processed successfully", result.summary());
    }
    Ok(())
}

fn report(result: &BatchResult, progress_shown: bool) {
    if result.mode == Mode::WatermarkOnly {
        if let Some(asset) = &result.asset {
            eprintln!("{} Watermark image: {}", green("✔"), bold(&asset.path.display().to_string()));
        }
        return;
    }
    if !progress_shown {
        eprintln!(
            "Processed {} files in {}ms",
            result.summary(),
            result.duration_ms
        );
        for failure in &result.failures {
            eprintln!("  {} {}: {}", red("✗"), failure.path.display(), failure.error);
        }
    } else {
        eprintln!("   {}", dim(&format!("{}ms total", result.duration_ms)));
    }
    if result.cancelled {
        eprintln!(
            "{} cancelled after {}/{} files",
            cyan("⚠"),
            result.attempted,
            result.discovered
        );
    }
}

/// Map CLI args to `WatermarkConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<WatermarkConfig> {
    let mut builder = WatermarkConfig::builder()
        .mode(cli.mode.into())
        .text(cli.text.clone())
        .add_date(!cli.no_date)
        .watermark_type(cli.style.into())
        .opacity(cli.opacity)
        .angle(cli.angle)
        .image_scale(cli.scale)
        .grid(cli.horizontal_boxes, cli.vertical_boxes)
        .margin(cli.margin)
        .position(cli.x, cli.y)
        .horizontal_alignment(cli.align.into())
        .unselectable(cli.unselectable)
        .save_as_image(cli.save_as_image)
        .font_size(cli.font_size)
        .text_color(cli.color)
        .padding(cli.padding)
        .input_dir(&cli.input_dir)
        .output_dir(&cli.output_dir)
        .assets_dir(&cli.assets_dir)
        .filter_front_matter(cli.filter_front_matter)
        .rename_by_title(cli.rename_by_title)
        .ready_timeout_ms(cli.ready_timeout)
        .render_timeout_secs(cli.timeout)
        .kind(cli.kind.into());

    // An explicit image wins over --type.
    if let Some(ref image) = cli.image {
        builder = builder.image(image);
    }
    if let Some(ref font) = cli.font {
        builder = builder.font(font);
    }
    if let Some(ref browser) = cli.browser {
        builder = builder.browser(browser);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
