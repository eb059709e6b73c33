//! Configuration types for a batch watermarking run.
//!
//! Every knob of a run lives in one [`WatermarkConfig`], built once per
//! invocation via [`WatermarkConfigBuilder`] and read-only afterwards. The
//! orchestrator, the asset resolver and both tool adapters receive the same
//! value, so there is no ambient or global state to keep in sync.

use crate::error::BatchError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Configuration for one batch run.
///
/// Built via [`WatermarkConfig::builder()`] or using
/// [`WatermarkConfig::default()`].
///
/// # Example
/// ```rust
/// use mdpdf_watermark::{Mode, WatermarkConfig};
///
/// let config = WatermarkConfig::builder()
///     .mode(Mode::Markdown)
///     .text("CONFIDENTIAL")
///     .opacity(0.3)
///     .rename_by_title(true)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct WatermarkConfig {
    /// What the run does. Default: [`Mode::Pdf`].
    pub mode: Mode,

    /// Where the watermark image comes from. Default: [`WatermarkKind::Text`].
    pub kind: WatermarkKind,

    /// Watermark text for [`WatermarkKind::Text`]. Default: `"Watermark"`.
    pub text: String,

    /// Append `" - YYYY-MM-DD"` (today) to the rendered text. Default: true.
    pub add_date: bool,

    /// User-supplied image for [`WatermarkKind::Image`].
    pub image: Option<PathBuf>,

    /// Grid tiling or single insert. Default: [`WatermarkStyle::Grid`].
    pub watermark_type: WatermarkStyle,

    /// Watermark opacity, 0.0–1.0. Default: 0.2.
    pub opacity: f64,

    /// Rotation in degrees. Default: 45.
    pub angle: f64,

    /// Scale factor applied to the watermark image. Default: 1.0.
    pub image_scale: f64,

    /// Grid columns. Default: 3.
    pub horizontal_boxes: u32,

    /// Grid rows. Default: 6.
    pub vertical_boxes: u32,

    /// Leave a margin around the grid (`-m`). Default: false.
    pub margin: bool,

    /// Insert position, normalised 0.0–1.0. Default: 0.5.
    pub x: f64,

    /// Insert position, normalised 0.0–1.0. Default: 0.5.
    pub y: f64,

    /// Insert alignment. Default: [`HorizontalAlignment::Center`].
    pub horizontal_alignment: HorizontalAlignment,

    /// Make the watermark unselectable in viewers. Default: false.
    pub unselectable: bool,

    /// Flatten each page to an image after stamping. Default: false.
    pub save_as_image: bool,

    /// Text watermark font size in pixels. Default: 36.
    pub font_size: u32,

    /// Text watermark colour. Default: `(68, 68, 68, 220)`.
    pub text_color: Rgba,

    /// Transparent padding around the rendered text, in pixels. Default: 20.
    pub padding: u32,

    /// Explicit font file for text rendering. Tried before the built-in
    /// candidate list. The CLI fills it from `WATERMARK_FONT`.
    pub font: Option<PathBuf>,

    /// Directory scanned for input documents. Default: `input`.
    pub input_dir: PathBuf,

    /// Directory receiving output PDFs. Default: `output`.
    pub output_dir: PathBuf,

    /// Directory holding discoverable and generated watermark images.
    /// Default: `watermarks`.
    pub assets_dir: PathBuf,

    /// Strip `---` front matter from Markdown before rendering. Default: false.
    pub filter_front_matter: bool,

    /// Rename Markdown outputs after their first H1. Default: false.
    pub rename_by_title: bool,

    /// Explicit headless browser executable for Markdown rendering.
    pub browser: Option<PathBuf>,

    /// How long the browser may wait for the page to signal that client-side
    /// rendering finished, in milliseconds. Default: 5000.
    ///
    /// Expiry is not an error: the snapshot is taken anyway.
    pub ready_timeout_ms: u64,

    /// Hard limit for one browser or watermark-tool process, in seconds.
    /// Default: 120.
    pub render_timeout_secs: u64,

    /// Receives per-file progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            kind: WatermarkKind::default(),
            text: "Watermark".to_string(),
            add_date: true,
            image: None,
            watermark_type: WatermarkStyle::default(),
            opacity: 0.2,
            angle: 45.0,
            image_scale: 1.0,
            horizontal_boxes: 3,
            vertical_boxes: 6,
            margin: false,
            x: 0.5,
            y: 0.5,
            horizontal_alignment: HorizontalAlignment::default(),
            unselectable: false,
            save_as_image: false,
            font_size: 36,
            text_color: Rgba::new(68, 68, 68, 220),
            padding: 20,
            font: None,
            input_dir: PathBuf::from("input"),
            output_dir: PathBuf::from("output"),
            assets_dir: PathBuf::from("watermarks"),
            filter_front_matter: false,
            rename_by_title: false,
            browser: None,
            ready_timeout_ms: 5000,
            render_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for WatermarkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatermarkConfig")
            .field("mode", &self.mode)
            .field("kind", &self.kind)
            .field("text", &self.text)
            .field("add_date", &self.add_date)
            .field("image", &self.image)
            .field("watermark_type", &self.watermark_type)
            .field("opacity", &self.opacity)
            .field("angle", &self.angle)
            .field("image_scale", &self.image_scale)
            .field("horizontal_boxes", &self.horizontal_boxes)
            .field("vertical_boxes", &self.vertical_boxes)
            .field("x", &self.x)
            .field("y", &self.y)
            .field("font_size", &self.font_size)
            .field("text_color", &self.text_color)
            .field("input_dir", &self.input_dir)
            .field("output_dir", &self.output_dir)
            .field("assets_dir", &self.assets_dir)
            .field("filter_front_matter", &self.filter_front_matter)
            .field("rename_by_title", &self.rename_by_title)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl WatermarkConfig {
    /// Create a new builder for `WatermarkConfig`.
    pub fn builder() -> WatermarkConfigBuilder {
        WatermarkConfigBuilder {
            config: Self::default(),
        }
    }

    /// Whether this run stamps a watermark onto its outputs.
    pub fn stamps_watermark(&self) -> bool {
        matches!(self.mode, Mode::Pdf | Mode::Markdown)
    }
}

/// Builder for [`WatermarkConfig`].
#[derive(Debug)]
pub struct WatermarkConfigBuilder {
    config: WatermarkConfig,
}

impl WatermarkConfigBuilder {
    pub fn mode(mut self, mode: Mode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn kind(mut self, kind: WatermarkKind) -> Self {
        self.config.kind = kind;
        self
    }

    /// Set the watermark text and switch to [`WatermarkKind::Text`].
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.config.text = text.into();
        self.config.kind = WatermarkKind::Text;
        self
    }

    pub fn add_date(mut self, v: bool) -> Self {
        self.config.add_date = v;
        self
    }

    /// Set a user image and switch to [`WatermarkKind::Image`].
    pub fn image(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.image = Some(path.into());
        self.config.kind = WatermarkKind::Image;
        self
    }

    pub fn watermark_type(mut self, style: WatermarkStyle) -> Self {
        self.config.watermark_type = style;
        self
    }

    pub fn opacity(mut self, v: f64) -> Self {
        self.config.opacity = v;
        self
    }

    pub fn angle(mut self, degrees: f64) -> Self {
        self.config.angle = degrees;
        self
    }

    pub fn image_scale(mut self, v: f64) -> Self {
        self.config.image_scale = v;
        self
    }

    pub fn grid(mut self, horizontal: u32, vertical: u32) -> Self {
        self.config.horizontal_boxes = horizontal;
        self.config.vertical_boxes = vertical;
        self
    }

    pub fn margin(mut self, v: bool) -> Self {
        self.config.margin = v;
        self
    }

    pub fn position(mut self, x: f64, y: f64) -> Self {
        self.config.x = x;
        self.config.y = y;
        self
    }

    pub fn horizontal_alignment(mut self, align: HorizontalAlignment) -> Self {
        self.config.horizontal_alignment = align;
        self
    }

    pub fn unselectable(mut self, v: bool) -> Self {
        self.config.unselectable = v;
        self
    }

    pub fn save_as_image(mut self, v: bool) -> Self {
        self.config.save_as_image = v;
        self
    }

    pub fn font_size(mut self, px: u32) -> Self {
        self.config.font_size = px;
        self
    }

    pub fn text_color(mut self, color: Rgba) -> Self {
        self.config.text_color = color;
        self
    }

    pub fn padding(mut self, px: u32) -> Self {
        self.config.padding = px;
        self
    }

    pub fn font(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.font = Some(path.into());
        self
    }

    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.input_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn assets_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.assets_dir = dir.into();
        self
    }

    pub fn filter_front_matter(mut self, v: bool) -> Self {
        self.config.filter_front_matter = v;
        self
    }

    pub fn rename_by_title(mut self, v: bool) -> Self {
        self.config.rename_by_title = v;
        self
    }

    pub fn browser(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.browser = Some(path.into());
        self
    }

    pub fn ready_timeout_ms(mut self, ms: u64) -> Self {
        self.config.ready_timeout_ms = ms;
        self
    }

    pub fn render_timeout_secs(mut self, secs: u64) -> Self {
        self.config.render_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<WatermarkConfig, BatchError> {
        let c = &self.config;
        if !(0.0..=1.0).contains(&c.opacity) {
            return Err(BatchError::InvalidConfig(format!(
                "opacity must be 0.0–1.0, got {}",
                c.opacity
            )));
        }
        if c.image_scale <= 0.0 {
            return Err(BatchError::InvalidConfig(format!(
                "image scale must be > 0, got {}",
                c.image_scale
            )));
        }
        if c.horizontal_boxes == 0 || c.vertical_boxes == 0 {
            return Err(BatchError::InvalidConfig(
                "grid box counts must be ≥ 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&c.x) || !(0.0..=1.0).contains(&c.y) {
            return Err(BatchError::InvalidConfig(format!(
                "insert position must be normalised 0.0–1.0, got ({}, {})",
                c.x, c.y
            )));
        }
        if c.font_size == 0 {
            return Err(BatchError::InvalidConfig("font size must be ≥ 1".into()));
        }
        if c.ready_timeout_ms > c.render_timeout_secs.saturating_mul(1000) {
            return Err(BatchError::InvalidConfig(format!(
                "ready timeout ({}ms) exceeds render timeout ({}s)",
                c.ready_timeout_ms, c.render_timeout_secs
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// What a run does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Watermark every PDF in the input directory. Falls back to
    /// [`Mode::Markdown`] when there are no PDFs but Markdown files exist.
    #[default]
    Pdf,
    /// Render Markdown to PDF, then watermark.
    Markdown,
    /// Render Markdown to PDF without watermarking.
    MarkdownNoWatermark,
    /// Only produce the watermark image.
    WatermarkOnly,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Pdf => "pdf",
            Mode::Markdown => "markdown",
            Mode::MarkdownNoWatermark => "markdown_no_watermark",
            Mode::WatermarkOnly => "watermark_only",
        };
        f.write_str(s)
    }
}

/// Source of the watermark image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkKind {
    /// Render [`WatermarkConfig::text`] to a PNG. (default)
    #[default]
    Text,
    /// Use [`WatermarkConfig::image`].
    Image,
    /// Use whatever image sits in the assets directory.
    None,
}

/// Layout strategy passed to the watermarking tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkStyle {
    /// Tile across `horizontal_boxes × vertical_boxes`. (default)
    #[default]
    Grid,
    /// Place once at normalised `(x, y)`.
    Insert,
}

impl WatermarkStyle {
    /// Sub-command name understood by the watermarking tool.
    pub fn as_arg(&self) -> &'static str {
        match self {
            WatermarkStyle::Grid => "grid",
            WatermarkStyle::Insert => "insert",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HorizontalAlignment {
    Left,
    #[default]
    Center,
    Right,
}

impl HorizontalAlignment {
    pub fn as_arg(&self) -> &'static str {
        match self {
            HorizontalAlignment::Left => "left",
            HorizontalAlignment::Center => "center",
            HorizontalAlignment::Right => "right",
        }
    }
}

/// An 8-bit RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

impl FromStr for Rgba {
    type Err = BatchError;

    /// Accepts `#RRGGBB`, `#RRGGBBAA`, `r,g,b` or `r,g,b,a`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || BatchError::InvalidConfig(format!("invalid colour '{s}'"));

        if let Some(hex) = s.strip_prefix('#') {
            if !matches!(hex.len(), 6 | 8) || !hex.is_ascii() {
                return Err(invalid());
            }
            let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
            let a = if hex.len() == 8 { byte(6)? } else { 255 };
            return Ok(Rgba::new(byte(0)?, byte(2)?, byte(4)?, a));
        }

        let parts: Vec<u8> = s
            .split(',')
            .map(|p| p.trim().parse::<u8>().map_err(|_| invalid()))
            .collect::<Result<_, _>>()?;
        match parts.as_slice() {
            [r, g, b] => Ok(Rgba::new(*r, *g, *b, 255)),
            [r, g, b, a] => Ok(Rgba::new(*r, *g, *b, *a)),
            _ => Err(invalid()),
        }
    }
}
