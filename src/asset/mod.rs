//! Watermark asset resolution.
//!
//! Decides which image gets stamped onto every output of a run:
//!
//! 1. `kind = image` with a configured path: that file, or
//!    [`BatchError::WatermarkImageNotFound`] if it is missing.
//! 2. `kind = text` with non-empty text: a PNG rendered into the assets
//!    directory. A rendering failure of any sort drops to step 3.
//! 3. Otherwise: the first image already sitting in the assets directory.
//!
//! Generated file names combine the sanitised watermark text with a
//! second-resolution timestamp, and get a numeric suffix if that name is
//! already taken, so successive runs never overwrite each other's assets.

pub mod fonts;

use crate::config::{WatermarkConfig, WatermarkKind};
use crate::error::BatchError;
use crate::fallback::first_match;
use crate::output::{AssetOrigin, WatermarkAsset};
use crate::pipeline::raster::{TextRasterizer, TextRenderRequest};
use chrono::{DateTime, Local, NaiveDate, TimeZone};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Extensions accepted by discovery, in priority order. Matching is exact.
pub const DISCOVERY_EXTENSIONS: &[&str] = &["png", "PNG", "jpg", "jpeg", "svg"];

const MAX_FILENAME_STEM: usize = 80;

/// Resolve the watermark asset for `config` using the current local time.
///
/// `Ok(None)` means nothing usable exists; whether that is fatal is the
/// caller's decision.
pub async fn resolve_asset(
    config: &WatermarkConfig,
    rasterizer: Arc<dyn TextRasterizer>,
) -> Result<Option<WatermarkAsset>, BatchError> {
    resolve_asset_at(config, rasterizer, Local::now()).await
}

/// [`resolve_asset`] at a fixed instant.
pub async fn resolve_asset_at<Tz>(
    config: &WatermarkConfig,
    rasterizer: Arc<dyn TextRasterizer>,
    now: DateTime<Tz>,
) -> Result<Option<WatermarkAsset>, BatchError>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    // ── Step 1: user image ───────────────────────────────────────────────
    if config.kind == WatermarkKind::Image {
        if let Some(image) = &config.image {
            if !image.is_file() {
                return Err(BatchError::WatermarkImageNotFound {
                    path: image.clone(),
                });
            }
            info!("Using watermark image: {}", image.display());
            return Ok(Some(WatermarkAsset::new(
                image.clone(),
                AssetOrigin::UserProvided,
            )));
        }
        debug!("No watermark image configured, searching assets directory");
    }

    // ── Step 2: render text ──────────────────────────────────────────────
    if let Some(text) = watermark_text(config, now.date_naive()) {
        match render_text_asset(config, &text, rasterizer, &now).await {
            Some(asset) => return Ok(Some(asset)),
            None => warn!(
                "Text watermark could not be generated, looking for an existing image in '{}'",
                config.assets_dir.display()
            ),
        }
    }

    // ── Step 3: discover ─────────────────────────────────────────────────
    let found = discover_image(&config.assets_dir)
        .map(|p| WatermarkAsset::new(p, AssetOrigin::Discovered));
    match &found {
        Some(asset) => info!("Using watermark image: {}", asset.path.display()),
        None => debug!("No image found in '{}'", config.assets_dir.display()),
    }
    Ok(found)
}

async fn render_text_asset<Tz>(
    config: &WatermarkConfig,
    text: &str,
    rasterizer: Arc<dyn TextRasterizer>,
    now: &DateTime<Tz>,
) -> Option<WatermarkAsset>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    if let Err(e) = tokio::fs::create_dir_all(&config.assets_dir).await {
        warn!(
            "Cannot create assets directory '{}': {}",
            config.assets_dir.display(),
            e
        );
        return None;
    }
    let stamp = now.format("%Y%m%d%H%M%S").to_string();
    let out = generated_asset_path(&config.assets_dir, &config.text, &stamp);
    let request = TextRenderRequest {
        text: text.to_string(),
        font_size: config.font_size as f32,
        color: config.text_color,
        padding: config.padding,
    };

    let target = out.clone();
    let rendered =
        tokio::task::spawn_blocking(move || rasterizer.render(&request, &target)).await;
    match rendered {
        Ok(Ok(_font)) => Some(WatermarkAsset::new(out, AssetOrigin::GeneratedFromText)),
        Ok(Err(e)) => {
            warn!("Text watermark rendering failed: {}", e);
            None
        }
        Err(e) => {
            warn!("Text watermark rendering task panicked: {}", e);
            None
        }
    }
}

/// Text drawn onto the watermark, or `None` when this run does not render
/// text.
pub fn watermark_text(config: &WatermarkConfig, today: NaiveDate) -> Option<String> {
    if config.kind != WatermarkKind::Text || config.text.is_empty() {
        return None;
    }
    if config.add_date {
        Some(format!("{} - {}", config.text, today.format("%Y-%m-%d")))
    } else {
        Some(config.text.clone())
    }
}

/// File-name-safe form of watermark text.
///
/// Alphanumerics, `_`, `-` and spaces are kept; every other character
/// becomes `_`. Whitespace runs collapse to a single `_` and the result is
/// capped at 80 characters. Empty input yields `"watermark"`.
pub fn sanitize_filename(value: &str) -> String {
    let replaced: String = value
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let joined = replaced.split_whitespace().collect::<Vec<_>>().join("_");
    let capped: String = joined.chars().take(MAX_FILENAME_STEM).collect();
    if capped.is_empty() {
        "watermark".to_string()
    } else {
        capped
    }
}

/// `<assets_dir>/<sanitized>_<stamp>.png`, with `_1`, `_2`, … appended until
/// the name is unused.
pub fn generated_asset_path(assets_dir: &Path, text: &str, stamp: &str) -> PathBuf {
    let base = format!("{}_{}", sanitize_filename(text), stamp);
    let first = assets_dir.join(format!("{base}.png"));
    if !first.exists() {
        return first;
    }
    (1u32..)
        .map(|n| assets_dir.join(format!("{base}_{n}.png")))
        .find(|p| !p.exists())
        .unwrap_or(first)
}

/// First image in `dir`, trying [`DISCOVERY_EXTENSIONS`] in order and the
/// directory listing order within each extension.
pub fn discover_image(dir: &Path) -> Option<PathBuf> {
    let entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    first_match(DISCOVERY_EXTENSIONS, |ext| {
        entries
            .iter()
            .find(|p| p.extension().and_then(|e| e.to_str()) == Some(*ext))
            .cloned()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RasterError;
    use std::fs;
    use tempfile::TempDir;

    /// Writes a placeholder file instead of drawing.
    struct StubRasterizer;

    impl TextRasterizer for StubRasterizer {
        fn render(&self, _req: &TextRenderRequest, out: &Path) -> Result<PathBuf, RasterError> {
            fs::write(out, b"png")?;
            Ok(PathBuf::from("stub.ttf"))
        }
    }

    struct NoFontRasterizer;

    impl TextRasterizer for NoFontRasterizer {
        fn render(&self, _req: &TextRenderRequest, _out: &Path) -> Result<PathBuf, RasterError> {
            Err(RasterError::NoUsableFont)
        }
    }

    fn config(tmp: &TempDir) -> WatermarkConfig {
        WatermarkConfig::builder()
            .assets_dir(tmp.path().join("watermarks"))
            .build()
            .unwrap()
    }

    fn fixed_now() -> DateTime<chrono::Utc> {
        chrono::Utc.with_ymd_and_hms(2025, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn sanitize_rules() {
        assert_eq!(sanitize_filename("Hello World"), "Hello_World");
        assert_eq!(sanitize_filename("  a  b  "), "a_b");
        assert_eq!(sanitize_filename("a/b:c"), "a_b_c");
        assert_eq!(sanitize_filename("机密 文件"), "机密_文件");
        assert_eq!(sanitize_filename(""), "watermark");
        assert_eq!(sanitize_filename("   "), "watermark");
        assert_eq!(sanitize_filename(&"x".repeat(100)).len(), 80);
    }

    #[test]
    fn watermark_text_appends_date() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        let mut c = WatermarkConfig::builder().text("Internal").build().unwrap();
        assert_eq!(watermark_text(&c, today).as_deref(), Some("Internal - 2025-03-09"));
        c.add_date = false;
        assert_eq!(watermark_text(&c, today).as_deref(), Some("Internal"));
        c.text.clear();
        assert_eq!(watermark_text(&c, today), None);
        c.text = "x".into();
        c.kind = WatermarkKind::None;
        assert_eq!(watermark_text(&c, today), None);
    }

    #[test]
    fn generated_path_skips_taken_names() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        let first = generated_asset_path(dir, "Draft", "20250309140507");
        assert_eq!(first, dir.join("Draft_20250309140507.png"));
        fs::write(&first, b"").unwrap();
        let second = generated_asset_path(dir, "Draft", "20250309140507");
        assert_eq!(second, dir.join("Draft_20250309140507_1.png"));
    }

    #[test]
    fn discovery_follows_extension_priority() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.jpg"), b"").unwrap();
        fs::write(tmp.path().join("a.svg"), b"").unwrap();
        assert_eq!(discover_image(tmp.path()), Some(tmp.path().join("b.jpg")));
        fs::write(tmp.path().join("c.png"), b"").unwrap();
        assert_eq!(discover_image(tmp.path()), Some(tmp.path().join("c.png")));
        assert_eq!(discover_image(&tmp.path().join("absent")), None);
    }

    #[tokio::test]
    async fn missing_user_image_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let mut c = config(&tmp);
        c.kind = WatermarkKind::Image;
        c.image = Some(tmp.path().join("nope.png"));
        let r = resolve_asset(&c, Arc::new(StubRasterizer)).await;
        assert!(matches!(r, Err(BatchError::WatermarkImageNotFound { .. })));
        assert!(!tmp.path().join("watermarks").exists());
    }

    #[tokio::test]
    async fn existing_user_image_is_returned_as_is() {
        let tmp = TempDir::new().unwrap();
        let logo = tmp.path().join("logo.png");
        fs::write(&logo, b"png").unwrap();
        let mut c = config(&tmp);
        c.kind = WatermarkKind::Image;
        c.image = Some(logo.clone());
        let asset = resolve_asset(&c, Arc::new(StubRasterizer)).await.unwrap().unwrap();
        assert_eq!(asset, WatermarkAsset::new(logo, AssetOrigin::UserProvided));
    }

    #[tokio::test]
    async fn text_is_rendered_into_assets_dir() {
        let tmp = TempDir::new().unwrap();
        let c = config(&tmp);
        let asset = resolve_asset_at(&c, Arc::new(StubRasterizer), fixed_now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(asset.origin, AssetOrigin::GeneratedFromText);
        assert_eq!(
            asset.path,
            tmp.path().join("watermarks/Watermark_20250309140507.png")
        );
        assert!(asset.path.exists());
    }

    #[tokio::test]
    async fn consecutive_text_resolutions_do_not_collide() {
        let tmp = TempDir::new().unwrap();
        let c = config(&tmp);
        let a = resolve_asset_at(&c, Arc::new(StubRasterizer), fixed_now())
            .await
            .unwrap()
            .unwrap();
        let b = resolve_asset_at(&c, Arc::new(StubRasterizer), fixed_now())
            .await
            .unwrap()
            .unwrap();
        assert_ne!(a.path, b.path);
        assert!(a.path.exists() && b.path.exists());
    }

    #[tokio::test]
    async fn render_failure_falls_back_to_discovery() {
        let tmp = TempDir::new().unwrap();
        let c = config(&tmp);
        fs::create_dir_all(&c.assets_dir).unwrap();
        let existing = c.assets_dir.join("company.png");
        fs::write(&existing, b"png").unwrap();

        let asset = resolve_asset(&c, Arc::new(NoFontRasterizer)).await.unwrap().unwrap();
        assert_eq!(asset, WatermarkAsset::new(existing, AssetOrigin::Discovered));
    }

    #[tokio::test]
    async fn nothing_available_is_none() {
        let tmp = TempDir::new().unwrap();
        let c = config(&tmp);
        assert_eq!(resolve_asset(&c, Arc::new(NoFontRasterizer)).await.unwrap(), None);
    }
}
