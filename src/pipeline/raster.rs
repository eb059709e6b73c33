//! Text → transparent PNG rendering for text watermarks.
//!
//! The canvas is the ink bounding box of the laid-out text plus `padding` on
//! every side, so the watermark tool scales exactly the visible glyphs.
//! Rendering is CPU-bound and synchronous; callers on the async side go
//! through `spawn_blocking`.

use crate::asset::fonts;
use crate::config::Rgba;
use crate::error::RasterError;
use ab_glyph::{point, Font, FontVec, GlyphId, PxScale, Rect, ScaleFont};
use image::RgbaImage;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRenderRequest {
    pub text: String,
    pub font_size: f32,
    pub color: Rgba,
    pub padding: u32,
}

/// Capability: render UTF-8 text to a transparent image file.
///
/// Returns the font file that was used, for logging.
pub trait TextRasterizer: Send + Sync {
    fn render(&self, request: &TextRenderRequest, out: &Path) -> Result<PathBuf, RasterError>;
}

/// [`TextRasterizer`] backed by `ab_glyph`, with font lookup through
/// [`fonts::resolve_font`].
#[derive(Debug, Clone, Default)]
pub struct GlyphRasterizer {
    /// Tried before the built-in candidates.
    pub font: Option<PathBuf>,
}

impl GlyphRasterizer {
    pub fn new(font: Option<PathBuf>) -> Self {
        Self { font }
    }
}

impl TextRasterizer for GlyphRasterizer {
    fn render(&self, request: &TextRenderRequest, out: &Path) -> Result<PathBuf, RasterError> {
        if request.text.is_empty() {
            return Err(RasterError::EmptyText);
        }
        let font_path = fonts::resolve_font(self.font.as_deref()).ok_or(RasterError::NoUsableFont)?;
        let font = load_font(&font_path)?;

        let image = render_text(&font, request);
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)?;
        }
        image.save_with_format(out, image::ImageFormat::Png)?;

        info!(
            "Text watermark image generated: {} (font: {})",
            out.display(),
            font_path.display()
        );
        Ok(font_path)
    }
}

/// Load a TrueType/OpenType font; collections use their first face.
pub fn load_font(path: &Path) -> Result<FontVec, RasterError> {
    let data = std::fs::read(path).map_err(|e| RasterError::FontUnreadable {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    FontVec::try_from_vec_and_index(data, 0).map_err(|e| RasterError::FontUnreadable {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

/// Draw `request.text` onto a tightly sized transparent canvas.
pub fn render_text<F: Font>(font: &F, request: &TextRenderRequest) -> RgbaImage {
    let scale = PxScale::from(request.font_size);
    let scaled = font.as_scaled(scale);
    let glyphs = layout(font, &request.text, scale);

    // Ink bounds at the layout origin; an all-whitespace string has none.
    let ink = glyphs
        .iter()
        .filter_map(|g| font.outline_glyph(g.clone()))
        .map(|o| o.px_bounds())
        .reduce(union);
    let (min_x, min_y, ink_w, ink_h) = match ink {
        Some(r) => (r.min.x, r.min.y, r.width(), r.height()),
        None => {
            let advance: f32 = glyphs
                .last()
                .map(|g| g.position.x + scaled.h_advance(g.id))
                .unwrap_or(0.0);
            (0.0, 0.0, advance, scaled.height())
        }
    };

    let pad = request.padding as f32;
    let width = (ink_w.ceil() + 2.0 * pad).max(1.0) as u32;
    let height = (ink_h.ceil() + 2.0 * pad).max(1.0) as u32;
    debug!("Text watermark canvas {}x{}", width, height);

    let mut image = RgbaImage::new(width, height);
    let color = request.color;
    let dx = pad - min_x;
    let dy = pad - min_y;

    for mut glyph in glyphs {
        glyph.position = point(glyph.position.x + dx, glyph.position.y + dy);
        let Some(outlined) = font.outline_glyph(glyph) else {
            continue;
        };
        let bounds = outlined.px_bounds();
        outlined.draw(|px, py, coverage| {
            let x = px as i32 + bounds.min.x as i32;
            let y = py as i32 + bounds.min.y as i32;
            if x < 0 || y < 0 || x >= width as i32 || y >= height as i32 {
                return;
            }
            let top = image::Rgba([color.r, color.g, color.b, (coverage * color.a as f32) as u8]);
            let existing = *image.get_pixel(x as u32, y as u32);
            image.put_pixel(x as u32, y as u32, blend_pixels(existing, top));
        });
    }
    image
}

/// Position glyphs on one line with the baseline at `ascent`, applying kerning.
fn layout<F: Font>(font: &F, text: &str, scale: PxScale) -> Vec<ab_glyph::Glyph> {
    let scaled = font.as_scaled(scale);
    let mut glyphs = Vec::with_capacity(text.len());
    let mut cursor_x = 0.0f32;
    let mut prev: Option<GlyphId> = None;
    for c in text.chars() {
        let id = scaled.glyph_id(c);
        if let Some(p) = prev {
            cursor_x += scaled.kern(p, id);
        }
        glyphs.push(id.with_scale_and_position(scale, point(cursor_x, scaled.ascent())));
        cursor_x += scaled.h_advance(id);
        prev = Some(id);
    }
    glyphs
}

fn union(a: Rect, b: Rect) -> Rect {
    Rect {
        min: point(a.min.x.min(b.min.x), a.min.y.min(b.min.y)),
        max: point(a.max.x.max(b.max.x), a.max.y.max(b.max.y)),
    }
}

/// Alpha-composite `top` over `bottom`.
fn blend_pixels(bottom: image::Rgba<u8>, top: image::Rgba<u8>) -> image::Rgba<u8> {
    let ta = top[3] as f32 / 255.0;
    let ba = bottom[3] as f32 / 255.0;
    let out_a = ta + ba * (1.0 - ta);
    if out_a < 0.001 {
        return image::Rgba([0, 0, 0, 0]);
    }
    let mix = |t: u8, b: u8| -> u8 {
        let v = (t as f32 * ta + b as f32 * ba * (1.0 - ta)) / out_a;
        v.round().clamp(0.0, 255.0) as u8
    };
    image::Rgba([
        mix(top[0], bottom[0]),
        mix(top[1], bottom[1]),
        mix(top[2], bottom[2]),
        (out_a * 255.0).round() as u8,
    ])
}
