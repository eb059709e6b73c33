//! Per-file pipeline stages.
//!
//! Each submodule implements one step; [`crate::batch`] wires them together.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ stamp ──▶ rename        (Markdown)
//! input ──────────────▶ stamp                  (PDF)
//!            raster ──▶ asset ──▶ cleanup      (once per run)
//! ```
//!
//! 1. [`input`]   — list the documents of one kind in the input directory
//! 2. [`raster`]  — draw the watermark text into a transparent PNG
//! 3. [`render`]  — Markdown → HTML → PDF through a headless browser
//! 4. [`stamp`]   — drive the external PDF watermarking tool
//! 5. [`rename`]  — rename a rendered PDF after its first H1
//! 6. [`cleanup`] — delete a text-generated asset when the run ends

pub mod cleanup;
pub mod input;
pub mod raster;
pub mod rename;
pub mod render;
pub mod stamp;
