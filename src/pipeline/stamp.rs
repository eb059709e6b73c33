//! PDF watermarking through the external `watermark` command-line tool.
//!
//! Argument grammar:
//!
//! ```text
//! <grid|insert> <source.pdf> <asset> -s <dest.pdf> -o <opacity> -a <angle>
//!     -is <image_scale> --verbose False
//!     grid:   -h <horizontal_boxes> -v <vertical_boxes> [-m]
//!     insert: -x <x> -y <y> -ha <left|center|right>
//!     [--unselectable] [--save-as-image]
//! ```
//!
//! `dest` may equal `source`; the tool then overwrites in place.

use crate::config::{WatermarkConfig, WatermarkStyle};
use crate::error::{FileError, ToolError};
use crate::process::{CommandRunner, ExternalTool, LocatedTool};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// The watermark tool, probed with `--help` under its known names.
pub fn watermark_tool() -> ExternalTool {
    let venv = std::env::var_os("VIRTUAL_ENV").map(PathBuf::from);
    ExternalTool {
        label: "PDF watermark tool".into(),
        candidates: watermark_candidates(venv.as_deref()),
        probe_args: vec!["--help".into()],
        hint: "Install it with: pip install pdf-watermark".into(),
    }
}

/// `watermark`, `pdf-watermark`, then the copy inside an active virtualenv.
pub fn watermark_candidates(venv: Option<&Path>) -> Vec<String> {
    let mut names = vec!["watermark".to_string(), "pdf-watermark".to_string()];
    if let Some(venv) = venv {
        let exe = if cfg!(windows) {
            venv.join("Scripts").join("watermark.exe")
        } else {
            venv.join("bin").join("watermark")
        };
        names.push(exe.to_string_lossy().into_owned());
    }
    names
}

/// Build the tool's argument vector for one file.
pub fn build_args(config: &WatermarkConfig, source: &Path, dest: &Path, asset: &Path) -> Vec<String> {
    let mut args = vec![
        config.watermark_type.as_arg().to_string(),
        source.display().to_string(),
        asset.display().to_string(),
        "-s".into(),
        dest.display().to_string(),
        "-o".into(),
        config.opacity.to_string(),
        "-a".into(),
        config.angle.to_string(),
        "-is".into(),
        config.image_scale.to_string(),
        "--verbose".into(),
        "False".into(),
    ];
    match config.watermark_type {
        WatermarkStyle::Grid => {
            args.extend([
                "-h".into(),
                config.horizontal_boxes.to_string(),
                "-v".into(),
                config.vertical_boxes.to_string(),
            ]);
            if config.margin {
                args.push("-m".into());
            }
        }
        WatermarkStyle::Insert => {
            args.extend([
                "-x".into(),
                config.x.to_string(),
                "-y".into(),
                config.y.to_string(),
                "-ha".into(),
                config.horizontal_alignment.as_arg().to_string(),
            ]);
        }
    }
    if config.unselectable {
        args.push("--unselectable".into());
    }
    if config.save_as_image {
        args.push("--save-as-image".into());
    }
    args
}

/// Stamp `asset` onto `source`, writing `dest`.
///
/// A non-zero exit is a per-file failure whose reason is the tool's stderr.
pub async fn stamp_pdf(
    tool: &LocatedTool,
    runner: &dyn CommandRunner,
    config: &WatermarkConfig,
    source: &Path,
    dest: &Path,
    asset: &Path,
) -> Result<(), FileError> {
    let args = build_args(config, source, dest, asset);
    let timeout = Duration::from_secs(config.render_timeout_secs);
    match tool.invoke(runner, &args, Some(timeout)).await {
        Ok(_) => {
            info!("Watermarked {} -> {}", file_name(source), file_name(dest));
            Ok(())
        }
        Err(ToolError::NonZeroExit { code, stderr, .. }) => {
            Err(FileError::WatermarkFailed { code, stderr })
        }
        Err(other) => Err(FileError::WatermarkFailed {
            code: None,
            stderr: other.to_string(),
        }),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
