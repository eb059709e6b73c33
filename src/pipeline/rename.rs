//! Rename a rendered PDF after its source's first H1.
//!
//! Best-effort: when there is no title or the rename fails, the output
//! keeps its original name and the file's outcome is unaffected.

use crate::title;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Rename `output` to `<title>.pdf` in the same directory and return the
/// final path (unchanged when nothing was renamed).
pub async fn rename_by_title(source: &Path, output: &Path) -> PathBuf {
    let src = source.to_path_buf();
    let title = match tokio::task::spawn_blocking(move || title::extract_h1_title(&src)).await {
        Ok(Some(t)) => t,
        Ok(None) => return output.to_path_buf(),
        Err(e) => {
            warn!("Title extraction task failed for {}: {}", source.display(), e);
            return output.to_path_buf();
        }
    };

    let dir = output.parent().unwrap_or_else(|| Path::new("."));
    let target = title_target(dir, &title, output);
    if target == output {
        return target;
    }
    match tokio::fs::rename(output, &target).await {
        Ok(()) => {
            info!("Renamed PDF: {} -> {}", display_name(output), display_name(&target));
            target
        }
        Err(e) => {
            warn!("Failed to rename {}: {}", output.display(), e);
            output.to_path_buf()
        }
    }
}

/// First free name among `<title>.pdf`, `<title>_1.pdf`, `<title>_2.pdf`, …
///
/// `current` counts as free: a file already carrying the target name is left
/// where it is.
pub fn title_target(dir: &Path, title: &str, current: &Path) -> PathBuf {
    let first = dir.join(format!("{title}.pdf"));
    let free = |p: &PathBuf| p.as_path() == current || !p.exists();
    if free(&first) {
        return first;
    }
    (1u32..)
        .map(|n| dir.join(format!("{title}_{n}.pdf")))
        .find(|p| free(p))
        .unwrap_or(first)
}

fn display_name(p: &Path) -> String {
    p.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
