//! Removal of text-generated watermark assets after a run.
//!
//! [`AssetCleanup`] is created as soon as the asset is resolved and deletes
//! it on drop, so the asset goes away on every exit path of the run: normal
//! completion, an early `?` return, or a panic unwinding through the loop.
//! Only assets that were rendered from text *and* live directly in the assets
//! directory are ever deleted.

use crate::output::{AssetOrigin, WatermarkAsset};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Drop guard that deletes a generated asset.
#[derive(Debug)]
pub struct AssetCleanup {
    asset: Option<WatermarkAsset>,
    assets_dir: PathBuf,
}

impl AssetCleanup {
    pub fn new(asset: Option<WatermarkAsset>, assets_dir: impl Into<PathBuf>) -> Self {
        Self {
            asset,
            assets_dir: assets_dir.into(),
        }
    }

    /// Delete now instead of on drop.
    pub fn run(mut self) {
        self.cleanup();
    }

    fn cleanup(&mut self) {
        let Some(asset) = self.asset.take() else {
            return;
        };
        if !is_disposable(&asset, &self.assets_dir) {
            debug!("Keeping watermark asset {}", asset.path.display());
            return;
        }
        match std::fs::remove_file(&asset.path) {
            Ok(()) => info!("Removed generated watermark {}", asset.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove generated watermark {}: {}",
                asset.path.display(),
                e
            ),
        }
    }
}

impl Drop for AssetCleanup {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Generated from text and located directly inside `assets_dir`.
pub fn is_disposable(asset: &WatermarkAsset, assets_dir: &Path) -> bool {
    if asset.origin != AssetOrigin::GeneratedFromText {
        return false;
    }
    let parent = match asset.path.parent() {
        Some(p) => canonical(p),
        None => return false,
    };
    parent == canonical(assets_dir)
}

fn canonical(p: &Path) -> PathBuf {
    std::fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf())
}
