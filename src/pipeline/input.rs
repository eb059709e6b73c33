//! Input discovery: which documents a run processes.
//!
//! Only the top level of the input directory is scanned. Extensions are
//! matched case-insensitively (`.pdf`; `.md` / `.markdown`) and results are
//! sorted by path so every run visits files in the same order.

use crate::error::BatchError;
use crate::output::FileKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Files of `kind` directly inside `dir`, sorted.
pub fn discover(dir: &Path, kind: FileKind) -> Result<Vec<PathBuf>, BatchError> {
    if !dir.is_dir() {
        return Err(BatchError::InputDirNotFound {
            path: dir.to_path_buf(),
        });
    }
    let entries = std::fs::read_dir(dir).map_err(|e| {
        BatchError::Internal(format!("cannot list '{}': {}", dir.display(), e))
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && FileKind::from_path(p) == Some(kind))
        .collect();
    files.sort();
    debug!("Discovered {} {} file(s) in '{}'", files.len(), kind, dir.display());
    Ok(files)
}

/// Split an explicit file list into `(pdfs, markdown)`, each sorted.
///
/// Files with other extensions, or that do not exist, are skipped with a
/// warning.
pub fn partition(files: &[PathBuf]) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let mut pdfs = Vec::new();
    let mut markdown = Vec::new();
    for file in files {
        if !file.is_file() {
            warn!("Skipping '{}': not a file", file.display());
            continue;
        }
        match FileKind::from_path(file) {
            Some(FileKind::Pdf) => pdfs.push(file.clone()),
            Some(FileKind::Markdown) => markdown.push(file.clone()),
            None => warn!("Skipping '{}': not a PDF or Markdown file", file.display()),
        }
    }
    pdfs.sort();
    markdown.sort();
    (pdfs, markdown)
}
