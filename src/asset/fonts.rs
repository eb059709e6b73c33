//! Font lookup for text watermarks.
//!
//! Three stages, first existing file wins:
//!
//! 1. the explicitly configured font (the CLI fills it from `WATERMARK_FONT`);
//! 2. a fixed list of well-known CJK/Unicode font locations;
//! 3. a file-name search of the platform font directories for names that
//!    contain one of [`FUZZY_KEYS`].
//!
//! CJK-capable fonts come first so that Chinese and Japanese watermark text
//! renders without tofu.

use crate::fallback::first_match;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Well-known font files, tried in order.
pub const CANDIDATE_FONTS: &[&str] = &[
    // Windows
    r"C:\Windows\Fonts\msyh.ttc",
    r"C:\Windows\Fonts\msyhbd.ttc",
    r"C:\Windows\Fonts\msyhl.ttc",
    r"C:\Windows\Fonts\simhei.ttf",
    r"C:\Windows\Fonts\simsun.ttc",
    r"C:\Windows\Fonts\simkai.ttf",
    r"C:\Windows\Fonts\simfang.ttf",
    r"C:\Windows\Fonts\SourceHanSansCN-Normal.otf",
    r"C:\Windows\Fonts\NotoSansCJK-Regular.ttc",
    r"C:\Windows\Fonts\AlibabaPuHuiTi-2-55-Regular.ttf",
    r"C:\Windows\Fonts\HarmonyOS_Sans_SC_Regular.ttf",
    // macOS
    "/System/Library/Fonts/PingFang.ttc",
    "/System/Library/Fonts/Hiragino Sans GB W3.ttc",
    "/Library/Fonts/Arial Unicode.ttf",
    // Linux
    "/usr/share/fonts/truetype/noto/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/opentype/noto/NotoSansCJKSC-Regular.otf",
];

/// Lower-case substrings that mark a font file as a usable fallback.
pub const FUZZY_KEYS: &[&str] = &[
    "msyh",
    "simhei",
    "simsun",
    "sourcehansans",
    "notosanscjk",
    "alibabapuhuiti",
    "harmonyos",
    "wqy",
    "droidsansfallback",
];

const FONT_EXTENSIONS: &[&str] = &["ttf", "ttc", "otf"];

/// Font directories searched in the fuzzy stage.
pub fn platform_font_dirs() -> Vec<PathBuf> {
    if cfg!(target_os = "windows") {
        vec![PathBuf::from(r"C:\Windows\Fonts")]
    } else if cfg!(target_os = "macos") {
        vec![
            PathBuf::from("/System/Library/Fonts"),
            PathBuf::from("/Library/Fonts"),
        ]
    } else {
        vec![
            PathBuf::from("/usr/share/fonts"),
            PathBuf::from("/usr/local/share/fonts"),
        ]
    }
}

/// Resolve a font with the built-in candidate list and platform directories.
pub fn resolve_font(explicit: Option<&Path>) -> Option<PathBuf> {
    let candidates: Vec<PathBuf> = CANDIDATE_FONTS.iter().map(PathBuf::from).collect();
    resolve_font_from(explicit, &candidates, &platform_font_dirs())
}

/// [`resolve_font`] with caller-supplied candidates and search directories.
pub fn resolve_font_from(
    explicit: Option<&Path>,
    candidates: &[PathBuf],
    search_dirs: &[PathBuf],
) -> Option<PathBuf> {
    let found = explicit
        .filter(|p| p.is_file())
        .map(Path::to_path_buf)
        .or_else(|| first_match(candidates, |p| p.is_file().then(|| p.clone())))
        .or_else(|| first_match(search_dirs, |d| fuzzy_search(d)));
    match &found {
        Some(p) => debug!("Watermark font: {}", p.display()),
        None => debug!("No watermark font found"),
    }
    found
}

/// First font file under `dir` whose name contains one of [`FUZZY_KEYS`].
///
/// Entries are visited in file-name order so the pick is stable.
fn fuzzy_search(dir: &Path) -> Option<PathBuf> {
    if !dir.is_dir() {
        return None;
    }
    WalkDir::new(dir)
        .max_depth(4)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .find(|e| is_preferred_font(e.path()))
        .map(|e| e.into_path())
}

fn is_preferred_font(path: &Path) -> bool {
    let has_font_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| FONT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    has_font_ext && FUZZY_KEYS.iter().any(|k| name.contains(k))
}
