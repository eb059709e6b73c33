//! Markdown → PDF rendering through a headless Chromium-family browser.
//!
//! ## Steps for one file
//!
//! 1. Read the source; optionally strip front matter ([`crate::title`]).
//! 2. Rewrite relative image/link targets to absolute `file://` URLs rooted
//!    at the source file's directory, so the page resolves them no matter
//!    where the HTML lives.
//! 3. Fill the page template ([`crate::template`]) and write it to a
//!    temporary `.html` next to the output. The temp file is removed when the
//!    guard drops, on success and on failure alike.
//! 4. Ask an [`HtmlPrinter`] to print the page to PDF.
//!
//! The browser gets `--virtual-time-budget=<ready_timeout_ms>`: client-side
//! rendering has that long to finish before the snapshot is taken. Running
//! out of budget is not an error. The page's `data-ready` attribute is never
//! read back here; it only helps when debugging the page in a real browser.

use crate::config::WatermarkConfig;
use crate::error::{FileError, ToolError};
use crate::process::{CommandRunner, ExternalTool, LocatedTool};
use crate::template;
use crate::title;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Browser executables tried when none is configured.
pub const BROWSER_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "microsoft-edge",
    "msedge",
];

/// The headless browser, probed with `--version`.
///
/// An explicit path replaces the candidate list entirely.
pub fn browser_tool(explicit: Option<&Path>) -> ExternalTool {
    let candidates = match explicit {
        Some(p) => vec![p.to_string_lossy().into_owned()],
        None => BROWSER_CANDIDATES.iter().map(|s| s.to_string()).collect(),
    };
    ExternalTool {
        label: "Headless browser".into(),
        candidates,
        probe_args: vec!["--version".into()],
        hint: "Install Chromium or Google Chrome, or pass --browser <path> (MDPDF_BROWSER)".into(),
    }
}

/// Capability: print a local HTML file to PDF.
#[async_trait]
pub trait HtmlPrinter: Send + Sync {
    async fn print_to_pdf(&self, html: &Path, pdf: &Path) -> Result<(), ToolError>;
}

/// [`HtmlPrinter`] that shells out to Chromium's `--print-to-pdf`.
pub struct ChromiumPrinter {
    browser: LocatedTool,
    runner: Arc<dyn CommandRunner>,
    ready_timeout_ms: u64,
    timeout: Duration,
}

impl ChromiumPrinter {
    pub fn new(browser: LocatedTool, runner: Arc<dyn CommandRunner>, config: &WatermarkConfig) -> Self {
        Self {
            browser,
            runner,
            ready_timeout_ms: config.ready_timeout_ms,
            timeout: Duration::from_secs(config.render_timeout_secs),
        }
    }

    pub fn args(&self, html: &Path, pdf: &Path) -> Vec<String> {
        vec![
            "--headless".into(),
            "--disable-gpu".into(),
            "--allow-file-access-from-files".into(),
            "--no-pdf-header-footer".into(),
            "--run-all-compositor-stages-before-draw".into(),
            format!("--virtual-time-budget={}", self.ready_timeout_ms),
            format!("--print-to-pdf={}", absolutize(pdf).display()),
            file_url(&absolutize(html)),
        ]
    }
}

#[async_trait]
impl HtmlPrinter for ChromiumPrinter {
    async fn print_to_pdf(&self, html: &Path, pdf: &Path) -> Result<(), ToolError> {
        let args = self.args(html, pdf);
        self.browser
            .invoke(self.runner.as_ref(), &args, Some(self.timeout))
            .await?;
        Ok(())
    }
}

/// Render one Markdown file to `out_pdf`.
pub async fn render_markdown(
    printer: &dyn HtmlPrinter,
    config: &WatermarkConfig,
    source: &Path,
    out_pdf: &Path,
) -> Result<(), FileError> {
    let text = tokio::fs::read_to_string(source)
        .await
        .map_err(|e| FileError::ReadFailed {
            path: source.to_path_buf(),
            detail: e.to_string(),
        })?;

    let text = if config.filter_front_matter {
        title::remove_front_matter(&text)
    } else {
        text
    };
    let base_dir = source
        .parent()
        .map(absolutize)
        .unwrap_or_else(|| absolutize(Path::new(".")));
    let text = rewrite_relative_links(&text, &base_dir);

    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let html = template::render_html(&stem, &text, config.ready_timeout_ms);

    let out_dir = out_pdf
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let page = tokio::task::spawn_blocking(move || write_page(&out_dir, &stem, &html))
        .await
        .map_err(|e| render_failed(format!("temporary HTML task failed: {e}")))??;

    let printed = printer.print_to_pdf(page.path(), out_pdf).await;
    match tokio::task::spawn_blocking(move || page.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Temporary HTML not removed: {}", e),
        Err(e) => debug!("Temporary HTML cleanup task failed: {}", e),
    }
    printed.map_err(|e| render_failed(e.to_string()))?;

    match tokio::fs::metadata(out_pdf).await {
        Ok(m) if m.len() > 0 => {
            info!(
                "Converted {} -> {}",
                source.display(),
                out_pdf.file_name().unwrap_or_default().to_string_lossy()
            );
            Ok(())
        }
        _ => Err(render_failed(format!(
            "renderer reported success but '{}' is missing or empty",
            out_pdf.display()
        ))),
    }
}

/// Write `html` to a hidden temporary file in `dir`; removed when dropped.
fn write_page(dir: &Path, stem: &str, html: &str) -> Result<NamedTempFile, FileError> {
    let mut page = tempfile::Builder::new()
        .prefix(&format!(".{stem}-"))
        .suffix(".html")
        .tempfile_in(dir)
        .map_err(|e| render_failed(format!("cannot create temporary HTML: {e}")))?;
    page.write_all(html.as_bytes())
        .and_then(|_| page.flush())
        .map_err(|e| render_failed(format!("cannot write temporary HTML: {e}")))?;
    Ok(page)
}

fn render_failed(detail: String) -> FileError {
    FileError::RenderFailed { detail }
}

// ── Link rewriting ───────────────────────────────────────────────────────

/// `[text](target ...)` and `![alt](target ...)`.
static INLINE_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(!?\[[^\]]*\]\(\s*)(<[^>]*>|[^)\s]+)").expect("valid inline link regex")
});

/// A whole line that is a `[label]: target "title"` reference definition.
///
/// Footnote labels (`[^1]:`) and prose that merely starts like a definition
/// do not match.
static REFERENCE_DEF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^\s{0,3}\[[^\]^][^\]]*\]:\s*(<[^>]*>|\S+)(?:\s+(?:"[^"]*"|'[^']*'|\([^)]*\)))?\s*$"#,
    )
    .expect("valid reference regex")
});

/// `src="..."` / `href='...'` in raw HTML.
static HTML_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(\b(?:src|href)\s*=\s*["'])([^"']*)"#).expect("valid attribute regex")
});

/// Targets that are left alone: any URL scheme, a fragment, or an absolute path.
static NON_RELATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:[a-z][a-z0-9+.\-]*:|#|/|\\)").expect("valid scheme regex")
});

/// Rewrite relative link and image targets to `file://` URLs under `base_dir`.
///
/// Lines inside fenced code blocks and text inside inline code spans are
/// left untouched. Remote URLs (`http:`,
/// `https:`, `data:`, `mailto:`, `tel:`, `ftp:`, `file:`, …), anchors and
/// absolute paths are kept as written.
pub fn rewrite_relative_links(markdown: &str, base_dir: &Path) -> String {
    let mut in_fence = false;
    let lines: Vec<Cow<'_, str>> = markdown
        .split('\n')
        .map(|line| {
            if line.trim().starts_with("```") {
                in_fence = !in_fence;
                return Cow::Borrowed(line);
            }
            if in_fence {
                return Cow::Borrowed(line);
            }
            rewrite_line(line, base_dir)
        })
        .collect();
    lines.join("\n")
}

fn rewrite_line<'a>(line: &'a str, base_dir: &Path) -> Cow<'a, str> {
    if let Some(target) = REFERENCE_DEF.captures(line).and_then(|c| c.get(1)) {
        return Cow::Owned(format!(
            "{}{}{}",
            &line[..target.start()],
            rewrite_target(target.as_str(), base_dir),
            &line[target.end()..]
        ));
    }
    if !line.contains('`') {
        return rewrite_inline(line, base_dir);
    }
    let mut out = String::with_capacity(line.len());
    for (is_code, piece) in code_spans(line) {
        if is_code {
            out.push_str(piece);
        } else {
            out.push_str(&rewrite_inline(piece, base_dir));
        }
    }
    Cow::Owned(out)
}

/// Split `line` into `(is_code, text)` pieces on inline code spans.
///
/// A span opens with a run of backticks and closes at the next run of the
/// same length; an unmatched run is literal text.
fn code_spans(line: &str) -> Vec<(bool, &str)> {
    let bytes = line.as_bytes();
    let run_end = |mut i: usize| {
        while i < bytes.len() && bytes[i] == b'`' {
            i += 1;
        }
        i
    };

    let mut pieces = Vec::new();
    let (mut start, mut i) = (0, 0);
    while i < bytes.len() {
        if bytes[i] != b'`' {
            i += 1;
            continue;
        }
        let open = i;
        i = run_end(i);
        let len = i - open;

        let mut j = i;
        let mut close = None;
        while j < bytes.len() {
            if bytes[j] == b'`' {
                let end = run_end(j);
                if end - j == len {
                    close = Some(end);
                    break;
                }
                j = end;
            } else {
                j += 1;
            }
        }
        if let Some(end) = close {
            if open > start {
                pieces.push((false, &line[start..open]));
            }
            pieces.push((true, &line[open..end]));
            start = end;
            i = end;
        }
    }
    if start < line.len() {
        pieces.push((false, &line[start..]));
    }
    pieces
}

/// Inline links and HTML attributes in text known to be outside code.
fn rewrite_inline<'a>(text: &'a str, base_dir: &Path) -> Cow<'a, str> {
    let swap = |caps: &Captures<'_>| format!("{}{}", &caps[1], rewrite_target(&caps[2], base_dir));
    let mut out = Cow::Borrowed(text);
    for re in [&*INLINE_LINK, &*HTML_ATTR] {
        let next = match re.replace_all(&out, swap) {
            Cow::Owned(s) => Some(s),
            Cow::Borrowed(_) => None,
        };
        if let Some(s) = next {
            out = Cow::Owned(s);
        }
    }
    out
}

fn rewrite_target(target: &str, base_dir: &Path) -> String {
    let (inner, bracketed) = match target.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
        Some(t) => (t, true),
        None => (target, false),
    };
    if inner.is_empty() || NON_RELATIVE.is_match(inner) {
        return target.to_string();
    }

    let split = inner.find(|c| c == '?' || c == '#').unwrap_or(inner.len());
    let (path_part, suffix) = inner.split_at(split);
    let decoded = urlencoding::decode(path_part).unwrap_or(Cow::Borrowed(path_part));
    let url = format!("{}{}", file_url(&normalize(&base_dir.join(decoded.as_ref()))), suffix);
    if bracketed {
        format!("<{url}>")
    } else {
        url
    }
}

/// `file://` URL for an absolute path, percent-encoding each segment.
pub fn file_url(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    let encoded = raw
        .split('/')
        .map(|seg| {
            if is_drive_letter(seg) {
                seg.to_string()
            } else {
                urlencoding::encode(seg).into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("/");
    if encoded.starts_with('/') {
        format!("file://{encoded}")
    } else {
        format!("file:///{encoded}")
    }
}

fn is_drive_letter(seg: &str) -> bool {
    let b = seg.as_bytes();
    b.len() == 2 && b[0].is_ascii_alphabetic() && b[1] == b':'
}

/// Lexically drop `.` and resolve `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn absolutize(path: &Path) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| normalize(&cwd.join(path)))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CommandOutput;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn base() -> PathBuf {
        PathBuf::from("/docs/guide")
    }

    #[test]
    fn rewrites_relative_image_and_link() {
        let md = "See ![diagram](./img/arch.png) and [spec](../notes/spec.md#intro).";
        let out = rewrite_relative_links(md, &base());
        assert_eq!(
            out,
            "See ![diagram](file:///docs/guide/img/arch.png) and \
             [spec](file:///docs/notes/spec.md#intro)."
        );
    }

    #[test]
    fn keeps_remote_and_special_targets() {
        let md = "[a](https://x.io) [b](mailto:me@x.io) [c](#top) ![d](data:image/png;base64,AA) \
                  [e](/abs/path.png) [f](tel:123) [g](ftp://h/f) [h](file:///x)";
        assert_eq!(rewrite_relative_links(md, &base()), md);
    }

    #[test]
    fn keeps_link_title_and_encodes_spaces() {
        let md = r#"![shot](my%20shot.png "Screen")"#;
        let out = rewrite_relative_links(md, &base());
        assert_eq!(
            out,
            r#"![shot](file:///docs/guide/my%20shot.png "Screen")"#
        );
    }

    #[test]
    fn rewrites_html_attributes_and_reference_definitions() {
        let md = "<img src=\"pic.png\" width=\"10\">\n[ref]: files/data.csv\n<a href='https://ok'>x</a>";
        let out = rewrite_relative_links(md, &base());
        assert_eq!(
            out,
            "<img src=\"file:///docs/guide/pic.png\" width=\"10\">\n\
             [ref]: file:///docs/guide/files/data.csv\n\
             <a href='https://ok'>x</a>"
        );
    }

    #[test]
    fn footnotes_and_prose_are_not_reference_definitions() {
        let md = "Text[^1].\n\n[^1]: See the appendix for details.\n[note]: read this first";
        assert_eq!(rewrite_relative_links(md, &base()), md);
    }

    #[test]
    fn reference_definition_keeps_its_title() {
        let md = "[logo]: img/logo.png \"Company logo\"";
        assert_eq!(
            rewrite_relative_links(md, &base()),
            "[logo]: file:///docs/guide/img/logo.png \"Company logo\""
        );
    }

    #[test]
    fn inline_code_spans_are_untouched() {
        let md = "Write `![x](a.png)` to get ![x](a.png), or ``[l](`b`.md)``.";
        assert_eq!(
            rewrite_relative_links(md, &base()),
            "Write `![x](a.png)` to get ![x](file:///docs/guide/a.png), or ``[l](`b`.md)``."
        );
    }

    #[test]
    fn unmatched_backtick_is_literal() {
        let md = "a ` stray ![x](a.png)";
        assert_eq!(
            rewrite_relative_links(md, &base()),
            "a ` stray ![x](file:///docs/guide/a.png)"
        );
    }

    #[test]
    fn fenced_code_is_untouched() {
        let md = "```md\n![x](a.png)\n```\n![y](b.png)";
        let out = rewrite_relative_links(md, &base());
        assert_eq!(out, "```md\n![x](a.png)\n```\n![y](file:///docs/guide/b.png)");
    }

    #[test]
    fn file_url_handles_unix_and_windows_paths() {
        assert_eq!(file_url(Path::new("/a b/c.html")), "file:///a%20b/c.html");
        assert_eq!(file_url(Path::new(r"C:\Docs\x.md")), "file:///C:/Docs/x.md");
    }

    #[test]
    fn browser_tool_prefers_explicit_path() {
        let t = browser_tool(Some(Path::new("/opt/chrome/chrome")));
        assert_eq!(t.candidates, vec!["/opt/chrome/chrome"]);
        assert_eq!(browser_tool(None).candidates.len(), BROWSER_CANDIDATES.len());
    }

    #[test]
    fn chromium_args_include_budget_and_output() {
        struct Nop;
        #[async_trait]
        impl CommandRunner for Nop {
            async fn run(
                &self,
                _p: &str,
                _a: &[String],
                _t: Option<Duration>,
            ) -> Result<CommandOutput, ToolError> {
                Ok(CommandOutput::default())
            }
        }
        let printer = ChromiumPrinter::new(
            LocatedTool {
                label: "Headless browser".into(),
                program: "chromium".into(),
            },
            Arc::new(Nop),
            &WatermarkConfig::default(),
        );
        let args = printer.args(Path::new("/tmp/p.html"), Path::new("/tmp/out.pdf"));
        assert!(args.contains(&"--headless".to_string()));
        assert!(args.contains(&"--virtual-time-budget=5000".to_string()));
        assert!(args.iter().any(|a| a.starts_with("--print-to-pdf=") && a.ends_with("out.pdf")));
        assert!(args.last().unwrap().starts_with("file:///"));
    }

    /// Records the HTML it was given and writes a fake PDF.
    struct CapturingPrinter {
        html: Mutex<Option<(PathBuf, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl HtmlPrinter for CapturingPrinter {
        async fn print_to_pdf(&self, html: &Path, pdf: &Path) -> Result<(), ToolError> {
            let body = std::fs::read_to_string(html)?;
            *self.html.lock().unwrap() = Some((html.to_path_buf(), body));
            if self.fail {
                return Err(ToolError::NonZeroExit {
                    program: "chromium".into(),
                    code: Some(1),
                    stderr: "crashed".into(),
                });
            }
            std::fs::write(pdf, b"%PDF-1.7")?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn render_writes_pdf_and_removes_temp_html() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("doc.md");
        std::fs::write(&src, "---\ntitle: \"Doc\"\n---\nHello ![i](i.png)").unwrap();
        let out = tmp.path().join("out");
        std::fs::create_dir_all(&out).unwrap();
        let pdf = out.join("doc.pdf");

        let printer = CapturingPrinter {
            html: Mutex::new(None),
            fail: false,
        };
        let config = WatermarkConfig::builder()
            .filter_front_matter(true)
            .build()
            .unwrap();
        render_markdown(&printer, &config, &src, &pdf).await.unwrap();

        assert!(pdf.exists());
        let (html_path, html) = printer.html.lock().unwrap().clone().unwrap();
        assert_eq!(html_path.parent(), Some(out.as_path()));
        assert!(!html_path.exists(), "temporary HTML must be removed");
        assert!(html.contains(r##"# Doc\n\nHello"##));
        assert!(html.contains("file:///"));
        assert!(!html.contains("title: "));
    }

    #[tokio::test]
    async fn render_failure_is_per_file_and_cleans_up() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("doc.md");
        std::fs::write(&src, "# Doc").unwrap();
        let pdf = tmp.path().join("doc.pdf");
        let printer = CapturingPrinter {
            html: Mutex::new(None),
            fail: true,
        };
        let err = render_markdown(&printer, &WatermarkConfig::default(), &src, &pdf)
            .await
            .unwrap_err();
        assert!(matches!(err, FileError::RenderFailed { .. }));
        let (html_path, _) = printer.html.lock().unwrap().clone().unwrap();
        assert!(!html_path.exists());
        assert!(!pdf.exists());
    }

    #[tokio::test]
    async fn unreadable_source_is_read_failure() {
        let tmp = TempDir::new().unwrap();
        let printer = CapturingPrinter {
            html: Mutex::new(None),
            fail: false,
        };
        let err = render_markdown(
            &printer,
            &WatermarkConfig::default(),
            &tmp.path().join("missing.md"),
            &tmp.path().join("missing.pdf"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FileError::ReadFailed { .. }));
    }
}
