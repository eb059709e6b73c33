//! Front-matter stripping and H1 title extraction for Markdown sources.
//!
//! Front matter here is the block between the first two lines that are
//! exactly `---` (surrounding whitespace ignored). It is not parsed as YAML:
//! the only field looked at is a `title: "..."` line with a double-quoted
//! value. Single-quoted or bare titles are not recognised.
//!
//! Both the H1 check and the title scan skip fenced code blocks, tracked by a
//! toggle on any line whose trimmed form starts with three backticks.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::debug;

static TITLE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^title\s*:\s*"(.*?)"\s*$"#).expect("valid title regex"));

/// Characters that may not appear in a file name on common file systems.
const INVALID_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Maximum length of a sanitised title, in characters.
const MAX_TITLE_CHARS: usize = 200;

/// Parsed view of a Markdown source with a valid front-matter block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontMatterDocument {
    /// Lines strictly between the two `---` delimiters.
    pub front_matter_lines: Vec<String>,
    /// Value of the first `title: "..."` line, if any.
    pub title: Option<String>,
    /// Lines before the opening delimiter followed by lines after the closing one.
    pub body_lines: Vec<String>,
    /// Whether the body has a level-1 heading outside fenced code.
    pub has_h1: bool,
}

impl FrontMatterDocument {
    /// Parse `text`. Returns `None` when there is no opening `---` or the
    /// block is never closed.
    pub fn parse(text: &str) -> Option<Self> {
        let lines: Vec<&str> = text.split('\n').collect();

        let start = lines.iter().position(|l| is_delimiter(l))?;
        let end = start + 1 + lines[start + 1..].iter().position(|l| is_delimiter(l))?;

        let front_matter_lines: Vec<String> =
            lines[start + 1..end].iter().map(|l| l.to_string()).collect();
        let title = front_matter_lines.iter().find_map(|l| {
            TITLE_LINE
                .captures(l.trim())
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        });

        let body_lines: Vec<String> = lines[..start]
            .iter()
            .chain(lines[end + 1..].iter())
            .map(|l| l.to_string())
            .collect();
        let has_h1 = first_h1(body_lines.iter().map(String::as_str)).is_some();

        Some(Self {
            front_matter_lines,
            title,
            body_lines,
            has_h1,
        })
    }

    /// Body text with the front matter removed, and a `# <title>` heading
    /// prepended when the body has no H1 of its own.
    pub fn render(&self) -> String {
        let body = self.body_lines.join("\n");
        match &self.title {
            Some(title) if !self.has_h1 && !title.is_empty() => {
                if body.trim().is_empty() {
                    format!("# {title}\n")
                } else {
                    format!("# {title}\n\n{body}")
                }
            }
            _ => body,
        }
    }
}

/// Strip front matter from `text`, synthesising an H1 from its title when
/// the document lacks one.
///
/// Text without a complete `---` block is returned unchanged.
pub fn remove_front_matter(text: &str) -> String {
    match FrontMatterDocument::parse(text) {
        Some(doc) => doc.render(),
        None => text.to_string(),
    }
}

/// First level-1 heading of the Markdown file at `path`, sanitised for use as
/// a file name.
///
/// Front matter is handled as in [`remove_front_matter`], so a document with
/// only a front-matter title still yields that title. Read errors are logged
/// and produce `None`.
pub fn extract_h1_title(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => h1_title(&text),
        Err(e) => {
            debug!("Cannot read '{}' for title extraction: {}", path.display(), e);
            None
        }
    }
}

/// In-memory form of [`extract_h1_title`].
pub fn h1_title(text: &str) -> Option<String> {
    let processed = remove_front_matter(text);
    let heading = first_h1(processed.split('\n'))?;
    sanitize_title(heading)
}

/// Replace file-name-invalid characters with `_`, trim dots and spaces, and
/// cap the length. Returns `None` if nothing is left.
pub fn sanitize_title(raw: &str) -> Option<String> {
    let replaced: String = raw
        .chars()
        .map(|c| if INVALID_FILENAME_CHARS.contains(&c) { '_' } else { c })
        .collect();
    let trimmed = replaced.trim_matches(|c| c == '.' || c == ' ');
    let capped: String = trimmed.chars().take(MAX_TITLE_CHARS).collect();
    (!capped.is_empty()).then_some(capped)
}

fn is_delimiter(line: &str) -> bool {
    line.trim() == "---"
}

/// Text of the first H1 outside fenced code, without the leading `# `.
fn first_h1<'a>(lines: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let mut in_fence = false;
    for line in lines {
        let stripped = line.trim();
        if stripped.starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if stripped.starts_with("# ") {
            return Some(stripped[1..].trim());
        }
    }
    None
}
