//! HTML page used to render Markdown in a headless browser.
//!
//! The Markdown source is embedded as a JSON string literal and rendered
//! client-side with markdown-it; Mermaid diagrams, highlight.js and KaTeX run
//! afterwards. Local links are already absolute `file://` URLs by the time
//! the text gets here (see [`crate::pipeline::render::rewrite_relative_links`]).
//!
//! When client-side rendering finishes the page sets
//! `document.documentElement.dataset.ready = "1"`. Readiness means list items
//! were produced (when the document has any) and every `.mermaid` block
//! holds an `<svg>`. Both checks give up after the configured timeout and the
//! page is marked ready anyway.
//!
//! The printer does not read this marker: the snapshot is timed by
//! Chromium's `--virtual-time-budget`, which gets the same timeout. The
//! marker is only there for inspecting the page in a normal browser.

const TEMPLATE: &str = r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>__MDPDF_TITLE__</title>
<link rel="stylesheet" href="https://cdnjs.cloudflare.com/ajax/libs/github-markdown-css/5.5.1/github-markdown.min.css">
<link rel="stylesheet" href="https://cdnjs.cloudflare.com/ajax/libs/highlight.js/11.9.0/styles/github.min.css">
<link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/katex@0.16.9/dist/katex.min.css">
<style>
@page { size: A4; margin: 18mm; }
body {
  font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, 'Helvetica Neue', Arial, 'Noto Sans', 'Liberation Sans', 'PingFang SC', 'Hiragino Sans GB', 'Microsoft YaHei', 'WenQuanYi Micro Hei', sans-serif;
  line-height: 1.6;
}
.markdown-body { box-sizing: border-box; min-width: 200px; max-width: 980px; margin: 0 auto; }
pre, code { font-family: ui-monospace, SFMono-Regular, Menlo, Monaco, Consolas, 'Liberation Mono', 'Courier New', monospace; }
.mermaid { text-align: center; margin: 12px 0; }
h1, h2, h3 { page-break-after: avoid; }
img { max-width: 100%; }
.markdown-body ul { list-style-type: disc; padding-left: 2em; }
.markdown-body ul ul { list-style-type: circle; }
.markdown-body ul ul ul { list-style-type: square; }
.markdown-body ol { padding-left: 2em; }
.katex { font-size: 1.1em; }
.katex-display { margin: 1em 0; }
</style>
<script src="https://cdn.jsdelivr.net/npm/mermaid@10/dist/mermaid.min.js"></script>
<script src="https://cdnjs.cloudflare.com/ajax/libs/highlight.js/11.9.0/highlight.min.js"></script>
<script src="https://cdn.jsdelivr.net/npm/markdown-it@14/dist/markdown-it.min.js"></script>
<script src="https://cdn.jsdelivr.net/npm/katex@0.16.9/dist/katex.min.js"></script>
<script src="https://cdn.jsdelivr.net/npm/katex@0.16.9/dist/contrib/auto-render.min.js"></script>
<script>if (window.mermaid) { mermaid.initialize({ startOnLoad: false, securityLevel: 'loose' }); }</script>
</head>
<body>
<article class="markdown-body" id="md-root"></article>
<script>
(function () {
  const READY_TIMEOUT_MS = __MDPDF_READY_TIMEOUT__;
  const mdSrc = __MDPDF_SOURCE__;
  const root = document.getElementById('md-root');

  // Math is swapped for placeholders so markdown-it leaves it alone.
  const math = [];
  let src = mdSrc.replace(/\$\$([\s\S]*?)\$\$/g, (_, body) => {
    math.push({ display: true, body: body.trim() });
    return `<!--MATH_${math.length - 1}-->`;
  });
  src = src.replace(/\$([^$\n]+?)\$/g, (m, body, offset, whole) => {
    if (whole[offset - 1] === '$' || whole[offset + m.length] === '$') return m;
    math.push({ display: false, body: body.trim() });
    return `<!--MATH_${math.length - 1}-->`;
  });

  let html = src;
  if (window.markdownit) {
    html = window.markdownit({ html: true, linkify: true, typographer: true, breaks: true }).render(src);
  }
  math.forEach((m, i) => {
    const tag = m.display ? 'div' : 'span';
    const cls = m.display ? 'katex-display' : 'math-inline';
    const attr = m.body.replace(/&/g, '&amp;').replace(/"/g, '&quot;');
    html = html.replace(`<!--MATH_${i}-->`, `<${tag} class="${cls}" data-math="${attr}"></${tag}>`);
  });
  root.innerHTML = html;

  root.querySelectorAll('pre code.language-mermaid').forEach((code) => {
    const div = document.createElement('div');
    div.className = 'mermaid';
    div.textContent = code.textContent;
    code.closest('pre').replaceWith(div);
  });

  try { window.hljs && window.hljs.highlightAll(); } catch (e) {}
  try {
    if (window.katex) {
      root.querySelectorAll('[data-math]').forEach((el) => {
        window.katex.render(el.getAttribute('data-math'), el, {
          throwOnError: false,
          displayMode: el.tagName === 'DIV',
        });
      });
    }
  } catch (e) { console.error('KaTeX rendering error:', e); }

  const expectLists = /^\s*(?:[-*+]|\d+\.)\s/m.test(mdSrc);
  const listsReady = () => !expectLists || root.querySelectorAll('li').length > 0;
  const diagramsReady = () => {
    const blocks = root.querySelectorAll('.mermaid').length;
    return blocks === 0 || root.querySelectorAll('.mermaid svg').length >= blocks;
  };
  const started = Date.now();
  const markReady = () => { document.documentElement.dataset.ready = '1'; };
  const poll = () => {
    if ((listsReady() && diagramsReady()) || Date.now() - started > READY_TIMEOUT_MS) {
      markReady();
    } else {
      setTimeout(poll, 50);
    }
  };

  if (window.mermaid && root.querySelector('.mermaid')) {
    setTimeout(() => {
      Promise.resolve(window.mermaid.run({ querySelector: '.mermaid' })).catch(() => {}).finally(poll);
    }, 50);
  } else {
    poll();
  }
})();
</script>
</body>
</html>
"#;

/// Fill the page template.
///
/// `title` is HTML-escaped. `markdown` is embedded as a JSON string with `</`
/// escaped so the text cannot close the surrounding `<script>`.
pub fn render_html(title: &str, markdown: &str, ready_timeout_ms: u64) -> String {
    TEMPLATE
        .replace("__MDPDF_TITLE__", &escape_html(title))
        .replace("__MDPDF_READY_TIMEOUT__", &ready_timeout_ms.to_string())
        .replace("__MDPDF_SOURCE__", &script_string_literal(markdown))
}

fn script_string_literal(text: &str) -> String {
    // serde_json never fails on a plain &str.
    let json = serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string());
    json.replace("</", "<\\/")
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_all_filled() {
        let html = render_html("Doc", "# Hi", 5000);
        assert!(!html.contains("__MDPDF_"));
        assert!(html.contains("<title>Doc</title>"));
        assert!(html.contains("const READY_TIMEOUT_MS = 5000;"));
        assert!(html.contains(r##"const mdSrc = "# Hi";"##));
    }

    #[test]
    fn markdown_cannot_break_out_of_script() {
        let html = render_html("t", "</script><script>alert(1)</script>", 10);
        assert!(!html.contains("</script><script>alert(1)"));
        assert!(html.contains(r"<\/script>"));
    }

    #[test]
    fn title_is_escaped() {
        let html = render_html("a < b & \"c\"", "", 10);
        assert!(html.contains("<title>a &lt; b &amp; &quot;c&quot;</title>"));
    }

    #[test]
    fn newlines_and_quotes_survive_as_json() {
        let lit = script_string_literal("line \"one\"\nline two");
        assert_eq!(lit, r#""line \"one\"\nline two""#);
    }
}
