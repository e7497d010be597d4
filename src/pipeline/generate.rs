//! Chapter generation: turn extracted or enriched text into the chapter list
//! handed to the EPUB encoder.
//!
//! The rules are simple but load-bearing:
//!
//! * Enriched markdown (from the OCR agent) wins over raw extracted text.
//! * A completely empty document still yields exactly one chapter holding a
//!   placeholder paragraph — the encoder contract requires at least one
//!   chapter, and an empty-spine EPUB fails structural validation anyway.
//! * Text is split into paragraphs on non-blank lines and HTML-escaped, so
//!   extracted content can never inject markup into the generated XHTML.

use crate::collaborators::Chapter;

/// Body shown when neither extraction nor enrichment produced any content.
pub const PLACEHOLDER_HTML: &str = "<p>Content could not be extracted.</p>";

/// Build the chapter list for the encoder.
///
/// `enriched` is the OCR agent's markdown (if any); `extracted` is the raw
/// extraction text. The first non-blank of the two is used; when both are
/// blank the single chapter carries [`PLACEHOLDER_HTML`]. The result is
/// never empty.
pub fn build_chapters(enriched: Option<&str>, extracted: &str) -> Vec<Chapter> {
    let source = match enriched {
        Some(md) if !md.trim().is_empty() => md,
        _ => extracted,
    };

    let html = if source.trim().is_empty() {
        PLACEHOLDER_HTML.to_string()
    } else {
        paragraphs_to_html(source)
    };

    vec![Chapter {
        title: "Converted".to_string(),
        html,
        filename: "chapter1.xhtml".to_string(),
    }]
}

/// Render text as a sequence of `<p>` elements, one per non-blank line,
/// with HTML special characters escaped.
fn paragraphs_to_html(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| format!("<p>{}</p>", escape_html(line.trim())))
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
