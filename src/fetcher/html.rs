//! HTML helpers for the HTTP backend: title lookup, readable text and a
//! rough markdown rendering. Regex based; no DOM is built.

use once_cell::sync::Lazy;
use regex::Regex;

pub const MAX_CLEAN_CHARS: usize = 50_000;

static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title\b[^>]*>(.*?)</title\s*>").expect("valid regex"));
static HIDDEN_BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<noscript\b.*?</noscript\s*>|<head\b.*?</head\s*>|<!--.*?-->",
    )
    .expect("valid regex")
});
static BLOCK_BREAK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</?(p|div|section|article|tr|table|ul|ol|blockquote|pre)\b[^>]*>")
        .expect("valid regex")
});
static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<h([1-6])\b[^>]*>(.*?)</h[1-6]\s*>").expect("valid regex"));
static LIST_ITEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<li\b[^>]*>(.*?)(</li\s*>|$)").expect("valid regex"));
static LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?href\s*=\s*["']([^"']*)["'][^>]*>(.*?)</a\s*>"#)
        .expect("valid regex")
});
static STRONG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(strong|b)\b[^>]*>(.*?)</(strong|b)\s*>").expect("valid regex")
});
static EM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(em|i)\b[^>]*>(.*?)</(em|i)\s*>").expect("valid regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static SPACES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\r\f\v]+").expect("valid regex"));
static BLANK_LINES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n+").expect("valid regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

pub fn is_html(content_type: &str, body: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    if ct.contains("text/html") || ct.contains("application/xhtml") {
        return true;
    }
    if !ct.is_empty() {
        return false;
    }
    let head: String = body.trim_start().chars().take(64).collect::<String>().to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

pub fn extract_title(html: &str) -> Option<String> {
    TITLE_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| collapse_whitespace(&decode_entities(&TAG_RE.replace_all(m.as_str(), ""))))
        .filter(|t| !t.is_empty())
}

/// Visible text of the page as a single whitespace-normalized string.
pub fn clean_text(html: &str) -> String {
    let without_hidden = HIDDEN_BLOCK_RE.replace_all(html, " ");
    let without_tags = TAG_RE.replace_all(&without_hidden, " ");
    let text = collapse_whitespace(&decode_entities(&without_tags));
    text.chars().take(MAX_CLEAN_CHARS).collect()
}

/// Approximate markdown for headings, lists, links and emphasis.
pub fn to_markdown(html: &str) -> String {
    let s = HIDDEN_BLOCK_RE.replace_all(html, " ");
    // Inline markup first so headings and list items keep it.
    let s = LINK_RE.replace_all(&s, |caps: &regex::Captures| {
        format!("[{}]({})", inline_text(&caps[2]), &caps[1])
    });
    let s = STRONG_RE.replace_all(&s, "**$2**");
    let s = EM_RE.replace_all(&s, "*$2*");
    let s = HEADING_RE.replace_all(&s, |caps: &regex::Captures| {
        let level: usize = caps[1].parse().unwrap_or(1);
        format!("\n\n{} {}\n\n", "#".repeat(level), inline_text(&caps[2]))
    });
    let s = LIST_ITEM_RE.replace_all(&s, |caps: &regex::Captures| {
        format!("\n- {}\n", inline_text(&caps[1]))
    });
    let s = BLOCK_BREAK_RE.replace_all(&s, "\n\n");
    let s = TAG_RE.replace_all(&s, "");
    let s = decode_entities(&s);

    let lines: Vec<String> = s
        .lines()
        .map(|l| SPACES_RE.replace_all(l.trim(), " ").to_string())
        .collect();
    let joined = lines.join("\n");
    let md = BLANK_LINES_RE.replace_all(&joined, "\n\n");
    md.trim().chars().take(MAX_CLEAN_CHARS).collect()
}

fn inline_text(fragment: &str) -> String {
    collapse_whitespace(&TAG_RE.replace_all(fragment, ""))
}

fn collapse_whitespace(s: &str) -> String {
    WHITESPACE_RE.replace_all(s, " ").trim().to_string()
}

pub fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&mdash;", "\u{2014}")
        .replace("&ndash;", "\u{2013}")
        .replace("&hellip;", "\u{2026}")
        // last, so "&amp;lt;" decodes to "&lt;" and not "<"
        .replace("&amp;", "&")
}
