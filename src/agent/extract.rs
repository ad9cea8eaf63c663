//! DOM-based extraction on top of `scraper`: CSS selection, word-count
//! filtered content blocks, links and images.

use anyhow::{anyhow, Result};
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use url::Url;

const BLOCK_SELECTOR: &str = "p, h1, h2, h3, h4, h5, h6, li, blockquote, pre, td, figcaption";
const MAX_LINKS: usize = 200;
const MAX_IMAGES: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Link {
    pub href: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Links {
    pub internal: Vec<Link>,
    pub external: Vec<Link>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Image {
    pub src: String,
    pub alt: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Media {
    pub images: Vec<Image>,
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|_| anyhow!("invalid CSS selector '{}'", css))
}

fn element_text(element: &ElementRef) -> String {
    let mut text = String::new();
    for node in element.text() {
        let trimmed = node.trim();
        if !trimmed.is_empty() {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(trimmed);
        }
    }
    text
}

/// Outer HTML of every element matching `css`, concatenated. `Ok(None)`
/// when nothing matches.
pub fn select_markup(html: &str, css: &str) -> Result<Option<String>> {
    let selector = parse_selector(css)?;
    let document = Html::parse_document(html);
    let parts: Vec<String> = document.select(&selector).map(|el| el.html()).collect();
    Ok((!parts.is_empty()).then(|| parts.join("\n")))
}

/// Readable text blocks with at least `min_words` words each. Pages without
/// block elements fall back to the whole body as one block.
pub fn content_blocks(html: &str, min_words: usize) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(blocks) = Selector::parse(BLOCK_SELECTOR) else {
        return Vec::new();
    };

    let mut out: Vec<String> = document
        .select(&blocks)
        // Skip a block nested in another block (li > p); the outer one covers it.
        .filter(|el| {
            !el.ancestors()
                .filter_map(ElementRef::wrap)
                .any(|a| blocks.matches(&a))
        })
        .map(|el| element_text(&el))
        .filter(|t| !t.is_empty())
        .collect();
    out.dedup();

    if out.is_empty() {
        let body = Selector::parse("body")
            .ok()
            .and_then(|sel| document.select(&sel).next())
            .unwrap_or_else(|| document.root_element());
        let fallback = element_text(&body);
        if !fallback.is_empty() {
            out.push(fallback);
        }
    }
    out.retain(|block| block.split_whitespace().count() >= min_words);
    out
}

fn resolve(base: Option<&Url>, raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('#') {
        return None;
    }
    let parsed = match base {
        Some(base) => base.join(raw).ok()?,
        None => Url::parse(raw).ok()?,
    };
    matches!(parsed.scheme(), "http" | "https").then_some(parsed)
}

/// Anchors split into same-host and other-host links, resolved against `base`.
pub fn extract_links(html: &str, base: Option<&Url>) -> Links {
    let document = Html::parse_document(html);
    let mut links = Links::default();
    let Ok(anchors) = Selector::parse("a[href]") else {
        return links;
    };

    let base_host = base.and_then(|b| b.host_str());
    let mut seen = std::collections::HashSet::new();
    for anchor in document.select(&anchors) {
        let Some(url) = anchor.value().attr("href").and_then(|h| resolve(base, h)) else {
            continue;
        };
        if !seen.insert(url.to_string()) {
            continue;
        }
        let link = Link {
            href: url.to_string(),
            text: element_text(&anchor),
        };
        if base_host.is_some() && url.host_str() == base_host {
            links.internal.push(link);
        } else {
            links.external.push(link);
        }
        if seen.len() >= MAX_LINKS {
            break;
        }
    }
    links
}

pub fn extract_media(html: &str, base: Option<&Url>) -> Media {
    let document = Html::parse_document(html);
    let mut media = Media::default();
    let Ok(images) = Selector::parse("img[src]") else {
        return media;
    };
    for img in document.select(&images).take(MAX_IMAGES) {
        if let Some(src) = img.value().attr("src").and_then(|s| resolve(base, s)) {
            media.images.push(Image {
                src: src.to_string(),
                alt: img.value().attr("alt").unwrap_or_default().trim().to_string(),
            });
        }
    }
    media
}
