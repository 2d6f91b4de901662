//! Structured extraction from a parsed document
//!
//! [`extract`] is pure: the same document and base URL always give the same
//! result, and missing elements give empty fields rather than errors.

use crate::scrape::dom::{Document, Element, Node};
use crate::scrape::{Header, Image, Link, ScrapeResult};
use crate::url::resolve_reference;
use std::collections::BTreeMap;
use url::Url;

/// Subtrees whose text is never visible
const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Elements that start and end on their own line in `textContent`
const BLOCK_TAGS: &[&str] = &[
    "p", "br", "div", "h1", "h2", "h3", "h4", "h5", "h6", "li", "ul", "ol", "section", "article",
    "header", "footer", "nav", "tr", "table", "blockquote", "pre", "hr",
];

/// Table cells are separated by a space
const CELL_TAGS: &[&str] = &["td", "th"];

const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

/// Extracts every structured field from `document`
///
/// `base` is the page's final URL after redirects; relative `href` and `src`
/// values resolve against it.
pub fn extract(document: &Document, base: &Url) -> ScrapeResult {
    let mut title = None;
    let mut meta_tags = BTreeMap::new();
    let mut headers = Vec::new();
    let mut links = Vec::new();
    let mut images = Vec::new();
    let mut schema_data = Vec::new();

    for element in document.elements() {
        match element.tag.as_str() {
            "title" if title.is_none() => title = Some(collapse_whitespace(&element.text())),
            "meta" => {
                if let Some((name, content)) = meta_entry(element) {
                    meta_tags.insert(name, content);
                }
            }
            "a" => {
                if let Some(href) = element.attr("href") {
                    links.push(Link {
                        text: link_text(element),
                        url: resolve_reference(base, href),
                    });
                }
            }
            "img" => {
                if let Some(src) = image_source(element) {
                    images.push(Image {
                        src: resolve_reference(base, src),
                        alt: element.attr("alt").unwrap_or_default().to_string(),
                        title: element.attr("title").unwrap_or_default().to_string(),
                    });
                }
            }
            "script" if is_json_ld(element) => {
                match serde_json::from_str::<serde_json::Value>(element.text().trim()) {
                    Ok(value) => schema_data.push(value),
                    Err(e) => tracing::debug!("Skipping invalid JSON-LD block: {}", e),
                }
            }
            tag if HEADING_TAGS.contains(&tag) => headers.push(Header {
                tag: tag.to_string(),
                text: collapse_whitespace(&element.text()),
            }),
            _ => {}
        }
    }

    let text_content = match document.body() {
        Some(body) => visible_text(&body.children),
        None => visible_text(document.nodes()),
    };
    let word_count = text_content.split_whitespace().count();

    ScrapeResult {
        url: base.to_string(),
        title: title.unwrap_or_default(),
        meta_tags,
        headers,
        links,
        images,
        text_content,
        word_count,
        schema_data,
        rendered: false,
        scraped_at: None,
    }
}

fn meta_entry(element: &Element) -> Option<(String, String)> {
    let name = element
        .attr("name")
        .or_else(|| element.attr("property"))
        .map(str::trim)
        .filter(|name| !name.is_empty())?;
    let content = element.attr("content")?;
    Some((name.to_string(), content.trim().to_string()))
}

/// Trimmed anchor text; an image-only link is named by the image's `alt`
fn link_text(anchor: &Element) -> String {
    let text = collapse_whitespace(&anchor.text());
    if !text.is_empty() {
        return text;
    }
    anchor
        .descendants()
        .find(|element| element.tag == "img")
        .and_then(|img| img.attr("alt"))
        .map(collapse_whitespace)
        .unwrap_or_default()
}

/// `src`, or the lazy-loading attributes when `src` is absent or empty
fn image_source(img: &Element) -> Option<&str> {
    ["src", "data-src", "data-original"]
        .iter()
        .filter_map(|name| img.attr(name))
        .map(str::trim)
        .find(|value| !value.is_empty())
}

fn is_json_ld(script: &Element) -> bool {
    script
        .attr("type")
        .is_some_and(|kind| kind.trim().eq_ignore_ascii_case("application/ld+json"))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalized visible text of `nodes`
fn visible_text(nodes: &[Node]) -> String {
    enum Step<'a> {
        Visit(&'a Node),
        LeaveBlock,
        LeaveCell,
    }

    let mut builder = TextBuilder::default();
    let mut stack: Vec<Step<'_>> = nodes.iter().rev().map(Step::Visit).collect();

    while let Some(step) = stack.pop() {
        match step {
            Step::LeaveBlock => builder.line_break(),
            Step::LeaveCell => builder.space(),
            Step::Visit(Node::Text { content }) => builder.push_text(content),
            Step::Visit(Node::Element(element)) => {
                let tag = element.tag.as_str();
                if HIDDEN_TAGS.contains(&tag) {
                    continue;
                }
                if BLOCK_TAGS.contains(&tag) {
                    builder.line_break();
                    stack.push(Step::LeaveBlock);
                } else if CELL_TAGS.contains(&tag) {
                    builder.space();
                    stack.push(Step::LeaveCell);
                }
                stack.extend(element.children.iter().rev().map(Step::Visit));
            }
        }
    }

    builder.finish()
}

/// Accumulates text with collapsed whitespace
///
/// Separators are held back until the next visible character, so the output
/// never starts or ends with whitespace, a newline absorbs any adjacent
/// spaces, and consecutive block boundaries give a single newline.
#[derive(Default)]
struct TextBuilder {
    out: String,
    pending_space: bool,
    pending_newline: bool,
}

impl TextBuilder {
    fn push_text(&mut self, text: &str) {
        for ch in text.chars() {
            if ch.is_whitespace() {
                self.pending_space = true;
            } else {
                self.flush_separator();
                self.out.push(ch);
            }
        }
    }

    fn space(&mut self) {
        self.pending_space = true;
    }

    fn line_break(&mut self) {
        self.pending_newline = true;
    }

    fn flush_separator(&mut self) {
        if !self.out.is_empty() {
            if self.pending_newline {
                self.out.push('\n');
            } else if self.pending_space {
                self.out.push(' ');
            }
        }
        self.pending_newline = false;
        self.pending_space = false;
    }

    fn finish(self) -> String {
        self.out
    }
}
