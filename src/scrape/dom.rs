//! Document tree
//!
//! Raw markup is parsed by html5ever (through scraper), which recovers from
//! unclosed tags, missing quotes and invalid nesting the way browsers do. The
//! result is converted into an owned tree of [`Node`]s that the extractor
//! walks in document order.

use crate::scrape::encoding::decode_body;
use crate::ParseError;
use ego_tree::iter::Edge;
use scraper::Html;

/// Content types that are never parsed as markup
const BINARY_CONTENT_TYPES: &[&str] = &[
    "image/",
    "audio/",
    "video/",
    "font/",
    "application/octet-stream",
    "application/pdf",
    "application/zip",
];

/// A node of the document tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text { content: String },
}

/// An element with its attributes and ordered children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Lowercase local name (`a`, `img`, `h1`, ...)
    pub tag: String,
    /// Attributes in source order, names lowercase
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    fn new(tag: impl Into<String>, attrs: Vec<(String, String)>) -> Self {
        Self {
            tag: tag.into(),
            attrs,
            children: Vec::new(),
        }
    }

    /// Value of the first attribute called `name`
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Concatenated text of all descendant text nodes, in document order
    pub fn text(&self) -> String {
        let mut out = String::new();
        let mut stack: Vec<&Node> = self.children.iter().rev().collect();
        while let Some(node) = stack.pop() {
            match node {
                Node::Text { content } => out.push_str(content),
                Node::Element(element) => stack.extend(element.children.iter().rev()),
            }
        }
        out
    }

    /// Descendant elements in depth-first pre-order (not including `self`)
    pub fn descendants(&self) -> Elements<'_> {
        Elements::new(&self.children)
    }
}

/// Depth-first pre-order iterator over elements
pub struct Elements<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Elements<'a> {
    fn new(roots: &'a [Node]) -> Self {
        Self {
            stack: roots.iter().rev().collect(),
        }
    }
}

impl<'a> Iterator for Elements<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            if let Node::Element(element) = node {
                self.stack.extend(element.children.iter().rev());
                return Some(element);
            }
        }
        None
    }
}

/// A parsed document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Synthetic root holding the top-level nodes
    root: Element,
}

impl Document {
    /// Parses already-decoded markup
    pub fn from_html(html: &str) -> Self {
        let parsed = Html::parse_document(html);
        Self {
            root: convert(&parsed),
        }
    }

    /// Top-level nodes (normally a single `<html>` element)
    pub fn nodes(&self) -> &[Node] {
        &self.root.children
    }

    /// Every element in depth-first document order
    pub fn elements(&self) -> Elements<'_> {
        self.root.descendants()
    }

    /// Every element named `tag`, in document order
    pub fn find_all<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements()
            .filter(move |element| element.tag.eq_ignore_ascii_case(tag))
    }

    /// First element named `tag`
    pub fn find_first(&self, tag: &str) -> Option<&Element> {
        self.elements()
            .find(|element| element.tag.eq_ignore_ascii_case(tag))
    }

    /// The `<body>` element, if the document has one
    pub fn body(&self) -> Option<&Element> {
        self.find_first("body")
    }

    /// The synthetic root, for walking the whole document
    pub fn root(&self) -> &Element {
        &self.root
    }
}

/// Builds a document from a response body
///
/// `content_type` is the declared Content-Type header, used both to refuse
/// obviously binary responses and to pick the character encoding. An empty
/// body is a valid, empty document.
pub fn parse(body: &[u8], content_type: Option<&str>) -> Result<Document, ParseError> {
    if let Some(content_type) = content_type {
        let lower = content_type.trim().to_ascii_lowercase();
        if BINARY_CONTENT_TYPES.iter().any(|prefix| lower.starts_with(prefix)) {
            return Err(ParseError::UnsupportedContentType(content_type.to_string()));
        }
    }

    if looks_binary(body) {
        return Err(ParseError::Binary);
    }

    let html = decode_body(body, content_type);
    Ok(Document::from_html(&html))
}

/// More than one NUL byte in ten means the body is not text
fn looks_binary(body: &[u8]) -> bool {
    let sample = &body[..body.len().min(8192)];
    if sample.is_empty() {
        return false;
    }
    let nul = sample.iter().filter(|b| **b == 0).count();
    nul * 10 > sample.len()
}

/// Converts scraper's arena tree without recursion, so deep nesting cannot overflow the stack
fn convert(parsed: &Html) -> Element {
    let mut stack: Vec<Element> = vec![Element::new("#document", Vec::new())];

    for edge in parsed.tree.root().traverse() {
        match edge {
            Edge::Open(node) => match node.value() {
                scraper::Node::Element(element) => {
                    let attrs = element
                        .attrs()
                        .map(|(name, value)| (name.to_ascii_lowercase(), value.to_string()))
                        .collect();
                    stack.push(Element::new(element.name().to_ascii_lowercase(), attrs));
                }
                scraper::Node::Text(text) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::Text {
                            content: text.to_string(),
                        });
                    }
                }
                _ => {}
            },
            Edge::Close(node) => {
                if node.value().is_element() && stack.len() > 1 {
                    if let Some(done) = stack.pop() {
                        if let Some(parent) = stack.last_mut() {
                            parent.children.push(Node::Element(done));
                        }
                    }
                }
            }
        }
    }

    // Unbalanced edges cannot happen with html5ever, but fold anything left over
    while stack.len() > 1 {
        if let Some(done) = stack.pop() {
            if let Some(parent) = stack.last_mut() {
                parent.children.push(Node::Element(done));
            }
        }
    }

    stack.pop().unwrap_or_else(|| Element::new("#document", Vec::new()))
}
