//! Minimal owned XML tree for wire payloads
//!
//! The administrative interface returns small XML documents (a wrapper
//! element, one level of attributes, scalar child elements, occasional
//! nesting). This module materializes the `quick-xml` event stream into an
//! owned [`XmlNode`] tree offering exactly what the mapper and the paging
//! layer need: child lookup by name, attribute lookup, and text access.
//!
//! The parser is deliberately lenient: a malformed document yields whatever
//! prefix parsed cleanly rather than an error, because a truncated or odd
//! body on an otherwise successful HTTP exchange must degrade, not fail.

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::warn;

/// One element of a parsed XML document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlNode {
    /// Element name
    pub name: String,
    /// Concatenated text content directly under this element
    pub text: String,
    /// Attributes in document order
    pub attributes: Vec<(String, String)>,
    /// Child elements in document order
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    /// First child element with the given name
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All child elements with the given name
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Attribute value by name
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Text of the named scalar child element
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    /// True when this element carries no children (scalar leaf)
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Parse a document into its root element.
///
/// Returns `None` when no root element could be recovered at all. Parse
/// errors mid-document are logged and terminate the walk, keeping whatever
/// was already built.
pub fn parse_document(text: &str) -> Option<XmlNode> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    // Stack of open elements; index 0 becomes the root once closed.
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let node = node_from_start(&start);
                stack.push(node);
            }
            Ok(Event::Empty(start)) => {
                let node = node_from_start(&start);
                attach(&mut stack, &mut root, node);
            }
            Ok(Event::Text(t)) => {
                if let Some(open) = stack.last_mut() {
                    if let Ok(decoded) = t.unescape() {
                        open.text.push_str(&decoded);
                    }
                }
            }
            Ok(Event::End(_)) => {
                if let Some(done) = stack.pop() {
                    attach(&mut stack, &mut root, done);
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                warn!("XML body parse stopped early: {}", err);
                break;
            }
            Ok(_) => {}
        }
    }

    // Unclosed elements from a truncated body still count as content.
    while let Some(done) = stack.pop() {
        attach(&mut stack, &mut root, done);
    }

    root
}

fn node_from_start(start: &quick_xml::events::BytesStart<'_>) -> XmlNode {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in start.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        if let Ok(value) = attr.unescape_value() {
            attributes.push((key, value.into_owned()));
        }
    }
    XmlNode {
        name,
        text: String::new(),
        attributes,
        children: Vec::new(),
    }
}

fn attach(stack: &mut Vec<XmlNode>, root: &mut Option<XmlNode>, node: XmlNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if root.is_none() {
                *root = Some(node);
            }
        }
    }
}
