//! Minimal XML element tree
//!
//! STIX 1.x packages are small enough to hold in memory once a content
//! block has been cut out of the poll stream. Lookups match on local names
//! so documents decode the same whatever namespace prefixes the producer
//! picked.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// XML parse failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("XML error: {0}")]
pub struct XmlError(pub String);

impl From<quick_xml::Error> for XmlError {
    fn from(e: quick_xml::Error) -> Self {
        XmlError(e.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for XmlError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        XmlError(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An XML element with its attributes and children
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    /// Qualified name as written in the document
    pub name: String,
    /// Attributes as `(qualified name, unescaped value)`
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Build a childless element from a start tag
    pub fn from_start(start: &BytesStart<'_>) -> Result<Self, XmlError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
        })
    }

    /// Parse a whole document and return its root element
    pub fn parse(text: &str) -> Result<Self, XmlError> {
        let mut reader = Reader::from_str(text);
        let mut builder = TreeBuilder::new();

        loop {
            match reader.read_event()? {
                Event::Start(e) => builder.start(&e)?,
                Event::Empty(e) => {
                    if let Some(root) = builder.empty(&e)? {
                        return Ok(root);
                    }
                }
                Event::End(_) => {
                    if let Some(root) = builder.end() {
                        return Ok(root);
                    }
                }
                Event::Text(t) => {
                    let text = t.unescape()?;
                    builder.text(&text);
                }
                Event::CData(c) => {
                    let data = c.into_inner();
                    builder.text(&String::from_utf8_lossy(&data));
                }
                Event::Eof => {
                    return Err(XmlError(if builder.depth() > 0 {
                        "unexpected end of document".to_string()
                    } else {
                        "no root element".to_string()
                    }));
                }
                _ => {}
            }
        }
    }

    /// Name without namespace prefix
    pub fn local_name(&self) -> &str {
        local(&self.name)
    }

    /// Check the local name
    pub fn is(&self, name: &str) -> bool {
        self.local_name() == name
    }

    /// Attribute by exact (qualified) name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// The `xsi:type` discriminator
    ///
    /// `xsi:type` wins, then a `type` under a prefix this element binds to
    /// the schema instance namespace. Prefixes bound on an ancestor are not
    /// tracked, so any other prefixed `type` is the last resort.
    pub fn xsi_type(&self) -> Option<&str> {
        if let Some(value) = self.attr("xsi:type") {
            return Some(value);
        }

        let bound = self.attributes.iter().find_map(|(k, v)| {
            k.strip_prefix("xmlns:")
                .filter(|_| v == XSI_NAMESPACE)
                .and_then(|prefix| self.attr(&format!("{}:type", prefix)))
        });

        bound.or_else(|| {
            self.attributes
                .iter()
                .find(|(k, _)| k.contains(':') && local(k) == "type" && !k.starts_with("xmlns"))
                .map(|(_, v)| v.as_str())
        })
    }

    /// Direct child elements
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|c| match c {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// First direct child with the given local name
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.is(name))
    }

    /// First descendant (document order) with the given local name
    pub fn find(&self, name: &str) -> Option<&Element> {
        for e in self.elements() {
            if e.is(name) {
                return Some(e);
            }
            if let Some(found) = e.find(name) {
                return Some(found);
            }
        }
        None
    }

    /// All descendants (document order) with the given local name
    pub fn find_all(&self, name: &str) -> Vec<&Element> {
        let mut found = Vec::new();
        self.collect(name, None, &mut found);
        found
    }

    /// All descendants with the given local name that are not nested
    /// inside an element named `skip`
    pub fn find_all_outside(&self, name: &str, skip: &str) -> Vec<&Element> {
        let mut found = Vec::new();
        self.collect(name, Some(skip), &mut found);
        found
    }

    fn collect<'a>(&'a self, name: &str, skip: Option<&str>, found: &mut Vec<&'a Element>) {
        for e in self.elements() {
            if skip.is_some_and(|s| e.is(s)) {
                continue;
            }
            if e.is(name) {
                found.push(e);
            }
            e.collect(name, skip, found);
        }
    }

    /// Concatenated, trimmed text of the element and its descendants
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out.trim().to_string()
    }

    /// Trimmed text, `None` when empty
    pub fn non_empty_text(&self) -> Option<String> {
        let text = self.text();
        (!text.is_empty()).then_some(text)
    }

    fn collect_text(&self, out: &mut String) {
        for c in &self.children {
            match c {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) => e.collect_text(out),
            }
        }
    }
}

const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

fn local(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

/// Incremental tree construction from reader events
///
/// Used both for whole documents and for subtrees cut out of a streamed
/// response.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    stack: Vec<Element>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently open elements
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn start(&mut self, start: &BytesStart<'_>) -> Result<(), XmlError> {
        self.stack.push(Element::from_start(start)?);
        Ok(())
    }

    /// Self-closing tag; returns the element if it is a complete root
    pub fn empty(&mut self, start: &BytesStart<'_>) -> Result<Option<Element>, XmlError> {
        let element = Element::from_start(start)?;
        Ok(self.attach(element))
    }

    /// Text is only kept inside an open element
    pub fn text(&mut self, text: &str) {
        if let Some(top) = self.stack.last_mut() {
            if let Some(Node::Text(existing)) = top.children.last_mut() {
                existing.push_str(text);
            } else {
                top.children.push(Node::Text(text.to_string()));
            }
        }
    }

    /// Close the innermost element; returns the root once it closes
    pub fn end(&mut self) -> Option<Element> {
        let element = self.stack.pop()?;
        self.attach(element)
    }

    fn attach(&mut self, element: Element) -> Option<Element> {
        match self.stack.last_mut() {
            Some(parent) => {
                parent.children.push(Node::Element(element));
                None
            }
            None => Some(element),
        }
    }
}
