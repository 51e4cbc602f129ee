//! Minimal XML element tree used as the wire representation of envelopes
//!
//! The tree is built from quick-xml events when reading and written back
//! through a quick-xml [`Writer`]. It only keeps what the protocol uses:
//! element names, child order and text. Attributes, comments and
//! processing instructions are dropped on read.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use super::error::ApiError;

/// Deepest element nesting accepted when parsing
pub const MAX_DEPTH: usize = 256;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Character encoding declared on, and used for, wire documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    #[default]
    Utf8,
    Latin1,
}

impl Charset {
    /// Name written in the XML declaration
    pub fn label(&self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::Latin1 => "ISO-8859-1",
        }
    }

    /// Parse a charset label such as `utf-8` or `iso-8859-1`
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(Charset::Utf8),
            "iso-8859-1" | "latin1" | "latin-1" => Some(Charset::Latin1),
            _ => None,
        }
    }

    /// Strict decode; `None` when the bytes are not valid in this charset
    pub fn decode(&self, bytes: &[u8]) -> Option<String> {
        match self {
            Charset::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_string),
            Charset::Latin1 => Some(latin1_to_string(bytes)),
        }
    }

    /// Encode serialized XML. Characters outside Latin-1 become numeric
    /// character references.
    pub fn encode(&self, xml: &str) -> Vec<u8> {
        match self {
            Charset::Utf8 => xml.as_bytes().to_vec(),
            Charset::Latin1 => {
                let mut out = Vec::with_capacity(xml.len());
                for c in xml.chars() {
                    match u8::try_from(u32::from(c)) {
                        Ok(b) => out.push(b),
                        Err(_) => out.extend_from_slice(format!("&#{};", u32::from(c)).as_bytes()),
                    }
                }
                out
            }
        }
    }
}

/// Every byte maps to the code point of the same value
pub fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Child of an [`Element`]
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub name: String,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    /// Builder form of [`Element::append`]
    pub fn with_child(mut self, child: Element) -> Self {
        self.append(child);
        self
    }

    /// Builder form of [`Element::push_text`]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.push_text(text);
        self
    }

    pub fn append(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Append text, merging with a preceding text node
    pub fn push_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        match self.children.last_mut() {
            Some(Node::Text(prev)) => prev.push_str(&text),
            _ => self.children.push(Node::Text(text)),
        }
    }

    /// Element children in document order
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// First element child named `name`
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find_map(|n| match n {
            Node::Element(e) if e.name == name => Some(e),
            _ => None,
        })
    }

    /// Remove every element child named `name`, returning how many went
    pub fn remove_children(&mut self, name: &str) -> usize {
        let before = self.children.len();
        self.children
            .retain(|n| !matches!(n, Node::Element(e) if e.name == name));
        before - self.children.len()
    }

    /// Concatenated direct text content
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Whitespace between child elements is layout, not content
    fn drop_layout_text(&mut self) {
        if self.elements().next().is_some() {
            self.children
                .retain(|n| !matches!(n, Node::Text(t) if t.trim().is_empty()));
        }
    }
}

/// A wire document: one root element
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub root: Element,
}

impl Document {
    pub fn new(root: Element) -> Self {
        Self { root }
    }

    /// Parse a wire payload.
    ///
    /// The encoding named in the XML declaration (or a UTF-8 byte order
    /// mark) wins; `charset` is only used when the payload declares none.
    pub fn parse(bytes: &[u8], charset: Charset) -> Result<Self, ApiError> {
        let (bytes, declared) = match bytes.strip_prefix(UTF8_BOM) {
            Some(rest) => (rest, Some(Charset::Utf8)),
            None => (bytes, declared_charset(bytes)?),
        };
        let charset = declared.unwrap_or(charset);
        let text = charset
            .decode(bytes)
            .ok_or_else(|| ApiError::Xml(format!("payload is not valid {}", charset.label())))?;

        let mut reader = Reader::from_str(text.trim());
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    if stack.len() >= MAX_DEPTH {
                        return Err(ApiError::Xml(format!(
                            "elements nested deeper than {}",
                            MAX_DEPTH
                        )));
                    }
                    stack.push(Element::new(element_name(&e)?));
                }
                Event::Empty(e) => {
                    let element = Element::new(element_name(&e)?);
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let mut element = stack
                        .pop()
                        .ok_or_else(|| ApiError::Xml("unexpected closing tag".to_string()))?;
                    element.drop_layout_text();
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(t) => {
                    let text = t.unescape()?;
                    match stack.last_mut() {
                        Some(current) => current.push_text(text.into_owned()),
                        None if text.trim().is_empty() => {}
                        None => {
                            return Err(ApiError::Xml("text outside of root element".to_string()));
                        }
                    }
                }
                Event::CData(c) => {
                    let data = c.into_inner();
                    let text = std::str::from_utf8(&data)
                        .map_err(|e| ApiError::Xml(format!("Invalid UTF-8 in CDATA: {}", e)))?;
                    if let Some(current) = stack.last_mut() {
                        current.push_text(text);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(ApiError::Xml(format!("unclosed element <{}>", open.name)));
        }

        root.map(Document::new)
            .ok_or_else(|| ApiError::Xml("document has no root element".to_string()))
    }

    /// Serialize with an XML declaration naming `charset`
    pub fn to_bytes(&self, charset: Charset) -> Result<Vec<u8>, ApiError> {
        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some(charset.label()), None)))?;
        writer.get_mut().push(b'\n');
        write_element(&mut writer, &self.root)?;
        writer.get_mut().push(b'\n');

        let xml = String::from_utf8(writer.into_inner())
            .map_err(|e| ApiError::Xml(format!("Generated XML contains invalid UTF-8: {}", e)))?;
        Ok(charset.encode(&xml))
    }
}

/// Hook run against an envelope's document.
///
/// Request envelopes run their filters after parsing and before fields are
/// extracted; reply envelopes run them after the document is built and
/// before it is serialized. Filters run in registration order.
pub trait DocumentFilter: Send + Sync {
    fn apply(&self, doc: &mut Document) -> Result<(), ApiError>;
}

impl<F> DocumentFilter for F
where
    F: Fn(&mut Document) -> Result<(), ApiError> + Send + Sync,
{
    fn apply(&self, doc: &mut Document) -> Result<(), ApiError> {
        self(doc)
    }
}

/// Charset named by the payload's XML declaration, if it has one
fn declared_charset(bytes: &[u8]) -> Result<Option<Charset>, ApiError> {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let head = &bytes[start..];
    if !head.starts_with(b"<?xml") {
        return Ok(None);
    }
    let Some(end) = head.windows(2).position(|w| w == b"?>") else {
        return Err(ApiError::Xml("unterminated XML declaration".to_string()));
    };

    // Declarations are ASCII in both supported charsets
    let declaration = latin1_to_string(&head[..end + 2]);
    let mut reader = Reader::from_str(&declaration);
    let Event::Decl(decl) = reader.read_event()? else {
        return Ok(None);
    };

    match decl.encoding() {
        None => Ok(None),
        Some(label) => {
            let label = label
                .map_err(|e| ApiError::Xml(format!("invalid XML declaration: {}", e)))?;
            let label = latin1_to_string(&label);
            Charset::from_label(&label)
                .map(Some)
                .ok_or_else(|| ApiError::Xml(format!("unsupported encoding {}", label)))
        }
    }
}

fn element_name(e: &BytesStart<'_>) -> Result<String, ApiError> {
    let name_bytes = e.name();
    std::str::from_utf8(name_bytes.as_ref())
        .map(str::to_string)
        .map_err(|e| ApiError::Xml(format!("Invalid UTF-8 in element name: {}", e)))
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), ApiError> {
    match stack.last_mut() {
        Some(parent) => parent.append(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(ApiError::Xml("multiple root elements".to_string())),
    }
    Ok(())
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<(), ApiError> {
    if element.children.is_empty() {
        writer.write_event(Event::Empty(BytesStart::new(element.name.as_str())))?;
        return Ok(());
    }

    writer.write_event(Event::Start(BytesStart::new(element.name.as_str())))?;
    for child in &element.children {
        match child {
            Node::Element(e) => write_element(writer, e)?,
            Node::Text(t) => writer.write_event(Event::Text(BytesText::new(t)))?,
        }
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}
