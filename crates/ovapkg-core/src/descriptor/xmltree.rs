//! A generic, namespace-aware XML node tree.
//!
//! The OVF descriptor is parsed into this tree before any section is
//! lifted into a typed handle (References, DiskSection, ...). Sections
//! and elements the model does not recognize stay in this generic
//! representation and are serialized back out verbatim, in their
//! original document position — this is the "unknown subtree" mechanism
//! spec.md §4.2 calls for.
//!
//! Round-tripping exact bytes is approximated rather than guaranteed:
//! element and attribute order are preserved, and text nodes between
//! sibling elements (including whitespace-only text) are kept as
//! ordinary children, which is what makes the whitespace between
//! recognized siblings survive a parse/serialize cycle.

use std::io::Cursor;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::error::{Error, Result};

/// One node in the XML tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }
}

/// An XML element: its qualified name exactly as written (e.g.
/// `"ovf:VirtualHardwareSection"`), its attributes in original or
/// caller-assigned order, and its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Local name: the part after a `prefix:` if any.
    pub fn local_name(&self) -> &str {
        self.name.split(':').last().unwrap_or(&self.name)
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.attrs.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.attrs.push((key, value));
        }
    }

    pub fn remove_attr(&mut self, key: &str) -> Option<String> {
        let pos = self.attrs.iter().position(|(k, _)| k == key)?;
        Some(self.attrs.remove(pos).1)
    }

    /// Sort attributes alphabetically by local name (ignoring any
    /// namespace prefix), the stable order spec.md §4.2 mandates for
    /// recognized, model-synthesized elements.
    pub fn sort_attrs_alphabetically(&mut self) {
        self.attrs.sort_by(|a, b| {
            let la = a.0.split(':').last().unwrap_or(&a.0);
            let lb = b.0.split(':').last().unwrap_or(&b.0);
            la.cmp(lb)
        });
    }

    /// Direct child elements, in document order.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// First direct child element with the given qualified name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.name == name)
    }

    /// First direct child element whose local name (ignoring prefix)
    /// matches.
    pub fn child_local(&self, local_name: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.local_name() == local_name)
    }

    /// Concatenated text content of direct text-node children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Replace all children with a single text node.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children = vec![Node::Text(text.into())];
    }

    pub fn push_child(&mut self, node: Node) {
        self.children.push(node);
    }

    /// Remove all direct child elements matching a predicate.
    pub fn retain_children<F: Fn(&Node) -> bool>(&mut self, f: F) {
        self.children.retain(|n| f(n));
    }
}

/// Parse an XML document into its root [`Element`], plus the raw XML
/// declaration line if one was present (so it can be re-emitted
/// unchanged).
pub fn parse(bytes: &[u8]) -> Result<(Element, Option<String>)> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(false);

    let mut decl: Option<String> = None;
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut buf = Vec::new();

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::invalid_input(format!("XML parse error: {e}")))?
        {
            Event::Decl(d) => {
                decl = Some(decl_to_string(&d)?);
            }
            Event::Start(start) => {
                let element = start_to_element(&start)?;
                stack.push(element);
            }
            Event::Empty(start) => {
                let element = start_to_element(&start)?;
                push_finished(&mut stack, &mut root, element)?;
            }
            Event::End(_end) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| Error::invalid_input("unbalanced XML end tag"))?;
                push_finished(&mut stack, &mut root, element)?;
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| Error::invalid_input(format!("XML text decode error: {e}")))?
                    .into_owned();
                if let Some(top) = stack.last_mut() {
                    top.push_child(Node::Text(text));
                }
            }
            Event::CData(t) => {
                let text = String::from_utf8_lossy(t.as_ref()).into_owned();
                if let Some(top) = stack.last_mut() {
                    top.push_child(Node::CData(text));
                }
            }
            Event::Comment(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| Error::invalid_input(format!("XML comment decode error: {e}")))?
                    .into_owned();
                if let Some(top) = stack.last_mut() {
                    top.push_child(Node::Comment(text));
                }
            }
            Event::PI(_) => {
                // Processing instructions are dropped; none of the OVF
                // section types we recognize use them and none of the
                // example packages in the fixture pack emit them.
            }
            Event::DocType(_) => {}
            Event::Eof => break,
        }
        buf.clear();
    }

    let root = root.ok_or_else(|| Error::invalid_input("XML document has no root element"))?;
    Ok((root, decl))
}

fn push_finished(
    stack: &mut Vec<Element>,
    root: &mut Option<Element>,
    element: Element,
) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.push_child(Node::Element(element));
    } else {
        if root.is_some() {
            return Err(Error::invalid_input(
                "XML document has more than one root element",
            ));
        }
        *root = Some(element);
    }
    Ok(())
}

fn start_to_element(start: &BytesStart) -> Result<Element> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut element = Element::new(name);
    for attr in start.attributes() {
        let attr =
            attr.map_err(|e| Error::invalid_input(format!("XML attribute parse error: {e}")))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .decode_and_unescape_value(quick_xml::encoding::Decoder::utf8())
            .map_err(|e| Error::invalid_input(format!("XML attribute decode error: {e}")))?
            .into_owned();
        element.attrs.push((key, value));
    }
    Ok(element)
}

fn decl_to_string(decl: &BytesDecl) -> Result<String> {
    Ok(format!("<?{}?>", String::from_utf8_lossy(decl.as_ref())))
}

/// Serialize an XML tree back into bytes, re-emitting the original
/// declaration line if one was captured at parse time (default to a
/// UTF-8 1.0 declaration otherwise).
pub fn serialize(root: &Element, decl: Option<&str>) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match decl {
        Some(d) => {
            out.extend_from_slice(d.as_bytes());
            out.push(b'\n');
        }
        None => {
            out.extend_from_slice(b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        }
    }

    let mut writer = Writer::new(Cursor::new(Vec::new()));
    write_element(&mut writer, root)?;
    out.extend_from_slice(&writer.into_inner().into_inner());
    Ok(out)
}

fn write_element<W: std::io::Write>(writer: &mut Writer<W>, element: &Element) -> Result<()> {
    if element.children.is_empty() {
        let mut start = BytesStart::new(&element.name);
        for (k, v) in &element.attrs {
            start.push_attribute((k.as_str(), v.as_str()));
        }
        writer
            .write_event(Event::Empty(start))
            .map_err(|e| Error::invalid_input(format!("XML write error: {e}")))?;
        return Ok(());
    }

    let mut start = BytesStart::new(&element.name);
    for (k, v) in &element.attrs {
        start.push_attribute((k.as_str(), v.as_str()));
    }
    writer
        .write_event(Event::Start(start))
        .map_err(|e| Error::invalid_input(format!("XML write error: {e}")))?;

    for child in &element.children {
        match child {
            Node::Element(e) => write_element(writer, e)?,
            Node::Text(t) => {
                writer
                    .write_event(Event::Text(BytesText::new(t)))
                    .map_err(|e| Error::invalid_input(format!("XML write error: {e}")))?;
            }
            Node::CData(t) => {
                writer
                    .write_event(Event::CData(quick_xml::events::BytesCData::new(t)))
                    .map_err(|e| Error::invalid_input(format!("XML write error: {e}")))?;
            }
            Node::Comment(t) => {
                writer
                    .write_event(Event::Comment(quick_xml::events::BytesText::new(t)))
                    .map_err(|e| Error::invalid_input(format!("XML write error: {e}")))?;
            }
        }
    }

    writer
        .write_event(Event::End(BytesEnd::new(&element.name)))
        .map_err(|e| Error::invalid_input(format!("XML write error: {e}")))?;
    Ok(())
}
