//! Rendering and parsing of the package's XML documents.
//!
//! Rendering builds strings directly. Parsing runs on a thin layer over
//! [`quick_xml::NsReader`]: every element and
//! attribute is reported with the namespace URI its prefix is bound to, so the
//! parsers match on `(namespace, local name)` and do not care which prefixes a
//! document happens to use.

mod container;
mod headings;
mod links;
mod nav;
mod ncx;
mod opf;

use std::borrow::Cow;

use quick_xml::NsReader;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{LocalName, ResolveResult};

pub use container::{CONTAINER_PATH, parse_container, render_container};
pub use headings::{Heading, extract_headings};
pub(crate) use links::rewrite_links;
pub use nav::{NavDocument, parse_nav, render_nav};
pub use ncx::{parse_ncx, render_ncx};
pub use opf::{OpfDocument, OpfItem, parse_opf, render_opf};

use crate::error::{Error, Result};
use crate::util::{decode_text, extract_xml_encoding, strip_bom};

pub const NS_OPF: &str = "http://www.idpf.org/2007/opf";
pub const NS_DC: &str = "http://purl.org/dc/elements/1.1/";
pub const NS_XHTML: &str = "http://www.w3.org/1999/xhtml";
pub const NS_EPUB: &str = "http://www.idpf.org/2007/ops";
pub const NS_NCX: &str = "http://www.daisy.org/z3986/2005/ncx/";
pub const NS_CONTAINER: &str = "urn:oasis:names:tc:opendocument:xmlns:container";
pub const NS_XML: &str = "http://www.w3.org/XML/1998/namespace";

/// Values the generated documents need besides the TOC itself.
#[derive(Debug, Clone, Copy)]
pub struct DocumentInfo<'a> {
    pub title: &'a str,
    pub language: &'a str,
    pub identifier: &'a str,
}

pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Resolve an entity reference (`amp`, `#8217`, `#x2019`, ...).
pub(crate) fn resolve_entity(entity: &str) -> Option<String> {
    match entity {
        "apos" => return Some("'".to_string()),
        "quot" => return Some("\"".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "amp" => return Some("&".to_string()),
        "nbsp" => return Some("\u{a0}".to_string()),
        _ => {}
    }

    let code = if let Some(hex) = entity.strip_prefix("#x") {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(dec) = entity.strip_prefix('#') {
        dec.parse::<u32>().ok()
    } else {
        None
    };
    code.and_then(char::from_u32).map(String::from)
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode document bytes to text (BOM stripped, declared encoding honored).
pub(crate) fn decode_document(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = strip_bom(bytes);
    decode_text(bytes, extract_xml_encoding(bytes))
}

/// An attribute with its namespace resolved. Unprefixed attributes have no
/// namespace.
#[derive(Debug, Clone)]
pub(crate) struct Attr {
    pub ns: Option<String>,
    pub local: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub(crate) struct Element {
    pub ns: Option<String>,
    pub local: String,
    pub attrs: Vec<Attr>,
}

impl Element {
    pub fn is(&self, ns: &str, local: &str) -> bool {
        self.local == local && self.ns.as_deref() == Some(ns)
    }

    /// An XHTML element; documents that forgot the namespace are accepted.
    pub fn is_html(&self, local: &str) -> bool {
        self.local == local && matches!(self.ns.as_deref(), None | Some(NS_XHTML))
    }

    /// Value of an unprefixed attribute.
    pub fn attr(&self, local: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.ns.is_none() && a.local == local)
            .map(|a| a.value.as_str())
    }

    /// Value of a namespaced attribute.
    pub fn attr_ns(&self, ns: &str, local: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.local == local && a.ns.as_deref() == Some(ns))
            .map(|a| a.value.as_str())
    }
}

pub(crate) enum Node {
    Start(Element),
    End,
    Text(String),
    Eof,
}

/// Namespace-resolving pull reader over [`NsReader`].
///
/// Empty elements are reported as a `Start` immediately followed by an
/// `End`. Reaching the end of input with open elements, or without any root
/// element, is an error.
pub(crate) struct XmlReader<'a> {
    reader: NsReader<&'a [u8]>,
    doc: String,
    depth: usize,
    pending_end: bool,
    seen_root: bool,
}

impl<'a> XmlReader<'a> {
    pub fn new(text: &'a str, doc: &str) -> Self {
        Self {
            reader: NsReader::from_str(text),
            doc: doc.to_string(),
            depth: 0,
            pending_end: false,
            seen_root: false,
        }
    }

    /// Number of currently open elements.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn malformed(&self, detail: impl std::fmt::Display) -> Error {
        Error::malformed(
            &self.doc,
            format!("{} (at byte {})", detail, self.reader.buffer_position()),
        )
    }

    pub fn next(&mut self) -> Result<Node> {
        if self.pending_end {
            self.pending_end = false;
            self.depth -= 1;
            return Ok(Node::End);
        }

        loop {
            let event = self.reader.read_event().map_err(|e| self.malformed(e))?;
            match event {
                Event::Start(e) => return self.open(&e).map(Node::Start),
                Event::Empty(e) => {
                    let element = self.open(&e)?;
                    self.pending_end = true;
                    return Ok(Node::Start(element));
                }
                Event::End(_) => {
                    if self.depth == 0 {
                        return Err(self.malformed("unmatched end tag"));
                    }
                    self.depth -= 1;
                    return Ok(Node::End);
                }
                Event::Text(e) => {
                    let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                    if self.depth == 0 {
                        if text.trim().is_empty() {
                            continue;
                        }
                        return Err(self.malformed("text outside the root element"));
                    }
                    return Ok(Node::Text(text));
                }
                Event::CData(e) => {
                    return Ok(Node::Text(String::from_utf8_lossy(e.as_ref()).into_owned()));
                }
                Event::GeneralRef(e) => {
                    let entity = String::from_utf8_lossy(e.as_ref()).into_owned();
                    let text = resolve_entity(&entity).unwrap_or_else(|| format!("&{};", entity));
                    return Ok(Node::Text(text));
                }
                Event::Eof => {
                    if self.depth > 0 {
                        return Err(self.malformed("unexpected end of document"));
                    }
                    if !self.seen_root {
                        return Err(self.malformed("no root element"));
                    }
                    return Ok(Node::Eof);
                }
                _ => {}
            }
        }
    }

    /// Collect the text content of the element just opened, consuming
    /// everything up to and including its end tag.
    pub fn read_text(&mut self) -> Result<String> {
        let depth = self.depth();
        let mut text = String::new();
        loop {
            match self.next()? {
                Node::Text(t) => text.push_str(&t),
                Node::End if self.depth() < depth => return Ok(text),
                Node::Eof => return Err(self.malformed("unexpected end of document")),
                _ => {}
            }
        }
    }

    /// Skip the rest of the element just opened.
    pub fn skip(&mut self) -> Result<()> {
        self.read_text().map(|_| ())
    }

    fn open(&mut self, start: &BytesStart<'_>) -> Result<Element> {
        if self.depth == 0 && self.seen_root {
            return Err(self.malformed("more than one root element"));
        }
        self.seen_root = true;
        self.depth += 1;

        let (ns, local) = qualify(self.reader.resolve_element(start.name()));
        let mut attrs = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| self.malformed(e))?;
            let key = attr.key.as_ref();
            if key == b"xmlns" || key.starts_with(b"xmlns:") {
                continue;
            }
            let value = String::from_utf8_lossy(&attr.value);
            let value = quick_xml::escape::unescape(&value)
                .map_err(|e| self.malformed(e))?
                .into_owned();
            let (ns, local) = qualify(self.reader.resolve_attribute(attr.key));
            attrs.push(Attr { ns, local, value });
        }
        Ok(Element { ns, local, attrs })
    }
}

/// Namespace URI and local name of a resolved qualified name. Unbound and
/// undeclared prefixes have no namespace, except the predeclared `xml`.
fn qualify((result, local): (ResolveResult<'_>, LocalName<'_>)) -> (Option<String>, String) {
    let ns = match result {
        ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.as_ref()).into_owned()),
        ResolveResult::Unknown(prefix) if prefix == b"xml" => Some(NS_XML.to_string()),
        _ => None,
    };
    (ns, String::from_utf8_lossy(local.as_ref()).into_owned())
}
