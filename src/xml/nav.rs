//! EPUB 3 navigation document.

use super::{
    DocumentInfo, NS_EPUB, NS_XHTML, Node, XmlReader, collapse_whitespace, decode_document,
    escape_xml,
};
use crate::error::Result;
use crate::package::{Landmark, TocNode};
use crate::path::{parent_dir, relativize};

/// Contents of a parsed navigation document.
///
/// Hrefs are exactly as written, relative to the navigation document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavDocument {
    pub toc: Vec<TocNode>,
    pub landmarks: Vec<Landmark>,
}

/// Render the navigation document that lives at `nav_href`.
///
/// `toc` and `landmarks` carry OPF-relative hrefs; they are rewritten
/// relative to the navigation document.
pub fn render_nav(
    toc: &[TocNode],
    landmarks: &[Landmark],
    nav_href: &str,
    info: &DocumentInfo<'_>,
) -> String {
    let base = parent_dir(nav_href);
    let lang = escape_xml(info.language);

    let mut html = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="{}" xmlns:epub="{}" lang="{}" xml:lang="{}">
<head>
  <meta charset="utf-8"/>
  <title>{}</title>
</head>
<body>
  <nav epub:type="toc" id="toc">
    <h1>{}</h1>
"#,
        NS_XHTML,
        NS_EPUB,
        lang,
        lang,
        escape_xml(info.title),
        escape_xml(info.title)
    );
    write_list(&mut html, toc, base, 2);
    html.push_str("  </nav>\n");

    if !landmarks.is_empty() {
        html.push_str("  <nav epub:type=\"landmarks\" id=\"landmarks\" hidden=\"hidden\">\n    <ol>\n");
        for landmark in landmarks {
            html.push_str(&format!(
                "      <li><a epub:type=\"{}\" href=\"{}\">{}</a></li>\n",
                escape_xml(&landmark.kind),
                escape_xml(&relativize(base, &landmark.href)),
                escape_xml(&landmark.label)
            ));
        }
        html.push_str("    </ol>\n  </nav>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn write_list(html: &mut String, nodes: &[TocNode], base: &str, indent: usize) {
    let pad = "  ".repeat(indent);
    html.push_str(&format!("{}<ol>\n", pad));
    for node in nodes {
        html.push_str(&format!("{}  <li>", pad));
        if node.href.is_empty() {
            html.push_str(&format!("<span>{}</span>", escape_xml(&node.label)));
        } else {
            html.push_str(&format!(
                "<a href=\"{}\">{}</a>",
                escape_xml(&relativize(base, &node.href)),
                escape_xml(&node.label)
            ));
        }
        if node.children.is_empty() {
            html.push_str("</li>\n");
        } else {
            html.push('\n');
            write_list(html, &node.children, base, indent + 2);
            html.push_str(&format!("{}  </li>\n", pad));
        }
    }
    html.push_str(&format!("{}</ol>\n", pad));
}

struct NavEntry {
    node: TocNode,
    kind: Option<String>,
}

/// Parse the `toc` and `landmarks` navs of a navigation document.
///
/// A document without a `<nav epub:type="toc">` is malformed.
pub fn parse_nav(bytes: &[u8], doc: &str) -> Result<NavDocument> {
    let text = decode_document(bytes);
    let mut reader = XmlReader::new(&text, doc);
    let mut toc = None;
    let mut landmarks = None;

    loop {
        match reader.next()? {
            Node::Start(e) if e.is_html("nav") => {
                let types = e.attr_ns(NS_EPUB, "type").unwrap_or_default();
                let has = |t: &str| types.split_ascii_whitespace().any(|v| v == t);
                if has("toc") && toc.is_none() {
                    toc = Some(parse_nav_body(&mut reader)?);
                } else if has("landmarks") && landmarks.is_none() {
                    landmarks = Some(parse_nav_body(&mut reader)?);
                } else {
                    reader.skip()?;
                }
            }
            Node::Eof => break,
            _ => {}
        }
    }

    let Some(toc) = toc else {
        return Err(reader.malformed("no <nav epub:type=\"toc\">"));
    };
    Ok(NavDocument {
        toc: toc.into_iter().map(|e| e.node).collect(),
        landmarks: landmarks
            .unwrap_or_default()
            .into_iter()
            .filter(|e| !e.node.href.is_empty())
            .map(|e| {
                let kind = e.kind.unwrap_or_default();
                Landmark::new(e.node.label, e.node.href, kind)
            })
            .collect(),
    })
}

/// Entries of the first list inside a `<nav>`; consumes the whole nav.
fn parse_nav_body(reader: &mut XmlReader<'_>) -> Result<Vec<NavEntry>> {
    let depth = reader.depth();
    let mut entries = None;
    loop {
        match reader.next()? {
            Node::Start(e) if e.is_html("ol") && entries.is_none() => {
                entries = Some(parse_list(reader)?);
            }
            Node::Start(_) => reader.skip()?,
            Node::End if reader.depth() < depth => return Ok(entries.unwrap_or_default()),
            Node::Eof => return Err(reader.malformed("unexpected end of document")),
            _ => {}
        }
    }
}

fn parse_list(reader: &mut XmlReader<'_>) -> Result<Vec<NavEntry>> {
    let depth = reader.depth();
    let mut entries = Vec::new();
    loop {
        match reader.next()? {
            Node::Start(e) if e.is_html("li") => {
                if let Some(entry) = parse_item(reader)? {
                    entries.push(entry);
                }
            }
            Node::Start(_) => reader.skip()?,
            Node::End if reader.depth() < depth => return Ok(entries),
            Node::Eof => return Err(reader.malformed("unexpected end of document")),
            _ => {}
        }
    }
}

fn parse_item(reader: &mut XmlReader<'_>) -> Result<Option<NavEntry>> {
    let depth = reader.depth();
    let mut label = None;
    let mut href = String::new();
    let mut kind = None;
    let mut children = Vec::new();

    loop {
        match reader.next()? {
            Node::Start(e) if label.is_none() && (e.is_html("a") || e.is_html("span")) => {
                if e.local == "a" {
                    href = e.attr("href").unwrap_or_default().trim().to_string();
                }
                kind = e.attr_ns(NS_EPUB, "type").map(str::to_string);
                label = Some(collapse_whitespace(&reader.read_text()?));
            }
            Node::Start(e) if e.is_html("ol") => {
                children.extend(parse_list(reader)?.into_iter().map(|c| c.node));
            }
            Node::Start(_) => reader.skip()?,
            Node::End if reader.depth() < depth => break,
            Node::Eof => return Err(reader.malformed("unexpected end of document")),
            _ => {}
        }
    }

    if label.is_none() && children.is_empty() {
        return Ok(None);
    }
    Ok(Some(NavEntry {
        node: TocNode {
            label: label.unwrap_or_default(),
            href,
            children,
        },
        kind,
    }))
}
