//! Legacy NCX table of contents.

use super::{DocumentInfo, NS_NCX, Element, Node, XmlReader, collapse_whitespace, decode_document, escape_xml};
use crate::error::Result;
use crate::package::{TocNode, toc_depth};
use crate::path::{parent_dir, relativize};

/// Render the NCX that lives at `ncx_href`.
///
/// NCX nav points must link somewhere, so a heading-only node borrows the
/// href of its first linked descendant.
pub fn render_ncx(toc: &[TocNode], ncx_href: &str, info: &DocumentInfo<'_>) -> String {
    let base = parent_dir(ncx_href);
    let mut ncx = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="{}" version="2005-1" xml:lang="{}">
  <head>
    <meta name="dtb:uid" content="{}"/>
    <meta name="dtb:depth" content="{}"/>
    <meta name="dtb:totalPageCount" content="0"/>
    <meta name="dtb:maxPageNumber" content="0"/>
  </head>
  <docTitle>
    <text>{}</text>
  </docTitle>
  <navMap>
"#,
        NS_NCX,
        escape_xml(info.language),
        escape_xml(info.identifier),
        toc_depth(toc).max(1),
        escape_xml(info.title)
    );

    let mut play_order = 1;
    for node in toc {
        write_nav_point(&mut ncx, node, base, &mut play_order, 2);
    }

    ncx.push_str("  </navMap>\n</ncx>\n");
    ncx
}

fn first_href(node: &TocNode) -> Option<&str> {
    if !node.href.is_empty() {
        return Some(&node.href);
    }
    node.children.iter().find_map(first_href)
}

fn write_nav_point(
    ncx: &mut String,
    node: &TocNode,
    base: &str,
    play_order: &mut usize,
    indent: usize,
) {
    let Some(href) = first_href(node) else {
        return;
    };
    let pad = "  ".repeat(indent);

    ncx.push_str(&format!(
        "{}<navPoint id=\"navpoint-{}\" playOrder=\"{}\">\n",
        pad, play_order, play_order
    ));
    ncx.push_str(&format!(
        "{}  <navLabel>\n{}    <text>{}</text>\n{}  </navLabel>\n",
        pad,
        pad,
        escape_xml(&node.label),
        pad
    ));
    ncx.push_str(&format!(
        "{}  <content src=\"{}\"/>\n",
        pad,
        escape_xml(&relativize(base, href))
    ));

    *play_order += 1;

    for child in &node.children {
        write_nav_point(ncx, child, base, play_order, indent + 1);
    }

    ncx.push_str(&format!("{}</navPoint>\n", pad));
}

fn is_ncx(e: &Element, local: &str) -> bool {
    e.local == local && matches!(e.ns.as_deref(), None | Some(NS_NCX))
}

/// Parse the `navMap` of an NCX. Hrefs are relative to the NCX.
pub fn parse_ncx(bytes: &[u8], doc: &str) -> Result<Vec<TocNode>> {
    let text = decode_document(bytes);
    let mut reader = XmlReader::new(&text, doc);
    let mut toc = None;

    loop {
        match reader.next()? {
            Node::Start(e) if reader.depth() == 1 && !is_ncx(&e, "ncx") => {
                return Err(reader.malformed(format!("unexpected root <{}>", e.local)));
            }
            Node::Start(e) if is_ncx(&e, "navMap") && toc.is_none() => {
                toc = Some(parse_nav_points(&mut reader)?);
            }
            Node::Eof => break,
            _ => {}
        }
    }

    toc.ok_or_else(|| reader.malformed("no <navMap>"))
}

/// Child nav points of the element just opened; consumes its end tag.
fn parse_nav_points(reader: &mut XmlReader<'_>) -> Result<Vec<TocNode>> {
    let depth = reader.depth();
    let mut nodes = Vec::new();
    loop {
        match reader.next()? {
            Node::Start(e) if is_ncx(&e, "navPoint") => {
                if let Some(node) = parse_nav_point(reader)? {
                    nodes.push(node);
                }
            }
            Node::Start(_) => reader.skip()?,
            Node::End if reader.depth() < depth => return Ok(nodes),
            Node::Eof => return Err(reader.malformed("unexpected end of document")),
            _ => {}
        }
    }
}

fn parse_nav_point(reader: &mut XmlReader<'_>) -> Result<Option<TocNode>> {
    let depth = reader.depth();
    let mut label = None;
    let mut src = String::new();
    let mut children = Vec::new();

    loop {
        match reader.next()? {
            Node::Start(e) if is_ncx(&e, "navLabel") && label.is_none() => {
                label = Some(collapse_whitespace(&reader.read_text()?));
            }
            Node::Start(e) if is_ncx(&e, "content") => {
                if let Some(s) = e.attr("src") {
                    src = s.trim().to_string();
                }
                reader.skip()?;
            }
            Node::Start(e) if is_ncx(&e, "navPoint") => {
                if let Some(child) = parse_nav_point(reader)? {
                    children.push(child);
                }
            }
            Node::Start(_) => reader.skip()?,
            Node::End if reader.depth() < depth => break,
            Node::Eof => return Err(reader.malformed("unexpected end of document")),
            _ => {}
        }
    }

    if src.is_empty() && children.is_empty() {
        return Ok(None);
    }
    Ok(Some(TocNode {
        label: label.unwrap_or_default(),
        href: src,
        children,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn info() -> DocumentInfo<'static> {
        DocumentInfo {
            title: "Book",
            language: "en",
            identifier: "urn:uuid:42",
        }
    }

    fn sample_toc() -> Vec<TocNode> {
        vec![
            TocNode::new("One", "text/ch1.xhtml")
                .with_child(TocNode::new("One.A", "text/ch1.xhtml#a")),
            TocNode::new("Two", "text/ch2.xhtml"),
        ]
    }

    #[test]
    fn test_render_ncx_head_and_play_order() {
        let ncx = render_ncx(&sample_toc(), "toc.ncx", &info());
        assert!(ncx.contains(r#"<meta name="dtb:uid" content="urn:uuid:42"/>"#));
        assert!(ncx.contains(r#"<meta name="dtb:depth" content="2"/>"#));
        assert!(ncx.contains(r#"playOrder="1""#));
        assert!(ncx.contains(r#"playOrder="3""#));
        assert!(!ncx.contains(r#"playOrder="4""#));
        assert!(ncx.contains(r#"<content src="text/ch1.xhtml#a"/>"#));
    }

    #[test]
    fn test_render_heading_only_node_borrows_child_href() {
        let toc = vec![TocNode::new("Part", "").with_child(TocNode::new("Ch", "text/ch1.xhtml"))];
        let ncx = render_ncx(&toc, "ncx/toc.ncx", &info());
        assert_eq!(ncx.matches(r#"<content src="../text/ch1.xhtml"/>"#).count(), 2);
    }

    #[test]
    fn test_parse_rendered_ncx() {
        let ncx = render_ncx(&sample_toc(), "toc.ncx", &info());
        assert_eq!(parse_ncx(ncx.as_bytes(), "toc.ncx").unwrap(), sample_toc());
    }

    #[test]
    fn test_parse_epub2_ncx() {
        let ncx = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE ncx PUBLIC "-//NISO//DTD ncx 2005-1//EN" "http://www.daisy.org/z3986/2005/ncx-2005-1.dtd">
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head><meta name="dtb:uid" content="x"/></head>
  <docTitle><text>T</text></docTitle>
  <navMap>
    <navPoint id="p1" playOrder="1">
      <navLabel><text>Chapter
        One</text></navLabel>
      <content src="Text/c1.xhtml"/>
      <navPoint id="p2" playOrder="2">
        <navLabel><text>Q &amp; A</text></navLabel>
        <content src="Text/c1.xhtml#qa"/>
      </navPoint>
    </navPoint>
    <navPoint id="empty"><navLabel><text>Nothing</text></navLabel></navPoint>
  </navMap>
</ncx>"#;
        let toc = parse_ncx(ncx.as_bytes(), "toc.ncx").unwrap();
        assert_eq!(toc.len(), 1);
        assert_eq!(toc[0].label, "Chapter One");
        assert_eq!(toc[0].children[0].label, "Q & A");
        assert_eq!(toc[0].children[0].href, "Text/c1.xhtml#qa");
    }

    #[test]
    fn test_parse_ncx_rejects_bad_documents() {
        assert!(matches!(
            parse_ncx(b"<ncx xmlns=\"http://www.daisy.org/z3986/2005/ncx/\"><navMap>", "toc.ncx"),
            Err(Error::MalformedPackage(_))
        ));
        assert!(matches!(
            parse_ncx(b"<ncx xmlns=\"http://www.daisy.org/z3986/2005/ncx/\"/>", "toc.ncx"),
            Err(Error::MalformedPackage(_))
        ));
        assert!(parse_ncx(b"<html/>", "toc.ncx").is_err());
    }
}
