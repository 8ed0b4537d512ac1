use super::{Node, XmlReader, collapse_whitespace, decode_document};
use crate::error::Result;

/// A heading found in a content document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    /// 1 for `<h1>` through 6 for `<h6>`.
    pub level: u8,
    pub id: Option<String>,
    pub text: String,
}

/// Headings of an XHTML document up to `max_level`, in document order.
///
/// Headings with no text are skipped.
pub fn extract_headings(bytes: &[u8], max_level: u8, doc: &str) -> Result<Vec<Heading>> {
    let text = decode_document(bytes);
    let mut reader = XmlReader::new(&text, doc);
    let mut headings = Vec::new();

    loop {
        match reader.next()? {
            Node::Start(e) => {
                let Some(level) = heading_level(&e.local) else {
                    continue;
                };
                if level > max_level || !e.is_html(&e.local) {
                    continue;
                }
                let id = e.attr("id").map(str::trim).filter(|id| !id.is_empty());
                let id = id.map(str::to_string);
                let text = collapse_whitespace(&reader.read_text()?);
                if !text.is_empty() {
                    headings.push(Heading { level, id, text });
                }
            }
            Node::Eof => break,
            _ => {}
        }
    }

    Ok(headings)
}

fn heading_level(local: &str) -> Option<u8> {
    match local.as_bytes() {
        [b'h', digit @ b'1'..=b'6'] => Some(digit - b'0'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<body>
  <h1 id="top">Chapter <em>One</em></h1>
  <p>Text</p>
  <section><h2 id="s1">First
     Section</h2><h3 id="deep">Deep</h3></section>
  <h2>No Id</h2>
  <h2 id="blank">  </h2>
  <header>Not a heading</header>
</body>
</html>"#;

    #[test]
    fn test_extract_headings() {
        let headings = extract_headings(DOC.as_bytes(), 2, "ch1.xhtml").unwrap();
        assert_eq!(
            headings,
            vec![
                Heading {
                    level: 1,
                    id: Some("top".into()),
                    text: "Chapter One".into()
                },
                Heading {
                    level: 2,
                    id: Some("s1".into()),
                    text: "First Section".into()
                },
                Heading {
                    level: 2,
                    id: None,
                    text: "No Id".into()
                },
            ]
        );
    }

    #[test]
    fn test_max_level() {
        let headings = extract_headings(DOC.as_bytes(), 6, "ch1.xhtml").unwrap();
        assert_eq!(headings.len(), 4);
        assert_eq!(headings[2].level, 3);
        assert!(extract_headings(DOC.as_bytes(), 0, "ch1.xhtml").unwrap().is_empty());
    }

    #[test]
    fn test_heading_level() {
        assert_eq!(heading_level("h1"), Some(1));
        assert_eq!(heading_level("h6"), Some(6));
        assert_eq!(heading_level("h7"), None);
        assert_eq!(heading_level("header"), None);
    }

    #[test]
    fn test_malformed_document() {
        assert!(extract_headings(b"<html><h1>x</html>", 2, "bad.xhtml").is_err());
    }
}
