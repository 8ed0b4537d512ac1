use super::{NS_CONTAINER, Node, XmlReader, decode_document, escape_xml};
use crate::error::{Error, Result};
use crate::util::MEDIA_TYPE_OPF;

/// Fixed location of the OCF container document.
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

pub fn render_container(opf_path: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="{}">
  <rootfiles>
    <rootfile full-path="{}" media-type="{}"/>
  </rootfiles>
</container>
"#,
        NS_CONTAINER,
        escape_xml(opf_path),
        MEDIA_TYPE_OPF
    )
}

/// Extract the OPF path: the `full-path` of the first `<rootfile>`.
pub fn parse_container(bytes: &[u8]) -> Result<String> {
    let text = decode_document(bytes);
    let mut reader = XmlReader::new(&text, CONTAINER_PATH);
    let mut full_path = None;

    loop {
        match reader.next()? {
            Node::Start(e) if full_path.is_none() && e.is(NS_CONTAINER, "rootfile") => {
                full_path = e
                    .attr("full-path")
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string);
            }
            Node::Eof => break,
            _ => {}
        }
    }

    full_path.ok_or_else(|| Error::malformed(CONTAINER_PATH, "no rootfile with a full-path"))
}
