use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

use super::{decode_document, escape_xml};
use crate::error::{Error, Result};

/// Rewrite the `href` and `src` attributes of an XHTML document.
///
/// `relink` receives each attribute value (unescaped) and returns the
/// replacement, if any. Everything else is copied through event by event.
/// Returns `None` when no attribute changed.
pub(crate) fn rewrite_links(
    bytes: &[u8],
    doc: &str,
    mut relink: impl FnMut(&str) -> Option<String>,
) -> Result<Option<String>> {
    let text = decode_document(bytes);
    let mut reader = Reader::from_str(&text);
    let mut writer = Writer::new(Vec::with_capacity(text.len()));
    let mut changed = false;

    loop {
        let event = reader.read_event().map_err(|e| Error::malformed(doc, e))?;
        let event = match event {
            Event::Eof => break,
            Event::Start(e) => match relink_element(&e, doc, &mut relink)? {
                Some(e) => {
                    changed = true;
                    Event::Start(e)
                }
                None => Event::Start(e),
            },
            Event::Empty(e) => match relink_element(&e, doc, &mut relink)? {
                Some(e) => {
                    changed = true;
                    Event::Empty(e)
                }
                None => Event::Empty(e),
            },
            other => other,
        };
        writer.write_event(event)?;
    }

    if !changed {
        return Ok(None);
    }
    String::from_utf8(writer.into_inner())
        .map(Some)
        .map_err(|e| Error::malformed(doc, e))
}

fn relink_element(
    start: &BytesStart<'_>,
    doc: &str,
    relink: &mut impl FnMut(&str) -> Option<String>,
) -> Result<Option<BytesStart<'static>>> {
    let mut attrs: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
    let mut changed = false;

    for attr in start.attributes() {
        let attr = attr.map_err(|e| Error::malformed(doc, e))?;
        let key = attr.key.as_ref().to_vec();
        let raw = attr.value.into_owned();
        let local = key.rsplit(|&b| b == b':').next().unwrap_or_default();

        if matches!(local, b"href" | b"src") {
            let value = String::from_utf8_lossy(&raw);
            if let Ok(value) = quick_xml::escape::unescape(&value)
                && let Some(new) = relink(&value)
            {
                attrs.push((key, escape_xml(&new).into_bytes()));
                changed = true;
                continue;
            }
        }
        // Attributes are rewritten with double quotes
        let raw = if raw.contains(&b'"') {
            String::from_utf8_lossy(&raw).replace('"', "&quot;").into_bytes()
        } else {
            raw
        };
        attrs.push((key, raw));
    }

    if !changed {
        return Ok(None);
    }
    let mut element = start.to_owned();
    element.clear_attributes();
    for (key, value) in &attrs {
        element.push_attribute((key.as_slice(), value.as_slice()));
    }
    Ok(Some(element))
}
