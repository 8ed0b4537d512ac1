//! OPF package document.

use log::debug;

use super::{NS_DC, NS_OPF, NS_XML, Element, Node, XmlReader, decode_document, escape_xml};
use crate::error::{Error, Result};
use crate::package::{Landmark, MetaEntry, Metadata, MetadataKind, Package, SpineEntry};
use crate::util::{MEDIA_TYPE_NCX, MEDIA_TYPE_XHTML};

/// A manifest `<item>` as declared, href still relative to the OPF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpfItem {
    pub id: String,
    pub href: String,
    pub media_type: String,
    pub properties: Vec<String>,
}

impl OpfItem {
    pub fn has_property(&self, property: &str) -> bool {
        self.properties.iter().any(|p| p == property)
    }
}

/// Parsed package document.
#[derive(Debug, Clone)]
pub struct OpfDocument {
    pub version: String,
    pub metadata: Metadata,
    pub items: Vec<OpfItem>,
    pub spine: Vec<SpineEntry>,
    /// `<spine toc="...">`, the id of the NCX item.
    pub toc_id: Option<String>,
    /// Id named by an EPUB 2 `<meta name="cover" content="..."/>`.
    pub cover_id: Option<String>,
    /// EPUB 2 `<guide>` references.
    pub guide: Vec<Landmark>,
}

impl OpfDocument {
    pub fn item(&self, id: &str) -> Option<&OpfItem> {
        self.items.iter().find(|item| item.id == id)
    }
}

pub fn render_opf(package: &Package, default_language: &str) -> String {
    let metadata = &package.metadata;
    let uid = metadata.unique_identifier_id();
    let language = metadata.language().unwrap_or(default_language);

    let mut opf = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="{}" version="3.0" unique-identifier="{}" xml:lang="{}">
  <metadata xmlns:dc="{}" xmlns:opf="{}">
"#,
        NS_OPF,
        escape_xml(uid),
        escape_xml(language),
        NS_DC,
        NS_OPF
    );

    // The identifier the package names must carry its id
    let uid_present = metadata
        .values(&MetadataKind::Identifier)
        .iter()
        .any(|e| e.attr("id") == Some(uid));
    let mut first_identifier = true;

    for (kind, entry) in metadata.iter() {
        let Some(name) = kind.dc_name() else {
            continue;
        };
        let mut attrs: Vec<(&str, &str)> = entry
            .attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        if *kind == MetadataKind::Identifier && first_identifier {
            first_identifier = false;
            if !uid_present {
                attrs.retain(|(k, _)| *k != "id");
                attrs.insert(0, ("id", uid));
            }
        }
        push_element(&mut opf, &format!("dc:{}", name), &attrs, &entry.value);
    }
    if metadata.language().is_none() {
        push_element(&mut opf, "dc:language", &[], language);
    }

    for (kind, entry) in metadata.iter() {
        let MetadataKind::Custom(property) = kind else {
            continue;
        };
        let mut attrs: Vec<(&str, &str)> = vec![("property", property.as_str())];
        attrs.extend(entry.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        push_element(&mut opf, "meta", &attrs, &entry.value);
    }

    if let Some(cover) = package.find_by_property("cover-image") {
        opf.push_str(&format!(
            "    <meta name=\"cover\" content=\"{}\"/>\n",
            escape_xml(cover.id())
        ));
    }

    opf.push_str("  </metadata>\n  <manifest>\n");

    let nav = package.nav_doc();
    opf.push_str(&format!(
        "    <item id=\"{}\" href=\"{}\" media-type=\"{}\" properties=\"nav\"/>\n",
        escape_xml(&nav.id),
        escape_xml(&nav.href),
        MEDIA_TYPE_XHTML
    ));
    if let Some(ncx) = package.ncx_doc() {
        opf.push_str(&format!(
            "    <item id=\"{}\" href=\"{}\" media-type=\"{}\"/>\n",
            escape_xml(&ncx.id),
            escape_xml(&ncx.href),
            MEDIA_TYPE_NCX
        ));
    }

    for item in package.items() {
        opf.push_str(&format!(
            "    <item id=\"{}\" href=\"{}\" media-type=\"{}\"",
            escape_xml(item.id()),
            escape_xml(item.href()),
            escape_xml(item.media_type())
        ));
        if !item.properties().is_empty() {
            let properties: Vec<&str> = item.properties().iter().map(String::as_str).collect();
            opf.push_str(&format!(
                " properties=\"{}\"",
                escape_xml(&properties.join(" "))
            ));
        }
        opf.push_str("/>\n");
    }

    opf.push_str("  </manifest>\n");
    match package.ncx_doc() {
        Some(ncx) => opf.push_str(&format!("  <spine toc=\"{}\">\n", escape_xml(&ncx.id))),
        None => opf.push_str("  <spine>\n"),
    }
    for entry in package.spine() {
        opf.push_str(&format!(
            "    <itemref idref=\"{}\"{}/>\n",
            escape_xml(&entry.idref),
            if entry.linear { "" } else { " linear=\"no\"" }
        ));
    }
    opf.push_str("  </spine>\n</package>\n");
    opf
}

fn push_element(out: &mut String, name: &str, attrs: &[(&str, &str)], text: &str) {
    out.push_str("    <");
    out.push_str(name);
    for (key, value) in attrs {
        out.push_str(&format!(" {}=\"{}\"", key, escape_xml(value)));
    }
    out.push_str(&format!(">{}</{}>\n", escape_xml(text), name));
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Metadata,
    Manifest,
    Spine,
    Guide,
}

/// Parse a package document.
///
/// `doc` names the document in error messages.
pub fn parse_opf(bytes: &[u8], doc: &str) -> Result<OpfDocument> {
    let text = decode_document(bytes);
    let mut reader = XmlReader::new(&text, doc);

    let mut opf = OpfDocument {
        version: String::new(),
        metadata: Metadata::new(),
        items: Vec::new(),
        spine: Vec::new(),
        toc_id: None,
        cover_id: None,
        guide: Vec::new(),
    };
    let mut section = Section::None;
    let mut seen = (false, false, false);

    loop {
        match reader.next()? {
            Node::Start(e) => match reader.depth() {
                1 => {
                    if !e.is(NS_OPF, "package") {
                        return Err(reader.malformed(format!("unexpected root <{}>", e.local)));
                    }
                    opf.version = e.attr("version").unwrap_or_default().to_string();
                    if let Some(uid) = e.attr("unique-identifier") {
                        opf.metadata.set_unique_identifier_id(uid.trim());
                    }
                }
                2 if e.ns.as_deref() == Some(NS_OPF) => {
                    section = match e.local.as_str() {
                        "metadata" => {
                            seen.0 = true;
                            Section::Metadata
                        }
                        "manifest" => {
                            seen.1 = true;
                            Section::Manifest
                        }
                        "spine" => {
                            seen.2 = true;
                            opf.toc_id = e.attr("toc").map(|t| t.trim().to_string());
                            Section::Spine
                        }
                        "guide" => Section::Guide,
                        _ => Section::None,
                    };
                }
                3 => match section {
                    Section::Metadata => read_metadata_element(&mut reader, &e, &mut opf)?,
                    Section::Manifest if e.is(NS_OPF, "item") => {
                        let item = read_item(&reader, &e)?;
                        if opf.item(&item.id).is_some() {
                            return Err(reader.malformed(format!(
                                "duplicate manifest id '{}'",
                                item.id
                            )));
                        }
                        opf.items.push(item);
                    }
                    Section::Spine if e.is(NS_OPF, "itemref") => {
                        let idref = required(&reader, &e, "idref")?;
                        opf.spine.push(SpineEntry {
                            idref,
                            linear: e.attr("linear").map(str::trim) != Some("no"),
                        });
                    }
                    Section::Guide if e.is(NS_OPF, "reference") => {
                        if let (Some(kind), Some(href)) = (e.attr("type"), e.attr("href")) {
                            let label = e.attr("title").unwrap_or(kind);
                            opf.guide.push(Landmark::new(label, href, kind));
                        }
                    }
                    _ => {}
                },
                _ => {}
            },
            Node::End if reader.depth() == 1 => section = Section::None,
            Node::Eof => break,
            _ => {}
        }
    }

    let missing = [(seen.0, "metadata"), (seen.1, "manifest"), (seen.2, "spine")];
    if let Some((_, name)) = missing.iter().find(|(present, _)| !present) {
        return Err(Error::malformed(doc, format!("missing <{}>", name)));
    }
    opf.metadata
        .validate()
        .map_err(|e| Error::malformed(doc, e))?;
    if let Some(entry) = opf.spine.iter().find(|s| opf.item(&s.idref).is_none()) {
        return Err(Error::malformed(
            doc,
            format!("spine references unknown item '{}'", entry.idref),
        ));
    }

    Ok(opf)
}

fn required(reader: &XmlReader<'_>, e: &Element, name: &str) -> Result<String> {
    match e.attr(name).map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(reader.malformed(format!("<{}> without {}", e.local, name))),
    }
}

fn read_item(reader: &XmlReader<'_>, e: &Element) -> Result<OpfItem> {
    Ok(OpfItem {
        id: required(reader, e, "id")?,
        href: required(reader, e, "href")?,
        media_type: required(reader, e, "media-type")?,
        properties: e
            .attr("properties")
            .map(|p| p.split_ascii_whitespace().map(str::to_string).collect())
            .unwrap_or_default(),
    })
}

/// Attributes worth keeping on a metadata entry, with their serialized names.
fn entry_attributes(e: &Element, skip: &[&str]) -> Vec<(String, String)> {
    e.attrs
        .iter()
        .filter_map(|a| {
            let name = match a.ns.as_deref() {
                None if skip.contains(&a.local.as_str()) => return None,
                None => a.local.clone(),
                Some(NS_XML) => format!("xml:{}", a.local),
                Some(NS_OPF) => format!("opf:{}", a.local),
                Some(_) => return None,
            };
            Some((name, a.value.clone()))
        })
        .collect()
}

fn read_metadata_element(
    reader: &mut XmlReader<'_>,
    e: &Element,
    opf: &mut OpfDocument,
) -> Result<()> {
    match e.ns.as_deref() {
        Some(NS_DC) => {
            let value = reader.read_text()?.trim().to_string();
            match MetadataKind::from_dc_name(&e.local) {
                Some(kind) => {
                    let entry = MetaEntry {
                        value,
                        attributes: entry_attributes(e, &[]),
                    };
                    opf.metadata.push(kind, entry);
                }
                None => debug!("dropping unsupported metadata dc:{}", e.local),
            }
        }
        Some(NS_OPF) if e.local == "meta" => {
            if let Some(property) = e.attr("property") {
                let value = reader.read_text()?.trim().to_string();
                opf.metadata.push(
                    MetadataKind::Custom(property.trim().to_string()),
                    MetaEntry {
                        value,
                        attributes: entry_attributes(e, &["property"]),
                    },
                );
            } else {
                reader.skip()?;
                match (e.attr("name"), e.attr("content")) {
                    (Some("cover"), Some(content)) => opf.cover_id = Some(content.trim().to_string()),
                    (Some(name), _) => debug!("dropping legacy meta '{}'", name),
                    _ => {}
                }
            }
        }
        _ => reader.skip()?,
    }
    Ok(())
}
