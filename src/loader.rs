//! Reconstruct a [`Package`] from the files of an OCF container.

use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::Path;
use std::rc::Rc;

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::io::{ContainerStore, ZipStore};
use crate::package::{GeneratedDoc, Landmark, ManifestItem, Package, TocNode, try_map_hrefs};
use crate::path::{PathResolver, is_external, parent_dir, resolve};
use crate::util::MEDIA_TYPE_NCX;
use crate::xml::{CONTAINER_PATH, OpfDocument, OpfItem, parse_container, parse_nav, parse_ncx, parse_opf};

/// Loads packages from a [`ContainerStore`].
///
/// Item content is not read up front: every manifest item keeps a handle to
/// the store and fetches its bytes on first access.
///
/// # Example
///
/// ```
/// use quire::{PackageBuilder, PackageLoader};
///
/// let mut builder = PackageBuilder::new();
/// builder.metadata_mut().set_identifier("urn:uuid:1234", None);
/// builder.metadata_mut().add_title("Test Book");
/// builder.add_content_item("ch1.xhtml", "application/xhtml+xml", "<html/>", Some("ch1"))?;
/// builder.set_spine_order(["ch1"])?;
///
/// let package = PackageLoader::new(builder.build()?).load()?;
/// assert_eq!(package.spine()[0].idref, "ch1");
/// # Ok::<(), quire::Error>(())
/// ```
pub struct PackageLoader {
    store: Rc<dyn ContainerStore>,
}

impl PackageLoader {
    pub fn new(store: impl ContainerStore + 'static) -> Self {
        Self {
            store: Rc::new(store),
        }
    }

    /// Read the package.
    ///
    /// The navigation document is preferred over the NCX for the table of
    /// contents. Fails with [`Error::MalformedPackage`] when a required
    /// document is missing or not well-formed, and with
    /// [`Error::ItemNotFound`] when the spine `toc` or a TOC entry names
    /// something the manifest does not contain.
    pub fn load(&self) -> Result<Package> {
        // 1. container.xml -> OPF path
        let container = self.read_required(CONTAINER_PATH, "OCF container")?;
        let opf_path = parse_container(&container)?;
        let resolver = PathResolver::new(&opf_path).map_err(|e| Error::malformed(CONTAINER_PATH, e))?;
        debug!("package document at {}", resolver.opf_path());

        // 2. OPF
        let opf_bytes = self.read_required(resolver.opf_path(), CONTAINER_PATH)?;
        let opf = parse_opf(&opf_bytes, resolver.opf_path())?;
        let opf_doc = resolver.opf_path().to_string();
        let malformed = |e: Error| match e {
            Error::Path { .. } | Error::DuplicateId(_) | Error::DuplicateHref(_) => {
                Error::malformed(&opf_doc, e)
            }
            other => other,
        };

        // 3. Generated-document slots
        let nav_item = opf.items.iter().find(|item| item.has_property("nav"));
        let ncx_item = find_ncx(&opf)?;

        let mut package = Package::with_resolver(resolver);
        package.metadata = opf.metadata.clone();
        package.set_ncx_doc(None).map_err(malformed)?;
        let nav_slot = match nav_item {
            Some(item) => GeneratedDoc::new(item.id.as_str(), item.href.as_str()),
            None => free_nav_slot(&opf),
        };
        package.set_nav_doc(nav_slot).map_err(malformed)?;
        if let Some(item) = ncx_item {
            package
                .set_ncx_doc(Some(GeneratedDoc::new(item.id.as_str(), item.href.as_str())))
                .map_err(malformed)?;
        }

        // 4. Manifest, content left in the store
        for item in &opf.items {
            if nav_item.is_some_and(|nav| nav.id == item.id)
                || ncx_item.is_some_and(|ncx| ncx.id == item.id)
            {
                continue;
            }
            let manifest_item = self.lazy_item(&package, item, &opf_doc)?;
            let manifest_item = if opf.cover_id.as_deref() == Some(item.id.as_str()) {
                manifest_item.with_properties(["cover-image"])
            } else {
                manifest_item
            };
            package.add_item(manifest_item).map_err(malformed)?;
        }

        // 5. Spine
        for entry in &opf.spine {
            package.add_spine_item(&entry.idref, entry.linear)?;
        }

        // 6. Navigation: NAV wins, the NCX is the EPUB 2 fallback
        let mut landmarks = Vec::new();
        if nav_item.is_some() {
            let nav_href = package.nav_doc().href.clone();
            let nav_path = self.locate_required(&package, &nav_href, &opf_doc)?;
            let nav = parse_nav(&self.read_required(&nav_path, &opf_doc)?, &nav_path)?;
            package.toc = rebase_toc(nav.toc, &nav_href, &nav_path)?;
            landmarks = rebase_landmarks(nav.landmarks, &nav_href, &nav_path)?;
        } else if let Some(ncx) = package.ncx_doc().cloned() {
            let ncx_path = self.locate_required(&package, &ncx.href, &opf_doc)?;
            let toc = parse_ncx(&self.read_required(&ncx_path, &opf_doc)?, &ncx_path)?;
            package.toc = rebase_toc(toc, &ncx.href, &ncx_path)?;
        } else {
            warn!("{} has neither a navigation document nor an NCX", opf_doc);
        }

        if landmarks.is_empty() && !opf.guide.is_empty() {
            debug!("using the EPUB 2 guide for landmarks");
            landmarks = rebase_landmarks(opf.guide, "", &opf_doc)?;
        }
        package.landmarks = landmarks;

        package.check_references()?;
        debug!(
            "loaded package with {} items, {} spine entries, {} TOC entries",
            package.len(),
            package.spine().len(),
            package.toc.len()
        );
        Ok(package)
    }

    fn lazy_item(&self, package: &Package, item: &OpfItem, opf_doc: &str) -> Result<ManifestItem> {
        if is_external(&item.href) {
            return Err(Error::malformed(
                opf_doc,
                format!("item '{}' has a remote href '{}'", item.id, item.href),
            ));
        }
        let path = self.locate_required(package, &item.href, opf_doc)?;
        ManifestItem::lazy(
            item.id.clone(),
            &item.href,
            item.media_type.clone(),
            Rc::clone(&self.store),
            path,
        )
        .map(|manifest_item| manifest_item.with_properties(item.properties.iter().cloned()))
        .map_err(|e| match e {
            Error::Path { .. } => Error::malformed(opf_doc, e),
            other => other,
        })
    }

    /// Container path of an OPF-relative href, falling back to the href
    /// taken literally for archives that store escaped file names.
    fn locate(&self, package: &Package, href: &str) -> Option<String> {
        let path = package.resolver().container_path(href);
        if self.store.exists(&path) {
            return Some(path);
        }
        let literal = package.resolver().literal_container_path(href);
        if literal != path && self.store.exists(&literal) {
            warn!("'{}' is stored under its escaped name", path);
            return Some(literal);
        }
        None
    }

    fn locate_required(&self, package: &Package, href: &str, referrer: &str) -> Result<String> {
        self.locate(package, href).ok_or_else(|| {
            Error::malformed(
                referrer,
                format!(
                    "missing file '{}'",
                    package.resolver().container_path(href)
                ),
            )
        })
    }

    fn read_required(&self, path: &str, referrer: &str) -> Result<Vec<u8>> {
        match self.store.read(path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::malformed(
                referrer,
                format!("missing file '{}'", path),
            )),
            Err(e) => Err(e.into()),
        }
    }
}

/// Read a package from any store.
pub fn load(store: impl ContainerStore + 'static) -> Result<Package> {
    PackageLoader::new(store).load()
}

/// Read an `.epub` file.
pub fn read_epub<P: AsRef<Path>>(path: P) -> Result<Package> {
    let file = File::open(path)?;
    read_epub_from_reader(file)
}

/// Read an EPUB archive from any [`Read`] + [`Seek`] source.
pub fn read_epub_from_reader<R: Read + Seek + 'static>(reader: R) -> Result<Package> {
    let store = ZipStore::from_reader(reader)?;
    load(store)
}

/// The NCX named by `<spine toc>`, else the first item with the NCX media type.
fn find_ncx(opf: &OpfDocument) -> Result<Option<&OpfItem>> {
    match &opf.toc_id {
        Some(id) => opf
            .item(id)
            .map(Some)
            .ok_or_else(|| Error::ItemNotFound(id.clone())),
        None => Ok(opf.items.iter().find(|item| item.media_type == MEDIA_TYPE_NCX)),
    }
}

/// A nav slot for packages without a navigation document, clear of every
/// declared id and href.
fn free_nav_slot(opf: &OpfDocument) -> GeneratedDoc {
    let taken = |id: &str, href: &str| {
        opf.items
            .iter()
            .any(|item| item.id == id || item.href == href)
    };
    let mut n = 0;
    loop {
        let (id, href) = match n {
            0 => ("nav".to_string(), "nav.xhtml".to_string()),
            n => (format!("nav-{}", n), format!("nav-{}.xhtml", n)),
        };
        if !taken(&id, &href) {
            return GeneratedDoc::new(id, href);
        }
        n += 1;
    }
}

/// Rewrite hrefs relative to the document at `doc_href` (OPF-relative) into
/// OPF-relative hrefs. Fragment-only hrefs point into that document.
fn rebase_href(href: &str, doc_href: &str) -> Result<String> {
    if href.is_empty() || is_external(href) {
        return Ok(href.to_string());
    }
    if href.starts_with('#') {
        return Ok(format!("{}{}", doc_href, href));
    }
    resolve(parent_dir(doc_href), href)
}

fn rebase_toc(mut toc: Vec<TocNode>, doc_href: &str, doc: &str) -> Result<Vec<TocNode>> {
    try_map_hrefs(&mut toc, &mut |href: &str| {
        rebase_href(href, doc_href).map_err(|e| Error::malformed(doc, e))
    })?;
    Ok(toc)
}

fn rebase_landmarks(landmarks: Vec<Landmark>, doc_href: &str, doc: &str) -> Result<Vec<Landmark>> {
    landmarks
        .into_iter()
        .map(|mut landmark| {
            landmark.href =
                rebase_href(&landmark.href, doc_href).map_err(|e| Error::malformed(doc, e))?;
            Ok(landmark)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PackageBuilder;
    use crate::io::MemoryStore;
    use crate::xml::render_container;

    const EPUB2_OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
    <dc:identifier id="uid" opf:scheme="ISBN">9780000000000</dc:identifier>
    <dc:title>Old Book</dc:title>
    <dc:language>fr</dc:language>
    <meta name="cover" content="cover-img"/>
  </metadata>
  <manifest>
    <item id="toc" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="c1" href="Text/chapter%201.xhtml" media-type="application/xhtml+xml"/>
    <item id="cover-img" href="Images/cover.jpg" media-type="image/jpeg"/>
  </manifest>
  <spine toc="toc">
    <itemref idref="c1"/>
  </spine>
  <guide>
    <reference type="cover" title="Cover" href="Images/cover.jpg"/>
  </guide>
</package>"#;

    const EPUB2_NCX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head><meta name="dtb:uid" content="9780000000000"/></head>
  <docTitle><text>Old Book</text></docTitle>
  <navMap>
    <navPoint id="n1" playOrder="1">
      <navLabel><text>Chapter 1</text></navLabel>
      <content src="Text/chapter%201.xhtml#start"/>
    </navPoint>
  </navMap>
</ncx>"#;

    fn epub2_store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.insert("mimetype", b"application/epub+zip".to_vec());
        store.insert(CONTAINER_PATH, render_container("OPS/content.opf").into_bytes());
        store.insert("OPS/content.opf", EPUB2_OPF.as_bytes().to_vec());
        store.insert("OPS/toc.ncx", EPUB2_NCX.as_bytes().to_vec());
        store.insert("OPS/Text/chapter 1.xhtml", b"<html/>".to_vec());
        store.insert("OPS/Images/cover.jpg", vec![0xFF, 0xD8]);
        store
    }

    fn built_store() -> MemoryStore {
        let mut builder = PackageBuilder::new();
        builder.metadata_mut().set_identifier("urn:uuid:1", None);
        builder.metadata_mut().add_title("New Book");
        builder
            .add_content_item("text/ch1.xhtml", "application/xhtml+xml", "<html/>", Some("ch1"))
            .unwrap();
        builder
            .add_content_item("text/ch2.xhtml", "application/xhtml+xml", "<html/>", Some("ch2"))
            .unwrap();
        builder.set_spine_order(["ch1", "ch2"]).unwrap();
        builder.package_mut().set_linear("ch2", false).unwrap();
        builder
            .add_toc_entry("One", "text/ch1.xhtml")
            .unwrap()
            .children
            .push(TocNode::new("Two", "text/ch2.xhtml#top"));
        builder.add_landmark("Start", "text/ch1.xhtml", "bodymatter").unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_load_epub2_with_ncx() {
        let package = load(epub2_store()).unwrap();
        assert_eq!(package.resolver().opf_path(), "OPS/content.opf");
        assert_eq!(package.metadata.unique_identifier_id(), "uid");
        assert_eq!(package.metadata.language(), Some("fr"));

        let ncx = package.ncx_doc().unwrap();
        assert_eq!((ncx.id.as_str(), ncx.href.as_str()), ("toc", "toc.ncx"));
        assert_eq!(package.nav_doc().id, "nav");
        assert!(!package.contains("toc"));

        assert_eq!(package.toc[0].href, "Text/chapter%201.xhtml#start");
        assert!(package.get_item("cover-img").unwrap().has_property("cover-image"));
        assert_eq!(package.landmarks[0].kind, "cover");
        assert_eq!(package.landmarks[0].href, "Images/cover.jpg");
    }

    #[test]
    fn test_escaped_hrefs_keep_their_files_on_rebuild() {
        let package = load(epub2_store()).unwrap();
        let mut builder = PackageBuilder::from_package(package);
        let rebuilt = builder.build().unwrap();
        assert!(rebuilt.exists("OPS/Text/chapter 1.xhtml"));
        assert!(!rebuilt.exists("OPS/Text/chapter%201.xhtml"));

        let package = load(rebuilt).unwrap();
        assert_eq!(package.get_item("c1").unwrap().href(), "Text/chapter%201.xhtml");
        assert_eq!(package.get_item("c1").unwrap().bytes().unwrap().as_ref(), b"<html/>");
    }

    #[test]
    fn test_escaped_file_name_found_literally() {
        let store = epub2_store();
        let data = store.read("OPS/Text/chapter 1.xhtml").unwrap();
        let store: MemoryStore = store
            .iter()
            .filter(|(path, _)| *path != "OPS/Text/chapter 1.xhtml")
            .map(|(path, data)| (path.to_string(), data.to_vec()))
            .chain([("OPS/Text/chapter%201.xhtml".to_string(), data)])
            .collect();
        let mut package = load(store).unwrap();
        assert_eq!(package.get_item_mut("c1").unwrap().content().unwrap(), b"<html/>");
    }

    #[test]
    fn test_content_is_lazy() {
        let mut package = load(epub2_store()).unwrap();
        let item = package.get_item_mut("c1").unwrap();
        assert!(!item.is_loaded());
        assert_eq!(item.content().unwrap(), b"<html/>");
        assert!(item.is_loaded());
    }

    #[test]
    fn test_load_built_package() {
        let package = load(built_store()).unwrap();
        let ids: Vec<&str> = package.items().map(|i| i.id()).collect();
        assert_eq!(ids, vec!["ch1", "ch2"]);
        assert_eq!(package.nav_doc().href, "nav.xhtml");
        assert_eq!(package.ncx_doc().map(|d| d.id.as_str()), Some("ncx"));
        assert!(!package.spine()[1].linear);
        assert_eq!(package.toc[0].children[0].href, "text/ch2.xhtml#top");
        assert_eq!(package.landmarks[0].kind, "bodymatter");
        assert!(package.metadata.modified().is_some());
    }

    #[test]
    fn test_nav_wins_over_ncx() {
        let mut store = built_store();
        let ncx = String::from_utf8(store.read("OEBPS/toc.ncx").unwrap()).unwrap();
        store.insert(
            "OEBPS/toc.ncx",
            ncx.replace("<text>One</text>", "<text>Stale</text>").into_bytes(),
        );
        let package = load(store).unwrap();
        assert_eq!(package.toc[0].label, "One");
        assert!(package.ncx_doc().is_some());
    }

    #[test]
    fn test_nav_hrefs_rebased_from_subdirectory() {
        let mut store = MemoryStore::new();
        store.insert(CONTAINER_PATH, render_container("content.opf").into_bytes());
        store.insert(
            "content.opf",
            br#"<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="id">x</dc:identifier><dc:title>T</dc:title>
  </metadata>
  <manifest>
    <item id="toc" href="nav/toc.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="c" href="text/c.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine><itemref idref="toc"/><itemref idref="c"/></spine>
</package>"#
                .to_vec(),
        );
        store.insert(
            "nav/toc.xhtml",
            br##"<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops"><body>
  <nav epub:type="toc"><ol>
    <li><a href="../text/c.xhtml">C</a></li>
    <li><a href="#self">Contents</a></li>
  </ol></nav>
</body></html>"##
                .to_vec(),
        );
        store.insert("text/c.xhtml", b"<html/>".to_vec());

        let package = load(store).unwrap();
        assert_eq!(package.nav_doc().href, "nav/toc.xhtml");
        assert!(package.ncx_doc().is_none());
        assert_eq!(package.spine()[0].idref, "toc");
        assert_eq!(package.toc[0].href, "text/c.xhtml");
        assert_eq!(package.toc[1].href, "nav/toc.xhtml#self");
    }

    #[test]
    fn test_unknown_toc_id() {
        let mut store = epub2_store();
        store.insert(
            "OPS/content.opf",
            EPUB2_OPF.replace(r#"<spine toc="toc">"#, r#"<spine toc="ghost">"#).into_bytes(),
        );
        assert!(matches!(load(store), Err(Error::ItemNotFound(id)) if id == "ghost"));
    }

    #[test]
    fn test_toc_pointing_outside_manifest() {
        let mut store = epub2_store();
        store.insert(
            "OPS/toc.ncx",
            EPUB2_NCX.replace("Text/chapter%201.xhtml", "Text/missing.xhtml").into_bytes(),
        );
        assert!(matches!(load(store), Err(Error::ItemNotFound(_))));
    }

    #[test]
    fn test_missing_documents_are_malformed() {
        assert!(matches!(
            load(MemoryStore::new()),
            Err(Error::MalformedPackage(_))
        ));

        let mut store = epub2_store();
        store.insert("OPS/content.opf", b"<package".to_vec());
        assert!(matches!(load(store), Err(Error::MalformedPackage(_))));

        let store: MemoryStore = epub2_store()
            .iter()
            .filter(|(path, _)| !path.ends_with(".jpg"))
            .map(|(path, data)| (path.to_string(), data.to_vec()))
            .collect();
        assert!(matches!(load(store), Err(Error::MalformedPackage(_))));
    }

    #[test]
    fn test_remote_items_are_rejected() {
        let mut store = epub2_store();
        store.insert(
            "OPS/content.opf",
            EPUB2_OPF
                .replace(r#"href="Images/cover.jpg" media"#, r#"href="https://example.com/c.jpg" media"#)
                .into_bytes(),
        );
        assert!(matches!(load(store), Err(Error::MalformedPackage(_))));
    }

    #[test]
    fn test_free_nav_slot_avoids_declared_items() {
        let mut store = epub2_store();
        store.insert(
            "OPS/content.opf",
            EPUB2_OPF
                .replace(r#"id="c1" href="Text/chapter%201.xhtml""#, r#"id="nav" href="Text/chapter%201.xhtml""#)
                .replace(r#"idref="c1""#, r#"idref="nav""#)
                .into_bytes(),
        );
        let package = load(store).unwrap();
        assert_eq!(package.nav_doc().id, "nav-1");
        assert!(package.contains("nav"));
    }

    #[test]
    fn test_rebase_href() {
        assert_eq!(rebase_href("c.xhtml#a", "text/nav.xhtml").unwrap(), "text/c.xhtml#a");
        assert_eq!(rebase_href("#a", "text/nav.xhtml").unwrap(), "text/nav.xhtml#a");
        assert_eq!(rebase_href("", "nav.xhtml").unwrap(), "");
        assert_eq!(rebase_href("mailto:a@b", "nav.xhtml").unwrap(), "mailto:a@b");
        assert!(rebase_href("../../x.xhtml", "nav.xhtml").is_err());
    }
}
