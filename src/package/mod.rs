//! In-memory EPUB package model.
//!
//! A [`Package`] owns the metadata, the manifest, the spine, the table of
//! contents and the landmarks. The navigation document and the NCX are not
//! ordinary manifest items: they are regenerated from the TOC whenever the
//! package is built, so the package only records where they live.

mod item;
mod metadata;
mod toc;

use std::collections::{HashMap, HashSet};

use log::warn;

pub use item::{Content, ManifestItem};
pub use metadata::{DEFAULT_UNIQUE_IDENTIFIER_ID, MetaEntry, Metadata, MetadataKind};
pub use toc::{Landmark, TocNode, toc_depth, walk_toc};
pub(crate) use toc::{normalize_labels, try_map_hrefs};

use crate::error::{Error, Result};
use crate::path::{PathResolver, is_ocf_path, split_fragment};

/// An item in the reading order (spine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpineEntry {
    pub idref: String,
    pub linear: bool,
}

impl SpineEntry {
    pub fn new(idref: impl Into<String>) -> Self {
        Self {
            idref: idref.into(),
            linear: true,
        }
    }
}

/// Manifest slot of a document the builder generates (NAV or NCX).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedDoc {
    pub id: String,
    /// Href relative to the OPF directory.
    pub href: String,
}

impl GeneratedDoc {
    pub fn new(id: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            href: href.into(),
        }
    }

    pub(crate) fn default_nav() -> Self {
        Self::new("nav", "nav.xhtml")
    }

    pub(crate) fn default_ncx() -> Self {
        Self::new("ncx", "toc.ncx")
    }
}

/// An EPUB package: the aggregate of everything a `.epub` declares.
#[derive(Debug, Clone)]
pub struct Package {
    pub metadata: Metadata,
    pub toc: Vec<TocNode>,
    pub landmarks: Vec<Landmark>,
    items: Vec<ManifestItem>,
    ids: HashMap<String, usize>,
    hrefs: HashSet<String>,
    /// Container paths of the items, to catch hrefs that differ only in
    /// percent-escapes.
    paths: HashSet<String>,
    spine: Vec<SpineEntry>,
    resolver: PathResolver,
    nav: GeneratedDoc,
    ncx: Option<GeneratedDoc>,
}

impl Default for Package {
    fn default() -> Self {
        Self::with_resolver(PathResolver::default())
    }
}

impl Package {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty package whose OPF document lives where `resolver` says.
    pub fn with_resolver(resolver: PathResolver) -> Self {
        Self {
            metadata: Metadata::new(),
            toc: Vec::new(),
            landmarks: Vec::new(),
            items: Vec::new(),
            ids: HashMap::new(),
            hrefs: HashSet::new(),
            paths: HashSet::new(),
            spine: Vec::new(),
            resolver,
            nav: GeneratedDoc::default_nav(),
            ncx: Some(GeneratedDoc::default_ncx()),
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Move the OPF document; item hrefs stay relative to it.
    ///
    /// Fails with [`Error::DuplicateHref`] if an item or generated document
    /// would land on the OPF or on an OCF container file.
    pub fn set_opf_path(&mut self, opf_path: &str) -> Result<()> {
        let resolver = PathResolver::new(opf_path)?;
        let hrefs = self
            .items
            .iter()
            .map(|item| item.href())
            .chain(std::iter::once(self.nav.href.as_str()))
            .chain(self.ncx.iter().map(|doc| doc.href.as_str()));
        for href in hrefs {
            if is_reserved_path(&resolver, &resolver.container_path(href)) {
                return Err(Error::DuplicateHref(href.to_string()));
            }
        }
        self.paths = self
            .items
            .iter()
            .map(|item| resolver.container_path(item.href()))
            .collect();
        self.resolver = resolver;
        Ok(())
    }

    /// Where the navigation document is generated.
    pub fn nav_doc(&self) -> &GeneratedDoc {
        &self.nav
    }

    /// Where the NCX is generated, if at all.
    pub fn ncx_doc(&self) -> Option<&GeneratedDoc> {
        self.ncx.as_ref()
    }

    /// Relocate the navigation document.
    ///
    /// Fails if the id or href is already used by a manifest item or the NCX.
    pub fn set_nav_doc(&mut self, doc: GeneratedDoc) -> Result<()> {
        let doc = self.checked_slot(doc, self.ncx.as_ref())?;
        // Keep spine references to the old nav id pointing at the new one
        for entry in &mut self.spine {
            if entry.idref == self.nav.id {
                entry.idref = doc.id.clone();
            }
        }
        self.nav = doc;
        Ok(())
    }

    /// Relocate or disable (`None`) the NCX.
    pub fn set_ncx_doc(&mut self, doc: Option<GeneratedDoc>) -> Result<()> {
        self.ncx = match doc {
            Some(doc) => Some(self.checked_slot(doc, Some(&self.nav))?),
            None => None,
        };
        Ok(())
    }

    fn checked_slot(&self, doc: GeneratedDoc, other: Option<&GeneratedDoc>) -> Result<GeneratedDoc> {
        let href = self.resolver.normalize(&doc.href)?;
        if self.ids.contains_key(&doc.id) || other.is_some_and(|o| o.id == doc.id) {
            return Err(Error::DuplicateId(doc.id));
        }
        let path = self.resolver.container_path(&href);
        if self.paths.contains(&path)
            || is_reserved_path(&self.resolver, &path)
            || other.is_some_and(|o| self.resolver.container_path(&o.href) == path)
        {
            return Err(Error::DuplicateHref(href));
        }
        Ok(GeneratedDoc { id: doc.id, href })
    }

    fn id_taken(&self, id: &str) -> bool {
        self.ids.contains_key(id)
            || self.nav.id == id
            || self.ncx.as_ref().is_some_and(|d| d.id == id)
    }

    fn href_taken(&self, href: &str) -> bool {
        let path = self.resolver.container_path(href);
        self.paths.contains(&path)
            || is_reserved_path(&self.resolver, &path)
            || self.resolver.container_path(&self.nav.href) == path
            || self
                .ncx
                .as_ref()
                .is_some_and(|d| self.resolver.container_path(&d.href) == path)
    }

    /// Whether `id` is free for a new manifest item.
    pub fn is_id_available(&self, id: &str) -> bool {
        !self.id_taken(id)
    }

    /// Add an item to the manifest.
    ///
    /// Fails with [`Error::DuplicateId`] or [`Error::DuplicateHref`] without
    /// touching the manifest.
    pub fn add_item(&mut self, item: ManifestItem) -> Result<&mut ManifestItem> {
        if self.id_taken(item.id()) {
            return Err(Error::DuplicateId(item.id().to_string()));
        }
        if self.href_taken(item.href()) {
            return Err(Error::DuplicateHref(item.href().to_string()));
        }

        let index = self.items.len();
        self.ids.insert(item.id().to_string(), index);
        self.hrefs.insert(item.href().to_string());
        self.paths.insert(self.resolver.container_path(item.href()));
        self.items.push(item);
        Ok(&mut self.items[index])
    }

    pub fn get_item(&self, id: &str) -> Result<&ManifestItem> {
        self.ids
            .get(id)
            .map(|&i| &self.items[i])
            .ok_or_else(|| Error::ItemNotFound(id.to_string()))
    }

    pub fn get_item_mut(&mut self, id: &str) -> Result<&mut ManifestItem> {
        match self.ids.get(id) {
            Some(&i) => Ok(&mut self.items[i]),
            None => Err(Error::ItemNotFound(id.to_string())),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains_key(id)
    }

    /// Find an item by OPF-relative href (any fragment is ignored).
    pub fn find_by_href(&self, href: &str) -> Option<&ManifestItem> {
        let (path, _) = split_fragment(href);
        self.items.iter().find(|item| item.href() == path)
    }

    /// First item carrying `property`.
    pub fn find_by_property(&self, property: &str) -> Option<&ManifestItem> {
        self.items.iter().find(|item| item.has_property(property))
    }

    /// Remove an item and every spine entry referencing it.
    ///
    /// TOC entries and landmarks pointing at it are left alone; building
    /// will report them.
    pub fn remove_item(&mut self, id: &str) -> Result<ManifestItem> {
        let index = *self
            .ids
            .get(id)
            .ok_or_else(|| Error::ItemNotFound(id.to_string()))?;

        let item = self.items.remove(index);
        self.hrefs.remove(item.href());
        self.paths.remove(&self.resolver.container_path(item.href()));
        self.ids = self
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.id().to_string(), i))
            .collect();
        self.spine.retain(|entry| entry.idref != id);
        Ok(item)
    }

    /// Give several items new hrefs at once.
    ///
    /// `moves` maps item ids to their new (normalized) hrefs. Fails without
    /// moving anything if an id is unknown or two items, a generated
    /// document or a container file would share a path.
    pub fn relocate_items(&mut self, moves: &HashMap<String, String>) -> Result<()> {
        for id in moves.keys() {
            self.get_item(id)?;
        }

        let mut paths = HashSet::with_capacity(self.items.len());
        for item in &self.items {
            let href = moves.get(item.id()).map_or(item.href(), String::as_str);
            let path = self.resolver.container_path(href);
            let clashes = is_reserved_path(&self.resolver, &path)
                || self.resolver.container_path(&self.nav.href) == path
                || self
                    .ncx
                    .as_ref()
                    .is_some_and(|d| self.resolver.container_path(&d.href) == path);
            if clashes || !paths.insert(path) {
                return Err(Error::DuplicateHref(href.to_string()));
            }
        }

        for item in &mut self.items {
            if let Some(href) = moves.get(item.id()) {
                item.set_href(href.clone());
            }
        }
        self.hrefs = self.items.iter().map(|item| item.href().to_string()).collect();
        self.paths = paths;
        Ok(())
    }

    /// Manifest items in insertion order.
    pub fn items(&self) -> impl Iterator<Item = &ManifestItem> {
        self.items.iter()
    }

    pub fn items_mut(&mut self) -> impl Iterator<Item = &mut ManifestItem> {
        self.items.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn spine(&self) -> &[SpineEntry] {
        &self.spine
    }

    /// Spine entries resolved to their manifest items (the nav document,
    /// which has no item, is skipped).
    pub fn spine_items(&self) -> impl Iterator<Item = &ManifestItem> {
        self.spine
            .iter()
            .filter_map(|entry| self.get_item(&entry.idref).ok())
    }

    /// Whether `id` may appear in the spine.
    pub fn is_spine_target(&self, id: &str) -> bool {
        self.contains(id) || self.nav.id == id
    }

    /// Append `id` to the reading order.
    ///
    /// Adding an id that is already in the spine is ignored.
    pub fn add_spine_item(&mut self, id: &str, linear: bool) -> Result<()> {
        if !self.is_spine_target(id) {
            return Err(Error::ItemNotFound(id.to_string()));
        }
        if self.spine.iter().any(|entry| entry.idref == id) {
            warn!("item '{}' is already in the spine, skipping", id);
            return Ok(());
        }
        self.spine.push(SpineEntry {
            idref: id.to_string(),
            linear,
        });
        Ok(())
    }

    /// Replace the reading order.
    ///
    /// All-or-nothing: if any id is unknown the spine is left unchanged.
    /// Ids already in the spine keep their `linear` flag.
    pub fn set_spine_order<I, S>(&mut self, ids: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut spine = Vec::new();
        for id in ids {
            let id = id.as_ref();
            if !self.is_spine_target(id) {
                return Err(Error::ItemNotFound(id.to_string()));
            }
            let linear = self
                .spine
                .iter()
                .find(|entry| entry.idref == id)
                .is_none_or(|entry| entry.linear);
            spine.push(SpineEntry {
                idref: id.to_string(),
                linear,
            });
        }
        self.spine = spine;
        Ok(())
    }

    /// Change the `linear` flag of a spine entry.
    pub fn set_linear(&mut self, id: &str, linear: bool) -> Result<()> {
        let entry = self
            .spine
            .iter_mut()
            .find(|entry| entry.idref == id)
            .ok_or_else(|| Error::ItemNotFound(id.to_string()))?;
        entry.linear = linear;
        Ok(())
    }

    /// Whether `href` (OPF-relative, fragment ignored) names a document in
    /// the package, the generated navigation document included.
    pub fn is_known_href(&self, href: &str) -> bool {
        let (path, _) = split_fragment(href);
        self.hrefs.contains(path) || self.nav.href == path
    }

    /// Check that every internal TOC and landmark href points into the package.
    pub fn check_references(&self) -> Result<()> {
        let mut missing = None;
        walk_toc(&self.toc, &mut |node| {
            if missing.is_none()
                && !node.href.is_empty()
                && !node.is_external()
                && !self.is_known_href(&node.href)
            {
                missing = Some(node.href.clone());
            }
        });
        if let Some(href) = missing {
            return Err(Error::ItemNotFound(href));
        }

        for landmark in &self.landmarks {
            if !crate::path::is_external(&landmark.href) && !self.is_known_href(&landmark.href) {
                return Err(Error::ItemNotFound(landmark.href.clone()));
            }
        }
        Ok(())
    }

    /// Check everything a build requires: metadata, a non-empty manifest and
    /// resolvable references.
    pub fn validate(&self) -> Result<()> {
        self.metadata.validate()?;
        if self.items.is_empty() {
            return Err(Error::EmptyPackage);
        }
        self.check_references()
    }
}

/// Container paths no manifest item or generated document may occupy.
fn is_reserved_path(resolver: &PathResolver, path: &str) -> bool {
    path == resolver.opf_path() || is_ocf_path(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xhtml(id: &str, href: &str) -> ManifestItem {
        ManifestItem::new(id, href, "application/xhtml+xml", "<html/>").unwrap()
    }

    fn package_with(ids: &[&str]) -> Package {
        let mut package = Package::new();
        for id in ids {
            package.add_item(xhtml(id, &format!("{}.xhtml", id))).unwrap();
        }
        package
    }

    #[test]
    fn test_duplicate_id_leaves_manifest_unchanged() {
        let mut package = package_with(&["ch1"]);
        let err = package.add_item(xhtml("ch1", "other.xhtml")).unwrap_err();
        assert!(matches!(err, Error::DuplicateId(id) if id == "ch1"));
        assert_eq!(package.len(), 1);
        assert!(package.find_by_href("other.xhtml").is_none());
    }

    #[test]
    fn test_duplicate_href_leaves_manifest_unchanged() {
        let mut package = package_with(&["ch1"]);
        let err = package.add_item(xhtml("ch2", "./ch1.xhtml")).unwrap_err();
        assert!(matches!(err, Error::DuplicateHref(href) if href == "ch1.xhtml"));
        assert_eq!(package.len(), 1);
        assert!(!package.contains("ch2"));
    }

    #[test]
    fn test_set_opf_path_keeps_hrefs() {
        let mut package = package_with(&["ch1"]);
        package.set_opf_path("content.opf").unwrap();
        assert_eq!(package.resolver().opf_dir(), "");
        assert_eq!(package.resolver().container_path("ch1.xhtml"), "ch1.xhtml");
        assert!(package.find_by_href("ch1.xhtml").is_some());
        assert!(package.set_opf_path("../content.opf").is_err());
    }

    #[test]
    fn test_generated_slots_are_reserved() {
        let mut package = Package::new();
        assert!(matches!(
            package.add_item(xhtml("nav", "x.xhtml")),
            Err(Error::DuplicateId(_))
        ));
        assert!(matches!(
            package.add_item(xhtml("x", "toc.ncx")),
            Err(Error::DuplicateHref(_))
        ));
        assert!(!package.is_id_available("ncx"));
    }

    #[test]
    fn test_package_and_container_files_are_reserved() {
        let mut package = Package::new();
        assert!(matches!(
            package.add_item(xhtml("opf", "package.opf")),
            Err(Error::DuplicateHref(href)) if href == "package.opf"
        ));
        assert!(package.set_nav_doc(GeneratedDoc::new("n", "package.opf")).is_err());

        let mut package = Package::with_resolver(PathResolver::new("content.opf").unwrap());
        for href in ["content.opf", "mimetype", "META-INF/container.xml", "META-INF/x.xml"] {
            assert!(
                matches!(package.add_item(xhtml("x", href)), Err(Error::DuplicateHref(_))),
                "{} should be reserved",
                href
            );
        }
        assert!(package.is_empty());

        // Moving the OPF onto an existing item is refused
        package.add_item(xhtml("a", "a.opf")).unwrap();
        assert!(matches!(
            package.set_opf_path("a.opf"),
            Err(Error::DuplicateHref(href)) if href == "a.opf"
        ));
        assert_eq!(package.resolver().opf_path(), "content.opf");
    }

    #[test]
    fn test_escaped_href_collides_with_plain_one() {
        let mut package = Package::new();
        package.add_item(xhtml("a", "chapter 1.xhtml")).unwrap();
        assert!(matches!(
            package.add_item(xhtml("b", "chapter%201.xhtml")),
            Err(Error::DuplicateHref(_))
        ));
    }

    #[test]
    fn test_get_item_not_found() {
        let package = Package::new();
        assert!(matches!(
            package.get_item("missing"),
            Err(Error::ItemNotFound(id)) if id == "missing"
        ));
    }

    #[test]
    fn test_set_spine_order_is_atomic() {
        let mut package = package_with(&["a", "b", "c"]);
        package.set_spine_order(["a", "b"]).unwrap();
        package.set_linear("b", false).unwrap();

        let err = package.set_spine_order(["c", "missing", "a"]).unwrap_err();
        assert!(matches!(err, Error::ItemNotFound(id) if id == "missing"));
        let order: Vec<_> = package.spine().iter().map(|e| e.idref.as_str()).collect();
        assert_eq!(order, vec!["a", "b"]);

        package.set_spine_order(["b", "c", "a"]).unwrap();
        let order: Vec<_> = package.spine().iter().map(|e| e.idref.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
        // linear flag follows the id
        assert!(!package.spine()[0].linear);
        assert!(package.spine()[1].linear);
    }

    #[test]
    fn test_spine_may_reference_nav() {
        let mut package = package_with(&["a"]);
        package.add_spine_item("nav", false).unwrap();
        package.add_spine_item("a", true).unwrap();
        package.add_spine_item("a", true).unwrap();
        assert_eq!(package.spine().len(), 2);
        assert_eq!(package.spine_items().count(), 1);
    }

    #[test]
    fn test_remove_item_updates_spine_and_index() {
        let mut package = package_with(&["a", "b", "c"]);
        package.set_spine_order(["a", "b", "c"]).unwrap();

        let removed = package.remove_item("b").unwrap();
        assert_eq!(removed.href(), "b.xhtml");
        assert_eq!(package.len(), 2);
        assert_eq!(package.get_item("c").unwrap().href(), "c.xhtml");
        assert!(package.spine().iter().all(|e| e.idref != "b"));
        // href is free again
        package.add_item(xhtml("b2", "b.xhtml")).unwrap();
    }

    #[test]
    fn test_relocate_items_is_all_or_nothing() {
        let mut package = package_with(&["a", "b"]);
        let clash: HashMap<String, String> = [
            ("a".to_string(), "Text/x.xhtml".to_string()),
            ("b".to_string(), "Text/x.xhtml".to_string()),
        ]
        .into();
        assert!(matches!(
            package.relocate_items(&clash),
            Err(Error::DuplicateHref(href)) if href == "Text/x.xhtml"
        ));
        assert_eq!(package.get_item("a").unwrap().href(), "a.xhtml");

        let onto_nav: HashMap<String, String> = [("a".to_string(), "nav.xhtml".to_string())].into();
        assert!(package.relocate_items(&onto_nav).is_err());

        let moves: HashMap<String, String> = [
            ("a".to_string(), "Text/a.xhtml".to_string()),
            ("b".to_string(), "a.xhtml".to_string()),
        ]
        .into();
        package.relocate_items(&moves).unwrap();
        assert_eq!(package.get_item("a").unwrap().href(), "Text/a.xhtml");
        assert_eq!(package.find_by_href("a.xhtml").unwrap().id(), "b");
        assert!(package.is_known_href("Text/a.xhtml"));
        assert!(!package.is_known_href("b.xhtml"));
        package.add_item(xhtml("c", "b.xhtml")).unwrap();
    }

    #[test]
    fn test_check_references() {
        let mut package = package_with(&["ch1"]);
        package.toc.push(
            TocNode::new("Chapter 1", "ch1.xhtml")
                .with_child(TocNode::new("Section", "ch1.xhtml#s1"))
                .with_child(TocNode::new("Elsewhere", "https://example.com")),
        );
        package.landmarks.push(Landmark::new("Contents", "nav.xhtml#toc", "toc"));
        assert!(package.check_references().is_ok());

        package.toc.push(TocNode::new("Ghost", "ghost.xhtml#x"));
        assert!(matches!(
            package.check_references(),
            Err(Error::ItemNotFound(href)) if href == "ghost.xhtml#x"
        ));
    }

    #[test]
    fn test_validate_gates() {
        let mut package = Package::new();
        package.metadata.set_identifier("urn:uuid:1", None);
        package.metadata.add_title("T");
        assert!(matches!(package.validate(), Err(Error::EmptyPackage)));

        package.add_item(xhtml("a", "a.xhtml")).unwrap();
        assert!(package.validate().is_ok());
    }

    #[test]
    fn test_relocate_generated_docs() {
        let mut package = package_with(&["a"]);
        package.add_spine_item("nav", true).unwrap();
        package
            .set_nav_doc(GeneratedDoc::new("toc-doc", "Text/./nav.xhtml"))
            .unwrap();
        assert_eq!(package.nav_doc().href, "Text/nav.xhtml");
        assert_eq!(package.spine()[0].idref, "toc-doc");

        assert!(matches!(
            package.set_ncx_doc(Some(GeneratedDoc::new("a", "x.ncx"))),
            Err(Error::DuplicateId(_))
        ));
        package.set_ncx_doc(None).unwrap();
        assert!(package.ncx_doc().is_none());
        package.add_item(xhtml("ncx", "toc.ncx")).unwrap();
    }
}
