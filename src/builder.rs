//! Assemble a package and serialize it to OCF bytes.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Seek, Write};
use std::path::Path;

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::io::{EPUB_MIMETYPE, MemoryStore, write_zip};
use crate::markdown::{CommonMarkConverter, MarkdownConverter};
use crate::package::{
    GeneratedDoc, Landmark, ManifestItem, Metadata, Package, TocNode, normalize_labels,
    try_map_hrefs,
};
use crate::path::{
    DEFAULT_OPF_PATH, MIMETYPE_PATH, PathResolver, is_external, parent_dir, relativize, resolve,
    split_fragment,
};
use crate::util::{
    MEDIA_TYPE_CSS, MEDIA_TYPE_JAVASCRIPT, MEDIA_TYPE_XHTML, decode_text, detect_media_format,
    folder_for_media_type, rewrite_css_urls, strip_bom,
};
use crate::xml::{
    CONTAINER_PATH, DocumentInfo, NS_EPUB, NS_XHTML, collapse_whitespace, escape_xml,
    extract_headings, render_container, render_nav, render_ncx, render_opf, rewrite_links,
};

/// Configuration for building a package.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Container path of the package document.
    pub opf_path: String,
    /// OPF-relative href of the generated navigation document.
    pub nav_href: String,
    /// OPF-relative href of the generated NCX; `None` leaves it out.
    pub ncx_href: Option<String>,
    /// Language used when the metadata declares none.
    pub default_language: String,
    /// Place new items under `Text/`, `Styles/`, `Images/`, ... by media type.
    pub organize_by_media_type: bool,
    /// Deflate level for written archives (0-9, default 6).
    pub compression_level: Option<u32>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            opf_path: DEFAULT_OPF_PATH.to_string(),
            nav_href: "nav.xhtml".to_string(),
            ncx_href: Some("toc.ncx".to_string()),
            default_language: "en".to_string(),
            organize_by_media_type: false,
            compression_level: None,
        }
    }
}

/// Per-document settings for [`PackageBuilder::add_xhtml_with`] and
/// [`PackageBuilder::add_markdown_item_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentOptions<'a> {
    /// Manifest id; allocated when `None`.
    pub id: Option<&'a str>,
    /// Document `<title>`; defaults to the file stem.
    pub title: Option<&'a str>,
    /// Document language; defaults to the package language.
    pub language: Option<&'a str>,
    /// Ids of CSS items to link from the document head.
    pub stylesheets: &'a [&'a str],
}

/// Builds an EPUB 3 package.
///
/// # Example
///
/// ```
/// use quire::PackageBuilder;
///
/// let mut builder = PackageBuilder::new();
/// builder.metadata_mut().set_identifier("urn:uuid:1234", None);
/// builder.metadata_mut().add_title("Test Book");
/// builder.add_content_item(
///     "text/ch1.xhtml",
///     "application/xhtml+xml",
///     "<html/>",
///     Some("ch1"),
/// )?;
/// builder.set_spine_order(["ch1"])?;
///
/// let files = builder.build()?;
/// assert!(files.get("OEBPS/package.opf").is_some());
/// # Ok::<(), quire::Error>(())
/// ```
pub struct PackageBuilder {
    package: Package,
    options: BuildOptions,
    next_id: usize,
    converter: Box<dyn MarkdownConverter>,
}

impl Default for PackageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageBuilder {
    /// An empty builder with default options.
    pub fn new() -> Self {
        Self {
            package: Package::new(),
            options: BuildOptions::default(),
            next_id: 0,
            converter: Box::new(CommonMarkConverter::default()),
        }
    }

    /// An empty builder laid out according to `options`.
    pub fn with_config(options: BuildOptions) -> Result<Self> {
        let mut package = Package::with_resolver(PathResolver::new(&options.opf_path)?);
        package.set_ncx_doc(None)?;
        package.set_nav_doc(GeneratedDoc::new("nav", options.nav_href.as_str()))?;
        package.set_ncx_doc(
            options
                .ncx_href
                .as_deref()
                .map(|href| GeneratedDoc::new("ncx", href)),
        )?;

        Ok(Self {
            package,
            options,
            ..Self::new()
        })
    }

    /// Continue building an existing (for example, loaded) package.
    pub fn from_package(package: Package) -> Self {
        let options = BuildOptions {
            opf_path: package.resolver().opf_path().to_string(),
            nav_href: package.nav_doc().href.clone(),
            ncx_href: package.ncx_doc().map(|doc| doc.href.clone()),
            ..BuildOptions::default()
        };
        Self {
            package,
            options,
            ..Self::new()
        }
    }

    /// Replace the Markdown renderer used by [`add_markdown_item`](Self::add_markdown_item).
    pub fn with_converter(mut self, converter: impl MarkdownConverter + 'static) -> Self {
        self.converter = Box::new(converter);
        self
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn package(&self) -> &Package {
        &self.package
    }

    pub fn package_mut(&mut self) -> &mut Package {
        &mut self.package
    }

    pub fn into_package(self) -> Package {
        self.package
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.package.metadata
    }

    // ------------------------------------------------------------------------
    // Items
    // ------------------------------------------------------------------------

    /// Next free `item{n}` id. The counter only moves forward.
    fn allocate_id(&mut self) -> String {
        loop {
            self.next_id += 1;
            let id = format!("item{}", self.next_id);
            if self.package.is_id_available(&id) {
                return id;
            }
        }
    }

    /// Normalized href for a new item, moved into its media-type folder when
    /// the builder organizes by media type.
    fn place_href(&self, href: &str, media_type: &str) -> Result<String> {
        let href = self.package.resolver().normalize(href)?;
        if !self.options.organize_by_media_type {
            return Ok(href);
        }
        Ok(organized_href(&href, media_type))
    }

    /// Add an item to the manifest.
    ///
    /// Without an explicit `id` one is allocated (`item1`, `item2`, ...,
    /// skipping ids already in use).
    pub fn add_content_item(
        &mut self,
        href: &str,
        media_type: &str,
        content: impl Into<Vec<u8>>,
        id: Option<&str>,
    ) -> Result<&mut ManifestItem> {
        let href = self.place_href(href, media_type)?;
        let id = match id {
            Some(id) => id.to_string(),
            None => self.allocate_id(),
        };
        let item = ManifestItem::new(id, &href, media_type, content)?;
        debug!("adding item '{}' at {} ({})", item.id(), item.href(), media_type);
        self.package.add_item(item)
    }

    /// Convert Markdown to an XHTML content document and add it.
    ///
    /// `href` must end in `.xhtml` or `.html`.
    pub fn add_markdown_item(&mut self, href: &str, markdown: &str) -> Result<&mut ManifestItem> {
        self.add_markdown_item_with(href, markdown, DocumentOptions::default())
    }

    /// [`add_markdown_item`](Self::add_markdown_item) with an explicit id,
    /// title, language or stylesheets.
    pub fn add_markdown_item_with(
        &mut self,
        href: &str,
        markdown: &str,
        options: DocumentOptions<'_>,
    ) -> Result<&mut ManifestItem> {
        let lower = href.to_ascii_lowercase();
        if !lower.ends_with(".xhtml") && !lower.ends_with(".html") {
            return Err(Error::InvalidItem(format!(
                "markdown document '{}' must end in .xhtml or .html",
                href
            )));
        }
        let links = self.stylesheet_hrefs(href, options.stylesheets)?;
        let body = self.converter.convert(markdown);
        let document = self.wrap_fragment(href, &options, &links, &body);
        self.add_content_item(href, MEDIA_TYPE_XHTML, document, options.id)
    }

    /// Add an XHTML content document.
    ///
    /// Fragments are wrapped into a complete document. `stylesheets` are ids
    /// of CSS items to link from the document's head.
    pub fn add_xhtml(
        &mut self,
        href: &str,
        content: impl AsRef<[u8]>,
        stylesheets: &[&str],
    ) -> Result<&mut ManifestItem> {
        let options = DocumentOptions {
            stylesheets,
            ..DocumentOptions::default()
        };
        self.add_xhtml_with(href, content, options)
    }

    /// [`add_xhtml`](Self::add_xhtml) with an explicit id, title or
    /// language. Title and language only apply to wrapped fragments.
    pub fn add_xhtml_with(
        &mut self,
        href: &str,
        content: impl AsRef<[u8]>,
        options: DocumentOptions<'_>,
    ) -> Result<&mut ManifestItem> {
        let links = self.stylesheet_hrefs(href, options.stylesheets)?;
        let bytes = strip_bom(content.as_ref());
        let text = decode_text(bytes, None);
        let document = if is_full_document(&text) {
            insert_stylesheets(&text, &links)
        } else {
            self.wrap_fragment(href, &options, &links, &text)
        };
        self.add_content_item(href, MEDIA_TYPE_XHTML, document, options.id)
    }

    /// Hrefs of the stylesheets `ids`, relative to where `href` will be placed.
    fn stylesheet_hrefs(&self, href: &str, ids: &[&str]) -> Result<Vec<String>> {
        let placed = self.place_href(href, MEDIA_TYPE_XHTML)?;
        let doc_dir = parent_dir(&placed);
        ids.iter()
            .map(|id| {
                let css = self.package.get_item(id)?;
                Ok(relativize(doc_dir, css.href()))
            })
            .collect()
    }

    fn wrap_fragment(
        &self,
        href: &str,
        options: &DocumentOptions<'_>,
        links: &[String],
        body: &str,
    ) -> String {
        let title = options.title.map_or_else(|| file_stem(href), str::to_string);
        let language = options.language.unwrap_or(self.language());
        xhtml_document(&title, language, links, body)
    }

    pub fn add_css(&mut self, href: &str, content: impl Into<Vec<u8>>) -> Result<&mut ManifestItem> {
        self.add_content_item(href, MEDIA_TYPE_CSS, content, None)
    }

    /// Add an image; the media type is detected when not given and must be
    /// an `image/*` type.
    pub fn add_image(
        &mut self,
        href: &str,
        content: Vec<u8>,
        media_type: Option<&str>,
    ) -> Result<&mut ManifestItem> {
        let media_type = match media_type {
            Some(media_type) => media_type.to_string(),
            None => {
                let format = detect_media_format(href, &content);
                if !format.is_image() {
                    return Err(Error::InvalidItem(format!("'{}' is not an image", href)));
                }
                format.mime_type().to_string()
            }
        };
        if !media_type.starts_with("image/") {
            return Err(Error::InvalidItem(format!(
                "'{}' is not an image ({})",
                href, media_type
            )));
        }
        self.add_content_item(href, &media_type, content, None)
    }

    /// Add a font; the media type is detected when not given.
    pub fn add_font(
        &mut self,
        href: &str,
        content: Vec<u8>,
        media_type: Option<&str>,
    ) -> Result<&mut ManifestItem> {
        let media_type = match media_type {
            Some(media_type) => media_type.to_string(),
            None => {
                let format = detect_media_format(href, &content);
                if !format.is_font() {
                    return Err(Error::InvalidItem(format!("'{}' is not a font", href)));
                }
                format.mime_type().to_string()
            }
        };
        self.add_content_item(href, &media_type, content, None)
    }

    /// Add a JavaScript resource and mark the documents in `used_by` as
    /// `scripted`.
    pub fn add_script(
        &mut self,
        href: &str,
        content: impl Into<Vec<u8>>,
        used_by: &[&str],
    ) -> Result<&mut ManifestItem> {
        for id in used_by {
            self.package.get_item(id)?;
        }
        let id = self
            .add_content_item(href, MEDIA_TYPE_JAVASCRIPT, content, None)?
            .id()
            .to_string();
        for doc in used_by {
            self.package.get_item_mut(doc)?.add_property("scripted");
        }
        self.package.get_item_mut(&id)
    }

    /// Make the image `id` the cover, optionally adding a `cover` landmark
    /// (unless one exists already).
    pub fn set_cover_image(&mut self, id: &str, add_landmark: bool) -> Result<()> {
        let item = self.package.get_item(id)?;
        if !item.media_type().starts_with("image/") {
            return Err(Error::InvalidItem(format!(
                "cover '{}' is not an image ({})",
                id,
                item.media_type()
            )));
        }
        let href = item.href().to_string();

        for item in self.package.items_mut() {
            item.remove_property("cover-image");
        }
        self.package.get_item_mut(id)?.add_property("cover-image");

        if add_landmark && !self.package.landmarks.iter().any(|l| l.kind == "cover") {
            self.package.landmarks.push(Landmark::new("Cover", href, "cover"));
        }
        Ok(())
    }

    /// Move every item into its media-type folder (`Text/`, `Styles/`,
    /// `Images/`, ...) and place later additions the same way.
    ///
    /// TOC entries, landmarks, the `href`/`src` links of XHTML documents and
    /// the `url()` references of stylesheets follow the moved files. If two
    /// items would land on the same href nothing moves. Returns the number
    /// of items moved.
    pub fn reorganize_by_media_type(&mut self) -> Result<usize> {
        let moved: HashMap<String, String> = self
            .package
            .items()
            .filter_map(|item| {
                let href = organized_href(item.href(), item.media_type());
                (href != item.href()).then(|| (item.href().to_string(), href))
            })
            .collect();
        if moved.is_empty() {
            self.options.organize_by_media_type = true;
            return Ok(0);
        }

        // Rewrite links against the old layout before anything moves
        let mut contents = Vec::new();
        for item in self.package.items() {
            let is_css = item.media_type() == MEDIA_TYPE_CSS;
            if item.media_type() != MEDIA_TYPE_XHTML && !is_css {
                continue;
            }
            let old_dir = parent_dir(item.href());
            let new_href = moved.get(item.href()).map_or(item.href(), String::as_str);
            let new_dir = parent_dir(new_href);
            let relink_value = |value: &str| relink(value, old_dir, new_dir, &moved);

            let bytes = item.bytes()?;
            let rewritten = if is_css {
                rewrite_css_urls(&decode_text(strip_bom(&bytes), None), relink_value)
            } else {
                rewrite_links(&bytes, item.href(), relink_value)?
            };
            if let Some(text) = rewritten {
                contents.push((item.id().to_string(), text));
            }
        }

        let moves: HashMap<String, String> = self
            .package
            .items()
            .filter_map(|item| {
                moved
                    .get(item.href())
                    .map(|href| (item.id().to_string(), href.clone()))
            })
            .collect();
        self.package.relocate_items(&moves)?;
        for (id, text) in contents {
            self.package.get_item_mut(&id)?.set_content(text);
        }

        try_map_hrefs(&mut self.package.toc, &mut |href: &str| {
            Ok::<_, Error>(remap_href(href, &moved))
        })?;
        for landmark in &mut self.package.landmarks {
            landmark.href = remap_href(&landmark.href, &moved);
        }
        self.options.organize_by_media_type = true;
        debug!("moved {} items into media-type folders", moves.len());
        Ok(moves.len())
    }

    // ------------------------------------------------------------------------
    // Spine & navigation
    // ------------------------------------------------------------------------

    pub fn add_spine_item(&mut self, id: &str, linear: bool) -> Result<()> {
        self.package.add_spine_item(id, linear)
    }

    /// Replace the reading order; on an unknown id nothing changes.
    pub fn set_spine_order<I, S>(&mut self, ids: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.package.set_spine_order(ids)
    }

    /// Append a top-level TOC entry and return it for adding children.
    ///
    /// An empty `href` makes a heading-only entry. Whitespace in the label
    /// is collapsed, as it is when a navigation document is read.
    pub fn add_toc_entry(&mut self, label: &str, href: &str) -> Result<&mut TocNode> {
        let href = normalize_nav_href(href)?;
        self.package
            .toc
            .push(TocNode::new(collapse_whitespace(label), href));
        let index = self.package.toc.len() - 1;
        Ok(&mut self.package.toc[index])
    }

    /// Replace the whole TOC. Hrefs are OPF-relative.
    pub fn set_toc(&mut self, mut toc: Vec<TocNode>) -> Result<()> {
        try_map_hrefs(&mut toc, &mut |href: &str| normalize_nav_href(href))?;
        normalize_labels(&mut toc);
        self.package.toc = toc;
        Ok(())
    }

    pub fn add_landmark(&mut self, label: &str, href: &str, kind: &str) -> Result<()> {
        if kind.trim().is_empty() {
            return Err(Error::InvalidItem(format!(
                "landmark '{}' has no type",
                label
            )));
        }
        let href = normalize_nav_href(href)?;
        self.package
            .landmarks
            .push(Landmark::new(collapse_whitespace(label), href, kind));
        Ok(())
    }

    /// Build the TOC from the headings (`h1`..`h{max_level}`) of the XHTML
    /// documents in the spine. Returns the number of top-level entries.
    ///
    /// Headings nest by level. A heading without an id links to its document.
    /// When no headings are found the existing TOC is kept.
    pub fn generate_toc_from_spine(&mut self, max_level: u8) -> Result<usize> {
        let mut toc = Vec::new();
        for item in self.package.spine_items() {
            if item.media_type() != MEDIA_TYPE_XHTML {
                continue;
            }
            let bytes = item.bytes()?;
            let headings = extract_headings(&bytes, max_level, item.href())?;

            let mut entries = Vec::with_capacity(headings.len());
            for heading in headings {
                let href = match &heading.id {
                    Some(id) => format!("{}#{}", item.href(), id),
                    None => {
                        warn!(
                            "heading '{}' in {} has no id, linking to the document",
                            heading.text,
                            item.href()
                        );
                        item.href().to_string()
                    }
                };
                entries.push((heading.level, TocNode::new(heading.text, href)));
            }
            toc.extend(nest_by_level(entries));
        }

        if toc.is_empty() {
            warn!("no headings found in the spine, keeping the existing TOC");
            return Ok(0);
        }
        debug!("generated TOC with {} top-level entries", toc.len());
        let count = toc.len();
        self.package.toc = toc;
        Ok(count)
    }

    // ------------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------------

    fn language(&self) -> &str {
        self.package
            .metadata
            .language()
            .unwrap_or(&self.options.default_language)
    }

    /// Serialize the package into container files, `mimetype` first.
    ///
    /// Fails with [`Error::MissingMetadata`] without an identifier or title,
    /// [`Error::EmptyPackage`] without items, and [`Error::ItemNotFound`]
    /// when the TOC or landmarks point outside the package.
    pub fn build(&mut self) -> Result<MemoryStore> {
        self.package.validate()?;
        self.package
            .metadata
            .set_modified(chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string());
        // Labels as a reading system will see them after a reload
        normalize_labels(&mut self.package.toc);
        for landmark in &mut self.package.landmarks {
            landmark.label = collapse_whitespace(&landmark.label);
        }

        let package = &self.package;
        let resolver = package.resolver();
        let info = DocumentInfo {
            title: package.metadata.title().unwrap_or_default(),
            language: self.language(),
            identifier: package.metadata.identifier().unwrap_or_default(),
        };

        let mut store = MemoryStore::new();
        store.insert(MIMETYPE_PATH, EPUB_MIMETYPE.to_vec());
        store.insert(
            CONTAINER_PATH,
            render_container(resolver.opf_path()).into_bytes(),
        );
        store.insert(
            resolver.opf_path(),
            render_opf(package, &self.options.default_language).into_bytes(),
        );

        let nav = package.nav_doc();
        debug!("rendering navigation document at {}", nav.href);
        store.insert(
            resolver.container_path(&nav.href),
            render_nav(&package.toc, &package.landmarks, &nav.href, &info).into_bytes(),
        );
        if let Some(ncx) = package.ncx_doc() {
            debug!("rendering NCX at {}", ncx.href);
            store.insert(
                resolver.container_path(&ncx.href),
                render_ncx(&package.toc, &ncx.href, &info).into_bytes(),
            );
        }

        for item in package.items() {
            store.insert(resolver.container_path(item.href()), item.bytes()?.into_owned());
        }

        debug!("built package with {} files", store.len());
        Ok(store)
    }

    /// Build and write an `.epub` file.
    pub fn write_epub<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let file = File::create(path)?;
        self.write_epub_to_writer(file)
    }

    /// Build and write the archive to any [`Write`] + [`Seek`] destination.
    pub fn write_epub_to_writer<W: Write + Seek>(&mut self, writer: W) -> Result<()> {
        let store = self.build()?;
        write_zip(&store, writer, self.options.compression_level)?;
        Ok(())
    }
}

/// Normalize an OPF-relative TOC or landmark href. External and empty hrefs
/// are kept as they are.
fn normalize_nav_href(href: &str) -> Result<String> {
    if href.is_empty() || is_external(href) {
        Ok(href.to_string())
    } else {
        resolve("", href)
    }
}

/// `Folder/file.ext` for an href, by media type.
fn organized_href(href: &str, media_type: &str) -> String {
    let file_name = href.rsplit('/').next().unwrap_or(href);
    format!("{}/{}", folder_for_media_type(media_type), file_name)
}

/// Swap the document part of an OPF-relative href for its new location.
fn remap_href(href: &str, moved: &HashMap<String, String>) -> String {
    let (path, fragment) = split_fragment(href);
    match (moved.get(path), fragment) {
        (Some(new), Some(fragment)) => format!("{}#{}", new, fragment),
        (Some(new), None) => new.clone(),
        (None, _) => href.to_string(),
    }
}

/// New value for a link written in a document that moves from `old_dir` to
/// `new_dir`, or `None` if the link still works as written.
fn relink(value: &str, old_dir: &str, new_dir: &str, moved: &HashMap<String, String>) -> Option<String> {
    if value.is_empty() || value.starts_with('#') || is_external(value) {
        return None;
    }
    let target = resolve(old_dir, value).ok()?;
    let remapped = remap_href(&target, moved);
    if old_dir == new_dir && remapped == target {
        return None;
    }
    let new_value = relativize(new_dir, &remapped);
    (new_value != value).then_some(new_value)
}

/// Nest `(level, node)` pairs so deeper levels become children of the
/// closest preceding shallower one.
fn nest_by_level(entries: Vec<(u8, TocNode)>) -> Vec<TocNode> {
    fn close_top(stack: &mut Vec<(u8, TocNode)>, roots: &mut Vec<TocNode>) {
        if let Some((_, node)) = stack.pop() {
            match stack.last_mut() {
                Some((_, parent)) => parent.children.push(node),
                None => roots.push(node),
            }
        }
    }

    let mut roots = Vec::new();
    let mut stack: Vec<(u8, TocNode)> = Vec::new();
    for (level, node) in entries {
        while stack.last().is_some_and(|(top, _)| *top >= level) {
            close_top(&mut stack, &mut roots);
        }
        stack.push((level, node));
    }
    while !stack.is_empty() {
        close_top(&mut stack, &mut roots);
    }
    roots
}

fn file_stem(href: &str) -> String {
    let name = href.rsplit('/').next().unwrap_or(href);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name.to_string(),
    }
}

fn is_full_document(text: &str) -> bool {
    let start: String = text.trim_start().chars().take(9).collect();
    let start = start.to_ascii_lowercase();
    start.starts_with("<?xml") || start.starts_with("<!doctype") || start.starts_with("<html")
}

fn stylesheet_links(links: &[String]) -> String {
    links
        .iter()
        .map(|href| {
            format!(
                "  <link rel=\"stylesheet\" type=\"text/css\" href=\"{}\"/>\n",
                escape_xml(href)
            )
        })
        .collect()
}

/// Wrap an XHTML body fragment into a complete content document.
fn xhtml_document(title: &str, language: &str, stylesheets: &[String], body: &str) -> String {
    let lang = escape_xml(language);
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="{}" xmlns:epub="{}" lang="{}" xml:lang="{}">
<head>
  <meta charset="utf-8"/>
  <title>{}</title>
{}</head>
<body>
{}
</body>
</html>
"#,
        NS_XHTML,
        NS_EPUB,
        lang,
        lang,
        escape_xml(title),
        stylesheet_links(stylesheets),
        body.trim_end()
    )
}

/// Link stylesheets from a complete document: before `</head>`, or in a new
/// head right after the `<html>` start tag.
fn insert_stylesheets(document: &str, links: &[String]) -> String {
    if links.is_empty() {
        return document.to_string();
    }
    let links = stylesheet_links(links);
    let lower = document.to_ascii_lowercase();

    if let Some(pos) = lower.find("</head>") {
        return format!("{}{}{}", &document[..pos], links, &document[pos..]);
    }
    if let Some(start) = lower.find("<html")
        && let Some(end) = lower[start..].find('>')
    {
        let pos = start + end + 1;
        return format!(
            "{}\n<head>\n{}</head>{}",
            &document[..pos],
            links,
            &document[pos..]
        );
    }
    warn!("document has no <html> element, stylesheets not linked");
    document.to_string()
}
