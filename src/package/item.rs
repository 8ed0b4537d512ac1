use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::io::ContainerStore;
use crate::path::{self, split_fragment};
use crate::util::{decode_text, extract_xml_encoding};

/// Payload of a manifest item.
///
/// Items loaded from a container start out `Lazy`: they remember where their
/// bytes live and fetch them on first access, after which they are `Owned`.
#[derive(Clone)]
pub enum Content {
    Owned(Vec<u8>),
    Lazy {
        store: Rc<dyn ContainerStore>,
        path: String,
    },
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Content::Owned(data) => f.debug_tuple("Owned").field(&data.len()).finish(),
            Content::Lazy { path, .. } => f.debug_struct("Lazy").field("path", path).finish(),
        }
    }
}

/// A resource (content document, image, CSS, font, etc.) declared in the manifest.
#[derive(Debug, Clone)]
pub struct ManifestItem {
    id: String,
    href: String,
    media_type: String,
    properties: BTreeSet<String>,
    content: Content,
}

impl ManifestItem {
    /// Create an item that owns its bytes.
    ///
    /// `href` is relative to the OPF directory and is normalized here; it may
    /// not carry a fragment, a scheme or a leading slash.
    pub fn new(
        id: impl Into<String>,
        href: &str,
        media_type: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Result<Self> {
        Self::with_content(id.into(), href, media_type.into(), Content::Owned(content.into()))
    }

    pub(crate) fn lazy(
        id: String,
        href: &str,
        media_type: String,
        store: Rc<dyn ContainerStore>,
        container_path: String,
    ) -> Result<Self> {
        Self::with_content(
            id,
            href,
            media_type,
            Content::Lazy {
                store,
                path: container_path,
            },
        )
    }

    fn with_content(id: String, href: &str, media_type: String, content: Content) -> Result<Self> {
        if id.is_empty() || id.contains(char::is_whitespace) {
            return Err(Error::InvalidItem(format!("invalid item id '{}'", id)));
        }
        if media_type.trim().is_empty() {
            return Err(Error::InvalidItem(format!("item '{}' has no media type", id)));
        }
        if split_fragment(href).1.is_some() {
            return Err(Error::path(href, "manifest href has a fragment"));
        }
        let href = path::resolve("", href)?;

        Ok(Self {
            id,
            href,
            media_type,
            properties: BTreeSet::new(),
            content,
        })
    }

    /// Add properties (`nav`, `scripted`, `cover-image`, ...).
    pub fn with_properties<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.properties.extend(properties.into_iter().map(Into::into));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Href relative to the OPF directory.
    pub fn href(&self) -> &str {
        &self.href
    }

    /// Move the item; `href` must already be normalized.
    pub(crate) fn set_href(&mut self, href: String) {
        self.href = href;
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn properties(&self) -> &BTreeSet<String> {
        &self.properties
    }

    pub fn has_property(&self, property: &str) -> bool {
        self.properties.contains(property)
    }

    pub fn add_property(&mut self, property: impl Into<String>) {
        self.properties.insert(property.into());
    }

    pub fn remove_property(&mut self, property: &str) -> bool {
        self.properties.remove(property)
    }

    /// Whether the content has been materialized.
    pub fn is_loaded(&self) -> bool {
        matches!(self.content, Content::Owned(_))
    }

    /// Item bytes, fetching and caching them on first access.
    pub fn content(&mut self) -> Result<&[u8]> {
        if let Content::Lazy { store, path } = &self.content {
            let data = store.read(path)?;
            self.content = Content::Owned(data);
        }
        match &self.content {
            Content::Owned(data) => Ok(data),
            Content::Lazy { .. } => unreachable!("lazy content was just materialized"),
        }
    }

    /// Item bytes without caching a lazy fetch.
    pub fn bytes(&self) -> Result<Cow<'_, [u8]>> {
        match &self.content {
            Content::Owned(data) => Ok(Cow::Borrowed(data)),
            Content::Lazy { store, path } => Ok(Cow::Owned(store.read(path)?)),
        }
    }

    /// Item content decoded as text.
    pub fn text(&self) -> Result<String> {
        let bytes = self.bytes()?;
        let hint = extract_xml_encoding(&bytes);
        Ok(decode_text(&bytes, hint).into_owned())
    }

    /// Replace the item's payload.
    pub fn set_content(&mut self, content: impl Into<Vec<u8>>) {
        self.content = Content::Owned(content.into());
    }
}
