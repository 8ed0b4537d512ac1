use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Default id of the identifier named by `<package unique-identifier>`.
pub const DEFAULT_UNIQUE_IDENTIFIER_ID: &str = "book-id";

const MODIFIED_PROPERTY: &str = "dcterms:modified";

/// Kind of a metadata element.
///
/// Dublin Core kinds serialize as `<dc:NAME>`; `Custom` serializes as
/// `<meta property="NAME">`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetadataKind {
    Identifier,
    Title,
    Language,
    Creator,
    Contributor,
    Publisher,
    Date,
    Subject,
    Description,
    Rights,
    Custom(String),
}

impl MetadataKind {
    /// Local name of the Dublin Core element, or `None` for custom metadata.
    pub fn dc_name(&self) -> Option<&'static str> {
        Some(match self {
            MetadataKind::Identifier => "identifier",
            MetadataKind::Title => "title",
            MetadataKind::Language => "language",
            MetadataKind::Creator => "creator",
            MetadataKind::Contributor => "contributor",
            MetadataKind::Publisher => "publisher",
            MetadataKind::Date => "date",
            MetadataKind::Subject => "subject",
            MetadataKind::Description => "description",
            MetadataKind::Rights => "rights",
            MetadataKind::Custom(_) => return None,
        })
    }

    /// Map a Dublin Core local name back to its kind.
    pub fn from_dc_name(name: &str) -> Option<Self> {
        Some(match name {
            "identifier" => MetadataKind::Identifier,
            "title" => MetadataKind::Title,
            "language" => MetadataKind::Language,
            "creator" => MetadataKind::Creator,
            "contributor" => MetadataKind::Contributor,
            "publisher" => MetadataKind::Publisher,
            "date" => MetadataKind::Date,
            "subject" => MetadataKind::Subject,
            "description" => MetadataKind::Description,
            "rights" => MetadataKind::Rights,
            _ => return None,
        })
    }
}

/// One metadata value with its XML attributes, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetaEntry {
    pub value: String,
    pub attributes: Vec<(String, String)>,
}

impl MetaEntry {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Package metadata (Dublin Core + `meta` properties).
///
/// Repeatable elements keep their insertion order, which is the order they
/// are serialized in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    entries: BTreeMap<MetadataKind, Vec<MetaEntry>>,
    unique_identifier: String,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            unique_identifier: DEFAULT_UNIQUE_IDENTIFIER_ID.to_string(),
        }
    }
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the identifier element the package's `unique-identifier` names.
    pub fn unique_identifier_id(&self) -> &str {
        &self.unique_identifier
    }

    pub(crate) fn set_unique_identifier_id(&mut self, id: impl Into<String>) {
        self.unique_identifier = id.into();
    }

    /// Replace all identifiers with `value`.
    ///
    /// A `scheme` (e.g. `"ISBN"`, `"UUID"`) is recorded as an
    /// `identifier-type` refinement.
    pub fn set_identifier(&mut self, value: impl Into<String>, scheme: Option<&str>) {
        let refines = format!("#{}", self.unique_identifier);
        self.entries.remove(&MetadataKind::Identifier);
        self.retain_custom("identifier-type", |e| e.attr("refines") != Some(refines.as_str()));

        self.push(
            MetadataKind::Identifier,
            MetaEntry::new(value).with_attr("id", self.unique_identifier.clone()),
        );
        if let Some(scheme) = scheme {
            self.add_custom(
                "identifier-type",
                scheme,
                vec![("refines".to_string(), refines)],
            );
        }
    }

    pub fn add_title(&mut self, title: impl Into<String>) {
        self.push(MetadataKind::Title, MetaEntry::new(title));
    }

    /// Replace the document language (BCP 47 tag).
    pub fn set_language(&mut self, language: impl Into<String>) {
        self.set(MetadataKind::Language, MetaEntry::new(language));
    }

    /// Add a creator, with an optional MARC relator `role` (`"aut"`, `"edt"`, ...).
    pub fn add_creator(&mut self, name: impl Into<String>, role: Option<&str>) {
        self.add_person(MetadataKind::Creator, "creator", name.into(), role, None);
    }

    /// Add a creator with a sort form of the name (`"Doe, Jane"`), recorded
    /// as a `file-as` refinement.
    pub fn add_creator_file_as(
        &mut self,
        name: impl Into<String>,
        role: Option<&str>,
        file_as: &str,
    ) {
        self.add_person(MetadataKind::Creator, "creator", name.into(), role, Some(file_as));
    }

    pub fn add_contributor(&mut self, name: impl Into<String>, role: Option<&str>) {
        self.add_person(MetadataKind::Contributor, "contributor", name.into(), role, None);
    }

    fn add_person(
        &mut self,
        kind: MetadataKind,
        prefix: &str,
        name: String,
        role: Option<&str>,
        file_as: Option<&str>,
    ) {
        if role.is_none() && file_as.is_none() {
            self.push(kind, MetaEntry::new(name));
            return;
        }
        let id = self.next_element_id(prefix);
        let refines = format!("#{}", id);
        self.push(kind, MetaEntry::new(name).with_attr("id", id));
        if let Some(role) = role {
            self.add_custom(
                "role",
                role,
                vec![
                    ("refines".to_string(), refines.clone()),
                    ("scheme".to_string(), "marc:relators".to_string()),
                ],
            );
        }
        if let Some(file_as) = file_as {
            self.add_custom("file-as", file_as, vec![("refines".to_string(), refines)]);
        }
    }

    pub fn add_date(&mut self, date: impl Into<String>) {
        self.push(MetadataKind::Date, MetaEntry::new(date));
    }

    pub fn add_subject(&mut self, subject: impl Into<String>) {
        self.push(MetadataKind::Subject, MetaEntry::new(subject));
    }

    pub fn set_publisher(&mut self, publisher: impl Into<String>) {
        self.set(MetadataKind::Publisher, MetaEntry::new(publisher));
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.set(MetadataKind::Description, MetaEntry::new(description));
    }

    pub fn set_rights(&mut self, rights: impl Into<String>) {
        self.set(MetadataKind::Rights, MetaEntry::new(rights));
    }

    /// Add a `<meta property="...">` element.
    pub fn add_custom(
        &mut self,
        property: impl Into<String>,
        value: impl Into<String>,
        attributes: Vec<(String, String)>,
    ) {
        self.push(
            MetadataKind::Custom(property.into()),
            MetaEntry {
                value: value.into(),
                attributes,
            },
        );
    }

    /// Replace the `dcterms:modified` timestamp.
    pub fn set_modified(&mut self, timestamp: impl Into<String>) {
        self.set(
            MetadataKind::Custom(MODIFIED_PROPERTY.to_string()),
            MetaEntry::new(timestamp),
        );
    }

    /// Append an entry of any kind.
    pub fn push(&mut self, kind: MetadataKind, entry: MetaEntry) {
        self.entries.entry(kind).or_default().push(entry);
    }

    fn set(&mut self, kind: MetadataKind, entry: MetaEntry) {
        self.entries.insert(kind, vec![entry]);
    }

    fn retain_custom(&mut self, property: &str, keep: impl Fn(&MetaEntry) -> bool) {
        let kind = MetadataKind::Custom(property.to_string());
        if let Some(entries) = self.entries.get_mut(&kind) {
            entries.retain(|e| keep(e));
            if entries.is_empty() {
                self.entries.remove(&kind);
            }
        }
    }

    /// First id of the form `{prefix}-{n}` not used by any element.
    fn next_element_id(&self, prefix: &str) -> String {
        let used = |candidate: &str| {
            self.entries
                .values()
                .flatten()
                .any(|e| e.attr("id") == Some(candidate))
        };
        (1..)
            .map(|n| format!("{}-{}", prefix, n))
            .find(|candidate| !used(candidate))
            .unwrap_or_default()
    }

    /// All entries of `kind`, in insertion order.
    pub fn values(&self, kind: &MetadataKind) -> &[MetaEntry] {
        self.entries.get(kind).map(Vec::as_slice).unwrap_or(&[])
    }

    fn first_value(&self, kind: &MetadataKind) -> Option<&str> {
        self.values(kind)
            .iter()
            .map(|e| e.value.as_str())
            .find(|v| !v.is_empty())
    }

    /// The unique identifier: the identifier whose id matches
    /// [`unique_identifier_id`](Self::unique_identifier_id), else the first one.
    pub fn identifier(&self) -> Option<&str> {
        let identifiers = self.values(&MetadataKind::Identifier);
        identifiers
            .iter()
            .find(|e| e.attr("id") == Some(self.unique_identifier.as_str()))
            .or_else(|| identifiers.first())
            .map(|e| e.value.as_str())
            .filter(|v| !v.is_empty())
    }

    pub fn title(&self) -> Option<&str> {
        self.first_value(&MetadataKind::Title)
    }

    pub fn language(&self) -> Option<&str> {
        self.first_value(&MetadataKind::Language)
    }

    pub fn creators(&self) -> impl Iterator<Item = &str> {
        self.values(&MetadataKind::Creator)
            .iter()
            .map(|e| e.value.as_str())
    }

    pub fn modified(&self) -> Option<&str> {
        self.first_value(&MetadataKind::Custom(MODIFIED_PROPERTY.to_string()))
    }

    /// Iterate every `(kind, entry)` in serialization order.
    pub fn iter(&self) -> impl Iterator<Item = (&MetadataKind, &MetaEntry)> {
        self.entries
            .iter()
            .flat_map(|(kind, entries)| entries.iter().map(move |e| (kind, e)))
    }

    /// Check that an identifier and a title are present.
    pub fn validate(&self) -> Result<()> {
        if self.identifier().is_none() {
            return Err(Error::MissingMetadata("identifier"));
        }
        if self.title().is_none() {
            return Err(Error::MissingMetadata("title"));
        }
        Ok(())
    }
}
