//! Error types for quire operations.

use thiserror::Error;

/// Errors that can occur while building, loading or editing a package.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Duplicate manifest id: {0}")]
    DuplicateId(String),

    #[error("Duplicate manifest href: {0}")]
    DuplicateHref(String),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Invalid path '{href}': {reason}")]
    Path { href: String, reason: &'static str },

    #[error("Missing required metadata: {0}")]
    MissingMetadata(&'static str),

    #[error("Package has no manifest items")]
    EmptyPackage,

    #[error("Malformed package: {0}")]
    MalformedPackage(String),

    #[error("Invalid item: {0}")]
    InvalidItem(String),
}

impl Error {
    pub(crate) fn path(href: impl Into<String>, reason: &'static str) -> Self {
        Error::Path {
            href: href.into(),
            reason,
        }
    }

    pub(crate) fn malformed(doc: &str, detail: impl std::fmt::Display) -> Self {
        Error::MalformedPackage(format!("{}: {}", doc, detail))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
