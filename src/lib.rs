//! # quire
//!
//! Build and load EPUB 3 packages.
//!
//! ## Features
//!
//! - One in-memory [`Package`] model shared by building and loading
//! - Generated OPF, navigation document and legacy NCX that always agree
//! - Markdown content documents via `pulldown-cmark`
//! - Lazy item content when loading from a zip archive
//! - EPUB 2 fallbacks on load (NCX table of contents, guide, cover meta)
//!
//! ## Quick Start
//!
//! ```
//! use quire::{PackageBuilder, load};
//!
//! let mut builder = PackageBuilder::new();
//! builder.metadata_mut().set_identifier("urn:uuid:1234", None);
//! builder.metadata_mut().add_title("My Book");
//! builder.metadata_mut().add_creator("Author Name", Some("aut"));
//!
//! builder.add_markdown_item("text/ch1.xhtml", "# Chapter 1\n\nIt begins.")?;
//! builder.set_spine_order(["item1"])?;
//! builder.generate_toc_from_spine(2)?;
//!
//! let files = builder.build()?;
//! let package = load(files)?;
//! assert_eq!(package.toc[0].href, "text/ch1.xhtml#chapter-1");
//! # Ok::<(), quire::Error>(())
//! ```
//!
//! Reading and writing `.epub` files:
//!
//! ```no_run
//! use quire::{PackageBuilder, read_epub};
//!
//! let package = read_epub("input.epub")?;
//! let mut builder = PackageBuilder::from_package(package);
//! builder.write_epub("output.epub")?;
//! # Ok::<(), quire::Error>(())
//! ```

pub mod builder;
pub mod error;
pub mod io;
pub mod loader;
pub mod markdown;
pub mod package;
pub mod path;
pub mod util;
pub mod xml;

pub use builder::{BuildOptions, DocumentOptions, PackageBuilder};
pub use error::{Error, Result};
pub use io::{ContainerStore, MemoryStore, ZipStore, write_zip};
pub use loader::{PackageLoader, load, read_epub, read_epub_from_reader};
pub use markdown::{CommonMarkConverter, MarkdownConverter};
pub use package::{
    GeneratedDoc, Landmark, ManifestItem, MetaEntry, Metadata, MetadataKind, Package, SpineEntry,
    TocNode,
};
pub use path::PathResolver;
