//! Container storage.
//!
//! The package core never touches archives directly: it reads and writes
//! whole files by path through a [`ContainerStore`]. [`MemoryStore`] holds a
//! built package in memory; [`ZipStore`] reads an existing `.epub` archive.

mod archive;
mod store;

pub(crate) use archive::EPUB_MIMETYPE;
pub use archive::{ZipStore, write_zip};
pub use store::{ContainerStore, MemoryStore};
