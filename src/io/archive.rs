use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Seek, Write};
use std::path::Path;

use log::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::store::ContainerStore;

/// OCF mimetype entry contents.
pub(crate) const EPUB_MIMETYPE: &[u8] = b"application/epub+zip";

/// A [`ContainerStore`] over a zip archive.
///
/// Entries are decompressed on demand, so a package loaded from a
/// `ZipStore` only pays for the items it actually reads. Writes go to an
/// in-memory overlay; the archive itself is never modified.
pub struct ZipStore<R> {
    archive: RefCell<ZipArchive<R>>,
    names: Vec<String>,
    overlay: HashMap<String, Vec<u8>>,
}

impl ZipStore<File> {
    /// Open an `.epub` file on disk.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }
}

impl<R: Read + Seek> ZipStore<R> {
    /// Wrap any [`Read`] + [`Seek`] source holding a zip archive.
    pub fn from_reader(reader: R) -> io::Result<Self> {
        let archive = ZipArchive::new(reader).map_err(io_error)?;
        let names: Vec<String> = archive
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .map(str::to_string)
            .collect();
        debug!("opened zip container with {} entries", names.len());

        Ok(Self {
            archive: RefCell::new(archive),
            names,
            overlay: HashMap::new(),
        })
    }

    fn read_entry(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        let mut archive = self.archive.borrow_mut();
        let entry = archive.by_name(name);
        let contents = match entry {
            Ok(mut file) => {
                let mut contents = Vec::new();
                file.read_to_end(&mut contents)?;
                Some(contents)
            }
            Err(zip::result::ZipError::FileNotFound) => None,
            Err(e) => return Err(io_error(e)),
        };
        Ok(contents)
    }
}

impl<R: Read + Seek> ContainerStore for ZipStore<R> {
    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        if let Some(data) = self.overlay.get(path) {
            return Ok(data.clone());
        }
        if let Some(data) = self.read_entry(path)? {
            return Ok(data);
        }

        // Fallback: try percent-decoded path (handles malformed EPUBs)
        let decoded = percent_encoding::percent_decode_str(path)
            .decode_utf8()
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("invalid UTF-8 in path: {}", path),
                )
            })?;
        if decoded != path
            && let Some(data) = self.read_entry(&decoded)?
        {
            warn!("resolved '{}' through percent-decoding", path);
            return Ok(data);
        }

        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no such file in container: {}", path),
        ))
    }

    fn write(&mut self, path: &str, data: Vec<u8>) -> io::Result<()> {
        self.overlay.insert(path.to_string(), data);
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        if self.overlay.contains_key(path) || self.names.iter().any(|n| n == path) {
            return true;
        }
        match percent_encoding::percent_decode_str(path).decode_utf8() {
            Ok(decoded) => decoded != path && self.names.iter().any(|n| *n == decoded),
            Err(_) => false,
        }
    }

    fn list_paths(&self) -> Vec<String> {
        let mut paths = self.names.clone();
        let mut added: Vec<&String> = self
            .overlay
            .keys()
            .filter(|p| !self.names.contains(p))
            .collect();
        added.sort();
        paths.extend(added.into_iter().cloned());
        paths
    }
}

/// Write the files of `store` as an OCF zip archive.
///
/// `mimetype` is written first and uncompressed; every other entry is
/// deflated at `compression_level` (0-9, default 6).
pub fn write_zip<S, W>(store: &S, writer: W, compression_level: Option<u32>) -> io::Result<()>
where
    S: ContainerStore + ?Sized,
    W: Write + Seek,
{
    let mut zip = ZipWriter::new(writer);

    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(compression_level.unwrap_or(6) as i64));

    // 1. Write mimetype (must be first, uncompressed)
    let mimetype = if store.exists("mimetype") {
        store.read("mimetype")?
    } else {
        EPUB_MIMETYPE.to_vec()
    };
    zip.start_file("mimetype", stored).map_err(io_error)?;
    zip.write_all(&mimetype)?;

    // 2. Everything else, in store order
    for path in store.list_paths() {
        if path == "mimetype" {
            continue;
        }
        let data = store.read(&path)?;
        zip.start_file(path.as_str(), deflated).map_err(io_error)?;
        zip.write_all(&data)?;
    }

    zip.finish().map_err(io_error)?;
    Ok(())
}

fn io_error<E: std::error::Error + Send + Sync + 'static>(e: E) -> io::Error {
    io::Error::other(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryStore;
    use std::io::Cursor;

    fn sample_zip() -> Vec<u8> {
        let mut store = MemoryStore::new();
        store.insert("META-INF/container.xml", b"<container/>".to_vec());
        store.insert("OEBPS/My%20File.xhtml", b"encoded".to_vec());
        store.insert("OEBPS/a b.xhtml", b"spaced".to_vec());

        let mut out = Cursor::new(Vec::new());
        write_zip(&store, &mut out, None).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_mimetype_is_first_and_stored() {
        let bytes = sample_zip();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let first = archive.by_index(0).unwrap();
        assert_eq!(first.name(), "mimetype");
        assert_eq!(first.compression(), CompressionMethod::Stored);
    }

    #[test]
    fn test_zip_store_reads_entries() {
        let store = ZipStore::from_reader(Cursor::new(sample_zip())).unwrap();
        assert!(store.exists("mimetype"));
        assert_eq!(store.read("mimetype").unwrap(), EPUB_MIMETYPE);
        assert_eq!(
            store.read("META-INF/container.xml").unwrap(),
            b"<container/>"
        );
        assert_eq!(store.list_paths()[0], "mimetype");
    }

    #[test]
    fn test_zip_store_percent_decoded_fallback() {
        let store = ZipStore::from_reader(Cursor::new(sample_zip())).unwrap();
        // Exact match wins
        assert_eq!(store.read("OEBPS/My%20File.xhtml").unwrap(), b"encoded");
        // Encoded href finds the literal entry
        assert_eq!(store.read("OEBPS/a%20b.xhtml").unwrap(), b"spaced");
        assert!(store.exists("OEBPS/a%20b.xhtml"));
        assert!(store.read("OEBPS/missing.xhtml").is_err());
        assert!(!store.exists("OEBPS/missing.xhtml"));
    }

    #[test]
    fn test_zip_store_overlay() {
        let mut store = ZipStore::from_reader(Cursor::new(sample_zip())).unwrap();
        store.write("OEBPS/new.css", b"p {}".to_vec()).unwrap();
        store.write("mimetype", b"changed".to_vec()).unwrap();

        assert_eq!(store.read("OEBPS/new.css").unwrap(), b"p {}");
        assert_eq!(store.read("mimetype").unwrap(), b"changed");
        let paths = store.list_paths();
        assert_eq!(paths.iter().filter(|p| *p == "mimetype").count(), 1);
        assert_eq!(paths.last().map(String::as_str), Some("OEBPS/new.css"));
    }
}
