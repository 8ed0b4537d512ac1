use std::collections::HashMap;
use std::io;

/// Path-keyed byte storage for the files of an OCF container.
///
/// Paths are container paths (`"OEBPS/package.opf"`), never hrefs. Writes
/// replace the whole file.
pub trait ContainerStore {
    /// Read the full contents of the file at `path`.
    fn read(&self, path: &str) -> io::Result<Vec<u8>>;

    /// Create or replace the file at `path`.
    fn write(&mut self, path: &str, data: Vec<u8>) -> io::Result<()>;

    /// Whether a file exists at `path`.
    fn exists(&self, path: &str) -> bool;

    /// All file paths, in storage order.
    fn list_paths(&self) -> Vec<String>;
}

// --- Implementation: In-Memory ---

/// An in-memory store that remembers insertion order.
///
/// Order matters for OCF output: `mimetype` must be the first entry.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Vec<(String, Vec<u8>)>,
    index: HashMap<String, usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the bytes stored at `path`.
    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.index.get(path).map(|&i| self.entries[i].1.as_slice())
    }

    /// Insert or replace a file, keeping the original position on replace.
    pub fn insert(&mut self, path: impl Into<String>, data: Vec<u8>) {
        let path = path.into();
        match self.index.get(&path) {
            Some(&i) => self.entries[i].1 = data,
            None => {
                self.index.insert(path.clone(), self.entries.len());
                self.entries.push((path, data));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(path, bytes)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(p, d)| (p.as_str(), d.as_slice()))
    }
}

impl ContainerStore for MemoryStore {
    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self.get(path).map(<[u8]>::to_vec).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such file in container: {}", path),
            )
        })
    }

    fn write(&mut self, path: &str, data: Vec<u8>) -> io::Result<()> {
        self.insert(path, data);
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    fn list_paths(&self) -> Vec<String> {
        self.entries.iter().map(|(p, _)| p.clone()).collect()
    }
}

impl<P: Into<String>> FromIterator<(P, Vec<u8>)> for MemoryStore {
    fn from_iter<I: IntoIterator<Item = (P, Vec<u8>)>>(iter: I) -> Self {
        let mut store = MemoryStore::new();
        for (path, data) in iter {
            store.insert(path, data);
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_read_write() {
        let mut store = MemoryStore::new();
        store.write("a.txt", b"hello".to_vec()).unwrap();
        assert!(store.exists("a.txt"));
        assert!(!store.exists("b.txt"));
        assert_eq!(store.read("a.txt").unwrap(), b"hello");

        let err = store.read("b.txt").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_memory_store_replace_keeps_order() {
        let mut store = MemoryStore::new();
        store.insert("mimetype", b"x".to_vec());
        store.insert("b", b"1".to_vec());
        store.insert("mimetype", b"application/epub+zip".to_vec());

        assert_eq!(store.len(), 2);
        assert_eq!(store.list_paths(), vec!["mimetype", "b"]);
        assert_eq!(store.get("mimetype"), Some(&b"application/epub+zip"[..]));
    }
}
