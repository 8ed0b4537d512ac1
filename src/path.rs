//! Href normalization and resolution.
//!
//! Every href stored in a [`Package`](crate::Package) is relative to the
//! directory containing the OPF document. Documents that live in other
//! directories (the navigation document, the NCX, content files linking to
//! stylesheets) convert between their own base and the OPF base through
//! [`resolve`] and [`relativize`].

use std::borrow::Cow;

use percent_encoding::percent_decode_str;

use crate::error::{Error, Result};

/// Default location of the package document inside the container.
pub const DEFAULT_OPF_PATH: &str = "OEBPS/package.opf";

/// Container path of the OCF `mimetype` file.
pub const MIMETYPE_PATH: &str = "mimetype";

/// Whether `path` belongs to the OCF container itself rather than the
/// package: the `mimetype` file or anything under `META-INF/`.
pub fn is_ocf_path(path: &str) -> bool {
    path == MIMETYPE_PATH || path == "META-INF" || path.starts_with("META-INF/")
}

/// Split `href` into its path and optional fragment (without the `#`).
pub fn split_fragment(href: &str) -> (&str, Option<&str>) {
    match href.find('#') {
        Some(i) => (&href[..i], Some(&href[i + 1..])),
        None => (href, None),
    }
}

/// Whether `href` carries a URL scheme (`https:`, `mailto:`, ...).
///
/// External hrefs are never resolved against the package.
pub fn is_external(href: &str) -> bool {
    let Some(colon) = href.find(':') else {
        return false;
    };
    let scheme = &href[..colon];
    !scheme.is_empty()
        && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Directory portion of a slash-separated path (`"a/b/c.xhtml"` -> `"a/b"`).
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[..i],
        None => "",
    }
}

/// Resolve `href` against `base_dir`, collapsing `.` and `..` segments.
///
/// The result is relative to the same root as `base_dir` and keeps the
/// fragment of `href`. Fails when the href is absolute, has a scheme, has no
/// path, or would climb above the root.
pub fn resolve(base_dir: &str, href: &str) -> Result<String> {
    if is_external(href) {
        return Err(Error::path(href, "href has a URL scheme"));
    }
    if href.starts_with('/') {
        return Err(Error::path(href, "href is absolute"));
    }
    let (path, fragment) = split_fragment(href);
    if path.is_empty() {
        return Err(Error::path(href, "href has no path"));
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in base_dir.split('/').chain(path.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(Error::path(href, "escapes the package root"));
                }
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Err(Error::path(href, "resolves to the package root"));
    }

    let mut resolved = segments.join("/");
    if let Some(fragment) = fragment {
        resolved.push('#');
        resolved.push_str(fragment);
    }
    Ok(resolved)
}

/// Compute the href a document in `from_dir` uses to reference `to_href`.
///
/// Both arguments are relative to the same root (normally the OPF
/// directory). External hrefs are returned unchanged.
pub fn relativize(from_dir: &str, to_href: &str) -> String {
    if is_external(to_href) {
        return to_href.to_string();
    }
    let (path, fragment) = split_fragment(to_href);

    let from: Vec<&str> = clean_segments(from_dir);
    let to: Vec<&str> = clean_segments(path);

    let to_dirs = to.len().saturating_sub(1);
    let common = from
        .iter()
        .zip(to.iter().take(to_dirs))
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<&str> = Vec::with_capacity(from.len() - common + to.len() - common);
    parts.extend(std::iter::repeat_n("..", from.len() - common));
    parts.extend(&to[common..]);

    let mut href = parts.join("/");
    if let Some(fragment) = fragment {
        href.push('#');
        href.push_str(fragment);
    }
    href
}

fn clean_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty() && *s != ".").collect()
}

/// Maps between OPF-relative hrefs and container paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    opf_path: String,
}

impl PathResolver {
    /// Create a resolver for a package document at `opf_path`.
    pub fn new(opf_path: &str) -> Result<Self> {
        let opf_path = resolve("", opf_path)?;
        if split_fragment(&opf_path).1.is_some() {
            return Err(Error::path(opf_path, "package path has a fragment"));
        }
        Ok(Self { opf_path })
    }

    /// Container path of the OPF document.
    pub fn opf_path(&self) -> &str {
        &self.opf_path
    }

    /// Container directory holding the OPF document (may be empty).
    pub fn opf_dir(&self) -> &str {
        parent_dir(&self.opf_path)
    }

    /// Normalize an OPF-relative href.
    pub fn normalize(&self, href: &str) -> Result<String> {
        resolve("", href)
    }

    /// Container path for an OPF-relative href, without its fragment.
    ///
    /// Hrefs are URL references, so percent-escapes are decoded:
    /// `chapter%201.xhtml` lives at `chapter 1.xhtml`. Escapes that would
    /// add path segments (`%2F`, `%2E%2E`) are left encoded.
    pub fn container_path(&self, href: &str) -> String {
        let (path, _) = split_fragment(href);
        let decoded = match percent_decode_str(path).decode_utf8() {
            Ok(decoded) if same_segments(path, &decoded) => decoded,
            _ => Cow::Borrowed(path),
        };
        self.join(&decoded)
    }

    /// Container path for an href taken literally, escapes and all.
    pub(crate) fn literal_container_path(&self, href: &str) -> String {
        let (path, _) = split_fragment(href);
        self.join(path)
    }

    fn join(&self, path: &str) -> String {
        let dir = self.opf_dir();
        if dir.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", dir, path)
        }
    }

    /// OPF-relative href for a container path.
    pub fn href_for(&self, container_path: &str) -> Result<String> {
        let path = resolve("", container_path)?;
        let dir = self.opf_dir();
        if dir.is_empty() {
            return Ok(path);
        }
        path.strip_prefix(dir)
            .and_then(|rest| rest.strip_prefix('/'))
            .map(str::to_string)
            .ok_or_else(|| Error::path(container_path, "outside the package directory"))
    }
}

fn same_segments(path: &str, decoded: &str) -> bool {
    path.matches('/').count() == decoded.matches('/').count()
        && !decoded.split('/').any(|s| s == "." || s == "..")
}

impl Default for PathResolver {
    fn default() -> Self {
        Self {
            opf_path: DEFAULT_OPF_PATH.to_string(),
        }
    }
}
