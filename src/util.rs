//! Text decoding and media type helpers.

use std::borrow::Cow;

/// Decode bytes to a string, handling various encodings.
///
/// This function:
/// 1. First tries UTF-8 (handles BOM automatically via encoding_rs)
/// 2. If malformed, tries the hint encoding (from `<?xml encoding="..."?>`)
/// 3. Falls back to Windows-1252 (common in old ebooks)
///
/// Uses `Cow<str>` to avoid allocation when the input is valid UTF-8.
pub fn decode_text<'a>(bytes: &'a [u8], hint_encoding: Option<&str>) -> Cow<'a, str> {
    let (result, _encoding, malformed) = encoding_rs::UTF_8.decode(bytes);

    if !malformed {
        return result;
    }

    if let Some(name) = hint_encoding
        && let Some(encoding) = encoding_rs::Encoding::for_label(name.as_bytes())
    {
        let (result, _, _) = encoding.decode(bytes);
        return result;
    }

    // Fallback: Windows-1252 (superset of ISO-8859-1)
    let (result, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    result
}

/// Extract encoding from an XML declaration (`<?xml ... encoding="..." ?>`).
///
/// Only the first 100 bytes are checked.
pub fn extract_xml_encoding(bytes: &[u8]) -> Option<&str> {
    let check_len = bytes.len().min(100);
    let prefix = &bytes[..check_len];

    let xml_start = prefix.windows(5).position(|w| w == b"<?xml")?;
    let after_xml = &prefix[xml_start..];

    let enc_pos = after_xml
        .windows(9)
        .position(|w| w.eq_ignore_ascii_case(b"encoding="))?;
    let after_enc = &after_xml[enc_pos + 9..];

    let quote = *after_enc.first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }

    let value_end = after_enc[1..].iter().position(|&b| b == quote)? + 1;
    std::str::from_utf8(&after_enc[1..value_end]).ok()
}

/// Strip UTF-8 BOM if present.
pub fn strip_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data)
}

pub const MEDIA_TYPE_XHTML: &str = "application/xhtml+xml";
pub const MEDIA_TYPE_NCX: &str = "application/x-dtbncx+xml";
pub const MEDIA_TYPE_OPF: &str = "application/oebps-package+xml";
pub const MEDIA_TYPE_CSS: &str = "text/css";
pub const MEDIA_TYPE_JAVASCRIPT: &str = "text/javascript";

// ============================================================================
// Resource Format Detection
// ============================================================================

/// Resource formats commonly found in EPUB packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFormat {
    Xhtml,
    Css,
    Jpeg,
    Png,
    Gif,
    Svg,
    WebP,
    Ttf,
    Otf,
    Woff,
    Woff2,
    JavaScript,
    Mp3,
    Mp4Audio,
    Mp4Video,
    WebM,
    Binary,
}

impl MediaFormat {
    /// Get the MIME type string for this format.
    pub fn mime_type(self) -> &'static str {
        match self {
            MediaFormat::Xhtml => MEDIA_TYPE_XHTML,
            MediaFormat::Css => MEDIA_TYPE_CSS,
            MediaFormat::Jpeg => "image/jpeg",
            MediaFormat::Png => "image/png",
            MediaFormat::Gif => "image/gif",
            MediaFormat::Svg => "image/svg+xml",
            MediaFormat::WebP => "image/webp",
            MediaFormat::Ttf => "font/ttf",
            MediaFormat::Otf => "font/otf",
            MediaFormat::Woff => "font/woff",
            MediaFormat::Woff2 => "font/woff2",
            MediaFormat::JavaScript => MEDIA_TYPE_JAVASCRIPT,
            MediaFormat::Mp3 => "audio/mpeg",
            MediaFormat::Mp4Audio => "audio/mp4",
            MediaFormat::Mp4Video => "video/mp4",
            MediaFormat::WebM => "video/webm",
            MediaFormat::Binary => "application/octet-stream",
        }
    }

    /// Check if this format represents an image.
    pub fn is_image(self) -> bool {
        matches!(
            self,
            MediaFormat::Jpeg
                | MediaFormat::Png
                | MediaFormat::Gif
                | MediaFormat::Svg
                | MediaFormat::WebP
        )
    }

    /// Check if this format represents a font.
    pub fn is_font(self) -> bool {
        matches!(
            self,
            MediaFormat::Ttf | MediaFormat::Otf | MediaFormat::Woff | MediaFormat::Woff2
        )
    }
}

/// Detect resource format from file path and/or raw bytes.
///
/// Tries extension-based detection first, then falls back to magic bytes.
pub fn detect_media_format(path: &str, data: &[u8]) -> MediaFormat {
    let path_lower = path.to_lowercase();
    let extension = path_lower.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");

    let by_extension = match extension {
        "xhtml" | "html" | "htm" => Some(MediaFormat::Xhtml),
        "css" => Some(MediaFormat::Css),
        "jpg" | "jpeg" => Some(MediaFormat::Jpeg),
        "png" => Some(MediaFormat::Png),
        "gif" => Some(MediaFormat::Gif),
        "svg" => Some(MediaFormat::Svg),
        "webp" => Some(MediaFormat::WebP),
        "ttf" => Some(MediaFormat::Ttf),
        "otf" => Some(MediaFormat::Otf),
        "woff" => Some(MediaFormat::Woff),
        "woff2" => Some(MediaFormat::Woff2),
        "js" => Some(MediaFormat::JavaScript),
        "mp3" => Some(MediaFormat::Mp3),
        "m4a" => Some(MediaFormat::Mp4Audio),
        "mp4" => Some(MediaFormat::Mp4Video),
        "webm" => Some(MediaFormat::WebM),
        _ => None,
    };
    if let Some(format) = by_extension {
        return format;
    }

    // Fallback to magic byte detection
    if data.starts_with(&[0xFF, 0xD8]) {
        return MediaFormat::Jpeg;
    }
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        return MediaFormat::Png;
    }
    if data.starts_with(b"GIF") {
        return MediaFormat::Gif;
    }
    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return MediaFormat::WebP;
    }

    MediaFormat::Binary
}

/// Conventional package subfolder for a media type (`Text`, `Images`, ...).
pub fn folder_for_media_type(media_type: &str) -> &'static str {
    match media_type {
        MEDIA_TYPE_XHTML => "Text",
        MEDIA_TYPE_CSS => "Styles",
        _ if media_type.starts_with("image/") => "Images",
        _ if media_type.starts_with("font/")
            || media_type.contains("opentype")
            || media_type.contains("font-") =>
        {
            "Fonts"
        }
        _ if media_type.starts_with("audio/") => "Audio",
        _ if media_type.starts_with("video/") => "Video",
        _ => "Misc",
    }
}

/// Rewrite the `url(...)` references of a stylesheet.
///
/// `relink` receives each URL without its quotes and returns the
/// replacement, if any. Returns `None` when nothing changed.
pub fn rewrite_css_urls(css: &str, mut relink: impl FnMut(&str) -> Option<String>) -> Option<String> {
    let lower = css.to_ascii_lowercase();
    let mut out = String::with_capacity(css.len());
    let mut pos = 0;
    let mut changed = false;

    while let Some(found) = lower[pos..].find("url(") {
        let open = pos + found + 4;
        let Some(len) = css[open..].find(')') else {
            break;
        };
        let inner = css[open..open + len].trim();
        let (quote, url) = match inner.chars().next() {
            Some(q @ ('"' | '\'')) if inner.len() >= 2 && inner.ends_with(q) => {
                (q, &inner[1..inner.len() - 1])
            }
            _ => ('"', inner),
        };

        out.push_str(&css[pos..open]);
        match relink(url) {
            Some(new) => {
                out.push(quote);
                out.push_str(&new);
                out.push(quote);
                changed = true;
            }
            None => out.push_str(&css[open..open + len]),
        }
        pos = open + len;
    }
    out.push_str(&css[pos..]);
    changed.then_some(out)
}
