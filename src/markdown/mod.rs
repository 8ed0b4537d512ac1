//! Markdown to XHTML conversion.
//!
//! The builder only needs a pure `text -> XHTML body` function, expressed as
//! [`MarkdownConverter`]. Closures implement it, so a caller can plug in any
//! renderer; [`CommonMarkConverter`] is the default.

use std::collections::HashSet;

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd, html};

/// Converts Markdown text into an XHTML body fragment.
///
/// Conversion is total: malformed Markdown degrades to best-effort output.
pub trait MarkdownConverter {
    fn convert(&self, markdown: &str) -> String;
}

impl<F> MarkdownConverter for F
where
    F: Fn(&str) -> String,
{
    fn convert(&self, markdown: &str) -> String {
        self(markdown)
    }
}

/// CommonMark (plus tables, strikethrough, task lists and `{#id}` heading
/// attributes) rendered with `pulldown-cmark`.
///
/// Headings without an explicit id get a slug id so they can be linked from
/// a generated table of contents. Raw HTML in the Markdown is escaped into
/// text unless [`with_raw_html`](Self::with_raw_html) is set, since HTML
/// need not be well-formed XML.
#[derive(Debug, Clone)]
pub struct CommonMarkConverter {
    options: Options,
    heading_ids: bool,
    raw_html: bool,
}

impl Default for CommonMarkConverter {
    fn default() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_HEADING_ATTRIBUTES);
        Self {
            options,
            heading_ids: true,
            raw_html: false,
        }
    }
}

impl CommonMarkConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Disable automatic heading ids.
    pub fn without_heading_ids(mut self) -> Self {
        self.heading_ids = false;
        self
    }

    /// Copy raw HTML through unchanged. The caller must make sure it is
    /// well-formed XHTML.
    pub fn with_raw_html(mut self) -> Self {
        self.raw_html = true;
        self
    }
}

impl MarkdownConverter for CommonMarkConverter {
    fn convert(&self, markdown: &str) -> String {
        let mut events: Vec<Event<'_>> = Parser::new_ext(markdown, self.options)
            .map(|event| match event {
                Event::Html(raw) | Event::InlineHtml(raw) if !self.raw_html => Event::Text(raw),
                other => other,
            })
            .collect();
        if self.heading_ids {
            assign_heading_ids(&mut events);
        }

        let mut body = String::new();
        html::push_html(&mut body, events.into_iter());
        body
    }
}

fn assign_heading_ids(events: &mut [Event<'_>]) {
    let mut used: HashSet<String> = events
        .iter()
        .filter_map(|event| match event {
            Event::Start(Tag::Heading { id: Some(id), .. }) => Some(id.to_string()),
            _ => None,
        })
        .collect();

    for i in 0..events.len() {
        if !matches!(events[i], Event::Start(Tag::Heading { id: None, .. })) {
            continue;
        }

        let mut text = String::new();
        for event in &events[i + 1..] {
            match event {
                Event::End(TagEnd::Heading(_)) => break,
                Event::Text(t) | Event::Code(t) => text.push_str(t),
                _ => {}
            }
        }

        let slug = unique_slug(&slugify(&text), &mut used);
        if let Event::Start(Tag::Heading { id, .. }) = &mut events[i] {
            *id = Some(slug.into());
        }
    }
}

/// Generate a GitHub-style slug from text.
///
/// Lowercases ASCII alphanumerics, turns whitespace, `-` and `_` into
/// single hyphens and drops everything else.
///
/// ```
/// use quire::markdown::slugify;
///
/// assert_eq!(slugify("Chapter One"), "chapter-one");
/// assert_eq!(slugify("Hello, World!"), "hello-world");
/// ```
pub fn slugify(text: &str) -> String {
    text.chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() {
                Some(c.to_ascii_lowercase())
            } else if c.is_whitespace() || c == '-' || c == '_' {
                Some('-')
            } else {
                None
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Make `base` a usable, unused id and record it.
fn unique_slug(base: &str, used: &mut HashSet<String>) -> String {
    let base = match base.chars().next() {
        None => "section".to_string(),
        Some(c) if c.is_ascii_digit() => format!("section-{}", base),
        Some(_) => base.to_string(),
    };

    let mut candidate = base.clone();
    let mut n = 1;
    while used.contains(&candidate) {
        candidate = format!("{}-{}", base, n);
        n += 1;
    }
    used.insert(candidate.clone());
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Chapter One"), "chapter-one");
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Multiple   Spaces  "), "multiple-spaces");
        assert_eq!(slugify("snake_case-and-kebab"), "snake-case-and-kebab");
        assert_eq!(slugify("Ünïcode"), "ncode");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_unique_slug() {
        let mut used = HashSet::new();
        assert_eq!(unique_slug("intro", &mut used), "intro");
        assert_eq!(unique_slug("intro", &mut used), "intro-1");
        assert_eq!(unique_slug("intro", &mut used), "intro-2");
        assert_eq!(unique_slug("", &mut used), "section");
        assert_eq!(unique_slug("1-start", &mut used), "section-1-start");
    }

    #[test]
    fn test_convert_basic() {
        let html = CommonMarkConverter::new().convert("# Title\n\nSome *emphasis* & more.");
        assert!(html.contains(r#"<h1 id="title">Title</h1>"#));
        assert!(html.contains("<em>emphasis</em>"));
        assert!(html.contains("&amp; more"));
    }

    #[test]
    fn test_convert_heading_ids() {
        let html = CommonMarkConverter::new()
            .convert("# Intro\n\n## `code` Part {#custom}\n\n## Intro\n\n# Intro {#intro-1}\n");
        assert!(html.contains(r#"<h1 id="intro">Intro</h1>"#));
        assert!(html.contains(r#"id="custom""#));
        // the explicit id is reserved before auto ids are chosen
        assert!(html.contains(r#"<h2 id="intro-2">Intro</h2>"#));
        assert!(html.contains(r#"<h1 id="intro-1">Intro</h1>"#));
    }

    #[test]
    fn test_convert_without_heading_ids() {
        let html = CommonMarkConverter::new()
            .without_heading_ids()
            .convert("# Title");
        assert!(html.contains("<h1>Title</h1>"));
    }

    #[test]
    fn test_void_elements_are_self_closed() {
        let html = CommonMarkConverter::new().convert("a  \nb\n\n---\n\n![alt](img.png)");
        assert!(html.contains("<br />"));
        assert!(html.contains("<hr />"));
        assert!(html.contains(r#"<img src="img.png" alt="alt" />"#));
    }

    #[test]
    fn test_raw_html_is_escaped() {
        let html = CommonMarkConverter::new().convert("line<br>break\n\n<div>\nblock\n");
        assert!(html.contains("line&lt;br&gt;break"));
        assert!(html.contains("&lt;div&gt;"));
        assert!(!html.contains("<br>"));
        assert!(!html.contains("<div>"));
    }

    #[test]
    fn test_raw_html_passthrough() {
        let html = CommonMarkConverter::new()
            .with_raw_html()
            .convert("line<br/>break");
        assert!(html.contains("line<br/>break"));
    }

    #[test]
    fn test_closure_converter() {
        let upper = |s: &str| s.to_uppercase();
        assert_eq!(upper.convert("abc"), "ABC");
    }
}
