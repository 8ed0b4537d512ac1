use crate::path::{is_external, split_fragment};
use crate::xml::collapse_whitespace;

/// A table of contents entry (hierarchical).
///
/// `href` is relative to the OPF directory and may carry a fragment. An empty
/// href marks a heading-only entry that groups its children.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TocNode {
    pub label: String,
    pub href: String,
    pub children: Vec<TocNode>,
}

impl TocNode {
    pub fn new(label: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            href: href.into(),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: TocNode) -> Self {
        self.children.push(child);
        self
    }

    /// Points outside the package; never validated against the manifest.
    pub fn is_external(&self) -> bool {
        is_external(&self.href)
    }

    /// The href without its fragment.
    pub fn target(&self) -> &str {
        split_fragment(&self.href).0
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(TocNode::count).sum::<usize>()
    }
}

/// Depth of the deepest branch in `nodes` (0 for an empty tree).
pub fn toc_depth(nodes: &[TocNode]) -> usize {
    nodes
        .iter()
        .map(|n| 1 + toc_depth(&n.children))
        .max()
        .unwrap_or(0)
}

/// Visit every node depth-first, parents before children.
pub fn walk_toc<'a>(nodes: &'a [TocNode], visit: &mut impl FnMut(&'a TocNode)) {
    for node in nodes {
        visit(node);
        walk_toc(&node.children, visit);
    }
}

/// Apply `f` to every href in the tree, depth-first.
pub(crate) fn try_map_hrefs<E>(
    nodes: &mut [TocNode],
    f: &mut impl FnMut(&str) -> Result<String, E>,
) -> Result<(), E> {
    for node in nodes {
        if !node.href.is_empty() {
            node.href = f(&node.href)?;
        }
        try_map_hrefs(&mut node.children, f)?;
    }
    Ok(())
}

/// Collapse whitespace runs in every label and trim them.
pub(crate) fn normalize_labels(nodes: &mut [TocNode]) {
    for node in nodes {
        node.label = collapse_whitespace(&node.label);
        normalize_labels(&mut node.children);
    }
}

/// A structural landmark (`cover`, `toc`, `bodymatter`, ...).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Landmark {
    pub label: String,
    pub href: String,
    /// The `epub:type` value.
    pub kind: String,
}

impl Landmark {
    pub fn new(label: impl Into<String>, href: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            href: href.into(),
            kind: kind.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<TocNode> {
        vec![
            TocNode::new("Part I", "part1.xhtml")
                .with_child(
                    TocNode::new("Chapter 1", "ch1.xhtml")
                        .with_child(TocNode::new("Section 1.1", "ch1.xhtml#s1")),
                )
                .with_child(TocNode::new("Chapter 2", "ch2.xhtml")),
            TocNode::new("Notes", "https://example.com/notes"),
        ]
    }

    #[test]
    fn test_toc_depth_and_count() {
        let toc = sample();
        assert_eq!(toc_depth(&toc), 3);
        assert_eq!(toc_depth(&[]), 0);
        assert_eq!(toc[0].count(), 4);
    }

    #[test]
    fn test_target_and_external() {
        let toc = sample();
        assert_eq!(toc[0].children[0].children[0].target(), "ch1.xhtml");
        assert!(toc[1].is_external());
        assert!(!toc[0].is_external());
    }

    #[test]
    fn test_walk_order() {
        let toc = sample();
        let mut labels = Vec::new();
        walk_toc(&toc, &mut |n| labels.push(n.label.as_str()));
        assert_eq!(
            labels,
            vec!["Part I", "Chapter 1", "Section 1.1", "Chapter 2", "Notes"]
        );
    }

    #[test]
    fn test_normalize_labels() {
        let mut toc = vec![TocNode::new("  Part\n  One ", "").with_child(TocNode::new("A  B", "a.xhtml"))];
        normalize_labels(&mut toc);
        assert_eq!(toc[0].label, "Part One");
        assert_eq!(toc[0].children[0].label, "A B");
    }

    #[test]
    fn test_try_map_hrefs_skips_empty() {
        let mut toc = vec![TocNode::new("Group", "").with_child(TocNode::new("A", "a.xhtml"))];
        try_map_hrefs::<()>(&mut toc, &mut |href| Ok(format!("text/{}", href))).unwrap();
        assert_eq!(toc[0].href, "");
        assert_eq!(toc[0].children[0].href, "text/a.xhtml");
    }
}
