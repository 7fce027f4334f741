//! Swap strategies: how fragment content is spliced into the tree.

use crate::{Document, NodeKind};
use core::fmt;
use indextree::NodeId;
use log::warn;

/// How content replaces or surrounds a target element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    #[default]
    InnerHtml,
    OuterHtml,
    Append,
    Prepend,
    Before,
    After,
    Remove,
}

impl Strategy {
    /// Parse a strategy name; names compare ASCII case-insensitively.
    #[inline]
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        [
            Self::InnerHtml,
            Self::OuterHtml,
            Self::Append,
            Self::Prepend,
            Self::Before,
            Self::After,
            Self::Remove,
        ]
        .into_iter()
        .find(|strategy| name.eq_ignore_ascii_case(strategy.as_str()))
    }

    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InnerHtml => "innerHTML",
            Self::OuterHtml => "outerHTML",
            Self::Append => "append",
            Self::Prepend => "prepend",
            Self::Before => "before",
            Self::After => "after",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Apply `content` to `target` with the given strategy.
pub fn apply(doc: &mut Document, target: NodeId, strategy: Strategy, content: &str) {
    match strategy {
        Strategy::InnerHtml => diff_inner(doc, target, content),
        Strategy::OuterHtml => {
            let nodes = doc.parse_detached(content);
            let Some(&replacement) = nodes.iter().find(|&&node| doc.is_element(node)) else {
                warn!("outerHTML content has no element; target left untouched");
                return;
            };
            doc.insert_before(target, replacement);
            doc.detach(target);
        }
        Strategy::Append => {
            for node in doc.parse_detached(content) {
                doc.append(target, node);
            }
        }
        Strategy::Prepend => {
            let nodes = doc.parse_detached(content);
            let first = doc.children(target).next();
            match first {
                Some(anchor) => {
                    for node in nodes {
                        doc.insert_before(anchor, node);
                    }
                }
                None => {
                    for node in nodes {
                        doc.append(target, node);
                    }
                }
            }
        }
        Strategy::Before => {
            for node in doc.parse_detached(content) {
                doc.insert_before(target, node);
            }
        }
        Strategy::After => {
            let mut cursor = target;
            for node in doc.parse_detached(content) {
                doc.insert_after(cursor, node);
                cursor = node;
            }
        }
        Strategy::Remove => doc.detach(target),
    }
}

/// Reconcile the target's children against freshly parsed content.
///
/// Children are paired positionally and matched by (node type, tag name).
/// Matches update text and attribute deltas and recurse; mismatches replace
/// the old child with a clone of the new one. If the reconciled subtree does
/// not serialize back to `content`, the children are replaced wholesale.
/// Identical content is a no-op.
fn diff_inner(doc: &mut Document, target: NodeId, content: &str) {
    if doc.inner_html(target).trim() == content.trim() {
        return;
    }
    let fresh = doc.parse_detached(content);
    reconcile_children(doc, target, &fresh);
    if doc.inner_html(target).trim() != content.trim() {
        doc.clear_children(target);
        let again = doc.parse_detached(content);
        for node in again {
            doc.append(target, node);
        }
    }
}

fn same_shape(doc: &Document, old: NodeId, new: NodeId) -> bool {
    match (doc.kind(old), doc.kind(new)) {
        (Some(NodeKind::Text { .. }), Some(NodeKind::Text { .. })) => true,
        (Some(NodeKind::Element { tag: old_tag }), Some(NodeKind::Element { tag: new_tag })) => {
            old_tag == new_tag
        }
        _ => false,
    }
}

fn sync_attrs(doc: &mut Document, old: NodeId, new: NodeId) {
    let wanted: Vec<(String, String)> = doc.attrs(new).to_vec();
    let stale: Vec<String> = doc
        .attrs(old)
        .iter()
        .filter(|(name, _)| !wanted.iter().any(|(want, _)| want.eq_ignore_ascii_case(name)))
        .map(|(name, _)| name.clone())
        .collect();
    for name in stale {
        doc.remove_attr(old, &name);
    }
    for (name, value) in wanted {
        if doc.attr(old, &name) != Some(value.as_str()) {
            doc.set_attr(old, &name, &value);
        }
    }
}

fn reconcile_children(doc: &mut Document, parent: NodeId, fresh: &[NodeId]) {
    let old: Vec<NodeId> = doc.children(parent).collect();
    let count = old.len().max(fresh.len());
    for index in 0..count {
        match (old.get(index).copied(), fresh.get(index).copied()) {
            (Some(old_child), Some(new_child)) => {
                if same_shape(doc, old_child, new_child) {
                    if let Some(NodeKind::Text { text }) = doc.kind(new_child) {
                        let text = text.clone();
                        if doc.text_content(old_child) != text {
                            doc.set_text(old_child, &text);
                        }
                    } else {
                        sync_attrs(doc, old_child, new_child);
                        let grand: Vec<NodeId> = doc.children(new_child).collect();
                        reconcile_children(doc, old_child, &grand);
                    }
                } else {
                    let replacement = doc.clone_subtree(new_child);
                    doc.insert_before(old_child, replacement);
                    doc.detach(old_child);
                }
            }
            (Some(old_child), None) => doc.detach(old_child),
            (None, Some(new_child)) => {
                let addition = doc.clone_subtree(new_child);
                doc.append(parent, addition);
            }
            (None, None) => {}
        }
    }
}
