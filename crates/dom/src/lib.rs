//! Arena-backed document tree for the HTMLeX engine.
//!
//! Markup is parsed with html5ever into an `indextree` arena. The tree is
//! mutated in place: the engine splices server fragments into it through the
//! [`swap`] module, resolves elements through [`select`], and reads content
//! back out through the serializers in this crate.

/// HTML parsing into the arena.
pub mod parser;
/// DOM printing and serialization utilities.
mod printing;
/// CSS-style selector matching.
pub mod select;
/// Swap strategies and the subtree diff.
pub mod swap;

pub use indextree::NodeId;

use indextree::{Arena, Node};
use serde_json::Value;
use smallvec::SmallVec;

#[derive(Debug, Clone, Default)]
pub enum NodeKind {
    #[default]
    Document,
    Element {
        tag: String,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct DomNode {
    pub kind: NodeKind,
    pub attrs: SmallVec<(String, String), 4>,
}

/// A mutable document tree. Nodes are never freed: removal detaches a subtree
/// from its parent, so `NodeId`s stay valid for the life of the document.
pub struct Document {
    /// The arena storing all nodes.
    arena: Arena<DomNode>,
    /// The root node ID.
    root: NodeId,
}

impl Default for Document {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let root = arena.new_node(DomNode::default());
        Self { arena, root }
    }

    /// Parse a complete HTML document.
    #[inline]
    #[must_use]
    pub fn parse(html: &str) -> Self {
        let mut doc = Self::new();
        parser::parse_document_into(&mut doc, html);
        doc
    }

    /// Parse a markup snippet into detached nodes inside this document's
    /// arena. The returned nodes have no parent until inserted.
    #[inline]
    pub fn parse_detached(&mut self, html: &str) -> Vec<NodeId> {
        parser::parse_fragment_into(self, html)
    }

    #[inline]
    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    #[inline]
    #[must_use]
    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.arena.get(id).map(|node| &node.get().kind)
    }

    /// The lowercase tag name, for element nodes.
    #[inline]
    #[must_use]
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            Some(NodeKind::Element { tag }) => Some(tag.as_str()),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.kind(id), Some(NodeKind::Element { .. }))
    }

    /// Attribute lookup; names compare ASCII case-insensitively.
    #[inline]
    #[must_use]
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.arena.get(id).and_then(|node| {
            node.get()
                .attrs
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str())
        })
    }

    #[inline]
    #[must_use]
    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.attr(id, name).is_some()
    }

    /// Attributes in insertion order; empty for non-elements.
    #[inline]
    #[must_use]
    pub fn attrs(&self, id: NodeId) -> &[(String, String)] {
        self.arena
            .get(id)
            .map_or(&[], |node| node.get().attrs.as_slice())
    }

    /// Set an attribute, updating or adding as needed.
    #[inline]
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(node) = self.arena.get_mut(id) {
            let attrs = &mut node.get_mut().attrs;
            if let Some((_, val)) = attrs
                .iter_mut()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
            {
                value.clone_into(val);
            } else {
                attrs.push((name.to_owned(), value.to_owned()));
            }
        }
    }

    #[inline]
    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if let Some(node) = self.arena.get_mut(id) {
            node.get_mut()
                .attrs
                .retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        }
    }

    #[inline]
    pub fn new_element(&mut self, tag: impl Into<String>) -> NodeId {
        self.arena.new_node(DomNode {
            kind: NodeKind::Element { tag: tag.into() },
            attrs: SmallVec::new(),
        })
    }

    #[inline]
    pub fn new_text(&mut self, text: impl Into<String>) -> NodeId {
        self.arena.new_node(DomNode {
            kind: NodeKind::Text { text: text.into() },
            attrs: SmallVec::new(),
        })
    }

    /// Replace the text of a text node.
    #[inline]
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        if let Some(node) = self.arena.get_mut(id)
            && let NodeKind::Text { text: text_ref } = &mut node.get_mut().kind
        {
            text.clone_into(text_ref);
        }
    }

    #[inline]
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        id.children(&self.arena)
    }

    #[inline]
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.arena.get(id).and_then(Node::parent)
    }

    /// All nodes of the subtree rooted at `id`, including `id` itself,
    /// in document order.
    #[inline]
    pub fn descendants(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        id.descendants(&self.arena)
    }

    /// Whether the node is reachable from the document root.
    #[inline]
    #[must_use]
    pub fn is_attached(&self, id: NodeId) -> bool {
        id.ancestors(&self.arena).any(|anc| anc == self.root)
    }

    #[inline]
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        self.detach_if_attached(child);
        parent.append(child, &mut self.arena);
    }

    #[inline]
    pub fn prepend(&mut self, parent: NodeId, child: NodeId) {
        self.detach_if_attached(child);
        parent.prepend(child, &mut self.arena);
    }

    #[inline]
    pub fn insert_before(&mut self, sibling: NodeId, child: NodeId) {
        self.detach_if_attached(child);
        sibling.insert_before(child, &mut self.arena);
    }

    #[inline]
    pub fn insert_after(&mut self, sibling: NodeId, child: NodeId) {
        self.detach_if_attached(child);
        sibling.insert_after(child, &mut self.arena);
    }

    /// Detach a subtree from its parent without deleting it.
    #[inline]
    pub fn detach(&mut self, id: NodeId) {
        id.detach(&mut self.arena);
    }

    fn detach_if_attached(&mut self, id: NodeId) {
        if self.parent(id).is_some() {
            id.detach(&mut self.arena);
        }
    }

    /// Detach every child of `id`.
    #[inline]
    pub fn clear_children(&mut self, id: NodeId) {
        let kids: Vec<NodeId> = self.children(id).collect();
        for kid in kids {
            kid.detach(&mut self.arena);
        }
    }

    /// Deep-copy a subtree; the copy is detached.
    #[inline]
    pub fn clone_subtree(&mut self, id: NodeId) -> NodeId {
        let data = self
            .arena
            .get(id)
            .map(|node| node.get().clone())
            .unwrap_or_default();
        let copy = self.arena.new_node(data);
        let kids: Vec<NodeId> = self.children(id).collect();
        for kid in kids {
            let kid_copy = self.clone_subtree(kid);
            copy.append(kid_copy, &mut self.arena);
        }
        copy
    }

    /// Concatenated text of all descendant text nodes.
    #[inline]
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.descendants(id) {
            if let Some(NodeKind::Text { text }) = self.kind(node) {
                out.push_str(text);
            }
        }
        out
    }

    /// First element in document order whose `id` attribute equals `value`.
    #[inline]
    #[must_use]
    pub fn get_element_by_id(&self, value: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .find(|&node| self.is_element(node) && self.attr(node, "id") == Some(value))
    }

    /// All elements matching the selector list, in document order.
    #[inline]
    #[must_use]
    pub fn query_all(&self, selector: &str) -> Vec<NodeId> {
        select::query_all(self, self.root, selector)
    }

    /// Whether an element matches the selector list.
    #[inline]
    #[must_use]
    pub fn matches(&self, id: NodeId, selector: &str) -> bool {
        select::matches(self, id, selector)
    }

    /// Serialized markup of the node's children.
    #[inline]
    #[must_use]
    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        printing::serialize_children(self, id, &mut out);
        out
    }

    /// Serialized markup of the node itself.
    #[inline]
    #[must_use]
    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        printing::serialize_node(self, id, &mut out);
        out
    }

    /// Build a deterministic JSON representation of the tree.
    /// Schema:
    /// - Document: { "type":"document", "children":[ ... ] }
    /// - Element: { "type":"element", "tag": "div", "attrs": {..}, "children":[ ... ] }
    /// - Text: { "type":"text", "text":"..." }
    #[inline]
    #[must_use]
    pub fn to_json_value(&self) -> Value {
        printing::node_to_json(self, self.root)
    }

    /// Pretty JSON string for snapshots and test comparisons.
    #[inline]
    #[must_use]
    pub fn to_json_string(&self) -> String {
        serde_json::to_string_pretty(&self.to_json_value()).unwrap_or_else(|_| String::from("{}"))
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attrs_are_case_insensitive() {
        let mut doc = Document::new();
        let el = doc.new_element("div");
        doc.set_attr(el, "onafterswap", "done");
        assert_eq!(doc.attr(el, "onafterSwap"), Some("done"));
        doc.set_attr(el, "onAfterSwap", "later");
        assert_eq!(doc.attr(el, "onafterswap"), Some("later"));
        assert_eq!(doc.attrs(el).len(), 1);
    }

    #[test]
    fn detach_keeps_node_alive() {
        let mut doc = Document::new();
        let parent = doc.new_element("ul");
        let child = doc.new_element("li");
        doc.append(doc.root(), parent);
        doc.append(parent, child);
        assert!(doc.is_attached(child));
        doc.detach(child);
        assert!(!doc.is_attached(child));
        assert_eq!(doc.tag(child), Some("li"));
        // Reinsertion works after detach.
        doc.append(parent, child);
        assert!(doc.is_attached(child));
    }

    #[test]
    fn clone_subtree_is_deep_and_detached() {
        let mut doc = Document::new();
        let list = doc.new_element("ul");
        let item = doc.new_element("li");
        let text = doc.new_text("one");
        doc.append(doc.root(), list);
        doc.append(list, item);
        doc.append(item, text);

        let copy = doc.clone_subtree(list);
        assert!(!doc.is_attached(copy));
        assert_eq!(doc.outer_html(copy), "<ul><li>one</li></ul>");
        // Mutating the copy leaves the original alone.
        let copy_item = doc.children(copy).next().unwrap();
        doc.detach(copy_item);
        assert_eq!(doc.outer_html(list), "<ul><li>one</li></ul>");
    }

    #[test]
    fn text_content_concatenates_descendants() {
        let doc = Document::parse("<html><body><p>a<b>b</b>c</p></body></html>");
        let body = doc.query_all("p")[0];
        assert_eq!(doc.text_content(body), "abc");
    }
}
