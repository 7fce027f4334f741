use crate::{Document, NodeKind};
use html5ever::tendril::{StrTendril, TendrilSink as _};
use html5ever::tree_builder::{ElementFlags, NodeOrText, QuirksMode, TreeSink};
use html5ever::{Attribute, ExpandedName, ParseOpts, QualName};
use html5ever::{LocalName, local_name, namespace_url, ns};
use indextree::NodeId;
use std::borrow::Cow;
use std::collections::HashMap;

/// `TreeSink` implementation that writes directly into a [`Document`] arena.
///
/// `scope` plays the role of the sink's document node; for fragment parsing it
/// is a detached container so parsed nodes never touch the live tree.
struct ArenaSink<'doc> {
    doc: &'doc mut Document,
    scope: NodeId,
    /// Qualified names of elements created during this parse, for the tree
    /// builder's scope queries.
    names: HashMap<NodeId, QualName>,
    fallback_name: QualName,
}

impl<'doc> ArenaSink<'doc> {
    fn new(doc: &'doc mut Document, scope: NodeId) -> Self {
        Self {
            doc,
            scope,
            names: HashMap::new(),
            fallback_name: QualName::new(None, ns!(html), local_name!("div")),
        }
    }

    fn append_text(&mut self, parent: NodeId, text: &str) {
        // Coalesce with a preceding text node so serialization stays stable.
        if let Some(last) = self.doc.children(parent).last()
            && let Some(NodeKind::Text { text: existing }) = self.doc.kind(last)
        {
            let mut merged = existing.clone();
            merged.push_str(text);
            self.doc.set_text(last, &merged);
            return;
        }
        let node = self.doc.new_text(text);
        self.doc.append(parent, node);
    }
}

impl TreeSink for ArenaSink<'_> {
    type Handle = NodeId;
    type Output = ();

    fn finish(self) -> Self::Output {}

    fn parse_error(&mut self, _msg: Cow<'static, str>) {}

    fn get_document(&mut self) -> Self::Handle {
        self.scope
    }

    fn elem_name<'a>(&'a self, target: &'a Self::Handle) -> ExpandedName<'a> {
        self.names
            .get(target)
            .unwrap_or(&self.fallback_name)
            .expanded()
    }

    fn create_element(
        &mut self,
        name: QualName,
        attrs: Vec<Attribute>,
        _flags: ElementFlags,
    ) -> Self::Handle {
        let id = self.doc.new_element(name.local.to_string());
        for attr in attrs {
            self.doc
                .set_attr(id, &attr.name.local.to_string(), &attr.value.to_string());
        }
        self.names.insert(id, name);
        id
    }

    fn create_comment(&mut self, _text: StrTendril) -> Self::Handle {
        // Comments are not modeled; park an empty text node.
        self.doc.new_text("")
    }

    fn create_pi(&mut self, _target: StrTendril, _data: StrTendril) -> Self::Handle {
        self.doc.new_text("")
    }

    fn append(&mut self, parent: &Self::Handle, child: NodeOrText<Self::Handle>) {
        match child {
            NodeOrText::AppendNode(node) => self.doc.append(*parent, node),
            NodeOrText::AppendText(text) => self.append_text(*parent, &text),
        }
    }

    fn append_based_on_parent_node(
        &mut self,
        element: &Self::Handle,
        prev_element: &Self::Handle,
        child: NodeOrText<Self::Handle>,
    ) {
        if self.doc.parent(*element).is_some() {
            self.append_before_sibling(element, child);
        } else {
            self.append(prev_element, child);
        }
    }

    fn append_doctype_to_document(
        &mut self,
        _name: StrTendril,
        _public_id: StrTendril,
        _system_id: StrTendril,
    ) {
    }

    fn get_template_contents(&mut self, target: &Self::Handle) -> Self::Handle {
        // Template contents are not modeled separately.
        *target
    }

    fn same_node(&self, x: &Self::Handle, y: &Self::Handle) -> bool {
        x == y
    }

    fn set_quirks_mode(&mut self, _mode: QuirksMode) {}

    fn append_before_sibling(&mut self, sibling: &Self::Handle, new_node: NodeOrText<Self::Handle>) {
        match new_node {
            NodeOrText::AppendNode(node) => self.doc.insert_before(*sibling, node),
            NodeOrText::AppendText(text) => {
                let node = self.doc.new_text(text.to_string());
                self.doc.insert_before(*sibling, node);
            }
        }
    }

    fn add_attrs_if_missing(&mut self, target: &Self::Handle, attrs: Vec<Attribute>) {
        for attr in attrs {
            let name = attr.name.local.to_string();
            if !self.doc.has_attr(*target, &name) {
                self.doc.set_attr(*target, &name, &attr.value.to_string());
            }
        }
    }

    fn remove_from_parent(&mut self, target: &Self::Handle) {
        self.doc.detach(*target);
    }

    fn reparent_children(&mut self, node: &Self::Handle, new_parent: &Self::Handle) {
        let children: Vec<NodeId> = self.doc.children(*node).collect();
        for child in children {
            self.doc.append(*new_parent, child);
        }
    }

    fn mark_script_already_started(&mut self, _node: &Self::Handle) {}

    fn pop(&mut self, _node: &Self::Handle) {}

    fn is_mathml_annotation_xml_integration_point(&self, _handle: &Self::Handle) -> bool {
        false
    }
}

/// Parse a complete document under the document root.
pub(crate) fn parse_document_into(doc: &mut Document, html: &str) {
    let root = doc.root();
    let sink = ArenaSink::new(doc, root);
    html5ever::parse_document(sink, ParseOpts::default()).one(html);
}

/// Parse a markup snippet in a `body` context. The parsed nodes are detached
/// from the live tree; callers splice them in wherever they belong.
pub(crate) fn parse_fragment_into(doc: &mut Document, html: &str) -> Vec<NodeId> {
    let container = doc.new_element("#fragment");
    let sink = ArenaSink::new(doc, container);
    let context = QualName::new(None, ns!(html), LocalName::from("body"));
    html5ever::parse_fragment(sink, ParseOpts::default(), context, Vec::new()).one(html);

    // The fragment tree builder roots parsed content under a synthetic <html>
    // element; unwrap it when present.
    let top: Vec<NodeId> = doc.children(container).collect();
    let parsed: Vec<NodeId> = match top.as_slice() {
        [only] if doc.tag(*only) == Some("html") => doc.children(*only).collect(),
        _ => top,
    };
    for node in &parsed {
        doc.detach(*node);
    }
    parsed
}
