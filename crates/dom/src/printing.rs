use core::fmt;

use crate::{Document, NodeKind};
use indextree::NodeId;
use serde_json::{Map, Value, json};

/// Elements serialized without a closing tag.
const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

/// Serialize the markup of `id` itself.
pub(crate) fn serialize_node(doc: &Document, id: NodeId, out: &mut String) {
    match doc.kind(id) {
        Some(NodeKind::Document) | None => serialize_children(doc, id, out),
        Some(NodeKind::Element { tag }) => {
            out.push('<');
            out.push_str(tag);
            for (name, value) in doc.attrs(id) {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                escape_attr(value, out);
                out.push('"');
            }
            out.push('>');
            if is_void(tag) {
                return;
            }
            serialize_children(doc, id, out);
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        Some(NodeKind::Text { text }) => escape_text(text, out),
    }
}

/// Serialize the markup of the node's children.
pub(crate) fn serialize_children(doc: &Document, id: NodeId, out: &mut String) {
    for kid in doc.children(id) {
        serialize_node(doc, kid, out);
    }
}

/// A child slot after merging: either a run of adjacent text or one
/// non-text node.
enum Piece {
    Text(String),
    Node(NodeId),
}

/// Merge runs of adjacent text children; non-text children pass through.
fn merged_children(doc: &Document, id: NodeId) -> Vec<Piece> {
    let mut pieces: Vec<Piece> = Vec::new();
    for child in doc.children(id) {
        match doc.kind(child) {
            Some(NodeKind::Text { text }) => {
                if let Some(Piece::Text(run)) = pieces.last_mut() {
                    run.push_str(text);
                } else {
                    pieces.push(Piece::Text(text.clone()));
                }
            }
            _ => pieces.push(Piece::Node(child)),
        }
    }
    pieces
}

fn children_to_json(doc: &Document, id: NodeId) -> Vec<Value> {
    merged_children(doc, id)
        .into_iter()
        .filter_map(|piece| match piece {
            Piece::Text(run) if run.trim().is_empty() => None,
            Piece::Text(run) => Some(json!({ "type": "text", "text": run })),
            Piece::Node(child) => match node_to_json(doc, child) {
                Value::Null => None,
                value => Some(value),
            },
        })
        .collect()
}

/// Deterministic attribute object: keys sorted, values as strings.
fn attrs_to_json(doc: &Document, id: NodeId) -> Value {
    let mut sorted: Vec<&(String, String)> = doc.attrs(id).iter().collect();
    sorted.sort_by(|lhs, rhs| lhs.0.cmp(&rhs.0));
    Value::Object(
        sorted
            .into_iter()
            .map(|(name, value)| (name.clone(), Value::String(value.clone())))
            .collect::<Map<String, Value>>(),
    )
}

/// Convert a node to a JSON value for snapshots. Whitespace-only text
/// collapses to `Null`, which the child collector drops.
pub(crate) fn node_to_json(doc: &Document, id: NodeId) -> Value {
    match doc.kind(id) {
        Some(NodeKind::Element { tag }) => json!({
            "type": "element",
            "tag": tag.to_lowercase(),
            "attrs": attrs_to_json(doc, id),
            "children": children_to_json(doc, id),
        }),
        Some(NodeKind::Text { text }) if !text.trim().is_empty() => {
            json!({ "type": "text", "text": text })
        }
        Some(NodeKind::Text { .. }) => Value::Null,
        Some(NodeKind::Document) | None => {
            json!({ "type": "document", "children": children_to_json(doc, id) })
        }
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_indent(formatter: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
            for _ in 0..depth {
                formatter.write_str("  ")?;
            }
            Ok(())
        }

        fn fmt_node(
            doc: &Document,
            id: NodeId,
            formatter: &mut fmt::Formatter<'_>,
            depth: usize,
        ) -> fmt::Result {
            match doc.kind(id) {
                Some(NodeKind::Document) | None => {
                    write_indent(formatter, depth)?;
                    writeln!(formatter, "#document")?;
                }
                Some(NodeKind::Element { tag }) => {
                    write_indent(formatter, depth)?;
                    write!(formatter, "<{tag}")?;
                    for (name, value) in doc.attrs(id) {
                        write!(formatter, " {name}=\"{value}\"")?;
                    }
                    writeln!(formatter, ">")?;
                }
                Some(NodeKind::Text { text }) => {
                    if text.chars().all(char::is_whitespace) {
                        return Ok(());
                    }
                    write_indent(formatter, depth)?;
                    writeln!(formatter, "{text:?}")?;
                }
            }
            for child in doc.children(id) {
                fmt_node(doc, child, formatter, depth + 1)?;
            }
            Ok(())
        }

        fmt_node(self, self.root, f, 0)
    }
}
