//! A small CSS-style selector engine.
//!
//! Supports the subset the engine's attributes actually use: tag, `#id`,
//! `.class`, `[attr]` / `[attr=value]`, compounds of those, the descendant
//! and child combinators, and comma-separated alternatives.

use crate::Document;
use indextree::NodeId;
use log::warn;

#[derive(Debug, Clone, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, Option<String>)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

/// One selector: compounds joined right-to-left by combinators.
#[derive(Debug, Clone)]
struct Selector {
    /// Stored left-to-right as written; matched right-to-left.
    parts: Vec<(Combinator, Compound)>,
}

fn parse_compound(token: &str) -> Option<Compound> {
    let mut compound = Compound::default();
    let mut chars = token.chars().peekable();
    let mut seen_any = false;

    while let Some(&ch) = chars.peek() {
        match ch {
            '#' => {
                chars.next();
                let name: String = take_ident(&mut chars);
                if name.is_empty() {
                    return None;
                }
                compound.id = Some(name);
            }
            '.' => {
                chars.next();
                let name: String = take_ident(&mut chars);
                if name.is_empty() {
                    return None;
                }
                compound.classes.push(name);
            }
            '[' => {
                chars.next();
                let mut body = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == ']' {
                        closed = true;
                        break;
                    }
                    body.push(inner);
                }
                if !closed || body.is_empty() {
                    return None;
                }
                match body.split_once('=') {
                    Some((name, value)) => {
                        let value = value.trim_matches(|quote| quote == '"' || quote == '\'');
                        compound
                            .attrs
                            .push((name.trim().to_owned(), Some(value.to_owned())));
                    }
                    None => compound.attrs.push((body.trim().to_owned(), None)),
                }
            }
            '*' => {
                chars.next();
            }
            _ => {
                let name: String = take_ident(&mut chars);
                if name.is_empty() {
                    return None;
                }
                compound.tag = Some(name.to_ascii_lowercase());
            }
        }
        seen_any = true;
    }
    seen_any.then_some(compound)
}

fn take_ident(chars: &mut core::iter::Peekable<core::str::Chars<'_>>) -> String {
    let mut out = String::new();
    while let Some(&ch) = chars.peek() {
        if ch.is_alphanumeric() || ch == '-' || ch == '_' {
            out.push(ch);
            chars.next();
        } else {
            break;
        }
    }
    out
}

fn parse_selector(selector: &str) -> Option<Selector> {
    let mut parts = Vec::new();
    let mut next_combinator = Combinator::Descendant;
    for token in selector.split_whitespace() {
        if token == ">" {
            next_combinator = Combinator::Child;
            continue;
        }
        let compound = parse_compound(token)?;
        parts.push((next_combinator, compound));
        next_combinator = Combinator::Descendant;
    }
    if parts.is_empty() { None } else { Some(Selector { parts }) }
}

fn compound_matches(doc: &Document, id: NodeId, compound: &Compound) -> bool {
    if !doc.is_element(id) {
        return false;
    }
    if let Some(tag) = &compound.tag
        && doc.tag(id) != Some(tag.as_str())
    {
        return false;
    }
    if let Some(want) = &compound.id
        && doc.attr(id, "id") != Some(want.as_str())
    {
        return false;
    }
    if !compound.classes.is_empty() {
        let Some(class_attr) = doc.attr(id, "class") else {
            return false;
        };
        for class in &compound.classes {
            if !class_attr.split_whitespace().any(|got| got == class) {
                return false;
            }
        }
    }
    for (name, value) in &compound.attrs {
        match (doc.attr(id, name), value) {
            (Some(_), None) => {}
            (Some(got), Some(want)) if got == want => {}
            _ => return false,
        }
    }
    true
}

/// Match `parts[..=index]` with `parts[index]` anchored at `node`.
fn matches_from(doc: &Document, node: NodeId, parts: &[(Combinator, Compound)]) -> bool {
    let Some(((combinator, compound), rest)) = parts.split_last() else {
        return true;
    };
    if !compound_matches(doc, node, compound) {
        return false;
    }
    if rest.is_empty() {
        return true;
    }
    match combinator {
        Combinator::Child => doc
            .parent(node)
            .is_some_and(|parent| matches_from(doc, parent, rest)),
        Combinator::Descendant => {
            let mut cursor = doc.parent(node);
            while let Some(ancestor) = cursor {
                if matches_from(doc, ancestor, rest) {
                    return true;
                }
                cursor = doc.parent(ancestor);
            }
            false
        }
    }
}

fn selector_list(selector: &str) -> Vec<Selector> {
    let mut out = Vec::new();
    for alternative in selector.split(',') {
        let trimmed = alternative.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(parsed) = parse_selector(trimmed) {
            out.push(parsed);
        } else {
            warn!("Unparseable selector: {trimmed:?}");
        }
    }
    out
}

/// All elements under `scope` (inclusive) matching the selector list,
/// in document order.
pub(crate) fn query_all(doc: &Document, scope: NodeId, selector: &str) -> Vec<NodeId> {
    let selectors = selector_list(selector);
    if selectors.is_empty() {
        return Vec::new();
    }
    doc.descendants(scope)
        .filter(|&node| {
            selectors
                .iter()
                .any(|sel| matches_from(doc, node, &sel.parts))
        })
        .collect()
}

/// Whether a single element matches the selector list.
pub(crate) fn matches(doc: &Document, id: NodeId, selector: &str) -> bool {
    selector_list(selector)
        .iter()
        .any(|sel| matches_from(doc, id, &sel.parts))
}

#[cfg(test)]
mod tests {
    use crate::Document;

    fn doc() -> Document {
        Document::parse(
            "<html><body>\
             <div id=\"top\" class=\"box main\">\
               <ul id=\"list\"><li class=\"item\">a</li><li class=\"item done\">b</li></ul>\
             </div>\
             <input name=\"q\" type=\"text\">\
             </body></html>",
        )
    }

    #[test]
    fn by_id_and_tag() {
        let doc = doc();
        assert_eq!(doc.query_all("#list").len(), 1);
        assert_eq!(doc.query_all("li").len(), 2);
        assert_eq!(doc.query_all("ul li").len(), 2);
        assert_eq!(doc.query_all("nosuch").len(), 0);
    }

    #[test]
    fn by_class_and_compound() {
        let doc = doc();
        assert_eq!(doc.query_all(".item").len(), 2);
        assert_eq!(doc.query_all("li.done").len(), 1);
        assert_eq!(doc.query_all("div.box.main").len(), 1);
        assert_eq!(doc.query_all("div.other").len(), 0);
    }

    #[test]
    fn attribute_selectors() {
        let doc = doc();
        assert_eq!(doc.query_all("[name]").len(), 1);
        assert_eq!(doc.query_all("input[type=text]").len(), 1);
        assert_eq!(doc.query_all("input[type=\"number\"]").len(), 0);
    }

    #[test]
    fn combinators_and_lists() {
        let doc = doc();
        assert_eq!(doc.query_all("#top > ul").len(), 1);
        assert_eq!(doc.query_all("body > li").len(), 0);
        assert_eq!(doc.query_all("#list, input").len(), 2);
    }

    #[test]
    fn document_order() {
        let doc = doc();
        let hits = doc.query_all("li");
        assert_eq!(doc.text_content(hits[0]), "a");
        assert_eq!(doc.text_content(hits[1]), "b");
    }

    #[test]
    fn matches_single_node() {
        let doc = doc();
        let list = doc.get_element_by_id("list").unwrap();
        assert!(doc.matches(list, "ul"));
        assert!(doc.matches(list, "div ul"));
        assert!(!doc.matches(list, "li"));
    }
}
