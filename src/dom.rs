//! Owned HTML document tree.
//!
//! User content is parsed leniently once (html5ever via `scraper`) into this
//! tree, and every pipeline pass — sanitizing, media localization, text
//! extraction, attachment reconciliation — walks the same value instead of
//! re-parsing the markup. Comments and doctypes are discarded on parse;
//! serialization re-escapes text and attribute values, so a parse/serialize
//! round trip of already-clean markup is stable.

use scraper::Html;

/// One node of parsed content: an element with ordered attributes and
/// children, or a run of text (stored unescaped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| k == name) {
            Some(pair) => pair.1 = value,
            None => self.attrs.push((name.to_string(), value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) {
        self.attrs.retain(|(k, _)| k != name);
    }
}

/// Elements serialized without a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

pub fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

/// Parse an HTML fragment into an owned node list. Lenient: malformed
/// markup is repaired by the parser rather than rejected.
pub fn parse(html: &str) -> Vec<Node> {
    if html.trim().is_empty() {
        return Vec::new();
    }
    let fragment = Html::parse_fragment(html);
    let root = fragment.root_element();
    root.children().filter_map(convert).collect()
}

fn convert(node_ref: ego_tree::NodeRef<'_, scraper::Node>) -> Option<Node> {
    match node_ref.value() {
        scraper::Node::Text(text) => Some(Node::Text(text.text.to_string())),
        scraper::Node::Element(el) => {
            let attrs = el
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            let children = node_ref.children().filter_map(convert).collect();
            Some(Node::Element(Element {
                name: el.name().to_string(),
                attrs,
                children,
            }))
        }
        // Comments, doctypes and processing instructions are dropped.
        _ => None,
    }
}

/// Serialize a node list back to HTML with proper escaping.
pub fn serialize(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        write_node(node, &mut out);
    }
    out
}

fn write_node(node: &Node, out: &mut String) {
    match node {
        Node::Text(text) => out.push_str(&escape_text(text)),
        Node::Element(el) => {
            out.push('<');
            out.push_str(&el.name);
            for (k, v) in &el.attrs {
                out.push(' ');
                out.push_str(k);
                out.push_str("=\"");
                out.push_str(&escape_attr(v));
                out.push('"');
            }
            out.push('>');
            if !is_void(&el.name) {
                for child in &el.children {
                    write_node(child, out);
                }
                out.push_str("</");
                out.push_str(&el.name);
                out.push('>');
            }
        }
    }
}

pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Scheme of a URL-ish attribute value, lowercased, if it has one before
/// any path/query/fragment character. Relative URLs return `None`.
pub fn url_scheme(value: &str) -> Option<String> {
    let value = value.trim();
    let colon = value.find(':')?;
    let head = &value[..colon];
    if head.is_empty() {
        return None;
    }
    // A slash, query or fragment before the colon means no scheme.
    if head.contains(['/', '?', '#']) {
        return None;
    }
    Some(head.to_ascii_lowercase())
}
