//! Allow-list markup sanitizer.
//!
//! `sanitize` never fails and is idempotent; edited content round-trips
//! through it on every save. The allow-list constants are part of the
//! external contract — previously stored content was cleaned against
//! exactly these sets, so changing them changes what existing articles
//! render as.

use crate::dom::{self, Element, Node};

pub const ALLOWED_TAGS: &[&str] = &[
    "p", "br", "hr", "span", "div", "pre", "code", "h1", "h2", "h3", "h4", "h5", "h6", "strong",
    "b", "em", "i", "u", "s", "blockquote", "ul", "ol", "li", "table", "thead", "tbody", "tr",
    "th", "td", "caption", "colgroup", "col", "a", "img", "figure", "figcaption", "video", "audio",
    "source",
];

/// Attributes allowed on any tag.
pub const GLOBAL_ATTRS: &[&str] = &["class", "id", "style"];

/// Additional attributes allowed per tag.
pub const TAG_ATTRS: &[(&str, &[&str])] = &[
    ("a", &["href", "title", "target", "rel"]),
    ("img", &["src", "alt", "title", "width", "height", "loading"]),
    ("video", &["src", "poster", "controls", "preload", "width", "height"]),
    ("audio", &["src", "controls", "preload"]),
    ("source", &["src", "type"]),
    ("table", &["border", "cellpadding", "cellspacing", "width", "height"]),
    ("td", &["colspan", "rowspan", "width", "height"]),
    ("th", &["colspan", "rowspan", "width", "height"]),
];

pub const ALLOWED_PROTOCOLS: &[&str] = &["http", "https", "data", "blob"];

pub const ALLOWED_CSS_PROPERTIES: &[&str] = &[
    // borders
    "border", "border-top", "border-right", "border-bottom", "border-left", "border-color",
    "border-width", "border-style", "border-collapse",
    // sizing
    "width", "height", "min-width", "max-width", "min-height", "max-height",
    // spacing / alignment
    "padding", "margin", "text-align", "vertical-align", "white-space",
    // color / background / font
    "color", "background", "background-color", "font-weight", "font-style", "font-size",
    "line-height",
];

/// Attributes whose values are URLs and subject to the protocol allow-list.
const URL_ATTRS: &[&str] = &["href", "src", "poster"];

/// Tags whose entire subtree is removed rather than unwrapped.
const DROP_WITH_CHILDREN: &[&str] = &["script", "style"];

/// Clean untrusted markup down to the allow-listed subset.
///
/// Disallowed elements are unwrapped (children kept) except `script` and
/// `style`, which are removed with their content. Disallowed attributes,
/// CSS declarations and URL protocols are dropped. Always returns a string;
/// empty input yields an empty string.
pub fn sanitize(raw: &str) -> String {
    let nodes = dom::parse(raw);
    let clean = sanitize_nodes(nodes);
    dom::serialize(&clean)
}

fn sanitize_nodes(nodes: Vec<Node>) -> Vec<Node> {
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node {
            Node::Text(text) => out.push(Node::Text(text)),
            Node::Element(el) => {
                if DROP_WITH_CHILDREN.contains(&el.name.as_str()) {
                    continue;
                }
                if ALLOWED_TAGS.contains(&el.name.as_str()) {
                    out.push(Node::Element(sanitize_element(el)));
                } else {
                    // Unwrap: keep the children, lose the tag.
                    out.extend(sanitize_nodes(el.children));
                }
            }
        }
    }
    out
}

fn sanitize_element(el: Element) -> Element {
    let name = el.name;
    let mut attrs = Vec::with_capacity(el.attrs.len());
    for (key, value) in el.attrs {
        if !attr_allowed(&name, &key) {
            continue;
        }
        if key == "style" {
            let clean = sanitize_css(&value);
            if !clean.is_empty() {
                attrs.push((key, clean));
            }
            continue;
        }
        if URL_ATTRS.contains(&key.as_str()) && !protocol_allowed(&value) {
            continue;
        }
        attrs.push((key, value));
    }
    Element {
        name,
        attrs,
        children: sanitize_nodes(el.children),
    }
}

fn attr_allowed(tag: &str, attr: &str) -> bool {
    if GLOBAL_ATTRS.contains(&attr) {
        return true;
    }
    TAG_ATTRS
        .iter()
        .find(|(t, _)| *t == tag)
        .map(|(_, attrs)| attrs.contains(&attr))
        .unwrap_or(false)
}

fn protocol_allowed(value: &str) -> bool {
    match dom::url_scheme(value) {
        Some(scheme) => ALLOWED_PROTOCOLS.contains(&scheme.as_str()),
        // Relative URLs carry no protocol and are fine.
        None => true,
    }
}

/// Keep only allow-listed CSS declarations from a `style` value.
fn sanitize_css(style: &str) -> String {
    let mut kept = Vec::new();
    for decl in style.split(';') {
        let decl = decl.trim();
        if decl.is_empty() {
            continue;
        }
        let Some((prop, value)) = decl.split_once(':') else {
            continue;
        };
        let prop = prop.trim().to_ascii_lowercase();
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        if ALLOWED_CSS_PROPERTIES.contains(&prop.as_str()) {
            kept.push(format!("{}: {}", prop, value));
        }
    }
    kept.join("; ")
}
