//! HTML to plain text for indexing.
//!
//! Media elements are replaced with bracketed markers so retrieval text
//! keeps their context; everything else is stripped to text, whitespace
//! collapsed per line, blank lines dropped.

use crate::dom::{self, Element, Node};

/// Convert sanitized article HTML into retrieval-ready plain text.
pub fn html_to_text(html: &str) -> String {
    let nodes = dom::parse(html);
    let mut pieces: Vec<String> = Vec::new();
    collect_text(&nodes, &mut pieces);

    let joined = pieces.join("\n");
    let lines: Vec<String> = joined
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect();
    lines.join("\n")
}

fn collect_text(nodes: &[Node], pieces: &mut Vec<String>) {
    for node in nodes {
        match node {
            Node::Text(text) => pieces.push(text.clone()),
            Node::Element(el) => match el.name.as_str() {
                "script" | "style" => {}
                "img" => {
                    let alt = el.attr("alt").unwrap_or("").trim();
                    let label = if alt.is_empty() {
                        filename_of(el.attr("src").unwrap_or(""))
                    } else {
                        alt.to_string()
                    };
                    pieces.push(format!("[IMAGE: {}]", label));
                }
                "video" => pieces.push(format!("[VIDEO: {}]", media_filename(el))),
                "audio" => pieces.push(format!("[AUDIO: {}]", media_filename(el))),
                _ => collect_text(&el.children, pieces),
            },
        }
    }
}

/// Filename for a video/audio marker: the element's own `src`, falling
/// back to its first `<source>` child.
fn media_filename(el: &Element) -> String {
    let src = el.attr("src").map(str::to_string).or_else(|| {
        el.children.iter().find_map(|child| match child {
            Node::Element(c) if c.name == "source" => c.attr("src").map(str::to_string),
            _ => None,
        })
    });
    filename_of(&src.unwrap_or_default())
}

fn filename_of(url: &str) -> String {
    url.rsplit('/').next().unwrap_or("").to_string()
}
