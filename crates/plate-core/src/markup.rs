//! Markup codec between strings and view nodes.
//!
//! Input must be a well-formed fragment; it is parsed inside a synthetic root
//! so several top-level elements and loose text are accepted. Output writes
//! `class` first and the other attributes in lexical order.

use roxmltree::Node as XmlNode;
use thiserror::Error;

use crate::view::{ViewElement, ViewNode};

#[derive(Debug, Error)]
pub enum DataError {
    #[error("malformed markup: {0}")]
    Malformed(#[from] roxmltree::Error),
}

pub fn parse(data: &str) -> Result<Vec<ViewNode>, DataError> {
    let wrapped = format!("<root>{data}</root>");
    let doc = roxmltree::Document::parse(&wrapped)?;
    Ok(convert_children(doc.root_element()))
}

fn convert_children(node: XmlNode<'_, '_>) -> Vec<ViewNode> {
    node.children()
        .filter_map(|child| {
            if child.is_element() {
                let mut el = ViewElement::container(child.tag_name().name());
                for attr in child.attributes() {
                    if attr.name() == "class" {
                        el.classes
                            .extend(attr.value().split_whitespace().map(str::to_string));
                    } else {
                        el.attrs
                            .insert(attr.name().to_string(), attr.value().to_string());
                    }
                }
                el.children = convert_children(child);
                Some(ViewNode::Element(el))
            } else if child.is_text() {
                child.text().map(|text| ViewNode::Text(text.to_string()))
            } else {
                None
            }
        })
        .collect()
}

pub fn stringify(nodes: &[ViewNode]) -> String {
    let mut out = String::new();
    write_nodes(nodes, &mut out);
    out
}

fn write_nodes(nodes: &[ViewNode], out: &mut String) {
    for node in nodes {
        match node {
            ViewNode::Text(text) => escape_into(text, false, out),
            ViewNode::Element(el) => {
                out.push('<');
                out.push_str(&el.name);
                if !el.classes.is_empty() {
                    out.push_str(" class=\"");
                    let classes: Vec<&str> = el.classes.iter().map(String::as_str).collect();
                    escape_into(&classes.join(" "), true, out);
                    out.push('"');
                }
                for (key, value) in &el.attrs {
                    if key == "class" {
                        continue;
                    }
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    escape_into(value, true, out);
                    out.push('"');
                }
                out.push('>');
                write_nodes(&el.children, out);
                out.push_str("</");
                out.push_str(&el.name);
                out.push('>');
            }
        }
    }
}

fn escape_into(text: &str, attribute: bool, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}
