//! Offset arithmetic over the text leaves of a text block.
//!
//! Offsets are byte offsets into the concatenated text of all leaves. Leaf
//! boundaries carry no meaning: two adjacent leaves with equal attributes are
//! the same run.

use std::ops::Range;

use serde_json::Value;

use crate::core::{Attrs, Node, TextNode};

pub fn clamp_to_char_boundary(s: &str, mut ix: usize) -> usize {
    ix = ix.min(s.len());
    while ix > 0 && !s.is_char_boundary(ix) {
        ix -= 1;
    }
    ix
}

pub fn leaves(children: &[Node]) -> impl Iterator<Item = &TextNode> {
    children.iter().filter_map(|node| match node {
        Node::Text(t) => Some(t),
        Node::Element(_) => None,
    })
}

pub fn text_len(children: &[Node]) -> usize {
    leaves(children).map(|t| t.text.len()).sum()
}

pub fn text(children: &[Node]) -> String {
    leaves(children).map(|t| t.text.as_str()).collect()
}

/// Non-empty leaves with their byte span.
pub fn runs(children: &[Node]) -> Vec<(Range<usize>, &Attrs)> {
    let mut out = Vec::new();
    let mut cursor = 0;
    for leaf in leaves(children) {
        let end = cursor + leaf.text.len();
        if end > cursor {
            out.push((cursor..end, &leaf.attrs));
        }
        cursor = end;
    }
    out
}

/// Attributes of the character ending at `offset`.
pub fn attrs_before(children: &[Node], offset: usize) -> Option<&Attrs> {
    runs(children)
        .into_iter()
        .find(|(span, _)| span.start < offset && offset <= span.end)
        .map(|(_, attrs)| attrs)
}

/// Attributes of the character starting at `offset`.
pub fn attrs_after(children: &[Node], offset: usize) -> Option<&Attrs> {
    runs(children)
        .into_iter()
        .find(|(span, _)| span.start <= offset && offset < span.end)
        .map(|(_, attrs)| attrs)
}

/// Attributes a collapsed caret at `offset` takes on.
///
/// With default gravity the caret inherits from the text before it (or the
/// text after it at the start of a block). With overridden gravity it takes
/// the text after it, and nothing at the end of a block.
pub fn attributes_at(children: &[Node], offset: usize, gravity_overridden: bool) -> Attrs {
    if gravity_overridden {
        return attrs_after(children, offset).cloned().unwrap_or_default();
    }
    if offset > 0 {
        if let Some(attrs) = attrs_before(children, offset) {
            return attrs.clone();
        }
    }
    if let Some(attrs) = attrs_after(children, offset) {
        return attrs.clone();
    }
    leaves(children)
        .next()
        .map(|leaf| leaf.attrs.clone())
        .unwrap_or_default()
}

pub fn slice(children: &[Node], range: Range<usize>) -> Vec<TextNode> {
    let leaves: Vec<&TextNode> = leaves(children).collect();
    slice_leaves(&leaves, range)
}

fn slice_leaves(leaves: &[&TextNode], range: Range<usize>) -> Vec<TextNode> {
    let mut out = Vec::new();
    let mut cursor = 0;
    for leaf in leaves {
        let span = cursor..cursor + leaf.text.len();
        cursor = span.end;
        let start = range.start.max(span.start);
        let end = range.end.min(span.end);
        if start >= end {
            continue;
        }
        out.push(TextNode {
            text: leaf.text[start - span.start..end - span.start].to_string(),
            attrs: leaf.attrs.clone(),
        });
    }
    out
}

/// Replaces `range` with `insert` and returns the removed leaves.
pub(crate) fn splice(
    children: &mut Vec<Node>,
    range: Range<usize>,
    insert: Vec<TextNode>,
) -> Vec<TextNode> {
    let owned: Vec<TextNode> = leaves(children).cloned().collect();
    let refs: Vec<&TextNode> = owned.iter().collect();
    let total: usize = owned.iter().map(|t| t.text.len()).sum();

    let mut out = slice_leaves(&refs, 0..range.start);
    let removed = slice_leaves(&refs, range.clone());
    out.extend(insert);
    out.extend(slice_leaves(&refs, range.end..total));

    *children = canonicalize(out);
    removed
}

/// Sets (or with `None` removes) `key` over `range`. Returns the previous
/// values as maximal spans so the caller can build the inverse.
pub(crate) fn set_attribute(
    children: &mut Vec<Node>,
    range: Range<usize>,
    key: &str,
    value: Option<&Value>,
) -> Vec<(Range<usize>, Option<Value>)> {
    let mut previous: Vec<(Range<usize>, Option<Value>)> = Vec::new();
    let mut out: Vec<TextNode> = Vec::new();
    let mut cursor = 0;

    for leaf in leaves(children) {
        let span = cursor..cursor + leaf.text.len();
        cursor = span.end;
        let start = range.start.clamp(span.start, span.end);
        let end = range.end.clamp(span.start, span.end);
        if start >= end {
            out.push(leaf.clone());
            continue;
        }

        let local = |ix: usize| ix - span.start;
        if start > span.start {
            out.push(TextNode {
                text: leaf.text[..local(start)].to_string(),
                attrs: leaf.attrs.clone(),
            });
        }

        let old = leaf.attrs.get(key).cloned();
        match previous.last_mut() {
            Some((prev_range, prev_value)) if prev_range.end == start && *prev_value == old => {
                prev_range.end = end;
            }
            _ => previous.push((start..end, old)),
        }

        let mut attrs = leaf.attrs.clone();
        match value {
            Some(value) => {
                attrs.insert(key.to_string(), value.clone());
            }
            None => {
                attrs.remove(key);
            }
        }
        out.push(TextNode {
            text: leaf.text[local(start)..local(end)].to_string(),
            attrs,
        });

        if end < span.end {
            out.push(TextNode {
                text: leaf.text[local(end)..].to_string(),
                attrs: leaf.attrs.clone(),
            });
        }
    }

    *children = canonicalize(out);
    previous
}

/// Drops empty leaves, merges equal neighbours and keeps at least one leaf.
pub(crate) fn canonicalize(leaves: Vec<TextNode>) -> Vec<Node> {
    let mut merged: Vec<TextNode> = Vec::new();
    for leaf in leaves {
        if leaf.text.is_empty() {
            continue;
        }
        match merged.last_mut() {
            Some(prev) if prev.attrs == leaf.attrs => prev.text.push_str(&leaf.text),
            _ => merged.push(leaf),
        }
    }
    if merged.is_empty() {
        merged.push(TextNode::new(""));
    }
    merged.into_iter().map(Node::Text).collect()
}
