//! Turns two document states into the change events a conversion pass needs.
//!
//! When the block skeleton (kinds, attributes, nesting) is unchanged each text
//! block is diffed on its own with a char-level text diff: every changed hunk
//! becomes a removal and an insertion, then attribute changes are computed over
//! the retained text. Any structural change rebuilds the whole view.

use std::ops::Range;

use serde_json::Value;
use similar::{DiffTag, TextDiff};

use crate::conversion::{AttributeChange, ChangeEvent};
use crate::core::{Attrs, Document, Node, TextRange};
use crate::inline;
use crate::ops::Path;

pub(crate) fn diff(before: &Document, after: &Document) -> Vec<ChangeEvent> {
    if skeleton(before) != skeleton(after) {
        let mut events = vec![ChangeEvent::RemoveStructure];
        events.extend(insert_document(after));
        return events;
    }

    let mut events = Vec::new();
    for (path, el) in after.text_blocks() {
        let Some(old) = before.element(&path) else {
            continue;
        };
        diff_block(&path, &old.children, &el.children, &mut events);
    }
    events
}

/// Events that build `doc` from nothing.
pub(crate) fn insert_document(doc: &Document) -> Vec<ChangeEvent> {
    let mut events = vec![ChangeEvent::InsertStructure];
    for (path, el) in doc.text_blocks() {
        let len = el.text_len();
        if len == 0 {
            continue;
        }
        events.push(ChangeEvent::InsertText(TextRange::new(path.clone(), 0..len)));
        insert_attributes(&path, &el.children, 0..len, &mut events);
    }
    events
}

#[derive(PartialEq)]
struct SkeletonEntry<'a> {
    path: Path,
    kind: &'a str,
    attrs: &'a Attrs,
    text_block: bool,
}

fn skeleton(doc: &Document) -> Vec<SkeletonEntry<'_>> {
    fn walk<'a>(nodes: &'a [Node], path: &mut Path, out: &mut Vec<SkeletonEntry<'a>>) {
        for (ix, node) in nodes.iter().enumerate() {
            let Node::Element(el) = node else {
                continue;
            };
            path.push(ix);
            out.push(SkeletonEntry {
                path: path.clone(),
                kind: &el.kind,
                attrs: &el.attrs,
                text_block: el.is_text_block(),
            });
            if !el.is_text_block() {
                walk(&el.children, path, out);
            }
            path.pop();
        }
    }

    let mut out = Vec::new();
    walk(&doc.children, &mut Vec::new(), &mut out);
    out
}

fn diff_block(path: &Path, old: &[Node], new: &[Node], events: &mut Vec<ChangeEvent>) {
    let old_text = inline::text(old);
    let new_text = inline::text(new);
    let old_bytes = char_offsets(&old_text);
    let new_bytes = char_offsets(&new_text);

    // Hunks run left to right, so text before a hunk is already in its new
    // form and view offsets are new offsets.
    let mut retained = Vec::new();
    for op in TextDiff::from_chars(&old_text, &new_text).ops() {
        let (tag, old_chars, new_chars) = op.as_tag_tuple();
        let removed = old_bytes[old_chars.start]..old_bytes[old_chars.end];
        let inserted = new_bytes[new_chars.start]..new_bytes[new_chars.end];
        if tag == DiffTag::Equal {
            retained.push((inserted, removed.start));
            continue;
        }
        if !removed.is_empty() {
            let at = inserted.start;
            events.push(ChangeEvent::RemoveText(TextRange::new(
                path.clone(),
                at..at + removed.len(),
            )));
        }
        if !inserted.is_empty() {
            events.push(ChangeEvent::InsertText(TextRange::new(
                path.clone(),
                inserted.clone(),
            )));
            insert_attributes(path, new, inserted, events);
        }
    }

    for (region, old_start) in retained {
        let new_start = region.start;
        attribute_changes(path, old, new, region, |offset| offset - new_start + old_start, events);
    }
}

/// Byte offset of every char, plus the end of the string.
fn char_offsets(text: &str) -> Vec<usize> {
    text.char_indices()
        .map(|(ix, _)| ix)
        .chain(std::iter::once(text.len()))
        .collect()
}

fn insert_attributes(
    path: &Path,
    children: &[Node],
    range: Range<usize>,
    events: &mut Vec<ChangeEvent>,
) {
    for (span, attrs) in inline::runs(children) {
        let start = span.start.max(range.start);
        let end = span.end.min(range.end);
        if start >= end {
            continue;
        }
        for (key, value) in attrs {
            push_change(
                events,
                AttributeChange {
                    range: TextRange::new(path.clone(), start..end),
                    key: key.clone(),
                    old: None,
                    new: Some(value.clone()),
                },
            );
        }
    }
}

/// Attribute differences over `region` (new coordinates) of retained text.
fn attribute_changes(
    path: &Path,
    old: &[Node],
    new: &[Node],
    region: Range<usize>,
    to_old: impl Fn(usize) -> usize,
    events: &mut Vec<ChangeEvent>,
) {
    if region.is_empty() {
        return;
    }

    let old_start = to_old(region.start);
    let old_end = to_old(region.end);
    let mut cuts = vec![region.start, region.end];
    for (span, _) in inline::runs(new) {
        cuts.extend([span.start, span.end]);
    }
    for (span, _) in inline::runs(old) {
        for edge in [span.start, span.end] {
            if edge > old_start && edge < old_end {
                cuts.push(edge + region.start - old_start);
            }
        }
    }
    cuts.retain(|cut| region.contains(cut) || *cut == region.end);
    cuts.sort_unstable();
    cuts.dedup();

    let empty = Attrs::new();
    for window in cuts.windows(2) {
        let (start, end) = (window[0], window[1]);
        let before = inline::attrs_after(old, to_old(start)).unwrap_or(&empty);
        let after = inline::attrs_after(new, start).unwrap_or(&empty);
        if before == after {
            continue;
        }
        let keys = before.keys().chain(after.keys().filter(|k| !before.contains_key(*k)));
        for key in keys {
            let (old_value, new_value): (Option<&Value>, Option<&Value>) =
                (before.get(key), after.get(key));
            if old_value == new_value {
                continue;
            }
            push_change(
                events,
                AttributeChange {
                    range: TextRange::new(path.clone(), start..end),
                    key: key.clone(),
                    old: old_value.cloned(),
                    new: new_value.cloned(),
                },
            );
        }
    }
}

/// Extends the latest change for the same key when it continues it.
fn push_change(events: &mut Vec<ChangeEvent>, change: AttributeChange) {
    let previous = events.iter_mut().rev().find_map(|event| match event {
        ChangeEvent::Attribute(prev) if prev.key == change.key => Some(prev),
        _ => None,
    });
    if let Some(prev) = previous {
        if prev.range.path == change.range.path
            && prev.range.range.end == change.range.range.start
            && prev.old == change.old
            && prev.new == change.new
        {
            prev.range.range.end = change.range.range.end;
            return;
        }
    }
    events.push(ChangeEvent::Attribute(change));
}
