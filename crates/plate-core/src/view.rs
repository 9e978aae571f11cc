//! The view tree: what the model looks like once converted.
//!
//! Containers mirror model elements one to one, so a model path addresses the
//! same container in the view. Inline content of a container is text,
//! attribute elements (wrappers such as links) and UI elements that have no
//! model counterpart.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use serde_json::Value;

use crate::conversion::{ChangeEvent, ConversionContext, DowncastDispatcher};
use crate::core::TextRange;
use crate::inline::clamp_to_char_boundary;
use crate::markup;
use crate::ops::Path;

pub const DEFAULT_ATTRIBUTE_PRIORITY: i32 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewElementId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewElementKind {
    Container,
    /// Wrapper around inline content. Lower priority wraps outside higher.
    Attribute { priority: i32 },
    Ui,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewElement {
    id: ViewElementId,
    pub name: String,
    pub kind: ViewElementKind,
    pub attrs: BTreeMap<String, String>,
    pub classes: BTreeSet<String>,
    /// Properties that never reach markup.
    pub custom: BTreeMap<String, Value>,
    pub children: Vec<ViewNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewNode {
    Element(ViewElement),
    Text(String),
}

impl ViewElement {
    fn with_kind(name: impl Into<String>, kind: ViewElementKind) -> Self {
        Self {
            id: ViewElementId::default(),
            name: name.into(),
            kind,
            attrs: BTreeMap::new(),
            classes: BTreeSet::new(),
            custom: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn container(name: impl Into<String>) -> Self {
        Self::with_kind(name, ViewElementKind::Container)
    }

    pub fn attribute(name: impl Into<String>, priority: i32) -> Self {
        Self::with_kind(name, ViewElementKind::Attribute { priority })
    }

    pub fn ui(name: impl Into<String>) -> Self {
        Self::with_kind(name, ViewElementKind::Ui)
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.insert(class.into());
        self
    }

    pub fn with_custom(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }

    pub fn with_children(mut self, children: Vec<ViewNode>) -> Self {
        self.children = children;
        self
    }

    /// Zero until the element is placed in a `ViewDocument`.
    pub fn id(&self) -> ViewElementId {
        self.id
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.contains(class)
    }

    pub fn custom(&self, key: &str) -> Option<&Value> {
        self.custom.get(key)
    }

    pub fn is_attribute(&self) -> bool {
        matches!(self.kind, ViewElementKind::Attribute { .. })
    }

    pub fn priority(&self) -> i32 {
        match self.kind {
            ViewElementKind::Attribute { priority } => priority,
            _ => DEFAULT_ATTRIBUTE_PRIORITY,
        }
    }

    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    fn shallow(&self) -> Self {
        Self {
            children: Vec::new(),
            ..self.clone()
        }
    }

    fn is_similar(&self, other: &Self) -> bool {
        self.name == other.name
            && self.kind == other.kind
            && self.attrs == other.attrs
            && self.classes == other.classes
            && self.custom == other.custom
    }

    fn can_merge(&self, other: &Self) -> bool {
        self.is_attribute()
            && self.kind == other.kind
            && self.name == other.name
            && other
                .attrs
                .iter()
                .all(|(k, v)| self.attrs.get(k).is_none_or(|mine| mine == v))
            && other
                .custom
                .iter()
                .all(|(k, v)| self.custom.get(k).is_none_or(|mine| mine == v))
    }

    fn merge(&mut self, other: &Self) {
        self.attrs
            .extend(other.attrs.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.classes.extend(other.classes.iter().cloned());
        self.custom
            .extend(other.custom.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    fn contains(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.name == other.name
            && other.attrs.iter().all(|(k, v)| self.attrs.get(k) == Some(v))
            && other.classes.is_subset(&self.classes)
    }

    fn strip(&mut self, other: &Self) {
        for key in other.attrs.keys() {
            self.attrs.remove(key);
        }
        for class in &other.classes {
            self.classes.remove(class);
        }
    }

    fn is_bare(&self) -> bool {
        self.attrs.is_empty() && self.classes.is_empty()
    }
}

fn collect_text(nodes: &[ViewNode], out: &mut String) {
    for node in nodes {
        match node {
            ViewNode::Text(text) => out.push_str(text),
            ViewNode::Element(el) => collect_text(&el.children, out),
        }
    }
}

/// A span inside one view container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewRange {
    pub path: Path,
    pub range: Range<usize>,
}

/// Maps a model range to the view range showing the same content.
pub fn to_view_range(range: &TextRange) -> ViewRange {
    ViewRange {
        path: range.path.clone(),
        range: range.range.clone(),
    }
}

#[derive(Debug, Clone)]
enum Piece {
    Text { text: String, stack: Vec<ViewElement> },
    Ui(ViewElement),
}

impl Piece {
    fn len(&self) -> usize {
        match self {
            Piece::Text { text, .. } => text.len(),
            Piece::Ui(_) => 0,
        }
    }
}

fn flatten(children: &[ViewNode]) -> Vec<Piece> {
    fn walk(nodes: &[ViewNode], stack: &mut Vec<ViewElement>, out: &mut Vec<Piece>) {
        for node in nodes {
            match node {
                ViewNode::Text(text) => {
                    if !text.is_empty() {
                        out.push(Piece::Text {
                            text: text.clone(),
                            stack: stack.clone(),
                        });
                    }
                }
                ViewNode::Element(el) if el.kind == ViewElementKind::Ui => {
                    out.push(Piece::Ui(el.clone()));
                }
                ViewNode::Element(el) => {
                    stack.push(el.shallow());
                    walk(&el.children, stack, out);
                    stack.pop();
                }
            }
        }
    }

    let mut out = Vec::new();
    walk(children, &mut Vec::new(), &mut out);
    out
}

/// Rebuilds a node list, grouping consecutive pieces under similar wrappers.
fn rebuild(pieces: &[Piece], depth: usize) -> Vec<ViewNode> {
    let mut out: Vec<ViewNode> = Vec::new();
    let mut ix = 0;
    while ix < pieces.len() {
        match &pieces[ix] {
            Piece::Ui(el) => {
                out.push(ViewNode::Element(el.clone()));
                ix += 1;
            }
            Piece::Text { text, stack } if stack.len() <= depth => {
                match out.last_mut() {
                    Some(ViewNode::Text(prev)) => prev.push_str(text),
                    _ => out.push(ViewNode::Text(text.clone())),
                }
                ix += 1;
            }
            Piece::Text { stack, .. } => {
                let head = &stack[depth];
                let mut end = ix + 1;
                while let Some(Piece::Text { stack: next, .. }) = pieces.get(end) {
                    if next.len() > depth && next[depth].is_similar(head) {
                        end += 1;
                    } else {
                        break;
                    }
                }
                let mut element = head.clone();
                element.children = rebuild(&pieces[ix..end], depth + 1);
                out.push(ViewNode::Element(element));
                ix = end;
            }
        }
    }
    out
}

fn spans(pieces: &[Piece]) -> Vec<Range<usize>> {
    let mut cursor = 0;
    pieces
        .iter()
        .map(|piece| {
            let start = cursor;
            cursor += piece.len();
            start..cursor
        })
        .collect()
}

/// Makes sure a piece boundary exists at `offset`.
fn split_at(pieces: &mut Vec<Piece>, offset: usize) {
    let mut cursor = 0;
    for ix in 0..pieces.len() {
        let len = pieces[ix].len();
        if offset > cursor && offset < cursor + len {
            if let Piece::Text { text, stack } = &mut pieces[ix] {
                let at = clamp_to_char_boundary(text, offset - cursor);
                let right = text.split_off(at);
                let piece = Piece::Text {
                    text: right,
                    stack: stack.clone(),
                };
                pieces.insert(ix + 1, piece);
            }
            return;
        }
        cursor += len;
    }
}

/// Where new content at `offset` goes: after UI elements sitting there.
fn insertion_index(pieces: &[Piece], offset: usize) -> usize {
    let spans = spans(pieces);
    pieces
        .iter()
        .zip(spans)
        .position(|(piece, span)| {
            span.start > offset || (span.start == offset && matches!(piece, Piece::Text { .. }))
        })
        .unwrap_or(pieces.len())
}

#[derive(Debug, Clone, Default)]
pub struct ViewDocument {
    roots: Vec<ViewNode>,
    next_id: u64,
}

impl ViewDocument {
    pub fn roots(&self) -> &[ViewNode] {
        &self.roots
    }

    pub fn clear(&mut self) {
        self.roots.clear();
    }

    pub fn set_roots(&mut self, mut roots: Vec<ViewNode>) {
        self.assign_ids(&mut roots);
        self.roots = roots;
    }

    fn assign_ids(&mut self, nodes: &mut [ViewNode]) {
        for node in nodes {
            if let ViewNode::Element(el) = node {
                if el.id == ViewElementId::default() {
                    el.id = self.next_id();
                }
                self.assign_ids(&mut el.children);
            }
        }
    }

    fn next_id(&mut self) -> ViewElementId {
        self.next_id += 1;
        ViewElementId(self.next_id)
    }

    pub fn container(&self, path: &[usize]) -> Option<&ViewElement> {
        let (first, rest) = path.split_first()?;
        let mut el = match self.roots.get(*first)? {
            ViewNode::Element(el) => el,
            ViewNode::Text(_) => return None,
        };
        for &ix in rest {
            el = match el.children.get(ix)? {
                ViewNode::Element(child) => child,
                ViewNode::Text(_) => return None,
            };
        }
        Some(el)
    }

    fn container_mut(&mut self, path: &[usize]) -> Option<&mut ViewElement> {
        let (first, rest) = path.split_first()?;
        let mut el = match self.roots.get_mut(*first)? {
            ViewNode::Element(el) => el,
            ViewNode::Text(_) => return None,
        };
        for &ix in rest {
            el = match el.children.get_mut(ix)? {
                ViewNode::Element(child) => child,
                ViewNode::Text(_) => return None,
            };
        }
        Some(el)
    }

    fn edit_inline(&mut self, path: &[usize], edit: impl FnOnce(&mut Vec<Piece>, &mut Self)) {
        let Some(container) = self.container_mut(path) else {
            log::debug!("no view container at {path:?}");
            return;
        };
        let mut pieces = flatten(&container.children);
        edit(&mut pieces, self);
        // A wrapper split in two keeps its id on the first half only.
        let mut children = rebuild(&pieces, 0);
        self.renumber_duplicates(&mut children, &mut BTreeSet::new());
        if let Some(container) = self.container_mut(path) {
            container.children = children;
        }
    }

    fn renumber_duplicates(&mut self, nodes: &mut [ViewNode], seen: &mut BTreeSet<ViewElementId>) {
        for node in nodes {
            if let ViewNode::Element(el) = node {
                if !seen.insert(el.id) {
                    el.id = self.next_id();
                    seen.insert(el.id);
                }
                self.renumber_duplicates(&mut el.children, seen);
            }
        }
    }

    pub fn insert_text(&mut self, path: &[usize], offset: usize, text: &str) {
        if text.is_empty() {
            return;
        }
        self.edit_inline(path, |pieces, _| {
            split_at(pieces, offset);
            let ix = insertion_index(pieces, offset);
            pieces.insert(
                ix,
                Piece::Text {
                    text: text.to_string(),
                    stack: Vec::new(),
                },
            );
        });
    }

    /// Places a UI element at `offset`. UI elements break surrounding wrappers.
    pub fn insert_ui(
        &mut self,
        path: &[usize],
        offset: usize,
        element: ViewElement,
    ) -> ViewElementId {
        let mut element = element;
        element.kind = ViewElementKind::Ui;
        element.id = self.next_id();
        let id = element.id;
        self.edit_inline(path, |pieces, _| {
            split_at(pieces, offset);
            let ix = insertion_index(pieces, offset);
            pieces.insert(ix, Piece::Ui(element));
        });
        id
    }

    /// Removes content in `range`. UI elements on the range edges stay.
    pub fn remove(&mut self, range: &ViewRange) {
        let r = range.range.clone();
        self.edit_inline(&range.path, |pieces, _| {
            split_at(pieces, r.start);
            split_at(pieces, r.end);
            let spans = spans(pieces);
            let mut ix = 0;
            pieces.retain(|piece| {
                let span = &spans[ix];
                ix += 1;
                match piece {
                    Piece::Text { .. } => !(span.start >= r.start && span.end <= r.end),
                    Piece::Ui(_) => !(span.start > r.start && span.start < r.end),
                }
            });
        });
    }

    /// Wraps text in `range` with an attribute element. Merges into an
    /// existing compatible wrapper when there is one.
    pub fn wrap(&mut self, range: &ViewRange, element: ViewElement) {
        if range.range.start >= range.range.end {
            return;
        }
        let r = range.range.clone();
        self.edit_inline(&range.path, |pieces, view| {
            split_at(pieces, r.start);
            split_at(pieces, r.end);
            let spans = spans(pieces);
            for (piece, span) in pieces.iter_mut().zip(spans) {
                let Piece::Text { stack, .. } = piece else {
                    continue;
                };
                if span.start < r.start || span.end > r.end {
                    continue;
                }
                if let Some(existing) = stack.iter_mut().find(|e| e.can_merge(&element)) {
                    existing.merge(&element);
                    continue;
                }
                let mut wrapper = element.shallow();
                wrapper.id = view.next_id();
                let at = stack
                    .iter()
                    .position(|e| e.priority() > wrapper.priority())
                    .unwrap_or(stack.len());
                stack.insert(at, wrapper);
            }
        });
    }

    /// Removes what `element` contributed to wrappers in `range`. A wrapper
    /// left with no attributes or classes is dropped.
    pub fn unwrap(&mut self, range: &ViewRange, element: &ViewElement) {
        if range.range.start >= range.range.end {
            return;
        }
        let r = range.range.clone();
        self.edit_inline(&range.path, |pieces, _| {
            split_at(pieces, r.start);
            split_at(pieces, r.end);
            let spans = spans(pieces);
            for (piece, span) in pieces.iter_mut().zip(spans) {
                let Piece::Text { stack, .. } = piece else {
                    continue;
                };
                if span.start < r.start || span.end > r.end {
                    continue;
                }
                if let Some(ix) = stack.iter().position(|e| e.contains(element)) {
                    stack[ix].strip(element);
                    if stack[ix].is_bare() {
                        stack.remove(ix);
                    }
                }
            }
        });
    }

    pub fn element(&self, id: ViewElementId) -> Option<&ViewElement> {
        fn find(nodes: &[ViewNode], id: ViewElementId) -> Option<&ViewElement> {
            nodes.iter().find_map(|node| match node {
                ViewNode::Element(el) if el.id == id => Some(el),
                ViewNode::Element(el) => find(&el.children, id),
                ViewNode::Text(_) => None,
            })
        }
        find(&self.roots, id)
    }

    fn element_mut(&mut self, id: ViewElementId) -> Option<&mut ViewElement> {
        fn find(nodes: &mut [ViewNode], id: ViewElementId) -> Option<&mut ViewElement> {
            for node in nodes {
                let ViewNode::Element(el) = node else {
                    continue;
                };
                if el.id == id {
                    return Some(el);
                }
                if let Some(found) = find(&mut el.children, id) {
                    return Some(found);
                }
            }
            None
        }
        find(&mut self.roots, id)
    }

    pub fn add_class(&mut self, id: ViewElementId, class: &str) -> bool {
        match self.element_mut(id) {
            Some(el) => el.classes.insert(class.to_string()),
            None => false,
        }
    }

    pub fn remove_class(&mut self, id: ViewElementId, class: &str) -> bool {
        match self.element_mut(id) {
            Some(el) => el.classes.remove(class),
            None => false,
        }
    }

    /// Every element of the tree, depth first.
    pub fn elements(&self) -> Vec<&ViewElement> {
        fn walk<'a>(nodes: &'a [ViewNode], out: &mut Vec<&'a ViewElement>) {
            for node in nodes {
                if let ViewNode::Element(el) = node {
                    out.push(el);
                    walk(&el.children, out);
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.roots, &mut out);
        out
    }

    /// Attribute elements whose content intersects `range`.
    pub fn attribute_elements_in(&self, range: &ViewRange) -> Vec<&ViewElement> {
        fn walk<'a>(
            nodes: &'a [ViewNode],
            cursor: &mut usize,
            range: &Range<usize>,
            out: &mut Vec<&'a ViewElement>,
        ) {
            for node in nodes {
                match node {
                    ViewNode::Text(text) => *cursor += text.len(),
                    ViewNode::Element(el) if el.kind == ViewElementKind::Ui => {}
                    ViewNode::Element(el) => {
                        let start = *cursor;
                        walk(&el.children, cursor, range, out);
                        let end = *cursor;
                        let hit = if range.start == range.end {
                            start < range.start && range.start < end
                        } else {
                            start < range.end && range.start < end
                        };
                        if hit && el.is_attribute() {
                            out.push(el);
                        }
                    }
                }
            }
        }

        let Some(container) = self.container(&range.path) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        walk(&container.children, &mut 0, &range.range, &mut out);
        out
    }

    pub fn to_markup(&self) -> String {
        markup::stringify(&self.roots)
    }
}

pub type PostFixer = Box<dyn Fn(&mut ViewDocument, &ConversionContext<'_>) -> bool>;

/// The interactive view and the post-fixers that run after each pass.
#[derive(Default)]
pub struct EditingView {
    view: ViewDocument,
    post_fixers: Vec<PostFixer>,
}

impl EditingView {
    pub fn view(&self) -> &ViewDocument {
        &self.view
    }

    /// A post-fixer returns `true` when it changed the view; all post-fixers
    /// then run again.
    pub fn register_post_fixer(
        &mut self,
        fixer: impl Fn(&mut ViewDocument, &ConversionContext<'_>) -> bool + 'static,
    ) {
        self.post_fixers.push(Box::new(fixer));
    }

    pub(crate) fn convert(
        &mut self,
        dispatcher: &DowncastDispatcher,
        events: Vec<ChangeEvent>,
        ctx: &ConversionContext<'_>,
        max_post_fix_passes: usize,
    ) {
        log::trace!("editing conversion pass with {} change events", events.len());
        dispatcher.convert(&mut self.view, events, ctx);
        self.post_fix(ctx, max_post_fix_passes);
    }

    pub(crate) fn change(
        &mut self,
        dispatcher: &DowncastDispatcher,
        ctx: &ConversionContext<'_>,
        max_post_fix_passes: usize,
        change: impl FnOnce(&mut ViewDocument),
    ) {
        dispatcher.fire(&ChangeEvent::Selection, &mut self.view, ctx);
        change(&mut self.view);
        self.post_fix(ctx, max_post_fix_passes);
    }

    fn post_fix(&mut self, ctx: &ConversionContext<'_>, max_passes: usize) {
        for _ in 0..max_passes {
            let mut changed = false;
            for fixer in &self.post_fixers {
                changed |= fixer(&mut self.view, ctx);
            }
            if !changed {
                return;
            }
        }
        log::warn!("view post-fixers did not settle after {max_passes} passes");
    }
}
