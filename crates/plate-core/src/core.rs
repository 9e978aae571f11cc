use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::caret::{CaretDirection, CaretStep, TwoStepCaretMovement};
use crate::conversion::{Conversion, ConversionContext};
use crate::differ;
use crate::inline;
use crate::markup::{self, DataError};
use crate::ops::{Op, Path, Transaction};
use crate::plugin::{
    CommandError, CommandSpec, CommandState, EditorSetup, NodeSpec, PluginRegistry, QueryError,
};
use crate::view::{EditingView, ViewDocument};

pub type Attrs = BTreeMap<String, serde_json::Value>;
pub type ElementKind = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Document {
    #[serde(default)]
    pub children: Vec<Node>,
}

impl Document {
    pub fn new(children: Vec<Node>) -> Self {
        Self { children }
    }

    pub fn node(&self, path: &[usize]) -> Option<&Node> {
        node_ref(self, path)
    }

    pub fn element(&self, path: &[usize]) -> Option<&ElementNode> {
        match self.node(path)? {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }

    /// Text blocks in document order.
    pub fn text_blocks(&self) -> Vec<(Path, &ElementNode)> {
        fn walk<'a>(nodes: &'a [Node], path: &mut Path, out: &mut Vec<(Path, &'a ElementNode)>) {
            for (ix, node) in nodes.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };
                path.push(ix);
                if el.is_text_block() {
                    out.push((path.clone(), el));
                } else {
                    walk(&el.children, path, out);
                }
                path.pop();
            }
        }

        let mut out = Vec::new();
        walk(&self.children, &mut Vec::new(), &mut out);
        out
    }

    pub fn text_in(&self, range: &TextRange) -> String {
        let Some(el) = self.element(&range.path) else {
            return String::new();
        };
        inline::slice(&el.children, range.range.clone())
            .into_iter()
            .map(|leaf| leaf.text)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Element(ElementNode),
    Text(TextNode),
}

impl Node {
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::paragraph_with(vec![TextNode::new(text)])
    }

    pub fn paragraph_with(leaves: Vec<TextNode>) -> Self {
        Node::Element(ElementNode {
            kind: "paragraph".to_string(),
            attrs: Attrs::default(),
            children: leaves.into_iter().map(Node::Text).collect(),
        })
    }

    pub fn heading(level: u64, text: impl Into<String>) -> Self {
        let mut attrs = Attrs::default();
        attrs.insert("level".to_string(), Value::from(level));
        Node::Element(ElementNode {
            kind: "heading".to_string(),
            attrs,
            children: vec![Node::Text(TextNode::new(text))],
        })
    }

    pub fn blockquote(children: Vec<Node>) -> Self {
        Node::Element(ElementNode {
            kind: "blockquote".to_string(),
            attrs: Attrs::default(),
            children,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    pub kind: ElementKind,
    #[serde(default)]
    pub attrs: Attrs,
    #[serde(default)]
    pub children: Vec<Node>,
}

impl ElementNode {
    pub fn is_text_block(&self) -> bool {
        !self.children.is_empty() && self.children.iter().all(|n| matches!(n, Node::Text(_)))
    }

    pub fn text(&self) -> String {
        inline::text(&self.children)
    }

    pub fn text_len(&self) -> usize {
        inline::text_len(&self.children)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextNode {
    pub text: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: Attrs,
}

impl TextNode {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attrs: Attrs::default(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Point {
    pub path: Path,
    pub offset: usize,
}

impl Point {
    pub fn new(path: Path, offset: usize) -> Self {
        Self { path, offset }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
}

impl Selection {
    pub fn new(anchor: Point, focus: Point) -> Self {
        Self { anchor, focus }
    }

    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    /// `(start, end)` in document order.
    pub fn ordered(&self) -> (Point, Point) {
        if self.anchor <= self.focus {
            (self.anchor.clone(), self.focus.clone())
        } else {
            (self.focus.clone(), self.anchor.clone())
        }
    }
}

/// A span inside a single text block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextRange {
    pub path: Path,
    pub range: Range<usize>,
}

impl TextRange {
    pub fn new(path: Path, range: Range<usize>) -> Self {
        Self { path, range }
    }

    pub fn collapsed_at(point: &Point) -> Self {
        Self::new(point.path.clone(), point.offset..point.offset)
    }

    pub fn is_collapsed(&self) -> bool {
        self.range.start >= self.range.end
    }

    pub fn start(&self) -> Point {
        Point::new(self.path.clone(), self.range.start)
    }

    pub fn end(&self) -> Point {
        Point::new(self.path.clone(), self.range.end)
    }
}

#[derive(Debug, Clone)]
pub struct UndoRecord {
    pub inverse_ops: Vec<Op>,
    pub selection_before: Selection,
    pub selection_after: Selection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub max_undo: usize,
    pub max_normalize_iterations: usize,
    pub max_post_fix_passes: usize,
}

impl EditorConfig {
    fn with_defaults(mut self) -> Self {
        if self.max_undo == 0 {
            self.max_undo = 200;
        }
        if self.max_normalize_iterations == 0 {
            self.max_normalize_iterations = 100;
        }
        if self.max_post_fix_passes == 0 {
            self.max_post_fix_passes = 10;
        }
        self
    }
}

pub struct Editor {
    doc: Document,
    selection: Selection,
    gravity_overridden: bool,
    registry: PluginRegistry,
    config: EditorConfig,
    conversion: Conversion,
    editing: EditingView,
    caret: TwoStepCaretMovement,
    command_states: HashMap<String, CommandState>,
    undo_stack: Vec<UndoRecord>,
    redo_stack: Vec<UndoRecord>,
}

impl Editor {
    pub fn new(doc: Document, selection: Selection, registry: PluginRegistry) -> Self {
        Self::with_config(doc, selection, registry, EditorConfig::default())
    }

    pub fn with_config(
        doc: Document,
        selection: Selection,
        registry: PluginRegistry,
        config: EditorConfig,
    ) -> Self {
        let config = config.with_defaults();
        let mut conversion = Conversion::new();
        let mut editing = EditingView::default();
        let mut caret = TwoStepCaretMovement::default();
        {
            let mut setup = EditorSetup {
                conversion: &mut conversion,
                editing: &mut editing,
                caret: &mut caret,
            };
            for plugin in registry.plugins() {
                plugin.setup(&mut setup);
            }
        }

        let mut editor = Self {
            doc,
            selection,
            gravity_overridden: false,
            registry,
            config,
            conversion,
            editing,
            caret,
            command_states: HashMap::new(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
        };
        editor.normalize_in_place();
        editor.render(&Document::default());
        editor
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = selection;
        self.gravity_overridden = false;
        self.normalize_selection_in_place();
        self.render_selection();
    }

    pub fn is_gravity_overridden(&self) -> bool {
        self.gravity_overridden
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// The interactive view as of the last conversion pass.
    pub fn editing_view(&self) -> &ViewDocument {
        self.editing.view()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Attributes typed text would take on at the current selection.
    pub fn selection_attributes(&self) -> Attrs {
        if self.selection.is_collapsed() {
            let point = &self.selection.focus;
            return match self.doc.element(&point.path) {
                Some(el) => {
                    inline::attributes_at(&el.children, point.offset, self.gravity_overridden)
                }
                None => Attrs::new(),
            };
        }

        for range in self.selection_ranges() {
            if range.is_collapsed() {
                continue;
            }
            let Some(el) = self.doc.element(&range.path) else {
                continue;
            };
            if let Some(attrs) = inline::attrs_after(&el.children, range.range.start) {
                return attrs.clone();
            }
        }
        Attrs::new()
    }

    /// The selection split into one range per touched text block.
    pub fn selection_ranges(&self) -> Vec<TextRange> {
        let (start, end) = self.selection.ordered();
        if start.path == end.path {
            return vec![TextRange::new(start.path, start.offset..end.offset)];
        }

        let mut out = Vec::new();
        let mut inside = false;
        for (path, el) in self.doc.text_blocks() {
            if path == start.path {
                inside = true;
                out.push(TextRange::new(path, start.offset..el.text_len()));
            } else if path == end.path {
                out.push(TextRange::new(path, 0..end.offset));
                break;
            } else if inside {
                let len = el.text_len();
                out.push(TextRange::new(path, 0..len));
            }
        }
        out
    }

    pub fn undo(&mut self) -> bool {
        let Some(record) = self.undo_stack.pop() else {
            return false;
        };

        let UndoRecord {
            inverse_ops,
            selection_before,
            selection_after,
        } = record;

        let doc_before = self.doc.clone();
        let mut redo_ops = match self.replay(&inverse_ops) {
            Ok(ops) => ops,
            Err(err) => {
                log::debug!("dropping undo step that no longer applies: {err}");
                return false;
            }
        };
        redo_ops.reverse();

        self.selection = selection_before.clone();
        self.gravity_overridden = false;
        self.normalize_in_place();

        self.redo_stack.push(UndoRecord {
            selection_before,
            selection_after,
            inverse_ops: redo_ops,
        });
        self.render(&doc_before);
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(record) = self.redo_stack.pop() else {
            return false;
        };

        let UndoRecord {
            inverse_ops,
            selection_before,
            selection_after,
        } = record;

        let doc_before = self.doc.clone();
        let mut undo_ops = match self.replay(&inverse_ops) {
            Ok(ops) => ops,
            Err(err) => {
                log::debug!("dropping redo step that no longer applies: {err}");
                return false;
            }
        };
        undo_ops.reverse();

        self.selection = selection_after.clone();
        self.gravity_overridden = false;
        self.normalize_in_place();

        self.undo_stack.push(UndoRecord {
            selection_before,
            selection_after,
            inverse_ops: undo_ops,
        });
        self.render(&doc_before);
        true
    }

    /// Applies a batch atomically: either every op lands and the batch becomes
    /// one undo step, or the document and selection are left untouched.
    pub fn apply(&mut self, tx: Transaction) -> Result<(), ApplyError> {
        let doc_before = self.doc.clone();
        let selection_before = self.selection.clone();
        let gravity_before = self.gravity_overridden;

        match self.apply_ops(&tx) {
            Ok(inverse_ops) => {
                self.gravity_overridden = tx.override_gravity;
                let selection_after = self.selection.clone();
                self.undo_stack.push(UndoRecord {
                    inverse_ops,
                    selection_before,
                    selection_after,
                });
                self.redo_stack.clear();
                if self.undo_stack.len() > self.config.max_undo {
                    self.undo_stack.remove(0);
                }
                self.render(&doc_before);
                Ok(())
            }
            Err(err) => {
                log::debug!(
                    "rolled back batch {:?}: {err}",
                    tx.meta.source.as_deref().unwrap_or("<unnamed>")
                );
                self.doc = doc_before;
                self.selection = selection_before;
                self.gravity_overridden = gravity_before;
                Err(err)
            }
        }
    }

    fn apply_ops(&mut self, tx: &Transaction) -> Result<Vec<Op>, ApplyError> {
        let mut inverse_ops: Vec<Op> = Vec::new();
        for op in tx.ops.iter().cloned() {
            let inv = self.apply_op(op)?;
            inverse_ops.extend(inv);
        }

        if let Some(sel) = &tx.selection_after {
            self.selection = sel.clone();
        }

        let inverse_normalize = self.normalize_with_inverse_ops()?;
        inverse_ops.extend(inverse_normalize);
        inverse_ops.reverse();

        self.normalize_selection_in_place();
        Ok(inverse_ops)
    }

    /// Types `text` at the selection, replacing selected content. The inserted
    /// text takes on the selection attributes.
    pub fn insert_text(&mut self, text: &str) -> Result<(), ApplyError> {
        if text.is_empty() {
            return Ok(());
        }
        let attrs = self.selection_attributes();
        let (start, _) = self.selection.ordered();

        let mut ops = Vec::new();
        if !self.selection.is_collapsed() {
            for range in self.selection_ranges().into_iter().rev() {
                if !range.is_collapsed() {
                    ops.push(Op::RemoveText {
                        path: range.path,
                        range: range.range,
                    });
                }
            }
        }
        ops.push(Op::insert_text(start.path.clone(), start.offset, text, attrs));

        let caret = Point::new(start.path, start.offset + text.len());
        self.apply(
            Transaction::new(ops)
                .selection_after(Selection::collapsed(caret))
                .source("typing"),
        )
    }

    /// One caret step. Returns `false` when the caret cannot move further.
    pub fn move_caret(&mut self, direction: CaretDirection) -> bool {
        if !self.selection.is_collapsed() {
            let (start, end) = self.selection.ordered();
            let point = match direction {
                CaretDirection::Forward => end,
                CaretDirection::Backward => start,
            };
            self.set_selection(Selection::collapsed(point));
            return true;
        }

        let point = self.selection.focus.clone();
        let Some(el) = self.doc.element(&point.path) else {
            return false;
        };

        match self
            .caret
            .step(&el.children, point.offset, direction, self.gravity_overridden)
        {
            CaretStep::Gravity(overridden) => {
                self.gravity_overridden = overridden;
                self.render_selection();
                true
            }
            CaretStep::Move => {
                let Some(next) = self.neighbour_point(&point, direction) else {
                    return false;
                };
                let lands_on_boundary = direction == CaretDirection::Backward
                    && next.path == point.path
                    && self
                        .doc
                        .element(&next.path)
                        .is_some_and(|el| self.caret.is_at_boundary(&el.children, next.offset));
                self.selection = Selection::collapsed(next);
                self.gravity_overridden = lands_on_boundary;
                self.render_selection();
                true
            }
        }
    }

    fn neighbour_point(&self, point: &Point, direction: CaretDirection) -> Option<Point> {
        let el = self.doc.element(&point.path)?;
        let text = el.text();
        match direction {
            CaretDirection::Forward => {
                if let Some(ch) = text.get(point.offset..).and_then(|rest| rest.chars().next()) {
                    return Some(Point::new(point.path.clone(), point.offset + ch.len_utf8()));
                }
                let blocks = self.doc.text_blocks();
                let ix = blocks.iter().position(|(path, _)| *path == point.path)?;
                blocks
                    .get(ix + 1)
                    .map(|(path, _)| Point::new(path.clone(), 0))
            }
            CaretDirection::Backward => {
                if point.offset > 0 {
                    let ch = text.get(..point.offset)?.chars().next_back()?;
                    return Some(Point::new(point.path.clone(), point.offset - ch.len_utf8()));
                }
                let blocks = self.doc.text_blocks();
                let ix = blocks.iter().position(|(path, _)| *path == point.path)?;
                let (path, el) = blocks.get(ix.checked_sub(1)?)?;
                Some(Point::new(path.clone(), el.text_len()))
            }
        }
    }

    pub fn run_command(
        &mut self,
        id: &str,
        args: Option<serde_json::Value>,
    ) -> Result<(), CommandError> {
        let Some(command) = self.registry.command(id) else {
            return Err(CommandError::Unknown(id.to_string()));
        };
        if !self.is_command_enabled(id) {
            log::debug!("ignoring disabled command {id}");
            return Err(CommandError::Disabled(id.to_string()));
        }
        (command.handler)(self, args)
    }

    pub fn command_state(&self, id: &str) -> Option<&CommandState> {
        self.command_states.get(id)
    }

    pub fn is_command_enabled(&self, id: &str) -> bool {
        self.command_states.get(id).is_none_or(|state| state.enabled)
    }

    pub fn run_query_json(&self, id: &str, args: Option<Value>) -> Result<Value, QueryError> {
        let Some(query) = self.registry.query(id) else {
            return Err(QueryError::Unknown(id.to_string()));
        };
        (query.handler)(self, args)
    }

    pub fn run_query<T>(&self, id: &str, args: Option<Value>) -> Result<T, QueryError>
    where
        T: DeserializeOwned,
    {
        let value = self.run_query_json(id, args)?;
        serde_json::from_value(value)
            .map_err(|err| QueryError::Failed(format!("Failed to decode query result: {err}")))
    }

    /// Serializes the document through the data pipeline.
    pub fn get_data(&self) -> String {
        let attrs = self.selection_attributes();
        let ctx = ConversionContext {
            doc: &self.doc,
            selection: &self.selection,
            selection_attrs: &attrs,
            blocks: self.conversion.blocks(),
        };
        let mut view = ViewDocument::default();
        self.conversion
            .data
            .convert(&mut view, differ::insert_document(&self.doc), &ctx);
        view.to_markup()
    }

    /// Converts markup into a document without touching the editor.
    pub fn parse_data(&self, data: &str) -> Result<Document, DataError> {
        let nodes = markup::parse(data)?;
        Ok(self
            .conversion
            .upcast
            .convert(&nodes, self.conversion.blocks(), &self.registry))
    }

    /// Replaces the whole document. History is cleared.
    pub fn set_data(&mut self, data: &str) -> Result<(), DataError> {
        let doc = self.parse_data(data)?;
        let doc_before = std::mem::replace(&mut self.doc, doc);
        self.selection = Selection::collapsed(Point::new(vec![0], 0));
        self.gravity_overridden = false;
        self.normalize_in_place();
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.render(&doc_before);
        Ok(())
    }

    /// Mutates the interactive view outside of model conversion, e.g. to
    /// inject UI elements. Runs as its own conversion pass.
    pub fn change_view(&mut self, change: impl FnOnce(&mut ViewDocument)) {
        let attrs = self.selection_attributes();
        let ctx = ConversionContext {
            doc: &self.doc,
            selection: &self.selection,
            selection_attrs: &attrs,
            blocks: self.conversion.blocks(),
        };
        self.editing.change(
            &self.conversion.editing,
            &ctx,
            self.config.max_post_fix_passes,
            change,
        );
    }

    fn render(&mut self, doc_before: &Document) {
        let events = differ::diff(doc_before, &self.doc);
        let attrs = self.selection_attributes();
        let ctx = ConversionContext {
            doc: &self.doc,
            selection: &self.selection,
            selection_attrs: &attrs,
            blocks: self.conversion.blocks(),
        };
        self.editing.convert(
            &self.conversion.editing,
            events,
            &ctx,
            self.config.max_post_fix_passes,
        );
        self.refresh_commands();
    }

    fn render_selection(&mut self) {
        let attrs = self.selection_attributes();
        let ctx = ConversionContext {
            doc: &self.doc,
            selection: &self.selection,
            selection_attrs: &attrs,
            blocks: self.conversion.blocks(),
        };
        self.editing.convert(
            &self.conversion.editing,
            Vec::new(),
            &ctx,
            self.config.max_post_fix_passes,
        );
        self.refresh_commands();
    }

    fn refresh_commands(&mut self) {
        let states: HashMap<String, CommandState> = self
            .registry
            .commands()
            .iter()
            .map(|(id, spec)| (id.clone(), (spec.refresh)(self)))
            .collect();
        self.command_states = states;
    }

    fn normalize_in_place(&mut self) {
        if let Err(err) = self.normalize_with_inverse_ops() {
            log::warn!("normalization failed: {err}");
        }
        self.normalize_selection_in_place();
    }

    fn normalize_selection_in_place(&mut self) {
        self.selection = self
            .registry
            .normalize_selection(&self.doc, &self.selection);
    }

    fn normalize_with_inverse_ops(&mut self) -> Result<Vec<Op>, ApplyError> {
        let mut inverse_ops: Vec<Op> = Vec::new();
        for _ in 0..self.config.max_normalize_iterations {
            let ops = self.registry.normalize(&self.doc);
            if ops.is_empty() {
                return Ok(inverse_ops);
            }
            for op in ops {
                let inv = self.apply_op(op)?;
                inverse_ops.extend(inv);
            }
        }
        Err(ApplyError::NormalizeDidNotConverge)
    }

    fn apply_op(&mut self, op: Op) -> Result<Vec<Op>, ApplyError> {
        apply_op_to(&mut self.doc, &mut self.selection, op)
    }

    /// Applies a history record's ops; all of them or none.
    fn replay(&mut self, ops: &[Op]) -> Result<Vec<Op>, ApplyError> {
        let doc_before = self.doc.clone();
        let selection_before = self.selection.clone();
        let mut inverse_ops = Vec::new();
        for op in ops.iter().cloned() {
            match self.apply_op(op) {
                Ok(inv) => inverse_ops.extend(inv),
                Err(err) => {
                    self.doc = doc_before;
                    self.selection = selection_before;
                    return Err(err);
                }
            }
        }
        Ok(inverse_ops)
    }
}

fn apply_op_to(
    doc: &mut Document,
    selection: &mut Selection,
    op: Op,
) -> Result<Vec<Op>, ApplyError> {
    match op {
        Op::InsertText {
            path,
            offset,
            nodes,
        } => {
            let block = text_block_mut(doc, &path)?;
            check_range(&block.children, offset..offset)?;
            let inserted: usize = nodes.iter().map(|n| n.text.len()).sum();
            inline::splice(&mut block.children, offset..offset, nodes);
            transform_selection_insert_text(selection, &path, offset, inserted);
            Ok(vec![Op::RemoveText {
                path,
                range: offset..offset + inserted,
            }])
        }
        Op::RemoveText { path, range } => {
            let block = text_block_mut(doc, &path)?;
            check_range(&block.children, range.clone())?;
            let removed = inline::splice(&mut block.children, range.clone(), Vec::new());
            transform_selection_remove_text(selection, &path, range.clone());
            Ok(vec![Op::InsertText {
                path,
                offset: range.start,
                nodes: removed,
            }])
        }
        Op::SetAttribute {
            path,
            range,
            key,
            value,
        } => {
            let block = text_block_mut(doc, &path)?;
            check_range(&block.children, range.clone())?;
            let previous = inline::set_attribute(&mut block.children, range, &key, value.as_ref());
            Ok(previous
                .into_iter()
                .map(|(range, value)| Op::SetAttribute {
                    path: path.clone(),
                    range,
                    key: key.clone(),
                    value,
                })
                .collect())
        }
        Op::InsertNode { path, node } => {
            insert_node(doc, &path, node)?;
            transform_selection_insert_node(selection, &path);
            Ok(vec![Op::RemoveNode { path }])
        }
        Op::RemoveNode { path } => {
            let removed = remove_node(doc, &path)?;
            transform_selection_remove_node(selection, &path);
            Ok(vec![Op::InsertNode {
                path,
                node: removed,
            }])
        }
        Op::SetNodeAttrs { path, patch } => {
            let old = match node_mut(doc, &path)? {
                Node::Element(el) => patch_apply(&mut el.attrs, &patch),
                Node::Text(_) => return Err(ApplyError::InvalidPath("Text has no attrs".into())),
            };
            Ok(vec![Op::SetNodeAttrs { path, patch: old }])
        }
    }
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("invalid range {start}..{end} in text of length {len}")]
    InvalidRange { start: usize, end: usize, len: usize },
    #[error("normalization did not converge")]
    NormalizeDidNotConverge,
}

impl From<PathError> for ApplyError {
    fn from(value: PathError) -> Self {
        ApplyError::InvalidPath(value.0)
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct PathError(pub String);

fn check_range(children: &[Node], range: Range<usize>) -> Result<(), ApplyError> {
    let text = inline::text(children);
    let valid = range.start <= range.end
        && range.end <= text.len()
        && text.is_char_boundary(range.start)
        && text.is_char_boundary(range.end);
    if valid {
        Ok(())
    } else {
        Err(ApplyError::InvalidRange {
            start: range.start,
            end: range.end,
            len: text.len(),
        })
    }
}

fn transform_selection_insert_text(
    selection: &mut Selection,
    path: &[usize],
    offset: usize,
    len: usize,
) {
    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path == path && point.offset >= offset {
            point.offset = point.offset.saturating_add(len);
        }
    }
}

fn transform_selection_remove_text(selection: &mut Selection, path: &[usize], range: Range<usize>) {
    let removed_len = range.end.saturating_sub(range.start);
    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path != path || point.offset <= range.start {
            continue;
        }
        if point.offset >= range.end {
            point.offset = point.offset.saturating_sub(removed_len);
        } else {
            point.offset = range.start;
        }
    }
}

fn transform_selection_insert_node(selection: &mut Selection, path: &[usize]) {
    let Some((&index, parent_path)) = path.split_last() else {
        return;
    };

    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path.len() <= parent_path.len() || !point.path.starts_with(parent_path) {
            continue;
        }
        let depth = parent_path.len();
        if point.path[depth] >= index {
            point.path[depth] += 1;
        }
    }
}

fn transform_selection_remove_node(selection: &mut Selection, path: &[usize]) {
    let Some((&index, parent_path)) = path.split_last() else {
        return;
    };

    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path.len() <= parent_path.len() || !point.path.starts_with(parent_path) {
            continue;
        }
        let depth = parent_path.len();
        let ix = point.path[depth];
        if ix > index {
            point.path[depth] = ix - 1;
            continue;
        }
        if ix < index {
            continue;
        }

        // The point was inside the removed subtree: park it at the end of the
        // previous sibling, or the start of the one that took its place.
        point.path.truncate(depth + 1);
        match index.checked_sub(1) {
            Some(prev) => {
                point.path[depth] = prev;
                point.offset = usize::MAX;
            }
            None => point.offset = 0,
        }
    }
}

fn node_ref<'a>(doc: &'a Document, path: &[usize]) -> Option<&'a Node> {
    let (first, rest) = path.split_first()?;
    let mut node = doc.children.get(*first)?;
    for &ix in rest {
        node = match node {
            Node::Element(el) => el.children.get(ix)?,
            Node::Text(_) => return None,
        };
    }
    Some(node)
}

fn node_mut<'a>(doc: &'a mut Document, path: &[usize]) -> Result<&'a mut Node, PathError> {
    let Some((first, rest)) = path.split_first() else {
        return Err(PathError("Empty path".into()));
    };

    let len = doc.children.len();
    let mut node = doc
        .children
        .get_mut(*first)
        .ok_or_else(|| PathError(format!("Path out of bounds at depth 0: {first} >= {len}")))?;

    for (depth, &ix) in rest.iter().enumerate() {
        node = match node {
            Node::Element(el) => {
                let len = el.children.len();
                el.children.get_mut(ix).ok_or_else(|| {
                    PathError(format!(
                        "Path out of bounds at depth {}: {ix} >= {len}",
                        depth + 1
                    ))
                })?
            }
            Node::Text(_) => {
                return Err(PathError(format!("Non-container node at depth {depth}")));
            }
        };
    }
    Ok(node)
}

fn text_block_mut<'a>(
    doc: &'a mut Document,
    path: &[usize],
) -> Result<&'a mut ElementNode, PathError> {
    match node_mut(doc, path)? {
        Node::Element(el) if el.children.iter().all(|n| matches!(n, Node::Text(_))) => Ok(el),
        _ => Err(PathError("Expected text block".into())),
    }
}

fn insert_node(doc: &mut Document, path: &[usize], node: Node) -> Result<(), PathError> {
    let Some((&index, parent_path)) = path.split_last() else {
        return Err(PathError("Empty insert path".into()));
    };

    let children = if parent_path.is_empty() {
        &mut doc.children
    } else {
        match node_mut(doc, parent_path)? {
            Node::Element(el) => &mut el.children,
            Node::Text(_) => {
                return Err(PathError("Insert parent is not a container".into()));
            }
        }
    };

    if index > children.len() {
        return Err(PathError(format!(
            "Insert index out of bounds: {index} > {}",
            children.len()
        )));
    }
    children.insert(index, node);
    Ok(())
}

fn remove_node(doc: &mut Document, path: &[usize]) -> Result<Node, PathError> {
    let Some((&index, parent_path)) = path.split_last() else {
        return Err(PathError("Empty remove path".into()));
    };

    let children = if parent_path.is_empty() {
        &mut doc.children
    } else {
        match node_mut(doc, parent_path)? {
            Node::Element(el) => &mut el.children,
            Node::Text(_) => {
                return Err(PathError("Remove parent is not a container".into()));
            }
        }
    };

    if index >= children.len() {
        return Err(PathError(format!(
            "Remove index out of bounds: {index} >= {}",
            children.len()
        )));
    }
    Ok(children.remove(index))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttrPatch {
    #[serde(default)]
    pub set: Attrs,
    #[serde(default)]
    pub remove: Vec<String>,
}

fn patch_apply(attrs: &mut Attrs, patch: &AttrPatch) -> AttrPatch {
    let mut old_set: Attrs = Attrs::new();
    let mut old_remove: Vec<String> = Vec::new();

    for (k, v) in &patch.set {
        if let Some(prev) = attrs.insert(k.clone(), v.clone()) {
            old_set.insert(k.clone(), prev);
        } else {
            old_remove.push(k.clone());
        }
    }

    for key in &patch.remove {
        if let Some(prev) = attrs.remove(key) {
            old_set.insert(key.clone(), prev);
        }
    }

    AttrPatch {
        set: old_set,
        remove: old_remove,
    }
}

impl Editor {
    pub fn node_specs(&self) -> &HashMap<String, NodeSpec> {
        self.registry.node_specs()
    }

    pub fn commands(&self) -> &HashMap<String, CommandSpec> {
        self.registry.commands()
    }
}
