use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::caret::TwoStepCaretMovement;
use crate::conversion::{BlockConverter, Conversion};
use crate::core::{ApplyError, Attrs, Document, Editor, ElementNode, Node, Point, Selection};
use crate::inline;
use crate::ops::Op;
use crate::view::{EditingView, ViewElement};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("command {0} is disabled")]
    Disabled(String),
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error(transparent)]
    Apply(#[from] ApplyError),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unknown query: {0}")]
    Unknown(String),
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate plugin id: {0}")]
    DuplicatePlugin(String),
    #[error("duplicate node spec kind: {0}")]
    DuplicateNodeSpec(String),
    #[error("duplicate command id: {0}")]
    DuplicateCommand(String),
    #[error("duplicate query id: {0}")]
    DuplicateQuery(String),
}

/// Whether a command can run right now, and the value UI shows for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandState {
    pub enabled: bool,
    #[serde(default)]
    pub value: Value,
}

impl CommandState {
    pub fn enabled(value: Value) -> Self {
        Self {
            enabled: true,
            value,
        }
    }

    pub fn disabled(value: Value) -> Self {
        Self {
            enabled: false,
            value,
        }
    }
}

pub type CommandHandler = Rc<dyn Fn(&mut Editor, Option<Value>) -> Result<(), CommandError>>;
pub type CommandRefresh = Rc<dyn Fn(&Editor) -> CommandState>;
pub type QueryHandler = Rc<dyn Fn(&Editor, Option<Value>) -> Result<Value, QueryError>>;

#[derive(Clone)]
pub struct CommandSpec {
    pub id: String,
    pub label: String,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub args_example: Option<Value>,
    pub hidden: bool,
    pub handler: CommandHandler,
    /// Re-evaluated after every committed batch and selection change.
    pub refresh: CommandRefresh,
}

impl CommandSpec {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        handler: impl Fn(&mut Editor, Option<Value>) -> Result<(), CommandError> + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: None,
            keywords: Vec::new(),
            args_example: None,
            hidden: false,
            handler: Rc::new(handler),
            refresh: Rc::new(|_| CommandState::enabled(Value::Null)),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn args_example(mut self, args_example: Value) -> Self {
        self.args_example = Some(args_example);
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn refresh(mut self, refresh: impl Fn(&Editor) -> CommandState + 'static) -> Self {
        self.refresh = Rc::new(refresh);
        self
    }
}

#[derive(Clone)]
pub struct QuerySpec {
    pub id: String,
    pub handler: QueryHandler,
}

impl QuerySpec {
    pub fn new(
        id: impl Into<String>,
        handler: impl Fn(&Editor, Option<Value>) -> Result<Value, QueryError> + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            handler: Rc::new(handler),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Block,
    Inline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildConstraint {
    None,
    BlockOnly,
    InlineOnly,
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub kind: String,
    pub role: NodeRole,
    pub children: ChildConstraint,
}

pub trait NormalizePass {
    fn id(&self) -> &'static str;
    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op>;
}

/// Editor parts a plugin wires itself into when an editor is created.
pub struct EditorSetup<'a> {
    pub conversion: &'a mut Conversion,
    pub editing: &'a mut EditingView,
    pub caret: &'a mut TwoStepCaretMovement,
}

pub trait PlatePlugin {
    fn id(&self) -> &'static str;
    fn node_specs(&self) -> Vec<NodeSpec> {
        Vec::new()
    }
    /// Text attribute keys the schema allows on text leaves.
    fn text_attributes(&self) -> Vec<String> {
        Vec::new()
    }
    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        Vec::new()
    }
    fn commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }
    fn queries(&self) -> Vec<QuerySpec> {
        Vec::new()
    }
    fn setup(&self, _setup: &mut EditorSetup<'_>) {}
}

#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn PlatePlugin>>,
    node_specs: HashMap<String, NodeSpec>,
    text_attributes: BTreeSet<String>,
    normalize_passes: Vec<Box<dyn NormalizePass>>,
    commands: HashMap<String, CommandSpec>,
    queries: HashMap<String, QuerySpec>,
}

impl PluginRegistry {
    pub fn new(
        plugins: impl IntoIterator<Item = Box<dyn PlatePlugin>>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::default();
        for plugin in plugins {
            registry.register_plugin(plugin)?;
        }
        Ok(registry)
    }

    pub fn core() -> Self {
        Self::new(Self::core_plugins()).expect("core registry must be valid")
    }

    pub fn core_plugins() -> Vec<Box<dyn PlatePlugin>> {
        vec![Box::new(CoreBlocksPlugin), Box::new(CoreNormalizePlugin)]
    }

    /// The core plugins followed by `plugins`.
    pub fn with_plugins(
        plugins: impl IntoIterator<Item = Box<dyn PlatePlugin>>,
    ) -> Result<Self, RegistryError> {
        Self::new(Self::core_plugins().into_iter().chain(plugins))
    }

    pub fn register_plugin(&mut self, plugin: Box<dyn PlatePlugin>) -> Result<(), RegistryError> {
        if self.plugins.iter().any(|p| p.id() == plugin.id()) {
            return Err(RegistryError::DuplicatePlugin(plugin.id().to_string()));
        }

        for spec in plugin.node_specs() {
            if self.node_specs.contains_key(&spec.kind) {
                return Err(RegistryError::DuplicateNodeSpec(spec.kind));
            }
            self.node_specs.insert(spec.kind.clone(), spec);
        }

        self.text_attributes.extend(plugin.text_attributes());
        self.normalize_passes.extend(plugin.normalize_passes());

        for cmd in plugin.commands() {
            if self.commands.contains_key(&cmd.id) {
                return Err(RegistryError::DuplicateCommand(cmd.id));
            }
            self.commands.insert(cmd.id.clone(), cmd);
        }

        for query in plugin.queries() {
            if self.queries.contains_key(&query.id) {
                return Err(RegistryError::DuplicateQuery(query.id));
            }
            self.queries.insert(query.id.clone(), query);
        }

        self.plugins.push(plugin);
        Ok(())
    }

    pub fn plugins(&self) -> &[Box<dyn PlatePlugin>] {
        &self.plugins
    }

    pub fn node_specs(&self) -> &HashMap<String, NodeSpec> {
        &self.node_specs
    }

    pub fn allows_text_attribute(&self, key: &str) -> bool {
        self.text_attributes.contains(key)
    }

    pub fn normalize_passes(&self) -> &[Box<dyn NormalizePass>] {
        &self.normalize_passes
    }

    pub fn commands(&self) -> &HashMap<String, CommandSpec> {
        &self.commands
    }

    pub fn command(&self, id: &str) -> Option<CommandSpec> {
        self.commands.get(id).cloned()
    }

    pub fn queries(&self) -> &HashMap<String, QuerySpec> {
        &self.queries
    }

    pub fn query(&self, id: &str) -> Option<QuerySpec> {
        self.queries.get(id).cloned()
    }

    pub fn normalize(&self, doc: &Document) -> Vec<Op> {
        let mut ops: Vec<Op> = Vec::new();
        for pass in &self.normalize_passes {
            ops.extend(pass.run(doc, self));
        }
        ops
    }

    pub fn normalize_selection(&self, doc: &Document, selection: &Selection) -> Selection {
        let fallback = first_text_point(doc).unwrap_or(Point {
            path: vec![0],
            offset: 0,
        });

        let anchor = normalize_point(doc, &selection.anchor).unwrap_or_else(|| {
            normalize_point(doc, &selection.focus).unwrap_or_else(|| fallback.clone())
        });
        let focus = normalize_point(doc, &selection.focus).unwrap_or_else(|| anchor.clone());

        Selection { anchor, focus }
    }

    pub fn is_known_kind(&self, kind: &str) -> bool {
        self.node_specs.contains_key(kind)
    }

    fn child_constraint(&self, kind: &str) -> ChildConstraint {
        self.node_specs
            .get(kind)
            .map(|s| s.children.clone())
            .unwrap_or(ChildConstraint::Any)
    }
}

fn first_text_point(doc: &Document) -> Option<Point> {
    doc.text_blocks()
        .into_iter()
        .next()
        .map(|(path, _)| Point::new(path, 0))
}

/// Resolves a point to an existing text block, clamping indices and offset.
fn normalize_point(doc: &Document, point: &Point) -> Option<Point> {
    let mut resolved: Vec<usize> = Vec::new();
    let mut children: &[Node] = &doc.children;

    for &wanted in &point.path {
        if children.is_empty() {
            break;
        }
        let ix = wanted.min(children.len() - 1);
        let Node::Element(el) = &children[ix] else {
            break;
        };
        resolved.push(ix);
        if el.is_text_block() {
            let offset = inline::clamp_to_char_boundary(&el.text(), point.offset);
            return Some(Point::new(resolved, offset));
        }
        children = &el.children;
    }

    let el = doc.element(&resolved)?;
    let nested = Document::new(el.children.clone());
    let (mut inner, _) = nested.text_blocks().into_iter().next()?;
    resolved.append(&mut inner);
    Some(Point::new(resolved, 0))
}

fn paragraph_to_view(_el: &ElementNode) -> ViewElement {
    ViewElement::container("p")
}

fn paragraph_from_view(el: &ViewElement) -> Option<Attrs> {
    (el.name == "p").then(Attrs::new)
}

fn heading_to_view(el: &ElementNode) -> ViewElement {
    let level = el
        .attrs
        .get("level")
        .and_then(Value::as_u64)
        .unwrap_or(1)
        .clamp(1, 6);
    ViewElement::container(format!("h{level}"))
}

fn heading_from_view(el: &ViewElement) -> Option<Attrs> {
    let level: u64 = el.name.strip_prefix('h')?.parse().ok()?;
    if !(1..=6).contains(&level) {
        return None;
    }
    let mut attrs = Attrs::new();
    attrs.insert("level".to_string(), Value::from(level));
    Some(attrs)
}

fn blockquote_to_view(_el: &ElementNode) -> ViewElement {
    ViewElement::container("blockquote")
}

fn blockquote_from_view(el: &ViewElement) -> Option<Attrs> {
    (el.name == "blockquote").then(Attrs::new)
}

struct CoreBlocksPlugin;

impl PlatePlugin for CoreBlocksPlugin {
    fn id(&self) -> &'static str {
        "core.blocks"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![
            NodeSpec {
                kind: "paragraph".to_string(),
                role: NodeRole::Block,
                children: ChildConstraint::InlineOnly,
            },
            NodeSpec {
                kind: "heading".to_string(),
                role: NodeRole::Block,
                children: ChildConstraint::InlineOnly,
            },
            NodeSpec {
                kind: "blockquote".to_string(),
                role: NodeRole::Block,
                children: ChildConstraint::BlockOnly,
            },
        ]
    }

    fn setup(&self, setup: &mut EditorSetup<'_>) {
        setup.conversion.block(BlockConverter {
            kind: "paragraph".to_string(),
            to_view: paragraph_to_view,
            from_view: paragraph_from_view,
        });
        setup.conversion.block(BlockConverter {
            kind: "heading".to_string(),
            to_view: heading_to_view,
            from_view: heading_from_view,
        });
        setup.conversion.block(BlockConverter {
            kind: "blockquote".to_string(),
            to_view: blockquote_to_view,
            from_view: blockquote_from_view,
        });
    }
}

struct CoreNormalizePlugin;

impl PlatePlugin for CoreNormalizePlugin {
    fn id(&self) -> &'static str {
        "core.normalize"
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![
            Box::new(EnsureNonEmptyDocument),
            Box::new(EnsureContainersHaveBlocks),
            Box::new(EnsureTextBlocksHaveLeaf),
            Box::new(RemoveUnknownTextAttributes),
        ]
    }
}

struct EnsureNonEmptyDocument;

impl NormalizePass for EnsureNonEmptyDocument {
    fn id(&self) -> &'static str {
        "core.ensure_non_empty_document"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        if doc.children.is_empty() {
            return vec![Op::InsertNode {
                path: vec![0],
                node: Node::paragraph(""),
            }];
        }
        Vec::new()
    }
}

struct EnsureContainersHaveBlocks;

impl NormalizePass for EnsureContainersHaveBlocks {
    fn id(&self) -> &'static str {
        "core.ensure_containers_have_blocks"
    }

    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op> {
        fn walk(
            children: &[Node],
            path: &mut Vec<usize>,
            registry: &PluginRegistry,
            ops: &mut Vec<Op>,
        ) {
            for (ix, node) in children.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };
                if registry.child_constraint(&el.kind) != ChildConstraint::BlockOnly {
                    continue;
                }
                path.push(ix);
                if el.children.is_empty() {
                    let mut insert_path = path.clone();
                    insert_path.push(0);
                    ops.push(Op::InsertNode {
                        path: insert_path,
                        node: Node::paragraph(""),
                    });
                } else {
                    walk(&el.children, path, registry, ops);
                }
                path.pop();
            }
        }

        let mut ops = Vec::new();
        walk(&doc.children, &mut Vec::new(), registry, &mut ops);
        ops
    }
}

struct EnsureTextBlocksHaveLeaf;

impl NormalizePass for EnsureTextBlocksHaveLeaf {
    fn id(&self) -> &'static str {
        "core.ensure_inline_only_blocks_have_text_leaf"
    }

    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op> {
        fn walk(
            children: &[Node],
            path: &mut Vec<usize>,
            registry: &PluginRegistry,
            ops: &mut Vec<Op>,
        ) {
            for (ix, node) in children.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };
                path.push(ix);
                if registry.child_constraint(&el.kind) == ChildConstraint::InlineOnly {
                    if el.children.is_empty() {
                        ops.push(Op::InsertText {
                            path: path.clone(),
                            offset: 0,
                            nodes: Vec::new(),
                        });
                    }
                } else {
                    walk(&el.children, path, registry, ops);
                }
                path.pop();
            }
        }

        let mut ops = Vec::new();
        walk(&doc.children, &mut Vec::new(), registry, &mut ops);
        ops
    }
}

/// Strips text attributes no plugin declared.
struct RemoveUnknownTextAttributes;

impl NormalizePass for RemoveUnknownTextAttributes {
    fn id(&self) -> &'static str {
        "core.remove_unknown_text_attributes"
    }

    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op> {
        let mut ops = Vec::new();
        for (path, el) in doc.text_blocks() {
            for (span, attrs) in inline::runs(&el.children) {
                for key in attrs.keys() {
                    if !registry.allows_text_attribute(key) {
                        ops.push(Op::remove_attribute(path.clone(), span.clone(), key.clone()));
                    }
                }
            }
        }
        ops
    }
}
