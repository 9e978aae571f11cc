//! Model to view (downcast) and view to model (upcast) conversion.
//!
//! Downcast is event driven. A committed batch is diffed into change events;
//! each event is offered to every matching handler in priority order together
//! with a consumable token, and a selection event always closes the pass.
//! Upcast walks parsed markup and asks element-to-attribute converters what
//! each inline element means.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use serde_json::Value;

use crate::core::{Attrs, Document, ElementNode, Node, Selection, TextNode, TextRange};
use crate::inline;
use crate::plugin::{ChildConstraint, PluginRegistry};
use crate::view::{ViewDocument, ViewElement, ViewNode, to_view_range};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Lowest,
    Low,
    Normal,
    High,
    Highest,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeChange {
    pub range: TextRange,
    pub key: String,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// The block skeleton was (re)built from scratch.
    InsertStructure,
    RemoveStructure,
    /// Text now present at this range of the new document.
    InsertText(TextRange),
    /// Text that was at this range before the change.
    RemoveText(TextRange),
    Attribute(AttributeChange),
    Selection,
}

impl ChangeEvent {
    pub fn consumable_name(&self) -> String {
        match self {
            ChangeEvent::InsertStructure => "insert:structure".to_string(),
            ChangeEvent::RemoveStructure => "remove:structure".to_string(),
            ChangeEvent::InsertText(_) => "insert".to_string(),
            ChangeEvent::RemoveText(_) => "remove".to_string(),
            ChangeEvent::Attribute(change) => format!("attribute:{}", change.key),
            ChangeEvent::Selection => "selection".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    Insert,
    Remove,
    /// Attribute changes, optionally for one key only.
    Attribute(Option<String>),
    Selection,
}

impl EventFilter {
    pub fn attribute(key: impl Into<String>) -> Self {
        EventFilter::Attribute(Some(key.into()))
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        match (self, event) {
            (EventFilter::Insert, ChangeEvent::InsertStructure | ChangeEvent::InsertText(_)) => {
                true
            }
            (EventFilter::Remove, ChangeEvent::RemoveStructure | ChangeEvent::RemoveText(_)) => {
                true
            }
            (EventFilter::Attribute(None), ChangeEvent::Attribute(_)) => true,
            (EventFilter::Attribute(Some(key)), ChangeEvent::Attribute(change)) => {
                *key == change.key
            }
            (EventFilter::Selection, ChangeEvent::Selection) => true,
            _ => false,
        }
    }
}

/// Tracks which parts of an event a handler has already converted.
#[derive(Debug, Clone, Default)]
pub struct Consumable {
    available: BTreeSet<String>,
}

impl Consumable {
    pub fn for_event(event: &ChangeEvent) -> Self {
        let mut available = BTreeSet::new();
        available.insert(event.consumable_name());
        Self { available }
    }

    pub fn test(&self, name: &str) -> bool {
        self.available.contains(name)
    }

    pub fn consume(&mut self, name: &str) -> bool {
        self.available.remove(name)
    }
}

/// What handlers may read while converting.
pub struct ConversionContext<'a> {
    pub doc: &'a Document,
    pub selection: &'a Selection,
    /// Selection attributes after the change.
    pub selection_attrs: &'a Attrs,
    pub blocks: &'a [BlockConverter],
}

pub struct DowncastApi<'a> {
    pub view: &'a mut ViewDocument,
    pub context: &'a ConversionContext<'a>,
    pub consumable: &'a mut Consumable,
}

pub type DowncastHandler = Rc<dyn Fn(&ChangeEvent, &mut DowncastApi<'_>)>;

struct Registration {
    filter: EventFilter,
    priority: Priority,
    handler: DowncastHandler,
}

#[derive(Default)]
pub struct DowncastDispatcher {
    handlers: Vec<Registration>,
}

impl DowncastDispatcher {
    /// Higher priorities run first; equal priorities run in registration order.
    pub fn on(&mut self, filter: EventFilter, priority: Priority, handler: DowncastHandler) {
        let at = self
            .handlers
            .iter()
            .position(|h| h.priority < priority)
            .unwrap_or(self.handlers.len());
        self.handlers.insert(
            at,
            Registration {
                filter,
                priority,
                handler,
            },
        );
    }

    pub(crate) fn convert(
        &self,
        view: &mut ViewDocument,
        events: Vec<ChangeEvent>,
        ctx: &ConversionContext<'_>,
    ) {
        for event in &events {
            self.fire(event, view, ctx);
        }
        self.fire(&ChangeEvent::Selection, view, ctx);
    }

    pub(crate) fn fire(
        &self,
        event: &ChangeEvent,
        view: &mut ViewDocument,
        ctx: &ConversionContext<'_>,
    ) {
        let mut consumable = Consumable::for_event(event);
        for registration in &self.handlers {
            if !registration.filter.matches(event) {
                continue;
            }
            let mut api = DowncastApi {
                view: &mut *view,
                context: ctx,
                consumable: &mut consumable,
            };
            (registration.handler)(event, &mut api);
        }
    }
}

/// Which downcast pipelines a registration goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DowncastGroup {
    Editing,
    Data,
    Both,
}

/// Maps a block element kind to its view container and back.
#[derive(Clone)]
pub struct BlockConverter {
    pub kind: String,
    pub to_view: fn(&ElementNode) -> ViewElement,
    pub from_view: fn(&ViewElement) -> Option<Attrs>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributePattern {
    Present,
    Equals(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewMatcher {
    pub name: Option<String>,
    pub classes: Vec<String>,
    pub attributes: BTreeMap<String, AttributePattern>,
}

impl ViewMatcher {
    pub fn element(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn attribute(mut self, key: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), AttributePattern::Present);
        self
    }

    pub fn attribute_equals(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .insert(key.into(), AttributePattern::Equals(value.into()));
        self
    }

    pub fn matches(&self, el: &ViewElement) -> bool {
        if self.name.as_ref().is_some_and(|name| *name != el.name) {
            return false;
        }
        if !self.classes.iter().all(|class| el.has_class(class)) {
            return false;
        }
        self.attributes
            .iter()
            .all(|(key, pattern)| match (pattern, el.attr(key)) {
                (_, None) => false,
                (AttributePattern::Present, Some(_)) => true,
                (AttributePattern::Equals(want), Some(have)) => want == have,
            })
    }
}

/// Turns a matching inline element into a text attribute.
pub struct ElementToAttribute {
    pub view: ViewMatcher,
    pub key: String,
    pub value: Box<dyn Fn(&ViewElement) -> Option<Value>>,
}

#[derive(Default)]
pub struct UpcastDispatcher {
    attributes: Vec<ElementToAttribute>,
}

impl UpcastDispatcher {
    pub(crate) fn convert(
        &self,
        nodes: &[ViewNode],
        blocks: &[BlockConverter],
        registry: &PluginRegistry,
    ) -> Document {
        let mut children = Vec::new();
        self.convert_blocks(nodes, blocks, registry, &mut children);
        Document { children }
    }

    fn convert_blocks(
        &self,
        nodes: &[ViewNode],
        blocks: &[BlockConverter],
        registry: &PluginRegistry,
        out: &mut Vec<Node>,
    ) {
        let mut pending: Vec<TextNode> = Vec::new();
        for node in nodes {
            match node {
                ViewNode::Element(el) => {
                    if let Some((kind, attrs)) = match_block(blocks, el) {
                        flush_paragraph(&mut pending, out);
                        let inline_only = registry
                            .node_specs()
                            .get(&kind)
                            .is_none_or(|spec| spec.children == ChildConstraint::InlineOnly);
                        let children = if inline_only {
                            let mut leaves = Vec::new();
                            self.convert_inline(&el.children, &Attrs::new(), registry, &mut leaves);
                            inline::canonicalize(leaves)
                        } else {
                            let mut inner = Vec::new();
                            self.convert_blocks(&el.children, blocks, registry, &mut inner);
                            inner
                        };
                        out.push(Node::Element(ElementNode {
                            kind,
                            attrs,
                            children,
                        }));
                    } else if contains_block(el, blocks) {
                        flush_paragraph(&mut pending, out);
                        self.convert_blocks(&el.children, blocks, registry, out);
                    } else {
                        self.convert_inline(
                            std::slice::from_ref(node),
                            &Attrs::new(),
                            registry,
                            &mut pending,
                        );
                    }
                }
                ViewNode::Text(text) => {
                    if pending.is_empty() && text.trim().is_empty() {
                        continue;
                    }
                    pending.push(TextNode::new(text.clone()));
                }
            }
        }
        flush_paragraph(&mut pending, out);
    }

    fn convert_inline(
        &self,
        nodes: &[ViewNode],
        inherited: &Attrs,
        registry: &PluginRegistry,
        out: &mut Vec<TextNode>,
    ) {
        for node in nodes {
            match node {
                ViewNode::Text(text) => out.push(TextNode {
                    text: text.clone(),
                    attrs: inherited.clone(),
                }),
                ViewNode::Element(el) => {
                    // Converters are evaluated independently; the first match
                    // for a key wins, inner elements override outer ones.
                    let mut local = Attrs::new();
                    for converter in &self.attributes {
                        if local.contains_key(&converter.key)
                            || !registry.allows_text_attribute(&converter.key)
                            || !converter.view.matches(el)
                        {
                            continue;
                        }
                        if let Some(value) = (converter.value)(el) {
                            local.insert(converter.key.clone(), value);
                        }
                    }
                    let mut attrs = inherited.clone();
                    attrs.extend(local);
                    self.convert_inline(&el.children, &attrs, registry, out);
                }
            }
        }
    }
}

fn match_block(blocks: &[BlockConverter], el: &ViewElement) -> Option<(String, Attrs)> {
    blocks
        .iter()
        .find_map(|block| (block.from_view)(el).map(|attrs| (block.kind.clone(), attrs)))
}

fn contains_block(el: &ViewElement, blocks: &[BlockConverter]) -> bool {
    el.children.iter().any(|child| match child {
        ViewNode::Element(child) => {
            match_block(blocks, child).is_some() || contains_block(child, blocks)
        }
        ViewNode::Text(_) => false,
    })
}

fn flush_paragraph(pending: &mut Vec<TextNode>, out: &mut Vec<Node>) {
    let leaves = std::mem::take(pending);
    if leaves.iter().all(|leaf| leaf.text.trim().is_empty()) {
        return;
    }
    out.push(Node::Element(ElementNode {
        kind: "paragraph".to_string(),
        attrs: Attrs::new(),
        children: inline::canonicalize(leaves),
    }));
}

fn build_skeleton(children: &[Node], blocks: &[BlockConverter]) -> Vec<ViewNode> {
    children
        .iter()
        .filter_map(|node| {
            let Node::Element(el) = node else {
                return None;
            };
            let mut container = blocks
                .iter()
                .find(|block| block.kind == el.kind)
                .map(|block| (block.to_view)(el))
                .unwrap_or_else(|| ViewElement::container("div"));
            if !el.is_text_block() {
                container.children = build_skeleton(&el.children, blocks);
            }
            Some(ViewNode::Element(container))
        })
        .collect()
}

/// Converter registrations for one editor.
pub struct Conversion {
    pub(crate) editing: DowncastDispatcher,
    pub(crate) data: DowncastDispatcher,
    pub(crate) upcast: UpcastDispatcher,
    blocks: Vec<BlockConverter>,
}

impl Conversion {
    pub(crate) fn new() -> Self {
        let mut conversion = Self {
            editing: DowncastDispatcher::default(),
            data: DowncastDispatcher::default(),
            upcast: UpcastDispatcher::default(),
            blocks: Vec::new(),
        };

        conversion.downcast(
            DowncastGroup::Both,
            EventFilter::Insert,
            Priority::Normal,
            |event, api| match event {
                ChangeEvent::InsertStructure => {
                    if api.consumable.consume("insert:structure") {
                        let roots = build_skeleton(&api.context.doc.children, api.context.blocks);
                        api.view.set_roots(roots);
                    }
                }
                ChangeEvent::InsertText(range) => {
                    if api.consumable.consume("insert") {
                        let text = api.context.doc.text_in(range);
                        api.view.insert_text(&range.path, range.range.start, &text);
                    }
                }
                _ => {}
            },
        );
        conversion.downcast(
            DowncastGroup::Both,
            EventFilter::Remove,
            Priority::Normal,
            |event, api| match event {
                ChangeEvent::RemoveStructure => {
                    if api.consumable.consume("remove:structure") {
                        api.view.clear();
                    }
                }
                ChangeEvent::RemoveText(range) => {
                    if api.consumable.consume("remove") {
                        api.view.remove(&to_view_range(range));
                    }
                }
                _ => {}
            },
        );

        conversion
    }

    pub fn block(&mut self, converter: BlockConverter) {
        self.blocks.push(converter);
    }

    pub fn blocks(&self) -> &[BlockConverter] {
        &self.blocks
    }

    pub fn downcast(
        &mut self,
        group: DowncastGroup,
        filter: EventFilter,
        priority: Priority,
        handler: impl Fn(&ChangeEvent, &mut DowncastApi<'_>) + 'static,
    ) {
        let handler: DowncastHandler = Rc::new(handler);
        if matches!(group, DowncastGroup::Editing | DowncastGroup::Both) {
            self.editing.on(filter.clone(), priority, handler.clone());
        }
        if matches!(group, DowncastGroup::Data | DowncastGroup::Both) {
            self.data.on(filter, priority, handler);
        }
    }

    /// Wraps text carrying `key` in the element `create` builds for its value.
    /// A changed value unwraps the old element before wrapping the new one.
    pub fn attribute_to_element(
        &mut self,
        group: DowncastGroup,
        key: impl Into<String>,
        priority: Priority,
        create: impl Fn(&Value) -> Option<ViewElement> + 'static,
    ) {
        let key = key.into();
        let consumable = format!("attribute:{key}");
        self.downcast(
            group,
            EventFilter::attribute(key),
            priority,
            move |event, api| {
                let ChangeEvent::Attribute(change) = event else {
                    return;
                };
                if !api.consumable.consume(&consumable) {
                    return;
                }
                let range = to_view_range(&change.range);
                if let Some(old) = change.old.as_ref().and_then(|value| create(value)) {
                    api.view.unwrap(&range, &old);
                }
                if let Some(new) = change.new.as_ref().and_then(|value| create(value)) {
                    api.view.wrap(&range, new);
                }
            },
        );
    }

    pub fn element_to_attribute(&mut self, converter: ElementToAttribute) {
        self.upcast.attributes.push(converter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matcher_checks_name_classes_and_attributes() {
        let el = ViewElement::container("a")
            .with_class("internalLink")
            .with_attr("data-elementid", "T1")
            .with_attr("target", "_blank");

        assert!(
            ViewMatcher::element("a")
                .class("internalLink")
                .attribute("data-elementid")
                .matches(&el)
        );
        assert!(ViewMatcher::element("a").attribute_equals("target", "_blank").matches(&el));
        assert!(!ViewMatcher::element("a").attribute_equals("target", "_self").matches(&el));
        assert!(!ViewMatcher::element("span").matches(&el));
        assert!(!ViewMatcher::element("a").class("other").matches(&el));
    }

    #[test]
    fn handlers_run_by_priority_then_registration() {
        use std::cell::RefCell;

        let order = Rc::new(RefCell::new(Vec::new()));
        let mut dispatcher = DowncastDispatcher::default();
        for (label, priority) in [
            ("normal-1", Priority::Normal),
            ("highest", Priority::Highest),
            ("normal-2", Priority::Normal),
            ("low", Priority::Low),
        ] {
            let order = order.clone();
            dispatcher.on(
                EventFilter::Selection,
                priority,
                Rc::new(move |_, _| order.borrow_mut().push(label)),
            );
        }

        let doc = Document::default();
        let selection = Selection::collapsed(crate::core::Point::new(vec![0], 0));
        let attrs = Attrs::new();
        let ctx = ConversionContext {
            doc: &doc,
            selection: &selection,
            selection_attrs: &attrs,
            blocks: &[],
        };
        dispatcher.fire(&ChangeEvent::Selection, &mut ViewDocument::default(), &ctx);
        assert_eq!(*order.borrow(), vec!["highest", "normal-1", "normal-2", "low"]);
    }
}
