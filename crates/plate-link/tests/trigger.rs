use std::cell::RefCell;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures_executor::block_on;
use futures_util::FutureExt;
use futures_util::future::{self, LocalBoxFuture};
use futures_util::task::noop_waker_ref;
use plate_core::{Document, Editor, Node, PluginRegistry, Point, Selection, TextNode};
use plate_link::{
    LinkConfig, LinkEditing, LinkTarget, LinkTrigger, SyncSelector, TargetSelector, TriggerOutcome,
};

fn editor() -> RefCell<Editor> {
    let link = LinkEditing::new(&LinkConfig::default()).unwrap();
    let registry = PluginRegistry::with_plugins([link.boxed()]).unwrap();
    let doc = Document::new(vec![Node::paragraph("hello world")]);
    let selection = Selection::new(Point::new(vec![0], 0), Point::new(vec![0], 5));
    RefCell::new(Editor::new(doc, selection, registry))
}

fn linked_hello(target: &str) -> Vec<Node> {
    vec![Node::paragraph_with(vec![
        TextNode::new("hello").with_attr("linkId", target),
        TextNode::new(" world"),
    ])]
}

/// Resolves once a target is put into the slot.
struct DeferredSelector {
    slot: Rc<RefCell<Option<LinkTarget>>>,
}

impl TargetSelector for DeferredSelector {
    fn select(&self) -> LocalBoxFuture<'static, Option<LinkTarget>> {
        let slot = self.slot.clone();
        future::poll_fn(move |_| match slot.borrow_mut().take() {
            Some(target) => Poll::Ready(Some(target)),
            None => Poll::Pending,
        })
        .boxed_local()
    }
}

#[test]
fn missing_selector_is_a_no_op() {
    let editor = editor();
    let trigger = LinkTrigger::new(None);
    assert!(!trigger.is_available());

    let outcome = block_on(trigger.execute(&editor)).unwrap();
    assert_eq!(outcome, TriggerOutcome::NoSelector);
    assert!(!editor.borrow().can_undo());
}

#[test]
fn aborted_selection_is_a_no_op() {
    let editor = editor();
    let trigger = LinkTrigger::new(Some(Rc::new(SyncSelector::new(|| None))));

    let outcome = block_on(trigger.execute(&editor)).unwrap();
    assert_eq!(outcome, TriggerOutcome::Aborted);
    assert_eq!(
        editor.borrow().doc().children,
        vec![Node::paragraph("hello world")]
    );
}

#[test]
fn synchronous_selection_links_the_selection() {
    let editor = editor();
    let trigger = LinkTrigger::new(Some(Rc::new(SyncSelector::new(|| {
        Some(LinkTarget::new("T1").with_label("Chapter 1"))
    }))));

    let outcome = block_on(trigger.execute(&editor)).unwrap();
    assert_eq!(
        outcome,
        TriggerOutcome::Linked(LinkTarget::new("T1").with_label("Chapter 1"))
    );
    assert_eq!(editor.borrow().doc().children, linked_hello("T1"));
}

#[test]
fn deferred_selection_opens_its_own_batch() {
    let editor = editor();
    let slot = Rc::new(RefCell::new(None));
    let trigger = LinkTrigger::new(Some(Rc::new(DeferredSelector { slot: slot.clone() })));

    let mut pending = trigger.execute(&editor).boxed_local();
    let mut cx = Context::from_waker(noop_waker_ref());
    assert!(pending.poll_unpin(&mut cx).is_pending());

    // The editor stays usable while the selector is open.
    editor
        .borrow_mut()
        .set_selection(Selection::new(Point::new(vec![0], 6), Point::new(vec![0], 11)));
    assert!(!editor.borrow().can_undo());

    *slot.borrow_mut() = Some(LinkTarget::new("T2"));
    let Poll::Ready(outcome) = pending.poll_unpin(&mut cx) else {
        panic!("selector resolved but trigger is still pending");
    };
    assert_eq!(outcome.unwrap(), TriggerOutcome::Linked(LinkTarget::new("T2")));
    assert_eq!(
        editor.borrow().doc().children,
        vec![Node::paragraph_with(vec![
            TextNode::new("hello "),
            TextNode::new("world").with_attr("linkId", "T2"),
        ])]
    );

    assert!(editor.borrow_mut().undo());
    assert_eq!(
        editor.borrow().doc().children,
        vec![Node::paragraph("hello world")]
    );
}

#[test]
fn dropping_a_pending_trigger_changes_nothing() {
    let editor = editor();
    let slot = Rc::new(RefCell::new(None));
    let trigger = LinkTrigger::new(Some(Rc::new(DeferredSelector { slot: slot.clone() })));

    let mut pending = trigger.execute(&editor).boxed_local();
    let mut cx = Context::from_waker(noop_waker_ref());
    assert!(pending.poll_unpin(&mut cx).is_pending());
    drop(pending);

    *slot.borrow_mut() = Some(LinkTarget::new("T3"));
    assert_eq!(
        editor.borrow().doc().children,
        vec![Node::paragraph("hello world")]
    );
    assert!(!editor.borrow().can_undo());
}

#[test]
fn targets_accept_the_name_alias() {
    let target: LinkTarget =
        serde_json::from_value(serde_json::json!({ "id": "T1", "name": "Intro" })).unwrap();
    assert_eq!(target, LinkTarget::new("T1").with_label("Intro"));
}
