//! Marks the link under a collapsed caret in the interactive view.
//!
//! Every conversion pass starts by clearing the previous highlight from the
//! highest priority listeners; a post-fixer then adds it back for the link
//! the caret sits in. The data pipeline never sees the class.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use plate_core::{
    ConversionContext, DowncastGroup, EditorSetup, EventFilter, Priority, ViewDocument,
    ViewElementId, to_view_range,
};
use serde_json::Value;

use crate::range::find_link_range;
use crate::{HIGHLIGHT_CLASS, LINK_ATTRIBUTE, LINK_CUSTOM_PROPERTY};

#[derive(Debug, Clone, Default)]
pub struct LinkHighlighter {
    highlighted: Rc<RefCell<BTreeSet<ViewElementId>>>,
}

impl LinkHighlighter {
    /// View elements currently carrying the highlight class.
    pub fn highlighted(&self) -> Vec<ViewElementId> {
        self.highlighted.borrow().iter().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.highlighted.borrow().is_empty()
    }

    pub(crate) fn register(&self, setup: &mut EditorSetup<'_>) {
        for filter in [
            EventFilter::Insert,
            EventFilter::Remove,
            EventFilter::Attribute(None),
            EventFilter::Selection,
        ] {
            let highlighted = self.highlighted.clone();
            setup.conversion.downcast(
                DowncastGroup::Editing,
                filter,
                Priority::Highest,
                move |_event, api| clear(&highlighted, api.view),
            );
        }

        let highlighted = self.highlighted.clone();
        setup
            .editing
            .register_post_fixer(move |view, ctx| highlight(&highlighted, view, ctx));
    }
}

fn clear(highlighted: &RefCell<BTreeSet<ViewElementId>>, view: &mut ViewDocument) {
    let ids = std::mem::take(&mut *highlighted.borrow_mut());
    for id in ids {
        view.remove_class(id, HIGHLIGHT_CLASS);
    }
}

fn highlight(
    highlighted: &RefCell<BTreeSet<ViewElementId>>,
    view: &mut ViewDocument,
    ctx: &ConversionContext<'_>,
) -> bool {
    if !ctx.selection.is_collapsed() {
        return false;
    }
    let Some(target) = ctx.selection_attrs.get(LINK_ATTRIBUTE).and_then(Value::as_str) else {
        return false;
    };

    let range = find_link_range(ctx.doc, &ctx.selection.focus, target);
    let pending: Vec<ViewElementId> = view
        .attribute_elements_in(&to_view_range(&range))
        .into_iter()
        .filter(|el| el.custom(LINK_CUSTOM_PROPERTY).is_some() && !el.has_class(HIGHLIGHT_CLASS))
        .map(|el| el.id())
        .collect();

    let mut changed = false;
    for id in pending {
        if view.add_class(id, HIGHLIGHT_CLASS) {
            highlighted.borrow_mut().insert(id);
            changed = true;
        }
    }
    changed
}
