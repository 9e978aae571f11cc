//! Internal link annotations for the plate editing engine.
//!
//! A run of text is a link when it carries the `linkId` attribute; its value
//! is the identifier of the linked document element. [`LinkEditing`] wires
//! the attribute into an editor: schema, converters, commands, two-step caret
//! movement and the highlight of the link under the caret.

mod commands;
mod config;
mod converters;
mod decorators;
mod editing;
mod highlight;
mod range;
mod trigger;

pub use crate::commands::LinkArgs;
pub use crate::config::{
    AutomaticDefinition, DecoratorDefinition, LinkConfig, ManualDefinition, TargetPredicate,
};
pub use crate::converters::create_link_element;
pub use crate::decorators::{
    AutomaticDecorator, Decorator, DecoratorConfigError, LinkDecorators, ManualDecorator,
};
pub use crate::editing::LinkEditing;
pub use crate::highlight::LinkHighlighter;
pub use crate::range::{find_attribute_range, find_link_range};
pub use crate::trigger::{LinkTarget, LinkTrigger, SyncSelector, TargetSelector, TriggerOutcome};

/// Model attribute marking a run of text as a link.
pub const LINK_ATTRIBUTE: &str = "linkId";
/// Markup attribute carrying the link target.
pub const HTML_ID_ATTRIBUTE: &str = "data-elementid";
pub const HTML_CLASS: &str = "internalLink";
/// Custom view property set on every link wrapper element.
pub const LINK_CUSTOM_PROPERTY: &str = "internalLinkData";
pub const HIGHLIGHT_CLASS: &str = "ck-link_selected";
pub const LINK_PRIORITY: i32 = 5;

pub const LINK_COMMAND: &str = "link.link";
pub const UNLINK_COMMAND: &str = "link.unlink";
pub const SET_DECORATOR_COMMAND: &str = "link.set_decorator";
