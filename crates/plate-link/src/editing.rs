use std::rc::Rc;

use plate_core::{CommandSpec, EditorSetup, PlatePlugin, QuerySpec};

use crate::LINK_ATTRIBUTE;
use crate::commands::{link_commands, link_queries};
use crate::config::LinkConfig;
use crate::converters;
use crate::decorators::{DecoratorConfigError, LinkDecorators};
use crate::highlight::LinkHighlighter;

/// The link plugin. Decorators are resolved once, here, before any command
/// or converter exists.
///
/// Clones share decorator state and the highlight set, so one instance
/// belongs to one editor.
#[derive(Debug, Clone)]
pub struct LinkEditing {
    decorators: Rc<LinkDecorators>,
    highlighter: LinkHighlighter,
}

impl LinkEditing {
    pub fn new(config: &LinkConfig) -> Result<Self, DecoratorConfigError> {
        Ok(Self {
            decorators: Rc::new(LinkDecorators::from_config(config)?),
            highlighter: LinkHighlighter::default(),
        })
    }

    pub fn decorators(&self) -> &LinkDecorators {
        &self.decorators
    }

    pub fn highlighter(&self) -> &LinkHighlighter {
        &self.highlighter
    }

    pub fn boxed(&self) -> Box<dyn PlatePlugin> {
        Box::new(self.clone())
    }
}

impl PlatePlugin for LinkEditing {
    fn id(&self) -> &'static str {
        "link"
    }

    fn text_attributes(&self) -> Vec<String> {
        std::iter::once(LINK_ATTRIBUTE.to_string())
            .chain(self.decorators.manual().iter().map(|d| d.id.clone()))
            .collect()
    }

    fn commands(&self) -> Vec<CommandSpec> {
        link_commands(&self.decorators)
    }

    fn queries(&self) -> Vec<QuerySpec> {
        link_queries(&self.decorators)
    }

    fn setup(&self, setup: &mut EditorSetup<'_>) {
        converters::register(setup.conversion, &self.decorators);
        self.highlighter.register(setup);
        setup.caret.register_attribute(LINK_ATTRIBUTE);
    }
}
