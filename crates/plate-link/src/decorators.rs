//! Normalized decorator declarations.
//!
//! Automatic decorators are derived from the link target on every downcast
//! and never stored. Manual decorators are boolean text attributes keyed by
//! their id, toggled from UI and removed together with the link.

use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};

use plate_core::{ViewElement, ViewMatcher};
use thiserror::Error;

use crate::config::{DecoratorDefinition, LinkConfig, TargetPredicate};
use crate::{LINK_ATTRIBUTE, LINK_CUSTOM_PROPERTY, LINK_PRIORITY};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecoratorConfigError {
    #[error("decorator declared under {0:?} has an empty id")]
    EmptyId(String),
    #[error("decorator id {0:?} is reserved for the link attribute")]
    ReservedId(String),
    #[error("duplicate decorator id: {0}")]
    DuplicateId(String),
    #[error("manual decorator {0} declares no output attributes")]
    ManualWithoutAttributes(String),
}

#[derive(Debug, Clone)]
pub struct AutomaticDecorator {
    pub id: String,
    pub predicate: TargetPredicate,
    pub attributes: BTreeMap<String, String>,
}

impl AutomaticDecorator {
    pub fn applies_to(&self, target: Option<&str>) -> bool {
        self.predicate.matches(target)
    }

    pub fn view_element(&self) -> ViewElement {
        decorator_element(&self.attributes)
    }
}

#[derive(Debug)]
pub struct ManualDecorator {
    pub id: String,
    pub label: String,
    pub default_value: bool,
    pub attributes: BTreeMap<String, String>,
    value: Cell<Option<bool>>,
}

impl ManualDecorator {
    /// Pending state set from UI, if any.
    pub fn value(&self) -> Option<bool> {
        self.value.get()
    }

    pub fn set_value(&self, value: Option<bool>) {
        self.value.set(value);
    }

    /// Explicit state first, then the pending UI state, then the default.
    pub fn resolve(&self, explicit: Option<bool>) -> bool {
        explicit
            .or(self.value.get())
            .unwrap_or(self.default_value)
    }

    pub fn view_element(&self) -> ViewElement {
        decorator_element(&self.attributes)
    }

    /// Matches `a` elements carrying every output attribute of this decorator.
    pub fn matcher(&self) -> ViewMatcher {
        let mut matcher = ViewMatcher::element("a");
        for (key, value) in &self.attributes {
            if key == "class" {
                for class in value.split_whitespace() {
                    matcher = matcher.class(class);
                }
            } else {
                matcher = matcher.attribute_equals(key.as_str(), value.as_str());
            }
        }
        matcher
    }
}

fn decorator_element(attributes: &BTreeMap<String, String>) -> ViewElement {
    let mut element =
        ViewElement::attribute("a", LINK_PRIORITY).with_custom(LINK_CUSTOM_PROPERTY, true);
    for (key, value) in attributes {
        if key == "class" {
            for class in value.split_whitespace() {
                element = element.with_class(class);
            }
        } else {
            element = element.with_attr(key.as_str(), value.as_str());
        }
    }
    element
}

#[derive(Debug, Clone, Copy)]
pub enum Decorator<'a> {
    Automatic(&'a AutomaticDecorator),
    Manual(&'a ManualDecorator),
}

impl Decorator<'_> {
    pub fn id(&self) -> &str {
        match self {
            Decorator::Automatic(decorator) => &decorator.id,
            Decorator::Manual(decorator) => &decorator.id,
        }
    }
}

#[derive(Debug, Default)]
pub struct LinkDecorators {
    automatic: Vec<AutomaticDecorator>,
    manual: Vec<ManualDecorator>,
}

impl LinkDecorators {
    pub fn from_config(config: &LinkConfig) -> Result<Self, DecoratorConfigError> {
        let mut decorators = Self::default();
        let mut seen = BTreeSet::new();

        for (key, definition) in &config.decorators {
            match definition {
                DecoratorDefinition::Automatic(def) => {
                    let id = def.id.clone().unwrap_or_else(|| key.clone());
                    check_id(key, &id, &mut seen)?;
                    if def.attributes.is_empty() {
                        log::warn!("dropping automatic link decorator {id}: no attributes");
                        continue;
                    }
                    decorators.automatic.push(AutomaticDecorator {
                        id,
                        predicate: def.predicate.clone(),
                        attributes: def.attributes.clone(),
                    });
                }
                DecoratorDefinition::Manual(def) => {
                    let id = def.id.clone().unwrap_or_else(|| key.clone());
                    check_id(key, &id, &mut seen)?;
                    if def.attributes.is_empty() {
                        return Err(DecoratorConfigError::ManualWithoutAttributes(id));
                    }
                    decorators.manual.push(ManualDecorator {
                        id,
                        label: def.label.clone(),
                        default_value: def.default_value,
                        attributes: def.attributes.clone(),
                        value: Cell::new(None),
                    });
                }
            }
        }

        Ok(decorators)
    }

    pub fn automatic(&self) -> &[AutomaticDecorator] {
        &self.automatic
    }

    pub fn manual(&self) -> &[ManualDecorator] {
        &self.manual
    }

    pub fn manual_by_id(&self, id: &str) -> Option<&ManualDecorator> {
        self.manual.iter().find(|decorator| decorator.id == id)
    }

    pub fn get(&self, id: &str) -> Option<Decorator<'_>> {
        self.iter().find(|decorator| decorator.id() == id)
    }

    /// Automatic decorators first, then manual ones.
    pub fn iter(&self) -> impl Iterator<Item = Decorator<'_>> {
        self.automatic
            .iter()
            .map(Decorator::Automatic)
            .chain(self.manual.iter().map(Decorator::Manual))
    }

    pub fn is_empty(&self) -> bool {
        self.automatic.is_empty() && self.manual.is_empty()
    }
}

fn check_id(key: &str, id: &str, seen: &mut BTreeSet<String>) -> Result<(), DecoratorConfigError> {
    if id.is_empty() {
        return Err(DecoratorConfigError::EmptyId(key.to_string()));
    }
    if id == LINK_ATTRIBUTE {
        return Err(DecoratorConfigError::ReservedId(id.to_string()));
    }
    if !seen.insert(id.to_string()) {
        return Err(DecoratorConfigError::DuplicateId(id.to_string()));
    }
    Ok(())
}
