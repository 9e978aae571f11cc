use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::Deserialize;

/// Link plugin configuration, in the shape host editors already use:
///
/// ```json
/// { "decorators": { "openInNewTab": { "mode": "manual", "label": "Open in a new tab",
///   "defaultValue": true, "attributes": { "target": "_blank" } } } }
/// ```
///
/// Declaration order is kept; it is the order decorators are registered in.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkConfig {
    #[serde(default)]
    pub decorators: IndexMap<String, DecoratorDefinition>,
}

impl LinkConfig {
    pub fn manual<I, K, V>(
        mut self,
        key: impl Into<String>,
        label: impl Into<String>,
        default_value: bool,
        attributes: I,
    ) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.decorators.insert(
            key.into(),
            DecoratorDefinition::Manual(ManualDefinition {
                id: None,
                label: label.into(),
                default_value,
                attributes: collect_attributes(attributes),
            }),
        );
        self
    }

    pub fn automatic<I, K, V>(
        mut self,
        key: impl Into<String>,
        predicate: impl Fn(Option<&str>) -> bool + 'static,
        attributes: I,
    ) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.decorators.insert(
            key.into(),
            DecoratorDefinition::Automatic(AutomaticDefinition {
                id: None,
                predicate: TargetPredicate::custom(predicate),
                attributes: collect_attributes(attributes),
            }),
        );
        self
    }
}

fn collect_attributes<I, K, V>(attributes: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    attributes
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum DecoratorDefinition {
    Automatic(AutomaticDefinition),
    Manual(ManualDefinition),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomaticDefinition {
    /// Defaults to the key the definition is declared under.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(alias = "callback")]
    pub predicate: TargetPredicate,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualDefinition {
    #[serde(default)]
    pub id: Option<String>,
    pub label: String,
    #[serde(default)]
    pub default_value: bool,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// Decides from the link target whether an automatic decorator applies.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetPredicate {
    Prefix(String),
    Equals(String),
    /// Any link at all.
    Any,
    #[serde(skip)]
    Custom(Rc<dyn Fn(Option<&str>) -> bool>),
}

impl TargetPredicate {
    pub fn custom(predicate: impl Fn(Option<&str>) -> bool + 'static) -> Self {
        TargetPredicate::Custom(Rc::new(predicate))
    }

    pub fn matches(&self, target: Option<&str>) -> bool {
        match self {
            TargetPredicate::Prefix(prefix) => {
                target.is_some_and(|t| t.starts_with(prefix.as_str()))
            }
            TargetPredicate::Equals(want) => target == Some(want.as_str()),
            TargetPredicate::Any => target.is_some(),
            TargetPredicate::Custom(predicate) => predicate(target),
        }
    }
}

impl fmt::Debug for TargetPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetPredicate::Prefix(prefix) => f.debug_tuple("Prefix").field(prefix).finish(),
            TargetPredicate::Equals(want) => f.debug_tuple("Equals").field(want).finish(),
            TargetPredicate::Any => f.write_str("Any"),
            TargetPredicate::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
