use std::collections::BTreeMap;
use std::rc::Rc;

use plate_core::{
    CommandError, CommandSpec, CommandState, Editor, Op, Point, QueryError, QuerySpec, Selection,
    TextRange, Transaction,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::decorators::LinkDecorators;
use crate::range::find_link_range;
use crate::{LINK_ATTRIBUTE, LINK_COMMAND, SET_DECORATOR_COMMAND, UNLINK_COMMAND};

/// Arguments of the link command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkArgs {
    pub target: String,
    /// Text inserted for a collapsed selection outside a link. Defaults to
    /// the target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Explicit manual decorator states, by decorator id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub decorators: BTreeMap<String, bool>,
}

impl LinkArgs {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            label: None,
            decorators: BTreeMap::new(),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn decorator(mut self, id: impl Into<String>, value: bool) -> Self {
        self.decorators.insert(id.into(), value);
        self
    }
}

#[derive(Debug, Deserialize)]
struct SetDecoratorArgs {
    id: String,
    #[serde(default)]
    value: Option<bool>,
}

fn parse_args<T: DeserializeOwned>(args: Option<Value>) -> Result<T, CommandError> {
    let Some(args) = args else {
        return Err(CommandError::InvalidArgs("missing arguments".to_string()));
    };
    serde_json::from_value(args).map_err(|err| CommandError::InvalidArgs(err.to_string()))
}

fn current_link(editor: &Editor) -> Option<String> {
    editor
        .selection_attributes()
        .get(LINK_ATTRIBUTE)
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub(crate) fn link_commands(decorators: &Rc<LinkDecorators>) -> Vec<CommandSpec> {
    let link_decorators = decorators.clone();
    let unlink_decorators = decorators.clone();
    let pending_decorators = decorators.clone();

    vec![
        CommandSpec::new(LINK_COMMAND, "Link", move |editor, args| {
            let args: LinkArgs = parse_args(args)?;
            link(editor, &link_decorators, args)
        })
        .description("Link the selection to a document element.")
        .keywords(["link", "internal", "anchor"])
        .args_example(json!({ "target": "T1", "label": "Chapter 1" }))
        .refresh(|editor| {
            CommandState::enabled(current_link(editor).map(Value::from).unwrap_or(Value::Null))
        }),
        CommandSpec::new(UNLINK_COMMAND, "Unlink", move |editor, _args| {
            unlink(editor, &unlink_decorators)
        })
        .description("Remove the link at the selection.")
        .keywords(["unlink", "link"])
        .refresh(|editor| {
            if current_link(editor).is_some() {
                CommandState::enabled(Value::Null)
            } else {
                CommandState::disabled(Value::Null)
            }
        }),
        CommandSpec::new(SET_DECORATOR_COMMAND, "Set link decorator", move |_editor, args| {
            let args: SetDecoratorArgs = parse_args(args)?;
            let Some(decorator) = pending_decorators.manual_by_id(&args.id) else {
                return Err(CommandError::InvalidArgs(format!(
                    "unknown manual decorator: {}",
                    args.id
                )));
            };
            decorator.set_value(args.value);
            Ok(())
        })
        .args_example(json!({ "id": "openInNewTab", "value": true }))
        .hidden(true),
    ]
}

fn link(
    editor: &mut Editor,
    decorators: &LinkDecorators,
    args: LinkArgs,
) -> Result<(), CommandError> {
    if args.target.is_empty() {
        return Err(CommandError::InvalidArgs("link target is empty".to_string()));
    }
    if let Some(unknown) = args
        .decorators
        .keys()
        .find(|id| decorators.manual_by_id(id).is_none())
    {
        return Err(CommandError::InvalidArgs(format!(
            "unknown manual decorator: {unknown}"
        )));
    }

    // A retargeted link keeps the decorators nobody asked to change.
    let chosen: Vec<(&str, Option<bool>)> = decorators
        .manual()
        .iter()
        .map(|decorator| {
            let explicit = args.decorators.get(&decorator.id).copied();
            (decorator.id.as_str(), explicit.or(decorator.value()))
        })
        .collect();
    let states: Vec<(&str, Option<bool>)> = decorators
        .manual()
        .iter()
        .map(|decorator| {
            let explicit = args.decorators.get(&decorator.id).copied();
            (decorator.id.as_str(), Some(decorator.resolve(explicit)))
        })
        .collect();
    let target = Value::from(args.target.as_str());
    let selection = editor.selection().clone();

    let tx = if !selection.is_collapsed() {
        let ops = editor
            .selection_ranges()
            .iter()
            .filter(|range| !range.is_collapsed())
            .flat_map(|range| link_ops(range, &target, &states))
            .collect();
        Transaction::new(ops)
    } else if let Some(current) = current_link(editor) {
        let range = find_link_range(editor.doc(), &selection.focus, &current);
        Transaction::new(link_ops(&range, &target, &chosen))
    } else {
        let position = selection.focus;
        let label = args
            .label
            .filter(|label| !label.is_empty())
            .unwrap_or(args.target);

        let mut attrs = editor.selection_attributes();
        attrs.insert(LINK_ATTRIBUTE.to_string(), target);
        for (id, enabled) in &states {
            if *enabled == Some(true) {
                attrs.insert(id.to_string(), Value::Bool(true));
            } else {
                attrs.remove(*id);
            }
        }

        let caret = Point::new(position.path.clone(), position.offset + label.len());
        Transaction::new(vec![Op::insert_text(
            position.path,
            position.offset,
            label,
            attrs,
        )])
        .selection_after(Selection::collapsed(caret))
        // Typing right after a fresh link continues outside of it.
        .override_gravity(true)
    };

    editor.apply(tx.source(LINK_COMMAND))?;
    Ok(())
}

/// Sets the link target and the manual decorator states over `range`. A
/// decorator set to `false` is removed rather than stored; one without a
/// state is left as it is.
fn link_ops(range: &TextRange, target: &Value, states: &[(&str, Option<bool>)]) -> Vec<Op> {
    let mut ops = vec![Op::set_attribute(
        range.path.clone(),
        range.range.clone(),
        LINK_ATTRIBUTE,
        target.clone(),
    )];
    for (id, enabled) in states {
        match enabled {
            Some(true) => {
                ops.push(Op::set_attribute(range.path.clone(), range.range.clone(), *id, true))
            }
            Some(false) => {
                ops.push(Op::remove_attribute(range.path.clone(), range.range.clone(), *id))
            }
            None => {}
        }
    }
    ops
}

fn unlink(editor: &mut Editor, decorators: &LinkDecorators) -> Result<(), CommandError> {
    let ranges = if editor.selection().is_collapsed() {
        let Some(current) = current_link(editor) else {
            return Err(CommandError::Disabled(UNLINK_COMMAND.to_string()));
        };
        vec![find_link_range(
            editor.doc(),
            &editor.selection().focus,
            &current,
        )]
    } else {
        editor.selection_ranges()
    };

    let keys: Vec<&str> = std::iter::once(LINK_ATTRIBUTE)
        .chain(decorators.manual().iter().map(|d| d.id.as_str()))
        .collect();
    let ops: Vec<Op> = ranges
        .iter()
        .filter(|range| !range.is_collapsed())
        .flat_map(|range| {
            keys.iter()
                .map(move |key| Op::remove_attribute(range.path.clone(), range.range.clone(), *key))
        })
        .collect();

    editor.apply(Transaction::new(ops).source(UNLINK_COMMAND))?;
    Ok(())
}

pub(crate) fn link_queries(decorators: &Rc<LinkDecorators>) -> Vec<QuerySpec> {
    let decorators = decorators.clone();
    vec![
        QuerySpec::new("link.value", |editor, _args| {
            Ok(current_link(editor).map(Value::from).unwrap_or(Value::Null))
        }),
        QuerySpec::new("link.is_active", |editor, _args| {
            Ok(Value::Bool(current_link(editor).is_some()))
        }),
        // Inside a link: what the link carries. Elsewhere: what a new link
        // would get.
        QuerySpec::new("link.decorator_states", move |editor, _args| {
            let attrs = editor.selection_attributes();
            let in_link = attrs.contains_key(LINK_ATTRIBUTE);
            let states: BTreeMap<&str, bool> = decorators
                .manual()
                .iter()
                .map(|decorator| {
                    let state = if in_link {
                        attrs.get(&decorator.id) == Some(&Value::Bool(true))
                    } else {
                        decorator.resolve(None)
                    };
                    (decorator.id.as_str(), state)
                })
                .collect();
            serde_json::to_value(states).map_err(|err| QueryError::Failed(err.to_string()))
        }),
    ]
}
