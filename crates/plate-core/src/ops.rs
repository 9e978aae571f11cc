use std::ops::Range;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{AttrPatch, Attrs, Node, Selection, TextNode};

pub type Path = Vec<usize>;

/// A single document mutation. Text ops address a text block by `path` and
/// use byte offsets into the block's concatenated text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    InsertText {
        #[serde(default)]
        path: Path,
        offset: usize,
        nodes: Vec<TextNode>,
    },
    RemoveText {
        #[serde(default)]
        path: Path,
        range: Range<usize>,
    },
    SetAttribute {
        #[serde(default)]
        path: Path,
        range: Range<usize>,
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
    InsertNode {
        #[serde(default)]
        path: Path,
        node: Node,
    },
    RemoveNode {
        #[serde(default)]
        path: Path,
    },
    SetNodeAttrs {
        #[serde(default)]
        path: Path,
        patch: AttrPatch,
    },
}

impl Op {
    pub fn insert_text(path: Path, offset: usize, text: impl Into<String>, attrs: Attrs) -> Self {
        Op::InsertText {
            path,
            offset,
            nodes: vec![TextNode {
                text: text.into(),
                attrs,
            }],
        }
    }

    pub fn set_attribute(
        path: Path,
        range: Range<usize>,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Op::SetAttribute {
            path,
            range,
            key: key.into(),
            value: Some(value.into()),
        }
    }

    pub fn remove_attribute(path: Path, range: Range<usize>, key: impl Into<String>) -> Self {
        Op::SetAttribute {
            path,
            range,
            key: key.into(),
            value: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub ops: Vec<Op>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_after: Option<Selection>,
    /// Keep the caret's attributes from the text after it once the batch
    /// commits, instead of resetting to default gravity.
    #[serde(default)]
    pub override_gravity: bool,
    #[serde(default)]
    pub meta: TransactionMeta,
}

impl Transaction {
    pub fn new(ops: Vec<Op>) -> Self {
        Self {
            ops,
            selection_after: None,
            override_gravity: false,
            meta: TransactionMeta::default(),
        }
    }

    pub fn selection_after(mut self, selection_after: Selection) -> Self {
        self.selection_after = Some(selection_after);
        self
    }

    pub fn override_gravity(mut self, override_gravity: bool) -> Self {
        self.override_gravity = override_gravity;
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.meta.source = Some(source.into());
        self
    }
}
