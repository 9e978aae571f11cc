use std::collections::BTreeSet;

use crate::core::Node;
use crate::inline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaretDirection {
    Forward,
    Backward,
}

/// Outcome of a single caret step at a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaretStep {
    /// Move the caret by one character.
    Move,
    /// Stay in place and set the gravity flag to the given value.
    Gravity(bool),
}

/// Two-step caret movement across attribute boundaries.
///
/// At the edge of a registered attribute the first step only flips which side
/// the caret takes its attributes from; the second step moves.
#[derive(Debug, Clone, Default)]
pub struct TwoStepCaretMovement {
    attributes: BTreeSet<String>,
}

impl TwoStepCaretMovement {
    pub fn register_attribute(&mut self, key: impl Into<String>) {
        self.attributes.insert(key.into());
    }

    pub fn is_at_boundary(&self, children: &[Node], offset: usize) -> bool {
        if self.attributes.is_empty() || offset == 0 {
            return false;
        }
        let len = inline::text_len(children);
        if offset > len {
            return false;
        }

        let before = inline::attrs_before(children, offset);
        if offset == len {
            return before
                .is_some_and(|attrs| self.attributes.iter().any(|k| attrs.contains_key(k)));
        }

        let after = inline::attrs_after(children, offset);
        self.attributes
            .iter()
            .any(|k| before.and_then(|a| a.get(k)) != after.and_then(|a| a.get(k)))
    }

    pub fn step(
        &self,
        children: &[Node],
        offset: usize,
        direction: CaretDirection,
        gravity_overridden: bool,
    ) -> CaretStep {
        if !self.is_at_boundary(children, offset) {
            return CaretStep::Move;
        }
        match (direction, gravity_overridden) {
            (CaretDirection::Forward, false) => CaretStep::Gravity(true),
            (CaretDirection::Backward, true) => CaretStep::Gravity(false),
            _ => CaretStep::Move,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TextNode;

    fn linked_block() -> Vec<Node> {
        vec![
            Node::Text(TextNode::new("ab")),
            Node::Text(TextNode::new("cd").with_attr("linkId", "T1")),
        ]
    }

    #[test]
    fn boundaries_sit_at_attribute_edges() {
        let mut caret = TwoStepCaretMovement::default();
        caret.register_attribute("linkId");
        let children = linked_block();

        assert!(!caret.is_at_boundary(&children, 0));
        assert!(!caret.is_at_boundary(&children, 1));
        assert!(caret.is_at_boundary(&children, 2));
        assert!(!caret.is_at_boundary(&children, 3));
        assert!(caret.is_at_boundary(&children, 4));
    }

    #[test]
    fn unregistered_attributes_never_form_boundaries() {
        let caret = TwoStepCaretMovement::default();
        assert!(!caret.is_at_boundary(&linked_block(), 2));
        assert_eq!(
            caret.step(&linked_block(), 2, CaretDirection::Forward, false),
            CaretStep::Move
        );
    }
}
