use plate_core::inline;
use plate_core::{Document, Point, TextRange};
use serde_json::Value;

use crate::LINK_ATTRIBUTE;

/// Maximal span around `position` whose text carries `key == value`.
///
/// Walks across leaf splits in both directions. When `position` does not
/// touch such text the result is the collapsed range at `position`.
pub fn find_attribute_range(
    doc: &Document,
    position: &Point,
    key: &str,
    value: &Value,
) -> TextRange {
    let collapsed = TextRange::collapsed_at(position);
    let Some(block) = doc.element(&position.path) else {
        log::debug!("range lookup outside any text block at {:?}", position.path);
        return collapsed;
    };

    let runs = inline::runs(&block.children);
    let carries = |ix: usize| runs[ix].1.get(key) == Some(value);
    let offset = position.offset;

    let Some(hit) = (0..runs.len())
        .find(|&ix| runs[ix].0.start <= offset && offset <= runs[ix].0.end && carries(ix))
    else {
        log::debug!("no {key}={value} around offset {offset} of {:?}", position.path);
        return collapsed;
    };

    let mut first = hit;
    while first > 0 && carries(first - 1) {
        first -= 1;
    }
    let mut last = hit;
    while last + 1 < runs.len() && carries(last + 1) {
        last += 1;
    }

    TextRange::new(position.path.clone(), runs[first].0.start..runs[last].0.end)
}

/// The whole link with target `target` that `position` touches.
pub fn find_link_range(doc: &Document, position: &Point, target: &str) -> TextRange {
    find_attribute_range(doc, position, LINK_ATTRIBUTE, &Value::from(target))
}
