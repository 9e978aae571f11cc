mod caret;
mod conversion;
mod core;
mod differ;
pub mod inline;
mod markup;
mod ops;
mod plugin;
pub mod view;

pub use crate::caret::*;
pub use crate::conversion::*;
pub use crate::core::*;
pub use crate::markup::DataError;
pub use crate::ops::*;
pub use crate::plugin::*;
pub use crate::view::{ViewDocument, ViewElement, ViewElementId, ViewNode, ViewRange, to_view_range};
