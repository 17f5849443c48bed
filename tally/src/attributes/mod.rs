//! Order-independent attribute sets.
mod set;

pub use set::{AttributeSet, InvalidAttributeValue};
