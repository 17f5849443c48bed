//! Shared vocabulary of the tally metrics engine.
//!
//! This crate holds the pieces every other part of the engine speaks in:
//!
//! * [`Key`], [`Value`] and [`KeyValue`], the attribute pairs callers attach
//!   to measurements.
//! * [`AttributeSet`], the immutable, order-independent identity of a single
//!   time series within an instrument.
//! * [`InstrumentationScope`], the identity of a meter (name, version and
//!   schema URL).
//! * The `tally_debug!`, `tally_info!`, `tally_warn!` and `tally_error!`
//!   macros used for the engine's own diagnostics.
//!
//! The aggregation engine itself lives in the `tally_sdk` crate.
//!
//! # Example
//!
//! ```
//! use tally::{AttributeSet, KeyValue};
//!
//! let a = AttributeSet::try_from(&[KeyValue::new("path", "/a"), KeyValue::new("code", 200_i64)][..])
//!     .unwrap();
//! let b = AttributeSet::try_from(&[KeyValue::new("code", 200_i64), KeyValue::new("path", "/a")][..])
//!     .unwrap();
//! assert_eq!(a, b);
//! ```
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod attributes;
mod common;
mod internal_logging;

pub use attributes::{AttributeSet, InvalidAttributeValue};
pub use common::{
    Array, InstrumentationScope, InstrumentationScopeBuilder, Key, KeyValue, StringValue, Value,
};

#[cfg(feature = "internal-logs")]
#[doc(hidden)]
pub mod _private {
    pub use tracing::{debug, error, info, warn};
}
