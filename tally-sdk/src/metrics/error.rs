use std::result;
use std::sync::PoisonError;
use thiserror::Error;

use super::InstrumentKind;

/// A specialized `Result` type for metric operations.
pub type MetricResult<T> = result::Result<T, MetricError>;

/// Errors returned synchronously by the metrics API.
///
/// Failures that happen while exporting are not part of this type. Readers
/// log those and report them as [`SdkError`](crate::error::SdkError) from
/// explicit flush and shutdown calls.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MetricError {
    /// An attribute value was not a scalar. Nothing was recorded.
    #[error(transparent)]
    InvalidAttributeValue(#[from] tally::InvalidAttributeValue),

    /// The measurement was rejected before touching any aggregator.
    #[error("invalid measurement {value}: {reason}")]
    InvalidMeasurement {
        /// The rejected value.
        value: f64,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Strict creation found an instrument with the same name in the meter.
    #[error("an instrument named `{0}` already exists in this meter")]
    DuplicateInstrumentName(String),

    /// The name is registered in the meter with a different kind.
    #[error("instrument `{name}` is already registered as {existing:?}, not {requested:?}")]
    InstrumentKindConflict {
        /// Name of the instrument.
        name: String,
        /// Kind of the instrument already registered.
        existing: InstrumentKind,
        /// Kind that was asked for.
        requested: InstrumentKind,
    },

    /// Invalid instrument configuration such as a malformed name or unit.
    #[error("Invalid instrument configuration: {0}")]
    InvalidInstrumentConfiguration(&'static str),

    /// Invalid view, stream or aggregation configuration.
    #[error("Config error {0}")]
    Config(String),

    /// The reader is already bound to a meter provider.
    #[error("reader is already attached to a meter provider")]
    ReaderAlreadyAttached,

    /// The reader has not been attached to a meter provider yet.
    #[error("reader is not attached to a meter provider")]
    ReaderNotRegistered,

    /// The provider or reader was shut down.
    #[error("already shut down")]
    AlreadyShutdown,

    /// Other errors not covered by specific cases.
    #[error("Metrics error: {0}")]
    Other(String),
}

impl<T> From<PoisonError<T>> for MetricError {
    fn from(err: PoisonError<T>) -> Self {
        MetricError::Other(err.to_string())
    }
}
