use core::fmt;
use std::sync::Arc;

use tally::KeyValue;

use crate::metrics::MetricResult;

use super::ResolvedInstrument;

/// An instrument that records increasing values.
///
/// [`Counter`] can be cloned to create multiple handles to the same
/// instrument. Clone a handle rather than building the same counter again.
#[derive(Clone)]
pub struct Counter(Arc<ResolvedInstrument>);

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("Counter({})", self.0.name))
    }
}

impl Counter {
    pub(crate) fn new(inner: Arc<ResolvedInstrument>) -> Self {
        Counter(inner)
    }

    /// Records an increment to the counter.
    ///
    /// Fails with [`InvalidMeasurement`](crate::metrics::MetricError::InvalidMeasurement)
    /// for negative or non-finite values and with
    /// [`InvalidAttributeValue`](crate::metrics::MetricError::InvalidAttributeValue)
    /// for non-scalar attributes. Nothing is recorded on error.
    pub fn add(&self, value: f64, attributes: &[KeyValue]) -> MetricResult<()> {
        self.0.measure(value, attributes)
    }
}

/// An asynchronous instrument that reports increasing totals from its
/// callbacks.
///
/// The handle only keeps the registration alive for inspection; the
/// callbacks run for as long as the provider does.
#[derive(Clone)]
pub struct ObservableCounter(Arc<ResolvedInstrument>);

impl ObservableCounter {
    pub(crate) fn new(inner: Arc<ResolvedInstrument>) -> Self {
        ObservableCounter(inner)
    }
}

impl fmt::Debug for ObservableCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("ObservableCounter({})", self.0.name))
    }
}
