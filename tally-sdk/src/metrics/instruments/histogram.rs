use core::fmt;
use std::sync::Arc;

use tally::KeyValue;

use crate::metrics::MetricResult;

use super::ResolvedInstrument;

/// An instrument that records a distribution of values.
///
/// [`Histogram`] can be cloned to create multiple handles to the same
/// instrument.
#[derive(Clone)]
pub struct Histogram(Arc<ResolvedInstrument>);

impl fmt::Debug for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("Histogram({})", self.0.name))
    }
}

impl Histogram {
    pub(crate) fn new(inner: Arc<ResolvedInstrument>) -> Self {
        Histogram(inner)
    }

    /// Adds an additional value to the distribution.
    ///
    /// Negative values are accepted; non-finite values are rejected.
    pub fn record(&self, value: f64, attributes: &[KeyValue]) -> MetricResult<()> {
        self.0.measure(value, attributes)
    }
}
