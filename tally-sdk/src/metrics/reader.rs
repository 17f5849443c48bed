//! Interfaces for reading and producing metrics
use std::{fmt, sync::Weak, time::Duration};

use crate::{error::SdkResult, metrics::MetricResult};

use super::{data::ResourceMetrics, pipeline::Pipeline};

/// The interface between a meter provider and whatever consumes its metrics.
///
/// Control flow is bi-directional: the provider initiates `force_flush` and
/// `shutdown`, while the reader initiates collection. `register_pipeline`
/// hands the reader the provider's pipeline and is the signal that it can
/// start reading.
///
/// [`PeriodicReader`](super::PeriodicReader) pushes to an exporter on a
/// timer; [`ManualReader`](super::ManualReader) collects on demand.
pub trait MetricReader: fmt::Debug + Send + Sync + 'static {
    /// Binds the reader to a provider's [`Pipeline`].
    ///
    /// A reader can be bound once. Binding it again, to the same or another
    /// provider, fails with
    /// [`MetricError::ReaderAlreadyAttached`](super::MetricError::ReaderAlreadyAttached).
    fn register_pipeline(&self, pipeline: Weak<Pipeline>) -> MetricResult<()>;

    /// Runs the observable callbacks and returns a cumulative snapshot of
    /// every instrument with data.
    ///
    /// An error is returned if this is called before registration or after
    /// shutdown.
    fn collect(&self) -> MetricResult<ResourceMetrics>;

    /// Exports whatever the reader would export on its next cycle, now.
    fn force_flush(&self) -> SdkResult;

    /// Flushes and releases the reader's resources. Calling it again is a
    /// no-op that succeeds.
    ///
    /// After shutdown, [`collect`](MetricReader::collect) returns an error.
    fn shutdown_with_timeout(&self, timeout: Duration) -> SdkResult;

    /// [`shutdown_with_timeout`](MetricReader::shutdown_with_timeout) with a
    /// five second limit.
    fn shutdown(&self) -> SdkResult {
        self.shutdown_with_timeout(Duration::from_secs(5))
    }
}

/// Produces metrics for a [`MetricReader`].
pub(crate) trait SdkProducer: fmt::Debug + Send + Sync {
    /// Returns aggregated metrics from a single collection.
    fn produce(&self) -> MetricResult<ResourceMetrics>;
}
