//! Interfaces for exporting metrics

use std::{future::Future, time::Duration};

use crate::error::SdkResult;

use super::data::ResourceMetrics;

/// Delivers collected metrics to an external receiver.
///
/// This is the final component in the push pipeline; a
/// [`PeriodicReader`](super::PeriodicReader) drives it.
pub trait PushMetricExporter: Send + Sync + 'static {
    /// Serializes and transmits one cumulative snapshot.
    ///
    /// All retry logic must be contained in this function. Errors are
    /// logged by the reader and do not stop later cycles.
    ///
    /// The reader waits for the returned future at most for its export
    /// timeout. A future still pending by then is abandoned, not cancelled:
    /// it keeps running on the reader's export thread, and the reader skips
    /// cycles until it completes.
    fn export(&self, metrics: &ResourceMetrics) -> impl Future<Output = SdkResult> + Send;

    /// Flushes any metric data held by the exporter.
    fn force_flush(&self) -> SdkResult;

    /// Releases any held computational resources.
    ///
    /// After shutdown, calls to `export` should fail.
    fn shutdown_with_timeout(&self, timeout: Duration) -> SdkResult;

    /// Shutdown with the default timeout of 5 seconds.
    fn shutdown(&self) -> SdkResult {
        self.shutdown_with_timeout(Duration::from_secs(5))
    }
}
