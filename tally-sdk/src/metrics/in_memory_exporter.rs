use crate::error::{SdkError, SdkResult};
use crate::metrics::data::ResourceMetrics;
use crate::metrics::exporter::PushMetricExporter;
use crate::metrics::MetricError;
use crate::metrics::MetricResult;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// An in-memory metrics exporter that stores metrics data in memory.
///
/// This exporter is useful for testing and debugging purposes. It stores
/// every exported snapshot in a `VecDeque<ResourceMetrics>`. Clones share
/// the same storage, so a test can hand one clone to a
/// [`PeriodicReader`](crate::metrics::PeriodicReader) and inspect another.
///
/// # Example
///
/// ```
/// # use tally_sdk::metrics::{InMemoryMetricExporter, PeriodicReader, SdkMeterProvider};
/// let exporter = InMemoryMetricExporter::default();
/// let reader = PeriodicReader::builder(exporter.clone()).build();
/// let provider = SdkMeterProvider::builder().with_reader(reader).build();
///
/// let counter = provider.meter("example").f64_counter("requests").build().unwrap();
/// counter.add(1.0, &[]).unwrap();
/// provider.force_flush().unwrap();
///
/// let exported = exporter.get_finished_metrics().unwrap();
/// assert_eq!(exported[0].scope_metrics[0].metrics[0].name, "requests");
/// ```
#[derive(Clone, Default)]
pub struct InMemoryMetricExporter {
    metrics: Arc<Mutex<VecDeque<ResourceMetrics>>>,
    is_shutdown: Arc<AtomicBool>,
}

impl fmt::Debug for InMemoryMetricExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryMetricExporter").finish()
    }
}

impl InMemoryMetricExporter {
    /// Returns the finished metrics as a vector of `ResourceMetrics`, oldest
    /// first.
    ///
    /// # Errors
    ///
    /// Returns a `MetricError` if the internal lock cannot be acquired.
    pub fn get_finished_metrics(&self) -> MetricResult<Vec<ResourceMetrics>> {
        self.metrics
            .lock()
            .map(|metrics_guard| metrics_guard.iter().cloned().collect())
            .map_err(MetricError::from)
    }

    /// Clears the internal storage of finished metrics.
    pub fn reset(&self) {
        let _ = self
            .metrics
            .lock()
            .map(|mut metrics_guard| metrics_guard.clear());
    }

    /// Whether `shutdown` has been called on any clone.
    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown.load(Ordering::Relaxed)
    }
}

impl PushMetricExporter for InMemoryMetricExporter {
    async fn export(&self, metrics: &ResourceMetrics) -> SdkResult {
        if self.is_shutdown() {
            return Err(SdkError::AlreadyShutdown);
        }
        self.metrics
            .lock()
            .map(|mut metrics_guard| metrics_guard.push_back(metrics.clone()))
            .map_err(|_| SdkError::InternalFailure("Failed to lock metrics".to_string()))
    }

    fn force_flush(&self) -> SdkResult {
        Ok(()) // In this implementation, flush does nothing
    }

    fn shutdown_with_timeout(&self, _timeout: Duration) -> SdkResult {
        self.is_shutdown.store(true, Ordering::Relaxed);
        Ok(())
    }
}
