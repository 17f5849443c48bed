use std::{
    fmt,
    sync::{Arc, Mutex, Weak},
    time::Duration,
};

use crate::error::{SdkError, SdkResult};

use super::{
    data::ResourceMetrics,
    pipeline::Pipeline,
    reader::{MetricReader, SdkProducer},
    MetricError, MetricResult,
};

/// A [`MetricReader`] that collects only when asked to.
///
/// Clones share state, so an application can attach one clone to a
/// provider and keep another to call [`collect`](MetricReader::collect).
///
/// # Example
///
/// ```
/// use tally_sdk::metrics::{ManualReader, MetricReader, SdkMeterProvider};
///
/// let reader = ManualReader::new();
/// let provider = SdkMeterProvider::builder()
///     .with_reader(reader.clone())
///     .build();
///
/// let counter = provider.meter("app").f64_counter("requests").build().unwrap();
/// counter.add(1.0, &[]).unwrap();
///
/// let metrics = reader.collect().unwrap();
/// assert_eq!(metrics.scope_metrics.len(), 1);
/// ```
#[derive(Clone, Default)]
pub struct ManualReader {
    inner: Arc<Mutex<ManualReaderInner>>,
}

impl fmt::Debug for ManualReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ManualReader")
    }
}

#[derive(Debug, Default)]
struct ManualReaderInner {
    sdk_producer: Option<Weak<Pipeline>>,
    is_shutdown: bool,
}

impl ManualReader {
    /// A reader that is not attached to any provider yet.
    pub fn new() -> Self {
        ManualReader::default()
    }
}

impl MetricReader for ManualReader {
    fn register_pipeline(&self, pipeline: Weak<Pipeline>) -> MetricResult<()> {
        let mut inner = self.inner.lock()?;
        if inner.is_shutdown {
            return Err(MetricError::AlreadyShutdown);
        }
        // Only register once.
        if inner.sdk_producer.is_some() {
            return Err(MetricError::ReaderAlreadyAttached);
        }
        inner.sdk_producer = Some(pipeline);
        Ok(())
    }

    /// Collections are serialized: a second caller waits for the first.
    fn collect(&self) -> MetricResult<ResourceMetrics> {
        let inner = self.inner.lock()?;
        if inner.is_shutdown {
            return Err(MetricError::AlreadyShutdown);
        }
        match inner.sdk_producer.as_ref().map(Weak::upgrade) {
            Some(Some(producer)) => producer.produce(),
            Some(None) => Err(MetricError::AlreadyShutdown),
            None => Err(MetricError::ReaderNotRegistered),
        }
    }

    /// Nothing is buffered, so there is nothing to flush.
    fn force_flush(&self) -> SdkResult {
        Ok(())
    }

    fn shutdown_with_timeout(&self, _timeout: Duration) -> SdkResult {
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| SdkError::InternalFailure(format!("Failed to acquire lock: {e}")))?;

        // Any future call to collect will now return an error.
        inner.sdk_producer = None;
        inner.is_shutdown = true;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Resource;

    #[test]
    fn lifecycle() {
        let reader = ManualReader::new();
        assert!(matches!(
            reader.collect(),
            Err(MetricError::ReaderNotRegistered)
        ));

        let pipeline = Arc::new(Pipeline::new(Resource::empty(), vec![]));
        reader.register_pipeline(Arc::downgrade(&pipeline)).unwrap();
        assert!(reader.collect().unwrap().scope_metrics.is_empty());

        assert!(matches!(
            reader.register_pipeline(Arc::downgrade(&pipeline)),
            Err(MetricError::ReaderAlreadyAttached)
        ));

        assert!(reader.shutdown().is_ok());
        assert!(reader.shutdown().is_ok());
        assert!(matches!(reader.collect(), Err(MetricError::AlreadyShutdown)));
    }

    #[test]
    fn clones_share_registration() {
        let reader = ManualReader::new();
        let pipeline = Arc::new(Pipeline::new(Resource::empty(), vec![]));
        reader.register_pipeline(Arc::downgrade(&pipeline)).unwrap();

        let clone = reader.clone();
        assert!(clone.collect().is_ok());
        assert!(matches!(
            clone.register_pipeline(Arc::downgrade(&pipeline)),
            Err(MetricError::ReaderAlreadyAttached)
        ));
    }

    #[test]
    fn dropped_pipeline() {
        let reader = ManualReader::new();
        let pipeline = Arc::new(Pipeline::new(Resource::empty(), vec![]));
        reader.register_pipeline(Arc::downgrade(&pipeline)).unwrap();
        drop(pipeline);
        assert!(matches!(reader.collect(), Err(MetricError::AlreadyShutdown)));
    }
}
