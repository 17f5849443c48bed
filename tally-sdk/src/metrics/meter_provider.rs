use core::fmt;
use std::{
    borrow::Cow,
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use tally::{tally_debug, tally_error, tally_info, tally_warn, InstrumentationScope};

use crate::error::{SdkError, SdkResult};
use crate::Resource;

use super::{
    meter::{Meter, SdkMeter},
    pipeline::Pipeline,
    reader::MetricReader,
    view::View,
    MetricError, MetricResult,
};

/// Handles the creation and coordination of [Meter]s.
///
/// All `Meter`s created by a `MeterProvider` will be associated with the
/// same [Resource], have the same [View]s applied to them, and have their
/// produced metric telemetry passed to the configured [MetricReader]s.
///
/// This is a cloneable handle to the provider. Calling `shutdown` on any
/// clone shuts the provider down for every clone. When the last clone is
/// dropped, shutdown runs automatically.
///
/// A provider is not installed as the process-wide active provider unless
/// passed to [`global::set_meter_provider`](crate::global::set_meter_provider).
#[derive(Clone, Debug)]
pub struct SdkMeterProvider {
    inner: Arc<SdkMeterProviderInner>,
}

#[derive(Debug)]
struct SdkMeterProviderInner {
    pipeline: Arc<Pipeline>,
    meters: Mutex<HashMap<InstrumentationScope, Arc<SdkMeter>>>,
    readers: Mutex<Vec<Box<dyn MetricReader>>>,
    shutdown_invoked: AtomicBool,
}

impl Default for SdkMeterProvider {
    fn default() -> Self {
        SdkMeterProvider::builder().build()
    }
}

impl SdkMeterProvider {
    /// Return default [MeterProviderBuilder]
    pub fn builder() -> MeterProviderBuilder {
        MeterProviderBuilder::default()
    }

    /// An empty provider for `resource`, without views or readers.
    pub fn new(resource: Resource) -> Self {
        SdkMeterProvider::builder().with_resource(resource).build()
    }

    /// The resource every collection of this provider reports.
    pub fn resource(&self) -> &Resource {
        &self.inner.pipeline.resource
    }

    /// Returns the meter named `name`, creating it on first use.
    pub fn meter(&self, name: impl Into<Cow<'static, str>>) -> Meter {
        self.meter_with_scope(InstrumentationScope::builder(name).build())
    }

    /// Returns the meter for a name, version and schema URL.
    pub fn versioned_meter(
        &self,
        name: impl Into<Cow<'static, str>>,
        version: Option<impl Into<Cow<'static, str>>>,
        schema_url: Option<impl Into<Cow<'static, str>>>,
    ) -> Meter {
        let mut builder = InstrumentationScope::builder(name);
        if let Some(version) = version {
            builder = builder.with_version(version);
        }
        if let Some(schema_url) = schema_url {
            builder = builder.with_schema_url(schema_url);
        }
        self.meter_with_scope(builder.build())
    }

    /// Returns the meter for `scope`, creating it on first use.
    ///
    /// After shutdown the returned meter is inert: its instruments validate
    /// measurements but nothing is aggregated.
    pub fn meter_with_scope(&self, scope: InstrumentationScope) -> Meter {
        if self.inner.shutdown_invoked.load(Ordering::Relaxed) {
            tally_debug!(
                name: "MeterProvider.InertMeterReturned",
                meter_name = scope.name().to_owned()
            );
            return Meter::new(Arc::new(SdkMeter::inert(scope)));
        }

        if scope.name().is_empty() {
            tally_info!(name: "MeterNameEmpty", message = "Meter name is empty; consider providing a meaningful name.");
        };

        match self.inner.meters.lock() {
            Ok(mut meters) => {
                if let Some(existing_meter) = meters.get(&scope) {
                    tally_debug!(
                        name: "MeterProvider.ExistingMeterReturned",
                        meter_name = scope.name().to_owned()
                    );
                    Meter::new(Arc::clone(existing_meter))
                } else {
                    let new_meter = Arc::new(SdkMeter::new(
                        scope.clone(),
                        Arc::clone(&self.inner.pipeline),
                    ));
                    tally_debug!(
                        name: "MeterProvider.NewMeterCreated",
                        meter_name = scope.name().to_owned()
                    );
                    meters.insert(scope, Arc::clone(&new_meter));
                    Meter::new(new_meter)
                }
            }
            Err(_) => {
                tally_debug!(
                    name: "MeterProvider.InertMeterReturned",
                    meter_name = scope.name().to_owned()
                );
                Meter::new(Arc::new(SdkMeter::inert(scope)))
            }
        }
    }

    /// Appends a view.
    ///
    /// Views apply only to instruments created afterwards. Instruments that
    /// already exist keep the stream they resolved when created.
    pub fn add_view<T: View>(&self, view: T) -> MetricResult<()> {
        if self.inner.shutdown_invoked.load(Ordering::Relaxed) {
            return Err(MetricError::AlreadyShutdown);
        }
        self.inner.pipeline.add_view(Arc::new(view))
    }

    /// Attaches a reader. A reader can be attached to one provider only.
    pub fn attach_reader<T: MetricReader>(&self, reader: T) -> MetricResult<()> {
        if self.inner.shutdown_invoked.load(Ordering::Relaxed) {
            return Err(MetricError::AlreadyShutdown);
        }
        let mut readers = self.inner.readers.lock()?;
        // Shutdown drains the list under this lock; a reader pushed after
        // that would never be shut down.
        if self.inner.shutdown_invoked.load(Ordering::SeqCst) {
            return Err(MetricError::AlreadyShutdown);
        }
        reader.register_pipeline(Arc::downgrade(&self.inner.pipeline))?;
        readers.push(Box::new(reader));
        Ok(())
    }

    /// Flushes all pending telemetry.
    ///
    /// Every reader is flushed even if an earlier one fails. Errors of
    /// individual readers are logged; the first one is returned.
    ///
    /// For a [`PeriodicReader`](super::PeriodicReader) the flush is its final
    /// cycle: the reader stops afterwards. Pull readers are unaffected.
    pub fn force_flush(&self) -> SdkResult {
        self.inner.force_flush()
    }

    /// Shuts down the meter provider, flushing all pending telemetry.
    ///
    /// Every reader is shut down and the meters are released. Calling it
    /// again, from this or any other clone, is a no-op returning `Ok`.
    pub fn shutdown(&self) -> SdkResult {
        self.shutdown_with_timeout(Duration::from_secs(5))
    }

    /// Shuts down the meter provider, giving each reader `timeout`.
    pub fn shutdown_with_timeout(&self, timeout: Duration) -> SdkResult {
        tally_info!(
            name: "MeterProvider.Shutdown",
            message = "User initiated shutdown of MeterProvider."
        );
        if !self.inner.shutdown_invoked.load(Ordering::Relaxed) {
            crate::global::detach(self);
        }
        self.inner.shutdown(timeout)
    }

    pub(crate) fn ptr_eq(&self, other: &SdkMeterProvider) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl SdkMeterProviderInner {
    fn force_flush(&self) -> SdkResult {
        if self.shutdown_invoked.load(Ordering::Relaxed) {
            return Err(SdkError::AlreadyShutdown);
        }
        let readers = self
            .readers
            .lock()
            .map_err(|e| SdkError::InternalFailure(e.to_string()))?;

        let mut result = Ok(());
        for reader in readers.iter() {
            if let Err(err) = reader.force_flush() {
                tally_warn!(
                    name: "MeterProvider.ForceFlushFailed",
                    reader = format!("{reader:?}"),
                    error = format!("{err}")
                );
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }

    fn shutdown(&self, timeout: Duration) -> SdkResult {
        if self.shutdown_invoked.swap(true, Ordering::SeqCst) {
            tally_debug!(name: "MeterProvider.AlreadyShutdown");
            return Ok(());
        }

        let readers = match self.readers.lock() {
            Ok(mut readers) => std::mem::take(&mut *readers),
            Err(e) => return Err(SdkError::InternalFailure(e.to_string())),
        };

        let mut result = Ok(());
        for reader in &readers {
            if let Err(err) = reader.shutdown_with_timeout(timeout) {
                tally_warn!(
                    name: "MeterProvider.ReaderShutdownFailed",
                    reader = format!("{reader:?}"),
                    error = format!("{err}")
                );
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }

        if let Ok(mut meters) = self.meters.lock() {
            meters.clear();
        }
        self.pipeline.clear();
        result
    }
}

impl Drop for SdkMeterProviderInner {
    fn drop(&mut self) {
        // If user has already shutdown the provider manually by calling
        // shutdown(), then we don't need to call shutdown again.
        if self.shutdown_invoked.load(Ordering::Relaxed) {
            tally_debug!(
                name: "MeterProvider.Drop.AlreadyShutdown",
                message = "MeterProvider was already shut down; drop will not attempt shutdown again."
            );
        } else {
            tally_info!(
                name: "MeterProvider.Drop",
                message = "Last reference of MeterProvider dropped, initiating shutdown."
            );
            if let Err(err) = self.shutdown(Duration::from_secs(5)) {
                tally_error!(
                    name: "MeterProvider.Drop.ShutdownFailed",
                    message = "Shutdown attempt failed during drop of MeterProvider.",
                    reason = format!("{}", err)
                );
            } else {
                tally_info!(name: "MeterProvider.Drop.ShutdownCompleted");
            }
        }
    }
}

/// Configuration options for a [SdkMeterProvider].
#[derive(Default)]
pub struct MeterProviderBuilder {
    resource: Option<Resource>,
    readers: Vec<Box<dyn MetricReader>>,
    views: Vec<Arc<dyn View>>,
}

impl MeterProviderBuilder {
    /// Associates a [Resource] with a [SdkMeterProvider].
    ///
    /// This [Resource] represents the entity producing telemetry and is
    /// associated with all [Meter]s the [SdkMeterProvider] will create.
    ///
    /// By default, if this option is not used, the default [Resource] will
    /// be used.
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Associates a [MetricReader] with a [SdkMeterProvider].
    ///
    /// By default, if this option is not used, the provider collects
    /// nothing until a reader is attached.
    pub fn with_reader<T: MetricReader>(mut self, reader: T) -> Self {
        self.readers.push(Box::new(reader));
        self
    }

    /// Associates a [View] with a [SdkMeterProvider].
    ///
    /// [View]s are appended to existing ones in a [SdkMeterProvider] if this
    /// option is used multiple times. The first view matching an instrument
    /// decides its stream.
    pub fn with_view<T: View>(mut self, view: T) -> Self {
        self.views.push(Arc::new(view));
        self
    }

    /// Construct a new [SdkMeterProvider] with this configuration.
    ///
    /// Readers that fail to register (for instance because they are already
    /// attached elsewhere) are logged and left out.
    pub fn build(self) -> SdkMeterProvider {
        tally_debug!(
            name: "MeterProvider.Building",
            builder = format!("{:?}", &self)
        );

        let pipeline = Arc::new(Pipeline::new(
            self.resource.unwrap_or_else(|| Resource::builder().build()),
            self.views,
        ));

        let mut readers = Vec::with_capacity(self.readers.len());
        for reader in self.readers {
            match reader.register_pipeline(Arc::downgrade(&pipeline)) {
                Ok(()) => readers.push(reader),
                Err(err) => {
                    tally_error!(
                        name: "MeterProvider.ReaderRegistrationFailed",
                        reader = format!("{reader:?}"),
                        error = format!("{err}")
                    );
                }
            }
        }

        let meter_provider = SdkMeterProvider {
            inner: Arc::new(SdkMeterProviderInner {
                pipeline,
                meters: Default::default(),
                readers: Mutex::new(readers),
                shutdown_invoked: AtomicBool::new(false),
            }),
        };

        tally_info!(name: "MeterProvider.Built");
        meter_provider
    }
}

impl fmt::Debug for MeterProviderBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeterProviderBuilder")
            .field("resource", &self.resource)
            .field("readers", &self.readers)
            .field("views", &self.views.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{
        data::AggregatedMetrics, Aggregation, InMemoryMetricExporter, Instrument, ManualReader,
        MetricReader, PeriodicReader, ReaderState, Stream,
    };
    use crate::resource::{SERVICE_NAME, TELEMETRY_SDK_LANGUAGE};
    use std::env;
    use tally::{Key, KeyValue, Value};

    #[test]
    fn test_meter_provider_resource() {
        let assert_service_name = |provider: &SdkMeterProvider, expect: Option<&'static str>| {
            assert_eq!(
                provider
                    .resource()
                    .get(&Key::from_static_str(SERVICE_NAME))
                    .map(|v| v.to_string()),
                expect.map(|s| s.to_string())
            );
        };

        // If users didn't provide a resource and there isn't a env var set.
        // Use default one.
        temp_env::with_vars_unset(["TALLY_SERVICE_NAME", "TALLY_RESOURCE_ATTRIBUTES"], || {
            let default_meter_provider = SdkMeterProvider::builder().build();
            assert_service_name(&default_meter_provider, Some("unknown_service"));
            assert_eq!(
                default_meter_provider
                    .resource()
                    .get(&TELEMETRY_SDK_LANGUAGE.into()),
                Some(Value::from("rust"))
            );
        });

        // If user provided a resource, use that.
        let custom_meter_provider = SdkMeterProvider::new(
            Resource::builder_empty()
                .with_service_name("test_service")
                .build(),
        );
        assert_service_name(&custom_meter_provider, Some("test_service"));
        assert_eq!(custom_meter_provider.resource().len(), 1);

        // If `TALLY_RESOURCE_ATTRIBUTES` is set, read them automatically
        temp_env::with_var(
            "TALLY_RESOURCE_ATTRIBUTES",
            Some("key1=value1, k2, k3=value2"),
            || {
                let env_resource_provider = SdkMeterProvider::builder().build();
                assert_eq!(
                    env_resource_provider
                        .resource()
                        .get(&Key::from_static_str("key1")),
                    Some(Value::from("value1"))
                );
                assert_eq!(
                    env_resource_provider
                        .resource()
                        .get(&Key::from_static_str("k3")),
                    Some(Value::from("value2"))
                );
            },
        );
        assert!(env::var("TALLY_RESOURCE_ATTRIBUTES").is_err());
    }

    #[test]
    fn test_shutdown_twice() {
        let reader = ManualReader::new();
        let provider = SdkMeterProvider::builder()
            .with_reader(reader.clone())
            .build();

        assert!(provider.shutdown().is_ok());
        assert!(provider.shutdown().is_ok());
        assert!(provider.clone().shutdown().is_ok());

        assert!(matches!(
            reader.collect(),
            Err(MetricError::AlreadyShutdown)
        ));
        assert!(matches!(
            provider.force_flush(),
            Err(SdkError::AlreadyShutdown)
        ));
    }

    #[test]
    fn meters_after_shutdown_are_inert() {
        let reader = ManualReader::new();
        let provider = SdkMeterProvider::builder()
            .with_reader(reader.clone())
            .build();
        provider.shutdown().unwrap();

        let after = provider.meter("m");
        let counter = after.f64_counter("requests").build().unwrap();
        assert!(counter.add(1.0, &[]).is_ok());
        assert!(matches!(
            provider.add_view(|_: &Instrument| -> Option<Stream> { None }),
            Err(MetricError::AlreadyShutdown)
        ));
        assert!(matches!(
            provider.attach_reader(ManualReader::new()),
            Err(MetricError::AlreadyShutdown)
        ));
    }

    #[test]
    fn attach_reader_after_build() {
        let provider = SdkMeterProvider::builder().build();
        let counter = provider.meter("m").f64_counter("requests").build().unwrap();
        counter.add(4.0, &[KeyValue::new("k", "v")]).unwrap();

        let reader = ManualReader::new();
        provider.attach_reader(reader.clone()).unwrap();
        assert!(matches!(
            provider.attach_reader(reader.clone()),
            Err(MetricError::ReaderAlreadyAttached)
        ));

        // State is shared by the provider, so a late reader sees earlier data.
        let rm = reader.collect().unwrap();
        let AggregatedMetrics::Sum(sum) = &rm.scope_metrics[0].metrics[0].data else {
            panic!("expected sum");
        };
        assert_eq!(sum.data_points[0].value, 4.0);
    }

    #[test]
    fn reader_attached_elsewhere_is_skipped() {
        let reader = ManualReader::new();
        let first = SdkMeterProvider::builder()
            .with_reader(reader.clone())
            .build();
        let second = SdkMeterProvider::builder()
            .with_reader(reader.clone())
            .build();

        assert_eq!(second.inner.readers.lock().unwrap().len(), 0);
        assert_eq!(first.inner.readers.lock().unwrap().len(), 1);
    }

    #[test]
    fn views_added_later_apply_to_new_instruments_only() {
        let reader = ManualReader::new();
        let provider = SdkMeterProvider::builder()
            .with_reader(reader.clone())
            .build();
        let meter = provider.meter("m");
        let before = meter.f64_histogram("latency").build().unwrap();

        provider
            .add_view(|i: &Instrument| {
                Stream::builder()
                    .with_aggregation(Aggregation::Sum)
                    .build()
                    .ok()
                    .filter(|_| i.name().starts_with("latency"))
            })
            .unwrap();
        let after = meter.f64_histogram("latency_2").build().unwrap();

        before.record(1.0, &[]).unwrap();
        after.record(1.0, &[]).unwrap();

        let rm = reader.collect().unwrap();
        let metrics = &rm.scope_metrics[0].metrics;
        assert!(matches!(metrics[0].data, AggregatedMetrics::Histogram(_)));
        assert!(matches!(metrics[1].data, AggregatedMetrics::Sum(_)));
    }

    #[test]
    fn drop_shuts_down() {
        let reader = ManualReader::new();
        {
            let _provider = SdkMeterProvider::builder()
                .with_reader(reader.clone())
                .build();
        }
        assert!(matches!(
            reader.collect(),
            Err(MetricError::AlreadyShutdown)
        ));
    }

    #[test]
    fn attach_racing_shutdown_never_leaves_a_running_reader() {
        for _ in 0..100 {
            let provider = SdkMeterProvider::default();
            let reader = PeriodicReader::builder(InMemoryMetricExporter::default())
                .with_interval(Duration::from_secs(3600))
                .build();
            let barrier = Arc::new(std::sync::Barrier::new(2));

            let attach = {
                let (provider, reader, barrier) =
                    (provider.clone(), reader.clone(), Arc::clone(&barrier));
                std::thread::spawn(move || {
                    barrier.wait();
                    provider.attach_reader(reader)
                })
            };
            let shutdown = {
                let (provider, barrier) = (provider.clone(), Arc::clone(&barrier));
                std::thread::spawn(move || {
                    barrier.wait();
                    provider.shutdown()
                })
            };

            let attached = attach.join().unwrap();
            assert!(shutdown.join().unwrap().is_ok());
            match attached {
                Ok(()) => assert_eq!(reader.state(), ReaderState::Stopped),
                Err(MetricError::AlreadyShutdown) => assert_eq!(reader.state(), ReaderState::Idle),
                Err(other) => panic!("unexpected error {other}"),
            }
        }
    }
}
