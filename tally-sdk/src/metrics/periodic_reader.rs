use std::{
    env, fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender},
        Arc, Mutex, Weak,
    },
    thread,
    time::{Duration, Instant},
};

use tally::{tally_debug, tally_error, tally_info, tally_warn};

use crate::{
    error::{SdkError, SdkResult},
    metrics::{exporter::PushMetricExporter, reader::SdkProducer},
};

use super::{
    data::ResourceMetrics, pipeline::Pipeline, reader::MetricReader, MetricError, MetricResult,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

const METRIC_EXPORT_INTERVAL_NAME: &str = "TALLY_METRIC_EXPORT_INTERVAL";
const METRIC_EXPORT_TIMEOUT_NAME: &str = "TALLY_METRIC_EXPORT_TIMEOUT";

/// Configuration options for [`PeriodicReader`].
///
/// The interval and timeout are read from `TALLY_METRIC_EXPORT_INTERVAL` and
/// `TALLY_METRIC_EXPORT_TIMEOUT` (milliseconds) when set, and default to 60
/// and 30 seconds. The builder methods take precedence over both.
#[derive(Debug)]
pub struct PeriodicReaderBuilder<E> {
    interval: Duration,
    timeout: Duration,
    exporter: E,
}

impl<E> PeriodicReaderBuilder<E>
where
    E: PushMetricExporter,
{
    fn new(exporter: E) -> Self {
        let interval = env::var(METRIC_EXPORT_INTERVAL_NAME)
            .ok()
            .and_then(|v| v.parse().map(Duration::from_millis).ok())
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_INTERVAL);
        let timeout = env::var(METRIC_EXPORT_TIMEOUT_NAME)
            .ok()
            .and_then(|v| v.parse().map(Duration::from_millis).ok())
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_TIMEOUT);

        PeriodicReaderBuilder {
            interval,
            timeout,
            exporter,
        }
    }

    /// Configures the time between the start of two export cycles.
    ///
    /// A zero `interval` is ignored.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.interval = interval;
        }
        self
    }

    /// Configures how long one export cycle may take, collection included.
    /// A cycle exceeding it is abandoned and logged.
    ///
    /// A zero `timeout` is ignored.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.timeout = timeout;
        }
        self
    }

    /// Create a [`PeriodicReader`] with the given config.
    pub fn build(self) -> PeriodicReader<E> {
        PeriodicReader {
            inner: Arc::new(PeriodicReaderInner {
                exporter: Arc::new(self.exporter),
                interval: self.interval,
                timeout: self.timeout,
                producer: Mutex::new(None),
                lifecycle: Mutex::new(Lifecycle {
                    state: ReaderState::Idle,
                    message_sender: None,
                }),
                is_shutdown: AtomicBool::new(false),
                export_in_flight: Arc::new(AtomicBool::new(false)),
            }),
        }
    }
}

/// Lifecycle of a [`PeriodicReader`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReaderState {
    /// Built but not attached to a provider. No timer runs.
    Idle,
    /// Attached; a background thread exports every interval.
    Running,
    /// Shutdown or a flush was requested and the final export is in
    /// progress.
    ShuttingDown,
    /// Shut down. Collections fail and no further exports happen.
    Stopped,
}

/// A [`MetricReader`] that collects and pushes metrics to an exporter at a
/// fixed interval.
///
/// The timer starts when the reader is attached to a provider, on a
/// dedicated thread. Exports run on a second thread so that a slow exporter
/// cannot delay the timer: a cycle that does not finish within the timeout
/// is abandoned and logged, and cycles are skipped while the abandoned
/// export is still running. Export failures are logged; the next cycle
/// runs as usual.
///
/// [`force_flush`](MetricReader::force_flush) and
/// [`shutdown`](MetricReader::shutdown) both end the reader: they perform
/// one final collect and export, stop the timer and shut the exporter down.
/// A stopped reader never collects again.
///
/// # Example
///
/// ```no_run
/// use tally_sdk::metrics::{PeriodicReader, SdkMeterProvider};
/// # fn example<E>(get_exporter: impl Fn() -> E)
/// # where
/// #     E: tally_sdk::metrics::PushMetricExporter,
/// # {
///
/// let exporter = get_exporter();
/// let reader = PeriodicReader::builder(exporter).build();
/// let provider = SdkMeterProvider::builder().with_reader(reader).build();
/// # drop(provider);
/// # }
/// ```
pub struct PeriodicReader<E: PushMetricExporter> {
    inner: Arc<PeriodicReaderInner<E>>,
}

impl<E: PushMetricExporter> Clone for PeriodicReader<E> {
    fn clone(&self) -> Self {
        PeriodicReader {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: PushMetricExporter> PeriodicReader<E> {
    /// Configuration options for a periodic reader
    pub fn builder(exporter: E) -> PeriodicReaderBuilder<E> {
        PeriodicReaderBuilder::new(exporter)
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ReaderState {
        self.inner
            .lifecycle
            .lock()
            .map(|lifecycle| lifecycle.state)
            .unwrap_or(ReaderState::Stopped)
    }
}

impl<E: PushMetricExporter> fmt::Debug for PeriodicReader<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicReader")
            .field("interval", &self.inner.interval)
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

struct Lifecycle {
    state: ReaderState,
    message_sender: Option<Sender<Message>>,
}

struct PeriodicReaderInner<E> {
    exporter: Arc<E>,
    interval: Duration,
    timeout: Duration,
    producer: Mutex<Option<Weak<Pipeline>>>,
    lifecycle: Mutex<Lifecycle>,
    is_shutdown: AtomicBool,
    /// Set while the export worker runs an export.
    export_in_flight: Arc<AtomicBool>,
}

#[derive(Debug)]
enum Message {
    Shutdown {
        timeout: Duration,
        response: Sender<SdkResult>,
    },
}

#[derive(Clone, Copy, Debug)]
enum Ending {
    Flush,
    Shutdown,
}

struct ExportJob {
    metrics: ResourceMetrics,
    response: Sender<SdkResult>,
}

impl<E: PushMetricExporter> PeriodicReaderInner<E> {
    /// Starts the export worker and the timer thread.
    fn start(self: &Arc<Self>) -> MetricResult<Sender<Message>> {
        // No buffer: a job is handed over only to an idle worker, never
        // queued behind an abandoned export.
        let (job_sender, job_receiver) = mpsc::sync_channel::<ExportJob>(0);
        let exporter = Arc::clone(&self.exporter);
        let in_flight = Arc::clone(&self.export_in_flight);
        thread::Builder::new()
            .name("Tally.Metrics.ExportWorker".to_string())
            .spawn(move || {
                for job in job_receiver {
                    let result = futures_executor::block_on(exporter.export(&job.metrics));
                    in_flight.store(false, Ordering::Release);
                    // The reader may have stopped waiting.
                    let _ = job.response.send(result);
                }
            })
            .map_err(|e| {
                tally_error!(
                    name: "PeriodicReader.ThreadStartError",
                    error = format!("{e:?}")
                );
                MetricError::Other(format!("failed to start export worker: {e}"))
            })?;

        let (message_sender, message_receiver) = mpsc::channel();
        let reader = Arc::clone(self);
        thread::Builder::new()
            .name("Tally.Metrics.PeriodicReader".to_string())
            .spawn(move || reader.run(message_receiver, job_sender))
            .map_err(|e| {
                tally_error!(
                    name: "PeriodicReader.ThreadStartError",
                    error = format!("{e:?}")
                );
                MetricError::Other(format!("failed to start periodic reader: {e}"))
            })?;

        Ok(message_sender)
    }

    fn run(&self, messages: Receiver<Message>, jobs: SyncSender<ExportJob>) {
        let interval = self.interval;
        let mut remaining_interval = interval;
        tally_info!(
            name: "PeriodicReader.ThreadStarted",
            interval_ms = interval.as_millis() as u64,
            timeout_ms = self.timeout.as_millis() as u64
        );

        loop {
            match messages.recv_timeout(remaining_interval) {
                Ok(Message::Shutdown { timeout, response }) => {
                    tally_debug!(name: "PeriodicReader.ExportingFinalCycle");
                    let start = Instant::now();
                    let exported = self.collect_and_export(&jobs, timeout);
                    let shutdown = self
                        .exporter
                        .shutdown_with_timeout(timeout.saturating_sub(start.elapsed()));
                    let _ = response.send(exported.and(shutdown));
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {
                    let export_start = Instant::now();
                    tally_debug!(name: "PeriodicReader.ExportingDueToTimer");

                    // Failures are logged in collect_and_export.
                    let _ = self.collect_and_export(&jobs, self.timeout);

                    let time_taken_for_export = export_start.elapsed();
                    remaining_interval = interval.saturating_sub(time_taken_for_export);
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        tally_info!(name: "PeriodicReader.ThreadStopped");
    }

    fn collect(&self) -> MetricResult<ResourceMetrics> {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return Err(MetricError::AlreadyShutdown);
        }

        let producer = self.producer.lock()?;
        match producer.as_ref() {
            Some(p) => p
                .upgrade()
                .ok_or(MetricError::AlreadyShutdown)?
                .produce(),
            None => Err(MetricError::ReaderNotRegistered),
        }
    }

    /// One export cycle, bounded by `timeout` from its start.
    fn collect_and_export(&self, jobs: &SyncSender<ExportJob>, timeout: Duration) -> SdkResult {
        let start = Instant::now();
        let metrics = match self.collect() {
            Ok(metrics) => metrics,
            Err(e) => {
                tally_warn!(
                    name: "PeriodicReader.CollectError",
                    error = format!("{e:?}")
                );
                return Err(SdkError::InternalFailure(e.to_string()));
            }
        };

        if metrics.scope_metrics.is_empty() {
            tally_debug!(name: "PeriodicReader.NoMetricsCollected");
            return Ok(());
        }

        let remaining = timeout.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            tally_warn!(
                name: "PeriodicReader.ExportAbandoned",
                reason = "collection exceeded the export timeout"
            );
            return Err(SdkError::Timeout(timeout));
        }

        if self.export_in_flight.swap(true, Ordering::AcqRel) {
            tally_warn!(
                name: "PeriodicReader.ExportAbandoned",
                reason = "a previous export is still in flight"
            );
            return Err(SdkError::Timeout(timeout));
        }
        // The worker is idle, so the hand-over completes promptly.
        let (response, result) = mpsc::channel();
        if jobs.send(ExportJob { metrics, response }).is_err() {
            self.export_in_flight.store(false, Ordering::Release);
            return Err(SdkError::InternalFailure("export worker is not running".into()));
        }

        match result.recv_timeout(remaining) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                tally_warn!(
                    name: "PeriodicReader.ExportError",
                    error = format!("{e:?}")
                );
                Err(e)
            }
            Err(RecvTimeoutError::Timeout) => {
                tally_warn!(
                    name: "PeriodicReader.ExportAbandoned",
                    reason = "export exceeded the export timeout",
                    timeout_ms = timeout.as_millis() as u64
                );
                Err(SdkError::Timeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(SdkError::InternalFailure("export worker is not running".into()))
            }
        }
    }

    /// Final cycle on flush: same as shutdown, within the export timeout.
    fn force_flush(&self) -> SdkResult {
        self.finish(self.timeout, Ending::Flush)
    }

    fn shutdown(&self, timeout: Duration) -> SdkResult {
        self.finish(timeout, Ending::Shutdown)
    }

    /// Runs the final cycle and moves the reader to `Stopped`.
    fn finish(&self, timeout: Duration, ending: Ending) -> SdkResult {
        let sender = {
            let mut lifecycle = self
                .lifecycle
                .lock()
                .map_err(|e| SdkError::InternalFailure(e.to_string()))?;
            match (lifecycle.state, ending) {
                (ReaderState::ShuttingDown | ReaderState::Stopped, Ending::Shutdown) => {
                    return Ok(())
                }
                (ReaderState::ShuttingDown | ReaderState::Stopped, Ending::Flush) => {
                    return Err(SdkError::AlreadyShutdown)
                }
                (ReaderState::Idle, Ending::Flush) => {
                    return Err(SdkError::InternalFailure(
                        "reader is not attached to a meter provider".into(),
                    ))
                }
                (ReaderState::Idle, Ending::Shutdown) => {
                    lifecycle.state = ReaderState::Stopped;
                    self.is_shutdown.store(true, Ordering::Relaxed);
                    drop(lifecycle);
                    return self.exporter.shutdown_with_timeout(timeout);
                }
                (ReaderState::Running, _) => {
                    lifecycle.state = ReaderState::ShuttingDown;
                    lifecycle.message_sender.take()
                }
            }
        };

        let result = match sender {
            Some(sender) => {
                let (response_tx, response_rx) = mpsc::channel();
                if sender
                    .send(Message::Shutdown {
                        timeout,
                        response: response_tx,
                    })
                    .is_err()
                {
                    Err(SdkError::InternalFailure(
                        "periodic reader thread stopped".into(),
                    ))
                } else {
                    match response_rx.recv_timeout(timeout) {
                        Ok(result) => result,
                        Err(RecvTimeoutError::Timeout) => {
                            tally_warn!(
                                name: "PeriodicReader.ShutdownTimeout",
                                timeout_ms = timeout.as_millis() as u64
                            );
                            Err(SdkError::Timeout(timeout))
                        }
                        Err(RecvTimeoutError::Disconnected) => Err(SdkError::InternalFailure(
                            "periodic reader thread stopped".into(),
                        )),
                    }
                }
            }
            None => Ok(()),
        };

        self.is_shutdown.store(true, Ordering::Relaxed);
        if let Ok(mut producer) = self.producer.lock() {
            *producer = None;
        }
        if let Ok(mut lifecycle) = self.lifecycle.lock() {
            lifecycle.state = ReaderState::Stopped;
        }

        result
    }
}

impl<E: PushMetricExporter> MetricReader for PeriodicReader<E> {
    /// Binds the reader and starts its timer.
    fn register_pipeline(&self, pipeline: Weak<Pipeline>) -> MetricResult<()> {
        let mut lifecycle = self.inner.lifecycle.lock()?;
        match lifecycle.state {
            ReaderState::Idle => {}
            ReaderState::Running => return Err(MetricError::ReaderAlreadyAttached),
            ReaderState::ShuttingDown | ReaderState::Stopped => {
                return Err(MetricError::AlreadyShutdown)
            }
        }

        *self.inner.producer.lock()? = Some(pipeline);
        let sender = self.inner.start()?;
        lifecycle.message_sender = Some(sender);
        lifecycle.state = ReaderState::Running;
        Ok(())
    }

    fn collect(&self) -> MetricResult<ResourceMetrics> {
        self.inner.collect()
    }

    fn force_flush(&self) -> SdkResult {
        self.inner.force_flush()
    }

    fn shutdown_with_timeout(&self, timeout: Duration) -> SdkResult {
        self.inner.shutdown(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        PeriodicReader, ReaderState, DEFAULT_INTERVAL, DEFAULT_TIMEOUT,
        METRIC_EXPORT_INTERVAL_NAME, METRIC_EXPORT_TIMEOUT_NAME,
    };
    use crate::{
        error::{SdkError, SdkResult},
        metrics::{
            data::ResourceMetrics, exporter::PushMetricExporter, reader::MetricReader,
            InMemoryMetricExporter, MetricError, SdkMeterProvider,
        },
    };
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            mpsc, Arc, Condvar, Mutex,
        },
        time::Duration,
    };

    // use below command to run all tests
    // cargo test metrics::periodic_reader::tests -- --nocapture

    #[derive(Debug, Clone, Default)]
    struct MetricExporterThatFailsOnlyOnFirst {
        count: Arc<AtomicUsize>,
    }

    impl MetricExporterThatFailsOnlyOnFirst {
        fn get_count(&self) -> usize {
            self.count.load(Ordering::Relaxed)
        }
    }

    impl PushMetricExporter for MetricExporterThatFailsOnlyOnFirst {
        async fn export(&self, _metrics: &ResourceMetrics) -> SdkResult {
            if self.count.fetch_add(1, Ordering::Relaxed) == 0 {
                Err(SdkError::InternalFailure("export failed".into()))
            } else {
                Ok(())
            }
        }

        fn force_flush(&self) -> SdkResult {
            Ok(())
        }

        fn shutdown_with_timeout(&self, _timeout: Duration) -> SdkResult {
            Ok(())
        }
    }

    /// Blocks its export thread for `stall` on every export.
    #[derive(Debug, Clone)]
    struct StallingExporter {
        stall: Duration,
        started: Arc<AtomicUsize>,
    }

    impl PushMetricExporter for StallingExporter {
        async fn export(&self, _metrics: &ResourceMetrics) -> SdkResult {
            self.started.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.stall);
            Ok(())
        }

        fn force_flush(&self) -> SdkResult {
            Ok(())
        }

        fn shutdown_with_timeout(&self, _timeout: Duration) -> SdkResult {
            Ok(())
        }
    }

    /// Blocks every export until the gate opens.
    #[derive(Debug, Clone, Default)]
    struct GatedExporter {
        started: Arc<AtomicUsize>,
        gate: Arc<(Mutex<bool>, Condvar)>,
    }

    impl GatedExporter {
        fn open(&self) {
            let (open, cvar) = &*self.gate;
            *open.lock().unwrap() = true;
            cvar.notify_all();
        }
    }

    impl PushMetricExporter for GatedExporter {
        async fn export(&self, _metrics: &ResourceMetrics) -> SdkResult {
            self.started.fetch_add(1, Ordering::SeqCst);
            let (open, cvar) = &*self.gate;
            let _open = cvar.wait_while(open.lock().unwrap(), |open| !*open).unwrap();
            Ok(())
        }

        fn force_flush(&self) -> SdkResult {
            Ok(())
        }

        fn shutdown_with_timeout(&self, _timeout: Duration) -> SdkResult {
            Ok(())
        }
    }

    #[test]
    fn interval_and_timeout_from_env() {
        let exporter = InMemoryMetricExporter::default;

        temp_env::with_vars(
            [
                (METRIC_EXPORT_INTERVAL_NAME, Some("5000")),
                (METRIC_EXPORT_TIMEOUT_NAME, Some("1500")),
            ],
            || {
                let reader = PeriodicReader::builder(exporter()).build();
                assert_eq!(reader.inner.interval, Duration::from_millis(5000));
                assert_eq!(reader.inner.timeout, Duration::from_millis(1500));

                // Explicit configuration wins over the environment.
                let reader = PeriodicReader::builder(exporter())
                    .with_interval(Duration::from_secs(7))
                    .with_timeout(Duration::from_secs(2))
                    .build();
                assert_eq!(reader.inner.interval, Duration::from_secs(7));
                assert_eq!(reader.inner.timeout, Duration::from_secs(2));

                // Zero is ignored, the environment value stays.
                let reader = PeriodicReader::builder(exporter())
                    .with_interval(Duration::ZERO)
                    .with_timeout(Duration::ZERO)
                    .build();
                assert_eq!(reader.inner.interval, Duration::from_millis(5000));
                assert_eq!(reader.inner.timeout, Duration::from_millis(1500));
            },
        );

        for invalid in ["0", "soon", "-5"] {
            temp_env::with_vars(
                [
                    (METRIC_EXPORT_INTERVAL_NAME, Some(invalid)),
                    (METRIC_EXPORT_TIMEOUT_NAME, Some(invalid)),
                ],
                || {
                    let reader = PeriodicReader::builder(exporter()).build();
                    assert_eq!(reader.inner.interval, DEFAULT_INTERVAL, "{invalid:?}");
                    assert_eq!(reader.inner.timeout, DEFAULT_TIMEOUT, "{invalid:?}");
                },
            );
        }

        temp_env::with_vars_unset(
            [METRIC_EXPORT_INTERVAL_NAME, METRIC_EXPORT_TIMEOUT_NAME],
            || {
                let reader = PeriodicReader::builder(exporter())
                    .with_interval(Duration::ZERO)
                    .build();
                assert_eq!(reader.inner.interval, Duration::from_secs(60));
                assert_eq!(reader.inner.timeout, Duration::from_secs(30));
            },
        );
    }

    #[test]
    fn collection_triggered_by_interval_multiple() {
        // Arrange
        let interval = Duration::from_millis(1);
        let exporter = InMemoryMetricExporter::default();
        let reader = PeriodicReader::builder(exporter.clone())
            .with_interval(interval)
            .build();
        let i = Arc::new(AtomicUsize::new(0));
        let i_clone = i.clone();

        // Act
        let meter_provider = SdkMeterProvider::builder().with_reader(reader).build();
        let meter = meter_provider.meter("test");
        let _counter = meter
            .f64_observable_counter("testcounter")
            .with_callback(move |_| {
                i_clone.fetch_add(1, Ordering::Relaxed);
            })
            .build()
            .unwrap();

        // Sleep for a duration 5X (plus liberal buffer to account for potential
        // CI slowness) the interval to ensure multiple collection.
        std::thread::sleep(interval * 5 * 20);

        // Assert
        assert!(i.load(Ordering::Relaxed) >= 5);
    }

    #[test]
    fn state_transitions() {
        let reader = PeriodicReader::builder(InMemoryMetricExporter::default())
            .with_interval(Duration::from_millis(10))
            .build();
        assert_eq!(reader.state(), ReaderState::Idle);

        let meter_provider = SdkMeterProvider::builder()
            .with_reader(reader.clone())
            .build();
        assert_eq!(reader.state(), ReaderState::Running);

        meter_provider.shutdown().unwrap();
        assert_eq!(reader.state(), ReaderState::Stopped);
    }

    #[test]
    fn shutdown_repeat() {
        // Arrange
        let interval = Duration::from_millis(1);
        let exporter = InMemoryMetricExporter::default();
        let reader = PeriodicReader::builder(exporter.clone())
            .with_interval(interval)
            .build();

        let meter_provider = SdkMeterProvider::builder().with_reader(reader).build();
        assert!(meter_provider.shutdown().is_ok());

        // calling shutdown again is a no-op
        assert!(meter_provider.shutdown().is_ok());
        assert!(meter_provider.shutdown().is_ok());
    }

    #[test]
    fn shutdown_without_provider_stops_exporter() {
        let exporter = InMemoryMetricExporter::default();
        let reader = PeriodicReader::builder(exporter.clone()).build();

        assert!(reader.shutdown().is_ok());
        assert!(reader.shutdown().is_ok());
        assert_eq!(reader.state(), ReaderState::Stopped);
        assert!(exporter.is_shutdown());
    }

    #[test]
    fn flush_after_shutdown() {
        // Arrange
        let interval = Duration::from_millis(1);
        let exporter = InMemoryMetricExporter::default();
        let reader = PeriodicReader::builder(exporter.clone())
            .with_interval(interval)
            .build();

        let meter_provider = SdkMeterProvider::builder().with_reader(reader).build();
        assert!(meter_provider.force_flush().is_ok());
        assert!(meter_provider.shutdown().is_ok());

        // calling force_flush after shutdown should return Err
        assert!(meter_provider.force_flush().is_err());
    }

    #[test]
    fn flush_is_the_final_cycle() {
        let exporter = InMemoryMetricExporter::default();
        let reader = PeriodicReader::builder(exporter.clone())
            .with_interval(Duration::from_secs(3600))
            .build();

        let meter_provider = SdkMeterProvider::builder()
            .with_reader(reader.clone())
            .build();
        let counter = meter_provider
            .meter("test")
            .f64_counter("requests")
            .build()
            .unwrap();
        counter.add(1.0, &[]).unwrap();

        assert!(meter_provider.force_flush().is_ok());
        assert_eq!(reader.state(), ReaderState::Stopped);
        assert_eq!(exporter.get_finished_metrics().unwrap().len(), 1);
        assert!(exporter.is_shutdown());

        // Stopped is terminal: no further collects or exports.
        assert!(matches!(
            meter_provider.force_flush(),
            Err(SdkError::AlreadyShutdown)
        ));
        assert!(matches!(
            reader.collect(),
            Err(MetricError::AlreadyShutdown)
        ));
        assert!(meter_provider.shutdown().is_ok());
        assert_eq!(exporter.get_finished_metrics().unwrap().len(), 1);
    }

    #[test]
    fn periodic_reader_without_pipeline() {
        // Arrange
        let interval = Duration::from_millis(1);
        let exporter = InMemoryMetricExporter::default();
        let reader = PeriodicReader::builder(exporter.clone())
            .with_interval(interval)
            .build();

        // Pipeline is not registered, so collect and flush should fail
        assert!(matches!(
            reader.collect(),
            Err(MetricError::ReaderNotRegistered)
        ));
        assert!(reader.force_flush().is_err());

        // Adding reader to meter provider should register the pipeline
        let meter_provider = SdkMeterProvider::builder()
            .with_reader(reader.clone())
            .build();

        // Now collect and flush should succeed
        assert!(reader.collect().is_ok());
        assert!(meter_provider.force_flush().is_ok());
    }

    #[test]
    fn reader_cannot_be_attached_twice() {
        let reader = PeriodicReader::builder(InMemoryMetricExporter::default()).build();
        let first = SdkMeterProvider::builder()
            .with_reader(reader.clone())
            .build();
        let second = SdkMeterProvider::builder().build();

        assert!(matches!(
            second.attach_reader(reader),
            Err(MetricError::ReaderAlreadyAttached)
        ));
        drop(first);
    }

    #[test]
    fn exporter_failures_are_handled() {
        // create a mock exporter that fails 1st time and succeeds 2nd time
        // Validate using this exporter that periodic reader can handle exporter failure
        // and continue to export metrics.
        // Arrange
        let interval = Duration::from_millis(10);
        let exporter = MetricExporterThatFailsOnlyOnFirst::default();
        let reader = PeriodicReader::builder(exporter.clone())
            .with_interval(interval)
            .build();

        let meter_provider = SdkMeterProvider::builder().with_reader(reader).build();
        let meter = meter_provider.meter("test");
        let counter = meter.f64_counter("sync_counter").build().unwrap();
        counter.add(1.0, &[]).unwrap();

        // Sleep for a duration much longer than the interval to trigger
        // multiple exports, including failures.
        std::thread::sleep(Duration::from_millis(500));

        // Assert that atleast 2 exports are attempted given the 1st one fails.
        assert!(exporter.get_count() >= 2);
    }

    #[test]
    fn slow_export_is_abandoned() {
        let started = Arc::new(AtomicUsize::new(0));
        let exporter = StallingExporter {
            stall: Duration::from_millis(300),
            started: Arc::clone(&started),
        };
        let reader = PeriodicReader::builder(exporter)
            .with_interval(Duration::from_secs(3600))
            .with_timeout(Duration::from_millis(50))
            .build();

        let meter_provider = SdkMeterProvider::builder()
            .with_reader(reader.clone())
            .build();
        let counter = meter_provider
            .meter("test")
            .f64_counter("requests")
            .build()
            .unwrap();
        counter.add(1.0, &[]).unwrap();

        assert!(matches!(
            meter_provider.force_flush(),
            Err(SdkError::Timeout(_))
        ));
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(reader.state(), ReaderState::Stopped);

        // Recording is unaffected by the stuck export.
        counter.add(1.0, &[]).unwrap();
    }

    #[test]
    fn cycles_are_skipped_while_an_export_is_stuck() {
        let exporter = GatedExporter::default();
        let reader = PeriodicReader::builder(exporter.clone())
            .with_interval(Duration::from_millis(10))
            .with_timeout(Duration::from_millis(20))
            .build();

        let meter_provider = SdkMeterProvider::builder()
            .with_reader(reader.clone())
            .build();
        meter_provider
            .meter("test")
            .f64_counter("requests")
            .build()
            .unwrap()
            .add(1.0, &[])
            .unwrap();

        // Many ticks pass while the first export is blocked.
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(exporter.started.load(Ordering::SeqCst), 1);

        // The final cycle is skipped as well.
        assert!(matches!(reader.shutdown(), Err(SdkError::Timeout(_))));
        assert_eq!(reader.state(), ReaderState::Stopped);

        // Nothing was queued behind the blocked export.
        exporter.open();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(exporter.started.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn collection() {
        collection_triggered_by_interval_helper();
        collection_triggered_by_flush_helper();
        collection_triggered_by_shutdown_helper();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn collection_from_tokio_multi_with_one_worker() {
        collection_triggered_by_interval_helper();
        collection_triggered_by_flush_helper();
        collection_triggered_by_shutdown_helper();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn collection_from_tokio_with_two_worker() {
        collection_triggered_by_interval_helper();
        collection_triggered_by_flush_helper();
        collection_triggered_by_shutdown_helper();
    }

    #[tokio::test(flavor = "current_thread")]
    async fn collection_from_tokio_current() {
        collection_triggered_by_interval_helper();
        collection_triggered_by_flush_helper();
        collection_triggered_by_shutdown_helper();
    }

    fn collection_triggered_by_interval_helper() {
        collection_helper(|_| {
            // Sleep for a duration longer than the interval to ensure at least one collection
            std::thread::sleep(Duration::from_millis(500));
        });
    }

    fn collection_triggered_by_flush_helper() {
        collection_helper(|meter_provider| {
            meter_provider.force_flush().expect("flush should succeed");
        });
    }

    fn collection_triggered_by_shutdown_helper() {
        collection_helper(|meter_provider| {
            meter_provider.shutdown().expect("shutdown should succeed");
        });
    }

    fn collection_helper(trigger: fn(&SdkMeterProvider)) {
        // Arrange
        let interval = Duration::from_millis(10);
        let exporter = InMemoryMetricExporter::default();
        let reader = PeriodicReader::builder(exporter.clone())
            .with_interval(interval)
            .build();
        let (sender, receiver) = mpsc::channel();
        let sender = std::sync::Mutex::new(sender);

        let meter_provider = SdkMeterProvider::builder().with_reader(reader).build();
        let meter = meter_provider.meter("test");
        let _counter = meter
            .f64_observable_counter("testcounter")
            .with_callback(move |observer| {
                observer.observe(1.0, &[]).unwrap();
                let _ = sender.lock().unwrap().send(());
            })
            .build()
            .unwrap();

        // Act
        trigger(&meter_provider);

        // Assert
        receiver
            .recv_timeout(Duration::ZERO)
            .expect("message should be available in channel, indicating a collection occurred, which should trigger observable callback");

        let exported_metrics = exporter
            .get_finished_metrics()
            .expect("this should not fail");
        assert!(
            !exported_metrics.is_empty(),
            "Metrics should be available in exporter."
        );
    }
}
