use core::fmt;
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

use tally::{tally_debug, InstrumentationScope};

use crate::{
    metrics::{
        aggregation::{Aggregation, DEFAULT_HISTOGRAM_BOUNDARIES},
        data::{Metric, ResourceMetrics, ScopeMetrics},
        instrument::{Instrument, InstrumentKind, Stream},
        internal::{AggregateBuilder, MetricStream},
        reader::SdkProducer,
        view::View,
        MetricResult,
    },
    Resource,
};

/// Connects the instruments of a meter provider to its readers.
///
/// One pipeline exists per provider. Every attached reader collects from
/// it, so all readers observe the same cumulative state.
#[doc(hidden)]
pub struct Pipeline {
    pub(crate) resource: Resource,
    start_time: SystemTime,
    views: RwLock<Vec<Arc<dyn View>>>,
    inner: Mutex<PipelineInner>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pipeline")
    }
}

/// Single instrument callbacks
pub(crate) type GenericCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct PipelineInner {
    /// Streams per meter, both in creation order.
    aggregations: Vec<(InstrumentationScope, Vec<Arc<MetricStream>>)>,
    callbacks: Vec<GenericCallback>,
}

impl fmt::Debug for PipelineInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineInner")
            .field("aggregations", &self.aggregations)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl Pipeline {
    pub(crate) fn new(resource: Resource, views: Vec<Arc<dyn View>>) -> Self {
        Pipeline {
            resource,
            start_time: SystemTime::now(),
            views: RwLock::new(views),
            inner: Mutex::new(PipelineInner::default()),
        }
    }

    /// Appends a view. Existing instruments keep the stream they resolved.
    pub(crate) fn add_view(&self, view: Arc<dyn View>) -> MetricResult<()> {
        self.views.write()?.push(view);
        Ok(())
    }

    /// Resolves the stream of a new instrument against the views and adds
    /// its aggregate to the pipeline.
    ///
    /// The first view returning a stream wins. Without a matching view the
    /// default aggregation for the instrument kind is used, with
    /// `boundaries` overriding the default histogram buckets.
    ///
    /// Returns `None` if the instrument resolves to [`Aggregation::Drop`].
    pub(crate) fn resolve(
        &self,
        inst: &Instrument,
        boundaries: Option<&[f64]>,
    ) -> MetricResult<Option<Arc<MetricStream>>> {
        let stream = self
            .views
            .read()?
            .iter()
            .find_map(|view| view.match_inst(inst))
            .unwrap_or_default();

        let Stream {
            name,
            description,
            unit,
            aggregation,
            allowed_attribute_keys,
            cardinality_limit,
        } = stream;

        let mut b = AggregateBuilder::new(
            name.unwrap_or_else(|| inst.name.clone()),
            description.unwrap_or_else(|| inst.description.clone()),
            unit.unwrap_or_else(|| inst.unit.clone()),
            self.start_time,
        )
        .with_filter(allowed_attribute_keys);
        if let Some(limit) = cardinality_limit {
            b = b.with_cardinality_limit(limit);
        }

        let aggregation = aggregation.unwrap_or(Aggregation::Default);
        let Some(stream) = build_stream(b, inst.kind, aggregation, boundaries) else {
            tally_debug!(
                name: "Pipeline.InstrumentDropped",
                instrument_name = inst.name.as_ref()
            );
            return Ok(None);
        };

        let stream = Arc::new(stream);
        self.add_sync(inst.scope.clone(), Arc::clone(&stream))?;
        Ok(Some(stream))
    }

    fn add_sync(&self, scope: InstrumentationScope, stream: Arc<MetricStream>) -> MetricResult<()> {
        let mut inner = self.inner.lock()?;
        tally_debug!(
            name: "InstrumentCreated",
            meter_name = scope.name().to_owned()
        );
        match inner.aggregations.iter_mut().find(|(s, _)| *s == scope) {
            Some((_, streams)) => streams.push(stream),
            None => inner.aggregations.push((scope, vec![stream])),
        }
        Ok(())
    }

    /// Registers a callback to be run every time metrics are produced.
    pub(crate) fn add_callback(&self, callback: GenericCallback) -> MetricResult<()> {
        self.inner.lock()?.callbacks.push(callback);
        Ok(())
    }

    /// Drops every stream and callback.
    pub(crate) fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.aggregations.clear();
            inner.callbacks.clear();
        }
    }
}

impl SdkProducer for Pipeline {
    /// Runs the observable callbacks, then snapshots every stream.
    ///
    /// Meters and instruments without data points are left out.
    fn produce(&self) -> MetricResult<ResourceMetrics> {
        let (callbacks, aggregations) = {
            let inner = self.inner.lock()?;
            (inner.callbacks.clone(), inner.aggregations.clone())
        };

        tally_debug!(
            name: "MeterProviderInvokingObservableCallbacks",
            count = callbacks.len() as u64
        );
        for cb in &callbacks {
            cb();
        }

        let mut scope_metrics = Vec::with_capacity(aggregations.len());
        for (scope, streams) in aggregations {
            let metrics: Vec<Metric> = streams.iter().filter_map(|s| s.collect()).collect();
            if !metrics.is_empty() {
                scope_metrics.push(ScopeMetrics { scope, metrics });
            }
        }

        Ok(ResourceMetrics {
            resource: self.resource.clone(),
            scope_metrics,
        })
    }
}

/// Builds the aggregate for `aggregation`, or `None` for [`Aggregation::Drop`].
fn build_stream(
    b: AggregateBuilder,
    kind: InstrumentKind,
    aggregation: Aggregation,
    boundaries: Option<&[f64]>,
) -> Option<MetricStream> {
    match aggregation {
        Aggregation::Drop => None,
        Aggregation::Default => build_stream(b, kind, default_aggregation(kind, boundaries), None),
        Aggregation::Sum => Some(match kind {
            InstrumentKind::Counter => b.sum(true),
            InstrumentKind::ObservableCounter => b.precomputed_sum(true),
            // Histograms accept negative values, so their sum can decrease.
            InstrumentKind::Histogram => b.sum(false),
        }),
        Aggregation::ExplicitBucketHistogram {
            boundaries,
            record_min_max,
        } => Some(b.explicit_bucket_histogram(boundaries, record_min_max)),
    }
}

/// The default aggregation for an instrument kind:
///
/// * Counter ⇨ Sum
/// * Observable Counter ⇨ Sum
/// * Histogram ⇨ ExplicitBucketHistogram
fn default_aggregation(kind: InstrumentKind, boundaries: Option<&[f64]>) -> Aggregation {
    match kind {
        InstrumentKind::Counter | InstrumentKind::ObservableCounter => Aggregation::Sum,
        InstrumentKind::Histogram => Aggregation::ExplicitBucketHistogram {
            boundaries: boundaries
                .map(<[f64]>::to_vec)
                .unwrap_or_else(|| DEFAULT_HISTOGRAM_BOUNDARIES.to_vec()),
            record_min_max: true,
        },
    }
}
