mod aggregate;
mod histogram;
mod sum;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use tally::{tally_warn, AttributeSet, KeyValue};

pub(crate) use aggregate::{AggregateBuilder, MetricStream};

/// Attribute key marking the series that absorbs measurements once an
/// instrument reaches its cardinality limit.
pub(crate) const STREAM_OVERFLOW_ATTRIBUTE: &str = "tally.metric.overflow";

/// Default maximum number of distinct attribute sets per stream.
pub(crate) const DEFAULT_CARDINALITY_LIMIT: usize = 2000;

fn stream_overflow_attributes() -> &'static AttributeSet {
    static OVERFLOW: OnceLock<AttributeSet> = OnceLock::new();
    OVERFLOW.get_or_init(|| {
        AttributeSet::from_pairs([KeyValue::new(STREAM_OVERFLOW_ATTRIBUTE, true)])
            .unwrap_or_default()
    })
}

/// Accumulates the measurements of a single time series.
pub(crate) trait Aggregator: Send + Sync + 'static {
    /// Shared configuration needed to create a new tracker.
    type InitConfig: Send + Sync;

    /// A measurement prepared once by the instrument, e.g. a histogram value
    /// together with its bucket index.
    type PreComputedValue;

    fn create(init: &Self::InitConfig) -> Self;

    fn update(&self, value: Self::PreComputedValue);
}

/// Per-stream map from attribute set to [`Aggregator`].
///
/// Recording takes the read lock on the hot path and only upgrades to the
/// write lock to insert a series that does not exist yet. Collection clones
/// the tracker handles under the read lock and reads them after releasing
/// it, so recording never waits on an exporter.
pub(crate) struct ValueMap<A: Aggregator> {
    trackers: RwLock<HashMap<AttributeSet, Arc<A>>>,
    /// Number of distinct non-empty attribute sets, excluding overflow.
    count: AtomicUsize,
    has_no_attribute_value: AtomicBool,
    no_attribute_tracker: A,
    overflow_logged: AtomicBool,
    cardinality_limit: usize,
    config: A::InitConfig,
}

impl<A: Aggregator> ValueMap<A> {
    pub(crate) fn new(config: A::InitConfig, cardinality_limit: usize) -> Self {
        ValueMap {
            trackers: RwLock::new(HashMap::new()),
            count: AtomicUsize::new(0),
            has_no_attribute_value: AtomicBool::new(false),
            no_attribute_tracker: A::create(&config),
            overflow_logged: AtomicBool::new(false),
            cardinality_limit,
            config,
        }
    }

    /// One slot of the limit is reserved for the overflow series.
    fn is_under_cardinality_limit(&self) -> bool {
        self.count.load(Ordering::SeqCst) < self.cardinality_limit.saturating_sub(1)
    }

    pub(crate) fn measure(&self, value: A::PreComputedValue, attributes: &AttributeSet) {
        if attributes.is_empty() {
            self.no_attribute_tracker.update(value);
            self.has_no_attribute_value.store(true, Ordering::Release);
            return;
        }

        let Ok(trackers) = self.trackers.read() else {
            return;
        };

        if let Some(tracker) = trackers.get(attributes) {
            tracker.update(value);
            return;
        }

        drop(trackers);

        let Ok(mut trackers) = self.trackers.write() else {
            return;
        };

        // Another thread may have inserted the series between the locks.
        if let Some(tracker) = trackers.get(attributes) {
            tracker.update(value);
        } else if self.is_under_cardinality_limit() {
            let new_tracker = Arc::new(A::create(&self.config));
            new_tracker.update(value);
            trackers.insert(attributes.clone(), new_tracker);
            self.count.fetch_add(1, Ordering::SeqCst);
        } else if let Some(overflow_value) = trackers.get(stream_overflow_attributes()) {
            overflow_value.update(value);
        } else {
            let new_tracker = A::create(&self.config);
            new_tracker.update(value);
            trackers.insert(stream_overflow_attributes().clone(), Arc::new(new_tracker));

            if !self.overflow_logged.swap(true, Ordering::Relaxed) {
                tally_warn!(
                    name: "ValueMap.measure",
                    message = "Maximum data points for metric stream exceeded. Entry added to overflow. Subsequent overflows to the same stream will not be logged.",
                    cardinality_limit = self.cardinality_limit as u64
                );
            }
        }
    }

    /// Maps every tracked series into `dest` without resetting anything.
    pub(crate) fn collect_readonly<DP, MapFn>(&self, dest: &mut Vec<DP>, mut map_fn: MapFn)
    where
        MapFn: FnMut(Vec<KeyValue>, &A) -> DP,
    {
        if self.has_no_attribute_value.load(Ordering::Acquire) {
            dest.push(map_fn(vec![], &self.no_attribute_tracker));
        }

        let snapshot: Vec<(AttributeSet, Arc<A>)> = match self.trackers.read() {
            Ok(trackers) => trackers
                .iter()
                .map(|(attrs, tracker)| (attrs.clone(), Arc::clone(tracker)))
                .collect(),
            Err(_) => return,
        };

        dest.reserve(snapshot.len());
        for (attrs, tracker) in snapshot {
            dest.push(map_fn(attrs.to_vec(), &tracker));
        }
    }
}
