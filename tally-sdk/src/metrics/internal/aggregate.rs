use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::SystemTime;

use tally::{AttributeSet, Key};

use crate::metrics::data::{AggregatedMetrics, Metric};

use super::histogram::Histogram;
use super::sum::Sum;

enum Aggregate {
    Sum(Sum),
    Histogram(Histogram),
}

/// The live aggregation state of one instrument, after view resolution.
pub(crate) struct MetricStream {
    name: Cow<'static, str>,
    description: Cow<'static, str>,
    unit: Cow<'static, str>,
    filter: Option<Arc<HashSet<Key>>>,
    provider_start: SystemTime,
    first_record: OnceLock<SystemTime>,
    aggregate: Aggregate,
}

impl fmt::Debug for MetricStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricStream")
            .field("name", &self.name)
            .field("unit", &self.unit)
            .finish_non_exhaustive()
    }
}

impl MetricStream {
    /// Records an already validated measurement.
    pub(crate) fn measure(&self, value: f64, attrs: &AttributeSet) {
        self.first_record.get_or_init(SystemTime::now);

        let filtered;
        let attrs = match &self.filter {
            Some(keys) => {
                filtered = attrs.retain(|kv| keys.contains(&kv.key));
                &filtered
            }
            None => attrs,
        };

        match &self.aggregate {
            Aggregate::Sum(sum) => sum.measure(value, attrs),
            Aggregate::Histogram(histogram) => histogram.measure(value, attrs),
        }
    }

    /// Cumulative snapshot, or `None` if nothing was recorded yet.
    pub(crate) fn collect(&self) -> Option<Metric> {
        let start_time = self
            .first_record
            .get()
            .copied()
            .unwrap_or(self.provider_start);

        let data: AggregatedMetrics = match &self.aggregate {
            Aggregate::Sum(sum) => {
                let data = sum.cumulative(start_time);
                if data.data_points.is_empty() {
                    return None;
                }
                data.into()
            }
            Aggregate::Histogram(histogram) => {
                let data = histogram.cumulative(start_time);
                if data.data_points.is_empty() {
                    return None;
                }
                data.into()
            }
        };

        Some(Metric {
            name: self.name.clone(),
            description: self.description.clone(),
            unit: self.unit.clone(),
            data,
        })
    }
}

/// Builds the [`MetricStream`] for a resolved instrument stream.
pub(crate) struct AggregateBuilder {
    name: Cow<'static, str>,
    description: Cow<'static, str>,
    unit: Cow<'static, str>,
    filter: Option<Arc<HashSet<Key>>>,
    cardinality_limit: usize,
    provider_start: SystemTime,
}

impl AggregateBuilder {
    pub(crate) fn new(
        name: Cow<'static, str>,
        description: Cow<'static, str>,
        unit: Cow<'static, str>,
        provider_start: SystemTime,
    ) -> Self {
        AggregateBuilder {
            name,
            description,
            unit,
            filter: None,
            cardinality_limit: super::DEFAULT_CARDINALITY_LIMIT,
            provider_start,
        }
    }

    /// Keep only these attribute keys when recording.
    pub(crate) fn with_filter(mut self, filter: Option<Arc<HashSet<Key>>>) -> Self {
        self.filter = filter;
        self
    }

    pub(crate) fn with_cardinality_limit(mut self, limit: usize) -> Self {
        self.cardinality_limit = limit;
        self
    }

    fn build(self, aggregate: Aggregate) -> MetricStream {
        MetricStream {
            name: self.name,
            description: self.description,
            unit: self.unit,
            filter: self.filter,
            provider_start: self.provider_start,
            first_record: OnceLock::new(),
            aggregate,
        }
    }

    /// Builds a sum aggregate that adds every measurement.
    pub(crate) fn sum(self, monotonic: bool) -> MetricStream {
        let limit = self.cardinality_limit;
        self.build(Aggregate::Sum(Sum::new(monotonic, false, limit)))
    }

    /// Builds a sum aggregate whose measurements are cumulative totals.
    pub(crate) fn precomputed_sum(self, monotonic: bool) -> MetricStream {
        let limit = self.cardinality_limit;
        self.build(Aggregate::Sum(Sum::new(monotonic, true, limit)))
    }

    /// Builds a histogram aggregate with fixed bucket boundaries.
    pub(crate) fn explicit_bucket_histogram(
        self,
        boundaries: Vec<f64>,
        record_min_max: bool,
    ) -> MetricStream {
        let limit = self.cardinality_limit;
        self.build(Aggregate::Histogram(Histogram::new(
            boundaries,
            record_min_max,
            limit,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::data::AggregatedMetrics;
    use tally::KeyValue;

    fn builder() -> AggregateBuilder {
        AggregateBuilder::new("requests".into(), "".into(), "".into(), SystemTime::now())
    }

    #[test]
    fn nothing_recorded_yields_no_metric() {
        assert!(builder().sum(true).collect().is_none());
        assert!(builder()
            .explicit_bucket_histogram(vec![1.0], true)
            .collect()
            .is_none());
    }

    #[test]
    fn filter_merges_series() {
        let stream = builder()
            .with_filter(Some(Arc::new(HashSet::from([Key::new("path")]))))
            .sum(true);
        for method in ["GET", "POST"] {
            let attrs = AttributeSet::try_from(
                &[KeyValue::new("path", "/a"), KeyValue::new("method", method)][..],
            )
            .unwrap();
            stream.measure(1.0, &attrs);
        }

        let metric = stream.collect().unwrap();
        let AggregatedMetrics::Sum(sum) = metric.data else {
            panic!("expected sum");
        };
        assert_eq!(sum.data_points.len(), 1);
        assert_eq!(sum.data_points[0].attributes, vec![KeyValue::new("path", "/a")]);
        assert_eq!(sum.data_points[0].value, 2.0);
    }

    #[test]
    fn start_time_is_first_record() {
        let provider_start = SystemTime::UNIX_EPOCH;
        let stream =
            AggregateBuilder::new("c".into(), "".into(), "".into(), provider_start).sum(true);
        stream.measure(1.0, &AttributeSet::empty());
        stream.measure(1.0, &AttributeSet::empty());

        let first = stream.collect().unwrap();
        let second = stream.collect().unwrap();
        let (AggregatedMetrics::Sum(a), AggregatedMetrics::Sum(b)) = (first.data, second.data)
        else {
            panic!("expected sums");
        };
        assert!(a.data_points[0].start_time > provider_start);
        assert_eq!(a.data_points[0].start_time, b.data_points[0].start_time);
        assert!(b.data_points[0].time >= a.data_points[0].time);
    }
}
