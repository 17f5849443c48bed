use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use tally::AttributeSet;

use crate::metrics::data::{self, HistogramDataPoint};
use crate::metrics::Temporality;

use super::{Aggregator, ValueMap};

struct HistogramTracker {
    buckets: Mutex<Buckets>,
}

impl Aggregator for HistogramTracker {
    /// Number of buckets.
    type InitConfig = usize;
    /// Value and bucket index
    type PreComputedValue = (f64, usize);

    fn create(count: &usize) -> Self {
        HistogramTracker {
            buckets: Mutex::new(Buckets::new(*count)),
        }
    }

    fn update(&self, (value, index): (f64, usize)) {
        let mut buckets = match self.buckets.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };

        buckets.bin(index, value);
    }
}

#[derive(Clone)]
struct Buckets {
    counts: Vec<u64>,
    count: u64,
    total: f64,
    min: f64,
    max: f64,
}

impl Buckets {
    /// returns buckets with `n` bins.
    fn new(n: usize) -> Buckets {
        Buckets {
            counts: vec![0; n],
            count: 0,
            total: 0.0,
            min: f64::MAX,
            max: f64::MIN,
        }
    }

    fn bin(&mut self, idx: usize, value: f64) {
        self.counts[idx] += 1;
        self.count += 1;
        self.total += value;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }
}

/// Summarizes a set of measurements as a histogram with explicitly defined
/// buckets.
pub(crate) struct Histogram {
    value_map: ValueMap<HistogramTracker>,
    bounds: Arc<[f64]>,
    record_min_max: bool,
}

impl Histogram {
    /// `bounds` must already be validated: finite and strictly increasing.
    pub(crate) fn new(bounds: Vec<f64>, record_min_max: bool, cardinality_limit: usize) -> Self {
        let buckets_count = bounds.len() + 1;
        Histogram {
            value_map: ValueMap::new(buckets_count, cardinality_limit),
            bounds: bounds.into(),
            record_min_max,
        }
    }

    pub(crate) fn measure(&self, measurement: f64, attrs: &AttributeSet) {
        // This search will return an index in the range `[0, bounds.len()]`, where
        // it will return `bounds.len()` if value is greater than the last element
        // of `bounds`. This aligns with the buckets in that the length of buckets
        // is `bounds.len()+1`, with the last bucket representing:
        // `(bounds[bounds.len()-1], +∞)`.
        let index = self.bounds.partition_point(|&x| x < measurement);

        self.value_map.measure((measurement, index), attrs);
    }

    pub(crate) fn cumulative(&self, start_time: SystemTime) -> data::Histogram {
        let time = SystemTime::now();
        let mut data_points = Vec::new();
        self.value_map
            .collect_readonly(&mut data_points, |attributes, tracker| {
                let b = tracker
                    .buckets
                    .lock()
                    .unwrap_or_else(|err| err.into_inner())
                    .clone();
                let has_values = b.count > 0;
                HistogramDataPoint {
                    attributes,
                    start_time,
                    time,
                    count: b.count,
                    bounds: self.bounds.to_vec(),
                    bucket_counts: b.counts,
                    sum: b.total,
                    min: (self.record_min_max && has_values).then_some(b.min),
                    max: (self.record_min_max && has_values).then_some(b.max),
                }
            });

        data::Histogram {
            data_points,
            temporality: Temporality::Cumulative,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::internal::DEFAULT_CARDINALITY_LIMIT;
    use tally::KeyValue;

    #[test]
    fn values_on_a_boundary_land_in_the_lower_bucket() {
        let hist = Histogram::new(vec![10.0, 20.0], true, DEFAULT_CARDINALITY_LIMIT);
        let attrs = AttributeSet::try_from(&[KeyValue::new("k", "v")][..]).unwrap();
        for v in [5.0, 10.0, 15.0, 20.0, 25.0] {
            hist.measure(v, &attrs);
        }

        let data = hist.cumulative(SystemTime::now());
        assert_eq!(data.data_points.len(), 1);
        let dp = &data.data_points[0];
        assert_eq!(dp.bucket_counts, vec![2, 2, 1]);
        assert_eq!(dp.bounds, vec![10.0, 20.0]);
        assert_eq!(dp.count, 5);
        assert_eq!(dp.sum, 75.0);
        assert_eq!(dp.min, Some(5.0));
        assert_eq!(dp.max, Some(25.0));
    }

    #[test]
    fn min_max_omitted_when_disabled() {
        let hist = Histogram::new(vec![1.0], false, DEFAULT_CARDINALITY_LIMIT);
        hist.measure(3.0, &AttributeSet::empty());

        let data = hist.cumulative(SystemTime::now());
        let dp = &data.data_points[0];
        assert_eq!(dp.bucket_counts, vec![0, 1]);
        assert_eq!(dp.min, None);
        assert_eq!(dp.max, None);
    }

    #[test]
    fn no_boundaries_is_a_single_bucket() {
        let hist = Histogram::new(vec![], true, DEFAULT_CARDINALITY_LIMIT);
        hist.measure(-3.0, &AttributeSet::empty());
        hist.measure(7.0, &AttributeSet::empty());

        let dp = &hist.cumulative(SystemTime::now()).data_points[0];
        assert_eq!(dp.bucket_counts, vec![2]);
        assert_eq!(dp.sum, 4.0);
    }
}
