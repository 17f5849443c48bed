use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use tally::AttributeSet;

use crate::metrics::data::{self, SumDataPoint};
use crate::metrics::Temporality;

use super::{Aggregator, ValueMap};

/// Running total of one series, stored as the bit pattern of an `f64`.
///
/// Synchronous counters add to it. Observable counters report cumulative
/// totals themselves, so their trackers overwrite the value instead.
pub(crate) struct SumTracker {
    bits: AtomicU64,
    precomputed: bool,
}

impl SumTracker {
    fn add(&self, value: f64) {
        let mut current = self.bits.load(Ordering::Relaxed);
        loop {
            let new = (f64::from_bits(current) + value).to_bits();
            match self
                .bits
                .compare_exchange_weak(current, new, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

impl Aggregator for SumTracker {
    /// Whether measurements are already cumulative totals.
    type InitConfig = bool;
    type PreComputedValue = f64;

    fn create(precomputed: &bool) -> Self {
        SumTracker {
            bits: AtomicU64::new(0.0_f64.to_bits()),
            precomputed: *precomputed,
        }
    }

    fn update(&self, value: f64) {
        if self.precomputed {
            self.bits.store(value.to_bits(), Ordering::Relaxed);
        } else {
            self.add(value);
        }
    }
}

/// Summarizes a set of measurements as their arithmetic sum.
pub(crate) struct Sum {
    value_map: ValueMap<SumTracker>,
    monotonic: bool,
}

impl Sum {
    /// `precomputed` sums take every measurement as the new cumulative
    /// value of its series.
    pub(crate) fn new(monotonic: bool, precomputed: bool, cardinality_limit: usize) -> Self {
        Sum {
            value_map: ValueMap::new(precomputed, cardinality_limit),
            monotonic,
        }
    }

    pub(crate) fn measure(&self, measurement: f64, attrs: &AttributeSet) {
        self.value_map.measure(measurement, attrs);
    }

    pub(crate) fn cumulative(&self, start_time: SystemTime) -> data::Sum {
        let time = SystemTime::now();
        let mut data_points = Vec::new();
        self.value_map
            .collect_readonly(&mut data_points, |attributes, tracker| SumDataPoint {
                attributes,
                start_time,
                time,
                value: tracker.get(),
            });

        data::Sum {
            data_points,
            temporality: Temporality::Cumulative,
            is_monotonic: self.monotonic,
        }
    }
}
