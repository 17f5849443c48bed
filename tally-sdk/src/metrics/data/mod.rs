//! Point-in-time snapshots handed to readers and exporters.
//!
//! Everything here is an owned copy. Changing a snapshot never affects the
//! live aggregation state it was taken from.

use std::{borrow::Cow, time::SystemTime};

use tally::{InstrumentationScope, KeyValue};

use crate::Resource;

use super::Temporality;

/// All metrics of one collection, with the [`Resource`] that produced them.
#[derive(Clone, Debug)]
pub struct ResourceMetrics {
    /// The entity that collected the metrics.
    pub resource: Resource,
    /// One entry per meter that had data.
    pub scope_metrics: Vec<ScopeMetrics>,
}

/// The metrics produced by one meter.
#[derive(Clone, Default, Debug)]
pub struct ScopeMetrics {
    /// Identity of the meter.
    pub scope: InstrumentationScope,
    /// One entry per instrument that had data.
    pub metrics: Vec<Metric>,
}

/// Aggregated data of a single instrument.
#[derive(Clone, Debug)]
pub struct Metric {
    /// Instrument name, or the name given by a view.
    pub name: Cow<'static, str>,
    /// Description of the instrument.
    pub description: Cow<'static, str>,
    /// Unit of the measurements.
    pub unit: Cow<'static, str>,
    /// The aggregated data.
    pub data: AggregatedMetrics,
}

/// The aggregated data of a [`Metric`].
#[derive(Clone, Debug)]
pub enum AggregatedMetrics {
    /// Data aggregated as a sum.
    Sum(Sum),
    /// Data aggregated as a histogram.
    Histogram(Histogram),
}

impl From<Sum> for AggregatedMetrics {
    fn from(value: Sum) -> Self {
        AggregatedMetrics::Sum(value)
    }
}

impl From<Histogram> for AggregatedMetrics {
    fn from(value: Histogram) -> Self {
        AggregatedMetrics::Histogram(value)
    }
}

/// One time series of a [`Sum`].
#[derive(Clone, Debug, PartialEq)]
pub struct SumDataPoint {
    /// Attributes identifying the series, sorted by key.
    pub attributes: Vec<KeyValue>,
    /// When the series started accumulating.
    pub start_time: SystemTime,
    /// When the snapshot was taken.
    pub time: SystemTime,
    /// The running total.
    pub value: f64,
}

/// Sum of all measurements of an instrument, per attribute set.
#[derive(Clone, Debug)]
pub struct Sum {
    /// One point per attribute set.
    pub data_points: Vec<SumDataPoint>,
    /// Always [`Temporality::Cumulative`].
    pub temporality: Temporality,
    /// Whether the sum can only grow.
    pub is_monotonic: bool,
}

/// One time series of a [`Histogram`].
#[derive(Clone, Debug, PartialEq)]
pub struct HistogramDataPoint {
    /// Attributes identifying the series, sorted by key.
    pub attributes: Vec<KeyValue>,
    /// When the series started accumulating.
    pub start_time: SystemTime,
    /// When the snapshot was taken.
    pub time: SystemTime,
    /// Number of measurements.
    pub count: u64,
    /// Upper bounds of the buckets, excluding the implicit `+∞` bucket.
    pub bounds: Vec<f64>,
    /// Count per bucket; one longer than `bounds`.
    pub bucket_counts: Vec<u64>,
    /// Sum of the measurements.
    pub sum: f64,
    /// Smallest measurement, if min/max tracking is on.
    pub min: Option<f64>,
    /// Largest measurement, if min/max tracking is on.
    pub max: Option<f64>,
}

/// Distribution of the measurements of an instrument, per attribute set.
#[derive(Clone, Debug)]
pub struct Histogram {
    /// One point per attribute set.
    pub data_points: Vec<HistogramDataPoint>,
    /// Always [`Temporality::Cumulative`].
    pub temporality: Temporality,
}
