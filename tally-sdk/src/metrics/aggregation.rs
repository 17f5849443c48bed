use std::fmt;

use super::{MetricError, MetricResult};

/// Bucket boundaries used for histograms when neither a view nor the
/// instrument supplies any.
pub const DEFAULT_HISTOGRAM_BOUNDARIES: [f64; 15] = [
    0.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 250.0, 500.0, 750.0, 1000.0, 2500.0, 5000.0, 7500.0,
    10000.0,
];

/// The way recorded measurements are summarized.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Aggregation {
    /// Discard every measurement. The instrument produces no metric.
    Drop,

    /// Use the default for the instrument kind: [`Aggregation::Sum`] for
    /// counters, [`Aggregation::ExplicitBucketHistogram`] with
    /// [`DEFAULT_HISTOGRAM_BOUNDARIES`] for histograms.
    Default,

    /// Arithmetic sum of the measurements.
    Sum,

    /// Histogram with fixed bucket boundaries.
    ExplicitBucketHistogram {
        /// Strictly increasing, finite upper bounds.
        ///
        /// A measurement lands in the first bucket whose bound is greater
        /// than or equal to it, so `[10.0, 20.0]` defines the buckets
        /// `(-∞, 10]`, `(10, 20]` and `(20, +∞)`.
        boundaries: Vec<f64>,

        /// Whether to track the minimum and maximum measurement.
        record_min_max: bool,
    },
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Aggregation::Drop => "Drop",
            Aggregation::Default => "Default",
            Aggregation::Sum => "Sum",
            Aggregation::ExplicitBucketHistogram { .. } => "ExplicitBucketHistogram",
        };

        f.write_str(name)
    }
}

impl Aggregation {
    /// Checks the configuration, namely histogram boundaries.
    pub fn validate(&self) -> MetricResult<()> {
        match self {
            Aggregation::Drop | Aggregation::Default | Aggregation::Sum => Ok(()),
            Aggregation::ExplicitBucketHistogram { boundaries, .. } => {
                validate_bucket_boundaries(boundaries)
            }
        }
    }
}

pub(crate) fn validate_bucket_boundaries(boundaries: &[f64]) -> MetricResult<()> {
    if boundaries.iter().any(|b| !b.is_finite()) {
        return Err(MetricError::Config(format!(
            "histogram boundaries must not contain NaN or infinite values: {boundaries:?}"
        )));
    }

    if boundaries.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(MetricError::Config(format!(
            "histogram boundaries must be strictly increasing: {boundaries:?}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_boundaries_validation() {
        let valid = Aggregation::ExplicitBucketHistogram {
            boundaries: vec![10.0, 20.0],
            record_min_max: true,
        };
        assert!(valid.validate().is_ok());
        assert!(Aggregation::ExplicitBucketHistogram {
            boundaries: DEFAULT_HISTOGRAM_BOUNDARIES.to_vec(),
            record_min_max: false,
        }
        .validate()
        .is_ok());

        for bad in [
            vec![20.0, 10.0],
            vec![10.0, 10.0],
            vec![1.0, f64::NAN],
            vec![f64::NEG_INFINITY, 0.0],
        ] {
            let agg = Aggregation::ExplicitBucketHistogram {
                boundaries: bad.clone(),
                record_min_max: true,
            };
            assert!(
                matches!(agg.validate(), Err(MetricError::Config(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn empty_boundaries_are_a_single_bucket() {
        let agg = Aggregation::ExplicitBucketHistogram {
            boundaries: vec![],
            record_min_max: true,
        };
        assert!(agg.validate().is_ok());
    }
}
