use std::{borrow::Cow, collections::HashSet, sync::Arc};

use tally::{InstrumentationScope, Key};

use super::aggregation::{validate_bucket_boundaries, Aggregation};
use super::{MetricError, MetricResult};

/// Longest accepted instrument or stream name.
const MAX_NAME_LEN: usize = 255;
/// Longest accepted unit.
const MAX_UNIT_LEN: usize = 63;

const EMPTY_NAME: &str = "instrument name must be non-empty";
const NAME_TOO_LONG: &str = "instrument name must be at most 255 characters";
const NAME_BAD_START: &str = "instrument name must start with an ASCII letter";
const NAME_BAD_CHAR: &str =
    "instrument name may only contain ASCII letters, digits, '_', '.', '-' and '/'";
const UNIT_TOO_LONG: &str = "instrument unit must be at most 63 characters";
const UNIT_NOT_ASCII: &str = "instrument unit must be ASCII";

/// The identifier of a group of instruments that all perform the same function.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum InstrumentKind {
    /// Records non-negative increments synchronously with the code path
    /// being measured.
    Counter,
    /// Reports a cumulative, non-decreasing total from a callback run at
    /// collection time.
    ObservableCounter,
    /// Records a distribution of values synchronously with the code path
    /// being measured.
    Histogram,
}

impl InstrumentKind {
    /// Counters only accept non-negative measurements.
    pub(crate) fn is_monotonic(&self) -> bool {
        matches!(self, InstrumentKind::Counter | InstrumentKind::ObservableCounter)
    }
}

/// Describes an instrument at creation time. Views select instruments by
/// looking at it.
///
/// # Example
///
/// ```rust
/// use tally_sdk::metrics::{Instrument, Stream};
///
/// let my_view_change_cardinality = |i: &Instrument| {
///     if i.name() == "my_second_histogram" {
///         Stream::builder().with_cardinality_limit(2).build().ok()
///     } else {
///         None
///     }
/// };
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Instrument {
    pub(crate) name: Cow<'static, str>,
    pub(crate) description: Cow<'static, str>,
    pub(crate) kind: InstrumentKind,
    pub(crate) unit: Cow<'static, str>,
    pub(crate) scope: InstrumentationScope,
}

impl Instrument {
    /// Instrument name.
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    /// Instrument description.
    pub fn description(&self) -> &str {
        self.description.as_ref()
    }

    /// Instrument kind.
    pub fn kind(&self) -> InstrumentKind {
        self.kind
    }

    /// Instrument unit.
    pub fn unit(&self) -> &str {
        self.unit.as_ref()
    }

    /// The meter that created the instrument.
    pub fn scope(&self) -> &InstrumentationScope {
        &self.scope
    }
}

/// A builder for [`Stream`].
///
/// # Example
///
/// ```
/// use tally_sdk::metrics::{Aggregation, Stream};
///
/// let stream = Stream::builder()
///     .with_name("my_stream")
///     .with_aggregation(Aggregation::Sum)
///     .with_cardinality_limit(100)
///     .build()
///     .unwrap();
/// ```
#[derive(Default, Debug)]
pub struct StreamBuilder {
    name: Option<Cow<'static, str>>,
    description: Option<Cow<'static, str>>,
    unit: Option<Cow<'static, str>>,
    aggregation: Option<Aggregation>,
    allowed_attribute_keys: Option<Arc<HashSet<Key>>>,
    cardinality_limit: Option<usize>,
}

impl StreamBuilder {
    /// Set the stream name. Defaults to the instrument name.
    pub fn with_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the stream description. Defaults to the instrument description.
    pub fn with_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the stream unit. Defaults to the instrument unit.
    pub fn with_unit(mut self, unit: impl Into<Cow<'static, str>>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Set the aggregation. Defaults to the one implied by the instrument
    /// kind.
    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = Some(aggregation);
        self
    }

    /// Keep only these attribute keys; every other attribute is dropped
    /// before aggregation. An empty list drops all attributes.
    pub fn with_allowed_attribute_keys(
        mut self,
        attribute_keys: impl IntoIterator<Item = Key>,
    ) -> Self {
        self.allowed_attribute_keys = Some(Arc::new(attribute_keys.into_iter().collect()));
        self
    }

    /// Set the maximum number of distinct attribute sets. Defaults to 2000.
    pub fn with_cardinality_limit(mut self, limit: usize) -> Self {
        self.cardinality_limit = Some(limit);
        self
    }

    /// Validates the configuration and builds the [`Stream`].
    pub fn build(self) -> MetricResult<Stream> {
        if let Some(name) = &self.name {
            validate_instrument_name(name)?;
        }
        if let Some(unit) = &self.unit {
            validate_instrument_unit(unit)?;
        }
        if self.cardinality_limit == Some(0) {
            return Err(MetricError::Config(
                "cardinality limit must be greater than 0".into(),
            ));
        }
        if let Some(Aggregation::ExplicitBucketHistogram { boundaries, .. }) = &self.aggregation {
            validate_bucket_boundaries(boundaries)?;
        }

        Ok(Stream {
            name: self.name,
            description: self.description,
            unit: self.unit,
            aggregation: self.aggregation,
            allowed_attribute_keys: self.allowed_attribute_keys,
            cardinality_limit: self.cardinality_limit,
        })
    }
}

/// The output a view applies to the instruments it matches. Unset fields
/// keep the instrument's own values.
#[derive(Clone, Default, Debug)]
pub struct Stream {
    pub(crate) name: Option<Cow<'static, str>>,
    pub(crate) description: Option<Cow<'static, str>>,
    pub(crate) unit: Option<Cow<'static, str>>,
    pub(crate) aggregation: Option<Aggregation>,
    /// `None` keeps every attribute.
    pub(crate) allowed_attribute_keys: Option<Arc<HashSet<Key>>>,
    pub(crate) cardinality_limit: Option<usize>,
}

impl Stream {
    /// Create a new stream builder with default values.
    pub fn builder() -> StreamBuilder {
        StreamBuilder::default()
    }
}

/// Checks a name against the naming rules shared by instruments and
/// streams.
pub(crate) fn validate_instrument_name(name: &str) -> MetricResult<()> {
    let problem = match name.chars().next() {
        None => Some(EMPTY_NAME),
        Some(_) if name.len() > MAX_NAME_LEN => Some(NAME_TOO_LONG),
        Some(first) if !first.is_ascii_alphabetic() => Some(NAME_BAD_START),
        Some(_) => name
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '/')))
            .then_some(NAME_BAD_CHAR),
    };
    problem.map_or(Ok(()), |msg| {
        Err(MetricError::InvalidInstrumentConfiguration(msg))
    })
}

pub(crate) fn validate_instrument_unit(unit: &str) -> MetricResult<()> {
    if unit.len() > MAX_UNIT_LEN {
        Err(MetricError::InvalidInstrumentConfiguration(UNIT_TOO_LONG))
    } else if !unit.is_ascii() {
        Err(MetricError::InvalidInstrumentConfiguration(UNIT_NOT_ASCII))
    } else {
        Ok(())
    }
}
