use core::fmt;
use std::{
    borrow::Cow,
    collections::{hash_map::Entry, HashMap},
    sync::{Arc, Mutex},
};

use tally::{tally_debug, tally_warn, InstrumentationScope};

use crate::metrics::{
    aggregation::validate_bucket_boundaries,
    instrument::{validate_instrument_name, validate_instrument_unit, Instrument, InstrumentKind},
    instruments::{
        AsyncInstrumentBuilder, Counter, HistogramBuilder, InstrumentBuilder, ObservableCounter,
        ResolvedInstrument,
    },
    pipeline::{GenericCallback, Pipeline},
    MetricError, MetricResult,
};

/// Creates and owns the instruments of one instrumentation scope.
///
/// Obtained from [`SdkMeterProvider::meter`](super::SdkMeterProvider::meter)
/// and cheap to clone. Meters are append-only: instruments live as long as
/// the meter.
///
/// Instrument names are case-insensitive. Asking for an existing name with
/// `build` returns the registered instrument when the kind matches and fails
/// with [`MetricError::InstrumentKindConflict`] otherwise; `create` fails with
/// [`MetricError::DuplicateInstrumentName`] for any existing name.
///
/// # Example
///
/// ```
/// use tally::KeyValue;
/// use tally_sdk::metrics::SdkMeterProvider;
///
/// let provider = SdkMeterProvider::default();
/// let meter = provider.meter("my-library");
///
/// let requests = meter
///     .f64_counter("http.requests")
///     .with_description("Served requests")
///     .build()
///     .unwrap();
/// requests.add(1.0, &[KeyValue::new("path", "/")]).unwrap();
///
/// let latency = meter
///     .f64_histogram("http.latency")
///     .with_unit("ms")
///     .with_boundaries(vec![10.0, 100.0, 1000.0])
///     .build()
///     .unwrap();
/// latency.record(42.0, &[]).unwrap();
/// ```
#[derive(Clone)]
pub struct Meter {
    inner: Arc<SdkMeter>,
}

impl fmt::Debug for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Meter")
            .field("scope", &self.inner.scope)
            .finish()
    }
}

impl Meter {
    pub(crate) fn new(inner: Arc<SdkMeter>) -> Self {
        Meter { inner }
    }

    /// Creates a builder for a monotonic [`Counter`].
    pub fn f64_counter(&self, name: impl Into<Cow<'static, str>>) -> InstrumentBuilder<'_, Counter> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Creates a builder for a [`Histogram`](super::Histogram).
    pub fn f64_histogram(&self, name: impl Into<Cow<'static, str>>) -> HistogramBuilder<'_> {
        HistogramBuilder::new(self, name.into())
    }

    /// Creates a builder for an [`ObservableCounter`].
    pub fn f64_observable_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> AsyncInstrumentBuilder<'_, ObservableCounter> {
        AsyncInstrumentBuilder::new(self, name.into())
    }

    /// The identity of this meter.
    pub fn scope(&self) -> &InstrumentationScope {
        &self.inner.scope
    }

    pub(crate) fn sdk(&self) -> &SdkMeter {
        &self.inner
    }
}

/// Everything an instrument builder collected.
pub(crate) struct InstrumentDescriptor {
    pub(crate) name: Cow<'static, str>,
    pub(crate) description: Cow<'static, str>,
    pub(crate) unit: Cow<'static, str>,
    pub(crate) kind: InstrumentKind,
    pub(crate) boundaries: Option<Vec<f64>>,
}

/// How to treat a name that is already registered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Registration {
    GetOrCreate,
    Strict,
}

struct RegisteredInstrument {
    description: Cow<'static, str>,
    unit: Cow<'static, str>,
    instrument: Arc<ResolvedInstrument>,
}

/// The registry behind a [`Meter`].
pub(crate) struct SdkMeter {
    scope: InstrumentationScope,
    /// `None` once the provider is shut down; new instruments record nothing.
    pipeline: Option<Arc<Pipeline>>,
    instruments: Mutex<HashMap<String, RegisteredInstrument>>,
}

impl fmt::Debug for SdkMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkMeter")
            .field("scope", &self.scope)
            .field("inert", &self.pipeline.is_none())
            .finish()
    }
}

impl SdkMeter {
    pub(crate) fn new(scope: InstrumentationScope, pipeline: Arc<Pipeline>) -> Self {
        SdkMeter {
            scope,
            pipeline: Some(pipeline),
            instruments: Mutex::new(HashMap::new()),
        }
    }

    /// A meter whose instruments validate input but aggregate nothing.
    pub(crate) fn inert(scope: InstrumentationScope) -> Self {
        SdkMeter {
            scope,
            pipeline: None,
            instruments: Mutex::new(HashMap::new()),
        }
    }

    /// Registers an instrument, resolving its stream against the views.
    ///
    /// Resolution happens once; the returned instrument keeps that stream
    /// for its whole life.
    pub(crate) fn register(
        &self,
        descriptor: InstrumentDescriptor,
        registration: Registration,
    ) -> MetricResult<Arc<ResolvedInstrument>> {
        validate_instrument_name(&descriptor.name)?;
        validate_instrument_unit(&descriptor.unit)?;
        if let Some(boundaries) = &descriptor.boundaries {
            validate_bucket_boundaries(boundaries)?;
        }

        let mut instruments = self.instruments.lock()?;
        let entry = match instruments.entry(descriptor.name.to_lowercase()) {
            Entry::Occupied(existing) => {
                let existing = existing.get();
                if registration == Registration::Strict {
                    return Err(MetricError::DuplicateInstrumentName(
                        descriptor.name.into_owned(),
                    ));
                }
                if existing.instrument.kind != descriptor.kind {
                    return Err(MetricError::InstrumentKindConflict {
                        name: descriptor.name.into_owned(),
                        existing: existing.instrument.kind,
                        requested: descriptor.kind,
                    });
                }
                if existing.description != descriptor.description
                    || existing.unit != descriptor.unit
                {
                    tally_warn!(
                        name: "Meter.DuplicateInstrumentDescription",
                        meter_name = self.scope.name().to_owned(),
                        instrument_name = descriptor.name.into_owned(),
                        message = "Returning the existing instrument; the new description and unit are ignored."
                    );
                }
                return Ok(Arc::clone(&existing.instrument));
            }
            Entry::Vacant(entry) => entry,
        };

        let stream = match &self.pipeline {
            Some(pipeline) => pipeline.resolve(
                &Instrument {
                    name: descriptor.name.clone(),
                    description: descriptor.description.clone(),
                    kind: descriptor.kind,
                    unit: descriptor.unit.clone(),
                    scope: self.scope.clone(),
                },
                descriptor.boundaries.as_deref(),
            )?,
            None => None,
        };

        tally_debug!(
            name: "Meter.InstrumentRegistered",
            meter_name = self.scope.name().to_owned(),
            instrument_name = descriptor.name.to_string(),
            aggregated = stream.is_some()
        );

        let instrument = Arc::new(ResolvedInstrument::new(
            descriptor.name,
            descriptor.kind,
            stream,
        ));
        entry.insert(RegisteredInstrument {
            description: descriptor.description,
            unit: descriptor.unit,
            instrument: Arc::clone(&instrument),
        });
        Ok(instrument)
    }

    /// Runs `callback` at the start of every collection.
    pub(crate) fn register_callback(&self, callback: GenericCallback) -> MetricResult<()> {
        match &self.pipeline {
            Some(pipeline) => pipeline.add_callback(callback),
            None => Ok(()),
        }
    }
}
