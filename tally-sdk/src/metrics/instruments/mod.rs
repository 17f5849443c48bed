//! Instrument handles and the builders that create them.

use core::fmt;
use std::{borrow::Cow, marker, sync::Arc};

use tally::{AttributeSet, KeyValue};

use crate::metrics::{
    instrument::InstrumentKind,
    internal::MetricStream,
    meter::{InstrumentDescriptor, Meter, Registration},
    MetricError, MetricResult,
};

mod counter;
mod histogram;

pub use counter::{Counter, ObservableCounter};
pub use histogram::Histogram;

/// The shared state behind every handle of one instrument.
pub(crate) struct ResolvedInstrument {
    name: Cow<'static, str>,
    pub(crate) kind: InstrumentKind,
    /// `None` when a view dropped the instrument or the meter is inert.
    stream: Option<Arc<MetricStream>>,
}

impl fmt::Debug for ResolvedInstrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedInstrument")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

impl ResolvedInstrument {
    pub(crate) fn new(
        name: Cow<'static, str>,
        kind: InstrumentKind,
        stream: Option<Arc<MetricStream>>,
    ) -> Self {
        ResolvedInstrument { name, kind, stream }
    }

    /// Validates a measurement and hands it to the aggregator.
    ///
    /// Nothing is recorded if the value or any attribute is rejected.
    pub(crate) fn measure(&self, value: f64, attributes: &[KeyValue]) -> MetricResult<()> {
        if !value.is_finite() {
            return Err(MetricError::InvalidMeasurement {
                value,
                reason: "value must be finite",
            });
        }
        if self.kind.is_monotonic() && value < 0.0 {
            return Err(MetricError::InvalidMeasurement {
                value,
                reason: "counters only accept non-negative values",
            });
        }

        let attributes = AttributeSet::try_from(attributes)?;
        if let Some(stream) = &self.stream {
            stream.measure(value, &attributes);
        }
        Ok(())
    }
}

/// Configuration for building a synchronous instrument.
pub struct InstrumentBuilder<'a, T> {
    meter: &'a Meter,
    name: Cow<'static, str>,
    description: Option<Cow<'static, str>>,
    unit: Option<Cow<'static, str>>,
    _marker: marker::PhantomData<T>,
}

impl<'a, T> InstrumentBuilder<'a, T> {
    pub(crate) fn new(meter: &'a Meter, name: Cow<'static, str>) -> Self {
        InstrumentBuilder {
            meter,
            name,
            description: None,
            unit: None,
            _marker: marker::PhantomData,
        }
    }

    /// Set the description for this instrument
    pub fn with_description<S: Into<Cow<'static, str>>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the unit for this instrument.
    ///
    /// Unit is case sensitive(`kb` is not the same as `kB`).
    ///
    /// Unit must be:
    /// - ASCII string
    /// - No longer than 63 characters
    pub fn with_unit<S: Into<Cow<'static, str>>>(mut self, unit: S) -> Self {
        self.unit = Some(unit.into());
        self
    }

    fn register(
        self,
        kind: InstrumentKind,
        registration: Registration,
    ) -> MetricResult<Arc<ResolvedInstrument>> {
        self.meter.sdk().register(
            InstrumentDescriptor {
                name: self.name,
                description: self.description.unwrap_or_default(),
                unit: self.unit.unwrap_or_default(),
                kind,
                boundaries: None,
            },
            registration,
        )
    }
}

impl InstrumentBuilder<'_, Counter> {
    /// Returns the counter registered under this name, creating it if needed.
    pub fn build(self) -> MetricResult<Counter> {
        self.register(InstrumentKind::Counter, Registration::GetOrCreate)
            .map(Counter::new)
    }

    /// Creates the counter, failing if the name is already registered.
    pub fn create(self) -> MetricResult<Counter> {
        self.register(InstrumentKind::Counter, Registration::Strict)
            .map(Counter::new)
    }
}

impl<T> fmt::Debug for InstrumentBuilder<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentBuilder")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("unit", &self.unit)
            .field("kind", &std::any::type_name::<T>())
            .finish()
    }
}

/// Configuration for building a [`Histogram`].
pub struct HistogramBuilder<'a> {
    meter: &'a Meter,
    name: Cow<'static, str>,
    description: Option<Cow<'static, str>>,
    unit: Option<Cow<'static, str>>,
    boundaries: Option<Vec<f64>>,
}

impl<'a> HistogramBuilder<'a> {
    pub(crate) fn new(meter: &'a Meter, name: Cow<'static, str>) -> Self {
        HistogramBuilder {
            meter,
            name,
            description: None,
            unit: None,
            boundaries: None,
        }
    }

    /// Set the description for this instrument
    pub fn with_description<S: Into<Cow<'static, str>>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the unit for this instrument.
    pub fn with_unit<S: Into<Cow<'static, str>>>(mut self, unit: S) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Suggest bucket boundaries for this histogram.
    ///
    /// They are used only when no view configures the aggregation. They must
    /// be finite and strictly increasing.
    pub fn with_boundaries(mut self, boundaries: Vec<f64>) -> Self {
        self.boundaries = Some(boundaries);
        self
    }

    fn register(self, registration: Registration) -> MetricResult<Histogram> {
        self.meter
            .sdk()
            .register(
                InstrumentDescriptor {
                    name: self.name,
                    description: self.description.unwrap_or_default(),
                    unit: self.unit.unwrap_or_default(),
                    kind: InstrumentKind::Histogram,
                    boundaries: self.boundaries,
                },
                registration,
            )
            .map(Histogram::new)
    }

    /// Returns the histogram registered under this name, creating it if
    /// needed. Boundaries of an existing histogram are not changed.
    pub fn build(self) -> MetricResult<Histogram> {
        self.register(Registration::GetOrCreate)
    }

    /// Creates the histogram, failing if the name is already registered.
    pub fn create(self) -> MetricResult<Histogram> {
        self.register(Registration::Strict)
    }
}

impl fmt::Debug for HistogramBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistogramBuilder")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("unit", &self.unit)
            .field("boundaries", &self.boundaries)
            .finish()
    }
}

/// Reports measurements from inside an observable instrument's callback.
#[derive(Clone)]
pub struct Observer {
    inner: Arc<ResolvedInstrument>,
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("instrument", &self.inner.name)
            .finish()
    }
}

impl Observer {
    /// Reports the current cumulative total for `attributes`.
    ///
    /// The value replaces the total previously observed for the same
    /// attributes. Series that are not observed again keep their last value.
    pub fn observe(&self, value: f64, attributes: &[KeyValue]) -> MetricResult<()> {
        self.inner.measure(value, attributes)
    }
}

/// A function registered with a [Meter] that makes observations for the
/// instrument it is registered with.
///
/// It runs at the start of every collection and must complete in a finite
/// amount of time.
pub type Callback = Box<dyn Fn(&Observer) + Send + Sync>;

/// Configuration for building an asynchronous instrument.
pub struct AsyncInstrumentBuilder<'a, I> {
    meter: &'a Meter,
    name: Cow<'static, str>,
    description: Option<Cow<'static, str>>,
    unit: Option<Cow<'static, str>>,
    callbacks: Vec<Callback>,
    _inst: marker::PhantomData<I>,
}

impl<'a, I> AsyncInstrumentBuilder<'a, I> {
    pub(crate) fn new(meter: &'a Meter, name: Cow<'static, str>) -> Self {
        AsyncInstrumentBuilder {
            meter,
            name,
            description: None,
            unit: None,
            callbacks: Vec::new(),
            _inst: marker::PhantomData,
        }
    }

    /// Set the description for this instrument
    pub fn with_description<S: Into<Cow<'static, str>>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the unit for this instrument.
    pub fn with_unit<S: Into<Cow<'static, str>>>(mut self, unit: S) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Set the callback to be called for this instrument.
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Observer) + Send + Sync + 'static,
    {
        self.callbacks.push(Box::new(callback));
        self
    }
}

impl AsyncInstrumentBuilder<'_, ObservableCounter> {
    fn register(self, registration: Registration) -> MetricResult<ObservableCounter> {
        let sdk = self.meter.sdk();
        let inner = sdk.register(
            InstrumentDescriptor {
                name: self.name,
                description: self.description.unwrap_or_default(),
                unit: self.unit.unwrap_or_default(),
                kind: InstrumentKind::ObservableCounter,
                boundaries: None,
            },
            registration,
        )?;

        for callback in self.callbacks {
            let observer = Observer {
                inner: Arc::clone(&inner),
            };
            sdk.register_callback(Arc::new(move || callback(&observer)))?;
        }

        Ok(ObservableCounter::new(inner))
    }

    /// Returns the observable counter registered under this name, creating
    /// it if needed. The callbacks are added to the instrument either way.
    pub fn build(self) -> MetricResult<ObservableCounter> {
        self.register(Registration::GetOrCreate)
    }

    /// Creates the observable counter, failing if the name is already
    /// registered.
    pub fn create(self) -> MetricResult<ObservableCounter> {
        self.register(Registration::Strict)
    }
}

impl<I> fmt::Debug for AsyncInstrumentBuilder<'_, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncInstrumentBuilder")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("unit", &self.unit)
            .field("kind", &std::any::type_name::<I>())
            .field("callbacks_len", &self.callbacks.len())
            .finish()
    }
}
