//! The metrics aggregation engine.
//!
//! ## Configuration
//!
//! Configuration is stored with each [SdkMeterProvider]: the [Resource],
//! the [View]s, and the [ManualReader] or [PeriodicReader] instances that
//! collect from it.
//!
//! ### Example
//!
//! ```
//! use tally::KeyValue;
//! use tally_sdk::{global, metrics::SdkMeterProvider, Resource};
//!
//! // Generate SDK configuration, resource, views, etc
//! let resource = Resource::builder().build(); // default attributes about the current process
//!
//! // Create a meter provider with the desired config
//! let meter_provider = SdkMeterProvider::builder().with_resource(resource).build();
//! global::set_meter_provider(Some(meter_provider.clone()));
//!
//! // Use the meter provider to create meter instances
//! let meter = global::meter("my_app");
//!
//! // Create instruments scoped to the meter
//! let counter = meter
//!     .f64_counter("power_consumption")
//!     .with_unit("kWh")
//!     .build()
//!     .unwrap();
//!
//! // use instruments to record measurements
//! counter.add(10.0, &[KeyValue::new("rate", "standard")]).unwrap();
//!
//! // shutdown the provider at the end of the application to ensure any metrics not yet
//! // exported are flushed.
//! meter_provider.shutdown().unwrap();
//! ```
//!
//! ## Aggregation
//!
//! Every instrument keeps one aggregator per distinct attribute set.
//! Counters and observable counters aggregate into a [Sum](data::Sum) and
//! histograms into explicit-bucket [Histogram](data::Histogram)s, unless a
//! view says otherwise. Reported values are always cumulative since the
//! series started.
//!
//! [Resource]: crate::Resource

pub(crate) mod aggregation;
pub mod data;
mod error;
pub mod exporter;
pub(crate) mod instrument;
mod instruments;
pub(crate) mod internal;
pub(crate) mod manual_reader;
pub(crate) mod meter;
mod meter_provider;
pub(crate) mod periodic_reader;
pub(crate) mod pipeline;
pub mod reader;
pub(crate) mod view;

/// In-Memory metric exporter for testing purpose.
#[cfg(any(feature = "testing", test))]
#[cfg_attr(docsrs, doc(cfg(any(feature = "testing", test))))]
pub mod in_memory_exporter;
#[cfg(any(feature = "testing", test))]
#[cfg_attr(docsrs, doc(cfg(any(feature = "testing", test))))]
pub use in_memory_exporter::InMemoryMetricExporter;

pub use aggregation::*;
pub use error::{MetricError, MetricResult};
pub use exporter::PushMetricExporter;
pub use instrument::{Instrument, InstrumentKind, Stream, StreamBuilder};
pub use instruments::{
    AsyncInstrumentBuilder, Callback, Counter, Histogram, HistogramBuilder, InstrumentBuilder,
    ObservableCounter, Observer,
};
pub use manual_reader::*;
pub use meter::Meter;
pub use meter_provider::*;
pub use periodic_reader::*;
pub use pipeline::Pipeline;
pub use reader::MetricReader;
pub use view::*;

/// Defines the window that an aggregation was calculated over.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Temporality {
    /// A measurement interval that continues to expand forward in time from a
    /// starting point.
    ///
    /// New measurements are added to all previous measurements since a start time.
    #[default]
    Cumulative,
}
