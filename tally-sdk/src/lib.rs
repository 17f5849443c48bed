//! An in-process metrics aggregation engine.
//!
//! Applications record measurements through instruments obtained from a
//! [`Meter`](metrics::Meter). The engine aggregates them per attribute set,
//! and readers turn the live state into cumulative snapshots, either on
//! demand ([`ManualReader`](metrics::ManualReader)) or on a timer that pushes
//! to an exporter ([`PeriodicReader`](metrics::PeriodicReader)).
//!
//! # Getting started
//!
//! ```
//! use tally::KeyValue;
//! use tally_sdk::metrics::{ManualReader, MetricReader, SdkMeterProvider};
//! use tally_sdk::Resource;
//!
//! let reader = ManualReader::new();
//! let provider = SdkMeterProvider::builder()
//!     .with_resource(Resource::builder().with_service_name("checkout").build())
//!     .with_reader(reader.clone())
//!     .build();
//!
//! let meter = provider.meter("checkout.http");
//! let requests = meter.f64_counter("requests").build().unwrap();
//! requests.add(1.0, &[KeyValue::new("path", "/cart")]).unwrap();
//!
//! let snapshot = reader.collect().unwrap();
//! assert_eq!(snapshot.scope_metrics[0].metrics[0].name, "requests");
//!
//! provider.shutdown().unwrap();
//! ```
//!
//! # Crate Feature Flags
//!
//! * `internal-logs`: emits the engine's own diagnostics as `tracing`
//!   events. Enabled by default.
//! * `testing`: exposes
//!   [`InMemoryMetricExporter`](metrics::InMemoryMetricExporter) for tests
//!   of code that uses this crate.
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

pub mod error;
pub mod global;
pub mod metrics;
pub mod resource;

pub use resource::Resource;
