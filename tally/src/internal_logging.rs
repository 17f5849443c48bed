#![allow(unused_macros)]
//! Diagnostics emitted by the engine itself.
//!
//! These macros are for tally's own code and for exporter or reader
//! implementations plugged into it, not for general application logging.
//! Each event carries a `name` such as `"MeterProvider.Shutdown"` plus
//! optional `key = value` fields.
//!
//! With the `internal-logs` feature the events go to [`tracing`], using the
//! calling crate's package name as the target, so any `tracing` subscriber
//! can pick them up. Without the feature they compile down to nothing.
//!
//! The `internal-logs` check is evaluated in the crate that expands the
//! macro, so crates using these macros declare the feature themselves and
//! forward it to `tally/internal-logs`.
//!
//! [`tracing`]: https://docs.rs/tracing

/// Log an informational engine event.
///
/// ```rust
/// use tally::tally_info;
/// tally_info!(name: "MeterProvider.Built", readers = 2);
/// ```
// The event name is repeated as a `name` field because the fmt subscriber
// does not print event names.
#[macro_export]
macro_rules! tally_info {
    (name: $name:expr $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::info!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name);
        }

        #[cfg(not(feature = "internal-logs"))]
        {
            let _ = $name;
        }
    };
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::info!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name, $($key = $value),+);
        }

        #[cfg(not(feature = "internal-logs"))]
        {
            let _ = ($name, $($value),+);
        }
    };
}

/// Log a recoverable problem, such as a failed export cycle.
///
/// ```rust
/// use tally::tally_warn;
/// tally_warn!(name: "PeriodicReader.ExportFailed", reason = "connection refused");
/// ```
#[macro_export]
macro_rules! tally_warn {
    (name: $name:expr $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::warn!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name);
        }

        #[cfg(not(feature = "internal-logs"))]
        {
            let _ = $name;
        }
    };
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::warn!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name, $($key = $value),+);
        }

        #[cfg(not(feature = "internal-logs"))]
        {
            let _ = ($name, $($value),+);
        }
    };
}

/// Log a debug-level engine event.
///
/// ```rust
/// use tally::tally_debug;
/// tally_debug!(name: "Meter.InstrumentCreated", instrument = "requests");
/// ```
#[macro_export]
macro_rules! tally_debug {
    (name: $name:expr $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::debug!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name);
        }

        #[cfg(not(feature = "internal-logs"))]
        {
            let _ = $name;
        }
    };
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::debug!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name, $($key = $value),+);
        }

        #[cfg(not(feature = "internal-logs"))]
        {
            let _ = ($name, $($value),+);
        }
    };
}

/// Log an error the engine could not recover from locally.
///
/// ```rust
/// use tally::tally_error;
/// tally_error!(name: "PeriodicReader.ThreadStartFailed", error = "resource unavailable");
/// ```
#[macro_export]
macro_rules! tally_error {
    (name: $name:expr $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::error!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name);
        }

        #[cfg(not(feature = "internal-logs"))]
        {
            let _ = $name;
        }
    };
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::error!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name, $($key = $value),+);
        }

        #[cfg(not(feature = "internal-logs"))]
        {
            let _ = ($name, $($value),+);
        }
    };
}
