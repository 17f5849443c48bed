//! Errors returned by lifecycle operations: flush, shutdown and export.
use std::time::Duration;
use thiserror::Error;

/// Failure of a flush, shutdown or export.
///
/// Export failures never reach the code recording measurements. Periodic
/// readers log them and carry on with the next cycle; only explicit calls
/// such as [`force_flush`] or [`shutdown`] hand them back to the caller.
///
/// [`force_flush`]: crate::metrics::SdkMeterProvider::force_flush
/// [`shutdown`]: crate::metrics::SdkMeterProvider::shutdown
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SdkError {
    /// The component was already shut down.
    #[error("Already shut down")]
    AlreadyShutdown,

    /// The operation did not complete in time. For exports the in-flight
    /// attempt is abandoned, not cancelled.
    #[error("Operation timed out after {} milliseconds", .0.as_millis())]
    Timeout(Duration),

    /// Any other failure, including an exporter rejecting a batch.
    #[error("Operation failed: {0}")]
    InternalFailure(String),
}

/// Result of a lifecycle operation.
pub type SdkResult = Result<(), SdkError>;
