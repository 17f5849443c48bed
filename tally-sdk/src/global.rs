//! The process-wide active meter provider.
//!
//! Applications install one [`SdkMeterProvider`] here so that libraries can
//! obtain meters without having the provider passed to them. The slot starts
//! empty and is never filled implicitly.
//!
//! Replacing or clearing the active provider does not shut the previous one
//! down: it keeps running, and its readers keep collecting, for as long as
//! any handle to it exists. Shutting a provider down removes it from the slot
//! if it is the active one.
//!
//! # Example
//!
//! ```
//! use tally_sdk::{global, metrics::SdkMeterProvider};
//!
//! let provider = SdkMeterProvider::default();
//! global::set_meter_provider(Some(provider.clone()));
//!
//! let counter = global::meter("my_app").f64_counter("jobs").build().unwrap();
//! counter.add(1.0, &[]).unwrap();
//!
//! provider.shutdown().unwrap();
//! assert!(global::meter_provider().is_none());
//! ```

use std::{
    borrow::Cow,
    sync::{OnceLock, RwLock},
};

use tally::{tally_debug, tally_error, tally_info, InstrumentationScope};

use crate::metrics::{meter::SdkMeter, Meter, SdkMeterProvider};

/// The global `MeterProvider` slot.
static GLOBAL_METER_PROVIDER: OnceLock<RwLock<Option<SdkMeterProvider>>> = OnceLock::new();

#[inline]
fn global_meter_provider() -> &'static RwLock<Option<SdkMeterProvider>> {
    GLOBAL_METER_PROVIDER.get_or_init(|| RwLock::new(None))
}

/// Installs `new_provider` as the active provider, or clears the slot when
/// given `None`. Returns the provider that was active before.
///
/// Libraries should NOT call this function. It is intended for
/// applications/executables.
///
/// The returned provider is not shut down; call
/// [`shutdown`](SdkMeterProvider::shutdown) on it to stop its readers.
pub fn set_meter_provider(new_provider: Option<SdkMeterProvider>) -> Option<SdkMeterProvider> {
    let is_set = new_provider.is_some();
    match global_meter_provider().write() {
        Ok(mut provider) => {
            let previous = std::mem::replace(&mut *provider, new_provider);
            if is_set {
                tally_info!(name: "MeterProvider.GlobalSet", message = "Global meter provider is set. Meters can now be created using global::meter().");
            } else {
                tally_info!(name: "MeterProvider.GlobalCleared");
            }
            previous
        }
        Err(_) => {
            tally_error!(name: "MeterProvider.GlobalSetFailed", message = "Setting global meter provider failed. Meters created using global::meter() will not function.");
            None
        }
    }
}

/// Returns a handle to the active provider, if one is installed.
pub fn meter_provider() -> Option<SdkMeterProvider> {
    match global_meter_provider().read() {
        Ok(provider) => provider.clone(),
        Err(_) => {
            tally_error!(name: "MeterProvider.GlobalGetFailed", message = "Getting global meter provider failed.");
            None
        }
    }
}

/// Creates a named [`Meter`] via the active provider.
///
/// This is a more convenient way of expressing
/// `global::meter_provider().map(|p| p.meter(name))`. Without an active
/// provider the returned meter is inert: instruments created from it
/// validate measurements but record nothing.
///
/// **NOTE:** The meter stays bound to the provider that was active when it
/// was created.
pub fn meter(name: impl Into<Cow<'static, str>>) -> Meter {
    meter_with_scope(InstrumentationScope::builder(name).build())
}

/// Creates a [`Meter`] with the given instrumentation scope via the active
/// provider.
pub fn meter_with_scope(scope: InstrumentationScope) -> Meter {
    match meter_provider() {
        Some(provider) => provider.meter_with_scope(scope),
        None => {
            tally_debug!(
                name: "MeterProvider.GlobalNotSet",
                meter_name = scope.name().to_owned()
            );
            Meter::new(std::sync::Arc::new(SdkMeter::inert(scope)))
        }
    }
}

/// Clears the slot if it holds `provider`.
pub(crate) fn detach(provider: &SdkMeterProvider) {
    let Ok(mut slot) = global_meter_provider().write() else {
        return;
    };
    if slot.as_ref().is_some_and(|active| active.ptr_eq(provider)) {
        // Dropped after the lock is released.
        let _previous = slot.take();
        drop(slot);
        tally_debug!(name: "MeterProvider.GlobalDetachedOnShutdown");
    }
}
