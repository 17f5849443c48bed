use super::{
    Resource, ResourceDetector, SERVICE_NAME, TELEMETRY_SDK_LANGUAGE, TELEMETRY_SDK_NAME,
    TELEMETRY_SDK_VERSION,
};
use std::env;
use tally::{Key, KeyValue, Value};

const TALLY_RESOURCE_ATTRIBUTES: &str = "TALLY_RESOURCE_ATTRIBUTES";
const TALLY_SERVICE_NAME: &str = "TALLY_SERVICE_NAME";

/// Reads `TALLY_RESOURCE_ATTRIBUTES`, a comma separated list of `key=value`
/// pairs. Entries without `=` are skipped; keys and values are trimmed.
#[derive(Debug, Default)]
pub struct EnvResourceDetector {
    _private: (),
}

impl EnvResourceDetector {
    /// Create an `EnvResourceDetector`.
    pub fn new() -> Self {
        EnvResourceDetector { _private: () }
    }
}

impl ResourceDetector for EnvResourceDetector {
    fn detect(&self) -> Resource {
        match env::var(TALLY_RESOURCE_ATTRIBUTES) {
            Ok(s) if !s.is_empty() => parse_resource_attributes(&s),
            Ok(_) | Err(_) => Resource::empty(),
        }
    }
}

fn parse_resource_attributes(s: &str) -> Resource {
    Resource::builder_empty()
        .with_attributes(s.split_terminator(',').filter_map(|entry| {
            let (key, value) = entry.split_once('=')?;
            Some(KeyValue::new(
                key.trim().to_owned(),
                value.trim().to_owned(),
            ))
        }))
        .build()
}

/// Always yields `service.name`: `TALLY_SERVICE_NAME` if set, else a
/// `service.name` entry from `TALLY_RESOURCE_ATTRIBUTES`, else
/// `unknown_service`.
#[derive(Debug)]
pub struct SdkProvidedResourceDetector;

impl ResourceDetector for SdkProvidedResourceDetector {
    fn detect(&self) -> Resource {
        let service_name = env::var(TALLY_SERVICE_NAME)
            .ok()
            .filter(|s| !s.is_empty())
            .map(Value::from)
            .or_else(|| {
                EnvResourceDetector::new()
                    .detect()
                    .get(&Key::from_static_str(SERVICE_NAME))
            })
            .unwrap_or_else(|| Value::from("unknown_service"));

        Resource::builder_empty()
            .with_attribute(KeyValue::new(SERVICE_NAME, service_name))
            .build()
    }
}

/// Describes this library: `telemetry.sdk.name`, `telemetry.sdk.language`
/// and `telemetry.sdk.version`.
#[derive(Debug)]
pub struct TelemetryResourceDetector;

impl ResourceDetector for TelemetryResourceDetector {
    fn detect(&self) -> Resource {
        Resource::builder_empty()
            .with_attributes([
                KeyValue::new(TELEMETRY_SDK_NAME, "tally"),
                KeyValue::new(TELEMETRY_SDK_LANGUAGE, "rust"),
                KeyValue::new(TELEMETRY_SDK_VERSION, env!("CARGO_PKG_VERSION")),
            ])
            .build()
    }
}
