//! The entity producing metrics.
//!
//! A [`Resource`] is an immutable set of attributes describing the process
//! that owns a meter provider (service name, host, version and so on). It is
//! fixed when the provider is built and copied by reference into every
//! snapshot the provider produces.
//!
//! [`Resource::builder`] starts from the detected defaults:
//!
//! - [`SdkProvidedResourceDetector`] sets `service.name`, from
//!   `TALLY_SERVICE_NAME`, then `TALLY_RESOURCE_ATTRIBUTES`, then
//!   `unknown_service`.
//! - [`TelemetryResourceDetector`] describes this crate.
//! - [`EnvResourceDetector`] parses `TALLY_RESOURCE_ATTRIBUTES`
//!   (`key1=value1,key2=value2`).
//!
//! [`Resource::builder_empty`] starts from nothing.
mod env;

pub use env::{EnvResourceDetector, SdkProvidedResourceDetector, TelemetryResourceDetector};

use std::borrow::Cow;
use std::collections::{hash_map, HashMap};
use std::sync::Arc;
use tally::{Key, KeyValue, Value};

/// Logical name of the service.
pub(crate) const SERVICE_NAME: &str = "service.name";
/// Name of the library producing the telemetry.
pub(crate) const TELEMETRY_SDK_NAME: &str = "telemetry.sdk.name";
/// Language of the library producing the telemetry.
pub(crate) const TELEMETRY_SDK_LANGUAGE: &str = "telemetry.sdk.language";
/// Version of the library producing the telemetry.
pub(crate) const TELEMETRY_SDK_VERSION: &str = "telemetry.sdk.version";

#[derive(Debug, Clone, PartialEq)]
struct ResourceInner {
    attrs: HashMap<Key, Value>,
    schema_url: Option<Cow<'static, str>>,
}

/// An immutable description of the entity producing metrics.
///
/// Cloning only bumps a reference count.
#[derive(Clone, Debug, PartialEq)]
pub struct Resource {
    inner: Arc<ResourceInner>,
}

impl Default for Resource {
    fn default() -> Self {
        Resource::builder().build()
    }
}

impl Resource {
    /// A [`ResourceBuilder`] seeded with the default detectors.
    pub fn builder() -> ResourceBuilder {
        ResourceBuilder {
            resource: Resource::from_detectors(&[
                Box::new(SdkProvidedResourceDetector),
                Box::new(TelemetryResourceDetector),
                Box::new(EnvResourceDetector::new()),
            ]),
        }
    }

    /// A [`ResourceBuilder`] with no attributes.
    pub fn builder_empty() -> ResourceBuilder {
        ResourceBuilder {
            resource: Resource::empty(),
        }
    }

    /// A resource with no attributes and no schema URL.
    pub fn empty() -> Self {
        Resource {
            inner: Arc::new(ResourceInner {
                attrs: HashMap::new(),
                schema_url: None,
            }),
        }
    }

    /// Later pairs overwrite earlier ones with the same key.
    fn new<T: IntoIterator<Item = KeyValue>>(kvs: T) -> Self {
        Resource {
            inner: Arc::new(ResourceInner {
                attrs: kvs.into_iter().map(|kv| (kv.key, kv.value)).collect(),
                schema_url: None,
            }),
        }
    }

    fn from_detectors(detectors: &[Box<dyn ResourceDetector>]) -> Self {
        detectors
            .iter()
            .fold(Resource::empty(), |acc, detector| acc.merge(&detector.detect()))
    }

    /// Keys from `other` win. The schema URL survives only when the two sides
    /// do not disagree.
    fn merge(&self, other: &Resource) -> Self {
        if self.is_empty() && self.inner.schema_url.is_none() {
            return other.clone();
        }
        if other.is_empty() && other.inner.schema_url.is_none() {
            return self.clone();
        }

        let mut attrs = self.inner.attrs.clone();
        attrs.extend(
            other
                .inner
                .attrs
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        let schema_url = match (&self.inner.schema_url, &other.inner.schema_url) {
            (Some(a), Some(b)) if a == b => Some(a.clone()),
            (Some(_), Some(_)) => None,
            (Some(url), None) | (None, Some(url)) => Some(url.clone()),
            (None, None) => None,
        };

        Resource {
            inner: Arc::new(ResourceInner { attrs, schema_url }),
        }
    }

    /// The schema URL, if any.
    pub fn schema_url(&self) -> Option<&str> {
        self.inner.schema_url.as_deref()
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.inner.attrs.len()
    }

    /// `true` when the resource has no attributes.
    pub fn is_empty(&self) -> bool {
        self.inner.attrs.is_empty()
    }

    /// Iterates over the attributes in no particular order.
    pub fn iter(&self) -> Iter<'_> {
        Iter(self.inner.attrs.iter())
    }

    /// The value stored under `key`.
    pub fn get(&self, key: &Key) -> Option<Value> {
        self.inner.attrs.get(key).cloned()
    }
}

/// Iterator over the attributes of a [`Resource`].
#[derive(Debug)]
pub struct Iter<'a>(hash_map::Iter<'a, Key, Value>);

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a Key, &'a Value);

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }
}

impl<'a> IntoIterator for &'a Resource {
    type Item = (&'a Key, &'a Value);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Produces resource attributes from some source, such as the environment.
///
/// A detector that cannot find its source returns [`Resource::empty`].
pub trait ResourceDetector {
    /// Returns the detected attributes.
    fn detect(&self) -> Resource;
}

/// Builder for [`Resource`].
#[derive(Debug)]
pub struct ResourceBuilder {
    resource: Resource,
}

impl ResourceBuilder {
    /// Merge in the output of a detector.
    pub fn with_detector(mut self, detector: Box<dyn ResourceDetector>) -> Self {
        self.resource = self.resource.merge(&detector.detect());
        self
    }

    /// Add one attribute.
    pub fn with_attribute(self, kv: KeyValue) -> Self {
        self.with_attributes([kv])
    }

    /// Add several attributes. Later values overwrite earlier ones.
    pub fn with_attributes<T: IntoIterator<Item = KeyValue>>(mut self, kvs: T) -> Self {
        self.resource = self.resource.merge(&Resource::new(kvs));
        self
    }

    /// Set `service.name`.
    pub fn with_service_name(self, name: impl Into<Value>) -> Self {
        self.with_attribute(KeyValue::new(SERVICE_NAME, name.into()))
    }

    /// Set the schema URL. An empty string clears it.
    pub fn with_schema_url(mut self, schema_url: impl Into<Cow<'static, str>>) -> Self {
        let schema_url = schema_url.into();
        let inner = Arc::make_mut(&mut self.resource.inner);
        inner.schema_url = if schema_url.is_empty() {
            None
        } else {
            Some(schema_url)
        };
        self
    }

    /// Finish building.
    pub fn build(self) -> Resource {
        self.resource
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_empty_has_only_given_attributes() {
        let resource = Resource::builder_empty()
            .with_attribute(KeyValue::new("service", "x"))
            .build();

        assert_eq!(resource.len(), 1);
        assert_eq!(resource.get(&Key::new("service")), Some(Value::from("x")));
        assert_eq!(resource.schema_url(), None);
    }

    #[test]
    fn later_attributes_override_earlier_ones() {
        let resource = Resource::builder_empty()
            .with_service_name("first")
            .with_attributes([
                KeyValue::new("k", "v1"),
                KeyValue::new(SERVICE_NAME, "second"),
            ])
            .with_attribute(KeyValue::new("k", "v2"))
            .build();

        assert_eq!(resource.len(), 2);
        assert_eq!(
            resource.get(&Key::new(SERVICE_NAME)),
            Some(Value::from("second"))
        );
        assert_eq!(resource.get(&Key::new("k")), Some(Value::from("v2")));
    }

    #[test]
    fn schema_url_is_kept_and_cleared() {
        let resource = Resource::builder_empty()
            .with_schema_url("https://example.com/schemas/1.2.0")
            .with_attribute(KeyValue::new("k", "v"))
            .build();
        assert_eq!(resource.schema_url(), Some("https://example.com/schemas/1.2.0"));

        let cleared = Resource::builder_empty()
            .with_schema_url("https://example.com/schemas/1.2.0")
            .with_schema_url("")
            .build();
        assert_eq!(cleared.schema_url(), None);
    }

    #[test]
    fn default_builder_describes_the_sdk() {
        temp_env::with_vars_unset(["TALLY_RESOURCE_ATTRIBUTES", "TALLY_SERVICE_NAME"], || {
            let resource = Resource::builder().build();

            assert_eq!(
                resource.get(&Key::new(SERVICE_NAME)),
                Some(Value::from("unknown_service"))
            );
            assert_eq!(
                resource.get(&Key::new(TELEMETRY_SDK_NAME)),
                Some(Value::from("tally"))
            );
            assert_eq!(
                resource.get(&Key::new(TELEMETRY_SDK_LANGUAGE)),
                Some(Value::from("rust"))
            );
            assert_eq!(
                resource.get(&Key::new(TELEMETRY_SDK_VERSION)),
                Some(Value::from(env!("CARGO_PKG_VERSION")))
            );
            assert_eq!(resource.len(), 4);
        });
    }

    #[test]
    fn user_attributes_win_over_environment() {
        temp_env::with_var(
            "TALLY_RESOURCE_ATTRIBUTES",
            Some("my-key=env-val,k2=value2"),
            || {
                let resource = Resource::builder()
                    .with_attribute(KeyValue::new("my-key", "user-val"))
                    .build();

                assert_eq!(
                    resource.get(&Key::new("my-key")),
                    Some(Value::from("user-val"))
                );
                assert_eq!(resource.get(&Key::new("k2")), Some(Value::from("value2")));
            },
        );
    }
}
