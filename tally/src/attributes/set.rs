use once_cell::sync::Lazy;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::sync::Arc;
use std::{
    cmp::Ordering,
    hash::{Hash, Hasher},
};

use crate::{Key, KeyValue, Value};
use ordered_float::OrderedFloat;

/// Returned when an attribute value is not a scalar.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("attribute `{key}` has a non-scalar value; only string, number and bool are allowed")]
pub struct InvalidAttributeValue {
    /// The offending attribute key.
    pub key: Key,
}

/// A scalar attribute with float-aware equality, ordering and hashing.
///
/// `f64` values are compared by total order so a set holding `NaN` is still a
/// usable map key.
#[derive(Clone, Debug)]
struct ScalarKeyValue(KeyValue);

impl ScalarKeyValue {
    fn rank(&self) -> u8 {
        match &self.0.value {
            Value::Bool(_) => 1,
            Value::I64(_) => 2,
            Value::F64(_) => 3,
            Value::String(_) => 4,
            // Arrays are refused before a `ScalarKeyValue` is built.
            Value::Array(_) => 5,
        }
    }
}

impl Hash for ScalarKeyValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.key.hash(state);
        match &self.0.value {
            Value::Bool(b) => b.hash(state),
            Value::I64(i) => i.hash(state),
            Value::F64(f) => OrderedFloat(*f).hash(state),
            Value::String(s) => s.hash(state),
            Value::Array(_) => {}
        }
    }
}

impl PartialEq for ScalarKeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScalarKeyValue {}

impl PartialOrd for ScalarKeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScalarKeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .key
            .cmp(&other.0.key)
            .then_with(|| self.rank().cmp(&other.rank()))
            .then_with(|| match (&self.0.value, &other.0.value) {
                (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
                (Value::I64(a), Value::I64(b)) => a.cmp(b),
                (Value::F64(a), Value::F64(b)) => OrderedFloat(*a).cmp(&OrderedFloat(*b)),
                (Value::String(a), Value::String(b)) => a.cmp(b),
                _ => Ordering::Equal,
            })
    }
}

static EMPTY_SET: Lazy<Arc<InternalAttributeSet>> =
    Lazy::new(|| Arc::new(InternalAttributeSet::new(Vec::new())));

#[derive(Debug)]
struct InternalAttributeSet {
    key_values: Vec<ScalarKeyValue>,
    hash: u64,
}

impl InternalAttributeSet {
    /// Sorts by key and caches the hash. Callers guarantee keys are unique.
    fn new(mut values: Vec<ScalarKeyValue>) -> Self {
        values.sort_unstable();
        let mut hasher = DefaultHasher::new();
        for kv in &values {
            kv.hash(&mut hasher);
        }

        InternalAttributeSet {
            key_values: values,
            hash: hasher.finish(),
        }
    }
}

impl PartialEq for InternalAttributeSet {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.key_values == other.key_values
    }
}

impl Eq for InternalAttributeSet {}

impl Hash for InternalAttributeSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash)
    }
}

/// An immutable set of attributes identifying one time series.
///
/// Sets built from the same pairs compare and hash equal regardless of the
/// order the pairs were given in. When a key repeats, the last value wins.
/// Only scalar values (string, integer, float, bool) are accepted.
///
/// Cloning is cheap; the pairs are shared behind an `Arc`.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct AttributeSet(Arc<InternalAttributeSet>);

impl AttributeSet {
    /// The set with no attributes.
    pub fn empty() -> Self {
        AttributeSet(EMPTY_SET.clone())
    }

    /// Build a set from pairs, rejecting non-scalar values.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, InvalidAttributeValue>
    where
        I: IntoIterator<Item = KeyValue>,
    {
        let pairs: Vec<KeyValue> = pairs.into_iter().collect();
        if pairs.is_empty() {
            return Ok(AttributeSet::empty());
        }

        let mut seen = HashSet::with_capacity(pairs.len());
        let mut values = Vec::with_capacity(pairs.len());
        // Walk backwards so the last occurrence of a key is the one kept.
        for kv in pairs.into_iter().rev() {
            if !kv.value.is_scalar() {
                return Err(InvalidAttributeValue { key: kv.key });
            }
            if seen.insert(kv.key.clone()) {
                values.push(ScalarKeyValue(kv));
            }
        }

        Ok(AttributeSet(Arc::new(InternalAttributeSet::new(values))))
    }

    /// Number of attributes in the set.
    pub fn len(&self) -> usize {
        self.0.key_values.len()
    }

    /// `true` if the set holds no attributes.
    pub fn is_empty(&self) -> bool {
        self.0.key_values.is_empty()
    }

    /// Looks up the value stored under `key`.
    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.0
            .key_values
            .binary_search_by(|kv| kv.0.key.cmp(key))
            .ok()
            .map(|idx| &self.0.key_values[idx].0.value)
    }

    /// Returns a new set keeping only the attributes accepted by `keep`.
    pub fn retain<F>(&self, keep: F) -> AttributeSet
    where
        F: Fn(&KeyValue) -> bool,
    {
        let values: Vec<_> = self
            .0
            .key_values
            .iter()
            .filter(|kv| keep(&kv.0))
            .cloned()
            .collect();
        if values.len() == self.len() {
            return self.clone();
        }

        AttributeSet(Arc::new(InternalAttributeSet::new(values)))
    }

    /// Iterates over the pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.0.key_values.iter().map(|kv| (&kv.0.key, &kv.0.value))
    }

    /// Copies the pairs out in key order.
    pub fn to_vec(&self) -> Vec<KeyValue> {
        self.0.key_values.iter().map(|kv| kv.0.clone()).collect()
    }
}

impl Default for AttributeSet {
    fn default() -> Self {
        AttributeSet::empty()
    }
}

impl TryFrom<&[KeyValue]> for AttributeSet {
    type Error = InvalidAttributeValue;

    fn try_from(pairs: &[KeyValue]) -> Result<Self, Self::Error> {
        AttributeSet::from_pairs(pairs.iter().cloned())
    }
}

impl TryFrom<Vec<KeyValue>> for AttributeSet {
    type Error = InvalidAttributeValue;

    fn try_from(pairs: Vec<KeyValue>) -> Result<Self, Self::Error> {
        AttributeSet::from_pairs(pairs)
    }
}
