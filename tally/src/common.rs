use std::borrow::{Borrow, Cow};
use std::sync::Arc;
use std::{fmt, hash};

/// The key half of an attribute pair.
///
/// Keys are cheap to clone: static strings are borrowed, owned strings are
/// boxed once and ref-counted strings share their allocation.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(SharedStr);

impl Key {
    /// Create a new `Key`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tally::Key;
    /// use std::sync::Arc;
    ///
    /// let key1 = Key::new("http.route");
    /// let key2 = Key::new(String::from("http.method"));
    /// let key3 = Key::new(Arc::from("peer.name"));
    /// ```
    pub fn new(value: impl Into<Key>) -> Self {
        value.into()
    }

    /// Create a new const `Key`.
    pub const fn from_static_str(value: &'static str) -> Self {
        Key(SharedStr::Static(value))
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&'static str> for Key {
    fn from(key: &'static str) -> Self {
        Key(SharedStr::Static(key))
    }
}

impl From<String> for Key {
    fn from(key: String) -> Self {
        Key(SharedStr::Owned(key.into_boxed_str()))
    }
}

impl From<Arc<str>> for Key {
    fn from(key: Arc<str>) -> Self {
        Key(SharedStr::Shared(key))
    }
}

impl From<Cow<'static, str>> for Key {
    fn from(key: Cow<'static, str>) -> Self {
        Key(SharedStr::from(key))
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.0.into_string()
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Borrow<str> for Key {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Storage shared by [`Key`] and [`StringValue`].
#[derive(Clone, Eq)]
enum SharedStr {
    Static(&'static str),
    Owned(Box<str>),
    Shared(Arc<str>),
}

impl SharedStr {
    fn as_str(&self) -> &str {
        match self {
            SharedStr::Static(s) => s,
            SharedStr::Owned(s) => s,
            SharedStr::Shared(s) => s,
        }
    }

    fn into_string(self) -> String {
        match self {
            SharedStr::Static(s) => s.to_owned(),
            SharedStr::Owned(s) => s.into_string(),
            SharedStr::Shared(s) => s.to_string(),
        }
    }
}

impl From<Cow<'static, str>> for SharedStr {
    fn from(s: Cow<'static, str>) -> Self {
        match s {
            Cow::Borrowed(s) => SharedStr::Static(s),
            Cow::Owned(s) => SharedStr::Owned(s.into_boxed_str()),
        }
    }
}

// Equality, ordering and hashing go through the string contents so that a
// static key and an owned key with the same text are interchangeable.
impl PartialEq for SharedStr {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl PartialOrd for SharedStr {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SharedStr {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl hash::Hash for SharedStr {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        hash::Hash::hash(self.as_str(), state)
    }
}

/// A homogeneous list value.
///
/// Lists can be carried in [`Value`] but are not scalar, so an
/// [`AttributeSet`](crate::AttributeSet) refuses them.
#[derive(Clone, Debug, PartialEq)]
pub enum Array {
    /// List of bools
    Bool(Vec<bool>),
    /// List of integers
    I64(Vec<i64>),
    /// List of floats
    F64(Vec<f64>),
    /// List of strings
    String(Vec<StringValue>),
}

impl fmt::Display for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join<T: fmt::Display>(
            items: &[T],
            quote: bool,
            f: &mut fmt::Formatter<'_>,
        ) -> fmt::Result {
            f.write_str("[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                if quote {
                    write!(f, "\"{item}\"")?;
                } else {
                    write!(f, "{item}")?;
                }
            }
            f.write_str("]")
        }

        match self {
            Array::Bool(v) => join(v, false, f),
            Array::I64(v) => join(v, false, f),
            Array::F64(v) => join(v, false, f),
            Array::String(v) => join(v, true, f),
        }
    }
}

macro_rules! impl_from_for_array {
    ($(($t:ty, $variant:expr),)+) => {
        $(
            impl From<$t> for Array {
                fn from(v: $t) -> Self {
                    $variant(v)
                }
            }
        )+
    }
}

impl_from_for_array!(
    (Vec<bool>, Array::Bool),
    (Vec<i64>, Array::I64),
    (Vec<f64>, Array::F64),
    (Vec<StringValue>, Array::String),
);

/// The value half of an attribute pair.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// bool values
    Bool(bool),
    /// i64 values
    I64(i64),
    /// f64 values
    F64(f64),
    /// String values
    String(StringValue),
    /// A list of values. Not accepted as a data point attribute.
    Array(Array),
}

impl Value {
    /// Returns `true` for every variant except [`Value::Array`].
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::Array(_))
    }

    /// String form of the value. Allocates unless the value is a string.
    pub fn as_str(&self) -> Cow<'_, str> {
        match self {
            Value::String(v) => Cow::Borrowed(v.as_str()),
            other => Cow::Owned(other.to_string()),
        }
    }
}

/// String-like attribute value.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StringValue(SharedStr);

impl StringValue {
    /// Returns the value as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for StringValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for StringValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for StringValue {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<StringValue> for String {
    fn from(s: StringValue) -> Self {
        s.0.into_string()
    }
}

impl From<&'static str> for StringValue {
    fn from(s: &'static str) -> Self {
        StringValue(SharedStr::Static(s))
    }
}

impl From<String> for StringValue {
    fn from(s: String) -> Self {
        StringValue(SharedStr::Owned(s.into_boxed_str()))
    }
}

impl From<Arc<str>> for StringValue {
    fn from(s: Arc<str>) -> Self {
        StringValue(SharedStr::Shared(s))
    }
}

impl From<Cow<'static, str>> for StringValue {
    fn from(s: Cow<'static, str>) -> Self {
        StringValue(SharedStr::from(s))
    }
}

macro_rules! impl_from_for_value {
    ($(($t:ty, $variant:expr);)+) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    $variant(v)
                }
            }
        )+
    }
}

impl_from_for_value!(
    (bool, Value::Bool);
    (i64, Value::I64);
    (f64, Value::F64);
    (StringValue, Value::String);
    (Array, Value::Array);
);

impl From<&'static str> for Value {
    fn from(s: &'static str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Value::String(s.into())
    }
}

impl From<Cow<'static, str>> for Value {
    fn from(s: Cow<'static, str>) -> Self {
        Value::String(s.into())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => fmt::Display::fmt(v, f),
            Value::I64(v) => fmt::Display::fmt(v, f),
            Value::F64(v) => fmt::Display::fmt(v, f),
            Value::String(v) => f.write_str(v.as_str()),
            Value::Array(v) => fmt::Display::fmt(v, f),
        }
    }
}

/// An attribute: a [`Key`] and its [`Value`].
#[derive(Clone, Debug, PartialEq)]
pub struct KeyValue {
    /// The attribute name
    pub key: Key,
    /// The attribute value
    pub value: Value,
}

impl KeyValue {
    /// Create a new `KeyValue` pair.
    pub fn new<K, V>(key: K, value: V) -> Self
    where
        K: Into<Key>,
        V: Into<Value>,
    {
        KeyValue {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Identity of a meter: the library or component that creates instruments.
///
/// Two scopes are the same meter when their name, version and schema URL
/// match. Scope attributes are carried along to exporters but do not take
/// part in identity.
#[derive(Debug, Default, Clone)]
pub struct InstrumentationScope {
    name: Cow<'static, str>,
    version: Option<Cow<'static, str>>,
    schema_url: Option<Cow<'static, str>>,
    attributes: Vec<KeyValue>,
}

impl Eq for InstrumentationScope {}

impl PartialEq for InstrumentationScope {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.version == other.version
            && self.schema_url == other.schema_url
    }
}

impl hash::Hash for InstrumentationScope {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.version.hash(state);
        self.schema_url.hash(state);
    }
}

impl InstrumentationScope {
    /// Start building a scope with the given name.
    pub fn builder<T: Into<Cow<'static, str>>>(name: T) -> InstrumentationScopeBuilder {
        InstrumentationScopeBuilder {
            name: name.into(),
            version: None,
            schema_url: None,
            attributes: Vec::new(),
        }
    }

    /// The meter name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The meter version, if one was given.
    #[inline]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// The schema URL, if one was given.
    #[inline]
    pub fn schema_url(&self) -> Option<&str> {
        self.schema_url.as_deref()
    }

    /// Attributes attached to the scope.
    #[inline]
    pub fn attributes(&self) -> impl Iterator<Item = &KeyValue> {
        self.attributes.iter()
    }
}

/// Configuration for an [`InstrumentationScope`].
///
/// ```
/// use tally::InstrumentationScope;
///
/// let scope = InstrumentationScope::builder("checkout")
///     .with_version("1.0")
///     .with_schema_url("https://example.com/schemas/1.2.0")
///     .build();
/// assert_eq!(scope.version(), Some("1.0"));
/// ```
#[derive(Debug)]
pub struct InstrumentationScopeBuilder {
    name: Cow<'static, str>,
    version: Option<Cow<'static, str>>,
    schema_url: Option<Cow<'static, str>>,
    attributes: Vec<KeyValue>,
}

impl InstrumentationScopeBuilder {
    /// Set the meter version.
    pub fn with_version(mut self, version: impl Into<Cow<'static, str>>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set the schema URL.
    pub fn with_schema_url(mut self, schema_url: impl Into<Cow<'static, str>>) -> Self {
        self.schema_url = Some(schema_url.into());
        self
    }

    /// Set the scope attributes.
    pub fn with_attributes<I>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = KeyValue>,
    {
        self.attributes = attributes.into_iter().collect();
        self
    }

    /// Build the scope.
    pub fn build(self) -> InstrumentationScope {
        InstrumentationScope {
            name: self.name,
            version: self.version,
            schema_url: self.schema_url,
            attributes: self.attributes,
        }
    }
}
