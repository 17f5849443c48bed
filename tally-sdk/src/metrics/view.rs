use std::borrow::Cow;
use std::fmt;

use regex::Regex;

use super::instrument::{Instrument, InstrumentKind, Stream};
use super::{MetricError, MetricResult};

/// Customizes the metrics an instrument produces.
///
/// Views are consulted once, when an instrument is created, in the order they
/// were registered. The first view returning a [`Stream`] decides the output
/// of the instrument; later views are not consulted. Views added afterwards
/// only affect instruments created afterwards.
///
/// `View` is implemented for all `Fn(&Instrument) -> Option<Stream>`.
///
/// ```
/// use tally_sdk::metrics::{Aggregation, Instrument, SdkMeterProvider, Stream};
///
/// let drop_debug = |i: &Instrument| {
///     if i.name().starts_with("debug.") {
///         Stream::builder().with_aggregation(Aggregation::Drop).build().ok()
///     } else {
///         None
///     }
/// };
///
/// let provider = SdkMeterProvider::builder().with_view(drop_debug).build();
/// # drop(provider)
/// ```
pub trait View: Send + Sync + 'static {
    /// Returns the [`Stream`] to use for a matching instrument, or `None`.
    fn match_inst(&self, inst: &Instrument) -> Option<Stream>;
}

impl<T> View for T
where
    T: Fn(&Instrument) -> Option<Stream> + Send + Sync + 'static,
{
    fn match_inst(&self, inst: &Instrument) -> Option<Stream> {
        self(inst)
    }
}

impl View for Box<dyn View> {
    fn match_inst(&self, inst: &Instrument) -> Option<Stream> {
        (**self).match_inst(inst)
    }
}

/// Which instruments a view built by [`new_view`] applies to.
///
/// Unset criteria match everything, so `Selector::default()` selects every
/// instrument.
#[derive(Clone, Debug, Default)]
pub struct Selector {
    instrument_name: Option<Cow<'static, str>>,
    instrument_kind: Option<InstrumentKind>,
    meter_name: Option<Cow<'static, str>>,
    meter_version: Option<Cow<'static, str>>,
    meter_schema_url: Option<Cow<'static, str>>,
}

impl Selector {
    /// A selector matching every instrument.
    pub fn new() -> Self {
        Selector::default()
    }

    /// Match instruments by name. `*` matches any run of characters and `?`
    /// matches a single character. Matching ignores ASCII case.
    pub fn with_instrument_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.instrument_name = Some(name.into());
        self
    }

    /// Match instruments of this kind only.
    pub fn with_instrument_kind(mut self, kind: InstrumentKind) -> Self {
        self.instrument_kind = Some(kind);
        self
    }

    /// Match instruments created by meters with this name.
    pub fn with_meter_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.meter_name = Some(name.into());
        self
    }

    /// Match instruments created by meters with this version.
    pub fn with_meter_version(mut self, version: impl Into<Cow<'static, str>>) -> Self {
        self.meter_version = Some(version.into());
        self
    }

    /// Match instruments created by meters with this schema URL.
    pub fn with_meter_schema_url(mut self, schema_url: impl Into<Cow<'static, str>>) -> Self {
        self.meter_schema_url = Some(schema_url.into());
        self
    }

    /// `true` when the selector can match more than one instrument name.
    fn is_wildcard(&self) -> bool {
        self.instrument_name
            .as_deref()
            .map_or(true, |name| name.contains(['*', '?']))
    }
}

enum NameMatcher {
    Any,
    Exact(String),
    Pattern(Regex),
}

impl NameMatcher {
    fn new(name: Option<&str>) -> MetricResult<Self> {
        let Some(name) = name else {
            return Ok(NameMatcher::Any);
        };
        if name == "*" {
            return Ok(NameMatcher::Any);
        }
        let name = name.to_ascii_lowercase();
        if !name.contains(['*', '?']) {
            return Ok(NameMatcher::Exact(name));
        }

        let mut pattern = String::with_capacity(name.len() + 8);
        pattern.push('^');
        for c in name.chars() {
            match c {
                '*' => pattern.push_str(".*"),
                '?' => pattern.push('.'),
                c => pattern.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
            }
        }
        pattern.push('$');

        Regex::new(&pattern)
            .map(NameMatcher::Pattern)
            .map_err(|err| MetricError::Config(format!("invalid instrument name pattern: {err}")))
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            NameMatcher::Any => true,
            NameMatcher::Exact(expected) => name.eq_ignore_ascii_case(expected),
            NameMatcher::Pattern(re) => re.is_match(&name.to_ascii_lowercase()),
        }
    }
}

struct SelectorView {
    name: NameMatcher,
    selector: Selector,
    stream: Stream,
}

impl fmt::Debug for SelectorView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectorView")
            .field("selector", &self.selector)
            .field("stream", &self.stream)
            .finish()
    }
}

impl View for SelectorView {
    fn match_inst(&self, inst: &Instrument) -> Option<Stream> {
        let s = &self.selector;
        let scope = inst.scope();
        let selected = self.name.matches(inst.name())
            && s.instrument_kind.map_or(true, |kind| kind == inst.kind())
            && s.meter_name.as_deref().map_or(true, |n| n == scope.name())
            && s.meter_version
                .as_deref()
                .map_or(true, |v| Some(v) == scope.version())
            && s.meter_schema_url
                .as_deref()
                .map_or(true, |u| Some(u) == scope.schema_url());

        selected.then(|| self.stream.clone())
    }
}

/// Creates a [`View`] applying `stream` to every instrument `selector`
/// matches.
///
/// A selector whose instrument name contains a wildcard may match several
/// instruments, so it cannot rename the stream.
///
/// # Example
///
/// ```
/// use tally_sdk::metrics::{new_view, Aggregation, Selector, Stream};
///
/// let view = new_view(
///     Selector::new().with_instrument_name("http.*"),
///     Stream::builder()
///         .with_aggregation(Aggregation::ExplicitBucketHistogram {
///             boundaries: vec![0.1, 0.5, 1.0],
///             record_min_max: true,
///         })
///         .build()
///         .unwrap(),
/// )
/// .unwrap();
/// # drop(view)
/// ```
pub fn new_view(selector: Selector, stream: Stream) -> MetricResult<Box<dyn View>> {
    if selector.is_wildcard() && stream.name.is_some() {
        return Err(MetricError::Config(
            "a view with a wildcard instrument name cannot rename the stream".into(),
        ));
    }
    if let Some(aggregation) = &stream.aggregation {
        aggregation.validate()?;
    }

    let name = NameMatcher::new(selector.instrument_name.as_deref())?;
    Ok(Box::new(SelectorView {
        name,
        selector,
        stream,
    }))
}
