//! Link declarations attached to output fields.
//!
//! A link describes where an output field's value comes from: a request input
//! field ([`FromInput`]), a random point between two input dates
//! ([`DateRangeFrom`]), either of those under a condition ([`WhenInput`]),
//! other output fields ([`ComputedFrom`]), the request itself
//! ([`FromHeader`], [`FromCookie`]) or a registered plugin.
//!
//! Links are plain data. Resolution lives in [`crate::resolver`].

use std::fmt;
use std::sync::Arc;

use serde_json::{Number, Value};

use crate::plugins::{is_registered, LinkPlugin};
use crate::types::Schema;

/// Copy the value of a request input field.
///
/// A missing or `null` input value produces no override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FromInput {
    pub field: String,
}

impl FromInput {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

/// Sample a point in time between two input fields.
///
/// When `end <= start` every sample is `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRangeFrom {
    pub start: String,
    pub end: String,
}

impl DateRangeFrom {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }
}

/// Link applied by [`WhenInput`] once its condition holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThenLink {
    FromInput(FromInput),
    DateRange(DateRangeFrom),
}

impl From<FromInput> for ThenLink {
    fn from(link: FromInput) -> Self {
        ThenLink::FromInput(link)
    }
}

impl From<DateRangeFrom> for ThenLink {
    fn from(link: DateRangeFrom) -> Self {
        ThenLink::DateRange(link)
    }
}

/// Apply `then` only when `input[condition_field] == condition_value`.
#[derive(Debug, Clone, PartialEq)]
pub struct WhenInput {
    pub condition_field: String,
    pub condition_value: Value,
    pub then: ThenLink,
}

impl WhenInput {
    pub fn new(
        condition_field: impl Into<String>,
        condition_value: Value,
        then: impl Into<ThenLink>,
    ) -> Self {
        Self {
            condition_field: condition_field.into(),
            condition_value,
            then: then.into(),
        }
    }

    /// Whether an input value satisfies the condition.
    ///
    /// Numbers compare by value, so `1` matches `1.0`.
    pub fn matches(&self, actual: &Value) -> bool {
        match (actual, &self.condition_value) {
            (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
                (Some(a), Some(b)) => a == b,
                _ => a.as_f64() == b.as_f64(),
            },
            (a, b) => a == b,
        }
    }
}

/// User-supplied combine function for [`Combine::Custom`].
pub type ComputeFn = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// How a computed field combines its dependency values.
#[derive(Clone)]
pub enum Combine {
    /// Replace `{field}` placeholders with dependency values.
    Template(String),
    /// Join dependency values as strings.
    Join(String),
    /// Numeric sum; non-numbers count as zero.
    Sum,
    /// Arbitrary function over dependency values, in declaration order.
    Custom(ComputeFn),
}

impl fmt::Debug for Combine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Combine::Template(t) => f.debug_tuple("Template").field(t).finish(),
            Combine::Join(sep) => f.debug_tuple("Join").field(sep).finish(),
            Combine::Sum => f.write_str("Sum"),
            Combine::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Combine {
    fn apply(&self, fields: &[String], values: &[Value]) -> Value {
        match self {
            Combine::Template(template) => {
                let mut out = template.clone();
                for (name, value) in fields.iter().zip(values) {
                    out = out.replace(&format!("{{{}}}", name), &display_value(value));
                }
                Value::String(out)
            }
            Combine::Join(separator) => Value::String(
                values
                    .iter()
                    .map(display_value)
                    .collect::<Vec<_>>()
                    .join(separator),
            ),
            Combine::Sum => sum_values(values),
            Combine::Custom(f) => f(values),
        }
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn sum_values(values: &[Value]) -> Value {
    if values.iter().all(|v| v.is_i64() || !v.is_number()) {
        let total: i64 = values.iter().filter_map(Value::as_i64).sum();
        return Value::from(total);
    }
    let total: f64 = values.iter().filter_map(Value::as_f64).sum();
    Number::from_f64(total).map_or(Value::Null, Value::Number)
}

/// Compute a field from other fields of the same output schema.
#[derive(Debug, Clone)]
pub struct ComputedFrom {
    /// Dependency field names, passed to the combine step in this order.
    pub fields: Vec<String>,
    pub combine: Combine,
}

impl ComputedFrom {
    /// Computed field with a custom combine function.
    pub fn new<I, S, F>(fields: I, combine: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        Self::with_combine(fields, Combine::Custom(Arc::new(combine)))
    }

    pub fn with_combine<I, S>(fields: I, combine: Combine) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            combine,
        }
    }

    /// Combine already-evaluated dependency values.
    pub fn compute(&self, values: &[Value]) -> Value {
        self.combine.apply(&self.fields, values)
    }
}

/// Copy a request header (case-insensitive name).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FromHeader {
    pub name: String,
}

impl FromHeader {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Copy a request cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FromCookie {
    pub name: String,
}

impl FromCookie {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Any link an output field can carry. At most one per field.
#[derive(Debug, Clone)]
pub enum Link {
    FromInput(FromInput),
    DateRange(DateRangeFrom),
    When(WhenInput),
    Computed(ComputedFrom),
    Header(FromHeader),
    Cookie(FromCookie),
    Plugin(Arc<dyn LinkPlugin>),
}

impl Link {
    /// Wrap a plugin link instance.
    pub fn plugin(plugin: impl LinkPlugin) -> Self {
        Link::Plugin(Arc::new(plugin))
    }

    /// Link kind name used in diagnostics.
    pub fn kind_name(&self) -> &str {
        match self {
            Link::FromInput(_) => "FromInput",
            Link::DateRange(_) => "DateRangeFrom",
            Link::When(_) => "WhenInput",
            Link::Computed(_) => "ComputedFrom",
            Link::Header(_) => "FromHeader",
            Link::Cookie(_) => "FromCookie",
            Link::Plugin(p) => p.kind(),
        }
    }
}

impl From<FromInput> for Link {
    fn from(link: FromInput) -> Self {
        Link::FromInput(link)
    }
}

impl From<DateRangeFrom> for Link {
    fn from(link: DateRangeFrom) -> Self {
        Link::DateRange(link)
    }
}

impl From<WhenInput> for Link {
    fn from(link: WhenInput) -> Self {
        Link::When(link)
    }
}

impl From<ComputedFrom> for Link {
    fn from(link: ComputedFrom) -> Self {
        Link::Computed(link)
    }
}

impl From<FromHeader> for Link {
    fn from(link: FromHeader) -> Self {
        Link::Header(link)
    }
}

impl From<FromCookie> for Link {
    fn from(link: FromCookie) -> Self {
        Link::Cookie(link)
    }
}

/// Get the link attached to a field.
///
/// Returns `None` when the field does not exist, carries no link, or carries
/// a plugin link whose kind is not registered.
pub fn get_link<'a>(schema: &'a Schema, field_name: &str) -> Option<&'a Link> {
    let link = schema.field(field_name)?.link.as_ref()?;
    if let Link::Plugin(plugin) = link {
        if !is_registered(plugin.as_ref()) {
            tracing::warn!(
                schema = schema.name(),
                field = field_name,
                kind = plugin.kind(),
                "ignoring unregistered plugin link"
            );
            return None;
        }
    }
    Some(link)
}
