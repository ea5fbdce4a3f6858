//! Link resolution - turns output-field links into factory overrides.
//!
//! [`resolve`] walks an output schema in declaration order and produces an
//! [`OverrideMap`]: for each linked field either a fixed value, a thunk that
//! samples a fresh value on every call, a nested bundle for object fields,
//! or a computed marker evaluated later by [`crate::evaluate`]. Fields that
//! resolve to nothing are absent from the map and left to the factory.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Map, Value};

use crate::api::RequestContext;
use crate::links::{get_link, ComputedFrom, DateRangeFrom, FromInput, Link, ThenLink};
use crate::types::{Field, FieldType, Schema};

/// Explicit random source shared by every thunk and plugin of a resolution.
///
/// Clones share one generator, so a seeded handle yields the same sequence
/// of samples for the same sequence of calls.
#[derive(Clone)]
pub struct MockRng(Arc<Mutex<StdRng>>);

impl MockRng {
    pub fn seeded(seed: u64) -> Self {
        Self(Arc::new(Mutex::new(StdRng::seed_from_u64(seed))))
    }

    pub fn from_entropy() -> Self {
        Self(Arc::new(Mutex::new(StdRng::from_entropy())))
    }

    /// Seeded when `seed` is set, entropy-backed otherwise.
    pub fn from_seed_option(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::seeded)
    }

    /// Run `f` with exclusive access to the generator.
    pub fn with<R>(&self, f: impl FnOnce(&mut StdRng) -> R) -> R {
        f(&mut self.0.lock())
    }
}

impl fmt::Debug for MockRng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MockRng")
    }
}

/// Zero-argument value producer, invoked once per generated instance.
#[derive(Clone)]
pub struct Thunk(Arc<dyn Fn() -> Value + Send + Sync>);

impl Thunk {
    pub fn new(f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self) -> Value {
        (self.0)()
    }
}

impl fmt::Debug for Thunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Thunk(..)")
    }
}

/// One resolved entry of an [`OverrideMap`].
#[derive(Debug, Clone)]
pub enum Override {
    /// Fixed value.
    Value(Value),
    /// Freshly sampled value per evaluation.
    Thunk(Thunk),
    /// Overrides for a nested object field, carrying its schema.
    Nested(OverrideMap),
    /// Computed from sibling fields during evaluation; never handed to the
    /// factory directly.
    Computed(ComputedFrom),
}

/// Overrides for one schema level, in field declaration order.
#[derive(Debug, Clone)]
pub struct OverrideMap {
    schema: Arc<Schema>,
    entries: Vec<(String, Override)>,
}

impl OverrideMap {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            entries: Vec::new(),
        }
    }

    /// Schema these overrides were resolved against.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: Override) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = entry,
            None => self.entries.push((name, entry)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Override> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, entry)| entry)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Override)> {
        self.entries.iter().map(|(n, entry)| (n.as_str(), entry))
    }
}

/// Everything a resolution call reads besides the output schema.
pub struct ResolveContext<'a> {
    input_schema: &'a Schema,
    input: Map<String, Value>,
    rng: MockRng,
    request: Option<&'a dyn RequestContext>,
}

impl<'a> ResolveContext<'a> {
    /// Build a context from a validated input instance.
    ///
    /// The input is normalized against `input_schema` (defaults applied).
    pub fn new(input_schema: &'a Schema, input: &Map<String, Value>, rng: MockRng) -> Self {
        Self {
            input_schema,
            input: input_schema.normalize_input(input),
            rng,
            request: None,
        }
    }

    /// Enable header and cookie links.
    pub fn with_request(mut self, request: &'a dyn RequestContext) -> Self {
        self.request = Some(request);
        self
    }

    pub fn input_schema(&self) -> &Schema {
        self.input_schema
    }

    /// Normalized input in dict form.
    pub fn input(&self) -> &Map<String, Value> {
        &self.input
    }

    pub fn rng(&self) -> &MockRng {
        &self.rng
    }

    fn input_value(&self, field: &str) -> Option<&Value> {
        self.input.get(field).filter(|v| !v.is_null())
    }
}

/// Resolve the links of `output` against the request.
///
/// Object-typed fields recurse into a nested bundle before any link on them
/// is considered. Links that do not apply (missing input, false condition,
/// no request context, plugin returning nothing) produce no entry.
pub fn resolve(output: &Arc<Schema>, ctx: &ResolveContext<'_>) -> OverrideMap {
    let mut overrides = OverrideMap::new(Arc::clone(output));

    for field in output.fields() {
        if let Some(nested) = field.ty.nested_schema() {
            overrides.insert(field.name.clone(), Override::Nested(resolve(nested, ctx)));
            continue;
        }

        let Some(link) = get_link(output, &field.name) else {
            continue;
        };
        if let Some(entry) = resolve_link(link, field, ctx) {
            overrides.insert(field.name.clone(), entry);
        }
    }

    tracing::debug!(
        schema = output.name(),
        input_schema = ctx.input_schema().name(),
        overrides = overrides.len(),
        "resolved link overrides"
    );
    overrides
}

fn resolve_link(link: &Link, field: &Field, ctx: &ResolveContext<'_>) -> Option<Override> {
    match link {
        Link::FromInput(from) => copy_from_input(from, ctx),
        Link::DateRange(range) => date_range(range, field, ctx),
        Link::When(when) => {
            let actual = ctx.input().get(&when.condition_field).unwrap_or(&Value::Null);
            if !when.matches(actual) {
                return None;
            }
            match &when.then {
                ThenLink::FromInput(from) => copy_from_input(from, ctx),
                ThenLink::DateRange(range) => date_range(range, field, ctx),
            }
        }
        Link::Computed(computed) => Some(Override::Computed(computed.clone())),
        Link::Header(header) => ctx
            .request?
            .header(&header.name)
            .map(|v| Override::Value(Value::String(v.to_string()))),
        Link::Cookie(cookie) => ctx
            .request?
            .cookie(&cookie.name)
            .map(|v| Override::Value(Value::String(v.to_string()))),
        Link::Plugin(plugin) => ctx
            .rng()
            .with(|rng| plugin.resolve(ctx.input(), rng))
            .filter(|v| !v.is_null())
            .map(Override::Value),
    }
}

fn copy_from_input(link: &FromInput, ctx: &ResolveContext<'_>) -> Option<Override> {
    ctx.input_value(&link.field).cloned().map(Override::Value)
}

fn date_range(link: &DateRangeFrom, field: &Field, ctx: &ResolveContext<'_>) -> Option<Override> {
    let start = parse_time_point(ctx.input_value(&link.start)?)?;
    let end = parse_time_point(ctx.input_value(&link.end)?)?;
    let as_date = matches!(field.ty.base(), FieldType::Date);
    let rng = ctx.rng().clone();

    Some(Override::Thunk(Thunk::new(move || {
        let point = rng.with(|r| sample_between(start, end, r));
        render_time_point(point, start.naive, as_date)
    })))
}

/// A parsed input date/time. Naive inputs are pinned to UTC.
#[derive(Debug, Clone, Copy)]
struct TimePoint {
    at: DateTime<FixedOffset>,
    naive: bool,
}

fn parse_time_point(value: &Value) -> Option<TimePoint> {
    let s = value.as_str()?.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(s) {
        return Some(TimePoint { at, naive: false });
    }
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    let utc = FixedOffset::east_opt(0)?;
    Some(TimePoint {
        at: utc.from_utc_datetime(&naive),
        naive: true,
    })
}

/// Uniform sample in `[start, end]` at microsecond resolution.
fn sample_between<R: Rng + ?Sized>(start: TimePoint, end: TimePoint, rng: &mut R) -> DateTime<FixedOffset> {
    let span = end
        .at
        .signed_duration_since(start.at)
        .num_microseconds()
        .unwrap_or(i64::MAX);
    if span <= 0 {
        return start.at;
    }
    start.at + Duration::microseconds(rng.gen_range(0..=span))
}

fn render_time_point(point: DateTime<FixedOffset>, naive: bool, as_date: bool) -> Value {
    let text = if as_date {
        point.date_naive().format("%Y-%m-%d").to_string()
    } else if naive {
        point.naive_local().format("%Y-%m-%dT%H:%M:%S%.f").to_string()
    } else {
        point.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    };
    Value::String(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RequestParts;
    use crate::links::{DateRangeFrom, FromCookie, FromHeader, WhenInput};
    use serde_json::json;

    fn query() -> Schema {
        Schema::builder("UserQuery")
            .field("name", FieldType::optional(FieldType::String))
            .field_with_default("start_date", FieldType::Date, json!("2024-01-01"))
            .field_with_default("end_date", FieldType::Date, json!("2024-12-31"))
            .build()
    }

    fn input(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn thunk_of(map: &OverrideMap, name: &str) -> Thunk {
        match map.get(name) {
            Some(Override::Thunk(t)) => t.clone(),
            other => panic!("expected thunk for {name}, got {other:?}"),
        }
    }

    #[test]
    fn skips_fields_without_links() {
        let output = Arc::new(
            Schema::builder("User")
                .field("id", FieldType::Uuid)
                .field("bio", FieldType::String)
                .build(),
        );
        let schema = query();
        let ctx = ResolveContext::new(&schema, &input(json!({"name": "x"})), MockRng::seeded(1));
        assert!(resolve(&output, &ctx).is_empty());
    }

    #[test]
    fn from_input_copies_value() {
        let output = Arc::new(
            Schema::builder("User")
                .linked_field("name", FieldType::String, FromInput::new("name"))
                .build(),
        );
        let schema = query();
        let ctx = ResolveContext::new(&schema, &input(json!({"name": "alice"})), MockRng::seeded(1));
        let overrides = resolve(&output, &ctx);
        assert!(matches!(overrides.get("name"), Some(Override::Value(v)) if v == "alice"));
    }

    #[test]
    fn from_input_null_is_no_override() {
        let output = Arc::new(
            Schema::builder("User")
                .linked_field("name", FieldType::String, FromInput::new("name"))
                .build(),
        );
        let schema = query();
        let ctx = ResolveContext::new(&schema, &Map::new(), MockRng::seeded(1));
        assert!(!resolve(&output, &ctx).contains("name"));
    }

    #[test]
    fn date_range_end_equals_start_returns_start() {
        let output = Arc::new(
            Schema::builder("Event")
                .linked_field("at", FieldType::DateTime, DateRangeFrom::new("start_date", "end_date"))
                .build(),
        );
        let schema = query();
        let ctx = ResolveContext::new(
            &schema,
            &input(json!({"start_date": "2024-06-01", "end_date": "2024-06-01"})),
            MockRng::seeded(7),
        );
        let thunk = thunk_of(&resolve(&output, &ctx), "at");
        for _ in 0..5 {
            assert_eq!(thunk.call(), json!("2024-06-01T00:00:00"));
        }
    }

    #[test]
    fn date_range_end_before_start_returns_start() {
        let output = Arc::new(
            Schema::builder("Event")
                .linked_field("at", FieldType::Date, DateRangeFrom::new("start_date", "end_date"))
                .build(),
        );
        let schema = query();
        let ctx = ResolveContext::new(
            &schema,
            &input(json!({"start_date": "2024-06-10", "end_date": "2024-06-01"})),
            MockRng::seeded(7),
        );
        let thunk = thunk_of(&resolve(&output, &ctx), "at");
        assert_eq!(thunk.call(), json!("2024-06-10"));
    }

    #[test]
    fn date_range_unparseable_is_no_override() {
        let output = Arc::new(
            Schema::builder("Event")
                .linked_field("at", FieldType::DateTime, DateRangeFrom::new("start_date", "end_date"))
                .build(),
        );
        let schema = query();
        let ctx = ResolveContext::new(
            &schema,
            &input(json!({"start_date": "soon", "end_date": "2024-06-01"})),
            MockRng::seeded(7),
        );
        assert!(resolve(&output, &ctx).is_empty());
    }

    #[test]
    fn parse_time_point_forms() {
        let aware = parse_time_point(&json!("2024-03-01T10:00:00Z")).unwrap();
        assert!(!aware.naive);
        let offset = parse_time_point(&json!("2024-03-01T10:00:00+02:00")).unwrap();
        assert_eq!(offset.at.offset().local_minus_utc(), 7200);
        let naive = parse_time_point(&json!("2024-03-01T10:00:00.5")).unwrap();
        assert!(naive.naive);
        let date = parse_time_point(&json!("2024-03-01")).unwrap();
        assert_eq!(date.at.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        assert!(parse_time_point(&json!("not-a-date")).is_none());
        assert!(parse_time_point(&json!(20240301)).is_none());
    }

    #[test]
    fn aware_range_keeps_offset() {
        let output = Arc::new(
            Schema::builder("Event")
                .linked_field("at", FieldType::DateTime, DateRangeFrom::new("from", "to"))
                .build(),
        );
        let schema = Schema::empty("Window");
        let ctx = ResolveContext::new(
            &schema,
            &input(json!({"from": "2024-01-01T00:00:00+02:00", "to": "2024-01-01T00:00:00+02:00"})),
            MockRng::seeded(3),
        );
        let thunk = thunk_of(&resolve(&output, &ctx), "at");
        assert_eq!(thunk.call(), json!("2024-01-01T00:00:00+02:00"));
    }

    #[test]
    fn when_input_true_and_false() {
        let output = Arc::new(
            Schema::builder("User")
                .linked_field(
                    "role",
                    FieldType::String,
                    WhenInput::new("include_status", json!(true), FromInput::new("status")),
                )
                .build(),
        );
        let schema = Schema::empty("Query");

        let ctx = ResolveContext::new(
            &schema,
            &input(json!({"include_status": true, "status": "admin"})),
            MockRng::seeded(1),
        );
        assert!(matches!(resolve(&output, &ctx).get("role"), Some(Override::Value(v)) if v == "admin"));

        let ctx = ResolveContext::new(
            &schema,
            &input(json!({"include_status": false, "status": "admin"})),
            MockRng::seeded(1),
        );
        assert!(!resolve(&output, &ctx).contains("role"));
    }

    #[test]
    fn when_input_compares_numbers_by_value() {
        let output = Arc::new(
            Schema::builder("User")
                .linked_field(
                    "role",
                    FieldType::String,
                    WhenInput::new("level", json!(1), FromInput::new("status")),
                )
                .build(),
        );
        let schema = Schema::empty("Query");

        let ctx = ResolveContext::new(
            &schema,
            &input(json!({"level": 1.0, "status": "admin"})),
            MockRng::seeded(1),
        );
        assert!(matches!(resolve(&output, &ctx).get("role"), Some(Override::Value(v)) if v == "admin"));

        let ctx = ResolveContext::new(
            &schema,
            &input(json!({"level": 1.5, "status": "admin"})),
            MockRng::seeded(1),
        );
        assert!(!resolve(&output, &ctx).contains("role"));
    }

    #[test]
    fn computed_is_always_a_marker() {
        let output = Arc::new(
            Schema::builder("User")
                .field("first", FieldType::String)
                .linked_field(
                    "display",
                    FieldType::String,
                    ComputedFrom::new(["first"], |v: &[Value]| v[0].clone()),
                )
                .build(),
        );
        let schema = Schema::empty("Query");
        let ctx = ResolveContext::new(&schema, &Map::new(), MockRng::seeded(1));
        assert!(matches!(
            resolve(&output, &ctx).get("display"),
            Some(Override::Computed(c)) if c.fields == ["first"]
        ));
    }

    #[test]
    fn request_links_need_context() {
        let output = Arc::new(
            Schema::builder("Trace")
                .linked_field("request_id", FieldType::String, FromHeader::new("X-Request-Id"))
                .linked_field("session", FieldType::String, FromCookie::new("session_id"))
                .build(),
        );
        let schema = Schema::empty("Query");

        let ctx = ResolveContext::new(&schema, &Map::new(), MockRng::seeded(1));
        assert!(resolve(&output, &ctx).is_empty());

        let request = RequestParts::new()
            .with_header("x-request-id", "abc-123")
            .with_cookie("session_id", "s1");
        let ctx = ResolveContext::new(&schema, &Map::new(), MockRng::seeded(1)).with_request(&request);
        let overrides = resolve(&output, &ctx);
        assert!(matches!(overrides.get("request_id"), Some(Override::Value(v)) if v == "abc-123"));
        assert!(matches!(overrides.get("session"), Some(Override::Value(v)) if v == "s1"));
    }

    #[test]
    fn nested_schema_produces_bundle() {
        let address = Arc::new(
            Schema::builder("Address")
                .linked_field("city", FieldType::String, FromInput::new("city"))
                .build(),
        );
        let output = Arc::new(
            Schema::builder("User")
                .field("address", FieldType::object(address))
                .build(),
        );
        let schema = Schema::empty("Query");
        let ctx = ResolveContext::new(&schema, &input(json!({"city": "Oslo"})), MockRng::seeded(1));
        let overrides = resolve(&output, &ctx);

        let Some(Override::Nested(nested)) = overrides.get("address") else {
            panic!("expected nested bundle");
        };
        assert_eq!(nested.schema().name(), "Address");
        assert!(matches!(nested.get("city"), Some(Override::Value(v)) if v == "Oslo"));
    }

    #[test]
    fn nested_takes_precedence_over_link() {
        let address = Arc::new(Schema::empty("Address"));
        let output = Arc::new(
            Schema::builder("User")
                .linked_field("address", FieldType::object(address), FromInput::new("address"))
                .build(),
        );
        let schema = Schema::empty("Query");
        let ctx = ResolveContext::new(&schema, &input(json!({"address": "x"})), MockRng::seeded(1));
        assert!(matches!(resolve(&output, &ctx).get("address"), Some(Override::Nested(_))));
    }

    #[test]
    fn seeded_thunks_repeat_across_resolutions() {
        let output = Arc::new(
            Schema::builder("Event")
                .linked_field("at", FieldType::DateTime, DateRangeFrom::new("start_date", "end_date"))
                .build(),
        );
        let schema = query();
        let sample = || {
            let ctx = ResolveContext::new(&schema, &Map::new(), MockRng::seeded(42));
            let thunk = thunk_of(&resolve(&output, &ctx), "at");
            (0..4).map(|_| thunk.call()).collect::<Vec<_>>()
        };
        let first = sample();
        assert_eq!(first, sample());
        assert!(first.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn override_map_insert_replaces() {
        let mut map = OverrideMap::new(Arc::new(Schema::empty("S")));
        map.insert("a", Override::Value(json!(1)));
        map.insert("a", Override::Value(json!(2)));
        assert_eq!(map.len(), 1);
        assert!(matches!(map.get("a"), Some(Override::Value(v)) if *v == json!(2)));
    }
}
