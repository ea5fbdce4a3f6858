//! Instance generation - fills every field an override map leaves open.
//!
//! [`InstanceFactory`] is the seam between link resolution and random data:
//! it builds one instance of a schema from a map of fixed values, inventing
//! schema-consistent values for everything else. [`RandomFactory`] is the
//! default implementation. The `build_*` functions run the whole pipeline:
//! resolve, evaluate, build.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat};
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::{json, Map, Number, Value};

use crate::error::EvaluateError;
use crate::evaluate::evaluate;
use crate::resolver::{resolve, ResolveContext};
use crate::types::{FieldType, OutputType, Schema};

/// Largest page `build_paginated` will generate.
pub const MAX_PAGE_LIMIT: usize = 1000;

/// 2000-01-01T00:00:00Z
const EARLIEST_TIMESTAMP: i64 = 946_684_800;
/// 2030-12-31T23:59:59Z
const LATEST_TIMESTAMP: i64 = 1_924_991_999;

/// Builds schema instances, generating values for fields not fixed by the caller.
pub trait InstanceFactory {
    /// Make subsequent generation deterministic for `seed`.
    fn seed_random(&mut self, seed: u64);

    /// Generate one value of `ty`.
    fn generate(&mut self, ty: &FieldType) -> Value;

    /// Build one instance of `schema`, in field declaration order.
    ///
    /// Fields present in `fixed` are used verbatim; keys the schema does not
    /// declare are dropped.
    fn build(&mut self, schema: &Schema, mut fixed: Map<String, Value>) -> Value {
        let mut instance = Map::new();
        for field in schema.fields() {
            let value = match fixed.remove(&field.name) {
                Some(value) => value,
                None => self.generate(&field.ty),
            };
            instance.insert(field.name.clone(), value);
        }
        Value::Object(instance)
    }
}

/// Random, schema-consistent values from a `StdRng`.
#[derive(Debug, Clone)]
pub struct RandomFactory {
    rng: StdRng,
}

impl RandomFactory {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Seeded when `seed` is set, entropy-backed otherwise.
    pub fn from_seed_option(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::seeded)
    }

    fn word(&mut self, len: usize) -> String {
        (&mut self.rng)
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }

    fn timestamp(&mut self) -> Option<DateTime<chrono::Utc>> {
        let secs = self.rng.gen_range(EARLIEST_TIMESTAMP..=LATEST_TIMESTAMP);
        DateTime::from_timestamp(secs, 0)
    }
}

impl Default for RandomFactory {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl InstanceFactory for RandomFactory {
    fn seed_random(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn generate(&mut self, ty: &FieldType) -> Value {
        match ty {
            FieldType::String => {
                let len = self.rng.gen_range(6..=16);
                Value::String(self.word(len))
            }
            FieldType::Integer => json!(self.rng.gen_range(0..=10_000i64)),
            FieldType::Number => {
                let cents = self.rng.gen_range(0..=100_000i64);
                Number::from_f64(cents as f64 / 100.0).map_or(Value::Null, Value::Number)
            }
            FieldType::Boolean => Value::Bool(self.rng.gen_bool(0.5)),
            FieldType::Date => self
                .timestamp()
                .map_or(Value::Null, |t| json!(t.date_naive().format("%Y-%m-%d").to_string())),
            FieldType::DateTime => self
                .timestamp()
                .map_or(Value::Null, |t| json!(t.to_rfc3339_opts(SecondsFormat::Secs, true))),
            FieldType::Uuid => {
                let bytes: [u8; 16] = self.rng.gen();
                json!(uuid::Builder::from_random_bytes(bytes)
                    .into_uuid()
                    .to_string())
            }
            FieldType::Email => {
                let local = self.word(10).to_lowercase();
                json!(format!("{local}@example.com"))
            }
            FieldType::Enum(values) => values.choose(&mut self.rng).cloned().unwrap_or(Value::Null),
            FieldType::Array(inner) => {
                let len = self.rng.gen_range(1..=3);
                Value::Array((0..len).map(|_| self.generate(inner)).collect())
            }
            FieldType::Object(schema) => self.build(schema, Map::new()),
            FieldType::Optional(inner) => {
                if self.rng.gen_bool(0.2) {
                    Value::Null
                } else {
                    self.generate(inner)
                }
            }
            FieldType::Any => Value::Null,
        }
    }
}

/// List and pagination knobs for [`build_response`].
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Number of items for list outputs.
    pub list_count: usize,
    /// Keep only list items whose field equals the input value of the same name.
    pub filter_by: Option<String>,
}

/// Resolve, evaluate and build one instance of `output`.
pub fn build_one(
    output: &Arc<Schema>,
    ctx: &ResolveContext<'_>,
    factory: &mut dyn InstanceFactory,
) -> Result<Value, EvaluateError> {
    let overrides = resolve(output, ctx);
    let values = evaluate(&overrides, factory)?;
    Ok(factory.build(output, values))
}

/// Build `count` instances sharing one override map.
///
/// Thunks are re-invoked per item, so sampled fields differ between items.
/// With `filter_by`, up to `count * 5` candidates are generated and only those
/// whose `filter_by` field equals the input's value are kept; the result may
/// be shorter than `count`.
pub fn build_list(
    output: &Arc<Schema>,
    ctx: &ResolveContext<'_>,
    factory: &mut dyn InstanceFactory,
    count: usize,
    filter_by: Option<&str>,
) -> Result<Vec<Value>, EvaluateError> {
    let overrides = resolve(output, ctx);

    let Some(filter_field) = filter_by else {
        let mut items = Vec::with_capacity(count.min(MAX_PAGE_LIMIT));
        for _ in 0..count {
            let values = evaluate(&overrides, factory)?;
            items.push(factory.build(output, values));
        }
        return Ok(items);
    };

    let target = ctx.input().get(filter_field).unwrap_or(&Value::Null);
    let mut items = Vec::new();
    for _ in 0..count.saturating_mul(5) {
        if items.len() >= count {
            break;
        }
        let values = evaluate(&overrides, factory)?;
        let item = factory.build(output, values);
        if item.get(filter_field).unwrap_or(&Value::Null) == target {
            items.push(item);
        }
    }
    Ok(items)
}

/// Build a `{items, total, limit, offset}` page.
///
/// `limit` (default 10, clamped to `1..=MAX_PAGE_LIMIT`) and `offset`
/// (default 0, at least 0) come from the input. Only the page itself is
/// generated; items before `offset` are never materialized.
pub fn build_paginated(
    output: &Arc<Schema>,
    ctx: &ResolveContext<'_>,
    factory: &mut dyn InstanceFactory,
) -> Result<Value, EvaluateError> {
    let limit = usize::try_from(int_param(ctx.input().get("limit"), 10).max(1))
        .unwrap_or(MAX_PAGE_LIMIT)
        .min(MAX_PAGE_LIMIT);
    let offset = usize::try_from(int_param(ctx.input().get("offset"), 0).max(0)).unwrap_or(usize::MAX);

    let items = build_list(output, ctx, factory, limit, None)?;
    let total = offset.saturating_add(items.len());

    Ok(json!({
        "items": items,
        "total": total,
        "limit": limit,
        "offset": offset,
    }))
}

fn int_param(value: Option<&Value>, default: i64) -> i64 {
    match value {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(default),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}

/// Build the response for an endpoint output shape.
pub fn build_response(
    output: &OutputType,
    ctx: &ResolveContext<'_>,
    factory: &mut dyn InstanceFactory,
    options: &BuildOptions,
) -> Result<Value, EvaluateError> {
    match output {
        OutputType::One(schema) => build_one(schema, ctx, factory),
        OutputType::List(schema) => build_list(
            schema,
            ctx,
            factory,
            options.list_count,
            options.filter_by.as_deref(),
        )
        .map(Value::Array),
        OutputType::Paginated(schema) => build_paginated(schema, ctx, factory),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::links::{DateRangeFrom, FromInput};
    use crate::resolver::MockRng;

    fn user() -> Arc<Schema> {
        Arc::new(
            Schema::builder("User")
                .linked_field("name", FieldType::String, FromInput::new("name"))
                .field("status", FieldType::Enum(vec![json!("active"), json!("banned")]))
                .field("age", FieldType::Integer)
                .build(),
        )
    }

    fn query() -> Schema {
        Schema::builder("UserQuery")
            .field_with_default("name", FieldType::String, json!("alice"))
            .field("status", FieldType::optional(FieldType::String))
            .field("limit", FieldType::optional(FieldType::Integer))
            .field("offset", FieldType::optional(FieldType::Integer))
            .build()
    }

    #[test]
    fn generate_respects_types() {
        let mut factory = RandomFactory::seeded(5);
        assert!(factory.generate(&FieldType::String).is_string());
        assert!(factory.generate(&FieldType::Integer).is_i64());
        assert!(factory.generate(&FieldType::Number).is_number());
        assert!(factory.generate(&FieldType::Boolean).is_boolean());
        assert!(factory.generate(&FieldType::Any).is_null());

        let date = factory.generate(&FieldType::Date);
        assert_eq!(date.as_str().unwrap().len(), 10);

        let uuid = factory.generate(&FieldType::Uuid);
        assert!(uuid::Uuid::parse_str(uuid.as_str().unwrap()).is_ok());

        let email = factory.generate(&FieldType::Email);
        assert!(email.as_str().unwrap().ends_with("@example.com"));

        let array = factory.generate(&FieldType::array(FieldType::Integer));
        let len = array.as_array().unwrap().len();
        assert!((1..=3).contains(&len));
    }

    #[test]
    fn generate_enum_picks_member() {
        let values = vec![json!("a"), json!("b")];
        let mut factory = RandomFactory::seeded(2);
        for _ in 0..10 {
            assert!(values.contains(&factory.generate(&FieldType::Enum(values.clone()))));
        }
    }

    #[test]
    fn build_keeps_fixed_and_order() {
        let schema = user();
        let mut fixed = Map::new();
        fixed.insert("age".into(), json!(30));
        fixed.insert("undeclared".into(), json!(true));
        let instance = RandomFactory::seeded(1).build(&schema, fixed);

        let keys: Vec<&String> = instance.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["name", "status", "age"]);
        assert_eq!(instance["age"], json!(30));
    }

    #[test]
    fn seed_random_makes_generation_repeatable() {
        let schema = user();
        let mut factory = RandomFactory::from_entropy();
        factory.seed_random(11);
        let first = factory.build(&schema, Map::new());
        factory.seed_random(11);
        assert_eq!(first, factory.build(&schema, Map::new()));
    }

    #[test]
    fn build_one_applies_links() {
        let input_schema = query();
        let input = json!({"name": "bob"});
        let ctx = ResolveContext::new(&input_schema, input.as_object().unwrap(), MockRng::seeded(1));
        let instance = build_one(&user(), &ctx, &mut RandomFactory::seeded(1)).unwrap();
        assert_eq!(instance["name"], json!("bob"));
    }

    #[test]
    fn build_list_uses_input_defaults() {
        let input_schema = query();
        let ctx = ResolveContext::new(&input_schema, &Map::new(), MockRng::seeded(1));
        let items = build_list(&user(), &ctx, &mut RandomFactory::seeded(1), 4, None).unwrap();
        assert_eq!(items.len(), 4);
        assert!(items.iter().all(|item| item["name"] == json!("alice")));
    }

    #[test]
    fn build_list_resamples_thunks_per_item() {
        let event = Arc::new(
            Schema::builder("Event")
                .linked_field("at", FieldType::DateTime, DateRangeFrom::new("from", "to"))
                .build(),
        );
        let input_schema = Schema::empty("Window");
        let input = json!({"from": "2020-01-01T00:00:00Z", "to": "2024-01-01T00:00:00Z"});
        let ctx = ResolveContext::new(&input_schema, input.as_object().unwrap(), MockRng::seeded(4));
        let items = build_list(&event, &ctx, &mut RandomFactory::seeded(4), 5, None).unwrap();
        let distinct: std::collections::HashSet<String> =
            items.iter().map(|i| i["at"].to_string()).collect();
        assert!(distinct.len() > 1);
    }

    #[test]
    fn build_list_filter_by() {
        let input_schema = query();
        let input = json!({"status": "banned"});
        let ctx = ResolveContext::new(&input_schema, input.as_object().unwrap(), MockRng::seeded(3));
        let items = build_list(&user(), &ctx, &mut RandomFactory::seeded(3), 3, Some("status")).unwrap();
        assert!(items.len() <= 3);
        assert!(!items.is_empty());
        assert!(items.iter().all(|item| item["status"] == json!("banned")));
    }

    #[test]
    fn paginated_defaults_and_slice() {
        let input_schema = query();
        let ctx = ResolveContext::new(&input_schema, &Map::new(), MockRng::seeded(1));
        let page = build_paginated(&user(), &ctx, &mut RandomFactory::seeded(1)).unwrap();
        assert_eq!(page["limit"], json!(10));
        assert_eq!(page["offset"], json!(0));
        assert_eq!(page["total"], json!(10));
        assert_eq!(page["items"].as_array().unwrap().len(), 10);

        let input = json!({"limit": 3, "offset": 4});
        let ctx = ResolveContext::new(&input_schema, input.as_object().unwrap(), MockRng::seeded(1));
        let page = build_paginated(&user(), &ctx, &mut RandomFactory::seeded(1)).unwrap();
        assert_eq!(page["items"].as_array().unwrap().len(), 3);
        assert_eq!(page["total"], json!(7));
    }

    #[test]
    fn paginated_clamps_limit_and_offset() {
        let input_schema = query();
        let input = json!({"limit": 0, "offset": -5});
        let ctx = ResolveContext::new(&input_schema, input.as_object().unwrap(), MockRng::seeded(1));
        let page = build_paginated(&user(), &ctx, &mut RandomFactory::seeded(1)).unwrap();
        assert_eq!(page["limit"], json!(1));
        assert_eq!(page["offset"], json!(0));
        assert_eq!(page["total"], json!(1));
    }

    #[test]
    fn paginated_caps_huge_limit_and_offset() {
        let input_schema = query();
        let input = json!({"limit": 4_611_686_018_427_387_904_i64, "offset": i64::MAX});
        let ctx = ResolveContext::new(&input_schema, input.as_object().unwrap(), MockRng::seeded(1));
        let page = build_paginated(&user(), &ctx, &mut RandomFactory::seeded(1)).unwrap();
        assert_eq!(page["limit"], json!(MAX_PAGE_LIMIT));
        assert_eq!(page["items"].as_array().unwrap().len(), MAX_PAGE_LIMIT);
        assert_eq!(page["offset"], json!(i64::MAX));
    }

    #[test]
    fn paginated_limit_from_string_param() {
        let input_schema = query();
        let input = json!({"limit": "99999999999"});
        let ctx = ResolveContext::new(&input_schema, input.as_object().unwrap(), MockRng::seeded(1));
        let page = build_paginated(&user(), &ctx, &mut RandomFactory::seeded(1)).unwrap();
        assert_eq!(page["limit"], json!(MAX_PAGE_LIMIT));
    }
}
