//! Core types: schemas, field types, output shapes and HTTP methods.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::ResolveError;
use crate::links::Link;

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Declared type of a schema field.
#[derive(Debug, Clone)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    /// Calendar date, serialized as `YYYY-MM-DD`.
    Date,
    /// Point in time, serialized as an ISO 8601 string.
    DateTime,
    Uuid,
    Email,
    /// One of a fixed set of JSON values.
    Enum(Vec<Value>),
    Array(Box<FieldType>),
    /// Nested object schema.
    Object(Arc<Schema>),
    /// Nullable wrapper; absent input values default to `null`.
    Optional(Box<FieldType>),
    /// Unconstrained value.
    Any,
}

impl FieldType {
    /// Wrap a type as nullable.
    pub fn optional(inner: FieldType) -> Self {
        FieldType::Optional(Box::new(inner))
    }

    /// Array of `inner`.
    pub fn array(inner: FieldType) -> Self {
        FieldType::Array(Box::new(inner))
    }

    /// Nested object of `schema`.
    pub fn object(schema: Arc<Schema>) -> Self {
        FieldType::Object(schema)
    }

    /// The nested schema of an object field, looking through `Optional`.
    ///
    /// Arrays of objects are not nested fields; the factory fills them.
    pub fn nested_schema(&self) -> Option<&Arc<Schema>> {
        match self {
            FieldType::Object(schema) => Some(schema),
            FieldType::Optional(inner) => match inner.as_ref() {
                FieldType::Object(schema) => Some(schema),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, FieldType::Optional(_))
    }

    /// The type with any `Optional` wrapper removed.
    pub fn base(&self) -> &FieldType {
        match self {
            FieldType::Optional(inner) => inner.base(),
            other => other,
        }
    }

    /// Short type name used in diagnostics.
    pub fn describe(&self) -> String {
        match self {
            FieldType::String => "string".into(),
            FieldType::Integer => "integer".into(),
            FieldType::Number => "number".into(),
            FieldType::Boolean => "boolean".into(),
            FieldType::Date => "date".into(),
            FieldType::DateTime => "date-time".into(),
            FieldType::Uuid => "uuid".into(),
            FieldType::Email => "email".into(),
            FieldType::Enum(values) => format!("enum({})", values.len()),
            FieldType::Array(inner) => format!("array<{}>", inner.describe()),
            FieldType::Object(schema) => schema.name().to_string(),
            FieldType::Optional(inner) => format!("optional<{}>", inner.describe()),
            FieldType::Any => "any".into(),
        }
    }
}

/// A single named field of a schema.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub ty: FieldType,
    /// Link metadata, attached once when the schema is declared.
    pub link: Option<Link>,
    pub default: Option<Value>,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            link: None,
            default: None,
        }
    }

    pub fn with_link(mut self, link: impl Into<Link>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Whether input must carry this field (no default, not nullable).
    pub fn is_required(&self) -> bool {
        self.default.is_none() && !self.ty.is_optional()
    }
}

/// An ordered set of fields with a name index.
///
/// Schemas are immutable once built and shared through `Arc`, so a schema
/// can only contain schemas that already exist: nesting is acyclic.
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    fields: Vec<Field>,
    index: HashMap<String, usize>,
}

impl Schema {
    /// Start declaring a schema.
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// A schema with no fields.
    pub fn empty(name: impl Into<String>) -> Self {
        Schema::builder(name).build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Produce the dict form of an input instance.
    ///
    /// Declared defaults fill missing fields and absent nullable fields become
    /// `null`. Absent required fields stay absent so payload validation can
    /// report them. Keys the schema does not declare are kept.
    pub fn normalize_input(&self, input: &Map<String, Value>) -> Map<String, Value> {
        let mut normalized = Map::new();
        for field in &self.fields {
            match input.get(&field.name) {
                Some(value) => {
                    normalized.insert(field.name.clone(), value.clone());
                }
                None => {
                    if let Some(default) = &field.default {
                        normalized.insert(field.name.clone(), default.clone());
                    } else if field.ty.is_optional() {
                        normalized.insert(field.name.clone(), Value::Null);
                    }
                }
            }
        }
        for (key, value) in input {
            if !normalized.contains_key(key) {
                normalized.insert(key.clone(), value.clone());
            }
        }
        normalized
    }

    /// Convert `key=value` string parameters into typed input values.
    ///
    /// Integer, number and boolean fields are parsed; values that fail to
    /// parse are kept as strings so validation can reject them.
    pub fn coerce_params(&self, params: &[(String, String)]) -> Map<String, Value> {
        let mut input = Map::new();
        for (key, raw) in params {
            let value = match self.field(key).map(|f| f.ty.base()) {
                Some(FieldType::Integer) => raw
                    .parse::<i64>()
                    .map(Value::from)
                    .unwrap_or_else(|_| Value::String(raw.clone())),
                Some(FieldType::Number) => raw
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or_else(|| Value::String(raw.clone())),
                Some(FieldType::Boolean) => match raw.to_ascii_lowercase().as_str() {
                    "true" | "1" | "yes" | "on" => Value::Bool(true),
                    "false" | "0" | "no" | "off" => Value::Bool(false),
                    _ => Value::String(raw.clone()),
                },
                _ => Value::String(raw.clone()),
            };
            input.insert(key.clone(), value);
        }
        input
    }
}

/// Builder for [`Schema`].
#[derive(Debug)]
pub struct SchemaBuilder {
    name: String,
    fields: Vec<Field>,
}

impl SchemaBuilder {
    /// Add an unlinked field. Re-declaring a name replaces the earlier field.
    pub fn field(self, name: impl Into<String>, ty: FieldType) -> Self {
        self.push(Field::new(name, ty))
    }

    /// Add a field carrying link metadata.
    pub fn linked_field(self, name: impl Into<String>, ty: FieldType, link: impl Into<Link>) -> Self {
        self.push(Field::new(name, ty).with_link(link))
    }

    /// Add a field with a default value (input schemas).
    pub fn field_with_default(self, name: impl Into<String>, ty: FieldType, default: Value) -> Self {
        self.push(Field::new(name, ty).with_default(default))
    }

    /// Add a fully configured field.
    pub fn push(mut self, field: Field) -> Self {
        match self.fields.iter().position(|f| f.name == field.name) {
            Some(i) => self.fields[i] = field,
            None => self.fields.push(field),
        }
        self
    }

    pub fn build(self) -> Schema {
        let index = self
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        Schema {
            name: self.name,
            fields: self.fields,
            index,
        }
    }
}

/// Shape of an endpoint response.
#[derive(Debug, Clone)]
pub enum OutputType {
    /// A single instance.
    One(Arc<Schema>),
    /// A list of instances (`list_count` long).
    List(Arc<Schema>),
    /// `{items, total, limit, offset}` driven by `limit`/`offset` input.
    Paginated(Arc<Schema>),
}

impl OutputType {
    /// The schema of each generated instance.
    pub fn schema(&self) -> &Arc<Schema> {
        match self {
            OutputType::One(s) | OutputType::List(s) | OutputType::Paginated(s) => s,
        }
    }

    /// Parse an output annotation from a definition document.
    ///
    /// Accepted forms: `"Name"`, `{"type": "array", "items": "Name"}` and
    /// `{"type": "paginated", "items": "Name"}`.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError::InvalidOutputType` naming the annotation when it
    /// is a bare collection without an item schema, names an unknown schema,
    /// or has any other shape.
    pub fn parse<F>(annotation: &Value, lookup: F) -> Result<Self, ResolveError>
    where
        F: Fn(&str) -> Option<Arc<Schema>>,
    {
        let invalid = |reason: &str| ResolveError::InvalidOutputType {
            annotation: annotation.to_string(),
            reason: reason.to_string(),
        };
        let named = |name: &str| lookup(name).ok_or_else(|| invalid("unknown schema"));

        match annotation {
            Value::String(name) => named(name).map(OutputType::One),
            Value::Object(map) => {
                let kind = map.get("type").and_then(Value::as_str);
                let items = map.get("items");
                match (kind, items) {
                    (Some("array"), Some(Value::String(name))) => named(name).map(OutputType::List),
                    (Some("paginated"), Some(Value::String(name))) => {
                        named(name).map(OutputType::Paginated)
                    }
                    (Some("array") | Some("paginated"), None) => {
                        Err(invalid("collection output has no items schema"))
                    }
                    (Some("array") | Some("paginated"), Some(_)) => {
                        Err(invalid("items must name a schema"))
                    }
                    _ => Err(invalid("expected a schema name, array or paginated output")),
                }
            }
            other => Err(invalid(&format!(
                "expected string or object, got {}",
                json_type_name(other)
            ))),
        }
    }
}

/// HTTP methods an endpoint can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Parse a method name, case-insensitively.
    ///
    /// Returns `None` for unknown values (caller should error).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" => Some(HttpMethod::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for HttpMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
