//! Definition loading from files, strings and HTTP URLs.
//!
//! A definition document declares schemas and the endpoints serving them:
//!
//! ```json
//! {
//!   "schemas": {
//!     "UserQuery": { "properties": { "name": { "type": "string", "default": "alice" } } },
//!     "User": {
//!       "properties": {
//!         "name": { "type": "string", "x-link": { "from_input": "name" } },
//!         "address": { "$ref": "#/schemas/Address" }
//!       }
//!     },
//!     "Address": { "properties": { "city": { "type": "string" } } }
//!   },
//!   "endpoints": [
//!     { "path": "/users", "input": "UserQuery", "output": { "type": "array", "items": "User" } }
//!   ]
//! }
//! ```
//!
//! Links are declared with an `x-link` annotation on a property. Schema
//! references form a DAG: a `$ref` chain that loops back is rejected.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::api::{EndpointSpec, MockApi};
use crate::config::MockConfig;
use crate::error::DefinitionError;
use crate::links::{
    Combine, ComputedFrom, DateRangeFrom, FromCookie, FromHeader, FromInput, Link, ThenLink,
    WhenInput,
};
use crate::plugins::construct_plugin;
use crate::types::{json_type_name, Field, FieldType, HttpMethod, OutputType, Schema};

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Property annotation carrying a link declaration.
pub const LINK_ANNOTATION: &str = "x-link";

const SCHEMA_REF_PREFIX: &str = "#/schemas/";

/// Schemas and endpoints declared by one document.
#[derive(Debug, Clone, Default)]
pub struct Definition {
    schemas: Vec<Arc<Schema>>,
    endpoints: Vec<EndpointSpec>,
}

impl Definition {
    /// Top-level schemas in document order.
    pub fn schemas(&self) -> &[Arc<Schema>] {
        &self.schemas
    }

    pub fn schema(&self, name: &str) -> Option<Arc<Schema>> {
        self.schemas.iter().find(|s| s.name() == name).cloned()
    }

    pub fn endpoints(&self) -> &[EndpointSpec] {
        &self.endpoints
    }

    /// Register every endpoint on a new [`MockApi`].
    pub fn into_api(self, config: MockConfig) -> MockApi {
        let mut api = MockApi::new(config);
        for endpoint in self.endpoints {
            api.register(endpoint);
        }
        api
    }
}

/// Load a definition from a file path.
///
/// # Errors
///
/// Returns `DefinitionError::FileNotFound` if the file doesn't exist,
/// `DefinitionError::InvalidJson` if the file isn't valid JSON, or the
/// error for the first invalid declaration.
pub fn load_definition(path: &Path) -> Result<Definition, DefinitionError> {
    parse_definition(&load_document(path)?)
}

/// Load a definition from a JSON string.
pub fn load_definition_str(content: &str) -> Result<Definition, DefinitionError> {
    let document = serde_json::from_str(content).map_err(|source| DefinitionError::InvalidJson { source })?;
    parse_definition(&document)
}

fn load_document(path: &Path) -> Result<Value, DefinitionError> {
    if !path.exists() {
        return Err(DefinitionError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| DefinitionError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| DefinitionError::InvalidJson { source })
}

/// Fetch a definition document from an HTTP/HTTPS URL.
///
/// Requires the `remote` feature (enabled by default).
///
/// # Errors
///
/// Returns `DefinitionError::NetworkError` if the request fails or the body
/// isn't JSON.
#[cfg(feature = "remote")]
pub fn load_definition_url(url: &str) -> Result<Definition, DefinitionError> {
    parse_definition(&fetch_document(url)?)
}

#[cfg(feature = "remote")]
fn fetch_document(url: &str) -> Result<Value, DefinitionError> {
    let network = |source| DefinitionError::NetworkError {
        url: url.to_string(),
        source,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(network)?;

    tracing::debug!(url, "fetching definition");
    client
        .get(url)
        .send()
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.json())
        .map_err(network)
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Load a definition from a file path or URL, with an optional fragment.
///
/// `api.json#/mock` loads the document and parses the value at `/mock`.
pub fn load_definition_auto(source: &str) -> Result<Definition, DefinitionError> {
    let (location, fragment) = match source.split_once('#') {
        Some((location, fragment)) => (location, Some(fragment)),
        None => (source, None),
    };

    let document = if is_url(location) {
        #[cfg(feature = "remote")]
        {
            fetch_document(location)?
        }
        #[cfg(not(feature = "remote"))]
        {
            return Err(DefinitionError::FileNotFound {
                path: std::path::PathBuf::from(location),
            });
        }
    } else {
        load_document(Path::new(location))?
    };

    match fragment {
        Some(fragment) => parse_definition(&navigate_fragment(&document, fragment)?),
        None => parse_definition(&document),
    }
}

/// Navigate a JSON Pointer fragment (e.g. "#/apis/users" or "/apis/users").
pub fn navigate_fragment(document: &Value, fragment: &str) -> Result<Value, DefinitionError> {
    let path = fragment.trim_start_matches('#').trim_start_matches('/');
    if path.is_empty() {
        return Ok(document.clone());
    }

    let mut current = document;
    for part in path.split('/') {
        // Unescape JSON Pointer encoding (~1 = /, ~0 = ~)
        let key = part.replace("~1", "/").replace("~0", "~");
        let next = match current {
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            other => other.get(&key),
        };
        current = next.ok_or_else(|| DefinitionError::InvalidDocument {
            path: format!("#/{}", path),
            message: "fragment not found".to_string(),
        })?;
    }
    Ok(current.clone())
}

/// Build a [`Definition`] from a parsed document.
pub fn parse_definition(document: &Value) -> Result<Definition, DefinitionError> {
    let root = document.as_object().ok_or_else(|| DefinitionError::InvalidDocument {
        path: "/".to_string(),
        message: format!("expected object, got {}", json_type_name(document)),
    })?;

    let declared = match root.get("schemas") {
        None => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(other) => {
            return Err(DefinitionError::InvalidDocument {
                path: "/schemas".to_string(),
                message: format!("expected object, got {}", json_type_name(other)),
            })
        }
    };

    let mut builder = SchemaSet {
        declared: &declared,
        built: HashMap::new(),
        in_progress: Vec::new(),
    };
    let mut schemas = Vec::with_capacity(declared.len());
    for name in declared.keys() {
        schemas.push(builder.build(name)?);
    }

    let endpoints = match root.get("endpoints") {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| parse_endpoint(item, &format!("/endpoints/{}", i), &builder))
            .collect::<Result<Vec<_>, _>>()?,
        Some(other) => {
            return Err(DefinitionError::InvalidDocument {
                path: "/endpoints".to_string(),
                message: format!("expected array, got {}", json_type_name(other)),
            })
        }
    };

    tracing::debug!(
        schemas = schemas.len(),
        endpoints = endpoints.len(),
        "parsed definition"
    );
    Ok(Definition { schemas, endpoints })
}

/// Builds declared schemas on demand, following `$ref`s depth-first.
struct SchemaSet<'a> {
    declared: &'a Map<String, Value>,
    built: HashMap<String, Arc<Schema>>,
    in_progress: Vec<String>,
}

impl SchemaSet<'_> {
    fn lookup(&self, name: &str) -> Option<Arc<Schema>> {
        self.built.get(name).cloned()
    }

    fn build(&mut self, name: &str) -> Result<Arc<Schema>, DefinitionError> {
        if let Some(schema) = self.built.get(name) {
            return Ok(Arc::clone(schema));
        }
        if let Some(pos) = self.in_progress.iter().position(|n| n == name) {
            let mut chain = self.in_progress[pos..].to_vec();
            chain.push(name.to_string());
            return Err(DefinitionError::RecursiveSchema {
                chain: chain.join(" -> "),
            });
        }

        let declared = self.declared;
        let path = format!("/schemas/{}", name);
        let body = declared
            .get(name)
            .ok_or_else(|| DefinitionError::UnknownSchema {
                name: name.to_string(),
                path: path.clone(),
            })?;

        self.in_progress.push(name.to_string());
        let schema = self.build_body(name, body, &path);
        self.in_progress.pop();

        let schema = Arc::new(schema?);
        self.built.insert(name.to_string(), Arc::clone(&schema));
        Ok(schema)
    }

    fn build_body(&mut self, name: &str, body: &Value, path: &str) -> Result<Schema, DefinitionError> {
        let body = body.as_object().ok_or_else(|| DefinitionError::InvalidDocument {
            path: path.to_string(),
            message: format!("expected object, got {}", json_type_name(body)),
        })?;

        let mut builder = Schema::builder(name);
        match body.get("properties") {
            None => {}
            Some(Value::Object(properties)) => {
                for (prop_name, prop) in properties {
                    let prop_path = format!("{}/properties/{}", path, prop_name);
                    builder = builder.push(self.parse_field(name, prop_name, prop, &prop_path)?);
                }
            }
            Some(other) => {
                return Err(DefinitionError::InvalidDocument {
                    path: format!("{}/properties", path),
                    message: format!("expected object, got {}", json_type_name(other)),
                })
            }
        }
        Ok(builder.build())
    }

    fn parse_field(
        &mut self,
        parent: &str,
        name: &str,
        prop: &Value,
        path: &str,
    ) -> Result<Field, DefinitionError> {
        let ty = self.parse_type(&format!("{}.{}", parent, name), prop, path)?;
        let mut field = Field::new(name, ty);

        if let Some(default) = prop.get("default") {
            field = field.with_default(default.clone());
        }
        if let Some(annotation) = prop.get(LINK_ANNOTATION) {
            field.link = Some(parse_link(annotation, &format!("{}/{}", path, LINK_ANNOTATION))?);
        }
        Ok(field)
    }

    /// `inline_name` names an inline object schema declared at this property.
    fn parse_type(&mut self, inline_name: &str, prop: &Value, path: &str) -> Result<FieldType, DefinitionError> {
        let prop = prop.as_object().ok_or_else(|| DefinitionError::InvalidDocument {
            path: path.to_string(),
            message: format!("expected object, got {}", json_type_name(prop)),
        })?;

        let mut nullable = prop.get("nullable").and_then(Value::as_bool).unwrap_or(false);

        let base = if let Some(reference) = prop.get("$ref") {
            let target = reference
                .as_str()
                .and_then(|r| r.strip_prefix(SCHEMA_REF_PREFIX))
                .ok_or_else(|| DefinitionError::InvalidReference {
                    path: path.to_string(),
                    reference: reference.as_str().map_or_else(|| reference.to_string(), String::from),
                })?;
            if !self.declared.contains_key(target) {
                return Err(DefinitionError::UnknownSchema {
                    name: target.to_string(),
                    path: format!("{}/$ref", path),
                });
            }
            FieldType::Object(self.build(target)?)
        } else if let Some(values) = prop.get("enum") {
            let values = values.as_array().ok_or_else(|| DefinitionError::InvalidDocument {
                path: format!("{}/enum", path),
                message: format!("expected array, got {}", json_type_name(values)),
            })?;
            if values.iter().any(Value::is_null) {
                nullable = true;
            }
            FieldType::Enum(values.iter().filter(|v| !v.is_null()).cloned().collect())
        } else {
            let type_name = match prop.get("type") {
                None => None,
                Some(Value::String(t)) => Some(t.as_str()),
                Some(Value::Array(types)) => {
                    let mut named = Vec::new();
                    for t in types {
                        match t.as_str() {
                            Some("null") => nullable = true,
                            Some(t) => named.push(t),
                            None => {
                                return Err(DefinitionError::UnknownType {
                                    path: format!("{}/type", path),
                                    value: t.to_string(),
                                })
                            }
                        }
                    }
                    match named.as_slice() {
                        [] => None,
                        [single] => Some(*single),
                        _ => {
                            return Err(DefinitionError::UnknownType {
                                path: format!("{}/type", path),
                                value: named.join("|"),
                            })
                        }
                    }
                }
                Some(other) => {
                    return Err(DefinitionError::UnknownType {
                        path: format!("{}/type", path),
                        value: other.to_string(),
                    })
                }
            };

            match type_name {
                None => FieldType::Any,
                Some("string") => match prop.get("format").and_then(Value::as_str) {
                    Some("date") => FieldType::Date,
                    Some("date-time") => FieldType::DateTime,
                    Some("uuid") => FieldType::Uuid,
                    Some("email") => FieldType::Email,
                    _ => FieldType::String,
                },
                Some("integer") => FieldType::Integer,
                Some("number") => FieldType::Number,
                Some("boolean") => FieldType::Boolean,
                Some("array") => {
                    let items = prop.get("items").ok_or_else(|| DefinitionError::MissingItems {
                        path: path.to_string(),
                    })?;
                    let item_name = format!("{}[]", inline_name);
                    FieldType::array(self.parse_type(&item_name, items, &format!("{}/items", path))?)
                }
                Some("object") => {
                    if prop.contains_key("properties") {
                        let inline = self.build_body(inline_name, &Value::Object(prop.clone()), path)?;
                        FieldType::Object(Arc::new(inline))
                    } else {
                        FieldType::Any
                    }
                }
                Some("null") => {
                    nullable = true;
                    FieldType::Any
                }
                Some(other) => {
                    return Err(DefinitionError::UnknownType {
                        path: format!("{}/type", path),
                        value: other.to_string(),
                    })
                }
            }
        };

        Ok(if nullable {
            FieldType::optional(base)
        } else {
            base
        })
    }
}

const LINK_KINDS: [&str; 6] = [
    "from_input",
    "date_range",
    "when",
    "computed",
    "from_header",
    "from_cookie",
];

/// Parse an `x-link` annotation.
fn parse_link(annotation: &Value, path: &str) -> Result<Link, DefinitionError> {
    let map = annotation
        .as_object()
        .ok_or_else(|| DefinitionError::InvalidAnnotationType {
            path: path.to_string(),
            actual: json_type_name(annotation).to_string(),
        })?;
    let invalid = |message: String| DefinitionError::InvalidLink {
        path: path.to_string(),
        message,
    };

    if let Some(kind) = map.get("plugin") {
        let kind = kind
            .as_str()
            .ok_or_else(|| invalid("\"plugin\" must be a string".to_string()))?;
        let mut params = map.clone();
        params.remove("plugin");
        return match construct_plugin(kind, &Value::Object(params)) {
            None => Err(DefinitionError::UnknownPlugin {
                path: path.to_string(),
                kind: kind.to_string(),
            }),
            Some(Err(message)) => Err(DefinitionError::PluginParams {
                path: path.to_string(),
                kind: kind.to_string(),
                message,
            }),
            Some(Ok(plugin)) => Ok(Link::Plugin(plugin)),
        };
    }

    let (kind, body) = match map.iter().next() {
        Some((kind, body)) if map.len() == 1 => (kind.as_str(), body),
        _ => {
            return Err(invalid(format!(
                "expected exactly one of {} or plugin",
                LINK_KINDS.join(", ")
            )))
        }
    };
    let text = |value: &Value, what: &str| {
        value
            .as_str()
            .map(String::from)
            .ok_or_else(|| invalid(format!("{} must be a string", what)))
    };
    let member = |value: &Value, key: &str| {
        value
            .get(key)
            .ok_or_else(|| invalid(format!("{} needs \"{}\"", kind, key)))
            .and_then(|v| text(v, key))
    };

    match kind {
        "from_input" => Ok(FromInput::new(text(body, "from_input")?).into()),
        "date_range" => Ok(DateRangeFrom::new(member(body, "start")?, member(body, "end")?).into()),
        "from_header" => Ok(FromHeader::new(text(body, "from_header")?).into()),
        "from_cookie" => Ok(FromCookie::new(text(body, "from_cookie")?).into()),
        "when" => {
            let field = member(body, "field")?;
            let equals = body
                .get("equals")
                .cloned()
                .ok_or_else(|| invalid("when needs \"equals\"".to_string()))?;
            let then = body
                .get("then")
                .ok_or_else(|| invalid("when needs \"then\"".to_string()))?;
            let then = match parse_link(then, &format!("{}/when/then", path))? {
                Link::FromInput(from) => ThenLink::FromInput(from),
                Link::DateRange(range) => ThenLink::DateRange(range),
                other => {
                    return Err(invalid(format!(
                        "when.then must be from_input or date_range, got {}",
                        other.kind_name()
                    )))
                }
            };
            Ok(WhenInput::new(field, equals, then).into())
        }
        "computed" => {
            let fields = body
                .get("fields")
                .and_then(Value::as_array)
                .ok_or_else(|| invalid("computed needs a \"fields\" array".to_string()))?
                .iter()
                .map(|f| text(f, "computed field name"))
                .collect::<Result<Vec<_>, _>>()?;
            let combine = if let Some(template) = body.get("template") {
                Combine::Template(text(template, "template")?)
            } else if let Some(separator) = body.get("join") {
                Combine::Join(text(separator, "join")?)
            } else if body.get("sum").and_then(Value::as_bool) == Some(true) {
                Combine::Sum
            } else {
                return Err(invalid(
                    "computed needs \"template\", \"join\" or \"sum\": true".to_string(),
                ));
            };
            Ok(ComputedFrom::with_combine(fields, combine).into())
        }
        other => Err(invalid(format!(
            "unknown link kind \"{}\" (expected one of {} or plugin)",
            other,
            LINK_KINDS.join(", ")
        ))),
    }
}

fn parse_endpoint(item: &Value, path: &str, schemas: &SchemaSet<'_>) -> Result<EndpointSpec, DefinitionError> {
    let map = item.as_object().ok_or_else(|| DefinitionError::InvalidDocument {
        path: path.to_string(),
        message: format!("expected object, got {}", json_type_name(item)),
    })?;

    let route = map
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| DefinitionError::InvalidDocument {
            path: path.to_string(),
            message: "endpoint needs a \"path\" string".to_string(),
        })?;

    let method = match map.get("method") {
        None => HttpMethod::Get,
        Some(value) => value
            .as_str()
            .and_then(HttpMethod::parse)
            .ok_or_else(|| DefinitionError::UnknownMethod {
                path: format!("{}/method", path),
                value: value.as_str().map_or_else(|| value.to_string(), String::from),
            })?,
    };

    let input = match map.get("input") {
        None | Some(Value::Null) => Arc::new(Schema::empty("NoInput")),
        Some(Value::String(name)) => schemas.lookup(name).ok_or_else(|| DefinitionError::UnknownSchema {
            name: name.clone(),
            path: format!("{}/input", path),
        })?,
        Some(other) => {
            return Err(DefinitionError::InvalidDocument {
                path: format!("{}/input", path),
                message: format!("expected schema name, got {}", json_type_name(other)),
            })
        }
    };

    let output = match map.get("output") {
        None | Some(Value::Null) => None,
        Some(annotation) => Some(OutputType::parse(annotation, |name| schemas.lookup(name))?),
    };

    let mut endpoint = EndpointSpec::new(route, method, input, output);
    if let Some(count) = map.get("list_count") {
        let count = count.as_u64().ok_or_else(|| DefinitionError::InvalidDocument {
            path: format!("{}/list_count", path),
            message: "expected non-negative integer".to_string(),
        })?;
        endpoint.list_count(count as usize);
    }
    if let Some(field) = map.get("filter_by") {
        let field = field.as_str().ok_or_else(|| DefinitionError::InvalidDocument {
            path: format!("{}/filter_by", path),
            message: "expected field name".to_string(),
        })?;
        endpoint.filter_by(field);
    }
    Ok(endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn users_document() -> Value {
        json!({
            "schemas": {
                "UserQuery": {
                    "properties": {
                        "name": { "type": "string", "default": "alice" },
                        "status": { "type": ["string", "null"] },
                        "start": { "type": "string", "format": "date" },
                        "end": { "type": "string", "format": "date" }
                    }
                },
                "User": {
                    "properties": {
                        "id": { "type": "string", "format": "uuid" },
                        "name": { "type": "string", "x-link": { "from_input": "name" } },
                        "joined": {
                            "type": "string",
                            "format": "date",
                            "x-link": { "date_range": { "start": "start", "end": "end" } }
                        },
                        "tags": { "type": "array", "items": { "type": "string" } },
                        "address": { "$ref": "#/schemas/Address" }
                    }
                },
                "Address": { "properties": { "city": { "type": "string" } } }
            },
            "endpoints": [
                { "path": "/users", "input": "UserQuery", "output": { "type": "array", "items": "User" }, "list_count": 3 },
                { "path": "/users/{id}", "method": "delete" }
            ]
        })
    }

    #[test]
    fn parse_schemas_and_endpoints() {
        let definition = parse_definition(&users_document()).unwrap();
        let names: Vec<&str> = definition.schemas().iter().map(|s| s.name()).collect();
        assert_eq!(names, ["UserQuery", "User", "Address"]);

        let user = definition.schema("User").unwrap();
        assert!(matches!(user.field("id").unwrap().ty, FieldType::Uuid));
        assert!(matches!(user.field("joined").unwrap().link, Some(Link::DateRange(_))));
        assert_eq!(user.field("address").unwrap().ty.describe(), "Address");
        assert_eq!(user.field("tags").unwrap().ty.describe(), "array<string>");

        let query = definition.schema("UserQuery").unwrap();
        assert!(query.field("status").unwrap().ty.is_optional());
        assert_eq!(query.field("name").unwrap().default, Some(json!("alice")));

        let endpoints = definition.endpoints();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].method, HttpMethod::Get);
        assert_eq!(endpoints[0].list_count, Some(3));
        assert!(matches!(endpoints[0].output, Some(OutputType::List(_))));
        assert_eq!(endpoints[1].method, HttpMethod::Delete);
        assert!(endpoints[1].output.is_none());
        assert_eq!(endpoints[1].input.name(), "NoInput");
    }

    #[test]
    fn ref_shares_built_schema() {
        let definition = parse_definition(&users_document()).unwrap();
        let user = definition.schema("User").unwrap();
        let nested = user.field("address").unwrap().ty.nested_schema().unwrap().clone();
        assert!(Arc::ptr_eq(&nested, &definition.schema("Address").unwrap()));
    }

    #[test]
    fn inline_object_becomes_nested_schema() {
        let document = json!({
            "schemas": {
                "User": {
                    "properties": {
                        "profile": {
                            "type": ["object", "null"],
                            "properties": { "bio": { "type": "string" } }
                        },
                        "meta": { "type": "object" }
                    }
                }
            }
        });
        let definition = parse_definition(&document).unwrap();
        let user = definition.schema("User").unwrap();
        let profile = user.field("profile").unwrap();
        assert!(profile.ty.is_optional());
        assert_eq!(profile.ty.nested_schema().unwrap().name(), "User.profile");
        assert!(matches!(user.field("meta").unwrap().ty, FieldType::Any));
    }

    #[test]
    fn recursive_refs_rejected() {
        let document = json!({
            "schemas": {
                "Node": { "properties": { "next": { "$ref": "#/schemas/Link" } } },
                "Link": { "properties": { "node": { "$ref": "#/schemas/Node" } } }
            }
        });
        let err = parse_definition(&document).unwrap_err();
        assert!(matches!(
            err,
            DefinitionError::RecursiveSchema { ref chain } if chain == "Node -> Link -> Node"
        ));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn unknown_ref_and_bad_ref() {
        let document = json!({
            "schemas": { "User": { "properties": { "a": { "$ref": "#/schemas/Ghost" } } } }
        });
        assert!(matches!(
            parse_definition(&document),
            Err(DefinitionError::UnknownSchema { ref name, .. }) if name == "Ghost"
        ));

        let document = json!({
            "schemas": { "User": { "properties": { "a": { "$ref": "other.json#/X" } } } }
        });
        assert!(matches!(
            parse_definition(&document),
            Err(DefinitionError::InvalidReference { .. })
        ));
    }

    #[test]
    fn array_without_items_rejected() {
        let document = json!({
            "schemas": { "User": { "properties": { "tags": { "type": "array" } } } }
        });
        let err = parse_definition(&document).unwrap_err();
        assert!(matches!(err, DefinitionError::MissingItems { ref path } if path == "/schemas/User/properties/tags"));
    }

    #[test]
    fn unknown_type_rejected() {
        let document = json!({
            "schemas": { "User": { "properties": { "a": { "type": "text" } } } }
        });
        assert!(matches!(
            parse_definition(&document),
            Err(DefinitionError::UnknownType { ref value, .. }) if value == "text"
        ));
    }

    #[test]
    fn link_annotation_forms() {
        let when = parse_link(
            &json!({ "when": { "field": "include", "equals": true, "then": { "from_input": "status" } } }),
            "/x",
        )
        .unwrap();
        assert!(matches!(
            when,
            Link::When(WhenInput { ref condition_field, then: ThenLink::FromInput(_), .. }) if condition_field == "include"
        ));

        let computed = parse_link(
            &json!({ "computed": { "fields": ["first", "last"], "template": "{first} {last}" } }),
            "/x",
        )
        .unwrap();
        let Link::Computed(computed) = computed else {
            panic!("expected computed link");
        };
        assert_eq!(computed.compute(&[json!("Jane"), json!("Smith")]), json!("Jane Smith"));

        let sum = parse_link(&json!({ "computed": { "fields": ["a", "b"], "sum": true } }), "/x").unwrap();
        assert!(matches!(sum, Link::Computed(ComputedFrom { combine: Combine::Sum, .. })));

        assert!(matches!(
            parse_link(&json!({ "from_header": "X-Id" }), "/x"),
            Ok(Link::Header(_))
        ));
        assert!(matches!(
            parse_link(&json!({ "from_cookie": "sid" }), "/x"),
            Ok(Link::Cookie(_))
        ));
    }

    #[test]
    fn link_annotation_errors() {
        assert!(matches!(
            parse_link(&json!("name"), "/x"),
            Err(DefinitionError::InvalidAnnotationType { ref actual, .. }) if actual == "string"
        ));
        assert!(matches!(
            parse_link(&json!({ "from_input": "a", "from_header": "b" }), "/x"),
            Err(DefinitionError::InvalidLink { .. })
        ));
        assert!(matches!(
            parse_link(&json!({ "copy": "a" }), "/x"),
            Err(DefinitionError::InvalidLink { .. })
        ));
        assert!(matches!(
            parse_link(&json!({ "date_range": { "start": "a" } }), "/x"),
            Err(DefinitionError::InvalidLink { ref message, .. }) if message.contains("\"end\"")
        ));
        assert!(matches!(
            parse_link(&json!({ "computed": { "fields": ["a"] } }), "/x"),
            Err(DefinitionError::InvalidLink { .. })
        ));
        assert!(matches!(
            parse_link(&json!({ "when": { "field": "a", "equals": 1, "then": { "from_header": "h" } } }), "/x"),
            Err(DefinitionError::InvalidLink { .. })
        ));
        assert!(matches!(
            parse_link(&json!({ "plugin": "loader-test-unregistered" }), "/x"),
            Err(DefinitionError::UnknownPlugin { .. })
        ));
    }

    #[test]
    fn bare_array_output_names_annotation() {
        let document = json!({
            "schemas": { "User": {} },
            "endpoints": [ { "path": "/users", "output": { "type": "array" } } ]
        });
        let err = parse_definition(&document).unwrap_err();
        assert!(matches!(err, DefinitionError::Output(_)));
        assert!(err.to_string().contains(r#"{"type":"array"}"#));
    }

    #[test]
    fn endpoint_errors() {
        let document = json!({ "endpoints": [ { "path": "/a", "method": "TRACE" } ] });
        assert!(matches!(
            parse_definition(&document),
            Err(DefinitionError::UnknownMethod { ref value, .. }) if value == "TRACE"
        ));

        let document = json!({ "endpoints": [ { "path": "/a", "input": "Ghost" } ] });
        assert!(matches!(
            parse_definition(&document),
            Err(DefinitionError::UnknownSchema { ref path, .. }) if path == "/endpoints/0/input"
        ));

        let document = json!({ "endpoints": [ { "method": "GET" } ] });
        assert!(matches!(
            parse_definition(&document),
            Err(DefinitionError::InvalidDocument { .. })
        ));
    }

    #[test]
    fn load_definition_valid_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", users_document()).unwrap();

        let definition = load_definition(file.path()).unwrap();
        assert_eq!(definition.endpoints().len(), 2);
    }

    #[test]
    fn load_definition_file_not_found() {
        let result = load_definition(Path::new("/nonexistent/api.json"));
        assert!(matches!(result, Err(DefinitionError::FileNotFound { .. })));
        assert_eq!(result.unwrap_err().exit_code(), 3);
    }

    #[test]
    fn load_definition_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{{ not json }}").unwrap();

        let result = load_definition(file.path());
        assert!(matches!(result, Err(DefinitionError::InvalidJson { .. })));
    }

    #[test]
    fn load_definition_str_valid() {
        let definition = load_definition_str(r#"{"schemas": {"A": {}}}"#).unwrap();
        assert!(definition.schema("A").is_some());
        assert!(definition.endpoints().is_empty());
    }

    #[test]
    fn load_definition_auto_with_fragment() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", json!({ "mock": users_document() })).unwrap();

        let source = format!("{}#/mock", file.path().display());
        let definition = load_definition_auto(&source).unwrap();
        assert_eq!(definition.endpoints().len(), 2);
    }

    #[test]
    fn navigate_fragment_paths() {
        let document = json!({ "a": { "b/c": [ { "d": 1 } ] } });
        assert_eq!(navigate_fragment(&document, "#/a/b~1c/0/d").unwrap(), json!(1));
        assert_eq!(navigate_fragment(&document, "#").unwrap(), document);
        assert!(navigate_fragment(&document, "#/missing").is_err());
    }

    #[test]
    fn is_url_detection() {
        assert!(is_url("https://example.com/api.json"));
        assert!(is_url("http://localhost:8080/api.json"));
        assert!(!is_url("api.json"));
        assert!(!is_url("/tmp/api.json"));
    }

    #[test]
    fn into_api_registers_endpoints() {
        let api = parse_definition(&users_document())
            .unwrap()
            .into_api(MockConfig::default());
        assert_eq!(api.endpoints().len(), 2);
        assert!(api.lint().is_empty());
    }

    #[cfg(feature = "remote")]
    mod remote {
        use super::*;

        #[test]
        fn load_definition_url_valid() {
            let mut server = mockito::Server::new();
            let mock = server
                .mock("GET", "/api.json")
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(users_document().to_string())
                .create();

            let definition = load_definition_url(&format!("{}/api.json", server.url())).unwrap();
            assert_eq!(definition.endpoints().len(), 2);
            mock.assert();
        }

        #[test]
        fn load_definition_url_404() {
            let mut server = mockito::Server::new();
            let _mock = server.mock("GET", "/missing.json").with_status(404).create();

            let result = load_definition_url(&format!("{}/missing.json", server.url()));
            assert!(matches!(result, Err(DefinitionError::NetworkError { .. })));
            assert_eq!(result.unwrap_err().exit_code(), 3);
        }

        #[test]
        fn load_definition_auto_url() {
            let mut server = mockito::Server::new();
            let _mock = server
                .mock("GET", "/api.json")
                .with_status(200)
                .with_body(users_document().to_string())
                .create();

            let result = load_definition_auto(&format!("{}/api.json", server.url()));
            assert!(result.is_ok());
        }
    }
}
