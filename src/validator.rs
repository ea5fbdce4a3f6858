//! Payload validation against declared schemas.

use serde_json::{json, Map, Value};

use crate::error::{SchemaError, ValidateError};
use crate::types::{FieldType, Schema};

/// Render a schema as a JSON Schema object.
///
/// Required fields are those without a default that are not `Optional`.
/// Undeclared properties are allowed.
pub fn to_json_schema(schema: &Schema) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for field in schema.fields() {
        let mut property = field_type_schema(&field.ty);
        if let (Some(default), Value::Object(map)) = (&field.default, &mut property) {
            map.insert("default".into(), default.clone());
        }
        properties.insert(field.name.clone(), property);
        if field.is_required() {
            required.push(Value::String(field.name.clone()));
        }
    }

    let mut out = Map::new();
    out.insert("title".into(), Value::String(schema.name().to_string()));
    out.insert("type".into(), json!("object"));
    out.insert("properties".into(), Value::Object(properties));
    if !required.is_empty() {
        out.insert("required".into(), Value::Array(required));
    }
    Value::Object(out)
}

fn field_type_schema(ty: &FieldType) -> Value {
    match ty {
        FieldType::String => json!({ "type": "string" }),
        FieldType::Integer => json!({ "type": "integer" }),
        FieldType::Number => json!({ "type": "number" }),
        FieldType::Boolean => json!({ "type": "boolean" }),
        FieldType::Date => json!({ "type": "string", "format": "date" }),
        FieldType::DateTime => json!({ "type": "string", "format": "date-time" }),
        FieldType::Uuid => json!({ "type": "string", "format": "uuid" }),
        FieldType::Email => json!({ "type": "string", "format": "email" }),
        FieldType::Enum(values) => json!({ "enum": values }),
        FieldType::Array(inner) => json!({ "type": "array", "items": field_type_schema(inner) }),
        FieldType::Object(nested) => to_json_schema(nested),
        FieldType::Optional(inner) => {
            json!({ "anyOf": [field_type_schema(inner), { "type": "null" }] })
        }
        FieldType::Any => json!({}),
    }
}

/// Validate a payload against a declared schema.
///
/// # Errors
///
/// Returns `ValidateError::Invalid` with every violation when the payload
/// doesn't match, or `ValidateError::InvalidSchema` if the rendered schema
/// cannot be compiled.
pub fn validate_payload(schema: &Schema, payload: &Value) -> Result<(), ValidateError> {
    validate_against_schema(&to_json_schema(schema), payload)
}

/// Validate a payload against a JSON Schema value.
pub fn validate_against_schema(schema: &Value, payload: &Value) -> Result<(), ValidateError> {
    let validator = jsonschema::validator_for(schema).map_err(|e| ValidateError::InvalidSchema {
        message: e.to_string(),
    })?;

    let errors: Vec<SchemaError> = validator
        .iter_errors(payload)
        .map(|e| SchemaError {
            path: e.instance_path.to_string(),
            message: e.to_string(),
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidateError::Invalid { errors })
    }
}
