//! Conversions between wire JSON and the typed core vocabulary.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};
use tallybook_core::{CoreError, FieldType, FieldValue, LogicNode, Schema, TypedSnapshot};

use crate::error::ApiError;

/// Build a schema from a `{name: type-token}` map. Empty maps and
/// unknown type tokens are rejected.
pub fn parse_schema(fields: &BTreeMap<String, String>) -> Result<Schema, ApiError> {
    if fields.is_empty() {
        return Err(ApiError::unprocessable("schema definition has no fields"));
    }
    let mut schema = Schema::new();
    for (name, token) in fields {
        let field_type = FieldType::parse(token).ok_or_else(|| {
            ApiError::unprocessable(format!("unknown field type '{token}' for field '{name}'"))
        })?;
        schema.declare(name, field_type);
    }
    Ok(schema)
}

/// Turn a JSON literal into the typed value a declared field expects:
/// Int fields take a JSON integer, Float fields any JSON number, Text
/// fields a JSON string. Anything else is that field's type error.
pub fn typed_value(schema: &Schema, field: &str, json: &Value) -> Result<FieldValue, ApiError> {
    let declared = schema
        .field_type(field)
        .ok_or_else(|| ApiError::from(CoreError::FieldNotDeclared(field.to_owned())))?;
    match declared {
        FieldType::Int => json
            .as_i64()
            .map(FieldValue::Int)
            .ok_or_else(|| ApiError::unprocessable(format!("field '{field}' expects an integer"))),
        FieldType::Float => json
            .as_f64()
            .map(FieldValue::Float)
            .ok_or_else(|| ApiError::unprocessable(format!("field '{field}' expects a number"))),
        FieldType::Text => json
            .as_str()
            .map(|text| FieldValue::Text(text.to_owned()))
            .ok_or_else(|| ApiError::unprocessable(format!("field '{field}' expects a string"))),
    }
}

/// Decode a filter tree. An object with a `rules` key is a group
/// (emptiness is left to the evaluator); anything else must be a leaf
/// with `field`, `op` and a number-or-string `val`.
pub fn parse_logic_node(json: &Value) -> Result<LogicNode, ApiError> {
    let Some(object) = json.as_object() else {
        return Err(ApiError::bad_request("logic node must be an object"));
    };
    if let Some(rules) = object.get("rules") {
        let op = object
            .get("op")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::bad_request("logic group needs a string 'op'"))?;
        let rules = rules
            .as_array()
            .ok_or_else(|| ApiError::bad_request("'rules' must be an array"))?;
        let mut parsed = Vec::with_capacity(rules.len());
        for rule in rules {
            parsed.push(parse_logic_node(rule)?);
        }
        Ok(LogicNode::branch(op, parsed))
    } else {
        let field = object
            .get("field")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::bad_request("leaf rule needs a string 'field'"))?;
        let op = object
            .get("op")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::bad_request("leaf rule needs a string 'op'"))?;
        let literal = match object.get("val") {
            Some(Value::Number(number)) => match number.as_i64() {
                Some(int) => FieldValue::Int(int),
                None => FieldValue::Float(number.as_f64().ok_or_else(|| {
                    ApiError::bad_request("unrepresentable number in leaf 'val'")
                })?),
            },
            Some(Value::String(text)) => FieldValue::Text(text.clone()),
            _ => return Err(ApiError::bad_request("leaf 'val' must be a number or string")),
        };
        Ok(LogicNode::leaf(field, op, literal))
    }
}

/// Render a typed snapshot back to JSON; absent and undecodable fields
/// are simply not there.
pub fn snapshot_to_json(snapshot: &TypedSnapshot<'_>) -> Value {
    let mut data = Map::new();
    for (field, value) in snapshot.iter() {
        data.insert(field.to_owned(), field_value_to_json(value));
    }
    Value::Object(data)
}

pub fn field_value_to_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Int(int) => json!(int),
        FieldValue::Float(float) => json!(float),
        FieldValue::Text(text) => json!(text),
    }
}
