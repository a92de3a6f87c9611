// Copyright 2025 Oxide Computer Company

//! Schema derivation from a [`FieldLocationMap`]
//!
//! Every schema used at runtime and in the OpenAPI document comes from the
//! field map: per-parameter fragments for validating decoded parameters, one
//! body schema for validating raw JSON bodies, and the OpenAPI forms of both.

use crate::field_map::BodyMode;
use crate::field_map::FieldEntry;
use crate::field_map::FieldLocationMap;
use crate::location::ParamLocation;
use schemars::schema::InstanceType;
use schemars::schema::ObjectValidation;
use schemars::schema::Schema;
use schemars::schema::SchemaObject;
use serde_json::Map;
use serde_json::Value;

/// The kind of a single scalar value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScalarKind {
    String,
    Integer,
    Number,
    Boolean,
}

impl ScalarKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarKind::String => "string",
            ScalarKind::Integer => "integer",
            ScalarKind::Number => "number",
            ScalarKind::Boolean => "boolean",
        }
    }
}

/// How a raw wire value is turned into a JSON value before validation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValueShape {
    Scalar { kind: ScalarKind, nullable: bool },
    Array { item: ScalarKind },
    /// The raw value is a JSON document.
    Json,
}

impl ValueShape {
    /// Derives the shape of a value from its JSON Schema.  Returns `None` for
    /// anything other than a scalar or an array of scalars.
    pub(crate) fn from_schema(
        schema: &Value,
        defs: &Map<String, Value>,
    ) -> Option<ValueShape> {
        let schema = resolve(schema, defs)?;
        let object = schema.as_object()?;

        // `Option<T>` for referenced `T` is `anyOf: [T, null]`, and documented
        // references are wrapped in a single `allOf`.
        for keyword in ["anyOf", "oneOf", "allOf"] {
            if let Some(Value::Array(alternatives)) = object.get(keyword) {
                let non_null: Vec<_> =
                    alternatives.iter().filter(|a| !is_null_type(a)).collect();
                if non_null.len() != 1 {
                    return None;
                }
                let nullable = non_null.len() < alternatives.len();
                return match ValueShape::from_schema(non_null[0], defs)? {
                    ValueShape::Scalar { kind, nullable: inner } => {
                        Some(ValueShape::Scalar {
                            kind,
                            nullable: nullable || inner,
                        })
                    }
                    other => Some(other),
                };
            }
        }

        let (type_name, nullable) = match object.get("type") {
            Some(Value::String(name)) => (name.as_str(), false),
            Some(Value::Array(names)) => {
                let non_null: Vec<_> = names
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|n| *n != "null")
                    .collect();
                if non_null.len() != 1 {
                    return None;
                }
                (non_null[0], non_null.len() < names.len())
            }
            Some(_) => return None,
            // Unit enums without doc comments have no type.
            None => match object.get("enum") {
                Some(Value::Array(values))
                    if values.iter().all(|v| v.is_string() || v.is_null()) =>
                {
                    ("string", values.iter().any(Value::is_null))
                }
                _ => return None,
            },
        };

        let kind = match type_name {
            "string" => ScalarKind::String,
            "integer" => ScalarKind::Integer,
            "number" => ScalarKind::Number,
            "boolean" => ScalarKind::Boolean,
            "array" => {
                let items = object.get("items")?;
                return match ValueShape::from_schema(items, defs)? {
                    ValueShape::Scalar { kind, .. } => {
                        Some(ValueShape::Array { item: kind })
                    }
                    _ => None,
                };
            }
            _ => return None,
        };
        Some(ValueShape::Scalar { kind, nullable })
    }

    pub fn is_array(&self) -> bool {
        matches!(self, ValueShape::Array { .. })
    }
}

fn is_null_type(schema: &Value) -> bool {
    schema.get("type").and_then(Value::as_str) == Some("null")
}

/// Follows a local `$ref` into `defs`.
fn resolve<'a>(
    schema: &'a Value,
    defs: &'a Map<String, Value>,
) -> Option<&'a Value> {
    match schema.get("$ref").and_then(Value::as_str) {
        Some(reference) => {
            let name = reference
                .strip_prefix("#/$defs/")
                .or_else(|| reference.strip_prefix("#/definitions/"))?;
            defs.get(name)
        }
        None => Some(schema),
    }
}

/// Keywords that describe a value without constraining it.
const ANNOTATIONS: &[&str] = &[
    "$defs",
    "$schema",
    "default",
    "deprecated",
    "description",
    "examples",
    "format",
    "nullable",
    "readOnly",
    "title",
    "type",
    "writeOnly",
];

/// A schema is trivial when it constrains nothing beyond the bare type of
/// the value.  Values with trivial schemas are documented but not validated.
pub fn is_trivial(schema: &Value) -> bool {
    match schema {
        Value::Bool(true) => true,
        Value::Object(object) => object.iter().all(|(keyword, value)| {
            if ANNOTATIONS.contains(&keyword.as_str()) {
                return true;
            }
            match (keyword.as_str(), value) {
                ("properties", Value::Object(properties)) => {
                    properties.values().all(is_trivial)
                }
                ("items", items) => is_trivial(items),
                ("additionalProperties", additional) => is_trivial(additional),
                _ => false,
            }
        }),
        _ => false,
    }
}

/// Returns the validation schema for a single parameter as JSON bytes, or an
/// empty vector when the schema is trivial, plus whether the parameter is
/// required.
pub fn derive_parameter_schema(entry: &FieldEntry) -> (Vec<u8>, bool) {
    let bytes = if is_trivial(&entry.validation_schema) {
        Vec::new()
    } else {
        serde_json::to_vec(&entry.validation_schema).unwrap_or_default()
    };
    (bytes, entry.required)
}

/// Returns the validation schema for the JSON body as bytes, or an empty
/// vector when the map has no body or its schema is trivial.
pub fn derive_body_schema(map: &FieldLocationMap) -> Vec<u8> {
    match body_validation_schema(map) {
        Some(schema) if !is_trivial(&schema) => {
            serde_json::to_vec(&schema).unwrap_or_default()
        }
        _ => Vec::new(),
    }
}

fn body_validation_schema(map: &FieldLocationMap) -> Option<Value> {
    match map.body_mode() {
        BodyMode::None => None,
        BodyMode::Entire => Some(map.root_validation_schema().clone()),
        BodyMode::Whole(property) => map
            .entries()
            .iter()
            .find(|e| {
                e.location == ParamLocation::Body && e.property == *property
            })
            .map(|e| e.validation_schema.clone()),
        BodyMode::Properties => {
            let mut properties = Map::new();
            let mut required = Vec::new();
            for entry in map.entries_at(ParamLocation::Body) {
                let mut schema = entry.validation_schema.clone();
                if let Some(object) = schema.as_object_mut() {
                    object.remove("$defs");
                }
                properties.insert(entry.property.clone(), schema);
                if entry.required {
                    required.push(Value::String(entry.property.clone()));
                }
            }

            let mut body = Map::new();
            body.insert("type".to_string(), Value::from("object"));
            body.insert("properties".to_string(), Value::Object(properties));
            if !required.is_empty() {
                body.insert("required".to_string(), Value::Array(required));
            }
            if map.deny_unknown() {
                body.insert(
                    "additionalProperties".to_string(),
                    Value::Bool(false),
                );
            }
            if !map.validation_defs().is_empty() {
                body.insert(
                    "$defs".to_string(),
                    Value::Object(map.validation_defs().clone()),
                );
            }
            Some(Value::Object(body))
        }
    }
}

/// The OpenAPI flavored schema of the body, if the map has one.
pub(crate) fn body_doc_schema(map: &FieldLocationMap) -> Option<Schema> {
    match map.body_mode() {
        BodyMode::None => None,
        BodyMode::Entire => Some(map.root_doc_schema().clone()),
        BodyMode::Whole(property) => map
            .entries()
            .iter()
            .find(|e| {
                e.location == ParamLocation::Body && e.property == *property
            })
            .map(|e| e.doc_schema.clone()),
        BodyMode::Properties => Some(properties_doc_schema(
            map,
            map.entries_at(ParamLocation::Body),
            map.deny_unknown(),
        )),
    }
}

/// The OpenAPI flavored object schema for a multipart or URL-encoded form
/// body: form fields and uploaded files.
pub(crate) fn form_doc_schema(map: &FieldLocationMap) -> Option<Schema> {
    let fields: Vec<_> = map
        .entries()
        .iter()
        .filter(|e| {
            matches!(e.location, ParamLocation::FormData | ParamLocation::File)
        })
        .collect();
    if fields.is_empty() {
        return None;
    }
    Some(properties_doc_schema(map, fields.into_iter(), false))
}

fn properties_doc_schema<'a>(
    map: &FieldLocationMap,
    entries: impl Iterator<Item = &'a FieldEntry>,
    deny_unknown: bool,
) -> Schema {
    let mut object = ObjectValidation::default();
    for entry in entries {
        let mut schema = entry.doc_schema.clone();
        if let (Some(description), Schema::Object(inner)) =
            (&entry.description, &mut schema)
        {
            if inner.reference.is_none() {
                inner.metadata().description = Some(description.clone());
            }
        }
        object.properties.insert(entry.wire_name.clone(), schema);
        if entry.required {
            object.required.insert(entry.wire_name.clone());
        }
    }
    if deny_unknown {
        object.additional_properties = Some(Box::new(Schema::Bool(false)));
    }

    let mut schema = SchemaObject {
        instance_type: Some(InstanceType::Object.into()),
        object: Some(Box::new(object)),
        ..Default::default()
    };
    schema.metadata().title = Some(map.type_name().to_string());
    schema.into()
}
