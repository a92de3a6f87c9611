// Copyright 2025 Oxide Computer Company

//! schemars helper functions

use schemars::schema::InstanceType;
use schemars::schema::Schema;
use schemars::schema::SchemaObject;
use schemars::schema::SingleOrVec;
use schemars::schema::SubschemaValidation;
use serde_json::Value;
use std::fmt;

#[derive(Clone, Debug)]
pub(crate) struct StructMember {
    pub name: String,
    pub description: Option<String>,
    pub schema: Schema,
    pub required: bool,
    /// The `default` annotation, present for `#[serde(default)]` fields.
    pub default: Option<Value>,
}

/// The properties of a struct-like schema, with flattened groups merged in.
#[derive(Clone, Debug, Default)]
pub(crate) struct StructShape {
    pub members: Vec<StructMember>,
    /// The type rejects properties it does not declare
    /// (`#[serde(deny_unknown_fields)]`).
    pub deny_unknown: bool,
}

/// Lists the members of the struct described by `schema`.  Flattened groups
/// (`#[serde(flatten)]`) have already been merged by schemars; flattened
/// optional groups and enums show up as subschemas, whose members are never
/// required.
///
/// A schema that isn't struct-like is a programming error in the type that
/// was bound, so this panics with a description of the offending schema.
pub(crate) fn schema2struct(
    type_name: &str,
    schema: &Schema,
    generator: &schemars::gen::SchemaGenerator,
) -> StructShape {
    let mut shape = StructShape::default();
    if let Err(error) = collect_members(schema, generator, true, &mut shape) {
        panic!("while listing the fields of {}: {}", type_name, error);
    }
    shape
}

fn collect_members(
    schema: &Schema,
    generator: &schemars::gen::SchemaGenerator,
    required: bool,
    shape: &mut StructShape,
) -> Result<(), Schema2StructError> {
    let object = match schema {
        Schema::Object(object) => object,
        Schema::Bool(_) => {
            return Err(Schema2StructError::InvalidType(schema.clone()))
        }
    };

    if object.reference.is_some() {
        let target = generator
            .dereference(schema)
            .ok_or_else(|| Schema2StructError::InvalidType(schema.clone()))?;
        return collect_members(target, generator, required, shape);
    }

    if object.enum_values.is_some() {
        return Err(Schema2StructError::InvalidEnum(schema.clone()));
    }

    match &object.instance_type {
        Some(SingleOrVec::Single(ty)) if **ty == InstanceType::Object => {}
        None if object.subschemas.is_some() && object.object.is_none() => {
            // A bare subschema at the top is an enum, unless it's the single
            // `allOf` schemars emits for a documented struct.
            if !is_single_all_of(object.subschemas.as_deref()) {
                return Err(Schema2StructError::InvalidEnum(schema.clone()));
            }
        }
        _ => return Err(Schema2StructError::InvalidType(schema.clone())),
    }

    if let Some(validation) = &object.object {
        if matches!(
            validation.additional_properties.as_deref(),
            Some(Schema::Bool(false))
        ) {
            shape.deny_unknown = true;
        }
        for (name, member_schema) in &validation.properties {
            let default = match member_schema {
                Schema::Object(SchemaObject { metadata: Some(m), .. }) => {
                    m.default.clone()
                }
                _ => None,
            };
            let (description, member_schema) =
                schema_extract_description(member_schema);
            shape.members.push(StructMember {
                name: name.clone(),
                description,
                schema: member_schema,
                required: required && validation.required.contains(name),
                default,
            });
        }
    }

    match object.subschemas.as_deref() {
        None => Ok(()),
        Some(SubschemaValidation {
            all_of: None,
            any_of: Some(schemas),
            one_of: None,
            not: None,
            if_schema: None,
            then_schema: None,
            else_schema: None,
        }) => {
            for subschema in schemas {
                // The null alternative of a flattened `Option`.
                if is_null_schema(subschema) {
                    continue;
                }
                collect_members(subschema, generator, false, shape)?;
            }
            Ok(())
        }
        Some(SubschemaValidation { all_of: Some(schemas), .. })
            if is_single_all_of(object.subschemas.as_deref()) =>
        {
            collect_members(&schemas[0], generator, required, shape)
        }
        Some(invalid) => {
            Err(Schema2StructError::InvalidSubschema(invalid.clone()))
        }
    }
}

fn is_single_all_of(subschemas: Option<&SubschemaValidation>) -> bool {
    matches!(
        subschemas,
        Some(SubschemaValidation {
            all_of: Some(schemas),
            any_of: None,
            one_of: None,
            not: None,
            if_schema: None,
            then_schema: None,
            else_schema: None,
        }) if schemas.len() == 1
    )
}

fn is_null_schema(schema: &Schema) -> bool {
    matches!(
        schema,
        Schema::Object(SchemaObject {
            instance_type: Some(SingleOrVec::Single(ty)),
            ..
        }) if **ty == InstanceType::Null
    )
}

#[derive(Debug)]
pub(crate) enum Schema2StructError {
    InvalidEnum(Schema),
    InvalidType(Schema),
    InvalidSubschema(SubschemaValidation),
}

impl fmt::Display for Schema2StructError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (what, dump) = match self {
            Schema2StructError::InvalidEnum(schema) => (
                "invalid type (hint: enums need to be wrapped in a struct)",
                serde_json::to_string_pretty(schema),
            ),
            Schema2StructError::InvalidType(schema) => {
                ("invalid type", serde_json::to_string_pretty(schema))
            }
            Schema2StructError::InvalidSubschema(subschemas) => {
                ("invalid subschema", serde_json::to_string_pretty(subschemas))
            }
        };
        let dump = dump.unwrap_or_else(|_| "<can't serialize>".to_string());
        write!(f, "{}: {}", what, dump)
    }
}

impl std::error::Error for Schema2StructError {}

/// Splits the description off a member schema.  OpenAPI 3.0 can't put a
/// description next to a reference, so schemars wraps documented references
/// in a single-element `allOf`; that wrapper is unwrapped here.
pub(crate) fn schema_extract_description(
    schema: &Schema,
) -> (Option<String>, Schema) {
    let object = match schema {
        Schema::Bool(_) => return (None, schema.clone()),
        Schema::Object(object) => object,
    };
    let description =
        object.metadata.as_ref().and_then(|m| m.description.clone());

    if object.instance_type.is_none()
        && object.reference.is_none()
        && is_single_all_of(object.subschemas.as_deref())
    {
        if let Some(SubschemaValidation { all_of: Some(schemas), .. }) =
            object.subschemas.as_deref()
        {
            return (description, schemas[0].clone());
        }
    }

    let mut stripped = object.clone();
    if let Some(metadata) = stripped.metadata.as_mut() {
        metadata.description = None;
    }
    (description, stripped.into())
}

/// Converts a schemars schema, generated with OpenAPI 3.0 settings, into the
/// `openapiv3` representation.
///
/// schemars' OpenAPI output is close to what OpenAPI 3.0 accepts but not
/// identical: it can contain boolean schemas, `const`, numeric
/// `exclusiveMinimum`/`exclusiveMaximum`, type arrays, and integral bounds
/// written as floats.  Those are rewritten in JSON form before deserializing.
///
/// # Panics
///
/// If the rewritten schema still isn't valid OpenAPI.  Like any other problem
/// with a bound type, that's a fault of the registered operation.
pub(crate) fn j2oas_schema(
    schema: &Schema,
) -> openapiv3::ReferenceOr<openapiv3::Schema> {
    let mut value = match serde_json::to_value(schema) {
        Ok(value) => value,
        Err(error) => panic!("failed to serialize schema: {}", error),
    };
    openapi_normalize(&mut value);
    match serde_json::from_value(value.clone()) {
        Ok(converted) => converted,
        Err(error) => panic!(
            "schema is unsupported by OpenAPI 3.0 ({}):\n{}",
            error,
            serde_json::to_string_pretty(&value)
                .unwrap_or_else(|_| "<can't serialize>".to_string())
        ),
    }
}

fn openapi_normalize(value: &mut Value) {
    match value {
        Value::Bool(true) => *value = serde_json::json!({}),
        Value::Bool(false) => *value = serde_json::json!({ "not": {} }),
        Value::Object(map) => {
            map.remove("$schema");
            map.remove("definitions");
            map.remove("$defs");

            if let Some(constant) = map.remove("const") {
                map.insert("enum".to_string(), Value::Array(vec![constant]));
            }

            if let Some(Value::Array(types)) = map.get("type").cloned() {
                let non_null: Vec<_> = types
                    .iter()
                    .filter(|t| t.as_str() != Some("null"))
                    .collect();
                if non_null.len() == 1 {
                    map.insert("type".to_string(), non_null[0].clone());
                    if non_null.len() < types.len() {
                        map.insert("nullable".to_string(), Value::Bool(true));
                    }
                } else {
                    map.remove("type");
                }
            }

            for (exclusive, inclusive) in [
                ("exclusiveMinimum", "minimum"),
                ("exclusiveMaximum", "maximum"),
            ] {
                let bound = map.get(exclusive).cloned();
                if let Some(bound @ Value::Number(_)) = bound {
                    map.insert(inclusive.to_string(), bound);
                    map.insert(exclusive.to_string(), Value::Bool(true));
                }
            }

            if map.get("type").and_then(Value::as_str) == Some("integer") {
                for keyword in ["minimum", "maximum", "multipleOf"] {
                    if let Some(n) = map.get(keyword).and_then(Value::as_f64) {
                        if n.fract() == 0.0
                            && n >= i64::MIN as f64
                            && n <= i64::MAX as f64
                        {
                            map.insert(
                                keyword.to_string(),
                                Value::from(n as i64),
                            );
                        }
                    }
                }
            }

            if let Some(Value::Object(properties)) = map.get_mut("properties") {
                properties.values_mut().for_each(openapi_normalize);
            }
            for keyword in ["items", "additionalProperties", "not"] {
                match map.get_mut(keyword) {
                    Some(Value::Array(items)) => {
                        items.iter_mut().for_each(openapi_normalize)
                    }
                    // `additionalProperties: false` is valid as it stands.
                    Some(Value::Bool(_))
                        if keyword == "additionalProperties" => {}
                    Some(inner) => openapi_normalize(inner),
                    None => {}
                }
            }
            if let Some(Value::Array(items)) = map.get("items").cloned() {
                // Tuples have no OpenAPI 3.0 form; describe the element type
                // when it is uniform and fall back to anything otherwise.
                let item = match items.first() {
                    Some(first) if items.iter().all(|i| i == first) => {
                        first.clone()
                    }
                    _ => serde_json::json!({}),
                };
                map.insert("items".to_string(), item);
            }
            for keyword in ["allOf", "anyOf", "oneOf"] {
                if let Some(Value::Array(schemas)) = map.get_mut(keyword) {
                    schemas.iter_mut().for_each(openapi_normalize);
                }
            }
        }
        _ => {}
    }
}
