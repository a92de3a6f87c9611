// Copyright 2025 Oxide Computer Company

//! Schema-driven validation of decoded values and raw JSON bodies
//!
//! A [`Validator`] is compiled once per operation (and per response status)
//! from the schemas the field map derives, and is then only read, from any
//! number of requests at once.  JSON Schema evaluation itself is delegated to
//! the `jsonschema` crate; this module decides what gets checked and turns
//! the evaluator's errors into the `"#<pointer>: <message>"` strings of a
//! [`ValidationErrors`] report.

use crate::field_map::FieldLocationMap;
use crate::location::ParamLocation;
use crate::schema::derive_body_schema;
use crate::schema::derive_parameter_schema;
use jsonschema::error::TypeKind;
use jsonschema::error::ValidationErrorKind;
use jsonschema::ValidationError;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;

/// Key of body violations in a report.
pub const BODY_KEY: &str = "body";

/// Violations keyed by `location:name`, each with its messages in the order
/// they were found.  An empty report means nothing was violated.
#[derive(
    Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize,
)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        ValidationErrors::default()
    }

    pub fn add<K: Into<String>, M: Into<String>>(
        &mut self,
        key: K,
        message: M,
    ) {
        self.0.entry(key.into()).or_default().push(message.into());
    }

    /// Folds `other` into this report, keeping the order of messages under
    /// each key.
    pub fn merge(&mut self, other: ValidationErrors) {
        for (key, messages) in other.0 {
            self.0.entry(key).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of violated keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.0.get(key).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    /// `Ok(())` when empty, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{}: {}", key, message)?;
                first = false;
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("schema for {key} is not valid JSON: {source}")]
    Parse {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("schema for {key} failed to compile: {message}")]
    Compile { key: String, message: String },
}

#[derive(Default)]
struct LocationSchemas {
    names: BTreeSet<String>,
    required: BTreeSet<String>,
    compiled: BTreeMap<String, jsonschema::Validator>,
}

#[derive(Default)]
pub struct Validator {
    locations: BTreeMap<ParamLocation, LocationSchemas>,
    body: Option<jsonschema::Validator>,
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let compiled: Vec<String> = self
            .locations
            .iter()
            .flat_map(|(location, schemas)| {
                schemas.compiled.keys().map(move |name| location.key(name))
            })
            .collect();
        f.debug_struct("Validator")
            .field("compiled", &compiled)
            .field("body", &self.body.is_some())
            .finish()
    }
}

fn compile(
    key: &str,
    schema: &[u8],
) -> Result<jsonschema::Validator, SchemaError> {
    let schema: Value = serde_json::from_slice(schema).map_err(|source| {
        SchemaError::Parse { key: key.to_string(), source }
    })?;
    jsonschema::options()
        .with_draft(jsonschema::Draft::Draft202012)
        .should_validate_formats(true)
        .build(&schema)
        .map_err(|error| SchemaError::Compile {
            key: key.to_string(),
            message: error.to_string(),
        })
}

impl Validator {
    pub fn new() -> Self {
        Validator::default()
    }

    /// Compiles the validator for every field of `map`: one schema per
    /// parameter and header, and one for the body.
    pub fn for_map(map: &FieldLocationMap) -> Result<Validator, SchemaError> {
        let mut validator = Validator::new();
        for entry in map.entries() {
            match entry.location {
                // Uploaded files are checked for presence by the decoder.
                ParamLocation::Body | ParamLocation::File => continue,
                location => {
                    let (schema, required) = derive_parameter_schema(entry);
                    validator.add_schema(
                        location,
                        &entry.wire_name,
                        &schema,
                        required,
                    )?;
                }
            }
        }
        validator.add_body_schema(&derive_body_schema(map))?;
        Ok(validator)
    }

    /// Records `name` at `location`, compiling `schema` unless it is empty.
    /// Adding the same name twice keeps the first schema.
    pub fn add_schema(
        &mut self,
        location: ParamLocation,
        name: &str,
        schema: &[u8],
        required: bool,
    ) -> Result<(), SchemaError> {
        let schemas = self.locations.entry(location).or_default();
        if schemas.names.contains(name) {
            return Ok(());
        }

        if !schema.is_empty() {
            let compiled = compile(&location.key(name), schema)?;
            schemas.compiled.insert(name.to_string(), compiled);
        }
        schemas.names.insert(name.to_string());
        if required {
            schemas.required.insert(name.to_string());
        }
        Ok(())
    }

    pub fn add_body_schema(
        &mut self,
        schema: &[u8],
    ) -> Result<(), SchemaError> {
        if self.body.is_none() && !schema.is_empty() {
            self.body = Some(compile(BODY_KEY, schema)?);
        }
        Ok(())
    }

    /// Checks that every required name at `location` is present in `values`
    /// and that every present value satisfies its schema.
    pub fn validate_data(
        &self,
        location: ParamLocation,
        values: &BTreeMap<String, Value>,
    ) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let schemas = match self.locations.get(&location) {
            Some(schemas) => schemas,
            None => return Ok(()),
        };

        for name in &schemas.required {
            if !values.contains_key(name) {
                errors.add(location.key(name), "missing value");
            }
        }
        for (name, value) in values {
            if let Some(compiled) = schemas.compiled.get(name) {
                for message in violations(compiled, value) {
                    errors.add(location.key(name), message);
                }
            }
        }
        errors.into_result()
    }

    /// Parses `body` as JSON and checks it against the body schema.
    pub fn validate_json_body(
        &self,
        body: &[u8],
    ) -> Result<(), ValidationErrors> {
        let compiled = match &self.body {
            Some(compiled) => compiled,
            None => return Ok(()),
        };

        let mut errors = ValidationErrors::new();
        match serde_json::from_slice::<Value>(body) {
            Ok(value) => {
                for message in violations(compiled, &value) {
                    errors.add(BODY_KEY, message);
                }
            }
            Err(error) => {
                errors.add(BODY_KEY, format!("#: invalid JSON: {}", error))
            }
        }
        errors.into_result()
    }

    /// Whether anything at `location` would be checked.
    pub fn has_constraints(&self, location: ParamLocation) -> bool {
        match location {
            ParamLocation::Body => self.body.is_some(),
            _ => self.locations.get(&location).is_some_and(|schemas| {
                !schemas.compiled.is_empty() || !schemas.required.is_empty()
            }),
        }
    }
}

fn violations(compiled: &jsonschema::Validator, value: &Value) -> Vec<String> {
    compiled
        .iter_errors(value)
        .map(|error| format!("#{}: {}", error.instance_path, describe(&error)))
        .collect()
}

fn describe(error: &ValidationError<'_>) -> String {
    let found = error.instance.as_ref();
    match &error.kind {
        ValidationErrorKind::Minimum { limit } => bound(">=", limit, found),
        ValidationErrorKind::Maximum { limit } => bound("<=", limit, found),
        ValidationErrorKind::ExclusiveMinimum { limit } => {
            bound(">", limit, found)
        }
        ValidationErrorKind::ExclusiveMaximum { limit } => {
            bound("<", limit, found)
        }
        ValidationErrorKind::MinLength { limit } => format!(
            "length must be >= {} but found {}",
            limit,
            found.as_str().map(|s| s.chars().count()).unwrap_or(0)
        ),
        ValidationErrorKind::MaxLength { limit } => format!(
            "length must be <= {} but found {}",
            limit,
            found.as_str().map(|s| s.chars().count()).unwrap_or(0)
        ),
        ValidationErrorKind::MinItems { limit } => format!(
            "must have at least {} items but found {}",
            limit,
            found.as_array().map(Vec::len).unwrap_or(0)
        ),
        ValidationErrorKind::MaxItems { limit } => format!(
            "must have at most {} items but found {}",
            limit,
            found.as_array().map(Vec::len).unwrap_or(0)
        ),
        ValidationErrorKind::Pattern { pattern } => {
            format!(
                "string doesn't match the regular expression \"{}\"",
                pattern
            )
        }
        ValidationErrorKind::Enum { options } => {
            format!(
                "value {} is not one of the allowed values {}",
                found, options
            )
        }
        ValidationErrorKind::Required { property } => format!(
            "property \"{}\" is missing",
            property
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| property.to_string())
        ),
        ValidationErrorKind::AdditionalProperties { unexpected } => {
            format!("property \"{}\" is unsupported", unexpected.join("\", \""))
        }
        ValidationErrorKind::Type { kind: TypeKind::Single(expected) } => {
            format!("expected {}, but got {}", expected, json_type_name(found))
        }
        _ => error.to_string(),
    }
}

/// Writes integral floats (`10.0` in a schema generated from a range
/// attribute) as integers.
fn bound(op: &str, limit: &Value, found: &Value) -> String {
    format!(
        "must be {} {} but found {}",
        op,
        number_text(limit),
        number_text(found)
    )
}

fn number_text(value: &Value) -> String {
    match value.as_f64() {
        Some(n) if value.is_f64() && n.fract() == 0.0 && n.abs() < 9.0e15 => {
            format!("{}", n as i64)
        }
        _ => value.to_string(),
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
