// Copyright 2025 Oxide Computer Company

//! Conversion of raw wire strings into JSON values
//!
//! Parameters arrive as strings.  Before validation, each is converted into
//! the JSON value its schema describes, so that the validator only ever sees
//! JSON-native values: `"10"` for an integer field becomes `10`, a repeated
//! query key becomes an array, and a JSON parameter is parsed as a document.

use crate::schema::ScalarKind;
use crate::schema::ValueShape;
use serde_json::Number;
use serde_json::Value;

/// A raw value as found on the wire.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RawValue {
    Single(String),
    /// A key that was repeated, such as `?tag=a&tag=b`.
    Multi(Vec<String>),
}

impl RawValue {
    /// The first value, which is the one used where a single value is
    /// expected.
    pub fn first(&self) -> &str {
        match self {
            RawValue::Single(value) => value,
            RawValue::Multi(values) => {
                values.first().map(String::as_str).unwrap_or("")
            }
        }
    }

    pub fn push(&mut self, value: String) {
        match self {
            RawValue::Single(first) => {
                *self = RawValue::Multi(vec![std::mem::take(first), value]);
            }
            RawValue::Multi(values) => values.push(value),
        }
    }

    /// All values joined with commas, for messages.
    pub fn display(&self) -> String {
        match self {
            RawValue::Single(value) => value.clone(),
            RawValue::Multi(values) => values.join(","),
        }
    }
}

/// How an array parameter travels on the wire.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ArrayStyle {
    /// One key per item, as in `?tag=a&tag=b`.  Values are never split, so
    /// items may contain commas or be empty.  No key at all is the empty
    /// array.
    #[default]
    Repeated,
    /// Items joined with commas, as in `?tag=a,b`.  An empty value is the
    /// empty array.  Items can't contain commas, and a list holding only
    /// the empty string has no representation.
    Delimited,
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Single(value.to_string())
    }
}

/// Converts `raw` into a JSON value of the given shape.  `style` only
/// matters for arrays.  The error is the message for the validation report.
pub fn coerce(
    raw: &RawValue,
    shape: &ValueShape,
    style: ArrayStyle,
) -> Result<Value, String> {
    match shape {
        ValueShape::Json => {
            let text = raw.first();
            serde_json::from_str(text).map_err(|error| {
                format!("unable to parse '{}' as JSON: {}", text, error)
            })
        }
        ValueShape::Scalar { kind, nullable } => {
            coerce_scalar(raw.first(), *kind, *nullable)
        }
        ValueShape::Array { item } => {
            let values: Vec<&str> = match raw {
                RawValue::Single(value) => vec![value.as_str()],
                RawValue::Multi(values) => {
                    values.iter().map(String::as_str).collect()
                }
            };
            let items: Vec<&str> = match style {
                ArrayStyle::Repeated => values,
                ArrayStyle::Delimited => values
                    .into_iter()
                    .filter(|value| !value.is_empty())
                    .flat_map(|value| value.split(','))
                    .collect(),
            };
            items
                .into_iter()
                .map(|item_raw| coerce_scalar(item_raw, *item, false))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
    }
}

fn coerce_scalar(
    raw: &str,
    kind: ScalarKind,
    nullable: bool,
) -> Result<Value, String> {
    if nullable && raw.is_empty() && kind != ScalarKind::String {
        return Ok(Value::Null);
    }

    let parsed = match kind {
        ScalarKind::String => Some(Value::String(raw.to_string())),
        ScalarKind::Integer => raw
            .parse::<i64>()
            .map(Value::from)
            .or_else(|_| raw.parse::<u64>().map(Value::from))
            .ok(),
        ScalarKind::Number => raw
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        ScalarKind::Boolean => raw.parse::<bool>().ok().map(Value::Bool),
    };
    parsed.ok_or_else(|| {
        format!("unable to parse '{}' as {}", raw, kind.as_str())
    })
}

/// Renders a JSON value as a wire string: the inverse of [`coerce`] for
/// scalars and arrays of scalars.  Returns `None` for null.
pub fn to_wire_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(to_wire_string)
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Object(_) => Some(value.to_string()),
    }
}
