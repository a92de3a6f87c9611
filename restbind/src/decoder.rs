// Copyright 2025 Oxide Computer Company

//! Request decoding
//!
//! A [`RequestDecoder`] is the extraction plan for one typed input and HTTP
//! method.  It's built once, from the input's [`FieldLocationMap`] and an
//! optional compiled [`Validator`], and then decodes any number of requests
//! concurrently.
//!
//! Decoding a request runs these stages for each location, without stopping
//! at the first failure:
//!
//! 1. read the raw wire values into a name to value map, reporting keys
//!    that the location forbids as "unknown parameter",
//! 2. inject declared defaults for absent names,
//! 3. coerce raw strings into JSON-native values of the field's type,
//! 4. check required names and field schemas with the validator.
//!
//! Files are looked up by part name and the JSON body is checked against the
//! body schema.  All violations are merged into one report.  Only when the
//! report is empty are the values assembled into the typed input.

use crate::bindings::Bindings;
use crate::coerce::coerce;
use crate::config::ConfigBinding;
use crate::error::HttpError;
use crate::field_map::BodyMode;
use crate::field_map::FieldLocationMap;
use crate::http_util::CONTENT_TYPE_JSON;
use crate::http_util::CONTENT_TYPE_MULTIPART_FORM_DATA;
use crate::http_util::CONTENT_TYPE_URL_ENCODED;
use crate::location::ParamLocation;
use crate::request::RawRequest;
use crate::validator::SchemaError;
use crate::validator::ValidationErrors;
use crate::validator::Validator;
use crate::validator::json_type_name;
use crate::validator::BODY_KEY;
use http::Method;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Map;
use serde_json::Value;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Locations whose values are read by name from the wire, in decoding order.
const NAMED_LOCATIONS: [ParamLocation; 5] = [
    ParamLocation::Path,
    ParamLocation::Query,
    ParamLocation::Header,
    ParamLocation::Cookie,
    ParamLocation::FormData,
];

/// A type that can be decoded from a request.
pub trait Input: DeserializeOwned + JsonSchema + Send + Sized + 'static {
    /// Where each property of the type lives on the wire.
    fn bindings() -> Bindings {
        Bindings::new()
    }

    /// Replaces the generic extraction with the type's own.  When this
    /// returns a loader, the field map is still used for documentation, but
    /// requests are decoded by the loader alone.
    fn custom_loader() -> Option<fn(&RawRequest) -> Result<Self, HttpError>> {
        None
    }
}

/// The extraction plan for one input type and method.
#[derive(Debug)]
pub struct RequestDecoder {
    map: Arc<FieldLocationMap>,
    validator: Option<Arc<Validator>>,
    config: ConfigBinding,
}

impl RequestDecoder {
    pub fn new(
        map: Arc<FieldLocationMap>,
        validator: Option<Arc<Validator>>,
        config: ConfigBinding,
    ) -> RequestDecoder {
        RequestDecoder { map, validator, config }
    }

    /// Builds the plan for input type `I` and `method`, compiling a validator
    /// when the configuration asks for request validation.
    pub fn for_input<I: Input>(
        method: &Method,
        config: &ConfigBinding,
    ) -> Result<RequestDecoder, SchemaError> {
        let map = FieldLocationMap::for_input::<I>(method, I::bindings);
        let validator = if config.validate_requests {
            Some(Arc::new(Validator::for_map(&map)?))
        } else {
            None
        };
        Ok(RequestDecoder::new(map, validator, config.clone()))
    }

    pub fn field_map(&self) -> &Arc<FieldLocationMap> {
        &self.map
    }

    pub fn validator(&self) -> Option<&Arc<Validator>> {
        self.validator.as_ref()
    }

    /// Decodes `raw` into a value of type `I`.
    pub fn decode<I: Input>(&self, raw: &RawRequest) -> Result<I, HttpError> {
        if let Some(loader) = I::custom_loader() {
            return loader(raw);
        }
        let values = self.decode_value(raw)?;
        self.assemble(values)
    }

    /// Runs every stage except the final conversion, returning the decoded
    /// values keyed by property name.
    pub fn decode_value(
        &self,
        raw: &RawRequest,
    ) -> Result<Map<String, Value>, HttpError> {
        let mut errors = ValidationErrors::new();
        let mut values = Map::new();

        for location in NAMED_LOCATIONS {
            self.decode_location(location, raw, &mut values, &mut errors);
        }
        self.decode_files(raw, &mut values, &mut errors);
        self.decode_body(raw, &mut values, &mut errors)?;

        if errors.is_empty() {
            Ok(values)
        } else {
            Err(HttpError::for_validation(errors))
        }
    }

    fn validating(&self) -> Option<&Validator> {
        if self.config.validate_requests {
            self.validator.as_deref()
        } else {
            None
        }
    }

    fn forbids_unknown(&self, location: ParamLocation) -> bool {
        self.map.forbids_unknown(location)
            || (location == ParamLocation::Query
                && self.config.forbid_unknown_query)
    }

    fn decode_location(
        &self,
        location: ParamLocation,
        raw: &RawRequest,
        values: &mut Map<String, Value>,
        errors: &mut ValidationErrors,
    ) {
        let forbid_unknown = self.forbids_unknown(location);
        if !self.map.has_location(location) && !forbid_unknown {
            return;
        }

        let mut decoded: BTreeMap<String, Value> = BTreeMap::new();
        let mut failed: BTreeSet<String> = BTreeSet::new();
        for (name, raw_value) in raw.values_at(location) {
            let Some(entry) = self.map.entry(location, &name) else {
                if forbid_unknown {
                    let message = match &raw_value {
                        Ok(value) => format!(
                            "unknown parameter with value {}",
                            value.display()
                        ),
                        Err(error) => format!("unknown parameter: {}", error),
                    };
                    errors.add(location.key(&name), message);
                }
                continue;
            };
            let raw_value = match raw_value {
                Ok(raw_value) => raw_value,
                Err(error) => {
                    errors.add(entry.key(), error.to_string());
                    failed.insert(entry.wire_name.clone());
                    continue;
                }
            };
            match coerce(&raw_value, &entry.shape, entry.array_style) {
                Ok(value) => {
                    decoded.insert(entry.wire_name.clone(), value);
                }
                Err(message) => {
                    errors.add(entry.key(), format!("#: {}", message));
                    failed.insert(entry.wire_name.clone());
                }
            }
        }

        // A repeated-key array with no keys on the wire is empty.
        for entry in self.map.entries_at(location) {
            if entry.absent_means_empty()
                && !decoded.contains_key(&entry.wire_name)
                && !failed.contains(&entry.wire_name)
                && (entry.default.is_none() || !self.config.apply_defaults)
            {
                decoded.insert(entry.wire_name.clone(), Value::Array(vec![]));
            }
        }

        if self.config.apply_defaults {
            for entry in self.map.entries_at(location) {
                if let Some(default) = &entry.default {
                    if !decoded.contains_key(&entry.wire_name)
                        && !failed.contains(&entry.wire_name)
                    {
                        decoded
                            .insert(entry.wire_name.clone(), default.clone());
                    }
                }
            }
        }

        if let Some(validator) = self.validating() {
            if let Err(violations) = validator.validate_data(location, &decoded)
            {
                merge_new_keys(errors, violations, |key| {
                    failed.iter().any(|name| location.key(name) == key)
                });
            }
        }

        for (wire_name, value) in decoded {
            if let Some(entry) = self.map.entry(location, &wire_name) {
                values.insert(entry.property.clone(), value);
            }
        }
    }

    fn decode_files(
        &self,
        raw: &RawRequest,
        values: &mut Map<String, Value>,
        errors: &mut ValidationErrors,
    ) {
        for entry in self.map.entries_at(ParamLocation::File) {
            let parts = match raw.files().get(&entry.wire_name) {
                Some(parts) if !parts.is_empty() => parts,
                _ => {
                    if entry.required {
                        errors.add(entry.key(), "missing required file");
                    }
                    continue;
                }
            };
            let value = if entry.shape.is_array() {
                Value::Array(parts.iter().map(|part| part.to_value()).collect())
            } else {
                parts[0].to_value()
            };
            values.insert(entry.property.clone(), value);
        }
    }

    fn decode_body(
        &self,
        raw: &RawRequest,
        values: &mut Map<String, Value>,
        errors: &mut ValidationErrors,
    ) -> Result<(), HttpError> {
        let body_entries: Vec<_> =
            self.map.entries_at(ParamLocation::Body).collect();
        match self.map.body_mode() {
            BodyMode::None | BodyMode::Entire => return Ok(()),
            BodyMode::Properties | BodyMode::Whole(_) => {}
        }

        match raw.media_type() {
            None | Some(CONTENT_TYPE_JSON) => {}
            // Form bodies feed form fields and files, not JSON properties.
            Some(CONTENT_TYPE_URL_ENCODED)
            | Some(CONTENT_TYPE_MULTIPART_FORM_DATA)
                if self.map.has_location(ParamLocation::FormData)
                    || self.map.has_location(ParamLocation::File) =>
            {
                return Ok(());
            }
            Some(other) => {
                let message = format!(
                    "expected content type \"{}\", got \"{}\"",
                    CONTENT_TYPE_JSON, other
                );
                // Alone, this is a plain bad request.  Next to other
                // violations it joins the report so none are lost.
                if errors.is_empty() {
                    return Err(HttpError::for_bad_request(message));
                }
                errors.add(BODY_KEY, message);
                return Ok(());
            }
        }

        if raw.body().is_empty() {
            if body_entries.iter().any(|entry| entry.required) {
                errors.add(BODY_KEY, "missing request body");
            } else {
                self.inject_body_defaults(values);
            }
            return Ok(());
        }

        if let Some(validator) = self.validating() {
            if validator.has_constraints(ParamLocation::Body) {
                let checked = validator.validate_json_body(raw.body());
                if let Err(violations) = checked {
                    errors.merge(violations);
                }
            }
        }

        let body: Value = match serde_json::from_slice(raw.body()) {
            Ok(body) => body,
            Err(error) => {
                if errors.get(BODY_KEY).is_none() {
                    errors.add(BODY_KEY, format!("#: invalid JSON: {}", error));
                }
                return Ok(());
            }
        };

        match self.map.body_mode() {
            BodyMode::Whole(property) => {
                values.insert(property.clone(), body);
            }
            _ => match body {
                Value::Object(members) => {
                    for (name, value) in members {
                        match self.map.entry_for_property(&name) {
                            // Bound elsewhere; the wire location wins.
                            Some(entry)
                                if entry.location != ParamLocation::Body => {}
                            _ => {
                                values.insert(name, value);
                            }
                        }
                    }
                    self.inject_body_defaults(values);
                }
                other => {
                    if errors.get(BODY_KEY).is_none() {
                        errors.add(
                            BODY_KEY,
                            format!(
                                "#: expected object, but got {}",
                                json_type_name(&other)
                            ),
                        );
                    }
                }
            },
        }
        Ok(())
    }

    fn inject_body_defaults(&self, values: &mut Map<String, Value>) {
        if !self.config.apply_defaults {
            return;
        }
        for entry in self.map.entries_at(ParamLocation::Body) {
            if let Some(default) = &entry.default {
                if !values.contains_key(&entry.property) {
                    values.insert(entry.property.clone(), default.clone());
                }
            }
        }
    }

    /// Converts decoded values into the typed input.  A failure here is still
    /// keyed by the field it came from.
    fn assemble<I: Input>(
        &self,
        values: Map<String, Value>,
    ) -> Result<I, HttpError> {
        let value = Value::Object(values);
        serde_path_to_error::deserialize(value).map_err(|error| {
            let path = error.path().clone();
            let message = error.into_inner().to_string();
            let mut segments = path.iter();
            let property = match segments.next() {
                Some(serde_path_to_error::Segment::Map { key }) => {
                    Some(key.clone())
                }
                _ => missing_field(&message),
            };
            let pointer: String = segments
                .map(|segment| match segment {
                    serde_path_to_error::Segment::Seq { index } => {
                        format!("/{}", index)
                    }
                    serde_path_to_error::Segment::Map { key }
                    | serde_path_to_error::Segment::Enum { variant: key } => {
                        format!("/{}", key)
                    }
                    serde_path_to_error::Segment::Unknown => String::new(),
                })
                .collect();

            let mut report = ValidationErrors::new();
            match property
                .as_deref()
                .and_then(|property| self.map.entry_for_property(property))
            {
                Some(entry) if entry.location != ParamLocation::Body => {
                    report
                        .add(entry.key(), format!("#{}: {}", pointer, message));
                }
                Some(entry) => report.add(
                    BODY_KEY,
                    format!("#/{}{}: {}", entry.property, pointer, message),
                ),
                None => report.add(BODY_KEY, format!("#: {}", message)),
            }
            HttpError::for_validation(report)
        })
    }
}

/// Adds the keys of `other` that `errors` doesn't have yet and that aren't
/// excluded.  Coercion failures already explain a key; the validator would
/// only add a confusing "missing value" for it.
fn merge_new_keys(
    errors: &mut ValidationErrors,
    other: ValidationErrors,
    excluded: impl Fn(&str) -> bool,
) {
    let mut fresh = ValidationErrors::new();
    for (key, messages) in other.iter() {
        if errors.get(key).is_none() && !excluded(key) {
            for message in messages {
                fresh.add(key.clone(), message.clone());
            }
        }
    }
    errors.merge(fresh);
}

/// Pulls the field name out of serde's "missing field `name`".
fn missing_field(message: &str) -> Option<String> {
    let rest = message.strip_prefix("missing field `")?;
    let end = rest.find('`')?;
    Some(rest[..end].to_string())
}
