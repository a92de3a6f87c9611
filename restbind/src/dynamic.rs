// Copyright 2025 Oxide Computer Company

//! Records whose fields are only known at runtime
//!
//! A [`DynamicShape`] lists its fields as `(name, example, location)` triples.
//! The example value stands in for a Rust type: its JSON type becomes the
//! field's schema.  The shape produces an ordinary [`FieldLocationMap`], so
//! decoding, validation, encoding and documentation treat a dynamic record
//! exactly as they treat a static type.
//!
//! ```
//! use restbind::DynamicShape;
//! use restbind::ParamLocation;
//! use serde_json::json;
//!
//! let shape = DynamicShape::new("Lookup")
//!     .field("region", json!("us-east"), ParamLocation::Query)
//!     .field("X-Attempt", json!(1), ParamLocation::Header)
//!     .field("payload", json!({}), ParamLocation::Body);
//! let map = shape.field_map();
//! assert_eq!(map.entries().len(), 3);
//! ```
//!
//! A [`DynamicInteractor`] consumes and produces such records.  Registered
//! with [`ApiEndpoint::dynamic`](crate::ApiEndpoint::dynamic), it is routed
//! and documented like any other operation.

use crate::body::Body;
use crate::config::ConfigBinding;
use crate::decoder::RequestDecoder;
use crate::encoder::ResponseEncoder;
use crate::error::HandlerError;
use crate::error::HttpError;
use crate::field_map::entry_from_json_schema;
use crate::field_map::FieldLocationMap;
use crate::handler::ExpectedError;
use crate::handler::RequestContext;
use crate::handler::RouteHandler;
use crate::handler::ServerContext;
use crate::http_util::CONTENT_TYPE_JSON;
use crate::location::ParamLocation;
use crate::request::RawRequest;
use crate::validator::SchemaError;
use crate::validator::Validator;
use async_trait::async_trait;
use http::StatusCode;
use serde_json::json;
use serde_json::Map;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// One field of a dynamic record.
#[derive(Clone, Debug, PartialEq)]
pub struct DynamicField {
    pub name: String,
    pub example: Value,
    pub location: ParamLocation,
    pub required: bool,
}

/// The field list of a dynamic record, in order.
#[derive(Clone, Debug)]
pub struct DynamicShape {
    type_name: String,
    fields: Vec<DynamicField>,
    forbid_unknown: BTreeSet<ParamLocation>,
}

impl DynamicShape {
    pub fn new(type_name: &str) -> DynamicShape {
        DynamicShape {
            type_name: type_name.to_string(),
            fields: Vec::new(),
            forbid_unknown: BTreeSet::new(),
        }
    }

    /// Adds an optional field.
    pub fn field(
        self,
        name: &str,
        example: Value,
        location: ParamLocation,
    ) -> Self {
        self.push(name, example, location, false)
    }

    /// Adds a field that must be present.
    pub fn required_field(
        self,
        name: &str,
        example: Value,
        location: ParamLocation,
    ) -> Self {
        self.push(name, example, location, true)
    }

    fn push(
        mut self,
        name: &str,
        example: Value,
        location: ParamLocation,
        required: bool,
    ) -> Self {
        self.fields.push(DynamicField {
            name: name.to_string(),
            example,
            location,
            required: required || location == ParamLocation::Path,
        });
        self
    }

    pub fn forbid_unknown(mut self, location: ParamLocation) -> Self {
        self.forbid_unknown.insert(location);
        self
    }

    pub fn fields(&self) -> &[DynamicField] {
        &self.fields
    }

    /// Builds the field map.  Unlike maps of static types, these aren't
    /// cached; build once and keep the result.
    ///
    /// # Panics
    ///
    /// If two fields share a location and wire name.
    pub fn field_map(&self) -> Arc<FieldLocationMap> {
        let entries = self
            .fields
            .iter()
            .map(|field| {
                entry_from_json_schema(
                    field.location,
                    &field.name,
                    field.required,
                    schema_for_example(&field.example),
                )
            })
            .collect();
        Arc::new(FieldLocationMap::from_entries(
            &self.type_name,
            entries,
            self.forbid_unknown.clone(),
        ))
    }

    /// Builds a decoder for requests carrying this record.
    pub fn decoder(
        &self,
        config: &ConfigBinding,
    ) -> Result<RequestDecoder, SchemaError> {
        let map = self.field_map();
        let validator = if config.validate_requests {
            Some(Arc::new(Validator::for_map(&map)?))
        } else {
            None
        };
        Ok(RequestDecoder::new(map, validator, config.clone()))
    }

    /// Builds an encoder writing this record as a response with `status`.
    /// Header fields become response headers, body fields the JSON body.
    pub fn encoder(
        &self,
        status: StatusCode,
        config: &ConfigBinding,
    ) -> Result<ResponseEncoder, SchemaError> {
        ResponseEncoder::new(
            self.field_map(),
            status,
            CONTENT_TYPE_JSON,
            false,
            config,
        )
    }
}

/// A decoded dynamic record: field name to value.
pub type DynamicRecord = Map<String, Value>;

impl RequestDecoder {
    /// Decodes a request into a dynamic record.
    pub fn decode_dynamic(
        &self,
        raw: &RawRequest,
    ) -> Result<DynamicRecord, HttpError> {
        self.decode_value(raw)
    }
}

/// Business logic for an operation whose input and output are dynamic
/// records.
#[async_trait]
pub trait DynamicInteractor: Send + Sync + 'static {
    type Context: ServerContext;
    type Error: HandlerError;

    /// Runs the operation.  Header fields of the returned record become
    /// response headers, body fields the JSON body.
    async fn interact(
        &self,
        rqctx: &RequestContext<Self::Context>,
        input: DynamicRecord,
    ) -> Result<DynamicRecord, Self::Error>;

    fn expected_errors() -> Vec<ExpectedError> {
        Vec::new()
    }
}

pub(crate) struct DynamicHandler<D: DynamicInteractor> {
    interactor: D,
    decoder: RequestDecoder,
    encoder: ResponseEncoder,
}

impl<D: DynamicInteractor> fmt::Debug for DynamicHandler<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicHandler")
            .field("decoder", &self.decoder)
            .field("encoder", &self.encoder)
            .finish_non_exhaustive()
    }
}

impl<D: DynamicInteractor> DynamicHandler<D> {
    /// The response is a 200 when `output` has body fields and a 204
    /// otherwise.
    ///
    /// # Panics
    ///
    /// If an `output` field is somewhere other than a header or the body.
    pub(crate) fn new(
        input: &DynamicShape,
        output: &DynamicShape,
        interactor: D,
        config: &ConfigBinding,
    ) -> Result<DynamicHandler<D>, SchemaError> {
        if let Some(field) = output.fields().iter().find(|field| {
            !matches!(
                field.location,
                ParamLocation::Header | ParamLocation::Body
            )
        }) {
            panic!(
                "{}: response property \"{}\" can't be bound to {}",
                output.type_name, field.name, field.location
            );
        }
        let status = if output
            .fields()
            .iter()
            .any(|field| field.location == ParamLocation::Body)
        {
            StatusCode::OK
        } else {
            StatusCode::NO_CONTENT
        };
        Ok(DynamicHandler {
            interactor,
            decoder: input.decoder(config)?,
            encoder: output.encoder(status, config)?,
        })
    }
}

#[async_trait]
impl<D: DynamicInteractor> RouteHandler<D::Context> for DynamicHandler<D> {
    fn decoder(&self) -> &RequestDecoder {
        &self.decoder
    }

    fn encoder(&self) -> &ResponseEncoder {
        &self.encoder
    }

    fn expected_errors(&self) -> Vec<ExpectedError> {
        D::expected_errors()
    }

    async fn handle_request(
        &self,
        rqctx: RequestContext<D::Context>,
        raw: RawRequest,
    ) -> Result<http::Response<Body>, HttpError> {
        let input = self.decoder.decode_dynamic(&raw)?;
        debug!(rqctx.log, "decoded request";
            "input" => self.decoder.field_map().type_name());

        let output = self
            .interactor
            .interact(&rqctx, input)
            .await
            .map_err(HandlerError::into_http_error)?;
        self.encoder.encode_value(
            Value::Object(output),
            None,
            None,
            &rqctx.method,
            &rqctx.request_id,
        )
    }
}

/// The schema a field gets from its example value: the example's JSON type,
/// recursively for arrays.
fn schema_for_example(example: &Value) -> Value {
    match example {
        Value::Null => json!({}),
        Value::Bool(_) => json!({ "type": "boolean" }),
        Value::Number(n) if n.is_f64() => json!({ "type": "number" }),
        Value::Number(_) => json!({ "type": "integer" }),
        Value::String(_) => json!({ "type": "string" }),
        Value::Array(items) => match items.first() {
            Some(first) => {
                json!({ "type": "array", "items": schema_for_example(first) })
            }
            None => json!({ "type": "array" }),
        },
        Value::Object(_) => json!({ "type": "object" }),
    }
}
