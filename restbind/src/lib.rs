// Copyright 2025 Oxide Computer Company

//! restbind binds typed Rust values to HTTP requests and responses.
//!
//! An operation's input is an ordinary `Deserialize + JsonSchema` type.  Its
//! [`Input::bindings`] say where each property lives on the wire: a path
//! variable, a query parameter, a header, a cookie, a form field, an uploaded
//! file or (for anything not bound elsewhere) a member of the JSON body.  From
//! the type's schema and those bindings the crate builds a
//! [`FieldLocationMap`] once, and everything else is driven by that one map:
//!
//! * [`RequestDecoder`] reads raw wire values, coerces strings into the JSON
//!   types the schema calls for, fills in defaults and validates the result
//!   with JSON Schema.  Every problem with a request is collected into a
//!   single report keyed by `location:name`, so a client sees all of them at
//!   once.
//! * [`ResponseEncoder`] writes an [`Output`] as response headers and a JSON
//!   body, optionally validating both against the output's own schema first.
//! * [`RequestEncoder`] writes an input back onto the wire, for clients and
//!   tests.
//! * [`ApiDescription`] registers [`Interactor`]s (the business logic) under
//!   routes, dispatches requests to them, and generates an OpenAPI document
//!   describing every operation.
//!
//! ## Example
//!
//! ```
//! use async_trait::async_trait;
//! use restbind::ApiDescription;
//! use restbind::ApiEndpoint;
//! use restbind::Bindings;
//! use restbind::HttpError;
//! use restbind::Input;
//! use restbind::Interactor;
//! use restbind::Output;
//! use restbind::RequestContext;
//! use schemars::JsonSchema;
//! use serde::Deserialize;
//! use serde::Serialize;
//!
//! #[derive(Deserialize, JsonSchema)]
//! struct GetProject {
//!     /// project name
//!     name: String,
//!     #[serde(rename = "X-Trace-Id")]
//!     trace_id: Option<String>,
//! }
//!
//! impl Input for GetProject {
//!     fn bindings() -> Bindings {
//!         Bindings::new().path("name").header("X-Trace-Id")
//!     }
//! }
//!
//! #[derive(Default, JsonSchema, Serialize)]
//! struct Project {
//!     name: String,
//! }
//!
//! impl Output for Project {}
//!
//! struct ProjectGetter;
//!
//! #[async_trait]
//! impl Interactor for ProjectGetter {
//!     type Context = ();
//!     type Input = GetProject;
//!     type Output = Project;
//!     type Error = HttpError;
//!
//!     async fn interact(
//!         &self,
//!         _rqctx: &RequestContext<()>,
//!         input: GetProject,
//!         output: &mut Project,
//!     ) -> Result<(), HttpError> {
//!         output.name = input.name;
//!         Ok(())
//!     }
//! }
//!
//! let mut api = ApiDescription::new();
//! api.register(ApiEndpoint::new(
//!     "project_get",
//!     http::Method::GET,
//!     "/projects/{name}",
//!     ProjectGetter,
//! ))
//! .unwrap();
//!
//! let openapi = api.openapi("projects", "1.0.0").json().unwrap();
//! assert_eq!(
//!     openapi["paths"]["/projects/{name}"]["get"]["operationId"],
//!     "project_get"
//! );
//! ```
//!
//! ## Errors
//!
//! Failures of any stage are reported as an [`HttpError`], whose response
//! body is an [`ErrorResponseBody`]:
//!
//! ```json
//! {
//!   "msg": "invalid argument: validation failed",
//!   "details": { "header:X-Input": ["#: must be >= 10 but found 5"] }
//! }
//! ```
//!
//! A response that doesn't match its own declared schema is the server's
//! fault and is reported as `internal: bad response: validation failed`.
//! Business logic reports failures through [`HandlerError`], whose optional
//! methods choose the status, class, application code and context of the
//! response.
//!
//! ## Configuration
//!
//! [`ConfigBinding`] is meant to be embedded in a consumer's TOML
//! configuration.  It sets the request body limit, whether defaults are
//! injected and whether requests and responses are validated.  Logging is
//! configured separately with [`ConfigLogging`].

mod api_description;
mod bindings;
mod body;
mod coerce;
mod config;
mod decoder;
mod dynamic;
mod encoder;
mod error;
mod field_map;
mod files;
mod handler;
mod http_util;
mod location;
mod logging;
mod operation;
mod request;
mod request_encoder;
mod schema;
mod schema_util;
mod validator;

pub mod test_util;

#[macro_use]
extern crate slog;

pub use api_description::ApiDescription;
pub use api_description::ApiEndpoint;
pub use api_description::OpenApiDefinition;
pub use bindings::Bindings;
pub use bindings::FieldBinding;
pub use body::Body;
pub use coerce::coerce;
pub use coerce::to_wire_string;
pub use coerce::ArrayStyle;
pub use coerce::RawValue;
pub use config::ConfigBinding;
pub use decoder::Input;
pub use decoder::RequestDecoder;
pub use dynamic::DynamicField;
pub use dynamic::DynamicInteractor;
pub use dynamic::DynamicRecord;
pub use dynamic::DynamicShape;
pub use encoder::EncodedBody;
pub use encoder::Output;
pub use encoder::PendingResponse;
pub use encoder::ResponseEncoder;
pub use encoder::ResponseHead;
pub use encoder::ResponseWriter;
pub use error::ErrorResponseBody;
pub use error::HandlerError;
pub use error::HttpError;
pub use error::StatusClass;
pub use field_map::method_has_body;
pub use field_map::BodyMode;
pub use field_map::FieldEntry;
pub use field_map::FieldLocationMap;
pub use files::FileHeader;
pub use files::FilePart;
pub use files::UploadedFile;
pub use handler::ExpectedError;
pub use handler::Interactor;
pub use handler::RequestContext;
pub use handler::ServerContext;
pub use http_util::CONTENT_TYPE_JSON;
pub use http_util::CONTENT_TYPE_MULTIPART_FORM_DATA;
pub use http_util::CONTENT_TYPE_OCTET_STREAM;
pub use http_util::CONTENT_TYPE_URL_ENCODED;
pub use http_util::HEADER_REQUEST_ID;
pub use location::canonical_header_name;
pub use location::ParamLocation;
pub use logging::ConfigLogging;
pub use logging::ConfigLoggingIfExists;
pub use logging::ConfigLoggingLevel;
pub use operation::Operation;
pub use request::RawRequest;
pub use request::RequestError;
pub use request_encoder::EncodeError;
pub use request_encoder::RequestEncoder;
pub use schema::derive_body_schema;
pub use schema::derive_parameter_schema;
pub use schema::is_trivial;
pub use schema::ScalarKind;
pub use schema::ValueShape;
pub use validator::SchemaError;
pub use validator::ValidationErrors;
pub use validator::Validator;
pub use validator::BODY_KEY;
