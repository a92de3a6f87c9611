// Copyright 2025 Oxide Computer Company

//! Error handling for bound operations
//!
//! Every failure that reaches the client is an [`HttpError`].  There are
//! several sources:
//!
//! * Decoding and validating a request can fail.  These failures are the
//!   client's fault and use the "invalid argument" class with status 400.
//!   Whenever a failure can be pinned to a field, the error carries a
//!   [`ValidationErrors`] report keyed by `location:name`, and all such
//!   failures in one request are reported together.
//! * A response can fail validation against its own declared schema.  This is
//!   the server's fault: the error has the "internal" class and status 500,
//!   and its message starts with "bad response".
//! * Business logic can fail.  Its error type implements [`HandlerError`],
//!   whose optional capabilities (an HTTP status, a canonical
//!   [`StatusClass`], an application error code, and structured context)
//!   decide how it is reported.  An error with none of these becomes a 500
//!   carrying the error's message.
//!
//! The body of an error response looks like this:
//!
//! ```json
//! {
//!   "msg": "invalid argument: validation failed",
//!   "details": { "header:X-Input": ["#: must be >= 10 but found 5"] }
//! }
//! ```
//!
//! `HttpError`s also have an internal message, which may differ from the
//! message sent to the client and is what gets logged.

use crate::body::Body;
use crate::http_util::CONTENT_TYPE_JSON;
use crate::http_util::HEADER_REQUEST_ID;
use crate::validator::ValidationErrors;
use http::HeaderValue;
use http::StatusCode;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

/// Canonical classification of a failure, independent of HTTP.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl StatusClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusClass::Cancelled => "canceled",
            StatusClass::Unknown => "unknown",
            StatusClass::InvalidArgument => "invalid argument",
            StatusClass::DeadlineExceeded => "deadline exceeded",
            StatusClass::NotFound => "not found",
            StatusClass::AlreadyExists => "already exists",
            StatusClass::PermissionDenied => "permission denied",
            StatusClass::ResourceExhausted => "resource exhausted",
            StatusClass::FailedPrecondition => "failed precondition",
            StatusClass::Aborted => "aborted",
            StatusClass::OutOfRange => "out of range",
            StatusClass::Unimplemented => "unimplemented",
            StatusClass::Internal => "internal",
            StatusClass::Unavailable => "unavailable",
            StatusClass::DataLoss => "data loss",
            StatusClass::Unauthenticated => "unauthenticated",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            // nginx's "client closed request"
            StatusClass::Cancelled => StatusCode::from_u16(499)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            StatusClass::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
            StatusClass::InvalidArgument => StatusCode::BAD_REQUEST,
            StatusClass::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            StatusClass::NotFound => StatusCode::NOT_FOUND,
            StatusClass::AlreadyExists => StatusCode::CONFLICT,
            StatusClass::PermissionDenied => StatusCode::FORBIDDEN,
            StatusClass::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
            StatusClass::FailedPrecondition => StatusCode::PRECONDITION_FAILED,
            StatusClass::Aborted => StatusCode::CONFLICT,
            StatusClass::OutOfRange => StatusCode::BAD_REQUEST,
            StatusClass::Unimplemented => StatusCode::NOT_IMPLEMENTED,
            StatusClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            StatusClass::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            StatusClass::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
            StatusClass::Unauthenticated => StatusCode::UNAUTHORIZED,
        }
    }

    /// The class of an error reported with the given HTTP status.
    pub fn from_status(status: StatusCode) -> StatusClass {
        match status.as_u16() {
            400 => StatusClass::InvalidArgument,
            401 => StatusClass::Unauthenticated,
            403 => StatusClass::PermissionDenied,
            404 => StatusClass::NotFound,
            409 => StatusClass::AlreadyExists,
            412 => StatusClass::FailedPrecondition,
            429 => StatusClass::ResourceExhausted,
            499 => StatusClass::Cancelled,
            501 => StatusClass::Unimplemented,
            503 => StatusClass::Unavailable,
            504 => StatusClass::DeadlineExceeded,
            400..=499 => StatusClass::FailedPrecondition,
            500..=599 => StatusClass::Internal,
            _ => StatusClass::Unknown,
        }
    }
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `HttpError` represents an error generated as part of handling a request.
/// When these bubble up to the top of the request handling stack, they are
/// turned into an HTTP response with a status code and a JSON body
/// ([`ErrorResponseBody`]).
#[derive(Debug)]
pub struct HttpError {
    /// HTTP status code for this error
    pub status_code: StatusCode,
    /// Canonical class, which prefixes the message sent to the client
    pub class: StatusClass,
    /// Optional application error code
    pub error_code: Option<String>,
    /// Error message to be sent to API client for this error
    pub external_message: String,
    /// Error message recorded in the log for this error
    pub internal_message: String,
    /// Per-field violations
    pub details: ValidationErrors,
    /// Structured context supplied by business logic
    pub context: BTreeMap<String, Value>,
}

/// Body of an HTTP response for an `HttpError`.  This type can be used to
/// deserialize an error response in order to access the message and details.
#[derive(Debug, Deserialize, PartialEq, Serialize)]
pub struct ErrorResponseBody {
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "ValidationErrors::is_empty")]
    pub details: ValidationErrors,
}

// The schema is written by hand so that optional members aren't "nullable".
impl JsonSchema for ErrorResponseBody {
    fn schema_name() -> String {
        "Error".to_string()
    }

    fn json_schema(
        gen: &mut schemars::gen::SchemaGenerator,
    ) -> schemars::schema::Schema {
        let str_schema = String::json_schema(gen);
        let details_schema = ValidationErrors::json_schema(gen);
        let context_schema = schemars::schema::SchemaObject {
            instance_type: Some(schemars::schema::InstanceType::Object.into()),
            ..Default::default()
        };

        schemars::schema::SchemaObject {
            metadata: Some(Box::new(schemars::schema::Metadata {
                description: Some("Error information from a response.".into()),
                ..Default::default()
            })),
            instance_type: Some(schemars::schema::InstanceType::Object.into()),
            object: Some(Box::new(schemars::schema::ObjectValidation {
                required: ["msg".to_string()].into_iter().collect(),
                properties: [
                    ("msg".to_string(), str_schema.clone()),
                    ("code".to_string(), str_schema),
                    ("context".to_string(), context_schema.into()),
                    ("details".to_string(), details_schema),
                ]
                .into_iter()
                .collect(),
                ..Default::default()
            })),
            ..Default::default()
        }
        .into()
    }
}

impl From<http::Error> for HttpError {
    fn from(error: http::Error) -> Self {
        HttpError::for_internal_error(format!(
            "error building response: {}",
            error
        ))
    }
}

impl HttpError {
    /// Generates an error of the given class, with the class's status code
    /// and `message` used for both the internal and external message.
    pub fn for_class(class: StatusClass, message: String) -> Self {
        HttpError {
            status_code: class.status_code(),
            class,
            error_code: None,
            internal_message: message.clone(),
            external_message: message,
            details: ValidationErrors::new(),
            context: BTreeMap::new(),
        }
    }

    /// Generates a 400 "invalid argument" error with the given `message`.
    pub fn for_bad_request(message: String) -> Self {
        HttpError::for_class(StatusClass::InvalidArgument, message)
    }

    /// Generates a 400 error carrying a report of request violations.
    pub fn for_validation(details: ValidationErrors) -> Self {
        let mut error = HttpError::for_bad_request("validation failed".into());
        error.internal_message = format!("validation failed: {}", details);
        error.details = details;
        error
    }

    /// Generates a 500 error for a response that violates its own schema.
    pub fn for_bad_response(details: ValidationErrors) -> Self {
        let mut error = HttpError::for_class(
            StatusClass::Internal,
            "bad response: validation failed".into(),
        );
        error.internal_message =
            format!("bad response: validation failed: {}", details);
        error.details = details;
        error
    }

    /// Generates a 500 error with the given `internal_message` for the log;
    /// the client sees only "Internal Server Error".
    pub fn for_internal_error(internal_message: String) -> Self {
        let status_code = StatusCode::INTERNAL_SERVER_ERROR;
        HttpError {
            status_code,
            class: StatusClass::Internal,
            error_code: None,
            external_message: status_code
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_string(),
            internal_message,
            details: ValidationErrors::new(),
            context: BTreeMap::new(),
        }
    }

    /// Generates an error with an explicit HTTP status.  The class follows
    /// from the status.
    pub fn for_status(status_code: StatusCode, message: String) -> Self {
        let class = StatusClass::from_status(status_code);
        let mut error = HttpError::for_class(class, message);
        error.status_code = status_code;
        error
    }

    /// Translates a business logic failure from the capabilities it reports.
    pub fn from_handler_error(error: &dyn HandlerError) -> Self {
        let message = error.to_string();
        let mut http_error = match (error.http_status(), error.status_class())
        {
            (Some(status), Some(class)) => {
                let mut e = HttpError::for_class(class, message);
                e.status_code = status;
                e
            }
            (Some(status), None) => HttpError::for_status(status, message),
            (None, Some(class)) => HttpError::for_class(class, message),
            (None, None) => {
                HttpError::for_class(StatusClass::Internal, message)
            }
        };
        http_error.error_code = error.app_code();
        http_error.context = error.context().unwrap_or_default();
        http_error
    }

    pub fn with_code(mut self, error_code: &str) -> Self {
        self.error_code = Some(error_code.to_string());
        self
    }

    pub fn with_context(mut self, key: &str, value: Value) -> Self {
        self.context.insert(key.to_string(), value);
        self
    }

    /// The body sent to the client.
    pub fn response_body(&self) -> ErrorResponseBody {
        ErrorResponseBody {
            msg: format!("{}: {}", self.class, self.external_message),
            code: self.error_code.clone(),
            context: self.context.clone(),
            details: self.details.clone(),
        }
    }

    /// Generates an HTTP response for the given `HttpError`, using
    /// `request_id` for the response's request id header.
    pub fn into_response(self, request_id: &str) -> http::Response<Body> {
        let body = serde_json::to_vec_pretty(&self.response_body())
            .unwrap_or_else(|_| b"{}".to_vec());
        let mut response = http::Response::new(Body::from(body));
        *response.status_mut() = self.status_code;
        let headers = response.headers_mut();
        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static(CONTENT_TYPE_JSON),
        );
        if let Ok(value) = HeaderValue::from_str(request_id) {
            headers.insert(HEADER_REQUEST_ID, value);
        }
        response
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HttpError({}): {}: {}",
            self.status_code, self.class, self.external_message
        )
    }
}

impl Error for HttpError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}

/// Failures returned by business logic.
///
/// Every capability is optional.  An error that implements none of them is
/// reported as a 500 with its `Display` output as the message.
pub trait HandlerError: fmt::Display + Send + 'static {
    /// Overrides the HTTP status of the response.
    fn http_status(&self) -> Option<StatusCode> {
        None
    }

    /// Canonical classification, used for the status when no explicit one is
    /// given and as the message prefix.
    fn status_class(&self) -> Option<StatusClass> {
        None
    }

    /// Application error code, reported as `code`.
    fn app_code(&self) -> Option<String> {
        None
    }

    /// Structured context, reported as `context`.
    fn context(&self) -> Option<BTreeMap<String, Value>> {
        None
    }

    fn into_http_error(self) -> HttpError
    where
        Self: Sized,
    {
        HttpError::from_handler_error(&self)
    }
}

impl HandlerError for HttpError {
    fn into_http_error(self) -> HttpError {
        self
    }
}
