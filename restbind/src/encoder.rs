// Copyright 2025 Oxide Computer Company

//! Response encoding
//!
//! A [`ResponseEncoder`] is the mirror image of a
//! [`RequestDecoder`](crate::RequestDecoder): built once per output type from
//! its [`FieldLocationMap`], it writes header-bound properties into response
//! headers and the rest into the JSON body.  With response validation turned
//! on, headers and the serialized body are checked against the output's own
//! schema before anything is sent.  A violation there is the server's fault,
//! so it's reported as a 500 rather than passed on to the client.
//!
//! Outputs that stream their body get a [`ResponseWriter`] instead.  The
//! response head goes out with the first chunk (or when the writer is
//! dropped), so headers set on the writer before that are still honored.

use crate::bindings::Bindings;
use crate::body::Body;
use crate::body::BoxError;
use crate::coerce::to_wire_string;
use crate::config::ConfigBinding;
use crate::error::HttpError;
use crate::field_map::BodyMode;
use crate::field_map::FieldLocationMap;
use crate::http_util::CONTENT_TYPE_JSON;
use crate::http_util::HEADER_REQUEST_ID;
use crate::location::ParamLocation;
use crate::validator::SchemaError;
use crate::validator::Validator;
use bytes::Bytes;
use http::HeaderMap;
use http::HeaderName;
use http::HeaderValue;
use http::Method;
use http::StatusCode;
use schemars::JsonSchema;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;
use tokio::sync::mpsc;
use tokio::sync::oneshot;

/// A body serialized ahead of time by the output itself.
#[derive(Clone, Debug)]
pub struct EncodedBody {
    pub bytes: Bytes,
    /// Set when `bytes` are compressed, e.g. `gzip`.  Compressed bodies are
    /// sent as they are, without validation.
    pub content_encoding: Option<String>,
}

/// A type that can be written as a response.
pub trait Output: Serialize + JsonSchema + Default + Send + 'static {
    /// Where each property of the type lives on the wire.  Only header and
    /// body bindings are allowed.
    fn bindings() -> Bindings {
        Bindings::new()
    }

    fn success_status() -> StatusCode {
        StatusCode::OK
    }

    fn content_type() -> &'static str {
        CONTENT_TYPE_JSON
    }

    /// Outputs that return true are handed a [`ResponseWriter`] and write
    /// their own body.
    fn streams() -> bool {
        false
    }

    fn attach_writer(&mut self, _writer: ResponseWriter) {}

    /// A fingerprint of the content, sent as the `ETag` header.
    fn etag(&self) -> Option<String> {
        None
    }

    /// A pre-serialized body that replaces the generic serialization.
    fn take_encoded_body(&mut self) -> Option<EncodedBody> {
        None
    }
}

impl Output for () {
    fn success_status() -> StatusCode {
        StatusCode::NO_CONTENT
    }
}

impl<T> Output for Vec<T> where T: Serialize + JsonSchema + Send + 'static {}

impl<K, V> Output for BTreeMap<K, V>
where
    K: Serialize + Ord + Send + 'static,
    V: Serialize + JsonSchema + Send + 'static,
{
}

impl<K, V> Output for HashMap<K, V>
where
    K: Serialize + Eq + Hash + Send + 'static,
    V: Serialize + JsonSchema + Send + 'static,
{
}

/// How one header-bound property is written.
#[derive(Debug)]
struct HeaderPlan {
    property: String,
    wire_name: String,
    name: HeaderName,
    json: bool,
}

/// The encoding plan for one output type.
#[derive(Debug)]
pub struct ResponseEncoder {
    map: Arc<FieldLocationMap>,
    validator: Option<Arc<Validator>>,
    status: StatusCode,
    content_type: &'static str,
    no_content: bool,
    streaming: bool,
    headers: Vec<HeaderPlan>,
}

impl ResponseEncoder {
    /// Builds the plan for output type `O`, compiling a response validator
    /// when the configuration asks for one.
    pub fn setup_output<O: Output>(
        config: &ConfigBinding,
    ) -> Result<ResponseEncoder, SchemaError> {
        let map = FieldLocationMap::for_output::<O>(O::bindings);
        ResponseEncoder::new(
            map,
            O::success_status(),
            O::content_type(),
            O::streams(),
            config,
        )
    }

    /// Builds a plan from any map, including one for a dynamic record.
    ///
    /// # Panics
    ///
    /// If a header-bound field's wire name isn't a valid header name.
    pub fn new(
        map: Arc<FieldLocationMap>,
        status: StatusCode,
        content_type: &'static str,
        streaming: bool,
        config: &ConfigBinding,
    ) -> Result<ResponseEncoder, SchemaError> {
        let validator = if config.validate_responses {
            Some(Arc::new(Validator::for_map(&map)?))
        } else {
            None
        };
        let headers = map
            .entries_at(ParamLocation::Header)
            .map(|entry| {
                let name = HeaderName::from_bytes(entry.wire_name.as_bytes())
                    .unwrap_or_else(|_| {
                        panic!(
                            "{}: \"{}\" is not a valid header name",
                            map.type_name(),
                            entry.wire_name
                        )
                    });
                HeaderPlan {
                    property: entry.property.clone(),
                    wire_name: entry.wire_name.clone(),
                    name,
                    json: entry.json_param,
                }
            })
            .collect();
        let no_content = *map.body_mode() == BodyMode::None && !streaming;
        Ok(ResponseEncoder {
            map,
            validator,
            status,
            content_type,
            no_content,
            streaming,
            headers,
        })
    }

    pub fn field_map(&self) -> &Arc<FieldLocationMap> {
        &self.map
    }

    pub fn success_status(&self) -> StatusCode {
        self.status
    }

    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    /// The response carries no body.
    pub fn no_content(&self) -> bool {
        self.no_content
    }

    pub fn streaming(&self) -> bool {
        self.streaming
    }

    /// Allocates a fresh output.  A streaming output is wired to a writer,
    /// and the returned [`PendingResponse`] resolves once that writer sends
    /// the response head.
    pub fn make_output<O: Output>(&self) -> (O, Option<PendingResponse>) {
        let mut output = O::default();
        if !self.streaming {
            return (output, None);
        }
        let (writer, pending) = ResponseWriter::new(self.status);
        output.attach_writer(writer);
        (output, Some(pending))
    }

    /// Encodes a finished output as a response.
    pub fn write_successful_response<O: Output>(
        &self,
        mut output: O,
        method: &Method,
        request_id: &str,
    ) -> Result<http::Response<Body>, HttpError> {
        let etag = output.etag();
        let encoded = output.take_encoded_body();
        let value = serde_json::to_value(&output).map_err(|error| {
            HttpError::for_internal_error(format!(
                "failed to serialize {}: {}",
                self.map.type_name(),
                error
            ))
        })?;
        self.encode_value(value, etag, encoded, method, request_id)
    }

    /// Encodes an output given as its serialized value.  This is how dynamic
    /// records are written: header fields are looked up by property name in
    /// `value` just as for a typed output.
    pub fn encode_value(
        &self,
        mut value: Value,
        etag: Option<String>,
        encoded: Option<EncodedBody>,
        method: &Method,
        request_id: &str,
    ) -> Result<http::Response<Body>, HttpError> {
        let headers = self.encode_headers(&value)?;

        let mut content_encoding = None;
        let body = if self.no_content {
            None
        } else if let Some(encoded) = encoded {
            if encoded.content_encoding.is_none() {
                self.validate_body(&encoded.bytes)?;
            }
            content_encoding = encoded.content_encoding;
            Some(encoded.bytes)
        } else {
            let bytes = self.serialize_body(&mut value)?;
            self.validate_body(&bytes)?;
            Some(bytes)
        };

        let mut response = http::Response::builder().status(self.status);
        if let Some(response_headers) = response.headers_mut() {
            response_headers.extend(headers);
            if let Some(etag) = etag {
                let etag = quoted_etag(&etag);
                let etag = HeaderValue::from_str(&etag).map_err(|_| {
                    HttpError::for_internal_error(format!(
                        "invalid ETag {:?}",
                        etag
                    ))
                })?;
                response_headers.insert(http::header::ETAG, etag);
            }
            if let Ok(request_id) = HeaderValue::from_str(request_id) {
                response_headers.insert(HEADER_REQUEST_ID, request_id);
            }
        }

        let Some(bytes) = body else {
            return Ok(response.body(Body::empty())?);
        };
        response = response
            .header(http::header::CONTENT_TYPE, self.content_type)
            .header(http::header::CONTENT_LENGTH, bytes.len());
        if let Some(encoding) = content_encoding {
            response =
                response.header(http::header::CONTENT_ENCODING, encoding);
        }
        // HEAD gets everything a GET would, except the bytes.
        let body = if *method == Method::HEAD {
            Body::empty()
        } else {
            Body::from(bytes)
        };
        Ok(response.body(body)?)
    }

    /// Writes an error response.  Error payloads are not validated.
    pub fn write_err_response(
        &self,
        error: HttpError,
        request_id: &str,
    ) -> http::Response<Body> {
        error.into_response(request_id)
    }

    fn encode_headers(&self, value: &Value) -> Result<HeaderMap, HttpError> {
        let mut headers = HeaderMap::new();
        let mut declared = BTreeMap::new();
        for plan in &self.headers {
            let field = match value.get(&plan.property) {
                None | Some(Value::Null) => continue,
                Some(field) => field,
            };
            declared.insert(plan.wire_name.clone(), field.clone());

            let texts = match field {
                _ if plan.json => vec![field.to_string()],
                Value::Array(items) => {
                    items.iter().filter_map(to_wire_string).collect()
                }
                _ => to_wire_string(field).into_iter().collect(),
            };
            for text in texts {
                let header_value = HeaderValue::from_str(&text).map_err(|_| {
                    HttpError::for_internal_error(format!(
                        "value of response header \"{}\" can't be sent: {:?}",
                        plan.wire_name, text
                    ))
                })?;
                headers.append(plan.name.clone(), header_value);
            }
        }

        if let Some(validator) = &self.validator {
            validator
                .validate_data(ParamLocation::Header, &declared)
                .map_err(HttpError::for_bad_response)?;
        }
        Ok(headers)
    }

    fn serialize_body(&self, value: &mut Value) -> Result<Bytes, HttpError> {
        let body = match self.map.body_mode() {
            BodyMode::None => Value::Null,
            BodyMode::Entire => value.take(),
            BodyMode::Whole(property) => value
                .as_object_mut()
                .and_then(|members| members.remove(property))
                .unwrap_or(Value::Null),
            BodyMode::Properties => {
                let members = value.as_object_mut().map(std::mem::take);
                let body: Map<String, Value> = members
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|(property, _)| {
                        self.map.entry_for_property(property).is_some_and(
                            |entry| entry.location == ParamLocation::Body,
                        )
                    })
                    .collect();
                Value::Object(body)
            }
        };

        // A plain string for a non-JSON content type is the body itself.
        if self.content_type != CONTENT_TYPE_JSON {
            if let Value::String(text) = body {
                return Ok(Bytes::from(text));
            }
        }
        serde_json::to_vec(&body).map(Bytes::from).map_err(|error| {
            HttpError::for_internal_error(format!(
                "failed to serialize body of {}: {}",
                self.map.type_name(),
                error
            ))
        })
    }

    fn validate_body(&self, bytes: &[u8]) -> Result<(), HttpError> {
        if self.content_type != CONTENT_TYPE_JSON {
            return Ok(());
        }
        match &self.validator {
            Some(validator) => validator
                .validate_json_body(bytes)
                .map_err(HttpError::for_bad_response),
            None => Ok(()),
        }
    }
}

fn quoted_etag(etag: &str) -> String {
    if etag.starts_with('"') || etag.starts_with("W/\"") {
        etag.to_string()
    } else {
        format!("\"{}\"", etag)
    }
}

/// Status and headers of a streamed response, plus the receiving end of its
/// body.
#[derive(Debug)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
    chunks: mpsc::Receiver<Bytes>,
}

impl ResponseHead {
    /// Turns the head into a response whose body is whatever the writer
    /// sends from now on.
    pub fn into_response(self, request_id: &str) -> http::Response<Body> {
        let mut response =
            http::Response::new(Body::from_stream(ChunkStream(self.chunks)));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        if let Ok(request_id) = HeaderValue::from_str(request_id) {
            response.headers_mut().insert(HEADER_REQUEST_ID, request_id);
        }
        response
    }
}

/// Resolves once a [`ResponseWriter`] sends its response head.
#[derive(Debug)]
pub struct PendingResponse {
    pub(crate) head: oneshot::Receiver<ResponseHead>,
}

impl PendingResponse {
    /// Waits for the head.  Returns `None` if the writer went away without
    /// sending one, which can't happen unless its task panicked.
    pub async fn head(self) -> Option<ResponseHead> {
        self.head.await.ok()
    }
}

struct ChunkStream(mpsc::Receiver<Bytes>);

impl futures::Stream for ChunkStream {
    type Item = Result<Bytes, BoxError>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        self.0.poll_recv(cx).map(|chunk| chunk.map(Ok))
    }
}

/// Writes a response body as it's produced.
///
/// The status and headers can be changed until the first chunk is written.
/// Dropping the writer ends the body.
#[derive(Debug)]
pub struct ResponseWriter {
    status: StatusCode,
    headers: HeaderMap,
    head: Option<oneshot::Sender<ResponseHead>>,
    chunks: Option<mpsc::Sender<Bytes>>,
}

impl ResponseWriter {
    pub fn new(status: StatusCode) -> (ResponseWriter, PendingResponse) {
        let (tx, rx) = oneshot::channel();
        let writer = ResponseWriter {
            status,
            headers: HeaderMap::new(),
            head: Some(tx),
            chunks: None,
        };
        (writer, PendingResponse { head: rx })
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Has no effect once the head has been sent.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Has no effect once the head has been sent.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn head_sent(&self) -> bool {
        self.head.is_none()
    }

    /// Sends one chunk of the body, sending the head first if needed.
    pub async fn write(
        &mut self,
        chunk: impl Into<Bytes>,
    ) -> Result<(), HttpError> {
        self.send_head();
        let sender = self.chunks.as_ref().ok_or_else(|| {
            HttpError::for_internal_error("response body closed".to_string())
        })?;
        sender.send(chunk.into()).await.map_err(|_| {
            HttpError::for_internal_error(
                "client went away while streaming the response".to_string(),
            )
        })
    }

    fn send_head(&mut self) {
        if let Some(head) = self.head.take() {
            let (tx, rx) = mpsc::channel(16);
            self.chunks = Some(tx);
            // The receiver is gone only if the request was abandoned.
            let _ = head.send(ResponseHead {
                status: self.status,
                headers: std::mem::take(&mut self.headers),
                chunks: rx,
            });
        }
    }
}

impl Drop for ResponseWriter {
    fn drop(&mut self) {
        self.send_head();
    }
}
