// Copyright 2025 Oxide Computer Company

//! The raw request abstraction consumed by the decoder
//!
//! A [`RawRequest`] holds everything the decoder can read values from, already
//! split by location: path parameters (as resolved by whatever routed the
//! request), query parameters, headers, cookies, form fields, uploaded files
//! and the buffered body with its media type.  Repeated keys are kept.
//!
//! A header or cookie value that can't be decoded doesn't fail the request.
//! It's kept aside and only reported if the decoder actually reads that name.

use crate::body::Body;
use crate::coerce::RawValue;
use crate::error::HttpError;
use crate::files::FilePart;
use crate::http_util::media_type;
use crate::http_util::CONTENT_TYPE_MULTIPART_FORM_DATA;
use crate::http_util::CONTENT_TYPE_URL_ENCODED;
use crate::location::canonical_header_name;
use crate::location::ParamLocation;
use bytes::Bytes;
use http::HeaderMap;
use http::Method;
use http::Uri;
use indexmap::IndexMap;
use std::collections::BTreeMap;

/// Failures turning an HTTP request into a [`RawRequest`].
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("value of header \"{name}\" is not valid UTF-8")]
    HeaderEncoding { name: String },
    #[error("value of {location} \"{name}\" is not valid UTF-8")]
    PercentEncoding { location: ParamLocation, name: String },
    #[error("missing boundary in content-type header")]
    MissingBoundary,
    #[error("error reading multipart body: {0}")]
    Multipart(#[from] multer::Error),
}

impl From<RequestError> for HttpError {
    fn from(error: RequestError) -> Self {
        HttpError::for_bad_request(error.to_string())
    }
}

/// Raw wire values of one request.
#[derive(Debug)]
pub struct RawRequest {
    method: Method,
    uri: Uri,
    path_params: BTreeMap<String, String>,
    query: IndexMap<String, RawValue>,
    headers: HeaderMap,
    cookies: IndexMap<String, RawValue>,
    undecodable_cookies: Vec<String>,
    form: IndexMap<String, RawValue>,
    files: IndexMap<String, Vec<FilePart>>,
    body: Bytes,
    media_type: Option<String>,
}

impl RawRequest {
    /// Builds a raw request from an HTTP request, buffering at most
    /// `max_bytes` of body.  `path_params` are the already-decoded values of
    /// the route's path variables.
    ///
    /// URL-encoded and multipart bodies are parsed into form fields and
    /// files; any other body is kept as bytes.
    pub async fn from_request(
        request: http::Request<Body>,
        path_params: BTreeMap<String, String>,
        max_bytes: usize,
    ) -> Result<RawRequest, HttpError> {
        let (parts, body) = request.into_parts();
        let body = body.collect_limited(max_bytes).await?;
        let mut raw = RawRequest::new(parts.method, parts.uri, parts.headers)?;
        raw.path_params = path_params;
        raw.set_body(body).await?;
        Ok(raw)
    }

    /// Builds a raw request with no body.  Query parameters and cookies are
    /// read from `uri` and `headers`.
    pub fn new(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
    ) -> Result<RawRequest, HttpError> {
        let query = parse_pairs(uri.query().unwrap_or("").as_bytes());
        let (cookies, undecodable_cookies) = parse_cookies(&headers);
        let media_type = media_type(&headers)?;
        Ok(RawRequest {
            method,
            uri,
            path_params: BTreeMap::new(),
            query,
            headers,
            cookies,
            undecodable_cookies,
            form: IndexMap::new(),
            files: IndexMap::new(),
            body: Bytes::new(),
            media_type,
        })
    }

    pub fn with_path_params(
        mut self,
        path_params: BTreeMap<String, String>,
    ) -> Self {
        self.path_params = path_params;
        self
    }

    /// Attaches a buffered body, parsing it according to the request's media
    /// type.
    pub async fn set_body(&mut self, body: Bytes) -> Result<(), HttpError> {
        match self.media_type.as_deref() {
            Some(CONTENT_TYPE_URL_ENCODED) => {
                self.form = parse_pairs(&body);
            }
            Some(CONTENT_TYPE_MULTIPART_FORM_DATA) => {
                self.read_multipart(body.clone()).await?;
            }
            _ => {}
        }
        self.body = body;
        Ok(())
    }

    async fn read_multipart(
        &mut self,
        body: Bytes,
    ) -> Result<(), RequestError> {
        let content_type = self
            .headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");
        let boundary = multer::parse_boundary(content_type)
            .map_err(|_| RequestError::MissingBoundary)?;
        let stream = futures::stream::once(async move {
            Ok::<Bytes, std::convert::Infallible>(body)
        });
        let mut multipart = multer::Multipart::new(stream, boundary);

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or("").to_string();
            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    let content_type =
                        field.content_type().map(|mime| mime.to_string());
                    let content = field.bytes().await?;
                    self.files.entry(name).or_default().push(FilePart {
                        filename: Some(filename),
                        content_type,
                        content,
                    });
                }
                None => {
                    let text = field.text().await?;
                    push_value(&mut self.form, name, text);
                }
            }
        }
        Ok(())
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn path_params(&self) -> &BTreeMap<String, String> {
        &self.path_params
    }

    pub fn query(&self) -> &IndexMap<String, RawValue> {
        &self.query
    }

    /// Cookies whose values decoded.  See [`RawRequest::undecodable_cookies`]
    /// for the rest.
    pub fn cookies(&self) -> &IndexMap<String, RawValue> {
        &self.cookies
    }

    /// Names of cookies with a value that isn't percent-encoded UTF-8.
    pub fn undecodable_cookies(&self) -> &[String] {
        &self.undecodable_cookies
    }

    pub fn form(&self) -> &IndexMap<String, RawValue> {
        &self.form
    }

    pub fn files(&self) -> &IndexMap<String, Vec<FilePart>> {
        &self.files
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The lower-cased media type of the body, without parameters.
    pub fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }

    /// Headers by canonical name, with repeated headers collected.  Headers
    /// with a value that isn't UTF-8 are left out.
    pub fn header_values(&self) -> IndexMap<String, RawValue> {
        self.header_results()
            .into_iter()
            .filter_map(|(name, value)| Some((name, value.ok()?)))
            .collect()
    }

    fn header_results(&self) -> Vec<(String, WireValue)> {
        let mut values: IndexMap<String, WireValue> = IndexMap::new();
        for (name, value) in &self.headers {
            let name = canonical_header_name(name.as_str());
            // Header values are bytes.  Anything outside visible ASCII is
            // accepted as long as it's UTF-8.
            let text = match std::str::from_utf8(value.as_bytes()) {
                Ok(text) => text.to_string(),
                Err(_) => {
                    values.insert(
                        name.clone(),
                        Err(RequestError::HeaderEncoding { name }),
                    );
                    continue;
                }
            };
            match values.get_mut(&name) {
                Some(Ok(existing)) => existing.push(text),
                Some(Err(_)) => {}
                None => {
                    values.insert(name, Ok(RawValue::Single(text)));
                }
            }
        }
        values.into_iter().collect()
    }

    /// Raw values at one of the parameter locations, in wire order.  A name
    /// whose value couldn't be read carries the reason instead.
    pub(crate) fn values_at(
        &self,
        location: ParamLocation,
    ) -> Vec<(String, WireValue)> {
        match location {
            ParamLocation::Path => self
                .path_params
                .iter()
                .map(|(name, value)| {
                    (name.clone(), Ok(RawValue::from(value.as_str())))
                })
                .collect(),
            ParamLocation::Query => clone_pairs(&self.query),
            ParamLocation::Header => self.header_results(),
            ParamLocation::Cookie => {
                let mut values = clone_pairs(&self.cookies);
                values.retain(|(name, _)| {
                    !self.undecodable_cookies.contains(name)
                });
                values.extend(self.undecodable_cookies.iter().map(|name| {
                    let error = RequestError::PercentEncoding {
                        location: ParamLocation::Cookie,
                        name: name.clone(),
                    };
                    (name.clone(), Err(error))
                }));
                values
            }
            ParamLocation::FormData => clone_pairs(&self.form),
            ParamLocation::File | ParamLocation::Body => Vec::new(),
        }
    }
}

/// A raw value, or why it couldn't be read off the wire.
pub(crate) type WireValue = Result<RawValue, RequestError>;

fn clone_pairs(values: &IndexMap<String, RawValue>) -> Vec<(String, WireValue)> {
    values.iter().map(|(k, v)| (k.clone(), Ok(v.clone()))).collect()
}

fn push_value(
    values: &mut IndexMap<String, RawValue>,
    name: String,
    value: String,
) {
    match values.get_mut(&name) {
        Some(existing) => existing.push(value),
        None => {
            values.insert(name, RawValue::Single(value));
        }
    }
}

/// Parses `application/x-www-form-urlencoded` pairs, as used by query strings
/// and URL-encoded bodies.
fn parse_pairs(input: &[u8]) -> IndexMap<String, RawValue> {
    let mut values = IndexMap::new();
    for (name, value) in form_urlencoded::parse(input) {
        push_value(&mut values, name.into_owned(), value.into_owned());
    }
    values
}

/// Parses every `Cookie` header.  Values may be quoted and are
/// percent-decoded.  Returns the decoded cookies and the names of those that
/// didn't decode.
fn parse_cookies(
    headers: &HeaderMap,
) -> (IndexMap<String, RawValue>, Vec<String>) {
    let mut cookies = IndexMap::new();
    let mut undecodable = Vec::new();
    for header in headers.get_all(http::header::COOKIE) {
        for pair in header.as_bytes().split(|byte| *byte == b';') {
            let Some(split) = pair.iter().position(|byte| *byte == b'=') else {
                continue;
            };
            let name = String::from_utf8_lossy(&pair[..split]);
            let name = name.trim().to_string();
            let value = pair[split + 1..].trim_ascii();
            let value = value
                .strip_prefix(b"\"")
                .and_then(|v| v.strip_suffix(b"\""))
                .unwrap_or(value);
            match percent_encoding::percent_decode(value).decode_utf8() {
                Ok(decoded) => {
                    push_value(&mut cookies, name, decoded.into_owned())
                }
                Err(_) => {
                    if !undecodable.contains(&name) {
                        undecodable.push(name);
                    }
                }
            }
        }
    }
    (cookies, undecodable)
}
