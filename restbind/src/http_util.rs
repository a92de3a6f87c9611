// Copyright 2025 Oxide Computer Company

//! General-purpose HTTP-related facilities

use crate::error::HttpError;
use http::HeaderMap;

/// header name for conveying request ids ("x-request-id")
pub const HEADER_REQUEST_ID: &str = "x-request-id";
/// MIME type for JSON data
pub const CONTENT_TYPE_JSON: &str = "application/json";
/// MIME type for raw bytes
pub const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";
/// MIME type for form/urlencoded data
pub const CONTENT_TYPE_URL_ENCODED: &str = "application/x-www-form-urlencoded";
/// MIME type for multipart/form-data
pub const CONTENT_TYPE_MULTIPART_FORM_DATA: &str = "multipart/form-data";

/// Returns the lower-cased media type of the request's content, without
/// parameters, or `None` when there's no `Content-Type` header.
///
/// RFC 7231 §3.1.1.1: media types are case insensitive and may be followed
/// by whitespace and/or a parameter (e.g., charset), which we ignore here.
pub fn media_type(headers: &HeaderMap) -> Result<Option<String>, HttpError> {
    let content_type = match headers.get(http::header::CONTENT_TYPE) {
        Some(value) => value.to_str().map_err(|e| {
            HttpError::for_bad_request(format!("invalid content type: {}", e))
        })?,
        None => return Ok(None),
    };
    let end = content_type.find(';').unwrap_or(content_type.len());
    Ok(Some(content_type[..end].trim().to_lowercase()))
}
