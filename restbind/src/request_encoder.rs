// Copyright 2025 Oxide Computer Company

//! Request encoding, the client-side mirror of decoding
//!
//! A [`RequestEncoder`] writes a typed input back onto the wire using the
//! same [`FieldLocationMap`] the decoder reads it with, so a value encoded
//! here decodes to the same value on the other side.
//!
//! Arrays follow the field's [`ArrayStyle`].  Repeated arrays send one key
//! per item, so any item survives but an empty array is indistinguishable
//! from an absent one.  Delimited arrays send a single comma-joined value,
//! so `[]` travels as an empty value, and items that contain a comma (or a
//! lone empty item) are refused rather than sent ambiguously.

use crate::body::Body;
use crate::coerce::to_wire_string;
use crate::coerce::ArrayStyle;
use crate::decoder::Input;
use crate::field_map::BodyMode;
use crate::field_map::FieldEntry;
use crate::field_map::FieldLocationMap;
use crate::http_util::CONTENT_TYPE_JSON;
use crate::http_util::CONTENT_TYPE_URL_ENCODED;
use crate::location::ParamLocation;
use http::HeaderValue;
use http::Method;
use percent_encoding::utf8_percent_encode;
use percent_encoding::AsciiSet;
use percent_encoding::NON_ALPHANUMERIC;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use std::sync::Arc;

/// Characters escaped in a path segment.
const PATH_SEGMENT: &AsciiSet =
    &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// Characters escaped in a cookie value.
const COOKIE_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/')
    .remove(b':');

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("failed to serialize input: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("input of type {0} did not serialize to an object")]
    NotAnObject(String),
    #[error("path variable \"{0}\" has no value")]
    MissingPathValue(String),
    #[error("value of header \"{0}\" can't be sent")]
    InvalidHeader(String),
    #[error(
        "{name} can't carry {item:?} in a comma-delimited list; \
         bind it as repeated keys instead"
    )]
    AmbiguousItem { name: String, item: String },
    #[error("uploaded files can't be encoded")]
    Files,
    #[error(transparent)]
    Http(#[from] http::Error),
}

/// Writes typed inputs as HTTP requests.
#[derive(Debug)]
pub struct RequestEncoder {
    map: Arc<FieldLocationMap>,
}

impl RequestEncoder {
    pub fn new(map: Arc<FieldLocationMap>) -> RequestEncoder {
        RequestEncoder { map }
    }

    pub fn for_input<I: Input>(method: &Method) -> RequestEncoder {
        RequestEncoder::new(FieldLocationMap::for_input::<I>(
            method,
            I::bindings,
        ))
    }

    /// Builds a request for `input`.  `path_template` is the route's path,
    /// with `{name}` for each path variable.
    pub fn encode<I: Serialize>(
        &self,
        method: Method,
        path_template: &str,
        input: &I,
    ) -> Result<http::Request<Body>, EncodeError> {
        let mut members = match serde_json::to_value(input)? {
            Value::Object(members) => members,
            _ => {
                return Err(EncodeError::NotAnObject(
                    self.map.type_name().to_string(),
                ))
            }
        };

        let mut path = path_template.to_string();
        let mut query = form_urlencoded::Serializer::new(String::new());
        let mut form = form_urlencoded::Serializer::new(String::new());
        let mut cookies = Vec::new();
        let mut headers = http::HeaderMap::new();
        let mut has_form = false;

        for entry in self.map.entries() {
            if entry.location == ParamLocation::Body {
                continue;
            }
            let value = match members.remove(&entry.property) {
                Some(Value::Null) | None => {
                    if entry.location == ParamLocation::Path {
                        return Err(EncodeError::MissingPathValue(
                            entry.wire_name.clone(),
                        ));
                    }
                    continue;
                }
                Some(value) => value,
            };
            match entry.location {
                // Path and cookie arrays are always delimited, so these
                // join a single text.
                ParamLocation::Path => {
                    let text = wire_texts(entry, &value)?.join(",");
                    let encoded =
                        utf8_percent_encode(&text, PATH_SEGMENT).to_string();
                    let variable = format!("{{{}}}", entry.wire_name);
                    path = path.replace(&variable, &encoded);
                }
                ParamLocation::Query => {
                    for text in wire_texts(entry, &value)? {
                        query.append_pair(&entry.wire_name, &text);
                    }
                }
                ParamLocation::FormData => {
                    has_form = true;
                    for text in wire_texts(entry, &value)? {
                        form.append_pair(&entry.wire_name, &text);
                    }
                }
                ParamLocation::Header => {
                    for text in wire_texts(entry, &value)? {
                        let header_value =
                            HeaderValue::from_str(&text).map_err(|_| {
                                EncodeError::InvalidHeader(
                                    entry.wire_name.clone(),
                                )
                            })?;
                        let name = http::HeaderName::from_bytes(
                            entry.wire_name.as_bytes(),
                        )
                        .map_err(|_| {
                            EncodeError::InvalidHeader(entry.wire_name.clone())
                        })?;
                        headers.append(name, header_value);
                    }
                }
                ParamLocation::Cookie => {
                    let text = wire_texts(entry, &value)?.join(",");
                    cookies.push(format!(
                        "{}={}",
                        entry.wire_name,
                        utf8_percent_encode(&text, COOKIE_VALUE)
                    ));
                }
                ParamLocation::File => return Err(EncodeError::Files),
                ParamLocation::Body => {}
            }
        }

        let query = query.finish();
        let uri = if query.is_empty() {
            path
        } else {
            format!("{}?{}", path, query)
        };
        let mut builder = http::Request::builder().method(method).uri(uri);
        if let Some(request_headers) = builder.headers_mut() {
            request_headers.extend(headers);
            if !cookies.is_empty() {
                let cookie = HeaderValue::from_str(&cookies.join("; "))
                    .map_err(|_| {
                        EncodeError::InvalidHeader("Cookie".to_string())
                    })?;
                request_headers.insert(http::header::COOKIE, cookie);
            }
        }

        let body = if has_form {
            builder = builder
                .header(http::header::CONTENT_TYPE, CONTENT_TYPE_URL_ENCODED);
            Body::from(form.finish())
        } else {
            match self.json_body(members) {
                Some(json) => {
                    builder = builder
                        .header(http::header::CONTENT_TYPE, CONTENT_TYPE_JSON);
                    Body::from(serde_json::to_vec(&json)?)
                }
                None => Body::empty(),
            }
        };
        Ok(builder.body(body)?)
    }

    fn json_body(&self, mut members: Map<String, Value>) -> Option<Value> {
        match self.map.body_mode() {
            BodyMode::None | BodyMode::Entire => None,
            BodyMode::Whole(property) => members.remove(property),
            BodyMode::Properties => {
                let body: Map<String, Value> = members
                    .into_iter()
                    .filter(|(name, _)| {
                        self.map
                            .entry_for_property(name)
                            .map_or(true, |e| e.location == ParamLocation::Body)
                    })
                    .collect();
                Some(Value::Object(body))
            }
        }
    }
}

/// The texts sent for one field: one per item for a repeated array,
/// otherwise exactly one.  A JSON parameter travels as its JSON text.
fn wire_texts(
    entry: &FieldEntry,
    value: &Value,
) -> Result<Vec<String>, EncodeError> {
    if entry.json_param {
        return Ok(vec![value.to_string()]);
    }
    let items = match value {
        Value::Array(items) => items,
        _ => return Ok(vec![to_wire_string(value).unwrap_or_default()]),
    };
    let texts: Vec<String> = items.iter().filter_map(to_wire_string).collect();
    match entry.array_style {
        ArrayStyle::Repeated => Ok(texts),
        ArrayStyle::Delimited => {
            let ambiguous = match texts.as_slice() {
                [only] if only.is_empty() => Some(only),
                _ => texts.iter().find(|text| text.contains(',')),
            };
            if let Some(item) = ambiguous {
                return Err(EncodeError::AmbiguousItem {
                    name: entry.key(),
                    item: item.clone(),
                });
            }
            Ok(vec![texts.join(",")])
        }
    }
}
