// Copyright 2025 Oxide Computer Company

//! Wire locations for bound fields

use serde::Deserialize;
use serde::Serialize;
use std::fmt;

/// Where on the wire a bound field lives.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(rename_all = "camelCase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Cookie,
    FormData,
    File,
    Body,
}

impl ParamLocation {
    pub const ALL: [ParamLocation; 7] = [
        ParamLocation::Path,
        ParamLocation::Query,
        ParamLocation::Header,
        ParamLocation::Cookie,
        ParamLocation::FormData,
        ParamLocation::File,
        ParamLocation::Body,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamLocation::Path => "path",
            ParamLocation::Query => "query",
            ParamLocation::Header => "header",
            ParamLocation::Cookie => "cookie",
            ParamLocation::FormData => "formData",
            ParamLocation::File => "file",
            ParamLocation::Body => "body",
        }
    }

    /// Locations whose values arrive as strings and are coerced according to
    /// the field's schema before validation.
    pub fn is_parameter(&self) -> bool {
        matches!(
            self,
            ParamLocation::Path
                | ParamLocation::Query
                | ParamLocation::Header
                | ParamLocation::Cookie
                | ParamLocation::FormData
        )
    }

    /// Returns the key used for this location and `name` in a validation
    /// error report, e.g. `header:X-Input`.
    pub fn key(&self, name: &str) -> String {
        format!("{}:{}", self.as_str(), name)
    }
}

impl fmt::Display for ParamLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonicalizes a header name: the first letter and any letter following a
/// hyphen are upper case, the rest lower case (`x-request-ID` becomes
/// `X-Request-Id`).  Names containing characters other than ASCII letters,
/// digits and hyphens are returned unchanged.
pub fn canonical_header_name(name: &str) -> String {
    if !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
        return name.to_string();
    }

    let mut upper = true;
    name.chars()
        .map(|c| {
            let out = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            out
        })
        .collect()
}
