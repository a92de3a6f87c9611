// Copyright 2025 Oxide Computer Company

//! Per-field location metadata
//!
//! A [`Bindings`] value is the declarative table that says, for each property
//! of a typed input or output, where on the wire that property lives and
//! under which name.  Property names are the names serde uses for the type
//! (after any `#[serde(rename)]`), so a binding always refers to the same key
//! that appears in the type's JSON schema.
//!
//! ```
//! use restbind::Bindings;
//! use restbind::ParamLocation;
//!
//! let bindings = Bindings::new()
//!     .path("id")
//!     .query("in_query")
//!     .header_as("x_header", "X-Header")
//!     .query("filter")
//!     .json_param("filter")
//!     .forbid_unknown(ParamLocation::Query);
//! assert_eq!(bindings.fields().len(), 4);
//! ```
//!
//! Properties without a binding belong to the JSON request or response body.

use crate::coerce::ArrayStyle;
use crate::location::ParamLocation;
use serde_json::Value;
use std::collections::BTreeSet;

/// One explicit property binding.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldBinding {
    pub property: String,
    pub location: ParamLocation,
    /// Wire name override.  When absent the property name is used.
    pub wire_name: Option<String>,
    /// The raw parameter value is itself a JSON document.
    pub json_param: bool,
    /// Set only by [`Bindings::delimited`].  Otherwise the location decides.
    pub array_style: Option<ArrayStyle>,
}

#[derive(Clone, Debug, Default)]
pub struct Bindings {
    fields: Vec<FieldBinding>,
    defaults: Vec<(String, Value)>,
    whole_body: Option<String>,
    forbid_unknown: BTreeSet<ParamLocation>,
}

macro_rules! location_binders {
    ($($name:ident, $name_as:ident => $loc:expr;)*) => {
        $(
            pub fn $name(self, property: &str) -> Self {
                self.bind(property, $loc, None)
            }

            pub fn $name_as(self, property: &str, wire_name: &str) -> Self {
                self.bind(property, $loc, Some(wire_name))
            }
        )*
    };
}

impl Bindings {
    pub fn new() -> Self {
        Bindings::default()
    }

    location_binders! {
        path, path_as => ParamLocation::Path;
        query, query_as => ParamLocation::Query;
        header, header_as => ParamLocation::Header;
        cookie, cookie_as => ParamLocation::Cookie;
        form, form_as => ParamLocation::FormData;
        file, file_as => ParamLocation::File;
    }

    /// Binds `property` to the JSON body explicitly.  This is what happens to
    /// unbound properties anyway, except for methods without a conventional
    /// body, where an explicit body binding keeps the property in the body.
    pub fn body(self, property: &str) -> Self {
        self.bind(property, ParamLocation::Body, None)
    }

    fn bind(
        mut self,
        property: &str,
        location: ParamLocation,
        wire_name: Option<&str>,
    ) -> Self {
        self.fields.push(FieldBinding {
            property: property.to_string(),
            location,
            wire_name: wire_name.map(str::to_string),
            json_param: false,
            array_style: None,
        });
        self
    }

    fn last_binding_mut(
        &mut self,
        property: &str,
    ) -> Option<&mut FieldBinding> {
        self.fields.iter_mut().rev().find(|f| f.property == property)
    }

    /// Marks the already-bound parameter `property` as carrying a JSON
    /// document rather than a scalar.
    ///
    /// # Panics
    ///
    /// If `property` has not been bound yet.
    pub fn json_param(mut self, property: &str) -> Self {
        match self.last_binding_mut(property) {
            Some(field) => field.json_param = true,
            None => panic!(
                "json_param(\"{}\") must follow a binding for that property",
                property
            ),
        }
        self
    }

    /// Sends the already-bound array parameter `property` as one
    /// comma-separated value instead of one key per item.  Path and cookie
    /// parameters are always sent this way.
    ///
    /// # Panics
    ///
    /// If `property` has not been bound yet.
    pub fn delimited(mut self, property: &str) -> Self {
        match self.last_binding_mut(property) {
            Some(field) => field.array_style = Some(ArrayStyle::Delimited),
            None => panic!(
                "delimited(\"{}\") must follow a binding for that property",
                property
            ),
        }
        self
    }

    /// Declares a default value injected when `property` is missing from the
    /// request.  This takes precedence over a default in the type's schema.
    pub fn default_value(mut self, property: &str, value: Value) -> Self {
        self.defaults.push((property.to_string(), value));
        self
    }

    /// Treats `property` as the entire JSON body, regardless of HTTP method.
    pub fn whole_body(mut self, property: &str) -> Self {
        self.whole_body = Some(property.to_string());
        self
    }

    /// Rejects wire keys at `location` that match no bound field.
    pub fn forbid_unknown(mut self, location: ParamLocation) -> Self {
        self.forbid_unknown.insert(location);
        self
    }

    pub fn fields(&self) -> &[FieldBinding] {
        &self.fields
    }

    pub fn defaults(&self) -> &[(String, Value)] {
        &self.defaults
    }

    pub fn whole_body_property(&self) -> Option<&str> {
        self.whole_body.as_deref()
    }

    pub fn forbidden_unknown(&self) -> &BTreeSet<ParamLocation> {
        &self.forbid_unknown
    }
}
