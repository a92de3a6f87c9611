// Copyright 2025 Oxide Computer Company

//! Configuration for request and response binding

use serde::Deserialize;
use serde::Serialize;

/// Configuration for how operations bind requests and responses.
///
/// This type implements [`serde::Deserialize`] and [`serde::Serialize`] and it
/// can be composed with the consumer's configuration (whatever format that's
/// in).  For example:
///
/// ```
/// use restbind::ConfigBinding;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct MyAppConfig {
///     binding: ConfigBinding,
///     /* ... (other app-specific config) */
/// }
///
/// fn main() -> Result<(), String> {
///     let my_config: MyAppConfig = toml::from_str(
///         r##"
///             [binding]
///             request_body_max_bytes = 4096
///             validate_responses = true
///
///             ## ... (other app-specific config)
///         "##
///     ).map_err(|error| format!("parsing config: {}", error))?;
///
///     let config: &ConfigBinding = &my_config.binding;
///     assert!(config.apply_defaults);
///     Ok(())
/// }
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct ConfigBinding {
    /// maximum allowed size of a request body, defaults to 1 MiB
    pub request_body_max_bytes: usize,
    /// fill absent optional fields with their declared defaults
    pub apply_defaults: bool,
    /// validate decoded requests against their schemas
    pub validate_requests: bool,
    /// validate responses against their schemas before emitting them
    pub validate_responses: bool,
    /// treat unknown query keys as violations for every input type, not just
    /// those that deny unknown fields
    pub forbid_unknown_query: bool,
}

impl Default for ConfigBinding {
    fn default() -> Self {
        ConfigBinding {
            request_body_max_bytes: 1024 * 1024,
            apply_defaults: true,
            validate_requests: true,
            validate_responses: false,
            forbid_unknown_query: false,
        }
    }
}
