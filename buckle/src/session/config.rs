//! Session and CSRF configuration types.

use serde::{Deserialize, Serialize};

/// Session cookie configuration.
///
/// # Example
///
/// ```toml
/// [session]
/// cookie_name = "_session"
/// expiry_secs = 31536000
/// secure = true
/// same_site = "lax"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session cookie name.
    ///
    /// Default: `"_session"`
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Session expiry in seconds.
    ///
    /// - `0`: session cookie (expires when the browser closes)
    /// - `> 0`: persistent cookie with the given lifetime
    ///
    /// Default: one year. Some browsers don't apply sensible defaults
    /// to cookies without an expiry, so the framework always sets one.
    #[serde(default = "default_expiry_secs")]
    pub expiry_secs: u64,

    /// Cookie path.
    ///
    /// Default: `"/"`
    #[serde(default = "default_cookie_path")]
    pub cookie_path: String,

    /// Cookie domain. Defaults to the request's domain when unset.
    #[serde(default)]
    pub cookie_domain: Option<String>,

    /// Secure cookie flag (HTTPS only). Set to `false` for local
    /// development without HTTPS.
    ///
    /// Default: `true`
    #[serde(default = "default_secure")]
    pub secure: bool,

    /// HttpOnly cookie flag.
    ///
    /// Default: `true`
    #[serde(default = "default_http_only")]
    pub http_only: bool,

    /// SameSite cookie policy: `"strict"`, `"lax"`, or `"none"`.
    ///
    /// Default: `"lax"`
    #[serde(default = "default_same_site")]
    pub same_site: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            expiry_secs: default_expiry_secs(),
            cookie_path: default_cookie_path(),
            cookie_domain: None,
            secure: default_secure(),
            http_only: default_http_only(),
            same_site: default_same_site(),
        }
    }
}

/// CSRF protection configuration.
///
/// # Example
///
/// ```toml
/// [csrf]
/// enabled = true
/// token_length = 32
/// header_name = "X-CSRF-Token"
/// form_field_name = "_csrf"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrfConfig {
    /// Enable CSRF protection. When enabled, non-safe HTTP methods
    /// require a valid token.
    ///
    /// Default: `true`
    #[serde(default = "default_csrf_enabled")]
    pub enabled: bool,

    /// CSRF token length in characters.
    ///
    /// Default: `32`
    #[serde(default = "default_token_length")]
    pub token_length: usize,

    /// HTTP header checked for the token.
    ///
    /// Default: `"X-CSRF-Token"`
    #[serde(default = "default_header_name")]
    pub header_name: String,

    /// Form field checked for the token when the header is absent.
    ///
    /// Default: `"_csrf"`
    #[serde(default = "default_form_field_name")]
    pub form_field_name: String,

    /// Methods that skip validation.
    ///
    /// Default: `["GET", "HEAD", "OPTIONS", "TRACE"]`
    #[serde(default = "default_safe_methods")]
    pub safe_methods: Vec<String>,

    /// Largest form body inspected for the token field, in bytes.
    ///
    /// Default: 2 MiB
    #[serde(default = "default_max_form_bytes")]
    pub max_form_bytes: usize,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            enabled: default_csrf_enabled(),
            token_length: default_token_length(),
            header_name: default_header_name(),
            form_field_name: default_form_field_name(),
            safe_methods: default_safe_methods(),
            max_form_bytes: default_max_form_bytes(),
        }
    }
}

// Default value functions
fn default_cookie_name() -> String {
    "_session".to_string()
}

fn default_expiry_secs() -> u64 {
    86400 * 365
}

fn default_cookie_path() -> String {
    "/".to_string()
}

fn default_secure() -> bool {
    true
}

fn default_http_only() -> bool {
    true
}

fn default_same_site() -> String {
    "lax".to_string()
}

fn default_csrf_enabled() -> bool {
    true
}

fn default_token_length() -> usize {
    32
}

fn default_header_name() -> String {
    "X-CSRF-Token".to_string()
}

fn default_form_field_name() -> String {
    "_csrf".to_string()
}

fn default_safe_methods() -> Vec<String> {
    vec![
        "GET".to_string(),
        "HEAD".to_string(),
        "OPTIONS".to_string(),
        "TRACE".to_string(),
    ]
}

fn default_max_form_bytes() -> usize {
    2 * 1024 * 1024
}
