//! Static configuration map.
//!
//! Process bootstrap and config-file loading are the hosting environment's
//! concern; the engine consumes a fully populated [`ApiConfig`]. The struct
//! derives `Deserialize` so hosts can hydrate it from whatever format they
//! load (JSON, YAML, environment layering).

use serde::Deserialize;
use std::collections::HashMap;

/// Capability grant of one role: either the wildcard `*` or an explicit list.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Capabilities {
    /// A single string; only `*` is meaningful here and grants everything.
    Wildcard(String),
    /// Explicit capability list.
    List(Vec<String>),
}

/// Password policy thresholds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PasswordPolicy {
    /// Salt prepended to the password before hashing.
    pub salt: String,
    /// App route for the recovery link; `:token` is the placeholder.
    pub reset_route: String,
    /// Minimum total length.
    pub length: usize,
    /// Whether previously used passwords may be set again.
    pub reuse: bool,
    /// Minimum number of uppercase letters.
    pub uppercase: usize,
    /// Minimum number of lowercase letters.
    pub lowercase: usize,
    /// Minimum number of digits.
    pub numbers: usize,
    /// Minimum number of special characters.
    pub special: usize,
    /// The characters that count as special.
    pub special_chars: String,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            salt: String::new(),
            reset_route: "/#/password/recovery/:token".to_string(),
            length: 8,
            reuse: false,
            uppercase: 1,
            lowercase: 1,
            numbers: 1,
            special: 1,
            special_chars: "!@#$%^&*<>?".to_string(),
        }
    }
}

/// Full engine configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Name of the API, used in schema listings.
    pub name: String,
    /// Short description, used in schema listings.
    pub description: String,
    /// Domain of the API including protocol; also the JWT issuer claim.
    pub domain: String,
    /// Fixed root prefix all route paths are resolved against.
    pub root: String,
    /// Privileged bootstrap account. Empty username disables it.
    pub admin_username: String,
    pub admin_password: String,
    pub password: PasswordPolicy,
    /// Secret used to sign bearer tokens. Must be configured; an empty
    /// secret fails every token operation.
    pub jwt_secret: String,
    /// Relative bearer/user-token lifetime, e.g. `+1 day`.
    pub jwt_lifetime: String,
    /// `Access-Control-Allow-Origin` value.
    pub cors_origin: String,
    /// `Access-Control-Allow-Methods` value.
    pub cors_methods: String,
    /// Role name → capability grant. The `admin` role needs no entry.
    pub roles: HashMap<String, Capabilities>,
    /// Prefix for all data-store table names.
    pub table_prefix: String,
    /// Append the per-request log to response payloads. Keep off in
    /// production.
    pub debug_response_log: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            name: "Rest API".to_string(),
            description: String::new(),
            domain: "https://localhost".to_string(),
            root: "rest-api".to_string(),
            admin_username: String::new(),
            admin_password: String::new(),
            password: PasswordPolicy::default(),
            jwt_secret: String::new(),
            jwt_lifetime: "+1 day".to_string(),
            cors_origin: "*".to_string(),
            cors_methods: "GET, POST, PUT, PATCH, DELETE, OPTIONS".to_string(),
            roles: HashMap::new(),
            table_prefix: "rest_api_".to_string(),
            debug_response_log: false,
        }
    }
}
