//! Transport-agnostic response assembly.
//!
//! The engine produces a status code, a header list and a JSON body; the
//! hosting layer serializes them onto whatever transport it runs. Default
//! headers cover CORS, crawler exclusion and content-type hygiene and are
//! applied to every response, success or error.

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::logfile::RequestLog;
use http::Method;
use serde_json::Value;

const ALLOW_HEADERS: &str = "Authorization, Content-Type, Accept, Origin, X-Api-Key";
const PREFLIGHT_MAX_AGE: &str = "60";

/// Finished response, ready for the transport layer.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl ApiResponse {
    /// Success response with status 200.
    pub fn ok(body: Value) -> Self {
        Self::with_status(200, body)
    }

    pub fn with_status(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body,
        }
    }

    /// Error response; the payload carries `{code, message, data?}`.
    pub fn from_error(err: &ApiError, include_trace: bool) -> Self {
        Self::with_status(err.status(), err.to_payload(include_trace))
    }

    /// Apply the default header set for the given request method.
    ///
    /// Preflight responses advertise the allowed methods and a short cache
    /// lifetime; everything else additionally opts out of indexing and
    /// content sniffing.
    pub fn apply_default_headers(&mut self, config: &ApiConfig, method: &Method) {
        self.push_header("Access-Control-Allow-Origin", &config.cors_origin);
        self.push_header("Access-Control-Allow-Credentials", "true");
        self.push_header("Access-Control-Allow-Headers", ALLOW_HEADERS);
        self.push_header("Access-Control-Allow-Methods", &config.cors_methods);
        self.push_header("Content-Type", "application/json; charset=utf-8");
        if method == Method::OPTIONS {
            self.push_header("Access-Control-Max-Age", PREFLIGHT_MAX_AGE);
        } else {
            self.push_header("X-Robots-Tag", "noindex");
            self.push_header("X-Content-Type-Options", "nosniff");
            self.push_header("Cache-Control", "no-store");
        }
    }

    /// Attach the formatted request log to the payload. Debug only.
    pub fn append_log(&mut self, log: &RequestLog) {
        if let Some(map) = self.body.as_object_mut() {
            map.insert("log".to_string(), log.to_value());
        }
    }

    fn push_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
