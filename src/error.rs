//! Error taxonomy for the request pipeline.
//!
//! Every failure the engine can produce maps to a stable machine-readable
//! code, an HTTP status and a JSON payload of the shape
//! `{code, message, data?}`. Validation failures are aggregates: the caller
//! receives the complete list of problems in one response, not just the
//! first one.

use crate::dependency::InvalidDependencyRecord;
use crate::request::InvalidParameterRecord;
use serde_json::{json, Value};
use thiserror::Error;

/// Distinct bearer-token verification failures.
///
/// Each kind is surfaced to the caller under its own error code so API
/// clients can tell an expired token apart from a tampered one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenErrorKind {
    /// Token `nbf`/`iat` lies in the future.
    BeforeValid,
    /// Token `exp` has passed.
    Expired,
    /// Signature does not verify against the configured secret.
    BadSignature,
    /// Payload could not be decoded (base64/UTF-8/JSON).
    Unreadable,
    /// Token does not have the expected structure.
    Malformed,
    /// Any other verification failure.
    Other,
}

impl TokenErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            TokenErrorKind::BeforeValid => "jwt_before_valid",
            TokenErrorKind::Expired => "jwt_expired",
            TokenErrorKind::BadSignature => "jwt_invalid",
            TokenErrorKind::Unreadable => "jwt_unreadable",
            TokenErrorKind::Malformed => "jwt_malformed",
            TokenErrorKind::Other => "jwt_error",
        }
    }
}

/// Engine-level error. See module docs for the payload contract.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No route was found matching the URL and request method.")]
    RouteNotFound,

    #[error("You do not have the required permissions to access this endpoint.")]
    AccessDenied,

    /// Bearer token verification failed; the kind selects the error code.
    #[error("{message}")]
    Token {
        kind: TokenErrorKind,
        message: String,
    },

    /// Aggregate of all per-field validation failures of one request.
    #[error("One or more parameters are missing or invalid.")]
    InvalidParameter(Vec<InvalidParameterRecord>),

    /// Aggregate of all inter-parameter dependency failures of one request.
    #[error("Please check the following inter-parameter dependencies.")]
    InvalidDependency(Vec<InvalidDependencyRecord>),

    /// The matched endpoint names a handler that is not registered.
    #[error("The handler `{0}` could not be resolved.")]
    ControllerMisconfigured(String),

    #[error("Failed to create a unique user token.")]
    UserToken,

    /// Fatal configuration or data-store condition in the access gate.
    #[error("{0}")]
    Credential(String),

    /// Error raised by an application handler, e.g. `invalid_login`.
    #[error("{message}")]
    Endpoint {
        code: String,
        status: u16,
        message: String,
        data: Option<Value>,
    },

    /// Unexpected fault caught at the dispatch boundary.
    #[error("An unexpected internal error occurred.")]
    Internal { detail: String },
}

impl ApiError {
    /// Handler error with the default error status.
    pub fn endpoint(code: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Endpoint {
            code: code.into(),
            status: 403,
            message: message.into(),
            data: None,
        }
    }

    /// Handler error with an explicit status code.
    pub fn endpoint_with_status(
        code: impl Into<String>,
        message: impl Into<String>,
        status: u16,
    ) -> Self {
        ApiError::Endpoint {
            code: code.into(),
            status,
            message: message.into(),
            data: None,
        }
    }

    /// Handler error carrying structured detail data.
    pub fn endpoint_with_data(
        code: impl Into<String>,
        message: impl Into<String>,
        status: u16,
        data: Value,
    ) -> Self {
        ApiError::Endpoint {
            code: code.into(),
            status,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &str {
        match self {
            ApiError::RouteNotFound => "route_not_found",
            ApiError::AccessDenied => "access_denied",
            ApiError::Token { kind, .. } => kind.code(),
            ApiError::InvalidParameter(_) => "invalid_parameter",
            ApiError::InvalidDependency(_) => "invalid_parameter_dependency",
            ApiError::ControllerMisconfigured(_) => "controller_misconfigured",
            ApiError::UserToken => "user_token_error",
            ApiError::Credential(_) => "credential_error",
            ApiError::Endpoint { code, .. } => code,
            ApiError::Internal { .. } => "internal_error",
        }
    }

    /// Transport status code for this error.
    pub fn status(&self) -> u16 {
        match self {
            ApiError::RouteNotFound => 404,
            ApiError::AccessDenied | ApiError::Token { .. } => 401,
            ApiError::InvalidParameter(_) | ApiError::InvalidDependency(_) => 400,
            ApiError::ControllerMisconfigured(_)
            | ApiError::Credential(_)
            | ApiError::Internal { .. } => 500,
            ApiError::UserToken => 403,
            ApiError::Endpoint { status, .. } => *status,
        }
    }

    /// Build the `{code, message, data?}` error payload.
    ///
    /// Internal fault detail is only included when `include_trace` is set,
    /// i.e. in non-production configuration.
    pub fn to_payload(&self, include_trace: bool) -> Value {
        let mut payload = json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        let data = match self {
            ApiError::InvalidParameter(records) => {
                Some(serde_json::to_value(records).unwrap_or(Value::Null))
            }
            ApiError::InvalidDependency(records) => {
                Some(serde_json::to_value(records).unwrap_or(Value::Null))
            }
            ApiError::Endpoint { data, .. } => data.clone(),
            ApiError::Internal { detail } if include_trace => {
                Some(json!({ "detail": detail }))
            }
            _ => None,
        };
        if let Some(data) = data {
            if let Some(map) = payload.as_object_mut() {
                map.insert("data".to_string(), data);
            }
        }
        payload
    }
}
