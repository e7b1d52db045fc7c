//! Request state and the per-parameter validation pipeline.
//!
//! A [`Request`] starts out with the merged raw parameters (path captures,
//! query string, JSON body) and runs each declared parameter through its
//! compiled step list. A step failure records the problem and moves on to
//! the next parameter, so the caller always sees every invalid field at
//! once. Values that survive all steps land in `params` under the sanitized
//! schema name; raw keys nothing declared are logged and dropped.

use crate::dependency::InvalidDependencyRecord;
use crate::error::ApiError;
use crate::logfile::{LogLevel, RequestLog};
use crate::schema::{EndpointDescriptor, ParameterSchema, ValidationStep};
use crate::validation::{
    cast_type, is_falsy, regex_validation, rules::rule_validation, type_validation,
};
use http::Method;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// One parameter failure as reported in the error payload.
#[derive(Debug, Clone, Serialize)]
pub struct InvalidParameterRecord {
    pub key: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub value: Value,
    pub error_code: String,
    pub error_message: String,
}

/// One in-flight API call.
pub struct Request {
    pub method: Method,
    /// Root-relative route path, e.g. `account/login`.
    pub route: String,
    headers: HashMap<String, String>,
    /// Merged raw input, keyed lowercase. Later sources win: path captures,
    /// then query string, then JSON body.
    pub raw_params: HashMap<String, Value>,
    /// Validated values keyed by sanitized schema name.
    pub params: HashMap<String, Value>,
    pub invalid_params: Vec<InvalidParameterRecord>,
    pub invalid_dependencies: Vec<InvalidDependencyRecord>,
    pub log: RequestLog,
}

impl Request {
    pub fn new(
        method: Method,
        route: impl Into<String>,
        headers: HashMap<String, String>,
        raw_params: HashMap<String, Value>,
    ) -> Self {
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        let raw_params = raw_params
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        Self {
            method,
            route: route.into(),
            headers,
            raw_params,
            params: HashMap::new(),
            invalid_params: Vec::new(),
            invalid_dependencies: Vec::new(),
            log: RequestLog::new(),
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// A validated parameter value.
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// A validated string parameter, empty when absent.
    pub fn param_str(&self, name: &str) -> &str {
        self.params
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// `METHOD route` scope string for log entries.
    pub fn log_area(&self) -> String {
        format!("{} {}", self.method, self.route)
    }

    /// Run every declared parameter through its validation steps.
    ///
    /// Returns the aggregate error when anything failed; `self.params`
    /// still holds everything that validated.
    pub fn validate_params(&mut self, endpoint: &EndpointDescriptor) -> Result<(), ApiError> {
        let area = self.log_area();

        for schema in &endpoint.parameters {
            let raw = self.raw_params.get(&schema.name.to_lowercase()).cloned();
            let mut value = match raw {
                Some(v) => v,
                None => {
                    // The compiled default is already type-checked.
                    if let Some(default) = &schema.default {
                        self.params.insert(schema.name.clone(), default.clone());
                    }
                    continue;
                }
            };

            let mut failure: Option<InvalidParameterRecord> = None;
            for step in &schema.steps {
                match run_step(step, &mut value, schema, self) {
                    Ok(()) => {}
                    Err((code, message)) => {
                        failure = Some(InvalidParameterRecord {
                            key: schema.name.clone(),
                            ty: schema.ty.to_string(),
                            value: self
                                .raw_params
                                .get(&schema.name.to_lowercase())
                                .cloned()
                                .unwrap_or(Value::Null),
                            error_code: code.to_string(),
                            error_message: message,
                        });
                        break;
                    }
                }
            }
            match failure {
                Some(record) => {
                    self.log.entry(
                        LogLevel::Warning,
                        &area,
                        format!("parameter `{}`: {}", record.key, record.error_message),
                    );
                    self.invalid_params.push(record);
                }
                None => {
                    self.params.insert(schema.name.clone(), value);
                }
            }
        }

        // Surface sent keys no declaration covers.
        let declared: Vec<String> = endpoint
            .parameters
            .iter()
            .map(|p| p.name.to_lowercase())
            .collect();
        let unknown: Vec<String> = self
            .raw_params
            .keys()
            .filter(|k| !declared.contains(k))
            .cloned()
            .collect();
        for key in unknown {
            self.log.entry(
                LogLevel::Notice,
                &area,
                format!("parameter `{key}` is not declared and was ignored"),
            );
        }

        // Required pass. Parameters that already failed a step are not
        // reported a second time.
        for schema in &endpoint.parameters {
            if !schema.required {
                continue;
            }
            if self.invalid_params.iter().any(|r| r.key == schema.name) {
                continue;
            }
            let missing = match self.params.get(&schema.name) {
                None => true,
                Some(v) => !schema.allow_empty && is_falsy(v),
            };
            if missing {
                let record = InvalidParameterRecord {
                    key: schema.name.clone(),
                    ty: schema.ty.to_string(),
                    value: self.params.get(&schema.name).cloned().unwrap_or(Value::Null),
                    error_code: "required_parameter".to_string(),
                    error_message: format!("`{}` is required and was not sent.", schema.name),
                };
                self.log.entry(
                    LogLevel::Warning,
                    &area,
                    format!("parameter `{}`: {}", record.key, record.error_message),
                );
                self.params.remove(&schema.name);
                self.invalid_params.push(record);
            }
        }

        if self.invalid_params.is_empty() {
            Ok(())
        } else {
            Err(ApiError::InvalidParameter(self.invalid_params.clone()))
        }
    }

    /// Evaluate the endpoint's dependency rules over the validated set.
    pub fn validate_dependencies(
        &mut self,
        endpoint: &EndpointDescriptor,
    ) -> Result<(), ApiError> {
        let area = self.log_area();
        for rule in &endpoint.dependencies {
            if let Err(message) = rule.evaluate(&self.params) {
                self.log.entry(LogLevel::Warning, &area, message.clone());
                self.invalid_dependencies
                    .push(InvalidDependencyRecord::new(rule, message));
            }
        }
        if self.invalid_dependencies.is_empty() {
            Ok(())
        } else {
            Err(ApiError::InvalidDependency(self.invalid_dependencies.clone()))
        }
    }
}

/// Execute one validation step against the working value.
///
/// `Err` carries the error code and a human-readable message.
fn run_step(
    step: &ValidationStep,
    value: &mut Value,
    schema: &ParameterSchema,
    request: &Request,
) -> Result<(), (&'static str, String)> {
    match step {
        ValidationStep::Trim => {
            if let Value::String(s) = value {
                *value = Value::String(s.trim().to_string());
            }
            Ok(())
        }
        ValidationStep::Type => check_type(value, schema),
        ValidationStep::Cast => {
            *value = cast_type(value, schema.ty);
            Ok(())
        }
        ValidationStep::Regex(pattern) => {
            if regex_validation(value, pattern) {
                Ok(())
            } else {
                Err((
                    "regex_validation_failed",
                    format!("the value does not match the pattern `{pattern}`"),
                ))
            }
        }
        ValidationStep::Callback(cb) => cb(value, &schema.name, request)
            .map_err(|message| ("callback_validation_failed", message)),
        ValidationStep::RuleSet(rules) => rule_validation(value, rules)
            .map_err(|message| ("rule_validation_failed", message)),
        ValidationStep::Format(cb) => {
            *value = cb(value, &schema.name, request);
            Ok(())
        }
    }
}

/// Type predicate plus the bounds and enum restrictions that ride on it.
fn check_type(
    value: &Value,
    schema: &ParameterSchema,
) -> Result<(), (&'static str, String)> {
    if !type_validation(value, schema.ty) {
        return Err((
            "type_validation_failed",
            format!("the value is not a valid {}", schema.ty),
        ));
    }
    if schema.ty.is_numeric() {
        let candidate = cast_type(value, schema.ty);
        let n = candidate.as_f64().unwrap_or(0.0);
        if let Some(min) = schema.minimum {
            if n < min {
                return Err((
                    "type_validation_failed",
                    format!("the value is below the minimum of {min}"),
                ));
            }
        }
        if let Some(max) = schema.maximum {
            if n > max {
                return Err((
                    "type_validation_failed",
                    format!("the value is above the maximum of {max}"),
                ));
            }
        }
    }
    if let Some(allowed) = &schema.enumeration {
        let candidate = cast_type(value, schema.ty);
        if !allowed.contains(&candidate) {
            let listing = allowed
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            return Err((
                "type_validation_failed",
                format!("the value is not one of: {listing}"),
            ));
        }
    }
    Ok(())
}
