//! Parameter and endpoint declarations.
//!
//! Endpoints are declared with [`EndpointSpec`] / [`ParameterSpec`] builders
//! and compiled once at registration into [`EndpointDescriptor`] /
//! [`ParameterSchema`]. Compilation is where declaration mistakes are
//! corrected and logged: keys are sanitized, contradictory flags resolved
//! and the validation step order fixed, so the per-request pipeline never
//! has to second-guess the schema it runs.

use crate::dependency::DependencyRule;
use crate::request::Request;
use crate::security::AccessPolicy;
use crate::validation::ParamType;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

/// Where a raw parameter value is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLocation {
    /// URL query string.
    Query,
    /// Path placeholder capture.
    Variable,
    /// JSON request body.
    Body,
}

/// Custom predicate run as a validation step.
///
/// Receives the value as validated so far, the parameter key and the whole
/// request, so cross-field checks are possible. Returns `Err` with a
/// human-readable reason on failure.
pub type ValidationCallback =
    Arc<dyn Fn(&Value, &str, &Request) -> Result<(), String> + Send + Sync>;

/// Value transformer run after validation succeeds.
pub type FormatCallback = Arc<dyn Fn(&Value, &str, &Request) -> Value + Send + Sync>;

/// One step of a parameter's validation pipeline.
#[derive(Clone)]
pub enum ValidationStep {
    /// Strip surrounding whitespace from string values.
    Trim,
    /// Check the value against the declared type.
    Type,
    /// Coerce the value to the declared type's native representation.
    Cast,
    /// Match the string form against a pattern.
    Regex(String),
    /// Run a custom predicate.
    Callback(ValidationCallback),
    /// Evaluate a named rule set.
    RuleSet(Vec<String>),
    /// Transform the final value.
    Format(FormatCallback),
}

impl std::fmt::Debug for ValidationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationStep::Trim => write!(f, "Trim"),
            ValidationStep::Type => write!(f, "Type"),
            ValidationStep::Cast => write!(f, "Cast"),
            ValidationStep::Regex(p) => write!(f, "Regex({p})"),
            ValidationStep::Callback(_) => write!(f, "Callback"),
            ValidationStep::RuleSet(r) => write!(f, "RuleSet({r:?})"),
            ValidationStep::Format(_) => write!(f, "Format"),
        }
    }
}

impl ValidationStep {
    fn is_structural(&self) -> bool {
        matches!(
            self,
            ValidationStep::Trim | ValidationStep::Type | ValidationStep::Cast
        )
    }

    fn same_kind(&self, other: &ValidationStep) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Parameter declaration as written by the endpoint author.
#[derive(Clone, Default)]
pub struct ParameterSpec {
    pub ty: Option<ParamType>,
    pub location: Option<ParamLocation>,
    pub required: bool,
    pub default: Option<Value>,
    pub allow_empty: Option<bool>,
    pub description: String,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub enumeration: Option<Vec<Value>>,
    pub steps: Vec<ValidationStep>,
}

impl ParameterSpec {
    pub fn new(ty: ParamType) -> Self {
        Self {
            ty: Some(ty),
            ..Self::default()
        }
    }

    pub fn location(mut self, location: ParamLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn allow_empty(mut self, allow: bool) -> Self {
        self.allow_empty = Some(allow);
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn minimum(mut self, min: f64) -> Self {
        self.minimum = Some(min);
        self
    }

    pub fn maximum(mut self, max: f64) -> Self {
        self.maximum = Some(max);
        self
    }

    pub fn one_of(mut self, values: Vec<Value>) -> Self {
        self.enumeration = Some(values);
        self
    }

    pub fn step(mut self, step: ValidationStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn regex(self, pattern: impl Into<String>) -> Self {
        self.step(ValidationStep::Regex(pattern.into()))
    }

    pub fn callback(self, cb: ValidationCallback) -> Self {
        self.step(ValidationStep::Callback(cb))
    }

    pub fn rules(self, tokens: &[&str]) -> Self {
        self.step(ValidationStep::RuleSet(
            tokens.iter().map(|s| s.to_string()).collect(),
        ))
    }

    pub fn format(self, cb: FormatCallback) -> Self {
        self.step(ValidationStep::Format(cb))
    }
}

/// Compiled, normalized parameter schema.
#[derive(Debug, Clone)]
pub struct ParameterSchema {
    /// Sanitized lookup key.
    pub name: String,
    pub ty: ParamType,
    pub location: ParamLocation,
    pub required: bool,
    pub default: Option<Value>,
    pub allow_empty: bool,
    pub description: String,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub enumeration: Option<Vec<Value>>,
    /// Steps in execution order.
    pub steps: Vec<ValidationStep>,
}

static INVALID_KEY_CHARS: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"[^a-z0-9_]").unwrap()
});

static COLLAPSE_UNDERSCORES: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"__+").unwrap()
});

/// Normalize a declared key into a safe identifier.
///
/// Lowercases, maps spaces/dashes/dots to underscores, strips everything
/// else, collapses runs of underscores, prefixes an underscore when the key
/// starts with a digit and trims trailing underscores.
pub fn sanitize_key(key: &str) -> String {
    let lowered = key.to_lowercase();
    let mapped: String = lowered
        .chars()
        .map(|c| if matches!(c, ' ' | '-' | '.') { '_' } else { c })
        .collect();
    let stripped = INVALID_KEY_CHARS.replace_all(&mapped, "");
    let collapsed = COLLAPSE_UNDERSCORES.replace_all(&stripped, "_");
    let mut out = collapsed.trim_end_matches('_').to_string();
    if out.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
        out.insert(0, '_');
    }
    out
}

impl ParameterSpec {
    /// Compile the declaration, fixing and logging inconsistencies.
    pub fn compile(self, declared_key: &str, endpoint: &str) -> ParameterSchema {
        let name = sanitize_key(declared_key);
        if name != declared_key {
            warn!(
                endpoint = %endpoint,
                declared = %declared_key,
                sanitized = %name,
                "parameter key was sanitized"
            );
        }

        let ty = self.ty.unwrap_or_else(|| {
            warn!(endpoint = %endpoint, key = %name, "parameter has no type, assuming string");
            ParamType::String
        });

        // A default on a required parameter can never apply.
        let default = match (&self.default, self.required) {
            (Some(_), true) => {
                warn!(
                    endpoint = %endpoint,
                    key = %name,
                    "default value on a required parameter is ignored"
                );
                None
            }
            (Some(d), false) => {
                if crate::validation::type_validation(d, ty) {
                    Some(d.clone())
                } else {
                    warn!(
                        endpoint = %endpoint,
                        key = %name,
                        ty = %ty,
                        "default value does not match the declared type and is ignored"
                    );
                    None
                }
            }
            (None, _) => None,
        };

        // Booleans default to allowing the falsy literal; everything else
        // treats empty as missing unless the author opts in.
        let allow_empty = self.allow_empty.unwrap_or(ty == ParamType::Bool);

        let (minimum, maximum) = if ty.is_numeric() {
            (self.minimum, self.maximum)
        } else {
            if self.minimum.is_some() || self.maximum.is_some() {
                warn!(
                    endpoint = %endpoint,
                    key = %name,
                    ty = %ty,
                    "bounds are only valid on numeric types and are ignored"
                );
            }
            (None, None)
        };

        let enumeration = match self.enumeration {
            Some(values) if ty.supports_enum() => Some(values),
            Some(_) => {
                warn!(
                    endpoint = %endpoint,
                    key = %name,
                    ty = %ty,
                    "enum restriction is not valid for this type and is ignored"
                );
                None
            }
            None => None,
        };

        let declared: Vec<ValidationStep> = self
            .steps
            .into_iter()
            .filter(|step| match step {
                ValidationStep::Regex(pattern) if pattern.is_empty() => {
                    warn!(
                        endpoint = %endpoint,
                        key = %name,
                        "regex step with an empty pattern is ignored"
                    );
                    false
                }
                ValidationStep::RuleSet(tokens) if tokens.is_empty() => {
                    warn!(
                        endpoint = %endpoint,
                        key = %name,
                        "empty rule set is ignored"
                    );
                    false
                }
                _ => true,
            })
            .collect();
        let steps = merge_steps(declared);

        ParameterSchema {
            name,
            ty,
            location: self.location.unwrap_or(ParamLocation::Body),
            required: self.required,
            default,
            allow_empty,
            description: self.description,
            minimum,
            maximum,
            enumeration,
            steps,
        }
    }
}

/// Fix the execution order of validation steps.
///
/// Trim, type and cast always run, in that order, before anything else.
/// When the author listed one of them explicitly its position among the
/// remaining steps is honored; the others are pushed to the front. The
/// author's non-structural steps keep their declared relative order.
fn merge_steps(declared: Vec<ValidationStep>) -> Vec<ValidationStep> {
    let defaults = [
        ValidationStep::Trim,
        ValidationStep::Type,
        ValidationStep::Cast,
    ];
    let mut steps: Vec<ValidationStep> = defaults
        .iter()
        .filter(|d| !declared.iter().any(|s| s.same_kind(*d)))
        .cloned()
        .collect();
    steps.extend(declared);
    debug_assert!(steps.iter().filter(|s| s.is_structural()).count() >= 3);
    steps
}

/// Endpoint declaration.
#[derive(Clone)]
pub struct EndpointSpec {
    pub name: String,
    pub description: String,
    pub access: AccessPolicy,
    /// Registry name of the handler that serves this endpoint.
    pub handler: String,
    /// Declared parameters in declaration order, keyed by raw key.
    pub parameters: Vec<(String, ParameterSpec)>,
    pub dependencies: Vec<DependencyRule>,
}

impl EndpointSpec {
    pub fn new(name: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            access: AccessPolicy::Public,
            handler: handler.into(),
            parameters: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn access(mut self, policy: AccessPolicy) -> Self {
        self.access = policy;
        self
    }

    pub fn param(mut self, key: impl Into<String>, spec: ParameterSpec) -> Self {
        self.parameters.push((key.into(), spec));
        self
    }

    pub fn dependency(mut self, rule: DependencyRule) -> Self {
        self.dependencies.push(rule);
        self
    }

    /// Compile into the runtime descriptor.
    pub fn compile(self) -> EndpointDescriptor {
        let name = self.name;
        let parameters: Vec<ParameterSchema> = self
            .parameters
            .into_iter()
            .map(|(key, spec)| spec.compile(&key, &name))
            .collect();
        EndpointDescriptor {
            name,
            description: self.description,
            access: self.access,
            handler: self.handler,
            parameters,
            dependencies: self.dependencies,
        }
    }
}

/// Compiled endpoint: what the dispatcher executes against.
#[derive(Clone)]
pub struct EndpointDescriptor {
    pub name: String,
    pub description: String,
    pub access: AccessPolicy,
    pub handler: String,
    pub parameters: Vec<ParameterSchema>,
    pub dependencies: Vec<DependencyRule>,
}

impl EndpointDescriptor {
    pub fn parameter(&self, name: &str) -> Option<&ParameterSchema> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Introspection view of this endpoint for schema listings.
    ///
    /// Callbacks and formatters are internal and never exposed.
    pub fn to_schema(&self) -> Value {
        let params: Vec<Value> = self
            .parameters
            .iter()
            .map(|p| {
                let mut obj = json!({
                    "name": p.name,
                    "type": p.ty.to_string(),
                    "required": p.required,
                    "description": p.description,
                });
                if let Some(map) = obj.as_object_mut() {
                    if let Some(d) = &p.default {
                        map.insert("default".to_string(), d.clone());
                    }
                    if let Some(min) = p.minimum {
                        map.insert("minimum".to_string(), json!(min));
                    }
                    if let Some(max) = p.maximum {
                        map.insert("maximum".to_string(), json!(max));
                    }
                    if let Some(e) = &p.enumeration {
                        map.insert("enum".to_string(), json!(e));
                    }
                }
                obj
            })
            .collect();
        let dependencies: Vec<Value> = self
            .dependencies
            .iter()
            .map(|d| json!({ "kind": d.kind(), "description": d.describe() }))
            .collect();
        let access = match &self.access {
            AccessPolicy::Public => json!("public"),
            AccessPolicy::RoleOrCapability(name) => json!(name),
            AccessPolicy::Predicate(_) => json!("custom"),
        };
        json!({
            "name": self.name,
            "description": self.description,
            "authentication": !matches!(self.access, AccessPolicy::Public),
            "access": access,
            "parameters": params,
            "dependencies": dependencies,
        })
    }
}
