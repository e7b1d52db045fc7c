//! Inter-parameter dependency rules.
//!
//! Rules run after per-parameter validation, over the set of parameter keys
//! that survived it. All declared rules are evaluated and every failure is
//! reported, matching the aggregate behavior of parameter validation.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Presence predicate the rules share: a parameter counts as present when
/// it validated, regardless of its value.
fn present(params: &HashMap<String, Value>, key: &str) -> bool {
    params.contains_key(key)
}

/// One inter-parameter constraint.
#[derive(Clone)]
pub enum DependencyRule {
    /// When `field` is present, all `companions` must be present too.
    Requires {
        field: String,
        companions: Vec<String>,
    },
    /// At least one of the listed fields must be present.
    Or(Vec<String>),
    /// Exactly one of the listed fields must be present.
    OnlyOne(Vec<String>),
    /// Either all of the listed fields are present or none are.
    AllOrNone(Vec<String>),
    /// At most one of the listed fields may be present.
    ZeroOrOne(Vec<String>),
    /// Arbitrary predicate over the validated parameter map.
    Custom {
        description: String,
        check: Arc<dyn Fn(&HashMap<String, Value>) -> bool + Send + Sync>,
    },
}

impl std::fmt::Debug for DependencyRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencyRule::Requires { field, companions } => {
                write!(f, "Requires({field} => {companions:?})")
            }
            DependencyRule::Or(fields) => write!(f, "Or({fields:?})"),
            DependencyRule::OnlyOne(fields) => write!(f, "OnlyOne({fields:?})"),
            DependencyRule::AllOrNone(fields) => write!(f, "AllOrNone({fields:?})"),
            DependencyRule::ZeroOrOne(fields) => write!(f, "ZeroOrOne({fields:?})"),
            DependencyRule::Custom { description, .. } => write!(f, "Custom({description})"),
        }
    }
}

impl DependencyRule {
    /// Stable rule-kind name used in schema listings and failure records.
    pub fn kind(&self) -> &'static str {
        match self {
            DependencyRule::Requires { .. } => "requires",
            DependencyRule::Or(_) => "or",
            DependencyRule::OnlyOne(_) => "only_one",
            DependencyRule::AllOrNone(_) => "all_or_none",
            DependencyRule::ZeroOrOne(_) => "zero_or_one",
            DependencyRule::Custom { .. } => "custom",
        }
    }

    /// Human-readable statement of the constraint.
    pub fn describe(&self) -> String {
        match self {
            DependencyRule::Requires { field, companions } => format!(
                "`{field}` requires {} to be present",
                join_keys(companions)
            ),
            DependencyRule::Or(fields) => {
                format!("at least one of {} must be present", join_keys(fields))
            }
            DependencyRule::OnlyOne(fields) => {
                format!("exactly one of {} must be present", join_keys(fields))
            }
            DependencyRule::AllOrNone(fields) => format!(
                "{} must be present together or not at all",
                join_keys(fields)
            ),
            DependencyRule::ZeroOrOne(fields) => {
                format!("at most one of {} may be present", join_keys(fields))
            }
            DependencyRule::Custom { description, .. } => description.clone(),
        }
    }

    /// Evaluate against the validated parameter map.
    pub fn evaluate(&self, params: &HashMap<String, Value>) -> Result<(), String> {
        let ok = match self {
            DependencyRule::Requires { field, companions } => {
                !present(params, field) || companions.iter().all(|c| present(params, c))
            }
            DependencyRule::Or(fields) => fields.iter().any(|f| present(params, f)),
            DependencyRule::OnlyOne(fields) => {
                fields.iter().filter(|f| present(params, f)).count() == 1
            }
            DependencyRule::AllOrNone(fields) => {
                let found = fields.iter().filter(|f| present(params, f)).count();
                found == 0 || found == fields.len()
            }
            DependencyRule::ZeroOrOne(fields) => {
                fields.iter().filter(|f| present(params, f)).count() <= 1
            }
            DependencyRule::Custom { check, .. } => check(params),
        };
        if ok {
            Ok(())
        } else {
            Err(self.describe())
        }
    }
}

fn join_keys(keys: &[String]) -> String {
    keys.iter()
        .map(|k| format!("`{k}`"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// One dependency failure as reported in the error payload.
#[derive(Debug, Clone, Serialize)]
pub struct InvalidDependencyRecord {
    pub dependency: String,
    pub error_code: String,
    pub error_message: String,
}

impl InvalidDependencyRecord {
    pub fn new(rule: &DependencyRule, message: String) -> Self {
        Self {
            dependency: rule.kind().to_string(),
            error_code: "dependency_validation_failed".to_string(),
            error_message: message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(keys: &[&str]) -> HashMap<String, Value> {
        keys.iter().map(|k| (k.to_string(), json!(1))).collect()
    }

    fn fields(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn or_needs_at_least_one() {
        let rule = DependencyRule::Or(fields(&["email", "phone"]));
        assert!(rule.evaluate(&params(&["email"])).is_ok());
        assert!(rule.evaluate(&params(&["email", "phone"])).is_ok());
        assert!(rule.evaluate(&params(&["name"])).is_err());
    }

    #[test]
    fn only_one_rejects_both_and_neither() {
        let rule = DependencyRule::OnlyOne(fields(&["card", "iban"]));
        assert!(rule.evaluate(&params(&["card"])).is_ok());
        assert!(rule.evaluate(&params(&["card", "iban"])).is_err());
        assert!(rule.evaluate(&params(&[])).is_err());
    }

    #[test]
    fn all_or_none() {
        let rule = DependencyRule::AllOrNone(fields(&["lat", "lon"]));
        assert!(rule.evaluate(&params(&["lat", "lon"])).is_ok());
        assert!(rule.evaluate(&params(&[])).is_ok());
        assert!(rule.evaluate(&params(&["lat"])).is_err());
    }

    #[test]
    fn requires_only_fires_when_field_present() {
        let rule = DependencyRule::Requires {
            field: "discount".to_string(),
            companions: fields(&["coupon"]),
        };
        assert!(rule.evaluate(&params(&[])).is_ok());
        assert!(rule.evaluate(&params(&["coupon"])).is_ok());
        assert!(rule.evaluate(&params(&["discount", "coupon"])).is_ok());
        assert!(rule.evaluate(&params(&["discount"])).is_err());
    }

    #[test]
    fn zero_or_one() {
        let rule = DependencyRule::ZeroOrOne(fields(&["a", "b"]));
        assert!(rule.evaluate(&params(&[])).is_ok());
        assert!(rule.evaluate(&params(&["a"])).is_ok());
        assert!(rule.evaluate(&params(&["a", "b"])).is_err());
    }

    #[test]
    fn custom_predicate() {
        let rule = DependencyRule::Custom {
            description: "end must come after start".to_string(),
            check: Arc::new(|p| {
                match (p.get("start").and_then(Value::as_i64), p.get("end").and_then(Value::as_i64)) {
                    (Some(s), Some(e)) => e > s,
                    _ => true,
                }
            }),
        };
        let mut p = HashMap::new();
        p.insert("start".to_string(), json!(5));
        p.insert("end".to_string(), json!(3));
        assert!(rule.evaluate(&p).is_err());
        p.insert("end".to_string(), json!(9));
        assert!(rule.evaluate(&p).is_ok());
    }
}
