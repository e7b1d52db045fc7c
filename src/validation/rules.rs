//! Named rule sets.
//!
//! A parameter may declare a list of rule tokens (`"required"`, `"min:3"`,
//! `"in:red,green,blue"`, ...) that run as one validation step after the
//! structural checks. Tokens are evaluated in order; the first failing
//! token's message becomes the step's error.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap()
});

static ALPHA_NUM: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^[a-zA-Z0-9]+$").unwrap()
});

/// Evaluate rule tokens against a value, stopping at the first failure.
///
/// An unknown token is itself a failure so that typos in endpoint
/// declarations surface immediately instead of silently passing.
pub fn rule_validation(value: &Value, rules: &[String]) -> Result<(), String> {
    for token in rules {
        let (name, arg) = match token.split_once(':') {
            Some((n, a)) => (n, Some(a)),
            None => (token.as_str(), None),
        };
        if let Some(message) = check_rule(value, name, arg) {
            return Err(message);
        }
    }
    Ok(())
}

fn check_rule(value: &Value, name: &str, arg: Option<&str>) -> Option<String> {
    match name {
        "required" => {
            if value.is_null() || value.as_str().map(|s| s.is_empty()).unwrap_or(false) {
                return Some("is required".to_string());
            }
        }
        "integer" => {
            if as_f64(value).map(|f| f.fract() != 0.0).unwrap_or(true) {
                return Some("must be an integer".to_string());
            }
        }
        "numeric" => {
            if as_f64(value).is_none() {
                return Some("must be numeric".to_string());
            }
        }
        "email" => {
            let ok = value.as_str().map(|s| EMAIL.is_match(s)).unwrap_or(false);
            if !ok {
                return Some("must be a valid email address".to_string());
            }
        }
        "min" => match parse_arg::<f64>(name, arg) {
            Ok(bound) => match as_f64(value) {
                Some(n) if n >= bound => {}
                _ => return Some(format!("must be at least {bound}")),
            },
            Err(message) => return Some(message),
        },
        "max" => match parse_arg::<f64>(name, arg) {
            Ok(bound) => match as_f64(value) {
                Some(n) if n <= bound => {}
                _ => return Some(format!("must be at most {bound}")),
            },
            Err(message) => return Some(message),
        },
        "length_min" => match parse_arg::<usize>(name, arg) {
            Ok(bound) => {
                if value_len(value) < bound {
                    return Some(format!("must be at least {bound} characters long"));
                }
            }
            Err(message) => return Some(message),
        },
        "length_max" => match parse_arg::<usize>(name, arg) {
            Ok(bound) => {
                if value_len(value) > bound {
                    return Some(format!("must be at most {bound} characters long"));
                }
            }
            Err(message) => return Some(message),
        },
        "in" => {
            let allowed: Vec<&str> = arg.unwrap_or("").split(',').collect();
            let needle = scalar_string(value);
            if !allowed.contains(&needle.as_str()) {
                return Some(format!("must be one of: {}", allowed.join(", ")));
            }
        }
        "ascii" => {
            let ok = value.as_str().map(|s| s.is_ascii()).unwrap_or(false);
            if !ok {
                return Some("must contain only ASCII characters".to_string());
            }
        }
        "alpha_num" => {
            let ok = value
                .as_str()
                .map(|s| ALPHA_NUM.is_match(s))
                .unwrap_or(false);
            if !ok {
                return Some("must contain only letters and digits".to_string());
            }
        }
        "url" => {
            let ok = value
                .as_str()
                .map(|s| url::Url::parse(s).is_ok())
                .unwrap_or(false);
            if !ok {
                return Some("must be a valid URL".to_string());
            }
        }
        other => return Some(format!("unknown rule `{other}`")),
    }
    None
}

/// A missing or unparsable argument is reported as a declaration error.
fn parse_arg<T: std::str::FromStr>(name: &str, arg: Option<&str>) -> Result<T, String> {
    arg.and_then(|a| a.parse().ok())
        .ok_or_else(|| format!("rule `{name}` has a missing or invalid argument"))
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn value_len(value: &Value) -> usize {
    match value {
        Value::String(s) => s.chars().count(),
        Value::Array(a) => a.len(),
        other => other.to_string().chars().count(),
    }
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rules(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn first_failure_wins() {
        let err = rule_validation(&json!("x"), &rules(&["email", "length_min:3"]))
            .unwrap_err();
        assert!(err.contains("email"));
        assert!(!err.contains("3 characters"));
    }

    #[test]
    fn bounds_apply_to_numeric_strings() {
        assert!(rule_validation(&json!("5"), &rules(&["min:3", "max:10"])).is_ok());
        assert!(rule_validation(&json!("11"), &rules(&["max:10"])).is_err());
    }

    #[test]
    fn in_rule_matches_scalars() {
        assert!(rule_validation(&json!("green"), &rules(&["in:red,green,blue"])).is_ok());
        assert!(rule_validation(&json!(2), &rules(&["in:1,2,3"])).is_ok());
        assert!(rule_validation(&json!("cyan"), &rules(&["in:red,green,blue"])).is_err());
    }

    #[test]
    fn unknown_rule_fails() {
        let err = rule_validation(&json!("x"), &rules(&["sparkles"])).unwrap_err();
        assert!(err.contains("unknown rule"));
    }

    #[test]
    fn email_rule() {
        assert!(rule_validation(&json!("a@b.example"), &rules(&["email"])).is_ok());
        assert!(rule_validation(&json!("not-an-email"), &rules(&["email"])).is_err());
    }
}
