//! Type and format validators.
//!
//! Pure functions over `serde_json::Value`: type predicates, casting to the
//! declared native representation and regex matching. These are the leaves
//! of the validation pipeline; the per-parameter step ordering lives in
//! [`crate::request`].

pub mod rules;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Declared parameter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    /// Any numeric value; cast truncates to an integer.
    Number,
    Float,
    Bool,
    Array,
    Object,
}

impl ParamType {
    /// Numeric types accept `minimum`/`maximum` bounds.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ParamType::Integer | ParamType::Number | ParamType::Float)
    }

    /// Types that accept an `enum` restriction.
    pub fn supports_enum(&self) -> bool {
        matches!(
            self,
            ParamType::String
                | ParamType::Integer
                | ParamType::Number
                | ParamType::Float
                | ParamType::Array
        )
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Float => "float",
            ParamType::Bool => "bool",
            ParamType::Array => "array",
            ParamType::Object => "object",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ParamType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(ParamType::String),
            "integer" => Ok(ParamType::Integer),
            "number" => Ok(ParamType::Number),
            "float" => Ok(ParamType::Float),
            "bool" => Ok(ParamType::Bool),
            "array" => Ok(ParamType::Array),
            "object" => Ok(ParamType::Object),
            _ => Err(()),
        }
    }
}

use serde_json::Value;

/// `true` when the string is a canonical base-10 integer ("007" is not).
pub fn is_integer_string(s: &str) -> bool {
    s.parse::<i64>().map(|n| n.to_string() == s).unwrap_or(false)
}

/// `true` when the string parses as a float ("1.50" counts, " 1.5" does not).
pub fn is_float_string(s: &str) -> bool {
    !s.is_empty() && s.trim() == s && s.parse::<f64>().is_ok()
}

/// `true` when the string parses as a number at all (integer or float).
pub fn is_numeric_string(s: &str) -> bool {
    !s.is_empty() && s.trim() == s && s.parse::<f64>().is_ok()
}

/// Accepts booleans, the integers 0/1, the strings "0"/"1" and the literals
/// "true"/"false".
pub fn is_bool_value(value: &Value) -> bool {
    match value {
        Value::Bool(_) => true,
        Value::Number(n) => n.as_i64().map(|i| i == 0 || i == 1).unwrap_or(false),
        Value::String(s) => matches!(s.as_str(), "0" | "1" | "true" | "false"),
        _ => false,
    }
}

/// Check a raw value against the declared type's predicate.
pub fn type_validation(value: &Value, ty: ParamType) -> bool {
    match ty {
        ParamType::Integer => {
            value.as_i64().is_some()
                || value.as_u64().is_some()
                || value.as_str().map(is_integer_string).unwrap_or(false)
        }
        ParamType::Number => {
            value.is_number() || value.as_str().map(is_numeric_string).unwrap_or(false)
        }
        ParamType::Float => match value {
            Value::Number(n) => n.is_f64(),
            Value::String(s) => s.contains('.') && is_float_string(s),
            _ => false,
        },
        ParamType::Array => value.is_array(),
        // Arrays are admitted as objects, mirroring loose JSON senders.
        ParamType::Object => value.is_object() || value.is_array(),
        ParamType::Bool => value.is_boolean() || is_bool_value(value),
        ParamType::String => value.is_string(),
    }
}

/// Coerce a type-checked value to its declared native representation.
///
/// Never fails; unexpected shapes fall back to a zero value of the type.
pub fn cast_type(value: &Value, ty: ParamType) -> Value {
    match ty {
        ParamType::Integer | ParamType::Number => Value::from(to_i64(value)),
        ParamType::Float => serde_json::Number::from_f64(to_f64(value))
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ParamType::Bool => Value::Bool(to_bool(value)),
        ParamType::Array => match value {
            Value::Array(_) => value.clone(),
            other => Value::Array(vec![other.clone()]),
        },
        ParamType::Object => match value {
            Value::Object(_) => value.clone(),
            Value::Array(items) => Value::Object(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (i.to_string(), v.clone()))
                    .collect(),
            ),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("scalar".to_string(), other.clone());
                Value::Object(map)
            }
        },
        ParamType::String => Value::String(to_trimmed_string(value)),
    }
}

fn to_i64(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n.as_i64().or(n.as_f64().map(|f| f as i64)).unwrap_or(0),
        Value::String(s) => s
            .parse::<i64>()
            .ok()
            .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
            .unwrap_or(0),
        Value::Bool(b) => *b as i64,
        _ => 0,
    }
}

fn to_f64(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.parse::<f64>().unwrap_or(0.0),
        Value::Bool(b) => *b as i64 as f64,
        _ => 0.0,
    }
}

fn to_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64().map(|i| i != 0).unwrap_or(true),
        Value::String(s) => matches!(s.as_str(), "1" | "true"),
        _ => false,
    }
}

fn to_trimmed_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

static DELIMITED: Lazy<Regex> = Lazy::new(|| {
    // "/pattern/flags" with only the `i` flag supported
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^/(?s)(.*)/([a-zA-Z]*)$").unwrap()
});

/// Match the string form of a value against a caller-supplied pattern.
///
/// Patterns written with `/.../` delimiters (optionally with the `i` flag)
/// are unwrapped first; bare patterns are used as-is. An uncompilable
/// pattern always fails and is logged.
pub fn regex_validation(value: &Value, pattern: &str) -> bool {
    let mut body = pattern.to_string();
    if let Some(caps) = DELIMITED.captures(pattern) {
        body = caps[1].to_string();
        if caps[2].contains('i') {
            body = format!("(?i){body}");
        }
    }
    let regex = match Regex::new(&body) {
        Ok(r) => r,
        Err(err) => {
            warn!(pattern = %pattern, error = %err, "validation regex failed to compile");
            return false;
        }
    };
    let haystack = match value {
        Value::String(s) => s.clone(),
        other => to_trimmed_string(other),
    };
    regex.is_match(&haystack)
}

/// Falsy per the engine's required/allow-empty semantics: null, false,
/// numeric zero, the empty string, "0", and empty collections.
pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().map(|f| f == 0.0).unwrap_or(false),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}
