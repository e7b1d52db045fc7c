//! Data-store boundary.
//!
//! The engine never owns a database connection; hosts supply a [`DataStore`]
//! implementation. The trait mirrors the small query surface the built-in
//! endpoints need. Statement templates use printf-style markers (`%s`, `%d`,
//! `%f`) filled in by [`prepare`], which quotes and escapes string values.

use serde_json::Value;
use thiserror::Error;

/// One result row.
pub type Row = serde_json::Map<String, Value>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("duplicate value: {0}")]
    Duplicate(String),
    /// Any other backend failure.
    #[error("data store error: {0}")]
    Backend(String),
}

/// Host-provided persistence.
pub trait DataStore: Send + Sync {
    /// Execute a statement that returns no rows. Returns the number of
    /// affected rows.
    fn query(&self, statement: &str) -> Result<u64, StoreError>;

    /// Fetch the first row of a query, if any.
    fn get_row(&self, statement: &str) -> Result<Option<Row>, StoreError>;

    /// Fetch all rows of a query.
    fn get_results(&self, statement: &str) -> Result<Vec<Row>, StoreError>;

    /// Fetch the first column of the first row, if any.
    fn get_var(&self, statement: &str) -> Result<Option<Value>, StoreError>;

    /// Insert a row from column/value pairs. Returns the new row id.
    fn insert(&self, table: &str, values: &[(&str, Value)]) -> Result<i64, StoreError>;

    /// Update rows matching `where_clause` (without the `WHERE` keyword).
    /// Returns the number of affected rows.
    fn update(
        &self,
        table: &str,
        values: &[(&str, Value)],
        where_clause: &str,
    ) -> Result<u64, StoreError>;

    /// Delete rows matching `where_clause`. Returns the number of affected
    /// rows.
    fn delete(&self, table: &str, where_clause: &str) -> Result<u64, StoreError>;
}

/// Fill a statement template with escaped arguments.
///
/// `%s` quotes and escapes the string form of the value, `%d` formats it as
/// an integer and `%f` as a float. Surplus markers are left in place; that
/// is a caller bug and will fail loudly at the backend.
pub fn prepare(template: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut next_arg = args.iter();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('s') => {
                chars.next();
                let value = next_arg.next().cloned().unwrap_or(Value::Null);
                out.push('\'');
                out.push_str(&escape_string(&stringify(&value)));
                out.push('\'');
            }
            Some('d') => {
                chars.next();
                let value = next_arg.next().cloned().unwrap_or(Value::Null);
                out.push_str(&as_i64(&value).to_string());
            }
            Some('f') => {
                chars.next();
                let value = next_arg.next().cloned().unwrap_or(Value::Null);
                out.push_str(&as_f64(&value).to_string());
            }
            Some('%') => {
                chars.next();
                out.push('%');
            }
            _ => out.push('%'),
        }
    }
    out
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "''")
}

fn as_i64(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n.as_i64().or(n.as_f64().map(|f| f as i64)).unwrap_or(0),
        Value::String(s) => s.parse().unwrap_or(0),
        Value::Bool(b) => *b as i64,
        _ => 0,
    }
}

fn as_f64(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Prefixed table names the built-in endpoints read and write.
#[derive(Debug, Clone)]
pub struct TableNames {
    prefix: String,
}

impl TableNames {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn accounts(&self) -> String {
        format!("{}accounts", self.prefix)
    }

    pub fn tokens(&self) -> String {
        format!("{}tokens", self.prefix)
    }

    pub fn sessions(&self) -> String {
        format!("{}sessions", self.prefix)
    }

    pub fn passwords(&self) -> String {
        format!("{}passwords", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prepare_quotes_and_escapes_strings() {
        let sql = prepare(
            "SELECT * FROM t WHERE email = %s AND id = %d",
            &[json!("o'brien@example.com"), json!(7)],
        );
        assert_eq!(
            sql,
            "SELECT * FROM t WHERE email = 'o''brien@example.com' AND id = 7"
        );
    }

    #[test]
    fn prepare_formats_floats_and_literal_percent() {
        let sql = prepare("UPDATE t SET score = %f WHERE note LIKE '%%x'", &[json!(2.5)]);
        assert_eq!(sql, "UPDATE t SET score = 2.5 WHERE note LIKE '%x'");
    }

    #[test]
    fn table_names_carry_the_prefix() {
        let tables = TableNames::new("rest_api_");
        assert_eq!(tables.accounts(), "rest_api_accounts");
        assert_eq!(tables.tokens(), "rest_api_tokens");
    }
}
