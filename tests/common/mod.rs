//! Shared test fixtures: an in-memory data store, a recording notifier and
//! a baseline configuration.

#![allow(dead_code)]

use restgate::{ApiConfig, Capabilities, DataStore, Row, StoreError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Once};

static INIT_LOGGING: Once = Once::new();

/// Route test log output through `tracing-subscriber` once per binary.
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Baseline configuration used across the suites.
pub fn test_config() -> ApiConfig {
    init_logging();
    let mut roles = HashMap::new();
    roles.insert(
        "editor".to_string(),
        Capabilities::List(vec!["read".to_string(), "write".to_string()]),
    );
    roles.insert(
        "viewer".to_string(),
        Capabilities::List(vec!["read".to_string()]),
    );
    roles.insert(
        "superuser".to_string(),
        Capabilities::Wildcard("*".to_string()),
    );
    ApiConfig {
        name: "Test API".to_string(),
        description: "Fixture API".to_string(),
        domain: "https://api.test".to_string(),
        root: "rest-api".to_string(),
        admin_username: "root@api.test".to_string(),
        admin_password: "bootstrap-secret".to_string(),
        jwt_secret: "fixture-jwt-secret".to_string(),
        jwt_lifetime: "+1 day".to_string(),
        roles,
        ..ApiConfig::default()
    }
}

/// A `DataStore` over plain vectors, with just enough statement parsing to
/// answer the queries the engine issues.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    next_id: AtomicUsize,
    /// Number of upcoming inserts to reject as duplicates.
    duplicate_inserts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicUsize::new(1),
            ..Self::default()
        }
    }

    /// Make the next `count` inserts fail with a duplicate error.
    pub fn fail_next_inserts(&self, count: usize) {
        self.duplicate_inserts.store(count, Ordering::SeqCst);
    }

    /// Seed an active account row; returns its id.
    pub fn seed_account(&self, name: &str, email: &str, hashed_password: &str, role: &str) -> i64 {
        self.insert(
            "rest_api_accounts",
            &[
                ("name", json!(name)),
                ("email", json!(email)),
                ("password", json!(hashed_password)),
                ("role", json!(role)),
                ("status", json!("active")),
            ],
        )
        .unwrap()
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }
}

/// One parsed `col <op> literal` condition.
struct Condition {
    column: String,
    op: String,
    value: Value,
}

fn parse_literal(raw: &str) -> Value {
    let raw = raw.trim();
    if let Some(inner) = raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')) {
        Value::String(inner.replace("''", "'").replace("\\\\", "\\"))
    } else if let Ok(n) = raw.parse::<i64>() {
        json!(n)
    } else if let Ok(f) = raw.parse::<f64>() {
        json!(f)
    } else {
        Value::String(raw.to_string())
    }
}

fn parse_conditions(clause: &str) -> Vec<Condition> {
    clause
        .split(" AND ")
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            let (op, idx) = if let Some(idx) = part.find("<=") {
                ("<=", idx)
            } else {
                let idx = part.find('=').expect("unsupported condition");
                ("=", idx)
            };
            Condition {
                column: part[..idx].trim().to_string(),
                op: op.to_string(),
                value: parse_literal(&part[idx + op.len()..]),
            }
        })
        .collect()
}

fn loose_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn matches(row: &Row, conditions: &[Condition]) -> bool {
    conditions.iter().all(|cond| {
        let actual = match row.get(&cond.column) {
            Some(v) => v,
            None => return false,
        };
        match cond.op.as_str() {
            "=" => loose_string(actual) == loose_string(&cond.value),
            "<=" => loose_string(actual) <= loose_string(&cond.value),
            _ => false,
        }
    })
}

/// Split `SELECT cols FROM table [WHERE clause]`.
fn parse_select(statement: &str) -> (Vec<String>, String, Vec<Condition>) {
    let rest = statement
        .trim()
        .strip_prefix("SELECT ")
        .expect("only SELECT statements are supported");
    let from = rest.find(" FROM ").expect("missing FROM");
    let columns: Vec<String> = rest[..from].split(',').map(|c| c.trim().to_string()).collect();
    let after = &rest[from + " FROM ".len()..];
    let (table, conditions) = match after.find(" WHERE ") {
        Some(idx) => (
            after[..idx].trim().to_string(),
            parse_conditions(&after[idx + " WHERE ".len()..]),
        ),
        None => (after.trim().to_string(), Vec::new()),
    };
    (columns, table, conditions)
}

impl DataStore for MemoryStore {
    fn query(&self, statement: &str) -> Result<u64, StoreError> {
        if let Some(rest) = statement.trim().strip_prefix("DELETE FROM ") {
            let (table, clause) = match rest.find(" WHERE ") {
                Some(idx) => (rest[..idx].trim(), &rest[idx + " WHERE ".len()..]),
                None => (rest.trim(), ""),
            };
            return self.delete(table, clause);
        }
        Ok(0)
    }

    fn get_row(&self, statement: &str) -> Result<Option<Row>, StoreError> {
        Ok(self.get_results(statement)?.into_iter().next())
    }

    fn get_results(&self, statement: &str) -> Result<Vec<Row>, StoreError> {
        let (columns, table, conditions) = parse_select(statement);
        let tables = self.tables.lock().unwrap();
        let rows = tables.get(&table).cloned().unwrap_or_default();
        let selected = rows
            .into_iter()
            .filter(|row| matches(row, &conditions))
            .map(|row| {
                if columns.iter().any(|c| c == "*") {
                    row
                } else {
                    columns
                        .iter()
                        .filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
                        .collect()
                }
            })
            .collect();
        Ok(selected)
    }

    fn get_var(&self, statement: &str) -> Result<Option<Value>, StoreError> {
        let (columns, ..) = parse_select(statement);
        Ok(self
            .get_row(statement)?
            .and_then(|row| row.get(&columns[0]).cloned()))
    }

    fn insert(&self, table: &str, values: &[(&str, Value)]) -> Result<i64, StoreError> {
        let pending = self.duplicate_inserts.load(Ordering::SeqCst);
        if pending > 0 {
            self.duplicate_inserts.store(pending - 1, Ordering::SeqCst);
            return Err(StoreError::Duplicate("forced collision".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as i64;
        let mut row = Row::new();
        row.insert("id".to_string(), json!(id));
        for (column, value) in values {
            row.insert(column.to_string(), value.clone());
        }
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(row);
        Ok(id)
    }

    fn update(
        &self,
        table: &str,
        values: &[(&str, Value)],
        where_clause: &str,
    ) -> Result<u64, StoreError> {
        let conditions = parse_conditions(where_clause);
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table.to_string()).or_default();
        let mut affected = 0;
        for row in rows.iter_mut() {
            if matches(row, &conditions) {
                for (column, value) in values {
                    row.insert(column.to_string(), value.clone());
                }
                affected += 1;
            }
        }
        Ok(affected)
    }

    fn delete(&self, table: &str, where_clause: &str) -> Result<u64, StoreError> {
        let conditions = parse_conditions(where_clause);
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table.to_string()).or_default();
        let before = rows.len();
        rows.retain(|row| !matches(row, &conditions));
        Ok((before - rows.len()) as u64)
    }
}

/// A notification sent through [`RecordingNotifier`].
#[derive(Debug, Clone)]
pub struct SentNotification {
    pub template: String,
    pub substitutions: HashMap<String, String>,
    pub recipient_name: String,
    pub recipient_email: String,
}

/// Captures every notification for later assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap().clone()
    }
}

impl restgate::Notifier for RecordingNotifier {
    fn send(
        &self,
        template: &str,
        substitutions: &HashMap<String, String>,
        recipient_name: &str,
        recipient_email: &str,
    ) -> bool {
        self.sent.lock().unwrap().push(SentNotification {
            template: template.to_string(),
            substitutions: substitutions.clone(),
            recipient_name: recipient_name.to_string(),
            recipient_email: recipient_email.to_string(),
        });
        true
    }
}
