//! Access gate: credentials, bearer tokens and capability checks.
//!
//! The [`Gatekeeper`] owns everything between "a request carries an
//! Authorization header" and "this identity may call this endpoint". It
//! verifies credentials against the account table (with a configurable
//! bootstrap admin that bypasses it), mints and verifies JWTs, maps roles to
//! capabilities and manages short-lived single-purpose user tokens.

pub mod password;

use crate::config::{ApiConfig, Capabilities};
use crate::error::{ApiError, TokenErrorKind};
use crate::request::Request;
use crate::store::{prepare, DataStore, StoreError, TableNames};
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Who may call an endpoint.
#[derive(Clone)]
pub enum AccessPolicy {
    /// No authentication required.
    Public,
    /// Caller's role must equal the named role, or its capability list must
    /// contain it.
    RoleOrCapability(String),
    /// Arbitrary predicate over the authenticated request.
    Predicate(Arc<dyn Fn(&Request) -> bool + Send + Sync>),
}

impl std::fmt::Debug for AccessPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessPolicy::Public => write!(f, "Public"),
            AccessPolicy::RoleOrCapability(s) => write!(f, "RoleOrCapability({s})"),
            AccessPolicy::Predicate(_) => write!(f, "Predicate"),
        }
    }
}

/// Authenticated caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub id: i64,
    pub name: String,
    pub role: String,
}

/// Bearer token claims.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub user: Identity,
}

/// Result of a successful credential check.
#[derive(Debug, Clone)]
pub struct Session {
    pub identity: Identity,
    /// Row id of the recorded login.
    pub reference: i64,
    /// Single-purpose token issued alongside the login.
    pub task_token: String,
}

const TOKEN_RETRIES: usize = 5;
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Salted password digest, hex-encoded.
pub fn salted_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Parse a relative lifetime such as `+1 day` or `now +2 hours`.
pub fn parse_lifetime(spec: &str) -> Option<Duration> {
    let trimmed = spec
        .trim()
        .strip_prefix("now")
        .unwrap_or(spec.trim())
        .trim()
        .strip_prefix('+')?
        .trim();
    let (amount, unit) = trimmed.split_once(' ')?;
    let amount: i64 = amount.parse().ok()?;
    let unit = unit.trim().trim_end_matches('s');
    match unit {
        "second" => Some(Duration::seconds(amount)),
        "minute" => Some(Duration::minutes(amount)),
        "hour" => Some(Duration::hours(amount)),
        "day" => Some(Duration::days(amount)),
        "week" => Some(Duration::weeks(amount)),
        _ => None,
    }
}

fn datetime_in(duration: Duration) -> String {
    (Utc::now() + duration).format(DATETIME_FORMAT).to_string()
}

fn datetime_now() -> String {
    Utc::now().format(DATETIME_FORMAT).to_string()
}

/// Credential and token authority.
pub struct Gatekeeper {
    config: Arc<ApiConfig>,
    store: Arc<dyn DataStore>,
    tables: TableNames,
}

impl Gatekeeper {
    pub fn new(config: Arc<ApiConfig>, store: Arc<dyn DataStore>) -> Self {
        let tables = TableNames::new(config.table_prefix.clone());
        Self {
            config,
            store,
            tables,
        }
    }

    /// Verify a username/password pair.
    ///
    /// The bootstrap admin is checked first and never touches the store.
    /// `Ok(None)` means the credentials are wrong; `Err` is reserved for
    /// store failures.
    pub fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<Session>, ApiError> {
        if !self.config.admin_username.is_empty()
            && username == self.config.admin_username
            && password == self.config.admin_password
        {
            info!(user = %username, "bootstrap admin login");
            return Ok(Some(self.open_session(Identity {
                id: 0,
                name: "Administrator".to_string(),
                role: "admin".to_string(),
            })?));
        }

        let hashed = salted_password(&self.config.password.salt, password);
        let statement = prepare(
            &format!(
                "SELECT id, name, role FROM {} \
                 WHERE email = %s AND password = %s AND status = 'active'",
                self.tables.accounts()
            ),
            &[json!(username), json!(hashed)],
        );
        let row = self.store.get_row(&statement).map_err(store_fault)?;
        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };
        let identity = Identity {
            id: row.get("id").and_then(Value::as_i64).unwrap_or(0),
            name: row
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            role: row
                .get("role")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        };
        Ok(Some(self.open_session(identity)?))
    }

    /// Record the login and issue the session's task token.
    fn open_session(&self, identity: Identity) -> Result<Session, ApiError> {
        let reference = self
            .store
            .insert(
                &self.tables.sessions(),
                &[
                    ("account_id", json!(identity.id)),
                    ("created", json!(datetime_now())),
                ],
            )
            .map_err(store_fault)?;
        let task_token =
            self.create_user_token(identity.id, "downloads", &self.config.jwt_lifetime)?;
        Ok(Session {
            identity,
            reference,
            task_token,
        })
    }

    /// Mint a bearer token for the identity.
    pub fn create_jwt(&self, identity: &Identity) -> Result<String, ApiError> {
        if self.config.jwt_secret.is_empty() {
            return Err(ApiError::Credential(
                "The token secret is not configured.".to_string(),
            ));
        }
        let lifetime = parse_lifetime(&self.config.jwt_lifetime).ok_or_else(|| {
            ApiError::Credential(format!(
                "Unparsable token lifetime `{}`.",
                self.config.jwt_lifetime
            ))
        })?;
        let now = Utc::now();
        let claims = Claims {
            iat: now.timestamp(),
            exp: (now + lifetime).timestamp(),
            iss: self.config.domain.clone(),
            user: identity.clone(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| ApiError::Credential(format!("Token creation failed: {e}.")))
    }

    /// Verify the Authorization header and return the embedded identity.
    pub fn authorize(&self, authorization: &str) -> Result<Identity, ApiError> {
        let token = authorization
            .strip_prefix("Bearer ")
            .or_else(|| authorization.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ApiError::Token {
                kind: TokenErrorKind::Malformed,
                message: "The authorization header does not carry a bearer token.".to_string(),
            })?;
        if self.config.jwt_secret.is_empty() {
            return Err(ApiError::Credential(
                "The token secret is not configured.".to_string(),
            ));
        }
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);
        validation.leeway = 0;
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|err| {
            let kind = match err.kind() {
                ErrorKind::ImmatureSignature => TokenErrorKind::BeforeValid,
                ErrorKind::ExpiredSignature => TokenErrorKind::Expired,
                ErrorKind::InvalidSignature => TokenErrorKind::BadSignature,
                ErrorKind::Base64(_) | ErrorKind::Utf8(_) | ErrorKind::Json(_) => {
                    TokenErrorKind::Unreadable
                }
                ErrorKind::InvalidToken => TokenErrorKind::Malformed,
                _ => TokenErrorKind::Other,
            };
            ApiError::Token {
                kind,
                message: format!("Token verification failed: {err}."),
            }
        })?;
        Ok(data.claims.user)
    }

    /// Role/capability gate.
    ///
    /// The admin role always passes. Any other role must be declared in the
    /// configuration; a role granted the `*` wildcard passes everything,
    /// otherwise the requested access name must equal the role or appear in
    /// its capability list.
    pub fn user_can_access(&self, identity: &Identity, access: &str) -> bool {
        if identity.role == "admin" {
            return true;
        }
        let grant = match self.config.roles.get(&identity.role) {
            Some(grant) => grant,
            None => {
                warn!(role = %identity.role, "role is not declared in the configuration");
                return false;
            }
        };
        if access == identity.role {
            return true;
        }
        match grant {
            Capabilities::Wildcard(w) if w == "*" => true,
            Capabilities::Wildcard(w) => {
                warn!(role = %identity.role, grant = %w, "invalid capability grant");
                false
            }
            Capabilities::List(caps) => caps.iter().any(|c| c == access),
        }
    }

    /// Issue a single-purpose token bound to an account and task, expiring
    /// after the given relative lifetime (e.g. `+1 day`).
    ///
    /// Expired tokens are swept first. Collisions on the token column are
    /// retried a few times before giving up.
    pub fn create_user_token(
        &self,
        account_id: i64,
        task: &str,
        lifetime: &str,
    ) -> Result<String, ApiError> {
        self.sweep_expired_tokens()?;
        let lifetime = parse_lifetime(lifetime).ok_or_else(|| {
            ApiError::Credential(format!("Unparsable token lifetime `{lifetime}`."))
        })?;
        for _ in 0..TOKEN_RETRIES {
            let token = Uuid::new_v4().to_string();
            let result = self.store.insert(
                &self.tables.tokens(),
                &[
                    ("account_id", json!(account_id)),
                    ("token", json!(token)),
                    ("task", json!(task)),
                    ("expiration", json!(datetime_in(lifetime))),
                ],
            );
            match result {
                Ok(_) => return Ok(token),
                Err(StoreError::Duplicate(_)) => continue,
                Err(err) => return Err(store_fault(err)),
            }
        }
        Err(ApiError::UserToken)
    }

    /// Resolve a single-purpose token to its account id. Expired tokens are
    /// swept first, so a stale token resolves to nothing.
    pub fn resolve_user_token(&self, token: &str, task: &str) -> Result<Option<i64>, ApiError> {
        self.sweep_expired_tokens()?;
        let statement = prepare(
            &format!(
                "SELECT account_id FROM {} WHERE token = %s AND task = %s",
                self.tables.tokens()
            ),
            &[json!(token), json!(task)],
        );
        let value = self.store.get_var(&statement).map_err(store_fault)?;
        Ok(value.and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }))
    }

    /// Remove a consumed token.
    pub fn delete_user_token(&self, token: &str) -> Result<(), ApiError> {
        let clause = prepare("token = %s", &[json!(token)]);
        self.store
            .delete(&self.tables.tokens(), &clause)
            .map_err(store_fault)?;
        Ok(())
    }

    fn sweep_expired_tokens(&self) -> Result<(), ApiError> {
        let clause = prepare("expiration <= %s", &[json!(datetime_now())]);
        self.store
            .delete(&self.tables.tokens(), &clause)
            .map_err(store_fault)?;
        Ok(())
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn tables(&self) -> &TableNames {
        &self.tables
    }
}

fn store_fault(err: StoreError) -> ApiError {
    ApiError::Credential(format!("Data store failure: {err}."))
}
