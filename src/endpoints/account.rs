//! Account namespace: login, password recovery and password change.

use crate::dispatcher::{Context, Dispatcher};
use crate::error::ApiError;
use crate::logfile::LogLevel;
use crate::request::Request;
use crate::response::ApiResponse;
use crate::router::Namespace;
use crate::schema::{EndpointSpec, ParamLocation, ParameterSpec};
use crate::security::password::validate_password;
use crate::security::salted_password;
use crate::store::{prepare, Row};
use crate::validation::ParamType;
use http::Method;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

const RECOVERY_TASK: &str = "password-recovery";
const RECOVERY_LIFETIME: &str = "+1 day";

/// Route declarations of the account namespace.
pub fn namespace() -> Namespace {
    Namespace::new("account")
        .describe("Authentication and account self-service.")
        .route(
            "login",
            vec![(
                Method::POST,
                EndpointSpec::new("login", "account.login")
                    .describe("Verify credentials and issue a bearer token.")
                    .param(
                        "username",
                        ParameterSpec::new(ParamType::String)
                            .location(ParamLocation::Body)
                            .required()
                            .describe("Account email address."),
                    )
                    .param(
                        "password",
                        ParameterSpec::new(ParamType::String)
                            .location(ParamLocation::Body)
                            .required(),
                    ),
            )],
        )
        .route(
            "password/recovery",
            vec![(
                Method::POST,
                EndpointSpec::new("password_recovery", "account.password_recovery")
                    .describe("Send a password recovery link.")
                    .param(
                        "email",
                        ParameterSpec::new(ParamType::String)
                            .location(ParamLocation::Body)
                            .required()
                            .rules(&["email"]),
                    ),
            )],
        )
        .route(
            "password/requirements",
            vec![(
                Method::GET,
                EndpointSpec::new("password_requirements", "account.password_requirements")
                    .describe("The active password policy thresholds."),
            )],
        )
        .route(
            "password/set",
            vec![(
                Method::POST,
                EndpointSpec::new("password_set", "account.password_set")
                    .describe("Set a new password using a recovery token.")
                    .param(
                        "token",
                        ParameterSpec::new(ParamType::String)
                            .location(ParamLocation::Body)
                            .required(),
                    )
                    .param(
                        "password",
                        ParameterSpec::new(ParamType::String)
                            .location(ParamLocation::Body)
                            .required(),
                    ),
            )],
        )
}

/// Register the handlers and mount the namespace.
pub fn register(dispatcher: &mut Dispatcher) {
    dispatcher.register_handler("account.login", Arc::new(login));
    dispatcher.register_handler("account.password_recovery", Arc::new(password_recovery));
    dispatcher.register_handler(
        "account.password_requirements",
        Arc::new(password_requirements),
    );
    dispatcher.register_handler("account.password_set", Arc::new(password_set));
    dispatcher.mount(namespace());
}

fn login(request: &mut Request, context: &Context) -> Result<ApiResponse, ApiError> {
    let username = request.param_str("username").to_string();
    let password = request.param_str("password").to_string();
    let session = match context.gatekeeper.authenticate(&username, &password)? {
        Some(session) => session,
        None => {
            request.log.entry(
                LogLevel::Warning,
                &request.log_area(),
                format!("failed login for `{username}`"),
            );
            return Err(ApiError::endpoint(
                "invalid_login",
                "The username or password is incorrect.",
            ));
        }
    };
    let token = context.gatekeeper.create_jwt(&session.identity)?;
    request.log.entry(
        LogLevel::Success,
        &request.log_area(),
        format!("login for `{username}`"),
    );
    Ok(ApiResponse::ok(json!({
        "success": true,
        "token": token,
        "user": session.identity,
        "reference": session.reference,
        "download_token": session.task_token,
    })))
}

fn password_recovery(request: &mut Request, context: &Context) -> Result<ApiResponse, ApiError> {
    let email = request.param_str("email").to_string();
    // The response never reveals whether the address exists.
    let acknowledged = ApiResponse::ok(json!({
        "success": true,
        "message": "If the address is registered, a recovery link has been sent.",
    }));

    let account = match find_account_by_email(context, &email)? {
        Some(account) => account,
        None => {
            request.log.entry(
                LogLevel::Notice,
                &request.log_area(),
                format!("recovery requested for unknown address `{email}`"),
            );
            return Ok(acknowledged);
        }
    };

    let id = account.get("id").and_then(Value::as_i64).unwrap_or(0);
    let name = account
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let token = context
        .gatekeeper
        .create_user_token(id, RECOVERY_TASK, RECOVERY_LIFETIME)?;
    let link = format!(
        "{}{}",
        context.config.domain.trim_end_matches('/'),
        context
            .config
            .password
            .reset_route
            .replace(":token", &token)
    );

    let mut substitutions = HashMap::new();
    substitutions.insert("token".to_string(), token);
    substitutions.insert("link".to_string(), link);
    substitutions.insert("name".to_string(), name.clone());
    if !context
        .notifier
        .send(RECOVERY_TASK, &substitutions, &name, &email)
    {
        request.log.entry(
            LogLevel::Error,
            &request.log_area(),
            format!("recovery notification for `{email}` was not accepted"),
        );
    }
    Ok(acknowledged)
}

fn password_requirements(
    _request: &mut Request,
    context: &Context,
) -> Result<ApiResponse, ApiError> {
    let policy = &context.config.password;
    Ok(ApiResponse::ok(json!({
        "success": true,
        "requirements": {
            "length": policy.length,
            "uppercase": policy.uppercase,
            "lowercase": policy.lowercase,
            "numbers": policy.numbers,
            "special": policy.special,
            "special_chars": policy.special_chars,
            "reuse": policy.reuse,
        },
    })))
}

fn password_set(request: &mut Request, context: &Context) -> Result<ApiResponse, ApiError> {
    let token = request.param_str("token").to_string();
    let password = request.param_str("password").to_string();

    let account_id = context
        .gatekeeper
        .resolve_user_token(&token, RECOVERY_TASK)?
        .ok_or_else(|| {
            ApiError::endpoint_with_status(
                "invalid_token",
                "The recovery token is unknown or has expired.",
                400,
            )
        })?;

    let tables = context.gatekeeper.tables();
    let statement = prepare(
        &format!(
            "SELECT id, name, email FROM {} WHERE id = %d AND status = 'active'",
            tables.accounts()
        ),
        &[json!(account_id)],
    );
    let account = context
        .store
        .get_row(&statement)
        .map_err(|e| ApiError::Credential(format!("Data store failure: {e}.")))?
        .ok_or_else(|| {
            ApiError::endpoint_with_status(
                "invalid_token_user",
                "The account behind the recovery token no longer exists.",
                400,
            )
        })?;

    let hashed = salted_password(&context.config.password.salt, &password);
    let history = prepare(
        &format!(
            "SELECT id FROM {} WHERE account_id = %d AND password = %s",
            tables.passwords()
        ),
        &[json!(account_id), json!(hashed)],
    );
    let reused = context
        .store
        .get_var(&history)
        .map_err(|e| ApiError::Credential(format!("Data store failure: {e}.")))?
        .is_some();

    let report = validate_password(&context.config.password, &password, reused);
    if !report.valid {
        return Err(ApiError::endpoint_with_data(
            "invalid_password",
            "The password does not meet the requirements.",
            400,
            json!({ "password_validation": report }),
        ));
    }

    context
        .store
        .update(
            &tables.accounts(),
            &[("password", json!(hashed))],
            &prepare("id = %d", &[json!(account_id)]),
        )
        .map_err(|e| ApiError::Credential(format!("Data store failure: {e}.")))?;
    context.gatekeeper.delete_user_token(&token)?;
    context
        .store
        .insert(
            &tables.passwords(),
            &[
                ("account_id", json!(account_id)),
                ("password", json!(hashed)),
            ],
        )
        .map_err(|e| ApiError::Credential(format!("Data store failure: {e}.")))?;

    let name = account
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let email = account
        .get("email")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let mut substitutions = HashMap::new();
    substitutions.insert("name".to_string(), name.to_string());
    if !context
        .notifier
        .send("password-changed", &substitutions, name, email)
    {
        request.log.entry(
            LogLevel::Error,
            &request.log_area(),
            format!("password change notification for `{email}` was not accepted"),
        );
    }
    request.log.entry(
        LogLevel::Success,
        &request.log_area(),
        format!("password changed for account {account_id}"),
    );
    Ok(ApiResponse::ok(json!({ "success": true })))
}

fn find_account_by_email(context: &Context, email: &str) -> Result<Option<Row>, ApiError> {
    let statement = prepare(
        &format!(
            "SELECT id, name, email FROM {} WHERE email = %s AND status = 'active'",
            context.gatekeeper.tables().accounts()
        ),
        &[json!(email)],
    );
    context
        .store
        .get_row(&statement)
        .map_err(|e| ApiError::Credential(format!("Data store failure: {e}.")))
}
