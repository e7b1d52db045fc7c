//! Request dispatch: the single entry point hosts call per request.
//!
//! `dispatch` walks the full pipeline: route extraction, preflight
//! handling, matching, the access gate, raw-parameter merging, validation,
//! the handler call and response assembly. Handler panics are caught at
//! this boundary and turned into an internal error response, so one bad
//! endpoint cannot take the host down.

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::logfile::LogLevel;
use crate::notifier::Notifier;
use crate::request::Request;
use crate::response::ApiResponse;
use crate::router::{CaptureVec, MatchOutcome, Namespace, RouteRegistry};
use crate::schema::EndpointDescriptor;
use crate::security::{AccessPolicy, Gatekeeper, Identity};
use crate::store::DataStore;
use chrono::Utc;
use http::Method;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared services handed to every handler.
pub struct Context {
    pub config: Arc<ApiConfig>,
    pub store: Arc<dyn DataStore>,
    pub notifier: Arc<dyn Notifier>,
    pub gatekeeper: Arc<Gatekeeper>,
    /// The authenticated caller, when the endpoint is not public.
    pub identity: Option<Identity>,
}

/// Endpoint handler. Registered under a name; endpoints reference handlers
/// by that name so route declarations stay data-only.
pub type Handler =
    Arc<dyn Fn(&mut Request, &Context) -> Result<ApiResponse, ApiError> + Send + Sync>;

/// The engine core: route table plus handler registry.
pub struct Dispatcher {
    config: Arc<ApiConfig>,
    store: Arc<dyn DataStore>,
    notifier: Arc<dyn Notifier>,
    gatekeeper: Arc<Gatekeeper>,
    registry: RouteRegistry,
    handlers: HashMap<String, Handler>,
}

impl Dispatcher {
    pub fn new(
        config: Arc<ApiConfig>,
        store: Arc<dyn DataStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let gatekeeper = Arc::new(Gatekeeper::new(config.clone(), store.clone()));
        Self {
            config,
            store,
            notifier,
            gatekeeper,
            registry: RouteRegistry::new(),
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under its lookup name.
    pub fn register_handler(&mut self, name: impl Into<String>, handler: Handler) {
        let name = name.into();
        if self.handlers.insert(name.clone(), handler).is_some() {
            warn!(handler = %name, "handler was registered twice, the last one wins");
        }
    }

    /// Mount a namespace. Endpoints whose handler is not registered yet are
    /// dropped and logged, so handlers must be registered before mounting.
    pub fn mount(&mut self, mut namespace: Namespace) {
        let handlers = &self.handlers;
        namespace.retain_endpoints(|endpoint| {
            let known = handlers.contains_key(&endpoint.handler);
            if !known {
                warn!(
                    endpoint = %endpoint.name,
                    handler = %endpoint.handler,
                    "endpoint dropped, its handler is not registered"
                );
            }
            known
        });
        info!(namespace = %namespace.name(), "namespace mounted");
        self.registry.register(namespace);
    }

    pub fn gatekeeper(&self) -> &Arc<Gatekeeper> {
        &self.gatekeeper
    }

    /// Run one request through the pipeline.
    ///
    /// `path` is the full request path including the configured root,
    /// `query` the raw query string without the leading `?` and `body` the
    /// raw request body, if any.
    pub fn dispatch(
        &self,
        method: Method,
        path: &str,
        query: &str,
        headers: HashMap<String, String>,
        body: Option<&str>,
    ) -> ApiResponse {
        let route = self.extract_route(path);

        // Preflight answers are static and skip the whole pipeline.
        if method == Method::OPTIONS {
            let mut response = ApiResponse::ok(json!({
                "name": self.config.name,
                "url": self.base_url(),
                "endpoint": route,
                "datetime": Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            }));
            response.apply_default_headers(&self.config, &method);
            return response;
        }

        let mut request = Request::new(method.clone(), route.clone(), headers, HashMap::new());

        let result = match self.registry.find(&method, &route) {
            MatchOutcome::ApiRoot => Ok(ApiResponse::ok(self.registry.to_schema(
                &self.config.name,
                &self.config.description,
                &self.base_url(),
            ))),
            MatchOutcome::NamespaceRoot(ns) => Ok(ApiResponse::ok(ns.to_schema())),
            MatchOutcome::None => Err(ApiError::RouteNotFound),
            MatchOutcome::Endpoint {
                descriptor,
                captures,
            } => self.run_endpoint(&mut request, descriptor, captures, query, body),
        };

        let mut response = match result {
            Ok(response) => response,
            Err(err) => {
                request.log.entry(
                    LogLevel::Error,
                    &request.log_area(),
                    format!("{} ({})", err, err.code()),
                );
                ApiResponse::from_error(&err, self.config.debug_response_log)
            }
        };
        response.apply_default_headers(&self.config, &method);
        if self.config.debug_response_log {
            response.append_log(&request.log);
        }
        response
    }

    fn run_endpoint(
        &self,
        request: &mut Request,
        descriptor: &EndpointDescriptor,
        captures: CaptureVec,
        query: &str,
        body: Option<&str>,
    ) -> Result<ApiResponse, ApiError> {
        self.merge_raw_params(request, captures, query, body);

        let identity = self.gate(request, descriptor)?;

        request.validate_params(descriptor)?;
        request.validate_dependencies(descriptor)?;

        let handler = self
            .handlers
            .get(&descriptor.handler)
            .cloned()
            .ok_or_else(|| ApiError::ControllerMisconfigured(descriptor.handler.clone()))?;

        let context = Context {
            config: self.config.clone(),
            store: self.store.clone(),
            notifier: self.notifier.clone(),
            gatekeeper: self.gatekeeper.clone(),
            identity,
        };

        // A panicking handler must not unwind into the host.
        let outcome = catch_unwind(AssertUnwindSafe(|| handler(request, &context)));
        match outcome {
            Ok(result) => result,
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(ApiError::Internal { detail })
            }
        }
    }

    /// Enforce the endpoint's access policy. Returns the caller identity
    /// for non-public endpoints.
    fn gate(
        &self,
        request: &Request,
        descriptor: &EndpointDescriptor,
    ) -> Result<Option<Identity>, ApiError> {
        match &descriptor.access {
            AccessPolicy::Public => Ok(None),
            AccessPolicy::RoleOrCapability(access) => {
                let header = request.header("authorization").unwrap_or_default();
                let identity = self.gatekeeper.authorize(header)?;
                if self.gatekeeper.user_can_access(&identity, access) {
                    Ok(Some(identity))
                } else {
                    Err(ApiError::AccessDenied)
                }
            }
            AccessPolicy::Predicate(check) => {
                let header = request.header("authorization").unwrap_or_default();
                let identity = self.gatekeeper.authorize(header)?;
                if check(request) {
                    Ok(Some(identity))
                } else {
                    Err(ApiError::AccessDenied)
                }
            }
        }
    }

    /// Merge the raw input sources into the request, later sources winning:
    /// path captures, then the query string, then the JSON body.
    fn merge_raw_params(
        &self,
        request: &mut Request,
        captures: CaptureVec,
        query: &str,
        body: Option<&str>,
    ) {
        for (name, value) in captures {
            let decoded = urlencoding::decode(&value)
                .map(|c| c.into_owned())
                .unwrap_or(value);
            request
                .raw_params
                .insert(name.to_lowercase(), Value::String(decoded));
        }
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            request
                .raw_params
                .insert(key.to_lowercase(), Value::String(value.into_owned()));
        }
        if let Some(body) = body.filter(|b| !b.trim().is_empty()) {
            match serde_json::from_str::<Value>(body) {
                Ok(Value::Object(map)) => {
                    for (key, value) in map {
                        request.raw_params.insert(key.to_lowercase(), value);
                    }
                }
                Ok(_) => {
                    let area = request.log_area();
                    request.log.entry(
                        LogLevel::Notice,
                        &area,
                        "request body is not a JSON object and was ignored",
                    );
                }
                Err(err) => {
                    let area = request.log_area();
                    request.log.entry(
                        LogLevel::Warning,
                        &area,
                        format!("request body is not valid JSON: {err}"),
                    );
                }
            }
        }
    }

    fn extract_route(&self, path: &str) -> String {
        let trimmed = path.trim_matches('/');
        let root = self.config.root.trim_matches('/');
        match trimmed.strip_prefix(root) {
            Some(rest) if rest.is_empty() => String::new(),
            Some(rest) if rest.starts_with('/') => rest.trim_matches('/').to_string(),
            _ => String::new(),
        }
    }

    fn base_url(&self) -> String {
        format!(
            "{}/{}",
            self.config.domain.trim_end_matches('/'),
            self.config.root.trim_matches('/')
        )
    }
}
