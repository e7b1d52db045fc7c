//! restgate: a declarative request-routing and validation engine for JSON
//! REST APIs.
//!
//! The engine is transport-agnostic. A host parses the incoming HTTP
//! request however it likes and hands method, path, query, headers and body
//! to [`Dispatcher::dispatch`]; it gets back a status code, headers and a
//! JSON body. Everything in between is driven by data:
//!
//! - **Routes** are declared per namespace with typed `:name` placeholders
//!   and compiled to anchored regexes ([`router`]).
//! - **Parameters** are declared once with a type, location, flags and an
//!   ordered list of validation steps; raw input from path, query and body
//!   is merged, validated and cast before a handler ever sees it
//!   ([`schema`], [`request`], [`validation`]).
//! - **Dependencies** between parameters (at least one of, exactly one of,
//!   all or none, ...) run after field validation ([`dependency`]).
//! - **Access** is gated by a JWT bearer token and a role/capability map;
//!   credentials, token minting and single-purpose user tokens live in the
//!   [`security::Gatekeeper`].
//!
//! Persistence and outbound mail stay on the host's side of the
//! [`store::DataStore`] and [`notifier::Notifier`] traits. The bundled
//! [`endpoints::account`] namespace covers login and password self-service
//! on top of those traits.
//!
//! # Example
//!
//! ```no_run
//! use restgate::{AccessPolicy, Dispatcher, EndpointSpec, Namespace, ParamType, ParameterSpec};
//! use restgate::{ApiConfig, ApiResponse, NullNotifier};
//! use http::Method;
//! use std::sync::Arc;
//!
//! # fn store() -> Arc<dyn restgate::DataStore> { unimplemented!() }
//! let config = Arc::new(ApiConfig::default());
//! let mut api = Dispatcher::new(config, store(), Arc::new(NullNotifier));
//!
//! api.register_handler(
//!     "asset.folder",
//!     Arc::new(|req, _ctx| {
//!         Ok(ApiResponse::ok(serde_json::json!({
//!             "success": true,
//!             "folder": req.param("id"),
//!         })))
//!     }),
//! );
//! api.mount(
//!     Namespace::new("asset").route(
//!         "folder/:id",
//!         vec![(
//!             Method::GET,
//!             EndpointSpec::new("folder", "asset.folder")
//!                 .access(AccessPolicy::RoleOrCapability("read".into()))
//!                 .param(
//!                     "id",
//!                     ParameterSpec::new(ParamType::Integer).required(),
//!                 ),
//!         )],
//!     ),
//! );
//! ```

pub mod config;
pub mod dependency;
pub mod dispatcher;
pub mod endpoints;
pub mod error;
pub mod logfile;
pub mod notifier;
pub mod request;
pub mod response;
pub mod router;
pub mod schema;
pub mod security;
pub mod store;
pub mod validation;

pub use config::{ApiConfig, Capabilities, PasswordPolicy};
pub use dependency::{DependencyRule, InvalidDependencyRecord};
pub use dispatcher::{Context, Dispatcher, Handler};
pub use error::{ApiError, TokenErrorKind};
pub use logfile::{LogEntry, LogLevel, RequestLog};
pub use notifier::{Notifier, NullNotifier};
pub use request::{InvalidParameterRecord, Request};
pub use response::ApiResponse;
pub use router::{MatchOutcome, Namespace, RouteRegistry};
pub use schema::{
    EndpointDescriptor, EndpointSpec, ParamLocation, ParameterSchema, ParameterSpec,
    ValidationStep,
};
pub use security::{AccessPolicy, Claims, Gatekeeper, Identity, Session};
pub use store::{DataStore, Row, StoreError, TableNames};
pub use validation::ParamType;
