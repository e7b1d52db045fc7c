//! End-to-end dispatch: routing, the access gate, validation and response
//! assembly through the public `Dispatcher` surface.

mod common;

use common::{test_config, MemoryStore, RecordingNotifier};
use http::Method;
use restgate::{
    AccessPolicy, ApiConfig, ApiResponse, Dispatcher, EndpointSpec, Namespace, ParamLocation,
    ParamType, ParameterSpec,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

fn build_dispatcher(config: ApiConfig) -> Dispatcher {
    let mut dispatcher = Dispatcher::new(
        Arc::new(config),
        Arc::new(MemoryStore::new()),
        Arc::new(RecordingNotifier::new()),
    );

    dispatcher.register_handler(
        "asset.folder",
        Arc::new(|req, _ctx| {
            Ok(ApiResponse::ok(json!({
                "success": true,
                "id": req.param("id"),
                "truncate": req.param("truncate"),
            })))
        }),
    );
    dispatcher.register_handler(
        "asset.create",
        Arc::new(|req, _ctx| {
            Ok(ApiResponse::ok(json!({
                "success": true,
                "name": req.param("name"),
            })))
        }),
    );
    dispatcher.register_handler(
        "asset.broken",
        Arc::new(|_req, _ctx| panic!("handler exploded")),
    );

    dispatcher.mount(
        Namespace::new("asset")
            .describe("Asset management.")
            .route(
                "folder/:id/:truncate",
                vec![(
                    Method::GET,
                    EndpointSpec::new("folder", "asset.folder")
                        .access(AccessPolicy::RoleOrCapability("read".to_string()))
                        .param(
                            "id",
                            ParameterSpec::new(ParamType::Integer)
                                .location(ParamLocation::Variable)
                                .required(),
                        )
                        .param(
                            "truncate",
                            ParameterSpec::new(ParamType::Bool)
                                .location(ParamLocation::Variable)
                                .default_value(json!(false)),
                        ),
                )],
            )
            .route(
                "create",
                vec![(
                    Method::POST,
                    EndpointSpec::new("create", "asset.create")
                        .access(AccessPolicy::RoleOrCapability("write".to_string()))
                        .param(
                            "name",
                            ParameterSpec::new(ParamType::String)
                                .location(ParamLocation::Body)
                                .required(),
                        ),
                )],
            )
            .route(
                "broken",
                vec![(
                    Method::GET,
                    EndpointSpec::new("broken", "asset.broken"),
                )],
            )
            .route(
                "orphan",
                vec![(
                    Method::GET,
                    EndpointSpec::new("orphan", "asset.nonexistent_handler"),
                )],
            ),
    );
    dispatcher
}

fn bearer(dispatcher: &Dispatcher, role: &str) -> HashMap<String, String> {
    let identity = restgate::Identity {
        id: 9,
        name: "Test User".to_string(),
        role: role.to_string(),
    };
    let token = dispatcher.gatekeeper().create_jwt(&identity).unwrap();
    let mut headers = HashMap::new();
    headers.insert("Authorization".to_string(), format!("Bearer {token}"));
    headers
}

fn get(dispatcher: &Dispatcher, path: &str, headers: HashMap<String, String>) -> ApiResponse {
    dispatcher.dispatch(Method::GET, path, "", headers, None)
}

#[test]
fn unmatched_path_is_route_not_found() {
    let dispatcher = build_dispatcher(test_config());
    let response = get(&dispatcher, "/rest-api/no/such/route", HashMap::new());
    assert_eq!(response.status, 404);
    assert_eq!(response.body["code"], json!("route_not_found"));
}

#[test]
fn api_root_returns_the_schema() {
    let dispatcher = build_dispatcher(test_config());
    let response = get(&dispatcher, "/rest-api", HashMap::new());
    assert_eq!(response.status, 200);
    assert_eq!(response.body["name"], json!("Test API"));
    assert_eq!(response.body["url"], json!("https://api.test/rest-api"));
    assert!(response.body["namespaces"].is_array());
}

#[test]
fn namespace_root_returns_its_schema() {
    let dispatcher = build_dispatcher(test_config());
    let response = get(&dispatcher, "/rest-api/asset", HashMap::new());
    assert_eq!(response.status, 200);
    assert_eq!(response.body["namespace"], json!("asset"));
}

#[test]
fn preflight_answers_without_touching_the_pipeline() {
    let dispatcher = build_dispatcher(test_config());
    let response = dispatcher.dispatch(
        Method::OPTIONS,
        "/rest-api/asset/create",
        "",
        HashMap::new(),
        None,
    );
    assert_eq!(response.status, 200);
    assert_eq!(response.header("Access-Control-Max-Age"), Some("60"));
    assert_eq!(response.body["endpoint"], json!("asset/create"));
}

#[test]
fn typed_path_captures_reach_the_handler_validated() {
    let dispatcher = build_dispatcher(test_config());
    let response = get(
        &dispatcher,
        "/rest-api/asset/folder/42/1",
        bearer(&dispatcher, "viewer"),
    );
    assert_eq!(response.status, 200, "{:?}", response.body);
    assert_eq!(response.body["id"], json!(42));
    assert_eq!(response.body["truncate"], json!(true));
}

#[test]
fn omitted_optional_capture_takes_the_default() {
    let dispatcher = build_dispatcher(test_config());
    let response = get(
        &dispatcher,
        "/rest-api/asset/folder/42",
        bearer(&dispatcher, "viewer"),
    );
    assert_eq!(response.status, 200, "{:?}", response.body);
    assert_eq!(response.body["truncate"], json!(false));
}

#[test]
fn missing_token_fails_before_the_handler() {
    let dispatcher = build_dispatcher(test_config());
    let response = get(&dispatcher, "/rest-api/asset/folder/42/1", HashMap::new());
    assert_eq!(response.status, 401);
    assert_eq!(response.body["code"], json!("jwt_malformed"));
}

#[test]
fn capability_mismatch_is_access_denied() {
    let dispatcher = build_dispatcher(test_config());
    // Viewer only holds `read`; the create endpoint demands `write`.
    let response = dispatcher.dispatch(
        Method::POST,
        "/rest-api/asset/create",
        "",
        bearer(&dispatcher, "viewer"),
        Some(r#"{"name": "Q3 report"}"#),
    );
    assert_eq!(response.status, 401);
    assert_eq!(response.body["code"], json!("access_denied"));

    let response = dispatcher.dispatch(
        Method::POST,
        "/rest-api/asset/create",
        "",
        bearer(&dispatcher, "editor"),
        Some(r#"{"name": "Q3 report"}"#),
    );
    assert_eq!(response.status, 200, "{:?}", response.body);
    assert_eq!(response.body["name"], json!("Q3 report"));
}

#[test]
fn invalid_parameters_are_aggregated_into_a_400() {
    let dispatcher = build_dispatcher(test_config());
    let response = dispatcher.dispatch(
        Method::POST,
        "/rest-api/asset/create",
        "",
        bearer(&dispatcher, "editor"),
        Some(r#"{"name": ""}"#),
    );
    assert_eq!(response.status, 400);
    assert_eq!(response.body["code"], json!("invalid_parameter"));
    assert_eq!(response.body["data"][0]["error_code"], json!("required_parameter"));
}

#[test]
fn body_overrides_query_for_the_same_key() {
    let dispatcher = build_dispatcher(test_config());
    let response = dispatcher.dispatch(
        Method::POST,
        "/rest-api/asset/create",
        "name=from-query",
        bearer(&dispatcher, "editor"),
        Some(r#"{"name": "from-body"}"#),
    );
    assert_eq!(response.status, 200, "{:?}", response.body);
    assert_eq!(response.body["name"], json!("from-body"));
}

#[test]
fn handler_panics_become_internal_errors() {
    let dispatcher = build_dispatcher(test_config());
    let response = get(
        &dispatcher,
        "/rest-api/asset/broken",
        HashMap::new(),
    );
    assert_eq!(response.status, 500);
    assert_eq!(response.body["code"], json!("internal_error"));
    // Panic detail stays out of non-debug responses.
    assert!(response.body.get("data").is_none());
}

#[test]
fn endpoints_without_a_registered_handler_are_not_mounted() {
    let dispatcher = build_dispatcher(test_config());
    let response = get(&dispatcher, "/rest-api/asset/orphan", HashMap::new());
    assert_eq!(response.status, 404);
    assert_eq!(response.body["code"], json!("route_not_found"));
}

#[test]
fn default_headers_are_on_every_response() {
    let dispatcher = build_dispatcher(test_config());
    let response = get(&dispatcher, "/rest-api/no/such/route", HashMap::new());
    assert_eq!(response.header("Access-Control-Allow-Origin"), Some("*"));
    assert_eq!(response.header("X-Robots-Tag"), Some("noindex"));
    assert_eq!(
        response.header("Content-Type"),
        Some("application/json; charset=utf-8")
    );
}

#[test]
fn debug_configuration_appends_the_request_log() {
    let mut config = test_config();
    config.debug_response_log = true;
    let dispatcher = build_dispatcher(config);
    let response = get(&dispatcher, "/rest-api/no/such/route", HashMap::new());
    let log = response.body["log"].as_array().expect("log must be present");
    assert!(log
        .iter()
        .any(|e| e.as_str().unwrap_or_default().starts_with("ERROR:")));
}

#[test]
fn query_values_are_validated_like_any_other_source() {
    let dispatcher = build_dispatcher(test_config());
    let response = dispatcher.dispatch(
        Method::POST,
        "/rest-api/asset/create",
        "name=hello%20world",
        bearer(&dispatcher, "editor"),
        None,
    );
    assert_eq!(response.status, 200, "{:?}", response.body);
    assert_eq!(response.body["name"], json!("hello world"));
}
