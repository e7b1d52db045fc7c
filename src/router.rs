//! Route table and path matcher.
//!
//! Routes are declared per namespace with `:name` placeholders and compiled
//! to anchored regexes at registration. A placeholder's character class is
//! derived from the declared type of the matching endpoint parameter, so an
//! integer path segment never even matches a non-numeric URL. Matching is
//! case-insensitive and tries, in order: the API root, each namespace root,
//! then every compiled route of the namespace whose name prefixes the path.

use crate::schema::{EndpointDescriptor, EndpointSpec};
use crate::validation::ParamType;
use http::Method;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use smallvec::SmallVec;
use tracing::warn;

/// Path captures; inline capacity covers typical routes without allocating.
pub type CaptureVec = SmallVec<[(String, String); 4]>;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^:([a-z0-9_-]+)$").unwrap()
});

/// Character class a placeholder matches, chosen by the parameter type.
fn capture_class(ty: ParamType) -> &'static str {
    match ty {
        ParamType::Integer => "[0-9]+",
        ParamType::Number => r"[0-9]+(?:\.[0-9]+)*",
        ParamType::Float => r"[0-9]+\.[0-9]+",
        ParamType::Bool => "0|1",
        _ => r"[a-z0-9\-_+]+",
    }
}

/// One compiled route: the regex, the placeholder names in capture order
/// and the endpoints it serves keyed by method.
pub struct CompiledRoute {
    /// Declared path relative to the API root, e.g. `asset/folder/:id`.
    pub path: String,
    pattern: Regex,
    param_names: Vec<String>,
    endpoints: Vec<(Method, EndpointDescriptor)>,
}

impl CompiledRoute {
    pub fn endpoint(&self, method: &Method) -> Option<&EndpointDescriptor> {
        self.endpoints
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, e)| e)
    }

    pub fn methods(&self) -> Vec<&Method> {
        self.endpoints.iter().map(|(m, _)| m).collect()
    }
}

/// Outcome of matching a request path.
pub enum MatchOutcome<'a> {
    /// The bare API root; answered with the API schema.
    ApiRoot,
    /// A namespace root; answered with the namespace schema.
    NamespaceRoot(&'a Namespace),
    /// A concrete endpoint with its path captures.
    Endpoint {
        descriptor: &'a EndpointDescriptor,
        captures: CaptureVec,
    },
    /// Nothing matched the path and method.
    None,
}

/// A group of routes sharing a path prefix.
pub struct Namespace {
    name: String,
    description: String,
    routes: Vec<CompiledRoute>,
}

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().trim_matches('/').to_lowercase(),
            description: String::new(),
            routes: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare a route under this namespace.
    ///
    /// `path` is relative to the namespace and must be non-empty; the
    /// namespace root itself always answers with the namespace schema, so
    /// an empty path could never be reached and is rejected with a log
    /// entry. Placeholders are written `:name` and take their character
    /// class and optionality from the matching parameter of the first
    /// endpoint that declares it. Only the final placeholder may be
    /// optional; an optional placeholder anywhere else would make the URL
    /// ambiguous, so it is forced required and logged.
    pub fn route(mut self, path: &str, endpoints: Vec<(Method, EndpointSpec)>) -> Self {
        let rel = path.trim_matches('/');
        if rel.is_empty() {
            warn!(
                namespace = %self.name,
                "empty route path is shadowed by the namespace root and was not registered"
            );
            return self;
        }
        let full = format!("{}/{}", self.name, rel);
        let compiled: Vec<(Method, EndpointDescriptor)> = endpoints
            .into_iter()
            .map(|(m, spec)| (m, spec.compile()))
            .collect();
        match compile_path(&full, &compiled) {
            Ok((pattern, param_names)) => self.routes.push(CompiledRoute {
                path: full,
                pattern,
                param_names,
                endpoints: compiled,
            }),
            Err(err) => warn!(path = %full, error = %err, "route was not registered"),
        }
        self
    }

    pub fn routes(&self) -> &[CompiledRoute] {
        &self.routes
    }

    /// Drop endpoints the predicate rejects; routes left without any
    /// endpoint are removed entirely.
    pub fn retain_endpoints<F>(&mut self, mut keep: F)
    where
        F: FnMut(&EndpointDescriptor) -> bool,
    {
        for route in &mut self.routes {
            route.endpoints.retain(|(_, e)| keep(e));
        }
        self.routes.retain(|r| !r.endpoints.is_empty());
    }

    /// Introspection view of the namespace.
    pub fn to_schema(&self) -> Value {
        let routes: Vec<Value> = self
            .routes
            .iter()
            .map(|r| {
                let endpoints: Vec<Value> = r
                    .endpoints
                    .iter()
                    .map(|(m, e)| {
                        let mut schema = e.to_schema();
                        if let Some(map) = schema.as_object_mut() {
                            map.insert("method".to_string(), json!(m.as_str()));
                        }
                        schema
                    })
                    .collect();
                json!({ "path": r.path, "endpoints": endpoints })
            })
            .collect();
        json!({
            "namespace": self.name,
            "description": self.description,
            "routes": routes,
        })
    }
}

fn compile_path(
    full_path: &str,
    endpoints: &[(Method, EndpointDescriptor)],
) -> Result<(Regex, Vec<String>), String> {
    let segments: Vec<&str> = full_path.split('/').collect();
    let last_placeholder = segments
        .iter()
        .rposition(|s| PLACEHOLDER.is_match(s));
    let mut pattern = String::from("(?i)^");
    let mut param_names = Vec::new();
    for (i, segment) in segments.iter().enumerate() {
        if let Some(caps) = PLACEHOLDER.captures(segment) {
            let name = crate::schema::sanitize_key(&caps[1]);
            let param = endpoints
                .iter()
                .find_map(|(_, e)| e.parameter(&name));
            let (class, mut optional) = match param {
                Some(p) => (capture_class(p.ty), !p.required),
                None => {
                    warn!(
                        path = %full_path,
                        placeholder = %name,
                        "placeholder has no declared parameter, matching as string"
                    );
                    (capture_class(ParamType::String), false)
                }
            };
            if optional && Some(i) != last_placeholder {
                warn!(
                    path = %full_path,
                    placeholder = %name,
                    "only the final placeholder may be optional, forcing required"
                );
                optional = false;
            }
            if optional {
                pattern.push_str(&format!("(?:/({class}))?"));
            } else {
                pattern.push_str(&format!("/({class})"));
            }
            param_names.push(name);
        } else {
            if i > 0 {
                pattern.push('/');
            }
            pattern.push_str(&regex::escape(segment));
        }
    }
    pattern.push('$');
    let regex = Regex::new(&pattern).map_err(|e| e.to_string())?;
    Ok((regex, param_names))
}

/// The full route table of an API.
#[derive(Default)]
pub struct RouteRegistry {
    namespaces: Vec<Namespace>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a namespace. A duplicate name is ignored and logged; the
    /// first registration wins.
    pub fn register(&mut self, namespace: Namespace) {
        if namespace.name.is_empty() {
            warn!("namespace with an empty name was not registered");
            return;
        }
        if self.namespaces.iter().any(|n| n.name == namespace.name) {
            warn!(namespace = %namespace.name, "duplicate namespace registration ignored");
            return;
        }
        self.namespaces.push(namespace);
    }

    pub fn namespaces(&self) -> &[Namespace] {
        &self.namespaces
    }

    /// Match a root-relative path (no leading slash) and method.
    pub fn find(&self, method: &Method, path: &str) -> MatchOutcome<'_> {
        if path.is_empty() {
            return MatchOutcome::ApiRoot;
        }
        for ns in &self.namespaces {
            if path.eq_ignore_ascii_case(&ns.name) {
                return MatchOutcome::NamespaceRoot(ns);
            }
        }
        let lowered = path.to_lowercase();
        for ns in &self.namespaces {
            let prefix = format!("{}/", ns.name);
            if !lowered.starts_with(&prefix) {
                continue;
            }
            for route in &ns.routes {
                let caps = match route.pattern.captures(path) {
                    Some(c) => c,
                    None => continue,
                };
                let descriptor = match route.endpoint(method) {
                    Some(d) => d,
                    None => continue,
                };
                let mut captures = CaptureVec::new();
                for (i, name) in route.param_names.iter().enumerate() {
                    if let Some(m) = caps.get(i + 1) {
                        captures.push((name.clone(), m.as_str().to_string()));
                    }
                }
                return MatchOutcome::Endpoint {
                    descriptor,
                    captures,
                };
            }
        }
        MatchOutcome::None
    }

    /// Introspection view of the whole API.
    pub fn to_schema(&self, name: &str, description: &str, url: &str) -> Value {
        let namespaces: Vec<Value> =
            self.namespaces.iter().map(Namespace::to_schema).collect();
        json!({
            "name": name,
            "description": description,
            "url": url,
            "namespaces": namespaces,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ParamLocation, ParameterSpec};

    fn asset_namespace() -> Namespace {
        Namespace::new("asset").route(
            "folder/:id/:truncate",
            vec![(
                Method::GET,
                EndpointSpec::new("folder", "asset.folder")
                    .param(
                        "id",
                        ParameterSpec::new(ParamType::Integer)
                            .location(ParamLocation::Variable)
                            .required(),
                    )
                    .param(
                        "truncate",
                        ParameterSpec::new(ParamType::Bool)
                            .location(ParamLocation::Variable),
                    ),
            )],
        )
    }

    #[test]
    fn typed_placeholders_constrain_the_match() {
        let mut registry = RouteRegistry::new();
        registry.register(asset_namespace());

        match registry.find(&Method::GET, "asset/folder/42/1") {
            MatchOutcome::Endpoint { captures, .. } => {
                assert_eq!(captures[0], ("id".to_string(), "42".to_string()));
                assert_eq!(captures[1], ("truncate".to_string(), "1".to_string()));
            }
            _ => panic!("expected endpoint match"),
        }
        // Non-numeric id never matches the integer class.
        assert!(matches!(
            registry.find(&Method::GET, "asset/folder/abc/1"),
            MatchOutcome::None
        ));
        // Bool class only admits 0 and 1.
        assert!(matches!(
            registry.find(&Method::GET, "asset/folder/42/2"),
            MatchOutcome::None
        ));
    }

    #[test]
    fn final_optional_placeholder_may_be_omitted() {
        let mut registry = RouteRegistry::new();
        registry.register(asset_namespace());
        match registry.find(&Method::GET, "asset/folder/42") {
            MatchOutcome::Endpoint { captures, .. } => {
                assert_eq!(captures.len(), 1);
            }
            _ => panic!("expected endpoint match"),
        }
    }

    #[test]
    fn method_restricts_the_match() {
        let mut registry = RouteRegistry::new();
        registry.register(asset_namespace());
        assert!(matches!(
            registry.find(&Method::POST, "asset/folder/42/1"),
            MatchOutcome::None
        ));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let mut registry = RouteRegistry::new();
        registry.register(asset_namespace());
        assert!(matches!(
            registry.find(&Method::GET, "Asset/Folder/42"),
            MatchOutcome::Endpoint { .. }
        ));
    }

    #[test]
    fn root_and_namespace_root() {
        let mut registry = RouteRegistry::new();
        registry.register(asset_namespace());
        assert!(matches!(registry.find(&Method::GET, ""), MatchOutcome::ApiRoot));
        assert!(matches!(
            registry.find(&Method::GET, "asset"),
            MatchOutcome::NamespaceRoot(_)
        ));
    }

    #[test]
    fn duplicate_namespace_is_ignored() {
        let mut registry = RouteRegistry::new();
        registry.register(asset_namespace());
        registry.register(Namespace::new("asset"));
        assert_eq!(registry.namespaces().len(), 1);
        assert!(!registry.namespaces()[0].routes().is_empty());
    }

    #[test]
    fn empty_route_path_is_rejected() {
        let ns = Namespace::new("asset").route(
            "/",
            vec![(Method::GET, EndpointSpec::new("root", "asset.root"))],
        );
        assert!(ns.routes().is_empty());
        // The namespace root still answers with its schema.
        let mut registry = RouteRegistry::new();
        registry.register(ns);
        assert!(matches!(
            registry.find(&Method::GET, "asset"),
            MatchOutcome::NamespaceRoot(_)
        ));
    }

    #[test]
    fn early_optional_placeholder_is_forced_required() {
        let ns = Namespace::new("doc").route(
            ":section/:page",
            vec![(
                Method::GET,
                EndpointSpec::new("page", "doc.page")
                    .param(
                        "section",
                        ParameterSpec::new(ParamType::String)
                            .location(ParamLocation::Variable),
                    )
                    .param(
                        "page",
                        ParameterSpec::new(ParamType::Integer)
                            .location(ParamLocation::Variable)
                            .required(),
                    ),
            )],
        );
        let mut registry = RouteRegistry::new();
        registry.register(ns);
        // `section` was declared optional but is not last, so it must be
        // present for the route to match.
        assert!(matches!(
            registry.find(&Method::GET, "doc/intro/3"),
            MatchOutcome::Endpoint { .. }
        ));
        assert!(matches!(
            registry.find(&Method::GET, "doc/3"),
            MatchOutcome::None
        ));
    }
}
