//! Compiled shortcut rules and the programmatic wiring API.
//!
//! A [`Rule`] is built once, during wiring, and never changes afterwards.
//! Everything that could be wrong with it is checked by
//! [`RuleBuilder::build`], so evaluating a rule against a request cannot fail.

use crate::config::{PathCondition, ResponseDefinition};
use crate::diff::{validate_pattern, DEFAULT_MAX_PATTERN_DEPTH};
use crate::error::ConfigError;
use crate::matcher::CompiledPath;
use crate::snapshot::RequestSnapshot;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Custom request check, evaluated after all declarative conditions.
pub trait RequestPredicate: Send + Sync + fmt::Debug {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    fn check(&self, snapshot: &RequestSnapshot) -> bool;
}

/// [`RequestPredicate`] backed by a closure.
pub struct FnPredicate<F> {
    name: String,
    check: F,
}

impl<F> FnPredicate<F>
where
    F: Fn(&RequestSnapshot) -> bool + Send + Sync,
{
    pub fn new(name: impl Into<String>, check: F) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }
}

impl<F> fmt::Debug for FnPredicate<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPredicate").field("name", &self.name).finish()
    }
}

impl<F> RequestPredicate for FnPredicate<F>
where
    F: Fn(&RequestSnapshot) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, snapshot: &RequestSnapshot) -> bool {
        (self.check)(snapshot)
    }
}

/// Computes the response from the request once all conditions hold.
///
/// Returning `None` declines: the rule is treated as not matching and the
/// scan moves on to the next rule.
pub trait RequestResponder: Send + Sync + fmt::Debug {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    fn respond(&self, snapshot: &RequestSnapshot) -> Option<ShortcutResponse>;
}

/// [`RequestResponder`] backed by a closure.
pub struct FnResponder<F> {
    name: String,
    respond: F,
}

impl<F> FnResponder<F>
where
    F: Fn(&RequestSnapshot) -> Option<ShortcutResponse> + Send + Sync,
{
    pub fn new(name: impl Into<String>, respond: F) -> Self {
        Self {
            name: name.into(),
            respond,
        }
    }
}

impl<F> fmt::Debug for FnResponder<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnResponder").field("name", &self.name).finish()
    }
}

impl<F> RequestResponder for FnResponder<F>
where
    F: Fn(&RequestSnapshot) -> Option<ShortcutResponse> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn respond(&self, snapshot: &RequestSnapshot) -> Option<ShortcutResponse> {
        (self.respond)(snapshot)
    }
}

/// Fully rendered canned response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutResponse {
    pub status: u16,
    pub content_type: String,
    /// Extra response headers, sorted by name, without `Content-Type`
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ShortcutResponse {
    /// Parse the body as JSON, if it is JSON.
    pub fn body_json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// A condition/response pair bound to a route by the registry.
#[derive(Debug, Clone)]
pub struct Rule {
    pub(crate) id: String,
    /// Upper-cased; empty means any method
    pub(crate) methods: Vec<String>,
    pub(crate) path: Option<CompiledPath>,
    pub(crate) path_params: Option<Value>,
    /// Mapping with lower-cased header names
    pub(crate) headers: Option<Value>,
    pub(crate) query: Option<Value>,
    pub(crate) body: Option<Value>,
    pub(crate) predicate: Option<Arc<dyn RequestPredicate>>,
    /// Replaces the static response when set
    pub(crate) responder: Option<Arc<dyn RequestResponder>>,
    pub(crate) response: Arc<ShortcutResponse>,
}

impl Rule {
    pub fn builder(id: impl Into<String>) -> RuleBuilder {
        RuleBuilder::new(id)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The static response. Unused when the rule has a responder.
    pub fn response(&self) -> &Arc<ShortcutResponse> {
        &self.response
    }

    /// Response for a request that satisfied the rule's conditions, or
    /// `None` if the responder declines.
    pub fn respond_to(&self, snapshot: &RequestSnapshot) -> Option<Arc<ShortcutResponse>> {
        match &self.responder {
            Some(responder) => responder.respond(snapshot).map(Arc::new),
            None => Some(Arc::clone(&self.response)),
        }
    }

    /// True when the rule has no conditions at all.
    pub fn is_unconditional(&self) -> bool {
        self.methods.is_empty()
            && self.path.is_none()
            && self.headers.is_none()
            && self.query.is_none()
            && self.body.is_none()
            && self.predicate.is_none()
            && self.responder.is_none()
    }
}

/// Builder for [`Rule`]. All conditions are optional.
#[derive(Debug)]
pub struct RuleBuilder {
    id: String,
    methods: Vec<String>,
    path: Option<PathCondition>,
    path_params: Option<Value>,
    headers: Map<String, Value>,
    extra_headers: Option<Value>,
    query: Option<Value>,
    body: Option<Value>,
    predicate: Option<Arc<dyn RequestPredicate>>,
    responder: Option<Arc<dyn RequestResponder>>,
    response: ResponseDefinition,
    max_depth: usize,
    default_content_type: String,
}

impl RuleBuilder {
    fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            methods: Vec::new(),
            path: None,
            path_params: None,
            headers: Map::new(),
            extra_headers: None,
            query: None,
            body: None,
            predicate: None,
            responder: None,
            response: ResponseDefinition::default(),
            max_depth: DEFAULT_MAX_PATTERN_DEPTH,
            default_content_type: "application/json".to_string(),
        }
    }

    /// Accept this HTTP method. May be called repeatedly.
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.methods.push(method.into());
        self
    }

    pub fn path(mut self, path: PathCondition) -> Self {
        self.path = Some(path);
        self
    }

    /// Expected parameters captured by a template or regex path condition.
    pub fn path_params(mut self, params: Value) -> Self {
        self.path_params = Some(params);
        self
    }

    /// Require a header with exactly this value.
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.to_string(), Value::String(value.into()));
        self
    }

    /// Require a mapping of headers.
    pub fn headers(mut self, headers: Value) -> Self {
        self.extra_headers = Some(headers);
        self
    }

    /// Expected query parameters: strings, or lists for repeated keys.
    pub fn query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    /// Expected JSON body substructure.
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn predicate(mut self, predicate: Arc<dyn RequestPredicate>) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn predicate_fn<F>(self, name: &str, check: F) -> Self
    where
        F: Fn(&RequestSnapshot) -> bool + Send + Sync + 'static,
    {
        self.predicate(Arc::new(FnPredicate::new(name, check)))
    }

    /// Compute the response per request instead of using a static one.
    pub fn responder(mut self, responder: Arc<dyn RequestResponder>) -> Self {
        self.responder = Some(responder);
        self
    }

    pub fn responder_fn<F>(self, name: &str, respond: F) -> Self
    where
        F: Fn(&RequestSnapshot) -> Option<ShortcutResponse> + Send + Sync + 'static,
    {
        self.responder(Arc::new(FnResponder::new(name, respond)))
    }

    pub fn respond(mut self, response: ResponseDefinition) -> Self {
        self.response = response;
        self
    }

    /// Nesting limit applied to every pattern of this rule.
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Content type used when the response names none and has no body.
    pub fn default_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.default_content_type = content_type.into();
        self
    }

    /// Validate every condition and render the response.
    pub fn build(self) -> Result<Rule, ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::EmptyRuleId);
        }

        let methods = self
            .methods
            .iter()
            .map(|m| m.trim().to_ascii_uppercase())
            .collect::<Vec<_>>();
        if methods.iter().any(String::is_empty) {
            return Err(ConfigError::pattern("method", "method cannot be empty"));
        }

        let path = self.path.as_ref().map(CompiledPath::compile).transpose()?;

        if let Some(params) = &self.path_params {
            if !path.as_ref().is_some_and(CompiledPath::captures_params) {
                return Err(ConfigError::pattern(
                    "path_params",
                    "path parameters need a template or regex path condition",
                ));
            }
            check_string_mapping(params, "path_params", false)?;
        }

        let headers = self.compile_headers()?;

        if let Some(query) = &self.query {
            check_string_mapping(query, "query", true)?;
        }

        if let Some(body) = &self.body {
            validate_pattern(body, "body", self.max_depth)?;
        }

        let response = self.response.render(&self.default_content_type)?;

        Ok(Rule {
            id: self.id,
            methods,
            path,
            path_params: self.path_params,
            headers,
            query: self.query,
            body: self.body,
            predicate: self.predicate,
            responder: self.responder,
            response: Arc::new(response),
        })
    }

    fn compile_headers(&self) -> Result<Option<Value>, ConfigError> {
        let mut merged = Map::new();
        let from_mapping = match &self.extra_headers {
            Some(Value::Object(map)) => map.iter().collect::<Vec<_>>(),
            Some(_) => {
                return Err(ConfigError::pattern("headers", "headers must be a mapping"));
            }
            None => Vec::new(),
        };

        for (name, value) in self.headers.iter().chain(from_mapping) {
            let lowered = name.to_ascii_lowercase();
            if !value.is_string() {
                return Err(ConfigError::pattern(
                    format!("headers.{}", name),
                    "header values must be strings",
                ));
            }
            if merged.insert(lowered, value.clone()).is_some() {
                return Err(ConfigError::pattern(
                    format!("headers.{}", name),
                    "header is specified more than once",
                ));
            }
        }

        Ok((!merged.is_empty()).then_some(Value::Object(merged)))
    }
}

/// Check a mapping whose values are strings (or string lists, if allowed).
fn check_string_mapping(value: &Value, location: &str, allow_lists: bool) -> Result<(), ConfigError> {
    let Value::Object(map) = value else {
        return Err(ConfigError::pattern(location, "expected a mapping"));
    };
    for (key, entry) in map {
        let valid = match entry {
            Value::String(_) => true,
            Value::Array(items) if allow_lists => items.iter().all(Value::is_string),
            _ => false,
        };
        if !valid {
            let message = if allow_lists {
                "values must be strings or lists of strings"
            } else {
                "values must be strings"
            };
            return Err(ConfigError::pattern(format!("{}.{}", location, key), message));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResponseBody;
    use serde_json::json;

    #[test]
    fn test_build_unconditional_rule() {
        let rule = Rule::builder("always")
            .respond(ResponseDefinition::text(200, "short_ok"))
            .build()
            .unwrap();

        assert!(rule.is_unconditional());
        assert_eq!(rule.response().status, 200);
        assert_eq!(rule.response().content_type, "text/plain");
        assert_eq!(rule.response().body, b"short_ok");
    }

    #[test]
    fn test_methods_are_normalized() {
        let rule = Rule::builder("post")
            .method("post")
            .method(" Put ")
            .build()
            .unwrap();
        assert_eq!(rule.methods, vec!["POST", "PUT"]);
        assert!(!rule.is_unconditional());
    }

    #[test]
    fn test_empty_method_rejected() {
        for method in ["", "   ", "\t"] {
            let err = Rule::builder("blank").method("GET").method(method).build().unwrap_err();
            match err {
                ConfigError::InvalidPattern { location, .. } => assert_eq!(location, "method"),
                other => panic!("unexpected error: {:?}", other),
            }
        }
    }

    #[test]
    fn test_header_names_are_lowercased() {
        let rule = Rule::builder("headers")
            .header("X-Test", "1")
            .headers(json!({"Accept": "application/json"}))
            .build()
            .unwrap();
        assert_eq!(
            rule.headers,
            Some(json!({"x-test": "1", "accept": "application/json"}))
        );
    }

    #[test]
    fn test_non_string_header_is_rejected() {
        let err = Rule::builder("bad")
            .headers(json!({"X-Count": 1}))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::pattern("headers.X-Count", "header values must be strings")
        );

        let err = Rule::builder("bad")
            .headers(json!(["X-Count"]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn test_duplicate_header_is_rejected() {
        let err = Rule::builder("dup")
            .header("X-Test", "1")
            .headers(json!({"x-test": "2"}))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_query_values_must_be_strings() {
        assert!(Rule::builder("ok")
            .query(json!({"page": "1", "tag": ["a", "b"]}))
            .build()
            .is_ok());

        let err = Rule::builder("bad")
            .query(json!({"page": 1}))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("query.page"));
    }

    #[test]
    fn test_path_params_require_capturing_path() {
        let err = Rule::builder("params")
            .path_params(json!({"id": "1"}))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("template or regex"));

        let err = Rule::builder("params")
            .path(PathCondition::Exact {
                value: "/users/1".to_string(),
            })
            .path_params(json!({"id": "1"}))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));

        assert!(Rule::builder("params")
            .path(PathCondition::Template {
                template: "/users/{id}".to_string(),
            })
            .path_params(json!({"id": "1"}))
            .build()
            .is_ok());
    }

    #[test]
    fn test_body_depth_guard() {
        let err = Rule::builder("deep")
            .body(json!({"a": {"b": {"c": 1}}}))
            .max_depth(2)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn test_empty_id_is_rejected() {
        assert_eq!(Rule::builder("  ").build().unwrap_err(), ConfigError::EmptyRuleId);
    }

    #[test]
    fn test_invalid_response_is_rejected() {
        let response = ResponseDefinition {
            body: Some(ResponseBody::Base64 {
                content: "not base64!".to_string(),
            }),
            ..ResponseDefinition::default()
        };
        let err = Rule::builder("bad").respond(response).build().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidResponse(_)));
    }

    #[test]
    fn test_fn_predicate() {
        let rule = Rule::builder("pred")
            .predicate_fn("has-auth", |s| s.header("authorization").is_some())
            .build()
            .unwrap();
        let predicate = rule.predicate.as_ref().unwrap();
        assert_eq!(predicate.name(), "has-auth");

        let snapshot = RequestSnapshot::builder("GET", "/")
            .header("Authorization", "Bearer x")
            .build();
        assert!(predicate.check(&snapshot));
    }

    #[test]
    fn test_fn_responder() {
        let rule = Rule::builder("echo")
            .responder_fn("echo-name", |s| {
                let name = s.query().get("name")?.as_str()?;
                Some(ShortcutResponse {
                    status: 200,
                    content_type: "text/plain".to_string(),
                    headers: Vec::new(),
                    body: format!("hi {}", name).into_bytes(),
                })
            })
            .build()
            .unwrap();
        assert!(!rule.is_unconditional());
        assert_eq!(rule.responder.as_ref().unwrap().name(), "echo-name");

        let response = rule
            .respond_to(&RequestSnapshot::builder("GET", "/greet?name=ada").build())
            .unwrap();
        assert_eq!(response.body, b"hi ada");
        assert!(rule
            .respond_to(&RequestSnapshot::builder("GET", "/greet").build())
            .is_none());
    }

    #[test]
    fn test_static_response_without_responder() {
        let rule = Rule::builder("static")
            .respond(ResponseDefinition::text(201, "created"))
            .build()
            .unwrap();
        let response = rule
            .respond_to(&RequestSnapshot::builder("GET", "/").build())
            .unwrap();
        assert!(Arc::ptr_eq(&response, rule.response()));
    }
}
