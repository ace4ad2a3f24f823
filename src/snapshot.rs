//! Normalized, read-only view of an incoming request.
//!
//! The web layer builds one [`RequestSnapshot`] per request; matching only
//! ever reads from it. Header names are lower-cased, query strings are
//! percent-decoded and repeated keys collapse into lists. XML bodies (by
//! `Content-Type`) are converted into JSON-like values; any other body is
//! parsed as JSON whenever it is valid JSON.

use crate::xml::parse_xml;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Request body as seen by the matcher.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    /// Body parsed as JSON
    Json(Value),
    /// XML body converted by [`parse_xml`]
    Xml(Value),
    /// Body that could not be parsed
    Raw(Vec<u8>),
}

impl RequestBody {
    /// Classify raw body bytes. An XML mimetype selects the XML parser,
    /// anything else is tried as JSON.
    pub fn from_bytes(bytes: &[u8], content_type: Option<&str>) -> Self {
        if bytes.is_empty() {
            return RequestBody::Empty;
        }
        let parsed = if content_type.is_some_and(is_xml_mimetype) {
            std::str::from_utf8(bytes)
                .ok()
                .and_then(parse_xml)
                .map(RequestBody::Xml)
        } else {
            serde_json::from_slice::<Value>(bytes)
                .ok()
                .map(RequestBody::Json)
        };
        parsed.unwrap_or_else(|| RequestBody::Raw(bytes.to_vec()))
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            RequestBody::Json(json) => Some(json),
            _ => None,
        }
    }

    /// The parsed body, JSON or XML.
    pub fn structured(&self) -> Option<&Value> {
        match self {
            RequestBody::Json(value) | RequestBody::Xml(value) => Some(value),
            _ => None,
        }
    }
}

/// `application/xml`, `text/xml`, `application/soap+xml`, ...
fn is_xml_mimetype(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|mimetype| mimetype.trim().to_ascii_lowercase().contains("xml"))
}

/// Snapshot of a request, created per request and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSnapshot {
    method: String,
    path: String,
    /// Mapping of lower-cased header name to value
    headers: Value,
    /// Mapping of parameter name to a string, or a list for repeated keys
    query: Value,
    body: RequestBody,
}

impl RequestSnapshot {
    /// Start building a snapshot. A `?query` suffix on `path` is split off
    /// and parsed as the query string.
    pub fn builder(method: impl Into<String>, path: &str) -> SnapshotBuilder {
        let (path, query_string) = match path.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path, None),
        };
        let builder = SnapshotBuilder {
            method: method.into(),
            path: path.to_string(),
            headers: Map::new(),
            query: Map::new(),
            body: RequestBody::Empty,
            raw_body: None,
        };
        match query_string {
            Some(query) => builder.query_string(query),
            None => builder,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &Value {
        &self.headers
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name.to_ascii_lowercase())
            .and_then(Value::as_str)
    }

    pub fn query(&self) -> &Value {
        &self.query
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }
}

/// Builder for [`RequestSnapshot`].
#[derive(Debug)]
pub struct SnapshotBuilder {
    method: String,
    path: String,
    headers: Map<String, Value>,
    query: Map<String, Value>,
    body: RequestBody,
    /// Bytes classified at build time, once all headers are known
    raw_body: Option<Vec<u8>>,
}

impl SnapshotBuilder {
    /// Add a header. Repeated headers are joined with `", "`.
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        let name = name.to_ascii_lowercase();
        match self.headers.get_mut(&name) {
            Some(Value::String(existing)) => {
                existing.push_str(", ");
                existing.push_str(&value);
            }
            _ => {
                self.headers.insert(name, Value::String(value));
            }
        }
        self
    }

    pub fn headers<K, V>(self, headers: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        headers
            .into_iter()
            .fold(self, |builder, (name, value)| builder.header(name.as_ref(), value))
    }

    /// Parse and add a raw (still percent-encoded) query string.
    pub fn query_string(self, query: &str) -> Self {
        parse_query_string(query)
            .into_iter()
            .fold(self, |builder, (name, value)| builder.query_param(name, value))
    }

    /// Add a decoded query parameter. Repeated names turn into a list.
    pub fn query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let value = Value::String(value.into());
        let name = name.into();
        match self.query.get_mut(&name) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                self.query.insert(name, value);
            }
        }
        self
    }

    /// Set the body from raw bytes. It is parsed according to the
    /// `Content-Type` header when the snapshot is built.
    pub fn body_bytes(mut self, bytes: &[u8]) -> Self {
        self.raw_body = Some(bytes.to_vec());
        self
    }

    pub fn json_body(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self.raw_body = None;
        self
    }

    pub fn build(self) -> RequestSnapshot {
        let body = match &self.raw_body {
            Some(bytes) => {
                let content_type = self.headers.get("content-type").and_then(Value::as_str);
                RequestBody::from_bytes(bytes, content_type)
            }
            None => self.body,
        };
        RequestSnapshot {
            method: self.method,
            path: self.path,
            headers: Value::Object(self.headers),
            query: Value::Object(self.query),
            body,
        }
    }
}

/// Request description used by the dry-run CLI and fixtures.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestFixture {
    #[serde(default = "default_method")]
    pub method: String,

    pub path: String,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Raw query string, without the leading `?`
    #[serde(default)]
    pub query: Option<String>,

    /// Structured JSON body
    #[serde(default)]
    pub body: Option<Value>,

    /// Raw body text, used when `body` is absent
    #[serde(default)]
    pub raw_body: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl RequestFixture {
    pub fn into_snapshot(self) -> RequestSnapshot {
        let mut builder = RequestSnapshot::builder(self.method, &self.path).headers(self.headers);
        if let Some(query) = &self.query {
            builder = builder.query_string(query);
        }
        builder = match (self.body, self.raw_body) {
            (Some(body), _) => builder.json_body(body),
            (None, Some(raw)) => builder.body_bytes(raw.as_bytes()),
            (None, None) => builder,
        };
        builder.build()
    }
}

/// Split a query string into decoded key-value pairs, keeping order.
fn parse_query_string(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once('=') {
            Some((key, value)) => (decode_component(key), decode_component(value)),
            None => (decode_component(part), String::new()),
        })
        .collect()
}

fn decode_component(component: &str) -> String {
    let spaced = component.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_headers_are_case_insensitive() {
        let snapshot = RequestSnapshot::builder("GET", "/greet")
            .header("X-Test", "1")
            .header("Accept", "text/html")
            .header("accept", "application/json")
            .build();

        assert_eq!(snapshot.header("x-test"), Some("1"));
        assert_eq!(snapshot.header("X-TEST"), Some("1"));
        assert_eq!(snapshot.header("ACCEPT"), Some("text/html, application/json"));
        assert_eq!(
            snapshot.headers(),
            &json!({"x-test": "1", "accept": "text/html, application/json"})
        );
    }

    #[test]
    fn test_query_string_parsing() {
        let snapshot = RequestSnapshot::builder("GET", "/search?q=John%20Doe&tag=a&tag=b&flag")
            .build();

        assert_eq!(snapshot.path(), "/search");
        assert_eq!(
            snapshot.query(),
            &json!({"q": "John Doe", "tag": ["a", "b"], "flag": ""})
        );
    }

    #[test]
    fn test_plus_decodes_to_space() {
        let pairs = parse_query_string("name=hello+world&x=1%2B1");
        assert_eq!(pairs[0], ("name".to_string(), "hello world".to_string()));
        assert_eq!(pairs[1], ("x".to_string(), "1+1".to_string()));
    }

    #[test]
    fn test_body_classification() {
        assert_eq!(RequestBody::from_bytes(b"", None), RequestBody::Empty);
        assert_eq!(
            RequestBody::from_bytes(br#"{"name": "world"}"#, None),
            RequestBody::Json(json!({"name": "world"}))
        );
        assert_eq!(
            RequestBody::from_bytes(b"name=world", Some("application/x-www-form-urlencoded")),
            RequestBody::Raw(b"name=world".to_vec())
        );
        assert!(RequestBody::from_bytes(b"not json", None).as_json().is_none());
    }

    #[test]
    fn test_xml_body_by_content_type() {
        let body = b"<req><name>world</name></req>";
        let expected = json!({"req": {"name": "world"}});

        for content_type in ["application/xml", "text/xml; charset=utf-8", "application/soap+xml"] {
            let parsed = RequestBody::from_bytes(body, Some(content_type));
            assert_eq!(parsed, RequestBody::Xml(expected.clone()), "{}", content_type);
            assert_eq!(parsed.structured(), Some(&expected));
            assert!(parsed.as_json().is_none());
        }

        // Without an XML mimetype the body is only tried as JSON.
        assert_eq!(
            RequestBody::from_bytes(body, Some("text/plain")),
            RequestBody::Raw(body.to_vec())
        );
        assert_eq!(
            RequestBody::from_bytes(b"<req><name>", Some("application/xml")),
            RequestBody::Raw(b"<req><name>".to_vec())
        );
    }

    #[test]
    fn test_builder_uses_content_type_added_after_body() {
        let snapshot = RequestSnapshot::builder("POST", "/greet")
            .body_bytes(b"<req><name>world</name></req>")
            .header("Content-Type", "application/xml")
            .build();
        assert_eq!(
            snapshot.body().structured(),
            Some(&json!({"req": {"name": "world"}}))
        );
    }

    #[test]
    fn test_fixture_into_snapshot() {
        let fixture: RequestFixture = serde_json::from_value(json!({
            "method": "post",
            "path": "/greet",
            "headers": {"Content-Type": "application/json"},
            "query": "lang=en",
            "body": {"name": "world"}
        }))
        .unwrap();
        let snapshot = fixture.into_snapshot();

        assert_eq!(snapshot.method(), "post");
        assert_eq!(snapshot.header("content-type"), Some("application/json"));
        assert_eq!(snapshot.query(), &json!({"lang": "en"}));
        assert_eq!(snapshot.body().as_json(), Some(&json!({"name": "world"})));
    }

    #[test]
    fn test_fixture_raw_body() {
        let fixture: RequestFixture = serde_json::from_value(json!({
            "path": "/upload",
            "raw_body": "<xml/>"
        }))
        .unwrap();
        let snapshot = fixture.into_snapshot();

        assert_eq!(snapshot.method(), "GET");
        assert_eq!(snapshot.body(), &RequestBody::Raw(b"<xml/>".to_vec()));
    }
}
