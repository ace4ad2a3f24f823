//! Condition evaluation.
//!
//! Evaluates one rule's conditions against a request snapshot. Every
//! condition the rule names must hold; conditions it leaves out always hold.

use crate::config::PathCondition;
use crate::diff::{self, MatchResult, Mismatch};
use crate::error::ConfigError;
use crate::rule::Rule;
use crate::snapshot::RequestSnapshot;
use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;

/// First condition of a rule that a request failed.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionFailure {
    Method { actual: String },
    Path { actual: String },
    PathParams(Mismatch),
    Headers(Mismatch),
    Query(Mismatch),
    /// A body condition exists but the body is neither JSON nor XML
    BodyNotParsed,
    Body(Mismatch),
    Predicate(String),
}

impl fmt::Display for ConditionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionFailure::Method { actual } => write!(f, "method {} not accepted", actual),
            ConditionFailure::Path { actual } => write!(f, "path {} does not match", actual),
            ConditionFailure::PathParams(m) => write!(f, "path parameters {}", m),
            ConditionFailure::Headers(m) => write!(f, "headers {}", m),
            ConditionFailure::Query(m) => write!(f, "query {}", m),
            ConditionFailure::BodyNotParsed => f.write_str("body is neither JSON nor XML"),
            ConditionFailure::Body(m) => write!(f, "body {}", m),
            ConditionFailure::Predicate(name) => write!(f, "predicate '{}' rejected request", name),
        }
    }
}

/// Whether the request satisfies every condition of the rule.
pub fn evaluate(rule: &Rule, snapshot: &RequestSnapshot) -> bool {
    explain(rule, snapshot).is_ok()
}

/// Like [`evaluate`], but names the first failing condition.
pub fn explain(rule: &Rule, snapshot: &RequestSnapshot) -> Result<(), ConditionFailure> {
    // Check method
    if !rule.methods.is_empty()
        && !rule
            .methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(snapshot.method()))
    {
        return Err(ConditionFailure::Method {
            actual: snapshot.method().to_string(),
        });
    }

    // Check path
    if let Some(path) = &rule.path {
        let params = path
            .matches(snapshot.path())
            .ok_or_else(|| ConditionFailure::Path {
                actual: snapshot.path().to_string(),
            })?;
        if let Some(expected) = &rule.path_params {
            check(expected, &Value::Object(params), ConditionFailure::PathParams)?;
        }
    }

    // Check headers
    if let Some(expected) = &rule.headers {
        check(expected, snapshot.headers(), ConditionFailure::Headers)?;
    }

    // Check query parameters
    if let Some(expected) = &rule.query {
        check(expected, snapshot.query(), ConditionFailure::Query)?;
    }

    // Check body
    if let Some(expected) = &rule.body {
        let actual = snapshot
            .body()
            .structured()
            .ok_or(ConditionFailure::BodyNotParsed)?;
        check(expected, actual, ConditionFailure::Body)?;
    }

    if let Some(predicate) = &rule.predicate {
        if !predicate.check(snapshot) {
            return Err(ConditionFailure::Predicate(predicate.name().to_string()));
        }
    }

    Ok(())
}

fn check(
    expected: &Value,
    actual: &Value,
    failure: fn(Mismatch) -> ConditionFailure,
) -> Result<(), ConditionFailure> {
    match diff::matches(expected, actual) {
        MatchResult::Match => Ok(()),
        MatchResult::Mismatch(mismatch) => Err(failure(mismatch)),
    }
}

/// Path condition compiled at wiring time.
#[derive(Debug, Clone)]
pub(crate) enum CompiledPath {
    Exact(String),
    Prefix(String),
    Regex(Regex),
    Glob(globset::GlobMatcher),
    Template(PathTemplate),
}

impl CompiledPath {
    pub(crate) fn compile(condition: &PathCondition) -> Result<Self, ConfigError> {
        Ok(match condition {
            PathCondition::Exact { value } => CompiledPath::Exact(value.clone()),
            PathCondition::Prefix { value } => CompiledPath::Prefix(value.clone()),
            PathCondition::Regex { pattern } => CompiledPath::Regex(
                Regex::new(pattern)
                    .map_err(|e| ConfigError::InvalidPath(format!("Invalid regex: {}", e)))?,
            ),
            PathCondition::Glob { pattern } => CompiledPath::Glob(
                globset::Glob::new(pattern)
                    .map_err(|e| ConfigError::InvalidPath(format!("Invalid glob: {}", e)))?
                    .compile_matcher(),
            ),
            PathCondition::Template { template } => {
                CompiledPath::Template(PathTemplate::parse(template)?)
            }
        })
    }

    /// Whether matching can yield path parameters.
    pub(crate) fn captures_params(&self) -> bool {
        matches!(self, CompiledPath::Regex(_) | CompiledPath::Template(_))
    }

    /// Match a request path, returning captured parameters on success.
    pub(crate) fn matches(&self, path: &str) -> Option<Map<String, Value>> {
        match self {
            CompiledPath::Exact(value) => (path == value.as_str()).then(Map::new),
            CompiledPath::Prefix(value) => path.starts_with(value.as_str()).then(Map::new),
            CompiledPath::Regex(regex) => {
                let captures = regex.captures(path)?;
                let mut params = Map::new();
                for (i, cap) in captures.iter().enumerate().skip(1) {
                    if let Some(m) = cap {
                        params.insert(i.to_string(), Value::String(m.as_str().to_string()));
                    }
                }
                for name in regex.capture_names().flatten() {
                    if let Some(m) = captures.name(name) {
                        params.insert(name.to_string(), Value::String(m.as_str().to_string()));
                    }
                }
                Some(params)
            }
            CompiledPath::Glob(glob) => glob.is_match(path).then(Map::new),
            CompiledPath::Template(template) => template.matches(path),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PathTemplate {
    segments: Vec<TemplateSegment>,
}

#[derive(Debug, Clone)]
enum TemplateSegment {
    Literal(String),
    Param(String),
}

impl PathTemplate {
    fn parse(template: &str) -> Result<Self, ConfigError> {
        let invalid = |message: &str| {
            ConfigError::InvalidPath(format!("Invalid template '{}': {}", template, message))
        };

        let mut segments = Vec::new();
        let mut current = String::new();
        let mut param_name: Option<String> = None;

        for ch in template.chars() {
            match (ch, param_name.as_mut()) {
                ('{', None) => {
                    if !current.is_empty() {
                        segments.push(TemplateSegment::Literal(std::mem::take(&mut current)));
                    } else if matches!(segments.last(), Some(TemplateSegment::Param(_))) {
                        return Err(invalid("parameters must be separated by a literal"));
                    }
                    param_name = Some(String::new());
                }
                ('}', Some(name)) => {
                    if name.is_empty() {
                        return Err(invalid("empty parameter name"));
                    }
                    segments.push(TemplateSegment::Param(std::mem::take(name)));
                    param_name = None;
                }
                ('{', Some(_)) => return Err(invalid("nested '{'")),
                ('}', None) => return Err(invalid("unmatched '}'")),
                (_, Some(name)) => name.push(ch),
                (_, None) => current.push(ch),
            }
        }

        if param_name.is_some() {
            return Err(invalid("unclosed '{'"));
        }
        if !current.is_empty() {
            segments.push(TemplateSegment::Literal(current));
        }

        Ok(Self { segments })
    }

    /// Parameters never span a `/`.
    fn matches(&self, path: &str) -> Option<Map<String, Value>> {
        let mut params = Map::new();
        let mut remaining = path;

        for (idx, segment) in self.segments.iter().enumerate() {
            match segment {
                TemplateSegment::Literal(lit) => {
                    remaining = remaining.strip_prefix(lit.as_str())?;
                }
                TemplateSegment::Param(name) => {
                    let end = match self.segments.get(idx + 1) {
                        Some(TemplateSegment::Literal(next)) => remaining.find(next.as_str())?,
                        _ => remaining.len(),
                    };
                    let value = &remaining[..end];
                    if value.is_empty() || value.contains('/') {
                        return None;
                    }
                    params.insert(name.clone(), Value::String(value.to_string()));
                    remaining = &remaining[end..];
                }
            }
        }

        // Must consume entire path
        remaining.is_empty().then_some(params)
    }
}
