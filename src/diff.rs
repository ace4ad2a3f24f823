//! Asymmetric structural matching on JSON-like data.
//!
//! The expected side is a pattern: mappings only name the keys they care
//! about, sequences are compared position by position, and scalars must be
//! equal in both type and value. Extra keys on the actual side are ignored.

use crate::error::ConfigError;
use serde_json::Value;
use std::fmt;

/// Default nesting limit for configured patterns.
pub const DEFAULT_MAX_PATTERN_DEPTH: usize = 32;

/// One step into a structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Coarse type of a JSON value, used in mismatch reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Bool,
    Number,
    String,
    Sequence,
    Mapping,
}

impl ValueKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Array(_) => ValueKind::Sequence,
            Value::Object(_) => ValueKind::Mapping,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Sequence => "sequence",
            ValueKind::Mapping => "mapping",
        };
        f.write_str(name)
    }
}

/// Why a pattern failed to match.
#[derive(Debug, Clone, PartialEq)]
pub enum MismatchReason {
    /// A key required by the pattern is absent.
    MissingKey(String),
    /// Mapping, sequence and scalar never coerce into each other.
    KindMismatch { expected: ValueKind, actual: ValueKind },
    LengthMismatch { expected: usize, actual: usize },
    NotEqual { expected: Value, actual: Value },
}

/// First point at which the actual value diverged from the pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    pub path: Vec<PathSegment>,
    pub reason: MismatchReason,
}

impl Mismatch {
    /// Render the location as `$.user.tags[1]`.
    pub fn location(&self) -> String {
        render_path(&self.path)
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {}: ", self.location())?;
        match &self.reason {
            MismatchReason::MissingKey(key) => write!(f, "missing key '{}'", key),
            MismatchReason::KindMismatch { expected, actual } => {
                write!(f, "expected {}, found {}", expected, actual)
            }
            MismatchReason::LengthMismatch { expected, actual } => write!(
                f,
                "expected sequence of length {}, found length {}",
                expected, actual
            ),
            MismatchReason::NotEqual { expected, actual } => {
                write!(f, "expected {}, found {}", expected, actual)
            }
        }
    }
}

/// Outcome of [`matches`].
#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    Match,
    Mismatch(Mismatch),
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Match)
    }

    pub fn mismatch(&self) -> Option<&Mismatch> {
        match self {
            MatchResult::Match => None,
            MatchResult::Mismatch(m) => Some(m),
        }
    }
}

/// Check whether `actual` satisfies the `expected` pattern.
///
/// Recursion follows the pattern, so its depth is bounded by the depth of
/// `expected` no matter how deeply `actual` nests.
pub fn matches(expected: &Value, actual: &Value) -> MatchResult {
    let mut path = Vec::new();
    match walk(expected, actual, &mut path) {
        Ok(()) => MatchResult::Match,
        Err(reason) => MatchResult::Mismatch(Mismatch { path, reason }),
    }
}

fn walk(
    expected: &Value,
    actual: &Value,
    path: &mut Vec<PathSegment>,
) -> Result<(), MismatchReason> {
    match (expected, actual) {
        (Value::Object(exp), Value::Object(act)) => {
            for (key, exp_value) in exp {
                let Some(act_value) = act.get(key) else {
                    return Err(MismatchReason::MissingKey(key.clone()));
                };
                path.push(PathSegment::Key(key.clone()));
                walk(exp_value, act_value, path)?;
                path.pop();
            }
            Ok(())
        }
        (Value::Array(exp), Value::Array(act)) => {
            if exp.len() != act.len() {
                return Err(MismatchReason::LengthMismatch {
                    expected: exp.len(),
                    actual: act.len(),
                });
            }
            for (i, (exp_elem, act_elem)) in exp.iter().zip(act).enumerate() {
                path.push(PathSegment::Index(i));
                walk(exp_elem, act_elem, path)?;
                path.pop();
            }
            Ok(())
        }
        (Value::Object(_) | Value::Array(_), _) | (_, Value::Object(_) | Value::Array(_)) => {
            Err(MismatchReason::KindMismatch {
                expected: ValueKind::of(expected),
                actual: ValueKind::of(actual),
            })
        }
        // Scalars: serde_json equality is already type-sensitive, and keeps
        // integers and floats apart.
        _ if expected == actual => Ok(()),
        _ => Err(MismatchReason::NotEqual {
            expected: expected.clone(),
            actual: actual.clone(),
        }),
    }
}

/// Reject patterns that nest deeper than `max_depth` containers.
pub fn validate_pattern(
    pattern: &Value,
    location: &str,
    max_depth: usize,
) -> Result<(), ConfigError> {
    let mut path = Vec::new();
    check_depth(pattern, 0, max_depth, &mut path).map_err(|()| {
        ConfigError::pattern(
            format!("{}{}", location, render_path(&path).trim_start_matches('$')),
            format!("pattern nests deeper than {} levels", max_depth),
        )
    })
}

fn check_depth(
    value: &Value,
    depth: usize,
    max_depth: usize,
    path: &mut Vec<PathSegment>,
) -> Result<(), ()> {
    let children: Vec<(PathSegment, &Value)> = match value {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| (PathSegment::Key(k.clone()), v))
            .collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (PathSegment::Index(i), v))
            .collect(),
        _ => return Ok(()),
    };
    if depth >= max_depth {
        return Err(());
    }
    for (segment, child) in children {
        path.push(segment);
        check_depth(child, depth + 1, max_depth, path)?;
        path.pop();
    }
    Ok(())
}

fn render_path(path: &[PathSegment]) -> String {
    let mut rendered = String::from("$");
    for segment in path {
        match segment {
            PathSegment::Key(key) => {
                rendered.push('.');
                rendered.push_str(key);
            }
            PathSegment::Index(i) => {
                rendered.push_str(&format!("[{}]", i));
            }
        }
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subset_ignores_extra_keys() {
        let expected = json!({"name": "world"});
        let extras = [
            json!({"name": "world", "extra": true}),
            json!({"name": "world", "nested": {"deep": [1, 2, 3]}}),
            json!({"name": "world", "a": null, "b": "x", "c": 1.5}),
        ];
        for actual in &extras {
            assert!(matches(&expected, actual).is_match(), "{}", actual);
        }
    }

    #[test]
    fn test_removing_required_key_fails() {
        let expected = json!({"a": 1, "b": {"c": "x"}});
        let mut actual = json!({"a": 1, "b": {"c": "x", "d": 2}, "e": true});
        assert!(matches(&expected, &actual).is_match());

        for key in ["a", "b"] {
            let mut reduced = actual.clone();
            reduced.as_object_mut().unwrap().remove(key);
            let result = matches(&expected, &reduced);
            assert_eq!(
                result.mismatch().unwrap().reason,
                MismatchReason::MissingKey(key.to_string())
            );
        }

        actual["b"].as_object_mut().unwrap().remove("c");
        let result = matches(&expected, &actual);
        let mismatch = result.mismatch().unwrap();
        assert_eq!(mismatch.location(), "$.b");
        assert_eq!(mismatch.reason, MismatchReason::MissingKey("c".to_string()));
    }

    #[test]
    fn test_sequences_match_by_position() {
        assert!(matches(&json!([1, 2]), &json!([1, 2])).is_match());
        assert!(!matches(&json!([1, 2]), &json!([2, 1])).is_match());
        assert!(matches(&json!([{"id": 1}]), &json!([{"id": 1, "x": 0}])).is_match());
    }

    #[test]
    fn test_sequence_length_must_agree() {
        let cases = [
            (json!([1]), json!([1, 2])),
            (json!([1, 2]), json!([1])),
            (json!([]), json!([1])),
            (json!([1]), json!([])),
        ];
        for (expected, actual) in &cases {
            let result = matches(expected, actual);
            assert!(
                matches!(
                    result.mismatch().map(|m| &m.reason),
                    Some(MismatchReason::LengthMismatch { .. })
                ),
                "{} vs {}",
                expected,
                actual
            );
        }
        assert!(matches(&json!([]), &json!([])).is_match());
    }

    #[test]
    fn test_scalars_are_type_sensitive() {
        assert!(matches(&json!(5), &json!(5)).is_match());
        assert!(!matches(&json!(5), &json!("5")).is_match());
        assert!(!matches(&json!(1), &json!(1.0)).is_match());
        assert!(!matches(&json!(true), &json!(1)).is_match());
        assert!(matches(&json!(null), &json!(null)).is_match());
        assert!(!matches(&json!(null), &json!(false)).is_match());
    }

    #[test]
    fn test_null_is_not_absent() {
        let expected = json!({"token": null});
        assert!(matches(&expected, &json!({"token": null})).is_match());
        assert!(!matches(&expected, &json!({})).is_match());
    }

    #[test]
    fn test_kind_mismatch_never_coerces() {
        let result = matches(&json!({"a": 1}), &json!([{"a": 1}]));
        assert_eq!(
            result.mismatch().unwrap().reason,
            MismatchReason::KindMismatch {
                expected: ValueKind::Mapping,
                actual: ValueKind::Sequence,
            }
        );
        assert!(!matches(&json!("x"), &json!(["x"])).is_match());
        assert!(!matches(&json!([]), &json!({})).is_match());
    }

    #[test]
    fn test_mismatch_reports_first_location() {
        let expected = json!({"user": {"tags": ["a", "b"]}});
        let actual = json!({"user": {"tags": ["a", "c"]}});
        let result = matches(&expected, &actual);
        let mismatch = result.mismatch().unwrap();
        assert_eq!(mismatch.location(), "$.user.tags[1]");
        assert_eq!(
            mismatch.to_string(),
            r#"at $.user.tags[1]: expected "b", found "c""#
        );
    }

    #[test]
    fn test_empty_mapping_matches_any_mapping() {
        assert!(matches(&json!({}), &json!({"a": 1})).is_match());
        assert!(!matches(&json!({}), &json!("a")).is_match());
    }

    #[test]
    fn test_validate_pattern_depth() {
        let shallow = json!({"a": {"b": [1, 2]}});
        assert!(validate_pattern(&shallow, "body", 3).is_ok());

        let err = validate_pattern(&shallow, "body", 2).unwrap_err();
        match err {
            ConfigError::InvalidPattern { location, .. } => assert_eq!(location, "body.a.b"),
            other => panic!("unexpected error: {:?}", other),
        }

        assert!(validate_pattern(&json!("scalar"), "body", 0).is_ok());
    }
}
