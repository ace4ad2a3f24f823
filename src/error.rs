//! Wiring-time errors.
//!
//! Everything that can go wrong with a shortcut goes wrong while rules are
//! being registered. Request-time evaluation has no error path.

use thiserror::Error;

/// Errors raised while building or registering shortcut rules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An expected pattern can never be matched, or nests too deeply.
    #[error("invalid pattern at {location}: {message}")]
    InvalidPattern { location: String, message: String },

    /// A path condition failed to compile.
    #[error("invalid path condition: {0}")]
    InvalidPath(String),

    /// The canned response cannot be rendered.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// A rule was registered after the registry was sealed for serving.
    #[error("cannot register rule '{rule_id}' for route '{route}': registry is sealed")]
    Sealed { route: String, rule_id: String },

    #[error("rule id cannot be empty")]
    EmptyRuleId,

    /// The same rule id was registered twice for one route.
    #[error("rule '{rule_id}' is already registered for route '{route}'")]
    DuplicateRule { route: String, rule_id: String },
}

impl ConfigError {
    pub(crate) fn pattern(location: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::InvalidPattern {
            location: location.into(),
            message: message.into(),
        }
    }
}
