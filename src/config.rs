//! Configuration for route shortcuts.
//!
//! Defines shortcut definitions, canned responses and the environment gate.

use crate::diff::DEFAULT_MAX_PATTERN_DEPTH;
use crate::error::ConfigError;
use crate::registry::ShortcutRegistry;
use crate::rule::{Rule, ShortcutResponse};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::debug;

/// Environment in which shortcuts are always disabled.
pub const PRODUCTION: &str = "production";

/// Main shortcut configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ShortcutConfig {
    /// List of shortcut definitions, in matching order
    #[serde(default)]
    pub shortcuts: Vec<ShortcutDefinition>,

    /// Global settings
    #[serde(default)]
    pub settings: GlobalSettings,
}

impl ShortcutConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::from_yaml(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (i, shortcut) in self.shortcuts.iter().enumerate() {
            shortcut
                .to_rule(&self.settings)
                .map_err(|e| anyhow::anyhow!("Shortcut {} ('{}'): {}", i, shortcut.id, e))?;
        }
        self.build_registry()?;
        Ok(())
    }

    /// Compile every enabled shortcut and register it for its route.
    pub fn build_registry(&self) -> Result<ShortcutRegistry, ConfigError> {
        let mut registry = ShortcutRegistry::new();
        for shortcut in &self.shortcuts {
            if !shortcut.enabled {
                debug!(shortcut_id = %shortcut.id, "Skipping disabled shortcut");
                continue;
            }
            registry.register(shortcut.route.clone(), shortcut.to_rule(&self.settings)?)?;
        }
        Ok(registry)
    }
}

/// A single shortcut definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShortcutDefinition {
    /// Identifier, unique per route
    pub id: String,

    /// Optional name/description
    #[serde(default)]
    pub name: Option<String>,

    /// Route identifier the shortcut is bound to
    pub route: String,

    /// Request conditions (all optional)
    #[serde(default)]
    pub request: RequestConditions,

    /// Response to return
    #[serde(default)]
    pub response: ResponseDefinition,

    /// Whether this shortcut is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl ShortcutDefinition {
    /// Compile into a rule using the global settings.
    pub fn to_rule(&self, settings: &GlobalSettings) -> Result<Rule, ConfigError> {
        let request = &self.request;
        let mut builder = Rule::builder(self.id.clone())
            .max_depth(settings.max_pattern_depth)
            .default_content_type(settings.default_content_type.clone())
            .respond(self.response.clone());

        for method in &request.method {
            builder = builder.method(method.clone());
        }
        if let Some(path) = &request.path {
            builder = builder.path(path.clone());
        }
        if let Some(params) = &request.path_params {
            builder = builder.path_params(Value::Object(params.clone()));
        }
        if let Some(headers) = &request.headers {
            builder = builder.headers(Value::Object(headers.clone()));
        }
        if let Some(query) = &request.query {
            builder = builder.query(Value::Object(query.clone()));
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        builder.build()
    }
}

/// Request conditions. Absent conditions always hold.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RequestConditions {
    /// HTTP method(s) to match (empty = any)
    #[serde(default)]
    pub method: Vec<String>,

    /// Path condition
    #[serde(default)]
    pub path: Option<PathCondition>,

    /// Expected path parameters (needs a template or regex path)
    #[serde(default)]
    pub path_params: Option<Map<String, Value>>,

    /// Expected headers, names compared case-insensitively
    #[serde(default)]
    pub headers: Option<Map<String, Value>>,

    /// Expected query parameters
    #[serde(default)]
    pub query: Option<Map<String, Value>>,

    /// Expected JSON body substructure
    #[serde(default)]
    pub body: Option<Value>,
}

/// Path condition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PathCondition {
    /// Exact path match
    Exact { value: String },
    /// Path prefix match
    Prefix { value: String },
    /// Regex pattern match
    Regex { pattern: String },
    /// Glob pattern match
    Glob { pattern: String },
    /// Path with parameters (e.g., /users/{id})
    Template { template: String },
}

/// Response definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ResponseDefinition {
    /// HTTP status code
    #[serde(default = "default_status")]
    pub status: u16,

    /// Explicit mimetype, overrides everything else
    #[serde(default)]
    pub mimetype: Option<String>,

    /// Extra response headers
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Response body
    #[serde(default)]
    pub body: Option<ResponseBody>,
}

fn default_status() -> u16 {
    200
}

impl Default for ResponseDefinition {
    fn default() -> Self {
        Self {
            status: default_status(),
            mimetype: None,
            headers: HashMap::new(),
            body: None,
        }
    }
}

impl ResponseDefinition {
    pub fn json(status: u16, content: Value) -> Self {
        Self {
            status,
            body: Some(ResponseBody::Json { content }),
            ..Self::default()
        }
    }

    pub fn text(status: u16, content: impl Into<String>) -> Self {
        Self {
            status,
            body: Some(ResponseBody::Text {
                content: content.into(),
            }),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Validate the response definition.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.status < 100 || self.status > 599 {
            return Err(ConfigError::InvalidResponse(format!(
                "Invalid status code: {}",
                self.status
            )));
        }
        let mut seen = HashSet::new();
        for name in self.headers.keys() {
            if !seen.insert(name.to_ascii_lowercase()) {
                return Err(ConfigError::InvalidResponse(format!(
                    "Header {} is specified more than once",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Render into the response handed to the web layer.
    ///
    /// The content type is the explicit mimetype, else a `Content-Type`
    /// header, else the body's natural type, else `default_content_type`.
    pub fn render(&self, default_content_type: &str) -> Result<ShortcutResponse, ConfigError> {
        self.validate()?;

        let body = match &self.body {
            Some(body) => body.to_bytes()?,
            None => Vec::new(),
        };

        let header_content_type = self
            .headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.clone());

        let content_type = self
            .mimetype
            .clone()
            .or(header_content_type)
            .or_else(|| self.body.as_ref().map(|b| b.content_type().to_string()))
            .unwrap_or_else(|| default_content_type.to_string());

        let mut headers: Vec<(String, String)> = self
            .headers
            .iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case("content-type"))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        headers.sort();

        Ok(ShortcutResponse {
            status: self.status,
            content_type,
            headers,
            body,
        })
    }
}

/// Response body configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBody {
    /// Plain text body
    Text { content: String },
    /// JSON body
    Json { content: Value },
    /// Base64 encoded binary
    Base64 { content: String },
    /// Loaded from file once, at wiring time
    File { path: String },
}

impl ResponseBody {
    /// Get the body content as bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        match self {
            ResponseBody::Text { content } => Ok(content.as_bytes().to_vec()),
            ResponseBody::Json { content } => serde_json::to_vec(content)
                .map_err(|e| ConfigError::InvalidResponse(format!("Invalid JSON body: {}", e))),
            ResponseBody::Base64 { content } => {
                use base64::Engine;
                base64::engine::general_purpose::STANDARD
                    .decode(content)
                    .map_err(|e| ConfigError::InvalidResponse(format!("Invalid base64: {}", e)))
            }
            ResponseBody::File { path } => std::fs::read(path).map_err(|e| {
                ConfigError::InvalidResponse(format!("Failed to read file {}: {}", path, e))
            }),
        }
    }

    /// Get content type for this body.
    pub fn content_type(&self) -> &'static str {
        match self {
            ResponseBody::Text { .. } => "text/plain",
            ResponseBody::Json { .. } => "application/json",
            ResponseBody::Base64 { .. } => "application/octet-stream",
            ResponseBody::File { .. } => "application/octet-stream",
        }
    }
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalSettings {
    /// Deployment environment name
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Environments where shortcuts stay disabled, on top of `production`
    #[serde(default)]
    pub exclusions: Vec<String>,

    /// Log all matched shortcuts
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log requests that pass through
    #[serde(default)]
    pub log_unmatched: bool,

    /// Content type for responses that declare none and have no body
    #[serde(default = "default_content_type")]
    pub default_content_type: String,

    /// Nesting limit for configured patterns
    #[serde(default = "default_max_pattern_depth")]
    pub max_pattern_depth: usize,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            exclusions: Vec::new(),
            log_matches: true,
            log_unmatched: false,
            default_content_type: default_content_type(),
            max_pattern_depth: default_max_pattern_depth(),
        }
    }
}

fn default_environment() -> String {
    PRODUCTION.to_string()
}

fn default_content_type() -> String {
    "application/json".to_string()
}

fn default_max_pattern_depth() -> usize {
    DEFAULT_MAX_PATTERN_DEPTH
}

impl GlobalSettings {
    /// Add comma-separated exclusions, e.g. from `SHORTCUT_EXCLUSIONS`.
    pub fn add_exclusions(&mut self, list: &str) {
        self.exclusions.extend(
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
        );
    }

    /// Whether the current environment allows shortcuts.
    pub fn shortcuts_enabled(&self) -> bool {
        let environment = self.environment.trim();
        environment != PRODUCTION && !self.exclusions.iter().any(|e| e.trim() == environment)
    }
}
