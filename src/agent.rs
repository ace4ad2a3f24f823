//! Request-facing shortcut agent.

use crate::config::{GlobalSettings, ShortcutConfig};
use crate::engine::{Decision, DecisionEngine};
use crate::error::ConfigError;
use crate::snapshot::RequestSnapshot;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Shortcut agent
///
/// Sits in front of the application's handlers and substitutes canned
/// responses for matching requests while the environment allows it.
#[derive(Debug)]
pub struct ShortcutAgent {
    engine: DecisionEngine,
    settings: GlobalSettings,
    /// Total requests processed.
    requests_total: AtomicU64,
    /// Total requests answered with a shortcut.
    requests_matched: AtomicU64,
    /// Total requests passed to the real handler.
    requests_unmatched: AtomicU64,
    /// Whether the agent is draining (no new substitutions).
    draining: AtomicBool,
}

impl ShortcutAgent {
    /// Create an agent around an engine.
    pub fn new(engine: DecisionEngine, settings: GlobalSettings) -> Self {
        if engine.is_enabled() {
            warn!(
                environment = %settings.environment,
                shortcuts = engine.registry().len(),
                "Route shortcuts enabled. Do not do this in any kind of production environment."
            );
        } else {
            info!(
                environment = %settings.environment,
                "Route shortcuts disabled for this environment"
            );
        }

        Self {
            engine,
            settings,
            requests_total: AtomicU64::new(0),
            requests_matched: AtomicU64::new(0),
            requests_unmatched: AtomicU64::new(0),
            draining: AtomicBool::new(false),
        }
    }

    /// Wire every shortcut of the configuration and derive the gate from
    /// its environment settings.
    pub fn from_config(config: &ShortcutConfig) -> Result<Self, ConfigError> {
        let registry = config.build_registry()?;
        let engine = DecisionEngine::new(registry, config.settings.shortcuts_enabled());
        Ok(Self::new(engine, config.settings.clone()))
    }

    /// Create from a YAML configuration string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config = ShortcutConfig::from_yaml(yaml)?;
        Ok(Self::from_config(&config)?)
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    /// Decide what to do with a request routed to `route`.
    pub fn on_request(&self, route: &str, snapshot: &RequestSnapshot) -> Decision {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        if self.is_draining() {
            debug!("Agent is draining, passing through request");
            return Decision::PassThrough;
        }

        let decision = self.engine.decide(route, snapshot);
        match &decision {
            Decision::Substitute { rule_id, response } => {
                self.requests_matched.fetch_add(1, Ordering::Relaxed);
                if self.settings.log_matches {
                    info!(
                        rule_id = %rule_id,
                        route = %route,
                        method = %snapshot.method(),
                        path = %snapshot.path(),
                        status = response.status,
                        "Running shortcut"
                    );
                }
            }
            Decision::PassThrough => {
                self.requests_unmatched.fetch_add(1, Ordering::Relaxed);
                if self.settings.log_unmatched {
                    info!(
                        route = %route,
                        method = %snapshot.method(),
                        path = %snapshot.path(),
                        "Shortcut conditions couldn't be satisfied, defaulting to actual implementation"
                    );
                }
            }
        }
        decision
    }

    /// Stop substituting responses; every request passes through.
    pub fn drain(&self) {
        warn!("Shortcut agent drain requested - passing all requests through");
        self.draining.store(true, Ordering::SeqCst);
    }

    /// Check if the agent is draining.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Relaxed)
    }

    /// Get total requests processed.
    pub fn total_requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    /// Get total requests matched.
    pub fn total_matched(&self) -> u64 {
        self.requests_matched.load(Ordering::Relaxed)
    }

    /// Get total requests unmatched.
    pub fn total_unmatched(&self) -> u64 {
        self.requests_unmatched.load(Ordering::Relaxed)
    }
}
