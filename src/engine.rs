//! Per-request shortcut decisions.

use crate::matcher;
use crate::registry::ShortcutRegistry;
use crate::rule::{Rule, ShortcutResponse};
use crate::snapshot::RequestSnapshot;
use std::sync::Arc;
use tracing::debug;

/// What the web layer should do with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Run the real handler.
    PassThrough,
    /// Return the canned response instead.
    Substitute {
        rule_id: String,
        response: Arc<ShortcutResponse>,
    },
}

impl Decision {
    pub fn is_substitute(&self) -> bool {
        matches!(self, Decision::Substitute { .. })
    }

    pub fn response(&self) -> Option<&ShortcutResponse> {
        match self {
            Decision::PassThrough => None,
            Decision::Substitute { response, .. } => Some(response),
        }
    }
}

/// Gate plus first-match scan over a sealed registry.
///
/// Decisions depend only on the gate, the registry and the snapshot.
#[derive(Debug)]
pub struct DecisionEngine {
    registry: ShortcutRegistry,
    enabled: bool,
}

impl DecisionEngine {
    /// Seal the registry and build the engine around it.
    pub fn new(mut registry: ShortcutRegistry, enabled: bool) -> Self {
        registry.seal();
        Self { registry, enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn registry(&self) -> &ShortcutRegistry {
        &self.registry
    }

    /// Decide for a request already routed to `route`.
    pub fn decide(&self, route: &str, snapshot: &RequestSnapshot) -> Decision {
        if !self.enabled {
            return Decision::PassThrough;
        }

        match self.find_match(route, snapshot) {
            Some((rule, response)) => Decision::Substitute {
                rule_id: rule.id().to_string(),
                response,
            },
            None => Decision::PassThrough,
        }
    }

    /// First rule for `route` the request satisfies, with its response.
    /// A rule whose responder declines counts as not satisfied. Ignores the
    /// gate.
    pub fn find_match(
        &self,
        route: &str,
        snapshot: &RequestSnapshot,
    ) -> Option<(&Rule, Arc<ShortcutResponse>)> {
        self.registry.rules_for(route).iter().find_map(|rule| {
            if let Err(failure) = matcher::explain(rule, snapshot) {
                debug!(
                    route = %route,
                    rule_id = %rule.id(),
                    reason = %failure,
                    "Shortcut condition not satisfied"
                );
                return None;
            }
            let response = rule.respond_to(snapshot);
            if response.is_none() {
                debug!(route = %route, rule_id = %rule.id(), "Shortcut responder declined");
            }
            response.map(|response| (rule, response))
        })
    }
}
