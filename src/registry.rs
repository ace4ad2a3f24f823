//! Ordered shortcut rules per route.
//!
//! Registration happens once, before serving. After [`ShortcutRegistry::seal`]
//! the registry only hands out shared references, so any number of serving
//! threads can read it without locking.

use crate::error::ConfigError;
use crate::rule::Rule;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

/// Rules keyed by route identifier, in registration order.
#[derive(Debug, Default)]
pub struct ShortcutRegistry {
    routes: HashMap<String, Vec<Rule>>,
    /// Routes known to the routing layer, if it told us
    declared: Option<HashSet<String>>,
    sealed: bool,
}

impl ShortcutRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record routes that exist in the application's routing table.
    /// Only [`wire`](Self::wire) consults them.
    pub fn declare_routes<I, S>(&mut self, routes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.declared
            .get_or_insert_with(HashSet::new)
            .extend(routes.into_iter().map(Into::into));
    }

    /// Append a rule to the route's list.
    pub fn register(&mut self, route: impl Into<String>, rule: Rule) -> Result<(), ConfigError> {
        let route = route.into();
        if self.sealed {
            return Err(ConfigError::Sealed {
                route,
                rule_id: rule.id().to_string(),
            });
        }

        let rules = self.routes.entry(route.clone()).or_default();
        if rules.iter().any(|r| r.id() == rule.id()) {
            return Err(ConfigError::DuplicateRule {
                route,
                rule_id: rule.id().to_string(),
            });
        }

        info!(
            route = %route,
            rule_id = %rule.id(),
            position = rules.len(),
            "Adding shortcut"
        );
        rules.push(rule);
        Ok(())
    }

    /// Register many rules at once, skipping routes the routing layer does
    /// not know about. Returns the number of rules registered.
    pub fn wire<I, S>(&mut self, shortcuts: I) -> Result<usize, ConfigError>
    where
        I: IntoIterator<Item = (S, Rule)>,
        S: Into<String>,
    {
        let mut wired = 0;
        for (route, rule) in shortcuts {
            let route = route.into();
            if let Some(declared) = &self.declared {
                if !declared.contains(&route) {
                    let mut known: Vec<&str> = declared.iter().map(String::as_str).collect();
                    known.sort_unstable();
                    warn!(
                        route = %route,
                        rule_id = %rule.id(),
                        known_routes = ?known,
                        "Can't resolve route in the registered routes"
                    );
                    continue;
                }
            }
            self.register(route, rule)?;
            wired += 1;
        }
        Ok(wired)
    }

    /// End the wiring phase. Later registration fails.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Rules for a route, in registration order. Unknown routes have none.
    pub fn rules_for(&self, route: &str) -> &[Rule] {
        self.routes.get(route).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Route identifiers with at least one rule.
    pub fn routes(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    /// Total number of rules across all routes.
    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
