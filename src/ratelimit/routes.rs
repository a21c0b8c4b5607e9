//! Per-route rate limit table.
//!
//! Routes are keyed by their identifier, which for axum is the matched path
//! template. Rules can be registered in code (with strategy overrides) or
//! loaded from a YAML file:
//!
//! ```yaml
//! routes:
//!   /api/v1/sample/:
//!     times: 5
//!     seconds: 10
//! ```

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::rule::{RateLimit, RuleSpec};
use crate::error::Result;

/// File form of a route table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRulesFile {
    #[serde(default)]
    pub routes: BTreeMap<String, RuleSpec>,
}

/// Rules indexed by route identifier. Swappable as a whole on reload.
#[derive(Debug, Default)]
pub struct RouteLimits {
    rules: RwLock<HashMap<String, Arc<RateLimit>>>,
}

impl RouteLimits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(self, route: impl Into<String>, rule: RateLimit) -> Self {
        self.insert(route, rule);
        self
    }

    pub fn insert(&self, route: impl Into<String>, rule: RateLimit) {
        let route = route.into();
        if !rule.is_enabled() {
            warn!(route = %route, rule = ?rule, "Rate limit rule never limits, ignoring it");
        }
        self.rules.write().insert(route, Arc::new(rule));
    }

    /// Rule for `route`, if one is registered.
    pub fn get(&self, route: &str) -> Option<Arc<RateLimit>> {
        self.rules.read().get(route).cloned()
    }

    /// Replace every rule with the contents of `other`.
    pub fn replace(&self, other: RouteLimits) {
        let rules = other.rules.into_inner();
        *self.rules.write() = rules;
    }

    /// Add rules from `other` for routes not already present.
    pub fn merge_missing(&self, other: &RouteLimits) {
        let theirs = other.rules.read();
        let mut ours = self.rules.write();
        for (route, rule) in theirs.iter() {
            ours.entry(route.clone()).or_insert_with(|| rule.clone());
        }
    }

    pub fn routes(&self) -> Vec<String> {
        let mut routes: Vec<String> = self.rules.read().keys().cloned().collect();
        routes.sort();
        routes
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }

    /// Load a route table from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading route rate limits");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load a route table from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: RouteRulesFile = serde_yaml::from_str(yaml)?;
        Ok(Self::from(file))
    }
}

impl From<RouteRulesFile> for RouteLimits {
    fn from(file: RouteRulesFile) -> Self {
        let limits = RouteLimits::new();
        for (route, spec) in file.routes {
            limits.insert(route, RateLimit::from(spec));
        }
        limits
    }
}
