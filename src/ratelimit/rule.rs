//! Rate limit rules attached to routes.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::callback::LimitCallback;
use super::identity::Identifier;

const MS_PER_SECOND: u64 = 1_000;
const MS_PER_MINUTE: u64 = 60_000;
const MS_PER_HOUR: u64 = 3_600_000;

/// A per-route rate limit: at most `times` requests per window.
///
/// The window is the sum of the duration fields. Rules are built once when
/// routes are registered and shared read-only afterwards.
#[derive(Clone)]
pub struct RateLimit {
    /// Number of requests admitted per window
    pub times: u64,
    pub milliseconds: u64,
    pub seconds: u64,
    pub minutes: u64,
    pub hours: u64,
    /// Overrides the limiter's default identifier for this route
    pub identifier: Option<Arc<dyn Identifier>>,
    /// Overrides the limiter's default callback for this route
    pub callback: Option<Arc<dyn LimitCallback>>,
}

impl RateLimit {
    /// Create a rule admitting `times` requests per (still empty) window.
    pub fn new(times: u64) -> Self {
        Self {
            times,
            ..Self::default()
        }
    }

    pub fn milliseconds(mut self, milliseconds: u64) -> Self {
        self.milliseconds = milliseconds;
        self
    }

    pub fn seconds(mut self, seconds: u64) -> Self {
        self.seconds = seconds;
        self
    }

    pub fn minutes(mut self, minutes: u64) -> Self {
        self.minutes = minutes;
        self
    }

    pub fn hours(mut self, hours: u64) -> Self {
        self.hours = hours;
        self
    }

    pub fn with_identifier(mut self, identifier: Arc<dyn Identifier>) -> Self {
        self.identifier = Some(identifier);
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn LimitCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Window length in milliseconds.
    pub fn total_ms(&self) -> u64 {
        self.milliseconds
            .saturating_add(self.seconds.saturating_mul(MS_PER_SECOND))
            .saturating_add(self.minutes.saturating_mul(MS_PER_MINUTE))
            .saturating_add(self.hours.saturating_mul(MS_PER_HOUR))
    }

    /// A rule with no quota or no window never limits anything.
    pub fn is_enabled(&self) -> bool {
        self.times > 0 && self.total_ms() > 0
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            times: 1,
            milliseconds: 0,
            seconds: 0,
            minutes: 0,
            hours: 0,
            identifier: None,
            callback: None,
        }
    }
}

impl fmt::Debug for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimit")
            .field("times", &self.times)
            .field("window_ms", &self.total_ms())
            .field("identifier", &self.identifier.is_some())
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Serialized form of a rule as it appears in rule files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Number of requests allowed per window
    #[serde(default = "default_times")]
    pub times: u64,
    #[serde(default)]
    pub milliseconds: u64,
    #[serde(default)]
    pub seconds: u64,
    #[serde(default)]
    pub minutes: u64,
    #[serde(default)]
    pub hours: u64,
}

fn default_times() -> u64 {
    1
}

impl From<RuleSpec> for RateLimit {
    fn from(spec: RuleSpec) -> Self {
        RateLimit::new(spec.times)
            .milliseconds(spec.milliseconds)
            .seconds(spec.seconds)
            .minutes(spec.minutes)
            .hours(spec.hours)
    }
}
