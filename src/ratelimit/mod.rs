//! Rate limiting logic and state management.

mod callback;
mod identity;
mod limiter;
mod memory_store;
mod middleware;
mod redis_store;
mod request;
mod routes;
mod rule;
mod script;
mod store;

pub use callback::{
    retry_after_secs, DefaultCallback, ErrorBody, LimitCallback, PassThrough, Rejection, Verdict,
};
pub use identity::{DefaultIdentifier, Identifier};
pub use limiter::RateLimiter;
pub use memory_store::MemoryStore;
pub use middleware::{enforce_rate_limit, RateLimitState};
pub use redis_store::RedisStore;
pub use request::GateRequest;
pub use routes::{RouteLimits, RouteRulesFile};
pub use rule::{RateLimit, RuleSpec};
pub use script::CHECK_SCRIPT;
pub use store::{CounterStore, ScriptHandle};
