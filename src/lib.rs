//! Routegate - Per-Route Rate Limiting
//!
//! This crate implements admission control for web services. Each route can
//! carry a quota of requests per time window, counted per caller identity in
//! a Redis instance shared by every service process, so that all instances
//! enforce one logical limit.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod server;
pub mod telemetry;
