//! vpsprobe-core — library behind the `vpsprobed` reporting agent.
//!
//! Provides:
//! - `collector` — host metrics from `/proc` and `statvfs(3)`
//! - `state` — persisted bandwidth counters and their reconciliation
//! - `signer` — HMAC-SHA256 request signatures
//! - `payload` — the JSON report body
//! - `transport` — outbound delivery of signed reports
//! - `reporter` — one collect/reconcile/send/commit cycle
//! - `scheduler` — fixed-interval loop driving the reporter
//! - `config` — validated runtime configuration

pub mod collector;
pub mod config;
pub mod payload;
pub mod reporter;
pub mod scheduler;
pub mod signer;
pub mod state;
pub mod transport;

/// Agent version reported in payload metadata and the `User-Agent` header.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Short git commit the agent was built from, or `unknown`.
pub const GIT_SHA: &str = env!("VPSPROBE_GIT_SHA");

/// Product name used in the `User-Agent` header.
pub const AGENT_NAME: &str = "vps-probe-agent";
