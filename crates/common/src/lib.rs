//! Airwave Common Library
//!
//! Shared code for the Airwave fleet registry services including:
//! - Database entities, schema bootstrap and repository
//! - Tenant, relay and room services (the fleet core)
//! - Credential hashing and bearer authentication
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod errors;
pub mod fleet;
pub mod metrics;
pub mod wire;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default staleness window for relay heartbeats, in seconds
pub const DEFAULT_STALE_WINDOW_SECS: u64 = 120;

/// Default relay heartbeat period, in seconds
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 60;
