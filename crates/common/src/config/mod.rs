//! Configuration management for Airwave services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__, or RELAY__ for the relay agent)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml, config/local.toml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Relay fleet configuration
    #[serde(default)]
    pub fleet: FleetConfig,

    /// Room binding configuration
    #[serde(default)]
    pub rooms: RoomConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL (postgres:// or sqlite://)
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// How long a SQLite writer waits on a locked database, in milliseconds
    #[serde(default = "default_sqlite_busy_timeout")]
    pub sqlite_busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Bearer token for the admin bootstrap routes. Admin routes are
    /// disabled when unset.
    #[serde(default)]
    pub admin_token: Option<String>,

    /// Credential hashing cost
    #[serde(default)]
    pub hashing: HashingConfig,
}

/// Argon2id cost parameters for every stored credential
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct HashingConfig {
    /// Memory cost in KiB
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,

    /// Number of passes
    #[serde(default = "default_iterations")]
    pub iterations: u32,

    /// Degree of parallelism
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FleetConfig {
    /// A relay whose last heartbeat is older than this is offline
    #[serde(default = "default_stale_window")]
    pub stale_window_secs: u64,

    /// Heartbeat period advertised to relays
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Upper bound for a room request waiting on a relay to come online
    #[serde(default = "default_max_relay_wait")]
    pub max_relay_wait_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoomConfig {
    /// Relay URLs shared by all tenants for public rooms
    #[serde(default)]
    pub shared_relay_urls: Vec<String>,

    /// ICE/TURN configuration snapshotted into rooms that do not bring their own
    #[serde(default = "default_ice_config")]
    pub default_ice_config: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Expose Prometheus metrics on /metrics
    #[serde(default = "default_enabled")]
    pub metrics_enabled: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second on unauthenticated relay endpoints
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Configuration for the relay-side registration agent
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayAgentConfig {
    /// Base URL of the registry gateway, e.g. https://registry.example.com/v1
    pub registry_url: String,

    /// Relay key issued by the tenant
    pub secret_key: String,

    /// Human-readable relay name
    pub name: String,

    /// Public signalling URL of the relay (ws:// or wss://)
    pub url: String,

    /// Public IP the relay announces in ICE candidates
    pub announced_ip: String,

    /// Media port
    pub port: u16,

    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    #[serde(default = "default_agent_request_timeout")]
    pub request_timeout_secs: u64,

    /// Give up initial registration after this long
    #[serde(default = "default_agent_max_elapsed")]
    pub max_registration_elapsed_secs: u64,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_database_url() -> String { "sqlite://airwave.db?mode=rwc".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 1 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_sqlite_busy_timeout() -> u64 { 5_000 }
fn default_memory_kib() -> u32 { argon2::Params::DEFAULT_M_COST }
fn default_iterations() -> u32 { argon2::Params::DEFAULT_T_COST }
fn default_parallelism() -> u32 { argon2::Params::DEFAULT_P_COST }
fn default_stale_window() -> u64 { crate::DEFAULT_STALE_WINDOW_SECS }
fn default_heartbeat_interval() -> u64 { crate::DEFAULT_HEARTBEAT_INTERVAL_SECS }
fn default_max_relay_wait() -> u64 { 30 }
fn default_ice_config() -> String {
    r#"{"iceServers":[{"urls":["stun:stun.l.google.com:19302"]}]}"#.to_string()
}
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_service_name() -> String { "airwave".to_string() }
fn default_rate_limit() -> u32 { 20 }
fn default_burst() -> u32 { 40 }
fn default_enabled() -> bool { true }
fn default_agent_request_timeout() -> u64 { 10 }
fn default_agent_max_elapsed() -> u64 { 300 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            sqlite_busy_timeout_ms: default_sqlite_busy_timeout(),
        }
    }
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
        }
    }
}

impl HashingConfig {
    /// Smallest parameters argon2 accepts. Only for tests.
    pub fn insecure_fast() -> Self {
        Self {
            memory_kib: argon2::Params::MIN_M_COST.max(8),
            iterations: 1,
            parallelism: 1,
        }
    }
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            stale_window_secs: default_stale_window(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            max_relay_wait_secs: default_max_relay_wait(),
        }
    }
}

impl FleetConfig {
    pub fn stale_window(&self) -> Duration {
        Duration::from_secs(self.stale_window_secs)
    }

    pub fn max_relay_wait(&self) -> Duration {
        Duration::from_secs(self.max_relay_wait_secs)
    }
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            shared_relay_urls: Vec::new(),
            default_ice_config: default_ice_config(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_enabled: default_enabled(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__FLEET__STALE_WINDOW_SECS=90
            .add_source(app_environment())

            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

impl RelayAgentConfig {
    /// Load from environment variables with RELAY__ prefix,
    /// e.g. RELAY__SECRET_KEY=rk_...
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name("config/relay-agent").required(false))
            .add_source(
                Environment::with_prefix("RELAY")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?
            .try_deserialize()
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn app_environment() -> Environment {
    Environment::with_prefix("APP")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("rooms.shared_relay_urls")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.fleet.stale_window_secs, 120);
        assert_eq!(config.fleet.heartbeat_interval_secs, 60);
        assert!(config.auth.admin_token.is_none());
    }

    #[test]
    fn test_default_ice_config_is_json() {
        let config = RoomConfig::default();
        let parsed: serde_json::Value = serde_json::from_str(&config.default_ice_config).unwrap();
        assert!(parsed.get("iceServers").is_some());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: AppConfig = Config::builder()
            .add_source(config::File::from_str(
                "[fleet]\nstale_window_secs = 90\n\n[rooms]\nshared_relay_urls = [\"wss://pool-1:4443\"]\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.fleet.stale_window(), Duration::from_secs(90));
        assert_eq!(config.fleet.heartbeat_interval_secs, 60);
        assert_eq!(config.rooms.shared_relay_urls, vec!["wss://pool-1:4443".to_string()]);
        assert_eq!(config.server.port, 8080);
    }
}
