//! Metrics and observability utilities
//!
//! Provides Prometheus metric descriptions, recording helpers for the fleet
//! core, and tracing subscriber setup shared by the binaries.

use crate::config::ObservabilityConfig;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Metrics prefix for all Airwave metrics
pub const METRICS_PREFIX: &str = "airwave";

/// Buckets for credential scans: argon2 verification dominates, and the
/// scan is linear in the number of stored credentials
pub const CREDENTIAL_SCAN_BUCKETS: &[f64] = &[
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Relay fleet metrics
    describe_counter!(
        format!("{}_relay_keys_issued_total", METRICS_PREFIX),
        Unit::Count,
        "Relay keys issued"
    );

    describe_counter!(
        format!("{}_relay_registrations_total", METRICS_PREFIX),
        Unit::Count,
        "Relay registration attempts by outcome"
    );

    describe_counter!(
        format!("{}_relay_heartbeats_total", METRICS_PREFIX),
        Unit::Count,
        "Relay heartbeats by outcome"
    );

    describe_gauge!(
        format!("{}_relays_online", METRICS_PREFIX),
        Unit::Count,
        "Relays within the staleness window at the last listing"
    );

    describe_histogram!(
        format!("{}_credential_scan_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Time spent scanning stored credential hashes"
    );

    // Auth metrics
    describe_counter!(
        format!("{}_auth_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Rejected credentials by kind"
    );

    // Room metrics
    describe_counter!(
        format!("{}_rooms_created_total", METRICS_PREFIX),
        Unit::Count,
        "Rooms created by binding mode"
    );

    tracing::info!("Metrics registered");
}

/// Install the tracing subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.json_logging {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

pub fn record_key_issued() {
    counter!(format!("{}_relay_keys_issued_total", METRICS_PREFIX)).increment(1);
}

/// `outcome` is one of `registered`, `rejected`, `invalid`
pub fn record_registration(outcome: &'static str) {
    counter!(
        format!("{}_relay_registrations_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_heartbeat(known: bool) {
    let outcome = if known { "accepted" } else { "unknown" };
    counter!(
        format!("{}_relay_heartbeats_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_online_relays(count: usize) {
    gauge!(format!("{}_relays_online", METRICS_PREFIX)).set(count as f64);
}

/// `kind` names the credential type: `tenant_key`, `relay_key`, `join_token`, `admin_token`
pub fn record_credential_scan(kind: &'static str, duration_secs: f64) {
    histogram!(
        format!("{}_credential_scan_duration_seconds", METRICS_PREFIX),
        "kind" => kind
    )
    .record(duration_secs);
}

pub fn record_auth_failure(kind: &'static str) {
    counter!(
        format!("{}_auth_failures_total", METRICS_PREFIX),
        "kind" => kind
    )
    .increment(1);
}

pub fn record_room_created(local_only: bool) {
    let mode = if local_only { "local" } else { "shared" };
    counter!(
        format!("{}_rooms_created_total", METRICS_PREFIX),
        "mode" => mode
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_buckets_sorted() {
        let mut prev = 0.0;
        for &bucket in CREDENTIAL_SCAN_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
    }

    #[test]
    fn test_recorders_without_installed_exporter() {
        // The metrics facade is a no-op until a recorder is installed
        let metrics = RequestMetrics::start("POST", "/v1/relays/register");
        metrics.finish(200);
        record_registration("registered");
        record_heartbeat(false);
        record_online_relays(3);
        record_credential_scan("relay_key", 0.01);
        record_room_created(true);
    }
}
