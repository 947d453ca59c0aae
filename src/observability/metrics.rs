//! # Metrics Collection
//!
//! Prometheus metrics for the front end. Counters go through the `metrics`
//! facade, so recording is a no-op until [`init_metrics`] installs the
//! exporter.

use std::net::SocketAddr;

use ::tracing::{info, warn};
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};

/// Metrics recorder that tracks front-end metrics
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    /// Create a new metrics recorder instance
    pub fn new() -> Self {
        Self
    }

    /// Record a completed HTTP request
    pub fn record_http_request(&self, method: &str, endpoint: &str, status: u16, duration: f64) {
        counter!(
            "wfe_http_requests_total",
            "method" => method.to_string(),
            "endpoint" => endpoint.to_string(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!("wfe_http_request_duration_seconds", "endpoint" => endpoint.to_string())
            .record(duration);
    }

    /// Record the status code of an error response
    pub fn record_error_code(&self, status: u16) {
        counter!("wfe_http_error_codes_total", "code" => status.to_string()).increment(1);
    }

    /// Record the problem type of an error response
    pub fn record_problem_type(&self, problem_type: &str) {
        counter!("wfe_http_problem_types_total", "type" => problem_type.to_string()).increment(1);
    }

    /// Record why a signed POST was rejected
    pub fn record_verification_failure(&self, reason: &str) {
        counter!("wfe_verification_failures_total", "reason" => reason.to_string()).increment(1);
    }

    /// Record a call to a backend collaborator
    pub fn record_backend_call(&self, operation: &str, success: bool, duration: f64) {
        let status = if success { "success" } else { "error" };
        counter!(
            "wfe_backend_calls_total",
            "operation" => operation.to_string(),
            "status" => status
        )
        .increment(1);
        histogram!("wfe_backend_call_duration_seconds", "operation" => operation.to_string())
            .record(duration);
    }

    /// Record nonce issuance or consumption outcome
    pub fn record_nonce(&self, outcome: &'static str) {
        counter!("wfe_nonces_total", "outcome" => outcome).increment(1);
    }

    /// Register descriptions so Prometheus exports appear before events occur.
    pub fn register_wfe_metrics(&self) {
        describe_counter!(
            "wfe_http_requests_total",
            Unit::Count,
            "HTTP requests grouped by method, endpoint and status"
        );
        describe_histogram!(
            "wfe_http_request_duration_seconds",
            Unit::Seconds,
            "HTTP request latency per endpoint"
        );
        describe_counter!(
            "wfe_http_error_codes_total",
            Unit::Count,
            "Error responses grouped by status code"
        );
        describe_counter!(
            "wfe_http_problem_types_total",
            Unit::Count,
            "Error responses grouped by problem type"
        );
        describe_counter!(
            "wfe_verification_failures_total",
            Unit::Count,
            "Rejected signed requests grouped by reason"
        );
        describe_counter!(
            "wfe_backend_calls_total",
            Unit::Count,
            "Registration authority and storage calls grouped by outcome"
        );
        describe_histogram!(
            "wfe_backend_call_duration_seconds",
            Unit::Seconds,
            "Backend call latency per operation"
        );
        describe_counter!("wfe_nonces_total", Unit::Count, "Nonces issued, consumed or rejected");

        const NONCE_OUTCOMES: &[&str] = &["issued", "consumed", "rejected", "issue_failed"];
        for outcome in NONCE_OUTCOMES {
            counter!("wfe_nonces_total", "outcome" => *outcome).absolute(0);
        }
    }
}

/// Initialize metrics collection and Prometheus exporter
pub async fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    if !config.enable_metrics {
        return Ok(());
    }

    let metrics_addr = match config.metrics_bind_address() {
        Some(addr) => addr,
        None => {
            warn!("Metrics disabled: no bind address configured");
            return Ok(());
        }
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        Error::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    let builder = PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name);

    builder
        .install()
        .map_err(|e| Error::config(format!("Failed to initialize metrics exporter: {}", e)))?;

    MetricsRecorder::new().register_wfe_metrics();

    info!(
        metrics_addr = %metrics_addr,
        service_name = %config.service_name,
        "Metrics collection initialized"
    );

    Ok(())
}
