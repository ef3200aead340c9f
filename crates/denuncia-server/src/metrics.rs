//! Prometheus metrics for the resolver server
//!
//! Labels carry route names, outcomes and error kinds only; never content
//! ids, passphrases or plaintext.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

use denuncia_client::{FetchReport, ResolvedContent};

pub const ROUTE_CONTENT: &str = "content";
pub const ROUTE_DECRYPT: &str = "decrypt";
pub const ROUTE_INSPECT: &str = "inspect";
pub const ROUTE_RECORDS: &str = "records";

pub const OUTCOME_OK: &str = "ok";
pub const OUTCOME_CLIENT_ERROR: &str = "client_error";
pub const OUTCOME_SERVER_ERROR: &str = "server_error";

pub fn outcome_for(status: axum::http::StatusCode) -> &'static str {
    if status.is_server_error() {
        OUTCOME_SERVER_ERROR
    } else if status.is_client_error() {
        OUTCOME_CLIENT_ERROR
    } else {
        OUTCOME_OK
    }
}

pub fn record_request(route: &str, outcome: &str, duration: Duration) {
    counter!("denuncia_requests_total", "route" => route.to_string(), "outcome" => outcome.to_string())
        .increment(1);
    histogram!("denuncia_request_duration_seconds", "route" => route.to_string(), "outcome" => outcome.to_string())
        .record(duration.as_secs_f64());
}

/// Resolution result keyed by error kind, or by final state on success
pub fn record_resolution(content: &ResolvedContent) {
    let outcome = match content.error {
        Some(kind) => kind.as_str(),
        None => match content.state {
            denuncia_client::RecordState::Decrypted => "decrypted",
            denuncia_client::RecordState::AwaitingPassphrase => "awaiting_passphrase",
            _ => "plain",
        },
    };
    counter!("denuncia_resolutions_total", "outcome" => outcome).increment(1);
}

pub fn record_listing(report: &FetchReport) {
    gauge!("denuncia_listing_records").set(report.records.len() as f64);
    counter!("denuncia_listing_dropped_total").increment(report.dropped.len() as u64);
    counter!("denuncia_listing_skipped_batches_total").increment(report.skipped_batches.len() as u64);
}

pub fn init_prometheus_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}
