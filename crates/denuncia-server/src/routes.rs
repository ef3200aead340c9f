//! HTTP routes for the resolver server

use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use denuncia_client::{RecordListing, RecordPreview, RecordState, ResolvedContent};
use denuncia_core::{ContentId, GatewayEndpoint, LedgerReader};

use crate::error::{ApiError, Result};
use crate::metrics;
use crate::state::SharedState;

/// Health check response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    /// Current gateway order, promoted endpoint first
    pub gateways: Vec<GatewayEndpoint>,
    pub attempt_timeout_ms: u64,
    pub ledger_configured: bool,
}

#[derive(Deserialize)]
pub struct DecryptRequest {
    pub password: String,
}

#[derive(Deserialize)]
pub struct InspectRequest {
    pub raw: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectResponse {
    pub shape: &'static str,
    pub is_encrypted: bool,
    /// Canonical package string, when one was found
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
}

#[derive(Deserialize)]
pub struct RecordsQuery {
    /// Resolve each record for a preview (default true)
    pub previews: Option<bool>,
}

#[derive(Serialize)]
pub struct RecordsResponse {
    pub listing: RecordListing,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previews: Option<Vec<RecordPreview>>,
}

/// Status for a resolution result; the body always carries the details
pub fn content_status(content: &ResolvedContent) -> StatusCode {
    match content.state {
        RecordState::ResolutionFailed => StatusCode::BAD_GATEWAY,
        RecordState::DecryptionFailed => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::OK,
    }
}

fn content_response(route: &str, started: Instant, content: ResolvedContent) -> Response {
    let status = content_status(&content);
    metrics::record_resolution(&content);
    metrics::record_request(route, metrics::outcome_for(status), started.elapsed());
    (status, Json(content)).into_response()
}

fn rejected(route: &str, started: Instant, err: ApiError) -> ApiError {
    metrics::record_request(route, metrics::outcome_for(err.status()), started.elapsed());
    err
}

/// Health check endpoint
async fn health<L: LedgerReader + 'static>(State(state): State<SharedState<L>>) -> Json<HealthResponse> {
    let resolver = state.pipeline.resolver();
    Json(HealthResponse {
        status: "ok".to_string(),
        gateways: resolver.endpoints(),
        attempt_timeout_ms: resolver.attempt_timeout().as_millis() as u64,
        ledger_configured: state.ledger.is_some(),
    })
}

/// Resolve content without a passphrase
async fn get_content<L: LedgerReader + 'static>(
    State(state): State<SharedState<L>>,
    Path(cid): Path<String>,
) -> Result<Response> {
    let started = Instant::now();
    let cid = ContentId::parse(cid).map_err(|e| rejected(metrics::ROUTE_CONTENT, started, e.into()))?;

    let content = state.pipeline.resolve_and_maybe_decrypt(&cid, None).await;
    Ok(content_response(metrics::ROUTE_CONTENT, started, content))
}

/// Resolve and decrypt content with a passphrase
async fn decrypt_content<L: LedgerReader + 'static>(
    State(state): State<SharedState<L>>,
    Path(cid): Path<String>,
    Json(req): Json<DecryptRequest>,
) -> Result<Response> {
    let started = Instant::now();
    let cid = ContentId::parse(cid).map_err(|e| rejected(metrics::ROUTE_DECRYPT, started, e.into()))?;
    if req.password.is_empty() {
        return Err(rejected(
            metrics::ROUTE_DECRYPT,
            started,
            ApiError::BadRequest("password must not be empty".into()),
        ));
    }

    let content = state.pipeline.decrypt(&cid, &req.password).await;
    Ok(content_response(metrics::ROUTE_DECRYPT, started, content))
}

/// Classify a raw blob the way fetched content is classified
async fn inspect<L: LedgerReader + 'static>(
    State(state): State<SharedState<L>>,
    Json(req): Json<InspectRequest>,
) -> Json<InspectResponse> {
    let started = Instant::now();
    let normalized = state.pipeline.normalizer().normalize(&req.raw);
    let is_encrypted = normalized.is_encrypted();

    metrics::record_request(metrics::ROUTE_INSPECT, metrics::OUTCOME_OK, started.elapsed());
    Json(InspectResponse {
        shape: normalized.shape(),
        is_encrypted,
        canonical: is_encrypted.then(|| normalized.into_string()),
    })
}

/// List ledger records, newest first
async fn list_records<L: LedgerReader + 'static>(
    State(state): State<SharedState<L>>,
    Query(query): Query<RecordsQuery>,
) -> Result<Json<RecordsResponse>> {
    let started = Instant::now();
    let ledger = state
        .ledger
        .as_ref()
        .ok_or_else(|| rejected(metrics::ROUTE_RECORDS, started, ApiError::LedgerNotConfigured))?;

    let listing = state
        .fetcher
        .list_records(ledger)
        .await
        .map_err(|e| rejected(metrics::ROUTE_RECORDS, started, e.into()))?;

    let previews = match (&listing, query.previews.unwrap_or(true)) {
        (RecordListing::Listed(report), true) => {
            metrics::record_listing(report);
            Some(
                state
                    .pipeline
                    .preview_all(&report.records, state.preview_concurrency)
                    .await,
            )
        }
        (RecordListing::Listed(report), false) => {
            metrics::record_listing(report);
            None
        }
        (RecordListing::NoRecordsYet, _) => None,
    };

    metrics::record_request(metrics::ROUTE_RECORDS, metrics::OUTCOME_OK, started.elapsed());
    Ok(Json(RecordsResponse { listing, previews }))
}

/// Prometheus scrape endpoint
async fn metrics_endpoint<L: LedgerReader + 'static>(
    State(state): State<SharedState<L>>,
) -> Result<String> {
    state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .ok_or(ApiError::MetricsDisabled)
}

/// Create the router with all routes
pub fn create_router<L: LedgerReader + 'static>(state: SharedState<L>) -> Router {
    Router::new()
        .route("/health", get(health::<L>))
        .route("/content/{cid}", get(get_content::<L>))
        .route("/content/{cid}/decrypt", post(decrypt_content::<L>))
        .route("/inspect", post(inspect::<L>))
        .route("/records", get(list_records::<L>))
        .route("/metrics", get(metrics_endpoint::<L>))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use denuncia_core::ErrorKind;

    fn content(state: RecordState, error: Option<ErrorKind>) -> ResolvedContent {
        ResolvedContent {
            is_encrypted: false,
            plaintext: None,
            error,
            detail: None,
            state,
        }
    }

    #[test]
    fn test_content_status() {
        assert_eq!(content_status(&content(RecordState::Plain, None)), StatusCode::OK);
        assert_eq!(
            content_status(&content(RecordState::AwaitingPassphrase, None)),
            StatusCode::OK
        );
        assert_eq!(
            content_status(&content(
                RecordState::ResolutionFailed,
                Some(ErrorKind::AllEndpointsExhausted)
            )),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            content_status(&content(
                RecordState::DecryptionFailed,
                Some(ErrorKind::DecryptionFailed)
            )),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
