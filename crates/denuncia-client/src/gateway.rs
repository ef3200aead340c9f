//! Multi-gateway content resolution
//!
//! Endpoints are tried one at a time in order; the first non-empty 2xx body
//! wins. Each attempt races the request (headers and body) against a timer so
//! a stalled gateway cannot hold up the rest of the list.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use denuncia_core::constants::GATEWAY_ACCEPT;
use denuncia_core::{AttemptFailure, ContentId, ErrorKind, FetchOutcome, GatewayEndpoint, ResolverConfig};

use crate::error::Result;

/// Why a single endpoint attempt failed
struct AttemptError {
    kind: ErrorKind,
    detail: String,
}

impl AttemptError {
    fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Resolves content ids through an ordered list of gateways
pub struct GatewayResolver {
    http: Client,
    /// Current ordering; swapped whole on promotion
    endpoints: ArcSwap<Vec<GatewayEndpoint>>,
    attempt_timeout: Duration,
    promote_on_success: bool,
}

impl GatewayResolver {
    pub fn new(config: &ResolverConfig) -> Result<Self> {
        config.validate()?;
        let http = Client::builder().build()?;
        Ok(Self::with_client(http, config))
    }

    /// Use a caller-provided HTTP client (shared connection pool, proxies)
    pub fn with_client(http: Client, config: &ResolverConfig) -> Self {
        Self {
            http,
            endpoints: ArcSwap::from_pointee(config.ordered_gateways()),
            attempt_timeout: config.attempt_timeout(),
            promote_on_success: config.promote_on_success,
        }
    }

    /// Snapshot of the current endpoint ordering
    pub fn endpoints(&self) -> Vec<GatewayEndpoint> {
        Vec::clone(&self.endpoints.load())
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Resolve through the configured endpoints.
    pub async fn resolve(&self, content_id: &ContentId) -> FetchOutcome {
        let endpoints = self.endpoints.load_full();
        let outcome = self
            .try_in_order(content_id, &endpoints, self.attempt_timeout)
            .await;

        if self.promote_on_success {
            if let FetchOutcome::Success { endpoint, .. } = &outcome {
                self.promote(endpoint);
            }
        }
        outcome
    }

    /// Resolve through an explicit endpoint list, sorted by priority.
    /// Does not touch the shared ordering.
    pub async fn resolve_with(
        &self,
        content_id: &ContentId,
        endpoints: &[GatewayEndpoint],
        attempt_timeout: Duration,
    ) -> FetchOutcome {
        let mut ordered = endpoints.to_vec();
        ordered.sort_by_key(|e| e.priority);
        self.try_in_order(content_id, &ordered, attempt_timeout).await
    }

    /// Move `endpoint` to the front of the ordering used by later calls.
    ///
    /// Load-then-store: a concurrent promotion may be lost, which only
    /// affects which gateway is tried first next time.
    pub fn promote(&self, endpoint: &GatewayEndpoint) {
        let current = self.endpoints.load();
        if let Some(pos) = current.iter().position(|e| e == endpoint).filter(|&pos| pos > 0) {
            let mut next = Vec::clone(&current);
            let promoted = next.remove(pos);
            next.insert(0, promoted);
            self.endpoints.store(Arc::new(next));
            debug!(endpoint = %endpoint.base_url, from = pos, "Promoted gateway to front");
        }
    }

    async fn try_in_order(
        &self,
        content_id: &ContentId,
        endpoints: &[GatewayEndpoint],
        attempt_timeout: Duration,
    ) -> FetchOutcome {
        let mut failures = Vec::with_capacity(endpoints.len());

        for endpoint in endpoints {
            match self.attempt(content_id, endpoint, attempt_timeout).await {
                Ok(payload) => {
                    debug!(
                        content_id = %content_id,
                        endpoint = %endpoint.base_url,
                        bytes = payload.len(),
                        failed_before = failures.len(),
                        "Resolved content"
                    );
                    return FetchOutcome::Success {
                        payload,
                        endpoint: endpoint.clone(),
                    };
                }
                Err(e) => {
                    warn!(
                        content_id = %content_id,
                        endpoint = %endpoint.base_url,
                        kind = %e.kind,
                        detail = %e.detail,
                        "Gateway attempt failed"
                    );
                    failures.push(AttemptFailure {
                        endpoint: endpoint.clone(),
                        kind: e.kind,
                        detail: e.detail,
                    });
                }
            }
        }

        info!(
            content_id = %content_id,
            attempts = failures.len(),
            "All gateway endpoints exhausted"
        );
        FetchOutcome::exhausted(failures)
    }

    async fn attempt(
        &self,
        content_id: &ContentId,
        endpoint: &GatewayEndpoint,
        attempt_timeout: Duration,
    ) -> std::result::Result<String, AttemptError> {
        let url = endpoint.url_for(content_id.as_str());

        let request = async {
            let resp = self
                .http
                .get(&url)
                .header(ACCEPT, GATEWAY_ACCEPT)
                .send()
                .await
                .map_err(|e| AttemptError::new(ErrorKind::TransportError, e.to_string()))?;

            let status = resp.status();
            match status {
                StatusCode::TOO_MANY_REQUESTS => {
                    return Err(AttemptError::new(ErrorKind::RateLimited, "HTTP 429"));
                }
                StatusCode::NOT_FOUND => {
                    return Err(AttemptError::new(ErrorKind::NotFound, "HTTP 404"));
                }
                s if !s.is_success() => {
                    return Err(AttemptError::new(
                        ErrorKind::TransportError,
                        format!("HTTP {}", s.as_u16()),
                    ));
                }
                _ => {}
            }

            let body = resp
                .text()
                .await
                .map_err(|e| AttemptError::new(ErrorKind::TransportError, e.to_string()))?;
            if body.trim().is_empty() {
                return Err(AttemptError::new(ErrorKind::EmptyContent, "empty body"));
            }
            Ok(body)
        };

        match tokio::time::timeout(attempt_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(AttemptError::new(
                ErrorKind::Timeout,
                format!("no response within {}ms", attempt_timeout.as_millis()),
            )),
        }
    }
}
