//! Resolver server implementation

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use denuncia_client::{BatchRecordFetcher, ContentPipeline};
use denuncia_core::{LedgerReader, ResolverConfig};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;

use crate::error::{ApiError, Result};
use crate::routes::create_router;
use crate::state::{AppState, NoLedger, SharedState};

pub struct ResolverServer<L> {
    state: SharedState<L>,
    addr: SocketAddr,
}

impl<L: LedgerReader + 'static> ResolverServer<L> {
    /// Run the server
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| ApiError::Internal(format!("bind {}: {}", self.addr, e)))?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr().unwrap_or(self.addr);
        let router = create_router(self.state);

        tracing::info!(%addr, "Starting resolver server");

        axum::serve(listener, router)
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        Ok(())
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the server state for testing
    pub fn state(&self) -> SharedState<L> {
        self.state.clone()
    }
}

/// Builder for ResolverServer
pub struct ServerBuilder<L = NoLedger> {
    config: ResolverConfig,
    addr: SocketAddr,
    ledger: Option<L>,
    preview_concurrency: usize,
    metrics: Option<PrometheusHandle>,
}

impl ServerBuilder<NoLedger> {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            addr: ([127, 0, 0, 1], 3000).into(),
            ledger: None,
            preview_concurrency: 4,
            metrics: None,
        }
    }
}

impl<L: LedgerReader + 'static> ServerBuilder<L> {
    /// Serve `/records` from this ledger
    pub fn ledger<M: LedgerReader + 'static>(self, ledger: M) -> ServerBuilder<M> {
        ServerBuilder {
            config: self.config,
            addr: self.addr,
            ledger: Some(ledger),
            preview_concurrency: self.preview_concurrency,
            metrics: self.metrics,
        }
    }

    pub fn addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.addr = ([0, 0, 0, 0], port).into();
        self
    }

    pub fn preview_concurrency(mut self, n: usize) -> Self {
        self.preview_concurrency = n.max(1);
        self
    }

    /// Expose `/metrics` from this recorder handle
    pub fn metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn build(self) -> Result<ResolverServer<L>> {
        let pipeline = ContentPipeline::new(&self.config)
            .map_err(|e| ApiError::Internal(format!("invalid resolver config: {}", e)))?;
        let fetcher = BatchRecordFetcher::new(self.config.batch.clone());

        let state = Arc::new(AppState {
            pipeline,
            fetcher,
            ledger: self.ledger,
            preview_concurrency: self.preview_concurrency,
            metrics: self.metrics,
        });

        Ok(ResolverServer {
            state,
            addr: self.addr,
        })
    }
}
