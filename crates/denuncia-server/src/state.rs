//! Server state: resolver pipeline, record fetcher and optional ledger

use std::sync::Arc;

use denuncia_client::{BatchRecordFetcher, ContentPipeline};
use denuncia_core::{LedgerError, LedgerReader, LedgerRecordRef};
use metrics_exporter_prometheus::PrometheusHandle;

pub struct AppState<L> {
    pub pipeline: ContentPipeline,
    pub fetcher: BatchRecordFetcher,
    /// `None` when the server only resolves content
    pub ledger: Option<L>,
    /// Resolutions in flight while building listing previews
    pub preview_concurrency: usize,
    pub metrics: Option<PrometheusHandle>,
}

pub type SharedState<L> = Arc<AppState<L>>;

/// Ledger type for servers started without one
pub struct NoLedger;

fn not_configured() -> LedgerError {
    LedgerError::Unavailable("no ledger configured".into())
}

impl LedgerReader for NoLedger {
    async fn total_records(&self) -> Result<u64, LedgerError> {
        Err(not_configured())
    }

    async fn record_at(&self, _index: u64) -> Result<LedgerRecordRef, LedgerError> {
        Err(not_configured())
    }

    async fn record_events(
        &self,
        _from_block: u64,
        _to_block: u64,
    ) -> Result<Vec<LedgerRecordRef>, LedgerError> {
        Err(not_configured())
    }

    async fn head_block(&self) -> Result<u64, LedgerError> {
        Err(not_configured())
    }
}
