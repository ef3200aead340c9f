//! Ledger collaborator seam

use std::future::Future;

use thiserror::Error;

use crate::record::LedgerRecordRef;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The data source asked us to slow down (HTTP 429 or an RPC limit code)
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Returned data could not be decoded; on a fresh contract this is the
    /// signature of "no records yet"
    #[error("Decode error: {0}")]
    Decode(String),

    /// The call reached the node but was rejected (revert, bad index)
    #[error("RPC error: {0}")]
    Rpc(String),

    /// The node or the enumeration method could not be reached
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

impl LedgerError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, LedgerError::RateLimited(_))
    }
}

/// Read-only view of the ledger that indexes records.
///
/// Implementations must return `Send` futures so listings can be served from
/// multi-threaded runtimes.
pub trait LedgerReader: Send + Sync {
    /// Number of indexed records
    fn total_records(&self) -> impl Future<Output = Result<u64, LedgerError>> + Send;

    /// Record at `index` in `[0, total_records())`
    fn record_at(
        &self,
        index: u64,
    ) -> impl Future<Output = Result<LedgerRecordRef, LedgerError>> + Send;

    /// Records announced by events in the inclusive block range
    fn record_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> impl Future<Output = Result<Vec<LedgerRecordRef>, LedgerError>> + Send;

    /// Latest block known to the ledger
    fn head_block(&self) -> impl Future<Output = Result<u64, LedgerError>> + Send;
}
