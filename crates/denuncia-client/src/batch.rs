//! Batched, rate-limit-aware record enumeration
//!
//! Records are fetched in fixed-size batches: every request in a batch is
//! issued concurrently, and batches run one after another with a pause in
//! between. A batch in which any request was rate limited is retried whole
//! with exponential backoff. Other per-record failures drop just that record.
//!
//! When the indexed path cannot be used at all, the fetcher falls back to
//! scanning recent ledger events in block chunks, with the same batching.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::future::Future;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use denuncia_core::{BatchConfig, LedgerError, LedgerReader, LedgerRecordRef};

use crate::retry::RetryPolicy;

/// How the records in a report were found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumerationSource {
    Indexed,
    EventScan,
}

/// A record index or block range that could not be fetched
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedSpan {
    /// First index (indexed) or block (event scan)
    pub first: u64,
    /// Last index or block, inclusive
    pub last: u64,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchReport {
    /// Sorted most recent first
    pub records: Vec<LedgerRecordRef>,
    /// Individual fetches that failed for reasons other than rate limiting
    pub dropped: Vec<FailedSpan>,
    /// Batches abandoned after exhausting rate-limit retries
    pub skipped_batches: Vec<FailedSpan>,
    pub source: EnumerationSource,
}

impl FetchReport {
    pub fn empty(source: EnumerationSource) -> Self {
        Self {
            records: Vec::new(),
            dropped: Vec::new(),
            skipped_batches: Vec::new(),
            source,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.dropped.is_empty() && self.skipped_batches.is_empty()
    }
}

/// Result of listing the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordListing {
    /// The ledger has never indexed a record
    NoRecordsYet,
    Listed(FetchReport),
}

/// Unit of work in a batch
trait BatchKey: Copy + Debug {
    fn span(&self) -> (u64, u64);
}

impl BatchKey for u64 {
    fn span(&self) -> (u64, u64) {
        (*self, *self)
    }
}

impl BatchKey for (u64, u64) {
    fn span(&self) -> (u64, u64) {
        *self
    }
}

struct BatchRun<T> {
    values: Vec<T>,
    dropped: Vec<FailedSpan>,
    skipped: Vec<FailedSpan>,
}

pub struct BatchRecordFetcher {
    config: BatchConfig,
    policy: RetryPolicy,
}

impl BatchRecordFetcher {
    pub fn new(config: BatchConfig) -> Self {
        let policy = RetryPolicy::from_config(&config);
        Self { config, policy }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Fetch records `0..total` through `get_record`.
    ///
    /// Never fails as a whole: records that could not be fetched are listed
    /// in `dropped` or `skipped_batches` and left out of `records`.
    pub async fn fetch_all<F, Fut>(&self, total: u64, get_record: F) -> FetchReport
    where
        F: Fn(u64) -> Fut,
        Fut: Future<Output = Result<LedgerRecordRef, LedgerError>>,
    {
        if total == 0 {
            return FetchReport::empty(EnumerationSource::Indexed);
        }

        let size = self.config.batch_size.max(1);
        let batches = (0..total)
            .step_by(size)
            .map(|first| {
                let end = first.saturating_add(size as u64).min(total);
                (first..end).collect::<Vec<u64>>()
            });
        let run = self
            .run_batches(batches, total.div_ceil(size as u64), get_record)
            .await;

        let mut records = run.values;
        records.sort_by(LedgerRecordRef::newest_first);

        info!(
            total,
            fetched = records.len(),
            dropped = run.dropped.len(),
            skipped_batches = run.skipped.len(),
            "Indexed enumeration complete"
        );

        FetchReport {
            records,
            dropped: run.dropped,
            skipped_batches: run.skipped,
            source: EnumerationSource::Indexed,
        }
    }

    /// List every record the ledger knows about.
    ///
    /// A zero count, or a count that cannot be decoded (the usual answer
    /// from a contract with nothing stored yet), yields `NoRecordsYet`. If the
    /// count is unavailable or the indexed path returns nothing, recent
    /// events are scanned instead.
    pub async fn list_records<L: LedgerReader>(
        &self,
        ledger: &L,
    ) -> Result<RecordListing, LedgerError> {
        let total = self
            .policy
            .run(LedgerError::is_rate_limited, || ledger.total_records())
            .await;

        let indexed = match total {
            Ok(0) => {
                info!("Ledger reports no records");
                return Ok(RecordListing::NoRecordsYet);
            }
            Err(LedgerError::Decode(e)) => {
                info!(error = %e, "Record count not decodable, treating as no records yet");
                return Ok(RecordListing::NoRecordsYet);
            }
            Ok(total) => {
                let report = self.fetch_all(total, |i| ledger.record_at(i)).await;
                if !report.records.is_empty() {
                    return Ok(RecordListing::Listed(report));
                }
                warn!(total, "Indexed enumeration returned nothing, scanning events");
                Some(report)
            }
            Err(e) => {
                warn!(error = %e, "Record count unavailable, scanning events");
                None
            }
        };

        let mut report = self.scan_events(ledger).await?;
        if let Some(indexed) = indexed {
            report.dropped.extend(indexed.dropped);
            report.skipped_batches.extend(indexed.skipped_batches);
        }
        Ok(RecordListing::Listed(report))
    }

    /// Enumerate records from creation events in the recent block window.
    pub async fn scan_events<L: LedgerReader>(&self, ledger: &L) -> Result<FetchReport, LedgerError> {
        let head = self
            .policy
            .run(LedgerError::is_rate_limited, || ledger.head_block())
            .await?;
        let from = head.saturating_sub(self.config.log_scan_window);
        let chunk = self.config.log_chunk_blocks.max(1);

        let ranges: Vec<(u64, u64)> = (from..=head)
            .step_by(chunk as usize)
            .map(|start| (start, start.saturating_add(chunk - 1).min(head)))
            .collect();

        debug!(from, head, chunks = ranges.len(), "Scanning record events");

        let size = self.config.batch_size.max(1);
        let run = self
            .run_batches(
                ranges.chunks(size).map(<[(u64, u64)]>::to_vec),
                ranges.len().div_ceil(size) as u64,
                |(start, end)| ledger.record_events(start, end),
            )
            .await;

        if run.values.is_empty() && run.dropped.len() + run.skipped.len() == ranges.len() {
            let reason = run
                .dropped
                .iter()
                .chain(run.skipped.iter())
                .map(|s| s.error.as_str())
                .next()
                .unwrap_or("no block ranges")
                .to_string();
            return Err(LedgerError::Unavailable(format!(
                "event scan failed for every block range: {}",
                reason
            )));
        }

        // Overlapping chunks or reorgs can repeat an event
        let mut by_index = BTreeMap::new();
        for record in run.values.into_iter().flatten() {
            by_index.entry(record.index).or_insert(record);
        }
        let mut records: Vec<LedgerRecordRef> = by_index.into_values().collect();
        records.sort_by(LedgerRecordRef::newest_first);

        info!(
            from,
            head,
            fetched = records.len(),
            failed_ranges = run.dropped.len() + run.skipped.len(),
            "Event scan complete"
        );

        Ok(FetchReport {
            records,
            dropped: run.dropped,
            skipped_batches: run.skipped,
            source: EnumerationSource::EventScan,
        })
    }

    /// Batches are produced on demand, so `batch_count` may describe far more
    /// work than could be held in memory at once.
    async fn run_batches<K, T, I, F, Fut>(&self, batches: I, batch_count: u64, fetch: F) -> BatchRun<T>
    where
        K: BatchKey,
        I: IntoIterator<Item = Vec<K>>,
        F: Fn(K) -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let mut run = BatchRun {
            values: Vec::new(),
            dropped: Vec::new(),
            skipped: Vec::new(),
        };

        for (n, batch) in batches.into_iter().enumerate() {
            if n > 0 && !self.config.inter_batch_delay().is_zero() {
                tokio::time::sleep(self.config.inter_batch_delay()).await;
            }

            let result = self
                .policy
                .run(LedgerError::is_rate_limited, || fetch_batch(&batch, &fetch))
                .await;

            match result {
                Ok(results) => {
                    for (key, result) in results {
                        match result {
                            Ok(value) => run.values.push(value),
                            Err(e) => {
                                warn!(key = ?key, error = %e, "Dropping failed fetch");
                                let (first, last) = key.span();
                                run.dropped.push(FailedSpan {
                                    first,
                                    last,
                                    error: e.to_string(),
                                });
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        batch = n + 1,
                        batches = batch_count,
                        error = %e,
                        "Batch skipped after exhausting retries"
                    );
                    let (first, _) = batch[0].span();
                    let (_, last) = batch[batch.len() - 1].span();
                    run.skipped.push(FailedSpan {
                        first,
                        last,
                        error: e.to_string(),
                    });
                }
            }

            debug!(batch = n + 1, batches = batch_count, "Batch complete");
        }

        run
    }
}

/// Issue one batch concurrently. A rate-limited member fails the whole
/// batch so it can be retried together.
async fn fetch_batch<K, T, F, Fut>(
    batch: &[K],
    fetch: &F,
) -> Result<Vec<(K, Result<T, LedgerError>)>, LedgerError>
where
    K: BatchKey,
    F: Fn(K) -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    let results = join_all(batch.iter().map(|&key| fetch(key))).await;

    if let Some(limited) = results
        .iter()
        .find_map(|r| r.as_ref().err().filter(|e| e.is_rate_limited()))
    {
        return Err(limited.clone());
    }

    Ok(batch.iter().copied().zip(results).collect())
}
