//! Resolver configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Error;
use crate::normalize::DEFAULT_WRAPPED_FIELDS;
use crate::outcome::GatewayEndpoint;

/// Public gateways tried when no list is configured
pub const DEFAULT_GATEWAYS: &[&str] = &[
    "https://ipfs.io/ipfs/",
    "https://gateway.pinata.cloud/ipfs/",
    "https://dweb.link/ipfs/",
    "https://w3s.link/ipfs/",
];

/// Top-level configuration for resolving ledger records
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverConfig {
    /// Gateway endpoints, tried in priority order
    #[serde(default = "default_gateways")]
    pub gateways: Vec<GatewayEndpoint>,
    /// Per-attempt deadline covering request and body
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
    /// Move the last successful gateway to the front for later calls
    #[serde(default = "default_true")]
    pub promote_on_success: bool,
    /// Field names that may hold wrapped ciphertext
    #[serde(default = "default_wrapped_fields")]
    pub wrapped_fields: Vec<String>,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub ledger: LedgerSettings,
}

/// Batching and backoff for record enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchConfig {
    /// Records fetched concurrently per batch
    pub batch_size: usize,
    /// Pause between consecutive batches
    pub inter_batch_delay_ms: u64,
    /// Attempts per batch when rate limited (including the first)
    pub max_attempts: u32,
    /// First backoff delay; doubles on every further attempt
    pub base_delay_ms: u64,
    /// Blocks scanned backwards from head by the event fallback
    pub log_scan_window: u64,
    /// Blocks per event query
    pub log_chunk_blocks: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            inter_batch_delay_ms: 1000,
            max_attempts: 3,
            base_delay_ms: 1000,
            log_scan_window: 50_000,
            log_chunk_blocks: 5_000,
        }
    }
}

impl BatchConfig {
    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// No delays, for tests and one-shot tooling
    pub fn immediate(batch_size: usize) -> Self {
        Self {
            batch_size,
            inter_batch_delay_ms: 0,
            base_delay_ms: 0,
            ..Self::default()
        }
    }
}

/// Where the record index lives on chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LedgerSettings {
    /// JSON-RPC endpoint
    pub rpc_url: String,
    /// Contract holding the record index (0x-prefixed)
    pub contract_address: String,
    /// `() -> uint256`
    pub total_signature: String,
    /// `(uint256) -> (address author, string contentId, uint256 createdAt)`
    pub record_signature: String,
    /// `(uint256 indexed id, address indexed author, string contentId, uint256 createdAt)`
    pub event_signature: String,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".into(),
            contract_address: String::new(),
            total_signature: "totalDenuncias()".into(),
            record_signature: "obtenerDenuncia(uint256)".into(),
            event_signature: "DenunciaCreada(uint256,address,string,uint256)".into(),
        }
    }
}

fn default_gateways() -> Vec<GatewayEndpoint> {
    DEFAULT_GATEWAYS
        .iter()
        .enumerate()
        .map(|(i, url)| GatewayEndpoint::new(*url, i as i32))
        .collect()
}

fn default_attempt_timeout_ms() -> u64 {
    8_000
}

fn default_true() -> bool {
    true
}

fn default_wrapped_fields() -> Vec<String> {
    DEFAULT_WRAPPED_FIELDS.iter().map(|s| s.to_string()).collect()
}

impl ResolverConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Replace the gateway list, keeping the given order as priority
    pub fn with_gateways<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.gateways = urls
            .into_iter()
            .enumerate()
            .map(|(i, url)| GatewayEndpoint::new(url, i as i32))
            .collect();
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    /// Gateways sorted by priority; ties keep configuration order
    pub fn ordered_gateways(&self) -> Vec<GatewayEndpoint> {
        let mut gateways = self.gateways.clone();
        gateways.sort_by_key(|g| g.priority);
        gateways
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.gateways.is_empty() {
            return Err(Error::InvalidConfig("no gateway endpoints configured".into()));
        }
        if let Some(bad) = self.gateways.iter().find(|g| !g.base_url.starts_with("http")) {
            return Err(Error::InvalidConfig(format!(
                "gateway base URL must be http(s): {}",
                bad.base_url
            )));
        }
        if self.attempt_timeout_ms == 0 {
            return Err(Error::InvalidConfig("attemptTimeoutMs must be positive".into()));
        }
        if self.batch.batch_size == 0 {
            return Err(Error::InvalidConfig("batch.batchSize must be positive".into()));
        }
        if self.batch.max_attempts == 0 {
            return Err(Error::InvalidConfig("batch.maxAttempts must be positive".into()));
        }
        if self.batch.log_chunk_blocks == 0 {
            return Err(Error::InvalidConfig("batch.logChunkBlocks must be positive".into()));
        }
        if self.wrapped_fields.is_empty() {
            return Err(Error::InvalidConfig("wrappedFields must not be empty".into()));
        }
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            gateways: default_gateways(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            promote_on_success: true,
            wrapped_fields: default_wrapped_fields(),
            batch: BatchConfig::default(),
            ledger: LedgerSettings::default(),
        }
    }
}
