//! JSON-RPC access to the record index contract
//!
//! [`LedgerRpcClient`] implements [`denuncia_core::LedgerReader`] on top of an
//! alloy `RpcClient`:
//! - `total_records` / `record_at` via `eth_call`
//! - `record_events` via `eth_getLogs` over the creation event
//! - `head_block` via `eth_blockNumber`
//!
//! Transport failures are classified so the batch fetcher can tell rate
//! limiting (retry) from an empty contract (no records yet).
//!
//! ## Usage
//!
//! ```no_run
//! use denuncia_core::{LedgerReader, LedgerSettings};
//! use denuncia_ledger::LedgerRpcClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = LedgerSettings {
//!         contract_address: "0x5FbDB2315678afecb367f032d93F642f64180aa3".into(),
//!         ..Default::default()
//!     };
//!     let ledger = LedgerRpcClient::connect(&settings).await?;
//!     println!("{} records", ledger.total_records().await?);
//!     Ok(())
//! }
//! ```

pub mod abi;
mod rpc;

pub use rpc::{classify, LedgerRpcClient};
