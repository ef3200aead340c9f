//! Network side of the resolver
//!
//! - [`GatewayResolver`]: sequential multi-gateway fetch with per-attempt
//!   timeouts and last-success promotion
//! - [`BatchRecordFetcher`]: batched ledger enumeration with backoff and an
//!   event-scan fallback
//! - [`ContentPipeline`]: fetch, normalize and decrypt in one call
//!
//! ## Usage
//!
//! ```no_run
//! use denuncia_client::ContentPipeline;
//! use denuncia_core::{ContentId, ResolverConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pipeline = ContentPipeline::new(&ResolverConfig::default())?;
//!     let cid = ContentId::parse("QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG")?;
//!     let content = pipeline.resolve_and_maybe_decrypt(&cid, Some("passphrase")).await;
//!     println!("{:?}", content.state);
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod error;
pub mod gateway;
pub mod pipeline;
pub mod retry;

pub use batch::{BatchRecordFetcher, EnumerationSource, FailedSpan, FetchReport, RecordListing};
pub use error::{ClientError, Result};
pub use gateway::GatewayResolver;
pub use pipeline::{summarize, ContentPipeline, RecordPreview, RecordState, ResolvedContent};
pub use retry::RetryPolicy;
