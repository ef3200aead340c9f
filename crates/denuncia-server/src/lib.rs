//! denuncia-server: HTTP front for the resolver
//!
//! Resolves and decrypts content by id, classifies raw blobs, and lists
//! ledger records with previews when a ledger is configured.

pub mod error;
pub mod metrics;
pub mod routes;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use server::{ResolverServer, ServerBuilder};
pub use state::{AppState, NoLedger, SharedState};
