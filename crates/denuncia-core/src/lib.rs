//! denuncia-core: Core types, package codec and content normalization
//!
//! This crate defines the pieces of the resolver that never touch the network:
//! - Content identifiers and ledger record references
//! - The `EncryptedPackage` wire format and its AES-256-CBC codec
//! - Normalization of fetched blobs that may carry one or two extra layers
//!   of JSON string escaping
//! - The `LedgerReader` seam implemented by RPC-backed and in-memory ledgers
//!
//! # Integrity Model
//!
//! Packages are encrypted with AES-256-CBC and PKCS#7 padding under a
//! PBKDF2-derived key. The format carries **no MAC**.
//!
//! | Check | Guarantee |
//! |-------|-----------|
//! | Version / algorithm tag | Exact match, otherwise hard failure |
//! | Wrong passphrase | Detected heuristically (bad padding or non-UTF-8 output) |
//! | Ciphertext tampering | **Not detected** in general |
//!
//! A garbled decryption is caught most of the time, but callers must not
//! treat a successful decrypt as proof the ciphertext is authentic.

mod codec;
mod config;
mod content_id;
mod error;
mod ledger;
mod normalize;
mod outcome;
mod record;

pub use codec::{
    decrypt_package, decrypt_str, derive_key, encrypt_package, is_encrypted_package,
    CodecError, EncryptedPackage, PACKAGE_ALGORITHM, PACKAGE_VERSION, PBKDF2_ITERATIONS,
};
pub use config::{BatchConfig, LedgerSettings, ResolverConfig, DEFAULT_GATEWAYS};
pub use content_id::ContentId;
pub use error::Error;
pub use ledger::{LedgerError, LedgerReader};
pub use normalize::{normalize, ContentNormalizer, NormalizedContent, DEFAULT_WRAPPED_FIELDS};
pub use outcome::{AttemptFailure, ErrorKind, FetchOutcome, GatewayEndpoint};
pub use record::LedgerRecordRef;

pub type Result<T> = std::result::Result<T, Error>;

/// Constants shared by the codec and the resolver
pub mod constants {
    /// Salt length in bytes (32 hex characters on the wire)
    pub const SALT_LEN: usize = 16;

    /// IV length in bytes (32 hex characters on the wire)
    pub const IV_LEN: usize = 16;

    /// Derived key length in bytes (AES-256)
    pub const KEY_LEN: usize = 32;

    /// Minimum accepted content identifier length
    pub const MIN_CONTENT_ID_LEN: usize = 10;

    /// `Accept` header sent to gateways
    pub const GATEWAY_ACCEPT: &str = "application/json, text/plain, */*";
}
