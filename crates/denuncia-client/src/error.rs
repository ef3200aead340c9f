//! Client error types

use denuncia_core::{CodecError, ErrorKind, LedgerError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Resolution failed ({kind}): {detail}")]
    Resolution { kind: ErrorKind, detail: String },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Core(#[from] denuncia_core::Error),
}

impl ClientError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ClientError::Resolution { kind, .. } => Some(*kind),
            ClientError::Codec(e) => Some(e.kind()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
