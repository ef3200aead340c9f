//! Error types for denuncia-core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid content id {id:?}: {reason}")]
    InvalidContentId { id: String, reason: &'static str },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}
