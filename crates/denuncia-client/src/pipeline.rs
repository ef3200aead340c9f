//! Resolve, normalize and (optionally) decrypt a record's content

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, warn};

use denuncia_core::{
    decrypt_str, ContentId, ContentNormalizer, ErrorKind, FetchOutcome, LedgerRecordRef,
    NormalizedContent, ResolverConfig,
};

use crate::error::{ClientError, Result};
use crate::gateway::GatewayResolver;

/// Longest preview shown for a record, in characters
pub const PREVIEW_CHARS: usize = 160;

/// Fields checked, in order, for a human-readable preview of JSON content
const PREVIEW_FIELDS: &[&str] = &["titulo", "title", "descripcion", "description", "texto", "text"];

/// Where a record stands from the reader's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    /// Encrypted; nothing shown until a passphrase is supplied
    AwaitingPassphrase,
    Plain,
    Decrypted,
    /// No gateway produced the content; may be retried
    ResolutionFailed,
    /// Wrong passphrase or unusable package; another passphrase may work
    DecryptionFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedContent {
    pub is_encrypted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plaintext: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub state: RecordState,
}

impl ResolvedContent {
    fn plain(text: String) -> Self {
        Self {
            is_encrypted: false,
            plaintext: Some(text),
            error: None,
            detail: None,
            state: RecordState::Plain,
        }
    }

    fn awaiting_passphrase() -> Self {
        Self {
            is_encrypted: true,
            plaintext: None,
            error: None,
            detail: None,
            state: RecordState::AwaitingPassphrase,
        }
    }

    fn decrypted(text: String) -> Self {
        Self {
            is_encrypted: true,
            plaintext: Some(text),
            error: None,
            detail: None,
            state: RecordState::Decrypted,
        }
    }

    fn failed(is_encrypted: bool, kind: ErrorKind, detail: String, state: RecordState) -> Self {
        Self {
            is_encrypted,
            plaintext: None,
            error: Some(kind),
            detail: Some(detail),
            state,
        }
    }
}

/// Listing row: a record plus what could be shown without a passphrase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPreview {
    #[serde(flatten)]
    pub record: LedgerRecordRef,
    pub state: RecordState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

pub struct ContentPipeline {
    resolver: GatewayResolver,
    normalizer: ContentNormalizer,
}

impl ContentPipeline {
    pub fn new(config: &ResolverConfig) -> Result<Self> {
        let resolver = GatewayResolver::new(config)?;
        let normalizer = ContentNormalizer::new(config.wrapped_fields.iter().cloned())?;
        Ok(Self::from_parts(resolver, normalizer))
    }

    pub fn from_parts(resolver: GatewayResolver, normalizer: ContentNormalizer) -> Self {
        Self {
            resolver,
            normalizer,
        }
    }

    pub fn resolver(&self) -> &GatewayResolver {
        &self.resolver
    }

    pub fn normalizer(&self) -> &ContentNormalizer {
        &self.normalizer
    }

    /// Fetch and classify content without decrypting it.
    pub async fn fetch_normalized(&self, content_id: &ContentId) -> Result<NormalizedContent> {
        match self.resolver.resolve(content_id).await {
            FetchOutcome::Success { payload, .. } => Ok(self.normalizer.normalize(&payload)),
            FetchOutcome::Failure { kind, detail, .. } => {
                Err(ClientError::Resolution { kind, detail })
            }
        }
    }

    /// Resolve `content_id` and decrypt it when it is a package and a
    /// passphrase is given. Failures come back inside the result.
    pub async fn resolve_and_maybe_decrypt(
        &self,
        content_id: &ContentId,
        password: Option<&str>,
    ) -> ResolvedContent {
        match self.fetch_normalized(content_id).await {
            Ok(normalized) => {
                debug!(content_id = %content_id, shape = normalized.shape(), "Content normalized");
                self.open(normalized, password)
            }
            Err(e) => resolution_failure(e),
        }
    }

    /// Resolve and decrypt; content that is not a package is an
    /// `InvalidJson` failure rather than plain text.
    pub async fn decrypt(&self, content_id: &ContentId, password: &str) -> ResolvedContent {
        match self.fetch_normalized(content_id).await {
            Ok(normalized) if normalized.is_encrypted() => self.open(normalized, Some(password)),
            Ok(normalized) => ResolvedContent::failed(
                false,
                ErrorKind::InvalidJson,
                format!("content is {}, not an encrypted package", normalized.shape()),
                RecordState::DecryptionFailed,
            ),
            Err(e) => resolution_failure(e),
        }
    }

    /// Apply an optional passphrase to already-normalized content.
    pub fn open(&self, normalized: NormalizedContent, password: Option<&str>) -> ResolvedContent {
        match (normalized, password) {
            (NormalizedContent::EncryptedPackage(_), None) => ResolvedContent::awaiting_passphrase(),
            (NormalizedContent::EncryptedPackage(canonical), Some(password)) => {
                match decrypt_str(&canonical, password) {
                    Ok(text) => ResolvedContent::decrypted(text),
                    Err(e) => {
                        warn!(kind = %e.kind(), error = %e, "Decryption failed");
                        ResolvedContent::failed(
                            true,
                            e.kind(),
                            e.to_string(),
                            RecordState::DecryptionFailed,
                        )
                    }
                }
            }
            (other, _) => ResolvedContent::plain(other.into_string()),
        }
    }

    /// Resolve a record for a listing, without any passphrase.
    pub async fn preview(&self, record: &LedgerRecordRef) -> RecordPreview {
        let content = self.resolve_and_maybe_decrypt(&record.content_id, None).await;
        RecordPreview {
            record: record.clone(),
            state: content.state,
            preview: content.plaintext.as_deref().map(summarize),
            error: content.error,
        }
    }

    /// Preview many records, at most `concurrency` resolutions in flight.
    /// Output order matches `records`.
    pub async fn preview_all(
        &self,
        records: &[LedgerRecordRef],
        concurrency: usize,
    ) -> Vec<RecordPreview> {
        stream::iter(records.iter().cloned())
            .map(|record| async move { self.preview(&record).await })
            .buffered(concurrency.max(1))
            .collect()
            .await
    }
}

fn resolution_failure(err: ClientError) -> ResolvedContent {
    let (kind, detail) = match err {
        ClientError::Resolution { kind, detail } => (kind, detail),
        other => (ErrorKind::TransportError, other.to_string()),
    };
    ResolvedContent::failed(false, kind, detail, RecordState::ResolutionFailed)
}

/// Short human-readable excerpt of plain content
pub fn summarize(text: &str) -> String {
    let excerpt = match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::Object(map)) => PREVIEW_FIELDS
            .iter()
            .find_map(|f| map.get(*f).and_then(|v| v.as_str()))
            .map(str::to_string)
            .unwrap_or_else(|| text.to_string()),
        _ => text.to_string(),
    };
    let excerpt = excerpt.trim();

    match excerpt.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}…", &excerpt[..cut]),
        None => excerpt.to_string(),
    }
}
