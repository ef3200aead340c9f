//! Gateway endpoints, error kinds and fetch outcomes

use std::fmt;

use serde::{Deserialize, Serialize};

/// Failure taxonomy shared by the resolver, codec and fetcher.
///
/// `NoRecordsYet` is a state rather than a failure; it is listed here so the
/// UI can map every outcome through one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Timeout,
    RateLimited,
    NotFound,
    TransportError,
    EmptyContent,
    AllEndpointsExhausted,
    InvalidJson,
    UnsupportedPackageVersion,
    DecryptionFailed,
    NoRecordsYet,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::NotFound => "not_found",
            ErrorKind::TransportError => "transport_error",
            ErrorKind::EmptyContent => "empty_content",
            ErrorKind::AllEndpointsExhausted => "all_endpoints_exhausted",
            ErrorKind::InvalidJson => "invalid_json",
            ErrorKind::UnsupportedPackageVersion => "unsupported_package_version",
            ErrorKind::DecryptionFailed => "decryption_failed",
            ErrorKind::NoRecordsYet => "no_records_yet",
        }
    }

    /// Whether the user can act on this by supplying a different passphrase
    pub fn is_passphrase_error(&self) -> bool {
        matches!(self, ErrorKind::DecryptionFailed)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP access point able to serve content by identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayEndpoint {
    /// Base URL; the content id is appended verbatim (e.g. `https://ipfs.io/ipfs/`)
    pub base_url: String,
    /// Lower values are tried first
    #[serde(default)]
    pub priority: i32,
}

impl GatewayEndpoint {
    pub fn new(base_url: impl Into<String>, priority: i32) -> Self {
        Self {
            base_url: base_url.into(),
            priority,
        }
    }

    pub fn url_for(&self, content_id: &str) -> String {
        format!("{}{}", self.base_url, content_id)
    }
}

/// One endpoint's failed attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptFailure {
    pub endpoint: GatewayEndpoint,
    pub kind: ErrorKind,
    pub detail: String,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ({})", self.endpoint.base_url, self.kind, self.detail)
    }
}

/// Result of resolving one content id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success {
        payload: String,
        endpoint: GatewayEndpoint,
    },
    Failure {
        kind: ErrorKind,
        detail: String,
        attempts: Vec<AttemptFailure>,
    },
}

impl FetchOutcome {
    /// Build the terminal failure after every endpoint was tried.
    pub fn exhausted(attempts: Vec<AttemptFailure>) -> Self {
        let detail = if attempts.is_empty() {
            "no gateway endpoints configured".to_string()
        } else {
            attempts
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        };
        FetchOutcome::Failure {
            kind: ErrorKind::AllEndpointsExhausted,
            detail,
            attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success { .. })
    }

    pub fn payload(&self) -> Option<&str> {
        match self {
            FetchOutcome::Success { payload, .. } => Some(payload),
            FetchOutcome::Failure { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for_is_verbatim() {
        let ep = GatewayEndpoint::new("https://ipfs.io/ipfs/", 0);
        assert_eq!(ep.url_for("QmTest123456"), "https://ipfs.io/ipfs/QmTest123456");
    }

    #[test]
    fn test_exhausted_lists_each_attempt() {
        let outcome = FetchOutcome::exhausted(vec![
            AttemptFailure {
                endpoint: GatewayEndpoint::new("https://a/", 0),
                kind: ErrorKind::RateLimited,
                detail: "HTTP 429".into(),
            },
            AttemptFailure {
                endpoint: GatewayEndpoint::new("https://b/", 1),
                kind: ErrorKind::Timeout,
                detail: "no response within 100ms".into(),
            },
        ]);

        match outcome {
            FetchOutcome::Failure { kind, detail, attempts } => {
                assert_eq!(kind, ErrorKind::AllEndpointsExhausted);
                assert_eq!(attempts.len(), 2);
                assert!(detail.contains("https://a/ -> rate_limited"));
                assert!(detail.contains("https://b/ -> timeout"));
            }
            FetchOutcome::Success { .. } => panic!("expected failure"),
        }
    }

    #[test]
    fn test_endpoint_serde_camel_case() {
        let ep: GatewayEndpoint =
            serde_json::from_str(r#"{"baseUrl":"https://dweb.link/ipfs/"}"#).unwrap();
        assert_eq!(ep.priority, 0);
        assert_eq!(ep.base_url, "https://dweb.link/ipfs/");
    }
}
