//! Content identifiers

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::MIN_CONTENT_ID_LEN;
use crate::error::Error;

/// Opaque identifier of a content-addressed blob (e.g. a base58 or base32 CID).
///
/// The identifier is appended verbatim to a gateway base URL, so it must be a
/// single path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentId(String);

impl ContentId {
    pub fn parse(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        let reason = if id.is_empty() {
            Some("empty")
        } else if id.len() < MIN_CONTENT_ID_LEN {
            Some("shorter than 10 characters")
        } else if id
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#'))
        {
            Some("not a single URL path segment")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(Error::InvalidContentId { id, reason }),
            None => Ok(Self(id)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ContentId {
    type Err = Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ContentId {
    type Error = Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(value)
    }
}

impl From<ContentId> for String {
    fn from(id: ContentId) -> Self {
        id.0
    }
}

impl AsRef<str> for ContentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_cid() {
        let id = ContentId::parse("QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG").unwrap();
        assert_eq!(id.as_str(), "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG");
        assert_eq!(id.to_string(), id.as_str());
    }

    #[test]
    fn test_rejects_short_or_empty() {
        assert!(ContentId::parse("").is_err());
        assert!(ContentId::parse("Qm123").is_err());
        assert!(ContentId::parse("0123456789").is_ok());
    }

    #[test]
    fn test_rejects_non_segment() {
        assert!(ContentId::parse("bafy/beig/hello").is_err());
        assert!(ContentId::parse("bafybeig hello").is_err());
        assert!(ContentId::parse("bafybeighello?x=1").is_err());
    }

    #[test]
    fn test_serde_validates() {
        let ok: ContentId = serde_json::from_str("\"bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi\"").unwrap();
        assert!(ok.as_str().starts_with("bafy"));
        assert!(serde_json::from_str::<ContentId>("\"short\"").is_err());
    }
}
