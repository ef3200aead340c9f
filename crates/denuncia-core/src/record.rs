//! Ledger record references

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content_id::ContentId;

/// One ledger-indexed record pointing at its full content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRecordRef {
    pub index: u64,
    pub content_id: ContentId,
    /// Author reference as reported by the ledger (e.g. a checksummed address)
    pub author_ref: String,
    pub created_at: DateTime<Utc>,
}

impl LedgerRecordRef {
    /// Most recent first; ties broken by index, highest first.
    pub fn newest_first(a: &Self, b: &Self) -> std::cmp::Ordering {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.index.cmp(&a.index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(index: u64, secs: i64) -> LedgerRecordRef {
        LedgerRecordRef {
            index,
            content_id: ContentId::parse(format!("QmRecord{:08}", index)).unwrap(),
            author_ref: "0x0000000000000000000000000000000000000001".into(),
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[test]
    fn test_newest_first() {
        let mut records = vec![record(0, 100), record(1, 300), record(2, 200), record(3, 300)];
        records.sort_by(LedgerRecordRef::newest_first);
        let order: Vec<u64> = records.iter().map(|r| r.index).collect();
        assert_eq!(order, vec![3, 1, 2, 0]);
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_value(record(7, 0)).unwrap();
        assert_eq!(json["index"], 7);
        assert_eq!(json["contentId"], "QmRecord00000007");
        assert!(json["createdAt"].as_str().unwrap().starts_with("1970-01-01T00:00:00"));
    }
}
