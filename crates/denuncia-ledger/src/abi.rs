//! Minimal ABI encoding for the record index contract
//!
//! Only the shapes the contract uses are supported: static `uint256` and
//! `address` words plus a single dynamic `string`.

use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, TimeZone, Utc};
use tiny_keccak::{Hasher, Keccak};

use denuncia_core::{ContentId, LedgerError, LedgerRecordRef};

const WORD: usize = 32;

fn keccak(input: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(input);
    let mut hash = [0u8; 32];
    hasher.finalize(&mut hash);
    hash
}

/// Function selector: first four bytes of `keccak256(signature)`
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Event topic0: `keccak256(signature)`
pub fn event_topic(signature: &str) -> B256 {
    B256::from(keccak(signature.as_bytes()))
}

/// Calldata for a function taking only `uint256` arguments
pub fn encode_call(selector: [u8; 4], args: &[U256]) -> Vec<u8> {
    let mut calldata = Vec::with_capacity(4 + args.len() * WORD);
    calldata.extend_from_slice(&selector);
    for arg in args {
        calldata.extend_from_slice(&arg.to_be_bytes::<WORD>());
    }
    calldata
}

fn decode_error(msg: impl Into<String>) -> LedgerError {
    LedgerError::Decode(msg.into())
}

fn word(data: &[u8], index: usize) -> Result<&[u8], LedgerError> {
    index
        .checked_mul(WORD)
        .and_then(|start| Some(start..start.checked_add(WORD)?))
        .and_then(|range| data.get(range))
        .ok_or_else(|| {
            decode_error(format!(
                "return data too short: need word {} but have {} bytes",
                index,
                data.len()
            ))
        })
}

fn uint_at(data: &[u8], index: usize) -> Result<U256, LedgerError> {
    Ok(U256::from_be_slice(word(data, index)?))
}

fn u64_from(value: U256, what: &str) -> Result<u64, LedgerError> {
    u64::try_from(value).map_err(|_| decode_error(format!("{} does not fit in u64", what)))
}

pub fn decode_u64(data: &[u8], index: usize) -> Result<u64, LedgerError> {
    u64_from(uint_at(data, index)?, "uint256 word")
}

pub fn decode_address(data: &[u8], index: usize) -> Result<Address, LedgerError> {
    let w = word(data, index)?;
    if w[..12].iter().any(|b| *b != 0) {
        return Err(decode_error("address word has dirty high bytes"));
    }
    Ok(Address::from_slice(&w[12..]))
}

/// Dynamic `string` whose offset is stored at head word `index`
pub fn decode_string(data: &[u8], index: usize) -> Result<String, LedgerError> {
    let offset = u64_from(uint_at(data, index)?, "string offset")? as usize;
    if offset % WORD != 0 {
        return Err(decode_error("misaligned string offset"));
    }
    let len = u64_from(uint_at(data, offset / WORD)?, "string length")? as usize;
    let bytes = offset
        .checked_add(WORD)
        .and_then(|start| Some(start..start.checked_add(len)?))
        .and_then(|range| data.get(range))
        .ok_or_else(|| decode_error("string runs past end of data"))?;
    String::from_utf8(bytes.to_vec()).map_err(|_| decode_error("string is not UTF-8"))
}

fn timestamp(secs: u64) -> Result<DateTime<Utc>, LedgerError> {
    i64::try_from(secs)
        .ok()
        .and_then(|s| Utc.timestamp_opt(s, 0).single())
        .ok_or_else(|| decode_error(format!("timestamp {} out of range", secs)))
}

fn content_id(raw: String) -> Result<ContentId, LedgerError> {
    ContentId::parse(raw).map_err(|e| decode_error(e.to_string()))
}

/// Return data of `(address author, string contentId, uint256 createdAt)`
pub fn decode_record(index: u64, data: &[u8]) -> Result<LedgerRecordRef, LedgerError> {
    let author = decode_address(data, 0)?;
    let cid = decode_string(data, 1)?;
    let created_at = decode_u64(data, 2)?;

    Ok(LedgerRecordRef {
        index,
        content_id: content_id(cid)?,
        author_ref: author.to_checksum(None),
        created_at: timestamp(created_at)?,
    })
}

/// Creation event: topics `[sig, id, author]`, data `(string contentId, uint256 createdAt)`
pub fn decode_created_event(topics: &[B256], data: &[u8]) -> Result<LedgerRecordRef, LedgerError> {
    if topics.len() < 3 {
        return Err(decode_error(format!(
            "expected 3 topics, found {}",
            topics.len()
        )));
    }
    let index = u64_from(U256::from_be_bytes(topics[1].0), "record id")?;
    let author = decode_address(topics[2].as_slice(), 0)?;
    let cid = decode_string(data, 0)?;
    let created_at = decode_u64(data, 1)?;

    Ok(LedgerRecordRef {
        index,
        content_id: content_id(cid)?,
        author_ref: author.to_checksum(None),
        created_at: timestamp(created_at)?,
    })
}

#[cfg(test)]
pub(crate) mod encode {
    //! Encoders for return data, used to script mock nodes

    use super::*;

    pub fn uint(value: u64) -> [u8; WORD] {
        U256::from(value).to_be_bytes::<WORD>()
    }

    pub fn address(addr: Address) -> [u8; WORD] {
        let mut w = [0u8; WORD];
        w[12..].copy_from_slice(addr.as_slice());
        w
    }

    fn string_tail(s: &str) -> Vec<u8> {
        let mut out = uint(s.len() as u64).to_vec();
        out.extend_from_slice(s.as_bytes());
        let pad = (WORD - s.len() % WORD) % WORD;
        out.extend(std::iter::repeat(0u8).take(pad));
        out
    }

    pub fn record(author: Address, cid: &str, created_at: u64) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&address(author));
        out.extend_from_slice(&uint(3 * WORD as u64));
        out.extend_from_slice(&uint(created_at));
        out.extend(string_tail(cid));
        out
    }

    pub fn event_data(cid: &str, created_at: u64) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&uint(2 * WORD as u64));
        out.extend_from_slice(&uint(created_at));
        out.extend(string_tail(cid));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CID: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";

    #[test]
    fn test_known_selectors() {
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(selector("balanceOf(address)"), [0x70, 0xa0, 0x82, 0x31]);
        assert_eq!(
            hex::encode(event_topic("Transfer(address,address,uint256)")),
            "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn test_encode_call() {
        let calldata = encode_call([1, 2, 3, 4], &[U256::from(5u64)]);
        assert_eq!(calldata.len(), 36);
        assert_eq!(&calldata[..4], &[1, 2, 3, 4]);
        assert_eq!(calldata[35], 5);
    }

    #[test]
    fn test_decode_record() {
        let author = Address::repeat_byte(0x11);
        let data = encode::record(author, CID, 1_700_000_000);

        let record = decode_record(4, &data).unwrap();
        assert_eq!(record.index, 4);
        assert_eq!(record.content_id.as_str(), CID);
        assert_eq!(record.author_ref, author.to_checksum(None));
        assert_eq!(record.created_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_decode_event() {
        let author = Address::repeat_byte(0x22);
        let topics = vec![
            event_topic("DenunciaCreada(uint256,address,string,uint256)"),
            B256::from(encode::uint(9)),
            B256::from(encode::address(author)),
        ];
        let data = encode::event_data(CID, 1_650_000_000);

        let record = decode_created_event(&topics, &data).unwrap();
        assert_eq!(record.index, 9);
        assert_eq!(record.content_id.as_str(), CID);
        assert_eq!(record.created_at.timestamp(), 1_650_000_000);
    }

    #[test]
    fn test_empty_return_is_decode_error() {
        assert!(matches!(decode_u64(&[], 0), Err(LedgerError::Decode(_))));
        assert!(matches!(decode_record(0, &[]), Err(LedgerError::Decode(_))));
    }

    #[test]
    fn test_truncated_string_rejected() {
        let mut data = encode::record(Address::ZERO, CID, 1);
        data.truncate(data.len() - 64);
        assert!(matches!(decode_record(0, &data), Err(LedgerError::Decode(_))));
    }

    #[test]
    fn test_string_offset_near_usize_max_rejected() {
        let mut data = encode::record(Address::ZERO, CID, 1);
        data[WORD..2 * WORD].copy_from_slice(&encode::uint(u64::MAX - 31));
        assert!(matches!(decode_record(0, &data), Err(LedgerError::Decode(_))));
    }

    #[test]
    fn test_string_length_near_usize_max_rejected() {
        let mut data = encode::record(Address::ZERO, CID, 1);
        data[3 * WORD..4 * WORD].copy_from_slice(&encode::uint(u64::MAX));
        assert!(matches!(decode_record(0, &data), Err(LedgerError::Decode(_))));
    }

    #[test]
    fn test_invalid_content_id_rejected() {
        let data = encode::record(Address::ZERO, "short", 1);
        assert!(matches!(decode_record(0, &data), Err(LedgerError::Decode(_))));
    }
}
