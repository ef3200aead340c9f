//! Passphrase-based package encryption
//!
//! Key derivation: PBKDF2-HMAC-SHA256(password, salt, 10_000) -> 256-bit key
//! Encryption: AES-256-CBC with PKCS#7 padding and a random 16-byte IV
//! Wire format: JSON `EncryptedPackage`, salt/IV hex, ciphertext base64

use aes::Aes256;
use base64::{engine::general_purpose::STANDARD, Engine};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use chrono::{SecondsFormat, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

use crate::constants::{IV_LEN, KEY_LEN, SALT_LEN};
use crate::outcome::ErrorKind;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// The only supported package version
pub const PACKAGE_VERSION: &str = "1.0";

/// The only supported package algorithm
pub const PACKAGE_ALGORITHM: &str = "AES-256-CBC";

/// PBKDF2 iteration count, fixed by the package format
pub const PBKDF2_ITERATIONS: u32 = 10_000;

/// Encrypted payload as persisted on the content network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPackage {
    pub version: String,
    pub encrypted: bool,
    pub algorithm: String,
    /// Base64 ciphertext
    pub data: String,
    /// Hex salt (32 chars)
    pub salt: String,
    /// Hex IV (32 chars)
    pub iv: String,
    /// ISO-8601 creation time; informational, absent in some stored packages
    #[serde(default)]
    pub timestamp: String,
}

impl EncryptedPackage {
    pub fn to_json(&self) -> String {
        // Struct field order is the wire order; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Unsupported package: version {version:?}, algorithm {algorithm:?}")]
    UnsupportedPackageVersion { version: String, algorithm: String },

    #[error("Malformed package field `{field}`: {reason}")]
    MalformedField { field: &'static str, reason: String },

    #[error("Decryption failed: {0}")]
    DecryptionFailed(&'static str),

    #[error("Not an encrypted package: {0}")]
    NotAPackage(String),
}

impl CodecError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CodecError::UnsupportedPackageVersion { .. } => ErrorKind::UnsupportedPackageVersion,
            CodecError::MalformedField { .. } | CodecError::DecryptionFailed(_) => {
                ErrorKind::DecryptionFailed
            }
            CodecError::NotAPackage(_) => ErrorKind::InvalidJson,
        }
    }
}

/// Derive the AES-256 key for `password` and a hex-encoded salt.
pub fn derive_key(password: &str, salt_hex: &str) -> Result<[u8; KEY_LEN], CodecError> {
    let salt = hex::decode(salt_hex).map_err(|e| CodecError::MalformedField {
        field: "salt",
        reason: e.to_string(),
    })?;
    Ok(stretch(password, &salt))
}

/// Encrypt `plaintext` under a fresh salt and IV.
pub fn encrypt_package(plaintext: &str, password: &str) -> EncryptedPackage {
    let mut rng = rand::thread_rng();
    let mut salt = [0u8; SALT_LEN];
    let mut iv = [0u8; IV_LEN];
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut iv);

    let key = stretch(password, &salt);
    let ciphertext = Aes256CbcEnc::new(&key.into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    EncryptedPackage {
        version: PACKAGE_VERSION.to_string(),
        encrypted: true,
        algorithm: PACKAGE_ALGORITHM.to_string(),
        data: STANDARD.encode(ciphertext),
        salt: hex::encode(salt),
        iv: hex::encode(iv),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}

/// Decrypt a package, returning the UTF-8 plaintext.
///
/// A wrong passphrase shows up as invalid padding or as bytes that are not
/// UTF-8. Both are reported as [`CodecError::DecryptionFailed`]; neither is
/// a cryptographic authenticity check.
pub fn decrypt_package(pkg: &EncryptedPackage, password: &str) -> Result<String, CodecError> {
    if pkg.version != PACKAGE_VERSION || pkg.algorithm != PACKAGE_ALGORITHM {
        return Err(CodecError::UnsupportedPackageVersion {
            version: pkg.version.clone(),
            algorithm: pkg.algorithm.clone(),
        });
    }
    if !pkg.encrypted {
        return Err(CodecError::MalformedField {
            field: "encrypted",
            reason: "flag is false".into(),
        });
    }

    let key = derive_key(password, &pkg.salt)?;
    let iv: [u8; IV_LEN] = decode_fixed_hex("iv", &pkg.iv)?;

    // Line-wrapped base64 is tolerated; the bytes are unchanged.
    let data: String = pkg.data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let ciphertext = STANDARD
        .decode(data.as_bytes())
        .map_err(|e| CodecError::MalformedField {
            field: "data",
            reason: e.to_string(),
        })?;

    let plaintext = Aes256CbcDec::new(&key.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| CodecError::DecryptionFailed("invalid padding"))?;

    String::from_utf8(plaintext).map_err(|_| CodecError::DecryptionFailed("output is not UTF-8"))
}

/// Parse a canonical package string and decrypt it.
pub fn decrypt_str(canonical: &str, password: &str) -> Result<String, CodecError> {
    if !is_encrypted_package(canonical) {
        return Err(CodecError::NotAPackage(
            "missing encrypted/algorithm/data".into(),
        ));
    }
    let pkg: EncryptedPackage = serde_json::from_str(canonical).map_err(|e| {
        match serde_json::from_str::<Value>(canonical) {
            // Right shape but a field we require is missing or mistyped.
            Ok(Value::Object(map)) => unsupported_or_malformed(&map, e.to_string()),
            _ => CodecError::NotAPackage(e.to_string()),
        }
    })?;
    decrypt_package(&pkg, password)
}

/// Returns true iff `candidate` is a JSON object with `encrypted === true`
/// and truthy `algorithm` and `data`. Never fails.
pub fn is_encrypted_package(candidate: &str) -> bool {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => {
            map.get("encrypted") == Some(&Value::Bool(true))
                && map.get("algorithm").is_some_and(is_truthy)
                && map.get("data").is_some_and(is_truthy)
        }
        _ => false,
    }
}

fn stretch(password: &str, salt: &[u8]) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
    key
}

/// JavaScript truthiness of a JSON value
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn decode_fixed_hex<const N: usize>(field: &'static str, value: &str) -> Result<[u8; N], CodecError> {
    let bytes = hex::decode(value).map_err(|e| CodecError::MalformedField {
        field,
        reason: e.to_string(),
    })?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| CodecError::MalformedField {
        field,
        reason: format!("expected {} bytes, got {}", N, len),
    })
}

fn unsupported_or_malformed(map: &serde_json::Map<String, Value>, reason: String) -> CodecError {
    let version = map.get("version").and_then(Value::as_str).unwrap_or_default();
    let algorithm = map.get("algorithm").and_then(Value::as_str).unwrap_or_default();
    if version != PACKAGE_VERSION || algorithm != PACKAGE_ALGORITHM {
        CodecError::UnsupportedPackageVersion {
            version: version.to_string(),
            algorithm: algorithm.to_string(),
        }
    } else {
        CodecError::MalformedField {
            field: "package",
            reason,
        }
    }
}
