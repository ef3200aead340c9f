//! Normalization of fetched content
//!
//! Upstream tooling stores packages in three ways: as the whole blob, as a
//! field of a wrapper record holding the package JSON as a string, or as that
//! string serialized a second time. Normalization only ever undoes escaping;
//! the package text that reaches the codec is a verbatim slice of what the
//! encoder produced, never a re-serialization.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::value::RawValue;
use serde_json::Value;

use crate::codec::{is_encrypted_package, is_truthy};
use crate::error::Error;

/// Field names conventionally holding wrapped ciphertext
pub const DEFAULT_WRAPPED_FIELDS: &[&str] = &["encryptedContent", "contenidoCifrado"];

/// Upper bound on the text scanned by the regex recovery path
const MAX_RECOVERY_INPUT: usize = 4 * 1024 * 1024;

/// Escaping layers undone on a top-level string or a recovered literal
const MAX_ESCAPE_LAYERS: usize = 2;

static DEFAULT_NORMALIZER: LazyLock<ContentNormalizer> = LazyLock::new(ContentNormalizer::default);

/// Classified content with its canonical string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedContent {
    /// Not JSON, or JSON that is neither an object nor a package
    PlainText(String),
    /// A JSON object carrying no recoverable package; kept verbatim
    WrapperRecord(String),
    /// Canonical package string, ready for the codec
    EncryptedPackage(String),
}

impl NormalizedContent {
    pub fn as_str(&self) -> &str {
        match self {
            NormalizedContent::PlainText(s)
            | NormalizedContent::WrapperRecord(s)
            | NormalizedContent::EncryptedPackage(s) => s,
        }
    }

    pub fn into_string(self) -> String {
        match self {
            NormalizedContent::PlainText(s)
            | NormalizedContent::WrapperRecord(s)
            | NormalizedContent::EncryptedPackage(s) => s,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, NormalizedContent::EncryptedPackage(_))
    }

    pub fn shape(&self) -> &'static str {
        match self {
            NormalizedContent::PlainText(_) => "plain_text",
            NormalizedContent::WrapperRecord(_) => "wrapper_record",
            NormalizedContent::EncryptedPackage(_) => "encrypted_package",
        }
    }
}

/// Normalize with the default wrapped field names.
pub fn normalize(raw: &str) -> NormalizedContent {
    DEFAULT_NORMALIZER.normalize(raw)
}

#[derive(Debug, Clone)]
pub struct ContentNormalizer {
    wrapped_fields: Vec<String>,
    field_literal: Regex,
}

impl ContentNormalizer {
    pub fn new<I, S>(wrapped_fields: I) -> crate::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let wrapped_fields: Vec<String> = wrapped_fields.into_iter().map(Into::into).collect();
        if wrapped_fields.is_empty() {
            return Err(Error::InvalidConfig("at least one wrapped field name is required".into()));
        }

        let alternatives = wrapped_fields
            .iter()
            .map(|f| regex::escape(f))
            .collect::<Vec<_>>()
            .join("|");
        // Field name, optional escaped quotes, then a flat object literal.
        let pattern = format!(r#"\\*"(?:{alternatives})\\*"\s*:\s*\\*"?(\{{[^{{}}]*\}})"#);
        let field_literal = Regex::new(&pattern)
            .map_err(|e| Error::InvalidConfig(format!("wrapped field pattern: {}", e)))?;

        Ok(Self {
            wrapped_fields,
            field_literal,
        })
    }

    pub fn wrapped_fields(&self) -> &[String] {
        &self.wrapped_fields
    }

    /// Classify `raw` and produce its canonical string. Never fails: when no
    /// interpretation yields a package, `raw` comes back unchanged.
    pub fn normalize(&self, raw: &str) -> NormalizedContent {
        if is_encrypted_package(raw) {
            return NormalizedContent::EncryptedPackage(raw.to_string());
        }

        let parsed = match serde_json::from_str::<Value>(raw) {
            Ok(value) => value,
            Err(_) => {
                return match self.recover_from_text(raw) {
                    Some(canonical) => NormalizedContent::EncryptedPackage(canonical),
                    None => NormalizedContent::PlainText(raw.to_string()),
                };
            }
        };

        let structured = match &parsed {
            Value::Object(_) => self.unwrap_wrapped_field(raw),
            Value::String(inner) => unwrap_string_layers(inner.clone()),
            _ => None,
        };
        if let Some(canonical) = structured {
            return NormalizedContent::EncryptedPackage(canonical);
        }

        if let Some(canonical) = self.recover_from_text(raw) {
            return NormalizedContent::EncryptedPackage(canonical);
        }

        match parsed {
            Value::Object(_) => NormalizedContent::WrapperRecord(raw.to_string()),
            _ => NormalizedContent::PlainText(raw.to_string()),
        }
    }

    /// First wrapped field whose value resolves to a package
    fn unwrap_wrapped_field(&self, raw: &str) -> Option<String> {
        let fields: HashMap<String, Box<RawValue>> = serde_json::from_str(raw).ok()?;

        self.wrapped_fields
            .iter()
            .filter_map(|name| fields.get(name))
            .find_map(|value| {
                let text = value.get();
                let canonical = match serde_json::from_str::<String>(text) {
                    Ok(candidate) => resolve_escaped(candidate),
                    // Package embedded as an object: keep its source text.
                    Err(_) => text.to_string(),
                };
                is_encrypted_package(&canonical).then_some(canonical)
            })
    }

    /// Best-effort extraction of an object literal assigned to a wrapped
    /// field, for text a strict parser rejects (e.g. literal newlines).
    fn recover_from_text(&self, raw: &str) -> Option<String> {
        let haystack = bounded(raw, MAX_RECOVERY_INPUT);

        self.field_literal.captures_iter(haystack).find_map(|caps| {
            let literal = caps.get(1)?.as_str();
            let mut candidate: String = literal.chars().filter(|c| !matches!(c, '\n' | '\r')).collect();

            for _ in 0..=MAX_ESCAPE_LAYERS {
                if is_encrypted_package(&candidate) {
                    return Some(candidate);
                }
                if !candidate.contains("\\\"") {
                    break;
                }
                candidate = unescape_layer(&candidate);
            }
            None
        })
    }
}

impl Default for ContentNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_WRAPPED_FIELDS.iter().copied())
            .expect("default wrapped field names form a valid pattern")
    }
}

/// Undo at most one layer of incidental escaping on a wrapped field value.
fn resolve_escaped(candidate: String) -> String {
    match serde_json::from_str::<Value>(&candidate) {
        Err(_) => candidate,
        // Double escaped: the once-unescaped text is the package itself.
        Ok(Value::String(first)) => match serde_json::from_str::<Value>(&first) {
            Ok(second) if has_package_shape(&second) => first,
            Ok(second) => second.to_string(),
            Err(_) => first,
        },
        Ok(first) if has_package_shape(&first) => candidate,
        Ok(first @ Value::Object(_)) => first.to_string(),
        Ok(_) => candidate,
    }
}

/// A whole blob that is itself a JSON string, escaped once or twice
fn unwrap_string_layers(mut text: String) -> Option<String> {
    for _ in 0..MAX_ESCAPE_LAYERS {
        if is_encrypted_package(&text) {
            return Some(text);
        }
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::String(next)) => text = next,
            _ => return None,
        }
    }
    is_encrypted_package(&text).then_some(text)
}

fn has_package_shape(value: &Value) -> bool {
    value.as_object().is_some_and(|map| {
        map.get("encrypted").is_some_and(is_truthy) && map.get("algorithm").is_some_and(is_truthy)
    })
}

fn unescape_layer(text: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{}\"", text))
        .unwrap_or_else(|_| text.replace("\\\"", "\"").replace("\\\\", "\\"))
}

fn bounded(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
