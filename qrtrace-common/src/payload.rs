//! QR payload normalization
//!
//! A decoded QR symbol carries either a JSON object with a `qrHash` field
//! (the form the backend embeds in generated codes) or a bare hash string
//! (older labels, manual entry). Every scanner entry point funnels raw text
//! through [`normalize`] so the two forms resolve to one [`CanonicalHash`].
//!
//! # Rules
//!
//! 1. Text that parses as a JSON **object** must carry a non-empty string
//!    `qrHash`; the trimmed value is returned, other fields are ignored.
//!    An object without a usable `qrHash` is rejected, never guessed at.
//! 2. Anything else (invalid JSON, or JSON scalars/arrays such as a numeric
//!    hash) is taken verbatim after trimming.
//! 3. Empty text after trimming is rejected.
//!
//! A canonical hash is never itself a JSON object, so normalizing one again
//! takes path 2 and returns it unchanged.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// JSON field carrying the hash inside wrapped payloads
pub const QR_HASH_FIELD: &str = "qrHash";

/// Reasons a raw payload could not produce a usable hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NormalizationError {
    /// Payload is a JSON object but `qrHash` is missing, not a string, or blank
    #[error("QR code data is missing the qrHash field")]
    MissingHashField,

    /// Payload is empty or whitespace only
    #[error("QR code contains no data")]
    EmptyPayload,
}

/// Normalized, trimmed identifier used to look up a traced entity
///
/// Always non-empty and free of surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CanonicalHash(String);

impl CanonicalHash {
    /// Build a hash from an already-extracted identifier
    ///
    /// Trims the input; returns `EmptyPayload` if nothing remains. Does not
    /// unwrap JSON payloads, use [`normalize`] for raw scanner text.
    pub fn new(value: impl AsRef<str>) -> Result<Self, NormalizationError> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(NormalizationError::EmptyPayload);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for CanonicalHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CanonicalHash {
    type Error = NormalizationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CanonicalHash> for String {
    fn from(hash: CanonicalHash) -> Self {
        hash.0
    }
}

/// Resolve raw QR text into a canonical hash
pub fn normalize(raw_text: &str) -> Result<CanonicalHash, NormalizationError> {
    match serde_json::from_str::<Value>(raw_text) {
        Ok(Value::Object(fields)) => {
            let hash = fields
                .get(QR_HASH_FIELD)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .ok_or(NormalizationError::MissingHashField)?;
            Ok(CanonicalHash(hash.to_string()))
        }
        // Scalars, arrays and non-JSON text are all bare hashes
        _ => CanonicalHash::new(raw_text),
    }
}

/// Produce the JSON-wrapped payload embedded in generated QR codes
pub fn wrap_payload(hash: &CanonicalHash) -> String {
    serde_json::json!({ QR_HASH_FIELD: hash.as_str() }).to_string()
}
