//! Verification client
//!
//! Resolves a canonical hash to the backend's verified entity record with a
//! single GET. No retries and no caching: a failure is reported once with the
//! server's message and the user decides whether to try again.

use std::time::Duration;

use async_trait::async_trait;
use qrtrace_common::{AuthSession, CanonicalHash, VerifiedEntityRecord};
use reqwest::{StatusCode, Url};
use serde_json::Value;
use thiserror::Error;

use crate::http::{build_client, error_message, join_url};

/// Placeholder replaced by the hash in lookup path templates
pub const HASH_PLACEHOLDER: &str = "{hash}";

// Stand-in segment so the hash is percent-encoded as one path segment
const HASH_MARKER: &str = "__qrtrace_hash__";

/// Remote lookup failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    /// Request never produced a response (DNS, connect, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// Backend has no record for the hash
    #[error("{message}")]
    NotFound { hash: String, message: String },

    /// Backend answered with a non-success status
    #[error("Verification failed ({status}): {message}")]
    Status { status: u16, message: String },

    /// Response body is not a verified entity record
    #[error("Malformed verification response: {0}")]
    MalformedBody(String),

    /// Base URL or lookup path does not form a valid URL
    #[error("Invalid verification URL: {0}")]
    InvalidUrl(String),
}

/// Resolves canonical hashes to verified entity records
#[async_trait]
pub trait EntityLookup: Send + Sync {
    async fn lookup(&self, hash: &CanonicalHash) -> Result<VerifiedEntityRecord, VerificationError>;
}

/// HTTP [`EntityLookup`] against the traceability backend
#[derive(Debug, Clone)]
pub struct VerificationClient {
    http: reqwest::Client,
    base_url: String,
    lookup_path: String,
    auth: Option<AuthSession>,
}

impl VerificationClient {
    /// Create a client for `base_url` with a lookup path template
    ///
    /// The template should contain `{hash}`; without it the hash is appended
    /// as the last path segment.
    pub fn new(
        base_url: impl Into<String>,
        lookup_path: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, VerificationError> {
        let http = build_client(timeout).map_err(|e| VerificationError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            lookup_path: lookup_path.into(),
            auth: None,
        })
    }

    /// Send the session's bearer token with lookups
    pub fn with_auth(mut self, auth: AuthSession) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Build the lookup URL for a hash
    pub fn lookup_url(&self, hash: &CanonicalHash) -> Result<Url, VerificationError> {
        let templated = if self.lookup_path.contains(HASH_PLACEHOLDER) {
            self.lookup_path.replace(HASH_PLACEHOLDER, HASH_MARKER)
        } else {
            format!("{}/{}", self.lookup_path.trim_end_matches('/'), HASH_MARKER)
        };
        let raw = join_url(&self.base_url, &templated);
        let mut url =
            Url::parse(&raw).map_err(|e| VerificationError::InvalidUrl(format!("{}: {}", raw, e)))?;

        let segments: Vec<String> = url
            .path_segments()
            .map(|segments| segments.map(str::to_string).collect())
            .ok_or_else(|| VerificationError::InvalidUrl(raw.clone()))?;
        url.path_segments_mut()
            .map_err(|_| VerificationError::InvalidUrl(raw.clone()))?
            .clear()
            .extend(segments.iter().map(|segment| {
                if segment == HASH_MARKER {
                    hash.as_str()
                } else {
                    segment.as_str()
                }
            }));
        Ok(url)
    }

    /// Look up the record for a hash
    pub async fn verify(
        &self,
        hash: &CanonicalHash,
    ) -> Result<VerifiedEntityRecord, VerificationError> {
        let url = self.lookup_url(hash)?;
        tracing::debug!(hash = %hash, url = %url, "Requesting verification");

        let mut request = self.http.get(url);
        if let Some(token) = self.auth.as_ref().and_then(AuthSession::bearer_token) {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VerificationError::Network(e.to_string()))?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(&body);
            let message = if message.is_empty() {
                format!("No product found for QR code {}", hash)
            } else {
                message
            };
            return Err(VerificationError::NotFound {
                hash: hash.to_string(),
                message,
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(&body);
            let message = if message.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            } else {
                message
            };
            return Err(VerificationError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| VerificationError::MalformedBody(e.to_string()))?;
        if !body.is_object() {
            return Err(VerificationError::MalformedBody(
                "expected a JSON object".to_string(),
            ));
        }
        // Failure envelope sent with a 2xx status
        if body.get("success").and_then(Value::as_bool) == Some(false) {
            let message = error_message(&body.to_string());
            return Err(VerificationError::Status {
                status: status.as_u16(),
                message: if message.is_empty() {
                    "backend reported failure".to_string()
                } else {
                    message
                },
            });
        }
        let record = VerifiedEntityRecord::from_response(body)
            .map_err(|e| VerificationError::MalformedBody(e.to_string()))?;
        if record.is_empty() {
            return Err(VerificationError::MalformedBody(
                "response has neither qrCode nor entity".to_string(),
            ));
        }

        tracing::info!(
            hash = %hash,
            kind = %record.kind(),
            entity_id = record.entity_id().unwrap_or("-"),
            "Verified QR code"
        );
        Ok(record)
    }
}

#[async_trait]
impl EntityLookup for VerificationClient {
    async fn lookup(&self, hash: &CanonicalHash) -> Result<VerifiedEntityRecord, VerificationError> {
        self.verify(hash).await
    }
}
