//! Scan session data model
//!
//! Entry methods, session status, and the verified entity record returned by
//! the backend lookup. The record schema is owned by the backend; the typed
//! view here covers the fields the scanner reads and keeps everything else.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// How the raw QR text reaches the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMethod {
    /// Live camera stream, polled until a code is found
    Camera,
    /// One selected image file, decoded once
    Upload,
    /// Free text typed by the user, no decoding
    Manual,
}

impl fmt::Display for ScanMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanMethod::Camera => "camera",
            ScanMethod::Upload => "upload",
            ScanMethod::Manual => "manual",
        };
        f.write_str(name)
    }
}

/// Scan session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    /// Waiting for input
    Idle,
    /// Camera loop polling frames
    Capturing,
    /// Decoding an uploaded image
    Decoding,
    /// Lookup request in flight
    Verifying,
    /// Record retrieved
    Success,
    /// A stage failed; see `last_error`
    Error,
}

impl ScanStatus {
    /// Success and Error end a scan attempt
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Success | ScanStatus::Error)
    }
}

/// Kind of traced entity a QR code points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    #[serde(alias = "RawMaterialBatch", alias = "raw_material", alias = "batch")]
    RawMaterialBatch,
    #[serde(alias = "FinishedGood", alias = "product")]
    FinishedGood,
    #[serde(alias = "Certificate", alias = "lab_certificate")]
    Certificate,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::RawMaterialBatch => "raw material batch",
            EntityKind::FinishedGood => "finished good",
            EntityKind::Certificate => "certificate",
            EntityKind::Unknown => "unknown entity",
        };
        f.write_str(name)
    }
}

/// QR code metadata stored by the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_count: Option<u64>,
    /// Fields this client does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Lookup result for a canonical hash: QR metadata, traced entity, events
///
/// Read-only to the scanner; handed as-is to the display layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedEntityRecord {
    #[serde(default, rename = "qrCode", skip_serializing_if = "Option::is_none")]
    pub qr: Option<QrMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityKind>,
    #[serde(default)]
    pub entity: Value,
    #[serde(default)]
    pub events: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Entity-id fields in precedence order
const ENTITY_ID_FIELDS: [&str; 4] = ["entityId", "batchId", "_id", "id"];

impl VerifiedEntityRecord {
    /// Parse a lookup response body
    ///
    /// Accepts the bare record or the `{ "success": .., "data": {..} }`
    /// envelope the backend wraps most responses in.
    pub fn from_response(body: Value) -> Result<Self, serde_json::Error> {
        let inner = match body {
            Value::Object(mut map) if map.get("data").is_some_and(Value::is_object) => {
                map.remove("data").unwrap_or(Value::Null)
            }
            other => other,
        };
        serde_json::from_value(inner)
    }

    /// True if the body carried neither QR metadata nor an entity
    pub fn is_empty(&self) -> bool {
        self.qr.is_none() && self.entity.is_null()
    }

    /// Entity kind, preferring the record level over QR metadata
    pub fn kind(&self) -> EntityKind {
        self.entity_type
            .or_else(|| self.qr.as_ref().and_then(|qr| qr.entity_type))
            .unwrap_or(EntityKind::Unknown)
    }

    /// Identifier of the traced entity
    ///
    /// Precedence: QR `entityId`, QR `batchId`, then the entity's own
    /// `entityId`, `batchId`, `_id`, `id`. Blank values are skipped.
    pub fn entity_id(&self) -> Option<&str> {
        let from_qr = self.qr.as_ref().and_then(|qr| {
            [qr.entity_id.as_deref(), qr.batch_id.as_deref()]
                .into_iter()
                .flatten()
                .find(|id| !id.trim().is_empty())
        });
        from_qr.or_else(|| {
            ENTITY_ID_FIELDS
                .iter()
                .filter_map(|field| self.entity.get(field).and_then(Value::as_str))
                .find(|id| !id.trim().is_empty())
        })
    }
}
