//! # qrtrace Common Library
//!
//! Shared code for the qrtrace scanner tools including:
//! - QR payload normalization (JSON-wrapped or raw hashes)
//! - Scan session data model and verified entity records
//! - Event types (ScanEvent) and the EventBus
//! - Explicit authentication session context
//! - Configuration loading

pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod payload;
pub mod scan;

pub use auth::{AuthSession, UserProfile};
pub use error::{Error, Result};
pub use payload::{normalize, wrap_payload, CanonicalHash, NormalizationError};
pub use scan::{EntityKind, QrMetadata, ScanMethod, ScanStatus, VerifiedEntityRecord};
