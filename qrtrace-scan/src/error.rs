//! Error types for qrtrace-scan
//!
//! Every stage of a scan has its own error enum; [`ScanError`] gathers them at
//! the session boundary. Display strings are what the user is shown.

use qrtrace_common::NormalizationError;
use thiserror::Error;

use crate::camera::CameraError;
use crate::decoder::DecodeFailure;
use crate::verify::VerificationError;

/// Any failure of a scan attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error(transparent)]
    Decode(#[from] DecodeFailure),

    #[error(transparent)]
    Normalize(#[from] NormalizationError),

    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// Selected upload file could not be read
    #[error("Could not read {path}: {message}")]
    UploadRead { path: String, message: String },
}

/// Result type for scan operations
pub type ScanResult<T> = Result<T, ScanError>;
