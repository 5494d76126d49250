//! Scan session orchestration
//!
//! A [`ScanSession`] is one user-initiated verification attempt. The
//! [`Scanner`] drives it through the stages for each entry method:
//!
//! - camera: capture loop → normalize → verify
//! - upload: decode once → normalize → verify
//! - manual: normalize → verify
//!
//! Stage failures never escape as panics or fatal errors: the session moves
//! to `Error` with a readable message and keeps whatever it already had (the
//! uploaded file, the last hash) until the next attempt or a reset.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use qrtrace_common::events::{EventBus, ScanEvent};
use qrtrace_common::{normalize, CanonicalHash, ScanMethod, ScanStatus, VerifiedEntityRecord};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::capture::{CaptureLoop, CaptureOutcome};
use crate::decoder::{decode_upload, ImageDecoder};
use crate::error::{ScanError, ScanResult};
use crate::verify::EntityLookup;

/// Status transition record
#[derive(Debug, Clone, Serialize)]
pub struct StatusTransition {
    pub session_id: Uuid,
    pub old_status: ScanStatus,
    pub new_status: ScanStatus,
    pub transitioned_at: DateTime<Utc>,
}

/// One verification attempt (in-memory only)
#[derive(Debug, Clone, Serialize)]
pub struct ScanSession {
    /// Unique session identifier
    pub session_id: Uuid,

    /// Entry method of the current attempt
    pub method: ScanMethod,

    /// Current status
    pub status: ScanStatus,

    /// Message of the last failure, kept until the next attempt or reset
    pub last_error: Option<String>,

    /// Image selected for the upload method
    pub upload: Option<PathBuf>,

    /// Hash the current attempt normalized to
    pub qr_hash: Option<CanonicalHash>,

    /// Record from the last successful lookup
    pub record: Option<VerifiedEntityRecord>,

    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScanSession {
    pub fn new(method: ScanMethod) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            method,
            status: ScanStatus::Idle,
            last_error: None,
            upload: None,
            qr_hash: None,
            record: None,
            started_at: now,
            updated_at: now,
        }
    }

    /// Transition to new status
    pub fn transition_to(&mut self, new_status: ScanStatus) -> StatusTransition {
        let now = Utc::now();
        let transition = StatusTransition {
            session_id: self.session_id,
            old_status: self.status,
            new_status,
            transitioned_at: now,
        };
        self.status = new_status;
        self.updated_at = now;
        transition
    }

    /// Start a new attempt: clear the previous outcome, keep the upload
    fn begin_attempt(&mut self, method: ScanMethod) {
        self.method = method;
        self.last_error = None;
        self.qr_hash = None;
        self.record = None;
    }

    /// "Scan another": drop everything from previous attempts
    pub fn reset(&mut self) {
        self.status = ScanStatus::Idle;
        self.last_error = None;
        self.upload = None;
        self.qr_hash = None;
        self.record = None;
        self.updated_at = Utc::now();
    }
}

/// Returns a camera attempt dropped mid-capture to `Idle`
///
/// Disarmed once the capture loop has produced a result.
struct CaptureAttempt<'a> {
    scanner: &'a Scanner,
    session: &'a mut ScanSession,
    armed: bool,
}

impl Drop for CaptureAttempt<'_> {
    fn drop(&mut self) {
        if self.armed && self.session.status == ScanStatus::Capturing {
            tracing::debug!(
                session_id = %self.session.session_id,
                "Camera attempt dropped while capturing"
            );
            self.scanner.transition(self.session, ScanStatus::Idle);
        }
    }
}

/// Drives scan sessions through decode, normalize and verify
#[derive(Clone)]
pub struct Scanner {
    lookup: Arc<dyn EntityLookup>,
    decoder: Arc<dyn ImageDecoder>,
    event_bus: EventBus,
}

impl Scanner {
    pub fn new(
        lookup: Arc<dyn EntityLookup>,
        decoder: Arc<dyn ImageDecoder>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            lookup,
            decoder,
            event_bus,
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn decoder(&self) -> Arc<dyn ImageDecoder> {
        Arc::clone(&self.decoder)
    }

    /// Open a session for a scanner view
    pub fn open_session(&self, method: ScanMethod) -> ScanSession {
        let session = ScanSession::new(method);
        tracing::info!(session_id = %session.session_id, %method, "Scan session opened");
        self.event_bus.emit_lossy(ScanEvent::SessionStarted {
            session_id: session.session_id,
            method,
            timestamp: session.started_at,
        });
        session
    }

    /// Clear the session for another scan
    pub fn reset(&self, session: &mut ScanSession) {
        session.reset();
        tracing::debug!(session_id = %session.session_id, "Scan session reset");
        self.event_bus.emit_lossy(ScanEvent::SessionReset {
            session_id: session.session_id,
            timestamp: session.updated_at,
        });
    }

    fn transition(&self, session: &mut ScanSession, new_status: ScanStatus) {
        let transition = session.transition_to(new_status);
        if transition.old_status != transition.new_status {
            self.event_bus.emit_lossy(ScanEvent::StatusChanged {
                session_id: transition.session_id,
                old_status: transition.old_status,
                new_status: transition.new_status,
                timestamp: transition.transitioned_at,
            });
        }
    }

    /// Record a failure on the session and hand the error back
    fn fail(&self, session: &mut ScanSession, error: impl Into<ScanError>) -> ScanError {
        let error = error.into();
        let message = error.to_string();
        tracing::warn!(
            session_id = %session.session_id,
            method = %session.method,
            error = %message,
            "Scan attempt failed"
        );
        session.last_error = Some(message.clone());
        self.transition(session, ScanStatus::Error);
        self.event_bus.emit_lossy(ScanEvent::ScanFailed {
            session_id: session.session_id,
            message,
            timestamp: session.updated_at,
        });
        error
    }

    /// Normalize raw QR text and look the hash up
    async fn resolve_and_verify(
        &self,
        session: &mut ScanSession,
        raw_text: &str,
    ) -> ScanResult<VerifiedEntityRecord> {
        let hash = match normalize(raw_text) {
            Ok(hash) => hash,
            Err(e) => return Err(self.fail(session, e)),
        };
        session.qr_hash = Some(hash.clone());
        self.event_bus.emit_lossy(ScanEvent::HashResolved {
            session_id: session.session_id,
            qr_hash: hash.to_string(),
            timestamp: Utc::now(),
        });

        self.transition(session, ScanStatus::Verifying);
        let record = match self.lookup.lookup(&hash).await {
            Ok(record) => record,
            Err(e) => return Err(self.fail(session, e)),
        };

        session.record = Some(record.clone());
        self.transition(session, ScanStatus::Success);
        self.event_bus.emit_lossy(ScanEvent::Verified {
            session_id: session.session_id,
            qr_hash: hash.to_string(),
            entity_kind: record.kind(),
            entity_id: record.entity_id().map(str::to_string),
            timestamp: session.updated_at,
        });
        tracing::info!(
            session_id = %session.session_id,
            hash = %hash,
            kind = %record.kind(),
            "Scan verified"
        );
        Ok(record)
    }

    /// Manual entry: the text goes straight to the normalizer
    pub async fn submit_manual(
        &self,
        session: &mut ScanSession,
        text: &str,
    ) -> ScanResult<VerifiedEntityRecord> {
        session.begin_attempt(ScanMethod::Manual);
        self.resolve_and_verify(session, text).await
    }

    /// Upload: decode the selected image once
    pub async fn submit_upload(
        &self,
        session: &mut ScanSession,
        path: &Path,
    ) -> ScanResult<VerifiedEntityRecord> {
        session.begin_attempt(ScanMethod::Upload);
        session.upload = Some(path.to_path_buf());
        self.transition(session, ScanStatus::Decoding);

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return Err(self.fail(
                    session,
                    ScanError::UploadRead {
                        path: path.display().to_string(),
                        message: e.to_string(),
                    },
                ))
            }
        };
        self.submit_upload_bytes(session, &bytes).await
    }

    /// Upload from bytes already in memory
    ///
    /// Keeps `session.upload` as set by the caller.
    pub async fn submit_upload_bytes(
        &self,
        session: &mut ScanSession,
        bytes: &[u8],
    ) -> ScanResult<VerifiedEntityRecord> {
        session.begin_attempt(ScanMethod::Upload);
        self.transition(session, ScanStatus::Decoding);

        let text = match decode_upload(Arc::clone(&self.decoder), bytes.to_vec()).await {
            Ok(text) => text,
            Err(e) => return Err(self.fail(session, e)),
        };
        tracing::debug!(session_id = %session.session_id, "Decoded uploaded image");
        self.resolve_and_verify(session, &text).await
    }

    /// Camera: poll until a code is found, then verify it
    ///
    /// Returns `Ok(None)` if the capture was stopped before anything was
    /// detected; the session goes back to `Idle` without an error. Dropping
    /// the returned future while capturing does the same.
    pub async fn run_camera(
        &self,
        session: &mut ScanSession,
        capture: &CaptureLoop,
        cancel: CancellationToken,
    ) -> ScanResult<Option<VerifiedEntityRecord>> {
        session.begin_attempt(ScanMethod::Camera);
        self.transition(session, ScanStatus::Capturing);
        self.event_bus.emit_lossy(ScanEvent::CaptureStarted {
            session_id: session.session_id,
            poll_interval_ms: capture.poll_interval().as_millis() as u64,
            timestamp: Utc::now(),
        });

        let mut attempt = CaptureAttempt {
            scanner: self,
            session: &mut *session,
            armed: true,
        };
        let result = capture.run(cancel).await;
        attempt.armed = false;
        drop(attempt);

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.fail(session, e)),
        };
        self.event_bus.emit_lossy(ScanEvent::CaptureStopped {
            session_id: session.session_id,
            detected: matches!(outcome, CaptureOutcome::Detected { .. }),
            ticks: outcome.ticks(),
            timestamp: Utc::now(),
        });

        match outcome {
            CaptureOutcome::Detected { text, .. } => {
                self.resolve_and_verify(session, &text).await.map(Some)
            }
            CaptureOutcome::Stopped { .. } => {
                self.transition(session, ScanStatus::Idle);
                Ok(None)
            }
        }
    }
}
