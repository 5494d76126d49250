//! Scan Session Integration Tests
//!
//! Drives the Scanner through manual, upload and camera attempts with a fake
//! lookup, checking status, retained state and emitted events.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use helpers::{qr_png_bytes, write_frame_dir, FakeCamera, FakeDecoder, FakeLookup};
use qrtrace_common::events::{EventBus, ScanEvent};
use qrtrace_common::{
    EntityKind, NormalizationError, QrMetadata, ScanMethod, ScanStatus, VerifiedEntityRecord,
};
use qrtrace_scan::camera::{CameraError, FrameDirectoryCamera};
use qrtrace_scan::capture::CaptureLoop;
use qrtrace_scan::decoder::{DecodeFailure, RqrrDecoder};
use qrtrace_scan::session::Scanner;
use qrtrace_scan::verify::VerificationError;
use qrtrace_scan::ScanError;
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

fn sample_record() -> VerifiedEntityRecord {
    VerifiedEntityRecord {
        qr: Some(QrMetadata {
            qr_hash: Some("abc".to_string()),
            entity_type: Some(EntityKind::Certificate),
            entity_id: Some("CERT-9".to_string()),
            ..QrMetadata::default()
        }),
        entity: json!({ "certificateId": "CERT-9" }),
        ..VerifiedEntityRecord::default()
    }
}

fn scanner(lookup: &FakeLookup) -> Scanner {
    Scanner::new(
        Arc::new(lookup.clone()),
        Arc::new(RqrrDecoder::new()),
        EventBus::new(64),
    )
}

fn drain(rx: &mut broadcast::Receiver<ScanEvent>) -> Vec<ScanEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn statuses(events: &[ScanEvent]) -> Vec<ScanStatus> {
    events
        .iter()
        .filter_map(|event| match event {
            ScanEvent::StatusChanged { new_status, .. } => Some(*new_status),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_manual_json_payload_verifies() {
    let lookup = FakeLookup::ok(sample_record());
    let scanner = scanner(&lookup);
    let mut rx = scanner.event_bus().subscribe();
    let mut session = scanner.open_session(ScanMethod::Manual);

    let record = scanner
        .submit_manual(&mut session, r#"{"qrHash":"abc"}"#)
        .await
        .unwrap();

    assert_eq!(record.entity_id(), Some("CERT-9"));
    assert_eq!(session.status, ScanStatus::Success);
    assert_eq!(session.qr_hash.as_ref().map(|h| h.as_str()), Some("abc"));
    assert_eq!(session.record.as_ref(), Some(&record));
    assert_eq!(lookup.requested(), vec!["abc".to_string()]);

    let events = drain(&mut rx);
    assert!(matches!(events[0], ScanEvent::SessionStarted { method: ScanMethod::Manual, .. }));
    assert_eq!(statuses(&events), vec![ScanStatus::Verifying, ScanStatus::Success]);
    assert!(events.iter().any(|e| matches!(
        e,
        ScanEvent::Verified { entity_kind: EntityKind::Certificate, .. }
    )));
    assert!(events.iter().all(|e| e.session_id() == session.session_id));
}

#[tokio::test]
async fn test_manual_bare_hash_is_trimmed() {
    let lookup = FakeLookup::ok(sample_record());
    let scanner = scanner(&lookup);
    let mut session = scanner.open_session(ScanMethod::Manual);

    scanner.submit_manual(&mut session, "  abc \n").await.unwrap();

    assert_eq!(lookup.requested(), vec!["abc".to_string()]);
}

#[tokio::test]
async fn test_manual_empty_input_never_hits_backend() {
    let lookup = FakeLookup::ok(sample_record());
    let scanner = scanner(&lookup);
    let mut session = scanner.open_session(ScanMethod::Manual);

    let err = scanner.submit_manual(&mut session, "   ").await.unwrap_err();

    assert_eq!(err, ScanError::Normalize(NormalizationError::EmptyPayload));
    assert_eq!(session.status, ScanStatus::Error);
    assert!(session.last_error.is_some());
    assert!(lookup.requested().is_empty());
}

#[tokio::test]
async fn test_json_without_hash_field_fails() {
    let lookup = FakeLookup::ok(sample_record());
    let scanner = scanner(&lookup);
    let mut rx = scanner.event_bus().subscribe();
    let mut session = scanner.open_session(ScanMethod::Manual);

    let err = scanner
        .submit_manual(&mut session, r#"{"batchId":"RMB-1"}"#)
        .await
        .unwrap_err();

    assert_eq!(err, ScanError::Normalize(NormalizationError::MissingHashField));
    assert!(lookup.requested().is_empty());
    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(e, ScanEvent::ScanFailed { .. })));
}

#[tokio::test]
async fn test_verification_failure_is_reported_on_session() {
    let lookup = FakeLookup::err(VerificationError::NotFound {
        hash: "abc".to_string(),
        message: "QR code not found or inactive".to_string(),
    });
    let scanner = scanner(&lookup);
    let mut session = scanner.open_session(ScanMethod::Manual);

    let err = scanner.submit_manual(&mut session, "abc").await.unwrap_err();

    assert!(matches!(err, ScanError::Verification(VerificationError::NotFound { .. })));
    assert_eq!(session.status, ScanStatus::Error);
    assert_eq!(
        session.last_error.as_deref(),
        Some("QR code not found or inactive")
    );
    assert_eq!(session.qr_hash.as_ref().map(|h| h.as_str()), Some("abc"));
    assert!(session.record.is_none());
}

#[tokio::test]
async fn test_next_attempt_clears_previous_error() {
    let lookup = FakeLookup::ok(sample_record());
    let scanner = scanner(&lookup);
    let mut session = scanner.open_session(ScanMethod::Manual);

    scanner.submit_manual(&mut session, "").await.unwrap_err();
    scanner.submit_manual(&mut session, "abc").await.unwrap();

    assert_eq!(session.status, ScanStatus::Success);
    assert!(session.last_error.is_none());
}

#[tokio::test]
async fn test_upload_decodes_and_verifies() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("label.png");
    std::fs::write(&path, qr_png_bytes(r#"{"qrHash":"abc"}"#)).unwrap();

    let lookup = FakeLookup::ok(sample_record());
    let scanner = scanner(&lookup);
    let mut rx = scanner.event_bus().subscribe();
    let mut session = scanner.open_session(ScanMethod::Upload);

    scanner.submit_upload(&mut session, &path).await.unwrap();

    assert_eq!(session.status, ScanStatus::Success);
    assert_eq!(session.upload.as_deref(), Some(path.as_path()));
    assert_eq!(lookup.requested(), vec!["abc".to_string()]);
    assert_eq!(
        statuses(&drain(&mut rx)),
        vec![ScanStatus::Decoding, ScanStatus::Verifying, ScanStatus::Success]
    );
}

#[tokio::test]
async fn test_upload_without_code_keeps_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("blank.png");
    image::GrayImage::from_pixel(80, 80, image::Luma([255]))
        .save(&path)
        .unwrap();

    let lookup = FakeLookup::ok(sample_record());
    let scanner = scanner(&lookup);
    let mut session = scanner.open_session(ScanMethod::Upload);

    let err = scanner.submit_upload(&mut session, &path).await.unwrap_err();

    assert_eq!(err, ScanError::Decode(DecodeFailure::NoCode));
    assert_eq!(session.status, ScanStatus::Error);
    assert_eq!(session.upload.as_deref(), Some(path.as_path()));
    assert!(lookup.requested().is_empty());
}

#[tokio::test]
async fn test_upload_missing_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gone.png");

    let lookup = FakeLookup::ok(sample_record());
    let scanner = scanner(&lookup);
    let mut session = scanner.open_session(ScanMethod::Upload);

    let err = scanner.submit_upload(&mut session, &path).await.unwrap_err();

    assert!(matches!(err, ScanError::UploadRead { .. }));
    assert_eq!(session.status, ScanStatus::Error);
    assert_eq!(session.upload.as_deref(), Some(path.as_path()));
}

#[tokio::test]
async fn test_camera_detects_from_frame_directory() {
    let dir = TempDir::new().unwrap();
    write_frame_dir(dir.path(), 2, r#"{"qrHash":"abc"}"#);

    let lookup = FakeLookup::ok(sample_record());
    let scanner = scanner(&lookup);
    let mut rx = scanner.event_bus().subscribe();
    let capture = CaptureLoop::new(
        Arc::new(FrameDirectoryCamera::new(dir.path())),
        scanner.decoder(),
    )
    .with_poll_interval(Duration::from_millis(5));
    let mut session = scanner.open_session(ScanMethod::Camera);

    let record = scanner
        .run_camera(&mut session, &capture, CancellationToken::new())
        .await
        .unwrap();

    assert!(record.is_some());
    assert_eq!(session.status, ScanStatus::Success);
    assert_eq!(session.method, ScanMethod::Camera);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        ScanEvent::CaptureStopped { detected: true, ticks: 3, .. }
    )));
    assert_eq!(
        statuses(&events),
        vec![ScanStatus::Capturing, ScanStatus::Verifying, ScanStatus::Success]
    );
}

#[tokio::test]
async fn test_camera_stopped_returns_to_idle() {
    let camera = FakeCamera::new();
    let lookup = FakeLookup::ok(sample_record());
    let scanner = scanner(&lookup);
    let capture = CaptureLoop::new(Arc::new(camera.clone()), Arc::new(FakeDecoder::never()))
        .with_poll_interval(Duration::from_millis(5));
    let mut session = scanner.open_session(ScanMethod::Camera);

    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        stopper.cancel();
    });
    let result = scanner.run_camera(&mut session, &capture, cancel).await;

    assert_eq!(result, Ok(None));
    assert_eq!(session.status, ScanStatus::Idle);
    assert!(session.last_error.is_none());
    assert_eq!(camera.live(), 0);
    assert!(lookup.requested().is_empty());
}

#[tokio::test]
async fn test_dropped_camera_attempt_returns_to_idle() {
    let camera = FakeCamera::new();
    let lookup = FakeLookup::ok(sample_record());
    let scanner = scanner(&lookup);
    let capture = CaptureLoop::new(Arc::new(camera.clone()), Arc::new(FakeDecoder::never()))
        .with_poll_interval(Duration::from_millis(5));
    let mut session = scanner.open_session(ScanMethod::Camera);

    let result = tokio::time::timeout(
        Duration::from_millis(30),
        scanner.run_camera(&mut session, &capture, CancellationToken::new()),
    )
    .await;

    assert!(result.is_err(), "capture should still be running at timeout");
    assert_eq!(session.status, ScanStatus::Idle);
    assert!(session.last_error.is_none());
    assert_eq!(camera.live(), 0);
}

#[tokio::test]
async fn test_failed_upload_does_not_show_previous_hash() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("blank.png");
    image::GrayImage::from_pixel(80, 80, image::Luma([255]))
        .save(&path)
        .unwrap();

    let lookup = FakeLookup::ok(sample_record());
    let scanner = scanner(&lookup);
    let mut session = scanner.open_session(ScanMethod::Manual);
    scanner.submit_manual(&mut session, "abc").await.unwrap();
    assert!(session.qr_hash.is_some());

    scanner.submit_upload(&mut session, &path).await.unwrap_err();

    assert_eq!(session.status, ScanStatus::Error);
    assert!(session.qr_hash.is_none());
    assert!(session.record.is_none());
}

#[tokio::test]
async fn test_camera_permission_denied_sets_error() {
    let lookup = FakeLookup::ok(sample_record());
    let scanner = scanner(&lookup);
    let capture = CaptureLoop::new(Arc::new(FakeCamera::denied()), scanner.decoder());
    let mut session = scanner.open_session(ScanMethod::Camera);

    let err = scanner
        .run_camera(&mut session, &capture, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ScanError::Camera(CameraError::PermissionDenied(_))));
    assert_eq!(session.status, ScanStatus::Error);
    assert!(session
        .last_error
        .as_deref()
        .is_some_and(|m| m.contains("permission denied")));
}

#[tokio::test]
async fn test_switching_method_updates_session() {
    let lookup = FakeLookup::ok(sample_record());
    let scanner = scanner(&lookup);
    let mut session = scanner.open_session(ScanMethod::Camera);

    scanner.submit_manual(&mut session, "abc").await.unwrap();

    assert_eq!(session.method, ScanMethod::Manual);
}

#[tokio::test]
async fn test_reset_clears_everything() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gone.png");
    let lookup = FakeLookup::ok(sample_record());
    let scanner = scanner(&lookup);
    let mut rx = scanner.event_bus().subscribe();
    let mut session = scanner.open_session(ScanMethod::Upload);
    scanner.submit_upload(&mut session, &path).await.unwrap_err();

    scanner.reset(&mut session);

    assert_eq!(session.status, ScanStatus::Idle);
    assert!(session.last_error.is_none());
    assert!(session.upload.is_none());
    assert!(session.qr_hash.is_none());
    assert!(session.record.is_none());
    assert!(matches!(
        drain(&mut rx).last(),
        Some(ScanEvent::SessionReset { .. })
    ));
}
