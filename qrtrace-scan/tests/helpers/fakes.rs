//! In-memory fakes for the camera, decoder, and lookup seams

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{GrayImage, Luma};
use qrtrace_common::{CanonicalHash, VerifiedEntityRecord};
use qrtrace_scan::camera::{Camera, CameraError, Facing, VideoStream};
use qrtrace_scan::decoder::ImageDecoder;
use qrtrace_scan::verify::{EntityLookup, VerificationError};

/// Camera whose streams count live tracks in a shared counter
#[derive(Clone, Default)]
pub struct FakeCamera {
    pub live_tracks: Arc<AtomicUsize>,
    pub opens: Arc<AtomicUsize>,
    pub open_error: Option<CameraError>,
    pub open_delay: Option<Duration>,
    /// Frames before the stream reports "ready"
    pub warmup_frames: usize,
}

impl FakeCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn denied() -> Self {
        Self {
            open_error: Some(CameraError::PermissionDenied("user dismissed prompt".into())),
            ..Self::default()
        }
    }

    pub fn live(&self) -> usize {
        self.live_tracks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Camera for FakeCamera {
    async fn open(&self, _facing: Facing) -> Result<Box<dyn VideoStream>, CameraError> {
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = &self.open_error {
            return Err(err.clone());
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        // Two tracks, like a device exposing video plus metadata
        self.live_tracks.fetch_add(2, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            live_tracks: Arc::clone(&self.live_tracks),
            tracks: 2,
            warmup_left: self.warmup_frames,
        }))
    }
}

struct FakeStream {
    live_tracks: Arc<AtomicUsize>,
    tracks: usize,
    warmup_left: usize,
}

impl VideoStream for FakeStream {
    fn capture_frame(&mut self) -> Option<GrayImage> {
        if self.tracks == 0 {
            return None;
        }
        if self.warmup_left > 0 {
            self.warmup_left -= 1;
            return None;
        }
        Some(GrayImage::from_pixel(4, 4, Luma([255])))
    }

    fn stop_tracks(&mut self) {
        self.live_tracks.fetch_sub(self.tracks, Ordering::SeqCst);
        self.tracks = 0;
    }

    fn live_tracks(&self) -> usize {
        self.tracks
    }
}

/// Decoder that misses until call number `hit_on` (1-based), then hits
#[derive(Clone, Default)]
pub struct FakeDecoder {
    pub calls: Arc<AtomicUsize>,
    pub hit_on: Option<usize>,
    pub text: String,
}

impl FakeDecoder {
    pub fn never() -> Self {
        Self::default()
    }

    pub fn hit_on(call: usize, text: &str) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            hit_on: Some(call),
            text: text.to_string(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageDecoder for FakeDecoder {
    fn decode(&self, _frame: &GrayImage) -> Option<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.hit_on {
            Some(hit) if call >= hit => Some(self.text.clone()),
            _ => None,
        }
    }
}

/// Lookup returning a canned response and recording requested hashes
#[derive(Clone)]
pub struct FakeLookup {
    pub response: Result<VerifiedEntityRecord, VerificationError>,
    pub requested: Arc<Mutex<Vec<String>>>,
}

impl FakeLookup {
    pub fn ok(record: VerifiedEntityRecord) -> Self {
        Self {
            response: Ok(record),
            requested: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn err(error: VerificationError) -> Self {
        Self {
            response: Err(error),
            requested: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl EntityLookup for FakeLookup {
    async fn lookup(&self, hash: &CanonicalHash) -> Result<VerifiedEntityRecord, VerificationError> {
        self.requested.lock().unwrap().push(hash.to_string());
        self.response.clone()
    }
}
