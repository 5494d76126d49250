//! Camera abstraction
//!
//! A [`Camera`] grants (or refuses) a [`VideoStream`]; the stream hands out the
//! current frame on demand and owns the device tracks until
//! [`VideoStream::stop_tracks`] is called. Platform capture backends plug in
//! behind these traits. [`FrameDirectoryCamera`] is the bundled device: it
//! replays image files from a directory, which is how frame dumps from a
//! kiosk camera or a test fixture are scanned.

use async_trait::async_trait;
use image::GrayImage;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::decoder::load_frame;

/// Camera could not be started
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    /// User or platform refused camera access
    #[error("Camera permission denied: {0}")]
    PermissionDenied(String),

    /// No usable camera device
    #[error("Camera unavailable: {0}")]
    DeviceUnavailable(String),
}

/// Which camera to prefer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Facing {
    /// Rear camera, pointed away from the user (preferred for scanning)
    #[default]
    Environment,
    /// Front camera
    User,
}

/// Source of camera streams
#[async_trait]
pub trait Camera: Send + Sync {
    /// Request access and open a stream
    async fn open(&self, facing: Facing) -> Result<Box<dyn VideoStream>, CameraError>;
}

/// An open camera stream
pub trait VideoStream: Send {
    /// Current frame, or `None` if the stream has no frame ready yet
    fn capture_frame(&mut self) -> Option<GrayImage>;

    /// Stop every track, releasing the device. Must be idempotent.
    fn stop_tracks(&mut self);

    /// Number of tracks still holding the device
    fn live_tracks(&self) -> usize;
}

/// Virtual camera replaying image files from a directory
///
/// Frames are served in file-name order and loop once the end is reached.
/// Files that fail to load are skipped as "frame not ready".
#[derive(Debug, Clone)]
pub struct FrameDirectoryCamera {
    dir: PathBuf,
}

const FRAME_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

impl FrameDirectoryCamera {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn list_frames(&self) -> Result<Vec<PathBuf>, CameraError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| match e.kind() {
            ErrorKind::PermissionDenied => {
                CameraError::PermissionDenied(format!("{}: {}", self.dir.display(), e))
            }
            _ => CameraError::DeviceUnavailable(format!("{}: {}", self.dir.display(), e)),
        })?;

        let mut frames: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        frames.sort();

        if frames.is_empty() {
            return Err(CameraError::DeviceUnavailable(format!(
                "no frames in {}",
                self.dir.display()
            )));
        }
        Ok(frames)
    }
}

#[async_trait]
impl Camera for FrameDirectoryCamera {
    async fn open(&self, facing: Facing) -> Result<Box<dyn VideoStream>, CameraError> {
        let frames = self.list_frames()?;
        debug!(
            dir = %self.dir.display(),
            frames = frames.len(),
            ?facing,
            "Opened frame directory camera"
        );
        Ok(Box::new(FrameDirectoryStream {
            frames,
            next: 0,
            live: true,
        }))
    }
}

struct FrameDirectoryStream {
    frames: Vec<PathBuf>,
    next: usize,
    live: bool,
}

impl VideoStream for FrameDirectoryStream {
    fn capture_frame(&mut self) -> Option<GrayImage> {
        if !self.live || self.frames.is_empty() {
            return None;
        }
        let path = &self.frames[self.next % self.frames.len()];
        self.next = self.next.wrapping_add(1);

        match std::fs::read(path).map_err(|e| e.to_string()).and_then(|bytes| {
            load_frame(&bytes).map_err(|e| e.to_string())
        }) {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!(frame = %path.display(), error = %e, "Skipping unreadable frame");
                None
            }
        }
    }

    fn stop_tracks(&mut self) {
        self.live = false;
    }

    fn live_tracks(&self) -> usize {
        usize::from(self.live)
    }
}
