//! Live capture loop
//!
//! Polls a camera stream at a fixed interval and feeds each frame to the
//! decoder until a code is found or the loop is cancelled.
//!
//! States: `Idle → RequestingPermission → Streaming → (Stopped | Detected)`.
//!
//! The stream is held by a guard that stops every track when dropped, so the
//! camera is released on detection, on explicit stop, on a camera error, and
//! when the loop's future or task is torn down mid-poll. A second guard moves
//! a torn-down run to `Stopped`, including one still waiting for the camera.
//! The interval timer lives inside the same future and goes away with it.
//!
//! Decoding runs on the blocking pool so a slow frame never stalls the
//! runtime thread driving the loop.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::camera::{Camera, CameraError, Facing, VideoStream};
use crate::decoder::{decode_frame, ImageDecoder};

/// Default polling interval between decode attempts
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Capture loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    Idle,
    RequestingPermission,
    Streaming,
    Stopped,
    Detected,
}

impl CaptureState {
    /// Stopped and Detected end a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, CaptureState::Stopped | CaptureState::Detected)
    }
}

/// How a capture run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// A frame decoded; polling stopped and the camera was released
    Detected { text: String, ticks: u64 },
    /// Cancelled before anything was found
    Stopped { ticks: u64 },
}

impl CaptureOutcome {
    pub fn ticks(&self) -> u64 {
        match self {
            CaptureOutcome::Detected { ticks, .. } | CaptureOutcome::Stopped { ticks } => *ticks,
        }
    }
}

/// Ends a run in `Stopped` if it is torn down before reaching a terminal state
struct RunGuard<'a> {
    state: &'a watch::Sender<CaptureState>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.state.send_if_modified(|state| {
            if matches!(
                *state,
                CaptureState::RequestingPermission | CaptureState::Streaming
            ) {
                *state = CaptureState::Stopped;
                true
            } else {
                false
            }
        });
    }
}

/// Owns an open stream; stops its tracks when released or dropped
struct StreamGuard {
    stream: Box<dyn VideoStream>,
}

impl StreamGuard {
    fn release(&mut self) {
        if self.stream.live_tracks() > 0 {
            self.stream.stop_tracks();
            debug!("Camera stream released");
        }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Polls a camera until a QR code is decoded or the run is cancelled
#[derive(Clone)]
pub struct CaptureLoop {
    camera: Arc<dyn Camera>,
    decoder: Arc<dyn ImageDecoder>,
    poll_interval: Duration,
    facing: Facing,
    state_tx: Arc<watch::Sender<CaptureState>>,
}

impl CaptureLoop {
    pub fn new(camera: Arc<dyn Camera>, decoder: Arc<dyn ImageDecoder>) -> Self {
        let (state_tx, _) = watch::channel(CaptureState::Idle);
        Self {
            camera,
            decoder,
            poll_interval: DEFAULT_POLL_INTERVAL,
            facing: Facing::Environment,
            state_tx: Arc::new(state_tx),
        }
    }

    /// Set the polling interval (clamped to at least 1 ms)
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_facing(mut self, facing: Facing) -> Self {
        self.facing = facing;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Current state
    pub fn state(&self) -> CaptureState {
        *self.state_tx.borrow()
    }

    /// Watch state changes
    pub fn subscribe(&self) -> watch::Receiver<CaptureState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: CaptureState) {
        let old = self.state_tx.send_replace(state);
        if old != state {
            debug!(?old, new = ?state, "Capture state changed");
        }
    }

    /// Run the loop in place until detection or cancellation
    ///
    /// A camera that cannot be opened ends the run in `Stopped` with the
    /// error; the caller has to start a new run to retry.
    pub async fn run(&self, cancel: CancellationToken) -> Result<CaptureOutcome, CameraError> {
        if cancel.is_cancelled() {
            self.set_state(CaptureState::Stopped);
            return Ok(CaptureOutcome::Stopped { ticks: 0 });
        }

        // Declared before the stream guard so the camera is released first
        let _run_guard = RunGuard {
            state: &self.state_tx,
        };
        self.set_state(CaptureState::RequestingPermission);
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.set_state(CaptureState::Stopped);
                return Ok(CaptureOutcome::Stopped { ticks: 0 });
            }
            opened = self.camera.open(self.facing) => opened,
        };
        let stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Camera could not be started");
                self.set_state(CaptureState::Stopped);
                return Err(e);
            }
        };

        let mut guard = StreamGuard { stream };
        self.set_state(CaptureState::Streaming);
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Camera streaming, polling for QR codes"
        );

        let mut timer = interval(self.poll_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks: u64 = 0;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    guard.release();
                    self.set_state(CaptureState::Stopped);
                    info!(ticks, "Capture stopped");
                    return Ok(CaptureOutcome::Stopped { ticks });
                }
                _ = timer.tick() => {
                    ticks += 1;
                    // Stream not ready yet
                    let Some(frame) = guard.stream.capture_frame() else {
                        continue;
                    };
                    // Runs to completion; a stop is seen on the next iteration
                    let decoded = decode_frame(Arc::clone(&self.decoder), frame).await;
                    if let Some(text) = decoded {
                        guard.release();
                        self.set_state(CaptureState::Detected);
                        info!(ticks, "QR code detected");
                        return Ok(CaptureOutcome::Detected { text, ticks });
                    }
                }
            }
        }
    }

    /// Run the loop on a task
    pub fn spawn(&self) -> CaptureHandle {
        let cancel = CancellationToken::new();
        let capture = self.clone();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move { capture.run(task_cancel).await });

        CaptureHandle {
            cancel,
            task: Some(task),
            state: self.subscribe(),
        }
    }
}

/// Handle to a spawned capture loop
///
/// Dropping the handle stops the loop.
pub struct CaptureHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<CaptureOutcome, CameraError>>>,
    state: watch::Receiver<CaptureState>,
}

impl CaptureHandle {
    /// Stop polling and release the camera; no-op if already stopped
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> CaptureState {
        *self.state.borrow()
    }

    /// True once the loop task has exited
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Wait for the loop to end
    pub async fn wait(mut self) -> Result<CaptureOutcome, CameraError> {
        let Some(task) = self.task.take() else {
            return Ok(CaptureOutcome::Stopped { ticks: 0 });
        };
        match task.await {
            Ok(result) => result,
            Err(e) => Err(CameraError::DeviceUnavailable(format!(
                "capture task ended abnormally: {}",
                e
            ))),
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
