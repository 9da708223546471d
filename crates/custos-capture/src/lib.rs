#![warn(missing_docs)]
//! # custos-capture
//!
//! ## Purpose
//! Provides the capture device abstraction, the capture state machine, and
//! the recording duration counter.
//!
//! ## Responsibilities
//! - Define a backend-agnostic [`CaptureDevice`] trait.
//! - Expose a deterministic [`SyntheticCaptureDevice`] for CI and unit tests.
//! - Enforce legal capture transitions in [`CaptureMachine`].
//! - Count displayed recording seconds with a [`DurationCounter`] that is
//!   cancelled when dropped.
//!
//! ## Data flow
//! Screen arms the machine -> device records or snaps a photo ->
//! [`MediaHandle`] becomes [`custos_core::CapturedMedia`] -> machine opens the
//! naming step.
//!
//! ## Ownership and lifetimes
//! The machine owns at most one [`custos_core::CapturedMedia`]. The counter
//! task lives exactly as long as its [`DurationCounter`] value.
//!
//! ## Error model
//! Device failures and illegal transitions are reported as [`CaptureError`]
//! values; the machine state is never changed by a rejected transition.
//!
//! ## Security and privacy notes
//! Media bytes stay with the device; only locators cross this boundary.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use custos_core::{CapturedMedia, MediaKind};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Hard upper bound for one recording, in seconds.
pub const MAX_RECORDING_SECONDS: u32 = 60;
/// Video quality preset requested from the device.
pub const VIDEO_QUALITY: &str = "720p";
/// Video bitrate requested from the device, in bits per second.
pub const VIDEO_BITRATE_BPS: u32 = 5_000_000;
/// Still image compression quality in `(0.0, 1.0]`.
pub const PHOTO_QUALITY: f32 = 0.8;

/// Parameters for one video recording.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingOptions {
    /// Device stops on its own after this many seconds.
    pub max_duration_seconds: u32,
    /// Quality preset name.
    pub quality: String,
    /// Target bitrate in bits per second.
    pub video_bitrate_bps: u32,
    /// Record without an audio track.
    pub mute: bool,
}

impl RecordingOptions {
    /// Creates validated recording options with audio enabled.
    ///
    /// # Errors
    /// Returns [`CaptureError::InvalidOptions`] when the duration or bitrate
    /// is zero.
    pub fn new(
        max_duration_seconds: u32,
        quality: impl Into<String>,
        video_bitrate_bps: u32,
    ) -> Result<Self, CaptureError> {
        if max_duration_seconds == 0 {
            return Err(CaptureError::InvalidOptions(
                "max duration must be greater than zero".to_string(),
            ));
        }
        if video_bitrate_bps == 0 {
            return Err(CaptureError::InvalidOptions(
                "bitrate must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            max_duration_seconds,
            quality: quality.into(),
            video_bitrate_bps,
            mute: false,
        })
    }

    /// Returns the device-side cutoff as a [`Duration`].
    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.max_duration_seconds))
    }
}

impl Default for RecordingOptions {
    fn default() -> Self {
        Self {
            max_duration_seconds: MAX_RECORDING_SECONDS,
            quality: VIDEO_QUALITY.to_string(),
            video_bitrate_bps: VIDEO_BITRATE_BPS,
            mute: false,
        }
    }
}

/// Parameters for one still capture.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoOptions {
    /// Compression quality in `(0.0, 1.0]`.
    pub quality: f32,
    /// Ask the device to also return a base64 payload.
    pub include_base64: bool,
}

impl PhotoOptions {
    /// Returns the quality as the hint string stored on captured media.
    pub fn quality_hint(&self) -> String {
        format!("{:.1}", self.quality)
    }
}

impl Default for PhotoOptions {
    fn default() -> Self {
        Self {
            quality: PHOTO_QUALITY,
            include_base64: true,
        }
    }
}

/// Device result for one finished capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaHandle {
    /// Device locator of the produced file.
    pub uri: String,
    /// Inline base64 payload when requested and supported.
    pub base64: Option<String>,
}

/// Camera API used by the capture screen.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Records until [`CaptureDevice::stop_recording`] is called or the
    /// maximum duration elapses, then resolves with the clip.
    async fn record_video(&self, options: &RecordingOptions) -> Result<MediaHandle, CaptureError>;

    /// Asks the device to end the pending recording.
    async fn stop_recording(&self) -> Result<(), CaptureError>;

    /// Captures one still frame.
    async fn take_picture(&self, options: &PhotoOptions) -> Result<MediaHandle, CaptureError>;
}

/// Deterministic device for test and CI usage.
///
/// Recordings end on `stop_recording` or after the requested maximum
/// duration of (tokio) time. Locators are numbered sequentially.
#[derive(Debug)]
pub struct SyntheticCaptureDevice {
    sequence: Mutex<u64>,
    stop_generation: watch::Sender<u64>,
    recording: AtomicBool,
    stop_calls: AtomicU32,
    last_recording: Mutex<Option<RecordingOptions>>,
    failure: Option<String>,
}

impl SyntheticCaptureDevice {
    /// Creates a device whose operations succeed.
    pub fn new() -> Self {
        let (stop_generation, _) = watch::channel(0);
        Self {
            sequence: Mutex::new(0),
            stop_generation,
            recording: AtomicBool::new(false),
            stop_calls: AtomicU32::new(0),
            last_recording: Mutex::new(None),
            failure: None,
        }
    }

    /// Creates a device whose record and photo operations fail with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::new()
        }
    }

    /// Returns how many times `stop_recording` was called.
    pub fn stop_calls(&self) -> u32 {
        self.stop_calls.load(Ordering::SeqCst)
    }

    /// Returns the options of the most recent recording request.
    pub fn last_recording_options(&self) -> Option<RecordingOptions> {
        self.last_recording
            .lock()
            .ok()
            .and_then(|options| options.clone())
    }

    fn next_sequence(&self) -> Result<u64, CaptureError> {
        let mut sequence = self
            .sequence
            .lock()
            .map_err(|_| CaptureError::Device("synthetic sequence lock poisoned".to_string()))?;
        *sequence += 1;
        Ok(*sequence)
    }

    fn check_failure(&self) -> Result<(), CaptureError> {
        match &self.failure {
            Some(message) => Err(CaptureError::Device(message.clone())),
            None => Ok(()),
        }
    }
}

impl Default for SyntheticCaptureDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureDevice for SyntheticCaptureDevice {
    async fn record_video(&self, options: &RecordingOptions) -> Result<MediaHandle, CaptureError> {
        if let Ok(mut last) = self.last_recording.lock() {
            *last = Some(options.clone());
        }
        self.check_failure()?;

        let mut stop = self.stop_generation.subscribe();
        self.recording.store(true, Ordering::SeqCst);
        tokio::select! {
            _ = tokio::time::sleep(options.max_duration()) => {}
            _ = stop.changed() => {}
        }
        self.recording.store(false, Ordering::SeqCst);

        let sequence = self.next_sequence()?;
        Ok(MediaHandle {
            uri: format!("file:///synthetic/video-{sequence}.mp4"),
            base64: None,
        })
    }

    async fn stop_recording(&self) -> Result<(), CaptureError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if self.recording.load(Ordering::SeqCst) {
            self.stop_generation
                .send_modify(|generation| *generation = generation.wrapping_add(1));
        }
        Ok(())
    }

    async fn take_picture(&self, options: &PhotoOptions) -> Result<MediaHandle, CaptureError> {
        self.check_failure()?;
        let sequence = self.next_sequence()?;
        Ok(MediaHandle {
            uri: format!("file:///synthetic/photo-{sequence}.jpg"),
            base64: options
                .include_base64
                .then(|| "c3ludGhldGljLWZyYW1l".to_string()),
        })
    }
}

/// Capture screen state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Capture mode not entered.
    Idle,
    /// Camera preview live, nothing running.
    Armed,
    /// Video recording in progress.
    Recording,
    /// Stop requested; waiting for the device to hand over the clip.
    Stopping,
    /// Still capture in progress.
    Capturing,
    /// Media captured and waiting for a title.
    Naming,
    /// Evidence submission in flight.
    Submitting,
    /// Submission confirmed; confirmation is on screen.
    Confirmed,
}

impl CaptureState {
    /// Returns `true` while the device is producing media.
    pub fn is_capturing(&self) -> bool {
        matches!(
            self,
            CaptureState::Recording | CaptureState::Stopping | CaptureState::Capturing
        )
    }
}

/// Capture state machine with explicit legal transitions.
#[derive(Debug, Clone)]
pub struct CaptureMachine {
    state: CaptureState,
    media: Option<CapturedMedia>,
    last_kind: Option<MediaKind>,
}

impl CaptureMachine {
    /// Creates a machine in `Idle`.
    pub fn new() -> Self {
        Self {
            state: CaptureState::Idle,
            media: None,
            last_kind: None,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Returns the media waiting for naming or submission.
    pub fn media(&self) -> Option<&CapturedMedia> {
        self.media.as_ref()
    }

    /// Returns the kind of the most recent capture attempt.
    pub fn last_kind(&self) -> Option<MediaKind> {
        self.last_kind
    }

    /// Returns `true` while a video recording is running.
    pub fn is_recording(&self) -> bool {
        self.state == CaptureState::Recording
    }

    /// `Idle -> Armed`.
    pub fn arm(&mut self) -> Result<(), CaptureError> {
        self.transition(&[CaptureState::Idle], CaptureState::Armed, "arm camera")
    }

    /// `Armed -> Recording`.
    pub fn begin_recording(&mut self) -> Result<(), CaptureError> {
        self.transition(
            &[CaptureState::Armed],
            CaptureState::Recording,
            "start recording",
        )?;
        self.last_kind = Some(MediaKind::Video);
        Ok(())
    }

    /// `Recording -> Stopping`.
    pub fn request_stop(&mut self) -> Result<(), CaptureError> {
        self.transition(
            &[CaptureState::Recording],
            CaptureState::Stopping,
            "stop recording",
        )
    }

    /// `Armed -> Capturing`.
    pub fn begin_photo(&mut self) -> Result<(), CaptureError> {
        self.transition(
            &[CaptureState::Armed],
            CaptureState::Capturing,
            "take picture",
        )?;
        self.last_kind = Some(MediaKind::Photo);
        Ok(())
    }

    /// `Recording | Stopping | Capturing -> Naming`, storing `media`.
    ///
    /// # Errors
    /// Returns [`CaptureError::MediaInFlight`] when media is already held.
    pub fn media_ready(&mut self, media: CapturedMedia) -> Result<(), CaptureError> {
        if self.media.is_some() {
            return Err(CaptureError::MediaInFlight);
        }
        self.transition(
            &[
                CaptureState::Recording,
                CaptureState::Stopping,
                CaptureState::Capturing,
            ],
            CaptureState::Naming,
            "accept media",
        )?;
        self.media = Some(media);
        Ok(())
    }

    /// `Recording | Stopping | Capturing -> Armed` after a device failure or
    /// an operator cancel.
    pub fn abort_capture(&mut self) -> Result<(), CaptureError> {
        self.transition(
            &[
                CaptureState::Recording,
                CaptureState::Stopping,
                CaptureState::Capturing,
            ],
            CaptureState::Armed,
            "cancel capture",
        )
    }

    /// `Naming -> Armed`, discarding the media.
    pub fn cancel_naming(&mut self) -> Result<(), CaptureError> {
        self.transition(&[CaptureState::Naming], CaptureState::Armed, "cancel naming")?;
        self.media = None;
        Ok(())
    }

    /// `Naming -> Submitting`.
    pub fn begin_submit(&mut self) -> Result<(), CaptureError> {
        self.transition(
            &[CaptureState::Naming],
            CaptureState::Submitting,
            "submit evidence",
        )
    }

    /// `Submitting -> Naming`, keeping the media for a retry.
    pub fn submit_failed(&mut self) -> Result<(), CaptureError> {
        self.transition(
            &[CaptureState::Submitting],
            CaptureState::Naming,
            "reopen naming",
        )
    }

    /// `Submitting -> Confirmed`, releasing the media.
    pub fn confirm(&mut self) -> Result<(), CaptureError> {
        self.transition(
            &[CaptureState::Submitting],
            CaptureState::Confirmed,
            "confirm submission",
        )?;
        self.media = None;
        Ok(())
    }

    /// Any state -> `Idle`, clearing media and capture kind.
    pub fn reset(&mut self) {
        self.state = CaptureState::Idle;
        self.media = None;
        self.last_kind = None;
    }

    fn transition(
        &mut self,
        allowed: &[CaptureState],
        next: CaptureState,
        action: &'static str,
    ) -> Result<(), CaptureError> {
        if !allowed.contains(&self.state) {
            return Err(CaptureError::InvalidTransition {
                from: self.state,
                action,
            });
        }
        tracing::debug!(stage = "capture", from = ?self.state, to = ?next, action, "transition");
        self.state = next;
        Ok(())
    }
}

impl Default for CaptureMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of a duration counter that survives the counter itself.
#[derive(Debug, Clone)]
pub struct DurationReader(Arc<AtomicU32>);

impl DurationReader {
    /// Returns elapsed whole seconds.
    pub fn seconds(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-second display counter running as a tokio task.
///
/// The task is aborted when the counter is stopped or dropped.
#[derive(Debug)]
pub struct DurationCounter {
    seconds: Arc<AtomicU32>,
    task: JoinHandle<()>,
}

impl DurationCounter {
    /// Starts counting from zero; the first increment lands one second later.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start() -> Self {
        let seconds = Arc::new(AtomicU32::new(0));
        let ticks = Arc::clone(&seconds);
        let task = tokio::spawn(async move {
            let period = Duration::from_secs(1);
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                ticks.fetch_add(1, Ordering::SeqCst);
            }
        });

        Self { seconds, task }
    }

    /// Returns elapsed whole seconds.
    pub fn seconds(&self) -> u32 {
        self.seconds.load(Ordering::SeqCst)
    }

    /// Returns a reader that keeps observing the value after drop.
    pub fn reader(&self) -> DurationReader {
        DurationReader(Arc::clone(&self.seconds))
    }

    /// Stops counting and returns the final value.
    pub fn stop(self) -> u32 {
        self.task.abort();
        self.seconds()
    }
}

impl Drop for DurationCounter {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Converts a device handle into captured media of `kind`.
///
/// # Errors
/// Returns [`CaptureError::Device`] when the handle carries no locator.
pub fn media_from_handle(
    handle: MediaHandle,
    kind: MediaKind,
    duration_seconds: u32,
    quality_hint: &str,
) -> Result<CapturedMedia, CaptureError> {
    let media = match kind {
        MediaKind::Video => CapturedMedia::video(handle.uri, duration_seconds, quality_hint),
        MediaKind::Photo => CapturedMedia::photo(handle.uri, quality_hint),
    };
    media.map_err(|error| CaptureError::Device(error.to_string()))
}

/// Capture layer error type.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Device rejected or failed the operation.
    #[error("capture device failure: {0}")]
    Device(String),
    /// Operation not legal in the current state.
    #[error("cannot {action} while {from:?}")]
    InvalidTransition {
        /// State the machine was in.
        from: CaptureState,
        /// Rejected operation.
        action: &'static str,
    },
    /// A captured item is still waiting for naming or submission.
    #[error("captured media already in flight")]
    MediaInFlight,
    /// Recording options failed validation.
    #[error("invalid capture options: {0}")]
    InvalidOptions(String),
}
