#![warn(missing_docs)]
//! # custos-ui
//!
//! ## Purpose
//! Projects capture screen state into a display-safe view model.
//!
//! ## Responsibilities
//! - Decide which surface is shown (landing or camera) and which modals are
//!   visible.
//! - Produce prompt, duration, and wallet badge texts.
//!
//! ## Data flow
//! App orchestration builds a [`ViewInput`] from its state and calls
//! [`ScreenView::project`]; the shell renders the returned [`ScreenView`].
//!
//! ## Error model
//! Projection is total; every input combination maps to a view.
//!
//! ## Security and privacy notes
//! Only a truncated wallet address reaches the view.

use custos_capture::CaptureState;
use custos_core::MediaKind;

/// Landing copy shown before capture mode is entered.
pub const LANDING_MESSAGE: &str = "You have not saved any video or image \non the blockchain yet. Launch your \ncamera to record your evidence.";
/// Camera prompt while a recording runs.
pub const RECORDING_PROMPT: &str = "Recording in progress...";
/// Camera prompt after a photo was requested.
pub const PHOTO_PROMPT: &str = "Taking a picture...";
/// Default camera prompt.
pub const CAMERA_PROMPT: &str =
    "You can record a video, or take a picture to keep on the blockchain";
/// Naming modal title.
pub const NAMING_TITLE: &str = "What would you like to name your evidence?";
/// Confirmation modal title.
pub const CONFIRMATION_TITLE: &str = "Your media is saved on the Blockchain";

/// Top-level surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenMode {
    /// Empty state with the "Start Recording" action.
    Landing,
    /// Live camera with capture controls.
    Camera,
}

/// Inputs for one projection.
#[derive(Debug, Clone, Copy)]
pub struct ViewInput<'a> {
    /// Capture machine state.
    pub state: CaptureState,
    /// Kind of the latest capture attempt.
    pub last_kind: Option<MediaKind>,
    /// Displayed recording seconds.
    pub recording_seconds: u32,
    /// Pending operator-facing error.
    pub error_message: Option<&'a str>,
    /// Active wallet address.
    pub account_address: Option<&'a str>,
    /// All three permissions granted in the last round, if one happened.
    pub has_permission: Option<bool>,
}

/// Rendered screen model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenView {
    /// Visible surface.
    pub mode: ScreenMode,
    /// Prompt under the header.
    pub prompt: String,
    /// Record/photo buttons shown.
    pub capture_controls_visible: bool,
    /// Stop button shown instead of capture buttons.
    pub stop_visible: bool,
    /// Naming modal visible.
    pub naming_visible: bool,
    /// Submission spinner visible.
    pub loading: bool,
    /// Confirmation modal visible.
    pub success_visible: bool,
    /// Recording duration label.
    pub duration_label: String,
    /// Error text inside the naming modal.
    pub error_message: Option<String>,
    /// Shortened wallet address for the header badge.
    pub wallet_badge: Option<String>,
    /// Result of the last permission round.
    pub has_permission: Option<bool>,
}

impl ScreenView {
    /// Projects `input` into a view.
    pub fn project(input: &ViewInput<'_>) -> Self {
        let mode = match input.state {
            CaptureState::Idle => ScreenMode::Landing,
            _ => ScreenMode::Camera,
        };

        let prompt = match (mode, input.state, input.last_kind) {
            (ScreenMode::Landing, _, _) => LANDING_MESSAGE,
            (_, CaptureState::Recording, _) => RECORDING_PROMPT,
            (_, _, Some(MediaKind::Photo)) => PHOTO_PROMPT,
            _ => CAMERA_PROMPT,
        };

        let naming_open = matches!(input.state, CaptureState::Naming | CaptureState::Submitting);

        Self {
            mode,
            prompt: prompt.to_string(),
            capture_controls_visible: input.state == CaptureState::Armed,
            stop_visible: input.state == CaptureState::Recording,
            naming_visible: naming_open,
            loading: input.state == CaptureState::Submitting,
            success_visible: input.state == CaptureState::Confirmed,
            duration_label: format_duration(input.recording_seconds),
            error_message: input
                .error_message
                .filter(|_| naming_open)
                .map(ToString::to_string),
            wallet_badge: input.account_address.map(truncate_address),
            has_permission: input.has_permission,
        }
    }
}

/// Formats seconds as a two-digit label, e.g. `"05 sec"`.
pub fn format_duration(seconds: u32) -> String {
    format!("{seconds:02} sec")
}

/// Keeps the first three characters of an address followed by `...`.
pub fn truncate_address(address: &str) -> String {
    let prefix: String = address.chars().take(3).collect();
    format!("{prefix}...")
}
