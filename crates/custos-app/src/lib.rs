#![warn(missing_docs)]
//! # custos-app
//!
//! ## Purpose
//! Orchestrates permissions, capture, submission, and view projection for the
//! evidence screen.
//!
//! ## Responsibilities
//! - Load runtime configuration from the environment.
//! - Install structured logging.
//! - Drive the capture screen through [`EvidenceScreen`] with all
//!   collaborators injected through [`ScreenServices`].
//!
//! ## Data flow
//! Permissions -> armed camera -> recording/photo task -> naming ->
//! submission pipeline -> confirmation timer -> landing.
//!
//! ## Ownership and lifetimes
//! The screen owns its timers and capture tasks; dropping it aborts them.
//!
//! ## Error model
//! Subsystem failures are wrapped in [`AppError`]. None of them crash the
//! flow; the screen stays in a state the operator can act on.
//!
//! ## Security and privacy notes
//! - Capture is blocked unless the permission gate passes.
//! - Kill-switch env var prevents entering capture mode.
//! - Logs carry evidence fingerprints and addresses, never key material.

mod screen;

use std::time::Duration;

use custos_capture::{CaptureError, PhotoOptions, RecordingOptions};
use custos_core::{CoreError, validate_address};
use custos_permissions::{CaptureGatePolicy, PermissionError};
use custos_submission::{
    DEFAULT_MAX_FEE_MULTIPLIER, FeeTokenPolicy, GaslessOptions, SEPOLIA_RELAY_BASE_URL,
    SubmissionError,
};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub use screen::{EvidenceScreen, ScreenServices, ScreenUpdate};

/// Build-time application version loaded from root `VERSION` file.
pub const APP_VERSION: &str = env!("CUSTOS_VERSION");

/// How long the confirmation stays on screen by default.
pub const DEFAULT_CONFIRMATION_DISPLAY: Duration = Duration::from_secs(2);

const ENV_RELAY_BASE_URL: &str = "CUSTOS_RELAY_BASE_URL";
const ENV_EVIDENCE_CONTRACT: &str = "CUSTOS_CRIME_CONTRACT";
const ENV_REQUIRE_LIBRARY: &str = "CUSTOS_REQUIRE_LIBRARY_PERMISSION";
const ENV_CONFIRMATION_MS: &str = "CUSTOS_CONFIRMATION_MS";
const ENV_FEE_TOKEN: &str = "CUSTOS_FEE_TOKEN";
const ENV_FEE_BUDGET: &str = "CUSTOS_FEE_BUDGET";
const ENV_FEE_MULTIPLIER: &str = "CUSTOS_FEE_MULTIPLIER";
const ENV_CAPTURE_ENABLED: &str = "CUSTOS_CAPTURE_ENABLED";

/// Returns the app version sourced from root `VERSION`.
pub fn app_version() -> &'static str {
    APP_VERSION
}

/// Runtime configuration for the evidence screen.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Gasless relay options.
    pub relay: GaslessOptions,
    /// Deployed evidence contract address.
    pub evidence_contract: Option<String>,
    /// Permission gate rule.
    pub gate_policy: CaptureGatePolicy,
    /// Confirmation display window after a successful submission.
    pub confirmation_display: Duration,
    /// Fee token selection rule.
    pub fee_policy: FeeTokenPolicy,
    /// Kill switch; when `false` capture mode cannot be entered.
    pub capture_enabled: bool,
    /// Video recording presets.
    pub recording: RecordingOptions,
    /// Still capture presets.
    pub photo: PhotoOptions,
}

impl AppConfig {
    /// Loads configuration from process environment variables.
    ///
    /// # Errors
    /// Returns [`AppError::Config`] for malformed values.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`; missing keys use defaults.
    ///
    /// # Errors
    /// Returns [`AppError::Config`] for malformed values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let relay_url = lookup(ENV_RELAY_BASE_URL).unwrap_or_else(|| SEPOLIA_RELAY_BASE_URL.to_string());
        let relay = GaslessOptions::new(relay_url.trim())
            .map_err(|error| AppError::Config(format!("{ENV_RELAY_BASE_URL}: {error}")))?;

        let evidence_contract = non_blank(lookup(ENV_EVIDENCE_CONTRACT));
        if let Some(address) = &evidence_contract {
            validate_address(address)
                .map_err(|error| AppError::Config(format!("{ENV_EVIDENCE_CONTRACT}: {error}")))?;
        }

        let confirmation_display = match non_blank(lookup(ENV_CONFIRMATION_MS)) {
            Some(raw) => Duration::from_millis(parse_number(ENV_CONFIRMATION_MS, &raw)?),
            None => DEFAULT_CONFIRMATION_DISPLAY,
        };

        let preferred_token = non_blank(lookup(ENV_FEE_TOKEN));
        if let Some(token) = &preferred_token {
            validate_address(token)
                .map_err(|error| AppError::Config(format!("{ENV_FEE_TOKEN}: {error}")))?;
        }
        let native_fee_budget = non_blank(lookup(ENV_FEE_BUDGET))
            .map(|raw| parse_number::<u128>(ENV_FEE_BUDGET, &raw))
            .transpose()?;
        let max_fee_multiplier = match non_blank(lookup(ENV_FEE_MULTIPLIER)) {
            Some(raw) => parse_number::<u32>(ENV_FEE_MULTIPLIER, &raw)?,
            None => DEFAULT_MAX_FEE_MULTIPLIER,
        };
        if max_fee_multiplier == 0 {
            return Err(AppError::Config(format!(
                "{ENV_FEE_MULTIPLIER}: must be greater than zero"
            )));
        }

        Ok(Self {
            relay,
            evidence_contract,
            gate_policy: CaptureGatePolicy {
                require_media_library: flag_enabled(lookup(ENV_REQUIRE_LIBRARY).as_deref()),
            },
            confirmation_display,
            fee_policy: FeeTokenPolicy {
                preferred_token,
                native_fee_budget,
                max_fee_multiplier,
            },
            capture_enabled: kill_switch_allows(lookup(ENV_CAPTURE_ENABLED).as_deref()),
            recording: RecordingOptions::default(),
            photo: PhotoOptions::default(),
        })
    }
}

/// Checks the runtime kill-switch env var.
///
/// Semantics:
/// - Unset => capture enabled.
/// - `0`, `false`, `off` (case-insensitive) => capture disabled.
/// - Any other value => capture enabled.
pub fn capture_enabled_from_env() -> bool {
    kill_switch_allows(std::env::var(ENV_CAPTURE_ENABLED).ok().as_deref())
}

fn kill_switch_allows(value: Option<&str>) -> bool {
    match value {
        Some(value) => {
            let normalized = value.trim().to_ascii_lowercase();
            !(normalized == "0" || normalized == "false" || normalized == "off")
        }
        None => true,
    }
}

fn flag_enabled(value: Option<&str>) -> bool {
    value
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "on" | "yes"
            )
        })
        .unwrap_or(false)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, AppError> {
    raw.parse()
        .map_err(|_| AppError::Config(format!("{key}: expected an unsigned integer, got {raw:?}")))
}

/// Installs the global `tracing` subscriber.
///
/// Level filtering follows `RUST_LOG` and defaults to `info`.
///
/// # Errors
/// Returns [`AppError::Telemetry`] when a subscriber is already installed.
pub fn init_tracing() -> Result<(), AppError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .map_err(|error| AppError::Telemetry(error.to_string()))
}

/// App integration error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Permission gate blocked capture mode.
    #[error("permission error: {0}")]
    Permission(#[from] PermissionError),
    /// Capture device or state machine error.
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),
    /// Submission pipeline error.
    #[error("submission error: {0}")]
    Submission(#[from] SubmissionError),
    /// Core model error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
    /// Kill switch is engaged.
    #[error("capture disabled by CUSTOS_CAPTURE_ENABLED")]
    CaptureDisabled,
    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),
    /// Logging could not be initialized.
    #[error("telemetry error: {0}")]
    Telemetry(String),
}
