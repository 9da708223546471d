#![warn(missing_docs)]
//! # custos-permissions
//!
//! ## Purpose
//! Requests device permissions and decides whether the capture screen may
//! enter capture mode.
//!
//! ## Responsibilities
//! - Request camera, microphone, and media-library access through an
//!   injectable [`PermissionProvider`].
//! - Collapse the answers into a [`GrantedSet`].
//! - Apply the [`CaptureGatePolicy`] that unlocks capture mode.
//!
//! ## Data flow
//! Operator taps "start" -> [`PermissionGateway::request_permissions`] asks
//! the provider for each permission in turn -> [`GrantedSet`] ->
//! [`PermissionGateway::check_capture`] unlocks or blocks capture.
//!
//! ## Error model
//! Provider failures are logged and counted as denials. A blocked gate returns
//! [`PermissionError::Denied`] naming the missing permissions.
//!
//! ## Security and privacy notes
//! Denials are final for the current attempt; the gateway never re-prompts on
//! its own.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Device permission needed by the capture workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    /// Camera preview and capture.
    Camera,
    /// Audio track for recordings.
    Microphone,
    /// Write access to the device media library.
    MediaLibrary,
}

impl Permission {
    /// Request order used by the gateway.
    pub const ALL: [Permission; 3] = [
        Permission::Camera,
        Permission::Microphone,
        Permission::MediaLibrary,
    ];
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Permission::Camera => "camera",
            Permission::Microphone => "microphone",
            Permission::MediaLibrary => "media-library",
        };
        f.write_str(name)
    }
}

/// Answer returned by the platform for one permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionStatus {
    /// Access granted.
    Granted,
    /// Access refused.
    Denied,
    /// Platform has not decided (treated as not granted).
    Undetermined,
}

/// Outcome of one permission round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GrantedSet {
    /// Camera access granted.
    pub camera: bool,
    /// Microphone access granted.
    pub microphone: bool,
    /// Media-library write access granted.
    pub media_library: bool,
}

impl GrantedSet {
    /// Returns `true` when `permission` was granted.
    pub fn is_granted(&self, permission: Permission) -> bool {
        match permission {
            Permission::Camera => self.camera,
            Permission::Microphone => self.microphone,
            Permission::MediaLibrary => self.media_library,
        }
    }

    /// Returns `true` when all three permissions were granted.
    pub fn all_granted(&self) -> bool {
        Permission::ALL
            .iter()
            .all(|permission| self.is_granted(*permission))
    }

    fn record(&mut self, permission: Permission, granted: bool) {
        match permission {
            Permission::Camera => self.camera = granted,
            Permission::Microphone => self.microphone = granted,
            Permission::MediaLibrary => self.media_library = granted,
        }
    }
}

/// Rule deciding which grants unlock capture mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureGatePolicy {
    /// Also require media-library access before entering capture mode.
    ///
    /// Off by default: only camera and microphone gate capture, and the
    /// library grant is checked when media is saved.
    pub require_media_library: bool,
}

impl CaptureGatePolicy {
    /// Returns the permissions this policy requires.
    pub fn required(&self) -> Vec<Permission> {
        let mut required = vec![Permission::Camera, Permission::Microphone];
        if self.require_media_library {
            required.push(Permission::MediaLibrary);
        }
        required
    }

    /// Returns the required permissions missing from `granted`.
    pub fn missing(&self, granted: &GrantedSet) -> Vec<Permission> {
        self.required()
            .into_iter()
            .filter(|permission| !granted.is_granted(*permission))
            .collect()
    }

    /// Returns `true` when `granted` unlocks capture mode.
    pub fn allows_capture(&self, granted: &GrantedSet) -> bool {
        self.missing(granted).is_empty()
    }
}

/// Platform permission API.
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    /// Prompts for (or reads) one permission.
    async fn request(&self, permission: Permission) -> Result<PermissionStatus, PermissionError>;
}

/// Requests permissions and evaluates the capture gate.
#[derive(Clone)]
pub struct PermissionGateway {
    provider: Arc<dyn PermissionProvider>,
    policy: CaptureGatePolicy,
}

impl PermissionGateway {
    /// Creates a gateway over `provider` with the given gate policy.
    pub fn new(provider: Arc<dyn PermissionProvider>, policy: CaptureGatePolicy) -> Self {
        Self { provider, policy }
    }

    /// Returns the active gate policy.
    pub fn policy(&self) -> CaptureGatePolicy {
        self.policy
    }

    /// Requests camera, microphone, and media-library access in that order.
    ///
    /// Each request completes before the next begins. A provider failure is
    /// logged and recorded as a denial for that permission only.
    pub async fn request_permissions(&self) -> GrantedSet {
        let mut granted = GrantedSet::default();
        for permission in Permission::ALL {
            let status = match self.provider.request(permission).await {
                Ok(status) => status,
                Err(error) => {
                    tracing::warn!(
                        stage = "permissions",
                        action = "request_failed",
                        %permission,
                        %error,
                        "permission request failed; treating as denied"
                    );
                    PermissionStatus::Denied
                }
            };
            granted.record(permission, status == PermissionStatus::Granted);
        }

        tracing::info!(
            stage = "permissions",
            action = "requested",
            camera = granted.camera,
            microphone = granted.microphone,
            media_library = granted.media_library,
            "permission round finished"
        );
        granted
    }

    /// Checks whether `granted` unlocks capture mode.
    ///
    /// # Errors
    /// Returns [`PermissionError::Denied`] listing the missing permissions.
    pub fn check_capture(&self, granted: &GrantedSet) -> Result<(), PermissionError> {
        let missing = self.policy.missing(granted);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PermissionError::Denied { missing })
        }
    }
}

/// Permission layer errors.
#[derive(Debug, Error)]
pub enum PermissionError {
    /// One or more gate permissions were not granted.
    #[error("permission denied: {}", format_missing(.missing))]
    Denied {
        /// Permissions the gate still needs.
        missing: Vec<Permission>,
    },
    /// Platform permission API failure.
    #[error("permission provider failure: {0}")]
    Provider(String),
}

fn format_missing(missing: &[Permission]) -> String {
    missing
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
