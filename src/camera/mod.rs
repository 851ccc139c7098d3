pub mod backend;
pub mod negotiator;
pub mod picker;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A camera as reported by the host, refreshed on every enumeration.
/// Descriptors are transient; only the id of the current selection is kept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub id: String,
    pub label: String,
}

/// Requested capture parameters for one stream acquisition.
///
/// `strict` distinguishes the ideal tier from the relaxed fallback the
/// negotiator retries with when the ideal tier is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstraintSet {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub strict: bool,
}

impl ConstraintSet {
    /// Square-ish high resolution suits QR framing.
    pub const IDEAL: ConstraintSet = ConstraintSet {
        ideal_width: 1280,
        ideal_height: 1280,
        strict: true,
    };

    /// Fallback tier: lower resolution, no format preference.
    pub const RELAXED: ConstraintSet = ConstraintSet {
        ideal_width: 640,
        ideal_height: 640,
        strict: false,
    };
}

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera access denied")]
    PermissionDenied,

    #[error("no camera found")]
    DeviceNotFound,

    #[error("camera not supported on this host")]
    DeviceUnsupported,

    #[error("camera is busy")]
    DeviceBusy,

    #[error("camera constraints cannot be satisfied")]
    ConstraintsUnsatisfiable,

    #[error("camera enumeration unavailable: {0}")]
    DeviceQuery(String),

    #[error("no camera selected")]
    NoDeviceSelected,

    #[error("camera backend error: {0}")]
    Backend(String),
}

impl CameraError {
    /// Deterministic mapping from failure kind to the message shown to the
    /// user. Transient decode misses never reach this path.
    pub fn user_message(&self) -> String {
        match self {
            CameraError::PermissionDenied => {
                "Camera access was denied. Allow camera use in your system settings.".into()
            }
            CameraError::DeviceNotFound => {
                "No camera was found. Make sure a camera is connected.".into()
            }
            CameraError::DeviceUnsupported => {
                "The camera is not supported on this device.".into()
            }
            CameraError::DeviceBusy => "The camera is in use by another application.".into(),
            CameraError::ConstraintsUnsatisfiable => {
                "The requested camera settings are not supported.".into()
            }
            CameraError::DeviceQuery(_) => "Could not get the list of cameras.".into(),
            CameraError::NoDeviceSelected => "Select a camera first.".into(),
            CameraError::Backend(detail) => format!("Camera error: {detail}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_a_distinct_message() {
        let kinds = [
            CameraError::PermissionDenied,
            CameraError::DeviceNotFound,
            CameraError::DeviceUnsupported,
            CameraError::DeviceBusy,
            CameraError::ConstraintsUnsatisfiable,
            CameraError::DeviceQuery("probe".into()),
            CameraError::NoDeviceSelected,
            CameraError::Backend("probe".into()),
        ];

        let messages: Vec<String> = kinds.iter().map(|k| k.user_message()).collect();
        for (i, message) in messages.iter().enumerate() {
            assert!(!message.is_empty());
            assert!(
                messages.iter().enumerate().all(|(j, other)| i == j || other != message),
                "duplicate user message: {message}"
            );
        }
    }
}
