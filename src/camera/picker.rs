use super::DeviceInfo;

/// Label substrings that usually indicate a rear-facing camera.
const REAR_LABEL_HINTS: [&str; 4] = ["back", "rear", "environment", "facing back"];

/// Best-effort default-device choice.
///
/// With `prefer_rear`, a device whose label carries a rear-facing hint wins;
/// when no device exposes a usable label the last enumerated device is taken
/// as a proxy for the rear camera. This is a heuristic, not a guarantee —
/// hosts with unhelpful labels can make it mis-select, and the caller keeps
/// explicit selection available as the escape hatch.
pub fn pick_default(devices: &[DeviceInfo], prefer_rear: bool) -> Option<&DeviceInfo> {
    if devices.is_empty() {
        return None;
    }

    if prefer_rear {
        if let Some(device) = devices.iter().find(|device| {
            let label = device.label.to_lowercase();
            REAR_LABEL_HINTS.iter().any(|hint| label.contains(hint))
        }) {
            return Some(device);
        }

        if devices.iter().all(|device| device.label.trim().is_empty()) {
            return devices.last();
        }
    }

    devices.first()
}
