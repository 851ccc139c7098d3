use log::{info, warn};

use super::backend::CameraBackend;
use super::{CameraError, ConstraintSet};

/// Forces the host permission prompt before real use: acquire a probe
/// stream with the requested constraints, then release it immediately.
/// Returns the constraint tier that was actually granted so the real
/// acquisition can reuse it.
///
/// When the ideal tier is rejected as unsatisfiable and a rear-facing
/// preference is active, one retry is made with the relaxed tier (lower
/// resolution, no format preference). Every other failure propagates
/// classified.
pub fn acquire_probe(
    backend: &dyn CameraBackend,
    device_id: &str,
    prefer_rear: bool,
) -> Result<ConstraintSet, CameraError> {
    match probe(backend, device_id, ConstraintSet::IDEAL) {
        Ok(()) => Ok(ConstraintSet::IDEAL),
        Err(CameraError::ConstraintsUnsatisfiable) if prefer_rear => {
            warn!("ideal camera constraints rejected, retrying relaxed");
            probe(backend, device_id, ConstraintSet::RELAXED)?;
            Ok(ConstraintSet::RELAXED)
        }
        Err(err) => Err(err),
    }
}

fn probe(
    backend: &dyn CameraBackend,
    device_id: &str,
    constraints: ConstraintSet,
) -> Result<(), CameraError> {
    let stream = backend.open(device_id, &constraints)?;
    // Dropping the probe releases the device; the permission grant sticks.
    drop(stream);
    info!("camera permission probe succeeded for device {device_id}");
    Ok(())
}
