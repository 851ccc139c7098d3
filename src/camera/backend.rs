use log::{debug, info};
use nokhwa::{
    pixel_format::LumaFormat,
    query,
    utils::{
        ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat,
        RequestedFormatType, Resolution,
    },
    Camera, NokhwaError,
};

use super::{CameraError, ConstraintSet, DeviceInfo};

/// One greyscale frame, decoupled from any backend image type so the
/// decoder seam stays backend-agnostic.
#[derive(Debug, Clone)]
pub struct LumaFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// A live capture stream. The stream is exclusively owned by the scan
/// worker; dropping it must release the underlying device.
pub trait FrameSource {
    fn grab(&mut self) -> Result<LumaFrame, CameraError>;
}

/// Seam over the host camera capability: enumeration plus stream
/// acquisition. Tests substitute a scripted implementation.
pub trait CameraBackend: Send + Sync {
    fn list_devices(&self) -> Result<Vec<DeviceInfo>, CameraError>;

    fn open(
        &self,
        device_id: &str,
        constraints: &ConstraintSet,
    ) -> Result<Box<dyn FrameSource>, CameraError>;
}

/// Production backend over nokhwa.
pub struct NokhwaBackend;

impl NokhwaBackend {
    pub fn new() -> Self {
        NokhwaBackend
    }
}

impl CameraBackend for NokhwaBackend {
    fn list_devices(&self) -> Result<Vec<DeviceInfo>, CameraError> {
        let cameras = query(ApiBackend::Auto)
            .map_err(|err| CameraError::DeviceQuery(err.to_string()))?;

        let devices: Vec<DeviceInfo> = cameras
            .iter()
            .map(|info| DeviceInfo {
                id: info.index().to_string(),
                label: info.human_name(),
            })
            .collect();

        debug!("enumerated {} camera device(s)", devices.len());
        Ok(devices)
    }

    fn open(
        &self,
        device_id: &str,
        constraints: &ConstraintSet,
    ) -> Result<Box<dyn FrameSource>, CameraError> {
        let index = parse_device_index(device_id);
        let requested = requested_format(constraints);

        let mut camera = Camera::new(index, requested).map_err(classify_nokhwa)?;
        camera.open_stream().map_err(classify_nokhwa)?;

        info!(
            "opened camera {} at {:?}",
            device_id,
            camera.camera_format()
        );
        Ok(Box::new(NokhwaSource { camera }))
    }
}

struct NokhwaSource {
    camera: Camera,
}

impl FrameSource for NokhwaSource {
    fn grab(&mut self) -> Result<LumaFrame, CameraError> {
        let buffer = self.camera.frame().map_err(classify_nokhwa)?;
        let image = buffer
            .decode_image::<LumaFormat>()
            .map_err(|err| CameraError::Backend(err.to_string()))?;

        let (width, height) = (image.width(), image.height());
        Ok(LumaFrame {
            width,
            height,
            data: image.into_raw(),
        })
    }
}

impl Drop for NokhwaSource {
    fn drop(&mut self) {
        // Stream must be fully released before another acquisition happens.
        let _ = self.camera.stop_stream();
    }
}

fn parse_device_index(device_id: &str) -> CameraIndex {
    match device_id.parse::<u32>() {
        Ok(index) => CameraIndex::Index(index),
        Err(_) => CameraIndex::String(device_id.to_string()),
    }
}

fn requested_format(constraints: &ConstraintSet) -> RequestedFormat<'static> {
    if constraints.strict {
        RequestedFormat::new::<LumaFormat>(RequestedFormatType::Closest(CameraFormat::new(
            Resolution::new(constraints.ideal_width, constraints.ideal_height),
            FrameFormat::MJPEG,
            30,
        )))
    } else {
        RequestedFormat::new::<LumaFormat>(RequestedFormatType::None)
    }
}

fn classify_nokhwa(err: NokhwaError) -> CameraError {
    classify_message(&err.to_string())
}

/// Best-effort mapping of backend failures onto the fixed taxonomy.
/// Messages differ per platform, so this matches on text the way browser
/// DOMException names get matched; unknown shapes stay `Backend`.
fn classify_message(message: &str) -> CameraError {
    let lowered = message.to_lowercase();

    if lowered.contains("denied") || lowered.contains("permission") || lowered.contains("not authorized") {
        CameraError::PermissionDenied
    } else if lowered.contains("not found") || lowered.contains("no device") || lowered.contains("no such") {
        CameraError::DeviceNotFound
    } else if lowered.contains("busy") || lowered.contains("in use") {
        CameraError::DeviceBusy
    } else if lowered.contains("unsupported") || lowered.contains("not implemented") {
        CameraError::DeviceUnsupported
    } else if lowered.contains("format") || lowered.contains("resolution") {
        CameraError::ConstraintsUnsatisfiable
    } else {
        CameraError::Backend(message.to_string())
    }
}
