use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use v4l::{capability::Flags, video::Capture, Device, FourCC};

use crate::capture::frame::PixelFormat;
use crate::error::CaptureError;

// Detected capture device info
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoundDevice {
    pub path: String,
    pub format: PixelFormat,
}

impl FoundDevice {
    pub fn new(path: String, format: PixelFormat) -> Self {
        Self { path, format }
    }
}

/// Picks the first capture device with a format the V4L2 source can stream,
/// preferring MJPEG over YUYV on the same device.
pub fn auto_detect_device() -> Result<FoundDevice, CaptureError> {
    info!("Auto-detecting capture devices...");

    for i in 0..10 {
        let path = format!("/dev/video{}", i);
        if !Path::new(&path).exists() {
            continue;
        }
        if let Some(found) = probe(&path) {
            return Ok(found);
        }
    }

    Err(CaptureError::failure("No suitable capture device found"))
}

fn probe(path: &str) -> Option<FoundDevice> {
    let dev = Device::with_path(path).ok()?;
    let caps = dev.query_caps().ok()?;
    if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
        debug!("{} is not a capture device", path);
        return None;
    }

    let formats = dev.enum_formats().ok()?;
    let format = if formats.iter().any(|f| f.fourcc == FourCC::new(b"MJPG")) {
        PixelFormat::Mjpeg
    } else if formats.iter().any(|f| f.fourcc == FourCC::new(b"YUYV")) {
        PixelFormat::Yuyv4
    } else {
        return None;
    };

    info!("Found {:?} device: {} - {}", format, path, caps.card);
    Some(FoundDevice::new(path.to_string(), format))
}
