use std::fmt;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One native frame buffer as yielded by a [`FrameSource`](super::FrameSource).
///
/// The pixel data is never copied once captured: handles and cursors only
/// borrow slices of `data`.
#[derive(Clone)]
pub struct FrameBuffer {
    /// Immutable frame data
    pub data: Bytes,

    /// Frame metadata
    pub meta: FrameMetadata,

    /// Host time at which the buffer was handed out by the source
    pub captured_at: Instant,
}

/// Frame metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMetadata {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub timestamp: Duration, // Capture timestamp since stream start
}

impl FrameBuffer {
    pub fn new(data: Bytes, meta: FrameMetadata) -> Self {
        Self {
            data,
            meta,
            captured_at: Instant::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("len", &self.data.len())
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// Pixel formats we support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Yuyv4,
    Mjpeg,
    Nv12,
}

/// Discrete capture resolutions the host can ask for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameSize {
    #[serde(rename = "160x120")]
    Qqvga,
    #[serde(rename = "176x144")]
    Qcif,
    #[serde(rename = "240x176")]
    Hqvga,
    #[serde(rename = "320x240")]
    Qvga,
    #[serde(rename = "400x296")]
    Cif,
    #[default]
    #[serde(rename = "640x480")]
    Vga,
    #[serde(rename = "800x600")]
    Svga,
    #[serde(rename = "1024x768")]
    Xga,
    #[serde(rename = "1280x1024")]
    Sxga,
    #[serde(rename = "1600x1200")]
    Uxga,
    #[serde(rename = "1920x1080")]
    Fhd,
    #[serde(rename = "720x1280")]
    PortraitHd,
    #[serde(rename = "864x1536")]
    Portrait3mp,
    #[serde(rename = "2048x1536")]
    Qxga,
    #[serde(rename = "2560x1440")]
    Qhd,
    #[serde(rename = "2560x1600")]
    Wqxga,
    #[serde(rename = "1080x1920")]
    PortraitFhd,
    #[serde(rename = "2560x1920")]
    Qsxga,
}

impl FrameSize {
    pub const ALL: [FrameSize; 18] = [
        FrameSize::Qqvga,
        FrameSize::Qcif,
        FrameSize::Hqvga,
        FrameSize::Qvga,
        FrameSize::Cif,
        FrameSize::Vga,
        FrameSize::Svga,
        FrameSize::Xga,
        FrameSize::Sxga,
        FrameSize::Uxga,
        FrameSize::Fhd,
        FrameSize::PortraitHd,
        FrameSize::Portrait3mp,
        FrameSize::Qxga,
        FrameSize::Qhd,
        FrameSize::Wqxga,
        FrameSize::PortraitFhd,
        FrameSize::Qsxga,
    ];

    /// Width and height in pixels
    pub const fn dimensions(self) -> (u32, u32) {
        match self {
            FrameSize::Qqvga => (160, 120),
            FrameSize::Qcif => (176, 144),
            FrameSize::Hqvga => (240, 176),
            FrameSize::Qvga => (320, 240),
            FrameSize::Cif => (400, 296),
            FrameSize::Vga => (640, 480),
            FrameSize::Svga => (800, 600),
            FrameSize::Xga => (1024, 768),
            FrameSize::Sxga => (1280, 1024),
            FrameSize::Uxga => (1600, 1200),
            FrameSize::Fhd => (1920, 1080),
            FrameSize::PortraitHd => (720, 1280),
            FrameSize::Portrait3mp => (864, 1536),
            FrameSize::Qxga => (2048, 1536),
            FrameSize::Qhd => (2560, 1440),
            FrameSize::Wqxga => (2560, 1600),
            FrameSize::PortraitFhd => (1080, 1920),
            FrameSize::Qsxga => (2560, 1920),
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            FrameSize::Qqvga => "QQVGA",
            FrameSize::Qcif => "QCIF",
            FrameSize::Hqvga => "HQVGA",
            FrameSize::Qvga => "QVGA",
            FrameSize::Cif => "CIF",
            FrameSize::Vga => "VGA",
            FrameSize::Svga => "SVGA",
            FrameSize::Xga => "XGA",
            FrameSize::Sxga => "SXGA",
            FrameSize::Uxga => "UXGA",
            FrameSize::Fhd => "FHD",
            FrameSize::PortraitHd => "P_HD",
            FrameSize::Portrait3mp => "P_3MP",
            FrameSize::Qxga => "QXGA",
            FrameSize::Qhd => "QHD",
            FrameSize::Wqxga => "WQXGA",
            FrameSize::PortraitFhd => "P_FHD",
            FrameSize::Qsxga => "QSXGA",
        }
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (width, height) = self.dimensions();
        write!(f, "{}x{} ({})", width, height, self.label())
    }
}
