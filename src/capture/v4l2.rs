//! V4L2 frame source with memory-mapped buffers

use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, instrument};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::capture::frame::{FrameBuffer, FrameMetadata, PixelFormat};
use crate::capture::source::FrameSource;
use crate::error::CaptureError;
use crate::CameraConfig;

/// Blocking V4L2 capture, one dequeued buffer per `acquire`
pub struct V4l2Source {
    device: Box<Device>,
    stream: Option<MmapStream<'static>>,
    path: String,
    width: u32,
    height: u32,
    format: PixelFormat,
    sequence: u64,
}

impl V4l2Source {
    /// Open the configured device, negotiate the format and start streaming
    #[instrument(skip(config), fields(device = %config.device.path))]
    pub fn open(config: &CameraConfig) -> Result<Self, CaptureError> {
        info!("Initializing V4L2 capture: {:?}", config.device);

        let device = Device::with_path(&config.device.path)?;

        let caps = device.query_caps()?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(CaptureError::NotCapture {
                path: config.device.path.clone(),
            });
        }

        let (width, height) = config.frame_size.dimensions();
        let mut fmt = device.format()?;
        fmt.width = width;
        fmt.height = height;
        fmt.fourcc = match config.device.format {
            PixelFormat::Mjpeg => FourCC::new(b"MJPG"),
            PixelFormat::Yuyv4 => FourCC::new(b"YUYV"),
            other => return Err(CaptureError::UnsupportedFormat(other)),
        };

        // The driver may round to the nearest size it supports
        let fmt = device.set_format(&fmt)?;
        if (fmt.width, fmt.height) != (width, height) {
            info!(
                "Driver adjusted resolution to {}x{} (asked for {})",
                fmt.width, fmt.height, config.frame_size
            );
        }

        let mut source = Self {
            device: Box::new(device),
            stream: None,
            path: config.device.path.clone(),
            width: fmt.width,
            height: fmt.height,
            format: config.device.format,
            sequence: 0,
        };
        source.start_stream(config.buffer_count)?;
        Ok(source)
    }

    /// Start streaming with memory-mapped buffers
    fn start_stream(&mut self, buffer_count: u32) -> Result<(), CaptureError> {
        let stream = MmapStream::with_buffers(&self.device, Type::VideoCapture, buffer_count)?;

        self.stream = Some(stream);
        info!("Capture stream started with {} buffers", buffer_count);
        Ok(())
    }
}

impl FrameSource for V4l2Source {
    fn acquire(&mut self) -> Result<Option<FrameBuffer>, CaptureError> {
        let stream = self.stream.as_mut().ok_or(CaptureError::NotStarted)?;

        // Blocks until the driver has a filled buffer
        let (buf, meta) = stream.next()?;

        if meta.bytesused == 0 {
            debug!("Driver returned an empty buffer");
            return Ok(None);
        }

        // The mmap slot is requeued on the next dequeue, so the payload must
        // be detached before returning it
        let used = (meta.bytesused as usize).min(buf.len());
        let data = Bytes::copy_from_slice(&buf[..used]);

        self.sequence += 1;

        let frame_meta = FrameMetadata {
            sequence: self.sequence,
            width: self.width,
            height: self.height,
            format: self.format,
            timestamp: Duration::from_secs(meta.timestamp.sec as u64)
                + Duration::from_micros(meta.timestamp.usec as u64),
        };

        Ok(Some(FrameBuffer::new(data, frame_meta)))
    }

    fn release(&mut self, _buffer: Option<FrameBuffer>) {
        // Nothing to hand back: the driver slot was requeued by the stream
    }

    fn describe(&self) -> String {
        format!("v4l2:{}", self.path)
    }
}
