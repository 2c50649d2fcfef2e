//! Synthetic frame source for hosts without a capture device

use std::time::{Duration, Instant};

use bytes::{BufMut, BytesMut};
use tracing::trace;

use crate::capture::frame::{FrameBuffer, FrameMetadata, FrameSize, PixelFormat};
use crate::capture::source::FrameSource;
use crate::error::CaptureError;

/// Produces moving RGB24 gradient frames at a fixed rate
pub struct TestPatternSource {
    width: u32,
    height: u32,
    frame_interval: Duration,
    started: Instant,
    next_frame: Instant,
    sequence: u64,
    outstanding: bool,
}

impl TestPatternSource {
    pub fn new(size: FrameSize, fps: u32) -> Self {
        let (width, height) = size.dimensions();
        let now = Instant::now();
        Self {
            width,
            height,
            frame_interval: Duration::from_secs(1) / fps.max(1),
            started: now,
            next_frame: now,
            sequence: 0,
            outstanding: false,
        }
    }

    fn render(&self) -> BytesMut {
        let shift = (self.sequence % 256) as u8;
        let mut data = BytesMut::with_capacity((self.width * self.height * 3) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                data.put_u8((x as u8).wrapping_add(shift));
                data.put_u8((y as u8).wrapping_add(shift));
                data.put_u8(shift);
            }
        }
        data
    }
}

impl FrameSource for TestPatternSource {
    fn acquire(&mut self) -> Result<Option<FrameBuffer>, CaptureError> {
        if self.outstanding {
            return Err(CaptureError::failure("acquire while a buffer is outstanding"));
        }

        let now = Instant::now();
        if self.next_frame > now {
            std::thread::sleep(self.next_frame - now);
        }
        self.next_frame += self.frame_interval;
        self.sequence += 1;
        self.outstanding = true;

        let meta = FrameMetadata {
            sequence: self.sequence,
            width: self.width,
            height: self.height,
            format: PixelFormat::Rgb24,
            timestamp: self.started.elapsed(),
        };
        trace!(sequence = self.sequence, "pattern frame ready");
        Ok(Some(FrameBuffer::new(self.render().freeze(), meta)))
    }

    fn release(&mut self, _buffer: Option<FrameBuffer>) {
        self.outstanding = false;
    }

    fn describe(&self) -> String {
        format!("pattern:{}x{}", self.width, self.height)
    }
}
