use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::capture::frame::{FrameBuffer, PixelFormat};
use crate::pipeline::requester::{Requester, RequesterSet};

/// A published frame, shared by every subscriber that kept a clone.
///
/// Cloning is cheap and never copies pixel data. The underlying buffer goes
/// back to the frame source only after every clone has been dropped.
#[derive(Debug, Clone)]
pub struct FrameHandle {
    inner: Arc<CameraImage>,
}

#[derive(Debug)]
struct CameraImage {
    buffer: FrameBuffer,
    requesters: RequesterSet,
}

impl FrameHandle {
    pub(crate) fn new(buffer: FrameBuffer, requesters: RequesterSet) -> Self {
        Self {
            inner: Arc::new(CameraImage { buffer, requesters }),
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.inner.buffer.data
    }

    pub fn len(&self) -> usize {
        self.inner.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.buffer.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.inner.buffer.meta.width
    }

    pub fn height(&self) -> u32 {
        self.inner.buffer.meta.height
    }

    pub fn format(&self) -> PixelFormat {
        self.inner.buffer.meta.format
    }

    pub fn sequence(&self) -> u64 {
        self.inner.buffer.meta.sequence
    }

    /// Capture timestamp reported by the source
    pub fn timestamp(&self) -> Duration {
        self.inner.buffer.meta.timestamp
    }

    pub fn captured_at(&self) -> Instant {
        self.inner.buffer.captured_at
    }

    /// Requesters that were active when this frame was published
    pub fn requesters(&self) -> RequesterSet {
        self.inner.requesters
    }

    pub fn was_requested_by(&self, requester: Requester) -> bool {
        self.inner.requesters.contains(requester)
    }

    /// Number of live handles to this frame, including this one
    pub(crate) fn holders(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Gives the buffer back if this is the last handle, otherwise returns
    /// the handle unchanged.
    pub(crate) fn try_into_buffer(self) -> Result<FrameBuffer, FrameHandle> {
        Arc::try_unwrap(self.inner)
            .map(|image| image.buffer)
            .map_err(|inner| FrameHandle { inner })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::capture::frame::FrameMetadata;
    use bytes::Bytes;

    pub(crate) fn buffer(sequence: u64, payload: &'static [u8]) -> FrameBuffer {
        FrameBuffer::new(
            Bytes::from_static(payload),
            FrameMetadata {
                sequence,
                width: 4,
                height: 2,
                format: PixelFormat::Mjpeg,
                timestamp: Duration::from_millis(sequence * 40),
            },
        )
    }

    #[test]
    fn accessors_expose_buffer() {
        let handle = FrameHandle::new(buffer(7, b"jpegdata"), RequesterSet::new());
        assert_eq!(handle.payload(), b"jpegdata");
        assert_eq!(handle.len(), 8);
        assert_eq!((handle.width(), handle.height()), (4, 2));
        assert_eq!(handle.sequence(), 7);
        assert_eq!(handle.timestamp(), Duration::from_millis(280));
    }

    #[test]
    fn was_requested_by_reflects_publish_set() {
        let requesters: RequesterSet = [Requester::Web].into_iter().collect();
        let handle = FrameHandle::new(buffer(1, b"x"), requesters);
        assert!(handle.was_requested_by(Requester::Web));
        assert!(!handle.was_requested_by(Requester::Api));
    }

    #[test]
    fn buffer_is_recovered_only_from_last_holder() {
        let handle = FrameHandle::new(buffer(1, b"abc"), RequesterSet::new());
        let shared = handle.clone();
        assert_eq!(handle.holders(), 2);

        let handle = handle.try_into_buffer().unwrap_err();
        drop(shared);
        assert_eq!(handle.holders(), 1);

        let buffer = handle.try_into_buffer().unwrap();
        assert_eq!(&buffer.data[..], b"abc");
    }

    #[test]
    fn clones_share_payload_memory() {
        let handle = FrameHandle::new(buffer(1, b"abcdef"), RequesterSet::new());
        let other = handle.clone();
        assert_eq!(handle.payload().as_ptr(), other.payload().as_ptr());
    }
}
