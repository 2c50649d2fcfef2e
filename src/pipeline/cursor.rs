use std::io;

use crate::pipeline::image::FrameHandle;

/// Sequential reader over one frame, for consumers that drain it in chunks.
///
/// The cursor holds a clone of the handle, so a bound cursor keeps the frame
/// from being reclaimed until it is unbound or rebound.
#[derive(Debug, Default)]
pub struct FrameCursor {
    image: Option<FrameHandle>,
    offset: usize,
}

impl FrameCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts reading `image` from the beginning, dropping any previous frame.
    pub fn bind(&mut self, image: FrameHandle) {
        self.image = Some(image);
        self.offset = 0;
    }

    pub fn is_bound(&self) -> bool {
        self.image.is_some()
    }

    pub fn image(&self) -> Option<&FrameHandle> {
        self.image.as_ref()
    }

    pub fn remaining(&self) -> usize {
        match &self.image {
            Some(image) => image.len() - self.offset,
            None => 0,
        }
    }

    /// Unread bytes of the bound frame; empty when unbound.
    pub fn peek(&self) -> &[u8] {
        match &self.image {
            Some(image) => &image.payload()[self.offset..],
            None => &[],
        }
    }

    /// Marks `n` bytes as consumed. `n` must not exceed `remaining()`.
    pub fn advance(&mut self, n: usize) {
        debug_assert!(
            n <= self.remaining(),
            "advance({n}) past end of frame ({} remaining)",
            self.remaining()
        );
        let len = self.image.as_ref().map_or(0, FrameHandle::len);
        self.offset = (self.offset + n).min(len);
    }

    /// Releases the held frame.
    pub fn unbind(&mut self) {
        self.image = None;
        self.offset = 0;
    }
}

impl io::Read for FrameCursor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let chunk = self.peek();
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        self.advance(n);
        Ok(n)
    }
}
