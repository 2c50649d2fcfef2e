use crate::capture::frame::FrameBuffer;
use crate::error::CaptureError;

/// A blocking, single-buffered frame producer.
///
/// Implementations hand out at most one buffer at a time: after `acquire`
/// returns, the next `acquire` happens only once the buffer came back through
/// `release`. The producer loop guarantees that ordering.
pub trait FrameSource: Send + 'static {
    /// Blocks until the hardware yields a buffer.
    ///
    /// `Ok(None)` is an invalid buffer: it is recycled without ever being
    /// delivered. `Err` is a hardware fault and stops the producer.
    fn acquire(&mut self) -> Result<Option<FrameBuffer>, CaptureError>;

    /// Returns a previously acquired buffer to the hardware pool.
    fn release(&mut self, buffer: Option<FrameBuffer>);

    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn acquire(&mut self) -> Result<Option<FrameBuffer>, CaptureError> {
        (**self).acquire()
    }

    fn release(&mut self, buffer: Option<FrameBuffer>) {
        (**self).release(buffer)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
