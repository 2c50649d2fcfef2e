pub mod frame;
pub mod pattern;
pub mod source;
pub mod v4l2;

pub use frame::{FrameBuffer, FrameMetadata, FrameSize, PixelFormat};
pub use pattern::TestPatternSource;
pub use source::FrameSource;
pub use v4l2::V4l2Source;
