use thiserror::Error;

use crate::pipeline::fanout::SubscriptionToken;

/// Error returned by a frame subscriber. Subscribers own their error types;
/// the arbiter only carries them back to whoever drives the tick.
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures of the frame source. Any of these is fatal to the producer.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture device error: {0}")]
    Device(#[from] std::io::Error),

    #[error("device {path} does not support video capture")]
    NotCapture { path: String },

    #[error("unsupported pixel format: {0:?}")]
    UnsupportedFormat(crate::PixelFormat),

    #[error("capture stream not started")]
    NotStarted,

    #[error("frame source failure: {0}")]
    Source(String),
}

impl CaptureError {
    pub fn failure(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }
}

/// The other side of the handoff has gone away.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HandoffError {
    #[error("producer side of the handoff is closed")]
    ProducerClosed,

    #[error("consumer side of the handoff is closed")]
    ConsumerClosed,

    #[error("release slot is still occupied")]
    ReleaseSlotBusy,
}

#[derive(Debug, Error)]
pub enum ArbiterError {
    #[error("frame subscriber {token:?} failed")]
    Subscriber {
        token: SubscriptionToken,
        #[source]
        source: SubscriberError,
    },
}

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera setup failed: {0}")]
    Setup(#[source] CaptureError),

    #[error("camera setup already ran")]
    AlreadySetUp,

    #[error("failed to spawn producer thread: {0}")]
    Spawn(#[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
