pub mod camera;
pub mod capture;
pub mod error;
pub mod pipeline;
pub mod utils;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use camera::{Camera, ComponentState};
pub use capture::{FrameBuffer, FrameMetadata, FrameSize, FrameSource, PixelFormat};
pub use error::{ArbiterError, CameraError, CaptureError, ConfigError, SubscriberError};
pub use pipeline::{FrameCursor, FrameHandle, Requester, RequesterSet, SubscriptionToken};

use crate::pipeline::ArbiterConfig;
use crate::utils::FoundDevice;

/// Environment variables with this prefix override file settings,
/// e.g. `FRAMEGATE__CAMERA__FRAME_SIZE=320x240`.
pub const ENV_PREFIX: &str = "FRAMEGATE";

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: CameraConfig,
    pub host: HostConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// V4L2 capture device
    V4l2,
    /// Synthetic test pattern
    Pattern,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub name: String,
    pub source: SourceKind,
    pub device: FoundDevice,
    pub frame_size: FrameSize,
    pub buffer_count: u32,
    /// Minimum time between published frames
    pub max_update_interval_ms: u64,
    /// Keep-alive request period, 0 disables it
    pub idle_update_interval_ms: u64,
    /// CPU core the producer thread is pinned to
    pub producer_core: Option<usize>,
    pub pattern_fps: u32,
}

/// Settings for the process hosting the camera
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub tick_interval_ms: u64,
    pub log_filter: String,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            name: "camera".into(),
            source: SourceKind::V4l2,
            device: FoundDevice::new("/dev/video0".into(), PixelFormat::Mjpeg),
            frame_size: FrameSize::Vga,
            buffer_count: 4,
            max_update_interval_ms: 1000,
            idle_update_interval_ms: 15000,
            producer_core: None,
            pattern_fps: 15,
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 16,
            log_filter: "framegate=debug".into(),
        }
    }
}

impl CameraConfig {
    pub fn max_update_interval(&self) -> Duration {
        Duration::from_millis(self.max_update_interval_ms)
    }

    pub fn idle_update_interval(&self) -> Duration {
        Duration::from_millis(self.idle_update_interval_ms)
    }

    pub fn arbiter(&self) -> ArbiterConfig {
        ArbiterConfig {
            max_update_interval: self.max_update_interval(),
            idle_update_interval: self.idle_update_interval(),
        }
    }
}

impl HostConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Config {
    /// Defaults, then `path` (if any), then `FRAMEGATE__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.buffer_count == 0 {
            return Err(ConfigError::Invalid("camera.buffer_count must be at least 1".into()));
        }
        if self.camera.pattern_fps == 0 {
            return Err(ConfigError::Invalid("camera.pattern_fps must be at least 1".into()));
        }
        if self.host.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("host.tick_interval_ms must be at least 1".into()));
        }
        Ok(())
    }
}
