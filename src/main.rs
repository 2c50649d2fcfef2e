//! framegate demo host: drives one camera from a cooperative tick loop

use std::path::PathBuf;
use std::time::Duration;

use color_eyre::Result;
use tracing::{debug, error, info, warn};

use framegate::capture::{TestPatternSource, V4l2Source};
use framegate::utils;
use framegate::{Camera, Config, FrameCursor, Requester, SourceKind};

/// Size of the chunks the demo stream consumer drains frames in
const STREAM_CHUNK: usize = 4096;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    // Load configuration
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(config.host.log_filter.as_str())
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("framegate launching...");

    let mut camera_config = config.camera.clone();
    if camera_config.source == SourceKind::V4l2 && camera_config.device.path.is_empty() {
        camera_config.device = utils::auto_detect_device()?;
    }

    let mut camera = Camera::new(camera_config);

    // Snapshot consumer: logs every frame it was asked for
    camera.add_image_callback(|image| {
        if image.was_requested_by(Requester::Api) {
            info!(
                sequence = image.sequence(),
                len = image.len(),
                "Snapshot {}x{} {:?}",
                image.width(),
                image.height(),
                image.format()
            );
        }
        Ok(())
    });

    // Stream consumer: keeps the frame bound in a cursor and drains it across
    // ticks, which holds the buffer until the whole payload has gone out
    let cursor = std::rc::Rc::new(std::cell::RefCell::new(FrameCursor::new()));
    {
        let cursor = cursor.clone();
        camera.add_image_callback(move |image| {
            if image.was_requested_by(Requester::Web) {
                cursor.borrow_mut().bind(image);
            }
            Ok(())
        });
    }
    camera.add_stream_start_callback(|| info!("Stream started"));
    camera.add_stream_stop_callback(|| info!("Stream stopped"));

    let opened = match config.camera.source {
        SourceKind::V4l2 => camera.setup(V4l2Source::open),
        SourceKind::Pattern => {
            let fps = config.camera.pattern_fps;
            camera.setup(move |c| Ok(TestPatternSource::new(c.frame_size, fps)))
        }
    };
    camera.dump_config();
    opened?;

    camera.request_image(Requester::Api);
    camera.start_stream(Requester::Web);

    let mut ticker = tokio::time::interval(config.host.tick_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut reported = Duration::ZERO;
    let started = tokio::time::Instant::now();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => {
                info!("Interrupted");
                break;
            }
        }

        if let Err(e) = camera.tick() {
            error!("Frame consumer failed: {}", e);
        }

        {
            let mut cursor = cursor.borrow_mut();
            let n = cursor.remaining().min(STREAM_CHUNK);
            if n > 0 {
                debug!(bytes = n, "Streaming chunk");
                cursor.advance(n);
            }
            if cursor.is_bound() && cursor.remaining() == 0 {
                cursor.unbind();
            }
        }

        if camera.is_failed() && camera.arbiter().current().is_none() {
            warn!("Camera failed, stopping");
            break;
        }

        let elapsed = started.elapsed();
        if elapsed - reported >= Duration::from_secs(10) {
            reported = elapsed;
            info!(stats = ?camera.stats(), "Camera running");
        }
    }

    camera.stop_stream(Requester::Web);
    info!("framegate shutting down");
    Ok(())
}
