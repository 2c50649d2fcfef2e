//! Host-facing camera component
//!
//! Wraps the arbiter and the producer thread behind the two lifecycle hooks
//! a component host calls: `setup` once, then `tick` on every loop
//! iteration.

use std::time::Instant;

use tracing::{error, info, instrument, warn};

use crate::capture::source::FrameSource;
use crate::error::{ArbiterError, CameraError, CaptureError, SubscriberError};
use crate::pipeline::arbiter::{Arbiter, ArbiterStats};
use crate::pipeline::fanout::SubscriptionToken;
use crate::pipeline::handoff::{handoff, spawn_producer, ProducerHandle, ProducerLink};
use crate::pipeline::image::FrameHandle;
use crate::pipeline::requester::Requester;
use crate::CameraConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    /// Built, `setup` not run yet
    Constructed,
    Running,
    /// Setup failed or the producer died; no new frames will arrive
    Failed,
}

#[derive(Debug)]
pub struct Camera {
    config: CameraConfig,
    state: ComponentState,
    arbiter: Arbiter,
    link: Option<ProducerLink>,
    producer: Option<ProducerHandle>,
    failure: Option<String>,
}

impl Camera {
    pub fn new(config: CameraConfig) -> Self {
        let (producer, consumer) = handoff();
        let arbiter = Arbiter::new(config.arbiter(), consumer, Instant::now());
        Self {
            config,
            state: ComponentState::Constructed,
            arbiter,
            link: Some(producer),
            producer: None,
            failure: None,
        }
    }

    /// Opens the frame source and starts the producer thread.
    ///
    /// A source that fails to open, or a producer thread that cannot be
    /// started, marks the component failed. Setup may be attempted again after
    /// either failure; retrying is up to the host.
    #[instrument(skip_all, fields(camera = %self.config.name))]
    pub fn setup<S, F>(&mut self, open: F) -> Result<(), CameraError>
    where
        S: FrameSource,
        F: FnOnce(&CameraConfig) -> Result<S, CaptureError>,
    {
        let link = self.link.take().ok_or(CameraError::AlreadySetUp)?;

        let source = match open(&self.config) {
            Ok(source) => source,
            Err(e) => {
                error!("Camera init failed: {}", e);
                self.link = Some(link);
                self.mark_failed(e.to_string());
                return Err(CameraError::Setup(e));
            }
        };
        info!(source = %source.describe(), "Frame source opened");

        match spawn_producer(source, link, self.config.producer_core) {
            Ok(handle) => {
                self.producer = Some(handle);
                self.state = ComponentState::Running;
                self.failure = None;
                Ok(())
            }
            Err(e) => {
                error!("Could not start producer thread: {}", e);
                self.rearm();
                self.mark_failed(e.to_string());
                Err(CameraError::Spawn(e))
            }
        }
    }

    pub fn tick(&mut self) -> Result<(), ArbiterError> {
        self.tick_at(Instant::now())
    }

    /// Checks producer health, then runs one arbitration step.
    pub fn tick_at(&mut self, now: Instant) -> Result<(), ArbiterError> {
        if let Some(status) = self.producer.as_mut().and_then(ProducerHandle::poll_exit) {
            self.producer = None;
            match status {
                Err(e) => {
                    error!("Frame producer failed: {}", e);
                    self.mark_failed(e.to_string());
                }
                Ok(()) => {
                    warn!("Frame producer exited");
                    self.mark_failed("frame producer exited".to_string());
                }
            }
        }

        // Runs even when failed so frames already out can still be reclaimed
        self.arbiter.tick(now)
    }

    pub fn dump_config(&self) {
        info!("Camera:");
        info!("  Name: {}", self.config.name);
        info!("  Resolution: {}", self.config.frame_size);
        info!("  Max update interval: {} ms", self.config.max_update_interval_ms);
        info!("  Idle update interval: {} ms", self.config.idle_update_interval_ms);

        if let Some(failure) = &self.failure {
            error!("  Setup Failed: {}", failure);
        }
    }

    /// Replaces a handoff whose producer end was lost with a fresh pair.
    fn rearm(&mut self) {
        let (producer, consumer) = handoff();
        self.arbiter.relink(consumer);
        self.link = Some(producer);
    }

    fn mark_failed(&mut self, reason: String) {
        self.state = ComponentState::Failed;
        self.failure = Some(reason);
    }

    pub fn state(&self) -> ComponentState {
        self.state
    }

    pub fn is_failed(&self) -> bool {
        self.state == ComponentState::Failed
    }

    /// Why the component failed, if it did
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn arbiter(&self) -> &Arbiter {
        &self.arbiter
    }

    pub fn stats(&self) -> ArbiterStats {
        self.arbiter.stats()
    }

    pub fn request_image(&mut self, requester: Requester) {
        self.arbiter.request(requester);
    }

    pub fn start_stream(&mut self, requester: Requester) {
        self.arbiter.start_stream(requester);
    }

    pub fn stop_stream(&mut self, requester: Requester) {
        self.arbiter.stop_stream(requester);
    }

    pub fn add_image_callback<F>(&mut self, callback: F) -> SubscriptionToken
    where
        F: FnMut(FrameHandle) -> Result<(), SubscriberError> + 'static,
    {
        self.arbiter.subscribe(callback)
    }

    pub fn remove_image_callback(&mut self, token: SubscriptionToken) -> bool {
        self.arbiter.unsubscribe(token)
    }

    pub fn add_stream_start_callback<F: FnMut() + 'static>(&mut self, callback: F) -> SubscriptionToken {
        self.arbiter.on_stream_start(callback)
    }

    pub fn add_stream_stop_callback<F: FnMut() + 'static>(&mut self, callback: F) -> SubscriptionToken {
        self.arbiter.on_stream_stop(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::FrameBuffer;

    struct Broken;

    impl FrameSource for Broken {
        fn acquire(&mut self) -> Result<Option<FrameBuffer>, CaptureError> {
            Err(CaptureError::failure("sensor not responding"))
        }

        fn release(&mut self, _buffer: Option<FrameBuffer>) {}
    }

    #[test]
    fn failed_open_marks_component_failed() {
        let mut camera = Camera::new(CameraConfig::default());
        let result = camera.setup(|_| -> Result<Broken, CaptureError> {
            Err(CaptureError::failure("no device"))
        });
        assert!(matches!(result, Err(CameraError::Setup(_))));
        assert!(camera.is_failed());
        assert!(camera.failure().unwrap().contains("no device"));

        // a later attempt is allowed
        assert!(camera.setup(|_| Ok(Broken)).is_ok());
    }

    struct Single {
        served: bool,
    }

    impl FrameSource for Single {
        fn acquire(&mut self) -> Result<Option<FrameBuffer>, CaptureError> {
            if std::mem::replace(&mut self.served, true) {
                return Err(CaptureError::failure("single frame served"));
            }
            Ok(Some(crate::pipeline::image::tests::buffer(1, b"frame")))
        }

        fn release(&mut self, _buffer: Option<FrameBuffer>) {}
    }

    #[test]
    fn lost_producer_link_is_rearmed_for_retry() {
        let mut camera = Camera::new(CameraConfig::default());
        // what a failed thread spawn leaves behind
        camera.link = None;
        camera.rearm();
        camera.mark_failed("spawn failed".to_string());

        let received = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = received.clone();
        camera.add_image_callback(move |image| {
            sink.borrow_mut().push(image.sequence());
            Ok(())
        });
        camera.setup(|_| Ok(Single { served: false })).unwrap();
        assert_eq!(camera.state(), ComponentState::Running);

        camera.request_image(Requester::Api);
        let deadline = Instant::now() + std::time::Duration::from_secs(5);
        while received.borrow().is_empty() {
            assert!(Instant::now() < deadline, "no frame through the new handoff");
            camera.tick().unwrap();
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        assert_eq!(*received.borrow(), vec![1]);
    }

    #[test]
    fn second_setup_is_rejected() {
        let mut camera = Camera::new(CameraConfig::default());
        camera.setup(|_| Ok(Broken)).unwrap();
        assert!(matches!(
            camera.setup(|_| Ok(Broken)),
            Err(CameraError::AlreadySetUp)
        ));
    }

    #[test]
    fn producer_failure_is_surfaced_on_tick() {
        let mut camera = Camera::new(CameraConfig::default());
        camera.setup(|_| Ok(Broken)).unwrap();
        assert_eq!(camera.state(), ComponentState::Running);

        let deadline = Instant::now() + std::time::Duration::from_secs(5);
        while !camera.is_failed() {
            assert!(Instant::now() < deadline, "producer failure not observed");
            camera.tick().unwrap();
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        assert!(camera.failure().unwrap().contains("sensor not responding"));
    }
}
