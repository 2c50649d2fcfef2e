//! Per-tick frame arbitration
//!
//! The arbiter owns the current frame, the pending requests and the timing
//! policy. It runs on the host's cooperative loop: every operation returns
//! promptly and only non-blocking channel operations are used.

use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::error::{ArbiterError, SubscriberError};
use crate::pipeline::fanout::{Callbacks, FrameCallback, StreamCallback, SubscriptionToken};
use crate::pipeline::handoff::{ConsumerLink, Fetch, Slot};
use crate::pipeline::image::FrameHandle;
use crate::pipeline::requester::{Requester, RequesterSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArbiterConfig {
    /// Minimum time between two published frames
    pub max_update_interval: Duration,
    /// Keep-alive request period; zero disables it
    pub idle_update_interval: Duration,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            max_update_interval: Duration::from_millis(1000),
            idle_update_interval: Duration::from_millis(15000),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArbiterStats {
    pub published: u64,
    pub invalid: u64,
    pub reclaimed: u64,
    pub idle_requests: u64,
}

pub struct Arbiter {
    config: ArbiterConfig,
    link: ConsumerLink,
    current: Option<FrameHandle>,
    published_at: Option<Instant>,
    single_requesters: RequesterSet,
    stream_requesters: RequesterSet,
    last_update: Option<Instant>,
    last_idle_request: Instant,
    producer_closed: bool,
    new_image: Callbacks<FrameCallback>,
    stream_start: Callbacks<StreamCallback>,
    stream_stop: Callbacks<StreamCallback>,
    stats: ArbiterStats,
}

impl Arbiter {
    /// The idle timer starts at `now`, so the first keep-alive request fires
    /// one full idle interval later.
    pub fn new(config: ArbiterConfig, link: ConsumerLink, now: Instant) -> Self {
        Self {
            config,
            link,
            current: None,
            published_at: None,
            single_requesters: RequesterSet::new(),
            stream_requesters: RequesterSet::new(),
            last_update: None,
            last_idle_request: now,
            producer_closed: false,
            new_image: Callbacks::new(),
            stream_start: Callbacks::new(),
            stream_stop: Callbacks::new(),
            stats: ArbiterStats::default(),
        }
    }

    /// Swaps in a fresh consumer end, for a producer that never ran.
    pub(crate) fn relink(&mut self, link: ConsumerLink) {
        self.link = link;
        self.producer_closed = false;
    }

    pub fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    /// Asks for the next frame on behalf of `requester`.
    pub fn request(&mut self, requester: Requester) {
        self.single_requesters.insert(requester);
    }

    /// Keeps frames coming for `requester` until `stop_stream`.
    ///
    /// Start listeners fire on every call, even if the requester was already
    /// streaming.
    pub fn start_stream(&mut self, requester: Requester) {
        self.stream_start.notify();
        self.stream_requesters.insert(requester);
        debug!(?requester, "Stream started");
    }

    pub fn stop_stream(&mut self, requester: Requester) {
        self.stream_stop.notify();
        self.stream_requesters.remove(requester);
        debug!(?requester, "Stream stopped");
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionToken
    where
        F: FnMut(FrameHandle) -> Result<(), SubscriberError> + 'static,
    {
        self.new_image.add(Box::new(callback))
    }

    pub fn unsubscribe(&mut self, token: SubscriptionToken) -> bool {
        self.new_image.remove(token)
    }

    pub fn on_stream_start<F: FnMut() + 'static>(&mut self, callback: F) -> SubscriptionToken {
        self.stream_start.add(Box::new(callback))
    }

    pub fn on_stream_stop<F: FnMut() + 'static>(&mut self, callback: F) -> SubscriptionToken {
        self.stream_stop.add(Box::new(callback))
    }

    pub fn pending_requests(&self) -> RequesterSet {
        self.single_requesters
    }

    pub fn stream_requests(&self) -> RequesterSet {
        self.stream_requesters
    }

    pub fn has_requested_image(&self) -> bool {
        !self.single_requesters.is_empty() || !self.stream_requesters.is_empty()
    }

    /// The frame waiting to be reclaimed, if any
    pub fn current(&self) -> Option<&FrameHandle> {
        self.current.as_ref()
    }

    pub fn stats(&self) -> ArbiterStats {
        self.stats
    }

    /// `true` once the producer end of the handoff has gone away
    pub fn producer_closed(&self) -> bool {
        self.producer_closed
    }

    /// One scheduling step. Never blocks.
    ///
    /// Only a failing frame subscriber makes this return an error; the frame
    /// it failed on is already current and will be reclaimed normally.
    pub fn tick(&mut self, now: Instant) -> Result<(), ArbiterError> {
        self.reclaim_current(now);

        if !self.config.idle_update_interval.is_zero()
            && now.saturating_duration_since(self.last_idle_request) > self.config.idle_update_interval
        {
            self.last_idle_request = now;
            self.stats.idle_requests += 1;
            self.request(Requester::Idle);
            trace!("Idle frame requested");
        }

        if !self.has_requested_image() {
            return Ok(());
        }
        if self.current.is_some() {
            // still held downstream
            return Ok(());
        }
        if let Some(last_update) = self.last_update {
            if now.saturating_duration_since(last_update) <= self.config.max_update_interval {
                return Ok(());
            }
        }

        let slot = match self.link.try_fetch() {
            Fetch::Ready(slot) => slot,
            Fetch::Empty => {
                trace!("No frame ready");
                return Ok(());
            }
            Fetch::Closed => {
                if !self.producer_closed {
                    warn!("Frame producer has stopped");
                    self.producer_closed = true;
                }
                return Ok(());
            }
        };

        let Some(buffer) = slot else {
            warn!("Got invalid frame from camera!");
            self.stats.invalid += 1;
            metrics::counter!("frames_invalid").increment(1);
            self.hand_back(None);
            return Ok(());
        };

        let requesters = self.single_requesters.union(&self.stream_requesters);
        let image = FrameHandle::new(buffer, requesters);
        trace!(len = image.len(), sequence = image.sequence(), ?requesters, "Got image");

        self.current = Some(image.clone());
        self.published_at = Some(now);
        self.last_update = Some(now);
        self.single_requesters.clear();
        self.stats.published += 1;
        metrics::counter!("frames_published").increment(1);

        self.new_image
            .publish(&image)
            .map_err(|(token, source)| ArbiterError::Subscriber { token, source })
    }

    /// Returns the current frame to the producer if nobody else holds it.
    fn reclaim_current(&mut self, now: Instant) {
        let Some(image) = self.current.take() else {
            return;
        };
        match image.try_into_buffer() {
            Ok(buffer) => {
                if let Some(published_at) = self.published_at.take() {
                    let held = now.saturating_duration_since(published_at);
                    metrics::histogram!("frame_hold_time_ms").record(held.as_secs_f64() * 1000.0);
                }
                trace!(sequence = buffer.meta.sequence, "Returning frame");
                self.stats.reclaimed += 1;
                metrics::counter!("frames_reclaimed").increment(1);
                self.hand_back(Some(buffer));
            }
            Err(image) => self.current = Some(image),
        }
    }

    fn hand_back(&mut self, slot: Slot) {
        if let Err(e) = self.link.release(slot) {
            // The buffer is dropped here; the producer is gone or wedged
            debug!("Could not hand buffer back: {}", e);
        }
    }
}

impl std::fmt::Debug for Arbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arbiter")
            .field("config", &self.config)
            .field("current", &self.current.as_ref().map(FrameHandle::sequence))
            .field("single_requesters", &self.single_requesters)
            .field("stream_requesters", &self.stream_requesters)
            .field("subscribers", &self.new_image.len())
            .field("stats", &self.stats)
            .finish()
    }
}
