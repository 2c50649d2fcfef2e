//! Single-slot rendezvous between the producer thread and the arbiter
//!
//! Two capacity-1 channels: `ready` carries a freshly acquired buffer to the
//! arbiter, `released` carries it back. The producer blocks on `released`
//! after every send, so at most one buffer is ever out of the source.

use std::thread::{self, JoinHandle};

use flume::{Receiver, Sender, TryRecvError, TrySendError};
use tracing::{debug, error, info, trace, warn};

use crate::capture::frame::FrameBuffer;
use crate::capture::source::FrameSource;
use crate::error::{CaptureError, HandoffError};

/// What travels over the handoff. `None` is an invalid buffer.
pub type Slot = Option<FrameBuffer>;

/// Producer end: blocking operations only.
#[derive(Debug)]
pub struct ProducerLink {
    ready: Sender<Slot>,
    released: Receiver<Slot>,
}

/// Consumer end: never blocks.
#[derive(Debug)]
pub struct ConsumerLink {
    ready: Receiver<Slot>,
    released: Sender<Slot>,
}

/// Result of a non-blocking fetch.
#[derive(Debug)]
pub enum Fetch {
    Ready(Slot),
    /// Nothing produced yet; try again next tick
    Empty,
    /// The producer has exited
    Closed,
}

pub fn handoff() -> (ProducerLink, ConsumerLink) {
    let (ready_tx, ready_rx) = flume::bounded(1);
    let (released_tx, released_rx) = flume::bounded(1);
    (
        ProducerLink {
            ready: ready_tx,
            released: released_rx,
        },
        ConsumerLink {
            ready: ready_rx,
            released: released_tx,
        },
    )
}

impl ProducerLink {
    /// Blocks until the ready slot is free. A slot the consumer can no longer
    /// take is handed back with the error so it can still be released.
    pub fn send_ready(&self, slot: Slot) -> Result<(), (HandoffError, Slot)> {
        self.ready
            .send(slot)
            .map_err(|e| (HandoffError::ConsumerClosed, e.into_inner()))
    }

    /// Blocks until the consumer hands a buffer back.
    pub fn recv_released(&self) -> Result<Slot, HandoffError> {
        self.released
            .recv()
            .map_err(|_| HandoffError::ConsumerClosed)
    }

    #[cfg(test)]
    pub(crate) fn try_offer(&self, slot: Slot) -> bool {
        self.ready.try_send(slot).is_ok()
    }

    #[cfg(test)]
    pub(crate) fn try_take_released(&self) -> Option<Slot> {
        self.released.try_recv().ok()
    }
}

impl ConsumerLink {
    pub fn try_fetch(&self) -> Fetch {
        match self.ready.try_recv() {
            Ok(slot) => Fetch::Ready(slot),
            Err(TryRecvError::Empty) => Fetch::Empty,
            Err(TryRecvError::Disconnected) => Fetch::Closed,
        }
    }

    /// Hands a buffer back to the producer without blocking.
    ///
    /// The slot is always free here: the producer never sends a new buffer
    /// before taking the previous one back.
    pub fn release(&self, slot: Slot) -> Result<(), HandoffError> {
        self.released.try_send(slot).map_err(|e| match e {
            TrySendError::Full(_) => HandoffError::ReleaseSlotBusy,
            TrySendError::Disconnected(_) => HandoffError::ProducerClosed,
        })
    }
}

/// Producer loop: acquire, hand over, wait for the buffer to come back,
/// return it to the source.
///
/// Returns `Err` on the first acquisition failure and `Ok` once the consumer
/// end has been dropped.
pub fn run_producer<S: FrameSource>(mut source: S, link: ProducerLink) -> Result<(), CaptureError> {
    info!(source = %source.describe(), "Producer started");
    loop {
        let slot = match source.acquire() {
            Ok(slot) => slot,
            Err(e) => {
                error!("Frame acquisition failed: {}", e);
                return Err(e);
            }
        };
        let sequence = slot.as_ref().map(|b| b.meta.sequence);
        trace!(?sequence, "Buffer acquired");

        if let Err((e, rejected)) = link.send_ready(slot) {
            debug!("Producer stopping: {}", e);
            source.release(rejected);
            return Ok(());
        }

        let returned = match link.recv_released() {
            Ok(returned) => returned,
            Err(e) => {
                debug!("Producer stopping: {}", e);
                return Ok(());
            }
        };
        let returned_sequence = returned.as_ref().map(|b| b.meta.sequence);
        if returned_sequence != sequence {
            warn!(?sequence, ?returned_sequence, "Released buffer does not match the one sent");
        }
        source.release(returned);
    }
}

/// Handle to the producer thread.
#[derive(Debug)]
pub struct ProducerHandle {
    thread: Option<JoinHandle<Result<(), CaptureError>>>,
}

impl ProducerHandle {
    /// Returns the producer's exit status once it has finished, without
    /// blocking. Yields the status only once.
    pub fn poll_exit(&mut self) -> Option<Result<(), CaptureError>> {
        if !self.thread.as_ref()?.is_finished() {
            return None;
        }
        let thread = self.thread.take()?;
        Some(match thread.join() {
            Ok(result) => result,
            Err(_) => Err(CaptureError::failure("producer thread panicked")),
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

/// Runs [`run_producer`] on a dedicated thread, optionally pinned to `core`.
pub fn spawn_producer<S: FrameSource>(
    source: S,
    link: ProducerLink,
    core: Option<usize>,
) -> std::io::Result<ProducerHandle> {
    let thread = thread::Builder::new()
        .name("framebuffer".into())
        .spawn(move || {
            if let Some(core) = core {
                pin_to_core(core);
            }
            run_producer(source, link)
        })?;
    Ok(ProducerHandle {
        thread: Some(thread),
    })
}

fn pin_to_core(core: usize) {
    let pinned = core_affinity::get_core_ids()
        .and_then(|ids| ids.into_iter().find(|id| id.id == core))
        .map(core_affinity::set_for_current);
    match pinned {
        Some(true) => debug!("Producer pinned to core {}", core),
        _ => warn!("Could not pin producer to core {}", core),
    }
}
