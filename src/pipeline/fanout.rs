//! Ordered callback registries

use crate::error::SubscriberError;
use crate::pipeline::image::FrameHandle;

/// Identifies one registration in a [`Callbacks`] list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionToken(u64);

impl SubscriptionToken {
    #[cfg(test)]
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

/// Frame subscriber. Invoked on the ticking thread, must not block.
pub type FrameCallback = dyn FnMut(FrameHandle) -> Result<(), SubscriberError>;

/// Stream start/stop listener.
pub type StreamCallback = dyn FnMut();

/// Callbacks kept in registration order.
pub struct Callbacks<F: ?Sized> {
    next_token: u64,
    entries: Vec<(SubscriptionToken, Box<F>)>,
}

impl<F: ?Sized> Callbacks<F> {
    pub fn new() -> Self {
        Self {
            next_token: 0,
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, callback: Box<F>) -> SubscriptionToken {
        let token = SubscriptionToken(self.next_token);
        self.next_token += 1;
        self.entries.push((token, callback));
        token
    }

    /// Returns `false` if the token was not registered.
    pub fn remove(&mut self, token: SubscriptionToken) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(t, _)| *t != token);
        self.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SubscriptionToken, &mut F)> + '_ {
        self.entries.iter_mut().map(|(t, cb)| (*t, &mut **cb))
    }
}

impl<F: ?Sized> Default for Callbacks<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl Callbacks<FrameCallback> {
    /// Hands each subscriber its own clone of `image`, stopping at the first
    /// failure.
    pub fn publish(&mut self, image: &FrameHandle) -> Result<(), (SubscriptionToken, SubscriberError)> {
        for (token, callback) in self.iter_mut() {
            callback(image.clone()).map_err(|e| (token, e))?;
        }
        Ok(())
    }
}

impl Callbacks<StreamCallback> {
    pub fn notify(&mut self) {
        for (_, callback) in self.iter_mut() {
            callback();
        }
    }
}

impl<F: ?Sized> std::fmt::Debug for Callbacks<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("len", &self.entries.len())
            .finish()
    }
}
