pub mod arbiter;
pub mod cursor;
pub mod fanout;
pub mod handoff;
pub mod image;
pub mod requester;

pub use arbiter::{Arbiter, ArbiterConfig, ArbiterStats};
pub use cursor::FrameCursor;
pub use fanout::{Callbacks, SubscriptionToken};
pub use handoff::{handoff, spawn_producer, ConsumerLink, Fetch, ProducerHandle, ProducerLink, Slot};
pub use image::FrameHandle;
pub use requester::{Requester, RequesterSet};
