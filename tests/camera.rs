use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use framegate::{
    Camera, CameraConfig, CaptureError, FrameBuffer, FrameCursor, FrameHandle, FrameMetadata,
    FrameSource, PixelFormat, Requester,
};

#[derive(Debug, Default)]
struct Counts {
    acquired: u64,
    released: u64,
}

/// Endless source that records acquire/release balance and yields invalid
/// buffers at chosen sequence numbers.
struct Counting {
    next: u64,
    invalid: Vec<u64>,
    counts: Arc<Mutex<Counts>>,
}

impl Counting {
    fn new(invalid: Vec<u64>) -> (Self, Arc<Mutex<Counts>>) {
        let counts = Arc::new(Mutex::new(Counts::default()));
        let source = Self {
            next: 0,
            invalid,
            counts: counts.clone(),
        };
        (source, counts)
    }
}

impl FrameSource for Counting {
    fn acquire(&mut self) -> Result<Option<FrameBuffer>, CaptureError> {
        {
            let mut counts = self.counts.lock().unwrap();
            assert_eq!(counts.acquired, counts.released, "second buffer acquired");
            counts.acquired += 1;
        }
        self.next += 1;
        if self.invalid.contains(&self.next) {
            return Ok(None);
        }
        let payload = Bytes::from(vec![self.next as u8; 1000]);
        Ok(Some(FrameBuffer::new(
            payload,
            FrameMetadata {
                sequence: self.next,
                width: 40,
                height: 25,
                format: PixelFormat::Mjpeg,
                timestamp: Duration::from_millis(self.next * 66),
            },
        )))
    }

    fn release(&mut self, _buffer: Option<FrameBuffer>) {
        let mut counts = self.counts.lock().unwrap();
        counts.released += 1;
        assert!(counts.released <= counts.acquired, "release without acquire");
    }
}

fn config() -> CameraConfig {
    CameraConfig {
        max_update_interval_ms: 0,
        idle_update_interval_ms: 0,
        ..CameraConfig::default()
    }
}

/// Synthetic arbiter clock on top of real producer timing.
struct Harness {
    camera: Camera,
    now: Instant,
    received: Rc<RefCell<Vec<FrameHandle>>>,
}

impl Harness {
    fn start(source: Counting) -> Self {
        let mut camera = Camera::new(config());
        let received = Rc::new(RefCell::new(Vec::new()));
        let sink = received.clone();
        camera.add_image_callback(move |image| {
            sink.borrow_mut().push(image);
            Ok(())
        });
        camera.setup(move |_| Ok(source)).unwrap();
        Self {
            camera,
            now: Instant::now(),
            received,
        }
    }

    fn tick(&mut self) {
        self.now += Duration::from_millis(5);
        self.camera.tick_at(self.now).unwrap();
    }

    fn tick_until(&mut self, mut done: impl FnMut(&Self) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(self) {
            assert!(Instant::now() < deadline, "condition not reached");
            self.tick();
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn take_received(&self) -> Vec<FrameHandle> {
        std::mem::take(&mut *self.received.borrow_mut())
    }
}

fn released(counts: &Arc<Mutex<Counts>>) -> u64 {
    counts.lock().unwrap().released
}

#[test]
fn web_request_delivers_frame_tagged_for_web() {
    let (source, _counts) = Counting::new(vec![]);
    let mut h = Harness::start(source);

    h.camera.request_image(Requester::Web);
    h.tick_until(|h| !h.received.borrow().is_empty());

    let received = h.take_received();
    assert_eq!(received.len(), 1);
    assert!(received[0].was_requested_by(Requester::Web));
    assert!(!received[0].was_requested_by(Requester::Api));
    assert_eq!(received[0].sequence(), 1);
    assert_eq!(received[0].len(), 1000);

    // one-shot: nothing more arrives
    for _ in 0..20 {
        h.tick();
    }
    assert!(h.take_received().is_empty());
}

#[test]
fn invalid_buffer_is_recycled_and_not_delivered() {
    let (source, counts) = Counting::new(vec![1]);
    let mut h = Harness::start(source);

    h.camera.request_image(Requester::Api);
    h.tick_until(|h| h.camera.stats().invalid == 1);
    assert!(h.received.borrow().is_empty());
    assert_eq!(h.camera.stats().published, 0);

    h.tick_until(|h| !h.received.borrow().is_empty());
    assert_eq!(h.take_received()[0].sequence(), 2);
    assert!(released(&counts) >= 1);
}

#[test]
fn retained_frame_blocks_reclamation_until_dropped() {
    let (source, counts) = Counting::new(vec![]);
    let mut h = Harness::start(source);

    h.camera.start_stream(Requester::Display);
    h.tick_until(|h| !h.received.borrow().is_empty());
    let held = h.take_received();

    for _ in 0..50 {
        h.tick();
        std::thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(released(&counts), 0);
    assert!(h.take_received().is_empty());

    drop(held);
    h.tick_until(|_| released(&counts) == 1);
}

#[test]
fn cursor_holds_frame_while_draining() {
    let (source, counts) = Counting::new(vec![]);
    let mut h = Harness::start(source);

    h.camera.request_image(Requester::Web);
    h.tick_until(|h| !h.received.borrow().is_empty());

    let mut cursor = FrameCursor::new();
    cursor.bind(h.take_received().remove(0));

    let mut drained = 0;
    while cursor.remaining() > 0 {
        let n = cursor.remaining().min(300);
        assert!(cursor.peek()[..n].iter().all(|&b| b == 1));
        cursor.advance(n);
        drained += n;
        h.tick();
        assert_eq!(released(&counts), 0);
    }
    assert_eq!(drained, 1000);

    cursor.unbind();
    h.tick_until(|_| released(&counts) == 1);
}

#[test]
fn streaming_keeps_one_buffer_in_flight() {
    let (source, counts) = Counting::new(vec![3, 7]);
    let mut h = Harness::start(source);

    h.camera.start_stream(Requester::Web);
    let mut kept = Vec::new();
    h.tick_until(|h| {
        h.received.borrow_mut().clear();
        h.camera.stats().published >= 10
    });
    for _ in 0..100 {
        kept.extend(h.take_received());
        if kept.len() > 2 {
            kept.clear();
        }
        h.tick();
        let counts = counts.lock().unwrap();
        assert!(counts.acquired - counts.released <= 1);
    }

    assert!(!h.camera.is_failed());
    let stats = h.camera.stats();
    assert_eq!(stats.invalid, 2);

    let sequences: Vec<u64> = kept.iter().map(FrameHandle::sequence).collect();
    assert!(sequences.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn stream_callbacks_fire_once_per_call() {
    let (source, _counts) = Counting::new(vec![]);
    let mut h = Harness::start(source);

    let events = Rc::new(RefCell::new(Vec::new()));
    {
        let events = events.clone();
        h.camera.add_stream_start_callback(move || events.borrow_mut().push("start"));
    }
    {
        let events = events.clone();
        h.camera.add_stream_stop_callback(move || events.borrow_mut().push("stop"));
    }

    h.camera.start_stream(Requester::Api);
    h.camera.stop_stream(Requester::Api);
    assert_eq!(*events.borrow(), vec!["start", "stop"]);
    assert!(h.camera.arbiter().stream_requests().is_empty());
}
