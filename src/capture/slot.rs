//! Single-slot frame channel: latest value wins, producer never blocks

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use super::frame::Frame;

#[derive(Default)]
struct Inner {
    frame: Option<Frame>,
    closed: bool,
}

/// Holds at most one pending frame. A producer overwrites the pending frame
/// unconditionally; the consumer drains the newest value or times out. Frames
/// published between two consumer reads are discarded, so an arbitrarily slow
/// consumer never backs up the producer.
pub struct FrameSlot {
    inner: Mutex<Inner>,
    available: Condvar,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    // A poisoned slot only means a panic elsewhere while holding the lock;
    // the Option inside is still in a consistent state.
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

impl FrameSlot {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            available: Condvar::new(),
        }
    }

    /// Replace any pending frame with `frame`. Never blocks the producer.
    pub fn publish(&self, frame: Frame) {
        let mut inner = lock(&self.inner);
        inner.frame = Some(frame);
        self.available.notify_one();
    }

    /// Block until a frame is available or `timeout` elapses.
    ///
    /// Returns `None` on timeout (no data - a transient condition, not an
    /// error) and on a closed, drained slot. On success the slot is left
    /// empty.
    pub fn take(&self, timeout: Duration) -> Option<Frame> {
        let inner = lock(&self.inner);
        let (mut inner, _timed_out) = self
            .available
            .wait_timeout_while(inner, timeout, |inner| {
                inner.frame.is_none() && !inner.closed
            })
            .unwrap_or_else(|e| e.into_inner());
        inner.frame.take()
    }

    /// Mark the producer side as finished. Wakes a blocked consumer; a frame
    /// still pending at close time remains takeable.
    pub fn close(&self) {
        let mut inner = lock(&self.inner);
        inner.closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner).closed
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use bytes::Bytes;

    use super::*;
    use crate::capture::frame::PixelFormat;

    fn frame(sequence: u64) -> Frame {
        Frame::new(Bytes::from_static(&[0u8; 12]), sequence, 2, 2, PixelFormat::Rgb24)
    }

    #[test]
    fn take_returns_most_recent_publish() {
        let slot = FrameSlot::new();
        slot.publish(frame(1));
        slot.publish(frame(2));
        slot.publish(frame(3));

        let taken = slot.take(Duration::from_millis(10)).unwrap();
        assert_eq!(taken.sequence(), 3);
    }

    #[test]
    fn take_drains_the_slot() {
        let slot = FrameSlot::new();
        slot.publish(frame(1));

        assert!(slot.take(Duration::from_millis(10)).is_some());
        assert!(slot.take(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn take_times_out_within_bounds() {
        let slot = FrameSlot::new();
        let timeout = Duration::from_millis(100);

        let start = Instant::now();
        let taken = slot.take(timeout);
        let elapsed = start.elapsed();

        assert!(taken.is_none());
        assert!(elapsed >= timeout, "returned after {elapsed:?}");
        // Generous slack for a loaded test machine
        assert!(elapsed < timeout + Duration::from_millis(250));
    }

    #[test]
    fn take_wakes_on_publish_from_another_thread() {
        let slot = Arc::new(FrameSlot::new());
        let producer = Arc::clone(&slot);

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            producer.publish(frame(7));
        });

        let taken = slot.take(Duration::from_secs(2));
        handle.join().unwrap();

        assert_eq!(taken.unwrap().sequence(), 7);
    }

    #[test]
    fn close_wakes_consumer_and_keeps_pending_frame() {
        let slot = FrameSlot::new();
        slot.publish(frame(4));
        slot.close();

        assert!(slot.is_closed());
        assert_eq!(slot.take(Duration::from_millis(10)).unwrap().sequence(), 4);
        // Drained and closed: returns immediately with nothing
        let start = Instant::now();
        assert!(slot.take(Duration::from_secs(2)).is_none());
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
