//! Frame Buffer: bounded queue coupling the blocking capture producer to
//! the cooperative consumer. Freshness over completeness: on overflow
//! the oldest frame is dropped, never the newest.
//!
//! Stats are tracked with atomics; the transport itself is a
//! single-writer / single-reader bounded deque rather than a broadcast
//! channel, since this stage has exactly one consumer, the orchestrator,
//! unlike the dispatcher's many subscribers.

use crate::model::Frame;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

pub struct FrameBuffer {
    queue: Mutex<VecDeque<Frame>>,
    not_empty: Condvar,
    capacity: usize,
    drop_oldest_on_overflow: bool,
    dropped: AtomicU64,
    enqueued: AtomicU64,
}

impl FrameBuffer {
    /// `drop_oldest_on_overflow` selects the overflow policy: `true` pops
    /// the oldest queued frame to make room for the new one (freshness
    /// over completeness), `false` rejects the incoming frame and keeps
    /// the queue as-is.
    pub fn new(capacity: usize, drop_oldest_on_overflow: bool) -> Self {
        FrameBuffer {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Condvar::new(),
            capacity: capacity.max(1),
            drop_oldest_on_overflow,
            dropped: AtomicU64::new(0),
            enqueued: AtomicU64::new(0),
        }
    }

    /// Non-blocking enqueue. On a full buffer, either the oldest queued
    /// frame is dropped to make room (default) or the incoming frame is
    /// rejected, per `drop_oldest_on_overflow`; `dropped` is incremented
    /// either way.
    pub fn push(&self, frame: Frame) {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            if self.drop_oldest_on_overflow {
                queue.pop_front();
                debug!("frame buffer full, dropped oldest frame");
            } else {
                debug!("frame buffer full, rejected incoming frame");
                return;
            }
        }
        queue.push_back(frame);
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        self.not_empty.notify_one();
    }

    /// Time-bounded dequeue; returns `None` on timeout rather than
    /// blocking the consumer indefinitely.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Frame> {
        let mut queue = self.queue.lock();
        if queue.is_empty() {
            let deadline = Instant::now() + timeout;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return None;
                }
                let result = self.not_empty.wait_for(&mut queue, remaining);
                if !queue.is_empty() {
                    break;
                }
                if result.timed_out() {
                    return None;
                }
            }
        }
        queue.pop_front()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(seq: u64) -> Frame {
        Frame {
            pixels: vec![],
            capture_timestamp: seq as f64,
            sequence: seq,
            width: 1,
            height: 1,
            channels: 1,
            capture_latency_ms: 0.0,
        }
    }

    #[test]
    fn overflow_drops_oldest_keeps_newest() {
        let buffer = FrameBuffer::new(2, true);
        buffer.push(frame(1));
        buffer.push(frame(2));
        buffer.push(frame(3)); // overflow: 1 is dropped

        assert_eq!(buffer.dropped(), 1);
        let first = buffer.pop_timeout(Duration::from_millis(10)).unwrap();
        assert_eq!(first.sequence, 2);
        let second = buffer.pop_timeout(Duration::from_millis(10)).unwrap();
        assert_eq!(second.sequence, 3);
    }

    #[test]
    fn dropped_is_monotonic_and_bounded_by_produced() {
        let buffer = FrameBuffer::new(1, true);
        for i in 0..5 {
            buffer.push(frame(i));
        }
        let dropped = buffer.dropped();
        assert_eq!(dropped, 4);
        let mut processed = 0;
        while buffer.pop_timeout(Duration::from_millis(1)).is_some() {
            processed += 1;
        }
        assert!(processed + dropped as usize <= 5);
    }

    #[test]
    fn pop_timeout_returns_none_when_empty() {
        let buffer = FrameBuffer::new(2, true);
        let start = Instant::now();
        let result = buffer.pop_timeout(Duration::from_millis(30));
        assert!(result.is_none());
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn overflow_rejects_newest_when_drop_oldest_disabled() {
        let buffer = FrameBuffer::new(2, false);
        buffer.push(frame(1));
        buffer.push(frame(2));
        buffer.push(frame(3)); // overflow: frame 3 is rejected, not enqueued

        assert_eq!(buffer.dropped(), 1);
        let first = buffer.pop_timeout(Duration::from_millis(10)).unwrap();
        assert_eq!(first.sequence, 1);
        let second = buffer.pop_timeout(Duration::from_millis(10)).unwrap();
        assert_eq!(second.sequence, 2);
        assert!(buffer.pop_timeout(Duration::from_millis(10)).is_none());
    }
}
