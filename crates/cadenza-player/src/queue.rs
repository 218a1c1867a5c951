//! Thread-safe bounded FIFO of decoded audio frames.
//!
//! The queue is the only structure the decode and render threads access
//! concurrently. Neither side blocks on it: the decode stage poll-waits on
//! its own while the queue sits at the high watermark, and the render stage
//! treats an empty pop as a buffering signal rather than waiting here.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::frame::AudioFrame;

/// Bounded-by-policy FIFO of [`AudioFrame`]s with low/high watermarks.
///
/// Enqueue order == decode order == presentation order; timestamps are
/// monotonically non-decreasing except immediately after a seek, when the
/// queue is cleared and refilled from the new position.
pub struct FrameQueue {
    inner: Mutex<VecDeque<AudioFrame>>,
    min_frames: usize,
    max_frames: usize,
}

impl FrameQueue {
    pub fn new(min_frames: usize, max_frames: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            min_frames,
            max_frames,
        }
    }

    /// Low watermark: below this the render stage buffers.
    pub fn min_frames(&self) -> usize {
        self.min_frames
    }

    /// High watermark: at or above this the decode stage throttles.
    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    /// Append a frame. Never blocks; the decode stage enforces the high
    /// watermark by polling [`FrameQueue::is_saturated`] before pushing.
    pub fn push(&self, frame: AudioFrame) {
        self.inner.lock().unwrap().push_back(frame);
    }

    /// Remove and return the oldest frame, or `None` when empty.
    pub fn pop(&self) -> Option<AudioFrame> {
        self.inner.lock().unwrap().pop_front()
    }

    /// Discard all queued frames (stop, seek, and failure recovery).
    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }

    /// Best-effort snapshot of the current depth.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }

    /// Whether the queue has fallen below the low watermark.
    pub fn is_starved(&self) -> bool {
        self.len() < self.min_frames
    }

    /// Whether the queue has reached the high watermark.
    pub fn is_saturated(&self) -> bool {
        self.len() >= self.max_frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn frame(pts_ms: f64) -> AudioFrame {
        AudioFrame::new(pts_ms, vec![0.5, -0.5])
    }

    #[test]
    fn pop_preserves_fifo_order() {
        let queue = FrameQueue::new(3, 10);
        queue.push(frame(0.0));
        queue.push(frame(10.0));
        queue.push(frame(20.0));

        assert_eq!(queue.pop().unwrap().pts_ms, 0.0);
        assert_eq!(queue.pop().unwrap().pts_ms, 10.0);
        assert_eq!(queue.pop().unwrap().pts_ms, 20.0);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn watermarks_reflect_depth() {
        let queue = FrameQueue::new(3, 10);
        assert!(queue.is_starved());
        assert!(!queue.is_saturated());

        for i in 0..3 {
            queue.push(frame(i as f64));
        }
        assert!(!queue.is_starved());

        for i in 3..10 {
            queue.push(frame(i as f64));
        }
        assert!(queue.is_saturated());
    }

    #[test]
    fn clear_empties_the_queue() {
        let queue = FrameQueue::new(3, 10);
        queue.push(frame(0.0));
        queue.push(frame(10.0));
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn concurrent_producers_and_consumer_drain_everything() {
        let queue = Arc::new(FrameQueue::new(3, 1000));
        let producer_queue = queue.clone();

        let producer = thread::spawn(move || {
            for i in 0..500 {
                producer_queue.push(frame(i as f64));
            }
        });

        let mut popped = 0;
        while popped < 500 {
            if queue.pop().is_some() {
                popped += 1;
            } else {
                thread::yield_now();
            }
        }

        producer.join().unwrap();
        assert!(queue.is_empty());
    }
}
