//! Bounded interleaved sample queue connecting the playback stages.
//!
//! One-shot playback is wired as:
//! - feed thread pushes the decoded buffer → queue
//! - optional resampler thread → second queue
//! - output callback drains without blocking
//!
//! Producers close the queue when they are done; consumers treat
//! "closed and empty" as end of stream.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crate::buffer::DecodedAudioBuffer;

/// Bounded multi-producer/multi-consumer queue of interleaved `f32` samples.
///
/// `done` lives under the same mutex as the samples so close/drain checks never race.
pub struct SampleQueue {
    channels: usize,
    inner: Mutex<QueueInner>,
    cv: Condvar,
    max_samples: usize,
}

struct QueueInner {
    samples: VecDeque<f32>,
    done: bool,
}

/// How a consumer takes frames out of the queue.
pub enum PopStrategy {
    /// Block until exactly `frames` are available; `None` if closed first.
    BlockingExact { frames: usize },
    /// Block until any whole frame is available, then take up to `max_frames`.
    BlockingUpTo { max_frames: usize },
    /// Take up to `max_frames` whole frames right now, or `None` if there are none.
    NonBlocking { max_frames: usize },
}

/// Queue capacity in samples for `seconds` of audio; non-positive or non-finite
/// `seconds` falls back to two seconds.
pub fn capacity_samples(rate_hz: u32, channels: usize, seconds: f32) -> usize {
    let secs = if seconds.is_finite() && seconds > 0.0 {
        seconds
    } else {
        2.0
    };
    let frames = (rate_hz as f32 * secs).ceil() as usize;
    frames.max(1).saturating_mul(channels)
}

impl SampleQueue {
    pub fn new(channels: usize, max_samples: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            inner: Mutex::new(QueueInner {
                samples: VecDeque::new(),
                done: false,
            }),
            cv: Condvar::new(),
            max_samples: max_samples.max(channels),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Capacity in frames.
    pub fn max_frames(&self) -> usize {
        self.max_samples / self.channels
    }

    /// Buffered frames right now.
    pub fn len_frames(&self) -> usize {
        self.lock().samples.len() / self.channels
    }

    pub fn is_done(&self) -> bool {
        self.lock().done
    }

    /// Mark the producer side finished and wake every waiter. Idempotent.
    pub fn close(&self) {
        self.lock().done = true;
        self.cv.notify_all();
    }

    /// Push samples, blocking while the queue is full.
    ///
    /// Returns `false` if the queue was closed before everything was accepted.
    pub fn push_blocking(&self, samples: &[f32]) -> bool {
        let mut offset = 0;
        while offset < samples.len() {
            let mut g = self.lock();
            while g.samples.len() >= self.max_samples && !g.done {
                g = self.wait(g);
            }
            if g.done {
                return false;
            }
            let room = self.max_samples - g.samples.len();
            let take = room.min(samples.len() - offset);
            g.samples.extend(&samples[offset..offset + take]);
            offset += take;
            drop(g);
            self.cv.notify_all();
        }
        true
    }

    /// Pop whole frames according to `strategy`.
    pub fn pop(&self, strategy: PopStrategy) -> Option<Vec<f32>> {
        let mut g = self.lock();
        let take_frames = match strategy {
            PopStrategy::BlockingExact { frames } => {
                let want = frames * self.channels;
                while g.samples.len() < want && !g.done {
                    g = self.wait(g);
                }
                if g.samples.len() < want {
                    return None;
                }
                frames
            }
            PopStrategy::BlockingUpTo { max_frames } => {
                while g.samples.len() < self.channels && !g.done {
                    g = self.wait(g);
                }
                let available = g.samples.len() / self.channels;
                if available == 0 {
                    return None;
                }
                available.min(max_frames)
            }
            PopStrategy::NonBlocking { max_frames } => {
                let available = g.samples.len() / self.channels;
                let take = available.min(max_frames);
                if take == 0 {
                    return None;
                }
                take
            }
        };
        let out: Vec<f32> = g.samples.drain(..take_frames * self.channels).collect();
        drop(g);
        self.cv.notify_all();
        Some(out)
    }

    /// Block until the queue is closed and drained, or any flag in `cancel` is set.
    ///
    /// Returns `true` on a normal drain, `false` when cancelled.
    pub fn wait_drained(&self, cancel: &[&AtomicBool]) -> bool {
        let mut g = self.lock();
        loop {
            if cancel.iter().any(|c| c.load(Ordering::Relaxed)) {
                return false;
            }
            if g.done && g.samples.is_empty() {
                return true;
            }
            g = match self.cv.wait_timeout(g, Duration::from_millis(50)) {
                Ok((g, _)) => g,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wait<'a>(&self, g: MutexGuard<'a, QueueInner>) -> MutexGuard<'a, QueueInner> {
        self.cv.wait(g).unwrap_or_else(|e| e.into_inner())
    }
}

/// Stream an already-decoded buffer into a new bounded queue from a background thread.
///
/// The queue is closed once every frame has been pushed (immediately for an empty buffer).
pub fn start_buffer_feed(buffer: DecodedAudioBuffer, buffer_seconds: f32) -> Arc<SampleQueue> {
    let channels = buffer.num_channels();
    let capacity = capacity_samples(buffer.sample_rate(), channels, buffer_seconds);
    let queue = Arc::new(SampleQueue::new(channels, capacity));

    let q = queue.clone();
    thread::spawn(move || {
        let interleaved = buffer.to_interleaved();
        let chunk = q.max_frames().max(1) * channels;
        for part in interleaved.chunks(chunk) {
            if !q.push_blocking(part) {
                tracing::debug!("buffer feed stopped: queue closed");
                break;
            }
        }
        q.close();
    });

    queue
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_falls_back_for_bad_seconds() {
        assert_eq!(capacity_samples(24_000, 1, 2.0), 48_000);
        assert_eq!(capacity_samples(24_000, 1, -1.0), 48_000);
        assert_eq!(capacity_samples(24_000, 1, f32::NAN), 48_000);
        assert_eq!(capacity_samples(48_000, 2, 0.5), 48_000);
    }

    #[test]
    fn nonblocking_pop_on_empty_is_none() {
        let q = SampleQueue::new(2, 16);
        assert!(q.pop(PopStrategy::NonBlocking { max_frames: 4 }).is_none());
    }

    #[test]
    fn nonblocking_pop_takes_whole_frames() {
        let q = SampleQueue::new(2, 64);
        assert!(q.push_blocking(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));
        let out = q.pop(PopStrategy::NonBlocking { max_frames: 2 }).unwrap();
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(q.len_frames(), 1);
    }

    #[test]
    fn blocking_exact_waits_for_producer() {
        let q = Arc::new(SampleQueue::new(2, 64));
        let consumer = {
            let q = q.clone();
            thread::spawn(move || q.pop(PopStrategy::BlockingExact { frames: 3 }))
        };
        q.push_blocking(&[0.1, 0.2, 0.3, 0.4]);
        q.push_blocking(&[0.5, 0.6]);
        let out = consumer.join().unwrap().unwrap();
        assert_eq!(out.len(), 6);
    }

    #[test]
    fn blocking_up_to_returns_none_after_close() {
        let q = SampleQueue::new(2, 64);
        q.push_blocking(&[1.0, 2.0, 3.0, 4.0]);
        q.close();
        assert_eq!(q.pop(PopStrategy::BlockingUpTo { max_frames: 8 }).unwrap().len(), 4);
        assert!(q.pop(PopStrategy::BlockingUpTo { max_frames: 8 }).is_none());
    }

    #[test]
    fn push_after_close_is_rejected() {
        let q = SampleQueue::new(1, 8);
        q.close();
        assert!(!q.push_blocking(&[1.0]));
        assert!(q.is_done());
    }

    #[test]
    fn wait_drained_honours_cancel() {
        let q = SampleQueue::new(1, 8);
        q.push_blocking(&[1.0]);
        let cancel = AtomicBool::new(true);
        assert!(!q.wait_drained(&[&cancel]));
    }

    #[test]
    fn feed_delivers_everything_then_closes() {
        let samples = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        let buf = DecodedAudioBuffer::from_interleaved(&samples, 2, 10).unwrap();
        // Single-frame capacity at 10 Hz forces several pushes.
        let q = start_buffer_feed(buf, 0.1);
        let mut got = Vec::new();
        while let Some(part) = q.pop(PopStrategy::BlockingUpTo { max_frames: 1 }) {
            got.extend(part);
        }
        assert_eq!(got, vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        assert!(q.wait_drained(&[]));
    }

    #[test]
    fn feed_of_empty_buffer_closes_immediately() {
        let buf = DecodedAudioBuffer::silent(1, 0, 24_000).unwrap();
        let q = start_buffer_feed(buf, 2.0);
        assert!(q.wait_drained(&[]));
    }
}
