//! Lock-free period queue between device callbacks and session threads
//!
//! Single-producer single-consumer: the cpal callback pushes, one session
//! thread pops. Overflow drops the newest period rather than blocking inside
//! the audio callback.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Bounded queue of whole audio periods
pub struct PeriodQueue {
    queue: ArrayQueue<Vec<i16>>,
    overflow_count: AtomicUsize,
    underrun_count: AtomicUsize,
}

impl PeriodQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            overflow_count: AtomicUsize::new(0),
            underrun_count: AtomicUsize::new(0),
        }
    }

    /// Push a period; returns false and counts an overflow when full
    pub fn push(&self, period: Vec<i16>) -> bool {
        match self.queue.push(period) {
            Ok(()) => true,
            Err(_) => {
                self.overflow_count.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Pop the oldest period, counting an underrun when empty
    pub fn pop(&self) -> Option<Vec<i16>> {
        match self.queue.pop() {
            Some(period) => Some(period),
            None => {
                self.underrun_count.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Pop without counting underrun
    pub fn try_pop(&self) -> Option<Vec<i16>> {
        self.queue.pop()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn overflow_count(&self) -> usize {
        self.overflow_count.load(Ordering::Relaxed)
    }

    pub fn underrun_count(&self) -> usize {
        self.underrun_count.load(Ordering::Relaxed)
    }
}

/// Thread-safe handle to a period queue
pub type SharedPeriodQueue = Arc<PeriodQueue>;

/// Create a new shared period queue
pub fn create_shared_queue(capacity: usize) -> SharedPeriodQueue {
    Arc::new(PeriodQueue::new(capacity))
}
