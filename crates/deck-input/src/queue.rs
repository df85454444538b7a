//! Bounded hand-off queue between the encoder task and the controller
//!
//! The producer never blocks: when the queue is full the oldest event is
//! discarded and a drop counter is incremented. The consumer drains the whole
//! queue once per controller cycle.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::InputError;
use crate::event::EncoderEvent;

/// Default queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

struct QueueInner {
    events: VecDeque<EncoderEvent>,
    dropped: u64,
}

/// Bounded FIFO of encoder events with drop-oldest overflow
pub struct EventQueue {
    inner: Mutex<QueueInner>,
    capacity: usize,
}

impl EventQueue {
    /// Create a queue holding at most `capacity` events
    pub fn new(capacity: usize) -> Result<Self, InputError> {
        if capacity == 0 {
            return Err(InputError::ZeroCapacity);
        }
        Ok(Self {
            inner: Mutex::new(QueueInner {
                events: VecDeque::with_capacity(capacity),
                dropped: 0,
            }),
            capacity,
        })
    }

    // A panic while holding the lock cannot leave the deque half-updated,
    // so a poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an event, evicting the oldest one if the queue is full
    pub fn push(&self, event: EncoderEvent) {
        let mut inner = self.lock();
        if inner.events.len() == self.capacity {
            if let Some(evicted) = inner.events.pop_front() {
                inner.dropped += 1;
                debug!(
                    "Event queue full, dropped {} (total dropped {})",
                    evicted.name(),
                    inner.dropped
                );
            }
        }
        inner.events.push_back(event);
    }

    /// Take every queued event in insertion order
    pub fn drain_all(&self) -> Vec<EncoderEvent> {
        let mut inner = self.lock();
        std::mem::take(&mut inner.events).into()
    }

    /// Number of events discarded because the queue was full
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    /// Number of events currently queued
    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }

    /// Maximum number of queued events
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("EventQueue")
            .field("len", &inner.events.len())
            .field("capacity", &self.capacity)
            .field("dropped", &inner.dropped)
            .finish()
    }
}
