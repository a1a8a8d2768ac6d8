//! Single-slot mailbox between the sampler and the dispatcher
//!
//! The slot holds at most one undelivered frame. Publishing never blocks on
//! the consumer: a newer frame simply replaces one that has not been taken
//! yet. The lock is held only for the O(1) copy in or out.

use crate::types::SensorFrame;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Counters maintained inside the slot's critical section
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandoffStats {
    /// Frames stored by the producer
    pub published: u64,
    /// Frames handed to the consumer
    pub taken: u64,
    /// Frames replaced before they were taken
    pub overwritten: u64,
}

impl HandoffStats {
    /// Frames currently waiting (0 or 1)
    pub fn pending(&self) -> u64 {
        self.published - self.taken - self.overwritten
    }
}

#[derive(Debug, Default)]
struct SlotState {
    frame: Option<SensorFrame>,
    stats: HandoffStats,
}

/// Overwrite-on-full mailbox carrying one [`SensorFrame`]
#[derive(Debug, Default)]
pub struct HandoffSlot {
    state: Mutex<SlotState>,
}

impl HandoffSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a frame, replacing any frame not yet taken
    pub fn publish(&self, frame: SensorFrame) {
        let mut state = self.lock();
        if state.frame.replace(frame).is_some() {
            state.stats.overwritten += 1;
        }
        state.stats.published += 1;
    }

    /// Take the pending frame, if any
    pub fn try_take(&self) -> Option<SensorFrame> {
        let mut state = self.lock();
        let frame = state.frame.take();
        if frame.is_some() {
            state.stats.taken += 1;
        }
        frame
    }

    pub fn stats(&self) -> HandoffStats {
        self.lock().stats
    }

    // Every update leaves the state consistent, so a panic elsewhere while
    // holding the lock does not invalidate it.
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
