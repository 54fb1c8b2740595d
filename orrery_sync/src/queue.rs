// Concurrent handoff queue between network reader threads and the
// simulation thread.
//
// Generic thread-safe FIFO: any number of producers (one per connection's
// receive path) push decoded items; exactly one consumer (the simulation
// thread) drains at its own cadence, either polling with `try_pop` or
// blocking in `pop` at its designated synchronization point. Per-producer
// FIFO order is preserved; items from different producers may interleave in
// any order.
//
// Closing the queue wakes every blocked consumer with `None` rather than
// leaving it parked — this is how connection teardown interrupts a
// simulation thread waiting on data. Pushes after close are dropped.
//
// Plain `Mutex<VecDeque>` + `Condvar`: the contract needs `len`, blocking
// pop, and close-wakes-consumers, which is more than `std::sync::mpsc`
// exposes. Lock poisoning is recovered by taking the inner state — a
// panicked producer cannot corrupt a VecDeque push.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Thread-safe FIFO handing decoded items across threads.
pub struct HandoffQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> Default for HandoffQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandoffQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue an item (non-blocking). Dropped silently if the queue is
    /// closed — the consumer is gone.
    pub fn push(&self, item: T) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.items.push_back(item);
        self.available.notify_one();
    }

    /// Dequeue, blocking until an item is available or the queue is closed.
    /// Returns `None` only when the queue is closed AND drained.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Dequeue without blocking.
    pub fn try_pop(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Close the queue, waking all blocked consumers. Idempotent. Items
    /// already queued remain poppable until drained.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
