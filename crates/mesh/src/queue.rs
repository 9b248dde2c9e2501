//! The work queue feeding the processing loop.
//!
//! A bounded FIFO with two insertion disciplines: back-insertion for
//! the normal flow and front-insertion for newly received frames and
//! continuation items that must not starve behind older waits. The
//! single consumer blocks indefinitely; producers wait at most one
//! scheduler tick for a free slot and report the failure instead of
//! stalling their caller.

use crate::addr::MacAddr;
use crate::wire::Frame;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

/// How long a producer may wait for a free slot.
pub(crate) const ENQUEUE_TICK: Duration = Duration::from_millis(10);

/// Where a work item currently sits in its lifecycle.
///
/// Stage-specific data lives inside the stage, so an item is
/// structurally in exactly one state at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    /// Ready to leave this node.
    ToSend,
    /// Arrived from the link; `via` is the neighbor that transmitted it.
    OnRecv {
        /// Previous hop, stamped from the link receive callback.
        via: MacAddr,
    },
    /// Parked until a route to the frame's target is learned.
    WaitRoute {
        /// When the wait began.
        since: Instant,
    },
    /// Parked until the end-to-end confirmation arrives.
    WaitReply {
        /// When the wait began.
        since: Instant,
    },
}

/// One unit of work for the processing loop.
#[derive(Debug, Clone)]
pub(crate) struct WorkItem {
    /// Lifecycle stage.
    pub stage: Stage,
    /// The frame being moved through the mesh.
    pub frame: Frame,
}

/// Error enqueuing a work item.
#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum QueueError {
    /// No slot freed up within the producer tick.
    #[error("work queue is full")]
    Full,
    /// The engine is shutting down.
    #[error("work queue is closed")]
    Closed,
}

#[derive(Debug)]
struct QueueState {
    items: VecDeque<WorkItem>,
    closed: bool,
}

/// Bounded FIFO with front-insertion and a blocking single consumer.
#[derive(Debug)]
pub(crate) struct WorkQueue {
    state: Mutex<QueueState>,
    readable: Condvar,
    writable: Condvar,
    capacity: usize,
}

impl WorkQueue {
    /// Create a queue holding at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState { items: VecDeque::with_capacity(capacity), closed: false }),
            readable: Condvar::new(),
            writable: Condvar::new(),
            capacity,
        }
    }

    /// Append at the back (normal flow).
    pub fn push_back(&self, item: WorkItem) -> Result<(), QueueError> {
        self.push(item, false)
    }

    /// Insert at the front (fresh receives and priority continuations).
    pub fn push_front(&self, item: WorkItem) -> Result<(), QueueError> {
        self.push(item, true)
    }

    fn push(&self, item: WorkItem, front: bool) -> Result<(), QueueError> {
        let deadline = Instant::now() + ENQUEUE_TICK;
        let mut state = self.state.lock().unwrap();
        loop {
            if state.closed {
                return Err(QueueError::Closed);
            }
            if state.items.len() < self.capacity {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(QueueError::Full);
            }
            state = self.writable.wait_timeout(state, deadline - now).unwrap().0;
        }
        if front {
            state.items.push_front(item);
        } else {
            state.items.push_back(item);
        }
        self.readable.notify_one();
        Ok(())
    }

    /// Blocking receive; `None` once the queue is closed.
    pub fn recv(&self) -> Option<WorkItem> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.closed {
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                self.writable.notify_one();
                return Some(item);
            }
            state = self.readable.wait(state).unwrap();
        }
    }

    /// Close the queue, waking the consumer and all blocked producers.
    pub fn close(&self) {
        self.state.lock().unwrap().closed = true;
        self.readable.notify_all();
        self.writable.notify_all();
    }

    /// Whether [`WorkQueue::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// Items currently queued.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }

    /// Slots still free.
    pub fn free_slots(&self) -> usize {
        self.capacity - self.len()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
