//! Bounded recency tables.
//!
//! Three insertion-ordered collections back the engine: the seen-id
//! window (flood dedup), the route table (destination to next hop),
//! and the pending-confirm log. All three evict oldest-first when
//! their bound is exceeded, so memory stays fixed for the engine's
//! lifetime.

use crate::addr::MacAddr;
use crate::wire::MessageId;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A learned next hop: frames for `target` leave through `via`.
///
/// Learned from the reverse path of any probe that traverses this
/// node: the probe's originator is reachable through whichever
/// neighbor handed us the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Ultimate destination.
    pub target: MacAddr,
    /// Neighbor to hand frames for `target` to.
    pub via: MacAddr,
}

/// Bounded window of recently observed message ids.
#[derive(Debug)]
pub struct SeenIds {
    ids: VecDeque<MessageId>,
    cap: usize,
}

impl SeenIds {
    /// Create a window holding at most `cap` ids.
    pub fn new(cap: usize) -> Self {
        Self { ids: VecDeque::with_capacity(cap.min(1024)), cap }
    }

    /// Whether `id` is still inside the window.
    pub fn contains(&self, id: MessageId) -> bool {
        self.ids.contains(&id)
    }

    /// Record `id`, evicting the oldest entries past the bound.
    pub fn insert(&mut self, id: MessageId) {
        self.ids.push_back(id);
        while self.ids.len() > self.cap {
            self.ids.pop_front();
        }
    }

    /// Admission helper: record `id` and report whether it was new.
    pub fn check_and_insert(&mut self, id: MessageId) -> bool {
        if self.contains(id) {
            return false;
        }
        self.insert(id);
        true
    }

    /// Current number of remembered ids.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the window is empty.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Bounded route table with at most one entry per destination.
#[derive(Debug)]
pub struct RouteTable {
    routes: VecDeque<Route>,
    cap: usize,
}

impl RouteTable {
    /// Create a table holding at most `cap` routes.
    pub fn new(cap: usize) -> Self {
        Self { routes: VecDeque::with_capacity(cap.min(1024)), cap }
    }

    /// Next hop for `target`, if one is known.
    pub fn next_hop(&self, target: MacAddr) -> Option<MacAddr> {
        self.routes.iter().find(|r| r.target == target).map(|r| r.via)
    }

    /// Learn (or refresh) the route to `target`.
    ///
    /// Any prior entry for the same destination is removed first, so
    /// the table never holds two opinions about one target.
    pub fn insert(&mut self, target: MacAddr, via: MacAddr) {
        self.routes.retain(|r| r.target != target);
        self.routes.push_back(Route { target, via });
        while self.routes.len() > self.cap {
            self.routes.pop_front();
        }
    }

    /// Forget the route to `target`; returns whether one existed.
    pub fn invalidate(&mut self, target: MacAddr) -> bool {
        let before = self.routes.len();
        self.routes.retain(|r| r.target != target);
        self.routes.len() != before
    }

    /// Current number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Bounded log of confirm ids that arrived for this originator.
///
/// A wait-for-confirm timeout does not scrub its id from this log;
/// entries that never match simply age out by FIFO eviction.
#[derive(Debug)]
pub struct ConfirmLog {
    ids: VecDeque<MessageId>,
    cap: usize,
}

impl ConfirmLog {
    /// Create a log holding at most `cap` ids.
    pub fn new(cap: usize) -> Self {
        Self { ids: VecDeque::with_capacity(cap.min(1024)), cap }
    }

    /// Record an arrived confirmation.
    pub fn push(&mut self, id: MessageId) {
        self.ids.push_back(id);
        while self.ids.len() > self.cap {
            self.ids.pop_front();
        }
    }

    /// Consume the confirmation for `id`, if present.
    pub fn take(&mut self, id: MessageId) -> bool {
        match self.ids.iter().position(|&entry| entry == id) {
            Some(index) => {
                self.ids.remove(index);
                true
            }
            None => false,
        }
    }

    /// Current number of pending confirmations.
    pub fn len(&self) -> usize {
        self.ids.len()
    }
}
