//! Link adapter: the seam between the engine and the radio.
//!
//! The engine never touches a socket or a radio register. A host
//! supplies a [`LinkDriver`]; the engine hands it a [`LinkPort`] and
//! from then on the driver reports received frames and send
//! completions into the port while the engine calls `add_peer` /
//! `transmit` / `del_peer` on the driver.

use crate::addr::MacAddr;
use crate::config::LinkInterface;
use crate::queue::{Stage, WorkItem, WorkQueue};
use crate::table::SeenIds;
use crate::wire::{self, Frame, NetworkId};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors surfaced by a link driver.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The underlying link layer has not been brought up.
    #[error("link layer is not initialized")]
    NotInitialized,

    /// Peer registration failed (table full, invalid address).
    #[error("peer registration failed: {0}")]
    PeerTable(String),

    /// The radio refused the transmission outright.
    #[error("transmit rejected: {0}")]
    Transmit(String),

    /// Our fixed frame does not fit the link MTU.
    #[error("frame size {need} exceeds link MTU {have}")]
    Mtu {
        /// Bytes we need per frame.
        need: usize,
        /// Bytes the link can carry.
        have: usize,
    },
}

/// Outcome of one link-level transmission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendOutcome {
    /// The link acknowledged the frame.
    Success,
    /// The link reported failure.
    Fail,
    /// No completion arrived in time.
    Timeout,
}

/// The link primitive the host must supply.
///
/// Semantics mirror a broadcast-capable single-hop radio: unicast
/// transmission requires the peer to be registered first, and every
/// transmission is answered by exactly one completion callback into
/// the attached [`LinkPort`].
pub trait LinkDriver: Send + Sync {
    /// Bind the given interface and report the local address.
    fn open(&self, interface: LinkInterface) -> Result<MacAddr, LinkError>;

    /// Largest frame the link can carry.
    fn mtu(&self) -> usize;

    /// Register a peer so [`LinkDriver::transmit`] may address it.
    fn add_peer(&self, peer: MacAddr) -> Result<(), LinkError>;

    /// Remove a previously registered peer.
    fn del_peer(&self, peer: MacAddr);

    /// Hand a frame to the radio for `peer`.
    fn transmit(&self, peer: MacAddr, frame: &[u8]) -> Result<(), LinkError>;

    /// Accept the engine-side port this driver must report into.
    fn attach(&self, port: LinkPort);
}

/// Single-slot send-completion cell.
///
/// The Rust rendition of a two-bit completion event group: the
/// completion callback stores one verdict, the worker consumes it.
/// Only the worker waits. The slot is reset before each transmission
/// so a completion that arrives after its wait timed out cannot leak
/// into the next wait.
#[derive(Debug, Default)]
pub(crate) struct SendSignal {
    slot: Mutex<Option<bool>>,
    cond: Condvar,
}

impl SendSignal {
    /// Drop any stale verdict.
    pub fn reset(&self) {
        *self.slot.lock().unwrap() = None;
    }

    /// Store the link's verdict and wake the waiter.
    pub fn set(&self, ok: bool) {
        *self.slot.lock().unwrap() = Some(ok);
        self.cond.notify_one();
    }

    /// Consume the verdict, waiting at most `timeout` for it.
    pub fn wait(&self, timeout: Duration) -> SendOutcome {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock().unwrap();
        loop {
            if let Some(ok) = slot.take() {
                return if ok { SendOutcome::Success } else { SendOutcome::Fail };
            }
            let now = Instant::now();
            if now >= deadline {
                return SendOutcome::Timeout;
            }
            slot = self.cond.wait_timeout(slot, deadline - now).unwrap().0;
        }
    }
}

struct PortInner {
    network_id: NetworkId,
    queue_size: usize,
    queue: Arc<WorkQueue>,
    seen: Arc<Mutex<SeenIds>>,
    signal: Arc<SendSignal>,
}

/// Engine-side ingress the driver reports into.
///
/// Cheap to clone; callbacks may run in any task context. Admission of
/// received frames happens here, before anything reaches the worker:
/// malformed sizes, foreign networks, duplicates, and frames arriving
/// into a congested queue are all dropped silently.
#[derive(Clone)]
pub struct LinkPort {
    inner: Arc<PortInner>,
}

impl LinkPort {
    pub(crate) fn new(
        network_id: NetworkId,
        queue_size: usize,
        queue: Arc<WorkQueue>,
        seen: Arc<Mutex<SeenIds>>,
        signal: Arc<SendSignal>,
    ) -> Self {
        Self {
            inner: Arc::new(PortInner { network_id, queue_size, queue, seen, signal }),
        }
    }

    /// Receive callback: a frame arrived from neighbor `src`.
    pub fn frame_received(&self, src: MacAddr, bytes: &[u8]) {
        let inner = &*self.inner;
        if bytes.len() != wire::WIRE_LEN {
            debug!("dropping frame from {src}: bad length {}", bytes.len());
            return;
        }
        let (network_id, frame) = match Frame::decode(bytes) {
            Ok(decoded) => decoded,
            Err(err) => {
                debug!("dropping frame from {src}: {err}");
                return;
            }
        };
        if network_id != inner.network_id {
            debug!("dropping frame from {src}: foreign network {network_id:#010x}");
            return;
        }
        // Prefer losing an inbound frame to head-of-line blocking of
        // the worker.
        if inner.queue.free_slots() < inner.queue_size.saturating_sub(2) {
            debug!("dropping frame from {src}: queue congested");
            return;
        }
        {
            let mut seen = inner.seen.lock().unwrap();
            if !seen.check_and_insert(frame.id()) {
                debug!("dropping duplicate message {:#010x} from {src}", frame.id());
                return;
            }
        }
        let item = WorkItem { stage: Stage::OnRecv { via: src }, frame };
        if inner.queue.push_front(item).is_err() {
            warn!("work queue rejected frame from {src}");
        }
    }

    /// Send-completion callback for the previous [`LinkDriver::transmit`].
    pub fn send_complete(&self, peer: MacAddr, ok: bool) {
        let _ = peer;
        self.inner.signal.set(ok);
    }
}
