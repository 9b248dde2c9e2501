//! Events published to the embedding host.

use crate::addr::MacAddr;
use crate::wire::MessageId;
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

/// Terminal status of a message this node originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendStatus {
    /// Broadcast left the radio, or the unicast was confirmed
    /// end-to-end.
    Success,
    /// No route was found, or no confirmation arrived in time.
    Fail,
}

/// Asynchronous notifications from the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeshEvent {
    /// A payload addressed to this node (or broadcast) arrived.
    ///
    /// The buffer is owned by the receiver of this event; the engine
    /// keeps no reference to it.
    Received {
        /// Ultimate originator of the payload.
        source: MacAddr,
        /// The user data.
        payload: Vec<u8>,
    },
    /// Terminal outcome for a message this node originated.
    Sent {
        /// The destination the message was addressed to.
        peer: MacAddr,
        /// Message id returned by the send call, for correlation.
        id: MessageId,
        /// Outcome.
        status: SendStatus,
    },
}

/// Worker-side handle publishing events to the host.
#[derive(Clone)]
pub(crate) struct EventSink {
    tx: Sender<MeshEvent>,
}

impl EventSink {
    /// Create the sink and the host-side receiver.
    pub fn channel() -> (EventSink, Receiver<MeshEvent>) {
        let (tx, rx) = unbounded();
        (EventSink { tx }, rx)
    }

    /// Publish one event. A host that dropped its receiver simply
    /// stops listening; that is not an engine error.
    pub fn emit(&self, event: MeshEvent) {
        let _ = self.tx.send(event);
    }
}
