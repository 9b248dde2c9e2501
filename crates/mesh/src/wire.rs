//! On-wire frame model and codec.
//!
//! Every transmission is exactly [`WIRE_LEN`] bytes: a fixed header
//! followed by a zero-padded payload area. The five frame kinds differ
//! only in which fields carry meaning, so the in-memory model is a
//! tagged union of small per-kind records; the dead fields exist only
//! in the byte layout, never in the types.
//!
//! The previous-hop address is deliberately absent from the wire: it is
//! stamped by the receiver from the link callback and must not be
//! trusted if a peer were to smuggle it inside a frame.

use crate::addr::MacAddr;
use rand::Rng;
use thiserror::Error;

/// Largest payload a single frame can carry, in bytes.
///
/// Must agree network-wide; nodes built with a different value produce
/// frames that fail the length check on receive.
pub const PAYLOAD_CAP: usize = 218;

/// Fixed header length: kind tag, network id, message id, confirm id,
/// target, source, payload length.
pub const HEADER_LEN: usize = 1 + 4 + 4 + 4 + 6 + 6 + 1;

/// Exact size of every frame on the wire.
pub const WIRE_LEN: usize = HEADER_LEN + PAYLOAD_CAP;

const _: () = assert!(WIRE_LEN == 244);

/// Administrative mesh discriminator carried by every frame.
pub type NetworkId = u32;

/// Per-frame unique identifier used for flood dedup and ack matching.
///
/// Always non-zero; zero is reserved as "no id" in the confirm field.
pub type MessageId = u32;

/// Draw a fresh non-zero message id.
///
/// Uniform 32-bit values make a collision inside the bounded seen
/// window negligible.
pub fn fresh_message_id() -> MessageId {
    let mut rng = rand::thread_rng();
    loop {
        let id: u32 = rng.gen();
        if id != 0 {
            return id;
        }
    }
}

/// Discriminant of the five frame kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Flooded to every reachable node.
    Broadcast,
    /// Routed hop-by-hop to one node.
    Unicast,
    /// End-to-end acknowledgement of a unicast.
    Confirm,
    /// Flooded probe asking for a path to `target`.
    RouteRequest,
    /// Flooded answer carrying the reverse path back to the requester.
    RouteReply,
}

const TAG_BROADCAST: u8 = 0;
const TAG_UNICAST: u8 = 1;
const TAG_CONFIRM: u8 = 2;
const TAG_ROUTE_REQUEST: u8 = 3;
const TAG_ROUTE_REPLY: u8 = 4;

/// User data flooded or routed through the mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    /// Frame identity.
    pub id: MessageId,
    /// Ultimate originator.
    pub source: MacAddr,
    /// Ultimate destination; [`MacAddr::BROADCAST`] for broadcasts.
    pub target: MacAddr,
    /// User payload, 1..=[`PAYLOAD_CAP`] bytes.
    pub payload: Vec<u8>,
}

/// End-to-end delivery acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmFrame {
    /// Frame identity (of the confirm itself).
    pub id: MessageId,
    /// The node that received the unicast and emitted this confirm.
    pub source: MacAddr,
    /// The unicast's originator.
    pub target: MacAddr,
    /// Message id of the unicast being acknowledged.
    pub confirm_id: MessageId,
}

/// Payload-less route discovery probe (request or reply).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeFrame {
    /// Frame identity.
    pub id: MessageId,
    /// The node that initiated this probe.
    pub source: MacAddr,
    /// The node the probe asks about (request) or answers (reply).
    pub target: MacAddr,
}

/// One mesh frame, modeled by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Flooded user data.
    Broadcast(DataFrame),
    /// Routed user data.
    Unicast(DataFrame),
    /// Delivery acknowledgement.
    Confirm(ConfirmFrame),
    /// Route discovery request.
    RouteRequest(ProbeFrame),
    /// Route discovery reply.
    RouteReply(ProbeFrame),
}

impl Frame {
    /// The kind discriminant.
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Broadcast(_) => FrameKind::Broadcast,
            Frame::Unicast(_) => FrameKind::Unicast,
            Frame::Confirm(_) => FrameKind::Confirm,
            Frame::RouteRequest(_) => FrameKind::RouteRequest,
            Frame::RouteReply(_) => FrameKind::RouteReply,
        }
    }

    /// This frame's message id.
    pub fn id(&self) -> MessageId {
        match self {
            Frame::Broadcast(f) | Frame::Unicast(f) => f.id,
            Frame::Confirm(f) => f.id,
            Frame::RouteRequest(f) | Frame::RouteReply(f) => f.id,
        }
    }

    /// The ultimate originator.
    pub fn source(&self) -> MacAddr {
        match self {
            Frame::Broadcast(f) | Frame::Unicast(f) => f.source,
            Frame::Confirm(f) => f.source,
            Frame::RouteRequest(f) | Frame::RouteReply(f) => f.source,
        }
    }

    /// The ultimate destination.
    pub fn target(&self) -> MacAddr {
        match self {
            Frame::Broadcast(f) | Frame::Unicast(f) => f.target,
            Frame::Confirm(f) => f.target,
            Frame::RouteRequest(f) | Frame::RouteReply(f) => f.target,
        }
    }

    /// Serialize into the fixed wire layout.
    ///
    /// Integers are little-endian; all supported radios are LE targets,
    /// so this is the byte order homogeneous deployments exchange.
    pub fn encode(&self, network_id: NetworkId) -> [u8; WIRE_LEN] {
        let mut buf = [0u8; WIRE_LEN];
        let (tag, confirm_id, payload): (u8, MessageId, &[u8]) = match self {
            Frame::Broadcast(f) => (TAG_BROADCAST, 0, &f.payload),
            Frame::Unicast(f) => (TAG_UNICAST, 0, &f.payload),
            Frame::Confirm(f) => (TAG_CONFIRM, f.confirm_id, &[]),
            Frame::RouteRequest(_) => (TAG_ROUTE_REQUEST, 0, &[]),
            Frame::RouteReply(_) => (TAG_ROUTE_REPLY, 0, &[]),
        };
        debug_assert!(payload.len() <= PAYLOAD_CAP);
        buf[0] = tag;
        buf[1..5].copy_from_slice(&network_id.to_le_bytes());
        buf[5..9].copy_from_slice(&self.id().to_le_bytes());
        buf[9..13].copy_from_slice(&confirm_id.to_le_bytes());
        buf[13..19].copy_from_slice(&self.target().octets());
        buf[19..25].copy_from_slice(&self.source().octets());
        buf[25..25 + payload.len()].copy_from_slice(payload);
        buf[WIRE_LEN - 1] = payload.len() as u8;
        buf
    }

    /// Parse a received frame, returning the network id it was tagged with.
    pub fn decode(bytes: &[u8]) -> Result<(NetworkId, Frame), WireError> {
        if bytes.len() != WIRE_LEN {
            return Err(WireError::Length { got: bytes.len() });
        }
        let network_id = NetworkId::from_le_bytes(bytes[1..5].try_into().unwrap());
        let id = MessageId::from_le_bytes(bytes[5..9].try_into().unwrap());
        let confirm_id = MessageId::from_le_bytes(bytes[9..13].try_into().unwrap());
        let target = MacAddr::new(bytes[13..19].try_into().unwrap());
        let source = MacAddr::new(bytes[19..25].try_into().unwrap());
        let payload_len = bytes[WIRE_LEN - 1] as usize;
        if payload_len > PAYLOAD_CAP {
            return Err(WireError::PayloadLen { got: payload_len });
        }
        let frame = match bytes[0] {
            TAG_BROADCAST | TAG_UNICAST => {
                let data = DataFrame {
                    id,
                    source,
                    target,
                    payload: bytes[25..25 + payload_len].to_vec(),
                };
                if bytes[0] == TAG_BROADCAST {
                    Frame::Broadcast(data)
                } else {
                    Frame::Unicast(data)
                }
            }
            TAG_CONFIRM => {
                if payload_len != 0 {
                    return Err(WireError::UnexpectedPayload { kind: FrameKind::Confirm });
                }
                Frame::Confirm(ConfirmFrame { id, source, target, confirm_id })
            }
            TAG_ROUTE_REQUEST | TAG_ROUTE_REPLY => {
                if payload_len != 0 {
                    let kind = if bytes[0] == TAG_ROUTE_REQUEST {
                        FrameKind::RouteRequest
                    } else {
                        FrameKind::RouteReply
                    };
                    return Err(WireError::UnexpectedPayload { kind });
                }
                let probe = ProbeFrame { id, source, target };
                if bytes[0] == TAG_ROUTE_REQUEST {
                    Frame::RouteRequest(probe)
                } else {
                    Frame::RouteReply(probe)
                }
            }
            tag => return Err(WireError::UnknownKind(tag)),
        };
        Ok((network_id, frame))
    }
}

/// Error decoding a received frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// Total length is not the fixed frame size.
    #[error("wrong frame length: {got} bytes")]
    Length {
        /// Received byte count.
        got: usize,
    },

    /// Unknown kind tag.
    #[error("unknown frame kind tag {0:#04x}")]
    UnknownKind(u8),

    /// Payload length byte exceeds the payload area.
    #[error("payload length {got} exceeds frame capacity")]
    PayloadLen {
        /// Claimed payload length.
        got: usize,
    },

    /// A payload-less kind claimed a payload.
    #[error("{kind:?} frames carry no payload")]
    UnexpectedPayload {
        /// The offending kind.
        kind: FrameKind,
    },
}
