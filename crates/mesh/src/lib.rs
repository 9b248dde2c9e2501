//! Weftnet Mesh - self-organizing overlay on a single-hop datagram link
//!
//! Turns a broadcast-capable, six-byte-addressed radio primitive into a
//! mesh: flooded broadcast with duplicate suppression, reliable unicast
//! over routes discovered on demand, and store-and-forward relaying at
//! every node.
//!
//! # Core Components
//!
//! - **Link Adapter**: the [`LinkDriver`] seam plus frame admission
//!   ([`LinkPort`]) between the radio and the engine
//! - **Work Queue**: bounded FIFO with front-insertion for fresh
//!   arrivals and priority continuations
//! - **Recency Tables**: bounded seen-id window, route table, and
//!   pending-confirm log with oldest-first eviction
//! - **Processing Loop**: one worker multiplexing the five frame kinds
//!   across the four work-item states
//! - **Event Emitter**: [`MeshEvent`] notifications to the embedding
//!   host
//!
//! # Design Principles
//!
//! 1. **Single consumer**: all mutable routing state is owned by the
//!    worker; producers reach it only through the queue
//! 2. **Bounded everything**: queue, tables, and waits have fixed
//!    limits, so memory and latency cannot grow without bound
//! 3. **Lossy at the edge**: malformed, foreign, duplicate, and
//!    congested-arrival frames are dropped silently at admission
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use weftnet_mesh::{Config, Mesh, MeshEvent};
//! # fn driver() -> Arc<dyn weftnet_mesh::LinkDriver> { unimplemented!() }
//!
//! # fn main() -> Result<(), weftnet_mesh::MeshError> {
//! let mesh = Mesh::new(Config::default(), driver())?;
//!
//! // Flood a payload to every reachable node.
//! mesh.send(None, b"hello mesh")?;
//!
//! // React to traffic addressed to us.
//! if let Ok(MeshEvent::Received { source, payload }) = mesh.events().recv() {
//!     println!("{} sent {} bytes", source, payload.len());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod addr;
pub mod config;
pub mod error;
pub mod event;
pub mod link;
pub mod wire;

mod engine;
mod mesh;
mod queue;
mod table;

// Re-export main types
pub use addr::{MacAddr, ParseMacError};
pub use config::{Config, LinkInterface};
pub use error::{MeshError, MeshResult};
pub use event::{MeshEvent, SendStatus};
pub use link::{LinkDriver, LinkError, LinkPort};
pub use mesh::Mesh;
pub use table::Route;
pub use wire::{Frame, FrameKind, MessageId, NetworkId, WireError, PAYLOAD_CAP, WIRE_LEN};
