//! Engine configuration.
//!
//! All fields are validated once at init; an invalid config fails
//! [`crate::Mesh::new`] before anything is allocated or the link is
//! touched.

use crate::error::{MeshError, MeshResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which link-layer interface the engine binds.
///
/// The node's address depends on the chosen interface, so the config is
/// captured before the address is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LinkInterface {
    /// Station interface (default).
    #[default]
    Station,
    /// Access-point interface.
    AccessPoint,
}

/// Initial configuration of the mesh engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Administrative mesh discriminator; frames tagged with any other
    /// value are dropped silently. Must match across the whole network.
    pub network_id: u32,
    /// Work-queue capacity; also bounds the pending-confirm log.
    pub queue_size: usize,
    /// Upper bound on waiting for a route or a delivery confirmation.
    pub max_waiting_time: Duration,
    /// Capacity of the seen-message-id window. Recommended: planned
    /// node count plus some headroom.
    pub id_cache_size: usize,
    /// Capacity of the route table. Recommended: planned node count
    /// plus some headroom.
    pub route_table_size: usize,
    /// Link-level transmission attempts per next hop before the send is
    /// treated as failed.
    pub send_attempts: u32,
    /// Stack size of the worker thread.
    pub worker_stack_size: usize,
    /// Link interface to bind.
    pub interface: LinkInterface,
}

impl Config {
    /// Smallest usable work queue: room for an item in flight, its wait
    /// state, a synthesized probe, and the inbound reserve.
    pub const MIN_QUEUE_SIZE: usize = 4;

    /// Floor for the worker stack.
    pub const MIN_WORKER_STACK: usize = 16 * 1024;

    /// Check every field; an `Err` means init must not proceed.
    pub fn validate(&self) -> MeshResult<()> {
        if self.queue_size < Self::MIN_QUEUE_SIZE {
            return Err(MeshError::Config(format!(
                "queue_size {} below minimum {}",
                self.queue_size,
                Self::MIN_QUEUE_SIZE
            )));
        }
        if self.id_cache_size == 0 {
            return Err(MeshError::Config("id_cache_size must be nonzero".into()));
        }
        if self.route_table_size == 0 {
            return Err(MeshError::Config("route_table_size must be nonzero".into()));
        }
        if self.send_attempts == 0 {
            return Err(MeshError::Config("send_attempts must be nonzero".into()));
        }
        if self.worker_stack_size < Self::MIN_WORKER_STACK {
            return Err(MeshError::Config(format!(
                "worker_stack_size {} below minimum {}",
                self.worker_stack_size,
                Self::MIN_WORKER_STACK
            )));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network_id: 0xFAFB_FCFD,
            queue_size: 32,
            max_waiting_time: Duration::from_millis(1000),
            id_cache_size: 100,
            route_table_size: 100,
            send_attempts: 3,
            worker_stack_size: 64 * 1024,
            interface: LinkInterface::Station,
        }
    }
}
