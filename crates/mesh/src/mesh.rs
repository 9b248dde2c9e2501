//! The public engine handle.

use crate::addr::MacAddr;
use crate::config::Config;
use crate::engine::{Engine, Shared};
use crate::error::{MeshError, MeshResult};
use crate::event::{EventSink, MeshEvent};
use crate::link::{LinkDriver, LinkError, LinkPort, SendSignal};
use crate::queue::{QueueError, Stage, WorkItem, WorkQueue};
use crate::table::SeenIds;
use crate::wire::{self, DataFrame, Frame, MessageId, PAYLOAD_CAP, WIRE_LEN};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::info;

/// A running mesh node.
///
/// Created by [`Mesh::new`] over a host-supplied [`LinkDriver`].
/// Dropping the handle (or calling [`Mesh::shutdown`]) closes the work
/// queue and joins the worker.
pub struct Mesh {
    shared: Arc<Shared>,
    events: crossbeam_channel::Receiver<MeshEvent>,
    worker: Option<JoinHandle<()>>,
}

impl Mesh {
    /// Bring the engine up.
    ///
    /// Validates and captures the configuration first, then binds the
    /// configured interface to learn the local address, checks that our
    /// fixed frame fits the link MTU, and finally spawns the worker.
    /// On error nothing keeps running.
    pub fn new(config: Config, driver: Arc<dyn LinkDriver>) -> MeshResult<Mesh> {
        config.validate()?;
        let self_mac = driver.open(config.interface)?;
        let mtu = driver.mtu();
        if WIRE_LEN > mtu {
            return Err(LinkError::Mtu { need: WIRE_LEN, have: mtu }.into());
        }
        let queue = Arc::new(WorkQueue::new(config.queue_size));
        let seen = Arc::new(Mutex::new(SeenIds::new(config.id_cache_size)));
        let signal = Arc::new(SendSignal::default());
        let (events_tx, events_rx) = EventSink::channel();
        let port = LinkPort::new(
            config.network_id,
            config.queue_size,
            Arc::clone(&queue),
            Arc::clone(&seen),
            Arc::clone(&signal),
        );
        let shared = Arc::new(Shared {
            config,
            self_mac,
            queue,
            seen,
            signal,
            driver,
            events: events_tx,
        });
        shared.driver.attach(port);
        let engine = Engine::new(Arc::clone(&shared));
        let worker = thread::Builder::new()
            .name("weftnet-mesh".into())
            .stack_size(shared.config.worker_stack_size)
            .spawn(move || engine.run())
            .map_err(|err| MeshError::Internal(format!("cannot spawn mesh worker: {err}")))?;
        info!("mesh engine up as {self_mac}");
        Ok(Mesh { shared, events: events_rx, worker: Some(worker) })
    }

    /// This node's link address.
    pub fn local_mac(&self) -> MacAddr {
        self.shared.self_mac
    }

    /// The host-side event stream.
    pub fn events(&self) -> &crossbeam_channel::Receiver<MeshEvent> {
        &self.events
    }

    /// Queue a payload for delivery.
    ///
    /// `None` (or the broadcast address) floods to every reachable
    /// node; any other target is delivered reliably with an end-to-end
    /// confirmation. The returned id correlates with the eventual
    /// [`MeshEvent::Sent`]. Fails fast when the work queue is already
    /// over half full so outbound pressure cannot starve relaying.
    pub fn send(&self, target: Option<MacAddr>, payload: &[u8]) -> MeshResult<MessageId> {
        if payload.is_empty() {
            return Err(MeshError::InvalidArgument("payload must not be empty"));
        }
        if payload.len() > PAYLOAD_CAP {
            return Err(MeshError::InvalidArgument("payload exceeds frame capacity"));
        }
        let queue = &self.shared.queue;
        if queue.is_closed() {
            return Err(MeshError::NotRunning);
        }
        if queue.free_slots() < self.shared.config.queue_size / 2 {
            return Err(MeshError::Busy);
        }
        let id = wire::fresh_message_id();
        let source = self.shared.self_mac;
        let target = target.unwrap_or(MacAddr::BROADCAST);
        let frame = if target.is_broadcast() {
            Frame::Broadcast(DataFrame {
                id,
                source,
                target: MacAddr::BROADCAST,
                payload: payload.to_vec(),
            })
        } else {
            Frame::Unicast(DataFrame { id, source, target, payload: payload.to_vec() })
        };
        match queue.push_back(WorkItem { stage: Stage::ToSend, frame }) {
            Ok(()) => Ok(id),
            Err(QueueError::Closed) => Err(MeshError::NotRunning),
            Err(QueueError::Full) => {
                Err(MeshError::Internal("work queue enqueue timed out".into()))
            }
        }
    }

    /// Tear the engine down: close the queue and join the worker.
    pub fn shutdown(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        self.shared.queue.close();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for Mesh {
    fn drop(&mut self) {
        self.teardown();
    }
}
