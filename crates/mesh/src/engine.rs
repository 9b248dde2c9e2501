//! The message-processing engine: a single-consumer state machine.
//!
//! One worker consumes the work queue and drives every frame through
//! its lifecycle: outbound transmission (with on-demand route
//! discovery), inbound dispatch by kind, and the two parked states
//! waiting for a route or an end-to-end confirmation. The route table
//! and the confirm log are owned by the worker outright; only the
//! seen-id window is shared with the receive callback, behind its
//! mutex. The worker blocks in exactly two places: the queue receive
//! and the bounded wait for a link send completion.

use crate::addr::MacAddr;
use crate::config::Config;
use crate::event::{EventSink, MeshEvent, SendStatus};
use crate::link::{LinkDriver, SendOutcome, SendSignal};
use crate::queue::{Stage, WorkItem, WorkQueue};
use crate::table::{ConfirmLog, RouteTable, SeenIds};
use crate::wire::{self, ConfirmFrame, Frame, FrameKind, ProbeFrame};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Bound on waiting for the link's send-completion callback.
pub(crate) const LINK_WAIT: Duration = Duration::from_millis(50);

/// State reachable from the worker, the link callbacks, and the
/// producer-facing handle.
pub(crate) struct Shared {
    pub config: Config,
    pub self_mac: MacAddr,
    pub queue: Arc<WorkQueue>,
    pub seen: Arc<Mutex<SeenIds>>,
    pub signal: Arc<SendSignal>,
    pub driver: Arc<dyn LinkDriver>,
    pub events: EventSink,
}

/// The worker. Owns the tables only the processing loop may touch.
pub(crate) struct Engine {
    shared: Arc<Shared>,
    routes: RouteTable,
    confirms: ConfirmLog,
}

impl Engine {
    pub fn new(shared: Arc<Shared>) -> Self {
        let routes = RouteTable::new(shared.config.route_table_size);
        let confirms = ConfirmLog::new(shared.config.queue_size);
        Self { shared, routes, confirms }
    }

    /// Consume the queue until it is closed.
    pub fn run(mut self) {
        while let Some(item) = self.shared.queue.recv() {
            self.step(item);
        }
        debug!("mesh worker stopped");
    }

    fn step(&mut self, item: WorkItem) {
        match item.stage {
            Stage::ToSend => self.handle_to_send(item.frame),
            Stage::OnRecv { via } => self.handle_on_recv(item.frame, via),
            Stage::WaitRoute { since } => self.handle_wait_route(item.frame, since),
            Stage::WaitReply { since } => self.handle_wait_reply(item.frame, since),
        }
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    fn handle_to_send(&mut self, frame: Frame) {
        let self_mac = self.shared.self_mac;
        let next_hop = match frame.kind() {
            FrameKind::Broadcast | FrameKind::RouteRequest | FrameKind::RouteReply => {
                if frame.source() == self_mac {
                    // Flood origin: remember our own id so the mesh
                    // echo cannot re-admit it.
                    self.shared.seen.lock().unwrap().insert(frame.id());
                }
                MacAddr::BROADCAST
            }
            FrameKind::Unicast | FrameKind::Confirm => {
                match self.routes.next_hop(frame.target()) {
                    Some(via) => via,
                    None => {
                        self.begin_route_discovery(frame);
                        return;
                    }
                }
            }
        };
        self.transmit(frame, next_hop);
    }

    /// Park the frame until a route appears and flood a probe for its
    /// target. No transmission of the parked frame happens here.
    fn begin_route_discovery(&mut self, frame: Frame) {
        let target = frame.target();
        debug!("no route to {target}, probing");
        let parked = WorkItem { stage: Stage::WaitRoute { since: Instant::now() }, frame };
        if self.shared.queue.push_back(parked).is_err() {
            warn!("work queue full, dropping frame awaiting route to {target}");
            return;
        }
        let probe = Frame::RouteRequest(ProbeFrame {
            id: wire::fresh_message_id(),
            source: self.shared.self_mac,
            target,
        });
        let item = WorkItem { stage: Stage::ToSend, frame: probe };
        if self.shared.queue.push_front(item).is_err() {
            warn!("work queue full, dropping route probe for {target}");
        }
    }

    fn transmit(&mut self, frame: Frame, next_hop: MacAddr) {
        let shared = Arc::clone(&self.shared);
        if let Err(err) = shared.driver.add_peer(next_hop) {
            warn!("cannot register next hop {next_hop}: {err}");
            return;
        }
        let bytes = frame.encode(shared.config.network_id);
        let mut outcome = SendOutcome::Fail;
        for attempt in 1..=shared.config.send_attempts {
            shared.signal.reset();
            outcome = match shared.driver.transmit(next_hop, &bytes) {
                Ok(()) => shared.signal.wait(LINK_WAIT),
                Err(err) => {
                    debug!("transmit to {next_hop} rejected: {err}");
                    SendOutcome::Fail
                }
            };
            if outcome == SendOutcome::Success {
                break;
            }
            debug!(
                "transmit {:#010x} to {next_hop} attempt {attempt}/{}: {outcome:?}",
                frame.id(),
                shared.config.send_attempts
            );
        }
        shared.driver.del_peer(next_hop);
        if outcome == SendOutcome::Success {
            self.after_send_success(frame);
        } else {
            self.after_send_failure(frame, next_hop);
        }
    }

    fn after_send_success(&mut self, frame: Frame) {
        if frame.source() != self.shared.self_mac {
            // Relay duty done; nothing to report.
            return;
        }
        match frame {
            Frame::Broadcast(data) => {
                self.shared.events.emit(MeshEvent::Sent {
                    peer: data.target,
                    id: data.id,
                    status: SendStatus::Success,
                });
            }
            frame @ Frame::Unicast(_) => {
                // Success is end-to-end; park until the confirm shows up.
                let item = WorkItem { stage: Stage::WaitReply { since: Instant::now() }, frame };
                if self.shared.queue.push_back(item).is_err() {
                    warn!("work queue full, dropping confirmation wait");
                }
            }
            Frame::Confirm(_) | Frame::RouteRequest(_) | Frame::RouteReply(_) => {}
        }
    }

    fn after_send_failure(&mut self, frame: Frame, next_hop: MacAddr) {
        if next_hop == MacAddr::BROADCAST {
            // Failed floods vanish without a trace.
            return;
        }
        // The cached next hop just failed at the link; forget it before
        // any retry can use it again.
        let target = frame.target();
        if self.routes.invalidate(target) {
            debug!("invalidated route to {target} via {next_hop}");
        }
        self.begin_route_discovery(frame);
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    fn handle_on_recv(&mut self, frame: Frame, via: MacAddr) {
        let self_mac = self.shared.self_mac;
        match frame {
            Frame::Broadcast(ref data) => {
                // Deliver to the host before re-flooding.
                self.shared.events.emit(MeshEvent::Received {
                    source: data.source,
                    payload: data.payload.clone(),
                });
                self.requeue_to_send(frame);
            }
            Frame::Unicast(data) => {
                if data.target == self_mac {
                    let confirm = Frame::Confirm(ConfirmFrame {
                        id: wire::fresh_message_id(),
                        source: self_mac,
                        target: data.source,
                        confirm_id: data.id,
                    });
                    self.shared.events.emit(MeshEvent::Received {
                        source: data.source,
                        payload: data.payload,
                    });
                    let item = WorkItem { stage: Stage::ToSend, frame: confirm };
                    if self.shared.queue.push_front(item).is_err() {
                        warn!("work queue full, dropping delivery confirmation");
                    }
                } else {
                    self.requeue_to_send(Frame::Unicast(data));
                }
            }
            Frame::Confirm(confirm) => {
                if confirm.target == self_mac {
                    self.confirms.push(confirm.confirm_id);
                } else {
                    self.requeue_to_send(Frame::Confirm(confirm));
                }
            }
            Frame::RouteRequest(probe) => {
                // The requester is reachable through whoever handed us
                // the probe.
                self.routes.insert(probe.source, via);
                if probe.target == self_mac {
                    let reply = Frame::RouteReply(ProbeFrame {
                        id: wire::fresh_message_id(),
                        source: self_mac,
                        target: probe.source,
                    });
                    let item = WorkItem { stage: Stage::ToSend, frame: reply };
                    if self.shared.queue.push_front(item).is_err() {
                        warn!("work queue full, dropping route reply");
                    }
                } else {
                    self.requeue_to_send(Frame::RouteRequest(probe));
                }
            }
            Frame::RouteReply(probe) => {
                self.routes.insert(probe.source, via);
                if probe.target != self_mac {
                    self.requeue_to_send(Frame::RouteReply(probe));
                }
            }
        }
    }

    fn requeue_to_send(&self, frame: Frame) {
        if self.shared.queue.push_back(WorkItem { stage: Stage::ToSend, frame }).is_err() {
            warn!("work queue full, dropping relay");
        }
    }

    // ------------------------------------------------------------------
    // Parked states
    // ------------------------------------------------------------------

    fn handle_wait_route(&mut self, frame: Frame, since: Instant) {
        if self.routes.next_hop(frame.target()).is_some() {
            self.requeue_to_send(frame);
            return;
        }
        if since.elapsed() > self.shared.config.max_waiting_time {
            let target = frame.target();
            debug!("route discovery for {target} timed out");
            if frame.source() == self.shared.self_mac {
                self.shared.events.emit(MeshEvent::Sent {
                    peer: target,
                    id: frame.id(),
                    status: SendStatus::Fail,
                });
            }
            return;
        }
        let item = WorkItem { stage: Stage::WaitRoute { since }, frame };
        if self.shared.queue.push_back(item).is_err() {
            warn!("work queue full, dropping route wait");
        }
    }

    fn handle_wait_reply(&mut self, frame: Frame, since: Instant) {
        if self.confirms.take(frame.id()) {
            self.shared.events.emit(MeshEvent::Sent {
                peer: frame.target(),
                id: frame.id(),
                status: SendStatus::Success,
            });
            return;
        }
        if since.elapsed() > self.shared.config.max_waiting_time {
            debug!("confirmation for {:#010x} timed out", frame.id());
            if frame.source() == self.shared.self_mac {
                self.shared.events.emit(MeshEvent::Sent {
                    peer: frame.target(),
                    id: frame.id(),
                    status: SendStatus::Fail,
                });
            }
            return;
        }
        let item = WorkItem { stage: Stage::WaitReply { since }, frame };
        if self.shared.queue.push_back(item).is_err() {
            warn!("work queue full, dropping confirmation wait");
        }
    }
}
