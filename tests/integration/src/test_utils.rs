//! In-memory radio fixtures for multi-node mesh scenarios.
//!
//! [`Air`] is a shared airspace; every [`Radio`] created in it is a
//! link endpoint with the same contract as a real broadcast radio:
//! unicast frames are acknowledged by the link (success only if the
//! registered peer is in range and powered), broadcast frames are
//! fire-and-forget. Topology is explicit: only connected radios hear
//! each other.

use crossbeam_channel::Receiver;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use weftnet_mesh::{
    Config, LinkDriver, LinkError, LinkInterface, LinkPort, MacAddr, Mesh, MeshEvent, SendStatus,
};

/// Test address `AA:00:00:00:00:0n`.
pub fn mac(n: u8) -> MacAddr {
    MacAddr::new([0xAA, 0x00, 0x00, 0x00, 0x00, n])
}

/// Engine config with waits short enough for scenario tests.
pub fn test_config() -> Config {
    Config {
        max_waiting_time: Duration::from_millis(300),
        ..Config::default()
    }
}

/// Install a compact tracing subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[derive(Default)]
struct AirState {
    ports: HashMap<MacAddr, LinkPort>,
    alive: HashMap<MacAddr, bool>,
    links: HashSet<(MacAddr, MacAddr)>,
}

/// Shared airspace wiring [`Radio`] endpoints together.
#[derive(Clone, Default)]
pub struct Air {
    state: Arc<Mutex<AirState>>,
}

fn ordered(a: MacAddr, b: MacAddr) -> (MacAddr, MacAddr) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl Air {
    /// A fresh, empty airspace.
    pub fn new() -> Air {
        Air::default()
    }

    /// Create a radio endpoint living in this airspace.
    pub fn radio(&self, mac: MacAddr) -> Arc<Radio> {
        self.state.lock().unwrap().alive.insert(mac, true);
        Arc::new(Radio {
            mac,
            air: self.clone(),
            peers: Mutex::new(HashSet::new()),
        })
    }

    /// Make two radios mutual neighbors.
    pub fn connect(&self, a: MacAddr, b: MacAddr) {
        self.state.lock().unwrap().links.insert(ordered(a, b));
    }

    /// Take a radio off the air, as if its node lost power.
    pub fn power_off(&self, mac: MacAddr) {
        self.state.lock().unwrap().alive.insert(mac, false);
    }
}

/// One in-memory link endpoint.
pub struct Radio {
    mac: MacAddr,
    air: Air,
    peers: Mutex<HashSet<MacAddr>>,
}

impl LinkDriver for Radio {
    fn open(&self, _interface: LinkInterface) -> Result<MacAddr, LinkError> {
        Ok(self.mac)
    }

    fn mtu(&self) -> usize {
        250
    }

    fn add_peer(&self, peer: MacAddr) -> Result<(), LinkError> {
        self.peers.lock().unwrap().insert(peer);
        Ok(())
    }

    fn del_peer(&self, peer: MacAddr) {
        self.peers.lock().unwrap().remove(&peer);
    }

    fn transmit(&self, peer: MacAddr, bytes: &[u8]) -> Result<(), LinkError> {
        if !self.peers.lock().unwrap().contains(&peer) {
            return Err(LinkError::Transmit(format!("peer {peer} not registered")));
        }
        // Snapshot receivers under the airspace lock, then deliver
        // outside it so admission never runs under the lock.
        let (targets, ok, own_port) = {
            let state = self.air.state.lock().unwrap();
            let own_port = state.ports.get(&self.mac).cloned();
            let self_alive = state.alive.get(&self.mac).copied().unwrap_or(false);
            if peer.is_broadcast() {
                let targets: Vec<LinkPort> = if self_alive {
                    state
                        .ports
                        .iter()
                        .filter(|(other, _)| {
                            **other != self.mac
                                && state.links.contains(&ordered(self.mac, **other))
                                && state.alive.get(*other).copied().unwrap_or(false)
                        })
                        .map(|(_, port)| port.clone())
                        .collect()
                } else {
                    Vec::new()
                };
                // broadcasts are unacknowledged: the link reports
                // success even into empty air
                (targets, true, own_port)
            } else {
                let reachable = self_alive
                    && state.links.contains(&ordered(self.mac, peer))
                    && state.alive.get(&peer).copied().unwrap_or(false);
                let targets = if reachable {
                    state.ports.get(&peer).cloned().into_iter().collect()
                } else {
                    Vec::new()
                };
                (targets, reachable, own_port)
            }
        };
        for port in &targets {
            port.frame_received(self.mac, bytes);
        }
        if let Some(port) = own_port {
            port.send_complete(peer, ok);
        }
        Ok(())
    }

    fn attach(&self, port: LinkPort) {
        self.air.state.lock().unwrap().ports.insert(self.mac, port);
    }
}

/// A full mesh node: engine plus radio in the shared airspace.
pub struct Node {
    /// The running engine.
    pub mesh: Mesh,
    /// The node's address.
    pub mac: MacAddr,
}

/// Bring up a node at `mac` in `air`.
pub fn spawn_node(air: &Air, mac: MacAddr, config: Config) -> Node {
    let radio = air.radio(mac);
    let mesh = Mesh::new(config, radio).expect("node must come up");
    Node { mesh, mac }
}

/// Raw frame injector: a radio endpoint with no engine behind it.
pub struct Injector {
    radio: Arc<Radio>,
}

impl Injector {
    /// Put an injector at `mac` into the airspace.
    pub fn new(air: &Air, mac: MacAddr) -> Self {
        Self { radio: air.radio(mac) }
    }

    /// Push raw bytes at a specific neighbor.
    pub fn inject(&self, to: MacAddr, bytes: &[u8]) {
        self.radio.add_peer(to).unwrap();
        self.radio.transmit(to, bytes).unwrap();
        self.radio.del_peer(to);
    }
}

/// Wait for the first event matching `pred`, draining everything else.
pub fn wait_for(
    events: &Receiver<MeshEvent>,
    timeout: Duration,
    mut pred: impl FnMut(&MeshEvent) -> bool,
) -> Option<MeshEvent> {
    let deadline = Instant::now() + timeout;
    loop {
        let now = Instant::now();
        if now >= deadline {
            return None;
        }
        match events.recv_timeout(deadline - now) {
            Ok(event) if pred(&event) => return Some(event),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}

/// Wait for the next payload delivery.
pub fn expect_received(events: &Receiver<MeshEvent>, timeout: Duration) -> (MacAddr, Vec<u8>) {
    match wait_for(events, timeout, |event| matches!(event, MeshEvent::Received { .. })) {
        Some(MeshEvent::Received { source, payload }) => (source, payload),
        _ => panic!("no payload arrived within {timeout:?}"),
    }
}

/// Wait for the next terminal send outcome.
pub fn expect_sent(events: &Receiver<MeshEvent>, timeout: Duration) -> (MacAddr, SendStatus) {
    match wait_for(events, timeout, |event| matches!(event, MeshEvent::Sent { .. })) {
        Some(MeshEvent::Sent { peer, status, .. }) => (peer, status),
        _ => panic!("no send outcome within {timeout:?}"),
    }
}

/// Assert that no payload delivery happens within `window`.
pub fn assert_no_received(events: &Receiver<MeshEvent>, window: Duration) {
    if let Some(event) = wait_for(events, window, |event| {
        matches!(event, MeshEvent::Received { .. })
    }) {
        panic!("unexpected delivery: {event:?}");
    }
}
