//! In-memory mesh harness for the integration tests.
//!
//! A [`TestMesh`] is a set of cores wired through capturing radios and
//! an adjacency list. Nothing runs on timers: tests call [`TestMesh::pump`]
//! to shuttle captured transmissions until the mesh goes quiet, and
//! drive retry/gossip/GC passes directly with synthetic clocks.

use std::sync::Arc;

use amigo_cgka::member::Member;
use amigo_mesh::radio::Transmission;
use amigo_mesh::{ChannelRadio, Core, MeshConfig};

/// Delivery rounds before [`TestMesh::pump`] declares a broadcast storm.
const MAX_PUMP_ROUNDS: usize = 64;

/// One node: a core plus its capturing radio.
pub struct TestNode {
    pub core: Core,
    pub radio: Arc<ChannelRadio>,
}

impl TestNode {
    /// Build a node with an in-memory database and a fast test config.
    pub fn new(pseudonym: &str) -> Self {
        Self::with_config(pseudonym, test_config())
    }

    /// Build a node with an explicit config.
    pub fn with_config(pseudonym: &str, config: MeshConfig) -> Self {
        let conn = amigo_db::open_memory().expect("open in-memory db");
        let member = Member::create(pseudonym);
        let radio = Arc::new(ChannelRadio::new());
        let core = Core::new(conn, member, config, radio.clone());
        Self { core, radio }
    }
}

/// A config with pacing removed so pumps finish fast.
pub fn test_config() -> MeshConfig {
    let mut config = MeshConfig::default();
    config.relay.pacing_ms = 0;
    config
}

/// A set of nodes and the links between them.
pub struct TestMesh {
    pub nodes: Vec<TestNode>,
    links: Vec<(usize, usize)>,
}

impl TestMesh {
    /// Build a mesh from nodes and undirected links.
    pub fn new(nodes: Vec<TestNode>, links: &[(usize, usize)]) -> Self {
        Self {
            nodes,
            links: links.to_vec(),
        }
    }

    /// The device UUID node `to` sees node `from` under.
    pub fn device_uuid(from: usize) -> String {
        format!("node-{from}")
    }

    fn neighbors(&self, of: usize) -> Vec<usize> {
        self.links
            .iter()
            .filter_map(|&(a, b)| {
                if a == of {
                    Some(b)
                } else if b == of {
                    Some(a)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Shuttle captured transmissions between nodes until a full round
    /// produces none. Dedup at every node bounds this.
    pub async fn pump(&self) {
        for _ in 0..MAX_PUMP_ROUNDS {
            let mut delivered = false;
            for from in 0..self.nodes.len() {
                for transmission in self.nodes[from].radio.take_sent() {
                    delivered = true;
                    self.deliver(from, &transmission).await;
                }
            }
            if !delivered {
                return;
            }
        }
        panic!("mesh did not quiesce within {MAX_PUMP_ROUNDS} rounds");
    }

    /// Deliver one transmission according to the topology.
    pub async fn deliver(&self, from: usize, transmission: &Transmission) {
        match transmission {
            Transmission::Broadcast { bytes, blackout } => {
                for neighbor in self.neighbors(from) {
                    let sender_uuid = Self::device_uuid(from);
                    if blackout.contains(&Self::device_uuid(neighbor)) {
                        continue;
                    }
                    self.nodes[neighbor]
                        .core
                        .handle_inbound(bytes, &sender_uuid)
                        .await;
                }
            }
            Transmission::Direct { bytes, device_uuid } => {
                for neighbor in self.neighbors(from) {
                    if &Self::device_uuid(neighbor) == device_uuid {
                        self.nodes[neighbor]
                            .core
                            .handle_inbound(bytes, &Self::device_uuid(from))
                            .await;
                    }
                }
            }
        }
    }
}
