//! Peer selection policies.

use crate::domain::config::RelayConfig;
use crate::domain::error::RelayError;
use rand::seq::SliceRandom;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Chooses the peer that will process a forwarded message.
///
/// Returns a base URL such as `http://localhost:3002`.
pub trait PeerSelector: Send + Sync {
    fn select(&self) -> Result<String, RelayError>;
}

/// Fixed topology where every member forwards to one of its siblings at
/// random.
#[derive(Debug, Clone)]
pub struct SiblingTopology {
    siblings: Vec<String>,
}

impl SiblingTopology {
    pub fn new(host: &str, local_port: u16, topology: &[u16]) -> Self {
        let siblings = if topology.contains(&local_port) {
            topology
                .iter()
                .filter(|p| **p != local_port)
                .map(|p| format!("http://{}:{}", host, p))
                .collect()
        } else {
            Vec::new()
        };
        Self { siblings }
    }

    pub fn siblings(&self) -> &[String] {
        &self.siblings
    }
}

impl PeerSelector for SiblingTopology {
    fn select(&self) -> Result<String, RelayError> {
        self.siblings
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| RelayError::NoPeerAvailable("local port is not in the topology".into()))
    }
}

/// Round-robin over an explicit peer list
#[derive(Debug)]
pub struct StaticPeers {
    peers: Vec<String>,
    next: AtomicUsize,
}

impl StaticPeers {
    pub fn new(peers: Vec<String>) -> Self {
        Self {
            peers,
            next: AtomicUsize::new(0),
        }
    }
}

impl PeerSelector for StaticPeers {
    fn select(&self) -> Result<String, RelayError> {
        if self.peers.is_empty() {
            return Err(RelayError::NoPeerAvailable("peer list is empty".into()));
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.peers.len();
        Ok(self.peers[index].clone())
    }
}

/// Build the selector described by the configuration.
///
/// Explicit peers win over the sibling topology.
pub fn selector_from_config(config: &RelayConfig) -> Box<dyn PeerSelector> {
    if config.peers.static_peers.is_empty() {
        Box::new(SiblingTopology::new(
            &config.peers.topology_host,
            config.http.port,
            &config.peers.topology,
        ))
    } else {
        Box::new(StaticPeers::new(config.peers.static_peers.clone()))
    }
}
