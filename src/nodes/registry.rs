//! Bounded node pool.
//!
//! A fixed array of slots indexed `1..=max_nodes`. Admission scans for the
//! leftmost empty slot, which concentrates reuse at low IDs and keeps the
//! operator's mental map small. Lookups and broadcast take the lock shared;
//! acquire and release take it exclusive.

use std::sync::{Arc, RwLock};

use log::debug;
use thiserror::Error;

use super::Node;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Every slot is occupied.
    #[error("system full")]
    SystemFull,
}

pub struct NodeRegistry {
    max_nodes: usize,
    slots: RwLock<Vec<Option<Arc<Node>>>>,
}

impl NodeRegistry {
    /// Create a registry with `max_nodes` slots; non-positive requests fall
    /// back to 10.
    pub fn new(max_nodes: usize) -> Self {
        let max_nodes = if max_nodes == 0 { 10 } else { max_nodes };
        NodeRegistry {
            max_nodes,
            slots: RwLock::new(vec![None; max_nodes]),
        }
    }

    pub fn capacity(&self) -> usize {
        self.max_nodes
    }

    /// Claim the first free slot.
    pub fn acquire(&self) -> Result<Arc<Node>, RegistryError> {
        let mut slots = self.slots.write().expect("registry lock poisoned");
        for (i, slot) in slots.iter_mut().enumerate() {
            if slot.is_none() {
                let node = Arc::new(Node::new(i + 1));
                *slot = Some(node.clone());
                debug!("node acquired id={}", node.id);
                return Ok(node);
            }
        }
        Err(RegistryError::SystemFull)
    }

    /// Free a slot by node id. Out-of-range ids are ignored.
    pub fn release(&self, id: usize) {
        if id < 1 || id > self.max_nodes {
            return;
        }
        let mut slots = self.slots.write().expect("registry lock poisoned");
        slots[id - 1] = None;
        debug!("node released id={id}");
    }

    pub fn get(&self, id: usize) -> Option<Arc<Node>> {
        if id < 1 || id > self.max_nodes {
            return None;
        }
        let slots = self.slots.read().expect("registry lock poisoned");
        slots[id - 1].clone()
    }

    /// Number of occupied slots.
    pub fn active(&self) -> usize {
        let slots = self.slots.read().expect("registry lock poisoned");
        slots.iter().filter(|s| s.is_some()).count()
    }

    /// Send `msg` to every connected node. Per-node send failures are
    /// swallowed; a dead peer will be reaped by its own session.
    pub async fn broadcast(&self, msg: &str) {
        self.broadcast_except(msg, 0).await;
    }

    /// Like [`broadcast`](Self::broadcast) but skipping `except_id`.
    pub async fn broadcast_except(&self, msg: &str, except_id: usize) {
        // Snapshot connections under the shared lock, then send without it.
        let conns: Vec<_> = {
            let slots = self.slots.read().expect("registry lock poisoned");
            slots
                .iter()
                .flatten()
                .filter(|n| n.id != except_id)
                .filter_map(|n| n.connection())
                .collect()
        };
        for conn in conns {
            let _ = conn.send_line(msg).await;
        }
    }
}
