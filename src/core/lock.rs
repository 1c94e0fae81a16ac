//! C3 — one tree-topology lock plus one reader/writer lock per live node,
//! with a fixed acquisition order: topology, then parent, then child.

use crate::core::error::{CoreError, CoreResult};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

pub struct TreeLock {
    topology: RwLock<()>,
    nodes: RwLock<Vec<RwLock<()>>>,
    timeout: Duration,
}

pub struct TopologyReadGuard<'a>(#[allow(dead_code)] RwLockReadGuard<'a, ()>);
pub struct TopologyWriteGuard<'a>(#[allow(dead_code)] RwLockWriteGuard<'a, ()>);

impl TreeLock {
    pub fn new(timeout: Duration) -> Self {
        Self {
            topology: RwLock::new(()),
            nodes: RwLock::new(Vec::new()),
            timeout,
        }
    }

    /// Grows the per-node lock table in lockstep with the node array.
    /// Must be called under an exclusive topology hold whenever the array
    /// grows, so concurrent readers never see a shorter lock table than
    /// the node array they are indexing into.
    pub fn ensure_capacity(&self, len: usize) {
        let mut nodes = self.nodes.write();
        while nodes.len() < len {
            nodes.push(RwLock::new(()));
        }
    }

    pub fn topology_read(&self) -> CoreResult<TopologyReadGuard<'_>> {
        self.topology
            .try_read_for(self.timeout)
            .map(TopologyReadGuard)
            .ok_or(CoreError::LockTimeout)
    }

    pub fn topology_write(&self) -> CoreResult<TopologyWriteGuard<'_>> {
        self.topology
            .try_write_for(self.timeout)
            .map(TopologyWriteGuard)
            .ok_or(CoreError::LockTimeout)
    }

    pub fn node_read(&self, index: u32) -> CoreResult<NodeReadToken> {
        let nodes = self.nodes.read();
        let lock = nodes
            .get(index as usize)
            .ok_or(CoreError::NotFound)?;
        if lock.try_lock_shared_for(self.timeout) {
            Ok(NodeReadToken { index })
        } else {
            Err(CoreError::LockTimeout)
        }
    }

    pub fn node_write(&self, index: u32) -> CoreResult<NodeWriteToken> {
        let nodes = self.nodes.read();
        let lock = nodes
            .get(index as usize)
            .ok_or(CoreError::NotFound)?;
        if lock.try_lock_exclusive_for(self.timeout) {
            Ok(NodeWriteToken { index })
        } else {
            Err(CoreError::LockTimeout)
        }
    }

    pub fn unlock_read(&self, token: NodeReadToken) {
        let nodes = self.nodes.read();
        if let Some(lock) = nodes.get(token.index as usize) {
            unsafe { lock.force_unlock_read() };
        }
    }

    pub fn unlock_write(&self, token: NodeWriteToken) {
        let nodes = self.nodes.read();
        if let Some(lock) = nodes.get(token.index as usize) {
            unsafe { lock.force_unlock_write() };
        }
    }
}

/// Opaque proof that a node's lock is held in shared mode. Released via
/// `TreeLock::unlock_read`, keeping release-order (reverse of acquisition)
/// explicit at call sites the way the facade's multi-lock paths need.
#[derive(Debug, PartialEq, Eq)]
pub struct NodeReadToken {
    index: u32,
}

#[derive(Debug, PartialEq, Eq)]
pub struct NodeWriteToken {
    index: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_then_node_acquisition_order() {
        let lock = TreeLock::new(Duration::from_millis(200));
        lock.ensure_capacity(2);
        let _topo = lock.topology_read().unwrap();
        let parent = lock.node_read(0).unwrap();
        let child = lock.node_read(1).unwrap();
        lock.unlock_read(child);
        lock.unlock_read(parent);
    }

    #[test]
    fn write_lock_excludes_concurrent_write() {
        let lock = TreeLock::new(Duration::from_millis(50));
        lock.ensure_capacity(1);
        let _w = lock.node_write(0).unwrap();
        assert_eq!(lock.node_write(0), Err(CoreError::LockTimeout));
    }
}
