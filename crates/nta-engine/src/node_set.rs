//! Enabled-node set of a region.

use crate::error::{Error, Result};

/// One enabled flag per node index in `0..capacity`.
///
/// Computation bodies may prune nodes through
/// [`crate::RegionIo::enabled_nodes_mut`]; the network only reads it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeSet {
    enabled: Vec<bool>,
    len: usize,
}

impl NodeSet {
    /// All nodes enabled.
    pub fn all_on(capacity: usize) -> Self {
        Self {
            enabled: vec![true; capacity],
            len: capacity,
        }
    }

    pub fn all_off(capacity: usize) -> Self {
        Self {
            enabled: vec![false; capacity],
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.enabled.len()
    }

    pub fn set_all_on(&mut self) {
        self.enabled.fill(true);
        self.len = self.enabled.len();
    }

    pub fn set_all_off(&mut self) {
        self.enabled.fill(false);
        self.len = 0;
    }

    pub fn add(&mut self, node: usize) -> Result<()> {
        self.set(node, true)
    }

    pub fn remove(&mut self, node: usize) -> Result<()> {
        self.set(node, false)
    }

    pub fn contains(&self, node: usize) -> bool {
        self.enabled.get(node).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Enabled node indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.enabled.iter().enumerate().filter(|&(_, &on)| on).map(|(node, _)| node)
    }

    fn set(&mut self, node: usize, on: bool) -> Result<()> {
        let capacity = self.enabled.len();
        let slot = self
            .enabled
            .get_mut(node)
            .ok_or_else(|| Error::index_out_of_range("enabled node", node, capacity))?;
        match (*slot, on) {
            (false, true) => self.len += 1,
            (true, false) => self.len -= 1,
            _ => {}
        }
        *slot = on;
        Ok(())
    }
}
