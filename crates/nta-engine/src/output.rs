//! Region output endpoint.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::array::Array;
use crate::error::{Error, Result};
use crate::types::BasicType;

/// Shared handle to an output buffer, held by every link reading from it.
pub type SharedArray = Arc<RwLock<Array>>;

/// Identifies a link leaving an output by its destination.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LinkKey {
    pub dest_region: String,
    pub dest_input: String,
}

/// Named, typed output of a region.
///
/// The buffer is sized once at initialization and only written by the owning
/// region's compute body.
#[derive(Debug)]
pub struct Output {
    name: String,
    region_name: String,
    region_level: bool,
    data: SharedArray,
    links: Vec<LinkKey>,
}

impl Output {
    pub(crate) fn new(region_name: &str, name: &str, data_type: BasicType, region_level: bool) -> Self {
        Self {
            name: name.to_string(),
            region_name: region_name.to_string(),
            region_level,
            data: Arc::new(RwLock::new(Array::new(data_type))),
            links: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn region_name(&self) -> &str {
        &self.region_name
    }

    pub fn is_region_level(&self) -> bool {
        self.region_level
    }

    pub fn element_type(&self) -> BasicType {
        self.data.read().element_type()
    }

    pub fn is_initialized(&self) -> bool {
        self.data.read().is_allocated()
    }

    /// Allocate and zero the buffer: `count` elements when region-level,
    /// else `count` per node. A second call keeps the existing buffer.
    pub(crate) fn initialize(&self, count: usize, node_count: usize) -> Result<()> {
        let mut data = self.data.write();
        if data.is_allocated() {
            return Ok(());
        }
        let total = if self.region_level {
            count
        } else {
            count.checked_mul(node_count).ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "output {}.{}: {count} elements for each of {node_count} nodes overflows",
                    self.region_name, self.name
                ))
            })?
        };
        data.allocate_buffer(total)?;
        tracing::trace!(region = %self.region_name, output = %self.name, elements = total, "output_allocated");
        Ok(())
    }

    pub(crate) fn uninitialize(&self) {
        self.data.write().release_buffer();
    }

    pub fn data(&self) -> RwLockReadGuard<'_, Array> {
        self.data.read()
    }

    pub fn data_mut(&self) -> RwLockWriteGuard<'_, Array> {
        self.data.write()
    }

    pub(crate) fn shared(&self) -> SharedArray {
        Arc::clone(&self.data)
    }

    pub fn has_outgoing_links(&self) -> bool {
        !self.links.is_empty()
    }

    pub fn links(&self) -> &[LinkKey] {
        &self.links
    }

    pub(crate) fn add_link(&mut self, key: LinkKey) {
        self.links.push(key);
    }

    pub(crate) fn remove_link(&mut self, key: &LinkKey) {
        self.links.retain(|existing| existing != key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_node_allocation() -> Result<()> {
        let output = Output::new("level1", "bottomUpOut", BasicType::Real64, false);
        assert!(!output.is_initialized());
        output.initialize(2, 8)?;
        assert_eq!(output.data().count(), 16);

        // idempotent
        output.initialize(5, 8)?;
        assert_eq!(output.data().count(), 16);
        Ok(())
    }

    #[test]
    fn oversized_allocation_is_rejected() {
        let output = Output::new("r", "bottomUpOut", BasicType::Byte, false);
        let result = output.initialize(usize::MAX, 2);
        assert!(matches!(result, Err(Error::InvalidArgument(msg)) if msg.contains("r.bottomUpOut")));
        assert!(!output.is_initialized());
    }

    #[test]
    fn region_level_allocation() -> Result<()> {
        let output = Output::new("r", "summary", BasicType::UInt32, true);
        output.initialize(3, 100)?;
        assert_eq!(output.data().count(), 3);
        assert_eq!(output.data().as_slice::<u32>()?, &[0, 0, 0]);
        Ok(())
    }

    #[test]
    fn tracks_outgoing_links() {
        let mut output = Output::new("a", "out", BasicType::Byte, false);
        let key = LinkKey {
            dest_region: "b".to_string(),
            dest_input: "in".to_string(),
        };
        output.add_link(key.clone());
        assert!(output.has_outgoing_links());
        output.remove_link(&key);
        assert!(!output.has_outgoing_links());
    }
}
