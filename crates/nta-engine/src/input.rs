//! Region input endpoint.
//!
//! An input's buffer is the concatenation of every incoming link's source
//! buffer, in the order the links were added:
//!
//! ```text
//! link 0: level1.out (64 elements)   -> offsets  0..64
//! link 1: other.out  (16 elements)   -> offsets 64..80
//! ```
//!
//! The splitter map names, for each node of the owning region, the offsets
//! in that buffer feeding it. Link 0's offsets always precede link 1's.

use std::ops::Range;

use nta_tracing::performance::{self, PerformanceSpan};

use crate::array::Array;
use crate::dimensions::Dimensions;
use crate::error::{Error, Result};
use crate::link::Link;
use crate::link_policy::SplitterMap;
use crate::negotiate::{evaluate_link, DimensionTable};
use crate::types::{BasicType, Element};

#[derive(Debug)]
pub struct Input {
    name: String,
    region_name: String,
    region_level: bool,
    data: Array,
    links: Vec<Link>,
    splitter_map: SplitterMap,
    initialized: bool,
}

impl Input {
    pub(crate) fn new(region_name: &str, name: &str, data_type: BasicType, region_level: bool) -> Self {
        Self {
            name: name.to_string(),
            region_name: region_name.to_string(),
            region_level,
            data: Array::new(data_type),
            links: Vec::new(),
            splitter_map: SplitterMap::new(),
            initialized: false,
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
        self.data.element_type()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Attach a connected link. A second link from the same output is rejected.
    pub(crate) fn add_link(&mut self, link: Link) -> Result<()> {
        if self.initialized {
            return Err(Error::InvalidState(format!(
                "cannot add link {link} to initialized input {}.{}",
                self.region_name, self.name
            )));
        }
        if self.find_link(link.src_region(), link.src_output()).is_some() {
            return Err(Error::InvalidArgument(format!(
                "input {}.{} already has a link from {}.{}",
                self.region_name,
                self.name,
                link.src_region(),
                link.src_output()
            )));
        }
        self.links.push(link);
        Ok(())
    }

    pub fn find_link(&self, src_region: &str, src_output: &str) -> Option<&Link> {
        self.links
            .iter()
            .find(|link| link.src_region() == src_region && link.src_output() == src_output)
    }

    /// Detach the link from `src_region.src_output`.
    pub(crate) fn remove_link(&mut self, src_region: &str, src_output: &str) -> Result<Link> {
        if self.initialized {
            return Err(Error::InvalidState(format!(
                "cannot remove a link from initialized input {}.{}",
                self.region_name, self.name
            )));
        }
        let position = self
            .links
            .iter()
            .position(|link| link.src_region() == src_region && link.src_output() == src_output)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "no link from {src_region}.{src_output} to {}.{}",
                    self.region_name, self.name
                ))
            })?;
        Ok(self.links.remove(position))
    }

    /// Evaluate every link once; returns how many are still incomplete.
    pub(crate) fn evaluate_links(&mut self, table: &mut DimensionTable) -> Result<usize> {
        if self.initialized {
            return Ok(0);
        }
        let mut incomplete = 0;
        for link in &mut self.links {
            if !evaluate_link(link, table)? {
                incomplete += 1;
            }
        }
        Ok(incomplete)
    }

    /// Assign link offsets, allocate the zeroed buffer and build the
    /// splitter map. Source outputs must already be allocated.
    pub(crate) fn initialize(&mut self, region_dims: &Dimensions, table: &DimensionTable) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        if !region_dims.is_specified() {
            return Err(Error::InvalidState(format!(
                "input {}.{} initialized while the region dimensions are {region_dims}",
                self.region_name, self.name
            )));
        }

        let mut count = 0;
        for link in &mut self.links {
            let src_dims = table.dimensions(link.src_region())?;
            link.initialize(count, src_dims, region_dims)?;
            count += link.src_count();
        }
        self.data.release_buffer();
        self.data.allocate_buffer(count)?;

        let nodes = if self.region_level { 1 } else { region_dims.count()? };
        let mut map: SplitterMap = vec![Vec::new(); nodes];
        for link in &self.links {
            let before: Vec<usize> = map.iter().map(Vec::len).collect();
            link.build_splitter_map(&mut map)?;
            check_contribution(link, &map, &before)?;
        }
        self.splitter_map = map;
        self.initialized = true;

        tracing::trace!(
            region = %self.region_name,
            input = %self.name,
            links = self.links.len(),
            elements = count,
            "input_initialized"
        );
        Ok(())
    }

    /// Release the buffer and splitter map. The owning region must be
    /// uninitialized.
    pub(crate) fn uninitialize(&mut self) {
        if !self.initialized {
            return;
        }
        self.initialized = false;
        self.data.release_buffer();
        self.splitter_map.clear();
        for link in &mut self.links {
            link.uninitialize();
        }
    }

    pub fn splitter_map(&self) -> Result<&SplitterMap> {
        self.check_initialized()?;
        Ok(&self.splitter_map)
    }

    /// The values feeding `node`, in splitter-map order.
    pub fn get_input_for_node<T: Element>(&self, node: usize) -> Result<Vec<T>> {
        self.check_initialized()?;
        let offsets = self.splitter_map.get(node).ok_or_else(|| {
            Error::index_out_of_range(
                format!("node of input {}.{}", self.region_name, self.name),
                node,
                self.splitter_map.len(),
            )
        })?;
        let values = self.data.as_slice::<T>()?;
        offsets
            .iter()
            .map(|&offset| {
                values
                    .get(offset)
                    .copied()
                    .ok_or_else(|| Error::index_out_of_range("input element", offset, values.len()))
            })
            .collect()
    }

    /// Copy every link's source buffer into this input, in link order.
    pub fn prepare(&mut self) -> Result<()> {
        self.check_initialized()?;
        let _span = performance::enabled()
            .then(|| format!("prepare {}.{}", self.region_name, self.name))
            .and_then(PerformanceSpan::start);
        for link in &self.links {
            let bytes = link.compute(&mut self.data)?;
            tracing::trace!(link = %link, bytes, "link_copied");
        }
        Ok(())
    }

    pub fn data(&self) -> &Array {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array {
        &mut self.data
    }

    fn check_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(Error::NotInitialized(format!("input {}.{}", self.region_name, self.name)))
        }
    }
}

/// Every offset a link adds must fall inside its own slice of the buffer.
fn check_contribution(link: &Link, map: &SplitterMap, before: &[usize]) -> Result<()> {
    let own: Range<usize> = link.dest_offset()..link.dest_offset() + link.src_count();
    for (node, (entry, &start)) in map.iter().zip(before).enumerate() {
        if let Some(offset) = entry[start..].iter().find(|offset| !own.contains(offset)) {
            return Err(Error::InvalidState(format!(
                "link {link} maps offset {offset} into node {node}, outside its range {}..{}",
                own.start, own.end
            )));
        }
    }
    Ok(())
}
