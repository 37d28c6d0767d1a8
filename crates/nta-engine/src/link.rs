//! Directed data channel from one region output to one region input.
//!
//! A link moves through three states:
//!
//! ```text
//! described    names and routing policy only        Link::new
//! connected    bound to the source output buffer    Link::connect
//! initialized  destination offset assigned          Link::initialize
//! ```
//!
//! Only an initialized link can contribute a splitter map or copy data.

use std::fmt;
use std::time::Instant;

use crate::array::Array;
use crate::dimensions::Dimensions;
use crate::error::{Error, Result};
use crate::input::Input;
use crate::link_policy::{LinkPolicy, SplitterMap};
use crate::output::{LinkKey, Output, SharedArray};
use crate::types::BasicType;

/// Endpoint binding established by [`Link::connect`].
struct Binding {
    src: SharedArray,
    element_type: BasicType,
    src_region_level: bool,
    dest_region_level: bool,
}

pub struct Link {
    link_type: String,
    params: String,
    src_region: String,
    src_output: String,
    dest_region: String,
    dest_input: String,
    policy: Box<dyn LinkPolicy>,
    binding: Option<Binding>,
    dest_offset: usize,
    src_count: usize,
    initialized: bool,
}

impl Link {
    pub fn new(
        link_type: &str,
        params: &str,
        src_region: &str,
        src_output: &str,
        dest_region: &str,
        dest_input: &str,
        policy: Box<dyn LinkPolicy>,
    ) -> Self {
        Self {
            link_type: link_type.to_string(),
            params: params.to_string(),
            src_region: src_region.to_string(),
            src_output: src_output.to_string(),
            dest_region: dest_region.to_string(),
            dest_input: dest_input.to_string(),
            policy,
            binding: None,
            dest_offset: 0,
            src_count: 0,
            initialized: false,
        }
    }

    /// Bind to the live endpoints. Dimensions are not touched.
    pub fn connect(&mut self, src: &Output, dest: &Input) -> Result<()> {
        if src.region_name() != self.src_region || src.name() != self.src_output {
            return Err(Error::InvalidArgument(format!(
                "link {self} cannot connect to output {}.{}",
                src.region_name(),
                src.name()
            )));
        }
        if dest.region_name() != self.dest_region || dest.name() != self.dest_input {
            return Err(Error::InvalidArgument(format!(
                "link {self} cannot connect to input {}.{}",
                dest.region_name(),
                dest.name()
            )));
        }
        if src.element_type() != dest.element_type() {
            return Err(Error::InvalidArgument(format!(
                "link {self}: output type {} does not match input type {}",
                src.element_type(),
                dest.element_type()
            )));
        }

        self.binding = Some(Binding {
            src: src.shared(),
            element_type: src.element_type(),
            src_region_level: src.is_region_level(),
            dest_region_level: dest.is_region_level(),
        });
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.binding.is_some()
    }

    /// Assign the destination offset and initialize the routing policy.
    ///
    /// `src_region_dims`/`dest_region_dims` are the dimensions of the regions
    /// at either end; the link's own endpoint dimensions must agree with them.
    pub fn initialize(
        &mut self,
        dest_offset: usize,
        src_region_dims: &Dimensions,
        dest_region_dims: &Dimensions,
    ) -> Result<()> {
        let binding = self.binding()?;
        let (src_level, dest_level) = (binding.src_region_level, binding.dest_region_level);
        let src_count = binding.src.read().count();

        let (src_dims, dest_dims) = (self.policy.src_dimensions(), self.policy.dest_dimensions());
        if src_dims.is_unspecified() || dest_dims.is_unspecified() {
            return Err(Error::NotInitialized(format!(
                "link {} has unresolved dimensions (source {src_dims}, destination {dest_dims})",
                self.describe(src_region_dims, dest_region_dims)
            )));
        }
        for (side, link_dims, region_dims, region_level) in [
            ("source", src_dims, src_region_dims, src_level),
            ("destination", dest_dims, dest_region_dims, dest_level),
        ] {
            if !endpoint_matches(link_dims, region_dims, region_level) {
                return Err(Error::InvalidState(format!(
                    "link {} has {side} dimensions {link_dims} which do not match the region dimensions {region_dims}",
                    self.describe(src_region_dims, dest_region_dims)
                )));
            }
        }

        self.policy.initialize()?;
        self.dest_offset = dest_offset;
        self.src_count = src_count;
        self.initialized = true;
        if src_count == 0 {
            tracing::warn!(link = %self, "link_carries_no_elements");
        }
        Ok(())
    }

    pub(crate) fn uninitialize(&mut self) {
        self.initialized = false;
        self.dest_offset = 0;
        self.src_count = 0;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Append this link's contribution to `map`, shifted by the destination
    /// offset.
    pub fn build_splitter_map(&self, map: &mut SplitterMap) -> Result<()> {
        if !self.initialized {
            return Err(Error::NotInitialized(format!("splitter map requested for link {self}")));
        }
        let mut proto: SplitterMap = vec![Vec::new(); map.len()];
        self.policy.build_proto_splitter_map(&mut proto)?;

        for (entry, contribution) in map.iter_mut().zip(proto) {
            entry.extend(contribution.into_iter().map(|offset| offset + self.dest_offset));
        }
        Ok(())
    }

    /// Copy the source buffer into `dest` at the destination offset.
    /// Returns the number of bytes copied.
    pub fn compute(&self, dest: &mut Array) -> Result<usize> {
        if !self.initialized {
            return Err(Error::NotInitialized(format!("link {self} must be initialized before compute")));
        }
        let binding = self.binding()?;
        if dest.element_type() != binding.element_type {
            return Err(Error::TypeMismatch {
                expected: binding.element_type.name().to_string(),
                actual: dest.element_type().name().to_string(),
            });
        }

        let started = Instant::now();
        let src = binding.src.read();
        let element_size = binding.element_type.size();
        let count = self.src_count.min(src.count());
        let overflow = || Error::InvalidArgument(format!("link {self}: copy size overflows"));
        let len = count.checked_mul(element_size).ok_or_else(overflow)?;
        let start = self.dest_offset.checked_mul(element_size).ok_or_else(overflow)?;
        let end = start.checked_add(len).ok_or_else(overflow)?;

        let dest_bytes = dest.as_bytes_mut();
        if end > dest_bytes.len() {
            return Err(Error::BufferSizeMismatch {
                expected: end,
                actual: dest_bytes.len(),
            });
        }
        dest_bytes[start..end].copy_from_slice(&src.as_bytes()[..len]);

        if nta_tracing::performance::enabled() {
            nta_tracing::performance::record_link_copy(
                &self.to_string(),
                len,
                started.elapsed().as_micros() as u64,
            );
        }
        Ok(len)
    }

    fn binding(&self) -> Result<&Binding> {
        self.binding
            .as_ref()
            .ok_or_else(|| Error::NotInitialized(format!("link {self} is not connected")))
    }

    pub fn link_type(&self) -> &str {
        &self.link_type
    }

    pub fn params(&self) -> &str {
        &self.params
    }

    pub fn src_region(&self) -> &str {
        &self.src_region
    }

    pub fn src_output(&self) -> &str {
        &self.src_output
    }

    pub fn dest_region(&self) -> &str {
        &self.dest_region
    }

    pub fn dest_input(&self) -> &str {
        &self.dest_input
    }

    pub fn dest_offset(&self) -> usize {
        self.dest_offset
    }

    /// Source element count cached at initialization.
    pub fn src_count(&self) -> usize {
        self.src_count
    }

    pub(crate) fn key(&self) -> LinkKey {
        LinkKey {
            dest_region: self.dest_region.clone(),
            dest_input: self.dest_input.clone(),
        }
    }

    pub(crate) fn is_src_region_level(&self) -> bool {
        self.binding.as_ref().is_some_and(|b| b.src_region_level)
    }

    pub(crate) fn is_dest_region_level(&self) -> bool {
        self.binding.as_ref().is_some_and(|b| b.dest_region_level)
    }

    pub fn src_dimensions(&self) -> &Dimensions {
        self.policy.src_dimensions()
    }

    pub fn dest_dimensions(&self) -> &Dimensions {
        self.policy.dest_dimensions()
    }

    pub(crate) fn set_src_dimensions(&mut self, dims: &Dimensions) -> Result<()> {
        self.policy.set_src_dimensions(dims).map_err(|e| self.context(e))
    }

    pub(crate) fn set_dest_dimensions(&mut self, dims: &Dimensions) -> Result<()> {
        self.policy.set_dest_dimensions(dims).map_err(|e| self.context(e))
    }

    pub(crate) fn set_node_output_element_count(&mut self, count: usize) {
        self.policy.set_node_output_element_count(count);
    }

    fn context(&self, err: Error) -> Error {
        match err {
            Error::InvalidArgument(msg) => Error::InvalidArgument(format!("link {self}: {msg}")),
            other => other,
        }
    }

    /// Long form including the dimensions of both regions.
    pub fn describe(&self, src_region_dims: &Dimensions, dest_region_dims: &Dimensions) -> String {
        format!(
            "[{}.{} (region dims: {src_region_dims})  to {}.{} (region dims: {dest_region_dims})  type: {}]",
            self.src_region, self.src_output, self.dest_region, self.dest_input, self.link_type
        )
    }
}

/// A link endpoint agrees with its region when the dimensions are equal, or
/// both are all ones, or the endpoint is region-level and all ones.
pub(crate) fn endpoint_matches(link_dims: &Dimensions, region_dims: &Dimensions, region_level: bool) -> bool {
    if link_dims.is_dont_care() {
        return true;
    }
    if region_level || region_dims.is_ones() {
        return link_dims.is_ones();
    }
    link_dims == region_dims
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}.{} to {}.{} type: {}]",
            self.src_region, self.src_output, self.dest_region, self.dest_input, self.link_type
        )
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("link", &self.to_string())
            .field("src_dimensions", self.policy.src_dimensions())
            .field("dest_dimensions", self.policy.dest_dimensions())
            .field("dest_offset", &self.dest_offset)
            .field("initialized", &self.initialized)
            .finish()
    }
}
