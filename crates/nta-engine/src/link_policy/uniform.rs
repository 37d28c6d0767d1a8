//! `UniformLink`: regular, optionally overlapping receptive fields.
//!
//! Each destination node reads a box of `rfSize` source nodes per dimension.
//! Neighbouring boxes advance by `rfSize - rfOverlap`:
//!
//! ```text
//! rfSize 3, rfOverlap 1, source extent 7
//!
//! src   0 1 2 3 4 5 6
//! d0   [0 1 2]
//! d1       [2 3 4]
//! d2           [4 5 6]
//! ```
//!
//! With `strict` (the default) the source extent must tile exactly. Without
//! it the destination extent is rounded down and the last destination node
//! along each dimension absorbs the leftover source nodes.

use serde::Deserialize;

use super::{check_map_len, LinkPolicy, SplitterMap};
use crate::dimensions::Dimensions;
use crate::error::{Error, Result};
use crate::params::ValueMap;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PerDimension {
    One(usize),
    Each(Vec<usize>),
}

impl PerDimension {
    fn into_vec(self) -> Vec<usize> {
        match self {
            Self::One(value) => vec![value],
            Self::Each(values) => values,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct UniformParams {
    #[serde(default = "default_mapping")]
    mapping: String,
    rf_size: PerDimension,
    #[serde(default)]
    rf_overlap: Option<PerDimension>,
    #[serde(default = "default_strict")]
    strict: bool,
}

fn default_mapping() -> String {
    "in".to_string()
}

fn default_strict() -> bool {
    true
}

#[derive(Debug)]
pub struct UniformLinkPolicy {
    rf_size: Vec<usize>,
    rf_overlap: Vec<usize>,
    strict: bool,
    src: Dimensions,
    dest: Dimensions,
    element_count: Option<usize>,
    initialized: bool,
}

impl UniformLinkPolicy {
    pub const LINK_TYPE: &'static str = "UniformLink";

    /// Build from `{"mapping": "in", "rfSize": [..], "rfOverlap": [..], "strict": bool}`.
    ///
    /// `rfSize` and `rfOverlap` take a single value (applied to every
    /// dimension) or one value per dimension.
    pub fn from_params(params: &ValueMap) -> Result<Self> {
        let params: UniformParams = params.deserialize()?;
        if params.mapping != "in" {
            return Err(Error::InvalidArgument(format!(
                "{} supports only the 'in' mapping, got '{}'",
                Self::LINK_TYPE,
                params.mapping
            )));
        }

        let rf_size = params.rf_size.into_vec();
        let rf_overlap = params.rf_overlap.map_or_else(|| vec![0], PerDimension::into_vec);
        Self::new(rf_size, rf_overlap, params.strict)
    }

    pub fn new(rf_size: Vec<usize>, rf_overlap: Vec<usize>, strict: bool) -> Result<Self> {
        let policy = Self {
            rf_size,
            rf_overlap,
            strict,
            src: Dimensions::unspecified(),
            dest: Dimensions::unspecified(),
            element_count: None,
            initialized: false,
        };
        policy.validate()?;
        Ok(policy)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidArgument(format!("{}: {msg}", Self::LINK_TYPE)));

        if self.rf_size.is_empty() || self.rf_overlap.is_empty() {
            return invalid("rfSize and rfOverlap must not be empty".to_string());
        }
        let rank = self.parameter_rank();
        for values in [&self.rf_size, &self.rf_overlap] {
            if values.len() != 1 && values.len() != rank {
                return invalid(format!("parameter lists must have length 1 or {rank}, got {values:?}"));
            }
        }
        for dim in 0..rank {
            let (rf, overlap) = (self.rf(dim), self.overlap(dim));
            if rf == 0 {
                return invalid(format!("rfSize must be positive in dimension {}", dim + 1));
            }
            if overlap >= rf {
                return invalid(format!(
                    "rfOverlap {overlap} must be smaller than rfSize {rf} in dimension {}",
                    dim + 1
                ));
            }
        }
        Ok(())
    }

    fn parameter_rank(&self) -> usize {
        self.rf_size.len().max(self.rf_overlap.len())
    }

    fn rf(&self, dim: usize) -> usize {
        pick(&self.rf_size, dim)
    }

    fn overlap(&self, dim: usize) -> usize {
        pick(&self.rf_overlap, dim)
    }

    fn step(&self, dim: usize) -> usize {
        self.rf(dim) - self.overlap(dim)
    }

    /// Bring `dims` to the parameter rank when it is all ones, then check
    /// the rank is usable.
    fn conform(&self, dims: &Dimensions, side: &str) -> Result<Dimensions> {
        if !dims.is_specified() {
            return Err(Error::InvalidArgument(format!(
                "invalid {dims} {side} dimensions for {}",
                Self::LINK_TYPE
            )));
        }
        let rank = self.parameter_rank();
        let dims = if dims.is_ones() && rank != 1 && dims.rank() != rank {
            dims.promote(rank)?
        } else {
            dims.clone()
        };
        if rank != 1 && dims.rank() != rank {
            return Err(Error::InvalidArgument(format!(
                "{}: parameters have dimensionality {rank} but the {side} dimensions {dims} have {}",
                Self::LINK_TYPE,
                dims.rank()
            )));
        }
        Ok(dims)
    }

    /// Half-open source range read by destination coordinate `position` in `dim`.
    fn field(&self, dim: usize, position: usize) -> (usize, usize) {
        let start = position * self.step(dim);
        let end = if !self.strict && position + 1 == self.dest.extents()[dim] {
            self.src.extents()[dim]
        } else {
            start + self.rf(dim)
        };
        (start, end)
    }
}

fn pick(values: &[usize], dim: usize) -> usize {
    if values.len() == 1 {
        values[0]
    } else {
        values[dim]
    }
}

impl LinkPolicy for UniformLinkPolicy {
    fn set_src_dimensions(&mut self, dims: &Dimensions) -> Result<()> {
        let src = self.conform(dims, "source")?;
        let mut dest = Vec::with_capacity(src.rank());
        for (dim, &extent) in src.extents().iter().enumerate() {
            let (rf, overlap, step) = (self.rf(dim), self.overlap(dim), self.step(dim));
            if extent < rf {
                return Err(Error::InvalidArgument(format!(
                    "invalid source dimensions {src} for {}: extent {extent} in dimension {} is smaller \
                     than the receptive field size {rf}",
                    Self::LINK_TYPE,
                    dim + 1
                )));
            }
            if self.strict && (extent - rf) % step != 0 {
                return Err(Error::InvalidArgument(format!(
                    "invalid source dimensions {src} for {}: in dimension {}, {extent} source nodes cannot be \
                     tiled by receptive fields of size {rf} advancing by {step}",
                    Self::LINK_TYPE,
                    dim + 1
                )));
            }
            dest.push((extent - overlap) / step);
        }
        self.src = src;
        self.dest = Dimensions::new(dest);
        Ok(())
    }

    fn set_dest_dimensions(&mut self, dims: &Dimensions) -> Result<()> {
        let dest = self.conform(dims, "destination")?;
        let src: Vec<usize> = dest
            .extents()
            .iter()
            .enumerate()
            .map(|(dim, &extent)| extent * self.step(dim) + self.overlap(dim))
            .collect();
        self.src = Dimensions::new(src);
        self.dest = dest;
        Ok(())
    }

    fn src_dimensions(&self) -> &Dimensions {
        &self.src
    }

    fn dest_dimensions(&self) -> &Dimensions {
        &self.dest
    }

    fn set_node_output_element_count(&mut self, count: usize) {
        self.element_count = Some(count);
    }

    fn initialize(&mut self) -> Result<()> {
        if !self.src.is_specified() || !self.dest.is_specified() {
            return Err(Error::NotInitialized(format!(
                "{} initialized before its dimensions were set",
                Self::LINK_TYPE
            )));
        }
        self.initialized = true;
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn build_proto_splitter_map(&self, map: &mut SplitterMap) -> Result<()> {
        let element_count = match (self.initialized, self.element_count) {
            (true, Some(count)) => count,
            _ => {
                return Err(Error::NotInitialized(format!(
                    "{} splitter map requested before initialize",
                    Self::LINK_TYPE
                )))
            }
        };
        check_map_len(map, &self.dest)?;

        for (dest_index, entry) in map.iter_mut().enumerate() {
            let coordinate = self.dest.coordinate(dest_index)?;
            let bounds: Vec<(usize, usize)> = coordinate
                .iter()
                .enumerate()
                .map(|(dim, &position)| self.field(dim, position))
                .collect();

            // odometer over the box, dimension 0 fastest
            let mut cursor: Vec<usize> = bounds.iter().map(|&(start, _)| start).collect();
            'box_walk: loop {
                let first = self.src.index(&cursor)? * element_count;
                entry.extend(first..first + element_count);

                for (dim, &(start, end)) in bounds.iter().enumerate() {
                    cursor[dim] += 1;
                    if cursor[dim] < end {
                        continue 'box_walk;
                    }
                    cursor[dim] = start;
                }
                break;
            }
        }
        Ok(())
    }
}
