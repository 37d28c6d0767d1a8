//! Region and link-endpoint shapes
//!
//! A [`Dimensions`] value is in one of three states:
//!
//! ```text
//! unspecified   []        not computed yet
//! don't-care    [0]       wildcard, compatible with anything
//! specified     [4 2]     concrete extents; `is_valid` when no extent is 0
//! ```
//!
//! Coordinates are x-major: dimension 0 varies fastest, so for `[4 2]`
//! coordinate `[1 1]` is index 5.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Ordered sequence of extents.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dimensions(Vec<usize>);

impl Dimensions {
    pub fn new(extents: impl Into<Vec<usize>>) -> Self {
        Self(extents.into())
    }

    pub fn unspecified() -> Self {
        Self(Vec::new())
    }

    pub fn dont_care() -> Self {
        Self(vec![0])
    }

    /// All extents 1 at the given rank (a single node).
    pub fn ones(rank: usize) -> Self {
        Self(vec![1; rank])
    }

    pub fn is_unspecified(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_dont_care(&self) -> bool {
        self.0 == [0]
    }

    pub fn is_specified(&self) -> bool {
        !self.is_unspecified() && !self.is_dont_care()
    }

    pub fn is_ones(&self) -> bool {
        !self.0.is_empty() && self.0.iter().all(|&extent| extent == 1)
    }

    /// Specified with every extent non-zero.
    pub fn is_valid(&self) -> bool {
        self.is_specified() && self.0.iter().all(|&extent| extent != 0)
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn extents(&self) -> &[usize] {
        &self.0
    }

    /// Product of extents, i.e. the number of nodes.
    pub fn count(&self) -> Result<usize> {
        if !self.is_specified() {
            return Err(Error::InvalidState(format!(
                "element count requested for {self} dimensions"
            )));
        }
        self.0
            .iter()
            .try_fold(1usize, |count, &extent| count.checked_mul(extent))
            .ok_or_else(|| Error::InvalidArgument(format!("element count of dimensions {self} overflows")))
    }

    /// Flat index of `coordinate`.
    pub fn index(&self, coordinate: &[usize]) -> Result<usize> {
        let count = self.count()?;
        if coordinate.len() != self.rank() {
            return Err(Error::InvalidArgument(format!(
                "coordinate of rank {} used with dimensions {self}",
                coordinate.len()
            )));
        }

        let mut index = 0;
        let mut stride = 1;
        for (&position, &extent) in coordinate.iter().zip(&self.0) {
            if position >= extent {
                return Err(Error::index_out_of_range(format!("coordinate in {self}"), position, extent));
            }
            index += position * stride;
            stride *= extent;
        }
        debug_assert!(index < count);
        Ok(index)
    }

    /// Coordinate of flat `index`.
    pub fn coordinate(&self, index: usize) -> Result<Vec<usize>> {
        let count = self.count()?;
        if index >= count {
            return Err(Error::index_out_of_range(format!("node of {self}"), index, count));
        }

        let mut remainder = index;
        Ok(self
            .0
            .iter()
            .map(|&extent| {
                let position = remainder % extent;
                remainder /= extent;
                position
            })
            .collect())
    }

    /// Re-express an all-ones value at another rank.
    pub fn promote(&self, rank: usize) -> Result<Self> {
        if !self.is_ones() {
            return Err(Error::InvalidArgument(format!(
                "only all-ones dimensions can be promoted, got {self}"
            )));
        }
        Ok(Self::ones(rank))
    }
}

impl From<Vec<usize>> for Dimensions {
    fn from(extents: Vec<usize>) -> Self {
        Self(extents)
    }
}

impl<const N: usize> From<[usize; N]> for Dimensions {
    fn from(extents: [usize; N]) -> Self {
        Self(extents.to_vec())
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unspecified() {
            return f.write_str("[unspecified]");
        }
        if self.is_dont_care() {
            return f.write_str("[dontcare]");
        }
        f.write_str("[")?;
        for (i, extent) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{extent}")?;
        }
        f.write_str("]")
    }
}
