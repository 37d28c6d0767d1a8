//! `TestFanIn2`: every 2x2 block of source nodes feeds one destination node.

use super::{check_map_len, LinkPolicy, SplitterMap};
use crate::dimensions::Dimensions;
use crate::error::{Error, Result};

/// Two-dimensional fan-in by a factor of two along each axis.
///
/// ```text
/// src [8 4]  ->  dest [4 2]
///
/// dest node 3 = (3, 0)  <-  src nodes (6,0) (7,0) (6,1) (7,1)
/// ```
#[derive(Debug, Default)]
pub struct FanIn2Policy {
    src: Dimensions,
    dest: Dimensions,
    element_count: Option<usize>,
    initialized: bool,
}

impl FanIn2Policy {
    pub const LINK_TYPE: &'static str = "TestFanIn2";

    pub fn new() -> Self {
        Self::default()
    }

    fn check_rank(dims: &Dimensions, side: &str) -> Result<()> {
        if dims.rank() != 2 || !dims.is_specified() {
            return Err(Error::InvalidArgument(format!(
                "{} requires two-dimensional {side} dimensions, got {dims}",
                Self::LINK_TYPE
            )));
        }
        Ok(())
    }
}

impl LinkPolicy for FanIn2Policy {
    fn set_src_dimensions(&mut self, dims: &Dimensions) -> Result<()> {
        Self::check_rank(dims, "source")?;
        if dims.extents().iter().any(|&extent| extent == 0 || extent % 2 != 0) {
            return Err(Error::InvalidArgument(format!(
                "{} requires even, non-zero source extents, got {dims}",
                Self::LINK_TYPE
            )));
        }
        self.src = dims.clone();
        self.dest = Dimensions::new(dims.extents().iter().map(|extent| extent / 2).collect::<Vec<_>>());
        Ok(())
    }

    fn set_dest_dimensions(&mut self, dims: &Dimensions) -> Result<()> {
        Self::check_rank(dims, "destination")?;
        self.src = Dimensions::new(dims.extents().iter().map(|extent| extent * 2).collect::<Vec<_>>());
        self.dest = dims.clone();
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

        let (src_x, src_y) = (self.src.extents()[0], self.src.extents()[1]);
        let dest_x = self.dest.extents()[0];
        for y in 0..src_y {
            for x in 0..src_x {
                let src_index = y * src_x + x;
                let dest_index = (y / 2) * dest_x + x / 2;
                let first = src_index * element_count;
                map[dest_index].extend(first..first + element_count);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn initialized(src: [usize; 2], element_count: usize) -> Result<FanIn2Policy> {
        let mut policy = FanIn2Policy::new();
        policy.set_node_output_element_count(element_count);
        policy.set_src_dimensions(&Dimensions::from(src))?;
        policy.initialize()?;
        Ok(policy)
    }

    #[test]
    fn induces_both_directions() -> Result<()> {
        let mut policy = FanIn2Policy::new();
        policy.set_src_dimensions(&Dimensions::from([8, 4]))?;
        assert_eq!(policy.dest_dimensions(), &Dimensions::from([4, 2]));

        policy.set_dest_dimensions(&Dimensions::from([3, 1]))?;
        assert_eq!(policy.src_dimensions(), &Dimensions::from([6, 2]));
        Ok(())
    }

    #[test]
    fn rejects_bad_shapes() {
        let mut policy = FanIn2Policy::new();
        assert!(policy.set_src_dimensions(&Dimensions::from([8])).is_err());
        assert!(policy.set_src_dimensions(&Dimensions::from([1, 4])).is_err());
        assert!(policy.set_dest_dimensions(&Dimensions::dont_care()).is_err());
        assert!(policy.initialize().is_err());
    }

    #[test]
    fn eight_by_four_map() -> Result<()> {
        let policy = initialized([8, 4], 2)?;
        let mut map = vec![Vec::new(); 8];
        policy.build_proto_splitter_map(&mut map)?;

        assert_eq!(map[0], vec![0, 1, 2, 3, 16, 17, 18, 19]);
        assert_eq!(map[3], vec![12, 13, 14, 15, 28, 29, 30, 31]);
        assert_eq!(map[4], vec![32, 33, 34, 35, 48, 49, 50, 51]);
        assert!(map.iter().all(|entry| entry.len() == 8));
        Ok(())
    }

    #[test]
    fn odd_source_extent_is_rejected() {
        let mut policy = FanIn2Policy::new();
        let err = policy.set_src_dimensions(&Dimensions::from([5, 2])).unwrap_err();
        assert!(err.to_string().contains("[5 2]"));
    }

    #[test]
    fn map_size_is_checked() -> Result<()> {
        let policy = initialized([4, 4], 1)?;
        let mut map = vec![Vec::new(); 3];
        assert!(matches!(
            policy.build_proto_splitter_map(&mut map),
            Err(Error::BufferSizeMismatch { expected: 4, actual: 3 })
        ));
        Ok(())
    }
}
