//! Dimension negotiation
//!
//! During `Network::initialize` every input evaluates its links against a
//! [`DimensionTable`]: a snapshot of every region's dimensions. A link whose
//! routing policy knows one endpoint induces the other, and an unspecified
//! region adopts the dimensions its link requires. The network writes the
//! induced dimensions back to the regions after each pass and repeats until
//! nothing is left to resolve or a pass makes no progress.

use std::collections::HashMap;

use crate::dimensions::Dimensions;
use crate::error::{Error, Result};
use crate::link::{endpoint_matches, Link};

#[derive(Clone, Debug)]
struct RegionShape {
    dimensions: Dimensions,
    info: String,
    single_node_only: bool,
    initialized: bool,
    induced: bool,
}

/// Region dimensions as seen by one negotiation pass.
#[derive(Clone, Debug, Default)]
pub(crate) struct DimensionTable {
    shapes: HashMap<String, RegionShape>,
}

impl DimensionTable {
    pub(crate) fn insert(
        &mut self,
        name: &str,
        dimensions: &Dimensions,
        info: &str,
        single_node_only: bool,
        initialized: bool,
    ) {
        self.shapes.insert(
            name.to_string(),
            RegionShape {
                dimensions: dimensions.clone(),
                info: info.to_string(),
                single_node_only,
                initialized,
                induced: false,
            },
        );
    }

    fn shape(&self, region: &str) -> Result<&RegionShape> {
        self.shapes
            .get(region)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown region '{region}'")))
    }

    pub(crate) fn dimensions(&self, region: &str) -> Result<&Dimensions> {
        Ok(&self.shape(region)?.dimensions)
    }

    fn info(&self, region: &str) -> Result<&str> {
        Ok(&self.shape(region)?.info)
    }

    /// Fix the dimensions of an unspecified region.
    fn induce(&mut self, region: &str, dimensions: &Dimensions, info: String) -> Result<()> {
        let shape = self
            .shapes
            .get_mut(region)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown region '{region}'")))?;
        if shape.initialized {
            return Err(Error::InvalidState(format!(
                "cannot induce dimensions {dimensions} on initialized region {region}"
            )));
        }
        validate_region_dimensions(region, dimensions, shape.single_node_only)?;
        tracing::debug!(region, dimensions = %dimensions, reason = %info, "dimensions_induced");
        shape.dimensions = dimensions.clone();
        shape.info = info;
        shape.induced = true;
        Ok(())
    }

    /// Regions whose dimensions were fixed during this pass.
    pub(crate) fn induced(&self) -> impl Iterator<Item = (&str, &Dimensions, &str)> {
        self.shapes
            .iter()
            .filter(|(_, shape)| shape.induced)
            .map(|(name, shape)| (name.as_str(), &shape.dimensions, shape.info.as_str()))
    }

    pub(crate) fn describe(&self, link: &Link) -> Result<String> {
        Ok(link.describe(self.dimensions(link.src_region())?, self.dimensions(link.dest_region())?))
    }
}

/// Dimensions a region may take: concrete, no zero extent, and all ones for
/// single-node node types.
pub(crate) fn validate_region_dimensions(region: &str, dims: &Dimensions, single_node_only: bool) -> Result<()> {
    if !dims.is_valid() {
        return Err(Error::InvalidArgument(format!("invalid dimensions {dims} for region {region}")));
    }
    if single_node_only && !dims.is_ones() {
        return Err(Error::InvalidArgument(format!(
            "region {region} supports a single node only, got dimensions {dims}"
        )));
    }
    Ok(())
}

fn inconsistent(table: &DimensionTable, link: &Link, region: &str, required: &Dimensions) -> Result<Error> {
    let info = table.info(region)?;
    Ok(Error::InvalidState(format!(
        "Inconsistent dimension specification encountered. Region {region} has dimensions {} but link {} \
         requires dimensions {required}. Additional information on region dimensions: {}",
        table.dimensions(region)?,
        table.describe(link)?,
        if info.is_empty() { "(none)" } else { info }
    )))
}

/// Evaluate one link. Returns `true` once both of its regions have
/// concrete dimensions.
///
/// Each endpoint combines the region side (unspecified or specified) with
/// the link side (unspecified, don't-care or specified):
///
/// ```text
/// region unspecified, link unspecified   incomplete
/// region unspecified, link don't-care    nothing to do
/// region unspecified, link specified     induce on the region (not region-level)
/// region specified,   link don't-care    nothing to do
/// region specified,   link unspecified   region dims (or ones) applied to the link
/// region specified,   link specified     must agree
/// ```
pub(crate) fn evaluate_link(link: &mut Link, table: &mut DimensionTable) -> Result<bool> {
    let src_region = link.src_region().to_string();
    let dest_region = link.dest_region().to_string();

    // source side
    let mut src_region_dims = table.dimensions(&src_region)?.clone();
    let src_link_dims = link.src_dimensions().clone();
    if src_region_dims.is_unspecified() {
        if src_link_dims.is_specified() && !link.is_src_region_level() {
            let info = format!("Specified by source dimensions on link {}", table.describe(link)?);
            table.induce(&src_region, &src_link_dims, info)?;
            src_region_dims = src_link_dims;
        }
    } else if src_link_dims.is_unspecified() {
        let dims = if link.is_src_region_level() {
            Dimensions::ones(src_region_dims.rank())
        } else {
            src_region_dims.clone()
        };
        link.set_src_dimensions(&dims)?;
    } else if !endpoint_matches(&src_link_dims, &src_region_dims, link.is_src_region_level()) {
        return Err(inconsistent(table, link, &src_region, &src_link_dims)?);
    }

    // destination side
    let mut dest_region_dims = table.dimensions(&dest_region)?.clone();
    let dest_link_dims = link.dest_dimensions().clone();
    if dest_region_dims.is_unspecified() {
        if dest_link_dims.is_specified() && !link.is_dest_region_level() {
            let info = format!("Specified by destination dimensions on link {}", table.describe(link)?);
            table.induce(&dest_region, &dest_link_dims, info)?;
            dest_region_dims = dest_link_dims;
        }
    } else if dest_link_dims.is_unspecified() {
        if link.is_dest_region_level() {
            link.set_dest_dimensions(&Dimensions::ones(dest_region_dims.rank()))?;
        } else {
            link.set_dest_dimensions(&dest_region_dims)?;

            // the policy may now know the source side as well
            let induced = link.src_dimensions().clone();
            if src_region_dims.is_unspecified() {
                if induced.is_specified() && !link.is_src_region_level() {
                    let info = format!("Specified by source dimensions on link {}", table.describe(link)?);
                    table.induce(&src_region, &induced, info)?;
                    src_region_dims = induced;
                }
            } else if !endpoint_matches(&induced, &src_region_dims, link.is_src_region_level()) {
                return Err(inconsistent(table, link, &src_region, &induced)?);
            }
        }
    } else if !endpoint_matches(&dest_link_dims, &dest_region_dims, link.is_dest_region_level()) {
        return Err(inconsistent(table, link, &dest_region, &dest_link_dims)?);
    }

    if !(src_region_dims.is_specified() && dest_region_dims.is_specified()) {
        return Ok(false);
    }
    if link.src_dimensions().is_unspecified() || link.dest_dimensions().is_unspecified() {
        return Err(Error::InvalidState(format!(
            "link {} connects regions with concrete dimensions but has source dimensions {} and destination \
             dimensions {}",
            table.describe(link)?,
            link.src_dimensions(),
            link.dest_dimensions()
        )));
    }
    Ok(true)
}
