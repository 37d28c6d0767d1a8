//! The computation graph and its run loop
//!
//! A [`Network`] owns every region (and, through their inputs, every link),
//! the phase table and the registered callbacks.
//!
//! ```text
//! Building ──initialize()──▶ Initialized ──run(n)──▶ Running
//!    ▲                             │
//!    └──── add_region / link / remove_region / remove_link
//! ```
//!
//! `initialize` negotiates dimensions to a fixed point, allocates every
//! output and then every input, and finally initializes each region's
//! computation body. `run` initializes on demand.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::time::Instant;

use crate::description::{LinkDescription, NetworkDescription, RegionDescription};
use crate::dimensions::Dimensions;
use crate::error::{Error, Result};
use crate::instrumentation::RunMetrics;
use crate::link::Link;
use crate::link_policy::LinkPolicyFactory;
use crate::negotiate::DimensionTable;
use crate::output::Output;
use crate::region::Region;
use crate::region_impl::RegionImplFactory;

/// Stable handle of a region. Never reused within a network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionId(usize);

impl RegionId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Invoked once per completed iteration with the iteration count.
pub type Callback = Box<dyn FnMut(&Network, u64) + Send>;

/// A phase set may not jump more than this far past the next free phase.
const MAX_PHASE_GAP: usize = 3;

pub struct Network {
    regions: Vec<Option<Region>>,
    names: HashMap<String, RegionId>,
    phases: Vec<BTreeSet<RegionId>>,
    min_enabled_phase: usize,
    max_enabled_phase: usize,
    iteration: u64,
    callbacks: Vec<(String, Callback)>,
    initialized: bool,
    node_types: RegionImplFactory,
    link_types: LinkPolicyFactory,
}

impl Network {
    /// An empty network using the built-in node and link types.
    pub fn new() -> Self {
        Self::with_factories(RegionImplFactory::with_builtins(), LinkPolicyFactory::with_builtins())
    }

    pub fn with_factories(node_types: RegionImplFactory, link_types: LinkPolicyFactory) -> Self {
        Self {
            regions: Vec::new(),
            names: HashMap::new(),
            phases: Vec::new(),
            min_enabled_phase: 0,
            max_enabled_phase: 0,
            iteration: 0,
            callbacks: Vec::new(),
            initialized: false,
            node_types,
            link_types,
        }
    }

    pub fn node_types(&self) -> &RegionImplFactory {
        &self.node_types
    }

    pub fn link_types(&self) -> &LinkPolicyFactory {
        &self.link_types
    }

    // --- regions ---

    /// Add a region in a new phase after every existing one.
    pub fn add_region(&mut self, name: &str, node_type: &str, params: &str) -> Result<&mut Region> {
        if self.names.contains_key(name) {
            return Err(Error::InvalidArgument(format!("a region named '{name}' already exists")));
        }
        let region = Region::new(name, node_type, params, &self.node_types)?;

        let id = RegionId(self.regions.len());
        self.regions.push(Some(region));
        self.names.insert(name.to_string(), id);
        self.phases.push(BTreeSet::from([id]));
        self.reset_enabled_phases();
        self.initialized = false;

        tracing::debug!(region = name, node_type, phase = self.phases.len() - 1, "region_added");
        self.region_at_mut(id)
    }

    /// Add a region whose dimensions are already known.
    pub fn add_region_with_dimensions(
        &mut self,
        name: &str,
        node_type: &str,
        params: &str,
        dimensions: Dimensions,
    ) -> Result<&mut Region> {
        self.add_region(name, node_type, params)?;
        let region = self.region_mut(name)?;
        if !dimensions.is_unspecified() {
            region.set_dimensions(dimensions)?;
        }
        Ok(region)
    }

    /// Remove a region and its incoming links. Regions with outgoing links
    /// cannot be removed.
    pub fn remove_region(&mut self, name: &str) -> Result<()> {
        let id = self.region_id(name)?;
        let region = self.region_at(id)?;
        if region.outputs().iter().any(Output::has_outgoing_links) {
            return Err(Error::InvalidState(format!(
                "Unable to remove region '{name}' because it has one or more outgoing links"
            )));
        }
        let incoming: Vec<(String, String, _)> = region
            .inputs()
            .iter()
            .flat_map(|input| input.links())
            .map(|link| (link.src_region().to_string(), link.src_output().to_string(), link.key()))
            .collect();

        let mut region = self.regions[id.0]
            .take()
            .ok_or_else(|| Error::InvalidArgument(format!("no region named '{name}'")))?;
        region.uninitialize();
        self.names.remove(name);

        for (src_region, src_output, key) in incoming {
            self.region_mut(&src_region)?.output_mut(&src_output)?.remove_link(&key);
        }
        for phase in &mut self.phases {
            phase.remove(&id);
        }
        while self.phases.last().is_some_and(BTreeSet::is_empty) {
            self.phases.pop();
        }
        self.reset_enabled_phases();
        self.initialized = false;

        tracing::debug!(region = name, "region_removed");
        Ok(())
    }

    pub fn region_id(&self, name: &str) -> Result<RegionId> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| Error::InvalidArgument(format!("no region named '{name}'")))
    }

    pub fn region(&self, name: &str) -> Result<&Region> {
        self.region_at(self.region_id(name)?)
    }

    pub fn region_mut(&mut self, name: &str) -> Result<&mut Region> {
        let id = self.region_id(name)?;
        self.region_at_mut(id)
    }

    pub fn region_by_id(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(id.0).and_then(Option::as_ref)
    }

    fn region_at(&self, id: RegionId) -> Result<&Region> {
        self.region_by_id(id)
            .ok_or_else(|| Error::InvalidArgument(format!("no region with id {}", id.0)))
    }

    fn region_at_mut(&mut self, id: RegionId) -> Result<&mut Region> {
        self.regions
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::InvalidArgument(format!("no region with id {}", id.0)))
    }

    /// Regions in insertion order.
    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter().flatten()
    }

    fn regions_mut(&mut self) -> impl Iterator<Item = &mut Region> {
        self.regions.iter_mut().flatten()
    }

    pub fn region_count(&self) -> usize {
        self.names.len()
    }

    pub fn contains_region(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    // --- links ---

    /// Link `src` to `dest`. `None` names select the node type's default
    /// output or input.
    pub fn link(
        &mut self,
        src: &str,
        dest: &str,
        link_type: &str,
        params: &str,
        src_output: Option<&str>,
        dest_input: Option<&str>,
    ) -> Result<()> {
        let src_id = self.region_id(src)?;
        let dest_id = self.region_id(dest)?;
        let src_region = self.region_at(src_id)?;
        let dest_region = self.region_at(dest_id)?;
        let src_output = resolve_output(src_region, src_output)?;
        let dest_input = resolve_input(dest_region, dest_input)?;

        let output = src_region.output(&src_output)?;
        let input = dest_region.input(&dest_input)?;
        if input.is_initialized() {
            return Err(Error::InvalidState(format!(
                "cannot link into input {dest}.{dest_input} because it is initialized"
            )));
        }

        let policy = self.link_types.create(link_type, params)?;
        let mut link = Link::new(link_type, params, src, &src_output, dest, &dest_input, policy);
        link.connect(output, input)?;
        link.set_node_output_element_count(src_region.node_output_element_count(&src_output)?);
        let key = link.key();

        tracing::debug!(link = %link, "link_added");
        self.region_at_mut(dest_id)?.input_mut(&dest_input)?.add_link(link)?;
        self.region_at_mut(src_id)?.output_mut(&src_output)?.add_link(key);
        self.reset_enabled_phases();
        self.initialized = false;
        Ok(())
    }

    /// Remove the link from `src` to `dest`. The destination region must not
    /// be initialized.
    pub fn remove_link(
        &mut self,
        src: &str,
        dest: &str,
        src_output: Option<&str>,
        dest_input: Option<&str>,
    ) -> Result<()> {
        let src_id = self.region_id(src)?;
        let dest_id = self.region_id(dest)?;
        let src_region = self.region_at(src_id)?;
        let dest_region = self.region_at(dest_id)?;
        let src_output = resolve_output(src_region, src_output)?;
        let dest_input = resolve_input(dest_region, dest_input)?;
        src_region.output(&src_output)?;

        let link = dest_region
            .input(&dest_input)?
            .find_link(src, &src_output)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "no link from {src}.{src_output} to {dest}.{dest_input}"
                ))
            })?;
        if dest_region.is_initialized() {
            return Err(Error::InvalidState(format!(
                "Cannot remove link {} because destination region {dest} is initialized. Remove the region first.",
                link.describe(src_region.dimensions(), dest_region.dimensions())
            )));
        }

        let removed = self.region_at_mut(dest_id)?.input_mut(&dest_input)?.remove_link(src, &src_output)?;
        self.region_at_mut(src_id)?.output_mut(&src_output)?.remove_link(&removed.key());
        self.reset_enabled_phases();
        self.initialized = false;

        tracing::debug!(link = %removed, "link_removed");
        Ok(())
    }

    // --- phases ---

    /// Replace the phase set of region `name`.
    pub fn set_phases(&mut self, name: &str, phases: &BTreeSet<u32>) -> Result<()> {
        let id = self.region_id(name)?;
        let Some(&max_new) = phases.last() else {
            return Err(Error::InvalidArgument(format!(
                "Attempt to set empty phase list for region {name}"
            )));
        };
        let next_phase = self.phases.len();
        if max_new as usize > next_phase + MAX_PHASE_GAP {
            return Err(Error::InvalidArgument(format!(
                "Attempt to set phase of {max_new} when expected next phase is {next_phase} -- this is probably an \
                 error."
            )));
        }
        self.assign_phases(id, phases);
        tracing::debug!(region = name, phases = ?phases, "phases_changed");
        Ok(())
    }

    fn assign_phases(&mut self, id: RegionId, phases: &BTreeSet<u32>) {
        if let Some(&max_new) = phases.last() {
            let needed = max_new as usize + 1;
            if needed > self.phases.len() {
                self.phases.resize_with(needed, BTreeSet::new);
            }
        }
        for (phase, members) in self.phases.iter_mut().enumerate() {
            if phases.contains(&(phase as u32)) {
                members.insert(id);
            } else {
                members.remove(&id);
            }
        }
        while self.phases.last().is_some_and(BTreeSet::is_empty) {
            self.phases.pop();
        }
        self.reset_enabled_phases();
    }

    pub fn phases(&self, name: &str) -> Result<BTreeSet<u32>> {
        let id = self.region_id(name)?;
        Ok(self
            .phases
            .iter()
            .enumerate()
            .filter(|(_, members)| members.contains(&id))
            .map(|(phase, _)| phase as u32)
            .collect())
    }

    /// First phase holding a region; 0 for an empty network.
    pub fn min_phase(&self) -> u32 {
        self.phases.iter().position(|members| !members.is_empty()).unwrap_or(0) as u32
    }

    /// Highest phase; 0 for an empty network.
    pub fn max_phase(&self) -> u32 {
        self.phases.len().saturating_sub(1) as u32
    }

    pub fn min_enabled_phase(&self) -> u32 {
        self.min_enabled_phase as u32
    }

    pub fn max_enabled_phase(&self) -> u32 {
        self.max_enabled_phase as u32
    }

    pub fn set_min_enabled_phase(&mut self, phase: u32) -> Result<()> {
        self.check_enabled_bound(phase)?;
        if phase as usize > self.max_enabled_phase {
            return Err(Error::InvalidArgument(format!(
                "min enabled phase {phase} is greater than the max enabled phase {}",
                self.max_enabled_phase
            )));
        }
        self.min_enabled_phase = phase as usize;
        Ok(())
    }

    pub fn set_max_enabled_phase(&mut self, phase: u32) -> Result<()> {
        self.check_enabled_bound(phase)?;
        if (phase as usize) < self.min_enabled_phase {
            return Err(Error::InvalidArgument(format!(
                "max enabled phase {phase} is less than the min enabled phase {}",
                self.min_enabled_phase
            )));
        }
        self.max_enabled_phase = phase as usize;
        Ok(())
    }

    fn check_enabled_bound(&self, phase: u32) -> Result<()> {
        if self.phases.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "cannot enable phase {phase}: the network has no phases"
            )));
        }
        if phase < self.min_phase() || phase > self.max_phase() {
            return Err(Error::InvalidArgument(format!(
                "phase {phase} is outside the network phases [{}, {}]",
                self.min_phase(),
                self.max_phase()
            )));
        }
        Ok(())
    }

    fn reset_enabled_phases(&mut self) {
        self.min_enabled_phase = self.min_phase() as usize;
        self.max_enabled_phase = self.max_phase() as usize;
    }

    // --- lifecycle ---

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Negotiate dimensions, allocate buffers and initialize every region.
    /// A no-op when already initialized.
    #[tracing::instrument(skip(self), fields(regions = self.region_count()))]
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        let started = Instant::now();
        for region in self.regions() {
            region.check_required_inputs()?;
        }

        nta_tracing::timed_step!("negotiate_dimensions", { self.negotiate_dimensions() })?;
        if let Some(region) = self.regions().find(|region| !region.dimensions().is_valid()) {
            return Err(Error::InvalidState(format!(
                "region {} has dimensions {}; every region must have concrete dimensions before the network can be \
                 initialized",
                region.name(),
                region.dimensions()
            )));
        }

        for region in self.regions_mut() {
            region.init_outputs()?;
        }
        let table = self.dimension_table();
        for region in self.regions_mut() {
            region.init_inputs(&table)?;
        }
        for region in self.regions_mut() {
            region.initialize()?;
        }
        self.reset_enabled_phases();
        self.initialized = true;

        tracing::info!(
            regions = self.region_count(),
            links = self.link_count(),
            phases = self.phases.len(),
            duration_us = started.elapsed().as_micros() as u64,
            "network_initialized"
        );
        Ok(())
    }

    /// Evaluate every input's links until all resolve or a pass makes no
    /// progress.
    fn negotiate_dimensions(&mut self) -> Result<()> {
        let mut previous = usize::MAX;
        let mut remaining = usize::MAX - 1;
        let mut passes = 0;
        while remaining > 0 && remaining < previous {
            previous = remaining;
            let mut table = self.dimension_table();
            remaining = 0;
            for region in self.regions_mut() {
                remaining += region.evaluate_links(&mut table)?;
            }
            for (name, dims, info) in table.induced() {
                let region = self.region_mut(name)?;
                region.set_dimensions(dims.clone())?;
                region.set_dimension_info(info);
            }
            passes += 1;
        }
        tracing::debug!(passes, unresolved = remaining, "dimensions_negotiated");

        if remaining > 0 {
            let table = self.dimension_table();
            let mut links = Vec::new();
            for region in self.regions() {
                links.extend(region.get_link_errors(&table)?);
            }
            return Err(Error::UnresolvedDimensions { links });
        }
        Ok(())
    }

    fn dimension_table(&self) -> DimensionTable {
        let mut table = DimensionTable::default();
        for region in self.regions() {
            table.insert(
                region.name(),
                region.dimensions(),
                region.dimension_info(),
                region.spec().single_node_only,
                region.is_initialized(),
            );
        }
        table
    }

    fn link_count(&self) -> usize {
        self.regions()
            .flat_map(Region::inputs)
            .map(|input| input.links().len())
            .sum()
    }

    /// Run `iterations` iterations, initializing first if needed.
    #[tracing::instrument(skip(self))]
    pub fn run(&mut self, iterations: u64) -> Result<()> {
        if !self.initialized {
            self.initialize()?;
        }
        if self.phases.is_empty() {
            return Ok(());
        }
        let started = Instant::now();

        for _ in 0..iterations {
            for phase in self.min_enabled_phase..=self.max_enabled_phase {
                self.run_phase(phase)?;
            }
            self.iteration += 1;
            self.invoke_callbacks();
        }

        RunMetrics::new(iterations, self.region_count(), started).log();
        Ok(())
    }

    fn run_phase(&mut self, phase: usize) -> Result<()> {
        let Self { phases, regions, .. } = self;
        let Some(members) = phases.get(phase) else {
            return Ok(());
        };
        for id in members {
            if let Some(region) = regions.get_mut(id.0).and_then(Option::as_mut) {
                region.prepare_inputs()?;
                region.compute()?;
            }
        }
        nta_tracing::phase_event!(phase, regions = members.len());
        Ok(())
    }

    /// Completed iterations.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    // --- callbacks ---

    pub fn add_callback<F>(&mut self, name: &str, callback: F) -> Result<()>
    where
        F: FnMut(&Network, u64) + Send + 'static,
    {
        if self.callbacks.iter().any(|(existing, _)| existing == name) {
            return Err(Error::InvalidArgument(format!("a callback named '{name}' already exists")));
        }
        self.callbacks.push((name.to_string(), Box::new(callback)));
        Ok(())
    }

    pub fn remove_callback(&mut self, name: &str) -> Result<()> {
        let position = self
            .callbacks
            .iter()
            .position(|(existing, _)| existing == name)
            .ok_or_else(|| Error::InvalidArgument(format!("no callback named '{name}'")))?;
        self.callbacks.remove(position);
        Ok(())
    }

    pub fn callback_names(&self) -> impl Iterator<Item = &str> {
        self.callbacks.iter().map(|(name, _)| name.as_str())
    }

    fn invoke_callbacks(&mut self) {
        let mut callbacks = std::mem::take(&mut self.callbacks);
        for (_, callback) in &mut callbacks {
            callback(self, self.iteration);
        }
        self.callbacks = callbacks;
    }

    // --- profiling ---

    pub fn enable_profiling(&mut self) {
        self.regions_mut().for_each(Region::enable_profiling);
    }

    pub fn disable_profiling(&mut self) {
        self.regions_mut().for_each(Region::disable_profiling);
    }

    pub fn reset_profiling(&mut self) {
        self.regions_mut().for_each(Region::reset_profiling);
    }

    // --- description ---

    /// Regions in insertion order, then links grouped by destination input.
    pub fn describe(&self) -> NetworkDescription {
        let regions = self
            .regions()
            .map(|region| RegionDescription {
                name: region.name().to_string(),
                node_type: region.node_type().to_string(),
                dimensions: region.dimensions().clone(),
                phases: self.phases(region.name()).unwrap_or_default().into_iter().collect(),
                params: region.params().to_string(),
            })
            .collect();
        let links = self
            .regions()
            .flat_map(Region::inputs)
            .flat_map(|input| input.links())
            .map(|link| LinkDescription {
                link_type: link.link_type().to_string(),
                params: link.params().to_string(),
                src_region: link.src_region().to_string(),
                src_output: link.src_output().to_string(),
                dest_region: link.dest_region().to_string(),
                dest_input: link.dest_input().to_string(),
            })
            .collect();
        NetworkDescription { regions, links }
    }

    /// Rebuild an uninitialized network from a description.
    pub fn from_description(
        description: &NetworkDescription,
        node_types: RegionImplFactory,
        link_types: LinkPolicyFactory,
    ) -> Result<Self> {
        let mut net = Self::with_factories(node_types, link_types);
        for region in &description.regions {
            net.add_region_with_dimensions(&region.name, &region.node_type, &region.params, region.dimensions.clone())?;
            if !region.phases.is_empty() {
                let id = net.region_id(&region.name)?;
                net.assign_phases(id, &region.phases.iter().copied().collect());
            }
        }
        for link in &description.links {
            net.link(
                &link.src_region,
                &link.dest_region,
                &link.link_type,
                &link.params,
                Some(&link.src_output),
                Some(&link.dest_input),
            )?;
        }
        Ok(net)
    }
}

fn resolve_output(region: &Region, name: Option<&str>) -> Result<String> {
    match name {
        Some(name) => Ok(name.to_string()),
        None => region.spec().default_output_name().map(str::to_string).ok_or_else(|| {
            Error::InvalidArgument(format!("region {} has no default output; name one explicitly", region.name()))
        }),
    }
}

fn resolve_input(region: &Region, name: Option<&str>) -> Result<String> {
    match name {
        Some(name) => Ok(name.to_string()),
        None => region.spec().default_input_name().map(str::to_string).ok_or_else(|| {
            Error::InvalidArgument(format!("region {} has no default input; name one explicitly", region.name()))
        }),
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Network")
            .field("regions", &self.regions().map(Region::name).collect::<Vec<_>>())
            .field("phases", &self.phases.len())
            .field("iteration", &self.iteration)
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}
