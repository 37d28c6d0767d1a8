//! A named node of the computation graph.

use std::fmt;
use std::time::Instant;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::array::Array;
use crate::dimensions::Dimensions;
use crate::error::{Error, Result};
use crate::input::Input;
use crate::instrumentation::Timer;
use crate::negotiate::{validate_region_dimensions, DimensionTable};
use crate::node_set::NodeSet;
use crate::node_spec::NodeSpec;
use crate::output::Output;
use crate::params::{ParamValue, ValueMap};
use crate::region_impl::{RegionImpl, RegionImplFactory, RegionIo};

/// Inputs and outputs come from the node type's declared spec; the work is
/// done by a [`RegionImpl`].
pub struct Region {
    name: String,
    node_type: String,
    params: String,
    spec: NodeSpec,
    dimensions: Dimensions,
    dimension_info: String,
    inputs: Vec<Input>,
    outputs: Vec<Output>,
    enabled_nodes: Option<NodeSet>,
    body: Box<dyn RegionImpl>,
    initialized: bool,
    profiling: bool,
    compute_timer: Timer,
}

impl Region {
    pub(crate) fn new(name: &str, node_type: &str, params: &str, factory: &RegionImplFactory) -> Result<Self> {
        let spec = factory.node_spec(node_type)?.clone();
        let body = factory.create(node_type, name, &ValueMap::parse(params)?)?;

        let inputs = spec
            .inputs
            .iter()
            .map(|(input, s)| Input::new(name, input, s.data_type, s.region_level))
            .collect();
        let outputs = spec
            .outputs
            .iter()
            .map(|(output, s)| Output::new(name, output, s.data_type, s.region_level))
            .collect();

        Ok(Self {
            name: name.to_string(),
            node_type: node_type.to_string(),
            params: params.to_string(),
            spec,
            dimensions: Dimensions::unspecified(),
            dimension_info: String::new(),
            inputs,
            outputs,
            enabled_nodes: None,
            body,
            initialized: false,
            profiling: false,
            compute_timer: Timer::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    /// Parameter string the region was created with.
    pub fn params(&self) -> &str {
        &self.params
    }

    pub fn spec(&self) -> &NodeSpec {
        &self.spec
    }

    pub fn dimensions(&self) -> &Dimensions {
        &self.dimensions
    }

    /// Fix the region's dimensions.
    ///
    /// Concrete dimensions never change: setting an equal value again is a
    /// no-op, a different value fails with `InvalidState`.
    pub fn set_dimensions(&mut self, dims: Dimensions) -> Result<()> {
        if self.dimensions.is_specified() {
            if dims == self.dimensions {
                return Ok(());
            }
            return Err(Error::InvalidState(format!(
                "region {} already has dimensions {}; cannot change them to {dims}",
                self.name, self.dimensions
            )));
        }
        validate_region_dimensions(&self.name, &dims, self.spec.single_node_only)?;

        self.enabled_nodes = Some(NodeSet::all_on(dims.count()?));
        self.dimensions = dims;
        self.dimension_info = "Specified explicitly by setDimensions()".to_string();
        Ok(())
    }

    /// Why the dimensions have their current value.
    pub fn dimension_info(&self) -> &str {
        &self.dimension_info
    }

    pub fn set_dimension_info(&mut self, info: impl Into<String>) {
        self.dimension_info = info.into();
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn input(&self, name: &str) -> Result<&Input> {
        self.inputs
            .iter()
            .find(|input| input.name() == name)
            .ok_or_else(|| Error::InvalidArgument(format!("region {} has no input '{name}'", self.name)))
    }

    pub(crate) fn check_required_inputs(&self) -> Result<()> {
        for (name, declared) in &self.spec.inputs {
            if declared.required && self.input(name)?.links().is_empty() {
                return Err(Error::InvalidState(format!(
                    "required input {}.{name} has no incoming links",
                    self.name
                )));
            }
        }
        Ok(())
    }

    pub fn input_mut(&mut self, name: &str) -> Result<&mut Input> {
        let region = &self.name;
        self.inputs
            .iter_mut()
            .find(|input| input.name() == name)
            .ok_or_else(|| Error::InvalidArgument(format!("region {region} has no input '{name}'")))
    }

    pub fn output(&self, name: &str) -> Result<&Output> {
        self.outputs
            .iter()
            .find(|output| output.name() == name)
            .ok_or_else(|| Error::InvalidArgument(format!("region {} has no output '{name}'", self.name)))
    }

    pub(crate) fn output_mut(&mut self, name: &str) -> Result<&mut Output> {
        let region = &self.name;
        self.outputs
            .iter_mut()
            .find(|output| output.name() == name)
            .ok_or_else(|| Error::InvalidArgument(format!("region {region} has no output '{name}'")))
    }

    pub fn input_data(&self, name: &str) -> Result<&Array> {
        Ok(self.input(name)?.data())
    }

    pub fn output_data(&self, name: &str) -> Result<RwLockReadGuard<'_, Array>> {
        Ok(self.output(name)?.data())
    }

    pub fn output_data_mut(&self, name: &str) -> Result<RwLockWriteGuard<'_, Array>> {
        Ok(self.output(name)?.data_mut())
    }

    /// Elements per node on `output`: the declared count, or the body's
    /// answer when the declared count is 0.
    pub fn node_output_element_count(&self, output: &str) -> Result<usize> {
        let spec = self.spec.output(output).ok_or_else(|| {
            Error::InvalidArgument(format!("region {} has no output '{output}'", self.name))
        })?;
        if spec.count > 0 {
            return Ok(spec.count);
        }
        self.body.node_output_element_count(output)
    }

    pub fn enabled_nodes(&self) -> Result<&NodeSet> {
        self.enabled_nodes.as_ref().ok_or_else(|| self.no_dimensions())
    }

    pub fn enabled_nodes_mut(&mut self) -> Result<&mut NodeSet> {
        match self.enabled_nodes.as_mut() {
            Some(nodes) => Ok(nodes),
            None => Err(Error::NotInitialized(format!(
                "region {} has no enabled-node set before its dimensions are set",
                self.name
            ))),
        }
    }

    fn no_dimensions(&self) -> Error {
        Error::NotInitialized(format!(
            "region {} has no enabled-node set before its dimensions are set",
            self.name
        ))
    }

    /// Sum of incomplete links over all inputs.
    pub(crate) fn evaluate_links(&mut self, table: &mut DimensionTable) -> Result<usize> {
        let mut incomplete = 0;
        for input in &mut self.inputs {
            incomplete += input.evaluate_links(table)?;
        }
        Ok(incomplete)
    }

    /// One line per incoming link whose dimensions are still unresolved.
    pub(crate) fn get_link_errors(&self, table: &DimensionTable) -> Result<Vec<String>> {
        let mut errors = Vec::new();
        for link in self.inputs.iter().flat_map(Input::links) {
            if link.src_dimensions().is_unspecified() || link.dest_dimensions().is_unspecified() {
                errors.push(table.describe(link)?);
            }
        }
        Ok(errors)
    }

    pub(crate) fn init_outputs(&mut self) -> Result<()> {
        let nodes = self.dimensions.count()?;
        for output in &self.outputs {
            let count = self.node_output_element_count(output.name())?;
            output.initialize(count, nodes)?;
        }
        Ok(())
    }

    pub(crate) fn init_inputs(&mut self, table: &DimensionTable) -> Result<()> {
        for input in &mut self.inputs {
            input.initialize(&self.dimensions, table)?;
        }
        Ok(())
    }

    /// Initialize the computation body. A no-op once initialized.
    pub(crate) fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        let Some(enabled_nodes) = self.enabled_nodes.as_mut() else {
            return Err(Error::InvalidState(format!(
                "region {} cannot be initialized with dimensions {}",
                self.name, self.dimensions
            )));
        };
        let mut io = RegionIo {
            region_name: &self.name,
            dimensions: &self.dimensions,
            inputs: &self.inputs,
            outputs: &self.outputs,
            enabled_nodes,
        };
        self.body.initialize(&mut io)?;
        self.initialized = true;
        Ok(())
    }

    pub(crate) fn uninitialize(&mut self) {
        self.initialized = false;
        for input in &mut self.inputs {
            input.uninitialize();
        }
        for output in &self.outputs {
            output.uninitialize();
        }
    }

    /// Copy incoming link data into every input.
    pub fn prepare_inputs(&mut self) -> Result<()> {
        for input in &mut self.inputs {
            input.prepare()?;
        }
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip(self), fields(region = %self.name))]
    pub fn compute(&mut self) -> Result<()> {
        if !self.initialized {
            return Err(Error::NotInitialized(format!(
                "region {} must be initialized before compute",
                self.name
            )));
        }
        let Some(enabled_nodes) = self.enabled_nodes.as_mut() else {
            return Err(Error::NotInitialized(format!("region {} has no dimensions", self.name)));
        };

        let started = Instant::now();
        if self.profiling {
            self.compute_timer.start();
        }
        let mut io = RegionIo {
            region_name: &self.name,
            dimensions: &self.dimensions,
            inputs: &self.inputs,
            outputs: &self.outputs,
            enabled_nodes,
        };
        let result = self.body.compute(&mut io);
        if self.profiling {
            self.compute_timer.stop();
        }

        if nta_tracing::performance::enabled() {
            nta_tracing::performance::record_region_compute(
                &self.name,
                &self.node_type,
                self.dimensions.count()?,
                started.elapsed().as_micros() as u64,
            );
        }
        result
    }

    pub fn execute_command(&mut self, args: &[String]) -> Result<String> {
        self.body.execute_command(args)
    }

    pub fn get_parameter(&self, name: &str) -> Result<ParamValue> {
        self.body.get_parameter(name)
    }

    /// Takes effect from the next compute.
    pub fn set_parameter(&mut self, name: &str, value: impl Into<ParamValue>) -> Result<()> {
        let value = value.into();
        tracing::debug!(region = %self.name, parameter = name, value = %value, "parameter_set");
        self.body.set_parameter(name, value)
    }

    pub fn enable_profiling(&mut self) {
        self.profiling = true;
    }

    pub fn disable_profiling(&mut self) {
        self.profiling = false;
    }

    pub fn is_profiling(&self) -> bool {
        self.profiling
    }

    pub fn reset_profiling(&mut self) {
        self.compute_timer.reset();
    }

    pub fn compute_timer(&self) -> &Timer {
        &self.compute_timer
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("name", &self.name)
            .field("node_type", &self.node_type)
            .field("dimensions", &self.dimensions)
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_node(name: &str) -> Result<Region> {
        Region::new(name, "TestNode", "", &RegionImplFactory::with_builtins())
    }

    #[test]
    fn interface_comes_from_spec() -> Result<()> {
        let region = test_node("level1")?;
        assert_eq!(region.inputs().len(), 1);
        assert_eq!(region.outputs().len(), 1);
        assert!(region.input("bottomUpIn").is_ok());
        assert!(region.output("bottomUpOut").is_ok());
        assert!(matches!(region.input("nope"), Err(Error::InvalidArgument(_))));
        assert_eq!(region.node_output_element_count("bottomUpOut")?, 2);
        assert!(region.node_output_element_count("nope").is_err());
        Ok(())
    }

    #[test]
    fn unknown_node_type() {
        let err = Region::new("r", "nonexistent_nodetype", "", &RegionImplFactory::with_builtins()).unwrap_err();
        assert!(matches!(err, Error::UnknownNodeType(_)));
    }

    #[test]
    fn dimensions_are_monotonic() -> Result<()> {
        let mut region = test_node("level1")?;
        assert!(region.dimensions().is_unspecified());
        assert!(matches!(region.enabled_nodes(), Err(Error::NotInitialized(_))));

        assert!(matches!(
            region.set_dimensions(Dimensions::dont_care()),
            Err(Error::InvalidArgument(_))
        ));
        region.set_dimensions(Dimensions::from([4, 4]))?;
        region.set_dimensions(Dimensions::from([4, 4]))?;
        assert!(matches!(
            region.set_dimensions(Dimensions::from([2, 2])),
            Err(Error::InvalidState(_))
        ));

        let enabled = region.enabled_nodes()?;
        assert_eq!(enabled.len(), 16);
        assert!(enabled.contains(15));
        Ok(())
    }

    #[test]
    fn single_node_only_requires_ones() -> Result<()> {
        let mut factory = RegionImplFactory::new();
        let spec = crate::test_node::TestNode::node_spec().single_node_only();
        factory.register("Single", spec, |name, params| {
            Ok(Box::new(crate::test_node::TestNode::new(name, params)?))
        })?;

        let mut region = Region::new("s", "Single", "", &factory)?;
        assert!(region.set_dimensions(Dimensions::from([2])).is_err());
        region.set_dimensions(Dimensions::from([1, 1]))?;
        Ok(())
    }

    #[test]
    fn compute_requires_initialize() -> Result<()> {
        let mut region = test_node("level1")?;
        assert!(matches!(region.compute(), Err(Error::NotInitialized(_))));
        assert!(region.initialize().is_err());

        region.set_dimensions(Dimensions::from([2]))?;
        region.init_outputs()?;
        region.init_inputs(&DimensionTable::default())?;
        region.initialize()?;
        region.enable_profiling();
        region.compute()?;
        region.compute()?;
        assert_eq!(region.compute_timer().start_count(), 2);

        // no inputs: out[0] = iteration, out[1] = node
        let out = region.output_data("bottomUpOut")?;
        assert_eq!(out.as_slice::<f64>()?, &[1.0, 0.0, 1.0, 1.0]);
        drop(out);

        region.reset_profiling();
        assert_eq!(region.compute_timer().start_count(), 0);
        Ok(())
    }
}
