//! Pluggable computation bodies
//!
//! A region delegates its work to a [`RegionImpl`]. The network never looks
//! inside one: it only asks for output sizes, initializes it once and calls
//! `compute` once per scheduled phase.
//!
//! Node types are registered in a [`RegionImplFactory`] that is handed to the
//! network at construction:
//!
//! ```text
//! let mut nodes = RegionImplFactory::new();
//! nodes.register("Counter", counter_spec(), |name, params| Ok(Box::new(Counter::new(name, params)?)))?;
//! let net = Network::with_factories(nodes, LinkPolicyFactory::with_builtins());
//! ```

use std::collections::BTreeMap;
use std::fmt;

use crate::array::Array;
use crate::dimensions::Dimensions;
use crate::error::{Error, Result};
use crate::input::Input;
use crate::node_set::NodeSet;
use crate::node_spec::NodeSpec;
use crate::output::Output;
use crate::params::{ParamValue, ValueMap};
use crate::test_node::TestNode;
use crate::types::Element;

/// A region's view of itself while its computation body runs.
pub struct RegionIo<'a> {
    pub(crate) region_name: &'a str,
    pub(crate) dimensions: &'a Dimensions,
    pub(crate) inputs: &'a [Input],
    pub(crate) outputs: &'a [Output],
    pub(crate) enabled_nodes: &'a mut NodeSet,
}

impl<'a> RegionIo<'a> {
    pub fn region_name(&self) -> &str {
        self.region_name
    }

    pub fn dimensions(&self) -> &Dimensions {
        self.dimensions
    }

    pub fn node_count(&self) -> Result<usize> {
        self.dimensions.count()
    }

    pub fn input(&self, name: &str) -> Result<&Input> {
        self.inputs
            .iter()
            .find(|input| input.name() == name)
            .ok_or_else(|| Error::InvalidArgument(format!("region {} has no input '{name}'", self.region_name)))
    }

    pub fn output(&self, name: &str) -> Result<&Output> {
        self.outputs
            .iter()
            .find(|output| output.name() == name)
            .ok_or_else(|| Error::InvalidArgument(format!("region {} has no output '{name}'", self.region_name)))
    }

    /// Gather the values feeding `node` on input `name`.
    pub fn input_for_node<T: Element>(&self, name: &str, node: usize) -> Result<Vec<T>> {
        self.input(name)?.get_input_for_node(node)
    }

    pub fn input_data(&self, name: &str) -> Result<&Array> {
        Ok(self.input(name)?.data())
    }

    pub fn enabled_nodes(&self) -> &NodeSet {
        self.enabled_nodes
    }

    pub fn enabled_nodes_mut(&mut self) -> &mut NodeSet {
        self.enabled_nodes
    }
}

/// Node-type specific computation body.
pub trait RegionImpl: Send {
    /// Called once, after every buffer of the network is allocated.
    fn initialize(&mut self, _io: &mut RegionIo<'_>) -> Result<()> {
        Ok(())
    }

    fn compute(&mut self, io: &mut RegionIo<'_>) -> Result<()>;

    /// Elements per node on an output whose declared count is 0.
    fn node_output_element_count(&self, output: &str) -> Result<usize>;

    /// Current value of a named parameter. Unknown names are `InvalidArgument`.
    fn get_parameter(&self, name: &str) -> Result<ParamValue> {
        Err(Error::InvalidArgument(format!("unknown parameter '{name}'")))
    }

    /// Change a named parameter between computes.
    fn set_parameter(&mut self, name: &str, _value: ParamValue) -> Result<()> {
        Err(Error::InvalidArgument(format!("unknown parameter '{name}'")))
    }

    fn execute_command(&mut self, args: &[String]) -> Result<String> {
        Err(Error::InvalidArgument(format!(
            "unsupported command '{}'",
            args.first().map(String::as_str).unwrap_or_default()
        )))
    }
}

type ImplConstructor = Box<dyn Fn(&str, &ValueMap) -> Result<Box<dyn RegionImpl>> + Send + Sync>;

struct NodeType {
    spec: NodeSpec,
    constructor: ImplConstructor,
}

/// Registry of node types, keyed by name.
pub struct RegionImplFactory {
    node_types: BTreeMap<String, NodeType>,
}

impl RegionImplFactory {
    pub fn new() -> Self {
        Self {
            node_types: BTreeMap::new(),
        }
    }

    /// Registry holding `TestNode`.
    pub fn with_builtins() -> Self {
        let mut factory = Self::new();
        factory.insert(TestNode::NODE_TYPE, TestNode::node_spec(), |name, params| {
            Ok(Box::new(TestNode::new(name, params)?))
        });
        factory
    }

    pub fn register<F>(&mut self, node_type: &str, spec: NodeSpec, constructor: F) -> Result<()>
    where
        F: Fn(&str, &ValueMap) -> Result<Box<dyn RegionImpl>> + Send + Sync + 'static,
    {
        if self.node_types.contains_key(node_type) {
            return Err(Error::InvalidArgument(format!("node type '{node_type}' is already registered")));
        }
        self.insert(node_type, spec, constructor);
        Ok(())
    }

    fn insert<F>(&mut self, node_type: &str, spec: NodeSpec, constructor: F)
    where
        F: Fn(&str, &ValueMap) -> Result<Box<dyn RegionImpl>> + Send + Sync + 'static,
    {
        self.node_types.insert(
            node_type.to_string(),
            NodeType {
                spec,
                constructor: Box::new(constructor),
            },
        );
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.node_types.contains_key(node_type)
    }

    pub fn node_types(&self) -> impl Iterator<Item = &str> {
        self.node_types.keys().map(String::as_str)
    }

    pub fn node_spec(&self, node_type: &str) -> Result<&NodeSpec> {
        Ok(&self.lookup(node_type)?.spec)
    }

    /// Construct the body for region `region_name`.
    pub fn create(&self, node_type: &str, region_name: &str, params: &ValueMap) -> Result<Box<dyn RegionImpl>> {
        (self.lookup(node_type)?.constructor)(region_name, params)
    }

    fn lookup(&self, node_type: &str) -> Result<&NodeType> {
        self.node_types
            .get(node_type)
            .ok_or_else(|| Error::UnknownNodeType(node_type.to_string()))
    }
}

impl Default for RegionImplFactory {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for RegionImplFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionImplFactory")
            .field("node_types", &self.node_types.keys().collect::<Vec<_>>())
            .finish()
    }
}
