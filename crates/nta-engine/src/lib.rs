//! # nta-engine - Phase-scheduled computation graphs
//!
//! A [`Network`] is a graph of named [`Region`]s. Each region is a grid of
//! nodes (its [`Dimensions`]) running one node type's computation body. Regions
//! expose named [`Output`] buffers and [`Input`] buffers; a [`Link`] routes an
//! output into an input through a [`LinkPolicy`].
//!
//! ## Lifecycle
//!
//! 1. **Build** - add regions, set dimensions where known, link them.
//! 2. **Initialize** - dimensions propagate across links until every region is
//!    concrete, buffers are allocated and splitter maps are built.
//! 3. **Run** - each iteration walks the enabled phases in order; every region
//!    in a phase copies its incoming links into its inputs and computes.
//!
//! ## Example
//!
//! ```text
//! use nta_engine::{Dimensions, Network};
//!
//! let mut net = Network::new();
//! net.add_region_with_dimensions("level1", "TestNode", "", Dimensions::from([8, 4]))?;
//! net.add_region("level2", "TestNode", "")?;
//! net.link("level1", "level2", "TestFanIn2", "", None, None)?;
//!
//! net.run(10)?;
//! assert_eq!(net.region("level2")?.dimensions(), &Dimensions::from([4, 2]));
//! ```
//!
//! ## Modules
//!
//! - [`network`] - regions, phases, callbacks and the run loop
//! - [`link_policy`] - routing policies (`TestFanIn2`, `UniformLink`)
//! - [`region_impl`] - node-type registry and the [`RegionImpl`] trait
//! - [`description`] - serializable topology

pub mod array;
pub mod description;
pub mod dimensions;
pub mod error;
pub mod input;
pub mod instrumentation;
pub mod link;
pub mod link_policy;
pub mod network;
pub mod node_set;
pub mod node_spec;
pub mod output;
pub mod params;
pub mod region;
pub mod region_impl;
pub mod test_node;
pub mod types;

mod negotiate;

pub use array::Array;
pub use description::{LinkDescription, NetworkDescription, RegionDescription};
pub use dimensions::Dimensions;
pub use error::{Error, Result};
pub use input::Input;
pub use instrumentation::{RunMetrics, Timer};
pub use link::Link;
pub use link_policy::{FanIn2Policy, LinkPolicy, LinkPolicyFactory, SplitterMap, UniformLinkPolicy};
pub use network::{Callback, Network, RegionId};
pub use node_set::NodeSet;
pub use node_spec::{InputSpec, NodeSpec, OutputSpec};
pub use output::{LinkKey, Output, SharedArray};
pub use params::{ParamValue, ValueMap};
pub use region::Region;
pub use region_impl::{RegionImpl, RegionImplFactory, RegionIo};
pub use test_node::{ComputeHook, TestNode};
pub use types::{BasicType, Element};
