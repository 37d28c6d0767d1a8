//! Link routing policies
//!
//! A [`LinkPolicy`] decides how the nodes of a link's source region map onto
//! the nodes of its destination region. It does two jobs:
//!
//! 1. **Dimension induction** - given one endpoint's dimensions, compute the
//!    other's (`set_src_dimensions` / `set_dest_dimensions`).
//! 2. **Proto splitter map** - for each destination node, the ordered list of
//!    source-relative element offsets feeding it.
//!
//! Policies are created by name from a [`LinkPolicyFactory`] owned by the
//! network:
//!
//! ```text
//! let factory = LinkPolicyFactory::with_builtins();
//! let policy = factory.create("UniformLink", r#"{"mapping": "in", "rfSize": [2]}"#)?;
//! ```

mod fan_in;
mod uniform;

use std::collections::BTreeMap;
use std::fmt;

use crate::dimensions::Dimensions;
use crate::error::{Error, Result};
use crate::params::ValueMap;

pub use fan_in::FanIn2Policy;
pub use uniform::UniformLinkPolicy;

/// For each destination node, the element offsets that feed it.
pub type SplitterMap = Vec<Vec<usize>>;

/// Routing algorithm carried by a link.
pub trait LinkPolicy: Send {
    /// Record the source endpoint shape and induce the destination shape.
    fn set_src_dimensions(&mut self, dims: &Dimensions) -> Result<()>;

    /// Record the destination endpoint shape and induce the source shape.
    fn set_dest_dimensions(&mut self, dims: &Dimensions) -> Result<()>;

    fn src_dimensions(&self) -> &Dimensions;

    fn dest_dimensions(&self) -> &Dimensions;

    /// Elements each source node contributes.
    fn set_node_output_element_count(&mut self, count: usize);

    /// Called once both endpoints are concrete.
    fn initialize(&mut self) -> Result<()>;

    fn is_initialized(&self) -> bool;

    /// Append source-relative offsets to `map`, which holds one (empty) entry
    /// per destination node. Must be deterministic.
    fn build_proto_splitter_map(&self, map: &mut SplitterMap) -> Result<()>;
}

type PolicyConstructor = Box<dyn Fn(&ValueMap) -> Result<Box<dyn LinkPolicy>> + Send + Sync>;

/// Registry of link types, keyed by name.
pub struct LinkPolicyFactory {
    constructors: BTreeMap<String, PolicyConstructor>,
}

impl LinkPolicyFactory {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// `TestFanIn2` and `UniformLink`.
    pub fn with_builtins() -> Self {
        let mut factory = Self::new();
        factory.insert(FanIn2Policy::LINK_TYPE, |_| Ok(Box::new(FanIn2Policy::new())));
        factory.insert(UniformLinkPolicy::LINK_TYPE, |params| {
            Ok(Box::new(UniformLinkPolicy::from_params(params)?))
        });
        factory
    }

    /// Add a link type. Names must be unique.
    pub fn register<F>(&mut self, link_type: &str, constructor: F) -> Result<()>
    where
        F: Fn(&ValueMap) -> Result<Box<dyn LinkPolicy>> + Send + Sync + 'static,
    {
        if self.constructors.contains_key(link_type) {
            return Err(Error::InvalidArgument(format!("link type '{link_type}' is already registered")));
        }
        self.insert(link_type, constructor);
        Ok(())
    }

    fn insert<F>(&mut self, link_type: &str, constructor: F)
    where
        F: Fn(&ValueMap) -> Result<Box<dyn LinkPolicy>> + Send + Sync + 'static,
    {
        self.constructors.insert(link_type.to_string(), Box::new(constructor));
    }

    pub fn contains(&self, link_type: &str) -> bool {
        self.constructors.contains_key(link_type)
    }

    pub fn link_types(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Construct a policy from its type name and parameter string.
    pub fn create(&self, link_type: &str, params: &str) -> Result<Box<dyn LinkPolicy>> {
        let constructor = self
            .constructors
            .get(link_type)
            .ok_or_else(|| Error::UnknownLinkType(link_type.to_string()))?;
        constructor(&ValueMap::parse(params)?)
    }
}

impl Default for LinkPolicyFactory {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for LinkPolicyFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkPolicyFactory")
            .field("link_types", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Check that `map` has one entry per node of `dest`.
pub(crate) fn check_map_len(map: &SplitterMap, dest: &Dimensions) -> Result<()> {
    let expected = dest.count()?;
    if map.len() != expected {
        return Err(Error::BufferSizeMismatch {
            expected,
            actual: map.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered() {
        let factory = LinkPolicyFactory::default();
        assert_eq!(factory.link_types().collect::<Vec<_>>(), vec!["TestFanIn2", "UniformLink"]);
    }

    #[test]
    fn unknown_type_is_reported() {
        let err = LinkPolicyFactory::with_builtins().create("Nope", "").err();
        assert!(matches!(err, Some(Error::UnknownLinkType(name)) if name == "Nope"));
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut factory = LinkPolicyFactory::with_builtins();
        let result = factory.register("TestFanIn2", |_| Ok(Box::new(FanIn2Policy::new())));
        assert!(matches!(result, Err(Error::InvalidArgument(_))));

        assert!(factory.register("Other", |_| Ok(Box::new(FanIn2Policy::new()))).is_ok());
        assert!(factory.contains("Other"));
    }
}
