//! Declared interface of a node type.

use crate::types::BasicType;

/// One declared input.
#[derive(Clone, Debug, PartialEq)]
pub struct InputSpec {
    pub description: String,
    pub data_type: BasicType,
    /// `Network::initialize` fails while a required input has no links.
    pub required: bool,
    /// One shared value for the whole region instead of one per node.
    pub region_level: bool,
    pub is_default_input: bool,
}

impl InputSpec {
    pub fn new(description: impl Into<String>, data_type: BasicType) -> Self {
        Self {
            description: description.into(),
            data_type,
            required: false,
            region_level: false,
            is_default_input: false,
        }
    }

    pub fn region_level(mut self) -> Self {
        self.region_level = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_input(mut self) -> Self {
        self.is_default_input = true;
        self
    }
}

/// One declared output.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputSpec {
    pub description: String,
    pub data_type: BasicType,
    /// Elements per node (or per region when region-level); 0 means the
    /// computation body decides via `node_output_element_count`.
    pub count: usize,
    pub region_level: bool,
    pub is_default_output: bool,
}

impl OutputSpec {
    pub fn new(description: impl Into<String>, data_type: BasicType) -> Self {
        Self {
            description: description.into(),
            data_type,
            count: 0,
            region_level: false,
            is_default_output: false,
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn region_level(mut self) -> Self {
        self.region_level = true;
        self
    }

    pub fn default_output(mut self) -> Self {
        self.is_default_output = true;
        self
    }
}

/// The named inputs and outputs a node type exposes, in declaration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeSpec {
    pub description: String,
    pub inputs: Vec<(String, InputSpec)>,
    pub outputs: Vec<(String, OutputSpec)>,
    /// The node type only supports regions with a single node.
    pub single_node_only: bool,
}

impl NodeSpec {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, spec: InputSpec) -> Self {
        self.inputs.push((name.into(), spec));
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, spec: OutputSpec) -> Self {
        self.outputs.push((name.into(), spec));
        self
    }

    pub fn single_node_only(mut self) -> Self {
        self.single_node_only = true;
        self
    }

    pub fn input(&self, name: &str) -> Option<&InputSpec> {
        self.inputs.iter().find(|(n, _)| n == name).map(|(_, spec)| spec)
    }

    pub fn output(&self, name: &str) -> Option<&OutputSpec> {
        self.outputs.iter().find(|(n, _)| n == name).map(|(_, spec)| spec)
    }

    /// The input flagged default, else the only input.
    pub fn default_input_name(&self) -> Option<&str> {
        self.inputs
            .iter()
            .find(|(_, spec)| spec.is_default_input)
            .or_else(|| single(&self.inputs))
            .map(|(name, _)| name.as_str())
    }

    /// The output flagged default, else the only output.
    pub fn default_output_name(&self) -> Option<&str> {
        self.outputs
            .iter()
            .find(|(_, spec)| spec.is_default_output)
            .or_else(|| single(&self.outputs))
            .map(|(name, _)| name.as_str())
    }
}

fn single<T>(entries: &[T]) -> Option<&T> {
    match entries {
        [only] => Some(only),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_names() {
        let spec = NodeSpec::new("two outputs")
            .with_input("in", InputSpec::new("", BasicType::Real32))
            .with_output("a", OutputSpec::new("", BasicType::Real32).with_count(3))
            .with_output("b", OutputSpec::new("", BasicType::Real32).default_output());

        assert_eq!(spec.default_input_name(), Some("in"));
        assert_eq!(spec.default_output_name(), Some("b"));
        assert_eq!(spec.output("a").map(|output| output.count), Some(3));
    }

    #[test]
    fn ambiguous_default_is_none() {
        let spec = NodeSpec::new("")
            .with_input("x", InputSpec::new("", BasicType::Byte))
            .with_input("y", InputSpec::new("", BasicType::Byte));
        assert_eq!(spec.default_input_name(), None);
        assert!(spec.input("y").is_some());
        assert!(spec.output("y").is_none());
    }
}
