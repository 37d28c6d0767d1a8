//! `TestNode`: a small deterministic node type used to exercise the engine.
//!
//! For each node `n` with gathered input `v` and `k` output elements:
//!
//! ```text
//! out[n*k]     = len(v) + iteration
//! out[n*k + i] = n + sum(v) + (i - 1) * delta      for 1 <= i < k
//! ```

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::node_spec::{InputSpec, NodeSpec, OutputSpec};
use crate::params::{convert, ParamValue, ValueMap};
use crate::region_impl::{RegionImpl, RegionIo};
use crate::types::BasicType;

/// Observer called with the region name at the start of every compute.
pub type ComputeHook = Arc<dyn Fn(&str) + Send + Sync>;

pub struct TestNode {
    output_element_count: usize,
    delta: f64,
    iteration: u64,
    hook: Option<ComputeHook>,
}

impl TestNode {
    pub const NODE_TYPE: &'static str = "TestNode";
    pub const INPUT: &'static str = "bottomUpIn";
    pub const OUTPUT: &'static str = "bottomUpOut";

    pub fn node_spec() -> NodeSpec {
        NodeSpec::new("Node for testing the network engine")
            .with_input(
                Self::INPUT,
                InputSpec::new("Primary input for the node", BasicType::Real64).default_input(),
            )
            .with_output(
                Self::OUTPUT,
                OutputSpec::new("Primary output for the node", BasicType::Real64).default_output(),
            )
    }

    /// Parameters: `outputElementCount` (default 2) and `delta` (default 1.0).
    pub fn new(region_name: &str, params: &ValueMap) -> Result<Self> {
        let output_element_count = params.get_u64_or("outputElementCount", 2)? as usize;
        if output_element_count == 0 {
            return Err(Error::InvalidArgument(format!(
                "region {region_name}: outputElementCount must be positive"
            )));
        }
        Ok(Self {
            output_element_count,
            delta: params.get_f64_or("delta", 1.0)?,
            iteration: 0,
            hook: None,
        })
    }

    pub fn with_compute_hook(mut self, hook: ComputeHook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }
}

impl fmt::Debug for TestNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestNode")
            .field("output_element_count", &self.output_element_count)
            .field("delta", &self.delta)
            .field("iteration", &self.iteration)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

impl RegionImpl for TestNode {
    fn compute(&mut self, io: &mut RegionIo<'_>) -> Result<()> {
        if let Some(hook) = &self.hook {
            hook(io.region_name());
        }

        let nodes = io.node_count()?;
        let k = self.output_element_count;
        let mut values = vec![0.0; nodes * k];
        for (node, out) in values.chunks_exact_mut(k).enumerate() {
            let input = io.input_for_node::<f64>(Self::INPUT, node)?;
            let sum: f64 = input.iter().sum();
            out[0] = (input.len() as u64 + self.iteration) as f64;
            for (i, slot) in out.iter_mut().enumerate().skip(1) {
                *slot = node as f64 + sum + (i - 1) as f64 * self.delta;
            }
        }

        let output = io.output(Self::OUTPUT)?;
        let mut data = output.data_mut();
        let buffer = data.as_mut_slice::<f64>()?;
        if buffer.len() != values.len() {
            return Err(Error::BufferSizeMismatch {
                expected: values.len(),
                actual: buffer.len(),
            });
        }
        buffer.copy_from_slice(&values);

        self.iteration += 1;
        Ok(())
    }

    fn node_output_element_count(&self, output: &str) -> Result<usize> {
        if output == Self::OUTPUT {
            Ok(self.output_element_count)
        } else {
            Err(Error::InvalidArgument(format!("TestNode has no output '{output}'")))
        }
    }

    /// `delta` and `iteration` are writable; `outputElementCount` is fixed at
    /// construction because it sizes the output buffer.
    fn get_parameter(&self, name: &str) -> Result<ParamValue> {
        match name {
            "outputElementCount" => Ok(ParamValue::from(self.output_element_count)),
            "delta" => Ok(ParamValue::from(self.delta)),
            "iteration" => Ok(ParamValue::from(self.iteration)),
            _ => Err(Error::InvalidArgument(format!("TestNode has no parameter '{name}'"))),
        }
    }

    fn set_parameter(&mut self, name: &str, value: ParamValue) -> Result<()> {
        match name {
            "delta" => self.delta = convert(name, &value, ParamValue::as_f64, "a number")?,
            "iteration" => self.iteration = convert(name, &value, ParamValue::as_u64, "an unsigned integer")?,
            "outputElementCount" => {
                return Err(Error::InvalidArgument(
                    "TestNode parameter 'outputElementCount' is read-only".to_string(),
                ))
            }
            _ => return Err(Error::InvalidArgument(format!("TestNode has no parameter '{name}'"))),
        }
        Ok(())
    }

    fn execute_command(&mut self, args: &[String]) -> Result<String> {
        match args.first().map(String::as_str) {
            Some("iteration") => Ok(self.iteration.to_string()),
            Some("reset") => {
                self.iteration = 0;
                Ok(String::new())
            }
            other => Err(Error::InvalidArgument(format!(
                "TestNode does not support command '{}'",
                other.unwrap_or_default()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters() -> Result<()> {
        let node = TestNode::new("r", &ValueMap::parse(r#"{"outputElementCount": 4, "delta": 0.5}"#)?)?;
        assert_eq!(node.node_output_element_count("bottomUpOut")?, 4);
        assert!(node.node_output_element_count("other").is_err());

        assert!(TestNode::new("r", &ValueMap::parse(r#"{"outputElementCount": 0}"#)?).is_err());
        assert!(TestNode::new("r", &ValueMap::parse(r#"{"delta": "big"}"#)?).is_err());
        Ok(())
    }

    #[test]
    fn parameter_access() -> Result<()> {
        let mut node = TestNode::new("r", &ValueMap::parse(r#"{"delta": 0.5}"#)?)?;
        assert_eq!(node.get_parameter("delta")?, ParamValue::from(0.5));
        assert_eq!(node.get_parameter("outputElementCount")?, ParamValue::from(2u64));

        node.set_parameter("iteration", ParamValue::from(7u64))?;
        assert_eq!(node.iteration(), 7);

        assert!(node.set_parameter("delta", ParamValue::from("wide")).is_err());
        assert!(node.set_parameter("outputElementCount", ParamValue::from(4u64)).is_err());
        assert!(matches!(node.get_parameter("int32Param"), Err(Error::InvalidArgument(_))));
        Ok(())
    }

    #[test]
    fn commands() -> Result<()> {
        let mut node = TestNode::new("r", &ValueMap::default())?;
        assert_eq!(node.execute_command(&["iteration".to_string()])?, "0");
        assert!(node.execute_command(&["explode".to_string()]).is_err());
        assert!(node.execute_command(&[]).is_err());
        Ok(())
    }
}
