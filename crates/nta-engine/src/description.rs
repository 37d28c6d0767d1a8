//! Serializable network topology
//!
//! A [`NetworkDescription`] captures what is needed to rebuild a network:
//! regions with their node types, parameters, dimensions and phases, and the
//! links between them. Buffers and computation state are not included.

use serde::{Deserialize, Serialize};

use crate::dimensions::Dimensions;
use crate::error::Result;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkDescription {
    #[serde(default)]
    pub regions: Vec<RegionDescription>,
    #[serde(default)]
    pub links: Vec<LinkDescription>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionDescription {
    pub name: String,
    pub node_type: String,
    /// Empty when the dimensions are left to negotiation.
    #[serde(default)]
    pub dimensions: Dimensions,
    #[serde(default)]
    pub phases: Vec<u32>,
    #[serde(default)]
    pub params: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkDescription {
    pub link_type: String,
    #[serde(default)]
    pub params: String,
    pub src_region: String,
    pub src_output: String,
    pub dest_region: String,
    pub dest_input: String,
}

impl NetworkDescription {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
