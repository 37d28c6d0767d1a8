//! Error types for nta-engine operations

/// Result type for nta-engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building, initializing or running a network
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed value supplied by the caller (bad dimensions, unknown name, out-of-range phase)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation not legal in the current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Operation requires a prior initialize()
    #[error("Not initialized: {0}")]
    NotInitialized(String),

    /// Dimension negotiation did not converge
    #[error("Unable to evaluate all links. The following links could not be evaluated:\n{}", .links.join("\n"))]
    UnresolvedDimensions { links: Vec<String> },

    /// Node or element index lookup out of range
    #[error("Index out of range: {what} index {index} >= {len}")]
    IndexOutOfRange { what: String, index: usize, len: usize },

    /// Typed access with the wrong element type
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Checked raw copy does not fit its destination
    #[error("Buffer size mismatch: expected {expected}, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// No node type registered under this name
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// No link type registered under this name
    #[error("Unknown link type: {0}")]
    UnknownLinkType(String),

    /// Parameter string is not valid JSON
    #[error("Invalid parameters: {0}")]
    Params(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn index_out_of_range(what: impl Into<String>, index: usize, len: usize) -> Self {
        Self::IndexOutOfRange {
            what: what.into(),
            index,
            len,
        }
    }
}
