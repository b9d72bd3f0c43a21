//! Request-level error types.

use super::KernelError;
use thiserror::Error;

/// Request-level errors
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Request parse error: {0}")]
    ParseError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Unresolved input '{input}' on operation '{node}'")]
    UnresolvedInput { node: String, input: String },
    #[error("Master node '{0}' has {1} external output ids, expected exactly one")]
    AmbiguousMasterOutput(String, usize),
    #[error("Empty intersection on axis '{axis}': {detail}")]
    EmptyIntersection { axis: String, detail: String },
    #[error("Node not found: {0}")]
    NodeNotFound(String),
    #[error("Kernel not found: {0}")]
    KernelNotFound(String),
    #[error("Domain not found: {0}")]
    DomainNotFound(String),
    #[error("Variable not found: {0}")]
    VariableNotFound(String),
    #[error("Cycle detected in operation graph")]
    CycleDetected,
    #[error("Conflicting merge for key {0}")]
    ConflictingMerge(String),
    #[error("Unknown merge method: {0}")]
    UnknownMergeMethod(String),
    #[error("Data unavailable for source '{address}': {detail}")]
    DataUnavailable { address: String, detail: String },
    #[error("Job dispatch error: {0}")]
    DispatchError(String),
    #[error("Kernel error on node '{node}': {error}")]
    KernelFailed {
        node: String,
        error: Box<KernelError>,
    },
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl RequestError {
    /// Wrap a kernel-level failure with the offending node name.
    pub fn kernel(node: impl Into<String>, error: KernelError) -> Self {
        RequestError::KernelFailed {
            node: node.into(),
            error: Box::new(error),
        }
    }
}
