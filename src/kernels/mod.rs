//! Kernel execution units: the trait every computation implements, its
//! metadata contract, and the startup-resolved registry.

pub mod builtin;
pub mod registry;

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::data::DataArray;
use crate::domain::Axis;
use crate::error::KernelError;

pub use registry::KernelRegistry;

/// Kernel identity: `(module, op)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KernelKey {
    pub module: String,
    pub op: String,
}

impl KernelKey {
    pub fn new(module: impl Into<String>, op: impl Into<String>) -> Self {
        KernelKey {
            module: module.into(),
            op: op.into(),
        }
    }
}

impl fmt::Display for KernelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.op)
    }
}

/// Capability metadata for one kernel.
#[derive(Debug, Clone)]
pub struct KernelSpec {
    pub key: KernelKey,
    pub title: String,
    pub description: String,
    /// Options that must be present before the pipeline runs.
    pub required_options: Vec<&'static str>,
    pub min_inputs: usize,
    pub max_inputs: usize,
    /// Composite kernels declare a parent grouping name; chains sharing a
    /// parent are spliced into one master node.
    pub parent: Option<String>,
    /// True when the kernel reduces over its declared axes.
    pub reduces: bool,
    /// True when the kernel internally handles mixed space+time reductions;
    /// otherwise the engine splits them into spatial-then-time passes.
    pub handles_decomposition: bool,
}

impl KernelSpec {
    pub fn new(module: &str, op: &str, title: &str, description: &str) -> Self {
        KernelSpec {
            key: KernelKey::new(module, op),
            title: title.to_string(),
            description: description.to_string(),
            required_options: Vec::new(),
            min_inputs: 1,
            max_inputs: usize::MAX,
            parent: None,
            reduces: false,
            handles_decomposition: false,
        }
    }

    pub fn with_inputs(mut self, min: usize, max: usize) -> Self {
        self.min_inputs = min;
        self.max_inputs = max;
        self
    }

    pub fn with_required(mut self, options: Vec<&'static str>) -> Self {
        self.required_options = options;
        self
    }

    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    pub fn reducing(mut self) -> Self {
        self.reduces = true;
        self
    }
}

/// Per-invocation arguments: the reduction axes for this pass plus the
/// operation's options map.
pub struct KernelArgs<'a> {
    pub axes: &'a [Axis],
    pub options: &'a HashMap<String, Value>,
}

impl KernelArgs<'_> {
    pub fn option_usize(&self, key: &str) -> Result<Option<usize>, KernelError> {
        match self.options.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_u64()
                .map(|n| Some(n as usize))
                .ok_or_else(|| KernelError::InvalidOption {
                    option: key.to_string(),
                    detail: format!("expected an unsigned integer, got {v}"),
                }),
        }
    }
}

/// A stateless computation unit, instantiated once per workflow-node instance
/// for the lifetime of one request.
pub trait Kernel: Send + Sync {
    fn spec(&self) -> &KernelSpec;

    /// Compute one cross-section group of prepared (subset, aligned,
    /// grouped) arrays into output arrays.
    fn compute(&self, args: &KernelArgs<'_>, group: &[DataArray])
        -> Result<Vec<DataArray>, KernelError>;
}
