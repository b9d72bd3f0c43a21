use std::collections::HashMap;
use std::sync::Arc;

use super::{Kernel, KernelKey, KernelSpec};
use crate::error::RequestError;

/// Registry mapping `(module, op)` to kernel implementations, resolved once
/// at startup.
#[derive(Default)]
pub struct KernelRegistry {
    kernels: HashMap<KernelKey, Arc<dyn Kernel>>,
}

impl KernelRegistry {
    pub fn new() -> Self {
        KernelRegistry {
            kernels: HashMap::new(),
        }
    }

    pub fn register(&mut self, kernel: Arc<dyn Kernel>) {
        self.kernels.insert(kernel.spec().key.clone(), kernel);
    }

    pub fn get(&self, key: &KernelKey) -> Result<Arc<dyn Kernel>, RequestError> {
        self.kernels
            .get(key)
            .cloned()
            .ok_or_else(|| RequestError::KernelNotFound(key.to_string()))
    }

    pub fn contains(&self, key: &KernelKey) -> bool {
        self.kernels.contains_key(key)
    }

    /// Capability metadata for every registered kernel.
    pub fn capabilities(&self) -> Vec<KernelSpec> {
        let mut specs: Vec<KernelSpec> =
            self.kernels.values().map(|k| k.spec().clone()).collect();
        specs.sort_by(|a, b| a.key.to_string().cmp(&b.key.to_string()));
        specs
    }
}

/// Create and populate the default registry with the builtin kernel set.
pub fn create_default_registry() -> KernelRegistry {
    let mut registry = KernelRegistry::new();

    registry.register(Arc::new(super::builtin::NoopKernel::new()));
    registry.register(Arc::new(super::builtin::SubsetKernel::new()));
    registry.register(Arc::new(super::builtin::ReduceKernel::average()));
    registry.register(Arc::new(super::builtin::ReduceKernel::sum()));
    registry.register(Arc::new(super::builtin::ReduceKernel::max()));
    registry.register(Arc::new(super::builtin::ReduceKernel::min()));
    registry.register(Arc::new(super::builtin::DiffKernel::new()));

    // Composite decomposition chain; spliced into one master vertex.
    registry.register(Arc::new(super::builtin::CorCovKernel::new()));
    registry.register(Arc::new(super::builtin::EigenKernel::new()));
    registry.register(Arc::new(super::builtin::ProjectKernel::new()));

    registry
}
