//! Per-request runtime state: declared domains, declared sources, and the
//! request-scoped node cache.

use std::collections::HashMap;

use crate::data::Dataset;
use crate::domain::{Axis, AxisBounds, BoundValue, CoordSystem, Domain, DomainManager, TimeOffset};
use crate::dsl::{DomainSpec, RequestSchema};
use crate::error::RequestError;
use crate::source::SourceRegistry;

/// Mutable state for one request evaluation. The cache lives exactly as
/// long as the context: entries are written once per node and dropped with
/// the request, never shared across requests.
#[derive(Debug)]
pub struct RequestContext {
    pub request_id: String,
    pub name: Option<String>,
    pub project: Option<String>,
    pub experiment: Option<String>,
    pub workers: usize,
    pub domains: DomainManager,
    pub sources: SourceRegistry,
    cache: HashMap<String, Dataset>,
    pub kernel_invocations: usize,
}

impl RequestContext {
    pub fn from_schema(schema: &RequestSchema) -> Result<Self, RequestError> {
        let mut domains = DomainManager::new();
        for spec in &schema.domain {
            domains.register(build_domain(spec)?);
        }
        Ok(RequestContext {
            request_id: uuid::Uuid::new_v4().to_string(),
            name: schema.name.clone(),
            project: schema.project.clone(),
            experiment: schema.experiment.clone(),
            workers: schema.workers.max(1),
            domains,
            sources: SourceRegistry::from_inputs(&schema.input)?,
            cache: HashMap::new(),
            kernel_invocations: 0,
        })
    }

    pub fn cached(&self, node_id: &str) -> Option<&Dataset> {
        self.cache.get(node_id)
    }

    /// Store a node's output before it is returned, so shared subgraphs
    /// compute once.
    pub fn store(&mut self, node_id: &str, dataset: Dataset) {
        self.cache.insert(node_id.to_string(), dataset);
    }

    /// Result id of a sink node: `kernelName[outputIds]`.
    pub fn result_tag(&self, kernel: impl std::fmt::Display, outputs: &[String]) -> String {
        format!("{}[{}]", kernel, outputs.join(","))
    }
}

/// Resolve one domain declaration into a registered [`Domain`]: axis roles
/// from the declared names, bound endpoints from the raw schema values, and
/// any calendar offset applied up front.
fn build_domain(spec: &DomainSpec) -> Result<Domain, RequestError> {
    let mut domain = Domain::new(&spec.name);
    for (axis_name, axis_spec) in &spec.axes {
        let axis = Axis::from_name(axis_name);
        if axis == Axis::Unknown {
            return Err(RequestError::ConfigError(format!(
                "unknown axis '{axis_name}' in domain '{}'",
                spec.name
            )));
        }
        let start = BoundValue::from_json(&axis_spec.start)?;
        let end = BoundValue::from_json(&axis_spec.end)?;
        let mut system = CoordSystem::from_token(axis_spec.system.as_deref())?;
        // Timestamp endpoints imply a timestamp window even without an
        // explicit system token.
        if system == CoordSystem::Values
            && (matches!(start, BoundValue::Time(_)) || matches!(end, BoundValue::Time(_)))
        {
            system = CoordSystem::Timestamps;
        }
        let mut bounds = AxisBounds::new(axis, axis_name.as_str(), start, end, system)?;
        bounds.step = axis_spec.step;
        if let Some(offset_spec) = &axis_spec.offset {
            bounds = bounds.offset(&TimeOffset::parse(offset_spec)?)?;
        }
        domain = domain.with_axis(bounds);
    }
    Ok(domain)
}
