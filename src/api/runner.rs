//! The one-stop entry point: compile a request and run it to result
//! datasets.

use std::sync::Arc;

use futures::FutureExt;

use crate::data::Dataset;
use crate::dsl::{validate_request_schema, RequestSchema};
use crate::engine::{GraphExecutor, RequestContext};
use crate::error::RequestError;
use crate::graph::builder::build_graph;
use crate::graph::{splice_into_workflow, OperationGraph};
use crate::kernels::registry::create_default_registry;
use crate::kernels::KernelRegistry;
use crate::loader::DataLoader;
use crate::merge::MergePolicy;
use crate::substrate::{ComputeSubstrate, Job, LocalSubstrate};

/// Compile a validated request into its spliced operation graph.
pub fn compile_request(
    schema: &RequestSchema,
    registry: &KernelRegistry,
) -> Result<OperationGraph, RequestError> {
    validate_request_schema(schema)?;
    let mut graph = build_graph(schema)?;
    splice_into_workflow(&mut graph, registry)?;
    Ok(graph)
}

/// Runs one request end to end: validation, graph compilation, splicing,
/// worker dispatch, merge.
pub struct RequestRunner {
    schema: RequestSchema,
    loader: Arc<dyn DataLoader>,
    registry: Arc<KernelRegistry>,
    substrate: Arc<dyn ComputeSubstrate>,
}

impl RequestRunner {
    pub fn builder(schema: RequestSchema) -> RequestRunnerBuilder {
        RequestRunnerBuilder::new(schema)
    }

    /// Evaluate the request and return its merged result datasets.
    pub async fn run(&self) -> Result<Vec<Dataset>, RequestError> {
        let graph = Arc::new(compile_request(&self.schema, &self.registry)?);
        let workers = self.schema.workers.max(1);
        tracing::info!(
            workers,
            nodes = graph.node_ids().len(),
            "request compiled"
        );

        let policy = MergePolicy::parse(
            self.schema
                .operation
                .iter()
                .find_map(|op| op.merge.as_deref()),
        )?;

        if workers == 1 {
            let mut ctx = RequestContext::from_schema(&self.schema)?;
            let executor = GraphExecutor::new(&graph, &self.registry, self.loader.as_ref());
            let results = executor.execute(&mut ctx).await?;
            return policy.merge(results);
        }

        // Worker replicas run the same graph; completed replicas merge
        // under the request's policy after all return.
        let mut jobs = Vec::with_capacity(workers);
        for worker in 0..workers {
            let graph = Arc::clone(&graph);
            let registry = Arc::clone(&self.registry);
            let loader = Arc::clone(&self.loader);
            let schema = self.schema.clone();
            jobs.push(Job::new(
                format!("worker-{worker}"),
                async move {
                    let mut ctx = RequestContext::from_schema(&schema)?;
                    GraphExecutor::new(&graph, &registry, loader.as_ref())
                        .execute(&mut ctx)
                        .await
                }
                .boxed(),
            ));
        }
        let batches = self.substrate.dispatch(jobs).await?;
        policy.merge(batches.into_iter().flatten().collect())
    }
}

pub struct RequestRunnerBuilder {
    schema: RequestSchema,
    loader: Option<Arc<dyn DataLoader>>,
    registry: Option<Arc<KernelRegistry>>,
    substrate: Option<Arc<dyn ComputeSubstrate>>,
}

impl RequestRunnerBuilder {
    pub fn new(schema: RequestSchema) -> Self {
        RequestRunnerBuilder {
            schema,
            loader: None,
            registry: None,
            substrate: None,
        }
    }

    pub fn loader(mut self, loader: Arc<dyn DataLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn kernels(mut self, registry: Arc<KernelRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn substrate(mut self, substrate: Arc<dyn ComputeSubstrate>) -> Self {
        self.substrate = Some(substrate);
        self
    }

    pub fn build(self) -> Result<RequestRunner, RequestError> {
        let loader = self
            .loader
            .ok_or_else(|| RequestError::ConfigError("a data loader is required".into()))?;
        Ok(RequestRunner {
            schema: self.schema,
            loader,
            registry: self
                .registry
                .unwrap_or_else(|| Arc::new(create_default_registry())),
            substrate: self
                .substrate
                .unwrap_or_else(|| Arc::new(LocalSubstrate::new())),
        })
    }
}
