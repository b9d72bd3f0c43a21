//! Recursive depth-first graph evaluation.
//!
//! Every node's output dataset is cached in the request context before it
//! is returned, so diamond-shaped subgraphs compute each node exactly once.
//! Evaluation of one job is single threaded; parallelism lives above in the
//! compute substrate.

use std::collections::HashMap;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::data::{DataArray, Dataset};
use crate::error::{KernelError, RequestError};
use crate::graph::types::{MasterNode, OpNode, SourceNode, WorkflowNode};
use crate::graph::OperationGraph;
use crate::kernels::{KernelArgs, KernelRegistry};
use crate::loader::DataLoader;

use super::context::RequestContext;
use super::preprocess::{align_group, group_along_time, split_reduction_axes, subset_group};

/// Evaluates one compiled operation graph against a loader.
pub struct GraphExecutor<'a> {
    pub graph: &'a OperationGraph,
    pub registry: &'a KernelRegistry,
    pub loader: &'a dyn DataLoader,
}

impl<'a> GraphExecutor<'a> {
    pub fn new(
        graph: &'a OperationGraph,
        registry: &'a KernelRegistry,
        loader: &'a dyn DataLoader,
    ) -> Self {
        GraphExecutor {
            graph,
            registry,
            loader,
        }
    }

    /// Evaluate every result node and return their datasets, tagged with
    /// the request's project and experiment ids.
    pub async fn execute(&self, ctx: &mut RequestContext) -> Result<Vec<Dataset>, RequestError> {
        let mut results = Vec::new();
        for result_id in self.graph.result_operations() {
            let mut dataset = self.evaluate(ctx, result_id.clone()).await?;
            if let Some(project) = &ctx.project {
                dataset
                    .attributes
                    .insert("project".to_string(), serde_json::json!(project));
            }
            if let Some(experiment) = &ctx.experiment {
                dataset
                    .attributes
                    .insert("experiment".to_string(), serde_json::json!(experiment));
            }
            dataset
                .attributes
                .insert("request".to_string(), serde_json::json!(ctx.request_id));
            tracing::info!(node = %result_id, result = %dataset.id, "result materialized");
            results.push(dataset);
        }
        Ok(results)
    }

    fn evaluate<'s>(
        &'s self,
        ctx: &'s mut RequestContext,
        node_id: String,
    ) -> BoxFuture<'s, Result<Dataset, RequestError>> {
        async move {
            if let Some(hit) = ctx.cached(&node_id) {
                tracing::debug!(node = %node_id, "cache hit");
                return Ok(hit.clone());
            }
            let node = self.graph.node(&node_id)?.clone();
            let dataset = match &node {
                WorkflowNode::Source(source) => self.load_source(ctx, source).await?,
                WorkflowNode::Op(op) => {
                    let inputs = self.gather_inputs(ctx, op).await?;
                    run_op(ctx, self.registry, op, inputs)?
                }
                WorkflowNode::Master(master) => self.evaluate_master(ctx, master).await?,
            };
            ctx.store(&node_id, dataset.clone());
            Ok(dataset)
        }
        .boxed()
    }

    async fn load_source(
        &self,
        ctx: &RequestContext,
        node: &SourceNode,
    ) -> Result<Dataset, RequestError> {
        let source = ctx.sources.get(&node.variable_id)?.narrowed_to(&node.variable_id)?;
        let domain = match &source.domain_id {
            Some(id) => Some(ctx.domains.get(id)?.clone()),
            None => None,
        };
        tracing::debug!(variable = %node.variable_id, address = %source.address, "loading source");
        self.loader.load(&source, domain.as_ref()).await
    }

    /// Evaluate every producer feeding a node, in connector order.
    async fn gather_inputs(
        &self,
        ctx: &mut RequestContext,
        op: &OpNode,
    ) -> Result<Vec<Dataset>, RequestError> {
        let mut inputs = Vec::new();
        for connector in &op.connectors {
            for input in &connector.inputs {
                let producer = connector.producers.get(input).ok_or_else(|| {
                    RequestError::UnresolvedInput {
                        node: op.id.clone(),
                        input: input.clone(),
                    }
                })?;
                inputs.push(self.evaluate(ctx, producer.clone()).await?);
            }
        }
        Ok(inputs)
    }

    /// Run a fused composite chain: external inputs are evaluated through
    /// the graph, then the absorbed proxies run in stored dependency order
    /// against a local output map. The proxy publishing the adopted result
    /// id produces the master's dataset.
    async fn evaluate_master(
        &self,
        ctx: &mut RequestContext,
        master: &MasterNode,
    ) -> Result<Dataset, RequestError> {
        tracing::debug!(master = %master.id, proxies = master.proxies.len(), "running composite chain");
        let mut local: HashMap<String, Dataset> = HashMap::new();
        for producer in &master.master_inputs {
            let dataset = self.evaluate(ctx, producer.clone()).await?;
            local.insert(producer.clone(), dataset);
        }

        let mut result: Option<Dataset> = None;
        for proxy in &master.proxies {
            let mut inputs = Vec::new();
            for connector in &proxy.connectors {
                for input in &connector.inputs {
                    let producer = connector.producers.get(input).ok_or_else(|| {
                        RequestError::UnresolvedInput {
                            node: proxy.id.clone(),
                            input: input.clone(),
                        }
                    })?;
                    let dataset = match local.get(producer) {
                        Some(dataset) => dataset.clone(),
                        None => {
                            let dataset = self.evaluate(ctx, producer.clone()).await?;
                            local.insert(producer.clone(), dataset.clone());
                            dataset
                        }
                    };
                    inputs.push(dataset);
                }
            }
            let output = run_op(ctx, self.registry, proxy, inputs)?;
            if proxy.connectors.iter().any(|c| c.output == master.result_id) {
                result = Some(output.clone());
            }
            local.insert(proxy.id.clone(), output);
        }

        result.ok_or_else(|| {
            RequestError::InternalError(format!(
                "composite '{}' never produced its result id '{}'",
                master.id, master.result_id
            ))
        })
    }
}

/// The per-node pipeline: option/input validation, cross-section grouping,
/// subsetting, alignment, calendar grouping, axis decomposition, kernel
/// invocation, result tagging.
fn run_op(
    ctx: &mut RequestContext,
    registry: &KernelRegistry,
    op: &OpNode,
    inputs: Vec<Dataset>,
) -> Result<Dataset, RequestError> {
    let kernel = registry.get(&op.kernel)?;
    let spec = kernel.spec().clone();

    for option in &spec.required_options {
        if !op.config.options.contains_key(*option) {
            return Err(RequestError::kernel(
                &op.id,
                KernelError::MissingRequiredOption(option.to_string()),
            ));
        }
    }
    let got = inputs.len();
    if got < spec.min_inputs || got > spec.max_inputs {
        return Err(RequestError::kernel(
            &op.id,
            KernelError::InputCountViolation {
                got,
                min: spec.min_inputs,
                max: spec.max_inputs,
            },
        ));
    }

    // Cross sections pair arrays positionally across input datasets; a
    // dataset with fewer arrays repeats modulo its length.
    let sections = inputs.iter().map(|d| d.arrays.len()).max().unwrap_or(0);
    let mut outputs: Vec<DataArray> = Vec::new();
    for section in 0..sections {
        let mut group: Vec<DataArray> = inputs
            .iter()
            .filter(|d| !d.arrays.is_empty())
            .map(|d| d.arrays[section % d.arrays.len()].clone())
            .collect();

        subset_group(ctx, op.config.domain.as_deref(), &mut group)?;
        if let Some(strategy) = op.config.align {
            group = align_group(group, strategy)?;
        }
        if let Some(groupby) = &op.config.groupby {
            group = group
                .iter()
                .map(|a| group_along_time(a, groupby, true))
                .collect::<Result<_, _>>()?;
        }
        if let Some(resample) = &op.config.resample {
            group = group
                .iter()
                .map(|a| group_along_time(a, resample, false))
                .collect::<Result<_, _>>()?;
        }

        let (spatial, time) = split_reduction_axes(&op.config.axes);
        let computed = if spec.reduces
            && !spec.handles_decomposition
            && !spatial.is_empty()
            && !time.is_empty()
        {
            // Spatial pass first so latitude weighting sees the grid, then
            // the temporal pass collapses what remains.
            let args = KernelArgs {
                axes: &spatial,
                options: &op.config.options,
            };
            ctx.kernel_invocations += 1;
            let intermediate = kernel
                .compute(&args, &group)
                .map_err(|e| RequestError::kernel(&op.id, e))?;
            let args = KernelArgs {
                axes: &time,
                options: &op.config.options,
            };
            ctx.kernel_invocations += 1;
            kernel
                .compute(&args, &intermediate)
                .map_err(|e| RequestError::kernel(&op.id, e))?
        } else {
            let args = KernelArgs {
                axes: &op.config.axes,
                options: &op.config.options,
            };
            ctx.kernel_invocations += 1;
            kernel
                .compute(&args, &group)
                .map_err(|e| RequestError::kernel(&op.id, e))?
        };
        outputs.extend(computed);
    }

    let output_ids: Vec<String> = op.connectors.iter().map(|c| c.output.clone()).collect();
    tracing::debug!(node = %op.id, kernel = %op.kernel, arrays = outputs.len(), "kernel complete");
    Ok(Dataset::with_arrays(
        ctx.result_tag(&op.kernel, &output_ids),
        outputs,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::{parse_request, RequestFormat};
    use crate::graph::builder::build_graph;
    use crate::graph::splice_into_workflow;
    use crate::kernels::registry::create_default_registry;
    use crate::loader::MemoryLoader;

    fn monthly(n: usize) -> Vec<String> {
        (0..n)
            .map(|i| format!("2000-{:02}-01T00:00:00", i + 1))
            .collect()
    }

    fn loader() -> MemoryLoader {
        let loader = MemoryLoader::new();
        loader.insert_synthetic_grid(
            "collection://test",
            "tas",
            vec![0.0, 30.0, 60.0],
            vec![100.0, 110.0],
            monthly(4),
        );
        loader
    }

    async fn run(json: &str, loader: &MemoryLoader) -> Result<(Vec<Dataset>, usize), RequestError> {
        let schema = parse_request(json, RequestFormat::Json)?;
        let mut graph = build_graph(&schema)?;
        let registry = create_default_registry();
        splice_into_workflow(&mut graph, &registry)?;
        let mut ctx = RequestContext::from_schema(&schema)?;
        let executor = GraphExecutor::new(&graph, &registry, loader);
        let results = executor.execute(&mut ctx).await?;
        Ok((results, ctx.kernel_invocations))
    }

    #[tokio::test]
    async fn test_time_max_over_grid() {
        let loader = loader();
        let (results, _) = run(
            r#"{
            "input": [ { "uri": "collection://test", "name": "tas:v1" } ],
            "operation": [ { "name": "core.max", "input": "v1", "axis": "t", "result": "peak" } ]
        }"#,
            &loader,
        )
        .await
        .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "core.max[peak]");
        let array = &results[0].arrays[0];
        assert_eq!(array.shape, vec![3, 2]);
        // Last time step dominates: 3*10000 + y*100 + x.
        assert_eq!(array.values[0], 30000.0);
        assert_eq!(array.values[5], 30201.0);
    }

    #[tokio::test]
    async fn test_operation_domain_subsets_before_compute() {
        let loader = loader();
        let (results, _) = run(
            r#"{
            "domain": [ { "name": "north", "lat": { "start": 30, "end": 60 } } ],
            "input": [ { "uri": "collection://test", "name": "tas:v1" } ],
            "operation": [ { "name": "core.min", "input": "v1", "domain": "north",
                             "axis": "t", "result": "floor" } ]
        }"#,
            &loader,
        )
        .await
        .unwrap();
        let array = &results[0].arrays[0];
        assert_eq!(array.shape, vec![2, 2]);
        // First time step after the lat cut: y index 1 becomes row 0.
        assert_eq!(array.values[0], 100.0);
    }

    #[tokio::test]
    async fn test_shared_subgraph_computes_once() {
        let loader = loader();
        let (results, invocations) = run(
            r#"{
            "input": [ { "uri": "collection://test", "name": "tas:v1" } ],
            "operation": [
                { "name": "core.noop", "input": "v1", "result": "base" },
                { "name": "core.max", "input": "base", "axis": "t", "result": "hi" },
                { "name": "core.min", "input": "base", "axis": "t", "result": "lo" }
            ]
        }"#,
            &loader,
        )
        .await
        .unwrap();
        assert_eq!(results.len(), 2);
        // noop once plus one reduction per sink.
        assert_eq!(invocations, 3);
    }

    #[tokio::test]
    async fn test_space_time_reduction_decomposes() {
        let loader = loader();
        let (results, invocations) = run(
            r#"{
            "input": [ { "uri": "collection://test", "name": "tas:v1" } ],
            "operation": [ { "name": "core.sum", "input": "v1", "axis": "xyt", "result": "total" } ]
        }"#,
            &loader,
        )
        .await
        .unwrap();
        let array = &results[0].arrays[0];
        assert_eq!(array.shape, Vec::<usize>::new());
        let expected: f64 = (0..4)
            .flat_map(|t| (0..3).flat_map(move |y| (0..2).map(move |x| t * 10000 + y * 100 + x)))
            .sum::<i32>() as f64;
        assert_eq!(array.values[0], expected);
        // One spatial pass and one temporal pass.
        assert_eq!(invocations, 2);
    }

    #[tokio::test]
    async fn test_diff_of_two_variables() {
        let loader = loader();
        loader.insert_synthetic_grid(
            "collection://test",
            "tasmax",
            vec![0.0, 30.0, 60.0],
            vec![100.0, 110.0],
            monthly(4),
        );
        let (results, _) = run(
            r#"{
            "input": [ { "uri": "collection://test", "name": "tasmax:v1, tas:v2" } ],
            "operation": [ { "name": "core.diff", "input": "v1,v2", "result": "delta" } ]
        }"#,
            &loader,
        )
        .await
        .unwrap();
        let array = &results[0].arrays[0];
        assert!(array.values.iter().all(|v| *v == 0.0));
        assert_eq!(array.name, "v1-v2");
    }

    #[tokio::test]
    async fn test_source_nodes_load_only_their_variable() {
        // Two ids on one source declaration: each leaf must yield exactly
        // the array its node declares, or the pairing below would compute
        // v1-v1 and v2-v2 instead of v1-v2.
        let loader = loader();
        let (nt, ny, nx) = (4, 3, 2);
        let mut values = Vec::with_capacity(nt * ny * nx);
        for t in 0..nt {
            for y in 0..ny {
                for x in 0..nx {
                    values.push((t * 10000 + y * 100 + x) as f64 + 5.0);
                }
            }
        }
        let offset_grid = DataArray::new(
            "tasmax",
            vec![
                crate::data::CoordAxis::timestamps("time", monthly(nt)),
                crate::data::CoordAxis::numeric(crate::domain::Axis::Y, "lat", vec![0.0, 30.0, 60.0]),
                crate::data::CoordAxis::numeric(crate::domain::Axis::X, "lon", vec![100.0, 110.0]),
            ],
            values,
        )
        .unwrap();
        loader.insert("collection://test", offset_grid);

        let (results, _) = run(
            r#"{
            "input": [ { "uri": "collection://test", "name": "tasmax:v1, tas:v2" } ],
            "operation": [ { "name": "core.diff", "input": "v1,v2", "result": "delta" } ]
        }"#,
            &loader,
        )
        .await
        .unwrap();
        assert_eq!(results[0].arrays.len(), 1);
        let array = &results[0].arrays[0];
        assert_eq!(array.name, "v1-v2");
        assert!(array.values.iter().all(|v| *v == 5.0));
    }

    #[tokio::test]
    async fn test_composite_chain_end_to_end() {
        let loader = loader();
        let (results, _) = run(
            r#"{
            "input": [ { "uri": "collection://test", "name": "tas:v1" } ],
            "operation": [
                { "name": "decomp.corcov", "input": "v1", "result": "anom" },
                { "name": "decomp.eigen", "input": "anom", "result": "modes", "modes": 2 },
                { "name": "decomp.project", "input": "modes", "result": "pcs" }
            ]
        }"#,
            &loader,
        )
        .await
        .unwrap();
        assert_eq!(results.len(), 1);
        assert!(!results[0].arrays.is_empty());
    }

    #[tokio::test]
    async fn test_missing_required_option_fails() {
        let loader = loader();
        let err = run(
            r#"{
            "input": [ { "uri": "collection://test", "name": "tas:v1" } ],
            "operation": [
                { "name": "decomp.corcov", "input": "v1", "result": "anom" },
                { "name": "decomp.eigen", "input": "anom", "result": "modes" },
                { "name": "decomp.project", "input": "modes", "result": "pcs" }
            ]
        }"#,
            &loader,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RequestError::KernelFailed { .. }));
    }

    #[tokio::test]
    async fn test_unknown_variable_is_data_unavailable() {
        let loader = loader();
        let err = run(
            r#"{
            "input": [ { "uri": "collection://test", "name": "pr:v1" } ],
            "operation": [ { "name": "core.average", "input": "v1", "axis": "t" } ]
        }"#,
            &loader,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RequestError::DataUnavailable { .. }));
    }
}
