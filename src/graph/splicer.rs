//! Master-node splicing: chains of operations whose kernels share a declared
//! parent are fused into one graph vertex with one external input set and
//! exactly one external output id.
//!
//! Detection runs depth-first from each result node; candidate masters are
//! collapsed with a union-find keyed by parent name, so overlapping
//! traversals merge their proxy, master-input, and master-output sets
//! instead of duplicating vertices.

use std::collections::{HashMap, HashSet};

use crate::error::RequestError;
use crate::kernels::KernelRegistry;

use super::builder::OperationGraph;
use super::types::{Connector, MasterNode, WorkflowNode};

#[derive(Debug, Default)]
struct MasterBuilder {
    parent: String,
    proxies: HashSet<String>,
    inputs: HashSet<String>,
}

struct SpliceState {
    builders: Vec<MasterBuilder>,
    uf: Vec<usize>,
    node_master: HashMap<String, usize>,
    visited: HashSet<(String, Option<usize>)>,
}

impl SpliceState {
    fn find(&mut self, mut i: usize) -> usize {
        while self.uf[i] != i {
            self.uf[i] = self.uf[self.uf[i]];
            i = self.uf[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) -> usize {
        let a = self.find(a);
        let b = self.find(b);
        if a == b {
            return a;
        }
        let absorbed = std::mem::take(&mut self.builders[b]);
        self.uf[b] = a;
        self.builders[a].proxies.extend(absorbed.proxies);
        self.builders[a].inputs.extend(absorbed.inputs);
        a
    }

    fn new_builder(&mut self, parent: &str) -> usize {
        self.builders.push(MasterBuilder {
            parent: parent.to_string(),
            ..Default::default()
        });
        self.uf.push(self.builders.len() - 1);
        self.builders.len() - 1
    }
}

/// Detect composite chains and fuse each into a [`MasterNode`].
pub fn splice_into_workflow(
    graph: &mut OperationGraph,
    registry: &KernelRegistry,
) -> Result<(), RequestError> {
    let mut state = SpliceState {
        builders: Vec::new(),
        uf: Vec::new(),
        node_master: HashMap::new(),
        visited: HashSet::new(),
    };

    for result_id in graph.result_operations() {
        visit(graph, registry, &mut state, &result_id, None)?;
    }

    // Materialize each surviving builder root.
    let roots: Vec<usize> = (0..state.builders.len())
        .filter(|&i| state.find(i) == i && !state.builders[i].proxies.is_empty())
        .collect();

    for (sequence, root) in roots.into_iter().enumerate() {
        let builder = &state.builders[root];
        let master = build_master(graph, builder, sequence)?;
        tracing::debug!(
            master = %master.id,
            proxies = master.proxies.len(),
            result = %master.result_id,
            "splicing composite chain"
        );
        graph.splice_master(master)?;
    }

    Ok(())
}

fn visit(
    graph: &OperationGraph,
    registry: &KernelRegistry,
    state: &mut SpliceState,
    node_id: &str,
    active: Option<usize>,
) -> Result<(), RequestError> {
    let node = graph.node(node_id)?;
    let active_root = active.map(|a| state.find(a));

    // Already absorbed by an earlier traversal: merge when the active master
    // shares the parent name, then continue below it. The union must run
    // before the visited short-circuit or a proxy shared between two
    // traversals keeps two separate builders.
    if let Some(&existing) = state.node_master.get(node_id) {
        let existing = state.find(existing);
        let merged = match active_root {
            Some(root) if state.builders[root].parent == state.builders[existing].parent => {
                state.union(root, existing)
            }
            _ => existing,
        };
        if !state.visited.insert((node_id.to_string(), Some(merged))) {
            return Ok(());
        }
        for (_, producer) in graph.inputs_of(node_id)? {
            visit(graph, registry, state, &producer, Some(merged))?;
        }
        return Ok(());
    }

    if !state.visited.insert((node_id.to_string(), active_root)) {
        return Ok(());
    }

    let parent = match node.kernel_key() {
        Some(key) => registry.get(key)?.spec().parent.clone(),
        None => None,
    };

    let child_active = match parent {
        None => {
            // A normal vertex below an active master is one of its external
            // input boundaries; the master stops here for this branch.
            if let Some(root) = active_root {
                state.builders[root].inputs.insert(node_id.to_string());
            }
            None
        }
        Some(parent_name) => {
            let builder = match active_root {
                Some(root) if state.builders[root].parent == parent_name => root,
                _ => state.new_builder(&parent_name),
            };
            state.builders[builder].proxies.insert(node_id.to_string());
            state.node_master.insert(node_id.to_string(), builder);
            Some(builder)
        }
    };

    for (_, producer) in graph.inputs_of(node_id)? {
        visit(graph, registry, state, &producer, child_active)?;
    }
    Ok(())
}

/// Resolve the builder into a concrete master vertex: exactly one external
/// output id, connector inputs re-homed from the proxies.
fn build_master(
    graph: &OperationGraph,
    builder: &MasterBuilder,
    sequence: usize,
) -> Result<MasterNode, RequestError> {
    let proxy_ids = &builder.proxies;

    let mut external_outputs: Vec<String> = Vec::new();
    let mut external_consumers: HashSet<String> = HashSet::new();
    let mut inputs: Vec<String> = Vec::new();
    let mut producers: HashMap<String, String> = HashMap::new();

    // Proxies in dependency order for internal evaluation.
    let mut ordered_proxies = Vec::new();
    if let Ok(order) = petgraph::algo::toposort(&graph.graph, None) {
        for idx in order {
            if let Some(WorkflowNode::Op(op)) = graph.graph.node_weight(idx) {
                if proxy_ids.contains(&op.id) {
                    ordered_proxies.push(op.clone());
                }
            }
        }
    }

    for proxy in &ordered_proxies {
        for connector in &proxy.connectors {
            let externals: Vec<&String> = connector
                .consumers
                .iter()
                .filter(|c| !proxy_ids.contains(*c))
                .collect();
            if !externals.is_empty() || connector.consumers.is_empty() {
                if !external_outputs.contains(&connector.output) {
                    external_outputs.push(connector.output.clone());
                }
                external_consumers.extend(externals.into_iter().cloned());
            }
            for input in &connector.inputs {
                if let Some(producer) = connector.producers.get(input) {
                    if !proxy_ids.contains(producer) && !inputs.contains(input) {
                        inputs.push(input.clone());
                        producers.insert(input.clone(), producer.clone());
                    }
                }
            }
        }
    }

    if external_outputs.len() != 1 {
        return Err(RequestError::AmbiguousMasterOutput(
            builder.parent.clone(),
            external_outputs.len(),
        ));
    }
    let result_id = external_outputs.remove(0);

    let connector = Connector {
        output: result_id.clone(),
        inputs,
        producers,
        consumers: external_consumers.iter().cloned().collect(),
    };

    Ok(MasterNode {
        id: format!("master.{}-{}", builder.parent, sequence),
        parent: builder.parent.clone(),
        proxies: ordered_proxies,
        master_inputs: builder
            .inputs
            .iter()
            .filter(|i| !proxy_ids.contains(*i))
            .cloned()
            .collect(),
        master_outputs: external_consumers,
        result_id,
        connector,
    })
}
