use std::collections::HashSet;

use petgraph::stable_graph::{NodeIndex, StableDiGraph};

use crate::dsl::RequestSchema;
use crate::error::RequestError;
use crate::kernels::KernelKey;

use super::types::*;

/// A dependency edge: the producer's output id consumed under a named input.
#[derive(Debug, Clone)]
pub struct LinkEdge {
    pub output_id: String,
}

/// The linked operation DAG for one request.
#[derive(Debug)]
pub struct OperationGraph {
    pub graph: StableDiGraph<WorkflowNode, LinkEdge>,
    pub node_index_map: NodeIndexMap,
}

impl OperationGraph {
    pub fn node(&self, node_id: &str) -> Result<&WorkflowNode, RequestError> {
        let idx = self
            .node_index_map
            .get(node_id)
            .ok_or_else(|| RequestError::NodeNotFound(node_id.to_string()))?;
        self.graph
            .node_weight(*idx)
            .ok_or_else(|| RequestError::NodeNotFound(node_id.to_string()))
    }

    pub fn node_mut(&mut self, node_id: &str) -> Result<&mut WorkflowNode, RequestError> {
        let idx = self
            .node_index_map
            .get(node_id)
            .ok_or_else(|| RequestError::NodeNotFound(node_id.to_string()))?;
        self.graph
            .node_weight_mut(*idx)
            .ok_or_else(|| RequestError::NodeNotFound(node_id.to_string()))
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.graph
            .node_weights()
            .map(|n| n.id().to_string())
            .collect()
    }

    /// Result (sink) node ids: any connector with no registered consumer.
    pub fn result_operations(&self) -> Vec<String> {
        self.graph
            .node_weights()
            .filter(|n| n.is_result())
            .map(|n| n.id().to_string())
            .collect()
    }

    /// The producers feeding a node, one entry per declared input, in
    /// connector order.
    pub fn inputs_of(&self, node_id: &str) -> Result<Vec<(String, String)>, RequestError> {
        let node = self.node(node_id)?;
        let mut inputs = Vec::new();
        for connector in node.connectors() {
            for input in &connector.inputs {
                let producer = connector.producers.get(input).ok_or_else(|| {
                    RequestError::UnresolvedInput {
                        node: node_id.to_string(),
                        input: input.clone(),
                    }
                })?;
                inputs.push((input.clone(), producer.clone()));
            }
        }
        Ok(inputs)
    }

    fn remove_node(&mut self, node_id: &str) {
        if let Some(idx) = self.node_index_map.remove(node_id) {
            self.graph.remove_node(idx);
        }
    }

    pub(crate) fn insert_node(&mut self, node: WorkflowNode) -> NodeIndex {
        let id = node.id().to_string();
        let idx = self.graph.add_node(node);
        self.node_index_map.insert(id, idx);
        idx
    }

    pub(crate) fn add_edge(&mut self, producer: &str, consumer: &str, output_id: &str) {
        if let (Some(&p), Some(&c)) = (
            self.node_index_map.get(producer),
            self.node_index_map.get(consumer),
        ) {
            self.graph.add_edge(
                p,
                c,
                LinkEdge {
                    output_id: output_id.to_string(),
                },
            );
        }
    }

    /// Replace a set of proxy nodes with a fused master vertex, rewiring the
    /// boundary edges. Used by the splicer.
    pub(crate) fn splice_master(&mut self, master: MasterNode) -> Result<(), RequestError> {
        let proxy_ids: HashSet<String> = master.proxies.iter().map(|p| p.id.clone()).collect();
        let master_id = master.id.clone();
        let result_id = master.connector.output.clone();
        let inputs = master.connector.inputs.clone();
        let producers = master.connector.producers.clone();
        let consumers = master.connector.consumers.clone();

        for proxy_id in &proxy_ids {
            self.remove_node(proxy_id);
        }
        self.insert_node(WorkflowNode::Master(master));

        for input in &inputs {
            if let Some(producer) = producers.get(input) {
                self.add_edge(producer, &master_id, input);
                // The producer's connector now feeds the master.
                let producer_node = self.node_mut(producer)?;
                for connector in producer_node.connectors_mut() {
                    if &connector.output == input {
                        connector.consumers.retain(|c| !proxy_ids.contains(c));
                        connector.consumers.push(master_id.clone());
                    }
                }
            }
        }
        for consumer in &consumers {
            self.add_edge(&master_id, consumer, &result_id);
            let consumer_node = self.node_mut(consumer)?;
            for connector in consumer_node.connectors_mut() {
                for producer in connector.producers.values_mut() {
                    if proxy_ids.contains(producer) {
                        *producer = master_id.clone();
                    }
                }
            }
        }
        Ok(())
    }
}

/// Build the operation graph from a parsed request.
///
/// One [`OpNode`] per operation spec, one [`SourceNode`] per distinct
/// declared variable id. Linking scans all connectors for the unique
/// producer of every named input and registers the edge symmetrically.
pub fn build_graph(schema: &RequestSchema) -> Result<OperationGraph, RequestError> {
    let mut graph = OperationGraph {
        graph: StableDiGraph::new(),
        node_index_map: NodeIndexMap::new(),
    };

    for input in &schema.input {
        for (_, id) in input.variable_pairs() {
            if !graph.node_index_map.contains_key(&id) {
                graph.insert_node(WorkflowNode::Source(SourceNode::new(id)));
            }
        }
    }

    for (index, spec) in schema.operation.iter().enumerate() {
        let (module, op) = spec.kernel_key()?;
        let node = OpNode {
            id: format!("{}.{}-{}", module, op, index),
            kernel: KernelKey::new(module, op),
            config: OpConfig::from_spec(spec)?,
            connectors: spec
                .connectors(index)
                .into_iter()
                .map(|c| Connector::new(c.output, c.inputs))
                .collect(),
        };
        graph.insert_node(WorkflowNode::Op(node));
    }

    create_workflow(&mut graph)?;

    if petgraph::algo::is_cyclic_directed(&graph.graph) {
        return Err(RequestError::CycleDetected);
    }

    Ok(graph)
}

/// Link every named input to its unique producer output.
fn create_workflow(graph: &mut OperationGraph) -> Result<(), RequestError> {
    // (consumer id, input id) -> producer id
    let mut links: Vec<(String, String, String)> = Vec::new();

    for consumer in graph.graph.node_weights() {
        for connector in consumer.connectors() {
            for input in &connector.inputs {
                let mut producer = None;
                for candidate in graph.graph.node_weights() {
                    for candidate_connector in candidate.connectors() {
                        if &candidate_connector.output == input {
                            if producer.is_some() {
                                return Err(RequestError::ConfigError(format!(
                                    "output id '{input}' is produced by more than one operation"
                                )));
                            }
                            producer = Some(candidate.id().to_string());
                        }
                    }
                }
                let producer = producer.ok_or_else(|| RequestError::UnresolvedInput {
                    node: consumer.id().to_string(),
                    input: input.clone(),
                })?;
                links.push((consumer.id().to_string(), input.clone(), producer));
            }
        }
    }

    for (consumer_id, input, producer_id) in links {
        {
            let producer = graph.node_mut(&producer_id)?;
            for connector in producer.connectors_mut() {
                if connector.output == input {
                    connector.consumers.push(consumer_id.clone());
                }
            }
        }
        {
            let consumer = graph.node_mut(&consumer_id)?;
            for connector in consumer.connectors_mut() {
                if connector.inputs.contains(&input) {
                    connector
                        .producers
                        .insert(input.clone(), producer_id.clone());
                }
            }
        }
        graph.add_edge(&producer_id, &consumer_id, &input);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::{parse_request, RequestFormat};

    fn two_step_request(reversed: bool) -> RequestSchema {
        let ops = if reversed {
            r#"[
                { "name": "core.max", "input": "anom", "axis": "t", "result": "peak" },
                { "name": "core.noop", "input": "v1", "result": "anom" }
            ]"#
        } else {
            r#"[
                { "name": "core.noop", "input": "v1", "result": "anom" },
                { "name": "core.max", "input": "anom", "axis": "t", "result": "peak" }
            ]"#
        };
        let json = format!(
            r#"{{
            "input": [ {{ "uri": "collection://x", "name": "tas:v1" }} ],
            "operation": {ops}
        }}"#
        );
        parse_request(&json, RequestFormat::Json).unwrap()
    }

    #[test]
    fn test_build_links_source_to_op() {
        let graph = build_graph(&two_step_request(false)).unwrap();
        assert_eq!(graph.graph.node_count(), 3);
        assert_eq!(graph.graph.edge_count(), 2);

        let noop_id = graph
            .node_ids()
            .into_iter()
            .find(|id| id.starts_with("core.noop"))
            .unwrap();
        let inputs = graph.inputs_of(&noop_id).unwrap();
        assert_eq!(inputs, vec![("v1".to_string(), "v1".to_string())]);
    }

    #[test]
    fn test_result_operations() {
        let graph = build_graph(&two_step_request(false)).unwrap();
        let results = graph.result_operations();
        assert_eq!(results.len(), 1);
        assert!(results[0].starts_with("core.max"));
    }

    #[test]
    fn test_linking_is_order_independent() {
        let a = build_graph(&two_step_request(false)).unwrap();
        let b = build_graph(&two_step_request(true)).unwrap();
        assert_eq!(a.graph.edge_count(), b.graph.edge_count());
        let mut results_a = a.result_operations();
        let mut results_b = b.result_operations();
        results_a.sort();
        results_b.sort();
        // Node ids carry the operation index; compare by kernel prefix.
        assert_eq!(results_a.len(), results_b.len());
        assert!(results_a[0].starts_with("core.max"));
        assert!(results_b[0].starts_with("core.max"));
    }

    #[test]
    fn test_unresolved_input() {
        let json = r#"{
            "input": [ { "uri": "collection://x", "name": "tas:v1" } ],
            "operation": [ { "name": "core.noop", "input": "v9" } ]
        }"#;
        let schema = parse_request(json, RequestFormat::Json).unwrap();
        let err = build_graph(&schema).unwrap_err();
        match err {
            RequestError::UnresolvedInput { input, .. } => assert_eq!(input, "v9"),
            other => panic!("expected UnresolvedInput, got {other}"),
        }
    }

    #[test]
    fn test_duplicate_output_id_rejected() {
        let json = r#"{
            "input": [ { "uri": "collection://x", "name": "tas:v1" } ],
            "operation": [
                { "name": "core.noop", "input": "v1", "result": "r" },
                { "name": "core.max", "input": "v1", "result": "r" },
                { "name": "core.min", "input": "r" }
            ]
        }"#;
        let schema = parse_request(json, RequestFormat::Json).unwrap();
        assert!(build_graph(&schema).is_err());
    }

    #[test]
    fn test_fan_out_same_producer_many_consumers() {
        let json = r#"{
            "input": [ { "uri": "collection://x", "name": "tas:v1" } ],
            "operation": [
                { "name": "core.noop", "input": "v1", "result": "base" },
                { "name": "core.max", "input": "base", "axis": "t" },
                { "name": "core.min", "input": "base", "axis": "t" }
            ]
        }"#;
        let schema = parse_request(json, RequestFormat::Json).unwrap();
        let graph = build_graph(&schema).unwrap();
        assert_eq!(graph.result_operations().len(), 2);
        let noop_id = graph
            .node_ids()
            .into_iter()
            .find(|id| id.starts_with("core.noop"))
            .unwrap();
        let node = graph.node(&noop_id).unwrap();
        assert_eq!(node.connectors()[0].consumers.len(), 2);
    }

    #[test]
    fn test_cycle_detected() {
        let json = r#"{
            "operation": [
                { "name": "core.noop", "input": "b", "result": "a" },
                { "name": "core.noop", "input": "a", "result": "b" }
            ]
        }"#;
        let schema = parse_request(json, RequestFormat::Json).unwrap();
        assert!(matches!(
            build_graph(&schema),
            Err(RequestError::CycleDetected)
        ));
    }
}
