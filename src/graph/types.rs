use std::collections::{HashMap, HashSet};

use petgraph::stable_graph::NodeIndex;
use serde_json::Value;

use crate::domain::Axis;
use crate::dsl::OperationSpec;
use crate::error::RequestError;
use crate::kernels::KernelKey;

/// A node's named output port, with the input names feeding it. Producer and
/// consumer edges are registered symmetrically when the graph is linked.
#[derive(Debug, Clone, Default)]
pub struct Connector {
    /// Output id under which this port's result is published.
    pub output: String,
    /// Named inputs, in declaration order.
    pub inputs: Vec<String>,
    /// Producer node id per input name; filled by linking.
    pub producers: HashMap<String, String>,
    /// Node ids consuming this output; filled by linking.
    pub consumers: Vec<String>,
}

impl Connector {
    pub fn source(output: impl Into<String>) -> Self {
        Connector {
            output: output.into(),
            ..Default::default()
        }
    }

    pub fn new(output: impl Into<String>, inputs: Vec<String>) -> Self {
        Connector {
            output: output.into(),
            inputs,
            ..Default::default()
        }
    }
}

/// Alignment target policy: the array with the largest or smallest element
/// count becomes the interpolation target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignStrategy {
    Largest,
    Smallest,
}

impl AlignStrategy {
    pub fn parse(token: &str) -> Result<Self, RequestError> {
        match token {
            "largest" => Ok(AlignStrategy::Largest),
            "smallest" => Ok(AlignStrategy::Smallest),
            other => Err(RequestError::ConfigError(format!(
                "unknown alignment strategy '{other}'"
            ))),
        }
    }
}

/// Calendar grouping frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Month,
    Season,
    Year,
}

/// A grouping/resampling directive: `<axis>.<frequency>`, e.g. `t.month`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSpec {
    pub axis: Axis,
    pub frequency: Frequency,
}

impl GroupSpec {
    pub fn parse(token: &str) -> Result<Self, RequestError> {
        let (axis_part, freq_part) = token.split_once('.').ok_or_else(|| {
            RequestError::ConfigError(format!(
                "grouping directive '{token}' is not of the form <axis>.<frequency>"
            ))
        })?;
        let axis = Axis::from_name(axis_part);
        if axis != Axis::T {
            return Err(RequestError::ConfigError(format!(
                "grouping is only supported on the time axis, got '{axis_part}'"
            )));
        }
        let frequency = match freq_part {
            "month" | "monthly" => Frequency::Month,
            "season" | "seasonal" => Frequency::Season,
            "year" | "yearly" | "annual" => Frequency::Year,
            other => {
                return Err(RequestError::ConfigError(format!(
                    "unknown grouping frequency '{other}'"
                )))
            }
        };
        Ok(GroupSpec { axis, frequency })
    }
}

/// Validated per-operation configuration, constructed once at parse time.
#[derive(Debug, Clone, Default)]
pub struct OpConfig {
    pub domain: Option<String>,
    pub axes: Vec<Axis>,
    pub align: Option<AlignStrategy>,
    pub groupby: Option<GroupSpec>,
    pub resample: Option<GroupSpec>,
    pub merge: Option<String>,
    pub options: HashMap<String, Value>,
}

impl OpConfig {
    pub fn from_spec(spec: &OperationSpec) -> Result<Self, RequestError> {
        Ok(OpConfig {
            domain: spec.domain.clone(),
            axes: spec
                .axis
                .as_deref()
                .map(Axis::parse_list)
                .unwrap_or_default(),
            align: spec.align.as_deref().map(AlignStrategy::parse).transpose()?,
            groupby: spec.groupby.as_deref().map(GroupSpec::parse).transpose()?,
            resample: spec.resample.as_deref().map(GroupSpec::parse).transpose()?,
            merge: spec.merge.clone(),
            options: spec.options.clone(),
        })
    }
}

/// Leaf node wrapping one declared variable.
#[derive(Debug, Clone)]
pub struct SourceNode {
    pub id: String,
    pub variable_id: String,
    pub connector: Connector,
}

impl SourceNode {
    pub fn new(variable_id: impl Into<String>) -> Self {
        let variable_id = variable_id.into();
        SourceNode {
            id: variable_id.clone(),
            connector: Connector::source(variable_id.clone()),
            variable_id,
        }
    }
}

/// One kernel invocation.
#[derive(Debug, Clone)]
pub struct OpNode {
    pub id: String,
    pub kernel: KernelKey,
    pub config: OpConfig,
    pub connectors: Vec<Connector>,
}

/// A fused vertex standing in for a chain of proxy nodes that share a
/// composite kernel parent.
#[derive(Debug, Clone)]
pub struct MasterNode {
    pub id: String,
    pub parent: String,
    /// Absorbed internal nodes, with their connectors intact for internal
    /// evaluation.
    pub proxies: Vec<OpNode>,
    /// External node ids feeding the composite.
    pub master_inputs: HashSet<String>,
    /// External node ids consuming the composite.
    pub master_outputs: HashSet<String>,
    /// Adopted external output id.
    pub result_id: String,
    pub connector: Connector,
}

/// A vertex in the operation DAG.
#[derive(Debug, Clone)]
pub enum WorkflowNode {
    Source(SourceNode),
    Op(OpNode),
    Master(MasterNode),
}

impl WorkflowNode {
    pub fn id(&self) -> &str {
        match self {
            WorkflowNode::Source(n) => &n.id,
            WorkflowNode::Op(n) => &n.id,
            WorkflowNode::Master(n) => &n.id,
        }
    }

    pub fn connectors(&self) -> &[Connector] {
        match self {
            WorkflowNode::Source(n) => std::slice::from_ref(&n.connector),
            WorkflowNode::Op(n) => &n.connectors,
            WorkflowNode::Master(n) => std::slice::from_ref(&n.connector),
        }
    }

    pub fn connectors_mut(&mut self) -> &mut [Connector] {
        match self {
            WorkflowNode::Source(n) => std::slice::from_mut(&mut n.connector),
            WorkflowNode::Op(n) => &mut n.connectors,
            WorkflowNode::Master(n) => std::slice::from_mut(&mut n.connector),
        }
    }

    /// A node is a result (sink) when any of its connectors has no consumer.
    /// Only operations qualify: an unconsumed declared variable is ignored,
    /// not materialized as an output.
    pub fn is_result(&self) -> bool {
        !matches!(self, WorkflowNode::Source(_))
            && self.connectors().iter().any(|c| c.consumers.is_empty())
    }

    pub fn kernel_key(&self) -> Option<&KernelKey> {
        match self {
            WorkflowNode::Op(n) => Some(&n.kernel),
            _ => None,
        }
    }
}

/// Node id to petgraph index map.
pub type NodeIndexMap = HashMap<String, NodeIndex>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_spec_parse() {
        assert_eq!(
            GroupSpec::parse("t.month").unwrap(),
            GroupSpec {
                axis: Axis::T,
                frequency: Frequency::Month
            }
        );
        assert_eq!(
            GroupSpec::parse("time.seasonal").unwrap().frequency,
            Frequency::Season
        );
        assert!(GroupSpec::parse("y.month").is_err());
        assert!(GroupSpec::parse("t.decade").is_err());
        assert!(GroupSpec::parse("month").is_err());
    }

    #[test]
    fn test_align_strategy_parse() {
        assert_eq!(AlignStrategy::parse("largest").unwrap(), AlignStrategy::Largest);
        assert!(AlignStrategy::parse("widest").is_err());
    }

    #[test]
    fn test_source_node_is_never_result() {
        let node = WorkflowNode::Source(SourceNode::new("v1"));
        assert!(!node.is_result());
    }
}
