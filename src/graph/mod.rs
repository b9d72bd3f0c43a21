//! Operation graph: node/connector types, the builder that links named
//! inputs to producer outputs, and the master-node splicer that fuses
//! composite kernel chains.

pub mod builder;
pub mod splicer;
pub mod types;

pub use builder::{build_graph, OperationGraph};
pub use splicer::splice_into_workflow;
pub use types::{
    AlignStrategy, Connector, Frequency, GroupSpec, MasterNode, OpConfig, OpNode, SourceNode,
    WorkflowNode,
};
