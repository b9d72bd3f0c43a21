//! # Gridflow — an analytic-request compiler and execution engine
//!
//! `gridflow` compiles declarative analytic requests over large
//! multi-dimensional geospatial/temporal datasets into operation DAGs and
//! evaluates them against pluggable data loaders. It provides:
//!
//! - **Request DSL**: JSON/YAML requests declaring named domains (coordinate
//!   windows with calendar offsets), data sources, and chained operations.
//! - **Domain algebra**: axis-bounds intersection, extent cropping, and
//!   calendar offset arithmetic with transparent reversion on outputs.
//! - **Graph compilation**: named-connector linking into a
//!   `petgraph`-backed DAG, cycle detection, and master-node splicing that
//!   fuses composite kernel chains into single vertices.
//! - **Execution**: recursive depth-first evaluation with a request-scoped
//!   cache, pending-domain subsetting with provenance, time-axis alignment,
//!   calendar grouping/resampling, and spatial-then-time axis
//!   decomposition.
//! - **Merge & dispatch**: union or best-candidate merging of parallel
//!   branches and worker replicas run on a swappable compute substrate.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gridflow::dsl::{parse_request, RequestFormat};
//! use gridflow::loader::MemoryLoader;
//! use gridflow::RequestRunner;
//!
//! #[tokio::main]
//! async fn main() {
//!     let json = std::fs::read_to_string("request.json").unwrap();
//!     let schema = parse_request(&json, RequestFormat::Json).unwrap();
//!     let results = RequestRunner::builder(schema)
//!         .loader(Arc::new(MemoryLoader::new()))
//!         .build()
//!         .unwrap()
//!         .run()
//!         .await
//!         .unwrap();
//!     for dataset in &results {
//!         println!("{}: {} arrays", dataset.id, dataset.arrays.len());
//!     }
//! }
//! ```

pub mod api;
pub mod data;
pub mod domain;
pub mod dsl;
pub mod engine;
pub mod error;
pub mod graph;
pub mod kernels;
pub mod loader;
pub mod merge;
pub mod source;
pub mod substrate;

pub use crate::api::{compile_request, RequestRunner, RequestRunnerBuilder};
pub use crate::data::{CoordAxis, DataArray, Dataset, ReduceOp};
pub use crate::domain::{Axis, AxisBounds, BoundValue, CoordSystem, Domain, DomainManager, TimeOffset};
pub use crate::dsl::{parse_request, validate_request_schema, RequestFormat, RequestSchema};
pub use crate::engine::{GraphExecutor, RequestContext};
pub use crate::error::{KernelError, KernelResult, RequestError, RequestResult};
pub use crate::graph::{build_graph, splice_into_workflow, OperationGraph};
pub use crate::kernels::{Kernel, KernelKey, KernelRegistry, KernelSpec};
pub use crate::loader::{DataLoader, MemoryLoader};
pub use crate::merge::MergePolicy;
pub use crate::substrate::{ComputeSubstrate, Job, LocalSubstrate, SubstrateMetrics};
