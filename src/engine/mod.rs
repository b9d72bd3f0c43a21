//! Execution engine: per-request context, input conditioning, and the
//! recursive graph evaluator.

pub mod context;
pub mod executor;
pub mod preprocess;

pub use context::RequestContext;
pub use executor::GraphExecutor;
