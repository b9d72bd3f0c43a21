//! Public request API.

pub mod runner;

pub use runner::{compile_request, RequestRunner, RequestRunnerBuilder};
