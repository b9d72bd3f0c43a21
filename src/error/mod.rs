//! Error types for the request engine.
//!
//! - [`KernelError`] — Errors raised while preparing or running one kernel node.
//! - [`RequestError`] — Top-level errors for request parsing, graph compilation,
//!   and job execution.

pub mod kernel_error;
pub mod request_error;

pub use kernel_error::KernelError;
pub use request_error::RequestError;

/// Convenience alias for request-level results.
pub type RequestResult<T> = Result<T, RequestError>;
/// Convenience alias for kernel-level results.
pub type KernelResult<T> = Result<T, KernelError>;
