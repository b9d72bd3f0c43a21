use thiserror::Error;

/// Node-level kernel errors
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("Missing required option: {0}")]
    MissingRequiredOption(String),
    #[error("Input count violation: got {got}, expected {min}..={max}")]
    InputCountViolation { got: usize, min: usize, max: usize },
    #[error("Invalid option '{option}': {detail}")]
    InvalidOption { option: String, detail: String },
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("Missing coordinate axis: {0}")]
    MissingAxis(String),
    #[error("Compute error: {0}")]
    ComputeError(String),
}

impl From<serde_json::Error> for KernelError {
    fn from(e: serde_json::Error) -> Self {
        KernelError::InvalidOption {
            option: "<json>".to_string(),
            detail: e.to_string(),
        }
    }
}
