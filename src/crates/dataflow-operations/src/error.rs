//! Errors raised by the built-in operations.
//!
//! They reach the engine boxed as [`dataflow_core::BoxError`], so the
//! orchestrator reports them wrapped in `OperationExecution`.

use thiserror::Error;

/// Result type for built-in operations
pub type Result<T> = std::result::Result<T, OperationsError>;

/// Errors that can occur in built-in operations
#[derive(Error, Debug)]
pub enum OperationsError {
    /// A required input was not bound
    #[error("Missing input '{0}'")]
    MissingInput(String),

    /// An input had the wrong shape
    #[error("Input '{key}' must be {expected}")]
    InvalidInput {
        /// Input key
        key: String,
        /// Description of the accepted shape
        expected: &'static str,
    },

    /// A traversal key was not found
    #[error("Key '{key}' not found while traversing mapping")]
    KeyNotFound {
        /// Missing key
        key: String,
    },

    /// Engine error
    #[error(transparent)]
    DataFlow(#[from] dataflow_core::DataFlowError),
}
