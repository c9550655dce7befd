//! Error types for dataflow construction and execution
//!
//! Every fallible engine operation returns [`Result`], an alias over
//! [`DataFlowError`]. Operation implementations report their own failures as a
//! boxed [`std::error::Error`] ([`BoxError`]); the engine wraps those into
//! [`DataFlowError::OperationExecution`] once the operation's retries are
//! exhausted.
//!
//! # Error Hierarchy
//!
//! ```text
//! DataFlowError
//! ├── NotInstantiable          - No implementation registered for an operation
//! ├── NotInNetwork             - Implementation was never instantiated
//! ├── ContextNotPresent        - Input network queried for an unknown context
//! ├── DefinitionNotInContext   - Context has no inputs of the definition
//! ├── OperationExecution       - Implementation failed after all retries
//! ├── MissingOutputDefinition  - Implementation returned an undeclared output
//! ├── ExpandNotSequence        - Expanded output was not a list
//! ├── Validation               - DataFlow document could not be linked
//! ├── Configuration            - Orchestrator configuration is invalid
//! ├── Store                    - Key/value store failure
//! ├── TaskFailed               - A dispatched task panicked
//! └── Serialization/Yaml/Io    - Loader and exporter failures
//! ```
//!
//! # Propagation
//!
//! Instantiation errors abort orchestrator startup. Execution errors are
//! attached to the dispatch task; in strict mode they abort the owning
//! context's run, otherwise they are logged and the run continues.
//!
//! ```rust
//! use dataflow_core::error::DataFlowError;
//!
//! fn describe(err: &DataFlowError) -> String {
//!     match err {
//!         DataFlowError::OperationExecution { instance_name, attempts, .. } => {
//!             format!("{} gave up after {} attempts", instance_name, attempts)
//!         }
//!         other => other.to_string(),
//!     }
//! }
//! ```

use thiserror::Error;

use crate::store::StoreError;

/// Error type returned by operation implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convenience result type using [`DataFlowError`]
pub type Result<T> = std::result::Result<T, DataFlowError>;

/// Error type for all dataflow engine operations
#[derive(Error, Debug)]
pub enum DataFlowError {
    /// No implementation is registered under the operation's name.
    ///
    /// Raised before any dispatch, while initializing a DataFlow.
    #[error("Operation implementation '{operation}' is not instantiable")]
    NotInstantiable {
        /// Operation (implementation) name that was looked up
        operation: String,
    },

    /// The operation is known but its implementation was never instantiated.
    #[error("Operation implementation for instance '{instance_name}' is not in the network")]
    NotInNetwork {
        /// Instance name of the operation
        instance_name: String,
    },

    /// The input network has never seen this context.
    #[error("Context '{0}' is not present in the input network")]
    ContextNotPresent(String),

    /// The context exists but holds no inputs of the requested definition.
    #[error("Definition '{definition}' not present in context '{context}'")]
    DefinitionNotInContext {
        /// Context that was queried
        context: String,
        /// Definition name that was looked up
        definition: String,
    },

    /// An implementation failed on every attempt.
    #[error("Operation '{instance_name}' failed after {attempts} attempt(s): {source}")]
    OperationExecution {
        /// Instance name of the failing operation
        instance_name: String,
        /// Number of invocations made
        attempts: usize,
        /// The last underlying failure
        #[source]
        source: BoxError,
    },

    /// An implementation returned a key that is not in `Operation::outputs`.
    #[error("Value '{key}' missing from output:definition mapping of '{instance_name}'")]
    MissingOutputDefinition {
        /// Instance name of the operation
        instance_name: String,
        /// Returned output key
        key: String,
    },

    /// An output listed in `Operation::expand` was not a list.
    #[error("Output '{key}' of '{instance_name}' is marked for expansion but is not a list")]
    ExpandNotSequence {
        /// Instance name of the operation
        instance_name: String,
        /// Output key
        key: String,
    },

    /// DataFlow document could not be linked into a DataFlow.
    #[error("DataFlow validation failed: {0}")]
    Validation(String),

    /// Invalid orchestrator configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Key/value store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A dispatched task panicked.
    #[error("Dispatched task failed: {0}")]
    TaskFailed(String),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DataFlowError {
    /// Create a [`DataFlowError::NotInstantiable`] error.
    pub fn not_instantiable(operation: impl Into<String>) -> Self {
        Self::NotInstantiable {
            operation: operation.into(),
        }
    }

    /// Create a [`DataFlowError::NotInNetwork`] error.
    pub fn not_in_network(instance_name: impl Into<String>) -> Self {
        Self::NotInNetwork {
            instance_name: instance_name.into(),
        }
    }

    /// Create a [`DataFlowError::OperationExecution`] error.
    pub fn operation_execution(
        instance_name: impl Into<String>,
        attempts: usize,
        source: BoxError,
    ) -> Self {
        Self::OperationExecution {
            instance_name: instance_name.into(),
            attempts,
            source,
        }
    }

    /// Whether this error came out of an implementation's `run`.
    pub fn is_execution_error(&self) -> bool {
        matches!(self, Self::OperationExecution { .. })
    }
}
