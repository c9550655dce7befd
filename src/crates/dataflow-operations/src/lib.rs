//! # dataflow-operations - Built-in operations
//!
//! Reusable operations for `dataflow-core`:
//!
//! - **[Output](output)** - `get_single` and `get_multi` pick values out of a
//!   finished context in the OUTPUT stage
//! - **[Mapping](mapping)** - extract from, build and fan out map values
//!
//! Each operation comes as a constructor returning its [`Operation`]; the
//! implementations are added to a registry with [`register_builtins`].
//!
//! ```rust,ignore
//! use dataflow_core::{DataFlow, ImplementationRegistry, Input, Orchestrator};
//! use dataflow_operations::{definitions, output, register_builtins};
//! use serde_json::json;
//!
//! let mut registry = ImplementationRegistry::new();
//! register_builtins(&mut registry);
//!
//! let dataflow = DataFlow::auto([my_operation(), output::get_single()])
//!     .with_seed(Input::new(json!(["result"]), &definitions::get_single_spec()));
//! let orchestrator = Orchestrator::new(registry);
//! ```

pub mod definitions;
pub mod error;
pub mod mapping;
pub mod output;

pub use error::{OperationsError, Result};
pub use output::{GetMulti, GetSingle};

use dataflow_core::{ImplementationRegistry, Operation};
use std::sync::Arc;

/// Every built-in operation
pub fn builtin_operations() -> Vec<Operation> {
    vec![
        output::get_single(),
        output::get_multi(),
        mapping::mapping_extract_value(),
        mapping::create_mapping(),
        mapping::mapping_expand_all_keys(),
        mapping::mapping_expand_all_values(),
    ]
}

/// Register every built-in implementation under its operation name
pub fn register_builtins(registry: &mut ImplementationRegistry) -> &mut ImplementationRegistry {
    registry
        .register_instance("get_single", Arc::new(GetSingle))
        .register_instance("get_multi", Arc::new(GetMulti))
        .register_fn("mapping_extract_value", mapping::run_extract_value)
        .register_fn("create_mapping", mapping::run_create_mapping)
        .register_fn("mapping_expand_all_keys", mapping::run_expand_all_keys)
        .register_fn("mapping_expand_all_values", mapping::run_expand_all_values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_builtin_is_registered() {
        let mut registry = ImplementationRegistry::new();
        register_builtins(&mut registry);

        for operation in builtin_operations() {
            assert!(registry.contains(&operation.name), "{} not registered", operation.name);
        }
    }
}
