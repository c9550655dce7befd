//! OUTPUT-stage operations that pick values out of a finished context.
//!
//! Both take a `spec` input, a list of definition names, and return a map
//! keyed by those names. Definitions the context never saw are left out.

use crate::definitions::get_single_spec;
use crate::error::OperationsError;
use async_trait::async_trait;
use dataflow_core::{
    BoxError, DataFlowError, Inputs, Operation, OperationImplementation, Outputs, RunContext,
    Stage,
};
use serde_json::Value;
use tracing::debug;

/// `get_single`: first value of each selected definition
#[derive(Debug, Clone, Copy, Default)]
pub struct GetSingle;

/// `get_multi`: every value of each selected definition, in insertion order
#[derive(Debug, Clone, Copy, Default)]
pub struct GetMulti;

/// The `get_single` operation
pub fn get_single() -> Operation {
    Operation::new("get_single")
        .with_input("spec", get_single_spec())
        .with_stage(Stage::Output)
}

/// The `get_multi` operation
pub fn get_multi() -> Operation {
    Operation::new("get_multi")
        .with_input("spec", get_single_spec())
        .with_stage(Stage::Output)
}

/// Accepts a single name or a list of names.
fn spec_names(inputs: &Inputs) -> Result<Vec<String>, OperationsError> {
    let invalid = || OperationsError::InvalidInput {
        key: "spec".to_string(),
        expected: "a definition name or a list of definition names",
    };
    match inputs.get("spec") {
        Some(Value::String(name)) => Ok(vec![name.clone()]),
        Some(Value::Array(names)) => names
            .iter()
            .map(|name| name.as_str().map(str::to_string).ok_or_else(invalid))
            .collect(),
        Some(_) => Err(invalid()),
        None => Err(OperationsError::MissingInput("spec".to_string())),
    }
}

/// Values of `name` in the context, or `None` if it has none.
fn values_of(ctx: &RunContext, name: &str) -> Result<Option<Vec<Value>>, OperationsError> {
    let definition = match ctx.definition(name) {
        Ok(definition) => definition,
        Err(DataFlowError::DefinitionNotInContext { .. }) => {
            debug!(context = %ctx.ctx(), definition = %name, "Definition not in context, skipping");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    let values = ctx
        .inputs(&definition)?
        .iter()
        .map(|input| input.value().clone())
        .collect();
    Ok(Some(values))
}

#[async_trait]
impl OperationImplementation for GetSingle {
    async fn run(&self, ctx: &RunContext, inputs: Inputs) -> Result<Outputs, BoxError> {
        let mut output = Outputs::new();
        for name in spec_names(&inputs)? {
            if let Some(first) = values_of(ctx, &name)?.and_then(|values| values.into_iter().next()) {
                output.insert(name, first);
            }
        }
        Ok(output)
    }
}

#[async_trait]
impl OperationImplementation for GetMulti {
    async fn run(&self, ctx: &RunContext, inputs: Inputs) -> Result<Outputs, BoxError> {
        let mut output = Outputs::new();
        for name in spec_names(&inputs)? {
            if let Some(values) = values_of(ctx, &name)? {
                output.insert(name, Value::Array(values));
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataflow_core::{ContextHandle, DataFlow, Definition, ImplementationRegistry, Input, Orchestrator};
    use serde_json::json;
    use std::sync::Arc;

    fn registry() -> ImplementationRegistry {
        let mut registry = ImplementationRegistry::new();
        registry.register_instance("get_single", Arc::new(GetSingle));
        registry.register_instance("get_multi", Arc::new(GetMulti));
        registry
    }

    #[test]
    fn test_spec_names() {
        let single = Inputs::from([("spec".to_string(), json!("sum"))]);
        assert_eq!(spec_names(&single).unwrap(), vec!["sum".to_string()]);

        let list = Inputs::from([("spec".to_string(), json!(["sum", "product"]))]);
        assert_eq!(spec_names(&list).unwrap().len(), 2);

        let bad = Inputs::from([("spec".to_string(), json!([1]))]);
        assert!(matches!(spec_names(&bad), Err(OperationsError::InvalidInput { .. })));
        assert!(matches!(spec_names(&Inputs::new()), Err(OperationsError::MissingInput(_))));
    }

    #[tokio::test]
    async fn test_get_single_skips_absent_definitions() {
        let sum = Definition::new("sum", "int");
        let dataflow = DataFlow::auto([get_single()])
            .with_seed(Input::new(json!(["sum", "product"]), &get_single_spec()));

        let octx = Orchestrator::new(registry()).context().unwrap();
        let (_, output) = octx
            .run_dataflow(&dataflow, Some(ContextHandle::new("c")), vec![Input::new(42, &sum), Input::new(7, &sum)])
            .await
            .unwrap();

        assert_eq!(output, json!({"sum": 42}));
    }

    #[tokio::test]
    async fn test_get_multi_collects_all_values() {
        let word = Definition::new("word", "str");
        let dataflow = DataFlow::auto([get_multi()])
            .with_seed(Input::new(json!(["word", "missing"]), &get_single_spec()));

        let octx = Orchestrator::new(registry()).context().unwrap();
        let (_, output) = octx
            .run_dataflow(&dataflow, None, vec![Input::new("a", &word), Input::new("b", &word)])
            .await
            .unwrap();

        assert_eq!(output, json!({"word": ["a", "b"]}));
    }
}
