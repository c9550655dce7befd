//! Operations on map values.

use crate::definitions::{mapping, mapping_key, mapping_traverse, mapping_value};
use crate::error::OperationsError;
use dataflow_core::{BoxError, Inputs, Operation, Outputs, RunContext};
use serde_json::{Map, Value};

/// `mapping_extract_value`: follow `traverse` into `mapping`
pub fn mapping_extract_value() -> Operation {
    Operation::new("mapping_extract_value")
        .with_input("mapping", mapping())
        .with_input("traverse", mapping_traverse())
        .with_output("value", mapping_value())
}

/// `create_mapping`: a one-entry map from `key` and `value`
pub fn create_mapping() -> Operation {
    Operation::new("create_mapping")
        .with_input("key", mapping_key())
        .with_input("value", mapping_value())
        .with_output("mapping", mapping())
}

/// `mapping_expand_all_keys`: one `key` input per key of `mapping`
pub fn mapping_expand_all_keys() -> Operation {
    Operation::new("mapping_expand_all_keys")
        .with_input("mapping", mapping())
        .with_output("key", mapping_key())
        .with_expand("key")
}

/// `mapping_expand_all_values`: one `value` input per value of `mapping`
pub fn mapping_expand_all_values() -> Operation {
    Operation::new("mapping_expand_all_values")
        .with_input("mapping", mapping())
        .with_output("value", mapping_value())
        .with_expand("value")
}

fn input<'a>(inputs: &'a Inputs, key: &str) -> Result<&'a Value, OperationsError> {
    inputs
        .get(key)
        .ok_or_else(|| OperationsError::MissingInput(key.to_string()))
}

fn map_input<'a>(inputs: &'a Inputs, key: &str) -> Result<&'a Map<String, Value>, OperationsError> {
    input(inputs, key)?
        .as_object()
        .ok_or_else(|| OperationsError::InvalidInput {
            key: key.to_string(),
            expected: "a map",
        })
}

/// Walk nested maps by key; list elements are addressed by index.
pub fn traverse_get<'a>(value: &'a Value, path: &[Value]) -> Result<&'a Value, OperationsError> {
    path.iter().try_fold(value, |current, key| {
        let key = match key {
            Value::String(key) => key.clone(),
            other => other.to_string(),
        };
        let next = match current {
            Value::Object(map) => map.get(&key),
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        next.ok_or(OperationsError::KeyNotFound { key })
    })
}

pub(crate) async fn run_extract_value(_ctx: RunContext, inputs: Inputs) -> Result<Outputs, BoxError> {
    let mapping = map_input(&inputs, "mapping")?;
    let traverse = input(&inputs, "traverse")?
        .as_array()
        .ok_or_else(|| OperationsError::InvalidInput {
            key: "traverse".to_string(),
            expected: "a list of keys",
        })?;
    let value = traverse_get(&Value::Object(mapping.clone()), traverse)?.clone();
    Ok(Outputs::from([("value".to_string(), value)]))
}

pub(crate) async fn run_create_mapping(_ctx: RunContext, inputs: Inputs) -> Result<Outputs, BoxError> {
    let key = input(&inputs, "key")?
        .as_str()
        .ok_or_else(|| OperationsError::InvalidInput {
            key: "key".to_string(),
            expected: "a string",
        })?
        .to_string();
    let value = input(&inputs, "value")?.clone();

    let mut mapping = Map::new();
    mapping.insert(key, value);
    Ok(Outputs::from([("mapping".to_string(), Value::Object(mapping))]))
}

pub(crate) async fn run_expand_all_keys(_ctx: RunContext, inputs: Inputs) -> Result<Outputs, BoxError> {
    let keys = map_input(&inputs, "mapping")?
        .keys()
        .map(|key| Value::String(key.clone()))
        .collect();
    Ok(Outputs::from([("key".to_string(), Value::Array(keys))]))
}

pub(crate) async fn run_expand_all_values(_ctx: RunContext, inputs: Inputs) -> Result<Outputs, BoxError> {
    let values = map_input(&inputs, "mapping")?.values().cloned().collect();
    Ok(Outputs::from([("value".to_string(), Value::Array(values))]))
}
