//! Operation network: registered operations by instance name.

use crate::types::{Definition, Input, Operation, Stage};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Registered operations
#[derive(Debug, Default)]
pub struct OperationNetwork {
    operations: RwLock<BTreeMap<String, Arc<Operation>>>,
}

impl OperationNetwork {
    /// Create an empty network
    pub fn new() -> Self {
        Self::default()
    }

    /// Register operations, replacing any with the same instance name.
    pub fn add(&self, operations: impl IntoIterator<Item = Operation>) {
        let mut registered = self.operations.write();
        for operation in operations {
            registered.insert(operation.instance_name.clone(), Arc::new(operation));
        }
    }

    /// Look up by instance name
    pub fn get(&self, instance_name: &str) -> Option<Arc<Operation>> {
        self.operations.read().get(instance_name).cloned()
    }

    /// Operations of `stage`, optionally restricted to those that read or are
    /// gated on a definition present in `inputs`.
    pub fn operations(&self, stage: Stage, inputs: Option<&[Arc<Input>]>) -> Vec<Arc<Operation>> {
        let registered = self.operations.read();
        registered
            .values()
            .filter(|operation| operation.stage == stage)
            .filter(|operation| match inputs {
                Some(inputs) => {
                    operation.is_relevant_to(inputs.iter().map(|input| input.definition()))
                }
                None => true,
            })
            .cloned()
            .collect()
    }

    /// Operations of `stage` relevant to any of `definitions`
    pub fn relevant(&self, stage: Stage, definitions: &[Definition]) -> Vec<Arc<Operation>> {
        self.operations
            .read()
            .values()
            .filter(|operation| operation.stage == stage && operation.is_relevant_to(definitions.iter()))
            .cloned()
            .collect()
    }

    /// Number of registered operations
    pub fn len(&self) -> usize {
        self.operations.read().len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.operations.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_by_stage_and_relevance() {
        let line = Definition::new("line", "str");
        let numbers = Definition::new("numbers", "List[int]");

        let network = OperationNetwork::new();
        network.add([
            Operation::new("parse_line").with_input("line", line.clone()),
            Operation::new("add").with_input("numbers", numbers.clone()),
            Operation::new("get_single").with_stage(Stage::Output),
        ]);

        assert_eq!(network.len(), 3);
        assert_eq!(network.operations(Stage::Processing, None).len(), 2);
        assert_eq!(network.operations(Stage::Output, None).len(), 1);
        assert!(network.operations(Stage::Cleanup, None).is_empty());

        let new = vec![Arc::new(Input::new("add 1 and 2", &line))];
        let relevant = network.operations(Stage::Processing, Some(&new));
        assert_eq!(relevant.len(), 1);
        assert_eq!(relevant[0].instance_name, "parse_line");

        let relevant = network.relevant(Stage::Processing, &[numbers]);
        assert_eq!(relevant[0].instance_name, "add");
    }

    #[test]
    fn test_same_instance_name_replaces() {
        let network = OperationNetwork::new();
        network.add([Operation::new("op").with_retry(1)]);
        network.add([Operation::new("op").with_retry(5)]);

        assert_eq!(network.len(), 1);
        assert_eq!(network.get("op").unwrap().retry, 5);
    }
}
