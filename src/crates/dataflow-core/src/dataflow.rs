//! DataFlow - the static bundle a run is configured from.

use crate::document::{DataFlowDocument, DefinitionDocument, OperationDocument, SeedDocument};
use crate::error::{DataFlowError, Result};
use crate::types::{Definition, Input, Operation};
use crate::visualization::{render_mermaid, DiagramOptions};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Provenance tag given to seed inputs without one
pub const SEED_ORIGIN: &str = "seed";

/// Operations keyed by instance name, their configs and implementation
/// bindings, and the seed inputs added to every context.
#[derive(Debug, Clone, Default)]
pub struct DataFlow {
    /// Instance name -> operation
    pub operations: BTreeMap<String, Operation>,
    /// Inputs added to every context this dataflow runs in
    pub seed: Vec<Input>,
    /// Instance name -> implementation config
    pub configs: BTreeMap<String, Value>,
    /// Operation name -> registry name of the implementation to use
    pub implementations: BTreeMap<String, String>,
}

/// Where the inputs of an operation slot can come from
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum InputSource {
    /// A seed input of the definition
    Seed,
    /// An output of another operation
    Operation {
        /// Producing operation
        instance_name: String,
        /// Output key of the producing operation
        output: String,
    },
}

impl DataFlow {
    /// Create an empty dataflow
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a dataflow keyed by each operation's instance name.
    pub fn auto(operations: impl IntoIterator<Item = Operation>) -> Self {
        Self {
            operations: operations
                .into_iter()
                .map(|operation| (operation.instance_name.clone(), operation))
                .collect(),
            ..Self::default()
        }
    }

    /// Add an operation
    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operations
            .insert(operation.instance_name.clone(), operation);
        self
    }

    /// Add a seed input, tagged with [`SEED_ORIGIN`] if it has no origin
    pub fn with_seed(mut self, input: Input) -> Self {
        let input = match input.origin() {
            Some(_) => input,
            None => input.with_origin(SEED_ORIGIN),
        };
        self.seed.push(input);
        self
    }

    /// Set the config for an operation instance
    pub fn with_config(mut self, instance_name: impl Into<String>, config: Value) -> Self {
        self.configs.insert(instance_name.into(), config);
        self
    }

    /// Bind an operation name to a registry name
    pub fn with_implementation(
        mut self,
        operation_name: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        self.implementations
            .insert(operation_name.into(), reference.into());
        self
    }

    /// Every definition referenced by an operation or seed, by name
    pub fn definitions(&self) -> BTreeMap<String, Definition> {
        let mut definitions = BTreeMap::new();
        for operation in self.operations.values() {
            for definition in operation.definitions() {
                definitions
                    .entry(definition.name.clone())
                    .or_insert_with(|| definition.clone());
            }
        }
        for input in &self.seed {
            definitions
                .entry(input.definition().name.clone())
                .or_insert_with(|| input.definition().clone());
        }
        definitions
    }

    /// Possible sources of inputs of `definition`
    pub fn sources(&self, definition: &Definition) -> Vec<InputSource> {
        let mut sources = Vec::new();
        if self.seed.iter().any(|input| input.definition() == definition) {
            sources.push(InputSource::Seed);
        }
        for (instance_name, operation) in &self.operations {
            for (output, produced) in &operation.outputs {
                if produced == definition {
                    sources.push(InputSource::Operation {
                        instance_name: instance_name.clone(),
                        output: output.clone(),
                    });
                }
            }
        }
        sources
    }

    /// Serializable form with definitions referenced by name
    pub fn export(&self) -> DataFlowDocument {
        let names = |map: &BTreeMap<String, Definition>| -> BTreeMap<String, String> {
            map.iter()
                .map(|(key, definition)| (key.clone(), definition.name.clone()))
                .collect()
        };

        DataFlowDocument {
            operations: self
                .operations
                .iter()
                .map(|(instance_name, operation)| {
                    (
                        instance_name.clone(),
                        OperationDocument {
                            name: operation.name.clone(),
                            inputs: names(&operation.inputs),
                            outputs: names(&operation.outputs),
                            conditions: operation
                                .conditions
                                .iter()
                                .map(|definition| definition.name.clone())
                                .collect(),
                            stage: operation.stage,
                            expand: operation.expand.clone(),
                            retry: operation.retry,
                        },
                    )
                })
                .collect(),
            definitions: self
                .definitions()
                .into_values()
                .map(|definition| {
                    (
                        definition.name,
                        DefinitionDocument {
                            primitive: definition.primitive,
                            lock: definition.lock,
                        },
                    )
                })
                .collect(),
            seed: self
                .seed
                .iter()
                .map(|input| SeedDocument {
                    value: input.value().clone(),
                    definition: input.definition().name.clone(),
                    origin: input.origin().map(str::to_string),
                })
                .collect(),
            configs: self.configs.clone(),
            implementations: self.implementations.clone(),
        }
    }

    /// Link a document: every definition name it references must be declared.
    pub fn from_document(document: DataFlowDocument) -> Result<Self> {
        let definitions = &document.definitions;
        let lookup = |name: &str, referenced_by: &str| -> Result<Definition> {
            definitions
                .get(name)
                .map(|definition| Definition {
                    name: name.to_string(),
                    primitive: definition.primitive.clone(),
                    lock: definition.lock,
                })
                .ok_or_else(|| {
                    DataFlowError::Validation(format!(
                        "Definition missing: '{}' referenced by {}",
                        name, referenced_by
                    ))
                })
        };

        let mut operations = BTreeMap::new();
        for (instance_name, doc) in &document.operations {
            let name = if doc.name.is_empty() {
                instance_name.clone()
            } else {
                doc.name.clone()
            };
            let mut operation = Operation::new(name)
                .with_instance_name(instance_name.clone())
                .with_stage(doc.stage)
                .with_retry(doc.retry);

            for (key, definition) in &doc.inputs {
                let context = format!("input '{}' of '{}'", key, instance_name);
                operation = operation.with_input(key.clone(), lookup(definition, &context)?);
            }
            for (key, definition) in &doc.outputs {
                let context = format!("output '{}' of '{}'", key, instance_name);
                operation = operation.with_output(key.clone(), lookup(definition, &context)?);
            }
            for definition in &doc.conditions {
                let context = format!("condition of '{}'", instance_name);
                operation = operation.with_condition(lookup(definition, &context)?);
            }
            for key in &doc.expand {
                if !operation.outputs.contains_key(key) {
                    return Err(DataFlowError::Validation(format!(
                        "Expanded output '{}' of '{}' is not a declared output",
                        key, instance_name
                    )));
                }
                operation = operation.with_expand(key.clone());
            }
            operations.insert(instance_name.clone(), operation);
        }

        let mut dataflow = Self {
            operations,
            seed: Vec::new(),
            configs: document.configs.clone(),
            implementations: document.implementations.clone(),
        };
        for seed in &document.seed {
            let definition = lookup(&seed.definition, "seed")?;
            let mut input = Input::new(seed.value.clone(), &definition);
            if let Some(origin) = &seed.origin {
                input = input.with_origin(origin.clone());
            }
            dataflow = dataflow.with_seed(input);
        }
        Ok(dataflow)
    }

    /// Load and link a YAML or JSON document, chosen by extension
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_document(DataFlowDocument::from_file(path)?)
    }

    /// Parse and link a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Self::from_document(DataFlowDocument::from_yaml(yaml)?)
    }

    /// Parse and link a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_document(DataFlowDocument::from_json(json)?)
    }

    /// Export as YAML
    pub fn to_yaml(&self) -> Result<String> {
        self.export().to_yaml()
    }

    /// Export as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        self.export().to_json()
    }

    /// Render a Mermaid flowchart
    pub fn diagram(&self, options: &DiagramOptions) -> String {
        render_mermaid(self, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Stage;
    use serde_json::json;

    fn calc() -> DataFlow {
        let calc_string = Definition::new("calc_string", "str");
        let is_add = Definition::new("is_add", "bool");
        let numbers = Definition::new("numbers", "List[int]");
        let result = Definition::new("result", "int");

        DataFlow::auto([
            Operation::new("parse_line")
                .with_input("line", calc_string.clone())
                .with_output("add", is_add.clone())
                .with_output("numbers", numbers.clone()),
            Operation::new("add")
                .with_input("numbers", numbers)
                .with_output("sum", result)
                .with_condition(is_add),
        ])
        .with_seed(Input::new("add 1 and 2", &calc_string))
        .with_config("add", json!({"offset": 0}))
        .with_implementation("add", "calc_add")
    }

    #[test]
    fn test_export_references_definitions_by_name() {
        let exported = calc().export();

        let add = &exported.operations["add"];
        assert_eq!(add.inputs["numbers"], "numbers");
        assert_eq!(add.outputs["sum"], "result");
        assert_eq!(add.conditions, vec!["is_add".to_string()]);
        assert_eq!(exported.definitions["numbers"].primitive, "List[int]");
        assert_eq!(exported.seed[0].origin.as_deref(), Some(SEED_ORIGIN));
        assert_eq!(exported.implementations["add"], "calc_add");
    }

    #[test]
    fn test_link_round_trip() {
        let dataflow = calc();
        let linked = DataFlow::from_document(dataflow.export()).unwrap();

        assert_eq!(linked.operations, dataflow.operations);
        assert_eq!(linked.seed.len(), 1);
        assert_eq!(linked.seed[0].value(), &json!("add 1 and 2"));
        assert_eq!(linked.configs["add"], json!({"offset": 0}));
    }

    #[test]
    fn test_link_missing_condition_definition() {
        let mut exported = calc().export();
        exported.definitions.remove("is_add");

        let err = DataFlow::from_document(exported).unwrap_err();
        assert!(matches!(err, DataFlowError::Validation(_)));
        assert!(err.to_string().contains("Definition missing"));
    }

    #[test]
    fn test_link_missing_output_definition() {
        let mut exported = calc().export();
        exported.definitions.remove("result");

        let err = DataFlow::from_document(exported).unwrap_err();
        assert!(err.to_string().contains("Definition missing: 'result'"));
    }

    #[test]
    fn test_sources() {
        let dataflow = calc();
        let numbers = Definition::new("numbers", "List[int]");
        let calc_string = Definition::new("calc_string", "str");

        assert_eq!(
            dataflow.sources(&numbers),
            vec![InputSource::Operation {
                instance_name: "parse_line".into(),
                output: "numbers".into()
            }]
        );
        assert_eq!(dataflow.sources(&calc_string), vec![InputSource::Seed]);
    }

    #[test]
    fn test_auto_keys_by_instance_name() {
        let dataflow = DataFlow::auto([
            Operation::new("get_single").with_stage(Stage::Output),
            Operation::new("get_single").with_instance_name("get_again"),
        ]);
        assert_eq!(
            dataflow.operations.keys().cloned().collect::<Vec<_>>(),
            vec!["get_again".to_string(), "get_single".to_string()]
        );
    }
}
