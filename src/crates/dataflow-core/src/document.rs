//! Serializable dataflow documents.
//!
//! A [`DataFlowDocument`] references definitions by name and is linked into
//! a runnable [`DataFlow`] with [`DataFlow::from_document`]:
//!
//! ```yaml
//! definitions:
//!   calc_string: { primitive: str }
//!   result: { primitive: int }
//! operations:
//!   calc:
//!     name: calc
//!     inputs: { line: calc_string }
//!     outputs: { result: result }
//! seed:
//!   - value: "add 40 and 2"
//!     definition: calc_string
//! ```

use crate::config::load_config_file;
use crate::dataflow::DataFlow;
use crate::error::{DataFlowError, Result};
use crate::types::Stage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Top-level dataflow document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataFlowDocument {
    /// Instance name -> operation
    #[serde(default)]
    pub operations: BTreeMap<String, OperationDocument>,

    /// Definition name -> definition
    #[serde(default)]
    pub definitions: BTreeMap<String, DefinitionDocument>,

    /// Seed inputs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub seed: Vec<SeedDocument>,

    /// Instance name -> implementation config
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub configs: BTreeMap<String, Value>,

    /// Operation name -> implementation registry name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub implementations: BTreeMap<String, String>,
}

/// Operation in a document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationDocument {
    /// Operation name; the instance name when empty
    #[serde(default)]
    pub name: String,

    /// Input key -> definition name
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,

    /// Output key -> definition name
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,

    /// Definition names that gate dispatch
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<String>,

    #[serde(default)]
    pub stage: Stage,

    /// Output keys whose sequence values become one input per element
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expand: Vec<String>,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub retry: usize,
}

/// Definition in a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionDocument {
    pub primitive: String,

    #[serde(default, skip_serializing_if = "is_false")]
    pub lock: bool,
}

/// Seed input in a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedDocument {
    pub value: Value,

    /// Definition name
    pub definition: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

fn is_zero(value: &usize) -> bool {
    *value == 0
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl DataFlowDocument {
    /// Load from a file, detecting YAML or JSON from the extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        load_config_file(path)
    }

    /// Parse a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parse a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Convert to a YAML string
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Convert to a pretty-printed JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write to a file, choosing YAML or JSON from the extension
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => self.to_yaml()?,
            Some("json") => self.to_json()?,
            other => {
                return Err(DataFlowError::Configuration(format!(
                    "Unsupported dataflow file extension: {:?}",
                    other
                )))
            }
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check that every referenced definition is declared
    pub fn validate(&self) -> Result<()> {
        DataFlow::from_document(self.clone()).map(|_| ())
    }

    /// Merge `other` into this document.
    ///
    /// Maps merge recursively, lists are appended and values already present
    /// here win over scalars from `other`.
    pub fn merge(&mut self, other: DataFlowDocument) -> Result<()> {
        let mut merged = serde_json::to_value(&*self)?;
        merge_values(&mut merged, serde_json::to_value(other)?);
        *self = serde_json::from_value(merged)?;
        Ok(())
    }
}

/// Recursively merge `two` into `one`.
pub fn merge_values(one: &mut Value, two: Value) {
    let (Value::Object(one), Value::Object(two)) = (one, two) else {
        return;
    };
    for (key, value) in two {
        match one.get_mut(&key) {
            Some(existing) => match (existing, value) {
                (existing @ Value::Object(_), value @ Value::Object(_)) => {
                    merge_values(existing, value)
                }
                (Value::Array(existing), Value::Array(mut value)) => existing.append(&mut value),
                _ => {}
            },
            None => {
                one.insert(key, value);
            }
        }
    }
}
