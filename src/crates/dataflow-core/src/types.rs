//! Core dataflow vocabulary.
//!
//! - [`Definition`] - named data type used to match outputs to inputs
//! - [`Operation`] - declared unit of work (inputs, outputs, conditions, stage)
//! - [`Input`] - one concrete value tagged with a definition and its lineage
//! - [`Parameter`] / [`ParameterSet`] - inputs bound to an operation's slots
//! - [`ContextHandle`] - isolation boundary for all engine state

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use uuid::Uuid;

/// Named inputs handed to an operation implementation.
pub type Inputs = BTreeMap<String, Value>;

/// Named outputs returned by an operation implementation.
pub type Outputs = BTreeMap<String, Value>;

/// Truthiness used for condition gating.
///
/// `null`, `false`, `0`, `""`, `[]` and `{}` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// A named data type.
///
/// Definitions are compared, hashed and ordered by `name` only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Definition {
    /// Unique identity of the definition
    pub name: String,
    /// Payload type tag (`str`, `int`, `bool`, `map`, `List[int]`, ...)
    pub primitive: String,
    /// Values of this definition need mutual exclusion while in use
    #[serde(default)]
    pub lock: bool,
}

impl Definition {
    /// Create a definition that does not require locking.
    pub fn new(name: impl Into<String>, primitive: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primitive: primitive.into(),
            lock: false,
        }
    }

    /// Mark values of this definition as requiring exclusive access.
    pub fn with_lock(mut self, lock: bool) -> Self {
        self.lock = lock;
        self
    }

    /// Check a value against the primitive tag.
    ///
    /// Unknown tags accept everything.
    pub fn accepts(&self, value: &Value) -> bool {
        let primitive = self.primitive.trim();
        let lowered = primitive.to_ascii_lowercase();
        match lowered.as_str() {
            "str" | "string" => value.is_string(),
            "int" | "integer" => value.is_i64() || value.is_u64(),
            "float" | "number" => value.is_number(),
            "bool" | "boolean" => value.is_boolean(),
            "map" | "dict" => value.is_object(),
            "list" | "array" => value.is_array(),
            _ if lowered.starts_with("list[") => value.is_array(),
            _ if lowered.starts_with("dict[") || lowered.starts_with("map[") => value.is_object(),
            _ => true,
        }
    }
}

impl PartialEq for Definition {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Definition {}

impl Hash for Definition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl PartialOrd for Definition {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Definition {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name)
    }
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.primitive)
    }
}

/// Pipeline stage of an operation.
///
/// Per context, PROCESSING drains completely, then CLEANUP runs, then OUTPUT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Normal work
    #[default]
    Processing,
    /// Best-effort teardown
    Cleanup,
    /// Result extraction
    Output,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 3] = [Stage::Processing, Stage::Cleanup, Stage::Output];

    /// Lowercase stage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Processing => "processing",
            Stage::Cleanup => "cleanup",
            Stage::Output => "output",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named unit of work.
///
/// `name` selects the implementation; `instance_name` identifies this
/// registration, so one implementation can be registered several times.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// Implementation name
    pub name: String,
    /// Unique instance name within a DataFlow
    pub instance_name: String,
    /// Parameter name -> definition
    pub inputs: BTreeMap<String, Definition>,
    /// Output key -> definition
    pub outputs: BTreeMap<String, Definition>,
    /// Definitions whose inputs must be truthy for the operation to run
    pub conditions: Vec<Definition>,
    /// Pipeline stage
    pub stage: Stage,
    /// Output keys whose list values are fanned out into one input per element
    pub expand: Vec<String>,
    /// Maximum re-executions after a failure
    pub retry: usize,
}

impl Operation {
    /// Create an operation whose instance name equals its name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            instance_name: name.clone(),
            name,
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            conditions: Vec::new(),
            stage: Stage::Processing,
            expand: Vec::new(),
            retry: 0,
        }
    }

    /// Set the instance name
    pub fn with_instance_name(mut self, instance_name: impl Into<String>) -> Self {
        self.instance_name = instance_name.into();
        self
    }

    /// Declare an input slot
    pub fn with_input(mut self, key: impl Into<String>, definition: Definition) -> Self {
        self.inputs.insert(key.into(), definition);
        self
    }

    /// Declare an output key
    pub fn with_output(mut self, key: impl Into<String>, definition: Definition) -> Self {
        self.outputs.insert(key.into(), definition);
        self
    }

    /// Add a condition definition
    pub fn with_condition(mut self, definition: Definition) -> Self {
        self.conditions.push(definition);
        self
    }

    /// Set the stage
    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }

    /// Fan out the given output key
    pub fn with_expand(mut self, key: impl Into<String>) -> Self {
        self.expand.push(key.into());
        self
    }

    /// Set the maximum number of re-executions
    pub fn with_retry(mut self, retry: usize) -> Self {
        self.retry = retry;
        self
    }

    /// Whether any input slot or condition uses one of `definitions`.
    pub fn is_relevant_to<'a>(&self, mut definitions: impl Iterator<Item = &'a Definition>) -> bool {
        definitions.any(|definition| {
            self.inputs.values().any(|d| d == definition) || self.conditions.contains(definition)
        })
    }

    /// Every definition this operation reads, writes or is gated on.
    pub fn definitions(&self) -> impl Iterator<Item = &Definition> {
        self.inputs
            .values()
            .chain(self.outputs.values())
            .chain(self.conditions.iter())
    }
}

/// Unique identifier of an [`Input`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InputId(Uuid);

impl InputId {
    /// Generate a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InputId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One concrete value tagged with a [`Definition`].
///
/// Inputs are immutable. `parents` point (by id) at the inputs whose
/// operation produced this one.
#[derive(Debug, Clone)]
pub struct Input {
    uid: InputId,
    value: Value,
    definition: Definition,
    parents: Vec<InputId>,
    origin: Option<String>,
}

impl Input {
    /// Create a parentless input.
    pub fn new(value: impl Into<Value>, definition: &Definition) -> Self {
        Self {
            uid: InputId::new(),
            value: value.into(),
            definition: definition.clone(),
            parents: Vec::new(),
            origin: None,
        }
    }

    /// Set the parent inputs.
    pub fn with_parents(mut self, parents: Vec<InputId>) -> Self {
        self.parents = parents;
        self
    }

    /// Set the provenance tag.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Unique id
    pub fn uid(&self) -> InputId {
        self.uid
    }

    /// Payload
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Definition of the payload
    pub fn definition(&self) -> &Definition {
        &self.definition
    }

    /// Ids of the inputs this one was derived from
    pub fn parents(&self) -> &[InputId] {
        &self.parents
    }

    /// Provenance tag, `"seed"` for DataFlow seeds
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    /// Truthiness of the payload
    pub fn is_truthy(&self) -> bool {
        is_truthy(&self.value)
    }
}

/// Opaque, comparable handle partitioning all engine state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextHandle(String);

impl ContextHandle {
    /// Create a handle from a string.
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Create a handle with an unpredictable hex string.
    pub fn random() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// The handle as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContextHandle {
    fn from(handle: &str) -> Self {
        Self::new(handle)
    }
}

impl From<String> for ContextHandle {
    fn from(handle: String) -> Self {
        Self(handle)
    }
}

/// An [`Input`] bound to a named slot of an operation invocation.
#[derive(Debug, Clone)]
pub struct Parameter {
    /// Slot name
    pub key: String,
    /// Bound input
    pub origin: Arc<Input>,
    /// Definition of the slot
    pub definition: Definition,
}

impl Parameter {
    /// Bound value
    pub fn value(&self) -> &Value {
        self.origin.value()
    }
}

/// One candidate binding of inputs to an operation's slots.
#[derive(Debug, Clone)]
pub struct ParameterSet {
    ctx: ContextHandle,
    parameters: Vec<Parameter>,
    lineage: Vec<Arc<Input>>,
}

impl ParameterSet {
    /// Create a parameter set.
    ///
    /// `lineage` holds the bound inputs plus all of their ancestors; the
    /// bound inputs are always included even if the caller omitted them.
    pub fn new(ctx: ContextHandle, parameters: Vec<Parameter>, lineage: Vec<Arc<Input>>) -> Self {
        let mut seen: std::collections::HashSet<InputId> =
            lineage.iter().map(|input| input.uid()).collect();
        let mut lineage = lineage;
        for parameter in &parameters {
            if seen.insert(parameter.origin.uid()) {
                lineage.push(parameter.origin.clone());
            }
        }
        Self {
            ctx,
            parameters,
            lineage,
        }
    }

    /// Context the inputs belong to
    pub fn ctx(&self) -> &ContextHandle {
        &self.ctx
    }

    /// Bound parameters
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// The bound inputs
    pub fn inputs(&self) -> impl Iterator<Item = &Arc<Input>> {
        self.parameters.iter().map(|p| &p.origin)
    }

    /// Bound inputs and every ancestor, without duplicates
    pub fn lineage(&self) -> &[Arc<Input>] {
        &self.lineage
    }

    /// Sorted ids of the bound inputs
    pub fn input_ids(&self) -> Vec<InputId> {
        let mut ids: Vec<InputId> = self.inputs().map(|input| input.uid()).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Slot name -> value map handed to the implementation
    pub fn to_inputs(&self) -> Inputs {
        self.parameters
            .iter()
            .map(|p| (p.key.clone(), p.value().clone()))
            .collect()
    }
}
