//! Input network: every input of every context.
//!
//! Inputs are partitioned by context, then by definition name. Each context
//! also keeps an arena `InputId -> Input` through which lineage is resolved,
//! so an ancestry walk is a traversal over ids.
//!
//! # Notifications
//!
//! ```text
//!   add(ctx, inputs)
//!        │ 1. store inputs under the context's lock
//!        │ 2. first time ctx is seen?  ──→ new-context channel
//!        │ 3. always                   ──→ ctx's new-input channel
//!        └ 4. broadcast NetworkEvent   ──→ any number of subscribers
//! ```
//!
//! The per-context and new-context channels are [`NotificationSet`]s: one
//! consumer wakes per batch. Observers that each want every event use
//! [`InputNetwork::subscribe`].

use crate::error::{DataFlowError, Result};
use crate::notify::NotificationSet;
use crate::redundancy::RedundancyChecker;
use crate::types::{ContextHandle, Definition, Input, InputId, Operation, Parameter, ParameterSet};
use itertools::Itertools;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

const EVENT_CAPACITY: usize = 1024;

/// Change observed on the input network
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    /// A context received its first inputs
    NewContext(ContextHandle),
    /// Inputs were added to a context
    NewInputs {
        /// Context the inputs were added to
        ctx: ContextHandle,
        /// Exactly the inputs of that `add` call
        inputs: Vec<Arc<Input>>,
    },
}

#[derive(Default)]
struct ContextInputs {
    by_definition: HashMap<String, (Definition, Vec<Arc<Input>>)>,
    arena: HashMap<InputId, Arc<Input>>,
}

impl ContextInputs {
    fn insert(&mut self, input: Arc<Input>) {
        let definition = input.definition().clone();
        self.arena.insert(input.uid(), input.clone());
        self.by_definition
            .entry(definition.name.clone())
            .or_insert_with(|| (definition, Vec::new()))
            .1
            .push(input);
    }

    fn of(&self, definition: &Definition) -> &[Arc<Input>] {
        self.by_definition
            .get(&definition.name)
            .map(|(_, inputs)| inputs.as_slice())
            .unwrap_or(&[])
    }

    /// The inputs plus all of their ancestors, each once.
    fn lineage<'a>(&self, roots: impl Iterator<Item = &'a Arc<Input>>) -> Vec<Arc<Input>> {
        let mut seen = HashSet::new();
        let mut lineage = Vec::new();
        let mut queue: VecDeque<Arc<Input>> = roots.cloned().collect();

        while let Some(input) = queue.pop_front() {
            if !seen.insert(input.uid()) {
                continue;
            }
            for parent in input.parents() {
                if let Some(parent) = self.arena.get(parent) {
                    queue.push_back(parent.clone());
                }
            }
            lineage.push(input);
        }
        lineage
    }
}

struct ContextEntry {
    inputs: RwLock<ContextInputs>,
    added: NotificationSet<Vec<Arc<Input>>>,
}

/// Context-partitioned input store
pub struct InputNetwork {
    contexts: RwLock<HashMap<ContextHandle, Arc<ContextEntry>>>,
    new_contexts: NotificationSet<ContextHandle>,
    events: broadcast::Sender<NetworkEvent>,
}

impl InputNetwork {
    /// Create an empty network
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            contexts: RwLock::new(HashMap::new()),
            new_contexts: NotificationSet::new(),
            events,
        }
    }

    fn entry(&self, ctx: &ContextHandle) -> Result<Arc<ContextEntry>> {
        self.contexts
            .read()
            .get(ctx)
            .cloned()
            .ok_or_else(|| DataFlowError::ContextNotPresent(ctx.to_string()))
    }

    /// Add inputs to a context, creating it if needed.
    ///
    /// Returns the stored inputs in the order given.
    pub fn add(&self, ctx: &ContextHandle, inputs: Vec<Input>) -> Vec<Arc<Input>> {
        let (entry, is_new) = {
            let mut contexts = self.contexts.write();
            match contexts.get(ctx) {
                Some(entry) => (entry.clone(), false),
                None => {
                    let entry = Arc::new(ContextEntry {
                        inputs: RwLock::new(ContextInputs::default()),
                        added: NotificationSet::new(),
                    });
                    contexts.insert(ctx.clone(), entry.clone());
                    (entry, true)
                }
            }
        };

        let added: Vec<Arc<Input>> = inputs.into_iter().map(Arc::new).collect();
        {
            let mut stored = entry.inputs.write();
            for input in &added {
                stored.insert(input.clone());
            }
        }

        if is_new {
            debug!(context = %ctx, "New context");
            self.new_contexts.add(ctx.clone());
            let _ = self.events.send(NetworkEvent::NewContext(ctx.clone()));
        }
        entry.added.add(added.clone());
        let _ = self.events.send(NetworkEvent::NewInputs {
            ctx: ctx.clone(),
            inputs: added.clone(),
        });
        added
    }

    /// Add inputs under a fresh random context.
    pub fn uadd(&self, inputs: Vec<Input>) -> ContextHandle {
        let ctx = ContextHandle::random();
        self.add(&ctx, inputs);
        ctx
    }

    /// Add inputs under a context named by a string.
    pub fn sadd(&self, ctx: &str, inputs: Vec<Input>) -> ContextHandle {
        let ctx = ContextHandle::new(ctx);
        self.add(&ctx, inputs);
        ctx
    }

    /// Add inputs under an existing context handle.
    pub fn cadd(&self, ctx: &ContextHandle, inputs: Vec<Input>) -> ContextHandle {
        self.add(ctx, inputs);
        ctx.clone()
    }

    /// Wait for contexts that appeared since the last call.
    pub async fn ctx_added(&self) -> Vec<ContextHandle> {
        self.new_contexts.added().await
    }

    /// Contexts that appeared since the last call, without waiting.
    pub async fn try_ctx_added(&self) -> Vec<ContextHandle> {
        self.new_contexts.try_drain().await
    }

    /// Wait for inputs added to `ctx` since the last call.
    pub async fn added(&self, ctx: &ContextHandle) -> Result<Vec<Arc<Input>>> {
        let entry = self.entry(ctx)?;
        Ok(entry.added.added().await.into_iter().flatten().collect())
    }

    /// Inputs added to `ctx` since the last call, without waiting.
    pub async fn try_added(&self, ctx: &ContextHandle) -> Result<Vec<Arc<Input>>> {
        let entry = self.entry(ctx)?;
        Ok(entry.added.try_drain().await.into_iter().flatten().collect())
    }

    /// Observe every network event.
    pub fn subscribe(&self) -> broadcast::Receiver<NetworkEvent> {
        self.events.subscribe()
    }

    /// Known contexts, sorted
    pub fn contexts(&self) -> Vec<ContextHandle> {
        let mut contexts: Vec<ContextHandle> = self.contexts.read().keys().cloned().collect();
        contexts.sort();
        contexts
    }

    /// Whether the context has been seen
    pub fn contains(&self, ctx: &ContextHandle) -> bool {
        self.contexts.read().contains_key(ctx)
    }

    /// Look up a definition by name among a context's inputs.
    pub fn definition(&self, ctx: &ContextHandle, name: &str) -> Result<Definition> {
        let entry = self.entry(ctx)?;
        let stored = entry.inputs.read();
        stored
            .by_definition
            .get(name)
            .map(|(definition, _)| definition.clone())
            .ok_or_else(|| DataFlowError::DefinitionNotInContext {
                context: ctx.to_string(),
                definition: name.to_string(),
            })
    }

    /// Definitions present in a context, sorted by name
    pub fn definitions(&self, ctx: &ContextHandle) -> Result<Vec<Definition>> {
        let entry = self.entry(ctx)?;
        let stored = entry.inputs.read();
        let mut definitions: Vec<Definition> = stored
            .by_definition
            .values()
            .map(|(definition, _)| definition.clone())
            .collect();
        definitions.sort();
        Ok(definitions)
    }

    /// Inputs of a definition in insertion order.
    pub fn inputs(&self, ctx: &ContextHandle, definition: &Definition) -> Result<Vec<Arc<Input>>> {
        let entry = self.entry(ctx)?;
        let stored = entry.inputs.read();
        match stored.by_definition.get(&definition.name) {
            Some((_, inputs)) => Ok(inputs.clone()),
            None => Err(DataFlowError::DefinitionNotInContext {
                context: ctx.to_string(),
                definition: definition.name.clone(),
            }),
        }
    }

    /// Look up an input by id.
    pub fn input(&self, ctx: &ContextHandle, uid: InputId) -> Result<Option<Arc<Input>>> {
        let entry = self.entry(ctx)?;
        let stored = entry.inputs.read();
        Ok(stored.arena.get(&uid).cloned())
    }

    /// The given inputs plus every ancestor, each once.
    pub fn lineage(&self, ctx: &ContextHandle, inputs: &[Arc<Input>]) -> Result<Vec<Arc<Input>>> {
        let entry = self.entry(ctx)?;
        let stored = entry.inputs.read();
        Ok(stored.lineage(inputs.iter()))
    }

    /// Parameter sets for `operation` in `ctx` that have not run yet.
    ///
    /// Nothing is produced unless every condition definition has at least
    /// one truthy input and every input slot has at least one input. The
    /// candidates are the cartesian product of the slots' inputs.
    pub async fn gather_inputs(
        &self,
        operation: &Operation,
        ctx: &ContextHandle,
        rctx: &RedundancyChecker,
    ) -> Result<Vec<ParameterSet>> {
        let candidates = match self.contexts.read().get(ctx).cloned() {
            Some(entry) => Self::candidates(&entry.inputs.read(), operation, ctx),
            None => return Ok(Vec::new()),
        };

        let mut parameter_sets = Vec::with_capacity(candidates.len());
        for parameter_set in candidates {
            if !rctx.exists(operation, &parameter_set).await? {
                parameter_sets.push(parameter_set);
            }
        }
        Ok(parameter_sets)
    }

    fn candidates(
        stored: &ContextInputs,
        operation: &Operation,
        ctx: &ContextHandle,
    ) -> Vec<ParameterSet> {
        let conditions_met = operation
            .conditions
            .iter()
            .all(|condition| stored.of(condition).iter().any(|input| input.is_truthy()));
        if !conditions_met {
            return Vec::new();
        }

        let mut slots: Vec<Vec<Parameter>> = Vec::with_capacity(operation.inputs.len());
        for (key, definition) in &operation.inputs {
            let inputs = stored.of(definition);
            if inputs.is_empty() {
                return Vec::new();
            }
            slots.push(
                inputs
                    .iter()
                    .map(|input| Parameter {
                        key: key.clone(),
                        origin: input.clone(),
                        definition: definition.clone(),
                    })
                    .collect(),
            );
        }

        if slots.is_empty() {
            return vec![ParameterSet::new(ctx.clone(), Vec::new(), Vec::new())];
        }

        slots
            .into_iter()
            .multi_cartesian_product()
            .map(|parameters| {
                let lineage = stored.lineage(parameters.iter().map(|p| &p.origin));
                ParameterSet::new(ctx.clone(), parameters, lineage)
            })
            .collect()
    }
}

impl Default for InputNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InputNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputNetwork")
            .field("contexts", &self.contexts())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defs() -> (Definition, Definition, Definition) {
        (
            Definition::new("a", "int"),
            Definition::new("b", "int"),
            Definition::new("go", "bool"),
        )
    }

    fn pairs(parameter_sets: &[ParameterSet]) -> Vec<(i64, i64)> {
        let mut pairs: Vec<(i64, i64)> = parameter_sets
            .iter()
            .map(|ps| {
                let inputs = ps.to_inputs();
                (inputs["x"].as_i64().unwrap(), inputs["y"].as_i64().unwrap())
            })
            .collect();
        pairs.sort();
        pairs
    }

    #[tokio::test]
    async fn test_cartesian_product() {
        let (a, b, _) = defs();
        let network = InputNetwork::new();
        let rctx = RedundancyChecker::new();
        let op = Operation::new("op").with_input("x", a.clone()).with_input("y", b.clone());

        let ctx = network.sadd(
            "c",
            vec![Input::new(1, &a), Input::new(2, &a), Input::new(10, &b)],
        );

        let sets = network.gather_inputs(&op, &ctx, &rctx).await.unwrap();
        assert_eq!(pairs(&sets), vec![(1, 10), (2, 10)]);
    }

    #[tokio::test]
    async fn test_missing_slot_yields_nothing() {
        let (a, b, _) = defs();
        let network = InputNetwork::new();
        let rctx = RedundancyChecker::new();
        let op = Operation::new("op").with_input("x", a.clone()).with_input("y", b);

        let ctx = network.sadd("c", vec![Input::new(1, &a)]);
        assert!(network.gather_inputs(&op, &ctx, &rctx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_condition_gating() {
        let (a, _, go) = defs();
        let network = InputNetwork::new();
        let rctx = RedundancyChecker::new();
        let op = Operation::new("op").with_input("x", a.clone()).with_condition(go.clone());

        let ctx = network.sadd("c", vec![Input::new(1, &a), Input::new(false, &go)]);
        assert!(network.gather_inputs(&op, &ctx, &rctx).await.unwrap().is_empty());

        network.add(&ctx, vec![Input::new(true, &go)]);
        assert_eq!(network.gather_inputs(&op, &ctx, &rctx).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_redundant_sets_suppressed() {
        let (a, _, _) = defs();
        let network = InputNetwork::new();
        let rctx = RedundancyChecker::new();
        let op = Operation::new("op").with_input("x", a.clone());

        let ctx = network.sadd("c", vec![Input::new(1, &a)]);
        let sets = network.gather_inputs(&op, &ctx, &rctx).await.unwrap();
        rctx.add(&op, &sets[0]).await.unwrap();

        network.add(&ctx, vec![Input::new(2, &a)]);
        let sets = network.gather_inputs(&op, &ctx, &rctx).await.unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].to_inputs()["x"], json!(2));
    }

    #[tokio::test]
    async fn test_context_isolation() {
        let (a, _, _) = defs();
        let network = InputNetwork::new();
        let rctx = RedundancyChecker::new();
        let op = Operation::new("op").with_input("x", a.clone());

        network.sadd("ctx1", vec![Input::new(1, &a)]);
        network.sadd("ctx2", vec![]);

        let ctx2 = ContextHandle::new("ctx2");
        assert!(network.gather_inputs(&op, &ctx2, &rctx).await.unwrap().is_empty());
        assert!(matches!(
            network.inputs(&ctx2, &a),
            Err(DataFlowError::DefinitionNotInContext { .. })
        ));
        assert!(matches!(
            network.definition(&ContextHandle::new("nope"), "a"),
            Err(DataFlowError::ContextNotPresent(_))
        ));
    }

    #[tokio::test]
    async fn test_notifications() {
        let (a, _, _) = defs();
        let network = InputNetwork::new();
        let mut events = network.subscribe();

        let ctx = network.sadd("c", vec![Input::new(1, &a)]);
        network.add(&ctx, vec![Input::new(2, &a), Input::new(3, &a)]);

        assert_eq!(network.ctx_added().await, vec![ctx.clone()]);
        let added = network.added(&ctx).await.unwrap();
        assert_eq!(added.len(), 3);
        assert!(network.try_added(&ctx).await.unwrap().is_empty());

        assert!(matches!(events.recv().await.unwrap(), NetworkEvent::NewContext(_)));
        match events.recv().await.unwrap() {
            NetworkEvent::NewInputs { inputs, .. } => assert_eq!(inputs.len(), 1),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lineage_includes_ancestors() {
        let (a, b, _) = defs();
        let network = InputNetwork::new();
        let rctx = RedundancyChecker::new();

        let ctx = ContextHandle::new("c");
        let root = network.add(&ctx, vec![Input::new(1, &a)]).remove(0);
        let child = network
            .add(&ctx, vec![Input::new(2, &b).with_parents(vec![root.uid()])])
            .remove(0);

        let op = Operation::new("op").with_input("y", b);
        let sets = network.gather_inputs(&op, &ctx, &rctx).await.unwrap();
        let ids: HashSet<InputId> = sets[0].lineage().iter().map(|i| i.uid()).collect();
        assert_eq!(ids, HashSet::from([root.uid(), child.uid()]));
    }

    #[tokio::test]
    async fn test_operation_without_inputs_yields_one_empty_set() {
        let network = InputNetwork::new();
        let rctx = RedundancyChecker::new();
        let ctx = network.sadd("c", vec![]);

        let sets = network
            .gather_inputs(&Operation::new("noop"), &ctx, &rctx)
            .await
            .unwrap();
        assert_eq!(sets.len(), 1);
        assert!(sets[0].parameters().is_empty());
    }

    #[tokio::test]
    async fn test_adders_and_lookup_by_id() {
        let (a, _, _) = defs();
        let network = InputNetwork::new();

        let random = network.uadd(vec![Input::new(1, &a)]);
        assert_eq!(random.as_str().len(), 32);
        assert!(network.contains(&random));

        let same = network.cadd(&random, vec![Input::new(2, &a)]);
        assert_eq!(same, random);
        assert_eq!(network.inputs(&random, &a).unwrap().len(), 2);
        assert_eq!(network.contexts(), vec![random.clone()]);

        let stored = network.inputs(&random, &a).unwrap().remove(1);
        let found = network.input(&random, stored.uid()).unwrap().unwrap();
        assert_eq!(found.value(), &json!(2));
        assert!(network.input(&random, InputId::new()).unwrap().is_none());
        assert!(matches!(
            network.input(&ContextHandle::new("nope"), stored.uid()),
            Err(DataFlowError::ContextNotPresent(_))
        ));
    }
}

