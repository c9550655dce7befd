//! Orchestrator - drives contexts to completion.
//!
//! An [`Orchestrator`] owns the configuration and the implementation
//! registry. Each call to [`Orchestrator::context`] wires a fresh set of
//! networks into an [`OrchestratorContext`], which runs dataflows.
//!
//! # Per-context lifecycle
//!
//! ```text
//!  Seeded ──→ Running ──────────────→ Draining ──→ Output ──→ Done
//!             │ new inputs arrive      │ CLEANUP    │ OUTPUT
//!             │ → gather parameter sets│ stage,     │ stage,
//!             │ → record in ledger     │ best-effort│ results
//!             │ → dispatch tasks       │            │ collected
//!             └ until no task is left and no notification is pending
//! ```
//!
//! At the top level, [`OrchestratorContext::run_operations`] does the same at
//! context granularity: it waits for new contexts, starts one run per
//! context and yields `(context, output)` as each finishes.
//!
//! # Failure handling
//!
//! In strict mode (the default) the first failed dispatch cancels the
//! context's outstanding tasks; CLEANUP still runs, then the error ends the
//! context and the result stream. Otherwise failures are logged with
//! `error!` and the run continues without the failed operation's outputs.
//! Cancelled tasks are never reported as failures.
//!
//! # Example
//!
//! ```rust,ignore
//! use dataflow_core::{ContextHandle, DataFlow, Input, Orchestrator};
//! use futures::StreamExt;
//!
//! let orchestrator = Orchestrator::new(registry);
//! let mut results = orchestrator.run(dataflow, vec![
//!     (ContextHandle::new("c1"), vec![Input::new("add 40 and 2", &calc_string)]),
//! ]);
//! while let Some(result) = results.next().await {
//!     let (ctx, output) = result?;
//!     println!("{}: {}", ctx, output);
//! }
//! ```

use crate::config::OrchestratorConfig;
use crate::dataflow::DataFlow;
use crate::error::{DataFlowError, Result};
use crate::implementation::ImplementationRegistry;
use crate::input_network::InputNetwork;
use crate::lock::LockNetwork;
use crate::operation_network::OperationNetwork;
use crate::opimp_network::OperationImplementationNetwork;
use crate::redundancy::RedundancyChecker;
use crate::store::KeyValueStore;
use crate::types::{ContextHandle, Input, Operation, Outputs, Stage};
use futures::{Stream, StreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// Stream of per-context results
pub type ResultStream = Pin<Box<dyn Stream<Item = Result<(ContextHandle, Value)>> + Send>>;

/// Lifecycle of one context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextState {
    /// Inputs added, not yet running
    Seeded,
    /// PROCESSING operations being dispatched
    Running,
    /// PROCESSING finished, CLEANUP running
    Draining,
    /// OUTPUT operations running
    Output,
    /// Finished, successfully or not
    Done,
}

/// Configuration plus implementation registry
#[derive(Clone)]
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: ImplementationRegistry,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl Orchestrator {
    /// Create an orchestrator with the default configuration
    pub fn new(registry: ImplementationRegistry) -> Self {
        Self {
            config: OrchestratorConfig::default(),
            registry,
            store: None,
        }
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Back the redundancy checker of new contexts with `store`
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Current configuration
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Implementation registry
    pub fn registry(&self) -> &ImplementationRegistry {
        &self.registry
    }

    /// Wire a fresh set of networks.
    pub fn context(&self) -> Result<OrchestratorContext> {
        self.config.validate()?;
        let rctx = match &self.store {
            Some(store) => RedundancyChecker::with_store(store.clone()),
            None => RedundancyChecker::new(),
        };
        Ok(OrchestratorContext {
            config: Arc::new(self.config.clone()),
            ictx: Arc::new(InputNetwork::new()),
            octx: Arc::new(OperationNetwork::new()),
            rctx: Arc::new(rctx),
            lctx: Arc::new(LockNetwork::new()),
            nctx: Arc::new(OperationImplementationNetwork::new(
                self.registry.clone(),
                self.config.retry.clone(),
            )),
            states: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Run `dataflow` once per given context and stream each context's output.
    ///
    /// With no contexts given, the dataflow's seed runs under one random
    /// context. Implementations are exited before the stream yields its
    /// final error or ends, and in the background if the stream is dropped
    /// first.
    pub fn run(&self, dataflow: DataFlow, contexts: Vec<(ContextHandle, Vec<Input>)>) -> ResultStream {
        let octx = self.context();
        Box::pin(async_stream::stream! {
            let octx = match octx {
                Ok(octx) => octx,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            let closer = CloseOnDrop(Some(octx.clone()));
            if let Err(e) = octx.initialize_dataflow(&dataflow).await {
                closer.close().await;
                yield Err(e);
                return;
            }

            if contexts.is_empty() {
                octx.seed_inputs_for_dataflow(&dataflow, None, Vec::new());
            }
            for (ctx, inputs) in contexts {
                octx.seed_inputs_for_dataflow(&dataflow, Some(ctx), inputs);
            }

            let mut results = octx.run_operations(None);
            let mut failure = None;
            while let Some(result) = results.next().await {
                match result {
                    Ok(output) => yield Ok(output),
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
            drop(results);
            closer.close().await;
            if let Some(e) = failure {
                yield Err(e);
            }
        })
    }
}

/// Closes an orchestrator context on a spawned task unless closed in place.
struct CloseOnDrop(Option<OrchestratorContext>);

impl CloseOnDrop {
    async fn close(mut self) {
        if let Some(octx) = self.0.take() {
            octx.close().await;
        }
    }
}

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        let Some(octx) = self.0.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("Result stream dropped early, exiting implementations");
                handle.spawn(async move { octx.close().await });
            }
            Err(_) => warn!("No runtime left to exit operation implementations"),
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish()
    }
}

enum LoopEvent {
    NewContexts(Vec<ContextHandle>),
    Finished(std::result::Result<Result<(ContextHandle, Value)>, JoinError>),
}

/// One wiring of input, operation, redundancy, lock and implementation
/// networks. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct OrchestratorContext {
    config: Arc<OrchestratorConfig>,
    ictx: Arc<InputNetwork>,
    octx: Arc<OperationNetwork>,
    rctx: Arc<RedundancyChecker>,
    lctx: Arc<LockNetwork>,
    nctx: Arc<OperationImplementationNetwork>,
    states: Arc<RwLock<HashMap<ContextHandle, ContextState>>>,
}

impl OrchestratorContext {
    /// Configuration
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Input network
    pub fn input_network(&self) -> &InputNetwork {
        &self.ictx
    }

    /// Operation network
    pub fn operation_network(&self) -> &OperationNetwork {
        &self.octx
    }

    /// Redundancy checker
    pub fn redundancy_checker(&self) -> &RedundancyChecker {
        &self.rctx
    }

    /// Lock network
    pub fn lock_network(&self) -> &LockNetwork {
        &self.lctx
    }

    /// Operation-implementation network
    pub fn opimp_network(&self) -> &OperationImplementationNetwork {
        &self.nctx
    }

    /// Lifecycle state of a context, if it was ever seeded or run
    pub fn context_state(&self, ctx: &ContextHandle) -> Option<ContextState> {
        self.states.read().get(ctx).copied()
    }

    fn set_state(&self, ctx: &ContextHandle, state: ContextState) {
        debug!(context = %ctx, state = ?state, "Context state");
        self.states.write().insert(ctx.clone(), state);
    }

    /// Mark a context as started; false if it already was.
    fn claim(&self, ctx: &ContextHandle) -> bool {
        let mut states = self.states.write();
        match states.get(ctx) {
            None | Some(ContextState::Seeded) => {
                states.insert(ctx.clone(), ContextState::Running);
                true
            }
            Some(_) => false,
        }
    }

    /// Register the dataflow's operations and instantiate missing implementations.
    pub async fn initialize_dataflow(&self, dataflow: &DataFlow) -> Result<()> {
        debug!(operations = dataflow.operations.len(), "Initializing dataflow");
        self.octx.add(dataflow.operations.values().cloned());

        for (instance_name, operation) in &dataflow.operations {
            if self.nctx.contains(operation) {
                continue;
            }
            let reference = dataflow
                .implementations
                .get(&operation.name)
                .map(String::as_str);
            if !self.nctx.instantiable(operation, reference) {
                return Err(DataFlowError::not_instantiable(
                    reference.unwrap_or(operation.name.as_str()),
                ));
            }
            let config = match dataflow.configs.get(instance_name) {
                Some(config) => config.clone(),
                None => {
                    debug!(
                        operation = %instance_name,
                        implementation = %operation.name,
                        "Instantiating operation implementation with base config"
                    );
                    Value::Object(Map::new())
                }
            };
            self.nctx.instantiate(operation, &config, reference).await?;
        }
        Ok(())
    }

    /// Add the dataflow's seed plus `inputs` to `ctx`, or to a new random
    /// context when `ctx` is `None`.
    pub fn seed_inputs_for_dataflow(
        &self,
        dataflow: &DataFlow,
        ctx: Option<ContextHandle>,
        inputs: Vec<Input>,
    ) -> ContextHandle {
        let ctx = ctx.unwrap_or_else(ContextHandle::random);
        let mut inputs = inputs;
        inputs.extend(dataflow.seed.iter().cloned());

        self.states
            .write()
            .entry(ctx.clone())
            .or_insert(ContextState::Seeded);
        debug!(context = %ctx, inputs = inputs.len(), "Seeding dataflow");
        self.ictx.add(&ctx, inputs);
        ctx
    }

    /// Initialize, seed and run one context to completion.
    pub async fn run_dataflow(
        &self,
        dataflow: &DataFlow,
        ctx: Option<ContextHandle>,
        inputs: Vec<Input>,
    ) -> Result<(ContextHandle, Value)> {
        self.initialize_dataflow(dataflow).await?;
        // Claimed before seeding so a concurrent run_operations skips it
        let ctx = ctx.unwrap_or_else(ContextHandle::random);
        self.claim(&ctx);
        let ctx = self.seed_inputs_for_dataflow(dataflow, Some(ctx), inputs);
        let output = self.run_operations_for_ctx(&ctx).await?;
        Ok((ctx, output))
    }

    /// Initialize and seed, then run only OUTPUT operations on `ctx`.
    ///
    /// Shares every network with `self`, so an operation can embed a
    /// dataflow over the inputs its own context already holds.
    pub async fn output_subflow(
        &self,
        dataflow: &DataFlow,
        ctx: Option<ContextHandle>,
        inputs: Vec<Input>,
    ) -> Result<(ContextHandle, Value)> {
        self.initialize_dataflow(dataflow).await?;
        let ctx = ctx.unwrap_or_else(ContextHandle::random);
        // An already running context keeps its own lifecycle
        let claimed = self.claim(&ctx);
        let ctx = self.seed_inputs_for_dataflow(dataflow, Some(ctx), inputs);
        debug!(context = %ctx, "Running output subflow");
        if claimed {
            self.set_state(&ctx, ContextState::Output);
        }
        let results = self.run_stage(&ctx, Stage::Output).await;
        if claimed {
            self.set_state(&ctx, ContextState::Done);
        }
        Ok((ctx, collate(results?)))
    }

    /// Run every context that appears on the input network.
    ///
    /// `ctx` is started immediately even if it was already claimed. The
    /// stream ends once every started context finished and no new context is
    /// pending, unless `wait_for_contexts` is set.
    pub fn run_operations(&self, ctx: Option<ContextHandle>) -> ResultStream {
        let octx = self.clone();
        Box::pin(async_stream::stream! {
            let mut runs: JoinSet<Result<(ContextHandle, Value)>> = JoinSet::new();
            if let Some(ctx) = ctx {
                debug!(context = %ctx, "Kickstarting context");
                octx.claim(&ctx);
                octx.spawn_context(&mut runs, ctx);
            }

            loop {
                if runs.is_empty() {
                    let pending = octx.ictx.try_ctx_added().await;
                    if octx.spawn_contexts(&mut runs, pending) > 0 {
                        continue;
                    }
                    if !octx.config.wait_for_contexts {
                        break;
                    }
                }

                let event = tokio::select! {
                    new = octx.ictx.ctx_added() => LoopEvent::NewContexts(new),
                    Some(joined) = runs.join_next() => LoopEvent::Finished(joined),
                };

                match event {
                    LoopEvent::NewContexts(new) => {
                        octx.spawn_contexts(&mut runs, new);
                    }
                    LoopEvent::Finished(Ok(Ok(result))) => {
                        yield Ok(result);
                    }
                    LoopEvent::Finished(Ok(Err(e))) => {
                        if octx.config.strict {
                            yield Err(e);
                            return;
                        }
                        error!(error = %e, "Context run failed");
                    }
                    LoopEvent::Finished(Err(e)) if e.is_cancelled() => {}
                    LoopEvent::Finished(Err(e)) => {
                        let e = DataFlowError::TaskFailed(e.to_string());
                        if octx.config.strict {
                            yield Err(e);
                            return;
                        }
                        error!(error = %e, "Context run failed");
                    }
                }
                debug!(outstanding = runs.len(), "Contexts outstanding");
            }
        })
    }

    fn spawn_context(&self, runs: &mut JoinSet<Result<(ContextHandle, Value)>>, ctx: ContextHandle) {
        let octx = self.clone();
        runs.spawn(async move {
            let output = octx.run_operations_for_ctx(&ctx).await?;
            Ok((ctx, output))
        });
    }

    fn spawn_contexts(
        &self,
        runs: &mut JoinSet<Result<(ContextHandle, Value)>>,
        contexts: Vec<ContextHandle>,
    ) -> usize {
        let mut spawned = 0;
        for ctx in contexts {
            if self.claim(&ctx) {
                debug!(context = %ctx, "New context entered the network");
                self.spawn_context(runs, ctx);
                spawned += 1;
            }
        }
        spawned
    }

    /// Run PROCESSING until quiescent, then CLEANUP, then OUTPUT.
    ///
    /// With exactly one OUTPUT result, that result is returned alone;
    /// otherwise results are keyed by operation instance name.
    pub async fn run_operations_for_ctx(&self, ctx: &ContextHandle) -> Result<Value> {
        self.set_state(ctx, ContextState::Running);
        let processing = self.run_processing(ctx).await;

        self.set_state(ctx, ContextState::Draining);
        if let Err(e) = self.run_stage(ctx, Stage::Cleanup).await {
            error!(context = %ctx, error = %e, "Cleanup stage failed");
        }
        if let Err(e) = processing {
            self.set_state(ctx, ContextState::Done);
            return Err(e);
        }

        self.set_state(ctx, ContextState::Output);
        let result = self.run_stage(ctx, Stage::Output).await.map(collate);
        self.set_state(ctx, ContextState::Done);
        if result.is_ok() {
            info!(context = %ctx, "Context finished");
        }
        result
    }

    async fn run_processing(&self, ctx: &ContextHandle) -> Result<()> {
        let mut tasks: JoinSet<Result<()>> = JoinSet::new();
        let result = self.drive(ctx, &mut tasks).await;
        // Cancels and waits, so locks held by aborted tasks are released.
        tasks.shutdown().await;
        result
    }

    async fn drive(&self, ctx: &ContextHandle, tasks: &mut JoinSet<Result<()>>) -> Result<()> {
        loop {
            if tasks.is_empty() {
                let pending = self.ictx.try_added(ctx).await?;
                if pending.is_empty() {
                    return Ok(());
                }
                self.dispatch_new_inputs(tasks, ctx, &pending).await?;
                continue;
            }

            tokio::select! {
                added = self.ictx.added(ctx) => {
                    let added = added?;
                    self.dispatch_new_inputs(tasks, ctx, &added).await?;
                }
                Some(joined) = tasks.join_next() => {
                    self.handle_finished(ctx, joined)?;
                }
            }
            debug!(context = %ctx, outstanding = tasks.len(), "Operations outstanding");
        }
    }

    fn handle_finished(
        &self,
        ctx: &ContextHandle,
        joined: std::result::Result<Result<()>, JoinError>,
    ) -> Result<()> {
        let e = match joined {
            Ok(Ok(())) => return Ok(()),
            Err(e) if e.is_cancelled() => return Ok(()),
            Ok(Err(e)) => e,
            Err(e) => DataFlowError::TaskFailed(e.to_string()),
        };
        if self.config.strict {
            return Err(e);
        }
        error!(context = %ctx, error = %e, "Operation failed");
        Ok(())
    }

    async fn dispatch_new_inputs(
        &self,
        tasks: &mut JoinSet<Result<()>>,
        ctx: &ContextHandle,
        new_inputs: &[Arc<Input>],
    ) -> Result<()> {
        if new_inputs.is_empty() {
            return Ok(());
        }
        for operation in self.octx.operations(Stage::Processing, Some(new_inputs)) {
            for parameter_set in self.ictx.gather_inputs(&operation, ctx, &self.rctx).await? {
                if self.rctx.check_and_add(&operation, &parameter_set).await? {
                    self.nctx.dispatch(tasks, self, operation.clone(), parameter_set);
                }
            }
        }
        Ok(())
    }

    /// Run every not-yet-run parameter set of `stage` operations in order.
    ///
    /// CLEANUP failures, and any failure outside strict mode, are logged and
    /// skipped.
    pub async fn run_stage(
        &self,
        ctx: &ContextHandle,
        stage: Stage,
    ) -> Result<Vec<(Arc<Operation>, Outputs)>> {
        let mut results = Vec::new();
        for operation in self.octx.operations(stage, None) {
            for parameter_set in self.ictx.gather_inputs(&operation, ctx, &self.rctx).await? {
                if !self.rctx.check_and_add(&operation, &parameter_set).await? {
                    continue;
                }
                let outcome = {
                    let _locks = self.lctx.acquire(&parameter_set).await;
                    self.nctx
                        .run(self, ctx, &operation, parameter_set.to_inputs())
                        .await
                };
                match outcome {
                    Ok(outputs) => results.push((operation.clone(), outputs)),
                    Err(e) if stage == Stage::Cleanup || !self.config.strict => {
                        error!(
                            context = %ctx,
                            operation = %operation.instance_name,
                            stage = %stage,
                            error = %e,
                            "Stage operation failed"
                        );
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(results)
    }

    /// Exit every live implementation.
    pub async fn close(&self) {
        self.nctx.shutdown().await;
    }
}

impl std::fmt::Debug for OrchestratorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorContext")
            .field("config", &self.config)
            .field("contexts", &self.ictx.contexts())
            .finish()
    }
}

/// One result alone, otherwise keyed by instance name.
fn collate(results: Vec<(Arc<Operation>, Outputs)>) -> Value {
    let mut output = Map::new();
    for (operation, outputs) in results {
        output.insert(
            operation.instance_name.clone(),
            Value::Object(outputs.into_iter().collect()),
        );
    }
    if output.len() == 1 {
        output.into_iter().next().map(|(_, only)| only).unwrap_or_default()
    } else {
        Value::Object(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::types::Definition;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn echo_dataflow() -> (DataFlow, Definition) {
        let word = Definition::new("word", "str");
        let shout = Definition::new("shout", "str");
        let dataflow = DataFlow::auto([
            Operation::new("shout")
                .with_input("word", word.clone())
                .with_output("shout", shout.clone()),
            Operation::new("collect")
                .with_input("shout", shout)
                .with_stage(Stage::Output),
        ]);
        (dataflow, word)
    }

    fn echo_registry() -> ImplementationRegistry {
        let mut registry = ImplementationRegistry::new();
        registry.register_fn("shout", |_ctx, inputs| async move {
            let word = inputs["word"].as_str().unwrap_or_default().to_uppercase();
            Ok::<_, BoxError>(Outputs::from([("shout".to_string(), json!(word))]))
        });
        registry.register_fn("collect", |_ctx, inputs| async move {
            Ok::<_, BoxError>(Outputs::from([("seen".to_string(), inputs["shout"].clone())]))
        });
        registry
    }

    #[tokio::test]
    async fn test_run_dataflow_states_and_output() {
        let (dataflow, word) = echo_dataflow();
        let octx = Orchestrator::new(echo_registry()).context().unwrap();

        let ctx = ContextHandle::new("c");
        let (ran, output) = octx
            .run_dataflow(&dataflow, Some(ctx.clone()), vec![Input::new("hi", &word)])
            .await
            .unwrap();

        assert_eq!(ran, ctx);
        assert_eq!(output, json!({"seen": "HI"}));
        assert_eq!(octx.context_state(&ctx), Some(ContextState::Done));
    }

    #[tokio::test]
    async fn test_missing_implementation_is_fatal() {
        let (dataflow, _) = echo_dataflow();
        let octx = Orchestrator::new(ImplementationRegistry::new()).context().unwrap();

        let err = octx.initialize_dataflow(&dataflow).await.unwrap_err();
        assert!(matches!(err, DataFlowError::NotInstantiable { .. }));
    }

    #[tokio::test]
    async fn test_cleanup_runs_after_failure_in_strict_mode() {
        let trigger = Definition::new("trigger", "bool");
        let dataflow = DataFlow::auto([
            Operation::new("explode").with_input("trigger", trigger.clone()),
            Operation::new("release")
                .with_input("trigger", trigger.clone())
                .with_stage(Stage::Cleanup),
        ]);

        let released = Arc::new(AtomicUsize::new(0));
        let mut registry = ImplementationRegistry::new();
        registry.register_fn("explode", |_ctx, _inputs| async {
            Err::<Outputs, BoxError>("boom".into())
        });
        registry.register_fn("release", {
            let released = released.clone();
            move |_ctx, _inputs| {
                let released = released.clone();
                async move {
                    released.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, BoxError>(Outputs::new())
                }
            }
        });

        let octx = Orchestrator::new(registry).context().unwrap();
        let err = octx
            .run_dataflow(&dataflow, None, vec![Input::new(true, &trigger)])
            .await
            .unwrap_err();

        assert!(err.is_execution_error());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_output_subflow_runs_only_output_stage() {
        let (dataflow, word) = echo_dataflow();
        let octx = Orchestrator::new(echo_registry()).context().unwrap();

        let shout = Definition::new("shout", "str");
        let (_, output) = octx
            .output_subflow(&dataflow, None, vec![Input::new("hi", &word), Input::new("PRE", &shout)])
            .await
            .unwrap();

        // `shout` never ran; the output stage saw only the seeded value
        assert_eq!(output, json!({"seen": "PRE"}));
    }

    #[test]
    fn test_collate() {
        let single = vec![(Arc::new(Operation::new("a")), Outputs::from([("k".to_string(), json!(1))]))];
        assert_eq!(collate(single), json!({"k": 1}));

        let multiple = vec![
            (Arc::new(Operation::new("a")), Outputs::from([("k".to_string(), json!(1))])),
            (Arc::new(Operation::new("b")), Outputs::new()),
        ];
        assert_eq!(collate(multiple), json!({"a": {"k": 1}, "b": {}}));
        assert_eq!(collate(Vec::new()), json!({}));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = OrchestratorConfig::default()
            .with_retry(crate::retry::RetryPolicy::default().with_backoff_factor(0.0));
        let err = Orchestrator::new(ImplementationRegistry::new())
            .with_config(config)
            .context()
            .unwrap_err();
        assert!(matches!(err, DataFlowError::Configuration(_)));
    }
}
