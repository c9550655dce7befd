//! Operation-implementation network: live instances and dispatch.
//!
//! ```text
//! dispatch(op, parameter_set)
//!   └─ task ───────────────────────────────────────────────┐
//!        1. acquire locks for the parameter set's lineage   │
//!        2. enter_dispatch, run implementation (retry up to │
//!           op.retry), exit_dispatch                        │
//!        3. outputs -> Inputs (expand lists if requested)   │
//!        4. add Inputs to the input network, same context   │
//!        5. signal "operation completed" (also on failure)  │
//!   ───────────────────────────────────────────────────────┘
//! ```

use crate::error::{BoxError, DataFlowError, Result};
use crate::implementation::{ImplementationRegistry, OperationImplementation, RunContext};
use crate::orchestrator::OrchestratorContext;
use crate::retry::RetryPolicy;
use crate::types::{ContextHandle, Input, Inputs, Operation, Outputs, ParameterSet};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::{AbortHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// Signals completion when dropped, so aborted tasks signal too.
struct CompletionSignal(Arc<Notify>);

impl Drop for CompletionSignal {
    fn drop(&mut self) {
        // Stores a permit when nobody waits yet.
        self.0.notify_one();
    }
}

/// One entered dispatch. `exit` releases it; dropping it unreleased, as
/// happens when the dispatch task is aborted, releases it on a spawned task.
struct DispatchScope {
    implementation: Arc<dyn OperationImplementation>,
    run_ctx: Option<RunContext>,
}

impl DispatchScope {
    async fn enter(
        implementation: Arc<dyn OperationImplementation>,
        run_ctx: RunContext,
    ) -> std::result::Result<Self, BoxError> {
        implementation.enter_dispatch(&run_ctx).await?;
        Ok(Self {
            implementation,
            run_ctx: Some(run_ctx),
        })
    }

    async fn exit(mut self) {
        if let Some(run_ctx) = self.run_ctx.take() {
            exit_dispatch(self.implementation.as_ref(), &run_ctx).await;
        }
    }
}

impl Drop for DispatchScope {
    fn drop(&mut self) {
        let Some(run_ctx) = self.run_ctx.take() else {
            return;
        };
        let implementation = self.implementation.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    exit_dispatch(implementation.as_ref(), &run_ctx).await;
                });
            }
            Err(_) => warn!(
                operation = %run_ctx.operation().instance_name,
                "No runtime left to exit cancelled dispatch"
            ),
        }
    }
}

async fn exit_dispatch(implementation: &dyn OperationImplementation, run_ctx: &RunContext) {
    if let Err(e) = implementation.exit_dispatch(run_ctx).await {
        error!(
            context = %run_ctx.ctx(),
            operation = %run_ctx.operation().instance_name,
            error = %e,
            "Failed to exit operation dispatch"
        );
    }
}

/// Live implementation instances keyed by operation instance name
pub struct OperationImplementationNetwork {
    registry: ImplementationRegistry,
    instances: RwLock<HashMap<String, Arc<dyn OperationImplementation>>>,
    completed: Arc<Notify>,
    retry: RetryPolicy,
}

impl OperationImplementationNetwork {
    /// Create a network that instantiates from `registry`
    pub fn new(registry: ImplementationRegistry, retry: RetryPolicy) -> Self {
        Self {
            registry,
            instances: RwLock::new(HashMap::new()),
            completed: Arc::new(Notify::new()),
            retry,
        }
    }

    /// Whether the operation has a live instance
    pub fn contains(&self, operation: &Operation) -> bool {
        self.instances.read().contains_key(&operation.instance_name)
    }

    /// Whether a factory exists for the operation.
    ///
    /// `reference` overrides the registry key, which defaults to the
    /// operation's name.
    pub fn instantiable(&self, operation: &Operation, reference: Option<&str>) -> bool {
        self.registry
            .contains(reference.unwrap_or(operation.name.as_str()))
    }

    /// Create and enter an instance for the operation unless one is live.
    pub async fn instantiate(
        &self,
        operation: &Operation,
        config: &Value,
        reference: Option<&str>,
    ) -> Result<()> {
        if self.contains(operation) {
            return Ok(());
        }

        let key = reference.unwrap_or(operation.name.as_str());
        let factory = self
            .registry
            .get(key)
            .ok_or_else(|| DataFlowError::not_instantiable(key))?;

        debug!(
            operation = %operation.instance_name,
            implementation = %key,
            "Instantiating operation implementation"
        );
        let instance = factory.create(config).map_err(|e| {
            DataFlowError::Configuration(format!(
                "Failed to create implementation '{}' for '{}': {}",
                key, operation.instance_name, e
            ))
        })?;
        instance.enter().await.map_err(|e| {
            DataFlowError::Configuration(format!(
                "Failed to enter implementation for '{}': {}",
                operation.instance_name, e
            ))
        })?;

        self.instances
            .write()
            .insert(operation.instance_name.clone(), instance);
        Ok(())
    }

    /// Register an already-live instance for an operation.
    pub fn insert(&self, operation: &Operation, instance: Arc<dyn OperationImplementation>) {
        self.instances
            .write()
            .insert(operation.instance_name.clone(), instance);
    }

    /// Fail with `NotInNetwork` unless the operation has a live instance
    pub fn ensure_contains(&self, operation: &Operation) -> Result<()> {
        if self.contains(operation) {
            Ok(())
        } else {
            Err(DataFlowError::not_in_network(&operation.instance_name))
        }
    }

    fn instance(&self, operation: &Operation) -> Result<Arc<dyn OperationImplementation>> {
        self.instances
            .read()
            .get(&operation.instance_name)
            .cloned()
            .ok_or_else(|| DataFlowError::not_in_network(&operation.instance_name))
    }

    /// Invoke the implementation, re-invoking up to `operation.retry` times.
    ///
    /// All attempts run inside one `enter_dispatch` / `exit_dispatch` pair.
    pub async fn run(
        &self,
        octx: &OrchestratorContext,
        ctx: &ContextHandle,
        operation: &Arc<Operation>,
        inputs: Inputs,
    ) -> Result<Outputs> {
        let implementation = self.instance(operation)?;
        let run_ctx = RunContext::new(ctx.clone(), operation.clone(), octx.clone());

        let scope = DispatchScope::enter(implementation.clone(), run_ctx.clone())
            .await
            .map_err(|e| DataFlowError::operation_execution(&operation.instance_name, 0, e))?;
        let result = self.run_attempts(implementation.as_ref(), &run_ctx, inputs).await;
        scope.exit().await;
        result
    }

    async fn run_attempts(
        &self,
        implementation: &dyn OperationImplementation,
        run_ctx: &RunContext,
        inputs: Inputs,
    ) -> Result<Outputs> {
        let ctx = run_ctx.ctx();
        let operation = run_ctx.operation();
        let max_attempts = operation.retry + 1;

        let mut attempts = 0;
        loop {
            attempts += 1;
            debug!(
                context = %ctx,
                operation = %operation.instance_name,
                attempt = attempts,
                max_attempts = max_attempts,
                "Running operation"
            );

            match implementation.run(run_ctx, inputs.clone()).await {
                Ok(outputs) => {
                    if attempts > 1 {
                        info!(
                            context = %ctx,
                            operation = %operation.instance_name,
                            attempts = attempts,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(outputs);
                }
                Err(e) if self.retry.should_retry(attempts, operation.retry) => {
                    let delay = self.retry.calculate_delay(attempts - 1);
                    warn!(
                        context = %ctx,
                        operation = %operation.instance_name,
                        attempt = attempts,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Operation failed, retrying after delay"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => {
                    return Err(DataFlowError::operation_execution(
                        &operation.instance_name,
                        attempts,
                        e,
                    ));
                }
            }
        }
    }

    /// Spawn the full lock, run, convert, inject cycle onto `tasks`.
    pub fn dispatch(
        &self,
        tasks: &mut JoinSet<Result<()>>,
        octx: &OrchestratorContext,
        operation: Arc<Operation>,
        parameter_set: ParameterSet,
    ) -> AbortHandle {
        debug!(
            context = %parameter_set.ctx(),
            operation = %operation.instance_name,
            "Dispatching operation"
        );
        let signal = CompletionSignal(self.completed.clone());
        let octx = octx.clone();
        tasks.spawn(async move {
            let _signal = signal;
            octx.opimp_network()
                .run_dispatch(&octx, &operation, &parameter_set)
                .await
                .map(|_| ())
        })
    }

    /// Run one dispatch inline and return the inputs it added.
    pub async fn run_dispatch(
        &self,
        octx: &OrchestratorContext,
        operation: &Arc<Operation>,
        parameter_set: &ParameterSet,
    ) -> Result<Vec<Arc<Input>>> {
        let ctx = parameter_set.ctx();
        let outputs = {
            let _locks = octx.lock_network().acquire(parameter_set).await;
            self.run(octx, ctx, operation, parameter_set.to_inputs())
                .await?
        };

        let inputs = Self::outputs_to_inputs(operation, parameter_set, outputs)?;
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        debug!(
            context = %ctx,
            operation = %operation.instance_name,
            new_inputs = inputs.len(),
            "Adding operation outputs"
        );
        Ok(octx.input_network().add(ctx, inputs))
    }

    /// Turn returned outputs into inputs parented on the parameter set.
    pub fn outputs_to_inputs(
        operation: &Operation,
        parameter_set: &ParameterSet,
        outputs: Outputs,
    ) -> Result<Vec<Input>> {
        let parents = parameter_set.input_ids();
        let mut inputs = Vec::new();

        for (key, value) in outputs {
            let definition = operation.outputs.get(&key).ok_or_else(|| {
                DataFlowError::MissingOutputDefinition {
                    instance_name: operation.instance_name.clone(),
                    key: key.clone(),
                }
            })?;

            let values = if operation.expand.contains(&key) {
                match value {
                    Value::Array(items) => items,
                    _ => {
                        return Err(DataFlowError::ExpandNotSequence {
                            instance_name: operation.instance_name.clone(),
                            key,
                        })
                    }
                }
            } else {
                vec![value]
            };

            for value in values {
                if !definition.accepts(&value) {
                    warn!(
                        operation = %operation.instance_name,
                        output = %key,
                        definition = %definition,
                        "Output value does not match definition primitive"
                    );
                }
                inputs.push(
                    Input::new(value, definition)
                        .with_parents(parents.clone())
                        .with_origin(operation.instance_name.clone()),
                );
            }
        }
        Ok(inputs)
    }

    /// Wait until some dispatched operation finishes.
    pub async fn operation_completed(&self) {
        self.completed.notified().await;
    }

    /// Exit and drop every live instance.
    pub async fn shutdown(&self) {
        let instances: Vec<(String, Arc<dyn OperationImplementation>)> =
            self.instances.write().drain().collect();
        for (instance_name, instance) in instances {
            if let Err(e) = instance.exit().await {
                error!(operation = %instance_name, error = %e, "Failed to exit operation implementation");
            }
        }
    }

    /// Number of live instances
    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    /// Whether no instance is live
    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }
}

impl std::fmt::Debug for OperationImplementationNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.instances.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("OperationImplementationNetwork")
            .field("instances", &names)
            .field("retry", &self.retry)
            .finish()
    }
}
