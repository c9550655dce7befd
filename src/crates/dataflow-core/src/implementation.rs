//! Operation implementations and the registry that creates them.
//!
//! An implementation maps named inputs to named outputs:
//!
//! ```rust,ignore
//! use dataflow_core::implementation::{ImplementationRegistry, OperationImplementation, RunContext};
//! use dataflow_core::{BoxError, Inputs, Outputs};
//! use async_trait::async_trait;
//! use serde_json::json;
//!
//! struct Add;
//!
//! #[async_trait]
//! impl OperationImplementation for Add {
//!     async fn run(&self, _ctx: &RunContext, inputs: Inputs) -> Result<Outputs, BoxError> {
//!         let numbers = inputs["numbers"].as_array().ok_or("numbers must be a list")?;
//!         let sum: i64 = numbers.iter().filter_map(|n| n.as_i64()).sum();
//!         Ok(Outputs::from([("sum".to_string(), json!(sum))]))
//!     }
//! }
//!
//! let mut registry = ImplementationRegistry::new();
//! registry.register_instance("add", std::sync::Arc::new(Add));
//! ```
//!
//! Implementations are created once per operation instance through an
//! [`ImplementationFactory`], which receives the instance's config document.
//! `enter` runs right after creation and `exit` when the orchestrator context
//! is closed. `enter_dispatch` and `exit_dispatch` bracket one dispatch,
//! spanning all of its retry attempts. `exit_dispatch` runs whether the
//! dispatch succeeded or failed; a cancelled dispatch gets it on a spawned
//! task.

use crate::error::{BoxError, Result};
use crate::orchestrator::OrchestratorContext;
use crate::types::{ContextHandle, Definition, Input, Inputs, Operation, Outputs};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Future returned by closure-based implementations
pub type OperationFuture = Pin<Box<dyn Future<Output = std::result::Result<Outputs, BoxError>> + Send>>;

/// Result of [`ImplementationFactory::create`]
pub type FactoryResult = std::result::Result<Arc<dyn OperationImplementation>, BoxError>;

/// A live operation implementation
#[async_trait]
pub trait OperationImplementation: Send + Sync {
    /// Called once after instantiation
    async fn enter(&self) -> std::result::Result<(), BoxError> {
        Ok(())
    }

    /// Called before the first attempt of a dispatch, e.g. to open a
    /// per-call resource. A failure fails the dispatch without running it.
    async fn enter_dispatch(&self, _ctx: &RunContext) -> std::result::Result<(), BoxError> {
        Ok(())
    }

    /// Execute with the bound input values
    async fn run(&self, ctx: &RunContext, inputs: Inputs) -> std::result::Result<Outputs, BoxError>;

    /// Called once after the last attempt of a dispatch entered with
    /// `enter_dispatch`
    async fn exit_dispatch(&self, _ctx: &RunContext) -> std::result::Result<(), BoxError> {
        Ok(())
    }

    /// Called once when the owning orchestrator context closes
    async fn exit(&self) -> std::result::Result<(), BoxError> {
        Ok(())
    }
}

/// What an implementation can see while it runs
#[derive(Clone)]
pub struct RunContext {
    ctx: ContextHandle,
    operation: Arc<Operation>,
    octx: OrchestratorContext,
}

impl RunContext {
    pub(crate) fn new(ctx: ContextHandle, operation: Arc<Operation>, octx: OrchestratorContext) -> Self {
        Self { ctx, operation, octx }
    }

    /// Context the invocation belongs to
    pub fn ctx(&self) -> &ContextHandle {
        &self.ctx
    }

    /// Operation being executed
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// Orchestrator context running this invocation, for subflows
    pub fn orchestrator(&self) -> &OrchestratorContext {
        &self.octx
    }

    /// Look up a definition by name in this context
    pub fn definition(&self, name: &str) -> Result<Definition> {
        self.octx.input_network().definition(&self.ctx, name)
    }

    /// Inputs of a definition in this context, in insertion order
    pub fn inputs(&self, definition: &Definition) -> Result<Vec<Arc<Input>>> {
        self.octx.input_network().inputs(&self.ctx, definition)
    }

    /// Definitions present in this context
    pub fn definitions(&self) -> Result<Vec<Definition>> {
        self.octx.input_network().definitions(&self.ctx)
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("ctx", &self.ctx)
            .field("operation", &self.operation.instance_name)
            .finish()
    }
}

/// Implementation backed by an async closure
pub struct FnOperation {
    executor: Arc<dyn Fn(RunContext, Inputs) -> OperationFuture + Send + Sync>,
}

impl FnOperation {
    /// Wrap a closure
    pub fn new<F, Fut>(executor: F) -> Self
    where
        F: Fn(RunContext, Inputs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Outputs, BoxError>> + Send + 'static,
    {
        Self {
            executor: Arc::new(move |ctx: RunContext, inputs: Inputs| -> OperationFuture {
                Box::pin(executor(ctx, inputs))
            }),
        }
    }
}

#[async_trait]
impl OperationImplementation for FnOperation {
    async fn run(&self, ctx: &RunContext, inputs: Inputs) -> std::result::Result<Outputs, BoxError> {
        (self.executor)(ctx.clone(), inputs).await
    }
}

/// Convenience function to create a closure-backed implementation
pub fn op_fn<F, Fut>(executor: F) -> Arc<dyn OperationImplementation>
where
    F: Fn(RunContext, Inputs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Outputs, BoxError>> + Send + 'static,
{
    Arc::new(FnOperation::new(executor))
}

/// Creates implementation instances from a config document
pub trait ImplementationFactory: Send + Sync {
    /// Build one instance
    fn create(&self, config: &Value) -> FactoryResult;
}

impl<F> ImplementationFactory for F
where
    F: Fn(&Value) -> FactoryResult + Send + Sync,
{
    fn create(&self, config: &Value) -> FactoryResult {
        self(config)
    }
}

/// Explicit name -> factory map, filled by the embedding application
#[derive(Clone, Default)]
pub struct ImplementationRegistry {
    factories: HashMap<String, Arc<dyn ImplementationFactory>>,
}

impl ImplementationRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`, replacing any previous one
    pub fn register(&mut self, name: impl Into<String>, factory: impl ImplementationFactory + 'static) -> &mut Self {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Register a shared instance; every operation using `name` gets the same one
    pub fn register_instance(
        &mut self,
        name: impl Into<String>,
        implementation: Arc<dyn OperationImplementation>,
    ) -> &mut Self {
        self.register(name, move |_: &Value| -> FactoryResult { Ok(implementation.clone()) })
    }

    /// Register an async closure; each operation instance gets its own wrapper
    pub fn register_fn<F, Fut>(&mut self, name: impl Into<String>, executor: F) -> &mut Self
    where
        F: Fn(RunContext, Inputs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Outputs, BoxError>> + Send + 'static,
    {
        let executor = Arc::new(executor);
        self.register(name, move |_: &Value| -> FactoryResult {
            let executor = executor.clone();
            Ok(op_fn(move |ctx, inputs| (*executor)(ctx, inputs)))
        })
    }

    /// Look up a factory
    pub fn get(&self, name: &str) -> Option<Arc<dyn ImplementationFactory>> {
        self.factories.get(name).cloned()
    }

    /// Whether a factory is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for ImplementationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImplementationRegistry")
            .field("names", &self.names())
            .finish()
    }
}
