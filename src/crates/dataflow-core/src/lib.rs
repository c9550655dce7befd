//! # dataflow-core - In-memory dataflow execution engine
//!
//! A dataflow is a set of operations, each with named inputs and outputs
//! typed by [`Definition`]s. Values ([`Input`]s) are added to a *context*;
//! every time new values arrive the orchestrator finds the operations that
//! can consume them, forms every not-yet-run combination of inputs, and runs
//! them concurrently. Their outputs become new inputs in the same context,
//! until nothing is left to run.
//!
//! ## Core Concepts
//!
//! - **Input network** ([`input_network`]) - per-context store of inputs,
//!   notifies consumers of new contexts and new inputs.
//! - **Operation network** ([`operation_network`]) - registered operations,
//!   queried by stage and by the definitions they consume.
//! - **Redundancy checker** ([`redundancy`]) - records every
//!   `(operation, context, input ids)` combination so each runs at most once.
//! - **Lock network** ([`lock`]) - per-input mutual exclusion for inputs of
//!   locking definitions, acquired in a total order.
//! - **Operation-implementation network** ([`opimp_network`]) - live
//!   implementations, retries, and conversion of outputs back into inputs.
//! - **Orchestrator** ([`orchestrator`]) - drives each context through
//!   PROCESSING, CLEANUP and OUTPUT.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dataflow_core::{
//!     BoxError, ContextHandle, DataFlow, Definition, ImplementationRegistry, Input,
//!     Operation, Orchestrator, Outputs, Stage,
//! };
//! use futures::StreamExt;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> dataflow_core::Result<()> {
//!     let word = Definition::new("word", "str");
//!     let shout = Definition::new("shout", "str");
//!
//!     let dataflow = DataFlow::auto([
//!         Operation::new("shout").with_input("word", word.clone()).with_output("shout", shout.clone()),
//!         Operation::new("collect").with_input("shout", shout).with_stage(Stage::Output),
//!     ]);
//!
//!     let mut registry = ImplementationRegistry::new();
//!     registry.register_fn("shout", |_ctx, inputs| async move {
//!         let word = inputs["word"].as_str().unwrap_or_default().to_uppercase();
//!         Ok::<_, BoxError>(Outputs::from([("shout".to_string(), json!(word))]))
//!     });
//!     registry.register_fn("collect", |_ctx, inputs| async move {
//!         Ok::<_, BoxError>(inputs)
//!     });
//!
//!     let orchestrator = Orchestrator::new(registry);
//!     let mut results = orchestrator.run(
//!         dataflow,
//!         vec![(ContextHandle::new("greeting"), vec![Input::new("hello", &word)])],
//!     );
//!     while let Some(result) = results.next().await {
//!         let (ctx, output) = result?;
//!         println!("{}: {}", ctx, output); // greeting: {"shout":"HELLO"}
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Loading dataflows
//!
//! Dataflows can be described in YAML or JSON ([`document`]), merged, and
//! rendered as Mermaid diagrams ([`visualization`]).

pub mod config;
pub mod dataflow;
pub mod document;
pub mod error;
pub mod implementation;
pub mod input_network;
pub mod lock;
pub mod notify;
pub mod operation_network;
pub mod opimp_network;
pub mod orchestrator;
pub mod redundancy;
pub mod retry;
pub mod store;
pub mod types;
pub mod visualization;

pub use config::OrchestratorConfig;
pub use dataflow::{DataFlow, InputSource, SEED_ORIGIN};
pub use document::{merge_values, DataFlowDocument, DefinitionDocument, OperationDocument, SeedDocument};
pub use error::{BoxError, DataFlowError, Result};
pub use implementation::{
    op_fn, FactoryResult, FnOperation, ImplementationFactory, ImplementationRegistry,
    OperationImplementation, RunContext,
};
pub use input_network::{InputNetwork, NetworkEvent};
pub use lock::{LockGuard, LockNetwork};
pub use notify::NotificationSet;
pub use operation_network::OperationNetwork;
pub use opimp_network::OperationImplementationNetwork;
pub use orchestrator::{ContextState, Orchestrator, OrchestratorContext, ResultStream};
pub use redundancy::RedundancyChecker;
pub use retry::{RetryPolicy, MAX_INTERVAL_SECS};
pub use store::{KeyValueStore, MemoryKeyValueStore, StoreError};
pub use types::{
    is_truthy, ContextHandle, Definition, Input, InputId, Inputs, Operation, Outputs, Parameter,
    ParameterSet, Stage,
};
pub use visualization::{render_mermaid, DiagramOptions};
