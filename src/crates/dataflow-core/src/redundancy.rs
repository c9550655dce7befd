//! Redundancy checker: the at-most-once ledger.
//!
//! Each `(operation, parameter set, context)` triple is reduced to a
//! fingerprint, a SHA-384 hex digest of
//! `"<instance_name>, <context>, <sorted input ids...>"`, and recorded in a
//! [`KeyValueStore`]. Sorting the ids makes the fingerprint independent of
//! the order in which parameters were bound.

use crate::error::Result;
use crate::store::{KeyValueStore, MemoryKeyValueStore};
use crate::types::{Operation, ParameterSet};
use sha2::{Digest, Sha384};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Ledger of dispatched parameter sets
pub struct RedundancyChecker {
    store: Arc<dyn KeyValueStore>,
    // Serializes check-and-record so two discoveries cannot both win.
    guard: Mutex<()>,
}

impl RedundancyChecker {
    /// Checker backed by the in-memory store
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryKeyValueStore::new()))
    }

    /// Checker backed by a custom store
    pub fn with_store(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            guard: Mutex::new(()),
        }
    }

    /// Deterministic fingerprint of an operation invocation.
    pub fn unique(operation: &Operation, parameter_set: &ParameterSet) -> String {
        let mut parts = vec![
            operation.instance_name.clone(),
            parameter_set.ctx().to_string(),
        ];
        parts.extend(parameter_set.input_ids().iter().map(|id| id.to_string()));

        let mut hasher = Sha384::new();
        hasher.update(parts.join(", ").as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Whether this invocation was already recorded
    pub async fn exists(&self, operation: &Operation, parameter_set: &ParameterSet) -> Result<bool> {
        let key = Self::unique(operation, parameter_set);
        Ok(self.store.get(&key).await?.is_some())
    }

    /// Record this invocation
    pub async fn add(&self, operation: &Operation, parameter_set: &ParameterSet) -> Result<()> {
        let key = Self::unique(operation, parameter_set);
        let _guard = self.guard.lock().await;
        self.store.set(&key, b"\x01".to_vec()).await?;
        Ok(())
    }

    /// Record this invocation unless already present.
    ///
    /// Returns `true` when the caller is the first to record it and
    /// therefore owns the dispatch.
    pub async fn check_and_add(
        &self,
        operation: &Operation,
        parameter_set: &ParameterSet,
    ) -> Result<bool> {
        let key = Self::unique(operation, parameter_set);
        let _guard = self.guard.lock().await;
        if self.store.get(&key).await?.is_some() {
            return Ok(false);
        }
        self.store.set(&key, b"\x01".to_vec()).await?;
        Ok(true)
    }
}

impl Default for RedundancyChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RedundancyChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedundancyChecker").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContextHandle, Definition, Input, Parameter};

    fn parameter_set(ctx: &str, inputs: &[Arc<Input>]) -> ParameterSet {
        let parameters = inputs
            .iter()
            .enumerate()
            .map(|(i, input)| Parameter {
                key: format!("p{}", i),
                origin: input.clone(),
                definition: input.definition().clone(),
            })
            .collect();
        ParameterSet::new(ContextHandle::new(ctx), parameters, vec![])
    }

    #[test]
    fn test_fingerprint_order_independent() {
        let def = Definition::new("n", "int");
        let a = Arc::new(Input::new(1, &def));
        let b = Arc::new(Input::new(2, &def));
        let op = Operation::new("add");

        let ab = RedundancyChecker::unique(&op, &parameter_set("c", &[a.clone(), b.clone()]));
        let ba = RedundancyChecker::unique(&op, &parameter_set("c", &[b, a]));
        assert_eq!(ab, ba);
        assert_eq!(ab.len(), 96);
    }

    #[test]
    fn test_fingerprint_depends_on_context_and_instance() {
        let def = Definition::new("n", "int");
        let a = Arc::new(Input::new(1, &def));
        let op = Operation::new("add");

        let c1 = RedundancyChecker::unique(&op, &parameter_set("c1", &[a.clone()]));
        let c2 = RedundancyChecker::unique(&op, &parameter_set("c2", &[a.clone()]));
        let other = RedundancyChecker::unique(
            &op.clone().with_instance_name("add_again"),
            &parameter_set("c1", &[a]),
        );
        assert_ne!(c1, c2);
        assert_ne!(c1, other);
    }

    #[tokio::test]
    async fn test_check_and_add_once() {
        let checker = RedundancyChecker::new();
        let def = Definition::new("n", "int");
        let ps = parameter_set("c", &[Arc::new(Input::new(1, &def))]);
        let op = Operation::new("add");

        assert!(!checker.exists(&op, &ps).await.unwrap());
        assert!(checker.check_and_add(&op, &ps).await.unwrap());
        assert!(!checker.check_and_add(&op, &ps).await.unwrap());
        assert!(checker.exists(&op, &ps).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_check_and_add_single_winner() {
        let checker = Arc::new(RedundancyChecker::new());
        let def = Definition::new("n", "int");
        let ps = parameter_set("c", &[Arc::new(Input::new(1, &def))]);
        let op = Operation::new("add");

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let checker = checker.clone();
                let (op, ps) = (op.clone(), ps.clone());
                tokio::spawn(async move { checker.check_and_add(&op, &ps).await.unwrap() })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
