//! Lock network: per-input mutual exclusion.
//!
//! Before an operation runs, every input in its parameter set's lineage whose
//! definition has `lock = true` is locked. Locks are created on demand, one
//! per [`InputId`], under a table mutex distinct from the locks themselves,
//! and acquired in ascending id order so overlapping ancestries cannot
//! deadlock. The returned [`LockGuard`] releases everything on drop,
//! including when the dispatch task is aborted, and removes table entries
//! nobody else holds or waits on.

use crate::types::{InputId, ParameterSet};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

type LockTable = HashMap<InputId, Arc<AsyncMutex<()>>>;

/// Table of per-input locks
#[derive(Debug, Default)]
pub struct LockNetwork {
    locks: Arc<Mutex<LockTable>>,
}

/// Held locks for one dispatch
#[derive(Debug)]
pub struct LockGuard {
    ids: Vec<InputId>,
    guards: Vec<OwnedMutexGuard<()>>,
    table: Arc<Mutex<LockTable>>,
}

impl LockGuard {
    /// Ids locked by this guard, in acquisition order
    pub fn ids(&self) -> &[InputId] {
        &self.ids
    }

    /// Whether nothing needed locking
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.ids.is_empty() {
            return;
        }
        debug!(locks = self.ids.len(), "Releasing input locks");
        self.guards.clear();

        // Clones are only handed out under the table mutex, so a count of one
        // here means no holder and no waiter.
        let mut table = self.table.lock();
        for id in &self.ids {
            if table.get(id).is_some_and(|mutex| Arc::strong_count(mutex) == 1) {
                table.remove(id);
            }
        }
    }
}

impl LockNetwork {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Lockable input ids of a parameter set, sorted and deduplicated.
    pub fn lock_ids(parameter_set: &ParameterSet) -> Vec<InputId> {
        let mut ids: Vec<InputId> = parameter_set
            .lineage()
            .iter()
            .filter(|input| input.definition().lock)
            .map(|input| input.uid())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Acquire every lock the parameter set needs.
    pub async fn acquire(&self, parameter_set: &ParameterSet) -> LockGuard {
        self.acquire_ids(Self::lock_ids(parameter_set)).await
    }

    /// Acquire locks for explicit ids; they are sorted before acquisition.
    pub async fn acquire_ids(&self, mut ids: Vec<InputId>) -> LockGuard {
        ids.sort();
        ids.dedup();

        let mutexes: Vec<Arc<AsyncMutex<()>>> = {
            let mut table = self.locks.lock();
            ids.iter()
                .map(|id| table.entry(*id).or_default().clone())
                .collect()
        };

        let mut guards = Vec::with_capacity(mutexes.len());
        for (id, mutex) in ids.iter().zip(mutexes) {
            debug!(input = %id, "Acquiring input lock");
            guards.push(mutex.lock_owned().await);
        }

        LockGuard {
            ids,
            guards,
            table: self.locks.clone(),
        }
    }

    /// Number of locks currently held or waited on
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// Whether no lock is held or waited on
    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}
