//! Key/value storage backing the redundancy checker
//!
//! The redundancy checker only needs two primitives, `get` and `set`, over
//! string keys and byte values. [`KeyValueStore`] is the pluggable contract;
//! [`MemoryKeyValueStore`] is the in-process backing implementation, a
//! mutex-guarded map.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────┐
//! │  RedundancyChecker        │
//! │  • fingerprint(op, ps)    │
//! └────────────┬──────────────┘
//!              │ get / set
//!              ↓
//! ┌───────────────────────────┐
//! │  KeyValueStore trait      │
//! │  • get(key) -> bytes?     │
//! │  • set(key, bytes)        │
//! └────────────┬──────────────┘
//!              ↓
//! ┌───────────────────────────┐
//! │  MemoryKeyValueStore      │
//! │  Mutex<HashMap<..>>       │
//! └───────────────────────────┘
//! ```
//!
//! # Implementing Custom Backends
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use dataflow_core::store::{KeyValueStore, Result};
//!
//! pub struct RedisStore {
//!     client: redis::Client,
//! }
//!
//! #[async_trait]
//! impl KeyValueStore for RedisStore {
//!     async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
//!         todo!()
//!     }
//!
//!     async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Error type for key/value store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backend could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// Other error
    #[error("Store error: {0}")]
    Other(String),
}

/// Result type for key/value store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Key/value store contract
///
/// Implementations can use any backend: in-memory, Redis, a database, etc.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get the bytes stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;
}

/// In-memory implementation of [`KeyValueStore`]
///
/// Thread-safe and ephemeral; suitable for the single-process engine.
#[derive(Default)]
pub struct MemoryKeyValueStore {
    memory: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKeyValueStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys in the store
    pub fn len(&self) -> usize {
        self.memory.lock().len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.memory.lock().is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.memory.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.memory.lock().insert(key.to_string(), value);
        Ok(())
    }
}
