//! Retry Policies - Backoff between re-invocations of a failing implementation
//!
//! An operation declares *how many* times it may be re-invoked
//! (`Operation::retry`); the orchestrator's [`RetryPolicy`] decides *how long*
//! to wait between those invocations. A dispatch of an operation with
//! `retry = n` calls the implementation at most `n + 1` times, and the last
//! failure is surfaced as [`DataFlowError::OperationExecution`].
//!
//! [`DataFlowError::OperationExecution`]: crate::error::DataFlowError::OperationExecution
//!
//! # Exponential Backoff
//!
//! ```text
//! delay = initial_interval × (backoff_factor ^ attempt)
//! delay = min(delay, max_interval)
//! if jitter: delay *= random(0.5..=1.5)
//! ```
//!
//! The default policy retries immediately (zero interval, no jitter), which
//! keeps in-memory flows deterministic. Use [`RetryPolicy::exponential`] for
//! implementations that talk to external services.
//!
//! ```rust
//! use dataflow_core::retry::RetryPolicy;
//!
//! let policy = RetryPolicy::exponential()
//!     .with_initial_interval(1.0)
//!     .with_backoff_factor(3.0)
//!     .with_max_interval(60.0)
//!     .with_jitter(false);
//!
//! assert_eq!(policy.calculate_delay(2).as_secs_f64(), 9.0);
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest delay between attempts, in seconds (one year)
pub const MAX_INTERVAL_SECS: f64 = 31_536_000.0;

/// Backoff between attempts of one dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Interval before the first re-invocation, in seconds
    pub initial_interval: f64,

    /// Multiplier for the interval after each re-invocation
    pub backoff_factor: f64,

    /// Maximum interval between attempts, in seconds
    pub max_interval: f64,

    /// Whether to add random jitter to intervals
    pub jitter: bool,
}

impl RetryPolicy {
    /// Retry immediately
    pub fn immediate() -> Self {
        Self {
            initial_interval: 0.0,
            backoff_factor: 1.0,
            max_interval: 0.0,
            jitter: false,
        }
    }

    /// Exponential backoff starting at half a second, doubling, capped at 128s, with jitter
    pub fn exponential() -> Self {
        Self {
            initial_interval: 0.5,
            backoff_factor: 2.0,
            max_interval: 128.0,
            jitter: true,
        }
    }

    /// Set the initial interval between retries
    pub fn with_initial_interval(mut self, seconds: f64) -> Self {
        self.initial_interval = seconds;
        self
    }

    /// Set the backoff factor
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Set the maximum interval between retries
    pub fn with_max_interval(mut self, seconds: f64) -> Self {
        self.max_interval = seconds;
        self
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before re-invocation number `attempt + 1` (0-indexed)
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base_delay = self.initial_interval * self.backoff_factor.powi(exponent);
        let capped_delay = base_delay.min(self.max_interval).max(0.0);

        let final_delay = if self.jitter && capped_delay > 0.0 {
            let jitter_factor = rand::thread_rng().gen_range(0.5..=1.5);
            capped_delay * jitter_factor
        } else {
            capped_delay
        };

        // NaN collapses to the bound through `min`.
        let bounded = final_delay.min(MAX_INTERVAL_SECS).max(0.0);
        Duration::try_from_secs_f64(bounded).unwrap_or(Duration::from_secs(MAX_INTERVAL_SECS as u64))
    }

    /// Whether another invocation is allowed after `attempts` failures,
    /// given the operation's `retry` budget.
    pub fn should_retry(&self, attempts: usize, retry: usize) -> bool {
        attempts <= retry
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::immediate()
    }
}
