//! Orchestrator configuration.
//!
//! [`OrchestratorConfig`] can be built in code, read from the environment
//! with a prefix, or loaded from a YAML/JSON file:
//!
//! ```rust,ignore
//! use dataflow_core::config::OrchestratorConfig;
//!
//! // DATAFLOW_STRICT=false DATAFLOW_RETRY_INITIAL_INTERVAL=0.5
//! let config = OrchestratorConfig::from_env("DATAFLOW")?;
//!
//! let config = OrchestratorConfig::from_file("orchestrator.yaml")?;
//! ```
//!
//! Unset variables keep their defaults; malformed values are a
//! [`DataFlowError::Configuration`].

use crate::error::{DataFlowError, Result};
use crate::retry::{RetryPolicy, MAX_INTERVAL_SECS};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings shared by every context an orchestrator runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Abort a context's run when an operation fails
    pub strict: bool,

    /// Backoff between re-invocations of a failing implementation
    pub retry: RetryPolicy,

    /// Keep the top-level run stream open for contexts that appear later
    pub wait_for_contexts: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            strict: true,
            retry: RetryPolicy::default(),
            wait_for_contexts: false,
        }
    }
}

impl OrchestratorConfig {
    /// Set strict mode
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Set the retry backoff policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Keep waiting for new contexts
    pub fn with_wait_for_contexts(mut self, wait: bool) -> Self {
        self.wait_for_contexts = wait;
        self
    }

    /// Read `{PREFIX}_STRICT`, `{PREFIX}_WAIT_FOR_CONTEXTS` and the
    /// `{PREFIX}_RETRY_*` variables on top of the defaults.
    pub fn from_env(prefix: &str) -> Result<Self> {
        let key = |name: &str| format!("{}_{}", prefix, name);
        let mut config = Self::default();

        if let Some(strict) = env_bool(&key("STRICT"))? {
            config.strict = strict;
        }
        if let Some(wait) = env_bool(&key("WAIT_FOR_CONTEXTS"))? {
            config.wait_for_contexts = wait;
        }
        if let Some(interval) = env_parse::<f64>(&key("RETRY_INITIAL_INTERVAL"))? {
            config.retry.initial_interval = interval;
        }
        if let Some(factor) = env_parse::<f64>(&key("RETRY_BACKOFF_FACTOR"))? {
            config.retry.backoff_factor = factor;
        }
        if let Some(max) = env_parse::<f64>(&key("RETRY_MAX_INTERVAL"))? {
            config.retry.max_interval = max;
        }
        if let Some(jitter) = env_bool(&key("RETRY_JITTER"))? {
            config.retry.jitter = jitter;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from a file, detecting the format from the extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = load_config_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject intervals outside `0..=MAX_INTERVAL_SECS` and backoff factors
    /// below one.
    pub fn validate(&self) -> Result<()> {
        let retry = &self.retry;
        for (name, value) in [
            ("initial_interval", retry.initial_interval),
            ("max_interval", retry.max_interval),
        ] {
            if !(0.0..=MAX_INTERVAL_SECS).contains(&value) {
                return Err(DataFlowError::Configuration(format!(
                    "retry.{} must be between 0 and {} seconds, got {}",
                    name, MAX_INTERVAL_SECS, value
                )));
            }
        }
        if retry.backoff_factor < 1.0 || !retry.backoff_factor.is_finite() {
            return Err(DataFlowError::Configuration(format!(
                "retry.backoff_factor must be at least 1, got {}",
                retry.backoff_factor
            )));
        }
        Ok(())
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    env_var(key)
        .map(|value| {
            value.trim().parse::<T>().map_err(|e| {
                DataFlowError::Configuration(format!(
                    "Failed to parse environment variable '{}': {}",
                    key, e
                ))
            })
        })
        .transpose()
}

fn env_bool(key: &str) -> Result<Option<bool>> {
    env_var(key)
        .map(|value| match value.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(DataFlowError::Configuration(format!(
                "Invalid boolean value for '{}': {}",
                key, value
            ))),
        })
        .transpose()
}

/// Deserialize a YAML or JSON file chosen by extension.
pub(crate) fn load_config_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| {
            DataFlowError::Configuration(format!(
                "Unable to determine file extension for {:?}",
                path
            ))
        })?;

    let content = std::fs::read_to_string(path)?;
    match extension.to_lowercase().as_str() {
        "yaml" | "yml" => Ok(serde_yaml::from_str(&content)?),
        "json" => Ok(serde_json::from_str(&content)?),
        other => Err(DataFlowError::Configuration(format!(
            "Unsupported config file extension: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert!(config.strict);
        assert!(!config.wait_for_contexts);
        assert_eq!(config.retry, RetryPolicy::immediate());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_env_overrides() {
        std::env::set_var("DFTEST_ENV_STRICT", "off");
        std::env::set_var("DFTEST_ENV_RETRY_INITIAL_INTERVAL", "0.25");
        std::env::set_var("DFTEST_ENV_RETRY_BACKOFF_FACTOR", "2");
        std::env::set_var("DFTEST_ENV_RETRY_MAX_INTERVAL", "4");
        std::env::set_var("DFTEST_ENV_RETRY_JITTER", "yes");

        let config = OrchestratorConfig::from_env("DFTEST_ENV").unwrap();
        assert!(!config.strict);
        assert!(!config.wait_for_contexts);
        assert_eq!(config.retry.initial_interval, 0.25);
        assert_eq!(config.retry.backoff_factor, 2.0);
        assert_eq!(config.retry.max_interval, 4.0);
        assert!(config.retry.jitter);
    }

    #[test]
    fn test_from_env_invalid_bool() {
        std::env::set_var("DFTEST_BAD_STRICT", "maybe");

        let err = OrchestratorConfig::from_env("DFTEST_BAD").unwrap_err();
        assert!(matches!(err, DataFlowError::Configuration(_)));
    }

    #[test]
    fn test_from_env_rejects_invalid_policy() {
        std::env::set_var("DFTEST_FACTOR_RETRY_BACKOFF_FACTOR", "0.5");

        let err = OrchestratorConfig::from_env("DFTEST_FACTOR").unwrap_err();
        assert!(err.to_string().contains("backoff_factor"));
    }

    #[test]
    fn test_validate_rejects_unbounded_intervals() {
        let huge = OrchestratorConfig::default().with_retry(
            RetryPolicy::immediate()
                .with_initial_interval(1e30)
                .with_max_interval(1e30),
        );
        let err = huge.validate().unwrap_err();
        assert!(err.to_string().contains("initial_interval"));

        let nan = OrchestratorConfig::default()
            .with_retry(RetryPolicy::immediate().with_max_interval(f64::NAN));
        assert!(nan.validate().unwrap_err().to_string().contains("max_interval"));

        let year = OrchestratorConfig::default().with_retry(
            RetryPolicy::exponential()
                .with_initial_interval(1.0)
                .with_max_interval(MAX_INTERVAL_SECS),
        );
        assert!(year.validate().is_ok());
    }

    #[test]
    fn test_from_yaml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("orchestrator.yaml");
        fs::write(
            &path,
            "strict: false\nretry:\n  initial_interval: 0.1\n  backoff_factor: 2.0\n  max_interval: 1.0\n",
        )
        .unwrap();

        let config = OrchestratorConfig::from_file(&path).unwrap();
        assert!(!config.strict);
        assert_eq!(config.retry.initial_interval, 0.1);
        assert!(!config.retry.jitter);
    }

    #[test]
    fn test_from_json_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("orchestrator.json");
        fs::write(&path, r#"{"wait_for_contexts": true}"#).unwrap();

        let config = OrchestratorConfig::from_file(&path).unwrap();
        assert!(config.strict);
        assert!(config.wait_for_contexts);
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("orchestrator.toml");
        fs::write(&path, "strict = true").unwrap();

        let err = OrchestratorConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Unsupported config file extension"));
    }
}
