//! Signal Configuration
//!
//! Every registry carries one [`SignalConfig`], and every signal it creates
//! inherits a copy. Configuration can be built in code or parsed from JSON:
//!
//! ```rust
//! use tocsin_core::{ErrorPolicy, SignalConfig};
//!
//! let config = SignalConfig::from_json(r#"{ "error_policy": "log_and_continue" }"#).unwrap();
//! assert_eq!(config.error_policy, ErrorPolicy::LogAndContinue);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// What dispatch does when a listener returns an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Stop the failing event, skip everything that depends on it, and report
    /// the first error to the caller.
    #[default]
    FailFast,

    /// Log the failure, drop that listener's result, and keep going.
    LogAndContinue,
}

/// Where asynchronous firings run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AsyncWorker {
    /// Tokio's blocking pool inside a runtime, a dedicated thread outside one.
    #[default]
    Auto,

    /// Tokio's blocking pool. Firing fails with `SignalError::NoRuntime` when
    /// called outside a runtime.
    BlockingPool,

    /// A fresh OS thread per firing.
    DedicatedThread,
}

/// Per-signal settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub error_policy: ErrorPolicy,
    pub async_worker: AsyncWorker,
}

impl SignalConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_error_policy(mut self, error_policy: ErrorPolicy) -> Self {
        self.error_policy = error_policy;
        self
    }

    pub fn with_async_worker(mut self, async_worker: AsyncWorker) -> Self {
        self.async_worker = async_worker;
        self
    }
}
