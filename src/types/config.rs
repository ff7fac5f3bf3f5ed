//! Configuration structures.
//!
//! Configuration is loaded from a JSON file and then overridden by CLI flags
//! and environment variables in the binary.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::errors::Error;

/// Global server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, JsonSchema)]
pub struct Config {
    /// Cluster connection configuration.
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Output rendering limits.
    #[serde(default)]
    pub output: OutputConfig,

    /// Log streaming configuration.
    #[serde(default)]
    pub logs: LogConfig,

    /// Tool access policy.
    #[serde(default)]
    pub access: AccessConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from a JSON file. Missing sections take defaults.
    pub fn load(path: &Path) -> super::errors::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make every call fail.
    pub fn validate(&self) -> super::errors::Result<()> {
        if self.cluster.request_timeout.is_zero() {
            return Err(Error::validation("cluster.request_timeout must be positive"));
        }
        if self.output.max_log_lines == 0 {
            return Err(Error::validation("output.max_log_lines must be positive"));
        }
        if self.logs.stream_channel_capacity == 0 {
            return Err(Error::validation(
                "logs.stream_channel_capacity must be positive",
            ));
        }
        Ok(())
    }

    /// JSON Schema of the configuration file.
    pub fn json_schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(Config)).unwrap_or_default()
    }
}

/// Cluster connection configuration.
///
/// Passed explicitly to the cluster adapter. When neither `kubeconfig` nor
/// `context` is set the client falls back to in-cluster config, then to the
/// default kubeconfig.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ClusterConfig {
    /// Path to a kubeconfig file.
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use.
    pub context: Option<String>,

    /// TCP connect timeout.
    #[serde(with = "humantime_serde")]
    #[schemars(with = "String")]
    pub connect_timeout: Duration,

    /// Default per-call timeout; a request may override it.
    #[serde(with = "humantime_serde")]
    #[schemars(with = "String")]
    pub request_timeout: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            context: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Output rendering limits.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct OutputConfig {
    /// Maximum log lines returned by a non-follow log call.
    pub max_log_lines: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            max_log_lines: 2000,
        }
    }
}

/// Log streaming configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct LogConfig {
    /// How long the protocol adapter collects a follow stream before closing it.
    #[serde(with = "humantime_serde")]
    #[schemars(with = "String")]
    pub follow_window: Duration,

    /// Reconnect attempts after a follow stream drops mid-way.
    pub max_reconnects: u32,

    /// Bounded channel capacity between the stream producer and consumer.
    pub stream_channel_capacity: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            follow_window: Duration::from_secs(30),
            max_reconnects: 3,
            stream_channel_capacity: 256,
        }
    }
}

/// Tool access policy.
#[derive(Debug, Clone, Serialize, Deserialize, Default, JsonSchema)]
#[serde(default)]
pub struct AccessConfig {
    /// Reject every tool that writes to the cluster.
    pub read_only: bool,

    /// Tool names that are never dispatched.
    pub disabled_tools: Vec<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
