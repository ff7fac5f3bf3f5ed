//! Core types shared across the crate.
//!
//! - **IDs**: per-dispatch request identifiers
//! - **Errors**: error enum, error kinds and wire codes
//! - **Config**: cluster, output, logs, access and observability settings

mod config;
mod errors;
mod ids;

pub use config::{AccessConfig, ClusterConfig, Config, LogConfig, ObservabilityConfig, OutputConfig};
pub use errors::{Error, ErrorKind, Result, StepContext};
pub use ids::RequestId;
