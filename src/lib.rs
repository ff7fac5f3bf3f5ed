//! # Kube MCP Core
//!
//! Kubernetes cluster operations exposed as named, schema-validated tools:
//! - Tool registry with typed parameter schemas and risk classes
//! - Argument validation with defaults and unknown-argument rejection
//! - Read-only and per-tool access policy
//! - Cluster adapter over `kube` with kind-preserving error mapping
//! - kubectl-style table, describe, json, yaml and name output
//! - Cancellable follow-mode log streams
//! - MCP (JSON-RPC 2.0) server over stdio
//!
//! ## Architecture
//!
//! ```text
//!   MCP client ─→ McpServer ─→ Dispatcher ─→ access policy ─→ validate
//!                                  │
//!                                  ▼
//!                        tool handler (by ToolId)
//!                                  │
//!                  ┌───────────────┴───────────────┐
//!                  ▼                               ▼
//!            ClusterApi (kube)               Formatter / LogStream
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod cluster;
pub mod dispatch;
pub mod mcp;
pub mod output;
pub mod templates;
pub mod tools;
pub mod types;

// Internal utilities
pub mod observability;
pub mod validation;

pub use cluster::{ClusterApi, KubeCluster};
pub use dispatch::{Dispatcher, InvocationRequest};
pub use output::ToolOutput;
pub use types::{Config, Error, ErrorKind, Result};
