//! Cluster client adapter.
//!
//! [`ClusterApi`] is the single seam between tool handlers and the Kubernetes
//! API. It exposes primitive verbs against typed resource kinds; every call is
//! one attempt with no retries. [`KubeCluster`] is the production
//! implementation built on `kube`.

mod client;
mod object;

pub use client::KubeCluster;
pub use object::ClusterObject;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::types::{Error, Result};

// =============================================================================
// Resource references
// =============================================================================

/// Kind of cluster object a tool operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Pod,
    Deployment,
    Service,
    Namespace,
    Node,
    Endpoints,
    ResourceQuota,
    Job,
    CronJob,
    Ingress,
    ConfigMap,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 11] = [
        ResourceKind::Pod,
        ResourceKind::Deployment,
        ResourceKind::Service,
        ResourceKind::Namespace,
        ResourceKind::Node,
        ResourceKind::Endpoints,
        ResourceKind::ResourceQuota,
        ResourceKind::Job,
        ResourceKind::CronJob,
        ResourceKind::Ingress,
        ResourceKind::ConfigMap,
    ];

    /// Whether objects of this kind live inside a namespace.
    pub fn is_namespaced(self) -> bool {
        !matches!(self, ResourceKind::Namespace | ResourceKind::Node)
    }

    /// Lower-case plural, as used by `kubectl get` and `-o name` output.
    pub fn plural(self) -> &'static str {
        match self {
            ResourceKind::Pod => "pods",
            ResourceKind::Deployment => "deployments",
            ResourceKind::Service => "services",
            ResourceKind::Namespace => "namespaces",
            ResourceKind::Node => "nodes",
            ResourceKind::Endpoints => "endpoints",
            ResourceKind::ResourceQuota => "resourcequotas",
            ResourceKind::Job => "jobs",
            ResourceKind::CronJob => "cronjobs",
            ResourceKind::Ingress => "ingresses",
            ResourceKind::ConfigMap => "configmaps",
        }
    }

    /// Lower-case singular with API group, as printed by `-o name`.
    pub fn name_prefix(self) -> &'static str {
        match self {
            ResourceKind::Pod => "pod",
            ResourceKind::Deployment => "deployment.apps",
            ResourceKind::Service => "service",
            ResourceKind::Namespace => "namespace",
            ResourceKind::Node => "node",
            ResourceKind::Endpoints => "endpoints",
            ResourceKind::ResourceQuota => "resourcequota",
            ResourceKind::Job => "job.batch",
            ResourceKind::CronJob => "cronjob.batch",
            ResourceKind::Ingress => "ingress.networking.k8s.io",
            ResourceKind::ConfigMap => "configmap",
        }
    }

    /// `apiVersion` of the served version.
    pub fn api_version(self) -> &'static str {
        match self {
            ResourceKind::Deployment => "apps/v1",
            ResourceKind::Job | ResourceKind::CronJob => "batch/v1",
            ResourceKind::Ingress => "networking.k8s.io/v1",
            _ => "v1",
        }
    }

    /// Kind named by a manifest's `apiVersion` and `kind`.
    pub fn from_type_meta(api_version: &str, kind: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.api_version() == api_version && k.to_string() == kind)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Address of one object, or of a collection when `name` is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterResourceRef {
    pub kind: ResourceKind,
    pub namespace: Option<String>,
    pub name: Option<String>,
}

impl ClusterResourceRef {
    /// Collection reference. `namespace = None` on a namespaced kind lists
    /// across all namespaces.
    pub fn list(kind: ResourceKind, namespace: Option<&str>) -> Self {
        Self {
            kind,
            namespace: namespace.map(str::to_string),
            name: None,
        }
    }

    /// Named object inside a namespace.
    pub fn namespaced(kind: ResourceKind, namespace: &str, name: &str) -> Self {
        Self {
            kind,
            namespace: Some(namespace.to_string()),
            name: Some(name.to_string()),
        }
    }

    /// Named cluster-scoped object.
    pub fn cluster(kind: ResourceKind, name: &str) -> Self {
        Self {
            kind,
            namespace: None,
            name: Some(name.to_string()),
        }
    }

    pub fn is_list(&self) -> bool {
        self.name.is_none()
    }

    /// Name of a single-object reference.
    pub fn required_name(&self) -> Result<&str> {
        self.name
            .as_deref()
            .ok_or_else(|| Error::internal(format!("{} reference has no name", self.kind)))
    }

    /// Namespace of a single namespaced-object reference.
    pub fn required_namespace(&self) -> Result<&str> {
        self.namespace.as_deref().ok_or_else(|| {
            Error::internal(format!("{} reference requires a namespace", self.kind))
        })
    }

    /// Check scope rules: namespaced kinds need a namespace unless listing,
    /// cluster-scoped kinds never carry one.
    pub fn check_scope(&self) -> Result<()> {
        if self.kind.is_namespaced() {
            if !self.is_list() && self.namespace.is_none() {
                return Err(Error::internal(format!(
                    "{} reference requires a namespace",
                    self.kind
                )));
            }
        } else if self.namespace.is_some() {
            return Err(Error::internal(format!(
                "{} is cluster-scoped and takes no namespace",
                self.kind
            )));
        }
        Ok(())
    }
}

impl fmt::Display for ClusterResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name.as_deref().unwrap_or("*");
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind.name_prefix(), ns, name),
            None => write!(f, "{} {}", self.kind.name_prefix(), name),
        }
    }
}

// =============================================================================
// Verb options
// =============================================================================

/// Filters for `list`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
}

/// How the garbage collector treats dependents of a deleted object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Background,
    Foreground,
    Orphan,
}

/// Options for `delete` and `evict`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    pub grace_period_seconds: Option<u32>,
    /// Server default when unset.
    pub propagation: Option<Propagation>,
}

/// Patch body for `patch`.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchBody {
    /// RFC 7386 JSON merge patch.
    Merge(Value),
    /// Kubernetes strategic merge patch (merges container lists by name).
    Strategic(Value),
}

/// Options for `logs` and `log_stream`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    pub container: Option<String>,
    pub tail_lines: Option<i64>,
    pub previous: bool,
    pub timestamps: bool,
    pub follow: bool,
}

/// Result of running a command inside a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    /// Failure message reported by the kubelet, if any.
    pub message: Option<String>,
}

/// API server version information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerVersion {
    pub git_version: String,
    pub platform: String,
}

/// Lazily produced log lines. Dropping the stream releases the connection.
pub type LogLines = BoxStream<'static, Result<String>>;

// =============================================================================
// Adapter trait
// =============================================================================

/// Primitive verbs against the cluster API.
///
/// Implementations perform exactly one attempt per call and map failures to
/// Connectivity, NotFound, Forbidden, InvalidSpec or Timeout.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// List objects of `target.kind`. `target.name` must be absent.
    async fn list(&self, target: &ClusterResourceRef, opts: &ListOptions)
        -> Result<Vec<ClusterObject>>;

    /// Read one object.
    async fn get(&self, target: &ClusterResourceRef) -> Result<ClusterObject>;

    /// Create an object. Namespaced objects carry their namespace in metadata.
    async fn create(&self, object: ClusterObject) -> Result<ClusterObject>;

    /// Delete one object.
    async fn delete(&self, target: &ClusterResourceRef, opts: &DeleteOptions) -> Result<()>;

    /// Patch one object and return the updated state.
    async fn patch(&self, target: &ClusterResourceRef, patch: &PatchBody)
        -> Result<ClusterObject>;

    /// Set the replica count through the scale subresource.
    async fn scale(&self, target: &ClusterResourceRef, replicas: i32) -> Result<()>;

    /// Evict one pod through the eviction API (honours disruption budgets).
    async fn evict(&self, target: &ClusterResourceRef, opts: &DeleteOptions) -> Result<()>;

    /// Run a command in a pod container and collect its output.
    async fn exec(
        &self,
        target: &ClusterResourceRef,
        container: Option<String>,
        command: Vec<String>,
    ) -> Result<ExecOutput>;

    /// Fetch a bounded chunk of pod logs.
    async fn logs(&self, target: &ClusterResourceRef, opts: &LogOptions) -> Result<String>;

    /// Open a log stream (used for follow mode).
    async fn log_stream(&self, target: &ClusterResourceRef, opts: &LogOptions)
        -> Result<LogLines>;

    /// API server version.
    async fn server_version(&self) -> Result<ServerVersion>;
}
