//! Typed cluster objects returned by the adapter.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{
    ConfigMap, Endpoints, Namespace, Node, Pod, ResourceQuota, Service,
};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use serde_json::Value;

use super::ResourceKind;
use crate::types::{Error, Result};

/// One object of any supported kind.
#[allow(clippy::large_enum_variant)]
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterObject {
    Pod(Pod),
    Deployment(Deployment),
    Service(Service),
    Namespace(Namespace),
    Node(Node),
    Endpoints(Endpoints),
    ResourceQuota(ResourceQuota),
    Job(Job),
    CronJob(CronJob),
    Ingress(Ingress),
    ConfigMap(ConfigMap),
}

/// Generates `From<T> for ClusterObject` and `TryFrom<ClusterObject> for T`.
macro_rules! cluster_object_conversions {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for ClusterObject {
                fn from(value: $variant) -> Self {
                    ClusterObject::$variant(value)
                }
            }

            impl TryFrom<ClusterObject> for $variant {
                type Error = Error;

                fn try_from(object: ClusterObject) -> Result<Self> {
                    match object {
                        ClusterObject::$variant(inner) => Ok(inner),
                        other => Err(Error::internal(format!(
                            "expected {}, got {}",
                            stringify!($variant),
                            other.kind()
                        ))),
                    }
                }
            }
        )*

        impl ClusterObject {
            pub fn kind(&self) -> ResourceKind {
                match self {
                    $(ClusterObject::$variant(_) => ResourceKind::$variant,)*
                }
            }

            pub fn metadata(&self) -> &ObjectMeta {
                match self {
                    $(ClusterObject::$variant(inner) => &inner.metadata,)*
                }
            }

            pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
                match self {
                    $(ClusterObject::$variant(inner) => &mut inner.metadata,)*
                }
            }

            /// Full object graph including `apiVersion` and `kind`.
            pub fn to_value(&self) -> Result<Value> {
                let value = match self {
                    $(ClusterObject::$variant(inner) => serde_json::to_value(inner)?,)*
                };
                Ok(value)
            }

            /// Decode an object graph of the given kind.
            pub fn from_value(kind: ResourceKind, value: Value) -> Result<Self> {
                let object = match kind {
                    $(ResourceKind::$variant => {
                        ClusterObject::$variant(serde_json::from_value(value)?)
                    })*
                };
                Ok(object)
            }
        }
    };
}

cluster_object_conversions!(
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
);

impl ClusterObject {
    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or("")
    }

    pub fn namespace(&self) -> Option<&str> {
        self.metadata().namespace.as_deref()
    }

    pub fn creation_timestamp(&self) -> Option<&Time> {
        self.metadata().creation_timestamp.as_ref()
    }

    /// `kind/name` form used by the `name` output mode.
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.kind().name_prefix(), self.name())
    }
}
