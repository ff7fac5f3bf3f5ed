//! Tool dispatch: name → descriptor → access policy → validated arguments →
//! handler, under a per-call timeout.
//!
//! The dispatcher holds no per-call state and is shared by `Arc`. Errors
//! raised before the handler runs (unknown tool, policy, validation) never
//! reach the cluster.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

use crate::cluster::ClusterApi;
use crate::output::{Formatter, ToolOutput};
use crate::tools::{handlers, validate, HandlerContext, ToolAccessPolicy, ToolDescriptor, ToolRegistry};
use crate::types::{Config, Error, RequestId, Result};

/// One tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    pub tool: String,
    pub arguments: Value,
    /// Overrides `cluster.request_timeout` for this call.
    pub timeout: Option<Duration>,
}

impl InvocationRequest {
    pub fn new(tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool: tool.into(),
            arguments,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Routes tool calls to their handlers.
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    cluster: Arc<dyn ClusterApi>,
    policy: ToolAccessPolicy,
    config: Arc<Config>,
    /// Fixed reference time for rendering; wall clock when unset.
    clock: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("tools", &self.registry.len())
            .field("policy", &self.policy)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Dispatcher over the built-in tools with the policy from `config.access`.
    pub fn new(cluster: Arc<dyn ClusterApi>, config: Config) -> Result<Self> {
        let registry = Arc::new(ToolRegistry::builtin()?);
        let policy = ToolAccessPolicy::from_config(&config.access);
        Ok(Self::with_registry(registry, cluster, policy, Arc::new(config)))
    }

    pub fn with_registry(
        registry: Arc<ToolRegistry>,
        cluster: Arc<dyn ClusterApi>,
        policy: ToolAccessPolicy,
        config: Arc<Config>,
    ) -> Self {
        Self {
            registry,
            cluster,
            policy,
            config,
            clock: None,
        }
    }

    /// Render every call relative to `now` instead of the wall clock.
    pub fn with_fixed_clock(mut self, now: DateTime<Utc>) -> Self {
        self.clock = Some(now);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &ToolAccessPolicy {
        &self.policy
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Descriptors the policy allows, sorted by name.
    pub fn tools(&self) -> Vec<&ToolDescriptor> {
        self.registry
            .list()
            .into_iter()
            .filter(|d| self.policy.permits(d))
            .collect()
    }

    /// Run one tool call.
    pub async fn dispatch(&self, request: InvocationRequest) -> Result<ToolOutput> {
        let request_id = RequestId::new();
        let span = tracing::info_span!(
            "dispatch",
            tool = %request.tool,
            request_id = %request_id,
        );
        self.dispatch_inner(request).instrument(span).await
    }

    async fn dispatch_inner(&self, request: InvocationRequest) -> Result<ToolOutput> {
        let descriptor = self.registry.lookup(&request.tool)?;
        self.policy.check(descriptor)?;
        let args = validate(descriptor, &request.arguments)?;

        let timeout = request
            .timeout
            .unwrap_or(self.config.cluster.request_timeout);
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + timeout;
        let ctx = HandlerContext {
            cluster: &self.cluster,
            formatter: Formatter::at(self.clock.unwrap_or_else(Utc::now)),
            config: &self.config,
            deadline,
        };

        // Multi-step handlers check the same deadline per step and report the
        // step that ran out of time; this bound covers single-call handlers.
        let outcome =
            tokio::time::timeout_at(deadline, handlers::run(&ctx, descriptor.id, &args)).await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(Ok(output)) => {
                tracing::debug!("{} completed in {:?}", descriptor.name, elapsed);
                Ok(output)
            }
            Ok(Err(e)) => {
                tracing::warn!("{} failed after {:?}: {}", descriptor.name, elapsed, e);
                Err(e)
            }
            Err(_) => {
                tracing::warn!("{} timed out after {:?}", descriptor.name, timeout);
                Err(Error::timeout(format!(
                    "{} did not complete within {:?}",
                    descriptor.name, timeout
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ClusterObject, MockClusterApi, ResourceKind};
    use crate::types::ErrorKind;
    use k8s_openapi::api::core::v1::Pod;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use serde_json::json;

    fn dispatcher(mock: MockClusterApi, config: Config) -> Dispatcher {
        Dispatcher::new(Arc::new(mock), config).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_tool_never_calls_cluster() {
        let d = dispatcher(MockClusterApi::new(), Config::default());
        let err = d
            .dispatch(InvocationRequest::new("get_secrets", json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownTool);
    }

    #[tokio::test]
    async fn test_validation_precedes_cluster_calls() {
        let d = dispatcher(MockClusterApi::new(), Config::default());
        let err = d
            .dispatch(InvocationRequest::new("describe_pod", json!({"name": "web"})))
            .await
            .unwrap_err();
        assert_eq!(err.invalid_field(), Some("namespace"));
    }

    #[tokio::test]
    async fn test_read_only_rejects_mutation() {
        let mut config = Config::default();
        config.access.read_only = true;
        let d = dispatcher(MockClusterApi::new(), config);
        let err = d
            .dispatch(InvocationRequest::new(
                "delete_pod",
                json!({"name": "web", "namespace": "default"}),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert!(d.tools().iter().all(|t| !t.risk.is_mutating()));
    }

    #[tokio::test]
    async fn test_adapter_error_kind_preserved() {
        let mut mock = MockClusterApi::new();
        mock.expect_get()
            .times(1)
            .returning(|target| Err(Error::not_found(format!("{} not found", target))));
        let d = dispatcher(mock, Config::default());
        let err = d
            .dispatch(InvocationRequest::new(
                "describe_pod",
                json!({"name": "web", "namespace": "default"}),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_user_message(), "NOT_FOUND: not found: pod default/web not found");
    }

    #[tokio::test]
    async fn test_describe_json() {
        let mut mock = MockClusterApi::new();
        mock.expect_get().times(1).returning(|target| {
            assert_eq!(target.kind, ResourceKind::Pod);
            Ok(ClusterObject::from(Pod {
                metadata: ObjectMeta {
                    name: target.name.clone(),
                    namespace: target.namespace.clone(),
                    ..Default::default()
                },
                ..Default::default()
            }))
        });
        let d = dispatcher(mock, Config::default());
        let out = d
            .dispatch(InvocationRequest::new(
                "describe_pod",
                json!({"name": "web", "namespace": "default", "output": "json"}),
            ))
            .await
            .unwrap();
        assert_eq!(out.as_json().unwrap()["metadata"]["name"], "web");
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn test_adapter_failure_is_logged() {
        let mut mock = MockClusterApi::new();
        mock.expect_scale()
            .times(1)
            .returning(|_, _| Err(Error::forbidden("scale denied")));
        let d = dispatcher(mock, Config::default());
        let _ = d
            .dispatch(InvocationRequest::new(
                "scale_deployment",
                json!({"name": "web", "namespace": "default", "replicas": 2}),
            ))
            .await;
        assert!(logs_contain("scale_deployment failed after"));
        assert!(logs_contain("scale denied"));
    }

    #[tokio::test]
    async fn test_disabled_tool_hidden_and_rejected() {
        let mut config = Config::default();
        config.access.disabled_tools = vec!["exec_pod_command".to_string()];
        let d = dispatcher(MockClusterApi::new(), config);
        assert!(d.tools().iter().all(|t| t.name != "exec_pod_command"));
        let err = d
            .dispatch(InvocationRequest::new(
                "exec_pod_command",
                json!({"name": "web", "namespace": "default", "command": ["ls"]}),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }
}
