//! `kube`-backed implementation of [`ClusterApi`].

use async_trait::async_trait;
use futures::{stream, AsyncBufReadExt, StreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{
    ConfigMap, Endpoints, Namespace, Node, Pod, ResourceQuota, Service,
};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::api::{
    Api, AttachParams, DeleteParams, EvictParams, ListParams, LogParams, Patch, PatchParams,
    PostParams, PropagationPolicy,
};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, oneshot};

use super::{
    ClusterApi, ClusterObject, ClusterResourceRef, DeleteOptions, ExecOutput, ListOptions,
    LogLines, LogOptions, PatchBody, Propagation, ResourceKind, ServerVersion,
};
use crate::types::{ClusterConfig, Error, Result};

const LOG_FORWARD_CAPACITY: usize = 64;

/// Cluster adapter over a `kube::Client`.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl std::fmt::Debug for KubeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCluster")
            .field("default_namespace", &self.client.default_namespace())
            .finish()
    }
}

impl KubeCluster {
    /// Build a client from explicit cluster configuration.
    pub async fn connect(config: &ClusterConfig) -> Result<Self> {
        let options = KubeConfigOptions {
            context: config.context.clone(),
            ..Default::default()
        };

        let mut kube_config = match (&config.kubeconfig, &config.context) {
            (Some(path), _) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    Error::connectivity(format!(
                        "failed to read kubeconfig {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                kube::Config::from_custom_kubeconfig(kubeconfig, &options)
                    .await
                    .map_err(|e| Error::connectivity(format!("invalid kubeconfig: {}", e)))?
            }
            (None, Some(_)) => kube::Config::from_kubeconfig(&options)
                .await
                .map_err(|e| Error::connectivity(format!("invalid kubeconfig: {}", e)))?,
            (None, None) => kube::Config::infer().await.map_err(|e| {
                Error::connectivity(format!("no cluster configuration found: {}", e))
            })?,
        };
        kube_config.connect_timeout = Some(config.connect_timeout);
        // Follow-mode log streams stay idle for long stretches; the dispatcher
        // enforces request timeouts instead.
        kube_config.read_timeout = None;

        tracing::info!(
            "Connecting to cluster {} (default namespace {})",
            kube_config.cluster_url,
            kube_config.default_namespace
        );

        let client = Client::try_from(kube_config)
            .map_err(|e| Error::connectivity(format!("failed to build client: {}", e)))?;
        Ok(Self::from_client(client))
    }

    /// Wrap an existing client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Namespaced API, or all-namespaces when `namespace` is `None`.
    fn scoped<K>(&self, namespace: Option<&str>) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    fn cluster_wide<K>(&self) -> Api<K>
    where
        K: Resource<Scope = ClusterResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::all(self.client.clone())
    }

    fn pods(&self, target: &ClusterResourceRef) -> Result<Api<Pod>> {
        if target.kind != ResourceKind::Pod {
            return Err(Error::invalid_spec(format!(
                "operation only applies to pods, not {}",
                target.kind
            )));
        }
        Ok(self.scoped(Some(target.required_namespace()?)))
    }
}

fn list_params(opts: &ListOptions) -> ListParams {
    let mut lp = ListParams::default();
    if let Some(labels) = &opts.label_selector {
        lp = lp.labels(labels);
    }
    if let Some(fields) = &opts.field_selector {
        lp = lp.fields(fields);
    }
    lp
}

fn delete_params(opts: &DeleteOptions) -> DeleteParams {
    let mut dp = match opts.grace_period_seconds {
        Some(secs) => DeleteParams::default().grace_period(secs),
        None => DeleteParams::default(),
    };
    dp.propagation_policy = opts.propagation.map(|p| match p {
        Propagation::Background => PropagationPolicy::Background,
        Propagation::Foreground => PropagationPolicy::Foreground,
        Propagation::Orphan => PropagationPolicy::Orphan,
    });
    dp
}

fn log_params(opts: &LogOptions) -> LogParams {
    LogParams {
        container: opts.container.clone(),
        follow: opts.follow,
        previous: opts.previous,
        tail_lines: opts.tail_lines,
        timestamps: opts.timestamps,
        ..LogParams::default()
    }
}

fn kube_patch(patch: &PatchBody) -> Patch<&serde_json::Value> {
    match patch {
        PatchBody::Merge(v) => Patch::Merge(v),
        PatchBody::Strategic(v) => Patch::Strategic(v),
    }
}

async fn list_as<K>(api: Api<K>, lp: &ListParams) -> Result<Vec<ClusterObject>>
where
    K: Clone + DeserializeOwned + Debug,
    ClusterObject: From<K>,
{
    Ok(api
        .list(lp)
        .await?
        .items
        .into_iter()
        .map(ClusterObject::from)
        .collect())
}

async fn get_as<K>(api: Api<K>, name: &str) -> Result<ClusterObject>
where
    K: Clone + DeserializeOwned + Debug,
    ClusterObject: From<K>,
{
    Ok(api.get(name).await?.into())
}

async fn create_as<K>(api: Api<K>, object: &K) -> Result<ClusterObject>
where
    K: Clone + DeserializeOwned + Serialize + Debug,
    ClusterObject: From<K>,
{
    Ok(api.create(&PostParams::default(), object).await?.into())
}

async fn delete_as<K>(api: Api<K>, name: &str, dp: &DeleteParams) -> Result<()>
where
    K: Clone + DeserializeOwned + Debug,
{
    api.delete(name, dp).await?;
    Ok(())
}

async fn patch_as<K>(api: Api<K>, name: &str, patch: &PatchBody) -> Result<ClusterObject>
where
    K: Clone + DeserializeOwned + Debug,
    ClusterObject: From<K>,
{
    Ok(api
        .patch(name, &PatchParams::default(), &kube_patch(patch))
        .await?
        .into())
}

fn namespace_of(object: &ClusterObject) -> Result<&str> {
    object.namespace().ok_or_else(|| {
        Error::invalid_spec(format!(
            "{} '{}' has no metadata.namespace",
            object.kind(),
            object.name()
        ))
    })
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn list(
        &self,
        target: &ClusterResourceRef,
        opts: &ListOptions,
    ) -> Result<Vec<ClusterObject>> {
        target.check_scope()?;
        let ns = target.namespace.as_deref();
        let lp = list_params(opts);
        tracing::debug!("list {} ({:?})", target, opts);
        match target.kind {
            ResourceKind::Pod => list_as(self.scoped::<Pod>(ns), &lp).await,
            ResourceKind::Deployment => list_as(self.scoped::<Deployment>(ns), &lp).await,
            ResourceKind::Service => list_as(self.scoped::<Service>(ns), &lp).await,
            ResourceKind::Endpoints => list_as(self.scoped::<Endpoints>(ns), &lp).await,
            ResourceKind::ResourceQuota => list_as(self.scoped::<ResourceQuota>(ns), &lp).await,
            ResourceKind::Job => list_as(self.scoped::<Job>(ns), &lp).await,
            ResourceKind::CronJob => list_as(self.scoped::<CronJob>(ns), &lp).await,
            ResourceKind::Ingress => list_as(self.scoped::<Ingress>(ns), &lp).await,
            ResourceKind::ConfigMap => list_as(self.scoped::<ConfigMap>(ns), &lp).await,
            ResourceKind::Namespace => list_as(self.cluster_wide::<Namespace>(), &lp).await,
            ResourceKind::Node => list_as(self.cluster_wide::<Node>(), &lp).await,
        }
    }

    async fn get(&self, target: &ClusterResourceRef) -> Result<ClusterObject> {
        target.check_scope()?;
        let name = target.required_name()?;
        let ns = target.namespace.as_deref();
        tracing::debug!("get {}", target);
        match target.kind {
            ResourceKind::Pod => get_as(self.scoped::<Pod>(ns), name).await,
            ResourceKind::Deployment => get_as(self.scoped::<Deployment>(ns), name).await,
            ResourceKind::Service => get_as(self.scoped::<Service>(ns), name).await,
            ResourceKind::Endpoints => get_as(self.scoped::<Endpoints>(ns), name).await,
            ResourceKind::ResourceQuota => get_as(self.scoped::<ResourceQuota>(ns), name).await,
            ResourceKind::Job => get_as(self.scoped::<Job>(ns), name).await,
            ResourceKind::CronJob => get_as(self.scoped::<CronJob>(ns), name).await,
            ResourceKind::Ingress => get_as(self.scoped::<Ingress>(ns), name).await,
            ResourceKind::ConfigMap => get_as(self.scoped::<ConfigMap>(ns), name).await,
            ResourceKind::Namespace => get_as(self.cluster_wide::<Namespace>(), name).await,
            ResourceKind::Node => get_as(self.cluster_wide::<Node>(), name).await,
        }
    }

    async fn create(&self, object: ClusterObject) -> Result<ClusterObject> {
        tracing::debug!("create {}", object.qualified_name());
        if let ClusterObject::Namespace(o) = &object {
            return create_as(self.cluster_wide(), o).await;
        }
        if let ClusterObject::Node(_) = &object {
            return Err(Error::invalid_spec(
                "nodes register themselves and cannot be created",
            ));
        }
        let ns = Some(namespace_of(&object)?);
        match &object {
            ClusterObject::Pod(o) => create_as(self.scoped(ns), o).await,
            ClusterObject::Deployment(o) => create_as(self.scoped(ns), o).await,
            ClusterObject::Service(o) => create_as(self.scoped(ns), o).await,
            ClusterObject::Endpoints(o) => create_as(self.scoped(ns), o).await,
            ClusterObject::ResourceQuota(o) => create_as(self.scoped(ns), o).await,
            ClusterObject::Job(o) => create_as(self.scoped(ns), o).await,
            ClusterObject::CronJob(o) => create_as(self.scoped(ns), o).await,
            ClusterObject::Ingress(o) => create_as(self.scoped(ns), o).await,
            ClusterObject::ConfigMap(o) => create_as(self.scoped(ns), o).await,
            ClusterObject::Namespace(_) | ClusterObject::Node(_) => {
                Err(Error::internal("cluster-scoped object reached the namespaced create path"))
            }
        }
    }

    async fn delete(&self, target: &ClusterResourceRef, opts: &DeleteOptions) -> Result<()> {
        target.check_scope()?;
        let name = target.required_name()?;
        let ns = target.namespace.as_deref();
        let dp = delete_params(opts);
        tracing::debug!("delete {} ({:?})", target, opts);
        match target.kind {
            ResourceKind::Pod => delete_as(self.scoped::<Pod>(ns), name, &dp).await,
            ResourceKind::Deployment => delete_as(self.scoped::<Deployment>(ns), name, &dp).await,
            ResourceKind::Service => delete_as(self.scoped::<Service>(ns), name, &dp).await,
            ResourceKind::Endpoints => delete_as(self.scoped::<Endpoints>(ns), name, &dp).await,
            ResourceKind::ResourceQuota => {
                delete_as(self.scoped::<ResourceQuota>(ns), name, &dp).await
            }
            ResourceKind::Job => delete_as(self.scoped::<Job>(ns), name, &dp).await,
            ResourceKind::CronJob => delete_as(self.scoped::<CronJob>(ns), name, &dp).await,
            ResourceKind::Ingress => delete_as(self.scoped::<Ingress>(ns), name, &dp).await,
            ResourceKind::ConfigMap => delete_as(self.scoped::<ConfigMap>(ns), name, &dp).await,
            ResourceKind::Namespace => {
                delete_as(self.cluster_wide::<Namespace>(), name, &dp).await
            }
            ResourceKind::Node => delete_as(self.cluster_wide::<Node>(), name, &dp).await,
        }
    }

    async fn patch(&self, target: &ClusterResourceRef, patch: &PatchBody) -> Result<ClusterObject> {
        target.check_scope()?;
        let name = target.required_name()?;
        let ns = target.namespace.as_deref();
        tracing::debug!("patch {}", target);
        match target.kind {
            ResourceKind::Pod => patch_as(self.scoped::<Pod>(ns), name, patch).await,
            ResourceKind::Deployment => patch_as(self.scoped::<Deployment>(ns), name, patch).await,
            ResourceKind::Service => patch_as(self.scoped::<Service>(ns), name, patch).await,
            ResourceKind::Endpoints => patch_as(self.scoped::<Endpoints>(ns), name, patch).await,
            ResourceKind::ResourceQuota => {
                patch_as(self.scoped::<ResourceQuota>(ns), name, patch).await
            }
            ResourceKind::Job => patch_as(self.scoped::<Job>(ns), name, patch).await,
            ResourceKind::CronJob => patch_as(self.scoped::<CronJob>(ns), name, patch).await,
            ResourceKind::Ingress => patch_as(self.scoped::<Ingress>(ns), name, patch).await,
            ResourceKind::ConfigMap => patch_as(self.scoped::<ConfigMap>(ns), name, patch).await,
            ResourceKind::Namespace => {
                patch_as(self.cluster_wide::<Namespace>(), name, patch).await
            }
            ResourceKind::Node => patch_as(self.cluster_wide::<Node>(), name, patch).await,
        }
    }

    async fn scale(&self, target: &ClusterResourceRef, replicas: i32) -> Result<()> {
        if target.kind != ResourceKind::Deployment {
            return Err(Error::invalid_spec(format!(
                "{} has no scale subresource",
                target.kind
            )));
        }
        let api: Api<Deployment> = self.scoped(Some(target.required_namespace()?));
        let patch = serde_json::json!({ "spec": { "replicas": replicas } });
        tracing::debug!("scale {} to {}", target, replicas);
        api.patch_scale(
            target.required_name()?,
            &PatchParams::default(),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }

    async fn evict(&self, target: &ClusterResourceRef, opts: &DeleteOptions) -> Result<()> {
        let api = self.pods(target)?;
        let params = EvictParams {
            delete_options: Some(delete_params(opts)),
            post_options: PostParams::default(),
        };
        tracing::debug!("evict {}", target);
        api.evict(target.required_name()?, &params).await?;
        Ok(())
    }

    async fn exec(
        &self,
        target: &ClusterResourceRef,
        container: Option<String>,
        command: Vec<String>,
    ) -> Result<ExecOutput> {
        let api = self.pods(target)?;
        let mut params = AttachParams::default().stdout(true).stderr(true);
        if let Some(container) = container {
            params = params.container(container);
        }
        tracing::debug!("exec in {}: {:?}", target, command);

        let mut attached = api.exec(target.required_name()?, command, &params).await?;
        let status = attached.take_status();

        let mut stdout = String::new();
        let mut stderr = String::new();
        let out_reader = attached.stdout();
        let err_reader = attached.stderr();
        let read_out = async {
            match out_reader {
                Some(mut r) => r.read_to_string(&mut stdout).await.map(|_| ()),
                None => Ok(()),
            }
        };
        let read_err = async {
            match err_reader {
                Some(mut r) => r.read_to_string(&mut stderr).await.map(|_| ()),
                None => Ok(()),
            }
        };
        let (out_res, err_res) = tokio::join!(read_out, read_err);
        out_res?;
        err_res?;

        let status = match status {
            Some(fut) => fut.await,
            None => None,
        };
        let success = status
            .as_ref()
            .and_then(|s| s.status.as_deref())
            .map_or(true, |s| s == "Success");
        let message = status.and_then(|s| s.message).filter(|_| !success);

        Ok(ExecOutput {
            stdout,
            stderr,
            success,
            message,
        })
    }

    async fn logs(&self, target: &ClusterResourceRef, opts: &LogOptions) -> Result<String> {
        let api = self.pods(target)?;
        let mut params = log_params(opts);
        params.follow = false;
        tracing::debug!("logs {} ({:?})", target, opts);
        Ok(api.logs(target.required_name()?, &params).await?)
    }

    async fn log_stream(&self, target: &ClusterResourceRef, opts: &LogOptions) -> Result<LogLines> {
        let api = self.pods(target)?;
        let name = target.required_name()?.to_string();
        let params = log_params(opts);
        tracing::debug!("log stream {} ({:?})", target, opts);

        // The reader borrows the Api handle, so the task owns both and forwards
        // lines until the consumer goes away.
        let (tx, rx) = mpsc::channel::<Result<String>>(LOG_FORWARD_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();
        tokio::spawn(async move {
            let reader = match api.log_stream(&name, &params).await {
                Ok(reader) => {
                    let _ = ready_tx.send(Ok(()));
                    reader
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e.into()));
                    return;
                }
            };
            let mut lines = std::pin::pin!(reader.lines());
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    next = lines.next() => match next {
                        Some(line) => {
                            if tx.send(line.map_err(Error::from)).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
            tracing::debug!("log stream for pod {} closed", name);
        });

        ready_rx
            .await
            .map_err(|_| Error::internal("log stream task exited before connecting"))??;
        Ok(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }

    async fn server_version(&self) -> Result<ServerVersion> {
        let info = self.client.apiserver_version().await?;
        Ok(ServerVersion {
            git_version: info.git_version,
            platform: info.platform,
        })
    }
}

// =============================================================================
// Error mapping
// =============================================================================

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) => {
                let msg = if resp.message.is_empty() {
                    resp.reason.clone()
                } else {
                    resp.message.clone()
                };
                match resp.code {
                    401 => Error::connectivity(format!("unauthorized: {}", msg)),
                    403 => Error::forbidden(msg),
                    404 => Error::not_found(msg),
                    400 | 409 | 422 => Error::invalid_spec(msg),
                    408 | 504 => Error::timeout(msg),
                    429 => Error::connectivity(format!("throttled by apiserver: {}", msg)),
                    code if code >= 500 => {
                        Error::connectivity(format!("apiserver error {}: {}", code, msg))
                    }
                    code => Error::invalid_spec(format!("apiserver returned {}: {}", code, msg)),
                }
            }
            kube::Error::SerdeError(e) => Error::internal(format!("decode error: {}", e)),
            other => Error::connectivity(other.to_string()),
        }
    }
}
