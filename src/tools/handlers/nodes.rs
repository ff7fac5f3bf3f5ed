//! Node and cluster-wide tools, including drain.

use k8s_openapi::api::core::v1::{Node, Pod};
use serde_json::json;

use crate::cluster::{ClusterResourceRef, DeleteOptions, ListOptions, PatchBody, ResourceKind};
use crate::output::ToolOutput;
use crate::tools::definitions::ToolId;
use crate::tools::validate::ValidatedArgs;
use crate::types::{Error, Result};

use super::{describe_object, grace_period, list_objects, object_name, unrouted, HandlerContext};

const MIRROR_POD_ANNOTATION: &str = "kubernetes.io/config.mirror";

pub(super) async fn handle(
    ctx: &HandlerContext<'_>,
    id: ToolId,
    args: &ValidatedArgs,
) -> Result<ToolOutput> {
    match id {
        ToolId::GetClusterInfo => cluster_info(ctx).await,
        ToolId::GetNodes => list_objects(ctx, ResourceKind::Node, None, args).await,
        ToolId::DescribeNode => {
            let target = ClusterResourceRef::cluster(ResourceKind::Node, object_name(args)?);
            describe_object(ctx, target, args).await
        }
        ToolId::CordonNode => {
            let name = object_name(args)?;
            let changed = set_unschedulable(ctx, name, true).await?;
            Ok(ToolOutput::text(if changed {
                format!("node/{} cordoned", name)
            } else {
                format!("node/{} already cordoned", name)
            }))
        }
        ToolId::UncordonNode => {
            let name = object_name(args)?;
            let changed = set_unschedulable(ctx, name, false).await?;
            Ok(ToolOutput::text(if changed {
                format!("node/{} uncordoned", name)
            } else {
                format!("node/{} already uncordoned", name)
            }))
        }
        ToolId::DrainNode => drain(ctx, args).await,
        _ => Err(unrouted(id, "cluster")),
    }
}

async fn cluster_info(ctx: &HandlerContext<'_>) -> Result<ToolOutput> {
    let version = ctx.cluster.server_version().await?;
    let opts = ListOptions::default();
    let nodes = ctx
        .cluster
        .list(&ClusterResourceRef::list(ResourceKind::Node, None), &opts)
        .await?;
    let namespaces = ctx
        .cluster
        .list(&ClusterResourceRef::list(ResourceKind::Namespace, None), &opts)
        .await?;

    let ready = nodes
        .iter()
        .filter_map(|o| match o {
            crate::cluster::ClusterObject::Node(node) => Some(node),
            _ => None,
        })
        .filter(|node| is_ready(node))
        .count();

    Ok(ToolOutput::Text(format!(
        "Kubernetes control plane version: {} ({})\nNodes: {} ({} Ready)\nNamespaces: {}",
        version.git_version,
        version.platform,
        nodes.len(),
        ready,
        namespaces.len()
    )))
}

fn is_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conds| conds.iter().any(|c| c.type_ == "Ready" && c.status == "True"))
}

/// Set `spec.unschedulable`. Returns false when the node already had the
/// requested value and no patch was sent.
async fn set_unschedulable(ctx: &HandlerContext<'_>, name: &str, value: bool) -> Result<bool> {
    let target = ClusterResourceRef::cluster(ResourceKind::Node, name);
    let node = Node::try_from(ctx.cluster.get(&target).await?)?;
    let current = node
        .spec
        .as_ref()
        .and_then(|s| s.unschedulable)
        .unwrap_or(false);
    if current == value {
        return Ok(false);
    }
    let body = PatchBody::Merge(json!({"spec": {"unschedulable": value}}));
    ctx.cluster.patch(&target, &body).await?;
    tracing::info!("Set unschedulable={} on node {}", value, name);
    Ok(true)
}

// =============================================================================
// Drain
// =============================================================================

/// Drain switches.
#[derive(Debug, Clone, Copy)]
struct DrainOptions {
    force: bool,
    ignore_daemonsets: bool,
    delete_emptydir_data: bool,
}

/// Partition of the pods found on a node.
#[derive(Debug, Default)]
struct DrainPlan {
    evict: Vec<Pod>,
    ignored_daemonset: Vec<String>,
    unmanaged: Vec<String>,
    daemonset: Vec<String>,
    emptydir: Vec<String>,
}

impl DrainPlan {
    fn blocking_reasons(&self) -> Vec<String> {
        let mut reasons = Vec::new();
        if !self.unmanaged.is_empty() {
            reasons.push(format!(
                "cannot delete pods not managed by ReplicationController, ReplicaSet, Job, \
                 DaemonSet or StatefulSet (use force to override): {}",
                self.unmanaged.join(", ")
            ));
        }
        if !self.daemonset.is_empty() {
            reasons.push(format!(
                "cannot delete DaemonSet-managed pods (use ignore_daemonsets to skip them): {}",
                self.daemonset.join(", ")
            ));
        }
        if !self.emptydir.is_empty() {
            reasons.push(format!(
                "cannot delete pods with local storage (use delete_emptydir_data to override): {}",
                self.emptydir.join(", ")
            ));
        }
        reasons
    }
}

fn pod_key(pod: &Pod) -> String {
    format!(
        "{}/{}",
        pod.metadata.namespace.as_deref().unwrap_or(""),
        pod.metadata.name.as_deref().unwrap_or("")
    )
}

fn controller_kind(pod: &Pod) -> Option<&str> {
    pod.metadata
        .owner_references
        .as_ref()?
        .iter()
        .find(|o| o.controller.unwrap_or(false))
        .map(|o| o.kind.as_str())
}

fn is_finished(pod: &Pod) -> bool {
    matches!(
        pod.status.as_ref().and_then(|s| s.phase.as_deref()),
        Some("Succeeded") | Some("Failed")
    )
}

fn uses_emptydir(pod: &Pod) -> bool {
    pod.spec
        .as_ref()
        .and_then(|s| s.volumes.as_ref())
        .is_some_and(|vols| vols.iter().any(|v| v.empty_dir.is_some()))
}

/// Sort the node's pods into evictable, skipped and blocking sets.
fn plan_drain(pods: Vec<Pod>, opts: DrainOptions) -> DrainPlan {
    let mut plan = DrainPlan::default();
    for pod in pods {
        let is_mirror = pod
            .metadata
            .annotations
            .as_ref()
            .is_some_and(|a| a.contains_key(MIRROR_POD_ANNOTATION));
        if is_mirror || is_finished(&pod) {
            continue;
        }

        let key = pod_key(&pod);
        match controller_kind(&pod) {
            Some("DaemonSet") if opts.ignore_daemonsets => {
                plan.ignored_daemonset.push(key);
                continue;
            }
            Some("DaemonSet") => {
                plan.daemonset.push(key);
                continue;
            }
            None if !opts.force => {
                plan.unmanaged.push(key);
                continue;
            }
            _ => {}
        }
        if uses_emptydir(&pod) && !opts.delete_emptydir_data {
            plan.emptydir.push(key);
            continue;
        }
        plan.evict.push(pod);
    }
    plan
}

/// Cordon, filter, then evict every remaining pod.
///
/// Steps run in order and stop at the first failure, which is reported by
/// step name. The node stays cordoned and pods already evicted stay evicted.
async fn drain(ctx: &HandlerContext<'_>, args: &ValidatedArgs) -> Result<ToolOutput> {
    let name = object_name(args)?;
    let opts = DrainOptions {
        force: args.flag("force"),
        ignore_daemonsets: args.flag("ignore_daemonsets"),
        delete_emptydir_data: args.flag("delete_emptydir_data"),
    };
    let delete = DeleteOptions {
        grace_period_seconds: grace_period(args)?,
        ..Default::default()
    };

    let mut report = Vec::new();
    let cordoned = ctx
        .step(
            format!("cordon node {}", name),
            set_unschedulable(ctx, name, true),
        )
        .await?;
    report.push(if cordoned {
        format!("node/{} cordoned", name)
    } else {
        format!("node/{} already cordoned", name)
    });

    let list_opts = ListOptions {
        label_selector: None,
        field_selector: Some(format!("spec.nodeName={}", name)),
    };
    let pods = ctx
        .step(
            format!("list pods on node {}", name),
            ctx.cluster
                .list(&ClusterResourceRef::list(ResourceKind::Pod, None), &list_opts),
        )
        .await?
        .into_iter()
        .map(Pod::try_from)
        .collect::<Result<Vec<_>>>()?;

    let plan = plan_drain(pods, opts);
    let reasons = plan.blocking_reasons();
    if !reasons.is_empty() {
        return Err(Error::step(
            format!("filter pods on node {}", name),
            Error::invalid_spec(reasons.join("; ")),
        ));
    }
    if !plan.ignored_daemonset.is_empty() {
        report.push(format!(
            "Warning: ignoring DaemonSet-managed pods: {}",
            plan.ignored_daemonset.join(", ")
        ));
    }

    for pod in &plan.evict {
        let key = pod_key(pod);
        let target = ClusterResourceRef::namespaced(
            ResourceKind::Pod,
            pod.metadata.namespace.as_deref().unwrap_or("default"),
            pod.metadata.name.as_deref().unwrap_or(""),
        );
        ctx.step(format!("evict pod {}", key), ctx.cluster.evict(&target, &delete))
            .await?;
        tracing::info!("Evicted pod {} from node {}", key, name);
        report.push(format!("pod/{} evicted", key));
    }

    report.push(format!("node/{} drained", name));
    Ok(ToolOutput::Text(report.join("\n")))
}
