//! Tool handlers, one module per resource group.
//!
//! `run` routes a validated call to its group by [`ToolGroup`]; each group
//! matches on [`ToolId`]. Handlers range-check their arguments before the
//! first cluster call.

pub mod cronjobs;
pub mod deployments;
pub mod ingresses;
pub mod jobs;
pub mod manifests;
pub mod namespaces;
pub mod nodes;
pub mod pods;
pub mod services;

use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;

use crate::cluster::{
    ClusterApi, ClusterResourceRef, DeleteOptions, ListOptions, ResourceKind,
};
use crate::output::{DetailFormat, Formatter, ListFormat, ToolOutput};
use crate::templates::ContainerOverrides;
use crate::types::{Config, Error, Result, StepContext};
use crate::validation::{validate_dns_label, validate_non_negative, validate_resource_name};

use super::definitions::{ToolGroup, ToolId};
use super::validate::ValidatedArgs;

/// Everything a handler needs for one call.
#[derive(Clone)]
pub struct HandlerContext<'a> {
    pub cluster: &'a Arc<dyn ClusterApi>,
    pub formatter: Formatter,
    pub config: &'a Config,
    /// When the whole call must have finished.
    pub deadline: Instant,
}

impl HandlerContext<'_> {
    /// Run one named step of a multi-step tool against the call deadline.
    ///
    /// A failure or an expired deadline is reported as that step, so the
    /// caller learns how far the tool got.
    pub(crate) async fn step<T>(
        &self,
        step: impl Into<String>,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let step = step.into();
        match tokio::time::timeout_at(self.deadline, fut).await {
            Ok(result) => result.step(step),
            Err(_) => {
                let source = Error::timeout(format!("call deadline passed during {}", step));
                Err(Error::step(step, source))
            }
        }
    }
}

impl std::fmt::Debug for HandlerContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerContext")
            .field("formatter", &self.formatter)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

/// Run the handler bound to `id`.
pub async fn run(ctx: &HandlerContext<'_>, id: ToolId, args: &ValidatedArgs) -> Result<ToolOutput> {
    match id.group() {
        ToolGroup::Pods => pods::handle(ctx, id, args).await,
        ToolGroup::Deployments => deployments::handle(ctx, id, args).await,
        ToolGroup::Services => services::handle(ctx, id, args).await,
        ToolGroup::Namespaces => namespaces::handle(ctx, id, args).await,
        ToolGroup::Cluster => nodes::handle(ctx, id, args).await,
        ToolGroup::Jobs => jobs::handle(ctx, id, args).await,
        ToolGroup::CronJobs => cronjobs::handle(ctx, id, args).await,
        ToolGroup::Ingresses => ingresses::handle(ctx, id, args).await,
        ToolGroup::Manifests => manifests::handle(ctx, id, args).await,
    }
}

fn unrouted(id: ToolId, group: &str) -> Error {
    Error::internal(format!("tool {} is not handled by the {} group", id, group))
}

// =============================================================================
// Shared argument helpers
// =============================================================================

/// `name` argument of a pod, deployment or node.
fn object_name(args: &ValidatedArgs) -> Result<&str> {
    let name = args.str("name")?;
    validate_resource_name(name, "name")?;
    Ok(name)
}

/// `name` argument of a service or namespace.
fn label_name(args: &ValidatedArgs) -> Result<&str> {
    let name = args.str("name")?;
    validate_dns_label(name, "name")?;
    Ok(name)
}

fn namespace(args: &ValidatedArgs) -> Result<&str> {
    let ns = args.str("namespace")?;
    validate_dns_label(ns, "namespace")?;
    Ok(ns)
}

/// Optional list scope; `None` lists across all namespaces.
fn namespace_filter(args: &ValidatedArgs) -> Result<Option<&str>> {
    match args.opt_str("namespace") {
        Some(ns) => {
            validate_dns_label(ns, "namespace")?;
            Ok(Some(ns))
        }
        None => Ok(None),
    }
}

fn list_options(args: &ValidatedArgs) -> ListOptions {
    ListOptions {
        label_selector: args
            .opt_str("label_selector")
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string),
        field_selector: args
            .opt_str("field_selector")
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string),
    }
}

fn grace_period(args: &ValidatedArgs) -> Result<Option<u32>> {
    args.opt_int("grace_period_seconds")
        .map(|n| validate_non_negative(n, "grace_period_seconds").map(|n| n as u32))
        .transpose()
}

/// `force` deletes immediately; otherwise the optional grace period applies.
fn delete_options(args: &ValidatedArgs) -> Result<DeleteOptions> {
    let grace_period_seconds = grace_period(args)?;
    if args.flag("force") {
        return Ok(DeleteOptions {
            grace_period_seconds: Some(0),
            ..Default::default()
        });
    }
    Ok(DeleteOptions {
        grace_period_seconds,
        ..Default::default()
    })
}

/// Image, command, env and label overrides of a container template.
fn container_overrides(args: &ValidatedArgs) -> ContainerOverrides {
    ContainerOverrides {
        image: args.opt_str("image").map(str::to_string),
        command: args.opt_string_list("command"),
        args: args.opt_string_list("args"),
        env: args.opt_string_map("env").unwrap_or_default(),
        labels: args.opt_string_map("labels").unwrap_or_default(),
    }
}

fn tail_lines(args: &ValidatedArgs) -> Result<Option<i64>> {
    args.opt_int("tail_lines")
        .map(|n| validate_non_negative(n, "tail_lines").map(i64::from))
        .transpose()
}

// =============================================================================
// Shared get / describe
// =============================================================================

/// List `kind` and render it in the requested list format.
async fn list_objects(
    ctx: &HandlerContext<'_>,
    kind: ResourceKind,
    namespace: Option<&str>,
    args: &ValidatedArgs,
) -> Result<ToolOutput> {
    let format: ListFormat = args.parse("output")?;
    let opts = list_options(args);
    let target = ClusterResourceRef::list(kind, namespace);
    let objects = ctx.cluster.list(&target, &opts).await?;
    tracing::debug!("Listed {} {}", objects.len(), kind.plural());
    ctx.formatter.list(kind, &objects, format, namespace)
}

/// Read one object and render it in the requested detail format.
async fn describe_object(
    ctx: &HandlerContext<'_>,
    target: ClusterResourceRef,
    args: &ValidatedArgs,
) -> Result<ToolOutput> {
    let format: DetailFormat = args.parse("output")?;
    let object = ctx.cluster.get(&target).await?;
    ctx.formatter.detail(&object, format)
}
