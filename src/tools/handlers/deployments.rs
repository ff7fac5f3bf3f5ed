//! Deployment tools.

use k8s_openapi::api::apps::v1::Deployment;
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::cluster::{ClusterResourceRef, PatchBody, ResourceKind};
use crate::output::ToolOutput;
use crate::templates::{build_deployment, build_service, DeploymentParams, ServiceParams, ServiceType};
use crate::tools::definitions::ToolId;
use crate::tools::validate::ValidatedArgs;
use crate::types::{Error, Result};
use crate::validation::{validate_non_empty, validate_non_negative, validate_port};

use super::{
    delete_options, describe_object, list_objects, namespace, namespace_filter, object_name,
    unrouted, HandlerContext,
};

const RESTARTED_AT_ANNOTATION: &str = "kubectl.kubernetes.io/restartedAt";

/// Action of `rollout_deployment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloutAction {
    Status,
    Restart,
    Pause,
    Resume,
}

impl RolloutAction {
    pub const VALUES: &'static [&'static str] = &["status", "restart", "pause", "resume"];

    pub fn as_str(self) -> &'static str {
        match self {
            RolloutAction::Status => "status",
            RolloutAction::Restart => "restart",
            RolloutAction::Pause => "pause",
            RolloutAction::Resume => "resume",
        }
    }
}

impl FromStr for RolloutAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "status" => Ok(RolloutAction::Status),
            "restart" => Ok(RolloutAction::Restart),
            "pause" => Ok(RolloutAction::Pause),
            "resume" => Ok(RolloutAction::Resume),
            other => Err(format!(
                "invalid value '{}', expected one of: {}",
                other,
                Self::VALUES.join(", ")
            )),
        }
    }
}

impl fmt::Display for RolloutAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(super) async fn handle(
    ctx: &HandlerContext<'_>,
    id: ToolId,
    args: &ValidatedArgs,
) -> Result<ToolOutput> {
    match id {
        ToolId::GetDeployments => {
            let ns = namespace_filter(args)?;
            list_objects(ctx, ResourceKind::Deployment, ns, args).await
        }
        ToolId::DescribeDeployment => {
            let target = deployment_ref(args)?;
            describe_object(ctx, target, args).await
        }
        ToolId::CreateDeployment => create(ctx, args).await,
        ToolId::DeleteDeployment => {
            let target = deployment_ref(args)?;
            let opts = delete_options(args)?;
            ctx.cluster.delete(&target, &opts).await?;
            tracing::info!("Deleted {}", target);
            Ok(ToolOutput::text(format!(
                "deployment.apps \"{}\" deleted",
                object_name(args)?
            )))
        }
        ToolId::ScaleDeployment => {
            let target = deployment_ref(args)?;
            let replicas = validate_non_negative(args.int("replicas")?, "replicas")?;
            ctx.cluster.scale(&target, replicas).await?;
            tracing::info!("Scaled {} to {} replicas", target, replicas);
            Ok(ToolOutput::text(format!(
                "deployment.apps/{} scaled",
                object_name(args)?
            )))
        }
        ToolId::UpdateDeployment => update(ctx, args).await,
        ToolId::RolloutDeployment => rollout(ctx, args).await,
        ToolId::ExposeDeployment => expose(ctx, args).await,
        _ => Err(unrouted(id, "deployment")),
    }
}

fn deployment_ref(args: &ValidatedArgs) -> Result<ClusterResourceRef> {
    Ok(ClusterResourceRef::namespaced(
        ResourceKind::Deployment,
        namespace(args)?,
        object_name(args)?,
    ))
}

async fn fetch(ctx: &HandlerContext<'_>, target: &ClusterResourceRef) -> Result<Deployment> {
    Deployment::try_from(ctx.cluster.get(target).await?)
}

async fn create(ctx: &HandlerContext<'_>, args: &ValidatedArgs) -> Result<ToolOutput> {
    let name = object_name(args)?;
    let ns = namespace(args)?;
    let image = args.str("image")?;
    validate_non_empty(image, "image")?;
    let replicas = validate_non_negative(args.int("replicas")?, "replicas")?;
    let container_port = args
        .opt_int("container_port")
        .map(|p| validate_port(p, "container_port"))
        .transpose()?;

    let deployment = build_deployment(DeploymentParams {
        name: name.to_string(),
        namespace: ns.to_string(),
        image: image.to_string(),
        replicas,
        container_port,
        env: args.opt_string_map("env").unwrap_or_default(),
        labels: args.opt_string_map("labels").unwrap_or_default(),
    });
    ctx.cluster.create(deployment.into()).await?;
    tracing::info!("Created deployment {}/{} ({} replicas)", ns, name, replicas);
    Ok(ToolOutput::text(format!("deployment.apps/{} created", name)))
}

/// Patch image, replicas or env. Container-level changes use a strategic
/// merge patch keyed on the container name so other containers are untouched.
async fn update(ctx: &HandlerContext<'_>, args: &ValidatedArgs) -> Result<ToolOutput> {
    let target = deployment_ref(args)?;
    let image = args.opt_str("image");
    if let Some(image) = image {
        validate_non_empty(image, "image")?;
    }
    let replicas = args
        .opt_int("replicas")
        .map(|n| validate_non_negative(n, "replicas"))
        .transpose()?;
    let env = args.opt_string_map("env").filter(|env| !env.is_empty());

    if image.is_none() && replicas.is_none() && env.is_none() {
        return Err(Error::validation(
            "nothing to update: provide image, replicas or env",
        ));
    }

    let mut spec = Map::new();
    if let Some(replicas) = replicas {
        spec.insert("replicas".to_string(), json!(replicas));
    }
    if image.is_some() || env.is_some() {
        let deployment = fetch(ctx, &target).await?;
        let container = resolve_container(&deployment, args.opt_str("container"))?;
        let mut patch = Map::new();
        patch.insert("name".to_string(), json!(container));
        if let Some(image) = image {
            patch.insert("image".to_string(), json!(image));
        }
        if let Some(env) = env {
            let vars: Vec<Value> = env
                .iter()
                .map(|(name, value)| json!({"name": name, "value": value}))
                .collect();
            patch.insert("env".to_string(), Value::Array(vars));
        }
        spec.insert(
            "template".to_string(),
            json!({"spec": {"containers": [Value::Object(patch)]}}),
        );
    }

    let body = PatchBody::Strategic(json!({ "spec": Value::Object(spec) }));
    ctx.cluster.patch(&target, &body).await?;
    tracing::info!("Updated {}", target);
    Ok(ToolOutput::text(format!(
        "deployment.apps/{} updated",
        object_name(args)?
    )))
}

/// Name of the requested container, or of the first one.
fn resolve_container(deployment: &Deployment, requested: Option<&str>) -> Result<String> {
    let containers: Vec<&str> = deployment
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .map(|s| s.containers.iter().map(|c| c.name.as_str()).collect())
        .unwrap_or_default();

    match requested {
        Some(name) if containers.contains(&name) => Ok(name.to_string()),
        Some(name) => Err(Error::invalid_argument(
            "container",
            format!(
                "'{}' not found in deployment (containers: {})",
                name,
                containers.join(", ")
            ),
        )),
        None => containers
            .first()
            .map(|c| c.to_string())
            .ok_or_else(|| Error::invalid_spec("deployment has no containers")),
    }
}

async fn rollout(ctx: &HandlerContext<'_>, args: &ValidatedArgs) -> Result<ToolOutput> {
    let target = deployment_ref(args)?;
    let name = object_name(args)?;
    let action: RolloutAction = args.parse("action")?;

    let body = match action {
        RolloutAction::Status => {
            let deployment = fetch(ctx, &target).await?;
            return Ok(ToolOutput::Text(rollout_status(name, &deployment)));
        }
        RolloutAction::Restart => PatchBody::Strategic(json!({
            "spec": {"template": {"metadata": {"annotations": {
                RESTARTED_AT_ANNOTATION: ctx.formatter.now().to_rfc3339()
            }}}}
        })),
        RolloutAction::Pause => PatchBody::Merge(json!({"spec": {"paused": true}})),
        RolloutAction::Resume => PatchBody::Merge(json!({"spec": {"paused": false}})),
    };

    ctx.cluster.patch(&target, &body).await?;
    tracing::info!("Rollout {} applied to {}", action, target);
    let verb = match action {
        RolloutAction::Restart => "restarted",
        RolloutAction::Pause => "paused",
        _ => "resumed",
    };
    Ok(ToolOutput::text(format!("deployment.apps/{} {}", name, verb)))
}

/// Rollout progress in the wording of `kubectl rollout status`.
fn rollout_status(name: &str, deployment: &Deployment) -> String {
    let generation = deployment.metadata.generation.unwrap_or(0);
    let spec = deployment.spec.as_ref();
    let status = deployment.status.as_ref();
    let observed = status.and_then(|s| s.observed_generation).unwrap_or(0);

    if spec.and_then(|s| s.paused).unwrap_or(false) {
        return format!("deployment \"{}\" rollout is paused", name);
    }
    if generation > observed {
        return "Waiting for deployment spec update to be observed...".to_string();
    }

    let deadline_exceeded = status
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conds| {
            conds.iter().any(|c| {
                c.type_ == "Progressing" && c.reason.as_deref() == Some("ProgressDeadlineExceeded")
            })
        });
    if deadline_exceeded {
        return format!("deployment \"{}\" exceeded its progress deadline", name);
    }

    let desired = spec.and_then(|s| s.replicas).unwrap_or(1);
    let replicas = status.and_then(|s| s.replicas).unwrap_or(0);
    let updated = status.and_then(|s| s.updated_replicas).unwrap_or(0);
    let available = status.and_then(|s| s.available_replicas).unwrap_or(0);

    if updated < desired {
        format!(
            "Waiting for deployment \"{}\" rollout to finish: {} out of {} new replicas have been updated...",
            name, updated, desired
        )
    } else if replicas > updated {
        format!(
            "Waiting for deployment \"{}\" rollout to finish: {} old replicas are pending termination...",
            name,
            replicas - updated
        )
    } else if available < updated {
        format!(
            "Waiting for deployment \"{}\" rollout to finish: {} of {} updated replicas are available...",
            name, available, updated
        )
    } else {
        format!("deployment \"{}\" successfully rolled out", name)
    }
}

/// Create a service named after the deployment that selects its pods.
async fn expose(ctx: &HandlerContext<'_>, args: &ValidatedArgs) -> Result<ToolOutput> {
    let target = deployment_ref(args)?;
    let name = object_name(args)?;
    let ns = namespace(args)?;
    let port = validate_port(args.int("port")?, "port")?;
    let target_port = args
        .opt_int("target_port")
        .map(|p| validate_port(p, "target_port"))
        .transpose()?;
    let service_type: ServiceType = args.parse("service_type")?;

    let deployment = ctx
        .step(format!("read deployment {}/{}", ns, name), fetch(ctx, &target))
        .await?;
    let selector = deployment
        .spec
        .as_ref()
        .and_then(|s| s.selector.match_labels.clone())
        .filter(|labels| !labels.is_empty())
        .ok_or_else(|| {
            Error::invalid_spec(format!(
                "deployment {}/{} has no matchLabels selector to expose",
                ns, name
            ))
        })?;

    let service = build_service(ServiceParams {
        name: name.to_string(),
        namespace: ns.to_string(),
        service_type,
        port: Some(port),
        target_port,
        node_port: None,
        selector,
        external_name: None,
    })?;
    ctx.step(
        format!("create service {}/{}", ns, name),
        ctx.cluster.create(service.into()),
    )
    .await?;
    tracing::info!("Exposed {} as {} service on port {}", target, service_type, port);
    Ok(ToolOutput::text(format!("service/{} exposed", name)))
}
