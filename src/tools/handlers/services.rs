//! Service tools.

use k8s_openapi::api::core::v1::{Service, ServicePort};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::cluster::{ClusterResourceRef, DeleteOptions, PatchBody, ResourceKind};
use crate::output::{ListFormat, ToolOutput};
use crate::templates::{build_service, ServiceParams, ServiceType};
use crate::tools::definitions::ToolId;
use crate::tools::validate::ValidatedArgs;
use crate::types::{Error, Result};
use crate::validation::{validate_node_port, validate_port};

use super::{describe_object, label_name, list_objects, namespace, namespace_filter, unrouted, HandlerContext};

pub(super) async fn handle(
    ctx: &HandlerContext<'_>,
    id: ToolId,
    args: &ValidatedArgs,
) -> Result<ToolOutput> {
    match id {
        ToolId::GetServices => {
            let ns = namespace_filter(args)?;
            list_objects(ctx, ResourceKind::Service, ns, args).await
        }
        ToolId::DescribeService => {
            let target = service_ref(args)?;
            describe_object(ctx, target, args).await
        }
        ToolId::CreateService => create(ctx, args).await,
        ToolId::UpdateService => update(ctx, args).await,
        ToolId::DeleteService => {
            let target = service_ref(args)?;
            ctx.cluster.delete(&target, &DeleteOptions::default()).await?;
            tracing::info!("Deleted {}", target);
            Ok(ToolOutput::text(format!(
                "service \"{}\" deleted",
                label_name(args)?
            )))
        }
        ToolId::GetServiceEndpoints => {
            let name = label_name(args)?;
            let ns = namespace(args)?;
            let format: ListFormat = args.parse("output")?;
            let target = ClusterResourceRef::namespaced(ResourceKind::Endpoints, ns, name);
            let endpoints = ctx.cluster.get(&target).await?;
            ctx.formatter
                .list(ResourceKind::Endpoints, &[endpoints], format, Some(ns))
        }
        _ => Err(unrouted(id, "service")),
    }
}

fn service_ref(args: &ValidatedArgs) -> Result<ClusterResourceRef> {
    Ok(ClusterResourceRef::namespaced(
        ResourceKind::Service,
        namespace(args)?,
        label_name(args)?,
    ))
}

fn opt_port(args: &ValidatedArgs, field: &str) -> Result<Option<i32>> {
    args.opt_int(field)
        .map(|p| validate_port(p, field))
        .transpose()
}

async fn create(ctx: &HandlerContext<'_>, args: &ValidatedArgs) -> Result<ToolOutput> {
    let name = label_name(args)?;
    let ns = namespace(args)?;
    let service_type: ServiceType = args.parse("service_type")?;
    let node_port = args
        .opt_int("node_port")
        .map(|p| validate_node_port(p, "node_port"))
        .transpose()?;

    let service = build_service(ServiceParams {
        name: name.to_string(),
        namespace: ns.to_string(),
        service_type,
        port: opt_port(args, "port")?,
        target_port: opt_port(args, "target_port")?,
        node_port,
        selector: args.opt_string_map("selector").unwrap_or_default(),
        external_name: args.opt_str("external_name").map(str::to_string),
    })?;
    ctx.cluster.create(service.into()).await?;
    tracing::info!("Created {} service {}/{}", service_type, ns, name);
    Ok(ToolOutput::text(format!("service/{} created", name)))
}

/// Merge-patch type, selector and the first port of a service.
///
/// Lists are replaced wholesale by a merge patch, so the full `ports` array is
/// rebuilt from the current object. A selector replaces the old one: keys
/// that disappear are sent as null.
async fn update(ctx: &HandlerContext<'_>, args: &ValidatedArgs) -> Result<ToolOutput> {
    let target = service_ref(args)?;
    let service_type: Option<ServiceType> = args.opt_parse("service_type")?;
    let selector = args.opt_string_map("selector");
    let port = opt_port(args, "port")?;
    let target_port = opt_port(args, "target_port")?;

    if service_type.is_none() && selector.is_none() && port.is_none() && target_port.is_none() {
        return Err(Error::validation(
            "nothing to update: provide service_type, selector, port or target_port",
        ));
    }
    if service_type == Some(ServiceType::ExternalName) {
        return Err(Error::invalid_argument(
            "service_type",
            "cannot convert an existing service to ExternalName; recreate it instead",
        ));
    }

    let current = Service::try_from(ctx.cluster.get(&target).await?)?;
    let body = update_patch(&current, service_type, selector, port, target_port);
    ctx.cluster.patch(&target, &PatchBody::Merge(body)).await?;
    tracing::info!("Updated {}", target);
    Ok(ToolOutput::text(format!(
        "service/{} patched",
        label_name(args)?
    )))
}

fn update_patch(
    current: &Service,
    service_type: Option<ServiceType>,
    selector: Option<BTreeMap<String, String>>,
    port: Option<i32>,
    target_port: Option<i32>,
) -> Value {
    let spec = current.spec.clone().unwrap_or_default();
    let mut patch = Map::new();

    if let Some(service_type) = service_type {
        patch.insert("type".to_string(), json!(service_type.as_str()));
    }

    if let Some(selector) = selector {
        let mut merged: Map<String, Value> = spec
            .selector
            .unwrap_or_default()
            .into_keys()
            .filter(|k| !selector.contains_key(k))
            .map(|k| (k, Value::Null))
            .collect();
        merged.extend(selector.into_iter().map(|(k, v)| (k, Value::String(v))));
        patch.insert("selector".to_string(), Value::Object(merged));
    }

    let clears_node_ports = service_type.is_some_and(|t| !t.allows_node_port());
    if port.is_some() || target_port.is_some() || clears_node_ports {
        let mut ports = spec.ports.unwrap_or_default();
        if ports.is_empty() && (port.is_some() || target_port.is_some()) {
            ports.push(ServicePort {
                name: Some("http".to_string()),
                port: port.unwrap_or(80),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            });
        }
        if let Some(first) = ports.first_mut() {
            if let Some(port) = port {
                first.port = port;
            }
            if let Some(target_port) = target_port {
                first.target_port = Some(IntOrString::Int(target_port));
            }
        }
        if clears_node_ports {
            for p in &mut ports {
                p.node_port = None;
            }
        }
        patch.insert("ports".to_string(), json!(ports));
    }

    json!({ "spec": Value::Object(patch) })
}
