//! Ingress tools.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::cluster::{ClusterResourceRef, DeleteOptions, PatchBody, ResourceKind};
use crate::output::ToolOutput;
use crate::templates::{
    build_ingress, ingress_rules, ingress_tls, IngressParams, IngressRuleArg, IngressTlsArg,
};
use crate::tools::definitions::ToolId;
use crate::tools::validate::ValidatedArgs;
use crate::types::{Error, Result};

use super::{
    describe_object, list_objects, namespace, namespace_filter, object_name, unrouted,
    HandlerContext,
};

pub(super) async fn handle(
    ctx: &HandlerContext<'_>,
    id: ToolId,
    args: &ValidatedArgs,
) -> Result<ToolOutput> {
    match id {
        ToolId::GetIngresses => {
            let ns = namespace_filter(args)?;
            list_objects(ctx, ResourceKind::Ingress, ns, args).await
        }
        ToolId::DescribeIngress => {
            let target = ingress_ref(args)?;
            describe_object(ctx, target, args).await
        }
        ToolId::CreateIngress => {
            let params = IngressParams {
                name: object_name(args)?.to_string(),
                namespace: namespace(args)?.to_string(),
                ingress_class: args.opt_str("ingress_class").map(str::to_string),
                rules: args.opt_decode("rules")?.unwrap_or_default(),
                tls: args.opt_decode("tls")?.unwrap_or_default(),
                annotations: args.opt_string_map("annotations").unwrap_or_default(),
            };
            let target = ingress_ref(args)?;
            ctx.cluster.create(build_ingress(params)?.into()).await?;
            tracing::info!("Created {}", target);
            Ok(ToolOutput::text(format!(
                "ingress.networking.k8s.io/{} created",
                object_name(args)?
            )))
        }
        ToolId::UpdateIngress => {
            let target = ingress_ref(args)?;
            let body = update_patch(
                args.opt_decode("rules")?,
                args.opt_decode("tls")?,
                args.opt_string_map("annotations"),
                args.opt_str("ingress_class"),
            )?;
            ctx.cluster.patch(&target, &PatchBody::Merge(body)).await?;
            tracing::info!("Updated {}", target);
            Ok(ToolOutput::text(format!(
                "ingress.networking.k8s.io/{} patched",
                object_name(args)?
            )))
        }
        ToolId::DeleteIngress => {
            let target = ingress_ref(args)?;
            ctx.cluster.delete(&target, &DeleteOptions::default()).await?;
            tracing::info!("Deleted {}", target);
            Ok(ToolOutput::text(format!(
                "ingress.networking.k8s.io \"{}\" deleted",
                object_name(args)?
            )))
        }
        _ => Err(unrouted(id, "ingress")),
    }
}

fn ingress_ref(args: &ValidatedArgs) -> Result<ClusterResourceRef> {
    Ok(ClusterResourceRef::namespaced(
        ResourceKind::Ingress,
        namespace(args)?,
        object_name(args)?,
    ))
}

/// Merge patch for `update_ingress`. Rules and TLS replace the current lists
/// whole; annotations are added or overwritten key by key.
fn update_patch(
    rules: Option<Vec<IngressRuleArg>>,
    tls: Option<Vec<IngressTlsArg>>,
    annotations: Option<BTreeMap<String, String>>,
    ingress_class: Option<&str>,
) -> Result<Value> {
    if rules.is_none() && tls.is_none() && annotations.is_none() && ingress_class.is_none() {
        return Err(Error::validation(
            "nothing to update: provide rules, tls, annotations or ingress_class",
        ));
    }

    let mut spec = Map::new();
    if let Some(rules) = rules {
        spec.insert("rules".to_string(), serde_json::to_value(ingress_rules(&rules)?)?);
    }
    if let Some(tls) = tls {
        spec.insert("tls".to_string(), serde_json::to_value(ingress_tls(&tls))?);
    }
    if let Some(class) = ingress_class {
        spec.insert("ingressClassName".to_string(), json!(class));
    }

    let mut patch = Map::new();
    if !spec.is_empty() {
        patch.insert("spec".to_string(), Value::Object(spec));
    }
    if let Some(annotations) = annotations {
        patch.insert("metadata".to_string(), json!({ "annotations": annotations }));
    }
    Ok(Value::Object(patch))
}
