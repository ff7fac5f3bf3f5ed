//! Namespace tools.

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::cluster::{ClusterResourceRef, ResourceKind};
use crate::output::ToolOutput;
use crate::tools::definitions::ToolId;
use crate::tools::validate::ValidatedArgs;
use crate::types::Result;

use super::{delete_options, describe_object, label_name, list_objects, namespace, unrouted, HandlerContext};

pub(super) async fn handle(
    ctx: &HandlerContext<'_>,
    id: ToolId,
    args: &ValidatedArgs,
) -> Result<ToolOutput> {
    match id {
        ToolId::GetNamespaces => list_objects(ctx, ResourceKind::Namespace, None, args).await,
        ToolId::DescribeNamespace => {
            let target = ClusterResourceRef::cluster(ResourceKind::Namespace, label_name(args)?);
            describe_object(ctx, target, args).await
        }
        ToolId::CreateNamespace => {
            let name = label_name(args)?;
            let labels = args.opt_string_map("labels").filter(|l| !l.is_empty());
            let object = Namespace {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    labels,
                    ..Default::default()
                },
                ..Default::default()
            };
            ctx.cluster.create(object.into()).await?;
            tracing::info!("Created namespace {}", name);
            Ok(ToolOutput::text(format!("namespace/{} created", name)))
        }
        ToolId::DeleteNamespace => {
            let name = label_name(args)?;
            let target = ClusterResourceRef::cluster(ResourceKind::Namespace, name);
            let opts = delete_options(args)?;
            ctx.cluster.delete(&target, &opts).await?;
            tracing::info!("Deleted namespace {}", name);
            Ok(ToolOutput::text(format!("namespace \"{}\" deleted", name)))
        }
        ToolId::GetNamespaceQuota => {
            let ns = namespace(args)?;
            list_objects(ctx, ResourceKind::ResourceQuota, Some(ns), args).await
        }
        _ => Err(unrouted(id, "namespace")),
    }
}
