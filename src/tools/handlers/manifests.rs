//! `apply_yaml`: create-or-update over a multi-document manifest.
//!
//! Every document is parsed and checked before the first cluster call, so a
//! malformed manifest changes nothing. Documents are then applied in order;
//! a failure stops the run and names the document that failed, and earlier
//! documents stay applied.

use serde::Deserialize;
use serde_json::Value;

use crate::cluster::{ClusterObject, ClusterResourceRef, PatchBody, ResourceKind};
use crate::output::ToolOutput;
use crate::tools::definitions::ToolId;
use crate::tools::validate::ValidatedArgs;
use crate::types::{Error, ErrorKind, Result};
use crate::validation::validate_resource_name;

use super::{unrouted, HandlerContext};

const DEFAULT_NAMESPACE: &str = "default";

pub(super) async fn handle(
    ctx: &HandlerContext<'_>,
    id: ToolId,
    args: &ValidatedArgs,
) -> Result<ToolOutput> {
    match id {
        ToolId::ApplyYaml => {
            let manifests = parse_manifest(args.str("yaml_content")?, args.opt_str("namespace"))?;
            let mut lines = Vec::with_capacity(manifests.len());
            for manifest in manifests {
                let label = format!("apply {} {}", manifest.kind.name_prefix(), manifest.display());
                lines.push(ctx.step(label, apply(ctx, manifest)).await?);
            }
            Ok(ToolOutput::Text(lines.join("\n")))
        }
        _ => Err(unrouted(id, "manifest")),
    }
}

/// One decoded manifest document.
#[derive(Debug)]
struct Manifest {
    kind: ResourceKind,
    name: String,
    namespace: Option<String>,
    /// Document body with `namespace` resolved and `status` removed.
    body: Value,
}

impl Manifest {
    fn target(&self) -> ClusterResourceRef {
        match &self.namespace {
            Some(ns) => ClusterResourceRef::namespaced(self.kind, ns, &self.name),
            None => ClusterResourceRef::cluster(self.kind, &self.name),
        }
    }

    fn display(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{}", ns, self.name),
            None => self.name.clone(),
        }
    }
}

/// Decode every document of `yaml`. Empty documents are skipped.
///
/// `namespace` overrides the namespace of namespaced documents; documents
/// without one land in `default`.
fn parse_manifest(yaml: &str, namespace: Option<&str>) -> Result<Vec<Manifest>> {
    let mut manifests = Vec::new();
    for (i, document) in serde_yaml::Deserializer::from_str(yaml).enumerate() {
        let n = i + 1;
        let value = Value::deserialize(document).map_err(|e| doc_error(n, e))?;
        if value.is_null() {
            continue;
        }
        manifests.push(decode_document(n, value, namespace)?);
    }
    if manifests.is_empty() {
        return Err(Error::invalid_argument("yaml_content", "contains no objects"));
    }
    Ok(manifests)
}

fn decode_document(n: usize, mut value: Value, namespace: Option<&str>) -> Result<Manifest> {
    let field = |key: &str| value.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
    let (api_version, kind_name) = (field("apiVersion"), field("kind"));
    if api_version.is_empty() || kind_name.is_empty() {
        return Err(doc_error(n, "apiVersion and kind are required"));
    }
    let kind = ResourceKind::from_type_meta(&api_version, &kind_name)
        .ok_or_else(|| doc_error(n, format!("unsupported kind {} {}", api_version, kind_name)))?;
    if kind == ResourceKind::Node {
        return Err(doc_error(n, "nodes register themselves and cannot be applied"));
    }

    let name = value
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if name.is_empty() {
        return Err(doc_error(n, "metadata.name is required"));
    }
    validate_resource_name(&name, "yaml_content")
        .map_err(|_| doc_error(n, format!("metadata.name '{}' is not a valid name", name)))?;

    let namespace = if kind.is_namespaced() {
        let from_doc = value.pointer("/metadata/namespace").and_then(Value::as_str);
        Some(namespace.or(from_doc).unwrap_or(DEFAULT_NAMESPACE).to_string())
    } else {
        None
    };

    let Some(object) = value.as_object_mut() else {
        return Err(doc_error(n, "document is not a mapping"));
    };
    object.remove("status");
    if let (Some(ns), Some(Value::Object(metadata))) = (&namespace, object.get_mut("metadata")) {
        metadata.insert("namespace".to_string(), Value::String(ns.clone()));
    }

    // Decode once so type errors surface before anything is sent.
    ClusterObject::from_value(kind, value.clone()).map_err(|e| doc_error(n, e))?;
    Ok(Manifest {
        kind,
        name,
        namespace,
        body: value,
    })
}

fn doc_error(n: usize, reason: impl std::fmt::Display) -> Error {
    Error::invalid_argument("yaml_content", format!("document {}: {}", n, reason))
}

/// Create the object when absent, otherwise merge the document into it.
async fn apply(ctx: &HandlerContext<'_>, manifest: Manifest) -> Result<String> {
    let target = manifest.target();
    let prefix = manifest.kind.name_prefix();
    match ctx.cluster.get(&target).await {
        Ok(_) => {
            ctx.cluster
                .patch(&target, &PatchBody::Merge(manifest.body))
                .await?;
            tracing::info!("Configured {}", target);
            Ok(format!("{}/{} configured", prefix, manifest.name))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            let object = ClusterObject::from_value(manifest.kind, manifest.body)?;
            ctx.cluster.create(object).await?;
            tracing::info!("Created {}", target);
            Ok(format!("{}/{} created", prefix, manifest.name))
        }
        Err(e) => Err(e),
    }
}
