//! Job tools.

use k8s_openapi::api::core::v1::Pod;

use crate::cluster::{ClusterResourceRef, ListOptions, LogOptions, Propagation, ResourceKind};
use crate::output::{truncate_lines, ToolOutput};
use crate::templates::{build_job, JobParams, PodTemplate};
use crate::tools::definitions::ToolId;
use crate::tools::validate::ValidatedArgs;
use crate::types::Result;
use crate::validation::validate_non_negative;

use super::{
    container_overrides, delete_options, describe_object, list_objects, namespace,
    namespace_filter, object_name, tail_lines, unrouted, HandlerContext,
};

/// Label the job controller puts on every pod it creates.
const JOB_NAME_LABEL: &str = "job-name";

pub(super) async fn handle(
    ctx: &HandlerContext<'_>,
    id: ToolId,
    args: &ValidatedArgs,
) -> Result<ToolOutput> {
    match id {
        ToolId::GetJobs => {
            let ns = namespace_filter(args)?;
            list_objects(ctx, ResourceKind::Job, ns, args).await
        }
        ToolId::DescribeJob => {
            let target = job_ref(args)?;
            describe_object(ctx, target, args).await
        }
        ToolId::CreateJob => {
            let params = job_params(args)?;
            let (name, ns) = (params.name.clone(), params.namespace.clone());
            let template = params.template;
            ctx.cluster.create(build_job(params)?.into()).await?;
            tracing::info!("Created job {}/{} from template {}", ns, name, template);
            Ok(ToolOutput::text(format!("job.batch/{} created", name)))
        }
        ToolId::DeleteJob => {
            let target = job_ref(args)?;
            let mut opts = delete_options(args)?;
            opts.propagation = Some(Propagation::Background);
            ctx.cluster.delete(&target, &opts).await?;
            tracing::info!("Deleted {}", target);
            Ok(ToolOutput::text(format!(
                "job.batch \"{}\" deleted",
                object_name(args)?
            )))
        }
        ToolId::GetJobLogs => {
            let name = object_name(args)?;
            let ns = namespace(args)?;
            let opts = log_options(args)?;
            ctx.step(
                format!("read job {}/{}", ns, name),
                ctx.cluster.get(&job_ref(args)?),
            )
            .await?;
            let logs = pod_logs(ctx, ns, name, &opts).await?;
            if logs.is_empty() {
                return Ok(ToolOutput::text(format!("No pods found for job {}/{}", ns, name)));
            }
            let sections: Vec<String> = logs
                .into_iter()
                .map(|(pod, text)| section(format!("=== Logs from pod {} ===", pod), &text))
                .collect();
            Ok(ToolOutput::Text(sections.join("\n")))
        }
        _ => Err(unrouted(id, "job")),
    }
}

fn job_ref(args: &ValidatedArgs) -> Result<ClusterResourceRef> {
    Ok(ClusterResourceRef::namespaced(
        ResourceKind::Job,
        namespace(args)?,
        object_name(args)?,
    ))
}

/// Job settings shared by `create_job` and `create_cronjob`.
pub(super) fn job_params(args: &ValidatedArgs) -> Result<JobParams> {
    let count = |field: &str| validate_non_negative(args.int(field)?, field);
    let template: PodTemplate = args.parse("template")?;
    Ok(JobParams {
        name: object_name(args)?.to_string(),
        namespace: namespace(args)?.to_string(),
        template,
        overrides: container_overrides(args),
        completions: count("completions")?,
        parallelism: count("parallelism")?,
        backoff_limit: count("backoff_limit")?,
    })
}

pub(super) fn log_options(args: &ValidatedArgs) -> Result<LogOptions> {
    Ok(LogOptions {
        container: args.opt_str("container").map(str::to_string),
        tail_lines: tail_lines(args)?,
        timestamps: args.flag("timestamps"),
        ..Default::default()
    })
}

/// Header line followed by the log text, if any.
pub(super) fn section(header: String, text: &str) -> String {
    if text.is_empty() {
        header
    } else {
        format!("{}\n{}", header, text)
    }
}

/// Logs of every pod of a job, by pod name. Each pod's log is capped at
/// `output.max_log_lines`.
pub(super) async fn pod_logs(
    ctx: &HandlerContext<'_>,
    namespace: &str,
    job: &str,
    opts: &LogOptions,
) -> Result<Vec<(String, String)>> {
    let list_opts = ListOptions {
        label_selector: Some(format!("{}={}", JOB_NAME_LABEL, job)),
        field_selector: None,
    };
    let mut pods = ctx
        .step(
            format!("list pods of job {}/{}", namespace, job),
            ctx.cluster.list(
                &ClusterResourceRef::list(ResourceKind::Pod, Some(namespace)),
                &list_opts,
            ),
        )
        .await?
        .into_iter()
        .map(Pod::try_from)
        .collect::<Result<Vec<_>>>()?;
    pods.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));

    let cap = ctx.config.output.max_log_lines;
    let mut logs = Vec::with_capacity(pods.len());
    for pod in pods {
        let pod_name = pod.metadata.name.unwrap_or_default();
        let target = ClusterResourceRef::namespaced(ResourceKind::Pod, namespace, &pod_name);
        let text = ctx
            .step(
                format!("read logs of pod {}/{}", namespace, pod_name),
                ctx.cluster.logs(&target, opts),
            )
            .await?;
        logs.push((pod_name, truncate_lines(&text, cap)));
    }
    tracing::debug!("Read logs of {} pods of job {}/{}", logs.len(), namespace, job);
    Ok(logs)
}
