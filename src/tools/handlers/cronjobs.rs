//! CronJob tools.

use k8s_openapi::api::batch::v1::Job;

use crate::cluster::{ClusterResourceRef, ListOptions, Propagation, ResourceKind};
use crate::output::ToolOutput;
use crate::templates::build_cronjob;
use crate::tools::definitions::ToolId;
use crate::tools::validate::ValidatedArgs;
use crate::types::Result;
use crate::validation::validate_cron_schedule;

use super::jobs::{job_params, log_options, pod_logs, section};
use super::{
    delete_options, describe_object, list_objects, namespace, namespace_filter, object_name,
    unrouted, HandlerContext,
};

pub(super) async fn handle(
    ctx: &HandlerContext<'_>,
    id: ToolId,
    args: &ValidatedArgs,
) -> Result<ToolOutput> {
    match id {
        ToolId::GetCronJobs => {
            let ns = namespace_filter(args)?;
            list_objects(ctx, ResourceKind::CronJob, ns, args).await
        }
        ToolId::DescribeCronJob => {
            let target = cronjob_ref(args)?;
            describe_object(ctx, target, args).await
        }
        ToolId::CreateCronJob => {
            let schedule = args.str("schedule")?;
            validate_cron_schedule(schedule, "schedule")?;
            let params = job_params(args)?;
            let (name, ns) = (params.name.clone(), params.namespace.clone());
            let cronjob = build_cronjob(params, schedule, args.flag("suspend"))?;
            ctx.cluster.create(cronjob.into()).await?;
            tracing::info!("Created cron job {}/{} on schedule {}", ns, name, schedule);
            Ok(ToolOutput::text(format!("cronjob.batch/{} created", name)))
        }
        ToolId::DeleteCronJob => {
            let target = cronjob_ref(args)?;
            let mut opts = delete_options(args)?;
            opts.propagation = Some(Propagation::Background);
            ctx.cluster.delete(&target, &opts).await?;
            tracing::info!("Deleted {}", target);
            Ok(ToolOutput::text(format!(
                "cronjob.batch \"{}\" deleted",
                object_name(args)?
            )))
        }
        ToolId::GetCronJobLogs => logs(ctx, args).await,
        _ => Err(unrouted(id, "cron job")),
    }
}

fn cronjob_ref(args: &ValidatedArgs) -> Result<ClusterResourceRef> {
    Ok(ClusterResourceRef::namespaced(
        ResourceKind::CronJob,
        namespace(args)?,
        object_name(args)?,
    ))
}

/// Logs of every job the cron job owns, oldest job first.
async fn logs(ctx: &HandlerContext<'_>, args: &ValidatedArgs) -> Result<ToolOutput> {
    let name = object_name(args)?;
    let ns = namespace(args)?;
    let opts = log_options(args)?;
    ctx.step(
        format!("read cronjob {}/{}", ns, name),
        ctx.cluster.get(&cronjob_ref(args)?),
    )
    .await?;

    let jobs = ctx
        .step(
            format!("list jobs in {}", ns),
            ctx.cluster.list(
                &ClusterResourceRef::list(ResourceKind::Job, Some(ns)),
                &ListOptions::default(),
            ),
        )
        .await?
        .into_iter()
        .map(Job::try_from)
        .collect::<Result<Vec<_>>>()?;
    let owned = owned_jobs(jobs, name);
    if owned.is_empty() {
        return Ok(ToolOutput::text(format!(
            "No jobs found for cronjob {}/{}",
            ns, name
        )));
    }

    let mut sections = Vec::new();
    for job in &owned {
        for (pod, text) in pod_logs(ctx, ns, job, &opts).await? {
            sections.push(section(
                format!("=== Logs from pod {} in job {} ===", pod, job),
                &text,
            ));
        }
    }
    if sections.is_empty() {
        return Ok(ToolOutput::text(format!(
            "No pods found for the jobs of cronjob {}/{}",
            ns, name
        )));
    }
    Ok(ToolOutput::Text(sections.join("\n")))
}

/// Names of the jobs controlled by the named CronJob, ordered by creation
/// time and then by name.
fn owned_jobs(jobs: Vec<Job>, cronjob: &str) -> Vec<String> {
    let mut owned: Vec<_> = jobs
        .into_iter()
        .filter(|job| {
            job.metadata
                .owner_references
                .as_deref()
                .unwrap_or_default()
                .iter()
                .any(|r| r.kind == "CronJob" && r.name == cronjob)
        })
        .map(|job| {
            let created = job.metadata.creation_timestamp.map(|t| t.0);
            (created, job.metadata.name.unwrap_or_default())
        })
        .collect();
    owned.sort();
    owned.into_iter().map(|(_, name)| name).collect()
}
