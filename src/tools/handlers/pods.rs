//! Pod tools.

use crate::cluster::{ClusterResourceRef, ExecOutput, LogOptions, ResourceKind};
use crate::output::{truncate_lines, LogStream, LogStreamSettings, ToolOutput};
use crate::templates::{build_pod, PodTemplate};
use crate::tools::definitions::ToolId;
use crate::tools::validate::ValidatedArgs;
use crate::types::{Error, Result};
use crate::validation::validate_non_negative;

use super::{
    container_overrides, delete_options, describe_object, list_objects, namespace,
    namespace_filter, object_name, tail_lines, unrouted, HandlerContext,
};

pub(super) async fn handle(
    ctx: &HandlerContext<'_>,
    id: ToolId,
    args: &ValidatedArgs,
) -> Result<ToolOutput> {
    match id {
        ToolId::GetPods => {
            let ns = namespace_filter(args)?;
            list_objects(ctx, ResourceKind::Pod, ns, args).await
        }
        ToolId::DescribePod => {
            let target = pod_ref(args)?;
            describe_object(ctx, target, args).await
        }
        ToolId::CreatePod => create(ctx, args).await,
        ToolId::DeletePod => {
            let target = pod_ref(args)?;
            let opts = delete_options(args)?;
            ctx.cluster.delete(&target, &opts).await?;
            tracing::info!("Deleted {}", target);
            Ok(ToolOutput::text(format!("pod \"{}\" deleted", object_name(args)?)))
        }
        ToolId::GetPodLogs => logs(ctx, args).await,
        ToolId::ExecPodCommand => exec(ctx, args).await,
        _ => Err(unrouted(id, "pod")),
    }
}

fn pod_ref(args: &ValidatedArgs) -> Result<ClusterResourceRef> {
    Ok(ClusterResourceRef::namespaced(
        ResourceKind::Pod,
        namespace(args)?,
        object_name(args)?,
    ))
}

async fn create(ctx: &HandlerContext<'_>, args: &ValidatedArgs) -> Result<ToolOutput> {
    let name = object_name(args)?;
    let ns = namespace(args)?;
    let template: PodTemplate = args.parse("template")?;
    let pod = build_pod(name, ns, template, container_overrides(args))?;
    ctx.cluster.create(pod.into()).await?;
    tracing::info!("Created pod {}/{} from template {}", ns, name, template);
    Ok(ToolOutput::text(format!("pod/{} created", name)))
}

/// Non-follow calls return at most `output.max_log_lines` lines. Follow calls
/// return a stream capped the same way.
async fn logs(ctx: &HandlerContext<'_>, args: &ValidatedArgs) -> Result<ToolOutput> {
    let target = pod_ref(args)?;
    let tail_lines = tail_lines(args)?;
    let limit = args
        .opt_int("limit")
        .map(|n| validate_non_negative(n, "limit").map(|n| n as usize))
        .transpose()?;
    let max_lines = ctx.config.output.max_log_lines;
    let cap = limit.unwrap_or(max_lines).min(max_lines);

    let opts = LogOptions {
        container: args.opt_str("container").map(str::to_string),
        tail_lines,
        previous: args.flag("previous"),
        timestamps: args.flag("timestamps"),
        follow: args.flag("follow"),
    };

    if opts.follow {
        tracing::debug!("Following logs of {} (limit {})", target, cap);
        let settings = LogStreamSettings::from_config(&ctx.config.logs, Some(cap));
        return Ok(ToolOutput::Stream(LogStream::follow(
            ctx.cluster.clone(),
            target,
            opts,
            settings,
        )));
    }

    let text = ctx.cluster.logs(&target, &opts).await?;
    Ok(ToolOutput::Text(truncate_lines(&text, cap)))
}

async fn exec(ctx: &HandlerContext<'_>, args: &ValidatedArgs) -> Result<ToolOutput> {
    let target = pod_ref(args)?;
    let command = args.opt_string_list("command").unwrap_or_default();
    if command.is_empty() || command[0].trim().is_empty() {
        return Err(Error::invalid_argument("command", "must not be empty"));
    }
    let container = args.opt_str("container").map(str::to_string);

    tracing::info!("Executing {:?} in {}", command, target);
    let output = ctx.cluster.exec(&target, container, command).await?;
    Ok(ToolOutput::Text(render_exec(&output)))
}

/// stdout, then stderr under a marker, then the failure message when the
/// command exited unsuccessfully.
fn render_exec(output: &ExecOutput) -> String {
    let mut text = output.stdout.clone();
    if !output.stderr.is_empty() {
        push_section(&mut text, &format!("[stderr]\n{}", output.stderr));
    }
    if !output.success {
        let message = output.message.as_deref().unwrap_or("command failed");
        push_section(&mut text, &format!("[exit: {}]", message));
    }
    text
}

fn push_section(text: &mut String, body: &str) {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(body);
}
