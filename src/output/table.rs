//! Column layouts for table and wide output.

use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{
    Container, Endpoints, Namespace, Node, Pod, PodTemplateSpec, ResourceQuota, Service,
};
use k8s_openapi::api::networking::v1::Ingress;
use std::collections::BTreeMap;

use super::human_age;
use crate::cluster::{ClusterObject, ResourceKind};

const NONE: &str = "<none>";
const COLUMN_GAP: usize = 3;
const MAX_ENDPOINTS_SHOWN: usize = 3;

pub(super) fn render(
    kind: ResourceKind,
    objects: &[ClusterObject],
    wide: bool,
    all_namespaces: bool,
    now: DateTime<Utc>,
) -> String {
    let mut headers: Vec<&str> = Vec::new();
    if all_namespaces {
        headers.push("NAMESPACE");
    }
    headers.extend(columns(kind, wide));

    let rows: Vec<Vec<String>> = objects
        .iter()
        .map(|object| {
            let mut row = Vec::with_capacity(headers.len());
            if all_namespaces {
                row.push(object.namespace().unwrap_or("").to_string());
            }
            row.extend(cells(object, wide, now));
            row
        })
        .collect();

    align(&headers, &rows)
}

fn columns(kind: ResourceKind, wide: bool) -> Vec<&'static str> {
    let (base, extra): (&[&str], &[&str]) = match kind {
        ResourceKind::Pod => (
            &["NAME", "READY", "STATUS", "RESTARTS", "AGE"],
            &["IP", "NODE"],
        ),
        ResourceKind::Deployment => (
            &["NAME", "READY", "UP-TO-DATE", "AVAILABLE", "AGE"],
            &["CONTAINERS", "IMAGES", "SELECTOR"],
        ),
        ResourceKind::Service => (
            &["NAME", "TYPE", "CLUSTER-IP", "EXTERNAL-IP", "PORT(S)", "AGE"],
            &["SELECTOR"],
        ),
        ResourceKind::Namespace => (&["NAME", "STATUS", "AGE"], &[]),
        ResourceKind::Node => (
            &["NAME", "STATUS", "ROLES", "AGE", "VERSION"],
            &["INTERNAL-IP", "OS-IMAGE", "KERNEL-VERSION", "CONTAINER-RUNTIME"],
        ),
        ResourceKind::Endpoints => (&["NAME", "ENDPOINTS", "AGE"], &[]),
        ResourceKind::ResourceQuota => (&["NAME", "AGE", "REQUEST", "LIMIT"], &[]),
        ResourceKind::Job => (
            &["NAME", "STATUS", "COMPLETIONS", "DURATION", "AGE"],
            &["CONTAINERS", "IMAGES", "SELECTOR"],
        ),
        ResourceKind::CronJob => (
            &["NAME", "SCHEDULE", "SUSPEND", "ACTIVE", "LAST SCHEDULE", "AGE"],
            &["CONTAINERS", "IMAGES"],
        ),
        ResourceKind::Ingress => (&["NAME", "CLASS", "HOSTS", "ADDRESS", "PORTS", "AGE"], &[]),
        ResourceKind::ConfigMap => (&["NAME", "DATA", "AGE"], &[]),
    };
    let mut cols = base.to_vec();
    if wide {
        cols.extend_from_slice(extra);
    }
    cols
}

fn cells(object: &ClusterObject, wide: bool, now: DateTime<Utc>) -> Vec<String> {
    let age = human_age(object.creation_timestamp().map(|t| t.0), now);
    let name = object.name().to_string();
    match object {
        ClusterObject::Pod(pod) => {
            let mut row = vec![
                name,
                pod_ready(pod),
                pod_status(pod),
                pod_restarts(pod).to_string(),
                age,
            ];
            if wide {
                let status = pod.status.as_ref();
                row.push(or_none(status.and_then(|s| s.pod_ip.clone())));
                row.push(or_none(pod.spec.as_ref().and_then(|s| s.node_name.clone())));
            }
            row
        }
        ClusterObject::Deployment(deploy) => {
            let status = deploy.status.as_ref();
            let mut row = vec![
                name,
                deployment_ready(deploy),
                status
                    .and_then(|s| s.updated_replicas)
                    .unwrap_or(0)
                    .to_string(),
                status
                    .and_then(|s| s.available_replicas)
                    .unwrap_or(0)
                    .to_string(),
                age,
            ];
            if wide {
                push_template_columns(&mut row, deploy.spec.as_ref().map(|s| &s.template));
                row.push(selector_string(
                    deploy
                        .spec
                        .as_ref()
                        .and_then(|s| s.selector.match_labels.as_ref()),
                ));
            }
            row
        }
        ClusterObject::Service(svc) => {
            let spec = svc.spec.as_ref();
            let mut row = vec![
                name,
                service_type(svc).to_string(),
                or_none(spec.and_then(|s| s.cluster_ip.clone())),
                service_external_ip(svc),
                service_ports(svc),
                age,
            ];
            if wide {
                row.push(selector_string(spec.and_then(|s| s.selector.as_ref())));
            }
            row
        }
        ClusterObject::Namespace(ns) => vec![name, namespace_phase(ns), age],
        ClusterObject::Node(node) => {
            let info = node.status.as_ref().and_then(|s| s.node_info.as_ref());
            let mut row = vec![
                name,
                node_status(node),
                node_roles(node),
                age,
                info.map(|i| i.kubelet_version.clone())
                    .unwrap_or_default(),
            ];
            if wide {
                row.push(node_address(node, "InternalIP"));
                row.push(or_none(info.map(|i| i.os_image.clone())));
                row.push(or_none(info.map(|i| i.kernel_version.clone())));
                row.push(or_none(info.map(|i| i.container_runtime_version.clone())));
            }
            row
        }
        ClusterObject::Endpoints(ep) => vec![name, endpoint_addresses(ep), age],
        ClusterObject::ResourceQuota(quota) => {
            let (request, limit) = quota_usage(quota);
            vec![name, age, request, limit]
        }
        ClusterObject::Job(job) => {
            let spec = job.spec.as_ref();
            let mut row = vec![
                name,
                job_status(job).to_string(),
                job_completions(job),
                job_duration(job, now),
                age,
            ];
            if wide {
                push_template_columns(&mut row, spec.map(|s| &s.template));
                row.push(selector_string(
                    spec.and_then(|s| s.selector.as_ref())
                        .and_then(|s| s.match_labels.as_ref()),
                ));
            }
            row
        }
        ClusterObject::CronJob(cron) => {
            let spec = cron.spec.as_ref();
            let status = cron.status.as_ref();
            let mut row = vec![
                name,
                spec.map(|s| s.schedule.clone()).unwrap_or_default(),
                cronjob_suspended(cron).to_string(),
                status
                    .and_then(|s| s.active.as_ref())
                    .map_or(0, Vec::len)
                    .to_string(),
                match status.and_then(|s| s.last_schedule_time.as_ref()) {
                    Some(t) => human_age(Some(t.0), now),
                    None => NONE.to_string(),
                },
                age,
            ];
            if wide {
                push_template_columns(
                    &mut row,
                    spec.and_then(|s| s.job_template.spec.as_ref())
                        .map(|s| &s.template),
                );
            }
            row
        }
        ClusterObject::Ingress(ing) => vec![
            name,
            or_none(ing.spec.as_ref().and_then(|s| s.ingress_class_name.clone())),
            ingress_hosts(ing),
            ingress_address(ing),
            ingress_ports(ing).to_string(),
            age,
        ],
        ClusterObject::ConfigMap(cm) => {
            let keys = cm.data.as_ref().map_or(0, BTreeMap::len)
                + cm.binary_data.as_ref().map_or(0, BTreeMap::len);
            vec![name, keys.to_string(), age]
        }
    }
}

fn push_template_columns(row: &mut Vec<String>, template: Option<&PodTemplateSpec>) {
    let containers = template_containers(template);
    row.push(join_or_none(containers.iter().map(|c| c.name.clone())));
    row.push(join_or_none(
        containers.iter().filter_map(|c| c.image.clone()),
    ));
}

fn align(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let format_line = |cells: Vec<&str>| -> String {
        let mut line = String::new();
        for (i, cell) in cells.iter().enumerate() {
            line.push_str(cell);
            if i + 1 < cells.len() {
                let pad = widths[i] - cell.chars().count() + COLUMN_GAP;
                line.extend(std::iter::repeat(' ').take(pad));
            }
        }
        line.trim_end().to_string()
    };

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(format_line(headers.to_vec()));
    for row in rows {
        lines.push(format_line(row.iter().map(String::as_str).collect()));
    }
    lines.join("\n")
}

// =============================================================================
// Cell helpers (shared with describe)
// =============================================================================

pub(super) fn or_none(value: Option<String>) -> String {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => NONE.to_string(),
    }
}

fn join_or_none(values: impl Iterator<Item = String>) -> String {
    let joined: Vec<String> = values.collect();
    if joined.is_empty() {
        NONE.to_string()
    } else {
        joined.join(",")
    }
}

pub(super) fn selector_string(selector: Option<&BTreeMap<String, String>>) -> String {
    match selector {
        Some(map) if !map.is_empty() => map
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(","),
        _ => NONE.to_string(),
    }
}

pub(super) fn pod_ready(pod: &Pod) -> String {
    let total = pod.spec.as_ref().map_or(0, |s| s.containers.len());
    let ready = pod
        .status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .map_or(0, |cs| cs.iter().filter(|c| c.ready).count());
    format!("{}/{}", ready, total)
}

pub(super) fn pod_restarts(pod: &Pod) -> i32 {
    pod.status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .map_or(0, |cs| cs.iter().map(|c| c.restart_count).sum())
}

/// Pod status as shown by `kubectl get pods`.
pub(super) fn pod_status(pod: &Pod) -> String {
    if pod.metadata.deletion_timestamp.is_some() {
        return "Terminating".to_string();
    }
    let status = pod.status.as_ref();
    let mut reason = status
        .and_then(|s| s.reason.clone())
        .or_else(|| status.and_then(|s| s.phase.clone()))
        .unwrap_or_else(|| "Unknown".to_string());

    let statuses = status
        .and_then(|s| s.container_statuses.as_ref())
        .map(Vec::as_slice)
        .unwrap_or_default();
    for cs in statuses.iter().rev() {
        let state = cs.state.as_ref();
        if let Some(r) = state
            .and_then(|s| s.waiting.as_ref())
            .and_then(|w| w.reason.clone())
        {
            reason = r;
        } else if let Some(t) = state.and_then(|s| s.terminated.as_ref()) {
            reason = t
                .reason
                .clone()
                .unwrap_or_else(|| format!("ExitCode:{}", t.exit_code));
        }
    }
    reason
}

pub(super) fn deployment_ready(deploy: &Deployment) -> String {
    let desired = deploy.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let ready = deploy
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);
    format!("{}/{}", ready, desired)
}

pub(super) fn service_type(svc: &Service) -> &str {
    svc.spec
        .as_ref()
        .and_then(|s| s.type_.as_deref())
        .unwrap_or("ClusterIP")
}

pub(super) fn service_external_ip(svc: &Service) -> String {
    let spec = svc.spec.as_ref();
    if service_type(svc) == "ExternalName" {
        return or_none(spec.and_then(|s| s.external_name.clone()));
    }
    let mut ips: Vec<String> = spec
        .and_then(|s| s.external_ips.clone())
        .unwrap_or_default();
    let ingress = svc
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref());
    if let Some(ingress) = ingress {
        ips.extend(
            ingress
                .iter()
                .filter_map(|i| i.ip.clone().or_else(|| i.hostname.clone())),
        );
    }
    if ips.is_empty() {
        if service_type(svc) == "LoadBalancer" {
            "<pending>".to_string()
        } else {
            NONE.to_string()
        }
    } else {
        ips.join(",")
    }
}

pub(super) fn service_ports(svc: &Service) -> String {
    let ports = svc
        .spec
        .as_ref()
        .and_then(|s| s.ports.as_ref())
        .map(Vec::as_slice)
        .unwrap_or_default();
    join_or_none(ports.iter().map(|p| {
        let protocol = p.protocol.as_deref().unwrap_or("TCP");
        match p.node_port {
            Some(np) => format!("{}:{}/{}", p.port, np, protocol),
            None => format!("{}/{}", p.port, protocol),
        }
    }))
}

pub(super) fn namespace_phase(ns: &Namespace) -> String {
    ns.status
        .as_ref()
        .and_then(|s| s.phase.clone())
        .unwrap_or_else(|| "Unknown".to_string())
}

pub(super) fn node_status(node: &Node) -> String {
    let ready = node
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|cs| cs.iter().find(|c| c.type_ == "Ready"))
        .map(|c| c.status.as_str());
    let mut status = match ready {
        Some("True") => "Ready".to_string(),
        Some(_) => "NotReady".to_string(),
        None => "Unknown".to_string(),
    };
    if node
        .spec
        .as_ref()
        .and_then(|s| s.unschedulable)
        .unwrap_or(false)
    {
        status.push_str(",SchedulingDisabled");
    }
    status
}

pub(super) fn node_roles(node: &Node) -> String {
    const ROLE_PREFIX: &str = "node-role.kubernetes.io/";
    let roles = node
        .metadata
        .labels
        .as_ref()
        .map(|labels| {
            labels
                .keys()
                .filter_map(|k| k.strip_prefix(ROLE_PREFIX))
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    join_or_none(roles.into_iter())
}

pub(super) fn node_address(node: &Node, address_type: &str) -> String {
    or_none(
        node.status
            .as_ref()
            .and_then(|s| s.addresses.as_ref())
            .and_then(|a| a.iter().find(|a| a.type_ == address_type))
            .map(|a| a.address.clone()),
    )
}

pub(super) fn endpoint_addresses(ep: &Endpoints) -> String {
    let mut all = Vec::new();
    for subset in ep.subsets.as_deref().unwrap_or_default() {
        let addresses = subset.addresses.as_deref().unwrap_or_default();
        let ports = subset.ports.as_deref().unwrap_or_default();
        for addr in addresses {
            if ports.is_empty() {
                all.push(addr.ip.clone());
            }
            for port in ports {
                all.push(format!("{}:{}", addr.ip, port.port));
            }
        }
    }
    if all.is_empty() {
        return NONE.to_string();
    }
    if all.len() > MAX_ENDPOINTS_SHOWN {
        let more = all.len() - MAX_ENDPOINTS_SHOWN;
        all.truncate(MAX_ENDPOINTS_SHOWN);
        return format!("{} + {} more...", all.join(","), more);
    }
    all.join(",")
}

pub(super) fn template_containers(template: Option<&PodTemplateSpec>) -> &[Container] {
    template
        .and_then(|t| t.spec.as_ref())
        .map(|s| s.containers.as_slice())
        .unwrap_or_default()
}

/// Terminal condition of a job, or whether it is still running.
pub(super) fn job_status(job: &Job) -> &'static str {
    let finished = job
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_deref())
        .unwrap_or_default()
        .iter()
        .filter(|c| c.status == "True")
        .find_map(|c| match c.type_.as_str() {
            "Complete" => Some("Complete"),
            "Failed" => Some("Failed"),
            _ => None,
        });
    match finished {
        Some(status) => status,
        None if job.spec.as_ref().and_then(|s| s.suspend).unwrap_or(false) => "Suspended",
        None => "Running",
    }
}

pub(super) fn job_completions(job: &Job) -> String {
    let succeeded = job.status.as_ref().and_then(|s| s.succeeded).unwrap_or(0);
    let wanted = job.spec.as_ref().and_then(|s| s.completions).unwrap_or(1);
    format!("{}/{}", succeeded, wanted)
}

/// Run time so far, or until completion. Empty before the job starts.
pub(super) fn job_duration(job: &Job, now: DateTime<Utc>) -> String {
    let status = job.status.as_ref();
    match status.and_then(|s| s.start_time.as_ref()) {
        Some(start) => {
            let end = status
                .and_then(|s| s.completion_time.as_ref())
                .map_or(now, |t| t.0);
            human_age(Some(start.0), end)
        }
        None => String::new(),
    }
}

pub(super) fn cronjob_suspended(cron: &CronJob) -> &'static str {
    if cron.spec.as_ref().and_then(|s| s.suspend).unwrap_or(false) {
        "True"
    } else {
        "False"
    }
}

pub(super) fn ingress_hosts(ing: &Ingress) -> String {
    let hosts: Vec<String> = ing
        .spec
        .as_ref()
        .and_then(|s| s.rules.as_deref())
        .unwrap_or_default()
        .iter()
        .filter_map(|r| r.host.clone())
        .collect();
    if hosts.is_empty() {
        "*".to_string()
    } else {
        hosts.join(",")
    }
}

pub(super) fn ingress_address(ing: &Ingress) -> String {
    let addresses = ing
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .map(|ingress| {
            ingress
                .iter()
                .filter_map(|i| i.ip.clone().or_else(|| i.hostname.clone()))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    join_or_none(addresses.into_iter())
}

pub(super) fn ingress_ports(ing: &Ingress) -> &'static str {
    let has_tls = ing
        .spec
        .as_ref()
        .and_then(|s| s.tls.as_ref())
        .is_some_and(|tls| !tls.is_empty());
    if has_tls {
        "80, 443"
    } else {
        "80"
    }
}

/// `(REQUEST, LIMIT)` cells: `key: used/hard` pairs split on the `limits.` prefix.
pub(super) fn quota_usage(quota: &ResourceQuota) -> (String, String) {
    let status = quota.status.as_ref();
    let hard = status
        .and_then(|s| s.hard.as_ref())
        .or_else(|| quota.spec.as_ref().and_then(|s| s.hard.as_ref()));
    let used = status.and_then(|s| s.used.as_ref());

    let mut requests = Vec::new();
    let mut limits = Vec::new();
    for (key, hard_value) in hard.into_iter().flatten() {
        let used_value = used
            .and_then(|u| u.get(key))
            .map_or("0", |q| q.0.as_str());
        let entry = format!("{}: {}/{}", key, used_value, hard_value.0);
        if key.starts_with("limits.") {
            limits.push(entry);
        } else {
            requests.push(entry);
        }
    }
    (requests.join(", "), limits.join(", "))
}
