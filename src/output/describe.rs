//! Describe text for single objects.

use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, Endpoints, Namespace, Node, Pod, PodTemplateSpec, ResourceQuota,
    Service,
};
use k8s_openapi::api::networking::v1::{Ingress, IngressBackend};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;
use std::fmt::Write;

use super::human_age;
use super::table::{
    cronjob_suspended, deployment_ready, ingress_address, job_completions, job_duration,
    job_status, namespace_phase, node_roles, node_status, or_none, pod_restarts, pod_status,
    selector_string, service_external_ip, service_type, template_containers,
};
use crate::cluster::ClusterObject;

const KEY_WIDTH: usize = 20;

pub(super) fn render(object: &ClusterObject, now: DateTime<Utc>) -> String {
    let mut d = Describer::default();
    match object {
        ClusterObject::Pod(pod) => describe_pod(&mut d, pod, now),
        ClusterObject::Deployment(deploy) => describe_deployment(&mut d, deploy, now),
        ClusterObject::Service(svc) => describe_service(&mut d, svc),
        ClusterObject::Namespace(ns) => describe_namespace(&mut d, ns),
        ClusterObject::Node(node) => describe_node(&mut d, node, now),
        ClusterObject::Endpoints(ep) => describe_endpoints(&mut d, ep),
        ClusterObject::ResourceQuota(quota) => describe_quota(&mut d, quota),
        ClusterObject::Job(job) => describe_job(&mut d, job, now),
        ClusterObject::CronJob(cron) => describe_cronjob(&mut d, cron, now),
        ClusterObject::Ingress(ing) => describe_ingress(&mut d, ing),
        ClusterObject::ConfigMap(cm) => describe_configmap(&mut d, cm),
    }
    d.finish()
}

#[derive(Default)]
struct Describer {
    out: String,
}

impl Describer {
    fn field(&mut self, key: &str, value: impl AsRef<str>) {
        self.indented(0, key, value);
    }

    fn indented(&mut self, indent: usize, key: &str, value: impl AsRef<str>) {
        let label = format!("{}{}:", " ".repeat(indent), key);
        let width = KEY_WIDTH.max(label.len() + 1);
        let _ = writeln!(self.out, "{:<width$}{}", label, value.as_ref(), width = width);
    }

    fn heading(&mut self, indent: usize, title: &str) {
        let _ = writeln!(self.out, "{}{}:", " ".repeat(indent), title);
    }

    fn line(&mut self, indent: usize, text: impl AsRef<str>) {
        let _ = writeln!(self.out, "{}{}", " ".repeat(indent), text.as_ref());
    }

    /// Multi-line `k=v` block, aligned under the first value.
    fn map(&mut self, key: &str, map: Option<&BTreeMap<String, String>>) {
        match map {
            Some(m) if !m.is_empty() => {
                let mut first = true;
                for (k, v) in m {
                    if first {
                        self.field(key, format!("{}={}", k, v));
                        first = false;
                    } else {
                        self.line(KEY_WIDTH, format!("{}={}", k, v));
                    }
                }
            }
            _ => self.field(key, "<none>"),
        }
    }

    fn metadata(&mut self, meta: &ObjectMeta, namespaced: bool) {
        self.field("Name", meta.name.as_deref().unwrap_or(""));
        if namespaced {
            self.field("Namespace", meta.namespace.as_deref().unwrap_or(""));
        }
        self.map("Labels", meta.labels.as_ref());
        self.map("Annotations", meta.annotations.as_ref());
    }

    fn finish(self) -> String {
        self.out.trim_end().to_string()
    }
}

fn timestamp(t: Option<&Time>, now: DateTime<Utc>) -> String {
    match t {
        Some(t) => format!(
            "{} ({} ago)",
            t.0.format("%a, %d %b %Y %H:%M:%S %z"),
            human_age(Some(t.0), now)
        ),
        None => "<unknown>".to_string(),
    }
}

fn int_or_string(v: &IntOrString) -> String {
    match v {
        IntOrString::Int(i) => i.to_string(),
        IntOrString::String(s) => s.clone(),
    }
}

fn containers(d: &mut Describer, indent: usize, containers: &[Container]) {
    d.heading(indent, "Containers");
    for c in containers {
        d.heading(indent + 2, &c.name);
        d.indented(indent + 4, "Image", c.image.as_deref().unwrap_or(""));
        let ports: Vec<String> = c
            .ports
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|p| {
                format!(
                    "{}/{}",
                    p.container_port,
                    p.protocol.as_deref().unwrap_or("TCP")
                )
            })
            .collect();
        d.indented(
            indent + 4,
            "Port",
            if ports.is_empty() {
                "<none>".to_string()
            } else {
                ports.join(", ")
            },
        );
        if let Some(cmd) = &c.command {
            d.indented(indent + 4, "Command", cmd.join(" "));
        }
        if let Some(args) = &c.args {
            d.indented(indent + 4, "Args", args.join(" "));
        }
        if let Some(res) = &c.resources {
            for (title, values) in [("Requests", &res.requests), ("Limits", &res.limits)] {
                if let Some(values) = values {
                    d.heading(indent + 4, title);
                    for (k, q) in values {
                        d.indented(indent + 6, k, &q.0);
                    }
                }
            }
        }
        let env = c.env.as_deref().unwrap_or_default();
        if env.is_empty() {
            d.indented(indent + 4, "Environment", "<none>");
        } else {
            d.heading(indent + 4, "Environment");
            for e in env {
                let value = match (&e.value, &e.value_from) {
                    (Some(v), _) => v.clone(),
                    (None, Some(_)) => "<set from reference>".to_string(),
                    (None, None) => String::new(),
                };
                d.indented(indent + 6, &e.name, value);
            }
        }
    }
}

fn describe_pod(d: &mut Describer, pod: &Pod, now: DateTime<Utc>) {
    d.metadata(&pod.metadata, true);
    let spec = pod.spec.as_ref();
    let status = pod.status.as_ref();
    d.field(
        "Node",
        or_none(spec.and_then(|s| s.node_name.clone())),
    );
    d.field(
        "Start Time",
        timestamp(status.and_then(|s| s.start_time.as_ref()), now),
    );
    d.field("Status", pod_status(pod));
    d.field("IP", or_none(status.and_then(|s| s.pod_ip.clone())));
    if let Some(owner) = pod
        .metadata
        .owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find(|o| o.controller == Some(true))
    {
        d.field("Controlled By", format!("{}/{}", owner.kind, owner.name));
    }
    d.field("Restarts", pod_restarts(pod).to_string());
    if let Some(spec) = spec {
        containers(d, 0, &spec.containers);
    }
    let conditions = status
        .and_then(|s| s.conditions.as_deref())
        .unwrap_or_default();
    if !conditions.is_empty() {
        d.heading(0, "Conditions");
        for c in conditions {
            d.indented(2, &c.type_, &c.status);
        }
    }
    let volumes = spec.and_then(|s| s.volumes.as_deref()).unwrap_or_default();
    if !volumes.is_empty() {
        d.heading(0, "Volumes");
        for v in volumes {
            let kind = if v.empty_dir.is_some() {
                "EmptyDir"
            } else if v.config_map.is_some() {
                "ConfigMap"
            } else if v.secret.is_some() {
                "Secret"
            } else if v.persistent_volume_claim.is_some() {
                "PersistentVolumeClaim"
            } else if v.projected.is_some() {
                "Projected"
            } else {
                "Other"
            };
            d.indented(2, &v.name, kind);
        }
    }
}

fn describe_deployment(d: &mut Describer, deploy: &Deployment, now: DateTime<Utc>) {
    d.metadata(&deploy.metadata, true);
    d.field(
        "CreationTimestamp",
        timestamp(deploy.metadata.creation_timestamp.as_ref(), now),
    );
    let spec = deploy.spec.as_ref();
    let status = deploy.status.as_ref();
    d.field(
        "Selector",
        selector_string(spec.and_then(|s| s.selector.match_labels.as_ref())),
    );
    let count = |f: fn(&k8s_openapi::api::apps::v1::DeploymentStatus) -> Option<i32>| {
        status.and_then(f).unwrap_or(0)
    };
    d.field(
        "Replicas",
        format!(
            "{} desired | {} updated | {} total | {} available | {} unavailable",
            spec.and_then(|s| s.replicas).unwrap_or(1),
            count(|s| s.updated_replicas),
            count(|s| s.replicas),
            count(|s| s.available_replicas),
            count(|s| s.unavailable_replicas),
        ),
    );
    d.field("Ready", deployment_ready(deploy));
    d.field(
        "StrategyType",
        spec.and_then(|s| s.strategy.as_ref())
            .and_then(|s| s.type_.clone())
            .unwrap_or_else(|| "RollingUpdate".to_string()),
    );
    if spec.and_then(|s| s.paused).unwrap_or(false) {
        d.field("Paused", "true");
    }
    if let Some(spec) = spec {
        d.heading(0, "Pod Template");
        let labels = spec
            .template
            .metadata
            .as_ref()
            .and_then(|m| m.labels.as_ref());
        d.indented(2, "Labels", selector_string(labels));
        if let Some(pod_spec) = &spec.template.spec {
            containers(d, 2, &pod_spec.containers);
        }
    }
    let conditions = status
        .and_then(|s| s.conditions.as_deref())
        .unwrap_or_default();
    if !conditions.is_empty() {
        d.heading(0, "Conditions");
        for c in conditions {
            d.indented(
                2,
                &c.type_,
                format!("{} ({})", c.status, c.reason.as_deref().unwrap_or("")),
            );
        }
    }
}

fn describe_service(d: &mut Describer, svc: &Service) {
    d.metadata(&svc.metadata, true);
    let spec = svc.spec.as_ref();
    d.field("Selector", selector_string(spec.and_then(|s| s.selector.as_ref())));
    d.field("Type", service_type(svc));
    d.field("IP", or_none(spec.and_then(|s| s.cluster_ip.clone())));
    d.field("External IP", service_external_ip(svc));
    for p in spec.and_then(|s| s.ports.as_deref()).unwrap_or_default() {
        let name = p.name.as_deref().unwrap_or("<unset>");
        let protocol = p.protocol.as_deref().unwrap_or("TCP");
        d.field("Port", format!("{}  {}/{}", name, p.port, protocol));
        d.field(
            "TargetPort",
            format!(
                "{}/{}",
                p.target_port
                    .as_ref()
                    .map_or_else(|| p.port.to_string(), int_or_string),
                protocol
            ),
        );
        if let Some(np) = p.node_port {
            d.field("NodePort", format!("{}  {}/{}", name, np, protocol));
        }
    }
    d.field(
        "Session Affinity",
        spec.and_then(|s| s.session_affinity.clone())
            .unwrap_or_else(|| "None".to_string()),
    );
}

fn describe_namespace(d: &mut Describer, ns: &Namespace) {
    d.metadata(&ns.metadata, false);
    d.field("Status", namespace_phase(ns));
}

fn describe_node(d: &mut Describer, node: &Node, now: DateTime<Utc>) {
    d.field("Name", node.metadata.name.as_deref().unwrap_or(""));
    d.field("Roles", node_roles(node));
    d.map("Labels", node.metadata.labels.as_ref());
    d.map("Annotations", node.metadata.annotations.as_ref());
    d.field(
        "CreationTimestamp",
        timestamp(node.metadata.creation_timestamp.as_ref(), now),
    );
    let spec = node.spec.as_ref();
    let taints: Vec<String> = spec
        .and_then(|s| s.taints.as_deref())
        .unwrap_or_default()
        .iter()
        .map(|t| match &t.value {
            Some(v) => format!("{}={}:{}", t.key, v, t.effect),
            None => format!("{}:{}", t.key, t.effect),
        })
        .collect();
    d.field(
        "Taints",
        if taints.is_empty() {
            "<none>".to_string()
        } else {
            taints.join(", ")
        },
    );
    d.field(
        "Unschedulable",
        spec.and_then(|s| s.unschedulable).unwrap_or(false).to_string(),
    );
    d.field("Status", node_status(node));

    let status = node.status.as_ref();
    let conditions = status
        .and_then(|s| s.conditions.as_deref())
        .unwrap_or_default();
    if !conditions.is_empty() {
        d.heading(0, "Conditions");
        for c in conditions {
            d.indented(
                2,
                &c.type_,
                format!("{} ({})", c.status, c.reason.as_deref().unwrap_or("")),
            );
        }
    }
    let addresses = status
        .and_then(|s| s.addresses.as_deref())
        .unwrap_or_default();
    if !addresses.is_empty() {
        d.heading(0, "Addresses");
        for a in addresses {
            d.indented(2, &a.type_, &a.address);
        }
    }
    for (title, values) in [
        ("Capacity", status.and_then(|s| s.capacity.as_ref())),
        ("Allocatable", status.and_then(|s| s.allocatable.as_ref())),
    ] {
        if let Some(values) = values {
            d.heading(0, title);
            for (k, q) in values {
                d.indented(2, k, &q.0);
            }
        }
    }
    if let Some(info) = status.and_then(|s| s.node_info.as_ref()) {
        d.heading(0, "System Info");
        d.indented(2, "Kernel Version", &info.kernel_version);
        d.indented(2, "OS Image", &info.os_image);
        d.indented(2, "Operating System", &info.operating_system);
        d.indented(2, "Architecture", &info.architecture);
        d.indented(2, "Container Runtime", &info.container_runtime_version);
        d.indented(2, "Kubelet Version", &info.kubelet_version);
    }
}

fn describe_endpoints(d: &mut Describer, ep: &Endpoints) {
    d.metadata(&ep.metadata, true);
    let subsets = ep.subsets.as_deref().unwrap_or_default();
    if subsets.is_empty() {
        d.field("Subsets", "<none>");
        return;
    }
    d.heading(0, "Subsets");
    for subset in subsets {
        let ips = |addrs: Option<&[k8s_openapi::api::core::v1::EndpointAddress]>| {
            let ips: Vec<&str> = addrs
                .unwrap_or_default()
                .iter()
                .map(|a| a.ip.as_str())
                .collect();
            if ips.is_empty() {
                "<none>".to_string()
            } else {
                ips.join(",")
            }
        };
        d.indented(2, "Addresses", ips(subset.addresses.as_deref()));
        d.indented(
            2,
            "NotReadyAddresses",
            ips(subset.not_ready_addresses.as_deref()),
        );
        d.heading(2, "Ports");
        for p in subset.ports.as_deref().unwrap_or_default() {
            d.line(
                4,
                format!(
                    "{}  {}/{}",
                    p.name.as_deref().unwrap_or("<unset>"),
                    p.port,
                    p.protocol.as_deref().unwrap_or("TCP")
                ),
            );
        }
    }
}

fn describe_quota(d: &mut Describer, quota: &ResourceQuota) {
    d.metadata(&quota.metadata, true);
    let status = quota.status.as_ref();
    let hard = status
        .and_then(|s| s.hard.as_ref())
        .or_else(|| quota.spec.as_ref().and_then(|s| s.hard.as_ref()));
    let used = status.and_then(|s| s.used.as_ref());
    d.line(0, format!("{:<30}{:<12}{}", "Resource", "Used", "Hard"));
    d.line(0, format!("{:<30}{:<12}{}", "--------", "----", "----"));
    for (key, hard_value) in hard.into_iter().flatten() {
        let used_value = used.and_then(|u| u.get(key)).map_or("0", |q| q.0.as_str());
        d.line(0, format!("{:<30}{:<12}{}", key, used_value, hard_value.0));
    }
}

fn pod_template(d: &mut Describer, indent: usize, template: Option<&PodTemplateSpec>) {
    d.heading(indent, "Pod Template");
    let labels = template
        .and_then(|t| t.metadata.as_ref())
        .and_then(|m| m.labels.as_ref());
    d.indented(indent + 2, "Labels", selector_string(labels));
    containers(d, indent + 2, template_containers(template));
}

fn describe_job(d: &mut Describer, job: &Job, now: DateTime<Utc>) {
    d.metadata(&job.metadata, true);
    let spec = job.spec.as_ref();
    let status = job.status.as_ref();
    d.field(
        "Selector",
        selector_string(
            spec.and_then(|s| s.selector.as_ref())
                .and_then(|s| s.match_labels.as_ref()),
        ),
    );
    d.field(
        "Parallelism",
        spec.and_then(|s| s.parallelism).unwrap_or(1).to_string(),
    );
    d.field("Completions", job_completions(job));
    d.field(
        "Backoff Limit",
        spec.and_then(|s| s.backoff_limit).unwrap_or(6).to_string(),
    );
    d.field(
        "Start Time",
        timestamp(status.and_then(|s| s.start_time.as_ref()), now),
    );
    if let Some(done) = status.and_then(|s| s.completion_time.as_ref()) {
        d.field("Completed At", timestamp(Some(done), now));
    }
    let duration = job_duration(job, now);
    if !duration.is_empty() {
        d.field("Duration", duration);
    }
    d.field("Status", job_status(job));
    let count = |f: fn(&k8s_openapi::api::batch::v1::JobStatus) -> Option<i32>| {
        status.and_then(f).unwrap_or(0)
    };
    d.field(
        "Pods Statuses",
        format!(
            "{} Active / {} Succeeded / {} Failed",
            count(|s| s.active),
            count(|s| s.succeeded),
            count(|s| s.failed),
        ),
    );
    pod_template(d, 0, spec.map(|s| &s.template));
}

fn describe_cronjob(d: &mut Describer, cron: &CronJob, now: DateTime<Utc>) {
    d.metadata(&cron.metadata, true);
    let spec = cron.spec.as_ref();
    let status = cron.status.as_ref();
    d.field("Schedule", spec.map(|s| s.schedule.as_str()).unwrap_or(""));
    d.field(
        "Concurrency Policy",
        spec.and_then(|s| s.concurrency_policy.clone())
            .unwrap_or_else(|| "Allow".to_string()),
    );
    d.field("Suspend", cronjob_suspended(cron));
    d.field(
        "Successful Job History Limit",
        spec.and_then(|s| s.successful_jobs_history_limit)
            .unwrap_or(3)
            .to_string(),
    );
    d.field(
        "Failed Job History Limit",
        spec.and_then(|s| s.failed_jobs_history_limit)
            .unwrap_or(1)
            .to_string(),
    );
    d.field(
        "Last Schedule Time",
        timestamp(status.and_then(|s| s.last_schedule_time.as_ref()), now),
    );
    let active: Vec<String> = status
        .and_then(|s| s.active.as_deref())
        .unwrap_or_default()
        .iter()
        .filter_map(|r| r.name.clone())
        .collect();
    d.field(
        "Active Jobs",
        if active.is_empty() {
            "<none>".to_string()
        } else {
            active.join(", ")
        },
    );
    let job_spec = spec.and_then(|s| s.job_template.spec.as_ref());
    d.heading(0, "Job Template");
    d.indented(
        2,
        "Completions",
        job_spec.and_then(|s| s.completions).unwrap_or(1).to_string(),
    );
    d.indented(
        2,
        "Parallelism",
        job_spec.and_then(|s| s.parallelism).unwrap_or(1).to_string(),
    );
    pod_template(d, 2, job_spec.map(|s| &s.template));
}

fn backend_string(backend: &IngressBackend) -> String {
    match &backend.service {
        Some(svc) => {
            let port = svc.port.as_ref().map_or_else(String::new, |p| {
                p.name
                    .clone()
                    .or_else(|| p.number.map(|n| n.to_string()))
                    .unwrap_or_default()
            });
            format!("{}:{}", svc.name, port)
        }
        None => backend
            .resource
            .as_ref()
            .map_or_else(|| "<none>".to_string(), |r| format!("{}/{}", r.kind, r.name)),
    }
}

fn describe_ingress(d: &mut Describer, ing: &Ingress) {
    d.metadata(&ing.metadata, true);
    let spec = ing.spec.as_ref();
    d.field(
        "Ingress Class",
        or_none(spec.and_then(|s| s.ingress_class_name.clone())),
    );
    d.field("Address", ingress_address(ing));
    d.field(
        "Default backend",
        spec.and_then(|s| s.default_backend.as_ref())
            .map_or_else(|| "<default>".to_string(), backend_string),
    );
    let tls = spec.and_then(|s| s.tls.as_deref()).unwrap_or_default();
    if tls.is_empty() {
        d.field("TLS", "<none>");
    } else {
        d.heading(0, "TLS");
        for t in tls {
            d.line(
                2,
                format!(
                    "{} terminates {}",
                    t.secret_name.as_deref().unwrap_or("<default>"),
                    t.hosts.as_deref().unwrap_or_default().join(",")
                ),
            );
        }
    }
    d.heading(0, "Rules");
    d.line(2, format!("{:<20}{:<20}{}", "Host", "Path", "Backends"));
    d.line(2, format!("{:<20}{:<20}{}", "----", "----", "--------"));
    for rule in spec.and_then(|s| s.rules.as_deref()).unwrap_or_default() {
        let host = rule.host.as_deref().unwrap_or("*");
        let paths = rule
            .http
            .as_ref()
            .map(|h| h.paths.as_slice())
            .unwrap_or_default();
        if paths.is_empty() {
            d.line(2, host);
        }
        for path in paths {
            d.line(
                2,
                format!(
                    "{:<20}{:<20}{}",
                    host,
                    path.path.as_deref().unwrap_or("/"),
                    backend_string(&path.backend)
                ),
            );
        }
    }
}

fn describe_configmap(d: &mut Describer, cm: &ConfigMap) {
    d.metadata(&cm.metadata, true);
    d.line(0, "");
    d.line(0, "Data");
    d.line(0, "====");
    for (key, value) in cm.data.iter().flatten() {
        d.line(0, format!("{}:", key));
        d.line(0, "----");
        d.line(0, value.trim_end());
        d.line(0, "");
    }
    let binary = cm.binary_data.as_ref().map_or(0, BTreeMap::len);
    if binary > 0 {
        d.line(0, "BinaryData");
        d.line(0, "====");
        for (key, value) in cm.binary_data.iter().flatten() {
            d.line(0, format!("{}: {} bytes", key, value.0.len()));
        }
    }
}
