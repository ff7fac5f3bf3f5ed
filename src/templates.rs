//! Built-in object templates for pod, deployment, job, service and ingress
//! creation.

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, Job, JobSpec, JobTemplateSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, Pod, PodSpec, PodTemplateSpec, ResourceRequirements,
    Service, ServicePort, ServiceSpec,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::types::{Error, Result};
use crate::validation::{validate_dns_label, validate_port};

// =============================================================================
// Pod templates
// =============================================================================

/// Container template for `create_pod`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodTemplate {
    Nginx,
    Redis,
    Postgres,
    Mysql,
    Custom,
}

struct TemplateSpec {
    image: &'static str,
    port: Option<(i32, &'static str)>,
    env: &'static [(&'static str, &'static str)],
    requests: (&'static str, &'static str),
    limits: (&'static str, &'static str),
}

impl PodTemplate {
    pub const VALUES: &'static [&'static str] = &["nginx", "redis", "postgres", "mysql", "custom"];

    pub fn as_str(self) -> &'static str {
        match self {
            PodTemplate::Nginx => "nginx",
            PodTemplate::Redis => "redis",
            PodTemplate::Postgres => "postgres",
            PodTemplate::Mysql => "mysql",
            PodTemplate::Custom => "custom",
        }
    }

    fn spec(self) -> TemplateSpec {
        const SMALL: ((&str, &str), (&str, &str)) = (("100m", "128Mi"), ("500m", "512Mi"));
        const LARGE: ((&str, &str), (&str, &str)) = (("200m", "256Mi"), ("1000m", "1Gi"));
        let (image, port, env, (requests, limits)) = match self {
            PodTemplate::Nginx => ("nginx:latest", Some((80, "http")), &[][..], SMALL),
            PodTemplate::Redis => ("redis:latest", Some((6379, "redis")), &[][..], SMALL),
            PodTemplate::Postgres => (
                "postgres:latest",
                Some((5432, "postgres")),
                &[("POSTGRES_PASSWORD", "postgres")][..],
                LARGE,
            ),
            PodTemplate::Mysql => (
                "mysql:latest",
                Some((3306, "mysql")),
                &[("MYSQL_ROOT_PASSWORD", "mysql")][..],
                LARGE,
            ),
            PodTemplate::Custom => ("", None, &[][..], SMALL),
        };
        TemplateSpec {
            image,
            port,
            env,
            requests,
            limits,
        }
    }
}

impl FromStr for PodTemplate {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "nginx" => Ok(PodTemplate::Nginx),
            "redis" => Ok(PodTemplate::Redis),
            "postgres" => Ok(PodTemplate::Postgres),
            "mysql" => Ok(PodTemplate::Mysql),
            "custom" => Ok(PodTemplate::Custom),
            other => Err(format!(
                "invalid value '{}', expected one of: {}",
                other,
                Self::VALUES.join(", ")
            )),
        }
    }
}

impl fmt::Display for PodTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller overrides applied on top of a template.
#[derive(Debug, Clone, Default)]
pub struct ContainerOverrides {
    pub image: Option<String>,
    pub command: Option<Vec<String>>,
    pub args: Option<Vec<String>>,
    pub env: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

fn resources(requests: (&str, &str), limits: (&str, &str)) -> ResourceRequirements {
    let quantities = |(cpu, memory): (&str, &str)| {
        BTreeMap::from([
            ("cpu".to_string(), Quantity(cpu.to_string())),
            ("memory".to_string(), Quantity(memory.to_string())),
        ])
    };
    ResourceRequirements {
        requests: Some(quantities(requests)),
        limits: Some(quantities(limits)),
        ..Default::default()
    }
}

/// Environment variables in name order.
pub fn env_vars(env: &BTreeMap<String, String>) -> Vec<EnvVar> {
    env.iter()
        .map(|(name, value)| EnvVar {
            name: name.clone(),
            value: Some(value.clone()),
            ..Default::default()
        })
        .collect()
}

/// Default labels: `app=<name>` plus the caller's labels.
pub fn app_labels(name: &str, extra: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::from([("app".to_string(), name.to_string())]);
    labels.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    labels
}

/// The template's container with caller overrides applied.
fn template_container(
    name: &str,
    template: PodTemplate,
    overrides: &ContainerOverrides,
) -> Result<Container> {
    let spec = template.spec();
    let image = match &overrides.image {
        Some(image) if !image.trim().is_empty() => image.clone(),
        _ if template == PodTemplate::Custom => {
            return Err(Error::invalid_argument(
                "image",
                "is required for the custom template",
            ))
        }
        _ => spec.image.to_string(),
    };

    let mut env: BTreeMap<String, String> = spec
        .env
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    env.extend(overrides.env.clone());

    Ok(Container {
        name: name.to_string(),
        image: Some(image),
        command: overrides.command.clone(),
        args: overrides.args.clone(),
        ports: spec.port.map(|(port, port_name)| {
            vec![ContainerPort {
                container_port: port,
                name: Some(port_name.to_string()),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]
        }),
        env: (!env.is_empty()).then(|| env_vars(&env)),
        resources: Some(resources(spec.requests, spec.limits)),
        ..Default::default()
    })
}

/// Build a single-container pod from a template.
pub fn build_pod(
    name: &str,
    namespace: &str,
    template: PodTemplate,
    overrides: ContainerOverrides,
) -> Result<Pod> {
    let container = template_container(name, template, &overrides)?;
    Ok(Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(app_labels(name, &overrides.labels)),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![container],
            restart_policy: Some("Always".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    })
}

// =============================================================================
// Deployments
// =============================================================================

/// Parameters of `create_deployment`.
#[derive(Debug, Clone, Default)]
pub struct DeploymentParams {
    pub name: String,
    pub namespace: String,
    pub image: String,
    pub replicas: i32,
    pub container_port: Option<i32>,
    pub env: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

pub fn build_deployment(params: DeploymentParams) -> Deployment {
    let labels = app_labels(&params.name, &params.labels);
    let container = Container {
        name: params.name.clone(),
        image: Some(params.image),
        ports: params.container_port.map(|port| {
            vec![ContainerPort {
                container_port: port,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]
        }),
        env: (!params.env.is_empty()).then(|| env_vars(&params.env)),
        ..Default::default()
    };

    Deployment {
        metadata: ObjectMeta {
            name: Some(params.name),
            namespace: Some(params.namespace),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(params.replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

// =============================================================================
// Jobs and cron jobs
// =============================================================================

/// Parameters of `create_job`, and of the job template of `create_cronjob`.
#[derive(Debug, Clone)]
pub struct JobParams {
    pub name: String,
    pub namespace: String,
    pub template: PodTemplate,
    pub overrides: ContainerOverrides,
    pub completions: i32,
    pub parallelism: i32,
    pub backoff_limit: i32,
}

/// Job spec and the labels shared by the job and its pods.
fn job_spec(params: &JobParams) -> Result<(JobSpec, BTreeMap<String, String>)> {
    let labels = app_labels(&params.name, &params.overrides.labels);
    let container = template_container(&params.name, params.template, &params.overrides)?;
    let spec = JobSpec {
        completions: Some(params.completions),
        parallelism: Some(params.parallelism),
        backoff_limit: Some(params.backoff_limit),
        template: PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(labels.clone()),
                ..Default::default()
            }),
            spec: Some(PodSpec {
                containers: vec![container],
                restart_policy: Some("OnFailure".to_string()),
                ..Default::default()
            }),
        },
        ..Default::default()
    };
    Ok((spec, labels))
}

/// Build a job whose pods restart on failure. The selector is left to the
/// API server.
pub fn build_job(params: JobParams) -> Result<Job> {
    let (spec, labels) = job_spec(&params)?;
    Ok(Job {
        metadata: ObjectMeta {
            name: Some(params.name),
            namespace: Some(params.namespace),
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(spec),
        ..Default::default()
    })
}

/// Build a cron job that runs the given job template on `schedule`.
pub fn build_cronjob(params: JobParams, schedule: &str, suspend: bool) -> Result<CronJob> {
    let (spec, labels) = job_spec(&params)?;
    Ok(CronJob {
        metadata: ObjectMeta {
            name: Some(params.name),
            namespace: Some(params.namespace),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(CronJobSpec {
            schedule: schedule.trim().to_string(),
            suspend: Some(suspend),
            job_template: JobTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(spec),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

// =============================================================================
// Services
// =============================================================================

/// Kubernetes service type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceType {
    #[default]
    ClusterIp,
    NodePort,
    LoadBalancer,
    ExternalName,
}

impl ServiceType {
    pub const VALUES: &'static [&'static str] =
        &["ClusterIP", "NodePort", "LoadBalancer", "ExternalName"];

    /// Types `expose_deployment` can create.
    pub const EXPOSE_VALUES: &'static [&'static str] = &["ClusterIP", "NodePort", "LoadBalancer"];

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceType::ClusterIp => "ClusterIP",
            ServiceType::NodePort => "NodePort",
            ServiceType::LoadBalancer => "LoadBalancer",
            ServiceType::ExternalName => "ExternalName",
        }
    }

    /// Whether ports of this type may carry a node port.
    pub fn allows_node_port(self) -> bool {
        matches!(self, ServiceType::NodePort | ServiceType::LoadBalancer)
    }
}

impl FromStr for ServiceType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ClusterIP" => Ok(ServiceType::ClusterIp),
            "NodePort" => Ok(ServiceType::NodePort),
            "LoadBalancer" => Ok(ServiceType::LoadBalancer),
            "ExternalName" => Ok(ServiceType::ExternalName),
            other => Err(format!(
                "invalid value '{}', expected one of: {}",
                other,
                Self::VALUES.join(", ")
            )),
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const DEFAULT_SERVICE_PORT: i32 = 80;

/// Parameters of `create_service` and `expose_deployment`.
#[derive(Debug, Clone, Default)]
pub struct ServiceParams {
    pub name: String,
    pub namespace: String,
    pub service_type: ServiceType,
    pub port: Option<i32>,
    pub target_port: Option<i32>,
    pub node_port: Option<i32>,
    pub selector: BTreeMap<String, String>,
    pub external_name: Option<String>,
}

/// Build a service from a type template. Cross-field rules are checked here
/// so that no request is sent for a combination the API would reject.
pub fn build_service(params: ServiceParams) -> Result<Service> {
    let ServiceParams {
        name,
        namespace,
        service_type,
        port,
        target_port,
        node_port,
        selector,
        external_name,
    } = params;

    if node_port.is_some() && !service_type.allows_node_port() {
        return Err(Error::invalid_argument(
            "node_port",
            format!("is not allowed for {} services", service_type),
        ));
    }

    let port = port.unwrap_or(DEFAULT_SERVICE_PORT);
    let spec = if service_type == ServiceType::ExternalName {
        let external_name = external_name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| {
                Error::invalid_argument("external_name", "is required for ExternalName services")
            })?;
        ServiceSpec {
            type_: Some(service_type.as_str().to_string()),
            external_name: Some(external_name),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }
    } else {
        if external_name.is_some() {
            return Err(Error::invalid_argument(
                "external_name",
                format!("is only allowed for ExternalName services, not {}", service_type),
            ));
        }
        let selector = if selector.is_empty() {
            BTreeMap::from([("app".to_string(), name.clone())])
        } else {
            selector
        };
        ServiceSpec {
            type_: Some(service_type.as_str().to_string()),
            selector: Some(selector),
            session_affinity: Some("None".to_string()),
            external_traffic_policy: (service_type == ServiceType::LoadBalancer)
                .then(|| "Cluster".to_string()),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port,
                target_port: Some(IntOrString::Int(target_port.unwrap_or(port))),
                node_port,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }
    };

    Ok(Service {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(namespace),
            ..Default::default()
        },
        spec: Some(spec),
        ..Default::default()
    })
}

// =============================================================================
// Ingresses
// =============================================================================

/// How an ingress path is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum PathType {
    #[default]
    Prefix,
    Exact,
    ImplementationSpecific,
}

impl PathType {
    pub fn as_str(self) -> &'static str {
        match self {
            PathType::Prefix => "Prefix",
            PathType::Exact => "Exact",
            PathType::ImplementationSpecific => "ImplementationSpecific",
        }
    }
}

/// Backend service port, by number or by name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum BackendPort {
    Number(i64),
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendArg {
    pub name: String,
    pub port: BackendPort,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IngressPathArg {
    #[serde(default = "root_path")]
    pub path: String,
    #[serde(default)]
    pub path_type: PathType,
    pub service: BackendArg,
}

fn root_path() -> String {
    "/".to_string()
}

/// One `rules` entry: an optional host and its paths.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngressRuleArg {
    #[serde(default)]
    pub host: Option<String>,
    pub paths: Vec<IngressPathArg>,
}

/// One `tls` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IngressTlsArg {
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub secret_name: Option<String>,
}

/// Typed ingress rules. Errors name the `rules` argument.
pub fn ingress_rules(rules: &[IngressRuleArg]) -> Result<Vec<IngressRule>> {
    if rules.is_empty() {
        return Err(Error::invalid_argument("rules", "must contain at least one rule"));
    }
    rules
        .iter()
        .enumerate()
        .map(|(i, rule)| {
            if rule.paths.is_empty() {
                return Err(Error::invalid_argument(
                    "rules",
                    format!("rule {} has no paths", i),
                ));
            }
            let paths = rule
                .paths
                .iter()
                .map(|p| ingress_path(i, p))
                .collect::<Result<Vec<_>>>()?;
            Ok(IngressRule {
                host: rule.host.clone().filter(|h| !h.trim().is_empty()),
                http: Some(HTTPIngressRuleValue { paths }),
            })
        })
        .collect()
}

fn ingress_path(rule: usize, path: &IngressPathArg) -> Result<HTTPIngressPath> {
    if !path.path.starts_with('/') {
        return Err(Error::invalid_argument(
            "rules",
            format!("rule {}: path '{}' must start with '/'", rule, path.path),
        ));
    }
    validate_dns_label(&path.service.name, "rules")?;
    let port = match &path.service.port {
        BackendPort::Number(n) => ServiceBackendPort {
            number: Some(validate_port(*n, "rules")?),
            ..Default::default()
        },
        BackendPort::Name(name) => {
            validate_dns_label(name, "rules")?;
            ServiceBackendPort {
                name: Some(name.clone()),
                ..Default::default()
            }
        }
    };
    Ok(HTTPIngressPath {
        path: Some(path.path.clone()),
        path_type: path.path_type.as_str().to_string(),
        backend: IngressBackend {
            service: Some(IngressServiceBackend {
                name: path.service.name.clone(),
                port: Some(port),
            }),
            ..Default::default()
        },
    })
}

pub fn ingress_tls(tls: &[IngressTlsArg]) -> Vec<IngressTLS> {
    tls.iter()
        .map(|t| IngressTLS {
            hosts: (!t.hosts.is_empty()).then(|| t.hosts.clone()),
            secret_name: t.secret_name.clone(),
        })
        .collect()
}

/// Parameters of `create_ingress`.
#[derive(Debug, Clone, Default)]
pub struct IngressParams {
    pub name: String,
    pub namespace: String,
    pub ingress_class: Option<String>,
    pub rules: Vec<IngressRuleArg>,
    pub tls: Vec<IngressTlsArg>,
    pub annotations: BTreeMap<String, String>,
}

pub fn build_ingress(params: IngressParams) -> Result<Ingress> {
    let rules = ingress_rules(&params.rules)?;
    Ok(Ingress {
        metadata: ObjectMeta {
            name: Some(params.name),
            namespace: Some(params.namespace),
            annotations: (!params.annotations.is_empty()).then_some(params.annotations),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            ingress_class_name: params.ingress_class,
            rules: Some(rules),
            tls: (!params.tls.is_empty()).then(|| ingress_tls(&params.tls)),
            ..Default::default()
        }),
        ..Default::default()
    })
}
