//! Built-in tool identifiers and their descriptors.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

use super::handlers::deployments::RolloutAction;
use super::registry::{ParamDef, ParamType, RiskSemantic, ToolDescriptor};
use crate::output::{DetailFormat, ListFormat};
use crate::templates::{PodTemplate, ServiceType};

/// Handler binding of a registered tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolId {
    GetPods,
    DescribePod,
    CreatePod,
    DeletePod,
    GetPodLogs,
    ExecPodCommand,

    GetDeployments,
    DescribeDeployment,
    CreateDeployment,
    DeleteDeployment,
    ScaleDeployment,
    UpdateDeployment,
    RolloutDeployment,
    ExposeDeployment,

    GetServices,
    DescribeService,
    CreateService,
    UpdateService,
    DeleteService,
    GetServiceEndpoints,

    GetNamespaces,
    DescribeNamespace,
    CreateNamespace,
    DeleteNamespace,
    GetNamespaceQuota,

    GetClusterInfo,
    GetNodes,
    DescribeNode,
    CordonNode,
    UncordonNode,
    DrainNode,

    GetJobs,
    DescribeJob,
    CreateJob,
    DeleteJob,
    GetJobLogs,

    #[serde(rename = "get_cronjobs")]
    GetCronJobs,
    #[serde(rename = "describe_cronjob")]
    DescribeCronJob,
    #[serde(rename = "create_cronjob")]
    CreateCronJob,
    #[serde(rename = "delete_cronjob")]
    DeleteCronJob,
    #[serde(rename = "get_cronjob_logs")]
    GetCronJobLogs,

    GetIngresses,
    DescribeIngress,
    CreateIngress,
    UpdateIngress,
    DeleteIngress,

    ApplyYaml,
}

/// Handler module a tool is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolGroup {
    Pods,
    Deployments,
    Services,
    Namespaces,
    Cluster,
    Jobs,
    CronJobs,
    Ingresses,
    Manifests,
}

impl ToolId {
    pub const ALL: &'static [ToolId] = &[
        ToolId::GetPods,
        ToolId::DescribePod,
        ToolId::CreatePod,
        ToolId::DeletePod,
        ToolId::GetPodLogs,
        ToolId::ExecPodCommand,
        ToolId::GetDeployments,
        ToolId::DescribeDeployment,
        ToolId::CreateDeployment,
        ToolId::DeleteDeployment,
        ToolId::ScaleDeployment,
        ToolId::UpdateDeployment,
        ToolId::RolloutDeployment,
        ToolId::ExposeDeployment,
        ToolId::GetServices,
        ToolId::DescribeService,
        ToolId::CreateService,
        ToolId::UpdateService,
        ToolId::DeleteService,
        ToolId::GetServiceEndpoints,
        ToolId::GetNamespaces,
        ToolId::DescribeNamespace,
        ToolId::CreateNamespace,
        ToolId::DeleteNamespace,
        ToolId::GetNamespaceQuota,
        ToolId::GetClusterInfo,
        ToolId::GetNodes,
        ToolId::DescribeNode,
        ToolId::CordonNode,
        ToolId::UncordonNode,
        ToolId::DrainNode,
        ToolId::GetJobs,
        ToolId::DescribeJob,
        ToolId::CreateJob,
        ToolId::DeleteJob,
        ToolId::GetJobLogs,
        ToolId::GetCronJobs,
        ToolId::DescribeCronJob,
        ToolId::CreateCronJob,
        ToolId::DeleteCronJob,
        ToolId::GetCronJobLogs,
        ToolId::GetIngresses,
        ToolId::DescribeIngress,
        ToolId::CreateIngress,
        ToolId::UpdateIngress,
        ToolId::DeleteIngress,
        ToolId::ApplyYaml,
    ];

    /// Stable tool name.
    pub fn as_str(self) -> &'static str {
        match self {
            ToolId::GetPods => "get_pods",
            ToolId::DescribePod => "describe_pod",
            ToolId::CreatePod => "create_pod",
            ToolId::DeletePod => "delete_pod",
            ToolId::GetPodLogs => "get_pod_logs",
            ToolId::ExecPodCommand => "exec_pod_command",
            ToolId::GetDeployments => "get_deployments",
            ToolId::DescribeDeployment => "describe_deployment",
            ToolId::CreateDeployment => "create_deployment",
            ToolId::DeleteDeployment => "delete_deployment",
            ToolId::ScaleDeployment => "scale_deployment",
            ToolId::UpdateDeployment => "update_deployment",
            ToolId::RolloutDeployment => "rollout_deployment",
            ToolId::ExposeDeployment => "expose_deployment",
            ToolId::GetServices => "get_services",
            ToolId::DescribeService => "describe_service",
            ToolId::CreateService => "create_service",
            ToolId::UpdateService => "update_service",
            ToolId::DeleteService => "delete_service",
            ToolId::GetServiceEndpoints => "get_service_endpoints",
            ToolId::GetNamespaces => "get_namespaces",
            ToolId::DescribeNamespace => "describe_namespace",
            ToolId::CreateNamespace => "create_namespace",
            ToolId::DeleteNamespace => "delete_namespace",
            ToolId::GetNamespaceQuota => "get_namespace_quota",
            ToolId::GetClusterInfo => "get_cluster_info",
            ToolId::GetNodes => "get_nodes",
            ToolId::DescribeNode => "describe_node",
            ToolId::CordonNode => "cordon_node",
            ToolId::UncordonNode => "uncordon_node",
            ToolId::DrainNode => "drain_node",
            ToolId::GetJobs => "get_jobs",
            ToolId::DescribeJob => "describe_job",
            ToolId::CreateJob => "create_job",
            ToolId::DeleteJob => "delete_job",
            ToolId::GetJobLogs => "get_job_logs",
            ToolId::GetCronJobs => "get_cronjobs",
            ToolId::DescribeCronJob => "describe_cronjob",
            ToolId::CreateCronJob => "create_cronjob",
            ToolId::DeleteCronJob => "delete_cronjob",
            ToolId::GetCronJobLogs => "get_cronjob_logs",
            ToolId::GetIngresses => "get_ingresses",
            ToolId::DescribeIngress => "describe_ingress",
            ToolId::CreateIngress => "create_ingress",
            ToolId::UpdateIngress => "update_ingress",
            ToolId::DeleteIngress => "delete_ingress",
            ToolId::ApplyYaml => "apply_yaml",
        }
    }

    pub fn group(self) -> ToolGroup {
        use ToolId::*;
        match self {
            GetPods | DescribePod | CreatePod | DeletePod | GetPodLogs | ExecPodCommand => {
                ToolGroup::Pods
            }
            GetDeployments | DescribeDeployment | CreateDeployment | DeleteDeployment
            | ScaleDeployment | UpdateDeployment | RolloutDeployment | ExposeDeployment => {
                ToolGroup::Deployments
            }
            GetServices | DescribeService | CreateService | UpdateService | DeleteService
            | GetServiceEndpoints => ToolGroup::Services,
            GetNamespaces | DescribeNamespace | CreateNamespace | DeleteNamespace
            | GetNamespaceQuota => ToolGroup::Namespaces,
            GetClusterInfo | GetNodes | DescribeNode | CordonNode | UncordonNode | DrainNode => {
                ToolGroup::Cluster
            }
            GetJobs | DescribeJob | CreateJob | DeleteJob | GetJobLogs => ToolGroup::Jobs,
            GetCronJobs | DescribeCronJob | CreateCronJob | DeleteCronJob | GetCronJobLogs => {
                ToolGroup::CronJobs
            }
            GetIngresses | DescribeIngress | CreateIngress | UpdateIngress | DeleteIngress => {
                ToolGroup::Ingresses
            }
            ApplyYaml => ToolGroup::Manifests,
        }
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Shared parameters
// =============================================================================

fn name(what: &str) -> ParamDef {
    ParamDef::required("name", ParamType::String, &format!("Name of the {}", what))
}

fn namespace() -> ParamDef {
    ParamDef::required("namespace", ParamType::String, "Namespace of the resource")
}

fn namespace_filter() -> ParamDef {
    ParamDef::optional(
        "namespace",
        ParamType::String,
        "Namespace to list; all namespaces when omitted",
    )
}

fn label_selector() -> ParamDef {
    ParamDef::optional(
        "label_selector",
        ParamType::String,
        "Label selector, e.g. app=web,tier!=cache",
    )
}

fn list_output() -> ParamDef {
    ParamDef::with_default(
        "output",
        ParamType::one_of(ListFormat::VALUES),
        json!("table"),
        "Output format",
    )
}

fn detail_output() -> ParamDef {
    ParamDef::with_default(
        "output",
        ParamType::one_of(DetailFormat::VALUES),
        json!("text"),
        "Output format",
    )
}

fn labels() -> ParamDef {
    ParamDef::optional("labels", ParamType::StringMap, "Labels to set on the object")
}

fn env() -> ParamDef {
    ParamDef::optional(
        "env",
        ParamType::StringMap,
        "Environment variables as NAME: value pairs",
    )
}

fn grace_period() -> ParamDef {
    ParamDef::optional(
        "grace_period_seconds",
        ParamType::Int,
        "Seconds to wait before forcefully terminating pods",
    )
}

fn force(description: &str) -> ParamDef {
    ParamDef::with_default("force", ParamType::Bool, json!(false), description)
}

/// Container template and overrides shared by pod-creating tools.
fn container_params(descriptor: ToolDescriptor) -> ToolDescriptor {
    descriptor
        .param(ParamDef::optional(
            "image",
            ParamType::String,
            "Container image, overrides the template image",
        ))
        .param(ParamDef::optional(
            "command",
            ParamType::StringList,
            "Container entrypoint",
        ))
        .param(ParamDef::optional(
            "args",
            ParamType::StringList,
            "Arguments to the entrypoint",
        ))
        .param(env())
        .param(labels())
}

/// Run-to-completion settings of a job or a cron job's job template.
fn job_params(descriptor: ToolDescriptor) -> ToolDescriptor {
    container_params(descriptor.param(ParamDef::required(
        "template",
        ParamType::one_of(PodTemplate::VALUES),
        "Container template; custom requires image",
    )))
    .param(ParamDef::with_default(
        "completions",
        ParamType::Int,
        json!(1),
        "Successful pods required to finish the job",
    ))
    .param(ParamDef::with_default(
        "parallelism",
        ParamType::Int,
        json!(1),
        "Pods allowed to run at once",
    ))
    .param(ParamDef::with_default(
        "backoff_limit",
        ParamType::Int,
        json!(6),
        "Retries before the job is marked failed",
    ))
}

/// Log options of the job and cron job log tools.
fn job_log_params(descriptor: ToolDescriptor) -> ToolDescriptor {
    descriptor
        .param(ParamDef::optional(
            "container",
            ParamType::String,
            "Container name; required for multi-container pods",
        ))
        .param(ParamDef::optional(
            "tail_lines",
            ParamType::Int,
            "Lines from the end of each pod's log",
        ))
        .param(ParamDef::with_default(
            "timestamps",
            ParamType::Bool,
            json!(false),
            "Prefix each line with its timestamp",
        ))
}

fn ingress_rules(required: bool) -> ParamDef {
    let description = "Rules as [{host?, paths: [{path?, pathType?, service: {name, port}}]}]";
    if required {
        ParamDef::required("rules", ParamType::ObjectList, description)
    } else {
        ParamDef::optional("rules", ParamType::ObjectList, description)
    }
}

fn ingress_tls() -> ParamDef {
    ParamDef::optional(
        "tls",
        ParamType::ObjectList,
        "TLS entries as [{hosts: [..], secretName}]",
    )
}

fn annotations() -> ParamDef {
    ParamDef::optional(
        "annotations",
        ParamType::StringMap,
        "Annotations to set on the object",
    )
}

fn ingress_class() -> ParamDef {
    ParamDef::optional(
        "ingress_class",
        ParamType::String,
        "IngressClass that implements the ingress",
    )
}

// =============================================================================
// Descriptors
// =============================================================================

/// Descriptors of every built-in tool, in registration order.
pub fn builtin_descriptors() -> Vec<ToolDescriptor> {
    use RiskSemantic::{Destructive, ReadOnly, Write};

    vec![
        // Pods
        ToolDescriptor::new(ToolId::GetPods, ReadOnly, "List pods")
            .param(namespace_filter())
            .param(label_selector())
            .param(ParamDef::optional(
                "field_selector",
                ParamType::String,
                "Field selector, e.g. status.phase=Running",
            ))
            .param(list_output()),
        ToolDescriptor::new(ToolId::DescribePod, ReadOnly, "Show details of a pod")
            .param(name("pod"))
            .param(namespace())
            .param(detail_output()),
        container_params(
            ToolDescriptor::new(
                ToolId::CreatePod,
                Write,
                "Create a pod from a built-in container template",
            )
            .param(name("pod"))
            .param(namespace())
            .param(ParamDef::with_default(
                "template",
                ParamType::one_of(PodTemplate::VALUES),
                json!("nginx"),
                "Container template; custom requires image",
            )),
        ),
        ToolDescriptor::new(ToolId::DeletePod, Destructive, "Delete a pod")
            .param(name("pod"))
            .param(namespace())
            .param(grace_period())
            .param(force("Delete immediately without graceful termination")),
        ToolDescriptor::new(ToolId::GetPodLogs, ReadOnly, "Fetch or follow pod logs")
            .param(name("pod"))
            .param(namespace())
            .param(ParamDef::optional(
                "container",
                ParamType::String,
                "Container name; required for multi-container pods",
            ))
            .param(ParamDef::optional(
                "tail_lines",
                ParamType::Int,
                "Lines from the end of the log to start from",
            ))
            .param(ParamDef::with_default(
                "previous",
                ParamType::Bool,
                json!(false),
                "Logs of the previous container instance",
            ))
            .param(ParamDef::with_default(
                "timestamps",
                ParamType::Bool,
                json!(false),
                "Prefix each line with its timestamp",
            ))
            .param(ParamDef::with_default(
                "follow",
                ParamType::Bool,
                json!(false),
                "Stream new log lines as they are written",
            ))
            .param(ParamDef::optional(
                "limit",
                ParamType::Int,
                "Maximum number of lines returned",
            )),
        ToolDescriptor::new(
            ToolId::ExecPodCommand,
            Write,
            "Run a command in a pod container",
        )
        .param(name("pod"))
        .param(namespace())
        .param(ParamDef::required(
            "command",
            ParamType::StringList,
            "Command and arguments, e.g. [\"ls\", \"-l\"]",
        ))
        .param(ParamDef::optional(
            "container",
            ParamType::String,
            "Container name; defaults to the first container",
        )),
        // Deployments
        ToolDescriptor::new(ToolId::GetDeployments, ReadOnly, "List deployments")
            .param(namespace_filter())
            .param(label_selector())
            .param(list_output()),
        ToolDescriptor::new(
            ToolId::DescribeDeployment,
            ReadOnly,
            "Show details of a deployment",
        )
        .param(name("deployment"))
        .param(namespace())
        .param(detail_output()),
        ToolDescriptor::new(ToolId::CreateDeployment, Write, "Create a deployment")
            .param(name("deployment"))
            .param(namespace())
            .param(ParamDef::required("image", ParamType::String, "Container image"))
            .param(ParamDef::with_default(
                "replicas",
                ParamType::Int,
                json!(1),
                "Desired replica count",
            ))
            .param(ParamDef::optional(
                "container_port",
                ParamType::Int,
                "Port exposed by the container",
            ))
            .param(env())
            .param(labels()),
        ToolDescriptor::new(ToolId::DeleteDeployment, Destructive, "Delete a deployment")
            .param(name("deployment"))
            .param(namespace())
            .param(grace_period())
            .param(force("Delete immediately without graceful termination")),
        ToolDescriptor::new(
            ToolId::ScaleDeployment,
            Write,
            "Set the replica count of a deployment",
        )
        .param(name("deployment"))
        .param(namespace())
        .param(ParamDef::required(
            "replicas",
            ParamType::Int,
            "Desired replica count",
        )),
        ToolDescriptor::new(
            ToolId::UpdateDeployment,
            Write,
            "Update image, replicas or environment of a deployment",
        )
        .param(name("deployment"))
        .param(namespace())
        .param(ParamDef::optional(
            "container",
            ParamType::String,
            "Container to update; defaults to the first container",
        ))
        .param(ParamDef::optional("image", ParamType::String, "New container image"))
        .param(ParamDef::optional(
            "replicas",
            ParamType::Int,
            "New replica count",
        ))
        .param(env()),
        ToolDescriptor::new(
            ToolId::RolloutDeployment,
            Write,
            "Check, restart, pause or resume a deployment rollout",
        )
        .param(name("deployment"))
        .param(namespace())
        .param(ParamDef::with_default(
            "action",
            ParamType::one_of(RolloutAction::VALUES),
            json!("status"),
            "Rollout action",
        )),
        ToolDescriptor::new(
            ToolId::ExposeDeployment,
            Write,
            "Create a service selecting the pods of a deployment",
        )
        .param(name("deployment"))
        .param(namespace())
        .param(ParamDef::required("port", ParamType::Int, "Service port"))
        .param(ParamDef::optional(
            "target_port",
            ParamType::Int,
            "Container port; defaults to port",
        ))
        .param(ParamDef::with_default(
            "service_type",
            ParamType::one_of(ServiceType::EXPOSE_VALUES),
            json!("ClusterIP"),
            "Service type",
        )),
        // Services
        ToolDescriptor::new(ToolId::GetServices, ReadOnly, "List services")
            .param(namespace_filter())
            .param(label_selector())
            .param(list_output()),
        ToolDescriptor::new(ToolId::DescribeService, ReadOnly, "Show details of a service")
            .param(name("service"))
            .param(namespace())
            .param(detail_output()),
        ToolDescriptor::new(ToolId::CreateService, Write, "Create a service")
            .param(name("service"))
            .param(namespace())
            .param(ParamDef::with_default(
                "service_type",
                ParamType::one_of(ServiceType::VALUES),
                json!("ClusterIP"),
                "Service type",
            ))
            .param(ParamDef::optional(
                "port",
                ParamType::Int,
                "Service port; defaults to 80",
            ))
            .param(ParamDef::optional(
                "target_port",
                ParamType::Int,
                "Container port; defaults to port",
            ))
            .param(ParamDef::optional(
                "node_port",
                ParamType::Int,
                "Node port for NodePort and LoadBalancer services",
            ))
            .param(ParamDef::optional(
                "selector",
                ParamType::StringMap,
                "Pod selector; defaults to app=<name>",
            ))
            .param(ParamDef::optional(
                "external_name",
                ParamType::String,
                "DNS name for ExternalName services",
            )),
        ToolDescriptor::new(
            ToolId::UpdateService,
            Write,
            "Update type, selector or ports of a service",
        )
        .param(name("service"))
        .param(namespace())
        .param(ParamDef::optional(
            "service_type",
            ParamType::one_of(ServiceType::VALUES),
            "New service type",
        ))
        .param(ParamDef::optional(
            "selector",
            ParamType::StringMap,
            "New pod selector",
        ))
        .param(ParamDef::optional(
            "port",
            ParamType::Int,
            "New port of the first service port",
        ))
        .param(ParamDef::optional(
            "target_port",
            ParamType::Int,
            "New target port of the first service port",
        )),
        ToolDescriptor::new(ToolId::DeleteService, Destructive, "Delete a service")
            .param(name("service"))
            .param(namespace()),
        ToolDescriptor::new(
            ToolId::GetServiceEndpoints,
            ReadOnly,
            "Show the endpoints backing a service",
        )
        .param(name("service"))
        .param(namespace())
        .param(list_output()),
        // Namespaces
        ToolDescriptor::new(ToolId::GetNamespaces, ReadOnly, "List namespaces")
            .param(label_selector())
            .param(list_output()),
        ToolDescriptor::new(
            ToolId::DescribeNamespace,
            ReadOnly,
            "Show details of a namespace",
        )
        .param(name("namespace"))
        .param(detail_output()),
        ToolDescriptor::new(ToolId::CreateNamespace, Write, "Create a namespace")
            .param(name("namespace"))
            .param(labels()),
        ToolDescriptor::new(
            ToolId::DeleteNamespace,
            Destructive,
            "Delete a namespace and everything in it",
        )
        .param(name("namespace"))
        .param(force(
            "Send the namespace delete with a zero grace period; contained objects are still removed by the namespace controller",
        )),
        ToolDescriptor::new(
            ToolId::GetNamespaceQuota,
            ReadOnly,
            "Show resource quotas of a namespace",
        )
        .param(ParamDef::required(
            "namespace",
            ParamType::String,
            "Namespace to inspect",
        ))
        .param(list_output()),
        // Cluster
        ToolDescriptor::new(
            ToolId::GetClusterInfo,
            ReadOnly,
            "Show API server version and a cluster summary",
        ),
        ToolDescriptor::new(ToolId::GetNodes, ReadOnly, "List nodes")
            .param(label_selector())
            .param(list_output()),
        ToolDescriptor::new(ToolId::DescribeNode, ReadOnly, "Show details of a node")
            .param(name("node"))
            .param(detail_output()),
        ToolDescriptor::new(ToolId::CordonNode, Write, "Mark a node unschedulable")
            .param(name("node")),
        ToolDescriptor::new(ToolId::UncordonNode, Write, "Mark a node schedulable")
            .param(name("node")),
        ToolDescriptor::new(
            ToolId::DrainNode,
            Destructive,
            "Cordon a node and evict its pods",
        )
        .param(name("node"))
        .param(force("Also evict pods not managed by a controller"))
        .param(ParamDef::with_default(
            "ignore_daemonsets",
            ParamType::Bool,
            json!(true),
            "Skip DaemonSet-managed pods instead of failing",
        ))
        .param(ParamDef::with_default(
            "delete_emptydir_data",
            ParamType::Bool,
            json!(false),
            "Evict pods using emptyDir volumes (their data is lost)",
        ))
        .param(grace_period()),
        // Jobs
        ToolDescriptor::new(ToolId::GetJobs, ReadOnly, "List jobs")
            .param(namespace_filter())
            .param(label_selector())
            .param(list_output()),
        ToolDescriptor::new(ToolId::DescribeJob, ReadOnly, "Show details of a job")
            .param(name("job"))
            .param(namespace())
            .param(detail_output()),
        job_params(
            ToolDescriptor::new(
                ToolId::CreateJob,
                Write,
                "Create a run-to-completion job from a container template",
            )
            .param(name("job"))
            .param(namespace()),
        ),
        ToolDescriptor::new(ToolId::DeleteJob, Destructive, "Delete a job and its pods")
            .param(name("job"))
            .param(namespace())
            .param(grace_period())
            .param(force("Delete immediately without graceful termination")),
        job_log_params(
            ToolDescriptor::new(ToolId::GetJobLogs, ReadOnly, "Fetch logs of every pod of a job")
                .param(name("job"))
                .param(namespace()),
        ),
        // CronJobs
        ToolDescriptor::new(ToolId::GetCronJobs, ReadOnly, "List cron jobs")
            .param(namespace_filter())
            .param(label_selector())
            .param(list_output()),
        ToolDescriptor::new(
            ToolId::DescribeCronJob,
            ReadOnly,
            "Show details of a cron job",
        )
        .param(name("cron job"))
        .param(namespace())
        .param(detail_output()),
        job_params(
            ToolDescriptor::new(
                ToolId::CreateCronJob,
                Write,
                "Create a cron job that runs a container template on a schedule",
            )
            .param(name("cron job"))
            .param(namespace())
            .param(ParamDef::required(
                "schedule",
                ParamType::String,
                "Cron schedule, e.g. \"*/5 * * * *\" or @daily",
            )),
        )
        .param(ParamDef::with_default(
            "suspend",
            ParamType::Bool,
            json!(false),
            "Create the cron job without scheduling runs",
        )),
        ToolDescriptor::new(
            ToolId::DeleteCronJob,
            Destructive,
            "Delete a cron job and the jobs it created",
        )
        .param(name("cron job"))
        .param(namespace()),
        job_log_params(
            ToolDescriptor::new(
                ToolId::GetCronJobLogs,
                ReadOnly,
                "Fetch logs of the pods of every job a cron job created",
            )
            .param(name("cron job"))
            .param(namespace()),
        ),
        // Ingresses
        ToolDescriptor::new(ToolId::GetIngresses, ReadOnly, "List ingresses")
            .param(namespace_filter())
            .param(label_selector())
            .param(list_output()),
        ToolDescriptor::new(
            ToolId::DescribeIngress,
            ReadOnly,
            "Show details of an ingress",
        )
        .param(name("ingress"))
        .param(namespace())
        .param(detail_output()),
        ToolDescriptor::new(
            ToolId::CreateIngress,
            Write,
            "Create an ingress routing hosts and paths to services",
        )
        .param(name("ingress"))
        .param(namespace())
        .param(ingress_rules(true))
        .param(ingress_tls())
        .param(annotations())
        .param(ingress_class()),
        ToolDescriptor::new(
            ToolId::UpdateIngress,
            Write,
            "Replace the rules or TLS of an ingress, or add annotations",
        )
        .param(name("ingress"))
        .param(namespace())
        .param(ingress_rules(false))
        .param(ingress_tls())
        .param(annotations())
        .param(ingress_class()),
        ToolDescriptor::new(ToolId::DeleteIngress, Destructive, "Delete an ingress")
            .param(name("ingress"))
            .param(namespace()),
        // Manifests
        ToolDescriptor::new(
            ToolId::ApplyYaml,
            Write,
            "Create or update the objects of a YAML manifest",
        )
        .param(ParamDef::required(
            "yaml_content",
            ParamType::String,
            "One or more YAML documents separated by ---",
        ))
        .param(ParamDef::optional(
            "namespace",
            ParamType::String,
            "Namespace for namespaced objects; overrides the manifest",
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_id_has_one_descriptor() {
        let descriptors = builtin_descriptors();
        let ids: HashSet<ToolId> = descriptors.iter().map(|d| d.id).collect();
        assert_eq!(descriptors.len(), ToolId::ALL.len());
        assert_eq!(ids.len(), ToolId::ALL.len());
    }

    #[test]
    fn test_names_match_serde() {
        for id in ToolId::ALL {
            assert_eq!(serde_json::to_value(id).unwrap(), id.as_str());
        }
    }

    #[test]
    fn test_risk_classification() {
        let descriptors = builtin_descriptors();
        let risk = |id: ToolId| descriptors.iter().find(|d| d.id == id).unwrap().risk;
        assert_eq!(risk(ToolId::GetPods), RiskSemantic::ReadOnly);
        assert_eq!(risk(ToolId::ScaleDeployment), RiskSemantic::Write);
        assert_eq!(risk(ToolId::DrainNode), RiskSemantic::Destructive);
        assert_eq!(risk(ToolId::DeleteNamespace), RiskSemantic::Destructive);
        assert_eq!(risk(ToolId::ApplyYaml), RiskSemantic::Write);
        assert_eq!(risk(ToolId::DeleteCronJob), RiskSemantic::Destructive);
        assert_eq!(risk(ToolId::GetJobLogs), RiskSemantic::ReadOnly);
    }

    #[test]
    fn test_namespace_force_describes_namespace_delete_only() {
        let descriptors = builtin_descriptors();
        let delete = descriptors
            .iter()
            .find(|d| d.id == ToolId::DeleteNamespace)
            .unwrap();
        let force = delete.param_def("force").unwrap();
        assert!(force.description.contains("zero grace period"));
        assert!(!force.description.contains("pods"));
    }

    #[test]
    fn test_groups() {
        assert_eq!(ToolId::GetPodLogs.group(), ToolGroup::Pods);
        assert_eq!(ToolId::ExposeDeployment.group(), ToolGroup::Deployments);
        assert_eq!(ToolId::GetServiceEndpoints.group(), ToolGroup::Services);
        assert_eq!(ToolId::GetNamespaceQuota.group(), ToolGroup::Namespaces);
        assert_eq!(ToolId::DrainNode.group(), ToolGroup::Cluster);
        assert_eq!(ToolId::GetJobLogs.group(), ToolGroup::Jobs);
        assert_eq!(ToolId::CreateCronJob.group(), ToolGroup::CronJobs);
        assert_eq!(ToolId::UpdateIngress.group(), ToolGroup::Ingresses);
        assert_eq!(ToolId::ApplyYaml.group(), ToolGroup::Manifests);
    }
}
