//! End-to-end tool dispatch against the in-memory cluster.

mod common;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, EndpointAddress, EndpointPort, EndpointSubset, Endpoints, Namespace,
    Node, NodeCondition, NodeSpec, NodeStatus, Pod, PodSpec, PodStatus, PodTemplateSpec,
    ResourceQuota, ResourceQuotaStatus,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use pretty_assertions::assert_eq;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use common::{created, dispatcher, dispatcher_with, now, FakeCluster};
use kube_mcp_core::cluster::{ClusterObject, Propagation, ResourceKind};
use kube_mcp_core::{Config, ErrorKind, InvocationRequest, ToolOutput};

// =============================================================================
// Fixtures
// =============================================================================

fn meta(namespace: Option<&str>, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        creation_timestamp: Some(created(90)),
        ..Default::default()
    }
}

fn node(name: &str) -> Node {
    Node {
        metadata: meta(None, name),
        spec: Some(NodeSpec::default()),
        status: Some(NodeStatus {
            conditions: Some(vec![NodeCondition {
                type_: "Ready".to_string(),
                status: "True".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}

fn pod_on(namespace: &str, name: &str, node: &str) -> Pod {
    let mut metadata = meta(Some(namespace), name);
    metadata.labels = Some(BTreeMap::from([("app".to_string(), "web".to_string())]));
    metadata.owner_references = Some(vec![OwnerReference {
        api_version: "apps/v1".to_string(),
        kind: "ReplicaSet".to_string(),
        name: "web-7d9c".to_string(),
        uid: "0b7f3a52-1c1e-4c58-9d0a-2a4e5b6c7d8e".to_string(),
        controller: Some(true),
        ..Default::default()
    }]);
    Pod {
        metadata,
        spec: Some(PodSpec {
            node_name: Some(node.to_string()),
            containers: vec![Container {
                name: "web".to_string(),
                image: Some("nginx:1.25".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }),
        status: Some(PodStatus {
            phase: Some("Running".to_string()),
            ..Default::default()
        }),
    }
}

fn deployment(namespace: &str, name: &str, containers: &[(&str, &str)]) -> Deployment {
    let labels = BTreeMap::from([("app".to_string(), name.to_string())]);
    Deployment {
        metadata: meta(Some(namespace), name),
        spec: Some(DeploymentSpec {
            replicas: Some(2),
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
                    containers: containers
                        .iter()
                        .map(|(name, image)| Container {
                            name: name.to_string(),
                            image: Some(image.to_string()),
                            ..Default::default()
                        })
                        .collect(),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

fn namespace(name: &str) -> Namespace {
    Namespace {
        metadata: meta(None, name),
        ..Default::default()
    }
}

fn drain_fixture() -> Arc<FakeCluster> {
    Arc::new(
        FakeCluster::new()
            .with(node("node-1"))
            .with(pod_on("default", "web-a", "node-1"))
            .with(pod_on("default", "web-b", "node-1"))
            .with(pod_on("default", "web-c", "node-2")),
    )
}

fn text(output: &ToolOutput) -> &str {
    output.as_text().expect("text output")
}

fn call(tool: &str, arguments: Value) -> InvocationRequest {
    InvocationRequest::new(tool, arguments)
}

/// Required parameters of a tool filled with plausible values.
fn minimal_args(tool: &str, required: &[&str]) -> Map<String, Value> {
    let mut args = Map::new();
    for name in required {
        let value = match *name {
            "name" => json!("web"),
            "namespace" => json!("default"),
            "image" => json!("nginx:1.25"),
            "command" => json!(["ls", "-l"]),
            "replicas" => json!(2),
            "port" => json!(8080),
            "template" => json!("nginx"),
            "schedule" => json!("*/5 * * * *"),
            "rules" => json!([{"host": "a.example.com", "paths": [{"service": {"name": "web", "port": 80}}]}]),
            "yaml_content" => json!("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: web\n"),
            other => panic!("no fixture value for required parameter '{}'", other),
        };
        args.insert(name.to_string(), value);
    }
    match tool {
        "update_deployment" => {
            args.insert("replicas".to_string(), json!(3));
        }
        "update_service" => {
            args.insert("port".to_string(), json!(8081));
        }
        "update_ingress" => {
            args.insert("ingress_class".to_string(), json!("nginx"));
        }
        _ => {}
    }
    args
}

// =============================================================================
// Reads
// =============================================================================

#[tokio::test]
async fn test_get_pods_json_on_empty_namespace() {
    let cluster = Arc::new(FakeCluster::new());
    let dispatcher = dispatcher(cluster);

    let output = dispatcher
        .dispatch(call("get_pods", json!({"namespace": "default", "output": "json"})))
        .await
        .unwrap();
    assert_eq!(output.as_json(), Some(&json!([])));
}

#[tokio::test]
async fn test_get_pods_table_on_empty_namespace() {
    let cluster = Arc::new(FakeCluster::new());
    let dispatcher = dispatcher(cluster);

    let output = dispatcher
        .dispatch(call("get_pods", json!({"namespace": "kube-system"})))
        .await
        .unwrap();
    assert_eq!(text(&output), "No resources found in kube-system namespace.");
}

#[tokio::test]
async fn test_table_output_is_stable() {
    let cluster = drain_fixture();
    let dispatcher = dispatcher(cluster);

    let first = dispatcher
        .dispatch(call("get_pods", json!({"namespace": "default", "output": "wide"})))
        .await
        .unwrap();
    let second = dispatcher
        .dispatch(call("get_pods", json!({"namespace": "default", "output": "wide"})))
        .await
        .unwrap();
    assert_eq!(text(&first), text(&second));
    assert!(text(&first).starts_with("NAME"));
    assert!(text(&first).contains("web-a"));
    assert!(text(&first).contains("node-2"));
}

#[tokio::test]
async fn test_label_selector_filters() {
    let cluster = drain_fixture();
    cluster.insert(deployment("default", "api", &[("api", "api:1")]));
    let dispatcher = dispatcher(cluster);

    let output = dispatcher
        .dispatch(call(
            "get_deployments",
            json!({"label_selector": "app=web", "output": "name"}),
        ))
        .await
        .unwrap();
    assert_eq!(text(&output), "");

    let output = dispatcher
        .dispatch(call("get_pods", json!({"label_selector": "app=web", "output": "name"})))
        .await
        .unwrap();
    assert_eq!(text(&output), "pod/web-a\npod/web-b\npod/web-c");
}

#[tokio::test]
async fn test_cluster_info_summary() {
    let cluster = Arc::new(
        FakeCluster::new()
            .with(node("node-1"))
            .with(node("node-2"))
            .with(namespace("default"))
            .with(namespace("kube-system")),
    );
    let dispatcher = dispatcher(cluster);

    let output = dispatcher
        .dispatch(call("get_cluster_info", Value::Null))
        .await
        .unwrap();
    assert_eq!(
        text(&output),
        "Kubernetes control plane version: v1.30.2 (linux/amd64)\nNodes: 2 (2 Ready)\nNamespaces: 2"
    );
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_scale_missing_deployment_is_not_found() {
    let cluster = Arc::new(FakeCluster::new());
    let dispatcher = dispatcher(cluster);

    let err = dispatcher
        .dispatch(call(
            "scale_deployment",
            json!({"name": "nginx", "namespace": "web", "replicas": 3}),
        ))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_user_message().starts_with("NOT_FOUND: "));
}

#[tokio::test]
async fn test_minimal_arguments_pass_validation_for_every_tool() {
    let cluster = Arc::new(FakeCluster::new());
    let dispatcher = dispatcher(cluster);

    let tools: Vec<(String, Vec<String>)> = dispatcher
        .registry()
        .list()
        .into_iter()
        .map(|d| {
            let required = d
                .params
                .iter()
                .filter(|p| p.is_required())
                .map(|p| p.name.clone())
                .collect();
            (d.name.clone(), required)
        })
        .collect();
    assert_eq!(tools.len(), 47);

    for (tool, required) in tools {
        let required: Vec<&str> = required.iter().map(String::as_str).collect();
        let args = minimal_args(&tool, &required);
        let result = dispatcher.dispatch(call(&tool, Value::Object(args))).await;
        if let Err(e) = result {
            assert_ne!(
                e.kind(),
                ErrorKind::Validation,
                "{} rejected minimal arguments: {}",
                tool,
                e
            );
        }
    }
}

#[tokio::test]
async fn test_each_missing_required_argument_is_named() {
    let cluster = Arc::new(FakeCluster::new());
    let dispatcher = dispatcher(cluster.clone());

    let full = json!({"name": "web", "namespace": "default", "image": "nginx:1.25", "replicas": 2});
    for missing in ["name", "namespace", "image"] {
        let mut args = full.as_object().unwrap().clone();
        args.remove(missing);
        let err = dispatcher
            .dispatch(call("create_deployment", Value::Object(args)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.invalid_field(), Some(missing));
    }
    assert_eq!(cluster.calls(), 0);
}

#[tokio::test]
async fn test_enum_error_lists_accepted_values() {
    let cluster = Arc::new(FakeCluster::new());
    let dispatcher = dispatcher(cluster);

    let err = dispatcher
        .dispatch(call("get_nodes", json!({"output": "xml"})))
        .await
        .unwrap_err();
    assert_eq!(err.invalid_field(), Some("output"));
    assert!(err
        .to_string()
        .contains("expected one of: table, wide, json, yaml, name"));
}

#[tokio::test]
async fn test_unknown_argument_is_named() {
    let cluster = Arc::new(FakeCluster::new());
    let dispatcher = dispatcher(cluster.clone());

    let err = dispatcher
        .dispatch(call("get_pods", json!({"namespace": "default", "bogus": 1})))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.invalid_field(), Some("bogus"));
    assert_eq!(cluster.calls(), 0);
}

#[tokio::test]
async fn test_read_only_rejects_without_cluster_calls() {
    let cluster = drain_fixture();
    let mut config = Config::default();
    config.access.read_only = true;
    let dispatcher = dispatcher_with(cluster.clone(), config);

    for (tool, args) in [
        ("delete_pod", json!({"name": "web-a", "namespace": "default"})),
        ("drain_node", json!({"name": "node-1"})),
        ("create_namespace", json!({"name": "staging"})),
    ] {
        let err = dispatcher.dispatch(call(tool, args)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden, "{}", tool);
    }
    assert_eq!(cluster.calls(), 0);
    assert!(cluster
        .object(ResourceKind::Pod, Some("default"), "web-a")
        .is_some());

    assert!(dispatcher
        .dispatch(call("get_nodes", Value::Null))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_input_schemas_accept_minimal_arguments() {
    let cluster = Arc::new(FakeCluster::new());
    let dispatcher = dispatcher(cluster);

    for descriptor in dispatcher.registry().list() {
        let schema = descriptor.input_schema();
        let validator = jsonschema::validator_for(&schema).unwrap();
        let required: Vec<&str> = descriptor
            .params
            .iter()
            .filter(|p| p.is_required())
            .map(|p| p.name.as_str())
            .collect();
        let mut args = minimal_args(&descriptor.name, &required);
        assert!(
            validator.is_valid(&Value::Object(args.clone())),
            "{} schema rejects minimal arguments",
            descriptor.name
        );

        args.insert("bogus".to_string(), json!(true));
        assert!(!validator.is_valid(&Value::Object(args)));
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_cluster_times_out() {
    let cluster = drain_fixture();
    cluster.set_delay(Duration::from_secs(60));
    let dispatcher = dispatcher(cluster);

    let err = dispatcher
        .dispatch(
            call("describe_pod", json!({"name": "web-a", "namespace": "default"}))
                .with_timeout(Duration::from_secs(2)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
}

// =============================================================================
// Logs and exec
// =============================================================================

#[tokio::test]
async fn test_follow_logs_stop_at_limit() {
    let cluster = drain_fixture();
    let lines: Vec<String> = (1..=10).map(|i| format!("line {}", i)).collect();
    cluster.set_logs("default", "web-a", &lines.join("\n"));
    let dispatcher = dispatcher(cluster);

    let output = dispatcher
        .dispatch(call(
            "get_pod_logs",
            json!({"name": "web-a", "namespace": "default", "follow": true, "limit": 4}),
        ))
        .await
        .unwrap();
    let stream = match output {
        ToolOutput::Stream(stream) => stream,
        other => panic!("expected a stream, got {:?}", other),
    };
    let received = stream.collect_for(Duration::from_secs(5)).await.unwrap();
    assert_eq!(received, vec!["line 1", "line 2", "line 3", "line 4"]);
}

#[tokio::test]
async fn test_logs_truncated_to_configured_maximum() {
    let cluster = drain_fixture();
    cluster.set_logs("default", "web-a", "a\nb\nc\nd\ne");
    let mut config = Config::default();
    config.output.max_log_lines = 3;
    let dispatcher = dispatcher_with(cluster, config);

    let output = dispatcher
        .dispatch(call("get_pod_logs", json!({"name": "web-a", "namespace": "default"})))
        .await
        .unwrap();
    assert_eq!(text(&output), "... (2 earlier lines truncated)\nc\nd\ne");

    let output = dispatcher
        .dispatch(call(
            "get_pod_logs",
            json!({"name": "web-a", "namespace": "default", "tail_lines": 2}),
        ))
        .await
        .unwrap();
    assert_eq!(text(&output), "d\ne");
}

#[tokio::test]
async fn test_exec_returns_command_output() {
    let cluster = drain_fixture();
    let dispatcher = dispatcher(cluster);

    let output = dispatcher
        .dispatch(call(
            "exec_pod_command",
            json!({"name": "web-a", "namespace": "default", "command": ["echo", "hi"]}),
        ))
        .await
        .unwrap();
    assert!(text(&output).starts_with("echo hi"));

    let err = dispatcher
        .dispatch(call(
            "exec_pod_command",
            json!({"name": "web-a", "namespace": "default", "command": []}),
        ))
        .await
        .unwrap_err();
    assert_eq!(err.invalid_field(), Some("command"));
}

// =============================================================================
// Writes
// =============================================================================

#[tokio::test]
async fn test_create_pod_from_template() {
    let cluster = Arc::new(FakeCluster::new());
    let dispatcher = dispatcher(cluster.clone());

    let output = dispatcher
        .dispatch(call(
            "create_pod",
            json!({"name": "cache", "namespace": "default", "template": "redis"}),
        ))
        .await
        .unwrap();
    assert_eq!(text(&output), "pod/cache created");

    let Some(ClusterObject::Pod(pod)) = cluster.object(ResourceKind::Pod, Some("default"), "cache")
    else {
        panic!("pod was not created");
    };
    let spec = pod.spec.unwrap();
    let container = &spec.containers[0];
    assert!(container.image.as_deref().unwrap().starts_with("redis"));

    let err = dispatcher
        .dispatch(call(
            "create_pod",
            json!({"name": "tool", "namespace": "default", "template": "custom"}),
        ))
        .await
        .unwrap_err();
    assert_eq!(err.invalid_field(), Some("image"));
}

#[tokio::test]
async fn test_update_deployment_touches_only_target_container() {
    let cluster = Arc::new(FakeCluster::new().with(deployment(
        "default",
        "web",
        &[("app", "web:1.0"), ("sidecar", "envoy:1.29")],
    )));
    let dispatcher = dispatcher(cluster.clone());

    let output = dispatcher
        .dispatch(call(
            "update_deployment",
            json!({"name": "web", "namespace": "default", "container": "sidecar", "image": "envoy:1.30"}),
        ))
        .await
        .unwrap();
    assert_eq!(text(&output), "deployment.apps/web updated");

    let Some(ClusterObject::Deployment(updated)) =
        cluster.object(ResourceKind::Deployment, Some("default"), "web")
    else {
        panic!("deployment disappeared");
    };
    let spec = updated.spec.unwrap();
    assert_eq!(spec.replicas, Some(2));
    let images: Vec<(String, Option<String>)> = spec
        .template
        .spec
        .unwrap()
        .containers
        .into_iter()
        .map(|c| (c.name, c.image))
        .collect();
    assert_eq!(
        images,
        vec![
            ("app".to_string(), Some("web:1.0".to_string())),
            ("sidecar".to_string(), Some("envoy:1.30".to_string())),
        ]
    );

    let err = dispatcher
        .dispatch(call(
            "update_deployment",
            json!({"name": "web", "namespace": "default", "container": "db", "image": "pg:16"}),
        ))
        .await
        .unwrap_err();
    assert_eq!(err.invalid_field(), Some("container"));
}

#[tokio::test]
async fn test_rollout_restart_stamps_template() {
    let cluster = Arc::new(FakeCluster::new().with(deployment("default", "web", &[("app", "web:1.0")])));
    let dispatcher = dispatcher(cluster.clone());

    let output = dispatcher
        .dispatch(call(
            "rollout_deployment",
            json!({"name": "web", "namespace": "default", "action": "restart"}),
        ))
        .await
        .unwrap();
    assert_eq!(text(&output), "deployment.apps/web restarted");

    let Some(ClusterObject::Deployment(updated)) =
        cluster.object(ResourceKind::Deployment, Some("default"), "web")
    else {
        panic!("deployment disappeared");
    };
    let annotations = updated
        .spec
        .unwrap()
        .template
        .metadata
        .unwrap()
        .annotations
        .unwrap();
    assert_eq!(
        annotations.get("kubectl.kubernetes.io/restartedAt"),
        Some(&now().to_rfc3339())
    );
}

#[tokio::test]
async fn test_cordon_and_uncordon() {
    let cluster = Arc::new(FakeCluster::new().with(node("node-1")));
    let dispatcher = dispatcher(cluster.clone());

    let cordon = || call("cordon_node", json!({"name": "node-1"}));
    let output = dispatcher.dispatch(cordon()).await.unwrap();
    assert_eq!(text(&output), "node/node-1 cordoned");
    let output = dispatcher.dispatch(cordon()).await.unwrap();
    assert_eq!(text(&output), "node/node-1 already cordoned");

    let output = dispatcher
        .dispatch(call("uncordon_node", json!({"name": "node-1"})))
        .await
        .unwrap();
    assert_eq!(text(&output), "node/node-1 uncordoned");

    let Some(ClusterObject::Node(node)) = cluster.object(ResourceKind::Node, None, "node-1") else {
        panic!("node disappeared");
    };
    assert_eq!(node.spec.unwrap().unschedulable, Some(false));
}

#[tokio::test]
async fn test_drain_evicts_pods_on_node() {
    let cluster = drain_fixture();
    let dispatcher = dispatcher(cluster.clone());

    let output = dispatcher
        .dispatch(call("drain_node", json!({"name": "node-1"})))
        .await
        .unwrap();
    assert_eq!(
        text(&output),
        "node/node-1 cordoned\npod/default/web-a evicted\npod/default/web-b evicted\nnode/node-1 drained"
    );
    assert_eq!(cluster.evicted(), vec!["default/web-a", "default/web-b"]);
    assert!(cluster
        .object(ResourceKind::Pod, Some("default"), "web-c")
        .is_some());
}

#[tokio::test]
async fn test_drain_reports_failed_eviction_step() {
    let cluster = drain_fixture();
    cluster.fail_eviction_of("default/web-b");
    let dispatcher = dispatcher(cluster.clone());

    let err = dispatcher
        .dispatch(call("drain_node", json!({"name": "node-1", "force": false})))
        .await
        .unwrap_err();
    assert_eq!(err.failed_step(), Some("evict pod default/web-b"));
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    assert_eq!(cluster.evicted(), vec!["default/web-a"]);
    let Some(ClusterObject::Node(node)) = cluster.object(ResourceKind::Node, None, "node-1") else {
        panic!("node disappeared");
    };
    assert_eq!(node.spec.unwrap().unschedulable, Some(true));
}

#[tokio::test(start_paused = true)]
async fn test_drain_timeout_names_step() {
    let cluster = drain_fixture();
    cluster.stall_evictions();
    let dispatcher = dispatcher(cluster.clone());

    let err = dispatcher
        .dispatch(
            call("drain_node", json!({"name": "node-1"})).with_timeout(Duration::from_secs(2)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(err.failed_step(), Some("evict pod default/web-a"));
    assert!(err.to_string().contains("call deadline passed during evict pod default/web-a"));

    assert!(cluster.evicted().is_empty());
    let Some(ClusterObject::Node(node)) = cluster.object(ResourceKind::Node, None, "node-1") else {
        panic!("node disappeared");
    };
    assert_eq!(node.spec.unwrap().unschedulable, Some(true));
}

#[tokio::test]
async fn test_drain_blocks_on_unmanaged_pods() {
    let cluster = drain_fixture();
    let mut bare = pod_on("default", "debug", "node-1");
    bare.metadata.owner_references = None;
    cluster.insert(bare);
    let dispatcher = dispatcher(cluster.clone());

    let err = dispatcher
        .dispatch(call("drain_node", json!({"name": "node-1"})))
        .await
        .unwrap_err();
    assert_eq!(err.failed_step(), Some("filter pods on node node-1"));
    assert_eq!(err.kind(), ErrorKind::InvalidSpec);
    assert!(err.to_string().contains("default/debug"));
    assert!(cluster.evicted().is_empty());

    dispatcher
        .dispatch(call("drain_node", json!({"name": "node-1", "force": true})))
        .await
        .unwrap();
    assert_eq!(cluster.evicted().len(), 3);
}

#[tokio::test]
async fn test_expose_deployment_creates_matching_service() {
    let cluster = Arc::new(FakeCluster::new().with(deployment("default", "web", &[("app", "web:1.0")])));
    let dispatcher = dispatcher(cluster.clone());

    let output = dispatcher
        .dispatch(call(
            "expose_deployment",
            json!({"name": "web", "namespace": "default", "port": 80, "target_port": 8080}),
        ))
        .await
        .unwrap();
    assert_eq!(text(&output), "service/web exposed");

    let Some(ClusterObject::Service(service)) =
        cluster.object(ResourceKind::Service, Some("default"), "web")
    else {
        panic!("service was not created");
    };
    let spec = service.spec.unwrap();
    assert_eq!(
        spec.selector,
        Some(BTreeMap::from([("app".to_string(), "web".to_string())]))
    );
    assert_eq!(spec.type_.as_deref(), Some("ClusterIP"));
}

// =============================================================================
// Namespaces and services
// =============================================================================

fn quantities(pairs: &[(&str, &str)]) -> BTreeMap<String, Quantity> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Quantity(v.to_string())))
        .collect()
}

#[tokio::test]
async fn test_create_namespace_with_labels() {
    let cluster = Arc::new(FakeCluster::new());
    let dispatcher = dispatcher(cluster.clone());

    let output = dispatcher
        .dispatch(call(
            "create_namespace",
            json!({"name": "staging", "labels": {"team": "web", "env": "staging"}}),
        ))
        .await
        .unwrap();
    assert_eq!(text(&output), "namespace/staging created");

    let Some(ClusterObject::Namespace(ns)) = cluster.object(ResourceKind::Namespace, None, "staging")
    else {
        panic!("namespace was not created");
    };
    assert_eq!(
        ns.metadata.labels,
        Some(BTreeMap::from([
            ("env".to_string(), "staging".to_string()),
            ("team".to_string(), "web".to_string()),
        ]))
    );
}

#[tokio::test]
async fn test_delete_namespace_force_sends_zero_grace() {
    let cluster = Arc::new(FakeCluster::new().with(namespace("scratch")));
    let dispatcher = dispatcher(cluster.clone());

    let output = dispatcher
        .dispatch(call("delete_namespace", json!({"name": "scratch", "force": true})))
        .await
        .unwrap();
    assert_eq!(text(&output), "namespace \"scratch\" deleted");
    assert!(cluster.object(ResourceKind::Namespace, None, "scratch").is_none());

    let deleted = cluster.deleted();
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].0, "namespaces//scratch");
    assert_eq!(deleted[0].1.grace_period_seconds, Some(0));

    let err = dispatcher
        .dispatch(call("delete_namespace", json!({"name": "scratch"})))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_namespace_quota_table() {
    let cluster = Arc::new(FakeCluster::new().with(ResourceQuota {
        metadata: meta(Some("team-a"), "compute-quota"),
        status: Some(ResourceQuotaStatus {
            hard: Some(quantities(&[("pods", "10"), ("requests.cpu", "4"), ("limits.cpu", "8")])),
            used: Some(quantities(&[("pods", "3"), ("requests.cpu", "1"), ("limits.cpu", "2")])),
        }),
        ..Default::default()
    }));
    let dispatcher = dispatcher(cluster);

    let output = dispatcher
        .dispatch(call("get_namespace_quota", json!({"namespace": "team-a"})))
        .await
        .unwrap();
    let expected = [
        format!("{:<16}{:<6}{:<33}{}", "NAME", "AGE", "REQUEST", "LIMIT"),
        format!(
            "{:<16}{:<6}{:<33}{}",
            "compute-quota", "90m", "pods: 3/10, requests.cpu: 1/4", "limits.cpu: 2/8"
        ),
    ]
    .join("\n");
    assert_eq!(text(&output), expected);
}

#[tokio::test]
async fn test_namespace_without_quota() {
    let cluster = Arc::new(FakeCluster::new().with(namespace("team-b")));
    let dispatcher = dispatcher(cluster);

    let output = dispatcher
        .dispatch(call("get_namespace_quota", json!({"namespace": "team-b"})))
        .await
        .unwrap();
    assert_eq!(text(&output), "No resources found in team-b namespace.");
}

#[tokio::test]
async fn test_service_endpoints_table() {
    let cluster = Arc::new(FakeCluster::new().with(Endpoints {
        metadata: meta(Some("default"), "web"),
        subsets: Some(vec![EndpointSubset {
            addresses: Some(vec![
                EndpointAddress {
                    ip: "10.0.0.5".to_string(),
                    ..Default::default()
                },
                EndpointAddress {
                    ip: "10.0.0.6".to_string(),
                    ..Default::default()
                },
            ]),
            ports: Some(vec![EndpointPort {
                port: 8080,
                ..Default::default()
            }]),
            ..Default::default()
        }]),
    }));
    let dispatcher = dispatcher(cluster);

    let output = dispatcher
        .dispatch(call(
            "get_service_endpoints",
            json!({"name": "web", "namespace": "default"}),
        ))
        .await
        .unwrap();
    let expected = [
        format!("{:<7}{:<30}{}", "NAME", "ENDPOINTS", "AGE"),
        format!("{:<7}{:<30}{}", "web", "10.0.0.5:8080,10.0.0.6:8080", "90m"),
    ]
    .join("\n");
    assert_eq!(text(&output), expected);

    let err = dispatcher
        .dispatch(call(
            "get_service_endpoints",
            json!({"name": "api", "namespace": "default"}),
        ))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// =============================================================================
// Jobs and cron jobs
// =============================================================================

fn job(namespace: &str, name: &str, owner: Option<&str>, minutes_ago: i64) -> Job {
    let mut metadata = meta(Some(namespace), name);
    metadata.creation_timestamp = Some(created(minutes_ago));
    metadata.owner_references = owner.map(|cronjob| {
        vec![OwnerReference {
            api_version: "batch/v1".to_string(),
            kind: "CronJob".to_string(),
            name: cronjob.to_string(),
            uid: "5d2c1b0a-9f8e-4d7c-6b5a-4f3e2d1c0b9a".to_string(),
            controller: Some(true),
            ..Default::default()
        }]
    });
    Job {
        metadata,
        ..Default::default()
    }
}

fn job_pod(namespace: &str, name: &str, job: &str) -> Pod {
    let mut pod = pod_on(namespace, name, "node-1");
    pod.metadata.labels = Some(BTreeMap::from([("job-name".to_string(), job.to_string())]));
    pod
}

#[tokio::test]
async fn test_create_job_from_template() {
    let cluster = Arc::new(FakeCluster::new());
    let dispatcher = dispatcher(cluster.clone());

    let output = dispatcher
        .dispatch(call(
            "create_job",
            json!({
                "name": "migrate",
                "namespace": "default",
                "template": "custom",
                "image": "migrate:2.1",
                "command": ["./migrate", "up"],
                "completions": 2
            }),
        ))
        .await
        .unwrap();
    assert_eq!(text(&output), "job.batch/migrate created");

    let Some(ClusterObject::Job(job)) = cluster.object(ResourceKind::Job, Some("default"), "migrate")
    else {
        panic!("job was not created");
    };
    let spec = job.spec.unwrap();
    assert_eq!(spec.completions, Some(2));
    assert_eq!(spec.backoff_limit, Some(6));
    let pod_spec = spec.template.spec.unwrap();
    assert_eq!(pod_spec.restart_policy.as_deref(), Some("OnFailure"));
    assert_eq!(pod_spec.containers[0].image.as_deref(), Some("migrate:2.1"));
}

#[tokio::test]
async fn test_create_cronjob_rejects_bad_schedule() {
    let cluster = Arc::new(FakeCluster::new());
    let dispatcher = dispatcher(cluster.clone());

    let err = dispatcher
        .dispatch(call(
            "create_cronjob",
            json!({"name": "nightly", "namespace": "default", "template": "nginx", "schedule": "every day"}),
        ))
        .await
        .unwrap_err();
    assert_eq!(err.invalid_field(), Some("schedule"));
    assert_eq!(cluster.calls(), 0);

    let output = dispatcher
        .dispatch(call(
            "create_cronjob",
            json!({"name": "nightly", "namespace": "default", "template": "nginx", "schedule": "@daily", "suspend": true}),
        ))
        .await
        .unwrap();
    assert_eq!(text(&output), "cronjob.batch/nightly created");
    let Some(ClusterObject::CronJob(cronjob)) =
        cluster.object(ResourceKind::CronJob, Some("default"), "nightly")
    else {
        panic!("cron job was not created");
    };
    let spec = cronjob.spec.unwrap();
    assert_eq!(spec.schedule, "@daily");
    assert_eq!(spec.suspend, Some(true));
}

#[tokio::test]
async fn test_job_logs_cover_every_pod() {
    let cluster = Arc::new(
        FakeCluster::new()
            .with(job("default", "migrate", None, 30))
            .with(job_pod("default", "migrate-b", "migrate"))
            .with(job_pod("default", "migrate-a", "migrate"))
            .with(job_pod("default", "other-x", "other")),
    );
    cluster.set_logs("default", "migrate-a", "step 1\nstep 2");
    let dispatcher = dispatcher(cluster);

    let output = dispatcher
        .dispatch(call("get_job_logs", json!({"name": "migrate", "namespace": "default"})))
        .await
        .unwrap();
    assert_eq!(
        text(&output),
        "=== Logs from pod migrate-a ===\nstep 1\nstep 2\n=== Logs from pod migrate-b ==="
    );

    let err = dispatcher
        .dispatch(call("get_job_logs", json!({"name": "absent", "namespace": "default"})))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.failed_step(), Some("read job default/absent"));
}

#[tokio::test]
async fn test_job_without_pods() {
    let cluster = Arc::new(FakeCluster::new().with(job("default", "migrate", None, 30)));
    let dispatcher = dispatcher(cluster);

    let output = dispatcher
        .dispatch(call("get_job_logs", json!({"name": "migrate", "namespace": "default"})))
        .await
        .unwrap();
    assert_eq!(text(&output), "No pods found for job default/migrate");
}

#[tokio::test]
async fn test_cronjob_logs_follow_owned_jobs() {
    let cluster = Arc::new(
        FakeCluster::new()
            .with(CronJob {
                metadata: meta(Some("default"), "nightly"),
                ..Default::default()
            })
            .with(job("default", "nightly-200", Some("nightly"), 10))
            .with(job("default", "nightly-100", Some("nightly"), 70))
            .with(job("default", "manual", None, 5))
            .with(job_pod("default", "nightly-100-x", "nightly-100"))
            .with(job_pod("default", "nightly-200-y", "nightly-200"))
            .with(job_pod("default", "manual-z", "manual")),
    );
    cluster.set_logs("default", "nightly-100-x", "done");
    cluster.set_logs("default", "nightly-200-y", "running");
    let dispatcher = dispatcher(cluster);

    let output = dispatcher
        .dispatch(call(
            "get_cronjob_logs",
            json!({"name": "nightly", "namespace": "default"}),
        ))
        .await
        .unwrap();
    assert_eq!(
        text(&output),
        "=== Logs from pod nightly-100-x in job nightly-100 ===\ndone\n\
         === Logs from pod nightly-200-y in job nightly-200 ===\nrunning"
    );
}

#[tokio::test]
async fn test_cronjob_without_jobs() {
    let cluster = Arc::new(FakeCluster::new().with(CronJob {
        metadata: meta(Some("default"), "nightly"),
        ..Default::default()
    }));
    let dispatcher = dispatcher(cluster);

    let output = dispatcher
        .dispatch(call(
            "get_cronjob_logs",
            json!({"name": "nightly", "namespace": "default"}),
        ))
        .await
        .unwrap();
    assert_eq!(text(&output), "No jobs found for cronjob default/nightly");
}

#[tokio::test]
async fn test_delete_job_propagates_to_pods() {
    let cluster = Arc::new(FakeCluster::new().with(job("default", "migrate", None, 30)));
    let dispatcher = dispatcher(cluster.clone());

    let output = dispatcher
        .dispatch(call("delete_job", json!({"name": "migrate", "namespace": "default"})))
        .await
        .unwrap();
    assert_eq!(text(&output), "job.batch \"migrate\" deleted");
    let deleted = cluster.deleted();
    assert_eq!(deleted[0].0, "jobs/default/migrate");
    assert_eq!(deleted[0].1.propagation, Some(Propagation::Background));
}

// =============================================================================
// Ingresses and manifests
// =============================================================================

#[tokio::test]
async fn test_create_and_update_ingress() {
    let cluster = Arc::new(FakeCluster::new());
    let dispatcher = dispatcher(cluster.clone());

    let output = dispatcher
        .dispatch(call(
            "create_ingress",
            json!({
                "name": "shop",
                "namespace": "default",
                "ingress_class": "nginx",
                "rules": [{"host": "shop.example.com", "paths": [{"path": "/api", "service": {"name": "api", "port": "http"}}]}],
                "tls": [{"hosts": ["shop.example.com"], "secretName": "shop-tls"}]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(text(&output), "ingress.networking.k8s.io/shop created");

    let output = dispatcher
        .dispatch(call(
            "update_ingress",
            json!({"name": "shop", "namespace": "default", "annotations": {"team": "web"}}),
        ))
        .await
        .unwrap();
    assert_eq!(text(&output), "ingress.networking.k8s.io/shop patched");

    let Some(ClusterObject::Ingress(ingress)) =
        cluster.object(ResourceKind::Ingress, Some("default"), "shop")
    else {
        panic!("ingress was not created");
    };
    assert_eq!(
        ingress.metadata.annotations,
        Some(BTreeMap::from([("team".to_string(), "web".to_string())]))
    );
    let spec = ingress.spec.unwrap();
    assert_eq!(spec.ingress_class_name.as_deref(), Some("nginx"));
    let rules = spec.rules.unwrap();
    let path = &rules[0].http.as_ref().unwrap().paths[0];
    assert_eq!(path.path.as_deref(), Some("/api"));
    let port = path.backend.service.as_ref().unwrap().port.as_ref().unwrap();
    assert_eq!(port.name.as_deref(), Some("http"));
    assert_eq!(spec.tls.unwrap()[0].secret_name.as_deref(), Some("shop-tls"));
}

#[tokio::test]
async fn test_ingress_rule_shape_errors_name_rules() {
    let cluster = Arc::new(FakeCluster::new());
    let dispatcher = dispatcher(cluster.clone());

    let err = dispatcher
        .dispatch(call(
            "create_ingress",
            json!({"name": "shop", "namespace": "default", "rules": [{"paths": [{"service": {"name": "api"}}]}]}),
        ))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.invalid_field(), Some("rules"));
    assert_eq!(cluster.calls(), 0);
}

#[tokio::test]
async fn test_apply_yaml_creates_then_configures() {
    let cluster = Arc::new(FakeCluster::new());
    let dispatcher = dispatcher(cluster.clone());
    let manifest = "\
apiVersion: v1
kind: Namespace
metadata:
  name: tools
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
data:
  mode: fast
";

    let output = dispatcher
        .dispatch(call(
            "apply_yaml",
            json!({"yaml_content": manifest, "namespace": "tools"}),
        ))
        .await
        .unwrap();
    assert_eq!(text(&output), "namespace/tools created\nconfigmap/settings created");

    let updated = manifest.replace("mode: fast", "mode: safe");
    let output = dispatcher
        .dispatch(call(
            "apply_yaml",
            json!({"yaml_content": updated, "namespace": "tools"}),
        ))
        .await
        .unwrap();
    assert_eq!(text(&output), "namespace/tools configured\nconfigmap/settings configured");

    let Some(ClusterObject::ConfigMap(config)) =
        cluster.object(ResourceKind::ConfigMap, Some("tools"), "settings")
    else {
        panic!("config map was not created");
    };
    assert_eq!(config.data.unwrap()["mode"], "safe");
}

#[tokio::test]
async fn test_apply_yaml_checks_every_document_first() {
    let cluster = Arc::new(FakeCluster::new());
    let dispatcher = dispatcher(cluster.clone());
    let manifest = "\
apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
---
apiVersion: v1
kind: Secret
metadata:
  name: token
";

    let err = dispatcher
        .dispatch(call("apply_yaml", json!({"yaml_content": manifest})))
        .await
        .unwrap_err();
    assert_eq!(err.invalid_field(), Some("yaml_content"));
    assert!(err.to_string().contains("document 2: unsupported kind v1 Secret"));
    assert_eq!(cluster.calls(), 0);
}

#[tokio::test]
async fn test_apply_yaml_mixes_create_and_configure() {
    let cluster = Arc::new(FakeCluster::new().with(ConfigMap {
        metadata: meta(Some("default"), "settings"),
        ..Default::default()
    }));
    let dispatcher = dispatcher(cluster.clone());
    let manifest = "\
apiVersion: batch/v1
kind: Job
metadata:
  name: migrate
spec:
  template:
    spec:
      restartPolicy: Never
      containers:
      - name: migrate
        image: migrate:2.1
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
data:
  mode: fast
";

    let output = dispatcher
        .dispatch(call("apply_yaml", json!({"yaml_content": manifest})))
        .await
        .unwrap();
    assert_eq!(text(&output), "job.batch/migrate created\nconfigmap/settings configured");
    assert!(cluster.object(ResourceKind::Job, Some("default"), "migrate").is_some());
}
