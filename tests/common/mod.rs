//! In-memory `ClusterApi` for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::{stream, StreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kube_mcp_core::cluster::{
    ClusterApi, ClusterObject, ClusterResourceRef, DeleteOptions, ExecOutput, ListOptions,
    LogLines, LogOptions, PatchBody, ResourceKind, ServerVersion,
};
use kube_mcp_core::{Config, Dispatcher, Error, Result};

type Key = (&'static str, String, String);

#[derive(Default)]
struct State {
    objects: BTreeMap<Key, ClusterObject>,
    logs: HashMap<String, String>,
    failing_evictions: HashSet<String>,
    evicted: Vec<String>,
    stall_evictions: bool,
    deleted: Vec<(String, DeleteOptions)>,
    calls: usize,
    delay: Option<Duration>,
    hold_log_streams: bool,
}

/// Cluster state held in memory. Mutations apply immediately.
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

fn key(kind: ResourceKind, namespace: Option<&str>, name: &str) -> Key {
    (
        kind.plural(),
        namespace.unwrap_or_default().to_string(),
        name.to_string(),
    )
}

fn ref_key(target: &ClusterResourceRef) -> Key {
    key(
        target.kind,
        target.namespace.as_deref(),
        target.name.as_deref().unwrap_or_default(),
    )
}

fn object_key(object: &ClusterObject) -> Key {
    key(object.kind(), object.namespace(), object.name())
}

/// Reference time shared by fixtures and the dispatcher clock.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn created(minutes_ago: i64) -> Time {
    Time(now() - chrono::Duration::minutes(minutes_ago))
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, object: impl Into<ClusterObject>) -> Self {
        self.insert(object);
        self
    }

    pub fn insert(&self, object: impl Into<ClusterObject>) {
        let object = object.into();
        self.state
            .lock()
            .unwrap()
            .objects
            .insert(object_key(&object), object);
    }

    pub fn object(&self, kind: ResourceKind, namespace: Option<&str>, name: &str) -> Option<ClusterObject> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&key(kind, namespace, name))
            .cloned()
    }

    pub fn set_logs(&self, namespace: &str, pod: &str, text: &str) {
        self.state
            .lock()
            .unwrap()
            .logs
            .insert(format!("{}/{}", namespace, pod), text.to_string());
    }

    /// Evictions of `namespace/name` fail with a disruption-budget error.
    pub fn fail_eviction_of(&self, pod: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_evictions
            .insert(pod.to_string());
    }

    pub fn evicted(&self) -> Vec<String> {
        self.state.lock().unwrap().evicted.clone()
    }

    /// Evictions never complete.
    pub fn stall_evictions(&self) {
        self.state.lock().unwrap().stall_evictions = true;
    }

    /// Every delete so far as `plural/namespace/name` with its options.
    pub fn deleted(&self) -> Vec<(String, DeleteOptions)> {
        self.state.lock().unwrap().deleted.clone()
    }

    /// Number of adapter calls made so far.
    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls
    }

    /// Delay every `get` by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }

    /// Keep follow streams open after the stored lines are sent.
    pub fn hold_log_streams(&self) {
        self.state.lock().unwrap().hold_log_streams = true;
    }

    fn record_call(&self) {
        self.state.lock().unwrap().calls += 1;
    }

    fn lookup(&self, target: &ClusterResourceRef) -> Result<ClusterObject> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&ref_key(target))
            .cloned()
            .ok_or_else(|| Error::not_found(format!("{} not found", target)))
    }

    fn pod_logs(&self, target: &ClusterResourceRef, opts: &LogOptions) -> Result<Vec<String>> {
        self.lookup(target)?;
        let ns = target.namespace.clone().unwrap_or_default();
        let name = target.name.clone().unwrap_or_default();
        let text = self
            .state
            .lock()
            .unwrap()
            .logs
            .get(&format!("{}/{}", ns, name))
            .cloned()
            .unwrap_or_default();
        let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
        if let Some(tail) = opts.tail_lines {
            let keep = (tail.max(0) as usize).min(lines.len());
            lines = lines.split_off(lines.len() - keep);
        }
        Ok(lines)
    }
}

pub fn dispatcher(cluster: Arc<FakeCluster>) -> Dispatcher {
    dispatcher_with(cluster, Config::default())
}

pub fn dispatcher_with(cluster: Arc<FakeCluster>, config: Config) -> Dispatcher {
    Dispatcher::new(cluster, config)
        .unwrap()
        .with_fixed_clock(now())
}

// =============================================================================
// Patch application
// =============================================================================

/// RFC 7386 JSON merge patch.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    match patch {
        Value::Object(patch_map) => {
            if !target.is_object() {
                *target = Value::Object(Map::new());
            }
            if let Value::Object(target_map) = target {
                for (k, v) in patch_map {
                    if v.is_null() {
                        target_map.remove(k);
                    } else {
                        merge_patch(target_map.entry(k.clone()).or_insert(Value::Null), v);
                    }
                }
            }
        }
        other => *target = other.clone(),
    }
}

/// Merge patch where lists of named objects merge element-wise by `name`.
pub fn strategic_patch(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            for (k, v) in patch_map {
                if v.is_null() {
                    target_map.remove(k);
                } else {
                    strategic_patch(target_map.entry(k.clone()).or_insert(Value::Null), v);
                }
            }
        }
        (Value::Array(target_items), Value::Array(patch_items))
            if patch_items.iter().all(|i| i.get("name").is_some()) =>
        {
            for item in patch_items {
                let existing = target_items
                    .iter_mut()
                    .find(|t| t.get("name") == item.get("name"));
                match existing {
                    Some(existing) => strategic_patch(existing, item),
                    None => target_items.push(item.clone()),
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

fn labels_match(object: &ClusterObject, selector: &str) -> bool {
    let labels = object.metadata().labels.clone().unwrap_or_default();
    selector.split(',').filter(|s| !s.is_empty()).all(|term| {
        match term.split_once("!=") {
            Some((k, v)) => labels.get(k.trim()).map(String::as_str) != Some(v.trim()),
            None => match term.split_once('=') {
                Some((k, v)) => labels.get(k.trim()).map(String::as_str) == Some(v.trim()),
                None => labels.contains_key(term.trim()),
            },
        }
    })
}

fn fields_match(object: &ClusterObject, selector: &str) -> bool {
    selector.split(',').filter(|s| !s.is_empty()).all(|term| {
        let Some((field, expected)) = term.split_once('=') else {
            return false;
        };
        let actual = match (object, field) {
            (ClusterObject::Pod(pod), "spec.nodeName") => {
                pod.spec.as_ref().and_then(|s| s.node_name.clone())
            }
            (ClusterObject::Pod(pod), "status.phase") => {
                pod.status.as_ref().and_then(|s| s.phase.clone())
            }
            (_, "metadata.name") => Some(object.name().to_string()),
            _ => None,
        };
        actual.as_deref() == Some(expected)
    })
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn list(&self, target: &ClusterResourceRef, opts: &ListOptions) -> Result<Vec<ClusterObject>> {
        self.record_call();
        let state = self.state.lock().unwrap();
        Ok(state
            .objects
            .values()
            .filter(|o| o.kind() == target.kind)
            .filter(|o| match &target.namespace {
                Some(ns) => o.namespace() == Some(ns.as_str()),
                None => true,
            })
            .filter(|o| {
                opts.label_selector
                    .as_deref()
                    .map_or(true, |s| labels_match(o, s))
            })
            .filter(|o| {
                opts.field_selector
                    .as_deref()
                    .map_or(true, |s| fields_match(o, s))
            })
            .cloned()
            .collect())
    }

    async fn get(&self, target: &ClusterResourceRef) -> Result<ClusterObject> {
        self.record_call();
        let delay = self.state.lock().unwrap().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.lookup(target)
    }

    async fn create(&self, object: ClusterObject) -> Result<ClusterObject> {
        self.record_call();
        let mut state = self.state.lock().unwrap();
        let key = object_key(&object);
        if state.objects.contains_key(&key) {
            return Err(Error::invalid_spec(format!(
                "{} \"{}\" already exists",
                object.kind().plural(),
                object.name()
            )));
        }
        state.objects.insert(key, object.clone());
        Ok(object)
    }

    async fn delete(&self, target: &ClusterResourceRef, opts: &DeleteOptions) -> Result<()> {
        self.record_call();
        let mut state = self.state.lock().unwrap();
        let (plural, ns, name) = ref_key(target);
        state
            .objects
            .remove(&(plural, ns.clone(), name.clone()))
            .ok_or_else(|| Error::not_found(format!("{} not found", target)))?;
        state
            .deleted
            .push((format!("{}/{}/{}", plural, ns, name), opts.clone()));
        Ok(())
    }

    async fn patch(&self, target: &ClusterResourceRef, patch: &PatchBody) -> Result<ClusterObject> {
        self.record_call();
        let current = self.lookup(target)?;
        let mut value = current.to_value()?;
        match patch {
            PatchBody::Merge(p) => merge_patch(&mut value, p),
            PatchBody::Strategic(p) => strategic_patch(&mut value, p),
        }
        let updated = ClusterObject::from_value(target.kind, value)?;
        self.insert(updated.clone());
        Ok(updated)
    }

    async fn scale(&self, target: &ClusterResourceRef, replicas: i32) -> Result<()> {
        self.record_call();
        let mut deployment = Deployment::try_from(self.lookup(target)?)?;
        deployment.spec.get_or_insert_with(Default::default).replicas = Some(replicas);
        self.insert(deployment);
        Ok(())
    }

    async fn evict(&self, target: &ClusterResourceRef, _opts: &DeleteOptions) -> Result<()> {
        self.record_call();
        self.lookup(target)?;
        let stall = self.state.lock().unwrap().stall_evictions;
        if stall {
            std::future::pending::<()>().await;
        }
        let pod = format!(
            "{}/{}",
            target.namespace.as_deref().unwrap_or_default(),
            target.name.as_deref().unwrap_or_default()
        );
        let mut state = self.state.lock().unwrap();
        if state.failing_evictions.contains(&pod) {
            return Err(Error::forbidden(
                "Cannot evict pod as it would violate the pod's disruption budget.",
            ));
        }
        state.objects.remove(&ref_key(target));
        state.evicted.push(pod);
        Ok(())
    }

    async fn exec(
        &self,
        target: &ClusterResourceRef,
        _container: Option<String>,
        command: Vec<String>,
    ) -> Result<ExecOutput> {
        self.record_call();
        self.lookup(target)?;
        Ok(ExecOutput {
            stdout: format!("{}\n", command.join(" ")),
            success: true,
            ..Default::default()
        })
    }

    async fn logs(&self, target: &ClusterResourceRef, opts: &LogOptions) -> Result<String> {
        self.record_call();
        Ok(self.pod_logs(target, opts)?.join("\n"))
    }

    async fn log_stream(&self, target: &ClusterResourceRef, opts: &LogOptions) -> Result<LogLines> {
        self.record_call();
        let lines = self.pod_logs(target, opts)?;
        let hold = self.state.lock().unwrap().hold_log_streams;
        let sent = stream::iter(lines.into_iter().map(Ok));
        if hold {
            Ok(sent.chain(stream::pending()).boxed())
        } else {
            Ok(sent.boxed())
        }
    }

    async fn server_version(&self) -> Result<ServerVersion> {
        self.record_call();
        Ok(ServerVersion {
            git_version: "v1.30.2".to_string(),
            platform: "linux/amd64".to_string(),
        })
    }
}
