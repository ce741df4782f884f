//! In-memory QingCloud used by scenario tests.
//!
//! Resources are kept as the JSON records the real API returns. Mutating calls
//! start a transition that lasts a fixed number of describe calls, so callers
//! exercise their wait loops. Mutating calls issued while a resource is still
//! transitioning are recorded as violations.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::Result;

use super::client::{classify_response, RemoteClient};
use super::types::ApiRequest;

#[derive(Debug, Default)]
struct Pending {
    polls_left: u32,
    settle_to: String,
}

#[derive(Debug, Default)]
struct FakeState {
    instances: BTreeMap<String, Value>,
    caches: BTreeMap<String, Value>,
    pending: HashMap<String, Pending>,
    calls: Vec<ApiRequest>,
    failures: HashMap<String, VecDeque<i64>>,
    violations: Vec<String>,
    next_id: u32,
    transition_polls: u32,
    lease_status: String,
}

/// A stateful fake of the QingCloud API.
#[derive(Debug)]
pub struct FakeCloud {
    state: Mutex<FakeState>,
}

impl FakeCloud {
    /// Creates an empty cloud whose transitions last one describe call.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState {
                transition_polls: 1,
                lease_status: String::from("active"),
                ..FakeState::default()
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Adds a running instance.
    pub fn insert_instance(&self, id: &str, cpu: u32, memory: u32) {
        self.insert_instance_record(json!({
            "instance_id": id,
            "instance_name": "web",
            "description": "",
            "status": "running",
            "transition_status": "",
            "vcpus_current": cpu,
            "memory_current": memory,
            "instance_class": 0,
            "image": {"image_id": "centos7x64"},
            "vxnets": [{"vxnet_id": "vxnet-0", "vxnet_type": 2, "private_ip": "192.168.0.2"}],
            "eip": null,
            "security_group": {"security_group_id": "sg-default"},
            "keypair_ids": ["kp-1"],
            "volume_ids": [],
            "tags": []
        }));
    }

    /// Adds an instance from a raw record.
    pub fn insert_instance_record(&self, record: Value) {
        let id = record["instance_id"].as_str().unwrap_or_default().to_string();
        self.lock().instances.insert(id, record);
    }

    /// Adds an active cache.
    pub fn insert_cache(&self, id: &str, cache_size: u32) {
        let record = json!({
            "cache_id": id,
            "cache_name": "sessions",
            "description": "",
            "status": "active",
            "transition_status": "",
            "cache_size": cache_size,
            "cache_type": "redis3.0.5",
            "node_count": 1,
            "auto_backup_time": -1,
            "vxnet": {"vxnet_id": "vxnet-abc"},
            "tags": []
        });
        self.lock().caches.insert(id.to_string(), record);
    }

    /// Sets a field on a stored instance.
    pub fn set_instance_field(&self, id: &str, field: &str, value: Value) {
        if let Some(record) = self.lock().instances.get_mut(id) {
            record[field] = value;
        }
    }

    /// Sets a field on a stored cache.
    pub fn set_cache_field(&self, id: &str, field: &str, value: Value) {
        if let Some(record) = self.lock().caches.get_mut(id) {
            record[field] = value;
        }
    }

    /// Current record of an instance.
    pub fn instance(&self, id: &str) -> Option<Value> {
        self.lock().instances.get(id).cloned()
    }

    /// Current record of a cache.
    pub fn cache(&self, id: &str) -> Option<Value> {
        self.lock().caches.get(id).cloned()
    }

    /// Number of describe calls every transition lasts.
    pub fn set_transition_polls(&self, polls: u32) {
        self.lock().transition_polls = polls;
    }

    /// Lease status reported by `GetLeaseInfo`.
    pub fn set_lease_status(&self, status: &str) {
        self.lock().lease_status = status.to_string();
    }

    /// Makes the next `times` calls of `action` fail with `ret_code`.
    pub fn fail_next(&self, action: &str, ret_code: i64, times: usize) {
        self.lock()
            .failures
            .entry(action.to_string())
            .or_default()
            .extend(std::iter::repeat_n(ret_code, times));
    }

    /// Every request received, in order.
    pub fn calls(&self) -> Vec<ApiRequest> {
        self.lock().calls.clone()
    }

    /// Action names of every request received, in order.
    pub fn actions(&self) -> Vec<&'static str> {
        self.lock().calls.iter().map(ApiRequest::action).collect()
    }

    /// Action names of the mutating requests received, in order.
    pub fn mutating_actions(&self) -> Vec<&'static str> {
        self.actions()
            .into_iter()
            .filter(|action| !is_read_only(action))
            .collect()
    }

    /// Mutating calls issued while their target was not stable.
    pub fn violations(&self) -> Vec<String> {
        self.lock().violations.clone()
    }

    /// Forgets the recorded calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }
}

fn is_read_only(action: &str) -> bool {
    action.starts_with("Describe") || action == "GetLeaseInfo"
}

fn ok(mut body: Map<String, Value>) -> Value {
    body.insert(String::from("ret_code"), json!(0));
    Value::Object(body)
}

fn string_list(values: &[&str]) -> Value {
    Value::Array(values.iter().map(|v| json!(v)).collect())
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{:08x}", self.next_id)
    }

    fn record_mut(&mut self, id: &str) -> Option<&mut Value> {
        if id.starts_with("c-") {
            self.caches.get_mut(id)
        } else {
            self.instances.get_mut(id)
        }
    }

    /// Puts a resource into `transition` until it settles to `settle_to`.
    fn begin(&mut self, id: &str, transition: &str, settle_to: &str) {
        let polls = self.transition_polls;
        let Some(record) = self.record_mut(id) else {
            return;
        };
        if polls == 0 {
            record["status"] = json!(settle_to);
            return;
        }
        record["transition_status"] = json!(transition);
        self.pending.insert(
            id.to_string(),
            Pending {
                polls_left: polls,
                settle_to: settle_to.to_string(),
            },
        );
    }

    /// Begins a transition that keeps the current status.
    fn touch(&mut self, id: &str) {
        let status = self
            .record_mut(id)
            .and_then(|r| r["status"].as_str().map(String::from))
            .unwrap_or_default();
        self.begin(id, "updating", &status);
    }

    /// Advances a transition after it has been observed once.
    fn advance(&mut self, id: &str) {
        let Some(pending) = self.pending.get_mut(id) else {
            return;
        };
        pending.polls_left = pending.polls_left.saturating_sub(1);
        if pending.polls_left > 0 {
            return;
        }
        let settle_to = std::mem::take(&mut pending.settle_to);
        self.pending.remove(id);
        if let Some(record) = self.record_mut(id) {
            record["status"] = json!(settle_to);
            record["transition_status"] = json!("");
        }
    }

    fn check_stable(&mut self, action: &str, id: &str, required_status: Option<&str>) {
        let Some(record) = self.record_mut(id) else {
            return;
        };
        let transition = record["transition_status"].as_str().unwrap_or_default().to_string();
        let status = record["status"].as_str().unwrap_or_default().to_string();
        if !transition.is_empty() {
            self.violations
                .push(format!("{action} on {id} while {transition}"));
        } else if let Some(required) = required_status {
            if status != required {
                self.violations
                    .push(format!("{action} on {id} while {status}"));
            }
        }
    }

    fn describe(&mut self, ids: &[&str], caches: bool) -> Vec<Value> {
        let mut found = Vec::new();
        for id in ids {
            let record = if caches {
                self.caches.get(*id)
            } else {
                self.instances.get(*id)
            };
            if let Some(record) = record {
                found.push(record.clone());
                self.advance(id);
            }
        }
        found
    }

    fn handle(&mut self, request: &ApiRequest) -> Value {
        let action = request.action();
        let param = |key: &str| request.param(key).unwrap_or_default().to_string();

        match action {
            "RunInstances" => {
                let id = self.next_id("i");
                let record = json!({
                    "instance_id": id,
                    "instance_name": param("instance_name"),
                    "description": "",
                    "status": "pending",
                    "transition_status": "",
                    "vcpus_current": param("cpu").parse::<u32>().unwrap_or_default(),
                    "memory_current": param("memory").parse::<u32>().unwrap_or_default(),
                    "instance_class": param("instance_class").parse::<u32>().unwrap_or_default(),
                    "image": {"image_id": param("image_id")},
                    "vxnets": [],
                    "eip": null,
                    "security_group": {"security_group_id": param("security_group")},
                    "keypair_ids": [param("login_keypair")],
                    "volume_ids": [],
                    "tags": []
                });
                self.instances.insert(id.clone(), record);
                self.begin(&id, "creating", "running");
                ok(Map::from_iter([(String::from("instances"), json!([id]))]))
            }
            "DescribeInstances" => {
                let set = self.describe(&request.list("instances"), false);
                ok(Map::from_iter([(String::from("instance_set"), Value::Array(set))]))
            }
            "GetLeaseInfo" => ok(Map::from_iter([(
                String::from("lease_info"),
                json!({"status": self.lease_status}),
            )])),
            "ModifyInstanceAttributes" => {
                let id = param("instance");
                self.check_stable(action, &id, None);
                if let Some(record) = self.instances.get_mut(&id) {
                    if let Some(name) = request.param("instance_name") {
                        record["instance_name"] = json!(name);
                    }
                    if let Some(description) = request.param("description") {
                        record["description"] = json!(description);
                    }
                }
                ok(Map::new())
            }
            "LeaveVxnet" | "JoinVxnet" => {
                let vxnet = param("vxnet");
                for id in request.list("instances") {
                    self.check_stable(action, id, None);
                    if let Some(record) = self.instances.get_mut(id) {
                        let mut vxnets = record["vxnets"].as_array().cloned().unwrap_or_default();
                        if action == "LeaveVxnet" {
                            vxnets.retain(|v| v["vxnet_id"] != json!(vxnet));
                        } else {
                            let vxnet_type = if vxnet == "vxnet-0" { 2 } else { 1 };
                            vxnets.push(json!({
                                "vxnet_id": vxnet,
                                "vxnet_type": vxnet_type,
                                "private_ip": "10.0.0.2"
                            }));
                        }
                        record["vxnets"] = Value::Array(vxnets);
                    }
                    self.touch(id);
                }
                ok(Map::new())
            }
            "ApplySecurityGroup" => {
                for id in request.list("instances") {
                    self.check_stable(action, id, None);
                    if let Some(record) = self.instances.get_mut(id) {
                        record["security_group"] =
                            json!({"security_group_id": param("security_group")});
                    }
                }
                ok(Map::new())
            }
            "DissociateEips" => {
                let eips = request.list("eips");
                let bound: Vec<String> = self
                    .instances
                    .iter()
                    .filter(|(_, r)| {
                        r["eip"]["eip_id"]
                            .as_str()
                            .is_some_and(|eip| eips.contains(&eip))
                    })
                    .map(|(id, _)| id.clone())
                    .collect();
                for id in bound {
                    self.check_stable(action, &id, None);
                    if let Some(record) = self.instances.get_mut(&id) {
                        record["eip"] = Value::Null;
                    }
                    self.touch(&id);
                }
                ok(Map::new())
            }
            "AssociateEip" => {
                let id = param("instance");
                self.check_stable(action, &id, None);
                if let Some(record) = self.instances.get_mut(&id) {
                    record["eip"] = json!({"eip_id": param("eip"), "eip_addr": "139.198.0.10"});
                }
                self.touch(&id);
                ok(Map::new())
            }
            "AttachKeyPairs" | "DetachKeyPairs" => {
                let keypairs = request.list("keypairs");
                for id in request.list("instances") {
                    self.check_stable(action, id, None);
                    if let Some(record) = self.instances.get_mut(id) {
                        update_list(record, "keypair_ids", &keypairs, action == "AttachKeyPairs");
                    }
                    self.touch(id);
                }
                ok(Map::new())
            }
            "AttachVolumes" | "DetachVolumes" => {
                let id = param("instance");
                self.check_stable(action, &id, None);
                if let Some(record) = self.instances.get_mut(&id) {
                    let volumes = request.list("volumes");
                    update_list(record, "volume_ids", &volumes, action == "AttachVolumes");
                }
                self.touch(&id);
                ok(Map::new())
            }
            "StopInstances" | "StartInstances" | "TerminateInstances" => {
                let (transition, settle_to) = match action {
                    "StopInstances" => ("stopping", "stopped"),
                    "StartInstances" => ("starting", "running"),
                    _ => ("terminating", "terminated"),
                };
                for id in request.list("instances") {
                    self.check_stable(action, id, None);
                    self.begin(id, transition, settle_to);
                }
                ok(Map::new())
            }
            "ResizeInstances" => {
                for id in request.list("instances") {
                    self.check_stable(action, id, Some("stopped"));
                    if let Some(record) = self.instances.get_mut(id) {
                        if let Ok(cpu) = param("cpu").parse::<u32>() {
                            record["vcpus_current"] = json!(cpu);
                        }
                        if let Ok(memory) = param("memory").parse::<u32>() {
                            record["memory_current"] = json!(memory);
                        }
                    }
                    self.begin(id, "resizing", "stopped");
                }
                ok(Map::new())
            }
            "AttachTags" | "DetachTags" => {
                for index in 1.. {
                    let prefix = format!("resource_tag_pairs.{index}");
                    let Some(tag_id) = request.param(&format!("{prefix}.tag_id")) else {
                        break;
                    };
                    let resource_id = param(&format!("{prefix}.resource_id"));
                    if let Some(record) = self.record_mut(&resource_id) {
                        let mut tags = record["tags"].as_array().cloned().unwrap_or_default();
                        tags.retain(|t| t["tag_id"] != json!(tag_id));
                        if action == "AttachTags" {
                            tags.push(json!({"tag_id": tag_id}));
                        }
                        record["tags"] = Value::Array(tags);
                    }
                }
                ok(Map::new())
            }
            "CreateCache" => {
                let id = self.next_id("c");
                let record = json!({
                    "cache_id": id,
                    "cache_name": param("cache_name"),
                    "description": "",
                    "status": "pending",
                    "transition_status": "",
                    "cache_size": param("cache_size").parse::<u32>().unwrap_or_default(),
                    "cache_type": param("cache_type"),
                    "node_count": param("node_count").parse::<u32>().unwrap_or_default(),
                    "auto_backup_time": -1,
                    "vxnet": {"vxnet_id": param("vxnet")},
                    "tags": []
                });
                self.caches.insert(id.clone(), record);
                self.begin(&id, "creating", "active");
                ok(Map::from_iter([(String::from("cache_id"), json!(id))]))
            }
            "DescribeCaches" => {
                let set = self.describe(&request.list("caches"), true);
                ok(Map::from_iter([(String::from("cache_set"), Value::Array(set))]))
            }
            "ModifyCacheAttributes" => {
                let id = param("cache");
                self.check_stable(action, &id, None);
                if let Some(record) = self.caches.get_mut(&id) {
                    if let Some(name) = request.param("cache_name") {
                        record["cache_name"] = json!(name);
                    }
                    if let Some(description) = request.param("description") {
                        record["description"] = json!(description);
                    }
                    if let Some(hour) = request.param("auto_backup_time") {
                        record["auto_backup_time"] = json!(hour.parse::<i32>().unwrap_or(-1));
                    }
                }
                ok(Map::new())
            }
            "StopCaches" | "StartCaches" | "DeleteCaches" => {
                let (transition, settle_to) = match action {
                    "StopCaches" => ("stopping", "stopped"),
                    "StartCaches" => ("starting", "active"),
                    _ => ("deleting", "deleted"),
                };
                for id in request.list("caches") {
                    self.check_stable(action, id, None);
                    self.begin(id, transition, settle_to);
                }
                ok(Map::new())
            }
            "ResizeCaches" => {
                for id in request.list("caches") {
                    self.check_stable(action, id, Some("stopped"));
                    if let Some(record) = self.caches.get_mut(id) {
                        if let Ok(size) = param("cache_size").parse::<u32>() {
                            record["cache_size"] = json!(size);
                        }
                    }
                    self.begin(id, "resizing", "stopped");
                }
                ok(Map::new())
            }
            _ => json!({"ret_code": 1100, "message": format!("unknown action {action}")}),
        }
    }
}

fn update_list(record: &mut Value, field: &str, values: &[&str], attach: bool) {
    let mut items: Vec<String> = record[field]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();
    items.retain(|item| !values.contains(&item.as_str()));
    if attach {
        items.extend(values.iter().map(ToString::to_string));
    }
    let refs: Vec<&str> = items.iter().map(String::as_str).collect();
    record[field] = string_list(&refs);
}

#[async_trait]
impl RemoteClient for FakeCloud {
    async fn call(&self, request: &ApiRequest) -> Result<Value> {
        let mut state = self.lock();
        state.calls.push(request.clone());

        let injected = state
            .failures
            .get_mut(request.action())
            .and_then(VecDeque::pop_front);
        let body = match injected {
            Some(ret_code) => json!({"ret_code": ret_code, "message": "injected failure"}),
            None => state.handle(request),
        };
        drop(state);

        classify_response(request.action(), body)
    }
}
