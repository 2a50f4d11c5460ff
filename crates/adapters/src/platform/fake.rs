// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory platform client for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{ModifyListenersError, PlatformClient, PlatformError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tern_core::{
    LoadBalancer, ServiceDefinition, StopContext, TaskDefinition, TaskSet, TaskSetStatus,
    TrafficRoutingConfig,
};

/// Platform operation, used to inject failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformOp {
    RegisterTaskDefinition,
    ServiceExists,
    CreateService,
    UpdateService,
    CreateTaskSet,
    UpdatePrimaryTaskSet,
    GetServiceTaskSets,
    DeleteTaskSet,
    GetListenerArns,
    ModifyListeners,
}

/// Recorded platform call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    RegisterTaskDefinition { family: String },
    ServiceExists { cluster: String, service: String },
    CreateService { service: String },
    UpdateService { service: String },
    CreateTaskSet {
        service: String,
        task_definition_arn: String,
        target_group_arn: Option<String>,
        scale: u32,
    },
    UpdatePrimaryTaskSet { service: String, task_set_arn: String },
    GetServiceTaskSets { service: String },
    DeleteTaskSet { task_set_arn: String },
    GetListenerArns { target_group_arn: String },
    ModifyListeners { listener_arns: Vec<String> },
}

impl PlatformCall {
    /// Whether this call changes remote state
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Self::ServiceExists { .. }
                | Self::GetServiceTaskSets { .. }
                | Self::GetListenerArns { .. }
        )
    }
}

#[derive(Default)]
struct FakeState {
    revisions: HashMap<String, u32>,
    services: HashMap<(String, String), ServiceDefinition>,
    task_sets: Vec<TaskSet>,
    /// Target group ARN -> listener ARNs forwarding to it
    listeners: HashMap<String, Vec<String>>,
    /// Listener ARN -> rule ARNs
    rules: BTreeMap<String, Vec<String>>,
    /// Rule ARN -> routing currently applied
    routing: HashMap<String, TrafficRoutingConfig>,
    failures: HashMap<PlatformOp, String>,
    modify_fail_after: Option<usize>,
    delay: Option<Duration>,
    rule_delay: Option<Duration>,
    next_id: u64,
}

/// Fake platform client for testing
#[derive(Clone, Default)]
pub struct FakePlatformClient {
    state: Arc<Mutex<FakeState>>,
    calls: Arc<Mutex<Vec<PlatformCall>>>,
}

impl FakePlatformClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Make every call to `op` fail with `message`
    pub fn fail_on(&self, op: PlatformOp, message: impl Into<String>) {
        self.state().failures.insert(op, message.into());
    }

    /// Make `modify_listeners` fail after modifying `n` rules
    pub fn fail_modify_after(&self, n: usize) {
        self.state().modify_fail_after = Some(n);
    }

    /// Delay every call, to exercise cancellation mid-call
    pub fn set_delay(&self, delay: Duration) {
        self.state().delay = Some(delay);
    }

    /// Delay each listener rule modification
    pub fn set_rule_delay(&self, delay: Duration) {
        self.state().rule_delay = Some(delay);
    }

    pub fn add_service(&self, def: ServiceDefinition) {
        let key = (def.cluster.clone(), def.service_name.clone());
        self.state().services.insert(key, def);
    }

    pub fn add_task_set(&self, task_set: TaskSet) {
        self.state().task_sets.push(task_set);
    }

    /// Register a listener forwarding to `target_group_arn` with the given rules
    pub fn add_listener(&self, target_group_arn: &str, listener_arn: &str, rule_arns: &[&str]) {
        let mut state = self.state();
        state
            .listeners
            .entry(target_group_arn.to_string())
            .or_default()
            .push(listener_arn.to_string());
        state.rules.insert(
            listener_arn.to_string(),
            rule_arns.iter().map(|r| r.to_string()).collect(),
        );
    }

    pub fn service(&self, cluster: &str, name: &str) -> Option<ServiceDefinition> {
        self.state()
            .services
            .get(&(cluster.to_string(), name.to_string()))
            .cloned()
    }

    /// All task sets of a service, including draining ones
    pub fn task_sets(&self, cluster: &str, service: &str) -> Vec<TaskSet> {
        self.state()
            .task_sets
            .iter()
            .filter(|ts| ts.cluster == cluster && ts.service_name == service)
            .cloned()
            .collect()
    }

    pub fn latest_revision(&self, family: &str) -> Option<u32> {
        self.state().revisions.get(family).copied()
    }

    /// Routing currently applied to a listener rule
    pub fn rule_routing(&self, rule_arn: &str) -> Option<TrafficRoutingConfig> {
        self.state().routing.get(rule_arn).cloned()
    }

    async fn enter(&self, op: PlatformOp, call: PlatformCall) -> Result<(), PlatformError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);

        let (delay, failure) = {
            let state = self.state();
            (state.delay, state.failures.get(&op).cloned())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match failure {
            Some(message) => Err(PlatformError::api(op_name(op), message)),
            None => Ok(()),
        }
    }
}

fn op_name(op: PlatformOp) -> &'static str {
    match op {
        PlatformOp::RegisterTaskDefinition => "RegisterTaskDefinition",
        PlatformOp::ServiceExists => "DescribeServices",
        PlatformOp::CreateService => "CreateService",
        PlatformOp::UpdateService => "UpdateService",
        PlatformOp::CreateTaskSet => "CreateTaskSet",
        PlatformOp::UpdatePrimaryTaskSet => "UpdateServicePrimaryTaskSet",
        PlatformOp::GetServiceTaskSets => "DescribeTaskSets",
        PlatformOp::DeleteTaskSet => "DeleteTaskSet",
        PlatformOp::GetListenerArns => "DescribeListeners",
        PlatformOp::ModifyListeners => "ModifyRule",
    }
}

#[async_trait]
impl PlatformClient for FakePlatformClient {
    async fn register_task_definition(
        &self,
        def: &TaskDefinition,
    ) -> Result<TaskDefinition, PlatformError> {
        self.enter(
            PlatformOp::RegisterTaskDefinition,
            PlatformCall::RegisterTaskDefinition {
                family: def.family.clone(),
            },
        )
        .await?;

        let mut state = self.state();
        let revision = state.revisions.entry(def.family.clone()).or_insert(0);
        *revision += 1;
        let mut registered = def.clone();
        registered.revision = Some(*revision);
        registered.task_definition_arn = Some(format!(
            "arn:aws:ecs:fake:task-definition/{}:{}",
            def.family, revision
        ));
        Ok(registered)
    }

    async fn service_exists(
        &self,
        cluster: &str,
        service_name: &str,
    ) -> Result<bool, PlatformError> {
        self.enter(
            PlatformOp::ServiceExists,
            PlatformCall::ServiceExists {
                cluster: cluster.to_string(),
                service: service_name.to_string(),
            },
        )
        .await?;

        Ok(self
            .state()
            .services
            .contains_key(&(cluster.to_string(), service_name.to_string())))
    }

    async fn create_service(
        &self,
        def: &ServiceDefinition,
    ) -> Result<ServiceDefinition, PlatformError> {
        self.enter(
            PlatformOp::CreateService,
            PlatformCall::CreateService {
                service: def.service_name.clone(),
            },
        )
        .await?;

        let mut created = def.clone();
        created.service_arn = Some(format!(
            "arn:aws:ecs:fake:service/{}/{}",
            def.cluster, def.service_name
        ));
        self.add_service(created.clone());
        Ok(created)
    }

    async fn update_service(
        &self,
        def: &ServiceDefinition,
    ) -> Result<ServiceDefinition, PlatformError> {
        self.enter(
            PlatformOp::UpdateService,
            PlatformCall::UpdateService {
                service: def.service_name.clone(),
            },
        )
        .await?;

        let mut state = self.state();
        let key = (def.cluster.clone(), def.service_name.clone());
        let existing = state
            .services
            .get(&key)
            .ok_or_else(|| PlatformError::NotFound(format!("service {}", def.service_name)))?;
        let mut updated = def.clone();
        updated.service_arn = existing.service_arn.clone();
        state.services.insert(key, updated.clone());
        Ok(updated)
    }

    async fn create_task_set(
        &self,
        service: &ServiceDefinition,
        def: &TaskDefinition,
        target_group: Option<&LoadBalancer>,
        scale: u32,
    ) -> Result<TaskSet, PlatformError> {
        let task_definition_arn = def.task_definition_arn.clone().unwrap_or_default();
        self.enter(
            PlatformOp::CreateTaskSet,
            PlatformCall::CreateTaskSet {
                service: service.service_name.clone(),
                task_definition_arn: task_definition_arn.clone(),
                target_group_arn: target_group.map(|tg| tg.target_group_arn.clone()),
                scale,
            },
        )
        .await?;

        if task_definition_arn.is_empty() {
            return Err(PlatformError::api(
                "CreateTaskSet",
                "task definition has not been registered",
            ));
        }

        let mut state = self.state();
        state.next_id += 1;
        let task_set = TaskSet {
            task_set_arn: format!(
                "arn:aws:ecs:fake:task-set/{}/{}/ts-{}",
                service.cluster, service.service_name, state.next_id
            ),
            cluster: service.cluster.clone(),
            service_name: service.service_name.clone(),
            task_definition_arn,
            status: TaskSetStatus::Active,
            scale,
            load_balancer: target_group.cloned(),
        };
        state.task_sets.push(task_set.clone());
        Ok(task_set)
    }

    async fn update_service_primary_task_set(
        &self,
        service: &ServiceDefinition,
        task_set: &TaskSet,
    ) -> Result<TaskSet, PlatformError> {
        self.enter(
            PlatformOp::UpdatePrimaryTaskSet,
            PlatformCall::UpdatePrimaryTaskSet {
                service: service.service_name.clone(),
                task_set_arn: task_set.task_set_arn.clone(),
            },
        )
        .await?;

        let mut state = self.state();
        if !state
            .task_sets
            .iter()
            .any(|ts| ts.task_set_arn == task_set.task_set_arn)
        {
            return Err(PlatformError::NotFound(format!(
                "task set {}",
                task_set.task_set_arn
            )));
        }

        let mut promoted = None;
        for ts in state
            .task_sets
            .iter_mut()
            .filter(|ts| ts.cluster == service.cluster && ts.service_name == service.service_name)
        {
            if ts.task_set_arn == task_set.task_set_arn {
                ts.status = TaskSetStatus::Primary;
                promoted = Some(ts.clone());
            } else if ts.status == TaskSetStatus::Primary {
                ts.status = TaskSetStatus::Active;
            }
        }
        promoted.ok_or_else(|| {
            PlatformError::NotFound(format!(
                "task set {} in service {}",
                task_set.task_set_arn, service.service_name
            ))
        })
    }

    async fn get_service_task_sets(
        &self,
        service: &ServiceDefinition,
    ) -> Result<Vec<TaskSet>, PlatformError> {
        self.enter(
            PlatformOp::GetServiceTaskSets,
            PlatformCall::GetServiceTaskSets {
                service: service.service_name.clone(),
            },
        )
        .await?;

        let sets: Vec<TaskSet> = self
            .task_sets(&service.cluster, &service.service_name)
            .into_iter()
            .filter(|ts| ts.status != TaskSetStatus::Draining)
            .collect();
        if sets.is_empty() {
            return Err(PlatformError::NotFound(format!(
                "task sets of service {}",
                service.service_name
            )));
        }
        Ok(sets)
    }

    async fn delete_task_set(&self, task_set: &TaskSet) -> Result<(), PlatformError> {
        self.enter(
            PlatformOp::DeleteTaskSet,
            PlatformCall::DeleteTaskSet {
                task_set_arn: task_set.task_set_arn.clone(),
            },
        )
        .await?;

        let mut state = self.state();
        let before = state.task_sets.len();
        state
            .task_sets
            .retain(|ts| ts.task_set_arn != task_set.task_set_arn);
        if state.task_sets.len() == before {
            return Err(PlatformError::NotFound(format!(
                "task set {}",
                task_set.task_set_arn
            )));
        }
        Ok(())
    }

    async fn get_listener_arns(
        &self,
        target_group: &LoadBalancer,
    ) -> Result<Vec<String>, PlatformError> {
        self.enter(
            PlatformOp::GetListenerArns,
            PlatformCall::GetListenerArns {
                target_group_arn: target_group.target_group_arn.clone(),
            },
        )
        .await?;

        self.state()
            .listeners
            .get(&target_group.target_group_arn)
            .cloned()
            .ok_or_else(|| {
                PlatformError::NotFound(format!(
                    "listeners of target group {}",
                    target_group.target_group_arn
                ))
            })
    }

    async fn modify_listeners(
        &self,
        listener_arns: &[String],
        routing: &TrafficRoutingConfig,
        ctx: &StopContext,
    ) -> Result<Vec<String>, ModifyListenersError> {
        let entered = ctx.run(self.enter(
            PlatformOp::ModifyListeners,
            PlatformCall::ModifyListeners {
                listener_arns: listener_arns.to_vec(),
            },
        ));
        match entered.await {
            Ok(Ok(())) => {}
            Ok(Err(source)) => {
                return Err(ModifyListenersError {
                    modified_rules: Vec::new(),
                    source,
                })
            }
            Err(stopped) => {
                return Err(ModifyListenersError {
                    modified_rules: Vec::new(),
                    source: stopped.into(),
                })
            }
        }

        let (fail_after, rule_delay, rules) = {
            let state = self.state();
            let rules: Vec<String> = listener_arns
                .iter()
                .flat_map(|listener| state.rules.get(listener).cloned().unwrap_or_default())
                .collect();
            (state.modify_fail_after, state.rule_delay, rules)
        };

        let mut modified = Vec::new();
        for rule in rules {
            if let Err(stopped) = ctx.check() {
                return Err(ModifyListenersError {
                    modified_rules: modified,
                    source: stopped.into(),
                });
            }
            if fail_after == Some(modified.len()) {
                return Err(ModifyListenersError {
                    modified_rules: modified,
                    source: PlatformError::api(
                        "ModifyRule",
                        format!("throttled while modifying rule {}", rule),
                    ),
                });
            }
            // A rule update in flight always lands
            if let Some(delay) = rule_delay {
                tokio::time::sleep(delay).await;
            }
            self.state().routing.insert(rule.clone(), routing.clone());
            modified.push(rule);
        }
        Ok(modified)
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
