// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! An in-memory [`RulePersistence`] implementation. Used by the
//! dispatcher's reconciliation path in tests and as the reference
//! implementation the §6 "on-disk form is implementation-defined" clause
//! leaves room for; a real deployment swaps in a SQL-backed store behind
//! the same trait without touching the core.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;

use scale_types::{
    Cluster, ClusterId, ClusterManagementPolicy, Credential, ExceptionCalendarEntry, Node, NodeId, Rule, RuleId,
    RuleState,
};

use crate::collaborators::{PersistenceError, RulePersistence, TopologyView};
use crate::lock::InstanceLockGuard;

#[derive(Default)]
struct Inner {
    rules: BTreeMap<RuleId, Rule>,
    rule_states: BTreeMap<RuleId, RuleState>,
    exception_calendar: BTreeMap<NaiveDate, ExceptionCalendarEntry>,
    credentials: BTreeMap<String, Credential>,
    nodes: BTreeMap<NodeId, Node>,
    clusters: BTreeMap<ClusterId, Cluster>,
    cluster_policies: BTreeMap<ClusterId, ClusterManagementPolicy>,
}

/// A `parking_lot::RwLock`-guarded in-memory store, in the style `mz-ore`
/// / `mz-stash` callers use for process-local shared state.
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Arc<MemoryStore> {
        Arc::new(MemoryStore { inner: RwLock::new(Inner::default()) })
    }

    pub fn seed_node(&self, node: Node) {
        self.inner.write().nodes.insert(node.id.clone(), node);
    }

    pub fn seed_rule(&self, rule: Rule) {
        self.inner.write().rules.insert(rule.id, rule);
    }

    pub fn seed_credential(&self, credential: Credential) {
        self.inner.write().credentials.insert(credential.name.clone(), credential);
    }

    pub fn seed_exception(&self, entry: ExceptionCalendarEntry) {
        self.inner.write().exception_calendar.insert(entry.date, entry);
    }

    pub fn seed_cluster(&self, cluster: Cluster) {
        self.inner.write().clusters.insert(cluster.id.clone(), cluster);
    }

    pub fn seed_cluster_policy(&self, policy: ClusterManagementPolicy) {
        self.inner.write().cluster_policies.insert(policy.cluster.clone(), policy);
    }

    pub fn node(&self, id: &NodeId) -> Option<Node> {
        self.inner.read().nodes.get(id).cloned()
    }
}

#[async_trait]
impl RulePersistence for MemoryStore {
    async fn rule(&self, id: RuleId) -> Option<Rule> {
        self.inner.read().rules.get(&id).cloned()
    }

    async fn all_rules(&self) -> Vec<Rule> {
        self.inner.read().rules.values().cloned().collect()
    }

    async fn rule_state(&self, rule: RuleId) -> RuleState {
        self.inner.read().rule_states.get(&rule).copied().unwrap_or_default()
    }

    async fn set_rule_state(&self, rule: RuleId, state: RuleState) {
        self.inner.write().rule_states.insert(rule, state);
    }

    async fn exception_entry(&self, date: NaiveDate) -> Option<ExceptionCalendarEntry> {
        self.inner.read().exception_calendar.get(&date).cloned()
    }

    async fn credential(&self, name: &str) -> Option<Credential> {
        self.inner.read().credentials.get(name).cloned()
    }

    async fn cluster(&self, cluster: &ClusterId) -> Option<Cluster> {
        self.inner.read().clusters.get(cluster).cloned()
    }

    async fn cluster_policy(&self, cluster: &ClusterId) -> Option<ClusterManagementPolicy> {
        self.inner.read().cluster_policies.get(cluster).cloned()
    }

    async fn stamp_last_instance_type(
        &self,
        lock: &InstanceLockGuard,
        node: &NodeId,
        previous_class: String,
    ) -> Result<(), PersistenceError> {
        debug_assert_eq!(lock.node_id(), node);
        let mut inner = self.inner.write();
        let record = inner.nodes.get_mut(node).ok_or_else(|| PersistenceError::NodeNotFound(node.clone()))?;
        record.last_instance_type = Some(previous_class);
        Ok(())
    }
}

/// `MemoryStore` doubles as the reference [`TopologyView`]: the fleet it
/// knows about is exactly the nodes seeded into it, filtered by cluster
/// and the `primary` flag. A real deployment backs `TopologyView` with
/// the (out-of-scope) discovery pass's own store instead.
#[async_trait]
impl TopologyView for MemoryStore {
    async fn primary_of(&self, cluster: &ClusterId) -> Option<Node> {
        self.inner.read().nodes.values().find(|n| &n.cluster == cluster && n.primary).cloned()
    }

    async fn replicas_of(&self, cluster: &ClusterId) -> Vec<Node> {
        self.inner.read().nodes.values().filter(|n| &n.cluster == cluster && !n.primary).cloned().collect()
    }
}
