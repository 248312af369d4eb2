// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Trait boundaries for everything the rule engine treats as an external
//! collaborator: the cloud provider, the node's own health, the fleet
//! topology, persisted state, and the three external scripts. None of
//! these traits perform I/O themselves; `scripts.rs` and the
//! `test-support` fakes are the only things that implement them.

use std::time::Duration;

use async_trait::async_trait;

use scale_types::{Cluster, ClusterId, ClusterManagementPolicy, DnsRecordType, Node, NodeId, ProbeReading, Rule};

use crate::lock::InstanceLockGuard;

/// Errors a [`CloudAdapter`] call can surface. All are treated as
/// Scale-fatal by the State Machine unless the call site says otherwise.
#[derive(Debug, thiserror::Error)]
pub enum CloudError {
    #[error("describing instance {0}: {1}")]
    Describe(NodeId, String),
    #[error("stopping instance {0}: {1}")]
    Stop(NodeId, String),
    #[error("modifying instance {0} to class {1}: {2}")]
    Modify(NodeId, String, String),
    #[error("starting instance {0}: {1}")]
    Start(NodeId, String),
    #[error("listing available instance classes: {0}")]
    ListClasses(String),
}

/// Timed out waiting for an instance to reach the awaited power state.
#[derive(Debug, thiserror::Error)]
#[error("timed out after {0:?} waiting for instance {1} to reach the expected state")]
pub struct WaitError(pub Duration, pub NodeId);

/// The outcome of a [`CloudAdapter::modify_class`] call. A rejection is not
/// automatically fatal — the caller tries the rule's fallback classes
/// before giving up (§4.5, §9).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModifyOutcome {
    /// The provider accepted the class change.
    Accepted,
    /// The provider rejected this class (e.g. unavailable in this AZ);
    /// the caller should retry with the rule's next fallback class.
    NeedFallback,
}

/// A snapshot of an instance's cloud-side power state, used by the State
/// Machine to decide whether a stop/start is actually necessary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceDescription {
    pub instance_class: String,
    pub running: bool,
}

/// The cloud provider's control plane: start, stop, resize, describe.
/// Injected as `Arc<dyn CloudAdapter>` rather than a process singleton, so
/// the State Machine is region-agnostic and the adapter owns per-region
/// client selection (mirroring `ec2_client_region_dict` in the original
/// Python).
#[async_trait]
pub trait CloudAdapter: Send + Sync {
    async fn describe(&self, node: &NodeId, region: &str) -> Result<InstanceDescription, CloudError>;

    async fn stop(&self, node: &NodeId, region: &str) -> Result<(), CloudError>;

    async fn wait_stopped(
        &self,
        node: &NodeId,
        region: &str,
        timeout: Duration,
    ) -> Result<(), WaitError>;

    async fn modify_class(
        &self,
        node: &NodeId,
        region: &str,
        new_class: &str,
    ) -> Result<ModifyOutcome, CloudError>;

    async fn start(&self, node: &NodeId, region: &str) -> Result<(), CloudError>;

    async fn wait_running(
        &self,
        node: &NodeId,
        region: &str,
        timeout: Duration,
    ) -> Result<(), WaitError>;

    /// The instance classes available in `region`, used to validate a
    /// rule's `target_class`/`fallback_classes` before scheduling it.
    async fn list_classes(&self, region: &str) -> Result<Vec<String>, CloudError>;
}

#[derive(Debug, thiserror::Error)]
#[error("probing node {0}: {1}")]
pub struct ProbeError(pub NodeId, pub String);

/// A node's own health: replication lag, connection count, load average.
#[async_trait]
pub trait NodeProber: Send + Sync {
    async fn probe(&self, node: &Node) -> Result<ProbeReading, ProbeError>;
}

/// Read-only fleet membership: which nodes back a cluster's primary and
/// replicas. Topology discovery itself is out of scope; this trait is
/// just the read side the rule engine needs.
#[async_trait]
pub trait TopologyView: Send + Sync {
    async fn primary_of(&self, cluster: &ClusterId) -> Option<Node>;

    async fn replicas_of(&self, cluster: &ClusterId) -> Vec<Node>;
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("node {0} not found")]
    NodeNotFound(NodeId),
    #[error("persistence backend error: {0}")]
    Backend(String),
}

/// The out-of-scope entity store: rule bookkeeping, the exception
/// calendar, credentials, and the one piece of node state the core
/// itself writes (`last_instance_type`).
#[async_trait]
pub trait RulePersistence: Send + Sync {
    /// The rule definition itself, as maintained by the (out-of-scope)
    /// admin interface. `None` if no rule with this id is registered.
    async fn rule(&self, id: scale_types::RuleId) -> Option<Rule>;

    /// All registered rules, used by the dispatcher's startup
    /// reconciliation pass (§4.6 "Durability").
    async fn all_rules(&self) -> Vec<Rule>;

    async fn rule_state(&self, rule: scale_types::RuleId) -> scale_types::RuleState;

    async fn set_rule_state(&self, rule: scale_types::RuleId, state: scale_types::RuleState);

    async fn exception_entry(
        &self,
        date: chrono::NaiveDate,
    ) -> Option<scale_types::ExceptionCalendarEntry>;

    async fn credential(&self, name: &str) -> Option<scale_types::Credential>;

    async fn cluster(&self, cluster: &ClusterId) -> Option<Cluster>;

    async fn cluster_policy(&self, cluster: &ClusterId) -> Option<ClusterManagementPolicy>;

    /// Stamps `last_instance_type` on `node` with the class it held
    /// immediately before the scale the caller just committed. Requires
    /// the per-instance lock as proof that the caller exclusively owns
    /// this node's scale (§9 Design Notes).
    async fn stamp_last_instance_type(
        &self,
        lock: &InstanceLockGuard,
        node: &NodeId,
        previous_class: String,
    ) -> Result<(), PersistenceError>;
}

#[derive(Debug, thiserror::Error)]
#[error("prognostication script failed for cluster {0}: {1}")]
pub struct PrognosticationError(pub String, pub String);

/// Consults the prognostication script for a possibly-adjusted target
/// class. Per its contract (§6), script failures degrade to the rule's
/// own proposal rather than aborting the scale, so this is modeled as an
/// infallible call that logs and falls back internally rather than
/// returning a `Result` the caller must remember to degrade.
#[async_trait]
pub trait Prognosticator: Send + Sync {
    async fn effective_class(&self, cluster_name: &str, proposed_class: &str) -> String;
}

#[derive(Debug, thiserror::Error)]
#[error("paging for node {0} failed: {1}")]
pub struct PagerError(pub NodeId, pub String);

/// Escalates a fatal scale failure to a human.
#[async_trait]
pub trait Pager: Send + Sync {
    async fn page(&self, node: &NodeId, title: &str, context: &str) -> Result<(), PagerError>;
}

#[derive(Debug, thiserror::Error)]
#[error("updating DNS entry {zone}/{name} to {address}: {source}")]
pub struct DnsError {
    pub zone: String,
    pub name: String,
    pub address: String,
    pub source: String,
}

/// Re-points a DNS entry at a node's address once a scale has committed.
#[async_trait]
pub trait DnsUpdater: Send + Sync {
    async fn update(
        &self,
        zone: &str,
        name: &str,
        address: &str,
        record_type: DnsRecordType,
    ) -> Result<(), DnsError>;
}
