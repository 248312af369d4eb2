// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Clusters, nodes, rules, and the other entities the rule engine reads.

use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Stable identifier for a cluster.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClusterId(pub String);

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The cloud provider's instance id for a node (e.g. `i-0123456789abcdef0`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a rule, assigned by the admin interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RuleId(pub u64);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A database cluster: one primary and zero or more replicas.
///
/// The primary/replica relationship itself is carried on [`Node::primary`]
/// rather than duplicated here; a [`Cluster`] is just the stable handle that
/// rules and policies hang off of. Topology discovery (out of scope of this
/// crate) is the only writer of cluster membership.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub name: String,
}

/// Whether a node is a plain compute instance or a managed database
/// instance. Determines which credential lookup and DNS record type apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    Compute,
    ManagedDb,
}

impl NodeType {
    /// The DNS record type used when steering traffic at this node's
    /// address (see the DNS Steerer contract).
    pub fn dns_record_type(&self) -> DnsRecordType {
        match self {
            NodeType::Compute => DnsRecordType::A,
            NodeType::ManagedDb => DnsRecordType::Cname,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DnsRecordType {
    A,
    Cname,
}

impl fmt::Display for DnsRecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DnsRecordType::A => write!(f, "A"),
            DnsRecordType::Cname => write!(f, "CNAME"),
        }
    }
}

/// A DNS entry a node may be steered through.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsEntry {
    pub zone: String,
    pub name: String,
}

/// A fleet node: a VM backing either the primary or a replica of a cluster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub cluster: ClusterId,
    pub node_type: NodeType,
    /// The instance class the node is currently running as, per the last
    /// topology sync.
    pub instance_class: String,
    /// The instance class the node had immediately before its most recently
    /// committed scale. `None` until the node has been scaled at least
    /// once. Written only by the Scaling State Machine, and only on a
    /// successful scale commit (see [`crate::Node::stamp_last_instance_type`]
    /// in `scale-core`, which requires proof of the per-instance lock).
    pub last_instance_type: Option<String>,
    pub region: String,
    pub vpc: String,
    pub private_address: String,
    pub public_address: Option<String>,
    pub dns_entry: Option<DnsEntry>,
    pub primary: bool,
    pub reachable: bool,
}

/// The operator half of a predicate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Equal,
    GreaterThan,
    LessThan,
}

impl Operator {
    pub fn evaluate(&self, observed: f64, threshold: f64) -> bool {
        match self {
            Operator::Equal => (observed - threshold).abs() < f64::EPSILON,
            Operator::GreaterThan => observed > threshold,
            Operator::LessThan => observed < threshold,
        }
    }
}

/// Which metric a predicate is evaluated against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    ReplicationLagSeconds,
    ActiveConnections,
    SystemLoadAverage,
}

/// A single safety predicate: `metric op threshold`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub metric: Metric,
    pub operator: Operator,
    pub threshold: f64,
}

/// Either a daily wall-clock time or a raw cron expression.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Schedule {
    Daily { hour: u8, minute: u8 },
    Cron(String),
}

impl Schedule {
    /// Converts this schedule to the five-field cron expression the
    /// dispatcher installs into the scheduling facility. A `Daily` schedule
    /// becomes `M H * * *`; a `Cron` schedule passes through unchanged.
    pub fn to_cron_expression(&self) -> String {
        match self {
            Schedule::Daily { hour, minute } => format!("{minute} {hour} * * *"),
            Schedule::Cron(expr) => expr.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleAction {
    ScaleDown,
    ScaleUp,
}

impl ScaleAction {
    pub fn reverse(&self) -> ScaleAction {
        match self {
            ScaleAction::ScaleDown => ScaleAction::ScaleUp,
            ScaleAction::ScaleUp => ScaleAction::ScaleDown,
        }
    }
}

/// `(interval-minutes, max-attempts)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub interval_minutes: u32,
    pub max_attempts: u32,
}

/// A scaling rule: when to fire, what to check, and what to become.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    pub cluster: ClusterId,
    pub action: ScaleAction,
    pub schedule: Schedule,
    pub predicates: Vec<Predicate>,
    /// The class this rule proposes scaling replicas to.
    pub target_class: String,
    /// Ordered fallback classes tried if `target_class` is rejected.
    /// Empty for reverse rules (see §4.5 "Reverse scale").
    pub fallback_classes: Vec<String>,
    pub retry_policy: Option<RetryPolicy>,
    /// The reverse rule's id, if one has been installed for this rule.
    pub reverse_rule: Option<RuleId>,
    /// Set on a reverse rule to point back at its parent.
    pub parent_rule: Option<RuleId>,
}

impl Rule {
    pub fn is_reverse(&self) -> bool {
        self.parent_rule.is_some()
    }
}

/// Per-rule mutable bookkeeping the Dispatcher owns. Kept apart from [`Rule`]
/// so that advancing a retry counter never races with an admin edit of the
/// rule body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleState {
    pub no_of_tries: u32,
    pub retry_tag_installed: bool,
}

/// Per-cluster override substituting a cluster-wide load budget for the
/// per-replica load predicate (see the Safety Evaluator's packing mode).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterManagementPolicy {
    pub cluster: ClusterId,
    pub avg_load: Option<f64>,
}

/// `(date, set-of-cluster-ids)`: on that date, those clusters are frozen.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionCalendarEntry {
    pub date: NaiveDate,
    pub clusters: BTreeSet<ClusterId>,
}

/// An opaque named secret (DNS-updater cloud keys, replica DB login, ...).
/// The core never interprets the fields; only the concrete collaborator
/// that owns a credential's `kind` does.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub name: String,
    pub username: Option<String>,
    pub secret: Option<String>,
}

/// A single probe reading for a node: replication lag, connections, load.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProbeReading {
    pub replication_lag_seconds: f64,
    pub active_connections: f64,
    pub load_average_1m: f64,
}

impl ProbeReading {
    pub fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::ReplicationLagSeconds => self.replication_lag_seconds,
            Metric::ActiveConnections => self.active_connections,
            Metric::SystemLoadAverage => self.load_average_1m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_schedule_converts_to_cron() {
        let s = Schedule::Daily { hour: 2, minute: 0 };
        assert_eq!(s.to_cron_expression(), "0 2 * * *");
    }

    #[test]
    fn cron_schedule_passes_through() {
        let s = Schedule::Cron("*/5 * * * *".to_string());
        assert_eq!(s.to_cron_expression(), "*/5 * * * *");
    }

    #[test]
    fn scale_action_reverses() {
        assert_eq!(ScaleAction::ScaleDown.reverse(), ScaleAction::ScaleUp);
        assert_eq!(ScaleAction::ScaleUp.reverse(), ScaleAction::ScaleDown);
    }

    #[test]
    fn operator_evaluates_thresholds() {
        assert!(Operator::LessThan.evaluate(1.0, 2.0));
        assert!(!Operator::LessThan.evaluate(2.0, 2.0));
        assert!(Operator::GreaterThan.evaluate(3.0, 2.0));
        assert!(Operator::Equal.evaluate(2.0, 2.0));
    }
}
