// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The Safety Evaluator (C4): a pure function over already-collected probe
//! results deciding which replicas of a cluster are eligible to scale.
//!
//! No I/O here by design — the Dispatcher gathers probe readings first
//! (§5 "per-cluster read consistency": one probe+evaluate pass per
//! activation, no re-reads), then hands them to [`evaluate`].

use scale_types::{ClusterManagementPolicy, Node, NodeId, Predicate, ProbeReading, Rule};

/// Why a replica was rejected.
#[derive(Clone, Debug, PartialEq)]
pub enum Rejection {
    /// The node prober returned an error for this replica.
    ProbeFailed,
    /// A rule predicate's metric did not satisfy its operator/threshold.
    PredicateFailed { metric: scale_types::Metric, observed: f64, threshold: f64 },
    /// Cluster-aggregate packing: admitting this replica (and the ones
    /// before it in load order) would meet or exceed the cluster budget.
    BudgetExceeded { running_sum: f64, budget: f64 },
    /// The primary's own probe failed, so cluster-aggregate mode cannot
    /// compute a running sum at all; every replica is rejected.
    PrimaryProbeFailed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Ineligible {
    pub node: NodeId,
    pub reason: Rejection,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Evaluation {
    /// Replicas eligible to scale, in the order the State Machine should
    /// process them (ascending load in cluster-aggregate mode; input
    /// order otherwise).
    pub eligible: Vec<NodeId>,
    pub rejected: Vec<Ineligible>,
}

/// A replica paired with the probe reading taken for it. `None` marks a
/// failed probe.
pub struct Probed<'a> {
    pub node: &'a Node,
    pub reading: Option<ProbeReading>,
}

/// Evaluates `replicas` against `rule`, optionally substituting the
/// cluster-aggregate packing pass for the load predicate when `policy`
/// carries an `avg_load` budget (§4.4).
pub fn evaluate(
    rule: &Rule,
    replicas: &[Probed<'_>],
    primary_reading: Option<ProbeReading>,
    policy: Option<&ClusterManagementPolicy>,
) -> Evaluation {
    let non_load_predicates: Vec<&Predicate> = rule
        .predicates
        .iter()
        .filter(|p| p.metric != scale_types::Metric::SystemLoadAverage)
        .collect();

    let budget = policy.and_then(|p| p.avg_load);

    let mut survivors = Vec::new();
    let mut rejected = Vec::new();

    for probed in replicas {
        let reading = match probed.reading {
            Some(reading) => reading,
            None => {
                rejected.push(Ineligible {
                    node: probed.node.id.clone(),
                    reason: Rejection::ProbeFailed,
                });
                continue;
            }
        };
        match first_failed_predicate(&non_load_predicates, reading) {
            Some((metric, observed, threshold)) => {
                rejected.push(Ineligible {
                    node: probed.node.id.clone(),
                    reason: Rejection::PredicateFailed { metric, observed, threshold },
                });
            }
            None => survivors.push((probed.node, reading)),
        }
    }

    match budget {
        Some(budget) => evaluate_packing(survivors, rejected, primary_reading, budget),
        None => evaluate_per_replica(rule, survivors, rejected),
    }
}

/// Returns the first predicate (other than load average, already filtered
/// out by the caller when packing, but still evaluated in per-replica
/// mode by the caller passing the full predicate list) that fails,
/// together with the values that failed it.
fn first_failed_predicate(
    predicates: &[&Predicate],
    reading: ProbeReading,
) -> Option<(scale_types::Metric, f64, f64)> {
    for predicate in predicates {
        let observed = reading.metric(predicate.metric);
        if !predicate.operator.evaluate(observed, predicate.threshold) {
            return Some((predicate.metric, observed, predicate.threshold));
        }
    }
    None
}

fn evaluate_per_replica<'a>(
    rule: &Rule,
    survivors: Vec<(&'a Node, ProbeReading)>,
    mut rejected: Vec<Ineligible>,
) -> Evaluation {
    let mut eligible = Vec::new();
    for (node, reading) in survivors {
        match first_failed_predicate(&rule.predicates.iter().collect::<Vec<_>>(), reading) {
            Some((metric, observed, threshold)) => rejected.push(Ineligible {
                node: node.id.clone(),
                reason: Rejection::PredicateFailed { metric, observed, threshold },
            }),
            None => eligible.push(node.id.clone()),
        }
    }
    Evaluation { eligible, rejected }
}

/// Cluster-aggregate packing (I5, S4): sort the surviving replicas by
/// ascending load, greedily admit while `Lp + running_sum < budget`, and
/// reject the first replica (and everything after it, in sorted order)
/// that would meet or exceed the budget.
fn evaluate_packing<'a>(
    mut survivors: Vec<(&'a Node, ProbeReading)>,
    mut rejected: Vec<Ineligible>,
    primary_reading: Option<ProbeReading>,
    budget: f64,
) -> Evaluation {
    let primary_load = match primary_reading {
        Some(reading) => reading.metric(scale_types::Metric::SystemLoadAverage),
        None => {
            // The primary itself is unprobeable: the running sum can't be
            // computed, so every surviving replica is rejected.
            for (node, _) in survivors {
                rejected.push(Ineligible { node: node.id.clone(), reason: Rejection::PrimaryProbeFailed });
            }
            rejected.sort_by(|a, b| a.node.0.cmp(&b.node.0));
            return Evaluation { eligible: Vec::new(), rejected };
        }
    };

    // Ascending load order; ties broken by stable instance id order.
    survivors.sort_by(|(a_node, a_reading), (b_node, b_reading)| {
        let a_load = a_reading.metric(scale_types::Metric::SystemLoadAverage);
        let b_load = b_reading.metric(scale_types::Metric::SystemLoadAverage);
        a_load
            .partial_cmp(&b_load)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a_node.id.0.cmp(&b_node.id.0))
    });

    let mut running_sum = 0.0;
    let mut eligible = Vec::new();
    let mut budget_exceeded = false;
    for (node, reading) in survivors {
        if budget_exceeded {
            rejected.push(Ineligible {
                node: node.id.clone(),
                reason: Rejection::BudgetExceeded { running_sum: primary_load + running_sum, budget },
            });
            continue;
        }
        let load = reading.metric(scale_types::Metric::SystemLoadAverage);
        if primary_load + running_sum + load < budget {
            running_sum += load;
            eligible.push(node.id.clone());
        } else {
            budget_exceeded = true;
            rejected.push(Ineligible {
                node: node.id.clone(),
                reason: Rejection::BudgetExceeded { running_sum: primary_load + running_sum, budget },
            });
        }
    }

    Evaluation { eligible, rejected }
}


#[cfg(test)]
mod packing_proptests {
    use super::*;
    use proptest::prelude::*;

    fn node_named(id: String) -> Node {
        Node {
            id: NodeId(id),
            cluster: scale_types::ClusterId("c1".to_string()),
            node_type: scale_types::NodeType::Compute,
            instance_class: "m5.large".to_string(),
            last_instance_type: None,
            region: "us-east-1".to_string(),
            vpc: "vpc-1".to_string(),
            private_address: "10.0.0.1".to_string(),
            public_address: None,
            dns_entry: None,
            primary: false,
            reachable: true,
        }
    }

    fn no_predicate_rule() -> Rule {
        Rule {
            id: scale_types::RuleId(1),
            name: "packing".to_string(),
            cluster: scale_types::ClusterId("c1".to_string()),
            action: scale_types::ScaleAction::ScaleDown,
            schedule: scale_types::Schedule::Daily { hour: 2, minute: 0 },
            predicates: vec![],
            target_class: "m5a.large".to_string(),
            fallback_classes: vec![],
            retry_policy: None,
            reverse_rule: None,
            parent_rule: None,
        }
    }

    proptest! {
        // I5: the admitted set's running total (including the primary's
        // load) stays strictly under budget, and the first rejected
        // replica's would-be total meets or exceeds it.
        #[test]
        fn admitted_set_never_exceeds_budget(
            primary_load in 0.0f64..10.0,
            loads in proptest::collection::vec(0.0f64..10.0, 0..12),
            budget in 0.0f64..40.0,
        ) {
            let rule = no_predicate_rule();
            let nodes: Vec<Node> = loads.iter().enumerate().map(|(i, _)| node_named(format!("r{i}"))).collect();
            let replicas: Vec<Probed<'_>> = nodes
                .iter()
                .zip(loads.iter())
                .map(|(node, load)| Probed { node, reading: Some(reading(*load)) })
                .collect();
            let policy = ClusterManagementPolicy { cluster: scale_types::ClusterId("c1".to_string()), avg_load: Some(budget) };

            let eval = evaluate(&rule, &replicas, Some(reading(primary_load)), Some(&policy));

            let load_of = |id: &NodeId| -> f64 {
                let idx: usize = id.0.trim_start_matches('r').parse().unwrap();
                loads[idx]
            };

            let admitted_sum: f64 = eval.eligible.iter().map(load_of).sum();
            if !eval.eligible.is_empty() {
                prop_assert!(primary_load + admitted_sum < budget);
            }

            if let Some(first_rejected) = eval.rejected.iter().find(|r| matches!(r.reason, Rejection::BudgetExceeded { .. })) {
                // Every replica in the admitted set is no heavier than any
                // budget-rejected replica, since admission proceeds in
                // ascending load order.
                let rejected_load = load_of(&first_rejected.node);
                for id in &eval.eligible {
                    prop_assert!(load_of(id) <= rejected_load);
                }
            }
        }
    }
}
