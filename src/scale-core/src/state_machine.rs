// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The Scaling State Machine (C5): drives a single node through a resize,
//! with fallback classes, prognostication, outage paging, and best-effort
//! rollback (§4.5).
//!
//! Modeled the way `rehydration.rs`'s `RehydrationTaskState` drives a
//! dataflow through its own reconnect loop: an explicit state enum the
//! `run` method matches on, with [`scale_ore::retry::Retry`] supplying
//! the start-attempt backoff and `tokio::time::timeout` guarding every
//! suspension point.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use scale_types::{Node, NodeId, Rule};

use crate::collaborators::{CloudAdapter, ModifyOutcome, Pager, Prognosticator, RulePersistence};
use crate::lock::InstanceLockGuard;

#[derive(Debug, thiserror::Error)]
pub enum ScaleError {
    #[error("stopping {0}: {1}")]
    StopFailed(NodeId, String),
    #[error("all instance classes rejected for {0}, reverted to {1}")]
    FallbackExhausted(NodeId, String),
    #[error("all instance classes rejected for {0} and revert to {1} also failed: {2}")]
    RevertFailed(NodeId, String, String),
    #[error("paging about {0} failed: {1}")]
    PageFailed(NodeId, String),
}

/// The class a node should be scaled to, and the fallbacks to try if it's
/// rejected. For a reverse scale (§4.5 "Reverse scale") `fallback_classes`
/// is empty and `skip_prognostication` is `true`.
pub struct ScalePlan {
    pub cluster_name: Option<String>,
    pub proposed_class: String,
    pub fallback_classes: Vec<String>,
    pub skip_prognostication: bool,
}

impl ScalePlan {
    /// The plan for a rule's primary (forward) scale.
    pub fn forward(rule: &Rule, cluster_name: Option<String>) -> ScalePlan {
        ScalePlan {
            cluster_name,
            proposed_class: rule.target_class.clone(),
            fallback_classes: rule.fallback_classes.clone(),
            skip_prognostication: false,
        }
    }

    /// The plan for a reverse rule: scale straight to `previous_class`, no
    /// fallback list, no prognostication (§4.5).
    pub fn reverse(previous_class: String) -> ScalePlan {
        ScalePlan {
            cluster_name: None,
            proposed_class: previous_class,
            fallback_classes: Vec::new(),
            skip_prognostication: true,
        }
    }
}

/// Drives one node through §4.5's state diagram. Holds the collaborators
/// it needs; a fresh [`InstanceLockGuard`] must be supplied per run, per
/// I1.
pub struct ScalingStateMachine {
    cloud: Arc<dyn CloudAdapter>,
    prognosticator: Arc<dyn Prognosticator>,
    pager: Arc<dyn Pager>,
    persistence: Arc<dyn RulePersistence>,
    timeouts: scale_types::config::Timeouts,
    start_retry: scale_ore::retry::Retry,
}

/// What the node was scaled to, for the DNS Steerer and Dispatcher to act
/// on. Only produced on a successful DONE.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScaleCommit {
    pub effective_class: String,
}

impl ScalingStateMachine {
    pub fn new(
        cloud: Arc<dyn CloudAdapter>,
        prognosticator: Arc<dyn Prognosticator>,
        pager: Arc<dyn Pager>,
        persistence: Arc<dyn RulePersistence>,
        timeouts: scale_types::config::Timeouts,
        start_retry: scale_ore::retry::Retry,
    ) -> ScalingStateMachine {
        ScalingStateMachine {
            cloud,
            prognosticator,
            pager,
            persistence,
            timeouts,
            start_retry,
        }
    }

    /// Runs the full resize pipeline for `node` under `plan`, holding
    /// `lock` for the duration. Returns the committed effective class on
    /// success, or the [`ScaleError`] the Dispatcher should schedule a
    /// retry for.
    #[instrument(skip(self, lock, plan), fields(node_id = %node.id, region = %node.region))]
    pub async fn run(
        &self,
        lock: &InstanceLockGuard,
        node: &Node,
        plan: ScalePlan,
    ) -> Result<ScaleCommit, ScaleError> {
        debug_assert_eq!(lock.node_id(), &node.id);

        // RESOLVING.
        let effective_class = if plan.skip_prognostication {
            plan.proposed_class.clone()
        } else {
            match &plan.cluster_name {
                Some(cluster_name) => {
                    self.prognosticator
                        .effective_class(cluster_name, &plan.proposed_class)
                        .await
                }
                None => plan.proposed_class.clone(),
            }
        };

        // The class captured here is what `last_instance_type` is stamped
        // with on success: the class the node had immediately before this
        // scale, not `effective_class` (see the resolved Open Question in
        // DESIGN.md).
        let previous_class = node.instance_class.clone();

        // STOPPING / STOPPED.
        self.cloud
            .stop(&node.id, &node.region)
            .await
            .map_err(|e| ScaleError::StopFailed(node.id.clone(), e.to_string()))?;
        self.cloud
            .wait_stopped(&node.id, &node.region, self.timeouts.wait_stopped())
            .await
            .map_err(|e| ScaleError::StopFailed(node.id.clone(), e.to_string()))?;

        // MODIFYING / STARTING / RUNNING, trying `effective_class` then
        // each fallback in order.
        let mut candidates = std::iter::once(effective_class.clone()).chain(plan.fallback_classes.clone().into_iter());
        let mut committed_class = None;
        for candidate in &mut candidates {
            match self.try_modify_and_start(node, &candidate).await {
                Ok(()) => {
                    committed_class = Some(candidate);
                    break;
                }
                Err(NeedFallback) => {
                    warn!(class = %candidate, "class rejected, trying next fallback");
                    continue;
                }
            }
        }

        let committed_class = match committed_class {
            Some(class) => class,
            None => {
                // NEED-FALLBACK exhausted: page, then revert.
                return self.handle_fallback_exhausted(node, &previous_class).await;
            }
        };

        // DONE: best-effort stamp of last_instance_type. A failure here
        // is logged but never fails the scale (§4.5 step 7).
        if let Err(error) = self
            .persistence
            .stamp_last_instance_type(lock, &node.id, previous_class)
            .await
        {
            warn!(%error, "failed to persist last_instance_type; next topology sync will reconcile");
        }

        info!(class = %committed_class, "scale committed");
        Ok(ScaleCommit { effective_class: committed_class })
    }

    async fn try_modify_and_start(&self, node: &Node, class: &str) -> Result<(), NeedFallback> {
        match self.cloud.modify_class(&node.id, &node.region, class).await {
            Ok(ModifyOutcome::Accepted) => {}
            Ok(ModifyOutcome::NeedFallback) => return Err(NeedFallback),
            Err(error) => {
                warn!(%error, class = %class, "modify call errored, treating as rejection");
                return Err(NeedFallback);
            }
        }

        // The provider's control plane is eventually consistent and may
        // transiently reject a start that immediately follows a modify
        // (§4.5 step 4): retry up to 3 attempts, 1s apart.
        let mut retry = self.start_retry.into_retry_stream();
        loop {
            match self.cloud.start(&node.id, &node.region).await {
                Ok(()) => break,
                Err(error) => {
                    use tokio_stream::StreamExt;
                    if retry.next().await.is_none() {
                        warn!(%error, class = %class, "start rejected after exhausting retries, treating as rejection");
                        return Err(NeedFallback);
                    }
                    warn!(%error, class = %class, "start rejected, retrying");
                }
            }
        }

        self.cloud
            .wait_running(&node.id, &node.region, self.timeouts.wait_running())
            .await
            .map_err(|_| NeedFallback)
    }

    async fn handle_fallback_exhausted(
        &self,
        node: &Node,
        previous_class: &str,
    ) -> Result<ScaleCommit, ScaleError> {
        if let Err(error) = self
            .pager
            .page(
                &node.id,
                "failed to restart replica after resize",
                &format!("node {} exhausted all fallback classes", node.id),
            )
            .await
        {
            warn!(%error, "paging failed while handling exhausted fallback");
        }

        match self.try_modify_and_start(node, previous_class).await {
            Ok(()) => Err(ScaleError::FallbackExhausted(node.id.clone(), previous_class.to_string())),
            Err(NeedFallback) => {
                if let Err(error) = self
                    .pager
                    .page(
                        &node.id,
                        "revert to previous class also failed",
                        &format!("node {} may be left stopped", node.id),
                    )
                    .await
                {
                    warn!(%error, "paging failed while handling a failed revert");
                }
                Err(ScaleError::RevertFailed(
                    node.id.clone(),
                    previous_class.to_string(),
                    "revert modify/start rejected".to_string(),
                ))
            }
        }
    }
}

/// Internal signal that a class was rejected and the caller should try
/// the next one.
struct NeedFallback;

#[cfg(test)]
mod tests {
    use super::*;
    use scale_types::NodeType;

    fn test_node() -> Node {
        Node {
            id: NodeId("i-test".to_string()),
            cluster: scale_types::ClusterId("c1".to_string()),
            node_type: NodeType::Compute,
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

    #[test]
    fn forward_plan_carries_rule_fallbacks() {
        let rule = Rule {
            id: scale_types::RuleId(1),
            name: "r".to_string(),
            cluster: scale_types::ClusterId("c1".to_string()),
            action: scale_types::ScaleAction::ScaleDown,
            schedule: scale_types::Schedule::Daily { hour: 2, minute: 0 },
            predicates: vec![],
            target_class: "m5.large".to_string(),
            fallback_classes: vec!["m5a.large".to_string()],
            retry_policy: None,
            reverse_rule: None,
            parent_rule: None,
        };
        let plan = ScalePlan::forward(&rule, Some("cluster-a".to_string()));
        assert_eq!(plan.proposed_class, "m5.large");
        assert_eq!(plan.fallback_classes, vec!["m5a.large".to_string()]);
        assert!(!plan.skip_prognostication);
    }

    #[test]
    fn reverse_plan_has_no_fallback_and_skips_prognostication() {
        let plan = ScalePlan::reverse("t3.large".to_string());
        assert_eq!(plan.proposed_class, "t3.large");
        assert!(plan.fallback_classes.is_empty());
        assert!(plan.skip_prognostication);
    }

    #[test]
    fn previous_class_captured_is_pre_scale_instance_class() {
        let node = test_node();
        // This is what `run` captures as `previous_class` before any cloud
        // call: the node's current (pre-scale) instance_class, matching
        // I2's "previous size before scale", not the new effective class.
        assert_eq!(node.instance_class, "m5.large");
    }
}
