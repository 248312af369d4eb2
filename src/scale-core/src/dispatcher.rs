// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The Rule Dispatcher (C6): translates rule definitions into periodic
//! activations and bounded retry loops, and runs the per-activation
//! pipeline (§4.6).
//!
//! The external scheduling facility itself is out of scope (§1); this
//! module defines the [`Scheduler`] trait it needs and owns the
//! tag-naming convention (`rule_<id>` / `retry_rule_<id>`, §6) plus the
//! idempotent install/reconcile contract.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use scale_types::{NodeId, Rule, RuleId, RuleState};

use crate::collaborators::{DnsError, NodeProber, RulePersistence, TopologyView};
use crate::dns_steerer::DnsSteerer;
use crate::exception_calendar::ExceptionCalendar;
use crate::lock::InstanceLockTable;
use crate::safety_evaluator::{self, Ineligible, Probed};
use crate::state_machine::{ScaleError, ScalePlan, ScalingStateMachine};

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduling facility error for tag {0}: {1}")]
    Backend(String, String),
}

/// The durable, tag-addressed scheduling facility (§9 "cron surface as
/// durable queue"). The dispatcher only ever lists/installs/removes the
/// tags it owns (`rule_<id>`, `retry_rule_<id>`) and must never touch
/// others (§6).
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn install(&self, tag: &str, cron_expression: &str) -> Result<(), SchedulerError>;
    async fn uninstall(&self, tag: &str) -> Result<(), SchedulerError>;
    async fn installed_tags(&self) -> Vec<String>;
}

pub fn primary_tag(rule: RuleId) -> String {
    format!("rule_{rule}")
}

pub fn retry_tag(rule: RuleId) -> String {
    format!("retry_rule_{rule}")
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Scale(#[from] ScaleError),
    #[error("dns steering failed: {0}")]
    Dns(#[from] DnsError),
}

#[derive(Debug, Default, PartialEq)]
pub struct FireOutcome {
    pub suppressed: bool,
    pub scaled: Vec<NodeId>,
    pub rejected: Vec<Ineligible>,
    pub skipped_in_flight: Vec<NodeId>,
}

pub struct RuleDispatcher {
    topology: Arc<dyn TopologyView>,
    prober: Arc<dyn NodeProber>,
    persistence: Arc<dyn RulePersistence>,
    state_machine: Arc<ScalingStateMachine>,
    dns_steerer: Arc<DnsSteerer>,
    exception_calendar: Arc<ExceptionCalendar>,
    scheduler: Arc<dyn Scheduler>,
    locks: InstanceLockTable,
}

impl RuleDispatcher {
    pub fn new(
        topology: Arc<dyn TopologyView>,
        prober: Arc<dyn NodeProber>,
        persistence: Arc<dyn RulePersistence>,
        state_machine: Arc<ScalingStateMachine>,
        dns_steerer: Arc<DnsSteerer>,
        exception_calendar: Arc<ExceptionCalendar>,
        scheduler: Arc<dyn Scheduler>,
    ) -> RuleDispatcher {
        RuleDispatcher {
            topology,
            prober,
            persistence,
            state_machine,
            dns_steerer,
            exception_calendar,
            scheduler,
            locks: InstanceLockTable::new(),
        }
    }

    /// Registers `rule`'s primary schedule, replacing any existing entry
    /// with the same tag (idempotent by tag, §4.6).
    pub async fn install(&self, rule: &Rule) -> Result<(), SchedulerError> {
        self.scheduler
            .install(&primary_tag(rule.id), &rule.schedule.to_cron_expression())
            .await
    }

    /// Removes both `rule`'s primary and retry schedules.
    pub async fn uninstall(&self, rule: &Rule) -> Result<(), SchedulerError> {
        self.scheduler.uninstall(&primary_tag(rule.id)).await?;
        self.scheduler.uninstall(&retry_tag(rule.id)).await?;
        Ok(())
    }

    /// Reconciles the scheduling facility's installed tags against
    /// `rules` on startup: installs any rule missing its primary tag.
    /// Run once at process start, per §4.6 "Durability".
    pub async fn reconcile(&self, rules: &[Rule]) -> Result<(), SchedulerError> {
        let installed = self.scheduler.installed_tags().await;
        for rule in rules {
            if !installed.contains(&primary_tag(rule.id)) {
                self.install(rule).await?;
            }
        }
        Ok(())
    }

    /// Runs one activation of `rule`: the exception-calendar gate, then
    /// (if not suppressed) the Safety Evaluator and, for each eligible
    /// replica, the State Machine and DNS Steerer. Manages the retry
    /// schedule as a side effect, per §4.6 `fire`/`retry`.
    #[instrument(skip(self, rule), fields(rule_id = %rule.id, cluster_id = %rule.cluster))]
    pub async fn fire(&self, rule: &Rule) -> Result<FireOutcome, PipelineError> {
        let today = chrono::Local::now().date_naive();
        if self.exception_calendar.is_suppressed(&rule.cluster, today).await {
            info!("suppressed by exception calendar");
            self.clear_retry(rule).await;
            return Ok(FireOutcome { suppressed: true, ..Default::default() });
        }

        match self.run_pipeline(rule).await {
            Ok(outcome) => {
                self.clear_retry(rule).await;
                Ok(outcome)
            }
            Err(error) => {
                warn!(%error, "activation failed, scheduling retry");
                self.schedule_retry(rule).await;
                Err(error)
            }
        }
    }

    async fn run_pipeline(&self, rule: &Rule) -> Result<FireOutcome, PipelineError> {
        let Some(primary) = self.topology.primary_of(&rule.cluster).await else {
            // No primary means no meaningful replica set; treat as a
            // no-op success, matching "rule succeeds ... if none were
            // eligible" (§7 item 2).
            return Ok(FireOutcome::default());
        };
        let replicas = self.topology.replicas_of(&rule.cluster).await;

        let policy = self.persistence.cluster_policy(&rule.cluster).await;
        let primary_reading = if policy.as_ref().and_then(|p| p.avg_load).is_some() {
            self.prober.probe(&primary).await.ok()
        } else {
            None
        };

        let mut readings = Vec::with_capacity(replicas.len());
        for replica in &replicas {
            readings.push(self.prober.probe(replica).await.ok());
        }
        let probed: Vec<Probed<'_>> = replicas
            .iter()
            .zip(readings)
            .map(|(node, reading)| Probed { node, reading })
            .collect();

        let evaluation = safety_evaluator::evaluate(rule, &probed, primary_reading, policy.as_ref());

        let cluster_name = self.persistence.cluster(&rule.cluster).await.map(|c| c.name);

        let mut outcome = FireOutcome { rejected: evaluation.rejected, ..Default::default() };
        let mut first_error = None;

        for node_id in evaluation.eligible {
            let Some(node) = replicas.iter().find(|n| n.id == node_id) else { continue };
            let Some(lock) = self.locks.try_lock(node.region.clone(), node.id.clone()) else {
                warn!(node_id = %node.id, "scale already in progress, skipping");
                outcome.skipped_in_flight.push(node.id.clone());
                continue;
            };

            let plan = if rule.is_reverse() {
                ScalePlan::reverse(node.last_instance_type.clone().unwrap_or_else(|| node.instance_class.clone()))
            } else {
                ScalePlan::forward(rule, cluster_name.clone())
            };

            match self.state_machine.run(&lock, node, plan).await {
                Ok(commit) => {
                    info!(node_id = %node.id, class = %commit.effective_class, "node scaled");
                    outcome.scaled.push(node.id.clone());
                    if let Err(dns_error) = self.dns_steerer.steer(node, &primary, rule.action).await {
                        warn!(%dns_error, node_id = %node.id, "dns steering failed");
                        first_error.get_or_insert(PipelineError::from(dns_error));
                    }
                }
                Err(scale_error) => {
                    warn!(%scale_error, node_id = %node.id, "scale failed");
                    first_error.get_or_insert(PipelineError::from(scale_error));
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(outcome),
        }
    }

    async fn clear_retry(&self, rule: &Rule) {
        if let Err(error) = self.scheduler.uninstall(&retry_tag(rule.id)).await {
            warn!(%error, "failed to uninstall retry schedule");
        }
        self.persistence.set_rule_state(rule.id, RuleState::default()).await;
    }

    /// Advances `rule`'s retry counter (I4): ensures a retry schedule
    /// exists while `0 < no_of_tries <= max_attempts`, and cancels it,
    /// resetting the counter, once `no_of_tries` exceeds `max_attempts`.
    async fn schedule_retry(&self, rule: &Rule) {
        let Some(policy) = rule.retry_policy else { return };

        let mut state = self.persistence.rule_state(rule.id).await;
        state.no_of_tries += 1;

        if state.no_of_tries > policy.max_attempts {
            self.clear_retry(rule).await;
            return;
        }

        if !state.retry_tag_installed {
            let cron = format!("*/{} * * * *", policy.interval_minutes);
            if let Err(error) = self.scheduler.install(&retry_tag(rule.id), &cron).await {
                warn!(%error, "failed to install retry schedule");
            } else {
                state.retry_tag_installed = true;
            }
        }

        self.persistence.set_rule_state(rule.id, state).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_follow_the_reserved_naming_convention() {
        assert_eq!(primary_tag(RuleId(7)), "rule_7");
        assert_eq!(retry_tag(RuleId(7)), "retry_rule_7");
    }
}
