// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The Exception Calendar (C8): suppresses activations for a (cluster,
//! date) pair an operator has frozen (§4.8).

use std::sync::Arc;

use chrono::NaiveDate;

use scale_types::ClusterId;

use crate::collaborators::RulePersistence;

pub struct ExceptionCalendar {
    persistence: Arc<dyn RulePersistence>,
}

impl ExceptionCalendar {
    pub fn new(persistence: Arc<dyn RulePersistence>) -> ExceptionCalendar {
        ExceptionCalendar { persistence }
    }

    /// Returns `true` if `cluster` is frozen on `today` — a benign abort,
    /// not an error (§7 item 1).
    pub async fn is_suppressed(&self, cluster: &ClusterId, today: NaiveDate) -> bool {
        match self.persistence.exception_entry(today).await {
            Some(entry) => entry.clusters.contains(cluster),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeSet;

    struct FixedCalendar {
        entry: Option<scale_types::ExceptionCalendarEntry>,
    }

    #[async_trait]
    impl RulePersistence for FixedCalendar {
        async fn rule(&self, _id: scale_types::RuleId) -> Option<scale_types::Rule> {
            None
        }
        async fn all_rules(&self) -> Vec<scale_types::Rule> {
            Vec::new()
        }
        async fn rule_state(&self, _rule: scale_types::RuleId) -> scale_types::RuleState {
            scale_types::RuleState::default()
        }
        async fn set_rule_state(&self, _rule: scale_types::RuleId, _state: scale_types::RuleState) {}
        async fn exception_entry(&self, _date: NaiveDate) -> Option<scale_types::ExceptionCalendarEntry> {
            self.entry.clone()
        }
        async fn credential(&self, _name: &str) -> Option<scale_types::Credential> {
            None
        }
        async fn cluster(&self, _cluster: &ClusterId) -> Option<scale_types::Cluster> {
            None
        }
        async fn cluster_policy(&self, _cluster: &ClusterId) -> Option<scale_types::ClusterManagementPolicy> {
            None
        }
        async fn stamp_last_instance_type(
            &self,
            _lock: &crate::lock::InstanceLockGuard,
            _node: &scale_types::NodeId,
            _previous_class: String,
        ) -> Result<(), crate::collaborators::PersistenceError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn cluster_listed_today_is_suppressed() {
        let cluster = ClusterId("c1".to_string());
        let mut clusters = BTreeSet::new();
        clusters.insert(cluster.clone());
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let persistence = Arc::new(FixedCalendar {
            entry: Some(scale_types::ExceptionCalendarEntry { date: today, clusters }),
        });
        let calendar = ExceptionCalendar::new(persistence);
        assert!(calendar.is_suppressed(&cluster, today).await);
    }

    #[tokio::test]
    async fn cluster_not_listed_is_not_suppressed() {
        let cluster = ClusterId("c1".to_string());
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let persistence = Arc::new(FixedCalendar { entry: None });
        let calendar = ExceptionCalendar::new(persistence);
        assert!(!calendar.is_suppressed(&cluster, today).await);
    }
}
