// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Fake collaborator implementations for unit and integration tests,
//! gated behind the `test-support` feature the way the teacher's own
//! crates expose in-memory/fake collaborators for their consumers'
//! tests rather than requiring a live dependency.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use scale_types::{ClusterId, DnsRecordType, Node, NodeId, ProbeReading};

use crate::collaborators::{
    CloudAdapter, CloudError, DnsError, DnsUpdater, InstanceDescription, ModifyOutcome, NodeProber, Pager,
    PagerError, Prognosticator, ProbeError, TopologyView, WaitError,
};
use crate::dispatcher::{Scheduler, SchedulerError};

/// A [`CloudAdapter`] whose `modify_class` rejects a configured set of
/// classes (modeling a provider that can't satisfy them) and otherwise
/// always succeeds immediately.
#[derive(Default)]
pub struct FakeCloudAdapter {
    rejected_classes: HashSet<String>,
    fail_start_for: HashSet<NodeId>,
    classes: Mutex<HashMap<NodeId, String>>,
}

impl FakeCloudAdapter {
    pub fn new() -> FakeCloudAdapter {
        FakeCloudAdapter::default()
    }

    pub fn rejecting(mut self, class: impl Into<String>) -> FakeCloudAdapter {
        self.rejected_classes.insert(class.into());
        self
    }

    /// Makes `start` fail every time for `node`, modeling S3's exhausted
    /// fallback path where even the revert-start attempt can fail.
    pub fn failing_start_for(mut self, node: NodeId) -> FakeCloudAdapter {
        self.fail_start_for.insert(node);
        self
    }

    pub fn current_class(&self, node: &NodeId) -> Option<String> {
        self.classes.lock().unwrap().get(node).cloned()
    }
}

#[async_trait]
impl CloudAdapter for FakeCloudAdapter {
    async fn describe(&self, node: &NodeId, _region: &str) -> Result<InstanceDescription, CloudError> {
        Ok(InstanceDescription {
            instance_class: self.classes.lock().unwrap().get(node).cloned().unwrap_or_default(),
            running: true,
        })
    }

    async fn stop(&self, _node: &NodeId, _region: &str) -> Result<(), CloudError> {
        Ok(())
    }

    async fn wait_stopped(&self, _node: &NodeId, _region: &str, _timeout: Duration) -> Result<(), WaitError> {
        Ok(())
    }

    async fn modify_class(
        &self,
        node: &NodeId,
        _region: &str,
        new_class: &str,
    ) -> Result<ModifyOutcome, CloudError> {
        if self.rejected_classes.contains(new_class) {
            return Ok(ModifyOutcome::NeedFallback);
        }
        self.classes.lock().unwrap().insert(node.clone(), new_class.to_string());
        Ok(ModifyOutcome::Accepted)
    }

    async fn start(&self, node: &NodeId, _region: &str) -> Result<(), CloudError> {
        if self.fail_start_for.contains(node) {
            return Err(CloudError::Start(node.clone(), "fake: start always rejected".to_string()));
        }
        Ok(())
    }

    async fn wait_running(&self, _node: &NodeId, _region: &str, _timeout: Duration) -> Result<(), WaitError> {
        Ok(())
    }

    async fn list_classes(&self, _region: &str) -> Result<Vec<String>, CloudError> {
        Ok(Vec::new())
    }
}

/// A [`NodeProber`] backed by a fixed table of readings; nodes absent
/// from the table fail their probe.
#[derive(Default)]
pub struct FakeNodeProber {
    readings: HashMap<NodeId, ProbeReading>,
}

impl FakeNodeProber {
    pub fn new() -> FakeNodeProber {
        FakeNodeProber::default()
    }

    pub fn with_reading(mut self, node: NodeId, reading: ProbeReading) -> FakeNodeProber {
        self.readings.insert(node, reading);
        self
    }
}

#[async_trait]
impl NodeProber for FakeNodeProber {
    async fn probe(&self, node: &Node) -> Result<ProbeReading, ProbeError> {
        self.readings
            .get(&node.id)
            .copied()
            .ok_or_else(|| ProbeError(node.id.clone(), "fake: no reading configured".to_string()))
    }
}

/// A [`TopologyView`] over a fixed primary and replica set.
#[derive(Default)]
pub struct FakeTopologyView {
    primaries: HashMap<ClusterId, Node>,
    replicas: HashMap<ClusterId, Vec<Node>>,
}

impl FakeTopologyView {
    pub fn new() -> FakeTopologyView {
        FakeTopologyView::default()
    }

    pub fn with_primary(mut self, node: Node) -> FakeTopologyView {
        self.primaries.insert(node.cluster.clone(), node);
        self
    }

    pub fn with_replica(mut self, node: Node) -> FakeTopologyView {
        self.replicas.entry(node.cluster.clone()).or_default().push(node);
        self
    }
}

#[async_trait]
impl TopologyView for FakeTopologyView {
    async fn primary_of(&self, cluster: &ClusterId) -> Option<Node> {
        self.primaries.get(cluster).cloned()
    }

    async fn replicas_of(&self, cluster: &ClusterId) -> Vec<Node> {
        self.replicas.get(cluster).cloned().unwrap_or_default()
    }
}

/// A [`Prognosticator`] that always hands back the proposed class
/// unchanged, unless a specific override was configured.
#[derive(Default)]
pub struct FakePrognosticator {
    overrides: HashMap<String, String>,
}

impl FakePrognosticator {
    pub fn new() -> FakePrognosticator {
        FakePrognosticator::default()
    }

    pub fn overriding(mut self, proposed: impl Into<String>, effective: impl Into<String>) -> FakePrognosticator {
        self.overrides.insert(proposed.into(), effective.into());
        self
    }
}

#[async_trait]
impl Prognosticator for FakePrognosticator {
    async fn effective_class(&self, _cluster_name: &str, proposed_class: &str) -> String {
        self.overrides.get(proposed_class).cloned().unwrap_or_else(|| proposed_class.to_string())
    }
}

/// A [`Pager`] that records every page it was asked to send.
#[derive(Default)]
pub struct FakePager {
    pub pages: Mutex<Vec<(NodeId, String, String)>>,
}

impl FakePager {
    pub fn new() -> FakePager {
        FakePager::default()
    }

    pub fn page_count(&self) -> usize {
        self.pages.lock().unwrap().len()
    }
}

#[async_trait]
impl Pager for FakePager {
    async fn page(&self, node: &NodeId, title: &str, context: &str) -> Result<(), PagerError> {
        self.pages.lock().unwrap().push((node.clone(), title.to_string(), context.to_string()));
        Ok(())
    }
}

/// A [`DnsUpdater`] that records every update it was asked to make.
#[derive(Default)]
pub struct FakeDnsUpdater {
    pub updates: Mutex<Vec<(String, String, String, DnsRecordType)>>,
}

impl FakeDnsUpdater {
    pub fn new() -> FakeDnsUpdater {
        FakeDnsUpdater::default()
    }
}

#[async_trait]
impl DnsUpdater for FakeDnsUpdater {
    async fn update(
        &self,
        zone: &str,
        name: &str,
        address: &str,
        record_type: DnsRecordType,
    ) -> Result<(), DnsError> {
        self.updates.lock().unwrap().push((zone.to_string(), name.to_string(), address.to_string(), record_type));
        Ok(())
    }
}

/// A [`Scheduler`] backed by an in-memory tag table, recording installs
/// and uninstalls for assertions.
#[derive(Default)]
pub struct FakeScheduler {
    tags: Mutex<HashMap<String, String>>,
}

impl FakeScheduler {
    pub fn new() -> FakeScheduler {
        FakeScheduler::default()
    }

    pub fn cron_for(&self, tag: &str) -> Option<String> {
        self.tags.lock().unwrap().get(tag).cloned()
    }
}

#[async_trait]
impl Scheduler for FakeScheduler {
    async fn install(&self, tag: &str, cron_expression: &str) -> Result<(), SchedulerError> {
        self.tags.lock().unwrap().insert(tag.to_string(), cron_expression.to_string());
        Ok(())
    }

    async fn uninstall(&self, tag: &str) -> Result<(), SchedulerError> {
        self.tags.lock().unwrap().remove(tag);
        Ok(())
    }

    async fn installed_tags(&self) -> Vec<String> {
        self.tags.lock().unwrap().keys().cloned().collect()
    }
}
