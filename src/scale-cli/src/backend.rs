// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Reference implementations of the two collaborators spec.md scopes out
//! entirely by interface and for which this pack carries no cloud SDK or
//! database driver crate: the Cloud Adapter (C2) and the Node Prober
//! (C1). A real deployment links in its own crate for these — an AWS SDK
//! client for the former, a database client for the latter — and wires
//! it in where `main` constructs [`LocalCloudAdapter`] /
//! [`LocalNodeProber`] today.
//!
//! `TopologyView` and `RulePersistence` don't need an equivalent here:
//! `scale_core::MemoryStore` is already the documented reference
//! implementation for both (see `scale-core`'s `persistence` module).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use scale_core::collaborators::{CloudAdapter, CloudError, InstanceDescription, ModifyOutcome, NodeProber, ProbeError, WaitError};
use scale_types::{Node, NodeId, ProbeReading};

/// Tracks instance class and power state in memory and always succeeds.
/// Stands in for a real provider's control plane until one is wired in.
#[derive(Default)]
pub struct LocalCloudAdapter {
    classes: Mutex<HashMap<NodeId, String>>,
}

impl LocalCloudAdapter {
    pub fn new() -> LocalCloudAdapter {
        LocalCloudAdapter::default()
    }
}

#[async_trait]
impl CloudAdapter for LocalCloudAdapter {
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
        self.classes.lock().unwrap().insert(node.clone(), new_class.to_string());
        Ok(ModifyOutcome::Accepted)
    }

    async fn start(&self, _node: &NodeId, _region: &str) -> Result<(), CloudError> {
        Ok(())
    }

    async fn wait_running(&self, _node: &NodeId, _region: &str, _timeout: Duration) -> Result<(), WaitError> {
        Ok(())
    }

    async fn list_classes(&self, _region: &str) -> Result<Vec<String>, CloudError> {
        Ok(Vec::new())
    }
}

/// Reports every replica as perfectly idle. Stands in for a real
/// database probe session until one is wired in.
pub struct LocalNodeProber;

#[async_trait]
impl NodeProber for LocalNodeProber {
    async fn probe(&self, _node: &Node) -> Result<ProbeReading, ProbeError> {
        Ok(ProbeReading { replication_lag_seconds: 0.0, active_connections: 0.0, load_average_1m: 0.0 })
    }
}
