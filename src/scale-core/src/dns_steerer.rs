// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The DNS Steerer (C7): points a replica's DNS entry at either the
//! replica's own address or the primary's, depending on the rule's
//! action (§4.7).
//!
//! Per REDESIGN FLAG (c), the Dispatcher invokes this only after the
//! State Machine reports a successful [`crate::state_machine::ScaleCommit`]
//! for the node — never on failure or mid-scale.

use std::sync::Arc;

use scale_types::{Node, ScaleAction};

use crate::collaborators::{DnsError, DnsUpdater};

pub struct DnsSteerer {
    updater: Arc<dyn DnsUpdater>,
}

impl DnsSteerer {
    pub fn new(updater: Arc<dyn DnsUpdater>) -> DnsSteerer {
        DnsSteerer { updater }
    }

    /// Steers `replica`'s DNS entry, if it has one, per `action`: a
    /// scale-down points reads at `primary` (the replica is briefly
    /// unusable and may stay small), a scale-up points back at the
    /// replica itself.
    pub async fn steer(
        &self,
        replica: &Node,
        primary: &Node,
        action: ScaleAction,
    ) -> Result<(), DnsError> {
        let Some(entry) = &replica.dns_entry else {
            return Ok(());
        };
        let target = match action {
            ScaleAction::ScaleDown => target_address(primary),
            ScaleAction::ScaleUp => target_address(replica),
        };
        self.updater
            .update(&entry.zone, &entry.name, &target, replica.node_type.dns_record_type())
            .await
    }
}

fn target_address(node: &Node) -> String {
    node.public_address.clone().unwrap_or_else(|| node.private_address.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use scale_types::{ClusterId, DnsEntry, DnsRecordType, NodeId, NodeType};
    use std::sync::Mutex;

    struct RecordingUpdater {
        calls: Mutex<Vec<(String, String, String, DnsRecordType)>>,
    }

    #[async_trait]
    impl DnsUpdater for RecordingUpdater {
        async fn update(
            &self,
            zone: &str,
            name: &str,
            address: &str,
            record_type: DnsRecordType,
        ) -> Result<(), DnsError> {
            self.calls.lock().unwrap().push((zone.to_string(), name.to_string(), address.to_string(), record_type));
            Ok(())
        }
    }

    fn node(id: &str, address: &str) -> Node {
        Node {
            id: NodeId(id.to_string()),
            cluster: ClusterId("c1".to_string()),
            node_type: NodeType::Compute,
            instance_class: "m5.large".to_string(),
            last_instance_type: None,
            region: "us-east-1".to_string(),
            vpc: "vpc-1".to_string(),
            private_address: address.to_string(),
            public_address: None,
            dns_entry: Some(DnsEntry { zone: "z".to_string(), name: "replica.internal".to_string() }),
            primary: false,
            reachable: true,
        }
    }

    #[tokio::test]
    async fn scale_down_points_at_primary() {
        let updater = Arc::new(RecordingUpdater { calls: Mutex::new(Vec::new()) });
        let steerer = DnsSteerer::new(updater.clone());
        let replica = node("r1", "10.0.0.2");
        let primary = node("p1", "10.0.0.1");
        steerer.steer(&replica, &primary, ScaleAction::ScaleDown).await.unwrap();
        let calls = updater.calls.lock().unwrap();
        assert_eq!(calls[0].2, "10.0.0.1");
    }

    #[tokio::test]
    async fn scale_up_points_at_replica_itself() {
        let updater = Arc::new(RecordingUpdater { calls: Mutex::new(Vec::new()) });
        let steerer = DnsSteerer::new(updater.clone());
        let replica = node("r1", "10.0.0.2");
        let primary = node("p1", "10.0.0.1");
        steerer.steer(&replica, &primary, ScaleAction::ScaleUp).await.unwrap();
        let calls = updater.calls.lock().unwrap();
        assert_eq!(calls[0].2, "10.0.0.2");
    }

    #[tokio::test]
    async fn node_without_dns_entry_is_a_no_op() {
        let updater = Arc::new(RecordingUpdater { calls: Mutex::new(Vec::new()) });
        let steerer = DnsSteerer::new(updater.clone());
        let mut replica = node("r1", "10.0.0.2");
        replica.dns_entry = None;
        let primary = node("p1", "10.0.0.1");
        steerer.steer(&replica, &primary, ScaleAction::ScaleDown).await.unwrap();
        assert!(updater.calls.lock().unwrap().is_empty());
    }
}
