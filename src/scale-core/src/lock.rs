// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Per-instance mutual exclusion (§5: "no two activations may concurrently
//! hold a State Machine for the same instance id").
//!
//! The unit of isolation is the `(cloud-region, instance id)` pair. A
//! second activation that finds the key held must skip, not queue — so
//! this is a try-lock, not a mutex.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use scale_types::NodeId;

type Key = (String, NodeId);

/// A shared table of in-flight `(region, instance id)` locks.
#[derive(Clone, Default)]
pub struct InstanceLockTable {
    locks: Arc<DashMap<Key, ()>>,
}

impl InstanceLockTable {
    pub fn new() -> InstanceLockTable {
        InstanceLockTable::default()
    }

    /// Attempts to acquire the lock for `(region, node)`. Returns `None` if
    /// another activation already holds it; callers must treat that as
    /// "scale already in progress" and skip, never block.
    pub fn try_lock(&self, region: impl Into<String>, node: NodeId) -> Option<InstanceLockGuard> {
        let key = (region.into(), node);
        match self.locks.entry(key.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(v) => {
                v.insert(());
                Some(InstanceLockGuard {
                    table: Arc::clone(&self.locks),
                    key,
                })
            }
        }
    }
}

/// Proof that the caller holds the per-instance lock for `key.1`. Anything
/// that must only happen while a node's scale is exclusively owned — most
/// notably stamping `Node::last_instance_type` — takes this as an
/// argument rather than trusting the caller.
pub struct InstanceLockGuard {
    table: Arc<DashMap<Key, ()>>,
    key: Key,
}

impl InstanceLockGuard {
    pub fn node_id(&self) -> &NodeId {
        &self.key.1
    }

    pub fn region(&self) -> &str {
        &self.key.0
    }
}

impl Drop for InstanceLockGuard {
    fn drop(&mut self) {
        self.table.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lock_attempt_is_rejected() {
        let table = InstanceLockTable::new();
        let node = NodeId("i-0001".to_string());
        let _guard = table
            .try_lock("us-east-1", node.clone())
            .expect("first lock should succeed");
        assert!(
            table.try_lock("us-east-1", node).is_none(),
            "second concurrent lock on the same instance must be rejected"
        );
    }

    #[test]
    fn lock_is_released_on_drop() {
        let table = InstanceLockTable::new();
        let node = NodeId("i-0002".to_string());
        {
            let _guard = table.try_lock("us-east-1", node.clone()).unwrap();
        }
        assert!(
            table.try_lock("us-east-1", node).is_some(),
            "lock should be released once the guard is dropped"
        );
    }

    #[test]
    fn same_instance_id_in_different_regions_does_not_conflict() {
        let table = InstanceLockTable::new();
        let node = NodeId("i-0003".to_string());
        let _g1 = table.try_lock("us-east-1", node.clone()).unwrap();
        assert!(table.try_lock("us-west-2", node).is_some());
    }
}
