// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Loads a JSON fixture into a [`MemoryStore`] at process start.
//!
//! The entity store itself is out of scope (§1): a real deployment has an
//! admin interface writing rules, nodes, clusters and credentials into
//! whatever `RulePersistence` it backs `MemoryStore`'s trait with. This
//! fixture format is just enough for `apply_rule` to have something to
//! read in this exercise, the same way [`crate::backend::LocalCloudAdapter`]
//! stands in for a real cloud SDK.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use scale_core::MemoryStore;
use scale_types::{Cluster, ClusterManagementPolicy, Credential, ExceptionCalendarEntry, Node, Rule};

#[derive(Deserialize)]
#[serde(default)]
pub struct Fixture {
    rules: Vec<Rule>,
    nodes: Vec<Node>,
    clusters: Vec<Cluster>,
    cluster_policies: Vec<ClusterManagementPolicy>,
    credentials: Vec<Credential>,
    exceptions: Vec<ExceptionCalendarEntry>,
}

impl Default for Fixture {
    fn default() -> Fixture {
        Fixture {
            rules: Vec::new(),
            nodes: Vec::new(),
            clusters: Vec::new(),
            cluster_policies: Vec::new(),
            credentials: Vec::new(),
            exceptions: Vec::new(),
        }
    }
}

/// Reads `path` as a [`Fixture`] and seeds `store` with its contents.
pub fn load_into(store: &MemoryStore, path: &Path) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading seed fixture {}", path.display()))?;
    let fixture: Fixture = serde_json::from_str(&contents)
        .with_context(|| format!("parsing seed fixture {}", path.display()))?;
    for rule in fixture.rules {
        store.seed_rule(rule);
    }
    for node in fixture.nodes {
        store.seed_node(node);
    }
    for cluster in fixture.clusters {
        store.seed_cluster(cluster);
    }
    for policy in fixture.cluster_policies {
        store.seed_cluster_policy(policy);
    }
    for credential in fixture.credentials {
        store.seed_credential(credential);
    }
    for exception in fixture.exceptions {
        store.seed_exception(exception);
    }
    Ok(())
}
