// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Concrete [`Prognosticator`], [`Pager`], and [`DnsUpdater`]
//! implementations that shell out to the three external scripts named in
//! `ScriptPaths`, mirroring `engine/aws/ec_wrapper.py`'s
//! `subprocess.check_output`/`subprocess.run` calls translated to
//! `tokio::process::Command` + `ExitStatus` checks.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tracing::warn;

use scale_types::{DnsRecordType, NodeId};

use crate::collaborators::{DnsError, Pager, PagerError, Prognosticator};

/// Invokes the prognostication script with `(cluster_name, proposed_class)`
/// as arguments and takes its trimmed stdout as the effective class. A
/// nonzero exit, unreadable stdout, or empty stdout all degrade to the
/// proposal, per the script's contract in §6 — never propagated as an
/// error.
pub struct ProcessPrognosticator {
    script: PathBuf,
}

impl ProcessPrognosticator {
    pub fn new(script: PathBuf) -> ProcessPrognosticator {
        ProcessPrognosticator { script }
    }
}

#[async_trait]
impl Prognosticator for ProcessPrognosticator {
    async fn effective_class(&self, cluster_name: &str, proposed_class: &str) -> String {
        let output = tokio::process::Command::new(&self.script)
            .arg(cluster_name)
            .arg(proposed_class)
            .stdin(Stdio::null())
            .output()
            .await;
        let output = match output {
            Ok(output) => output,
            Err(error) => {
                warn!(%error, script = %self.script.display(), "prognostication script failed to launch, using proposed class");
                return proposed_class.to_string();
            }
        };
        if !output.status.success() {
            warn!(
                status = %output.status,
                script = %self.script.display(),
                "prognostication script exited nonzero, using proposed class",
            );
            return proposed_class.to_string();
        }
        match String::from_utf8(output.stdout) {
            Ok(stdout) if !stdout.trim().is_empty() => stdout.trim().to_string(),
            Ok(_) => proposed_class.to_string(),
            Err(error) => {
                warn!(%error, "prognostication script emitted non-UTF8 stdout, using proposed class");
                proposed_class.to_string()
            }
        }
    }
}

/// Invokes the pager script with `(instance_id, title, context)` as
/// arguments; a nonzero exit is surfaced as [`PagerError`] so the caller
/// can log that the human escalation itself failed.
pub struct ProcessPager {
    script: PathBuf,
}

impl ProcessPager {
    pub fn new(script: PathBuf) -> ProcessPager {
        ProcessPager { script }
    }
}

#[async_trait]
impl Pager for ProcessPager {
    async fn page(&self, node: &NodeId, title: &str, context: &str) -> Result<(), PagerError> {
        let status = tokio::process::Command::new(&self.script)
            .arg(&node.0)
            .arg(title)
            .arg(context)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|error| PagerError(node.clone(), error.to_string()))?;
        if !status.success() {
            return Err(PagerError(node.clone(), format!("exited with {status}")));
        }
        Ok(())
    }
}

/// Invokes the DNS updater script with
/// `(zone, name, address, record-type)` as arguments.
pub struct ProcessDnsUpdater {
    script: PathBuf,
}

impl ProcessDnsUpdater {
    pub fn new(script: PathBuf) -> ProcessDnsUpdater {
        ProcessDnsUpdater { script }
    }
}

#[async_trait]
impl crate::collaborators::DnsUpdater for ProcessDnsUpdater {
    async fn update(
        &self,
        zone: &str,
        name: &str,
        address: &str,
        record_type: DnsRecordType,
    ) -> Result<(), DnsError> {
        let status = tokio::process::Command::new(&self.script)
            .arg(zone)
            .arg(name)
            .arg(address)
            .arg(record_type.to_string())
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|error| DnsError {
                zone: zone.to_string(),
                name: name.to_string(),
                address: address.to_string(),
                source: error.to_string(),
            })?;
        if !status.success() {
            return Err(DnsError {
                zone: zone.to_string(),
                name: name.to_string(),
                address: address.to_string(),
                source: format!("exited with {status}"),
            });
        }
        Ok(())
    }
}
