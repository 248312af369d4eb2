// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! A file-backed [`Scheduler`]. The real scheduling facility (§6) is an
//! external per-user cron daemon this crate never touches directly; this
//! is a minimal durable stand-in so that `apply_rule` — a short-lived
//! process invoked once per activation — can still read and advance the
//! `retry_rule_<id>` tag across invocations, the way `MemoryStore` stands
//! in for the (also out-of-scope) entity store.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;

use scale_core::dispatcher::{Scheduler, SchedulerError};

pub struct FileScheduler {
    path: PathBuf,
}

impl FileScheduler {
    pub fn new(path: PathBuf) -> FileScheduler {
        FileScheduler { path }
    }

    fn load(&self) -> BTreeMap<String, String> {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|contents| serde_json::from_str(&contents).ok())
            .unwrap_or_default()
    }

    fn save(&self, tags: &BTreeMap<String, String>) -> Result<(), SchedulerError> {
        let json = serde_json::to_string_pretty(tags)
            .map_err(|error| SchedulerError::Backend(self.path.display().to_string(), error.to_string()))?;
        std::fs::write(&self.path, json)
            .map_err(|error| SchedulerError::Backend(self.path.display().to_string(), error.to_string()))
    }
}

#[async_trait]
impl Scheduler for FileScheduler {
    async fn install(&self, tag: &str, cron_expression: &str) -> Result<(), SchedulerError> {
        let mut tags = self.load();
        tags.insert(tag.to_string(), cron_expression.to_string());
        self.save(&tags)
    }

    async fn uninstall(&self, tag: &str) -> Result<(), SchedulerError> {
        let mut tags = self.load();
        tags.remove(tag);
        self.save(&tags)
    }

    async fn installed_tags(&self) -> Vec<String> {
        self.load().into_keys().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn install_then_uninstall_round_trips_through_disk() {
        let dir = std::env::temp_dir().join(format!("dbscaler-test-{:?}", std::thread::current().id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("schedule.json");
        let scheduler = FileScheduler::new(path);

        scheduler.install("retry_rule_1", "*/5 * * * *").await.unwrap();
        assert_eq!(scheduler.installed_tags().await, vec!["retry_rule_1".to_string()]);

        scheduler.uninstall("retry_rule_1").await.unwrap();
        assert!(scheduler.installed_tags().await.is_empty());
    }
}
