// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Process configuration: layered TOML file + `DBSCALER_*` environment
//! overrides, in the style most services in this pack use the `config`
//! crate.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Timeouts applied to the cloud adapter's wait primitives and to the
/// external script invocations.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub wait_stopped_secs: u64,
    pub wait_running_secs: u64,
    pub script_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            wait_stopped_secs: 300,
            wait_running_secs: 300,
            script_secs: 30,
        }
    }
}

impl Timeouts {
    pub fn wait_stopped(&self) -> Duration {
        Duration::from_secs(self.wait_stopped_secs)
    }

    pub fn wait_running(&self) -> Duration {
        Duration::from_secs(self.wait_running_secs)
    }

    pub fn script(&self) -> Duration {
        Duration::from_secs(self.script_secs)
    }
}

/// Paths to the three external scripts described in the External
/// Interfaces section: prognostication, paging, and DNS updates.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScriptPaths {
    pub prognostication: PathBuf,
    pub pager: PathBuf,
    pub dns_updater: PathBuf,
}

/// How many attempts the State Machine's `start` primitive makes in total
/// before giving up and surfacing the need for a fallback. The spec fixes
/// this at 3 attempts with a 1s gap; kept configurable for tests.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StartRetry {
    pub attempts: u32,
    pub gap_millis: u64,
}

impl Default for StartRetry {
    fn default() -> Self {
        StartRetry {
            attempts: 3,
            gap_millis: 1_000,
        }
    }
}

impl StartRetry {
    /// The retry budget to feed a `scale_ore::retry::Retry`'s
    /// `max_tries`: one less than `attempts`, since the first attempt
    /// isn't itself a retry (`attempts` total = 1 initial try + this many
    /// retries).
    pub fn max_tries(&self) -> usize {
        self.attempts.saturating_sub(1) as usize
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Top-level process configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub scripts: ScriptPaths,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub start_retry: StartRetry,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Where the in-memory/on-disk persistence implementation keeps its
    /// state. Schema semantics only; see `scale-core::persistence`.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
}

fn default_state_path() -> PathBuf {
    PathBuf::from("dbscaler-state.json")
}

impl Config {
    /// Loads configuration from an optional TOML file merged with
    /// `DBSCALER_`-prefixed environment variables, the latter taking
    /// precedence.
    pub fn load(path: Option<&std::path::Path>) -> Result<Config, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("DBSCALER")
                .separator("__")
                .try_parsing(true),
        );
        let raw = builder.build()?;
        let config = raw.try_deserialize()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_default_to_sane_values() {
        let t = Timeouts::default();
        assert_eq!(t.wait_stopped(), Duration::from_secs(300));
        assert_eq!(t.script(), Duration::from_secs(30));
    }

    #[test]
    fn start_retry_matches_spec_default() {
        let r = StartRetry::default();
        assert_eq!(r.attempts, 3);
        assert_eq!(r.gap_millis, 1_000);
    }

    #[test]
    fn start_retry_max_tries_is_one_less_than_total_attempts() {
        // 3 total attempts = 1 initial try + 2 retries, matching the
        // state machine test harness's `.max_tries(2)`.
        assert_eq!(StartRetry::default().max_tries(), 2);
        assert_eq!(StartRetry { attempts: 1, gap_millis: 0 }.max_tries(), 0);
    }
}
