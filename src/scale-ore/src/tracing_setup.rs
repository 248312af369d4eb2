// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Process-wide `tracing` subscriber setup, driven by [`LoggingConfig`][lc].
//!
//! [lc]: https://docs.rs/scale-types (see `scale_types::config::LoggingConfig`)

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Installs the global tracing subscriber. `level` is a `tracing`
/// directive (e.g. `"info"`, `"dbscaler=debug,warn"`); `json` switches
/// between the human-readable and JSON-structured formatters.
pub fn init(level: &str, json: bool) {
    let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = Registry::default().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .ok();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .ok();
    }
}
