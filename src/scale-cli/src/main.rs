// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! `apply_rule <rule-id>`: the external scheduling facility's entry point
//! (§6). Runs one activation of a single rule and exits 0 on success or
//! benign suppression, non-zero on pipeline error, per §6 exactly.

mod backend;
mod file_scheduler;
mod seed;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use scale_core::{DnsSteerer, ExceptionCalendar, MemoryStore, RuleDispatcher, ScalingStateMachine};
use scale_types::{Config, RuleId};

use backend::{LocalCloudAdapter, LocalNodeProber};
use file_scheduler::FileScheduler;

#[derive(Parser, Debug)]
#[command(author, version, about = "Applies a single right-sizing rule's activation pipeline")]
struct Args {
    /// The rule to activate, as assigned by the (out-of-scope) admin interface.
    rule_id: u64,

    /// Path to a TOML configuration file; DBSCALER_* environment variables
    /// override anything it sets.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to a JSON fixture seeding the in-memory entity store. Stands
    /// in for the out-of-scope persistence backend.
    #[arg(long)]
    seed: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("failed to load configuration: {error}");
            return ExitCode::FAILURE;
        }
    };

    scale_ore::tracing_setup::init(&config.logging.level, config.logging.json);

    match run(args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(%error, "activation failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, config: Config) -> anyhow::Result<()> {
    let store = MemoryStore::new();
    if let Some(seed_path) = &args.seed {
        seed::load_into(&store, seed_path)?;
    }

    let rule_id = RuleId(args.rule_id);
    let Some(rule) = store.rule(rule_id).await else {
        anyhow::bail!("no rule registered with id {rule_id}");
    };

    let cloud = Arc::new(LocalCloudAdapter::new());
    let prober = Arc::new(LocalNodeProber);
    let prognosticator = Arc::new(scale_core::scripts::ProcessPrognosticator::new(config.scripts.prognostication.clone()));
    let pager = Arc::new(scale_core::scripts::ProcessPager::new(config.scripts.pager.clone()));
    let dns_updater = Arc::new(scale_core::scripts::ProcessDnsUpdater::new(config.scripts.dns_updater.clone()));
    let start_retry = scale_ore::retry::Retry::default()
        .initial_backoff(std::time::Duration::from_millis(config.start_retry.gap_millis))
        .clamp_backoff(std::time::Duration::from_millis(config.start_retry.gap_millis))
        .max_tries(config.start_retry.max_tries());

    let state_machine = Arc::new(ScalingStateMachine::new(
        cloud,
        prognosticator,
        pager.clone(),
        store.clone(),
        config.timeouts.clone(),
        start_retry,
    ));
    let dns_steerer = Arc::new(DnsSteerer::new(dns_updater));
    let exception_calendar = Arc::new(ExceptionCalendar::new(store.clone()));
    let scheduler = Arc::new(FileScheduler::new(config.state_path.clone()));

    let dispatcher = RuleDispatcher::new(
        store.clone(),
        prober,
        store.clone(),
        state_machine,
        dns_steerer,
        exception_calendar,
        scheduler,
    );

    // Diffs the scheduling facility's installed tags against the rule
    // table before firing, so a rule added to the entity store since the
    // last activation gets its primary tag installed (§4.6 "Durability").
    let all_rules = store.all_rules().await;
    dispatcher.reconcile(&all_rules).await?;

    let outcome = dispatcher.fire(&rule).await?;
    if outcome.suppressed {
        info!(rule_id = %rule.id, "activation suppressed by exception calendar");
    } else {
        info!(
            rule_id = %rule.id,
            scaled = outcome.scaled.len(),
            rejected = outcome.rejected.len(),
            skipped_in_flight = outcome.skipped_in_flight.len(),
            "activation complete",
        );
    }
    Ok(())
}
