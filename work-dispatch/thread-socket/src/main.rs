// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use work_dispatch_core::config::{DispatchConfig, DispatchMode};
use work_dispatch_core::reporter::ConsoleReporter;
use work_dispatch_core::task_executor::SleepExecutor;
use work_dispatch_core::thread_runtime::{run_cluster, run_static};
use work_dispatch_socket::socket_channel::bind_group;

#[derive(Debug, Parser)]
#[command(name = "work-dispatch-socket")]
struct Args {
    /// JSON configuration file; defaults are used when it cannot be read.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// `dynamic` or `static`
    #[arg(long)]
    mode: Option<DispatchMode>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    participants: Option<usize>,

    #[arg(long, env = "WORK_DISPATCH_SEED")]
    seed: Option<u64>,

    /// Print every batch entry instead of a truncated listing.
    #[arg(long)]
    full_listing: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = match DispatchConfig::load(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = %args.config.display(), error = %e, "using default configuration");
            DispatchConfig::default()
        }
    };
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(participants) = args.participants {
        config.participants = participants;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    config.validate().context("invalid configuration")?;

    println!("=== WORK DISPATCH (Thread-Socket) ===");
    config.print_summary();
    println!();

    let mut reporter = ConsoleReporter::new(args.full_listing);
    if config.mode == DispatchMode::Static {
        run_static(&config, &mut reporter).context("static partitioning failed")?;
        return Ok(());
    }

    let channels =
        bind_group(config.participants).context("failed to bind participant sockets")?;
    for channel in &channels {
        info!(addr = %channel.local_addr(), "participant listening");
    }
    let outcome = run_cluster(
        channels,
        &config,
        |rank| SleepExecutor::new(config.seed_for(rank), config.time_scale),
        |_| reporter,
    )
    .context("dynamic dispatch failed")?;

    for worker in &outcome.workers {
        info!(
            rank = worker.rank,
            tasks = worker.tasks_completed,
            busy = ?worker.busy,
            "worker summary"
        );
    }
    println!("\n=== COMPLETE ===");
    Ok(())
}
